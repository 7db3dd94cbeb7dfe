#![no_main]

use certrust_lib::RevocationList;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(crl) = RevocationList::parse(data) {
        let _ = crl.issuer().to_oneline();
        let _ = crl.next_update();
        let _ = crl.is_revoked(&[0x01]);
        let _ = crl.revocation_reason(data.get(..4).unwrap_or(data));
    }
});
