//! Shared encoding utilities.

/// Format bytes as colon-separated uppercase hex (e.g., "AB:CD:EF").
pub fn hex_colon_upper(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(":")
}

/// Strip leading zero bytes from a DER INTEGER body, keeping at least one byte.
///
/// Serial numbers are compared on this form so that a CRL entry encoded
/// with a sign-padding zero still matches the certificate's serial.
pub fn strip_leading_zeros(raw: &[u8]) -> &[u8] {
    match raw.iter().position(|&b| b != 0) {
        Some(pos) => raw.get(pos..).unwrap_or(raw),
        None => raw.get(raw.len().saturating_sub(1)..).unwrap_or(raw),
    }
}

/// Whether the input looks like PEM (starts with `-----BEGIN` after whitespace).
pub fn is_pem(input: &[u8]) -> bool {
    let start = input
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(input.len());
    input
        .get(start..)
        .is_some_and(|rest| rest.starts_with(b"-----BEGIN"))
}
