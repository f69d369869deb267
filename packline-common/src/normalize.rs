//! Barcode normalization
//!
//! Scanners and label printers disagree on dash characters: labels printed
//! from spreadsheets carry en/em dashes or the Unicode minus sign, and some
//! wedge scanners emit underscore for the dash key. All comparisons in the
//! session state machine go through `normalize` so those variants collapse
//! to one canonical code.

/// Canonicalize raw scanned text into a comparable code.
///
/// Trims whitespace, maps dash-like code points (U+2010..U+2015, U+2212)
/// and underscore to ASCII hyphen, and upper-cases the result. Total and
/// idempotent: `normalize(normalize(s)) == normalize(s)`.
pub fn normalize(raw: &str) -> String {
    raw.trim()
        .chars()
        .map(|c| match c {
            '\u{2010}'..='\u{2015}' | '\u{2212}' | '_' => '-',
            other => other,
        })
        .flat_map(char::to_uppercase)
        .collect()
}

/// True when the scanned code matches one of the configured reset codes.
///
/// Both sides are normalized so a reset card printed with an odd dash
/// still resets the session.
pub fn is_reset_code(raw: &str, reset_codes: &[String]) -> bool {
    let code = normalize(raw);
    reset_codes.iter().any(|r| normalize(r) == code)
}
