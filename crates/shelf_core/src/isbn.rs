//! ISBN-13 validation
//!
//! Only the current ISBN-13 namespace (`978`/`979`) is accepted. Everything here is pure.

/// Number of characters in an ISBN-13.
pub const ISBN_13_LENGTH: usize = 13;

/// Prefixes of the ISBN-13 namespace.
const PREFIXES: [&str; 2] = ["978", "979"];

/// Returns `true` if `candidate` is a well-formed ISBN-13 with a matching check digit.
#[must_use]
#[allow(clippy::missing_inline_in_public_items, reason = "Called rarely")]
pub fn is_valid(candidate: &str) -> bool {
    if candidate.len() != ISBN_13_LENGTH || !candidate.bytes().all(|byte| byte.is_ascii_digit()) {
        return false;
    }
    if !PREFIXES.iter().any(|prefix| candidate.starts_with(prefix)) {
        return false;
    }
    let (body, check) = candidate.split_at(ISBN_13_LENGTH - 1);
    let expected = check.bytes().next().map(|byte| byte - b'0');
    check_digit(body).is_some_and(|digit| Some(digit) == expected)
}

/// Computes the ISBN-13 check digit for the first twelve digits.
///
/// Digits at even positions weigh 1, digits at odd positions weigh 3. Returns `None` if the input
/// is not exactly twelve ASCII digits.
#[must_use]
#[allow(clippy::missing_inline_in_public_items, reason = "Called rarely")]
#[allow(
    clippy::arithmetic_side_effects,
    clippy::integer_division_remainder_used,
    reason = "Sum of twelve weighted digits cannot overflow a u32"
)]
pub fn check_digit(first_twelve: &str) -> Option<u8> {
    if first_twelve.len() != ISBN_13_LENGTH - 1 {
        return None;
    }
    let mut sum: u32 = 0;
    for (position, byte) in first_twelve.bytes().enumerate() {
        if !byte.is_ascii_digit() {
            return None;
        }
        let weight = if position % 2 == 0 { 1 } else { 3 };
        sum += u32::from(byte - b'0') * weight;
    }
    u8::try_from((10 - (sum % 10)) % 10).ok()
}

/// Cleans up a hand-typed ISBN: trims it and drops hyphens and inner spaces, so
/// `978-0-14-044913-6` becomes `9780140449136`. The result still has to pass [`is_valid`].
#[must_use]
#[allow(clippy::missing_inline_in_public_items, reason = "Called rarely")]
pub fn normalize_candidate(raw: &str) -> String {
    raw.trim()
        .chars()
        .filter(|character| *character != '-' && !character.is_whitespace())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn accepts_known_valid_isbn() {
        assert!(is_valid("9780140449136"));
        assert!(is_valid("9791032305690"));
    }

    #[test]
    fn rejects_checksum_mismatch() {
        assert!(!is_valid("9780140449137"));
    }

    #[test]
    fn rejects_wrong_prefix() {
        assert!(!is_valid("1234567890123"));
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(!is_valid("97801404491"));
        assert!(!is_valid("97801404491360"));
        assert!(!is_valid(""));
    }

    #[test]
    fn rejects_non_digits() {
        assert!(!is_valid("978014044913X"));
        assert!(!is_valid("978-014044913"));
        assert!(!is_valid(" 9780140449136"));
    }

    #[test]
    fn check_digit_matches_every_valid_prefix() {
        for body in ["978014044913", "978316148410", "979103230569"] {
            let digit = check_digit(body).unwrap();
            assert!(is_valid(&format!("{body}{digit}")));
            let wrong = (digit + 1) % 10;
            assert!(!is_valid(&format!("{body}{wrong}")));
        }
    }

    #[test]
    fn check_digit_rejects_bad_input() {
        assert_eq!(check_digit("97801404491"), None);
        assert_eq!(check_digit("97801404491a"), None);
    }

    #[test]
    fn normalizes_hyphenated_input() {
        assert_eq!(normalize_candidate(" 978-0-14-044913-6 "), "9780140449136");
        assert_eq!(normalize_candidate("978 0 14 044913 6"), "9780140449136");
    }
}
