//! Phone number normalization
//!
//! Numbers reach the coordinator from agents typing into a dialer and from
//! carrier payloads. Both are reduced to a bare digit string with the country
//! code (`15551234567`) before a session is created.

use crate::error::{CoordinatorError, CoordinatorResult};

/// North American numbers without a country code get this prefix
const DEFAULT_COUNTRY_CODE: &str = "1";

const MIN_DIGITS: usize = 11;
const MAX_DIGITS: usize = 15;

/// Normalize a dialable number to its digit-only form
///
/// Spaces, dashes, dots, parentheses and a single leading `+` are dropped.
/// A 10-digit number gains the default country code.
///
/// ```rust
/// use casedesk_call_coordinator::phone::normalize_number;
///
/// assert_eq!(normalize_number("(555) 123-4567").unwrap(), "15551234567");
/// assert_eq!(normalize_number("+44 20 7946 0958").unwrap(), "442079460958");
/// assert!(normalize_number("555-CALL-NOW").is_err());
/// ```
pub fn normalize_number(raw: &str) -> CoordinatorResult<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(CoordinatorError::invalid_number(raw, "empty"));
    }

    let body = trimmed.strip_prefix('+').unwrap_or(trimmed);
    let mut digits = String::with_capacity(body.len());
    for c in body.chars() {
        match c {
            '0'..='9' => digits.push(c),
            ' ' | '-' | '.' | '(' | ')' => {}
            other => {
                return Err(CoordinatorError::invalid_number(
                    raw,
                    format!("unexpected character '{}'", other),
                ))
            }
        }
    }

    if digits.len() == 10 {
        digits.insert_str(0, DEFAULT_COUNTRY_CODE);
    }

    if digits.len() < MIN_DIGITS || digits.len() > MAX_DIGITS {
        return Err(CoordinatorError::invalid_number(
            raw,
            format!("expected {}-{} digits, got {}", MIN_DIGITS, MAX_DIGITS, digits.len()),
        ));
    }

    Ok(digits)
}

/// Normalize carrier-supplied numbers, keeping the raw value when it does
/// not parse (withheld caller ids, SIP usernames)
pub(crate) fn normalize_lenient(raw: &str) -> String {
    normalize_number(raw).unwrap_or_else(|_| raw.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_formats_are_reduced_to_digits() {
        assert_eq!(normalize_number("15551234567").unwrap(), "15551234567");
        assert_eq!(normalize_number("+1 555 123 4567").unwrap(), "15551234567");
        assert_eq!(normalize_number("555.123.4567").unwrap(), "15551234567");
        assert_eq!(normalize_number(" (555) 987-6543 ").unwrap(), "15559876543");
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(matches!(
            normalize_number(""),
            Err(CoordinatorError::InvalidNumber { .. })
        ));
        assert!(normalize_number("12345").is_err());
        assert!(normalize_number("1234567890123456").is_err());
        assert!(normalize_number("555-123-456x").is_err());
        assert!(normalize_number("++15551234567").is_err());
    }

    #[test]
    fn test_lenient_keeps_unparseable_values() {
        assert_eq!(normalize_lenient("anonymous"), "anonymous");
        assert_eq!(normalize_lenient("+1-555-123-4567"), "15551234567");
    }
}
