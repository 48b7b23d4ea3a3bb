// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Recipient phone-number normalization.

use crate::error::SwitchboardError;

const MIN_DIGITS: usize = 10;
const MAX_DIGITS: usize = 15;

/// Strips formatting characters and checks the E.164 digit range.
///
/// Spaces, dashes, parentheses and `+` are removed. The remainder must be
/// 10 to 15 ASCII digits.
pub fn normalize_phone(raw: &str) -> Result<String, SwitchboardError> {
    if raw.trim().is_empty() {
        return Err(SwitchboardError::Validation(
            "phone number is required".to_string(),
        ));
    }

    let cleaned: String = raw
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '(' | ')' | '+'))
        .collect();

    if !cleaned.chars().all(|c| c.is_ascii_digit()) {
        return Err(SwitchboardError::Validation(
            "phone number must contain only digits".to_string(),
        ));
    }
    if cleaned.len() < MIN_DIGITS {
        return Err(SwitchboardError::Validation(format!(
            "phone number is too short (minimum {MIN_DIGITS} digits)"
        )));
    }
    if cleaned.len() > MAX_DIGITS {
        return Err(SwitchboardError::Validation(format!(
            "phone number is too long (maximum {MAX_DIGITS} digits)"
        )));
    }

    Ok(cleaned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_formatting() {
        assert_eq!(
            normalize_phone("+1 (555) 123-4567").unwrap(),
            "15551234567"
        );
    }

    #[test]
    fn rejects_letters() {
        let err = normalize_phone("555-CALL-NOW").unwrap_err();
        assert!(matches!(err, SwitchboardError::Validation(_)));
    }

    #[test]
    fn rejects_short_and_long() {
        assert!(normalize_phone("12345").is_err());
        assert!(normalize_phone("1234567890123456").is_err());
    }

    #[test]
    fn rejects_empty() {
        assert!(normalize_phone("   ").is_err());
    }

    proptest::proptest! {
        #[test]
        fn accepted_numbers_are_plain_digits(s in "\\+?[0-9 ()-]{0,24}") {
            if let Ok(clean) = normalize_phone(&s) {
                proptest::prop_assert!(clean.chars().all(|c| c.is_ascii_digit()));
                proptest::prop_assert!((MIN_DIGITS..=MAX_DIGITS).contains(&clean.len()));
            }
        }
    }
}
