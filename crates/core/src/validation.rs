//! Field-level input validation shared by the catalog services and the requisition wizard.
//!
//! Validators collect [`FieldError`]s instead of stopping at the first problem so a form can
//! show every message at once.

use crate::constants::{CNES_LEN, CNS_LEN, MAX_NOTE_CHARS, MAX_PHONE_DIGITS, MIN_PHONE_DIGITS};
use crate::error::{CoreError, CoreResult, FieldError};
use reqtrack_types::NonEmptyText;
use reqtrack_uuid::RecordId;

/// Accumulates field errors for one form.
#[derive(Debug, Default)]
pub struct FieldErrors(Vec<FieldError>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, field: &str, message: impl Into<String>) {
        self.0.push(FieldError::new(field, message));
    }

    pub fn extend(&mut self, errors: Vec<FieldError>) {
        self.0.extend(errors);
    }

    /// Records the error of a failed field check and returns its value on success.
    pub fn check<T>(&mut self, result: Result<T, FieldError>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                self.0.push(e);
                None
            }
        }
    }

    /// Like [`FieldErrors::check`] for checks that report several fields at once.
    pub fn check_all<T>(&mut self, result: Result<T, Vec<FieldError>>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(errors) => {
                self.0.extend(errors);
                None
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_vec(self) -> Vec<FieldError> {
        self.0
    }

    /// `Ok(value)` when no errors were collected, otherwise the collected errors.
    pub fn finish<T>(self, value: impl FnOnce() -> T) -> Result<T, Vec<FieldError>> {
        if self.0.is_empty() {
            Ok(value())
        } else {
            Err(self.0)
        }
    }

    pub fn into_result(self) -> CoreResult<()> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(CoreError::Validation(self.0))
        }
    }
}

fn digits_only(input: &str) -> String {
    input.chars().filter(|c| !matches!(c, ' ' | '.' | '-' | '(' | ')' | '/')).collect()
}

/// Required free text.
pub fn required_text(field: &str, input: &str) -> Result<NonEmptyText, FieldError> {
    NonEmptyText::new(input).map_err(|_| FieldError::new(field, "is required"))
}

/// Optional free text: blank becomes `None`.
pub fn optional_text(input: Option<&str>) -> Option<String> {
    input
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Bounded optional note.
pub fn optional_note(field: &str, input: Option<&str>) -> Result<Option<String>, FieldError> {
    let note = optional_text(input);
    match &note {
        Some(text) if text.chars().count() > MAX_NOTE_CHARS => Err(FieldError::new(
            field,
            format!("must be at most {} characters", MAX_NOTE_CHARS),
        )),
        _ => Ok(note),
    }
}

/// Patient national health card number: exactly 15 digits once punctuation is removed.
pub fn cns(field: &str, input: &str) -> Result<String, FieldError> {
    let digits = digits_only(input.trim());
    if digits.is_empty() {
        return Err(FieldError::new(field, "is required"));
    }
    if digits.len() != CNS_LEN || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(FieldError::new(
            field,
            format!("must have exactly {} digits", CNS_LEN),
        ));
    }
    Ok(digits)
}

/// Optional health unit registry code: 7 digits when present.
pub fn optional_cnes(field: &str, input: Option<&str>) -> Result<Option<String>, FieldError> {
    let Some(raw) = optional_text(input) else {
        return Ok(None);
    };
    let digits = digits_only(&raw);
    if digits.len() != CNES_LEN || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(FieldError::new(
            field,
            format!("must have exactly {} digits", CNES_LEN),
        ));
    }
    Ok(Some(digits))
}

/// Optional phone number, normalised to digits.
pub fn optional_phone(field: &str, input: Option<&str>) -> Result<Option<String>, FieldError> {
    let Some(raw) = optional_text(input) else {
        return Ok(None);
    };
    let digits = digits_only(&raw);
    let digits = digits.strip_prefix('+').unwrap_or(&digits).to_string();
    let len_ok = (MIN_PHONE_DIGITS..=MAX_PHONE_DIGITS).contains(&digits.len());
    if !len_ok || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(FieldError::new(
            field,
            format!(
                "must have {} to {} digits including area code",
                MIN_PHONE_DIGITS, MAX_PHONE_DIGITS
            ),
        ));
    }
    Ok(Some(digits))
}

/// A required record reference supplied as a string.
pub fn record_id(field: &str, input: &str) -> Result<RecordId, FieldError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(FieldError::new(field, "is required"));
    }
    RecordId::parse(trimmed).map_err(|_| FieldError::new(field, "is not a valid id"))
}

/// An optional record reference; blank means none.
pub fn optional_record_id(field: &str, input: Option<&str>) -> Result<Option<RecordId>, FieldError> {
    match optional_text(input) {
        None => Ok(None),
        Some(raw) => record_id(field, &raw).map(Some),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cns_accepts_formatted_numbers() {
        assert_eq!(cns("cns", "898 0012 3456 7890").unwrap(), "898001234567890");
    }

    #[test]
    fn cns_rejects_wrong_length_and_letters() {
        assert!(cns("cns", "12345").is_err());
        assert!(cns("cns", "89800123456789A").is_err());
        assert_eq!(cns("cns", "  ").unwrap_err().message, "is required");
    }

    #[test]
    fn phone_normalises_and_bounds_length() {
        assert_eq!(
            optional_phone("phone", Some("(11) 98765-4321")).unwrap(),
            Some("11987654321".to_string())
        );
        assert_eq!(optional_phone("phone", Some("  ")).unwrap(), None);
        assert!(optional_phone("phone", Some("98765-4321")).is_err());
    }

    #[test]
    fn cnes_requires_seven_digits() {
        assert_eq!(
            optional_cnes("cnes", Some("123.4567")).unwrap(),
            Some("1234567".to_string())
        );
        assert!(optional_cnes("cnes", Some("123456")).is_err());
        assert_eq!(optional_cnes("cnes", None).unwrap(), None);
    }

    #[test]
    fn record_id_reports_field() {
        let err = record_id("unit_id", "nope").unwrap_err();
        assert_eq!(err.field, "unit_id");
        assert!(optional_record_id("agent_id", Some("")).unwrap().is_none());
    }

    #[test]
    fn field_errors_collect_all_messages() {
        let mut errors = FieldErrors::new();
        let a = errors.check(required_text("name", ""));
        let b = errors.check(cns("cns", "1"));
        assert!(a.is_none() && b.is_none());
        let collected = errors.into_vec();
        assert_eq!(collected.len(), 2);
        assert_eq!(collected[0].field, "name");
        assert_eq!(collected[1].field, "cns");
    }
}
