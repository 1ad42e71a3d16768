//! Common validation utilities.

use std::collections::HashSet;
use std::hash::Hash;

use validator::ValidationError;

/// Maximum number of users a single allow-list may name.
pub const MAX_ALLOW_LIST_SIZE: usize = 500;

/// Validates that a text field contains at least one non-whitespace character.
pub fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some("Value must not be blank".into());
        Err(err)
    } else {
        Ok(())
    }
}

/// Validates that a list holds no duplicate entries and stays within
/// [`MAX_ALLOW_LIST_SIZE`].
pub fn validate_unique_list<T: Eq + Hash>(values: &[T]) -> Result<(), ValidationError> {
    if values.len() > MAX_ALLOW_LIST_SIZE {
        let mut err = ValidationError::new("list_too_long");
        err.message = Some(format!("At most {} entries are allowed", MAX_ALLOW_LIST_SIZE).into());
        return Err(err);
    }

    let mut seen = HashSet::with_capacity(values.len());
    if values.iter().all(|v| seen.insert(v)) {
        Ok(())
    } else {
        let mut err = ValidationError::new("duplicate_entries");
        err.message = Some("List must not contain duplicates".into());
        Err(err)
    }
}

/// Flattens validator errors into a single `field: message` string.
pub fn describe_errors(errors: &validator::ValidationErrors) -> String {
    let mut parts: Vec<String> = errors
        .field_errors()
        .iter()
        .flat_map(|(field, errors)| {
            errors.iter().map(move |err| {
                let message = err
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| err.code.to_string());
                format!("{}: {}", field, message)
            })
        })
        .collect();
    parts.sort();
    parts.join(", ")
}
