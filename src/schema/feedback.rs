//! Natural-language feedback rendering for the retry loop.

use super::validator::ValidationError;

/// Renders validation failures as a field-by-field bullet list plus an
/// instruction to resend a corrected response.
///
/// The extraction loop appends this text to the conversation so the backend
/// can self-correct on the next attempt.
///
/// # Examples
///
/// ```
/// use promptbatch::schema::{error_feedback, ValidationError};
/// use serde_json::json;
///
/// let errors = vec![ValidationError {
///     path: "age".to_string(),
///     message: "\"invalid\" is not of type \"number\"".to_string(),
///     validator_kind: "type".to_string(),
///     offending_value: json!("invalid"),
/// }];
/// let feedback = error_feedback(&errors);
/// assert!(feedback.contains("Field 'age'"));
/// ```
#[must_use]
pub fn error_feedback(errors: &[ValidationError]) -> String {
    let mut feedback = String::from("The previous response had validation errors:\n\n");

    for error in errors {
        feedback.push_str(&format!("- Field '{}': {}\n", error.path, error.message));
    }

    feedback.push_str(
        "\nPlease provide a corrected response that matches the schema exactly.\n\
         Pay attention to data types (string, number, array, object, boolean, null).",
    );

    feedback
}
