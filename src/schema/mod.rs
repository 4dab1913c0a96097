//! JSON-Schema validation and retry feedback.
//!
//! Validation produces structured, path-addressed errors; [`error_feedback`]
//! renders them as natural-language text that the extraction loop injects
//! back into the conversation to drive backend self-correction.

pub mod feedback;
pub mod validator;

pub use feedback::error_feedback;
pub use validator::{
    check_schema, required_fields, supports_nullable, validate, validate_with_details,
    ValidationError,
};
