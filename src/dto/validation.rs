//! Validation helpers for DTOs.

use validator::ValidationError;

/// Validates that a field value fits on one SSE line.
///
/// # Examples
///
/// ```ignore
/// validate_single_line("score-update") // Ok
/// validate_single_line("two\nlines")   // Err - would split the frame
/// ```
pub fn validate_single_line(value: &str) -> Result<(), ValidationError> {
    if value.contains(['\r', '\n']) {
        let mut err = ValidationError::new("single_line");
        err.message = Some("value must not contain line breaks".into());
        return Err(err);
    }
    Ok(())
}

/// Validates that no data line contains a line break.
pub fn validate_data_lines(lines: &[String]) -> Result<(), ValidationError> {
    if let Some(index) = lines.iter().position(|line| line.contains(['\r', '\n'])) {
        let mut err = ValidationError::new("data_line");
        err.message = Some(format!("data line {index} contains a line break").into());
        return Err(err);
    }
    Ok(())
}
