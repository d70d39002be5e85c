use service_core::error::AppError;

/// Validate an E.164-style phone number (+ prefix, 8-15 digits).
pub fn validate_phone_number(phone: &str) -> Result<(), AppError> {
    let digits = phone.strip_prefix('+').unwrap_or("");
    if digits.len() < 8 || digits.len() > 15 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(AppError::ValidationError(
            "Invalid phone format. Use E.164 format (+4512345678)".to_string(),
        ));
    }
    Ok(())
}
