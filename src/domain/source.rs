//! Decoding of the base64 diagram source carried in request paths.

use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};

use super::error::ValidationError;

const LENIENT: GeneralPurposeConfig = GeneralPurposeConfig::new()
    .with_encode_padding(false)
    .with_decode_padding_mode(DecodePaddingMode::Indifferent)
    .with_decode_allow_trailing_bits(true);

const STANDARD_LENIENT: GeneralPurpose = GeneralPurpose::new(&alphabet::STANDARD, LENIENT);
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(&alphabet::URL_SAFE, LENIENT);

/// Decode an encoded diagram source.
///
/// Accepts the standard and URL-safe alphabets with or without padding. Invalid
/// UTF-8 sequences are replaced rather than rejected.
pub fn decode_source(encoded: &str) -> Result<String, ValidationError> {
    let trimmed = encoded.trim();
    if trimmed.is_empty() {
        return Err(invalid_code());
    }

    let bytes = STANDARD_LENIENT
        .decode(trimmed)
        .or_else(|_| URL_SAFE_LENIENT.decode(trimmed))
        .map_err(|_| invalid_code())?;

    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn invalid_code() -> ValidationError {
    ValidationError::new("code", "invalid encoded code")
}
