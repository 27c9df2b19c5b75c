//! Input validation for inbound SMS
//!
//! Phone numbers are normalized to E.164 (`+1XXXXXXXXXX`). Zip codes are plain
//! 5-digit strings; ZIP+4 is not accepted as a zip on its own.

use crate::error::ValidationError;

const ZIP_LEN: usize = 5;

/// Validate and normalize a US phone number to E.164 format
///
/// Accepts `+1XXXXXXXXXX`, `1XXXXXXXXXX`, `XXXXXXXXXX`, `(XXX) XXX-XXXX`,
/// `XXX-XXX-XXXX` and the same shapes separated by dots or spaces.
pub fn validate_phone(phone: &str) -> Result<String, ValidationError> {
    let trimmed = phone.trim().as_bytes();

    // The country code is optional, so a leading 1 may belong to the area code
    let candidates: Vec<&[u8]> = match trimmed {
        [b'+', b'1', rest @ ..] => vec![rest],
        [b'1', rest @ ..] => vec![rest, trimmed],
        _ => vec![trimmed],
    };

    candidates
        .iter()
        .find_map(|candidate| match_national_number(candidate))
        .ok_or(ValidationError::InvalidPhone)
}

/// Match `[sep]? (? NXX )? [sep]? NXX [sep]? XXXX` and return the E.164 form
fn match_national_number(input: &[u8]) -> Option<String> {
    let mut pos = 0;

    skip_separator(input, &mut pos);
    skip_byte(input, &mut pos, b'(');
    let area = take_digits(input, &mut pos, 3)?;
    skip_byte(input, &mut pos, b')');
    skip_separator(input, &mut pos);
    let exchange = take_digits(input, &mut pos, 3)?;
    skip_separator(input, &mut pos);
    let subscriber = take_digits(input, &mut pos, 4)?;

    if pos != input.len() {
        return None;
    }

    Some(format!("+1{}{}{}", area, exchange, subscriber))
}

fn skip_separator(input: &[u8], pos: &mut usize) {
    if matches!(input.get(*pos), Some(b'-' | b'.' | b' ' | b'\t')) {
        *pos += 1;
    }
}

fn skip_byte(input: &[u8], pos: &mut usize, byte: u8) {
    if input.get(*pos) == Some(&byte) {
        *pos += 1;
    }
}

fn take_digits<'a>(input: &'a [u8], pos: &mut usize, count: usize) -> Option<&'a str> {
    let end = pos.checked_add(count)?;
    let slice = input.get(*pos..end)?;
    if !slice.iter().all(u8::is_ascii_digit) {
        return None;
    }
    *pos = end;
    std::str::from_utf8(slice).ok()
}

fn is_zip(candidate: &str) -> bool {
    candidate.len() == ZIP_LEN && candidate.bytes().all(|b| b.is_ascii_digit())
}

/// Validate a 5-digit zip code, returning it trimmed
pub fn validate_zip(zip: &str) -> Result<String, ValidationError> {
    let trimmed = zip.trim();
    if !is_zip(trimmed) {
        return Err(ValidationError::InvalidZip);
    }
    Ok(trimmed.to_string())
}

/// Extract a zip code from an SMS message body
///
/// Handles messages like `"78701"`, `"Sign me up for 78701"` or
/// `"alerts for 78701 please"`. Only a run of exactly five digits counts, so
/// `"1234"` and `"123456"` never match. With several candidates the first wins.
pub fn extract_zip_from_message(body: &str) -> Result<String, ValidationError> {
    let trimmed = body.trim();
    if is_zip(trimmed) {
        return Ok(trimmed.to_string());
    }

    trimmed
        .split(|c: char| !c.is_ascii_digit())
        .find(|run| run.len() == ZIP_LEN)
        .map(str::to_string)
        .ok_or(ValidationError::ZipNotFound)
}
