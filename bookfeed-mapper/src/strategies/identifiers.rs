//! ISBN helpers shared by the computed rules and the validator

use super::{prerequisite_text, ComputationError};
use crate::record::MetadataRecord;
use crate::types::FieldValue;

/// Strip hyphens, spaces and prefixes, keeping digits and a trailing X
pub fn normalize_isbn(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_digit() || *c == 'X' || *c == 'x')
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// ISBN-13 check digit for the first twelve digits
pub fn isbn13_check_digit(first12: &str) -> Option<u32> {
    if first12.len() != 12 {
        return None;
    }
    let mut sum = 0;
    for (i, c) in first12.chars().enumerate() {
        let digit = c.to_digit(10)?;
        sum += if i % 2 == 0 { digit } else { digit * 3 };
    }
    Some((10 - sum % 10) % 10)
}

pub fn is_valid_isbn13(isbn: &str) -> bool {
    isbn.len() == 13
        && isbn.is_ascii()
        && isbn13_check_digit(&isbn[..12])
            .zip(isbn[12..].chars().next().and_then(|c| c.to_digit(10)))
            .is_some_and(|(expected, actual)| expected == actual)
}

/// ISBN-10 check character for the first nine digits
pub fn isbn10_check_char(first9: &str) -> Option<char> {
    if first9.len() != 9 {
        return None;
    }
    let mut sum = 0;
    for (i, c) in first9.chars().enumerate() {
        sum += c.to_digit(10)? * (10 - i as u32);
    }
    let check = (11 - sum % 11) % 11;
    Some(if check == 10 {
        'X'
    } else {
        char::from_digit(check, 10)?
    })
}

pub fn is_valid_isbn10(isbn: &str) -> bool {
    isbn.len() == 10
        && isbn.is_ascii()
        && isbn10_check_char(&isbn[..9]).is_some_and(|c| isbn[9..].starts_with(c))
}

/// Convert a 978-prefixed ISBN-13 to ISBN-10
pub fn isbn13_to_isbn10(isbn13: &str) -> Option<String> {
    if !is_valid_isbn13(isbn13) || !isbn13.starts_with("978") {
        return None;
    }
    let core = &isbn13[3..12];
    Some(format!("{}{}", core, isbn10_check_char(core)?))
}

/// Convert an ISBN-10 to its 978-prefixed ISBN-13
pub fn isbn10_to_isbn13(isbn10: &str) -> Option<String> {
    if !is_valid_isbn10(isbn10) {
        return None;
    }
    let first12 = format!("978{}", &isbn10[..9]);
    let check = isbn13_check_digit(&first12)?;
    Some(format!("{}{}", first12, check))
}

pub fn isbn_10(record: &MetadataRecord) -> Result<FieldValue, ComputationError> {
    let raw = prerequisite_text(record, "isbn")?;
    isbn13_to_isbn10(&normalize_isbn(&raw))
        .map(FieldValue::Text)
        .ok_or_else(|| ComputationError::InvalidPrerequisite {
            field: "isbn".to_string(),
            reason: format!("'{}' has no ISBN-10 form", raw),
        })
}
