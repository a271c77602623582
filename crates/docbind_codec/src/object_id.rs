//! Identifier text form.

use crate::error::{CodecError, CodecResult};
use bson::oid::ObjectId;
use once_cell::sync::Lazy;
use regex::Regex;

/// Textual form accepted for automatic text -> identifier coercion.
static OBJECT_ID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9a-fA-F]{24}$").expect("object id pattern is valid"));

/// Returns true if `text` is exactly 24 hexadecimal characters.
#[must_use]
pub fn is_object_id_hex(text: &str) -> bool {
    OBJECT_ID_PATTERN.is_match(text)
}

/// Parses the 24-character hex form.
///
/// # Errors
///
/// Returns [`CodecError::InvalidObjectId`] if `text` is not 24 hex characters.
pub fn parse_object_id(text: &str) -> CodecResult<ObjectId> {
    if !is_object_id_hex(text) {
        return Err(CodecError::invalid_object_id(text));
    }
    ObjectId::parse_str(text).map_err(|_| CodecError::invalid_object_id(text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parse_and_format() {
        let id = parse_object_id("58f0c0ac235ea70d83e6c672").unwrap();
        assert_eq!(id.to_hex(), "58f0c0ac235ea70d83e6c672");
        assert_eq!(format!("{id}"), "58f0c0ac235ea70d83e6c672");
    }

    #[test]
    fn uppercase_hex_is_accepted() {
        let id = parse_object_id("58F0C0AC235EA70D83E6C672").unwrap();
        assert_eq!(id.to_hex(), "58f0c0ac235ea70d83e6c672");
    }

    #[test]
    fn malformed_text_is_rejected() {
        assert!(parse_object_id("1234adasdas").is_err());
        assert!(parse_object_id("58f0c0ac235ea70d83e6c67z").is_err());
        assert!(parse_object_id("58f0c0ac235ea70d83e6c6721").is_err());
        assert!(!is_object_id_hex(" 58f0c0ac235ea70d83e6c672"));
        assert!(!is_object_id_hex("58f0c0ac235ea70d83e6c672\n"));
    }

    proptest! {
        #[test]
        fn any_24_hex_parses(text in "[0-9a-fA-F]{24}") {
            let id = parse_object_id(&text).unwrap();
            prop_assert_eq!(id.to_hex(), text.to_lowercase());
        }

        #[test]
        fn other_lengths_never_parse(text in "[0-9a-f]{0,23}|[0-9a-f]{25,30}") {
            prop_assert!(!is_object_id_hex(&text));
        }
    }
}
