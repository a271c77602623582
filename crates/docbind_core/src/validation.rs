//! Schema validation of storage documents.
//!
//! Validation runs once per save, against the storage document, before any
//! encryption or store call. The first violation is returned.

use crate::error::ValidationError;
use crate::schema::Schema;
use docbind_codec::{is_object_id_hex, DateTimeExt, Document, Value, ValueExt};
use once_cell::sync::Lazy;
use regex::Regex;

/// Maximum length of a whole e-mail address.
pub const MAX_EMAIL_LENGTH: usize = 256;

/// Maximum length of the local part and of each domain label.
pub const MAX_EMAIL_PART_LENGTH: usize = 64;

static EMAIL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^[-!#$%&'*+/0-9=?A-Z^_a-z{|}~](\.?[-!#$%&'*+/0-9=?A-Z^_a-z`{|}~])*@[a-zA-Z0-9](-*\.?[a-zA-Z0-9])*\.[a-zA-Z](-?[a-zA-Z0-9])+$",
    )
    .expect("email pattern is valid")
});

/// Checks `doc` against `schema`.
///
/// Order: required, number, text, boolean, identifier, email, date. Only
/// keys present in the document are type-checked; `Null` counts as present
/// for the required check and fails every type check.
pub fn validate(doc: &Document, schema: &Schema) -> Result<(), ValidationError> {
    for field in schema.required_fields() {
        if !doc.contains_key(field) {
            return Err(ValidationError::required(field));
        }
    }

    for (field, rule) in schema.number_fields() {
        let Some(value) = doc.get(field) else { continue };
        let number = value
            .as_number()
            .ok_or_else(|| ValidationError::invalid_type("Number", field))?;
        if let Some(min) = rule.min.filter(|min| number < *min) {
            return Err(ValidationError::NumberOutOfRange {
                value: number,
                min: Some(min),
                max: None,
            });
        }
        if let Some(max) = rule.max.filter(|max| number > *max) {
            return Err(ValidationError::NumberOutOfRange {
                value: number,
                min: None,
                max: Some(max),
            });
        }
    }

    for (field, rule) in schema.text_fields() {
        let Some(value) = doc.get(field) else { continue };
        let text = value
            .as_str()
            .ok_or_else(|| ValidationError::invalid_type("String", field))?;
        if let Some(pattern) = rule.pattern.as_ref().filter(|p| !p.is_match(text)) {
            return Err(ValidationError::StringPatternMismatch {
                value: text.to_string(),
                pattern: pattern.as_str().to_string(),
            });
        }
    }

    for field in schema.boolean_fields() {
        match doc.get(field) {
            None | Some(Value::Boolean(_)) => {}
            Some(_) => return Err(ValidationError::invalid_type("Boolean", field)),
        }
    }

    for field in schema.identifier_fields() {
        match doc.get(field) {
            None | Some(Value::ObjectId(_)) => {}
            Some(Value::String(text)) if is_object_id_hex(text) => {}
            Some(_) => return Err(ValidationError::invalid_type("ObjectId", field)),
        }
    }

    for field in schema.email_fields() {
        let Some(value) = doc.get(field) else { continue };
        if !value.as_str().is_some_and(is_email) {
            return Err(ValidationError::invalid_type("Email", field));
        }
    }

    for (field, rule) in schema.date_fields() {
        let Some(value) = doc.get(field) else { continue };
        let date = value
            .as_datetime()
            .copied()
            .filter(DateTimeExt::is_calendar_valid)
            .ok_or_else(|| ValidationError::invalid_type("Date", field))?;
        if let Some(min) = rule.min.filter(|min| date < *min) {
            return Err(ValidationError::DateOutOfRange {
                value: date,
                min: Some(min),
                max: None,
            });
        }
        if let Some(max) = rule.max.filter(|max| date > *max) {
            return Err(ValidationError::DateOutOfRange {
                value: date,
                min: None,
                max: Some(max),
            });
        }
    }

    Ok(())
}

/// Whether `text` is an acceptable e-mail address.
pub fn is_email(text: &str) -> bool {
    if text.len() > MAX_EMAIL_LENGTH || !EMAIL_PATTERN.is_match(text) {
        return false;
    }
    let Some((local, domain)) = text.split_once('@') else {
        return false;
    };
    local.len() <= MAX_EMAIL_PART_LENGTH
        && domain.split('.').all(|label| label.len() <= MAX_EMAIL_PART_LENGTH)
}

/// Injects schema defaults into a storage document.
///
/// Text defaults apply when the key is absent, null or empty; number and
/// date defaults only when the key is absent.
pub fn apply_defaults(doc: &mut Document, schema: &Schema) {
    for (field, rule) in schema.text_fields() {
        let Some(default) = &rule.default else { continue };
        let missing = match doc.get(field) {
            None | Some(Value::Null) => true,
            Some(Value::String(text)) => text.is_empty(),
            Some(_) => false,
        };
        if missing {
            doc.insert(field, default.as_str());
        }
    }

    for (field, rule) in schema.number_fields() {
        if let Some(default) = rule.default.as_ref().filter(|_| !doc.contains_key(field)) {
            doc.insert(field, default.clone());
        }
    }

    for (field, rule) in schema.date_fields() {
        if let Some(default) = rule.default.filter(|_| !doc.contains_key(field)) {
            doc.insert(field, default);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationKind;
    use crate::schema::{DateRule, NumberRule, TextRule};
    use docbind_codec::{date_from_ymd, doc, DateTime, ObjectId};

    fn price_schema() -> Schema {
        Schema::builder("articles")
            .number("price", NumberRule::new().min(10.0).max(100.0))
            .build()
    }

    #[test]
    fn required_counts_null_as_present() {
        let schema = Schema::builder("t").required("name").build();
        let err = validate(&doc! { "other": 1i64 }, &schema).unwrap_err();
        assert_eq!(err, ValidationError::required("name"));
        assert!(validate(&doc! { "name": Value::Null }, &schema).is_ok());
    }

    #[test]
    fn number_bounds() {
        let schema = price_schema();

        let low = validate(&doc! { "price": 9i64 }, &schema).unwrap_err();
        assert_eq!(
            low,
            ValidationError::NumberOutOfRange { value: 9.0, min: Some(10.0), max: None }
        );

        let high = validate(&doc! { "price": 101.0 }, &schema).unwrap_err();
        assert_eq!(
            high,
            ValidationError::NumberOutOfRange { value: 101.0, min: None, max: Some(100.0) }
        );

        assert!(validate(&doc! { "price": 50i64 }, &schema).is_ok());
        assert!(validate(&doc! { "price": 10i64 }, &schema).is_ok());
        assert!(validate(&doc! { "price": 100.0 }, &schema).is_ok());
    }

    #[test]
    fn one_sided_bounds() {
        let schema = Schema::builder("t")
            .number("qty", NumberRule::new().min(0.0))
            .build();
        assert!(validate(&doc! { "qty": 1_000_000i64 }, &schema).is_ok());
        assert!(validate(&doc! { "qty": -1i64 }, &schema).is_err());
    }

    #[test]
    fn number_type() {
        let err = validate(&doc! { "price": "12" }, &price_schema()).unwrap_err();
        assert_eq!(err, ValidationError::invalid_type("Number", "price"));
        assert_eq!(err.kind(), ValidationKind::Type);
    }

    #[test]
    fn absent_fields_are_not_type_checked() {
        assert!(validate(&doc! {}, &price_schema()).is_ok());
    }

    #[test]
    fn text_pattern() {
        let schema = Schema::builder("t")
            .text("name", TextRule::new().pattern(Regex::new("^[^0-9]+$").unwrap()))
            .build();

        assert!(validate(&doc! { "name": "Hammer" }, &schema).is_ok());
        let err = validate(&doc! { "name": "Hammer 2" }, &schema).unwrap_err();
        assert_eq!(err.kind(), ValidationKind::Pattern);
        assert_eq!(
            err.to_string(),
            "provided value 'Hammer 2' is not matching pattern /^[^0-9]+$/"
        );

        let err = validate(&doc! { "name": Value::Null }, &schema).unwrap_err();
        assert_eq!(err, ValidationError::invalid_type("String", "name"));
    }

    #[test]
    fn boolean_and_identifier() {
        let schema = Schema::builder("t").boolean("active").identifier("ref").build();

        assert!(validate(&doc! { "active": true, "ref": ObjectId::new() }, &schema).is_ok());
        assert!(validate(&doc! { "ref": "58f0c0ac235ea70d83e6c672" }, &schema).is_ok());
        assert_eq!(
            validate(&doc! { "active": "yes" }, &schema).unwrap_err(),
            ValidationError::invalid_type("Boolean", "active")
        );
        assert_eq!(
            validate(&doc! { "ref": "58f0c0ac" }, &schema).unwrap_err(),
            ValidationError::invalid_type("ObjectId", "ref")
        );
    }

    #[test]
    fn email_addresses() {
        assert!(is_email("test@test.com"));
        assert!(is_email("first.last+tag@mail.example.org"));
        assert!(!is_email("test@test"));
        assert!(!is_email("test.test.com"));
        assert!(!is_email(".test@test.com"));
        assert!(!is_email(&format!("{}@test.com", "a".repeat(65))));
        assert!(!is_email(&format!("a@{}.com", "b".repeat(65))));
        assert!(!is_email(&format!("a@{}.com", "b.".repeat(130))));

        let schema = Schema::builder("t").email("email").build();
        assert_eq!(
            validate(&doc! { "email": 5i64 }, &schema).unwrap_err(),
            ValidationError::invalid_type("Email", "email")
        );
    }

    #[test]
    fn backtick_only_after_the_first_character() {
        assert!(!is_email("`ab@test.com"));
        assert!(is_email("a`b@test.com"));
        assert!(is_email("a.`b@test.com"));

        let schema = Schema::builder("t").email("email").build();
        assert_eq!(
            validate(&doc! { "email": "`ab@test.com" }, &schema).unwrap_err(),
            ValidationError::invalid_type("Email", "email")
        );
    }

    #[test]
    fn date_bounds() {
        let min = date_from_ymd(1990, 1, 1).unwrap();
        let max = date_from_ymd(2010, 12, 31).unwrap();
        let schema = Schema::builder("t")
            .date("born", DateRule::new().min(min).max(max))
            .build();

        let inside = date_from_ymd(2000, 6, 15).unwrap();
        assert!(validate(&doc! { "born": inside }, &schema).is_ok());

        let early = date_from_ymd(1980, 1, 1).unwrap();
        assert_eq!(
            validate(&doc! { "born": early }, &schema).unwrap_err(),
            ValidationError::DateOutOfRange { value: early, min: Some(min), max: None }
        );

        let late = date_from_ymd(2020, 1, 1).unwrap();
        assert_eq!(
            validate(&doc! { "born": late }, &schema).unwrap_err(),
            ValidationError::DateOutOfRange { value: late, min: None, max: Some(max) }
        );

        let invalid = DateTime::from_millis(i64::MAX);
        assert_eq!(
            validate(&doc! { "born": invalid }, &schema).unwrap_err(),
            ValidationError::invalid_type("Date", "born")
        );
    }

    #[test]
    fn first_failure_wins() {
        let schema = Schema::builder("t")
            .required("name")
            .number("price", NumberRule::new().min(10.0))
            .build();
        let err = validate(&doc! { "price": 1i64 }, &schema).unwrap_err();
        assert_eq!(err.kind(), ValidationKind::Required);
    }

    #[test]
    fn defaults() {
        let when = date_from_ymd(2000, 1, 1).unwrap();
        let schema = Schema::builder("t")
            .text("nickname", TextRule::new().default_value("test"))
            .number("height", NumberRule::new().default_value(0i64))
            .date("joined", DateRule::new().default_value(when))
            .build();

        let mut empty = doc! {};
        apply_defaults(&mut empty, &schema);
        assert_eq!(empty.get_str("nickname").ok(), Some("test"));
        assert_eq!(empty.get("height"), Some(&Value::Int64(0)));
        assert_eq!(empty.get("joined"), Some(&Value::DateTime(when)));

        let mut blank = doc! { "nickname": "", "height": Value::Null };
        apply_defaults(&mut blank, &schema);
        assert_eq!(blank.get_str("nickname").ok(), Some("test"));
        assert_eq!(blank.get("height"), Some(&Value::Null));

        let mut set = doc! { "nickname": "bob" };
        apply_defaults(&mut set, &schema);
        assert_eq!(set.get_str("nickname").ok(), Some("bob"));
    }
}
