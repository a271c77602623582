//! Fixture entities.
//!
//! A small shop: customers place orders of articles. Together the schemas
//! exercise every field kind, hidden and ignored properties, a relation,
//! embedded items and a custom type.

use docbind_codec::{DateTime, ObjectId};
use docbind_core::{
    entity, CustomType, DateRule, Entity, NumberRule, Property, Relation, Schema, TextRule,
};
use once_cell::sync::Lazy;
use regex::Regex;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Schema of [`Customer`].
pub static CUSTOMER_SCHEMA: Lazy<Schema> = Lazy::new(|| {
    Schema::builder("customers")
        .email("email")
        .date(
            "birth_date",
            DateRule::new()
                .min(DateTime::from_millis(631_152_000_000)) // 1990-01-01
                .max(DateTime::from_millis(1_293_753_600_000)), // 2010-12-31
        )
        .text("nickname", TextRule::new().default_value("test"))
        .number("height", NumberRule::new().default_value(0i64))
        .build()
});

entity! {
    /// A customer placing orders.
    pub struct Customer => CUSTOMER_SCHEMA;
}

impl Customer {
    /// A customer with an e-mail address.
    pub fn with_email(email: &str) -> Self {
        let mut customer = Self::new();
        customer.record_mut().set("email", email);
        customer
    }
}

/// Schema of [`Article`].
pub static ARTICLE_SCHEMA: Lazy<Schema> = Lazy::new(|| {
    Schema::builder("articles")
        .required("name")
        .text(
            "name",
            TextRule::new().pattern(Regex::new("^[^0-9]+$").expect("article name pattern")),
        )
        .number("price", NumberRule::new().min(10.0).max(100.0))
        .encrypted("encryptedProperty")
        .custom_type("customType", Bytes32::decode)
        .boolean("active")
        .build()
});

entity! {
    /// An article that can be ordered.
    pub struct Article => ARTICLE_SCHEMA;
}

impl Article {
    /// An article with a name and a price.
    pub fn named(name: &str, price: i64) -> Self {
        let mut article = Self::new();
        article.record_mut().set("name", name);
        article.record_mut().set("price", price);
        article
    }
}

/// Schema of [`Item`], an order line embedded in [`Order`].
pub static ITEM_SCHEMA: Lazy<Schema> =
    Lazy::new(|| Schema::builder("").ignored("_article").build());

entity! {
    /// An order line.
    pub struct Item => ITEM_SCHEMA;
}

impl Item {
    /// An order line for `amount` units of an article.
    pub fn new_line(article_id: ObjectId, amount: i64) -> Self {
        let mut item = Self::new();
        item.record_mut().set_id(ObjectId::new());
        item.record_mut().set("article_id", article_id);
        item.record_mut().set("amount", amount);
        item
    }
}

/// Schema of [`Order`].
pub static ORDER_SCHEMA: Lazy<Schema> = Lazy::new(|| {
    Schema::builder("orders")
        .embedded::<Item>("items")
        .identifier("customer_id")
        .hidden("paymentDetails")
        .relation(Relation::one::<Customer>("customer", "customers", "customer_id"))
        .relation(Relation::many::<Article>("articles", "articles", "article_ids"))
        .update_on_save("updated")
        .build()
});

entity! {
    /// An order of a customer.
    pub struct Order => ORDER_SCHEMA; custom_default
}

impl Default for Order {
    fn default() -> Self {
        let now = DateTime::now();
        let mut record = docbind_core::Record::new(&ORDER_SCHEMA);
        record.set("items", Vec::<Property>::new());
        record.set("created", now);
        record.set("updated", now);
        Self::from_record(record)
    }
}

impl Order {
    /// Appends an order line.
    pub fn push_item(&mut self, item: Item) {
        let record = self.record_mut();
        let mut items = record
            .get("items")
            .and_then(Property::as_array)
            .map(<[Property]>::to_vec)
            .unwrap_or_default();
        items.push(Property::Entity(item.into_record()));
        record.set("items", items);
    }
}

/// Schema of [`AutoOrder`]: orders whose customer is populated on read.
pub static AUTO_ORDER_SCHEMA: Lazy<Schema> = Lazy::new(|| {
    Schema::builder("orders")
        .relation(Relation::one::<Customer>("customer", "customers", "customer_id"))
        .relation(Relation::many::<Article>("articles", "articles", "article_ids"))
        .auto_populate(true)
        .build()
});

entity! {
    /// An order read with its relations populated.
    pub struct AutoOrder => AUTO_ORDER_SCHEMA;
}

/// A 32-byte value stored as 64 hex characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bytes32([u8; 32]);

impl Bytes32 {
    /// Wraps raw bytes.
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Raw bytes.
    pub const fn bytes(&self) -> [u8; 32] {
        self.0
    }

    /// Decoder registered for `customType` fields.
    pub fn decode(text: &str) -> Result<Arc<dyn CustomType>, String> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(text, &mut bytes).map_err(|e| e.to_string())?;
        Ok(Arc::new(Self(bytes)))
    }
}

impl fmt::Display for Bytes32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl CustomType for Bytes32 {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn customer_date_bounds() {
        let rule = CUSTOMER_SCHEMA.date_fields().next().unwrap().1;
        assert_eq!(rule.min, Some(docbind_codec::date_from_ymd(1990, 1, 1).unwrap()));
        assert_eq!(rule.max, Some(docbind_codec::date_from_ymd(2010, 12, 31).unwrap()));
    }

    #[test]
    fn order_defaults() {
        let order = Order::new();
        assert_eq!(
            order.record().get("items").and_then(Property::as_array).map(<[Property]>::len),
            Some(0)
        );
        assert!(order.record().get_datetime("created").is_some());
        assert!(!order.record().has_id());
    }

    #[test]
    fn bytes32_text_form() {
        let text = "ab".repeat(32);
        let decoded = Bytes32::decode(&text).unwrap();
        assert_eq!(decoded.to_string(), text);
        assert!(Bytes32::decode("abc").is_err());
    }
}
