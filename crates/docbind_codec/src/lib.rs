//! # docbind Codec
//!
//! Document value model for docbind, built on [`bson`].
//!
//! Stored documents are plain [`bson::Document`]s and values are [`bson::Bson`]
//! (aliased here as [`Value`]). This crate only adds what the mapper needs on
//! top of them:
//! - [`is_object_id_hex`] / [`parse_object_id`]: the strict 24-hex text form
//!   that triggers text -> identifier coercion on read
//! - [`DateTimeExt`] and [`date_from_ymd`]: calendar validity and the
//!   millisecond RFC 3339 form
//! - [`ValueExt`] / [`DocumentExt`]: numeric widening, diagnostic type names
//!   and the external JSON rendering
//!
//! ## Usage
//!
//! ```
//! use docbind_codec::{doc, parse_object_id, Value};
//!
//! let id = parse_object_id("58f0c0ac235ea70d83e6c672").unwrap();
//! let d = doc! { "_id": id, "name": "Alice" };
//! assert_eq!(d.get_object_id("_id").ok(), Some(id));
//! assert_eq!(d.get("name"), Some(&Value::String("Alice".into())));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod datetime;
mod error;
mod object_id;
mod value;

pub use bson;
pub use bson::oid::ObjectId;
pub use bson::{doc, Binary, DateTime, Document};

pub use datetime::{date_from_ymd, DateTimeExt};
pub use error::{CodecError, CodecResult};
pub use object_id::{is_object_id_hex, parse_object_id};
pub use value::{binary, DocumentExt, ValueExt};

/// A value stored in a document.
pub type Value = bson::Bson;
