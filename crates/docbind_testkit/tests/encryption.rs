//! Encrypted field tests.

use docbind_core::{
    doc, Connection, ConnectionConfig, CoreError, Entity, FindOptions, Property, Value,
};
use docbind_testkit::prelude::*;
use std::sync::Arc;

const SECRET: &str = "the quick brown fox";

#[tokio::test]
async fn encrypted_at_rest_and_clear_on_read() {
    let (store, connection) = memory_connection();
    let articles = connection.collection::<Article>();

    let mut article = Article::named("Safe", 40);
    article.record_mut().set("encryptedProperty", SECRET);
    articles.save(&mut article).await.unwrap();

    // The instance keeps its cleartext.
    assert_eq!(article.record().get_str("encryptedProperty"), Some(SECRET));

    let id = article.id().unwrap();
    let stored = store.document("articles", id).unwrap();
    let at_rest = stored.get_str("encryptedProperty").unwrap();
    assert_ne!(at_rest, SECRET);
    assert!(!at_rest.contains("fox"));

    let found = articles
        .find_one(doc! { "_id": id }, FindOptions::default())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.record().get_str("encryptedProperty"), Some(SECRET));
}

#[tokio::test]
async fn equal_cleartexts_encrypt_differently() {
    let (store, connection) = memory_connection();
    let articles = connection.collection::<Article>();

    let mut first = Article::named("First", 40);
    first.record_mut().set("encryptedProperty", SECRET);
    let mut second = Article::named("Second", 40);
    second.record_mut().set("encryptedProperty", SECRET);
    articles.save(&mut first).await.unwrap();
    articles.save(&mut second).await.unwrap();

    let a = store.document("articles", first.id().unwrap()).unwrap();
    let b = store.document("articles", second.id().unwrap()).unwrap();
    assert_ne!(a.get("encryptedProperty"), b.get("encryptedProperty"));
}

#[tokio::test]
async fn cursor_reads_decrypt() {
    let (_store, connection) = memory_connection();
    let articles = connection.collection::<Article>();

    for name in ["Alpha", "Beta"] {
        let mut article = Article::named(name, 40);
        article.record_mut().set("encryptedProperty", format!("{name} secret"));
        articles.save(&mut article).await.unwrap();
    }

    let found = articles
        .find(doc! {}, FindOptions::default())
        .sort(doc! { "name": 1i64 })
        .to_vec()
        .await
        .unwrap();
    let secrets: Vec<&str> = found
        .iter()
        .filter_map(|a| a.record().get_str("encryptedProperty"))
        .collect();
    assert_eq!(secrets, vec!["Alpha secret", "Beta secret"]);
}

#[tokio::test]
async fn wrong_passphrase_fails_to_decrypt() {
    let (store, connection) = memory_connection();
    let mut article = Article::named("Safe", 40);
    article.record_mut().set("encryptedProperty", SECRET);
    connection.collection::<Article>().save(&mut article).await.unwrap();

    let other = Connection::new(
        Arc::new(store.clone()),
        ConnectionConfig::new("mongodb://localhost/test").encryption_key("987654321"),
    );
    let err = other
        .collection::<Article>()
        .find_one(doc! { "_id": article.id().unwrap() }, FindOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, CoreError::DecryptionFailed { .. }));
}

#[tokio::test]
async fn missing_passphrase_rejects_encrypted_values() {
    let (store, connection) =
        memory_connection_with(ConnectionConfig::new("mongodb://localhost/test"));
    let articles = connection.collection::<Article>();

    let mut article = Article::named("Safe", 40);
    article.record_mut().set("encryptedProperty", SECRET);
    let err = articles.save(&mut article).await.unwrap_err();
    assert!(matches!(err, CoreError::EncryptionNotConfigured));
    assert_eq!(store.write_count(), 0);

    // Null encrypted fields need no passphrase.
    let mut plain = Article::named("Plain", 40);
    plain.record_mut().set("encryptedProperty", Property::Null);
    articles.save(&mut plain).await.unwrap();
    let stored = store.document("articles", plain.id().unwrap()).unwrap();
    assert_eq!(stored.get("encryptedProperty"), Some(&Value::Null));
}

#[tokio::test]
async fn encrypted_fields_must_be_text() {
    let (store, connection) = memory_connection();
    let mut article = Article::named("Safe", 40);
    article.record_mut().set("encryptedProperty", 42i64);

    let err = connection
        .collection::<Article>()
        .save(&mut article)
        .await
        .unwrap_err();

    assert!(err.as_validation().is_some());
    assert_eq!(store.write_count(), 0);
}

#[tokio::test]
async fn tampered_ciphertext_fails_to_decrypt() {
    let (store, connection) = memory_connection();
    store.seed(
        "articles",
        doc! { "name": "Tampered", "price": 40i64, "encryptedProperty": "bm90IGEgY2lwaGVydGV4dA==" },
    );

    let err = connection
        .collection::<Article>()
        .find(doc! {}, FindOptions::default())
        .to_vec()
        .await
        .unwrap_err();

    assert!(matches!(err, CoreError::DecryptionFailed { .. }));
}
