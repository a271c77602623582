//! Save lifecycle tests.

use docbind_core::{
    doc, Connection, ConnectionConfig, CoreError, Entity, EventKind, FindOptions, ObjectId,
    Property, Record, StoreError, ValidationError, ValidationKind, Value,
};
use docbind_testkit::prelude::*;
use std::sync::Arc;

#[tokio::test]
async fn saved_entity_reads_back_equal() {
    let (_store, connection) = memory_connection();
    let articles = connection.collection::<Article>();

    let mut article = Article::named("Hammer", 20);
    article.record_mut().set("description", "A heavy hammer");
    article.record_mut().set("stock", 3.5);
    article.record_mut().set("active", true);
    article
        .record_mut()
        .set("numberArray", vec![Property::from(1i64), Property::from(2i64)]);
    articles.save(&mut article).await.unwrap();

    let id = article.id().expect("insert assigns an identifier");
    let found = articles
        .find_one(doc! { "_id": id }, FindOptions::default())
        .await
        .unwrap()
        .expect("saved article is found");

    assert_eq!(found.id(), Some(id));
    for field in ["name", "price", "description", "stock", "active", "numberArray"] {
        assert_eq!(found.record().get(field), article.record().get(field), "{field}");
    }
}

#[tokio::test]
async fn insert_then_replace() {
    let (store, connection) = memory_connection();
    let articles = connection.collection::<Article>();

    let mut article = Article::named("Hammer", 20);
    articles.save(&mut article).await.unwrap();
    let id = article.id().unwrap();

    article.record_mut().set("price", 25i64);
    articles.save(&mut article).await.unwrap();

    let operations: Vec<&str> = store.writes().iter().map(|w| w.operation).collect();
    assert_eq!(operations, vec!["insert_one", "replace_one"]);
    assert_eq!(article.id(), Some(id));

    let stored = store.document("articles", id).unwrap();
    assert_eq!(stored.get("price"), Some(&Value::Int64(25)));
    assert_eq!(store.documents("articles").len(), 1);

    let kinds: Vec<EventKind> = connection.events().history().iter().map(|e| e.kind).collect();
    assert_eq!(kinds, vec![EventKind::Insert, EventKind::Update]);
    assert!(connection
        .events()
        .history()
        .iter()
        .all(|e| e.collection == "articles"));
}

#[tokio::test]
async fn caller_assigned_identifier_is_upserted() {
    let (store, connection) = memory_connection();
    let id = ObjectId::new();

    let mut article = Article::named("Saw", 30);
    article.record_mut().set_id(id);
    connection.collection::<Article>().save(&mut article).await.unwrap();

    assert_eq!(store.writes()[0].operation, "replace_one");
    assert!(store.document("articles", id).is_some());
}

#[tokio::test]
async fn missing_required_field_never_reaches_the_store() {
    let (store, connection) = memory_connection();
    let mut article = Article::new();
    article.record_mut().set("price", 20i64);

    let err = connection
        .collection::<Article>()
        .save(&mut article)
        .await
        .unwrap_err();

    assert_eq!(err.as_validation(), Some(&ValidationError::required("name")));
    assert_eq!(store.write_count(), 0);
    assert!(!article.record().has_id());
    assert_eq!(connection.events().history_len(), 0);
}

#[tokio::test]
async fn price_bounds() {
    let (store, connection) = memory_connection();
    let articles = connection.collection::<Article>();

    let mut cheap = Article::named("Nail", 9);
    let err = articles.save(&mut cheap).await.unwrap_err();
    assert_eq!(
        err.as_validation(),
        Some(&ValidationError::NumberOutOfRange {
            value: 9.0,
            min: Some(10.0),
            max: None,
        })
    );

    let mut pricey = Article::named("Anvil", 101);
    let err = articles.save(&mut pricey).await.unwrap_err();
    assert_eq!(
        err.as_validation(),
        Some(&ValidationError::NumberOutOfRange {
            value: 101.0,
            min: None,
            max: Some(100.0),
        })
    );

    assert_eq!(store.write_count(), 0);

    let mut fair = Article::named("Hammer", 50);
    articles.save(&mut fair).await.unwrap();
    assert_eq!(store.write_count(), 1);
}

#[tokio::test]
async fn name_pattern_and_boolean_type() {
    let (store, connection) = memory_connection();
    let articles = connection.collection::<Article>();

    let mut numbered = Article::named("Hammer 2000", 20);
    let err = articles.save(&mut numbered).await.unwrap_err();
    assert_eq!(err.as_validation().map(ValidationError::kind), Some(ValidationKind::Pattern));

    let mut flagged = Article::named("Hammer", 20);
    flagged.record_mut().set("active", "yes");
    let err = articles.save(&mut flagged).await.unwrap_err();
    assert_eq!(
        err.as_validation(),
        Some(&ValidationError::invalid_type("Boolean", "active"))
    );

    assert_eq!(store.write_count(), 0);
}

#[tokio::test]
async fn email_addresses_are_checked() {
    let (store, connection) = memory_connection();
    let customers = connection.collection::<Customer>();

    let mut invalid = Customer::with_email("test@test");
    let err = customers.save(&mut invalid).await.unwrap_err();
    assert_eq!(
        err.as_validation(),
        Some(&ValidationError::invalid_type("Email", "email"))
    );
    assert_eq!(store.write_count(), 0);

    let mut valid = Customer::with_email("test@test.com");
    customers.save(&mut valid).await.unwrap();
    assert!(valid.id().is_some());
}

#[tokio::test]
async fn birth_date_bounds() {
    let (_store, connection) = memory_connection();
    let customers = connection.collection::<Customer>();

    let mut young = Customer::with_email("young@test.com");
    young
        .record_mut()
        .set("birth_date", docbind_core::date_from_ymd(2015, 5, 1).unwrap());
    let err = customers.save(&mut young).await.unwrap_err();
    assert!(matches!(
        err.as_validation(),
        Some(ValidationError::DateOutOfRange { max: Some(_), min: None, .. })
    ));

    let mut fine = Customer::with_email("fine@test.com");
    fine.record_mut()
        .set("birth_date", docbind_core::date_from_ymd(2000, 5, 1).unwrap());
    customers.save(&mut fine).await.unwrap();
}

#[tokio::test]
async fn dotted_keys_never_reach_the_store() {
    let (store, connection) = memory_connection();

    let mut attributes = Record::untyped();
    attributes.set("test.key", 123i64);
    let mut article = Article::named("Hammer", 20);
    article.record_mut().set("attributes", Property::Map(attributes));

    let err = connection
        .collection::<Article>()
        .save(&mut article)
        .await
        .unwrap_err();

    assert!(matches!(err, CoreError::InvalidDocumentKey { ref key } if key == "test.key"));
    assert_eq!(store.write_count(), 0);
}

#[tokio::test]
async fn defaults_are_written_but_not_applied_to_the_instance() {
    let (store, connection) = memory_connection();
    let mut customer = Customer::with_email("test@test.com");
    customer.record_mut().set("nickname", "");

    connection.collection::<Customer>().save(&mut customer).await.unwrap();

    let stored = store.document("customers", customer.id().unwrap()).unwrap();
    assert_eq!(stored.get_str("nickname").ok(), Some("test"));
    assert_eq!(stored.get("height"), Some(&Value::Int64(0)));
    assert_eq!(customer.record().get_str("nickname"), Some(""));
    assert!(customer.record().get("height").is_none());
}

#[tokio::test]
async fn hidden_fields_are_stored_but_not_exposed() {
    let (store, connection) = memory_connection();

    let mut payment = Record::untyped();
    payment.set("creditCard", 4111i64);
    payment.set("cvc", 123i64);
    let mut order = Order::new();
    order.record_mut().set("number", "A-1");
    order.record_mut().set("paymentDetails", Property::Map(payment));
    order.record_mut().set("__draft", true);

    connection.collection::<Order>().save(&mut order).await.unwrap();

    let stored = store.document("orders", order.id().unwrap()).unwrap();
    assert!(stored.contains_key("paymentDetails"));
    assert!(!stored.contains_key("__draft"));

    let external = order.to_object(false);
    assert!(!external.contains_key("paymentDetails"));
    assert_eq!(external.get_str("number").ok(), Some("A-1"));
    assert!(order.to_json(false).get("paymentDetails").is_none());
}

#[tokio::test]
async fn update_timestamp_is_stamped() {
    let (store, connection) = memory_connection();
    let mut order = Order::new();
    let before = order.record().get_datetime("updated").unwrap();

    connection.collection::<Order>().save(&mut order).await.unwrap();

    let stored = store.document("orders", order.id().unwrap()).unwrap();
    let Some(Value::DateTime(updated)) = stored.get("updated") else {
        panic!("updated is a timestamp");
    };
    assert!(*updated >= before);
}

#[tokio::test]
async fn failed_insert_leaves_the_identifier_untouched() {
    let (store, connection) = memory_connection();
    store.fail_writes(true);

    let mut article = Article::named("Hammer", 20);
    let err = connection
        .collection::<Article>()
        .save(&mut article)
        .await
        .unwrap_err();

    assert!(matches!(err, CoreError::Store(StoreError::Operation(_))));
    assert!(!article.record().has_id());
    assert_eq!(store.write_count(), 1);
    assert!(connection.events().history_of(EventKind::Insert).is_empty());
}

#[tokio::test]
async fn event_handlers_see_saves() {
    let (_store, connection) = memory_connection();
    let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    connection.events().on(EventKind::Insert, move |event| {
        sink.lock().push(event.collection.clone());
    });
    let receiver = connection.events().subscribe();

    let mut customer = Customer::with_email("test@test.com");
    connection.collection::<Customer>().save(&mut customer).await.unwrap();

    assert_eq!(*seen.lock(), vec!["customers".to_string()]);
    let event = receiver.try_recv().unwrap();
    assert_eq!(event.kind, EventKind::Insert);
}

#[tokio::test]
async fn open_and_close() {
    init_tracing();
    let store = MemoryStore::new();
    let connector = MemoryConnector::new(store.clone());

    let err = Connection::open(&connector, ConnectionConfig::new("postgres://nope"))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Store(StoreError::Connection(_))));

    let config = ConnectionConfig::from_parts("localhost", "admin", "secret", "shop");
    let connection = Connection::open(&connector, config).await.unwrap();
    assert!(connection.cipher().is_none());

    connection.close().await.unwrap();
    connection.close().await.unwrap();
    assert!(store.is_closed());
    assert!(!connection.is_open());

    let mut customer = Customer::with_email("test@test.com");
    let err = connection
        .collection::<Customer>()
        .save(&mut customer)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Store(StoreError::Closed)));
}

#[tokio::test]
async fn failed_close_keeps_the_connection_usable() {
    let (store, connection) = memory_connection();
    store.fail_close(true);

    let err = connection.close().await.unwrap_err();
    assert!(matches!(err, CoreError::Store(StoreError::Operation(_))));
    assert!(connection.is_open());
    assert!(!store.is_closed());

    let mut customer = Customer::with_email("test@test.com");
    connection.collection::<Customer>().save(&mut customer).await.unwrap();

    store.fail_close(false);
    connection.close().await.unwrap();
    assert!(!connection.is_open());
    assert!(store.is_closed());
}
