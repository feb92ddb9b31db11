//! Backend-agnostic scenarios. Run with a live store:
//!
//! DATABASE_URL=postgres://... cargo test -p datanest -- --ignored
//! MONGODB_URL=mongodb://... cargo test -p datanest -- --ignored

use datanest::{
    Backend, BackendKind, ConnectionKind, DataConfig, FieldSpec, FieldType, FindOptions, Model,
    Predicate, Record, SchemaDef,
};
use serde_json::{json, Value};

fn record(value: Value) -> Record {
    value.as_object().cloned().expect("fixture must be an object")
}

fn accounts() -> SchemaDef {
    SchemaDef::new()
        .field("username", FieldSpec::string().required())
        .field("isactive", FieldSpec::new(FieldType::Boolean).default_value(true))
        .field("data", FieldSpec::new(FieldType::SmartObject))
}

fn backend(kind: BackendKind, var: &str) -> Backend {
    let url = std::env::var(var).unwrap_or_else(|_| panic!("{} required", var));
    Backend::from_config(&DataConfig {
        backend: kind,
        url: Some(url),
        database: Some("datanest_it".to_string()),
        ..DataConfig::default()
    })
}

async fn fresh(backend: &Backend, name: &str) -> Model {
    let model = backend
        .declare(ConnectionKind::Pool, name, &accounts())
        .await
        .expect("declare failed");
    model.remove(&Predicate::All).await.expect("cleanup failed");
    model
}

async fn scenario(backend: Backend) {
    let model = fresh(&backend, "e2e_accounts").await;

    let stored = model.add(record(json!({ "username": "alice" }))).await.unwrap();
    assert_eq!(stored["username"], json!("alice"));
    assert_eq!(stored["isactive"], json!(true));
    let id = stored["_id"].as_str().unwrap().to_string();

    let found = model
        .find_one(&Predicate::eq("username", "alice"), &FindOptions::new())
        .await
        .unwrap()
        .expect("alice should be found");
    assert_eq!(found["_id"], json!(id));

    assert_eq!(model.remove_by_id(&id).await.unwrap(), 1);
    assert!(model.find_by_id(&id).await.unwrap().is_none());
}

async fn partial_updates(backend: Backend) {
    let model = fresh(&backend, "e2e_updates").await;

    let stored = model
        .add(record(json!({ "username": "bob", "data": { "a": 1 } })))
        .await
        .unwrap();
    let id = stored["_id"].as_str().unwrap().to_string();

    // username is required on insert only
    let updated = model
        .update_by_id(&id, record(json!({ "isactive": false })))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated["isactive"], json!(false));

    let merged = model
        .update_by_id(&id, record(json!({ "data": { "b": 2 } })))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(merged["data"], json!({ "a": 1, "b": 2 }));
}

async fn rejected_insert_writes_nothing(backend: Backend) {
    let model = fresh(&backend, "e2e_rejected").await;
    let before = model.count(&Predicate::All).await.unwrap();

    let err = model.add(record(json!({ "isactive": true }))).await.unwrap_err();
    assert!(err.is_validation());
    assert_eq!(model.count(&Predicate::All).await.unwrap(), before);
}

async fn required_field_refuses_null(backend: Backend) {
    let model = fresh(&backend, "e2e_nulls").await;
    let stored = model.add(record(json!({ "username": "dan" }))).await.unwrap();
    let id = stored["_id"].as_str().unwrap().to_string();

    let err = model
        .update_by_id(&id, record(json!({ "username": null })))
        .await
        .unwrap_err();
    assert!(err.is_validation());

    // optional fields may still be cleared
    let cleared = model
        .update_by_id(&id, record(json!({ "data": null })))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(cleared["username"], json!("dan"));
    assert_eq!(cleared["data"], Value::Null);

    let merged = model
        .update_by_id(&id, record(json!({ "data": { "b": 2 } })))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(merged["data"], json!({ "b": 2 }));
}

async fn redeclare_is_harmless(backend: Backend) {
    let model = fresh(&backend, "e2e_redeclare").await;
    model.add(record(json!({ "username": "carol" }))).await.unwrap();

    let again = backend
        .declare(ConnectionKind::Pool, "e2e_redeclare", &accounts())
        .await
        .unwrap();
    assert_eq!(again.count(&Predicate::All).await.unwrap(), 1);
}

#[tokio::test]
#[ignore = "requires database"]
async fn relational_scenario() {
    let backend = backend(BackendKind::Relational, "DATABASE_URL");
    scenario(backend.clone()).await;
    partial_updates(backend.clone()).await;
    rejected_insert_writes_nothing(backend.clone()).await;
    required_field_refuses_null(backend.clone()).await;
    redeclare_is_harmless(backend).await;
}

#[tokio::test]
#[ignore = "requires database"]
async fn document_scenario() {
    let backend = backend(BackendKind::Document, "MONGODB_URL");
    scenario(backend.clone()).await;
    partial_updates(backend.clone()).await;
    rejected_insert_writes_nothing(backend.clone()).await;
    required_field_refuses_null(backend.clone()).await;
    redeclare_is_harmless(backend).await;
}
