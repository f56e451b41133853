//! Caching and optimistic concurrency of documents, end to end.

mod common;

use serde_json::json;
use sofa_client::{ClientError, Document};

#[tokio::test]
async fn revisions_chain_through_save_and_delete() {
    let (server, db) = common::sample_database("chain").await;
    let mut doc = db.create("fresh", false, None).await.unwrap();
    assert!(doc.rev().is_none());

    let mut generations = Vec::new();
    for value in 0..3 {
        doc.insert("value", value);
        doc.save().await.unwrap();
        generations.push(doc.rev().unwrap().split('-').next().unwrap().to_string());
    }
    assert_eq!(generations, vec!["1", "2", "3"]);

    doc.delete(false).await.unwrap();
    assert!(doc.rev().unwrap().starts_with("4-"));
    assert!(server.document("chain", "fresh").is_none());
}

#[tokio::test]
async fn every_mutation_makes_the_document_dirty() {
    let (_, db) = common::sample_database("dirty").await;
    let mut doc = db.get("foo", None, None).await.unwrap();
    assert!(!doc.is_dirty());

    doc.insert("bar", true);
    assert!(!doc.is_dirty(), "writing the same value is not an edit");

    doc.setdefault("list", json!([]));
    assert!(doc.is_dirty());
    doc.save().await.unwrap();
    assert!(!doc.is_dirty());

    if let Some(list) = doc.get_mut("list").and_then(|v| v.as_array_mut()) {
        list.push(json!(1));
    }
    assert!(doc.is_dirty());

    doc.fetch(true, None).await.unwrap();
    assert!(!doc.is_dirty());
    assert_eq!(doc.get("list"), Some(&json!([])));
}

#[tokio::test]
async fn unsaved_edits_block_fetch_and_delete() {
    let (server, db) = common::sample_database("guard").await;
    let mut doc = db.get("foo2", None, None).await.unwrap();
    doc.insert("pending", "edit");
    let before = server.log().len();

    assert!(matches!(doc.fetch(false, None).await, Err(ClientError::Conflict(_))));
    assert!(matches!(doc.delete(false).await, Err(ClientError::Conflict(_))));
    assert_eq!(server.log().len(), before);
    assert_eq!(doc.get("pending"), Some(&json!("edit")));

    doc.delete(true).await.unwrap();
    assert!(!doc.exists());
}

#[tokio::test]
async fn concurrent_writers_conflict() {
    let (_, db) = common::sample_database("writers").await;
    let mut alice = db.get("baz", None, None).await.unwrap();
    let mut bob = db.get("baz", None, None).await.unwrap();

    alice.insert("owner", "alice");
    alice.save().await.unwrap();

    bob.insert("owner", "bob");
    let err = bob.save().await.unwrap_err();
    assert!(err.is_conflict());
    assert!(bob.is_dirty());

    let mut reloaded = Document::new(&db, "baz");
    reloaded.fetch(false, None).await.unwrap();
    assert_eq!(reloaded.get("owner"), Some(&json!("alice")));
}

#[tokio::test]
async fn missing_documents() {
    let (_, db) = common::sample_database("missing").await;

    let err = db.get("nope", None, None).await.unwrap_err();
    assert!(err.is_not_found());

    let fallback = db
        .get("nope", Some(serde_json::Map::from_iter([("a".to_string(), json!(1))])), None)
        .await
        .unwrap();
    assert!(!fallback.exists());
    assert!(fallback.is_dirty());
    assert_eq!(fallback.get("a"), Some(&json!(1)));

    assert!(!db.contains("nope").await.unwrap());
    assert!(db.contains("foo").await.unwrap());
}

#[tokio::test]
async fn create_with_exists_ok_loads_the_server_body() {
    let (_, db) = common::sample_database("exists_ok").await;

    let err = db.create("foo", false, None).await.unwrap_err();
    assert!(err.is_conflict());

    let doc = db.create("foo", true, None).await.unwrap();
    assert!(doc.exists());
    assert_eq!(doc.get("bar2"), Some(&json!(3)));
}
