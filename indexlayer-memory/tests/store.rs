//! Backend-level tests for the in-memory search store.

use indexlayer_core::{
    backend::{SearchBackend, SearchBackendBuilder},
    bulk::{compile_bulk, BulkItem},
    error::IndexStoreError,
    request::{ReadOptions, SearchBody, WriteOptions},
    schema::{FieldDescriptor, FieldSchema, IndexDefinition},
};
use indexlayer_memory::InMemorySearchStore;
use serde_json::{json, Map, Value};

fn schema() -> FieldSchema {
    FieldSchema::new()
        .field("title", FieldDescriptor::text())
        .field("status", FieldDescriptor::keyword())
        .field("views", FieldDescriptor::long())
}

fn definition() -> IndexDefinition {
    IndexDefinition::new(schema())
        .with_index_setting("number_of_shards", 1)
        .with_index_setting("number_of_replicas", 0)
}

fn document(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => panic!("expected an object"),
    }
}

async fn seeded() -> InMemorySearchStore {
    let store = InMemorySearchStore::builder().build().await.unwrap();
    store.create_index("posts", &definition()).await.unwrap();

    let fixtures = [
        ("1", json!({ "title": "Hello world", "status": "published", "views": 10 })),
        ("2", json!({ "title": "Second post", "status": "draft", "views": 3 })),
        ("3", json!({ "title": "Hello again", "status": "published", "views": 7 })),
    ];

    for (id, doc) in fixtures {
        store
            .create_document("posts", id, document(doc), &WriteOptions::default())
            .await
            .unwrap();
    }

    store
}

#[tokio::test]
async fn missing_index_is_reported_distinctly() {
    let store = InMemorySearchStore::new();

    let err = store.get_index("posts").await.unwrap_err();

    assert!(err.is_index_not_found());
}

#[tokio::test]
async fn create_index_is_idempotent_and_keeps_the_first_definition() {
    let store = InMemorySearchStore::new();

    store.create_index("posts", &definition()).await.unwrap();
    store
        .create_index("posts", &IndexDefinition::new(FieldSchema::new()))
        .await
        .unwrap();

    let info = store.get_index("posts").await.unwrap();

    assert_eq!(info.field_mapping("status"), Some(&json!({ "type": "keyword" })));
    assert_eq!(info.settings["index"]["number_of_shards"], json!(1));
    assert_eq!(store.index_names().await, vec!["posts".to_string()]);
}

#[tokio::test]
async fn static_settings_cannot_be_updated() {
    let store = seeded().await;

    let err = store
        .put_settings("posts", document(json!({ "number_of_shards": 2 })))
        .await
        .unwrap_err();
    assert!(matches!(err, IndexStoreError::Backend(_)));

    store
        .put_settings("posts", document(json!({ "number_of_replicas": 2 })))
        .await
        .unwrap();

    let info = store.get_index("posts").await.unwrap();
    assert_eq!(info.settings["index"]["number_of_replicas"], json!(2));
}

#[tokio::test]
async fn put_mapping_adds_fields_and_rejects_type_changes() {
    let store = seeded().await;

    store
        .put_mapping("posts", "created", &FieldDescriptor::date())
        .await
        .unwrap();
    assert!(store
        .put_mapping("posts", "status", &FieldDescriptor::text())
        .await
        .is_err());

    let info = store.get_index("posts").await.unwrap();
    assert_eq!(info.field_mapping("created"), Some(&json!({ "type": "date" })));
    assert_eq!(info.field_mapping("status"), Some(&json!({ "type": "keyword" })));
}

#[tokio::test]
async fn document_writes_follow_store_semantics() {
    let store = seeded().await;
    let options = WriteOptions::default();

    let conflict = store
        .create_document("posts", "1", document(json!({ "title": "dup" })), &options)
        .await
        .unwrap_err();
    assert!(matches!(conflict, IndexStoreError::DocumentAlreadyExists(..)));

    store
        .update_document("posts", "1", document(json!({ "views": 11 })), &options)
        .await
        .unwrap();

    let fetched = store.get_document("posts", "1").await.unwrap();
    assert!(fetched.found);
    assert_eq!(
        fetched.source.map(Value::Object),
        Some(json!({ "title": "Hello world", "status": "published", "views": 11 }))
    );

    let missing = store
        .update_document("posts", "404", document(json!({ "views": 1 })), &options)
        .await
        .unwrap_err();
    assert!(missing.is_document_not_found());

    store.delete_document("posts", "1", &options).await.unwrap();
    assert!(store
        .delete_document("posts", "1", &options)
        .await
        .unwrap_err()
        .is_document_not_found());
    assert!(!store.get_document("posts", "1").await.unwrap().found);
}

#[tokio::test]
async fn mget_reports_every_id_in_order() {
    let store = seeded().await;

    let responses = store
        .mget_documents("posts", &["3".to_string(), "missing".to_string(), "1".to_string()])
        .await
        .unwrap();

    assert_eq!(
        responses
            .iter()
            .map(|response| (response.id.as_str(), response.found))
            .collect::<Vec<_>>(),
        vec![("3", true), ("missing", false), ("1", true)]
    );
}

#[tokio::test]
async fn search_filters_sorts_and_pages() {
    let store = seeded().await;

    let response = store
        .search(
            "posts",
            &SearchBody::new()
                .query(json!({ "bool": { "filter": { "term": { "status": "published" } } } }))
                .sort(json!([{ "views": "desc" }])),
            &ReadOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(response.total, 2);
    assert_eq!(
        response.hits.iter().map(|hit| hit.id.as_str()).collect::<Vec<_>>(),
        vec!["1", "3"]
    );
    assert!(response.hits.iter().all(|hit| hit.score.is_none()));

    let page = store
        .search(
            "posts",
            &SearchBody::new().sort(json!("views")).from(1).size(1),
            &ReadOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(page.total, 3);
    assert_eq!(page.hits.len(), 1);
    assert_eq!(page.hits[0].id, "3");
}

#[tokio::test]
async fn unsorted_hits_are_scored() {
    let store = seeded().await;

    let response = store
        .search(
            "posts",
            &SearchBody::new().query(json!({ "term": { "status": "published" } })),
            &ReadOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(response.total, 2);
    assert!(response.hits.iter().all(|hit| hit.score == Some(1.0)));
}

#[tokio::test]
async fn search_defaults_to_ten_hits() {
    let store = InMemorySearchStore::new();
    store.create_index("posts", &definition()).await.unwrap();

    for i in 0..15 {
        store
            .create_document("posts", &format!("{:02}", i), document(json!({ "views": i })), &WriteOptions::default())
            .await
            .unwrap();
    }

    let response = store
        .search("posts", &SearchBody::new(), &ReadOptions::default())
        .await
        .unwrap();

    assert_eq!(response.total, 15);
    assert_eq!(response.hits.len(), 10);
}

#[tokio::test]
async fn aggregations_are_rejected() {
    let store = seeded().await;

    let result = store
        .search(
            "posts",
            &SearchBody::new().aggs(json!({ "by_status": { "terms": { "field": "status" } } })),
            &ReadOptions::default(),
        )
        .await;

    assert!(matches!(result, Err(IndexStoreError::Backend(_))));
}

#[tokio::test]
async fn count_and_delete_by_query() {
    let store = seeded().await;
    let published = json!({ "term": { "status": "published" } });

    assert_eq!(store.count("posts", None, &ReadOptions::default()).await.unwrap(), 3);
    assert_eq!(
        store.count("posts", Some(&published), &ReadOptions::default()).await.unwrap(),
        2
    );

    let response = store
        .delete_by_query("posts", &published, &WriteOptions::default())
        .await
        .unwrap();

    assert_eq!(response.deleted, 2);
    assert_eq!(store.count("posts", None, &ReadOptions::default()).await.unwrap(), 1);
}

#[tokio::test]
async fn bulk_reports_per_item_results() {
    let store = seeded().await;

    let instructions = compile_bulk(
        &[
            BulkItem::create("4", json!({ "title": "Fourth" })),
            BulkItem::create("1", json!({ "title": "Conflict" })),
            BulkItem::update("2", json!({ "status": "published" })),
            BulkItem::delete("3"),
            BulkItem::delete("missing"),
        ],
        &schema(),
    )
    .unwrap();

    let response = store
        .bulk("posts", &instructions, &WriteOptions::default())
        .await
        .unwrap();

    assert!(response.errors);
    assert_eq!(response.items.len(), 5);
    assert_eq!(response.items[0]["create"]["status"], json!(201));
    assert_eq!(response.items[1]["create"]["status"], json!(409));
    assert_eq!(response.items[2]["update"]["result"], json!("updated"));
    assert_eq!(response.items[3]["delete"]["result"], json!("deleted"));
    assert_eq!(response.items[4]["delete"]["result"], json!("not_found"));

    let ids = store
        .search("posts", &SearchBody::new().sort(json!("_doc")), &ReadOptions::default())
        .await
        .unwrap()
        .hits
        .into_iter()
        .map(|hit| hit.id)
        .collect::<Vec<_>>();

    assert_eq!(ids, vec!["1", "2", "4"]);
}

#[tokio::test]
async fn operations_on_missing_indices_fail() {
    let store = InMemorySearchStore::new();

    assert!(store
        .get_document("posts", "1")
        .await
        .unwrap_err()
        .is_index_not_found());
    assert!(store
        .search("posts", &SearchBody::new(), &ReadOptions::default())
        .await
        .unwrap_err()
        .is_index_not_found());
}
