// End-to-end tests through the client facades
use emberlite::{Client, Document, Error};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tempfile::TempDir;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct Item {
    name: String,
    qty: i64,
}

fn doc(value: Value) -> Document {
    Document::from_value(value).unwrap()
}

fn client() -> Client {
    Client::create(Vec::<String>::new()).unwrap()
}

#[test]
fn test_insert_then_count() {
    let client = client();
    let coll = client.database("test").unwrap().collection::<Document>("c").unwrap();

    let result = coll.insert_one(&doc(json!({"x": 1}))).unwrap();
    assert!(result.inserted_id.is_some());
    assert_eq!(coll.count().unwrap(), 1);
    assert_eq!(client.binding_stats().outstanding(), 0);
}

#[test]
fn test_aggregate_match_all_keeps_insertion_order() {
    let client = client();
    let coll = client.database("test").unwrap().collection::<Item>("items").unwrap();
    for name in ["a", "b", "c"] {
        coll.insert_one(&Item { name: name.to_string(), qty: 1 }).unwrap();
    }

    let names: Vec<String> = coll
        .aggregate(&[json!({"$match": {}})])
        .unwrap()
        .iter()
        .unwrap()
        .map(|item| item.unwrap().name)
        .collect();
    assert_eq!(names, vec!["a", "b", "c"]);
}

#[test]
fn test_aggregate_across_batches() {
    let client = client();
    let coll = client.database("test").unwrap().collection::<Document>("c").unwrap();
    for i in 0..10 {
        coll.insert_one(&doc(json!({"_id": i, "n": i}))).unwrap();
    }

    let mut iter = coll.aggregate(&[json!({"$sort": {"n": -1}})]).unwrap().batch_size(3).iter().unwrap();
    let mut seen = Vec::new();
    while iter.has_next() {
        seen.push(iter.next_item().unwrap().get("n").cloned().unwrap());
    }
    assert_eq!(seen, (0..10).rev().map(|i| json!(i)).collect::<Vec<_>>());
    assert!(matches!(iter.next_item(), Err(Error::CursorExhausted)));
    assert_eq!(client.executor().server().open_cursor_count(), 0);
}

#[test]
fn test_batch_size_zero_still_yields_everything() {
    let client = client();
    let coll = client.database("test").unwrap().collection::<Document>("c").unwrap();
    for i in 0..3 {
        coll.insert_one(&doc(json!({"_id": i}))).unwrap();
    }

    let all = coll.aggregate::<Value>(&[]).unwrap().batch_size(0).collect_all().unwrap();
    assert_eq!(all.len(), 3);
}

#[test]
fn test_drain_ends_on_exact_batch_boundary() {
    let client = client();
    let coll = client.database("test").unwrap().collection::<Document>("c").unwrap();
    for i in 0..4 {
        coll.insert_one(&doc(json!({"_id": i}))).unwrap();
    }

    let mut iter = coll.aggregate::<Value>(&[]).unwrap().batch_size(2).iter().unwrap();
    let mut count = 0;
    while iter.has_next() {
        iter.next_item().unwrap();
        count += 1;
    }
    assert_eq!(count, 4);
    assert!(!iter.has_next());

    // Only an empty first batch
    let empty = client.database("test").unwrap().collection::<Document>("none").unwrap();
    let mut iter = empty.aggregate::<Value>(&[]).unwrap().batch_size(0).iter().unwrap();
    assert!(!iter.has_next());
    assert!(matches!(iter.next_item(), Err(Error::CursorExhausted)));
}

#[test]
fn test_abandoned_iterator_kills_server_cursor() {
    let client = client();
    let coll = client.database("test").unwrap().collection::<Document>("c").unwrap();
    for i in 0..5 {
        coll.insert_one(&doc(json!({"_id": i}))).unwrap();
    }

    let mut iter = coll.aggregate::<Value>(&[]).unwrap().batch_size(2).iter().unwrap();
    iter.next_item().unwrap();
    assert_eq!(client.executor().server().open_cursor_count(), 1);

    drop(iter);
    assert_eq!(client.executor().server().open_cursor_count(), 0);
    assert_eq!(client.binding_stats().outstanding(), 0);
}

#[test]
fn test_group_pipeline_decodes_into_struct() {
    #[derive(Debug, Deserialize, PartialEq)]
    struct Total {
        #[serde(rename = "_id")]
        name: String,
        total: i64,
    }

    let client = client();
    let coll = client.database("shop").unwrap().collection::<Item>("orders").unwrap();
    for (name, qty) in [("apple", 2), ("pear", 1), ("apple", 3)] {
        coll.insert_one(&Item { name: name.to_string(), qty }).unwrap();
    }

    let totals: Vec<Total> = coll
        .clone_with_type::<Total>()
        .aggregate(&[
            json!({"$group": {"_id": "$name", "total": {"$sum": "$qty"}}}),
            json!({"$sort": {"_id": 1}}),
        ])
        .unwrap()
        .collect_all()
        .unwrap();
    assert_eq!(
        totals,
        vec![Total { name: "apple".into(), total: 5 }, Total { name: "pear".into(), total: 1 }]
    );
}

#[test]
fn test_count_matching() {
    let client = client();
    let coll = client.database("test").unwrap().collection::<Item>("items").unwrap();
    for qty in [1, 5, 10] {
        coll.insert_one(&Item { name: "x".into(), qty }).unwrap();
    }
    assert_eq!(coll.count_matching(doc(json!({"qty": {"$gte": 5}}))).unwrap(), 2);
    assert_eq!(coll.count_matching(doc(json!({}))).unwrap(), 3);
}

#[test]
fn test_drop_database_then_count_is_zero() {
    let client = client();
    let db = client.database("test").unwrap();
    let coll = db.collection::<Document>("c").unwrap();
    coll.insert_one(&doc(json!({"x": 1}))).unwrap();

    db.drop().unwrap();
    assert_eq!(coll.count().unwrap(), 0);
    assert!(!client.list_database_names().unwrap().contains(&"test".to_string()));
    // Dropping again is not an error
    db.drop().unwrap();
}

#[test]
fn test_drop_collection() {
    let client = client();
    let db = client.database("test").unwrap();
    let a = db.collection::<Document>("a").unwrap();
    let b = db.collection::<Document>("b").unwrap();
    a.insert_one(&doc(json!({"x": 1}))).unwrap();
    b.insert_one(&doc(json!({"x": 1}))).unwrap();
    assert_eq!(db.list_collection_names().unwrap(), vec!["a", "b"]);

    assert!(a.drop().unwrap());
    assert!(!a.drop().unwrap());
    assert_eq!(db.list_collection_names().unwrap(), vec!["b"]);
}

#[test]
fn test_run_command_ping() {
    let client = client();
    let reply = client.database("admin").unwrap().run_command(doc(json!({"ping": 1}))).unwrap();
    assert_eq!(reply.get("ok"), Some(&json!(1.0)));
}

#[test]
fn test_unknown_command_reports_engine_code() {
    let client = client();
    let err = client
        .database("admin")
        .unwrap()
        .run_command(doc(json!({"frobnicate": 1})))
        .unwrap_err();
    assert_eq!(err.code(), Some(59));
    assert_eq!(client.binding_stats().outstanding(), 0);
}

#[test]
fn test_duplicate_id_is_rejected() {
    let client = client();
    let coll = client.database("test").unwrap().collection::<Document>("c").unwrap();
    coll.insert_one(&doc(json!({"_id": "k"}))).unwrap();

    let err = coll.insert_one(&doc(json!({"_id": "k"}))).unwrap_err();
    assert_eq!(err.code(), Some(11000));
    assert_eq!(coll.count().unwrap(), 1);
}

#[test]
fn test_invalid_names() {
    let client = client();
    assert!(matches!(client.database("a.b"), Err(Error::InvalidNamespace(_))));
    assert!(matches!(
        client.database("test").unwrap().collection::<Document>(""),
        Err(Error::InvalidNamespace(_))
    ));
}

#[test]
fn test_closed_client_refuses_operations() {
    let client = client();
    let coll = client.database("test").unwrap().collection::<Document>("c").unwrap();
    client.close().unwrap();

    assert!(client.is_closed());
    assert!(coll.count().unwrap_err().is_server_closed());
    assert!(client.pump().unwrap_err().is_server_closed());
}

#[test]
fn test_durable_client_survives_restart() {
    let temp_dir = TempDir::new().unwrap();
    let args = [format!("--dbpath={}", temp_dir.path().display())];

    {
        let client = Client::create(&args).unwrap();
        let coll = client.database("app").unwrap().collection::<Item>("items").unwrap();
        coll.insert_one(&Item { name: "kept".into(), qty: 9 }).unwrap();
        assert!(client.pump().unwrap().journal_synced);
        client.close().unwrap();
    }

    let client = Client::create(&args).unwrap();
    let coll = client.database("app").unwrap().collection::<Item>("items").unwrap();
    let items = coll.aggregate::<Value>(&[]).unwrap().collect_all().unwrap();
    assert_eq!(items, vec![Item { name: "kept".into(), qty: 9 }]);
}
