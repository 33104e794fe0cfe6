// src/commands.rs
// Command dispatch: each command is a document keyed by its first field

use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::Ordering;
use std::time::Instant;

use crate::aggregation::Pipeline;
use crate::document::Document;
use crate::engine::{ConnectionId, CursorId, EmbeddedEngine, ServerCursor};
use crate::error::{EngineError, Result};
use crate::query::Query;

/// Largest document size advertised by `hello`.
pub const MAX_DOCUMENT_SIZE: u64 = 16 * 1024 * 1024;

pub(crate) fn run(engine: &EmbeddedEngine, connection: ConnectionId, db: &str, command: &Document) -> Result<Document> {
    validate_database_name(db)?;
    let name = command
        .first_key()
        .ok_or_else(|| EngineError::BadValue("empty command document".to_string()))?;

    tracing::trace!(db, command = name, connection, "running command");
    engine.counters.command.fetch_add(1, Ordering::Relaxed);

    let reply = match name {
        "ping" => json!({}),
        "hello" | "isMaster" | "ismaster" => hello(),
        "buildInfo" | "buildinfo" => json!({
            "version": env!("CARGO_PKG_VERSION"),
            "storageEngines": ["emberlite"],
            "maxBsonObjectSize": MAX_DOCUMENT_SIZE,
        }),
        "serverStatus" => server_status(engine),
        "insert" => insert(engine, db, command)?,
        "count" => count(engine, db, command)?,
        "aggregate" => aggregate(engine, connection, db, command)?,
        "getMore" => get_more(engine, db, command)?,
        "killCursors" => kill_cursors(engine, db, command)?,
        "listCollections" => list_collections(engine, db),
        "listDatabases" => list_databases(engine),
        "drop" => drop_collection(engine, db, command)?,
        "dropDatabase" => {
            let dropped = engine.storage.write().drop_database(db)?;
            tracing::debug!(db, dropped, "dropDatabase");
            json!({ "dropped": db })
        }
        other => return Err(EngineError::CommandNotFound(other.to_string())),
    };

    let mut reply = Document::from_value(reply)?;
    reply.insert("ok", json!(1.0));
    Ok(reply)
}

fn validate_database_name(db: &str) -> Result<()> {
    if db.is_empty() || db.contains(['.', ' ', '$', '/', '\\', '\0']) {
        return Err(EngineError::InvalidNamespace(format!("invalid database name '{}'", db)));
    }
    Ok(())
}

fn collection_name<'a>(command: &'a Document, key: &str) -> Result<&'a str> {
    let name = command.get_str(key)?;
    if name.is_empty() || name.starts_with('.') || name.contains(['$', '\0']) {
        return Err(EngineError::InvalidNamespace(format!("invalid collection name '{}'", name)));
    }
    Ok(name)
}

fn hello() -> Value {
    json!({
        "isWritablePrimary": true,
        "ismaster": true,
        "maxBsonObjectSize": MAX_DOCUMENT_SIZE,
        "maxWriteBatchSize": 100_000,
        "minWireVersion": 0,
        "maxWireVersion": 6,
        "readOnly": false,
    })
}

fn server_status(engine: &EmbeddedEngine) -> Value {
    let now = chrono::Utc::now();
    let counters = &engine.counters;
    json!({
        "host": "embedded",
        "version": env!("CARGO_PKG_VERSION"),
        "process": "emberlite",
        "uptime": (now - engine.started_at()).num_seconds(),
        "localTime": now.to_rfc3339(),
        "connections": {
            "current": engine.open_connection_count(),
            "totalCreated": engine.total_connection_count(),
        },
        "metrics": { "cursor": { "open": { "total": engine.open_cursor_count() } } },
        "opcounters": {
            "insert": counters.insert.load(Ordering::Relaxed),
            "query": counters.query.load(Ordering::Relaxed),
            "getmore": counters.getmore.load(Ordering::Relaxed),
            "command": counters.command.load(Ordering::Relaxed),
        },
        "storage": engine.storage.read().stats(),
    })
}

fn insert(engine: &EmbeddedEngine, db: &str, command: &Document) -> Result<Value> {
    let coll = collection_name(command, "insert")?;
    let documents = command
        .get_array("documents")?
        .iter()
        .cloned()
        .map(Document::from_value)
        .collect::<Result<Vec<_>>>()?;
    if documents.is_empty() {
        return Err(EngineError::BadValue("insert requires at least one document".to_string()));
    }

    let n = engine.storage.write().insert(db, coll, documents)?;
    engine.counters.insert.fetch_add(n as u64, Ordering::Relaxed);
    Ok(json!({ "n": n }))
}

fn count(engine: &EmbeddedEngine, db: &str, command: &Document) -> Result<Value> {
    let coll = collection_name(command, "count")?;
    let filter = Query::from_json(command.get("query").unwrap_or(&Value::Null))?;
    let n = engine.storage.read().count(db, coll, &filter);
    Ok(json!({ "n": n }))
}

fn aggregate(engine: &EmbeddedEngine, connection: ConnectionId, db: &str, command: &Document) -> Result<Value> {
    let coll = collection_name(command, "aggregate")?;
    let pipeline = Pipeline::from_stages(command.get_array("pipeline")?)?;
    let batch_size = match command.get_document("cursor")? {
        Some(cursor) => cursor.get_usize("batchSize")?,
        None => None,
    }
    .unwrap_or(engine.options().batch_size);

    // Snapshot under the read lock, run the pipeline without it.
    let documents = engine.storage.read().scan(db, coll);
    let results = pipeline.execute(documents)?;
    engine.counters.query.fetch_add(1, Ordering::Relaxed);

    let namespace = format!("{}.{}", db, coll);
    let mut remaining: VecDeque<Document> = results.into();
    let first_batch = take_batch(&mut remaining, batch_size);
    let id = park_cursor(engine, &namespace, remaining, connection);

    Ok(json!({
        "cursor": { "id": id, "ns": namespace, "firstBatch": first_batch }
    }))
}

/// Keep a non-empty remainder as a server cursor; 0 means exhausted.
fn park_cursor(engine: &EmbeddedEngine, namespace: &str, remaining: VecDeque<Document>, connection: ConnectionId) -> CursorId {
    if remaining.is_empty() {
        return 0;
    }
    let id = engine.next_cursor_id();
    engine.cursors.insert(
        id,
        ServerCursor {
            namespace: namespace.to_string(),
            remaining,
            last_used: Instant::now(),
        },
    );
    tracing::debug!(cursor = id, namespace, connection, "cursor opened");
    id
}

fn take_batch(remaining: &mut VecDeque<Document>, batch_size: usize) -> Vec<Value> {
    let n = batch_size.min(remaining.len());
    remaining.drain(..n).map(Document::into_value).collect()
}

fn get_more(engine: &EmbeddedEngine, db: &str, command: &Document) -> Result<Value> {
    let id = command
        .get("getMore")
        .and_then(Value::as_i64)
        .ok_or_else(|| EngineError::BadValue("getMore requires a cursor id".to_string()))?;
    let coll = collection_name(command, "collection")?;
    let namespace = format!("{}.{}", db, coll);
    let batch_size = command.get_usize("batchSize")?.unwrap_or(engine.options().batch_size);

    let (batch, exhausted) = {
        let mut cursor = engine.cursors.get_mut(&id).ok_or(EngineError::CursorNotFound(id))?;
        if cursor.namespace != namespace {
            return Err(EngineError::BadValue(format!(
                "cursor {} belongs to {}, not {}",
                id, cursor.namespace, namespace
            )));
        }
        cursor.last_used = Instant::now();
        let batch = take_batch(&mut cursor.remaining, batch_size.max(1));
        (batch, cursor.remaining.is_empty())
    };

    engine.counters.getmore.fetch_add(1, Ordering::Relaxed);
    let next_id = if exhausted {
        engine.cursors.remove(&id);
        tracing::debug!(cursor = id, "cursor exhausted");
        0
    } else {
        id
    };

    Ok(json!({
        "cursor": { "id": next_id, "ns": namespace, "nextBatch": batch }
    }))
}

fn kill_cursors(engine: &EmbeddedEngine, db: &str, command: &Document) -> Result<Value> {
    let coll = collection_name(command, "killCursors")?;
    let namespace = format!("{}.{}", db, coll);

    let mut killed = Vec::new();
    let mut not_found = Vec::new();
    for id in command.get_array("cursors")? {
        let id = id
            .as_i64()
            .ok_or_else(|| EngineError::BadValue("cursor ids must be integers".to_string()))?;
        match engine.cursors.remove_if(&id, |_, cursor| cursor.namespace == namespace) {
            Some(_) => killed.push(id),
            None => not_found.push(id),
        }
    }

    Ok(json!({ "cursorsKilled": killed, "cursorsNotFound": not_found }))
}

fn list_collections(engine: &EmbeddedEngine, db: &str) -> Value {
    let names = engine.storage.read().list_collections(db);
    let batch: Vec<Value> = names
        .into_iter()
        .map(|name| json!({ "name": name, "type": "collection" }))
        .collect();
    json!({
        "cursor": { "id": 0, "ns": format!("{}.$cmd.listCollections", db), "firstBatch": batch }
    })
}

fn list_databases(engine: &EmbeddedEngine) -> Value {
    let storage = engine.storage.read();
    let databases: Vec<Value> = storage
        .list_databases()
        .into_iter()
        .map(|name| json!({ "name": name, "empty": storage.list_collections(&name).is_empty() }))
        .collect();
    json!({ "databases": databases })
}

fn drop_collection(engine: &EmbeddedEngine, db: &str, command: &Document) -> Result<Value> {
    let coll = collection_name(command, "drop")?;
    let namespace = format!("{}.{}", db, coll);
    let dropped = engine.storage.write().drop_collection(db, coll)?;

    // Cursors over a dropped collection go with it.
    engine.cursors.retain(|_, cursor| cursor.namespace != namespace);
    Ok(json!({ "ns": namespace, "dropped": dropped }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Connection;
    use crate::options::ServerOptions;
    use std::sync::Arc;

    fn setup() -> (Arc<EmbeddedEngine>, Connection) {
        let engine = EmbeddedEngine::create(ServerOptions::default()).unwrap();
        let conn = engine.open_connection().unwrap();
        (engine, conn)
    }

    fn run_cmd(conn: &Connection, db: &str, value: Value) -> Result<Document> {
        conn.command(db, &Document::from_value(value).unwrap())
    }

    #[test]
    fn test_ping_and_hello() {
        let (_engine, conn) = setup();
        let reply = run_cmd(&conn, "admin", json!({"ping": 1})).unwrap();
        assert_eq!(reply.get("ok"), Some(&json!(1.0)));

        let reply = run_cmd(&conn, "admin", json!({"hello": 1})).unwrap();
        assert_eq!(reply.get("isWritablePrimary"), Some(&json!(true)));
    }

    #[test]
    fn test_unknown_command() {
        let (_engine, conn) = setup();
        let err = run_cmd(&conn, "test", json!({"frobnicate": 1})).unwrap_err();
        assert!(matches!(err, EngineError::CommandNotFound(ref name) if name == "frobnicate"));
        assert_eq!(err.code(), 59);
    }

    #[test]
    fn test_invalid_names() {
        let (_engine, conn) = setup();
        assert!(matches!(
            run_cmd(&conn, "bad.db", json!({"ping": 1})),
            Err(EngineError::InvalidNamespace(_))
        ));
        assert!(matches!(
            run_cmd(&conn, "test", json!({"count": "bad$name"})),
            Err(EngineError::InvalidNamespace(_))
        ));
    }

    #[test]
    fn test_insert_then_count() {
        let (_engine, conn) = setup();
        let reply = run_cmd(&conn, "test", json!({"insert": "users", "documents": [{"a": 1}, {"a": 2}]})).unwrap();
        assert_eq!(reply.get("n"), Some(&json!(2)));

        let reply = run_cmd(&conn, "test", json!({"count": "users"})).unwrap();
        assert_eq!(reply.get("n"), Some(&json!(2)));

        let reply = run_cmd(&conn, "test", json!({"count": "users", "query": {"a": 2}})).unwrap();
        assert_eq!(reply.get("n"), Some(&json!(1)));

        assert!(run_cmd(&conn, "test", json!({"insert": "users", "documents": []})).is_err());
    }

    #[test]
    fn test_aggregate_batches_through_get_more() {
        let (engine, conn) = setup();
        run_cmd(&conn, "test", json!({"insert": "c", "documents": [{"_id": 1}, {"_id": 2}, {"_id": 3}]})).unwrap();

        let reply = run_cmd(
            &conn,
            "test",
            json!({"aggregate": "c", "pipeline": [{"$match": {}}], "cursor": {"batchSize": 2}}),
        )
        .unwrap();
        assert_eq!(reply.get("cursor.firstBatch"), Some(&json!([{"_id": 1}, {"_id": 2}])));
        let id = reply.get("cursor.id").and_then(Value::as_i64).unwrap();
        assert_ne!(id, 0);

        let reply = run_cmd(&conn, "test", json!({"getMore": id, "collection": "c", "batchSize": 2})).unwrap();
        assert_eq!(reply.get("cursor.nextBatch"), Some(&json!([{"_id": 3}])));
        assert_eq!(reply.get("cursor.id"), Some(&json!(0)));
        assert_eq!(engine.open_cursor_count(), 0);

        let err = run_cmd(&conn, "test", json!({"getMore": id, "collection": "c"})).unwrap_err();
        assert!(matches!(err, EngineError::CursorNotFound(_)));
    }

    #[test]
    fn test_aggregate_batch_size_zero_parks_everything() {
        let (_engine, conn) = setup();
        run_cmd(&conn, "test", json!({"insert": "c", "documents": [{"_id": 1}]})).unwrap();

        let reply = run_cmd(&conn, "test", json!({"aggregate": "c", "pipeline": [], "cursor": {"batchSize": 0}})).unwrap();
        assert_eq!(reply.get("cursor.firstBatch"), Some(&json!([])));
        assert_ne!(reply.get("cursor.id"), Some(&json!(0)));
    }

    #[test]
    fn test_get_more_rejects_wrong_namespace() {
        let (_engine, conn) = setup();
        run_cmd(&conn, "test", json!({"insert": "c", "documents": [{}, {}]})).unwrap();
        let reply = run_cmd(&conn, "test", json!({"aggregate": "c", "pipeline": [], "cursor": {"batchSize": 1}})).unwrap();
        let id = reply.get("cursor.id").and_then(Value::as_i64).unwrap();

        assert!(matches!(
            run_cmd(&conn, "test", json!({"getMore": id, "collection": "other"})),
            Err(EngineError::BadValue(_))
        ));
    }

    #[test]
    fn test_kill_cursors() {
        let (engine, conn) = setup();
        run_cmd(&conn, "test", json!({"insert": "c", "documents": [{}, {}]})).unwrap();
        let reply = run_cmd(&conn, "test", json!({"aggregate": "c", "pipeline": [], "cursor": {"batchSize": 1}})).unwrap();
        let id = reply.get("cursor.id").and_then(Value::as_i64).unwrap();

        let reply = run_cmd(&conn, "test", json!({"killCursors": "c", "cursors": [id, 999]})).unwrap();
        assert_eq!(reply.get("cursorsKilled"), Some(&json!([id])));
        assert_eq!(reply.get("cursorsNotFound"), Some(&json!([999])));
        assert_eq!(engine.open_cursor_count(), 0);
    }

    #[test]
    fn test_drop_database_then_count_is_zero() {
        let (_engine, conn) = setup();
        run_cmd(&conn, "test", json!({"insert": "c", "documents": [{}]})).unwrap();
        run_cmd(&conn, "test", json!({"dropDatabase": 1})).unwrap();

        let reply = run_cmd(&conn, "test", json!({"count": "c"})).unwrap();
        assert_eq!(reply.get("n"), Some(&json!(0)));
    }

    #[test]
    fn test_list_collections_and_databases() {
        let (_engine, conn) = setup();
        run_cmd(&conn, "a", json!({"insert": "x", "documents": [{}]})).unwrap();
        run_cmd(&conn, "a", json!({"insert": "y", "documents": [{}]})).unwrap();
        run_cmd(&conn, "b", json!({"insert": "z", "documents": [{}]})).unwrap();

        let reply = run_cmd(&conn, "a", json!({"listCollections": 1})).unwrap();
        assert_eq!(
            reply.get("cursor.firstBatch"),
            Some(&json!([{"name": "x", "type": "collection"}, {"name": "y", "type": "collection"}]))
        );

        let reply = run_cmd(&conn, "admin", json!({"listDatabases": 1})).unwrap();
        let names: Vec<&str> = reply
            .get_array("databases")
            .unwrap()
            .iter()
            .filter_map(|d| d["name"].as_str())
            .collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_server_status_counts() {
        let (_engine, conn) = setup();
        run_cmd(&conn, "test", json!({"insert": "c", "documents": [{}, {}]})).unwrap();
        let reply = run_cmd(&conn, "admin", json!({"serverStatus": 1})).unwrap();
        assert_eq!(reply.get("opcounters.insert"), Some(&json!(2)));
        assert_eq!(reply.get("connections.current"), Some(&json!(1)));
    }
}
