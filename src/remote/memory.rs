//! In-memory backend serving the same query surface as PostgREST.
//!
//! Used for offline reading (`lectio --offline dataset.json`) and as the
//! backend of the crate's tests. Every call is recorded so callers can check
//! how many round-trips an operation cost.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::app::{LectioError, Result};
use crate::remote::{single_row_error, Filter, RemoteClient, Rows, TableQuery, CCC_LINKS_PROCEDURE};

pub type Tables = HashMap<String, Vec<Value>>;

/// A stored procedure: reads the tables, receives the named arguments.
pub type Procedure = Arc<dyn Fn(&Tables, &Value) -> Result<Rows> + Send + Sync>;

#[derive(Debug, Clone, PartialEq)]
pub enum RemoteCall {
    Query(TableQuery),
    Call { procedure: String, args: Value },
}

#[derive(Default)]
pub struct MemoryClient {
    tables: RwLock<Tables>,
    procedures: RwLock<HashMap<String, Procedure>>,
    failures: Mutex<HashMap<String, String>>,
    calls: Mutex<Vec<RemoteCall>>,
}

impl MemoryClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a JSON object mapping table names to arrays of rows.
    ///
    /// The Catechism-links procedure is installed on top, computed from
    /// `bible_content_units` and `catechism_bible_index`.
    pub fn from_dataset(dataset: Value) -> Result<Self> {
        let Value::Object(tables) = dataset else {
            return Err(LectioError::Decode(
                "dataset must be an object of table name → rows".into(),
            ));
        };

        let client = Self::new().with_procedure(CCC_LINKS_PROCEDURE, ccc_links_from_tables);
        for (name, rows) in tables {
            match rows {
                Value::Array(rows) => client.insert_rows(&name, rows),
                _ => {
                    return Err(LectioError::Decode(format!(
                        "table '{}' must be an array of rows",
                        name
                    )))
                }
            }
        }
        Ok(client)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            LectioError::Config(format!("cannot read dataset {}: {}", path.display(), e))
        })?;
        Self::from_dataset(serde_json::from_str(&content)?)
    }

    pub fn with_table(self, name: &str, rows: Vec<Value>) -> Self {
        self.insert_rows(name, rows);
        self
    }

    pub fn with_procedure<F>(self, name: &str, procedure: F) -> Self
    where
        F: Fn(&Tables, &Value) -> Result<Rows> + Send + Sync + 'static,
    {
        if let Ok(mut procedures) = self.procedures.write() {
            procedures.insert(name.to_string(), Arc::new(procedure));
        }
        self
    }

    pub fn insert_rows(&self, name: &str, rows: Vec<Value>) {
        if let Ok(mut tables) = self.tables.write() {
            tables.entry(name.to_string()).or_default().extend(rows);
        }
    }

    /// Make every query on a table (or call of a procedure) with this name fail.
    pub fn fail(&self, name: &str, message: &str) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.insert(name.to_string(), message.to_string());
        }
    }

    pub fn recover(&self, name: &str) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.remove(name);
        }
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }

    /// Number of recorded round-trips against one table or procedure.
    pub fn calls_to(&self, name: &str) -> usize {
        self.calls
            .lock()
            .map(|calls| {
                calls
                    .iter()
                    .filter(|call| match call {
                        RemoteCall::Query(q) => q.table == name,
                        RemoteCall::Call { procedure, .. } => procedure == name,
                    })
                    .count()
            })
            .unwrap_or(0)
    }

    fn record(&self, call: RemoteCall) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }

    fn injected_failure(&self, name: &str) -> Option<LectioError> {
        let failures = self.failures.lock().ok()?;
        failures.get(name).map(|message| LectioError::Query {
            code: Some("injected".to_string()),
            message: message.clone(),
        })
    }

    fn lock_error() -> LectioError {
        LectioError::Other("memory backend lock poisoned".into())
    }
}

#[async_trait]
impl RemoteClient for MemoryClient {
    async fn query(&self, query: &TableQuery) -> Result<Rows> {
        self.record(RemoteCall::Query(query.clone()));
        if let Some(err) = self.injected_failure(&query.table) {
            return Err(err);
        }

        let tables = self.tables.read().map_err(|_| Self::lock_error())?;
        let rows = tables.get(&query.table).map(Vec::as_slice).unwrap_or(&[]);
        let mut matched: Vec<Value> = rows
            .iter()
            .filter(|row| query.filters.iter().all(|f| filter_matches(f, row)))
            .cloned()
            .collect();

        if !query.order.is_empty() {
            matched.sort_by(|a, b| {
                query
                    .order
                    .iter()
                    .map(|col| compare_values(&a[col.as_str()], &b[col.as_str()]))
                    .find(|o| *o != Ordering::Equal)
                    .unwrap_or(Ordering::Equal)
            });
        }

        let projected: Rows = matched
            .into_iter()
            .map(|row| project(row, &query.columns))
            .collect();

        if query.single && projected.len() != 1 {
            let n = projected.len();
            let details = format!("The result contains {} rows", n);
            return Err(single_row_error(Some(n), details));
        }

        Ok(projected)
    }

    async fn call(&self, procedure: &str, args: Value) -> Result<Rows> {
        self.record(RemoteCall::Call {
            procedure: procedure.to_string(),
            args: args.clone(),
        });
        if let Some(err) = self.injected_failure(procedure) {
            return Err(err);
        }

        let handler = self
            .procedures
            .read()
            .map_err(|_| Self::lock_error())?
            .get(procedure)
            .cloned()
            .ok_or_else(|| LectioError::Query {
                code: Some("PGRST202".to_string()),
                message: format!("Could not find the function {}", procedure),
            })?;

        let tables = self.tables.read().map_err(|_| Self::lock_error())?;
        handler(&tables, &args)
    }
}

/// Stand-in for the server-side `get_ccc_links_for_verse_ids` function.
pub fn ccc_links_from_tables(tables: &Tables, args: &Value) -> Result<Rows> {
    let ids: Vec<i64> = args["target_verse_ids"]
        .as_array()
        .ok_or_else(|| LectioError::Validation("target_verse_ids must be an array".into()))?
        .iter()
        .filter_map(Value::as_i64)
        .collect();

    let empty = Vec::new();
    let units = tables.get("bible_content_units").unwrap_or(&empty);
    let index = tables.get("catechism_bible_index").unwrap_or(&empty);

    let mut links: BTreeMap<i64, Vec<i64>> = BTreeMap::new();
    for unit in units {
        let (Some(verse_id), Some(reference_id)) =
            (unit["id"].as_i64(), unit["reference_id"].as_i64())
        else {
            continue;
        };
        if !ids.contains(&verse_id) {
            continue;
        }
        let nums: Vec<i64> = index
            .iter()
            .filter(|entry| entry["reference_id"].as_i64() == Some(reference_id))
            .filter_map(|entry| entry["ccc_num"].as_i64())
            .collect();
        links.entry(verse_id).or_default().extend(nums);
    }

    Ok(links
        .into_iter()
        .map(|(verse_id, nums)| {
            if nums.is_empty() {
                json!({"verse_id": verse_id, "ccc_nums": null})
            } else {
                json!({"verse_id": verse_id, "ccc_nums": nums})
            }
        })
        .collect())
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn filter_matches(filter: &Filter, row: &Value) -> bool {
    match filter {
        Filter::Eq { column, value } => value_text(&row[column.as_str()]).as_ref() == Some(value),
        Filter::In { column, values } => value_text(&row[column.as_str()])
            .map(|v| values.contains(&v))
            .unwrap_or(false),
        Filter::NotNull { column } => !row[column.as_str()].is_null(),
    }
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        // nulls last
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Greater,
        (_, Value::Null) => Ordering::Less,
        _ => a.to_string().cmp(&b.to_string()),
    }
}

fn project(row: Value, columns: &str) -> Value {
    if columns.trim() == "*" {
        return row;
    }
    let Value::Object(fields) = row else {
        return row;
    };
    let mut out = Map::new();
    for column in columns.split(',').map(str::trim).filter(|c| !c.is_empty()) {
        if let Some(value) = fields.get(column) {
            out.insert(column.to_string(), value.clone());
        }
    }
    Value::Object(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> MemoryClient {
        MemoryClient::new().with_table(
            "bible_versions",
            vec![
                json!({"version_id": 2, "lang_id": 1, "abbr": "JER", "full_name": "Jérusalem"}),
                json!({"version_id": 1, "lang_id": 1, "abbr": "CRAMPON", "full_name": "Crampon"}),
                json!({
                    "version_id": 3,
                    "lang_id": 2,
                    "abbr": "RSV",
                    "full_name": "Revised Standard"
                }),
            ],
        )
    }

    #[tokio::test]
    async fn test_filters_and_order() {
        let client = client();
        let rows = client
            .query(
                &TableQuery::from("bible_versions")
                    .select("version_id,abbr")
                    .eq("lang_id", 1)
                    .order("abbr"),
            )
            .await
            .unwrap();

        assert_eq!(
            rows,
            vec![
                json!({"version_id": 1, "abbr": "CRAMPON"}),
                json!({"version_id": 2, "abbr": "JER"}),
            ]
        );
        assert_eq!(client.calls_to("bible_versions"), 1);
    }

    #[tokio::test]
    async fn test_in_and_not_null() {
        let client = MemoryClient::new().with_table(
            "bible_books",
            vec![
                json!({"book_id": 1, "genre_id": 1}),
                json!({"book_id": 2, "genre_id": null}),
                json!({"book_id": 3, "genre_id": 2}),
            ],
        );
        let rows = client
            .query(
                &TableQuery::from("bible_books")
                    .is_in("book_id", [1, 2])
                    .not_null("genre_id"),
            )
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["book_id"], 1);
    }

    #[tokio::test]
    async fn test_single_mode() {
        let client = client();
        let found = client
            .query(&TableQuery::from("bible_versions").eq("abbr", "RSV").single())
            .await
            .unwrap();
        assert_eq!(found.len(), 1);

        let missing = client
            .query(&TableQuery::from("bible_versions").eq("abbr", "KJV").single())
            .await
            .unwrap_err();
        assert!(matches!(missing, LectioError::NotFound(_)));

        let many = client
            .query(&TableQuery::from("bible_versions").eq("lang_id", 1).single())
            .await
            .unwrap_err();
        assert!(matches!(many, LectioError::Query { .. }));
    }

    #[tokio::test]
    async fn test_injected_failure_and_recovery() {
        let client = client();
        client.fail("bible_versions", "connection reset");

        let err = client
            .query(&TableQuery::from("bible_versions"))
            .await
            .unwrap_err();
        assert!(err.is_retryable());

        client.recover("bible_versions");
        assert!(client.query(&TableQuery::from("bible_versions")).await.is_ok());
        assert_eq!(client.call_count(), 2);
    }

    #[tokio::test]
    async fn test_unknown_procedure() {
        let client = MemoryClient::new();
        let err = client.call("missing_fn", json!({})).await.unwrap_err();
        assert!(matches!(err, LectioError::Query { .. }));
    }

    #[tokio::test]
    async fn test_dataset_installs_ccc_procedure() {
        let client = MemoryClient::from_dataset(json!({
            "bible_content_units": [
                {"id": 1, "reference_id": 10},
                {"id": 2, "reference_id": null},
                {"id": 3, "reference_id": 11}
            ],
            "catechism_bible_index": [
                {"reference_id": 10, "ccc_num": 279},
                {"reference_id": 10, "ccc_num": 290}
            ]
        }))
        .unwrap();

        let rows = client
            .call(CCC_LINKS_PROCEDURE, json!({"target_verse_ids": [1, 2, 3]}))
            .await
            .unwrap();

        assert_eq!(
            rows,
            vec![
                json!({"verse_id": 1, "ccc_nums": [279, 290]}),
                json!({"verse_id": 3, "ccc_nums": null}),
            ]
        );
    }

    #[test]
    fn test_dataset_rejects_non_object() {
        assert!(MemoryClient::from_dataset(json!([1, 2])).is_err());
        assert!(MemoryClient::from_dataset(json!({"t": 5})).is_err());
    }
}
