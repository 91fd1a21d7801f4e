pub mod memory;
pub mod postgrest;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::app::error::NOT_FOUND_CODE;
use crate::app::{LectioError, Result};

pub use memory::MemoryClient;
pub use postgrest::PostgrestClient;

/// Raw rows as returned by the backend.
pub type Rows = Vec<Value>;

/// Server-side function returning Catechism paragraphs per verse id.
pub const CCC_LINKS_PROCEDURE: &str = "get_ccc_links_for_verse_ids";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    Eq { column: String, value: String },
    In { column: String, values: Vec<String> },
    NotNull { column: String },
}

/// A read against one table: projection, equality filters, ordering and
/// optional single-row mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableQuery {
    pub table: String,
    pub columns: String,
    pub filters: Vec<Filter>,
    pub order: Vec<String>,
    pub single: bool,
}

impl TableQuery {
    pub fn from(table: &str) -> Self {
        Self {
            table: table.to_string(),
            columns: "*".to_string(),
            filters: Vec::new(),
            order: Vec::new(),
            single: false,
        }
    }

    pub fn select(mut self, columns: &str) -> Self {
        self.columns = columns.to_string();
        self
    }

    pub fn eq(mut self, column: &str, value: impl ToString) -> Self {
        self.filters.push(Filter::Eq {
            column: column.to_string(),
            value: value.to_string(),
        });
        self
    }

    pub fn is_in<V: ToString>(mut self, column: &str, values: impl IntoIterator<Item = V>) -> Self {
        self.filters.push(Filter::In {
            column: column.to_string(),
            values: values.into_iter().map(|v| v.to_string()).collect(),
        });
        self
    }

    pub fn not_null(mut self, column: &str) -> Self {
        self.filters.push(Filter::NotNull {
            column: column.to_string(),
        });
        self
    }

    /// Ascending order on `column`; repeated calls add tie-breakers.
    pub fn order(mut self, column: &str) -> Self {
        self.order.push(column.to_string());
        self
    }

    /// Expect exactly one row; zero rows is reported as not found.
    pub fn single(mut self) -> Self {
        self.single = true;
        self
    }

    /// Query-string parameters in PostgREST syntax.
    pub fn to_params(&self) -> Vec<(String, String)> {
        let mut params = vec![("select".to_string(), self.columns.clone())];

        for filter in &self.filters {
            match filter {
                Filter::Eq { column, value } => {
                    params.push((column.clone(), format!("eq.{}", value)));
                }
                Filter::In { column, values } => {
                    params.push((column.clone(), format!("in.({})", values.join(","))));
                }
                Filter::NotNull { column } => {
                    params.push((column.clone(), "not.is.null".to_string()));
                }
            }
        }

        if !self.order.is_empty() {
            let order = self
                .order
                .iter()
                .map(|c| format!("{}.asc", c))
                .collect::<Vec<_>>()
                .join(",");
            params.push(("order".to_string(), order));
        }

        params
    }
}

/// The backend capability: table reads and stored-procedure calls.
#[async_trait]
pub trait RemoteClient {
    async fn query(&self, query: &TableQuery) -> Result<Rows>;

    async fn call(&self, procedure: &str, args: Value) -> Result<Rows>;
}

/// Error for a single-row read that matched `count` rows.
///
/// No rows, or an unknown count, is a missing entity. More than one row is
/// an ambiguous filter and reported as a failed query.
pub fn single_row_error(count: Option<usize>, details: String) -> LectioError {
    match count {
        Some(n) if n > 1 => LectioError::Query {
            code: Some(NOT_FOUND_CODE.to_string()),
            message: details,
        },
        _ => LectioError::NotFound(details),
    }
}

/// Row count in a `PGRST116` detail such as "The result contains 2 rows".
pub fn row_count(details: &str) -> Option<usize> {
    details.split_whitespace().find_map(|word| word.parse().ok())
}

pub fn decode_rows<T: DeserializeOwned>(rows: Rows) -> Result<Vec<T>> {
    rows.into_iter()
        .map(|row| serde_json::from_value(row).map_err(LectioError::from))
        .collect()
}

pub fn decode_single<T: DeserializeOwned>(rows: Rows) -> Result<T> {
    let row = rows
        .into_iter()
        .next()
        .ok_or_else(|| LectioError::Decode("expected one row, got none".into()))?;
    Ok(serde_json::from_value(row)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_params_cover_every_filter() {
        let query = TableQuery::from("bible_books")
            .select("genre_id")
            .eq("testament_id", 2)
            .is_in("genre_id", [3, 5])
            .not_null("genre_id")
            .order("bible_order");

        assert_eq!(
            query.to_params(),
            vec![
                ("select".to_string(), "genre_id".to_string()),
                ("testament_id".to_string(), "eq.2".to_string()),
                ("genre_id".to_string(), "in.(3,5)".to_string()),
                ("genre_id".to_string(), "not.is.null".to_string()),
                ("order".to_string(), "bible_order.asc".to_string()),
            ]
        );
    }

    #[test]
    fn test_multi_column_order() {
        let query = TableQuery::from("bible_content_units")
            .order("chapter_number")
            .order("sort_key");
        let params = query.to_params();
        assert_eq!(
            params.last(),
            Some(&("order".to_string(), "chapter_number.asc,sort_key.asc".to_string()))
        );
    }

    #[test]
    fn test_decode_single_empty_is_decode_error() {
        let err = decode_single::<i64>(vec![]).unwrap_err();
        assert!(matches!(err, LectioError::Decode(_)));
    }

    #[test]
    fn test_decode_rows_reports_bad_shape() {
        let rows = vec![json!({"lang_id": "not a number", "lang": "English"})];
        let err = decode_rows::<crate::domain::Language>(rows).unwrap_err();
        assert!(matches!(err, LectioError::Decode(_)));
    }

    #[test]
    fn test_single_row_errors_by_count() {
        assert_eq!(row_count("The result contains 0 rows"), Some(0));
        assert_eq!(row_count("multiple (or no) rows returned"), None);

        let none = single_row_error(Some(0), "The result contains 0 rows".into());
        assert!(matches!(none, LectioError::NotFound(_)));
        let unknown = single_row_error(None, "no rows returned".into());
        assert!(matches!(unknown, LectioError::NotFound(_)));
        let many = single_row_error(Some(3), "The result contains 3 rows".into());
        assert!(matches!(many, LectioError::Query { .. }));
    }
}
