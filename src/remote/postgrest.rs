use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{Client, Response};
use serde::Deserialize;
use serde_json::Value;
use url::Url;

use crate::app::error::NOT_FOUND_CODE;
use crate::app::{LectioError, Result};
use crate::config::RemoteConfig;
use crate::remote::{row_count, single_row_error, RemoteClient, Rows, TableQuery};

const SINGLE_OBJECT: &str = "application/vnd.pgrst.object+json";

/// reqwest-based client for a PostgREST endpoint (`{url}/rest/v1`).
pub struct PostgrestClient {
    client: Client,
    rest_url: Url,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: Option<String>,
    message: Option<String>,
    details: Option<String>,
}

impl PostgrestClient {
    pub fn new(config: &RemoteConfig) -> Result<Self> {
        let mut base = config.url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let rest_url = Url::parse(&base)?.join("rest/v1/")?;

        let mut headers = HeaderMap::new();
        let key = HeaderValue::from_str(&config.api_key)
            .map_err(|_| LectioError::Config("API key is not a valid header value".into()))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", config.api_key))
            .map_err(|_| LectioError::Config("API key is not a valid header value".into()))?;
        headers.insert("apikey", key);
        headers.insert(AUTHORIZATION, bearer);

        let client = Client::builder()
            .timeout(config.timeout())
            .gzip(true)
            .brotli(true)
            .user_agent("lectio/0.1.0")
            .default_headers(headers)
            .build()?;

        Ok(Self { client, rest_url })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.rest_url.join(path)?)
    }

    async fn read_body(response: Response) -> Result<Value> {
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(Self::error_from_body(status.as_u16(), &body));
        }
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&body)?)
    }

    fn error_from_body(status: u16, body: &str) -> LectioError {
        let parsed: Option<ApiError> = serde_json::from_str(body).ok();
        match parsed {
            Some(ApiError {
                code: Some(code),
                message,
                details,
            }) if code == NOT_FOUND_CODE => {
                let details = details
                    .or(message)
                    .unwrap_or_else(|| "no rows returned".to_string());
                single_row_error(row_count(&details), details)
            }
            Some(api) => LectioError::Query {
                code: api.code.or_else(|| Some(status.to_string())),
                message: api
                    .message
                    .unwrap_or_else(|| format!("request failed with status {}", status)),
            },
            None => LectioError::Query {
                code: Some(status.to_string()),
                message: if body.trim().is_empty() {
                    format!("request failed with status {}", status)
                } else {
                    body.trim().to_string()
                },
            },
        }
    }

    fn into_rows(value: Value) -> Result<Rows> {
        match value {
            Value::Array(rows) => Ok(rows),
            Value::Null => Ok(Vec::new()),
            other @ Value::Object(_) => Ok(vec![other]),
            other => Err(LectioError::Decode(format!(
                "expected rows, got {}",
                other
            ))),
        }
    }
}

#[async_trait]
impl RemoteClient for PostgrestClient {
    async fn query(&self, query: &TableQuery) -> Result<Rows> {
        let url = self.endpoint(&query.table)?;
        let mut request = self.client.get(url).query(&query.to_params());
        if query.single {
            request = request.header(ACCEPT, SINGLE_OBJECT);
        }

        tracing::debug!("GET {} {:?}", query.table, query.to_params());
        let response = request.send().await?;
        let body = Self::read_body(response).await?;
        Self::into_rows(body)
    }

    async fn call(&self, procedure: &str, args: Value) -> Result<Rows> {
        let url = self.endpoint(&format!("rpc/{}", procedure))?;

        tracing::debug!("POST rpc/{}", procedure);
        let response = self.client.post(url).json(&args).send().await?;
        let body = Self::read_body(response).await?;
        Self::into_rows(body)
    }
}
