/*
 * REST client for the arbitrage dashboard backend
 */

pub mod types;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Method, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};
use crate::config::BackendConfig;
use crate::models::{ArbitrageOpportunity, ArbviewError, PricePoint, Result};

pub use types::*;

/// Stateless apart from the base URL and the pooled HTTP client. No retries, no caching.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| ArbviewError::ConfigError(format!("Invalid backend URL {}: {e}", config.base_url)))?;
        if base_url.cannot_be_a_base() {
            return Err(ArbviewError::ConfigError(format!(
                "Backend URL cannot carry paths: {}",
                config.base_url
            )));
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(config.timeout())
            .default_headers(headers)
            .build()?;

        Ok(Self { client, base_url })
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| ArbviewError::ConfigError(format!("Backend URL cannot carry paths: {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, segments: &[&str]) -> Result<RequestBuilder> {
        Ok(self.client.request(method, self.endpoint(segments)?))
    }

    /// Sends and normalises failures: a response with a non-2xx status becomes
    /// `ServerError` carrying the body, anything without a response (or with a body
    /// that breaks off mid-read) stays a transport error.
    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<ApiResponse<T>> {
        let request = request.build()?;
        let method = request.method().clone();
        let url = request.url().clone();
        debug!("{} {}", method, url);

        let response = self.client.execute(request).await.map_err(|e| {
            warn!("{} {} failed without response: {}", method, url, e);
            ArbviewError::NetworkError(e)
        })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.map_err(|e| {
                warn!("{} {} returned {} but the body could not be read: {}", method, url, status, e);
                ArbviewError::NetworkError(e)
            })?;
            let body = if text.trim().is_empty() {
                Value::Null
            } else {
                serde_json::from_str(&text).unwrap_or(Value::String(text))
            };
            warn!("{} {} returned {}: {}", method, url, status, crate::models::describe_body(&body));
            return Err(ArbviewError::ServerError {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(ApiResponse {
                code: i64::from(status.as_u16()),
                message: String::new(),
                data: None,
            });
        }
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn get<T, Q>(&self, segments: &[&str], query: Option<&Q>) -> Result<ApiResponse<T>>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        let mut request = self.request(Method::GET, segments)?;
        if let Some(query) = query {
            request = request.query(query);
        }
        self.send(request).await
    }

    async fn with_body<T, B>(&self, method: Method, segments: &[&str], body: Option<&B>) -> Result<ApiResponse<T>>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let mut request = self.request(method, segments)?;
        if let Some(body) = body {
            request = request.json(body);
        }
        self.send(request).await
    }

    // Opportunities and prices

    pub async fn get_opportunities(&self, query: &OpportunityQuery) -> Result<ApiResponse<Value>> {
        self.get(&["opportunities"], Some(query)).await
    }

    pub async fn get_price_comparison(&self, query: &PriceComparisonQuery) -> Result<ApiResponse<Value>> {
        self.get(&["price-comparison"], Some(query)).await
    }

    // Tasks

    pub async fn get_tasks(&self, query: &TaskListQuery) -> Result<ApiResponse<TaskList>> {
        self.get(&["tasks"], Some(query)).await
    }

    pub async fn get_task(&self, task_id: &str) -> Result<ApiResponse<TaskDetail>> {
        self.get::<_, ()>(&["tasks", task_id], None).await
    }

    pub async fn get_task_logs(&self, task_id: &str, query: &LogQuery) -> Result<ApiResponse<TaskLogs>> {
        self.get(&["tasks", task_id, "logs"], Some(query)).await
    }

    pub async fn cancel_task(&self, task_id: &str, payload: Option<&CancelTaskPayload>) -> Result<ApiResponse<TaskDetail>> {
        self.with_body(Method::POST, &["tasks", task_id, "cancel"], payload).await
    }

    // Templates

    pub async fn get_templates(&self) -> Result<ApiResponse<Vec<Template>>> {
        self.get::<_, ()>(&["templates"], None).await
    }

    pub async fn create_template(&self, payload: &TemplatePayload) -> Result<ApiResponse<Template>> {
        self.with_body(Method::POST, &["templates"], Some(payload)).await
    }

    pub async fn update_template(&self, id: u64, payload: &TemplatePayload) -> Result<ApiResponse<Template>> {
        let id = id.to_string();
        self.with_body(Method::PUT, &["templates", &id], Some(payload)).await
    }

    pub async fn delete_template(&self, id: u64) -> Result<ApiResponse<Value>> {
        let id = id.to_string();
        self.with_body::<_, ()>(Method::DELETE, &["templates", &id], None).await
    }

    pub async fn run_template(&self, id: u64, payload: Option<&RunTemplatePayload>) -> Result<ApiResponse<TaskDetail>> {
        let id = id.to_string();
        self.with_body(Method::POST, &["templates", &id, "run"], payload).await
    }

    // Batches

    pub async fn get_batches(&self) -> Result<ApiResponse<Vec<Batch>>> {
        self.get::<_, ()>(&["batches"], None).await
    }

    pub async fn get_batch(&self, id: u64) -> Result<ApiResponse<Batch>> {
        let id = id.to_string();
        self.get::<_, ()>(&["batches", &id], None).await
    }

    pub async fn create_batch(&self, payload: &BatchPayload) -> Result<ApiResponse<Batch>> {
        self.with_body(Method::POST, &["batches"], Some(payload)).await
    }

    pub async fn update_batch(&self, id: u64, payload: &BatchPayload) -> Result<ApiResponse<Batch>> {
        let id = id.to_string();
        self.with_body(Method::PUT, &["batches", &id], Some(payload)).await
    }

    // Reports

    pub async fn get_reports(&self, filter: &BatchFilter) -> Result<ApiResponse<Vec<Report>>> {
        self.get(&["reports"], Some(filter)).await
    }

    pub async fn create_report(&self, payload: &ReportPayload) -> Result<ApiResponse<Report>> {
        self.with_body(Method::POST, &["reports"], Some(payload)).await
    }

    pub async fn delete_report(&self, id: u64) -> Result<ApiResponse<Value>> {
        let id = id.to_string();
        self.with_body::<_, ()>(Method::DELETE, &["reports", &id], None).await
    }

    // Experiments

    pub async fn get_experiments(&self, filter: &BatchFilter) -> Result<ApiResponse<Vec<Experiment>>> {
        self.get(&["experiments"], Some(filter)).await
    }

    pub async fn create_experiment(&self, payload: &ExperimentPayload) -> Result<ApiResponse<Experiment>> {
        self.with_body(Method::POST, &["experiments"], Some(payload)).await
    }

    pub async fn get_experiment(&self, id: u64) -> Result<ApiResponse<ExperimentDetail>> {
        let id = id.to_string();
        self.get::<_, ()>(&["experiments", &id], None).await
    }

    pub async fn get_experiment_runs(&self, id: u64) -> Result<ApiResponse<Vec<ExperimentRun>>> {
        let id = id.to_string();
        self.get::<_, ()>(&["experiments", &id, "runs"], None).await
    }

    pub async fn run_experiment(&self, id: u64, payload: &RunExperimentPayload) -> Result<ApiResponse<Value>> {
        let id = id.to_string();
        self.with_body(Method::POST, &["experiments", &id, "runs"], Some(payload)).await
    }
}

/// Picks the record array out of a payload that is either a bare array or a
/// wrapper object holding one under a known key. `null` means no data.
fn record_array<'a>(payload: &'a Value, keys: &[&str]) -> Result<Option<&'a Vec<Value>>> {
    match payload {
        Value::Null => Ok(None),
        Value::Array(items) => Ok(Some(items)),
        Value::Object(map) => keys
            .iter()
            .find_map(|key| map.get(*key))
            .map_or(Ok(None), |inner| match inner {
                Value::Null => Ok(None),
                Value::Array(items) => Ok(Some(items)),
                other => Err(shape_error(other)),
            }),
        other => Err(shape_error(other)),
    }
}

fn shape_error(value: &Value) -> ArbviewError {
    ArbviewError::SerializationError(<serde_json::Error as serde::de::Error>::custom(format!(
        "expected an array of records, got {value}"
    )))
}

pub fn parse_opportunities(payload: &Value) -> Result<Vec<ArbitrageOpportunity>> {
    let Some(items) = record_array(payload, &["items", "opportunities", "data"])? else {
        return Ok(Vec::new());
    };
    items
        .iter()
        .map(|item| serde_json::from_value(item.clone()).map_err(ArbviewError::from))
        .collect()
}

pub fn parse_price_points(payload: &Value) -> Result<Vec<PricePoint>> {
    let Some(items) = record_array(payload, &["items", "points", "data"])? else {
        return Ok(Vec::new());
    };
    items
        .iter()
        .map(|item| serde_json::from_value(item.clone()).map_err(ArbviewError::from))
        .collect()
}
