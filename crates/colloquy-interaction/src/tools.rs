//! Tool-providing endpoints.
//!
//! An endpoint lists tools with JSON-schema parameter specs and executes a
//! tool by name. [`ToolRegistry`] maps configured endpoint names to
//! providers.

use crate::http::{error_from_response, request_error};
use async_trait::async_trait;
use colloquy_core::config::ToolEndpoint;
use colloquy_core::llm::ToolSpec;
use colloquy_core::{ColloquyError, Result};
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

pub const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(5);
pub const EXECUTION_TIMEOUT: Duration = Duration::from_secs(30);

/// A source of callable tools.
#[async_trait]
pub trait ToolProvider: Send + Sync {
    async fn list_tools(&self) -> Result<Vec<ToolSpec>>;

    /// Runs a tool and returns its text output.
    async fn execute(&self, name: &str, params: Value) -> Result<String>;
}

/// Tool endpoint over plain HTTP.
///
/// - `GET {url}/tools` returns `{"tools": [...]}` or a bare array
/// - `POST {url}/tools/{name}` with the JSON params returns `{"result": "..."}`
pub struct HttpToolProvider {
    client: Client,
    base_url: String,
    discovery_timeout: Duration,
    execution_timeout: Duration,
}

impl HttpToolProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            discovery_timeout: DISCOVERY_TIMEOUT,
            execution_timeout: EXECUTION_TIMEOUT,
        }
    }

    pub fn with_timeouts(mut self, discovery: Duration, execution: Duration) -> Self {
        self.discovery_timeout = discovery;
        self.execution_timeout = execution;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ToolListResponse {
    Wrapped { tools: Vec<ToolSpec> },
    Bare(Vec<ToolSpec>),
}

#[derive(Deserialize)]
struct ExecuteResponse {
    result: Value,
}

#[async_trait]
impl ToolProvider for HttpToolProvider {
    async fn list_tools(&self) -> Result<Vec<ToolSpec>> {
        let response = self
            .client
            .get(format!("{}/tools", self.base_url))
            .timeout(self.discovery_timeout)
            .send()
            .await
            .map_err(|e| tool_error(request_error("tools", self.discovery_timeout, e)))?;

        if !response.status().is_success() {
            return Err(tool_error(error_from_response("tools", response).await));
        }

        let parsed: ToolListResponse = response
            .json()
            .await
            .map_err(|e| ColloquyError::tool(format!("Failed to parse tool list: {e}")))?;
        Ok(match parsed {
            ToolListResponse::Wrapped { tools } | ToolListResponse::Bare(tools) => tools,
        })
    }

    async fn execute(&self, name: &str, params: Value) -> Result<String> {
        tracing::info!("[Tools] Executing {} at {}", name, self.base_url);
        let response = self
            .client
            .post(format!("{}/tools/{}", self.base_url, name))
            .timeout(self.execution_timeout)
            .json(&params)
            .send()
            .await
            .map_err(|e| tool_error(request_error("tools", self.execution_timeout, e)))?;

        if !response.status().is_success() {
            return Err(tool_error(error_from_response("tools", response).await));
        }

        let parsed: ExecuteResponse = response
            .json()
            .await
            .map_err(|e| ColloquyError::tool(format!("Failed to parse tool result: {e}")))?;
        Ok(match parsed.result {
            Value::String(text) => text,
            other => other.to_string(),
        })
    }
}

fn tool_error(err: ColloquyError) -> ColloquyError {
    ColloquyError::tool(err.to_string())
}

/// Named tool providers.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    providers: HashMap<String, Arc<dyn ToolProvider>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// HTTP providers for every configured endpoint.
    pub fn from_endpoints(endpoints: &[ToolEndpoint]) -> Self {
        let mut registry = Self::new();
        for endpoint in endpoints {
            registry.register(&endpoint.name, Arc::new(HttpToolProvider::new(&endpoint.url)));
        }
        registry
    }

    pub fn register(&mut self, name: impl Into<String>, provider: Arc<dyn ToolProvider>) {
        self.providers.insert(name.into(), provider);
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn ToolProvider>> {
        self.providers
            .get(name)
            .cloned()
            .ok_or_else(|| ColloquyError::config(format!("unknown tool endpoint '{name}'")))
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.providers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Tools of each named endpoint, tagged with the endpoint name.
    ///
    /// An unknown endpoint name is a configuration error; an endpoint that
    /// fails discovery is skipped with a warning.
    pub async fn discover(&self, endpoints: &[String]) -> Result<Vec<(String, ToolSpec)>> {
        let mut tools = Vec::new();
        for endpoint in endpoints {
            let provider = self.get(endpoint)?;
            match provider.list_tools().await {
                Ok(list) => {
                    tracing::debug!("[Tools] {} offers {} tool(s)", endpoint, list.len());
                    tools.extend(list.into_iter().map(|tool| (endpoint.clone(), tool)));
                }
                Err(e) => tracing::warn!("[Tools] Discovery failed for {}: {}", endpoint, e),
            }
        }
        Ok(tools)
    }
}

fn param_regex() -> Option<&'static Regex> {
    static PARAM: OnceLock<Option<Regex>> = OnceLock::new();
    PARAM
        .get_or_init(|| Regex::new(r"(\w+)\s*=\s*([^,\s]+)").ok())
        .as_ref()
}

/// Extracts `key=value` pairs from free text.
///
/// Integers and `true`/`false` are coerced; everything else stays a
/// string. Later duplicates win.
///
/// ```
/// use colloquy_interaction::tools::extract_params;
///
/// let params = extract_params("calculate expression=2+2, precise=true, digits=3");
/// assert_eq!(params["expression"], "2+2");
/// assert_eq!(params["precise"], true);
/// assert_eq!(params["digits"], 3);
/// ```
pub fn extract_params(text: &str) -> Map<String, Value> {
    let mut params = Map::new();
    let Some(pattern) = param_regex() else {
        return params;
    };
    for caps in pattern.captures_iter(text) {
        let key = caps[1].to_string();
        let raw = &caps[2];
        let value = if let Ok(int) = raw.parse::<i64>() {
            Value::from(int)
        } else if raw.eq_ignore_ascii_case("true") {
            Value::Bool(true)
        } else if raw.eq_ignore_ascii_case("false") {
            Value::Bool(false)
        } else {
            Value::String(raw.to_string())
        };
        params.insert(key, value);
    }
    params
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_list_tools_wrapped_and_bare() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tools"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "tools": [{
                    "name": "calculate",
                    "description": "Evaluate an expression",
                    "input_schema": {"type": "object", "properties": {"expression": {"type": "string"}}}
                }]
            })))
            .mount(&server)
            .await;

        let tools = HttpToolProvider::new(server.uri()).list_tools().await.unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "calculate");
        assert_eq!(tools[0].input_schema["type"], "object");

        let bare = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tools"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"name": "fetch_url", "inputSchema": {"type": "object"}}
            ])))
            .mount(&bare)
            .await;
        let tools = HttpToolProvider::new(bare.uri()).list_tools().await.unwrap();
        assert_eq!(tools[0].name, "fetch_url");
        assert_eq!(tools[0].description, "");
    }

    #[tokio::test]
    async fn test_execute() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tools/calculate"))
            .and(body_json(json!({"expression": "2+2"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": "4"})))
            .mount(&server)
            .await;

        let output = HttpToolProvider::new(server.uri())
            .execute("calculate", json!({"expression": "2+2"}))
            .await
            .unwrap();
        assert_eq!(output, "4");
    }

    #[tokio::test]
    async fn test_execute_failure_is_tool_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tools/broken"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let err = HttpToolProvider::new(server.uri())
            .execute("broken", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ColloquyError::Tool(_)));
    }

    #[tokio::test]
    async fn test_slow_discovery_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tools"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([]))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let provider = HttpToolProvider::new(server.uri())
            .with_timeouts(Duration::from_millis(50), EXECUTION_TIMEOUT);
        assert!(provider.list_tools().await.is_err());
    }

    #[tokio::test]
    async fn test_registry_discovery() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tools"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"name": "calculate"}])))
            .mount(&server)
            .await;

        let registry = ToolRegistry::from_endpoints(&[
            ToolEndpoint {
                name: "math".to_string(),
                url: server.uri(),
            },
            ToolEndpoint {
                name: "dead".to_string(),
                url: "http://127.0.0.1:9".to_string(),
            },
        ]);
        assert_eq!(registry.names(), vec!["dead".to_string(), "math".to_string()]);

        let tools = registry
            .discover(&["math".to_string(), "dead".to_string()])
            .await
            .unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].0, "math");

        assert!(registry.discover(&["nope".to_string()]).await.unwrap_err().is_config());
    }

    #[test]
    fn test_extract_params() {
        let params = extract_params("run url=http://x.io/a?b, retries = 3 ,verbose=FALSE");
        assert_eq!(params["url"], "http://x.io/a?b");
        assert_eq!(params["retries"], 3);
        assert_eq!(params["verbose"], false);
        assert!(extract_params("no pairs here").is_empty());
    }
}
