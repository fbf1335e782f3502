//! GigaChat REST client.
//!
//! Authorization is a two-step flow: Basic credentials are exchanged at the
//! OAuth endpoint for a short-lived bearer token, which [`GigaChatAuth`]
//! caches until shortly before it expires. One `GigaChatAuth` is shared by
//! every GigaChat client handle.

use crate::client_spec::ClientSpec;
use crate::http::{error_from_response, request_error};
use async_trait::async_trait;
use colloquy_core::llm::{
    ChatClient, ChatMessage, Completion, CompletionRequest, TokenUsage, ToolCall, ToolSpec,
};
use colloquy_core::{ColloquyError, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::Mutex;

const PROVIDER: &str = "gigachat";
const OAUTH_TIMEOUT: Duration = Duration::from_secs(30);
/// Tokens are refreshed this long before `expires_at`.
const TOKEN_REFRESH_MARGIN_MS: i64 = 60_000;

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at_ms: i64,
}

/// Bearer token provider for the GigaChat API.
pub struct GigaChatAuth {
    client: Client,
    oauth_url: String,
    credentials: String,
    scope: String,
    token: Mutex<Option<CachedToken>>,
}

impl GigaChatAuth {
    pub fn new(
        oauth_url: impl Into<String>,
        credentials: impl Into<String>,
        scope: impl Into<String>,
        accept_invalid_certs: bool,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(OAUTH_TIMEOUT)
            .danger_accept_invalid_certs(accept_invalid_certs)
            .build()
            .map_err(|e| ColloquyError::config(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            oauth_url: oauth_url.into(),
            credentials: credentials.into(),
            scope: scope.into(),
            token: Mutex::new(None),
        })
    }

    /// A valid access token, fetching a new one when the cached token is
    /// missing or about to expire.
    pub async fn access_token(&self) -> Result<String> {
        let mut cached = self.token.lock().await;
        let now_ms = chrono::Utc::now().timestamp_millis();

        if let Some(token) = cached.as_ref() {
            if token.expires_at_ms - TOKEN_REFRESH_MARGIN_MS > now_ms {
                return Ok(token.access_token.clone());
            }
        }

        let fresh = self.fetch_token().await?;
        let access_token = fresh.access_token.clone();
        *cached = Some(fresh);
        Ok(access_token)
    }

    /// Drops the cached token so the next call re-authenticates.
    pub async fn invalidate(&self) {
        *self.token.lock().await = None;
    }

    async fn fetch_token(&self) -> Result<CachedToken> {
        tracing::debug!("[GigaChat] Requesting access token");
        let response = self
            .client
            .post(&self.oauth_url)
            .header("Authorization", format!("Basic {}", self.credentials))
            .header("RqUID", uuid::Uuid::new_v4().to_string())
            .header("Accept", "application/json")
            .form(&[("scope", self.scope.as_str())])
            .send()
            .await
            .map_err(|e| request_error(PROVIDER, OAUTH_TIMEOUT, e))?;

        if !response.status().is_success() {
            return Err(error_from_response(PROVIDER, response).await);
        }

        let parsed: OAuthResponse = response.json().await.map_err(|e| {
            ColloquyError::provider(PROVIDER, format!("Failed to parse OAuth response: {e}"))
        })?;

        Ok(CachedToken {
            access_token: parsed.access_token,
            expires_at_ms: parsed.expires_at,
        })
    }
}

/// A GigaChat client bound to one [`ClientSpec`].
pub struct GigaChatClient {
    client: Client,
    auth: std::sync::Arc<GigaChatAuth>,
    base_url: String,
    spec: ClientSpec,
}

impl GigaChatClient {
    pub fn new(
        auth: std::sync::Arc<GigaChatAuth>,
        base_url: impl Into<String>,
        spec: ClientSpec,
        accept_invalid_certs: bool,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(spec.timeout())
            .danger_accept_invalid_certs(accept_invalid_certs)
            .build()
            .map_err(|e| ColloquyError::config(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            auth,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            spec,
        })
    }

    pub fn spec(&self) -> &ClientSpec {
        &self.spec
    }

    async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<reqwest::Response> {
        let token = self.auth.access_token().await?;
        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(token)
            .header("Accept", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| request_error(PROVIDER, self.spec.timeout(), e))?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            self.auth.invalidate().await;
        }
        if !response.status().is_success() {
            return Err(error_from_response(PROVIDER, response).await);
        }
        Ok(response)
    }
}

#[async_trait]
impl ChatClient for GigaChatClient {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion> {
        let body = ChatCompletionRequest {
            model: self.spec.model(),
            messages: &request.messages,
            temperature: self.spec.temperature(),
            max_tokens: self.spec.max_tokens(),
            stream: false,
            function_call: (!request.tools.is_empty()).then_some("auto"),
            functions: request.tools.iter().map(FunctionSpec::from).collect(),
        };

        let parsed: ChatCompletionResponse = self
            .post("/chat/completions", &body)
            .await?
            .json()
            .await
            .map_err(|e| {
                ColloquyError::provider(PROVIDER, format!("Failed to parse response: {e}"))
            })?;

        let choice = parsed.choices.into_iter().next().ok_or_else(|| {
            ColloquyError::provider(PROVIDER, "response contained no choices")
        })?;

        Ok(Completion {
            content: choice.message.content.unwrap_or_default(),
            usage: parsed.usage.map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
            }),
            tool_call: choice.message.function_call.map(|call| ToolCall {
                name: call.name,
                arguments: call.arguments,
            }),
        })
    }

    async fn count_tokens(&self, texts: &[String]) -> Result<Vec<u32>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let body = TokenCountRequest {
            model: self.spec.model(),
            input: texts,
        };
        let response = self
            .post("/tokens/count", &body)
            .await
            .map_err(|e| ColloquyError::metering(e.to_string()))?;
        let counts: Vec<TokenCount> = response
            .json()
            .await
            .map_err(|e| ColloquyError::metering(format!("Failed to parse token counts: {e}")))?;
        Ok(counts.into_iter().map(|c| c.tokens).collect())
    }
}

#[derive(Deserialize)]
struct OAuthResponse {
    access_token: String,
    /// Milliseconds since the Unix epoch.
    expires_at: i64,
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    function_call: Option<&'static str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    functions: Vec<FunctionSpec<'a>>,
}

#[derive(Serialize)]
struct FunctionSpec<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a serde_json::Value,
}

impl<'a> From<&'a ToolSpec> for FunctionSpec<'a> {
    fn from(tool: &'a ToolSpec) -> Self {
        Self {
            name: &tool.name,
            description: &tool.description,
            parameters: &tool.input_schema,
        }
    }
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    function_call: Option<FunctionCall>,
}

#[derive(Deserialize)]
struct FunctionCall {
    name: String,
    #[serde(default)]
    arguments: serde_json::Value,
}

#[derive(Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Serialize)]
struct TokenCountRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct TokenCount {
    tokens: u32,
}
