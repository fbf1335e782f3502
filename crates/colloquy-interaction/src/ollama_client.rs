//! Ollama REST client.

use crate::client_spec::ClientSpec;
use crate::http::{error_from_response, request_error};
use async_trait::async_trait;
use colloquy_core::llm::{
    ChatClient, ChatMessage, ChatRole, Completion, CompletionRequest, TokenUsage, ToolCall,
    ToolSpec,
};
use colloquy_core::{ColloquyError, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};

const PROVIDER: &str = "ollama";

/// An Ollama client bound to one [`ClientSpec`].
///
/// Ollama has no token counting endpoint; [`count_tokens`](ChatClient::count_tokens)
/// always reports a metering failure and usage comes from the
/// `prompt_eval_count` / `eval_count` fields of each response.
pub struct OllamaClient {
    client: Client,
    base_url: String,
    spec: ClientSpec,
}

impl OllamaClient {
    pub fn new(base_url: impl Into<String>, spec: ClientSpec) -> Result<Self> {
        let client = Client::builder()
            .timeout(spec.timeout())
            .build()
            .map_err(|e| ColloquyError::config(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            spec,
        })
    }

    pub fn spec(&self) -> &ClientSpec {
        &self.spec
    }
}

#[async_trait]
impl ChatClient for OllamaClient {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion> {
        let body = ChatRequest {
            model: self.spec.model(),
            messages: request.messages.iter().map(OllamaMessage::from).collect(),
            stream: false,
            options: Options {
                temperature: self.spec.temperature(),
                num_predict: self.spec.max_tokens(),
            },
            tools: request.tools.iter().map(OllamaTool::from).collect(),
        };

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| request_error(PROVIDER, self.spec.timeout(), e))?;

        if !response.status().is_success() {
            return Err(error_from_response(PROVIDER, response).await);
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| {
            ColloquyError::provider(PROVIDER, format!("Failed to parse response: {e}"))
        })?;

        let usage = match (parsed.prompt_eval_count, parsed.eval_count) {
            (None, None) => None,
            (prompt, completion) => Some(TokenUsage {
                prompt_tokens: prompt.unwrap_or(0),
                completion_tokens: completion.unwrap_or(0),
            }),
        };

        Ok(Completion {
            content: parsed.message.content,
            usage,
            tool_call: parsed
                .message
                .tool_calls
                .into_iter()
                .next()
                .map(|call| ToolCall {
                    name: call.function.name,
                    arguments: call.function.arguments,
                }),
        })
    }

    async fn count_tokens(&self, _texts: &[String]) -> Result<Vec<u32>> {
        Err(ColloquyError::metering(
            "ollama does not provide a token counting endpoint",
        ))
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<OllamaMessage<'a>>,
    stream: bool,
    options: Options,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<OllamaTool<'a>>,
}

#[derive(Serialize)]
struct Options {
    temperature: f32,
    num_predict: u32,
}

#[derive(Serialize)]
struct OllamaMessage<'a> {
    role: &'static str,
    content: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<OllamaToolCallOut<'a>>,
}

impl<'a> From<&'a ChatMessage> for OllamaMessage<'a> {
    fn from(message: &'a ChatMessage) -> Self {
        let role = match message.role {
            ChatRole::System => "system",
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
            ChatRole::Function => "tool",
        };
        Self {
            role,
            content: &message.content,
            tool_calls: message
                .function_call
                .iter()
                .map(|call| OllamaToolCallOut {
                    function: OllamaFunctionOut {
                        name: &call.name,
                        arguments: &call.arguments,
                    },
                })
                .collect(),
        }
    }
}

#[derive(Serialize)]
struct OllamaToolCallOut<'a> {
    function: OllamaFunctionOut<'a>,
}

#[derive(Serialize)]
struct OllamaFunctionOut<'a> {
    name: &'a str,
    arguments: &'a serde_json::Value,
}

#[derive(Serialize)]
struct OllamaTool<'a> {
    r#type: &'static str,
    function: OllamaToolFunction<'a>,
}

#[derive(Serialize)]
struct OllamaToolFunction<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a serde_json::Value,
}

impl<'a> From<&'a ToolSpec> for OllamaTool<'a> {
    fn from(tool: &'a ToolSpec) -> Self {
        Self {
            r#type: "function",
            function: OllamaToolFunction {
                name: &tool.name,
                description: &tool.description,
                parameters: &tool.input_schema,
            },
        }
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ResponseMessage,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: String,
    #[serde(default)]
    tool_calls: Vec<ResponseToolCall>,
}

#[derive(Deserialize)]
struct ResponseToolCall {
    function: ResponseFunction,
}

#[derive(Deserialize)]
struct ResponseFunction {
    name: String,
    #[serde(default)]
    arguments: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use colloquy_core::agent::ProviderKind;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> OllamaClient {
        let spec = ClientSpec::new(
            ProviderKind::Ollama,
            "mistral:7b",
            0.6,
            false,
            800,
            Duration::from_secs(5),
        );
        OllamaClient::new(format!("{}/", server.uri()), spec).unwrap()
    }

    #[tokio::test]
    async fn test_complete_maps_usage_from_eval_counts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(body_partial_json(json!({
                "model": "mistral:7b",
                "stream": false,
                "options": {"num_predict": 800},
                "messages": [
                    {"role": "system", "content": "be brief"},
                    {"role": "user", "content": "hi"}
                ],
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "model": "mistral:7b",
                "message": {"role": "assistant", "content": "hello"},
                "done": true,
                "prompt_eval_count": 26,
                "eval_count": 5,
            })))
            .mount(&server)
            .await;

        let completion = client_for(&server)
            .complete(CompletionRequest::new(vec![
                ChatMessage::system("be brief"),
                ChatMessage::user("hi"),
            ]))
            .await
            .unwrap();

        assert_eq!(completion.content, "hello");
        assert_eq!(
            completion.usage,
            Some(TokenUsage {
                prompt_tokens: 26,
                completion_tokens: 5
            })
        );
    }

    #[tokio::test]
    async fn test_missing_counts_mean_no_usage() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "message": {"role": "assistant", "content": "ok"},
                "done": true,
            })))
            .mount(&server)
            .await;

        let completion = client_for(&server)
            .complete(CompletionRequest::new(vec![ChatMessage::user("hi")]))
            .await
            .unwrap();
        assert!(completion.usage.is_none());
    }

    #[tokio::test]
    async fn test_tool_call_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(body_partial_json(json!({
                "tools": [{"type": "function", "function": {"name": "ls"}}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "message": {
                    "role": "assistant",
                    "content": "",
                    "tool_calls": [{"function": {"name": "ls", "arguments": {"path": "/tmp"}}}]
                },
                "done": true,
            })))
            .mount(&server)
            .await;

        let tool = ToolSpec {
            name: "ls".to_string(),
            description: "List files".to_string(),
            input_schema: json!({"type": "object"}),
        };
        let completion = client_for(&server)
            .complete(CompletionRequest::new(vec![ChatMessage::user("list")]).with_tools(vec![tool]))
            .await
            .unwrap();
        let call = completion.tool_call.unwrap();
        assert_eq!(call.name, "ls");
        assert_eq!(call.arguments, json!({"path": "/tmp"}));
    }

    #[tokio::test]
    async fn test_count_tokens_is_unsupported() {
        let server = MockServer::start().await;
        let err = client_for(&server)
            .count_tokens(&["x".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, ColloquyError::Metering(_)));
    }

    #[tokio::test]
    async fn test_model_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(
                ResponseTemplate::new(404).set_body_json(json!({"error": "model 'mistral:7b' not found"})),
            )
            .mount(&server)
            .await;

        let err = client_for(&server)
            .complete(CompletionRequest::new(vec![ChatMessage::user("hi")]))
            .await
            .unwrap_err();
        assert!(err.is_provider());
        assert!(err.to_string().contains("not found"));
    }
}
