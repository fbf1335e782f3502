//! Tool-augmented turns.

use super::direct::run_direct_turn;
use super::{TurnProcessor, TurnRequest, TurnServices};
use async_trait::async_trait;
use colloquy_core::Result;
use colloquy_core::chat::{Chat, Message, NewMessage};
use colloquy_core::llm::ToolSpec;
use colloquy_interaction::tools::{ToolRegistry, extract_params};
use serde_json::Value;

/// Messages starting with this prefix address a tool by name, e.g.
/// `/calculate expression=2+2`.
pub const TOOL_COMMAND_PREFIX: char = '/';

/// Direct turns with the configured tool endpoints offered to the model.
///
/// A message that names a tool with [`TOOL_COMMAND_PREFIX`] runs that tool
/// directly with `key=value` parameters taken from the message, without a
/// model call.
pub struct ToolTurnProcessor {
    services: TurnServices,
    tools: ToolRegistry,
    endpoints: Vec<String>,
}

impl ToolTurnProcessor {
    pub fn new(services: TurnServices, tools: ToolRegistry, endpoints: Vec<String>) -> Self {
        Self {
            services,
            tools,
            endpoints,
        }
    }

    async fn run_command(
        &self,
        chat: &Chat,
        request: &TurnRequest,
        command: &str,
        arguments: &str,
    ) -> Result<Vec<Message>> {
        let available = self.tools.discover(&self.endpoints).await?;

        let user = self
            .services
            .messages
            .append(NewMessage::user(
                &chat.id,
                &request.session_id,
                &request.user_name,
                &request.text,
            ))
            .await?;

        let agent = self.services.agent_for(request);
        let (body, meta) = match available.iter().find(|(_, tool)| tool.name == command) {
            Some((endpoint, tool)) => self.execute(endpoint, tool, arguments).await,
            None => {
                let names: Vec<&str> = available.iter().map(|(_, t)| t.name.as_str()).collect();
                (
                    format!(
                        "Unknown tool '{command}'. Available tools: {}",
                        names.join(", ")
                    ),
                    "Tool not found".to_string(),
                )
            }
        };

        let reply = self
            .services
            .messages
            .append(
                NewMessage::ai(&chat.id, &request.session_id, agent.id(), agent.name(), body)
                    .with_meta(meta),
            )
            .await?;
        Ok(vec![user, reply])
    }

    async fn execute(&self, endpoint: &str, tool: &ToolSpec, arguments: &str) -> (String, String) {
        let params = Value::Object(extract_params(arguments));
        tracing::info!("[ToolTurn] Running {} on {} with {}", tool.name, endpoint, params);

        let outcome = match self.tools.get(endpoint) {
            Ok(provider) => provider.execute(&tool.name, params).await,
            Err(e) => Err(e),
        };
        match outcome {
            Ok(output) => (
                format!("Result of tool '{}':\n{}", tool.name, output),
                format!("Tool: {}", tool.name),
            ),
            Err(e) => {
                tracing::error!("[ToolTurn] Tool {} failed: {}", tool.name, e);
                (
                    format!("Tool execution failed: {e}"),
                    "Tool execution failed".to_string(),
                )
            }
        }
    }
}

/// Splits `/name rest` into `("name", "rest")`.
fn parse_command(text: &str) -> Option<(&str, &str)> {
    let rest = text.trim().strip_prefix(TOOL_COMMAND_PREFIX)?;
    let (name, arguments) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
    (!name.is_empty()).then_some((name, arguments.trim()))
}

#[async_trait]
impl TurnProcessor for ToolTurnProcessor {
    async fn process(&self, chat: &Chat, request: &TurnRequest) -> Result<Vec<Message>> {
        match parse_command(&request.text) {
            Some((command, arguments)) => {
                self.run_command(chat, request, command, arguments).await
            }
            None => run_direct_turn(&self.services, chat, request, Some(&self.endpoints)).await,
        }
    }
}
