//! `ObjectGenerator` (spec §6) — the only capability a Brain's `Step`
//! action or `Agent` block sees of the LLM layer.
//!
//! Backed by `sa_providers::router::LlmRouter`: `generate_text` is a
//! thin pass-through to `chat_for_role`, `generate_object` additionally
//! forces JSON mode and validates the result against the caller's
//! schema, retrying (`maxRetries`) on validation failure.

use std::sync::Arc;

use async_trait::async_trait;
use sa_domain::capability::ModelRole;
use sa_domain::error::{Error, Result};
use sa_domain::tool::{Message, ToolCall, ToolDefinition};
use sa_providers::router::LlmRouter;
use sa_providers::traits::ChatRequest;
use serde_json::Value;

/// `generateText` result (spec §6): text, tool calls, usage, and the
/// raw per-provider response messages for transcript reconstruction.
pub struct GenerateTextResult {
    pub text: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub total_tokens: u64,
}

pub struct GenerateTextRequest {
    pub system: Option<String>,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolDefinition>,
}

pub struct GenerateObjectRequest {
    pub schema: Value,
    pub schema_name: String,
    pub schema_description: Option<String>,
    pub prompt: Option<String>,
    pub messages: Option<Vec<Message>>,
    pub system: Option<String>,
    pub max_retries: u32,
}

#[async_trait]
pub trait ObjectGenerator: Send + Sync {
    async fn generate_text(&self, req: GenerateTextRequest) -> Result<GenerateTextResult>;
    async fn generate_object(&self, req: GenerateObjectRequest) -> Result<Value>;
}

pub struct RouterObjectGenerator {
    router: Arc<LlmRouter>,
}

impl RouterObjectGenerator {
    pub fn new(router: Arc<LlmRouter>) -> Self {
        Self { router }
    }

    fn messages_with_system(system: Option<&str>, mut messages: Vec<Message>) -> Vec<Message> {
        if let Some(s) = system {
            let mut out = Vec::with_capacity(messages.len() + 1);
            out.push(Message::system(s));
            out.append(&mut messages);
            out
        } else {
            messages
        }
    }
}

#[async_trait]
impl ObjectGenerator for RouterObjectGenerator {
    async fn generate_text(&self, req: GenerateTextRequest) -> Result<GenerateTextResult> {
        let messages = Self::messages_with_system(req.system.as_deref(), req.messages);
        let chat_req = ChatRequest {
            messages,
            tools: req.tools,
            json_mode: false,
            ..ChatRequest::default()
        };
        let resp = self
            .router
            .chat_for_role(ModelRole::Executor, chat_req)
            .await?;
        Ok(GenerateTextResult {
            text: if resp.content.is_empty() { None } else { Some(resp.content) },
            tool_calls: resp.tool_calls,
            total_tokens: resp.usage.map(|u| u.total_tokens as u64).unwrap_or(0),
        })
    }

    async fn generate_object(&self, req: GenerateObjectRequest) -> Result<Value> {
        let compiled = jsonschema::validator_for(&req.schema)
            .map_err(|e| Error::Config(format!("invalid schema \"{}\": {e}", req.schema_name)))?;

        let mut messages = req.messages.unwrap_or_default();
        if let Some(prompt) = &req.prompt {
            messages.push(Message::user(prompt.clone()));
        }
        let messages = Self::messages_with_system(req.system.as_deref(), messages);

        let mut last_err = None;
        for attempt in 0..=req.max_retries {
            let chat_req = ChatRequest {
                messages: messages.clone(),
                tools: Vec::new(),
                json_mode: true,
                ..ChatRequest::default()
            };
            let resp = self.router.chat_for_role(ModelRole::Executor, chat_req).await?;
            match serde_json::from_str::<Value>(&resp.content) {
                Ok(value) => {
                    let errors: Vec<_> = compiled.iter_errors(&value).map(|e| e.to_string()).collect();
                    if errors.is_empty() {
                        return Ok(value);
                    }
                    last_err = Some(Error::Upstream {
                        provider: "generate_object".into(),
                        message: format!("schema \"{}\" violated (attempt {attempt}): {}", req.schema_name, errors.join("; ")),
                    });
                }
                Err(e) => {
                    last_err = Some(Error::Json(e));
                }
            }
        }
        Err(last_err.unwrap_or_else(|| Error::Other("generate_object: no attempts made".into())))
    }
}
