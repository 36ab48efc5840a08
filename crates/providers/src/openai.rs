//! OpenAI-compatible chat completions.
//!
//! Works with any `/chat/completions` endpoint (Groq, OpenRouter, OpenAI,
//! LM Studio). [`CompletionModel`] makes one tool-free call and returns the
//! text; [`ImageToolAgent`] binds the image tool, runs the tool calls itself
//! and returns the whole conversation trace.

use deck_core::prompt::{
    agent_prompt, outline_prompt, IMAGE_TOOL_DESCRIPTION, IMAGE_TOOL_NAME, SYSTEM_PROMPT,
};
use deck_core::{
    ConversationTrace, Error, GenerationRequest, ImageSearch, LanguageModel, RawOutput, Result,
    Role, ToolCallRecord, TraceMessage,
};
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

/// Default endpoint (Groq's OpenAI-compatible API).
pub const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";

/// Default model name.
pub const DEFAULT_MODEL: &str = "llama-3.3-70b-versatile";

/// Default per-call timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Longest error body echoed back in an error message.
const MAX_ERROR_BODY: usize = 500;

/// Connection settings for a chat endpoint.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl ChatConfig {
    /// Settings for the default endpoint and model.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.7,
            max_tokens: 2048,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: AssistantMessage,
}

#[derive(Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCallRecord>>,
}

/// Blocking client for one chat endpoint.
#[derive(Debug, Clone)]
pub struct ChatClient {
    config: ChatConfig,
    client: Client,
}

impl ChatClient {
    /// Build a client; fails when the API key is missing.
    pub fn new(config: ChatConfig) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            return Err(Error::Config("missing language model API key".to_string()));
        }
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { config, client })
    }

    /// The configured model name.
    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Send the conversation and return the assistant's reply.
    pub fn chat(&self, messages: &[TraceMessage], tools: &[Value]) -> Result<TraceMessage> {
        let body = self.request_body(messages, tools);
        log::debug!(
            "POST {} ({} messages, {} tools)",
            self.config.completions_url(),
            messages.len(),
            tools.len()
        );

        let response = self
            .client
            .post(self.config.completions_url())
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Model(format!("request timed out after {:?}", self.config.timeout))
                } else {
                    Error::Model(format!("request failed: {}", e))
                }
            })?;

        let status = response.status();
        let text = response
            .text()
            .map_err(|e| Error::Model(format!("Failed to read response body: {}", e)))?;
        if !status.is_success() {
            return Err(Error::Model(format!(
                "HTTP {}: {}",
                status.as_u16(),
                truncate(&text, MAX_ERROR_BODY)
            )));
        }

        parse_reply(&text)
    }

    fn request_body(&self, messages: &[TraceMessage], tools: &[Value]) -> Value {
        let mut body = json!({
            "model": self.config.model,
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_tokens,
            "messages": messages.iter().map(message_to_openai).collect::<Vec<_>>(),
        });
        if !tools.is_empty() {
            body["tools"] = Value::Array(tools.to_vec());
            body["tool_choice"] = json!("auto");
        }
        body
    }
}

/// Decode a chat completion body into the assistant message.
fn parse_reply(body: &str) -> Result<TraceMessage> {
    let response: ChatCompletionResponse = serde_json::from_str(body)
        .map_err(|e| Error::Model(format!("Unexpected response shape: {}", e)))?;
    let message = response
        .choices
        .into_iter()
        .next()
        .map(|c| c.message)
        .ok_or_else(|| Error::Model("response has no choices".to_string()))?;

    Ok(TraceMessage::new(Role::Ai, message.content.unwrap_or_default())
        .with_tool_calls(message.tool_calls.unwrap_or_default()))
}

fn message_to_openai(message: &TraceMessage) -> Value {
    let role = match message.role {
        Role::System => "system",
        Role::Human => "user",
        Role::Ai => "assistant",
        Role::Tool => "tool",
    };
    let mut value = json!({ "role": role, "content": message.content });

    if !message.tool_calls.is_empty() {
        value["tool_calls"] = message
            .tool_calls
            .iter()
            .map(|call| {
                json!({
                    "id": call.id,
                    "type": "function",
                    "function": { "name": call.name, "arguments": call.arguments.to_string() },
                })
            })
            .collect();
    }
    if let Some(call_id) = &message.call_id {
        value["tool_call_id"] = json!(call_id);
    }
    value
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

/// JSON definition of the image tool.
pub fn image_tool_definition() -> Value {
    json!({
        "type": "function",
        "function": {
            "name": IMAGE_TOOL_NAME,
            "description": IMAGE_TOOL_DESCRIPTION,
            "parameters": {
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "Short search phrase describing the image"
                    }
                },
                "required": ["query"]
            }
        }
    })
}

/// One tool-free completion returning the slide list as text.
#[derive(Debug, Clone)]
pub struct CompletionModel {
    client: ChatClient,
}

impl CompletionModel {
    pub fn new(client: ChatClient) -> Self {
        Self { client }
    }
}

impl LanguageModel for CompletionModel {
    fn generate(&self, request: &GenerationRequest) -> Result<RawOutput> {
        let messages = [
            TraceMessage::new(Role::System, SYSTEM_PROMPT),
            TraceMessage::new(Role::Human, outline_prompt(request)),
        ];
        let reply = self.client.chat(&messages, &[])?;
        log::info!(
            "{} returned {} characters",
            self.client.model(),
            reply.content.len()
        );
        Ok(RawOutput::Text(reply.content))
    }
}

/// Tool-calling agent that fetches images while writing the slides.
pub struct ImageToolAgent<'a> {
    client: ChatClient,
    search: &'a dyn ImageSearch,
    max_rounds: usize,
}

impl<'a> ImageToolAgent<'a> {
    /// Create an agent that answers image tool calls through `search`.
    pub fn new(client: ChatClient, search: &'a dyn ImageSearch) -> Self {
        Self {
            client,
            search,
            max_rounds: 4,
        }
    }

    /// Limit the number of model calls in one run.
    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds.max(1);
        self
    }

    /// Run one tool call and return the text handed back to the model.
    fn run_tool(&self, call: &ToolCallRecord) -> String {
        if call.name != IMAGE_TOOL_NAME {
            log::warn!("Model asked for unknown tool '{}'", call.name);
            return format!("Unknown tool: {}", call.name);
        }
        let Some(query) = call.string_arg("query").filter(|q| !q.trim().is_empty()) else {
            return "Error fetching image: missing query".to_string();
        };

        match self.search.search(query) {
            Ok(Some(url)) => url,
            Ok(None) => "No relevant image found.".to_string(),
            Err(e) => format!("Error fetching image: {}", e),
        }
    }
}

impl LanguageModel for ImageToolAgent<'_> {
    fn generate(&self, request: &GenerationRequest) -> Result<RawOutput> {
        let tools = [image_tool_definition()];
        let mut trace = ConversationTrace::new();
        trace.push(TraceMessage::new(Role::System, SYSTEM_PROMPT));
        trace.push(TraceMessage::new(Role::Human, agent_prompt(request)));

        for round in 1..=self.max_rounds {
            let reply = self.client.chat(trace.messages(), &tools)?;
            let calls = reply.tool_calls.clone();
            trace.push(reply);

            if calls.is_empty() {
                log::info!("Agent finished after {} rounds", round);
                return Ok(RawOutput::Trace(trace));
            }

            log::debug!("Round {}: {} tool calls", round, calls.len());
            for call in &calls {
                let result = self.run_tool(call);
                trace.push(TraceMessage::tool_result(call.id.clone(), result));
            }
        }

        log::warn!(
            "Agent still calling tools after {} rounds; returning trace as is",
            self.max_rounds
        );
        Ok(RawOutput::Trace(trace))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deck_core::SearchError;

    struct StaticSearch;

    impl ImageSearch for StaticSearch {
        fn search(&self, query: &str) -> std::result::Result<Option<String>, SearchError> {
            match query {
                "none" => Ok(None),
                "down" => Err(SearchError::Status(500)),
                other => Ok(Some(format!("https://images.example/{}", other))),
            }
        }
    }

    fn client() -> ChatClient {
        ChatClient::new(ChatConfig::new("test-key").with_base_url("http://localhost:1234/v1/"))
            .unwrap()
    }

    #[test]
    fn test_missing_api_key_is_config_error() {
        let err = ChatClient::new(ChatConfig::new("  ")).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let config = ChatConfig::new("k").with_base_url("http://localhost:1234/v1/");
        assert_eq!(config.completions_url(), "http://localhost:1234/v1/chat/completions");
    }

    #[test]
    fn test_request_body_with_tools() {
        let assistant = TraceMessage::new(Role::Ai, "").with_tool_calls(vec![ToolCallRecord {
            id: "call_1".to_string(),
            name: IMAGE_TOOL_NAME.to_string(),
            arguments: json!({"query": "lake"}),
        }]);
        let messages = vec![
            TraceMessage::new(Role::System, "sys"),
            TraceMessage::new(Role::Human, "hi"),
            assistant,
            TraceMessage::tool_result("call_1", "https://img/lake.jpg"),
        ];
        let body = client().request_body(&messages, &[image_tool_definition()]);

        assert_eq!(body["model"], DEFAULT_MODEL);
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["messages"][2]["role"], "assistant");
        assert_eq!(
            body["messages"][2]["tool_calls"][0]["function"]["arguments"],
            "{\"query\":\"lake\"}"
        );
        assert_eq!(body["messages"][3]["tool_call_id"], "call_1");
        assert_eq!(body["tools"][0]["function"]["name"], IMAGE_TOOL_NAME);
    }

    #[test]
    fn test_request_body_without_tools() {
        let body = client().request_body(&[TraceMessage::new(Role::Human, "hi")], &[]);
        assert!(body.get("tools").is_none());
        assert!(body["messages"][0].get("tool_calls").is_none());
    }

    #[test]
    fn test_parse_reply_with_tool_calls() {
        let body = r#"{
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_9",
                        "type": "function",
                        "function": {"name": "fetch_image_from_unsplash", "arguments": "{\"query\": \"mountain lake\"}"}
                    }]
                }
            }]
        }"#;
        let reply = parse_reply(body).unwrap();
        assert_eq!(reply.role, Role::Ai);
        assert_eq!(reply.content, "");
        assert_eq!(reply.tool_calls[0].id, "call_9");
        assert_eq!(reply.tool_calls[0].string_arg("query"), Some("mountain lake"));
    }

    #[test]
    fn test_parse_reply_errors() {
        assert!(matches!(parse_reply("{\"choices\": []}"), Err(Error::Model(_))));
        assert!(matches!(parse_reply("<html>"), Err(Error::Model(_))));
    }

    #[test]
    fn test_run_tool_messages() {
        let search = StaticSearch;
        let agent = ImageToolAgent::new(client(), &search);
        let call = |name: &str, args: Value| ToolCallRecord {
            id: "c".to_string(),
            name: name.to_string(),
            arguments: args,
        };

        assert_eq!(
            agent.run_tool(&call(IMAGE_TOOL_NAME, json!({"query": "lake"}))),
            "https://images.example/lake"
        );
        assert_eq!(
            agent.run_tool(&call(IMAGE_TOOL_NAME, json!({"query": "none"}))),
            "No relevant image found."
        );
        assert!(agent
            .run_tool(&call(IMAGE_TOOL_NAME, json!({"query": "down"})))
            .starts_with("Error fetching image"));
        assert!(agent
            .run_tool(&call(IMAGE_TOOL_NAME, json!({})))
            .starts_with("Error fetching image"));
        assert_eq!(agent.run_tool(&call("calculator", json!({}))), "Unknown tool: calculator");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdef", 3), "abc...");
    }
}
