//! Domain types for slides and model output.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Maximum number of bullets kept on a slide.
pub const MAX_BULLETS: usize = 6;

/// Largest deck a single request may ask for.
pub const MAX_SLIDE_COUNT: usize = 20;

/// A raw, not yet validated slide as decoded from model output.
pub type RawSlide = Map<String, Value>;

/// A single validated slide.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlideRecord {
    /// 1-based position in the deck.
    pub index: usize,

    /// Slide heading, never empty.
    pub title: String,

    /// Bullet points in display order (1 to [`MAX_BULLETS`]).
    pub bullets: Vec<String>,

    /// Image state, serialized as either `image_query` or `image_url`.
    #[serde(flatten)]
    pub image: SlideImage,
}

impl SlideRecord {
    /// The search query still waiting for resolution, if any.
    pub fn image_query(&self) -> Option<&str> {
        match &self.image {
            SlideImage::Pending { image_query } => Some(image_query),
            SlideImage::Settled { .. } => None,
        }
    }

    /// The resolved image URL, if resolution succeeded.
    pub fn image_url(&self) -> Option<&str> {
        match &self.image {
            SlideImage::Settled { image_url } => image_url.as_deref(),
            SlideImage::Pending { .. } => None,
        }
    }

    /// Whether this slide still needs an image lookup.
    pub fn is_pending(&self) -> bool {
        matches!(self.image, SlideImage::Pending { .. })
    }

    /// Consume the pending query and record the outcome.
    ///
    /// Empty URLs count as "no image".
    pub fn settle(&mut self, url: Option<String>) {
        let url = url.filter(|u| !u.trim().is_empty());
        self.image = SlideImage::Settled { image_url: url };
    }
}

/// Image state of a slide.
///
/// Resolution moves a slide from `Pending` to `Settled` exactly once, so a
/// slide never carries both a query and a URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum SlideImage {
    /// A search query that has not been resolved yet.
    Pending { image_query: String },
    /// Resolution finished (or was never needed). `None` means no image.
    Settled { image_url: Option<String> },
}

impl Default for SlideImage {
    fn default() -> Self {
        Self::Settled { image_url: None }
    }
}

/// Inputs to one generation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    /// Deck topic, also used as the title slide text.
    pub topic: String,
    /// Number of content slides to ask for.
    pub slide_count: usize,
}

impl GenerationRequest {
    /// Create a request, clamping the slide count to `1..=MAX_SLIDE_COUNT`.
    pub fn new(topic: impl Into<String>, slide_count: usize) -> Self {
        Self {
            topic: topic.into().trim().to_string(),
            slide_count: slide_count.clamp(1, MAX_SLIDE_COUNT),
        }
    }
}

/// Role of a message in an agent run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    #[serde(alias = "user")]
    Human,
    #[serde(alias = "assistant")]
    Ai,
    Tool,
}

/// A tool invocation requested by an assistant message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "WireToolCall")]
pub struct ToolCallRecord {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

impl ToolCallRecord {
    /// The string argument `key`, if present.
    pub fn string_arg(&self, key: &str) -> Option<&str> {
        self.arguments.get(key).and_then(Value::as_str)
    }
}

/// One message of a conversation trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WireMessage")]
pub struct TraceMessage {
    pub role: Role,
    pub content: String,
    /// For `tool` messages, the id of the call this result answers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRecord>,
}

impl TraceMessage {
    /// Create a message without tool metadata.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            call_id: None,
            tool_calls: Vec::new(),
        }
    }

    /// Create a tool result answering `call_id`.
    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            call_id: Some(call_id.into()),
            tool_calls: Vec::new(),
        }
    }

    /// Attach the tool calls an assistant message requested.
    pub fn with_tool_calls(mut self, calls: Vec<ToolCallRecord>) -> Self {
        self.tool_calls = calls;
        self
    }
}

/// Ordered log of role-tagged messages from an agent run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationTrace {
    messages: Vec<TraceMessage>,
}

impl ConversationTrace {
    /// Create an empty trace.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message.
    pub fn push(&mut self, message: TraceMessage) {
        self.messages.push(message);
    }

    /// All messages in chronological order.
    pub fn messages(&self) -> &[TraceMessage] {
        &self.messages
    }

    /// Messages with the given role, in chronological order.
    pub fn with_role(&self, role: Role) -> impl DoubleEndedIterator<Item = &TraceMessage> {
        self.messages.iter().filter(move |m| m.role == role)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

impl From<Vec<TraceMessage>> for ConversationTrace {
    fn from(messages: Vec<TraceMessage>) -> Self {
        Self { messages }
    }
}

/// What a language model hands back: one completion, or a whole agent run.
#[derive(Debug, Clone, PartialEq)]
pub enum RawOutput {
    Text(String),
    Trace(ConversationTrace),
}

impl RawOutput {
    /// Interpret saved model output.
    ///
    /// A JSON array of role-tagged messages, or an object with a `messages`
    /// array, becomes a trace. Anything else is kept as text.
    pub fn from_json_str(input: &str) -> Self {
        let messages = match serde_json::from_str::<Value>(input.trim()) {
            Ok(Value::Object(mut map)) if !map.contains_key("slides") => map.remove("messages"),
            Ok(value @ Value::Array(_)) => Some(value),
            _ => None,
        };

        match messages
            .filter(looks_like_trace)
            .and_then(|v| serde_json::from_value::<ConversationTrace>(v).ok())
        {
            Some(trace) => Self::Trace(trace),
            None => Self::Text(input.to_string()),
        }
    }

    /// All text content, for diagnostics.
    pub fn diagnostic_text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Trace(trace) => trace
                .messages()
                .iter()
                .map(|m| m.content.as_str())
                .filter(|c| !c.is_empty())
                .collect::<Vec<_>>()
                .join("\n---\n"),
        }
    }
}

fn looks_like_trace(value: &Value) -> bool {
    value.as_array().is_some_and(|items| {
        !items.is_empty()
            && items.iter().all(|item| {
                item.get("role").or_else(|| item.get("type")).is_some()
                    && item.get("title").is_none()
            })
    })
}

/// Result of pulling slides out of model output.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    /// Raw slide mappings, in model order.
    pub slides: Vec<RawSlide>,
    /// Tool-produced image URLs in chronological order.
    ///
    /// Only filled when no assistant turn yielded a slide list. Positions
    /// line up with slides only by order, so applying them is lossy.
    pub resolved_images: Vec<Option<String>>,
}

#[derive(Deserialize)]
struct WireMessage {
    #[serde(default)]
    role: Option<Role>,
    /// LangChain puts the role here; OpenAI-style items use it for the
    /// item kind (`"message"`) next to a real `role`.
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    content: Option<WireContent>,
    #[serde(default, alias = "tool_call_id")]
    call_id: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCallRecord>>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WireContent {
    Text(String),
    Parts(Vec<WirePart>),
}

#[derive(Deserialize)]
struct WirePart {
    #[serde(default)]
    text: Option<String>,
}

impl TryFrom<WireMessage> for TraceMessage {
    type Error = String;

    fn try_from(wire: WireMessage) -> std::result::Result<Self, Self::Error> {
        let role = match (wire.role, wire.kind) {
            (Some(role), _) => role,
            (None, Some(kind)) => serde_json::from_value(Value::String(kind.clone()))
                .map_err(|_| format!("unknown message type `{}`", kind))?,
            (None, None) => return Err("message has neither `role` nor `type`".to_string()),
        };
        let content = match wire.content {
            Some(WireContent::Text(text)) => text,
            Some(WireContent::Parts(parts)) => parts
                .into_iter()
                .filter_map(|p| p.text)
                .collect::<Vec<_>>()
                .join(""),
            None => String::new(),
        };
        Ok(Self {
            role,
            content,
            call_id: wire.call_id,
            tool_calls: wire.tool_calls.unwrap_or_default(),
        })
    }
}

#[derive(Deserialize)]
struct WireToolCall {
    #[serde(default)]
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default, alias = "args")]
    arguments: Option<Value>,
    #[serde(default)]
    function: Option<WireFunction>,
}

#[derive(Deserialize)]
struct WireFunction {
    name: String,
    #[serde(default)]
    arguments: Option<Value>,
}

impl From<WireToolCall> for ToolCallRecord {
    fn from(wire: WireToolCall) -> Self {
        let (name, arguments) = match wire.function {
            Some(function) => (function.name, function.arguments),
            None => (wire.name.unwrap_or_default(), wire.arguments),
        };
        // OpenAI sends arguments as a JSON-encoded string.
        let arguments = match arguments {
            Some(Value::String(encoded)) => {
                serde_json::from_str(&encoded).unwrap_or(Value::String(encoded))
            }
            Some(value) => value,
            None => Value::Object(Map::new()),
        };
        Self {
            id: wire.id,
            name,
            arguments,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn slide(image: SlideImage) -> SlideRecord {
        SlideRecord {
            index: 1,
            title: "Intro".to_string(),
            bullets: vec!["One".to_string()],
            image,
        }
    }

    #[test]
    fn test_pending_slide_serializes_query_only() {
        let value = serde_json::to_value(slide(SlideImage::Pending {
            image_query: "lake".to_string(),
        }))
        .unwrap();
        assert_eq!(value["image_query"], "lake");
        assert!(value.get("image_url").is_none());
    }

    #[test]
    fn test_settled_slide_serializes_null_url() {
        let value = serde_json::to_value(slide(SlideImage::default())).unwrap();
        assert_eq!(value["image_url"], Value::Null);
        assert!(value.get("image_query").is_none());
        assert_eq!(value["bullets"], json!(["One"]));
    }

    #[test]
    fn test_settle_consumes_query() {
        let mut record = slide(SlideImage::Pending {
            image_query: "lake".to_string(),
        });
        assert!(record.is_pending());
        record.settle(Some("https://img/1.jpg".to_string()));
        assert_eq!(record.image_query(), None);
        assert_eq!(record.image_url(), Some("https://img/1.jpg"));
    }

    #[test]
    fn test_settle_empty_url_is_no_image() {
        let mut record = slide(SlideImage::Pending {
            image_query: "lake".to_string(),
        });
        record.settle(Some("  ".to_string()));
        assert_eq!(record.image, SlideImage::Settled { image_url: None });
    }

    #[test]
    fn test_request_clamps_slide_count() {
        assert_eq!(GenerationRequest::new("AI", 0).slide_count, 1);
        assert_eq!(GenerationRequest::new("AI", 500).slide_count, MAX_SLIDE_COUNT);
        assert_eq!(GenerationRequest::new("  AI  ", 5).topic, "AI");
    }

    #[test]
    fn test_trace_accepts_framework_aliases() {
        let trace: ConversationTrace = serde_json::from_value(json!([
            {"type": "human", "content": "make slides"},
            {"role": "assistant", "content": null, "tool_calls": [
                {"id": "c1", "type": "function",
                 "function": {"name": "fetch_image_from_unsplash", "arguments": "{\"query\":\"lake\"}"}}
            ]},
            {"type": "tool", "tool_call_id": "c1", "content": "https://img/lake.jpg"},
            {"type": "ai", "content": [{"type": "text", "text": "[]"}]}
        ]))
        .unwrap();

        let messages = trace.messages();
        assert_eq!(messages[0].role, Role::Human);
        assert_eq!(messages[1].role, Role::Ai);
        assert_eq!(messages[1].content, "");
        assert_eq!(messages[1].tool_calls[0].string_arg("query"), Some("lake"));
        assert_eq!(messages[2].call_id.as_deref(), Some("c1"));
        assert_eq!(messages[3].content, "[]");
    }

    #[test]
    fn test_role_preferred_over_item_type() {
        let trace: ConversationTrace = serde_json::from_value(json!([
            {"type": "message", "role": "user", "content": "make slides"},
            {"type": "message", "role": "assistant", "content": "[{\"title\": \"A\"}]"}
        ]))
        .unwrap();
        assert_eq!(trace.messages()[0].role, Role::Human);
        assert_eq!(trace.messages()[1].role, Role::Ai);

        let raw = r#"[{"type": "message", "role": "assistant", "content": "hi"}]"#;
        match RawOutput::from_json_str(raw) {
            RawOutput::Trace(trace) => assert_eq!(trace.messages()[0].content, "hi"),
            other => panic!("expected trace, got {:?}", other),
        }
    }

    #[test]
    fn test_message_without_known_role_rejected() {
        let untyped = json!({"type": "message", "content": "x"});
        assert!(serde_json::from_value::<TraceMessage>(untyped).is_err());
        assert!(serde_json::from_value::<TraceMessage>(json!({"content": "x"})).is_err());
    }

    #[test]
    fn test_langchain_style_tool_call() {
        let call: ToolCallRecord = serde_json::from_value(json!({
            "id": "x", "name": "fetch_image_from_unsplash", "args": {"query": "sunrise"}
        }))
        .unwrap();
        assert_eq!(call.name, "fetch_image_from_unsplash");
        assert_eq!(call.string_arg("query"), Some("sunrise"));
    }

    #[test]
    fn test_raw_output_detects_trace_wrapper() {
        let raw = r#"{"messages": [{"type": "ai", "content": "hi"}]}"#;
        match RawOutput::from_json_str(raw) {
            RawOutput::Trace(trace) => assert_eq!(trace.len(), 1),
            other => panic!("expected trace, got {:?}", other),
        }
    }

    #[test]
    fn test_raw_output_keeps_slide_arrays_as_text() {
        let raw = r#"[{"title": "A", "content": ["b"]}]"#;
        assert_eq!(RawOutput::from_json_str(raw), RawOutput::Text(raw.to_string()));

        let prose = "Here are your slides";
        assert_eq!(RawOutput::from_json_str(prose), RawOutput::Text(prose.to_string()));
    }
}
