//! Rendering of thread message content to chat text
//!
//! Content arrives as a plain string, a list of typed parts or a single
//! typed part. Parsing is total: anything not recognized becomes
//! [`ContentPart::Unknown`] and is rendered as a bracketed JSON dump.

use serde_json::Value;

/// One typed content part
#[derive(Debug, Clone, PartialEq)]
pub enum ContentPart {
    /// Text, from either `{"text": "..."}` or `{"text": {"value": "..."}}`
    Text(String),
    /// Image referenced by URL
    ImageUrl(String),
    /// Image referenced by uploaded file id
    ImageFile(String),
    /// Function / tool invocation
    ToolCall {
        /// Function name, if present
        name: Option<String>,
        /// Raw arguments
        arguments: Value,
    },
    /// Anything else, kept verbatim
    Unknown(Value),
}

/// Message content shape
#[derive(Debug, Clone, PartialEq)]
pub enum MessageContent {
    /// Bare string
    Text(String),
    /// Ordered list of parts
    Parts(Vec<ContentPart>),
    /// A single part object
    Single(ContentPart),
}

impl MessageContent {
    /// Classify a raw content value
    #[must_use]
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::String(s) => Self::Text(s.clone()),
            Value::Array(items) => Self::Parts(items.iter().map(ContentPart::from_value).collect()),
            other => Self::Single(ContentPart::from_value(other)),
        }
    }

    /// Render to display text; list parts are joined with a blank line
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Self::Text(s) => non_empty_text(s),
            Self::Parts(parts) if parts.is_empty() => "[Lege inhoud]".to_string(),
            Self::Parts(parts) => parts
                .iter()
                .map(ContentPart::render)
                .collect::<Vec<_>>()
                .join("\n\n"),
            Self::Single(part) => part.render(),
        }
    }
}

impl ContentPart {
    /// Classify a single raw part
    #[must_use]
    pub fn from_value(value: &Value) -> Self {
        if let Value::String(s) = value {
            return Self::Text(s.clone());
        }

        let Some(kind) = value.get("type").and_then(Value::as_str) else {
            return Self::Unknown(value.clone());
        };

        let parsed = match kind {
            "text" => match value.get("text") {
                Some(Value::String(s)) => Some(Self::Text(s.clone())),
                Some(nested) => nested
                    .get("value")
                    .and_then(Value::as_str)
                    .map(|s| Self::Text(s.to_string())),
                None => None,
            },
            "image_url" => value
                .pointer("/image_url/url")
                .and_then(Value::as_str)
                .map(|url| Self::ImageUrl(url.to_string())),
            "image_file" => value
                .pointer("/image_file/file_id")
                .and_then(Value::as_str)
                .map(|id| Self::ImageFile(id.to_string())),
            "function_call" | "function" | "tool_call" => {
                let function = value.get("function").unwrap_or(value);
                Some(Self::ToolCall {
                    name: function
                        .get("name")
                        .and_then(Value::as_str)
                        .map(String::from),
                    arguments: function
                        .get("arguments")
                        .cloned()
                        .unwrap_or_else(|| Value::Object(serde_json::Map::new())),
                })
            }
            _ => None,
        };

        parsed.unwrap_or_else(|| Self::Unknown(value.clone()))
    }

    /// Render to display text; never empty
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Self::Text(text) => non_empty_text(text),
            Self::ImageUrl(url) => format!("🔗 Afbeelding-URL: {url}"),
            Self::ImageFile(id) => format!("🖼 Afbeelding-bestand (ID: {id})."),
            Self::ToolCall { name, arguments } => format!(
                "[Tool call: {} - args: {}]",
                name.as_deref().unwrap_or("onbekend"),
                pretty(arguments)
            ),
            Self::Unknown(raw) => format!("[Onbekend onderdeel: {}]", pretty(raw)),
        }
    }
}

/// Render raw thread message content
#[must_use]
pub fn render_content(value: &Value) -> String {
    MessageContent::from_value(value).render()
}

fn non_empty_text(text: &str) -> String {
    if text.is_empty() {
        "[Lege tekst]".to_string()
    } else {
        text.to_string()
    }
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}
