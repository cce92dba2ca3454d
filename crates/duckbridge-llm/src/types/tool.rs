use serde_json::{Map, Value, json};

/// A function the client offers to the model
///
/// The upstream receives the definition as sent, so nothing beyond the name
/// is interpreted here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolDefinition {
    /// Function name the model calls
    pub name: String,
    /// What the function does, for the model
    pub description: Option<String>,
    /// JSON Schema of the arguments
    pub parameters: Option<Value>,
    /// `strict` and any other unrecognized function fields
    pub extra: Map<String, Value>,
}

/// Client constraint on tool use
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolChoice {
    /// Tools must not be called
    None,
    /// The model decides
    Auto,
    /// At least one call is expected
    Required,
    /// The named function must be called
    Function(String),
}

impl ToolChoice {
    /// Read the `tool_choice` request field
    ///
    /// Accepts `"none"`, `"auto"`, `"required"` or
    /// `{"type": "function", "function": {"name": ...}}`.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(mode) => match mode.as_str() {
                "none" => Some(Self::None),
                "auto" => Some(Self::Auto),
                "required" => Some(Self::Required),
                _ => None,
            },
            Value::Object(_) => value
                .pointer("/function/name")
                .and_then(Value::as_str)
                .map(|name| Self::Function(name.to_owned())),
            _ => None,
        }
    }

    /// The field as the upstream expects it, which is the client's own shape
    pub fn to_value(&self) -> Value {
        match self {
            Self::None => json!("none"),
            Self::Auto => json!("auto"),
            Self::Required => json!("required"),
            Self::Function(name) => json!({"type": "function", "function": {"name": name}}),
        }
    }
}
