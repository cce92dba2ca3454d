//! Request validation
//!
//! Runs over the raw JSON body so each violation gets a precise message
//! before any typed decoding. Checks run in a fixed order and the first
//! failure wins. Every message says what is "required" or what a field "must"
//! be.

use std::collections::HashSet;

use serde_json::{Map, Value};

use crate::error::LlmError;
use crate::protocol::openai::OpenAiRequest;
use crate::types::{CompletionRequest, Role};

/// Most stop sequences a request may carry
const MAX_STOP_SEQUENCES: usize = 4;

/// Longest accepted function name
const MAX_FUNCTION_NAME_LEN: usize = 64;

type Object = Map<String, Value>;

fn invalid(message: impl Into<String>) -> LlmError {
    LlmError::Validation(message.into())
}

/// Present and not `null`
fn field<'a>(object: &'a Object, key: &str) -> Option<&'a Value> {
    object.get(key).filter(|v| !v.is_null())
}

/// Validate a decoded JSON body and convert it to a typed request
pub fn validate_request(body: &Value) -> Result<CompletionRequest, LlmError> {
    let object = body
        .as_object()
        .ok_or_else(|| invalid("request body must be a JSON object"))?;

    validate_model(object)?;
    validate_messages(object)?;
    validate_sampling(object)?;
    validate_stream(object)?;
    let tool_names = validate_tools(object)?;
    validate_tool_choice(object, &tool_names)?;
    validate_metadata(object)?;

    let wire: OpenAiRequest = serde_json::from_value(body.clone())
        .map_err(|e| invalid(format!("request body must match the chat completion schema: {e}")))?;

    Ok(wire.into())
}

fn validate_model(object: &Object) -> Result<(), LlmError> {
    match field(object, "model") {
        None => Err(invalid("model is required")),
        Some(Value::String(model)) if !model.trim().is_empty() => Ok(()),
        Some(_) => Err(invalid("model must be a non-empty string")),
    }
}

fn validate_messages(object: &Object) -> Result<(), LlmError> {
    let messages = field(object, "messages")
        .and_then(Value::as_array)
        .filter(|messages| !messages.is_empty())
        .ok_or_else(|| invalid("messages must be a non-empty array"))?;

    let mut known_tool_calls = HashSet::new();

    for (i, message) in messages.iter().enumerate() {
        let message = message
            .as_object()
            .ok_or_else(|| invalid(format!("messages[{i}] must be an object")))?;

        let role = match field(message, "role") {
            None => return Err(invalid(format!("messages[{i}].role is required"))),
            Some(value) => value.as_str().and_then(Role::parse).ok_or_else(|| {
                invalid(format!(
                    "messages[{i}].role must be one of system, developer, user, assistant, tool"
                ))
            })?,
        };

        validate_content(i, field(message, "content"))?;

        if field(message, "name").is_some_and(|name| !name.is_string()) {
            return Err(invalid(format!("messages[{i}].name must be a string")));
        }

        match role {
            Role::Assistant => {
                for id in validate_tool_calls(i, field(message, "tool_calls"))? {
                    known_tool_calls.insert(id);
                }
            }
            Role::Tool => {
                let id = field(message, "tool_call_id")
                    .and_then(Value::as_str)
                    .filter(|id| !id.is_empty())
                    .ok_or_else(|| invalid(format!("messages[{i}].tool_call_id is required for tool messages")))?;
                if !known_tool_calls.contains(id) {
                    return Err(invalid(format!(
                        "messages[{i}].tool_call_id must reference an earlier assistant tool call"
                    )));
                }
            }
            Role::System | Role::Developer | Role::User => {}
        }
    }

    Ok(())
}

fn validate_content(i: usize, content: Option<&Value>) -> Result<(), LlmError> {
    let parts = match content {
        None | Some(Value::String(_)) => return Ok(()),
        Some(Value::Array(parts)) => parts,
        Some(_) => {
            return Err(invalid(format!(
                "messages[{i}].content must be a string, null, or an array of content parts"
            )));
        }
    };

    if parts.is_empty() {
        return Err(invalid(format!("messages[{i}].content must not be an empty array")));
    }

    for (j, part) in parts.iter().enumerate() {
        let part = part
            .as_object()
            .ok_or_else(|| invalid(format!("messages[{i}].content[{j}] must be an object")))?;

        match field(part, "type").and_then(Value::as_str) {
            Some("text") => {
                if !field(part, "text").is_some_and(Value::is_string) {
                    return Err(invalid(format!("messages[{i}].content[{j}].text is required")));
                }
            }
            Some("image_url") => {
                let has_url = field(part, "image_url")
                    .and_then(|image| image.get("url"))
                    .and_then(Value::as_str)
                    .is_some_and(|url| !url.is_empty());
                if !has_url {
                    return Err(invalid(format!("messages[{i}].content[{j}].image_url.url is required")));
                }
            }
            _ => {
                return Err(invalid(format!(
                    "messages[{i}].content[{j}].type must be text or image_url"
                )));
            }
        }
    }

    Ok(())
}

fn validate_tool_calls(i: usize, tool_calls: Option<&Value>) -> Result<Vec<String>, LlmError> {
    let Some(tool_calls) = tool_calls else {
        return Ok(Vec::new());
    };
    let tool_calls = tool_calls
        .as_array()
        .ok_or_else(|| invalid(format!("messages[{i}].tool_calls must be an array")))?;

    let mut ids = Vec::with_capacity(tool_calls.len());
    for (j, call) in tool_calls.iter().enumerate() {
        let id = call
            .get("id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| invalid(format!("messages[{i}].tool_calls[{j}].id is required")))?;

        let function = call.get("function").and_then(Value::as_object);
        let has_name = function
            .and_then(|f| f.get("name"))
            .and_then(Value::as_str)
            .is_some_and(|name| !name.is_empty());
        if !has_name {
            return Err(invalid(format!("messages[{i}].tool_calls[{j}].function.name is required")));
        }
        if function
            .and_then(|f| field(f, "arguments"))
            .is_some_and(|args| !args.is_string())
        {
            return Err(invalid(format!(
                "messages[{i}].tool_calls[{j}].function.arguments must be a string"
            )));
        }

        ids.push(id.to_owned());
    }

    Ok(ids)
}

fn check_range(object: &Object, key: &str, min: f64, max: f64) -> Result<(), LlmError> {
    match field(object, key) {
        None => Ok(()),
        Some(value) => value
            .as_f64()
            .filter(|v| (min..=max).contains(v))
            .map(|_| ())
            .ok_or_else(|| invalid(format!("{key} must be a number between {min} and {max}"))),
    }
}

fn validate_sampling(object: &Object) -> Result<(), LlmError> {
    check_range(object, "temperature", 0.0, 2.0)?;
    check_range(object, "top_p", 0.0, 1.0)?;
    check_range(object, "frequency_penalty", -2.0, 2.0)?;
    check_range(object, "presence_penalty", -2.0, 2.0)?;

    if let Some(max_tokens) = field(object, "max_tokens")
        && !max_tokens
            .as_u64()
            .is_some_and(|n| n >= 1 && u32::try_from(n).is_ok())
    {
        return Err(invalid("max_tokens must be a positive integer"));
    }

    if let Some(n) = field(object, "n")
        && n.as_u64() != Some(1)
    {
        return Err(invalid("n must be 1"));
    }

    if let Some(seed) = field(object, "seed")
        && seed.as_i64().is_none()
    {
        return Err(invalid("seed must be an integer"));
    }

    match field(object, "stop") {
        None | Some(Value::String(_)) => Ok(()),
        Some(Value::Array(stops)) if stops.len() <= MAX_STOP_SEQUENCES && stops.iter().all(Value::is_string) => Ok(()),
        Some(_) => Err(invalid(format!(
            "stop must be a string or an array of at most {MAX_STOP_SEQUENCES} strings"
        ))),
    }
}

fn validate_stream(object: &Object) -> Result<(), LlmError> {
    if field(object, "stream").is_some_and(|stream| !stream.is_boolean()) {
        return Err(invalid("stream must be a boolean"));
    }

    if let Some(options) = field(object, "stream_options") {
        let options = options
            .as_object()
            .ok_or_else(|| invalid("stream_options must be an object"))?;
        if field(options, "include_usage").is_some_and(|v| !v.is_boolean()) {
            return Err(invalid("stream_options.include_usage must be a boolean"));
        }
    }

    Ok(())
}

fn valid_function_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_FUNCTION_NAME_LEN
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Returns the declared tool names, in order
fn validate_tools(object: &Object) -> Result<Vec<String>, LlmError> {
    let Some(tools) = field(object, "tools") else {
        return Ok(Vec::new());
    };
    let tools = tools.as_array().ok_or_else(|| invalid("tools must be an array"))?;

    let mut names = Vec::with_capacity(tools.len());
    let mut seen = HashSet::new();

    for (i, tool) in tools.iter().enumerate() {
        let tool = tool
            .as_object()
            .ok_or_else(|| invalid(format!("tools[{i}] must be an object")))?;

        if field(tool, "type").and_then(Value::as_str) != Some("function") {
            return Err(invalid(format!("tools[{i}].type must be \"function\"")));
        }

        let function = field(tool, "function")
            .and_then(Value::as_object)
            .ok_or_else(|| invalid(format!("tools[{i}].function is required")))?;

        let name = field(function, "name")
            .and_then(Value::as_str)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| invalid(format!("tools[{i}].function.name is required")))?;
        if !valid_function_name(name) {
            return Err(invalid(format!(
                "tools[{i}].function.name must be at most {MAX_FUNCTION_NAME_LEN} letters, digits, underscores or dashes"
            )));
        }
        if !seen.insert(name) {
            return Err(invalid(format!("tools[{i}].function.name must be unique")));
        }

        if field(function, "parameters").is_some_and(|p| !p.is_object()) {
            return Err(invalid(format!("tools[{i}].function.parameters must be an object")));
        }

        names.push(name.to_owned());
    }

    Ok(names)
}

fn validate_tool_choice(object: &Object, tool_names: &[String]) -> Result<(), LlmError> {
    let Some(choice) = field(object, "tool_choice") else {
        return Ok(());
    };

    match choice {
        Value::String(mode) => match mode.as_str() {
            "none" | "auto" => Ok(()),
            "required" if tool_names.is_empty() => {
                Err(invalid("tools are required when tool_choice is \"required\""))
            }
            "required" => Ok(()),
            _ => Err(invalid(
                "tool_choice must be \"none\", \"auto\", \"required\" or a function reference",
            )),
        },
        Value::Object(reference) => {
            if field(reference, "type").and_then(Value::as_str) != Some("function") {
                return Err(invalid("tool_choice.type must be \"function\""));
            }
            let name = field(reference, "function")
                .and_then(|f| f.get("name"))
                .and_then(Value::as_str)
                .filter(|name| !name.is_empty())
                .ok_or_else(|| invalid("tool_choice.function.name is required"))?;

            if tool_names.is_empty() {
                return Err(invalid("tools are required when tool_choice names a function"));
            }
            if !tool_names.iter().any(|t| t == name) {
                return Err(invalid(format!(
                    "tool_choice.function.name must match a defined tool, got '{name}'"
                )));
            }
            Ok(())
        }
        _ => Err(invalid(
            "tool_choice must be \"none\", \"auto\", \"required\" or a function reference",
        )),
    }
}

fn validate_metadata(object: &Object) -> Result<(), LlmError> {
    if field(object, "metadata").is_some_and(|m| !m.is_object()) {
        return Err(invalid("metadata must be an object"));
    }
    Ok(())
}
