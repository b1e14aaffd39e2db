//! Lenient extraction of tool arguments.
//!
//! Callers send a JSON object. Numeric arguments may arrive either as
//! numbers or as numeric strings; `null` and absent keys mean "use the
//! default".

use serde_json::{Map, Value};

use crate::error::ToolError;

fn object(args: &Value) -> Result<Option<&Map<String, Value>>, ToolError> {
    match args {
        Value::Object(map) => Ok(Some(map)),
        Value::Null => Ok(None),
        other => Err(ToolError::InvalidArguments(format!(
            "arguments must be a JSON object, got {other}"
        ))),
    }
}

fn lookup<'a>(args: &'a Value, key: &str) -> Result<Option<&'a Value>, ToolError> {
    Ok(object(args)?.and_then(|map| map.get(key)).filter(|v| !v.is_null()))
}

pub(crate) fn optional_str(args: &Value, key: &str) -> Result<Option<String>, ToolError> {
    match lookup(args, key)? {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(ToolError::InvalidArguments(format!(
            "'{key}' must be a string, got {other}"
        ))),
    }
}

pub(crate) fn required_str(args: &Value, key: &str) -> Result<String, ToolError> {
    optional_str(args, key)?
        .ok_or_else(|| ToolError::InvalidArguments(format!("missing required argument '{key}'")))
}

pub(crate) fn optional_u32(args: &Value, key: &str) -> Result<Option<u32>, ToolError> {
    let invalid = |v: &Value| {
        ToolError::InvalidArguments(format!("'{key}' must be a positive integer, got {v}"))
    };
    match lookup(args, key)? {
        None => Ok(None),
        Some(v @ Value::Number(n)) => n
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .map(Some)
            .ok_or_else(|| invalid(v)),
        Some(v @ Value::String(s)) => s.trim().parse::<u32>().map(Some).map_err(|_| invalid(v)),
        Some(other) => Err(invalid(other)),
    }
}
