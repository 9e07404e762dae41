//! Built-in pipes.

use serde_json::{Number, Value};

use super::{HttpException, TypeHint};
use crate::contracts::{Injectable, Pipe};
use crate::entities::Deps;

/// Converts a string (or one property of an object) into a number.
///
/// Empty input becomes `0`; anything that does not parse becomes `-1`.
#[derive(Clone, Debug, Default)]
pub struct ParseIntPipe {
    property: Option<String>,
}

impl ParseIntPipe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the number from `property` when the value is an object.
    pub fn property(property: impl Into<String>) -> Self {
        Self {
            property: Some(property.into()),
        }
    }

    fn parse(raw: &str) -> Value {
        let raw = raw.trim();
        if raw.is_empty() {
            return Value::from(0);
        }
        if let Ok(n) = raw.parse::<i64>() {
            return Value::from(n);
        }
        raw.parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map_or(Value::from(-1), Value::Number)
    }
}

impl Pipe for ParseIntPipe {
    fn transform(&self, value: Value, _: &TypeHint) -> Result<Value, HttpException> {
        let picked = match (&self.property, value) {
            (_, Value::String(s)) => return Ok(Self::parse(&s)),
            (_, n @ Value::Number(_)) => return Ok(n),
            (Some(key), Value::Object(mut map)) => map.remove(key).unwrap_or(Value::Null),
            _ => return Ok(Value::from(0)),
        };
        Ok(match picked {
            Value::String(s) => Self::parse(&s),
            n @ Value::Number(_) => n,
            Value::Null => Value::from(0),
            _ => Value::from(-1),
        })
    }
}

impl Injectable for ParseIntPipe {
    fn construct(_: &mut Deps) -> anyhow::Result<Self> {
        Ok(Self::default())
    }
}

/// Accepts `true`/`false` (as booleans or strings); anything else is a 400.
#[derive(Clone, Copy, Debug, Default)]
pub struct ParseBoolPipe;

impl Pipe for ParseBoolPipe {
    fn transform(&self, value: Value, _: &TypeHint) -> Result<Value, HttpException> {
        match value {
            Value::Bool(b) => Ok(Value::Bool(b)),
            Value::String(s) if s == "true" => Ok(Value::Bool(true)),
            Value::String(s) if s == "false" => Ok(Value::Bool(false)),
            _ => Err(HttpException::bad_request(
                "Validation failed (boolean string is expected)",
            )),
        }
    }
}

impl Injectable for ParseBoolPipe {
    fn construct(_: &mut Deps) -> anyhow::Result<Self> {
        Ok(Self)
    }
}

/// Substitutes a fixed value for a missing (`null`) argument.
#[derive(Clone, Debug)]
pub struct DefaultValuePipe(pub Value);

impl Pipe for DefaultValuePipe {
    fn transform(&self, value: Value, _: &TypeHint) -> Result<Value, HttpException> {
        Ok(if value.is_null() { self.0.clone() } else { value })
    }
}

/// Rejects values whose JSON type does not match the parameter's type hint.
#[derive(Clone, Copy, Debug, Default)]
pub struct ValidationPipe;

impl Pipe for ValidationPipe {
    fn transform(&self, value: Value, hint: &TypeHint) -> Result<Value, HttpException> {
        let ok = match hint {
            TypeHint::Any => true,
            TypeHint::String => value.is_string(),
            TypeHint::Number => value.is_number(),
            TypeHint::Boolean => value.is_boolean(),
            TypeHint::Array => value.is_array(),
            TypeHint::Object | TypeHint::Named(_) => value.is_object(),
        };
        if ok {
            Ok(value)
        } else {
            Err(HttpException::bad_request(format!(
                "expected {}",
                describe(hint)
            )))
        }
    }
}

impl Injectable for ValidationPipe {
    fn construct(_: &mut Deps) -> anyhow::Result<Self> {
        Ok(Self)
    }
}

fn describe(hint: &TypeHint) -> &'static str {
    match hint {
        TypeHint::Any => "any value",
        TypeHint::String => "string",
        TypeHint::Number => "number",
        TypeHint::Boolean => "boolean",
        TypeHint::Object => "object",
        TypeHint::Array => "array",
        TypeHint::Named(name) => *name,
    }
}
