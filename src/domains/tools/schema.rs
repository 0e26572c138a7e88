//! Argument validation against a [`ToolDescriptor`].
//!
//! Every problem is collected before returning so the caller sees all of
//! them at once.

use chrono::NaiveDate;
use serde::Serialize;
use serde_json::{Map, Value};

use super::descriptor::{ParamKind, ParamSpec, ParamValue, ToolDescriptor, ValidatedParams};

/// One rejected argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// Validate and coerce `args` for `descriptor`.
pub fn validate(
    descriptor: &ToolDescriptor,
    args: &Map<String, Value>,
) -> Result<ValidatedParams, Vec<FieldError>> {
    let mut errors = Vec::new();
    let mut params = ValidatedParams::new();

    for key in args.keys() {
        if descriptor.param_spec(key).is_none() {
            errors.push(FieldError::new(key, "unknown parameter"));
        }
    }

    for spec in &descriptor.params {
        let supplied = args.get(&spec.name).filter(|v| !is_blank(v));
        let raw = match (supplied, &spec.default) {
            (Some(value), _) => value,
            (None, Some(default)) => default,
            (None, None) if spec.required => {
                errors.push(FieldError::new(&spec.name, "is required"));
                continue;
            }
            (None, None) => continue,
        };

        match coerce(spec, raw).and_then(|value| check_constraints(spec, value)) {
            Ok(value) => params.insert(spec.name.clone(), value),
            Err(message) => errors.push(FieldError::new(&spec.name, message)),
        }
    }

    if let Some((start, end)) = &descriptor.date_range {
        if let (Some(ParamValue::Text(from)), Some(ParamValue::Text(to))) =
            (params.get(start), params.get(end))
        {
            // ISO dates order lexicographically.
            if from > to {
                errors.push(FieldError::new(start, format!("cannot be after '{end}'")));
            }
        }
    }

    if errors.is_empty() {
        Ok(params)
    } else {
        Err(errors)
    }
}

/// Render field errors as one message.
pub fn describe(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| format!("'{}' {}", e.field, e.message))
        .collect::<Vec<_>>()
        .join("; ")
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

fn coerce(spec: &ParamSpec, raw: &Value) -> Result<ParamValue, String> {
    match spec.kind {
        ParamKind::String => match raw {
            Value::String(s) => Ok(ParamValue::Text(s.trim().to_string())),
            Value::Number(n) => Ok(ParamValue::Text(n.to_string())),
            _ => Err("must be a string".to_string()),
        },
        ParamKind::Integer => {
            let parsed = match raw {
                Value::Number(n) => n.as_i64().or_else(|| {
                    n.as_f64()
                        .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                        .map(|f| f as i64)
                }),
                Value::String(s) => s.trim().parse::<i64>().ok(),
                _ => None,
            };
            parsed
                .map(ParamValue::Integer)
                .ok_or_else(|| "must be an integer".to_string())
        }
        ParamKind::Number => {
            let parsed = match raw {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
                _ => None,
            };
            parsed
                .map(ParamValue::Number)
                .ok_or_else(|| "must be a number".to_string())
        }
        ParamKind::Boolean => match raw {
            Value::Bool(b) => Ok(ParamValue::Bool(*b)),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => Ok(ParamValue::Bool(true)),
                "false" | "0" | "no" => Ok(ParamValue::Bool(false)),
                _ => Err("must be a boolean".to_string()),
            },
            Value::Number(n) if n.as_u64() == Some(0) || n.as_u64() == Some(1) => {
                Ok(ParamValue::Bool(n.as_u64() == Some(1)))
            }
            _ => Err("must be a boolean".to_string()),
        },
        ParamKind::Date => match raw {
            Value::String(s) if is_iso_date(s.trim()) => Ok(ParamValue::Text(s.trim().to_string())),
            _ => Err("must be a date in YYYY-MM-DD format".to_string()),
        },
        ParamKind::StringList => {
            let items: Vec<String> = match raw {
                Value::String(s) => s.split(',').map(str::trim).map(str::to_string).collect(),
                Value::Array(values) => {
                    let mut items = Vec::with_capacity(values.len());
                    for value in values {
                        match value {
                            Value::String(s) => items.push(s.trim().to_string()),
                            Value::Number(n) => items.push(n.to_string()),
                            _ => return Err("must be a list of strings".to_string()),
                        }
                    }
                    items
                }
                _ => return Err("must be a list of strings or a comma-separated string".to_string()),
            };
            let items: Vec<String> = items.into_iter().filter(|s| !s.is_empty()).collect();
            if items.is_empty() {
                return Err("must contain at least one item".to_string());
            }
            Ok(ParamValue::List(items))
        }
    }
}

fn check_constraints(spec: &ParamSpec, value: ParamValue) -> Result<ParamValue, String> {
    let c = &spec.constraints;

    let numeric = match &value {
        ParamValue::Integer(n) => Some(*n as f64),
        ParamValue::Number(n) => Some(*n),
        _ => None,
    };
    if let Some(n) = numeric {
        if let Some(min) = c.min.filter(|min| n < *min) {
            return Err(format!("must be at least {min}"));
        }
        if let Some(max) = c.max.filter(|max| n > *max) {
            return Err(format!("must be at most {max}"));
        }
    }

    if let (Some(allowed), ParamValue::Text(s)) = (&c.one_of, &value) {
        if !allowed.iter().any(|a| a == s) {
            return Err(format!("must be one of: {}", allowed.join(", ")));
        }
    }

    if let (Some(max), ParamValue::List(items)) = (c.max_items, &value) {
        if items.len() > max {
            return Err(format!("accepts at most {max} items (got {})", items.len()));
        }
    }

    Ok(value)
}

fn is_iso_date(s: &str) -> bool {
    s.len() == 10 && NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
}
