//! Declarative tool descriptions.
//!
//! A [`ToolDescriptor`] is plain data: which upstream endpoint a tool calls,
//! which parameters it accepts and where each one goes, the scope a caller
//! needs and how long responses stay cached. The dispatcher interprets
//! descriptors; adding a tool never requires new dispatch code.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::Serialize;
use serde_json::{Map, Value, json};

use crate::domains::upstream::UpstreamRequest;

// ============================================================================
// Cache Policy
// ============================================================================

/// Whether and for how long a tool's responses are cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    Bypass,
    Ttl(Duration),
}

impl CachePolicy {
    pub const REALTIME: Self = Self::Ttl(Duration::from_secs(10));
    pub const INTRADAY: Self = Self::Ttl(Duration::from_secs(60));
    pub const EOD: Self = Self::Ttl(Duration::from_secs(3600));
    pub const FUNDAMENTALS: Self = Self::Ttl(Duration::from_secs(86_400));
    pub const STATIC: Self = Self::Ttl(Duration::from_secs(7 * 86_400));

    pub fn ttl(&self) -> Option<Duration> {
        match self {
            Self::Bypass => None,
            Self::Ttl(ttl) if ttl.is_zero() => None,
            Self::Ttl(ttl) => Some(*ttl),
        }
    }
}

// ============================================================================
// Parameters
// ============================================================================

/// Declared type of a parameter. Inputs are coerced to this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    String,
    Integer,
    Number,
    Boolean,
    /// `YYYY-MM-DD`.
    Date,
    /// JSON array of strings or a comma-separated string.
    StringList,
}

impl ParamKind {
    fn json_type(&self) -> &'static str {
        match self {
            Self::String | Self::Date => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::StringList => "array",
        }
    }
}

/// Where a parameter is placed in the upstream request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamLocation {
    /// Substituted into the endpoint template.
    Path,
    /// Sent as a query parameter under the given name.
    Query(String),
}

/// Value constraints checked after coercion.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Constraints {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub one_of: Option<Vec<String>>,
    pub max_items: Option<usize>,
}

/// One declared parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    pub name: String,
    pub kind: ParamKind,
    pub required: bool,
    pub default: Option<Value>,
    pub location: ParamLocation,
    pub description: String,
    pub constraints: Constraints,
}

impl ParamSpec {
    /// Optional query parameter sent under its own name.
    pub fn new(name: impl Into<String>, kind: ParamKind, description: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            location: ParamLocation::Query(name.clone()),
            name,
            kind,
            required: false,
            default: None,
            description: description.into(),
            constraints: Constraints::default(),
        }
    }

    pub fn string(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, ParamKind::String, description)
    }

    pub fn integer(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, ParamKind::Integer, description)
    }

    pub fn number(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, ParamKind::Number, description)
    }

    pub fn boolean(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, ParamKind::Boolean, description)
    }

    pub fn date(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, ParamKind::Date, description)
    }

    pub fn list(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, ParamKind::StringList, description)
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Substitute into the endpoint path. Path parameters are always required.
    pub fn in_path(mut self) -> Self {
        self.location = ParamLocation::Path;
        self.required = true;
        self
    }

    /// Send as query parameter `key`.
    pub fn query_as(mut self, key: impl Into<String>) -> Self {
        self.location = ParamLocation::Query(key.into());
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn range(mut self, min: f64, max: f64) -> Self {
        self.constraints.min = Some(min);
        self.constraints.max = Some(max);
        self
    }

    pub fn one_of(mut self, values: &[&str]) -> Self {
        self.constraints.one_of = Some(values.iter().map(|v| v.to_string()).collect());
        self
    }

    pub fn max_items(mut self, max: usize) -> Self {
        self.constraints.max_items = Some(max);
        self
    }

    fn property_schema(&self) -> Value {
        let mut schema = Map::new();
        schema.insert("type".into(), json!(self.kind.json_type()));
        schema.insert("description".into(), json!(self.description));
        match self.kind {
            ParamKind::Date => {
                schema.insert("format".into(), json!("date"));
            }
            ParamKind::StringList => {
                schema.insert("items".into(), json!({ "type": "string" }));
                if let Some(max) = self.constraints.max_items {
                    schema.insert("maxItems".into(), json!(max));
                }
            }
            _ => {}
        }
        if let Some(values) = &self.constraints.one_of {
            schema.insert("enum".into(), json!(values));
        }
        if let Some(min) = self.constraints.min {
            schema.insert("minimum".into(), json!(min));
        }
        if let Some(max) = self.constraints.max {
            schema.insert("maximum".into(), json!(max));
        }
        if let Some(default) = &self.default {
            schema.insert("default".into(), default.clone());
        }
        Value::Object(schema)
    }
}

/// A parameter value after validation and coercion.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    Text(String),
    Integer(i64),
    Number(f64),
    Bool(bool),
    List(Vec<String>),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Integer(n) => write!(f, "{n}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::List(items) => f.write_str(&items.join(",")),
        }
    }
}

/// Validated parameters in canonical (sorted) order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ValidatedParams(BTreeMap<String, ParamValue>);

impl ValidatedParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: ParamValue) {
        self.0.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.0.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamValue)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// ============================================================================
// Endpoint Template
// ============================================================================

/// Upstream path with `{param}` placeholders, e.g. `/eod/{ticker}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointTemplate {
    segments: Vec<String>,
}

impl EndpointTemplate {
    pub fn parse(template: &str) -> Self {
        Self {
            segments: template
                .split('/')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }

    /// Placeholder names in order of appearance.
    pub fn placeholders(&self) -> Vec<String> {
        let mut names = Vec::new();
        for segment in &self.segments {
            let mut rest = segment.as_str();
            while let Some(start) = rest.find('{') {
                let Some(len) = rest[start..].find('}') else {
                    break;
                };
                names.push(rest[start + 1..start + len].to_string());
                rest = &rest[start + len + 1..];
            }
        }
        names
    }

    /// Substitute placeholders. Each rendered segment is URL-encoded later.
    pub fn render(&self, params: &ValidatedParams) -> Result<Vec<String>, String> {
        self.segments
            .iter()
            .map(|segment| {
                let mut rendered = segment.clone();
                for name in EndpointTemplate::parse(segment).placeholders() {
                    let value = params
                        .get(&name)
                        .ok_or_else(|| format!("missing path parameter '{name}'"))?;
                    rendered = rendered.replace(&format!("{{{name}}}"), &value.to_string());
                }
                Ok(rendered)
            })
            .collect()
    }

    pub fn as_path(&self) -> String {
        format!("/{}", self.segments.join("/"))
    }
}

// ============================================================================
// Tool Descriptor
// ============================================================================

/// Immutable description of one tool.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub endpoint: EndpointTemplate,
    pub params: Vec<ParamSpec>,
    pub fixed_query: Vec<(String, String)>,
    pub scope: String,
    pub cache: CachePolicy,
    /// `(start, end)` date parameters that must be ordered when both are given.
    pub date_range: Option<(String, String)>,
}

impl ToolDescriptor {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        endpoint: &str,
        scope: impl Into<String>,
        cache: CachePolicy,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            endpoint: EndpointTemplate::parse(endpoint),
            params: Vec::new(),
            fixed_query: Vec::new(),
            scope: scope.into(),
            cache,
            date_range: None,
        }
    }

    pub fn param(mut self, spec: ParamSpec) -> Self {
        self.params.push(spec);
        self
    }

    /// Query parameter sent on every call.
    pub fn fixed(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fixed_query.push((key.into(), value.into()));
        self
    }

    /// Declare a `start <= end` constraint between two date parameters.
    pub fn date_range(mut self, start: impl Into<String>, end: impl Into<String>) -> Self {
        self.date_range = Some((start.into(), end.into()));
        self
    }

    pub fn param_spec(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }

    /// Shape problems: placeholders without a path parameter, path
    /// parameters missing from the template, duplicate parameter names.
    pub fn check(&self) -> Result<(), String> {
        let placeholders = self.endpoint.placeholders();
        for name in &placeholders {
            match self.param_spec(name) {
                Some(spec) if spec.location == ParamLocation::Path => {}
                _ => return Err(format!("placeholder '{{{name}}}' has no path parameter")),
            }
        }
        for (i, spec) in self.params.iter().enumerate() {
            if spec.location == ParamLocation::Path && !placeholders.contains(&spec.name) {
                return Err(format!("path parameter '{}' is not in the endpoint", spec.name));
            }
            if self.params[..i].iter().any(|p| p.name == spec.name) {
                return Err(format!("parameter '{}' is declared twice", spec.name));
            }
        }
        Ok(())
    }

    /// JSON Schema for the tool's arguments.
    pub fn input_schema(&self) -> Map<String, Value> {
        let properties: Map<String, Value> = self
            .params
            .iter()
            .map(|p| (p.name.clone(), p.property_schema()))
            .collect();
        let required: Vec<&str> = self
            .params
            .iter()
            .filter(|p| p.required && p.default.is_none())
            .map(|p| p.name.as_str())
            .collect();

        let mut schema = Map::new();
        schema.insert("type".into(), json!("object"));
        schema.insert("properties".into(), Value::Object(properties));
        schema.insert("required".into(), json!(required));
        schema.insert("additionalProperties".into(), json!(false));
        schema
    }

    /// Build the upstream request for validated parameters.
    pub fn build_request(&self, params: &ValidatedParams) -> Result<UpstreamRequest, String> {
        let mut request = UpstreamRequest::get(self.endpoint.render(params)?);
        for (key, value) in &self.fixed_query {
            request = request.with_query(key.as_str(), value.as_str());
        }
        for spec in &self.params {
            if let (ParamLocation::Query(key), Some(value)) = (&spec.location, params.get(&spec.name)) {
                request = request.with_query(key.as_str(), value.to_string());
            }
        }
        Ok(request)
    }
}
