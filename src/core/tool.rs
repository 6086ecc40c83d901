use std::borrow::Cow;
use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use rmcp::model::{CallToolResult, Content, JsonObject};
use serde::de::DeserializeOwned;
use serde_json::{json, Value as J};

use crate::core::content::flatten_text;
use crate::core::error::{McpError, ToolError};

/// Tool metadata as advertised by `tools/list`. The raw input schema is kept
/// verbatim; [`InputSchema::of`] derives the view used for argument checks.
pub type ToolDescriptor = rmcp::model::Tool;

/// Primitive JSON types a tool parameter may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    Number,
    Integer,
    String,
    Boolean,
    Object,
    Array,
    Null,
    /// Anything we do not check (e.g. formats declared by foreign servers).
    Any,
}

impl ParamType {
    pub fn parse(name: &str) -> Self {
        match name {
            "number" => ParamType::Number,
            "integer" => ParamType::Integer,
            "string" => ParamType::String,
            "boolean" => ParamType::Boolean,
            "object" => ParamType::Object,
            "array" => ParamType::Array,
            "null" => ParamType::Null,
            _ => ParamType::Any,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ParamType::Number => "number",
            ParamType::Integer => "integer",
            ParamType::String => "string",
            ParamType::Boolean => "boolean",
            ParamType::Object => "object",
            ParamType::Array => "array",
            ParamType::Null => "null",
            ParamType::Any => "any",
        }
    }

    pub fn matches(self, v: &J) -> bool {
        match self {
            ParamType::Number => v.is_number(),
            ParamType::Integer => v.is_i64() || v.is_u64(),
            ParamType::String => v.is_string(),
            ParamType::Boolean => v.is_boolean(),
            ParamType::Object => v.is_object(),
            ParamType::Array => v.is_array(),
            ParamType::Null => v.is_null(),
            ParamType::Any => true,
        }
    }
}

fn json_type_name(v: &J) -> &'static str {
    match v {
        J::Null => "null",
        J::Bool(_) => "boolean",
        J::Number(_) => "number",
        J::String(_) => "string",
        J::Array(_) => "array",
        J::Object(_) => "object",
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PropertySchema {
    /// Accepted types; empty means unchecked.
    pub kinds: Vec<ParamType>,
    pub description: Option<String>,
}

impl PropertySchema {
    fn from_json(v: &J) -> Self {
        let kinds = match v.get("type") {
            Some(J::String(s)) => vec![ParamType::parse(s)],
            Some(J::Array(names)) => names.iter().filter_map(J::as_str).map(ParamType::parse).collect(),
            _ => Vec::new(),
        };
        let description = v.get("description").and_then(J::as_str).map(str::to_owned);
        Self { kinds, description }
    }

    fn accepts(&self, v: &J) -> bool {
        self.kinds.is_empty() || self.kinds.iter().any(|k| k.matches(v))
    }

    fn expected(&self) -> String {
        self.kinds.iter().map(|k| k.as_str()).collect::<Vec<_>>().join(" or ")
    }
}

/// Typed view over a JSON-Schema object: named parameters, their primitive
/// types and which are required. Keywords it does not model stay in the raw
/// schema on the descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InputSchema {
    pub properties: BTreeMap<String, PropertySchema>,
    pub required: Vec<String>,
}

impl InputSchema {
    pub fn object() -> Self {
        Self::default()
    }

    pub fn required(mut self, name: &str, kind: ParamType, description: &str) -> Self {
        self.required.push(name.to_owned());
        self.optional(name, kind, description)
    }

    pub fn optional(mut self, name: &str, kind: ParamType, description: &str) -> Self {
        self.properties.insert(
            name.to_owned(),
            PropertySchema { kinds: vec![kind], description: Some(description.to_owned()) },
        );
        self
    }

    /// Lenient read of a raw schema; malformed parts are left unchecked.
    pub fn from_json_object(schema: &JsonObject) -> Self {
        let properties = schema
            .get("properties")
            .and_then(J::as_object)
            .map(|props| {
                props.iter().map(|(k, v)| (k.clone(), PropertySchema::from_json(v))).collect()
            })
            .unwrap_or_default();
        let required = schema
            .get("required")
            .and_then(J::as_array)
            .map(|names| names.iter().filter_map(J::as_str).map(str::to_owned).collect())
            .unwrap_or_default();
        Self { properties, required }
    }

    pub fn of(descriptor: &ToolDescriptor) -> Self {
        Self::from_json_object(&descriptor.input_schema)
    }

    pub fn to_json_object(&self) -> JsonObject {
        let properties: serde_json::Map<String, J> = self
            .properties
            .iter()
            .map(|(name, p)| {
                let mut prop = serde_json::Map::new();
                match p.kinds.as_slice() {
                    [] => {}
                    [one] => {
                        prop.insert("type".into(), json!(one.as_str()));
                    }
                    many => {
                        prop.insert("type".into(), json!(many.iter().map(|k| k.as_str()).collect::<Vec<_>>()));
                    }
                }
                if let Some(d) = &p.description {
                    prop.insert("description".into(), json!(d));
                }
                (name.clone(), J::Object(prop))
            })
            .collect();
        let mut schema = JsonObject::new();
        schema.insert("type".into(), json!("object"));
        schema.insert("properties".into(), J::Object(properties));
        if !self.required.is_empty() {
            schema.insert("required".into(), json!(self.required));
        }
        schema
    }

    pub fn is_required(&self, name: &str) -> bool {
        self.required.iter().any(|r| r == name)
    }

    /// Check `arguments` against the declared fields. `null` counts as `{}`.
    /// Undeclared extra keys are accepted.
    pub fn validate(&self, arguments: &J) -> Result<(), String> {
        let empty = serde_json::Map::new();
        let obj = match arguments {
            J::Object(map) => map,
            J::Null => &empty,
            other => return Err(format!("arguments must be an object, got {}", json_type_name(other))),
        };
        if let Some(missing) = self.required.iter().find(|r| !obj.contains_key(r.as_str())) {
            return Err(format!("missing required argument `{missing}`"));
        }
        for (key, value) in obj {
            let Some(prop) = self.properties.get(key) else {
                continue;
            };
            if !prop.accepts(value) {
                return Err(format!(
                    "argument `{key}` must be {}, got {}",
                    prop.expected(),
                    json_type_name(value)
                ));
            }
        }
        Ok(())
    }
}

/// Build a descriptor from a name, a description and a typed schema.
pub fn descriptor(
    name: impl Into<Cow<'static, str>>,
    description: impl Into<Cow<'static, str>>,
    schema: &InputSchema,
) -> ToolDescriptor {
    ToolDescriptor {
        name: name.into(),
        title: None,
        description: Some(description.into()),
        input_schema: Arc::new(schema.to_json_object()),
        output_schema: None,
        annotations: None,
        icons: None,
        meta: None,
    }
}

/// Minimal metadata every tool must expose.
pub trait ToolSpec {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    fn input_schema(&self) -> InputSchema;

    fn descriptor(&self) -> ToolDescriptor {
        descriptor(self.name(), self.description(), &self.input_schema())
    }
}

/// Tool = Spec + an implementation over raw JSON arguments.
#[async_trait]
pub trait Tool: ToolSpec + Send + Sync {
    async fn call(&self, arguments: J) -> Result<CallToolResult, ToolError>;
}

/// A tool whose arguments decode into a typed record once, at the boundary.
#[async_trait]
pub trait TypedTool: ToolSpec + Send + Sync {
    type Args: DeserializeOwned + Send;

    async fn run(&self, args: Self::Args) -> Result<CallToolResult, ToolError>;
}

#[async_trait]
impl<T: TypedTool> Tool for T {
    async fn call(&self, arguments: J) -> Result<CallToolResult, ToolError> {
        let arguments = if arguments.is_null() { J::Object(Default::default()) } else { arguments };
        let args: T::Args = serde_json::from_value(arguments)
            .map_err(|e| ToolError::InvalidArguments(e.to_string()))?;
        self.run(args).await
    }
}

/// How a proxied tool hands its result to the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResultMode {
    #[default]
    Text,
    Content,
}

#[derive(Debug, Clone)]
pub enum ToolOutput {
    Text(String),
    Content(Vec<Content>),
}

impl ToolOutput {
    pub fn from_result(result: CallToolResult, mode: ResultMode) -> Self {
        match mode {
            ResultMode::Text => ToolOutput::Text(flatten_text(&result.content)),
            ResultMode::Content => ToolOutput::Content(result.content),
        }
    }

    pub fn to_text(&self) -> String {
        match self {
            ToolOutput::Text(t) => t.clone(),
            ToolOutput::Content(items) => flatten_text(items),
        }
    }
}

/// Backend abstraction so a tool can be local or remote.
#[async_trait]
pub trait ToolBackend: Send + Sync {
    fn descriptor(&self) -> &ToolDescriptor;
    async fn invoke(&self, arguments: J) -> Result<ToolOutput, McpError>;
}
