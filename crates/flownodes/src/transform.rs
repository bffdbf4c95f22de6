use crate::pick_input;
use async_trait::async_trait;
use flowcore::{Context, StepError, StepHandler, StepInputs, Value};
use flowruntime::{ConfigKey, HandlerConfig, HandlerFactory, HandlerMetadata};
use std::sync::Arc;

/// Parse a JSON string into a [`Value`].
///
/// The text comes from the `json` config key when present, otherwise from
/// the dependency named by `from` (or the only dependency).
pub struct JsonParse {
    literal: Option<String>,
    from: Option<String>,
}

#[async_trait]
impl StepHandler for JsonParse {
    async fn call(&self, _ctx: &mut Context, inputs: StepInputs) -> Result<Value, StepError> {
        let input = match &self.literal {
            Some(text) => Value::from(text.as_str()),
            None => pick_input(&inputs, self.from.as_deref())?,
        };
        let text = input.as_str().ok_or_else(|| StepError::InvalidInputType {
            field: "json".to_string(),
            expected: "string".to_string(),
            actual: type_name(&input).to_string(),
        })?;

        let parsed: serde_json::Value = serde_json::from_str(text)
            .map_err(|e| StepError::failed(format!("JSON parse error: {}", e)))?;
        Ok(Value::from(parsed))
    }
}

pub struct JsonParseFactory;

impl HandlerFactory for JsonParseFactory {
    fn create(&self, config: &HandlerConfig) -> Result<Arc<dyn StepHandler>, StepError> {
        let literal = match config.get("json") {
            None => None,
            Some(v) => Some(
                v.as_str()
                    .ok_or_else(|| StepError::Configuration("json must be a string".into()))?
                    .to_string(),
            ),
        };
        Ok(Arc::new(JsonParse {
            literal,
            from: string_key(config, "from")?,
        }))
    }

    fn handler_type(&self) -> &str {
        "transform.json_parse"
    }

    fn metadata(&self) -> HandlerMetadata {
        HandlerMetadata {
            description: "Parse JSON string".to_string(),
            category: "transform".to_string(),
            config_keys: vec![
                ConfigKey::optional("json", "Literal JSON text"),
                ConfigKey::optional("from", "Dependency whose result is parsed"),
            ],
        }
    }
}

/// Serialize a dependency's result to JSON text
pub struct JsonStringify {
    from: Option<String>,
    pretty: bool,
}

#[async_trait]
impl StepHandler for JsonStringify {
    async fn call(&self, _ctx: &mut Context, inputs: StepInputs) -> Result<Value, StepError> {
        let value = pick_input(&inputs, self.from.as_deref())?;
        let json = if self.pretty {
            serde_json::to_string_pretty(&value)
        } else {
            serde_json::to_string(&value)
        }
        .map_err(|e| StepError::failed(format!("JSON stringify error: {}", e)))?;
        Ok(Value::String(json))
    }
}

pub struct JsonStringifyFactory;

impl HandlerFactory for JsonStringifyFactory {
    fn create(&self, config: &HandlerConfig) -> Result<Arc<dyn StepHandler>, StepError> {
        let pretty = match config.get("pretty") {
            None => false,
            Some(v) => v
                .as_bool()
                .ok_or_else(|| StepError::Configuration("pretty must be a boolean".into()))?,
        };
        Ok(Arc::new(JsonStringify {
            from: string_key(config, "from")?,
            pretty,
        }))
    }

    fn handler_type(&self) -> &str {
        "transform.json_stringify"
    }

    fn metadata(&self) -> HandlerMetadata {
        HandlerMetadata {
            description: "Convert value to JSON string".to_string(),
            category: "transform".to_string(),
            config_keys: vec![
                ConfigKey::optional("from", "Dependency whose result is serialized"),
                ConfigKey::optional("pretty", "Indent the output"),
            ],
        }
    }
}

pub(crate) fn string_key(config: &HandlerConfig, key: &str) -> Result<Option<String>, StepError> {
    match config.get(key) {
        None => Ok(None),
        Some(v) => v
            .as_str()
            .map(|s| Some(s.to_string()))
            .ok_or_else(|| StepError::Configuration(format!("{} must be a string", key))),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Int(_) => "int",
        Value::Float(_) => "float",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
