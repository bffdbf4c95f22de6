use crate::pick_input;
use crate::transform::string_key;
use async_trait::async_trait;
use flowcore::{Context, StepError, StepHandler, StepInputs, Value};
use flowruntime::{ConfigKey, HandlerConfig, HandlerFactory, HandlerMetadata};
use std::sync::Arc;

/// Writes a value into the run context under `key`.
///
/// Uses the configured `value`, or else the result of a dependency, so
/// later steps and extensions can read it.
pub struct ContextSet {
    key: String,
    value: Option<Value>,
    from: Option<String>,
}

#[async_trait]
impl StepHandler for ContextSet {
    async fn call(&self, ctx: &mut Context, inputs: StepInputs) -> Result<Value, StepError> {
        let value = match &self.value {
            Some(value) => value.clone(),
            None => pick_input(&inputs, self.from.as_deref())?,
        };
        tracing::debug!("Setting context key {}", self.key);
        ctx.insert(self.key.clone(), value.clone());
        Ok(value)
    }
}

pub struct ContextSetFactory;

impl HandlerFactory for ContextSetFactory {
    fn create(&self, config: &HandlerConfig) -> Result<Arc<dyn StepHandler>, StepError> {
        let key = string_key(config, "key")?
            .filter(|k| !k.is_empty())
            .ok_or_else(|| StepError::Configuration("key is required".into()))?;
        Ok(Arc::new(ContextSet {
            key,
            value: config.get("value").cloned(),
            from: string_key(config, "from")?,
        }))
    }

    fn handler_type(&self) -> &str {
        "context.set"
    }

    fn metadata(&self) -> HandlerMetadata {
        HandlerMetadata {
            description: "Store a value in the run context".to_string(),
            category: "context".to_string(),
            config_keys: vec![
                ConfigKey::required("key", "Context key to write"),
                ConfigKey::optional("value", "Literal value to store"),
                ConfigKey::optional("from", "Dependency whose result is stored"),
            ],
        }
    }
}
