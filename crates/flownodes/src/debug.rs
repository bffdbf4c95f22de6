use async_trait::async_trait;
use flowcore::{Context, StepError, StepHandler, StepInputs, Value};
use flowruntime::{ConfigKey, HandlerConfig, HandlerFactory, HandlerMetadata};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Logs its message and inputs, then returns both
pub struct DebugLog {
    message: String,
}

#[async_trait]
impl StepHandler for DebugLog {
    async fn call(&self, _ctx: &mut Context, inputs: StepInputs) -> Result<Value, StepError> {
        tracing::info!("DEBUG: {}", self.message);

        let mut seen = BTreeMap::new();
        for (key, value) in inputs {
            tracing::info!("  {}: {:?}", key, value);
            seen.insert(key, value.unwrap_or_default());
        }

        let mut output = BTreeMap::new();
        output.insert("message".to_string(), Value::from(self.message.as_str()));
        output.insert("inputs".to_string(), Value::Object(seen));
        Ok(Value::Object(output))
    }
}

pub struct DebugLogFactory;

impl HandlerFactory for DebugLogFactory {
    fn create(&self, config: &HandlerConfig) -> Result<Arc<dyn StepHandler>, StepError> {
        let message = config
            .get("message")
            .and_then(|v| v.as_str())
            .unwrap_or("(no message)")
            .to_string();
        Ok(Arc::new(DebugLog { message }))
    }

    fn handler_type(&self) -> &str {
        "debug.log"
    }

    fn metadata(&self) -> HandlerMetadata {
        HandlerMetadata {
            description: "Logs input values for debugging".to_string(),
            category: "debug".to_string(),
            config_keys: vec![ConfigKey::optional("message", "Text to log")],
        }
    }
}

/// Fails on purpose. With `times` set, only the first `times` calls fail
/// and later ones succeed, which makes retries observable.
pub struct DebugFail {
    message: String,
    times: Option<u32>,
    calls: AtomicU32,
}

#[async_trait]
impl StepHandler for DebugFail {
    async fn call(&self, _ctx: &mut Context, _inputs: StepInputs) -> Result<Value, StepError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        match self.times {
            Some(times) if call > times => Ok(Value::from(format!("recovered after {}", times))),
            _ => Err(StepError::failed(self.message.clone())),
        }
    }
}

pub struct DebugFailFactory;

impl HandlerFactory for DebugFailFactory {
    fn create(&self, config: &HandlerConfig) -> Result<Arc<dyn StepHandler>, StepError> {
        let message = config
            .get("message")
            .and_then(|v| v.as_str())
            .unwrap_or("debug.fail")
            .to_string();
        let times = match config.get("times") {
            None => None,
            Some(v) => Some(
                v.as_i64()
                    .and_then(|n| u32::try_from(n).ok())
                    .ok_or_else(|| {
                        StepError::Configuration("times must be a non-negative integer".into())
                    })?,
            ),
        };
        Ok(Arc::new(DebugFail {
            message,
            times,
            calls: AtomicU32::new(0),
        }))
    }

    fn handler_type(&self) -> &str {
        "debug.fail"
    }

    fn metadata(&self) -> HandlerMetadata {
        HandlerMetadata {
            description: "Raises an execution error".to_string(),
            category: "debug".to_string(),
            config_keys: vec![
                ConfigKey::optional("message", "Error message"),
                ConfigKey::optional("times", "Fail only the first N calls"),
            ],
        }
    }
}
