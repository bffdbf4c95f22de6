use crate::pick_input;
use async_trait::async_trait;
use flowcore::{Context, StepError, StepHandler, StepInputs, Value};
use flowruntime::{ConfigKey, HandlerConfig, HandlerFactory, HandlerMetadata};
use std::sync::Arc;
use tokio::time::{sleep, Duration};

/// Sleeps, then passes its input through
pub struct Delay {
    delay: Duration,
}

#[async_trait]
impl StepHandler for Delay {
    async fn call(&self, _ctx: &mut Context, inputs: StepInputs) -> Result<Value, StepError> {
        tracing::debug!("Delaying for {}ms", self.delay.as_millis());
        sleep(self.delay).await;

        if inputs.is_empty() {
            return Ok(Value::Null);
        }
        pick_input(&inputs, None)
    }
}

pub struct DelayFactory;

impl HandlerFactory for DelayFactory {
    fn create(&self, config: &HandlerConfig) -> Result<Arc<dyn StepHandler>, StepError> {
        let delay_ms = match config.get("delay_ms") {
            None => 1000.0,
            Some(v) => v
                .as_f64()
                .filter(|ms| *ms >= 0.0)
                .ok_or_else(|| StepError::Configuration("delay_ms must be a non-negative number".into()))?,
        };
        Ok(Arc::new(Delay {
            delay: Duration::from_millis(delay_ms as u64),
        }))
    }

    fn handler_type(&self) -> &str {
        "time.delay"
    }

    fn metadata(&self) -> HandlerMetadata {
        HandlerMetadata {
            description: "Delay execution for specified milliseconds".to_string(),
            category: "time".to_string(),
            config_keys: vec![ConfigKey::optional("delay_ms", "Milliseconds to wait (default 1000)")],
        }
    }
}
