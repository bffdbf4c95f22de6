use flowcore::{FlowError, FlowNode, NodeExecutor, StepError, StepHandler, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Step configuration as written in a flow file.
pub type HandlerConfig = BTreeMap<String, Value>;

/// Factory trait for creating step handlers by name
pub trait HandlerFactory: Send + Sync {
    /// Build a handler from the step's configuration
    fn create(&self, config: &HandlerConfig) -> Result<Arc<dyn StepHandler>, StepError>;

    /// Handler type identifier, e.g. `debug.log`
    fn handler_type(&self) -> &str;

    fn metadata(&self) -> HandlerMetadata {
        HandlerMetadata::default()
    }
}

/// Metadata about a handler type
#[derive(Debug, Clone)]
pub struct HandlerMetadata {
    pub description: String,
    pub category: String,
    pub config_keys: Vec<ConfigKey>,
}

impl Default for HandlerMetadata {
    fn default() -> Self {
        Self {
            description: String::new(),
            category: "general".to_string(),
            config_keys: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConfigKey {
    pub name: String,
    pub description: String,
    pub required: bool,
}

impl ConfigKey {
    pub fn required(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            required: true,
        }
    }

    pub fn optional(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            required: false,
        }
    }
}

/// Registry of available handler types.
///
/// Instances are passed explicitly to whatever resolves step files, so
/// separate runtimes and tests never share registrations. A
/// [`NodeExecutor`] can be attached to give steps with node metadata and
/// no named handler their per-kind behaviour.
#[derive(Default)]
pub struct HandlerRegistry {
    factories: HashMap<String, Arc<dyn HandlerFactory>>,
    nodes: Option<Arc<dyn NodeExecutor>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler factory, replacing any factory of the same type
    pub fn register(&mut self, factory: Arc<dyn HandlerFactory>) {
        let handler_type = factory.handler_type().to_string();
        tracing::debug!("Registering handler type: {}", handler_type);
        if self.factories.insert(handler_type.clone(), factory).is_some() {
            tracing::warn!("Handler type {} was already registered, replaced", handler_type);
        }
    }

    pub fn contains(&self, handler_type: &str) -> bool {
        self.factories.contains_key(handler_type)
    }

    /// Create a handler instance from a handler type and config
    pub fn create_handler(
        &self,
        handler_type: &str,
        config: &HandlerConfig,
    ) -> Result<Arc<dyn StepHandler>, FlowError> {
        let factory = self
            .factories
            .get(handler_type)
            .ok_or_else(|| FlowError::UnknownHandler(handler_type.to_string()))?;

        factory.create(config).map_err(|source| FlowError::HandlerConfig {
            step: handler_type.to_string(),
            source,
        })
    }

    pub fn set_node_executor(&mut self, nodes: Arc<dyn NodeExecutor>) {
        self.nodes = Some(nodes);
    }

    /// Handler for a step that only carries node metadata.
    pub fn node_handler(&self, node: &FlowNode) -> Option<Arc<dyn StepHandler>> {
        self.nodes.as_ref().and_then(|nodes| nodes.handler_for(node))
    }

    /// Registered handler types, sorted
    pub fn list_handler_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.factories.keys().cloned().collect();
        types.sort();
        types
    }

    pub fn get_metadata(&self, handler_type: &str) -> Option<HandlerMetadata> {
        self.factories.get(handler_type).map(|f| f.metadata())
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("types", &self.list_handler_types())
            .field("node_executor", &self.nodes.is_some())
            .finish()
    }
}
