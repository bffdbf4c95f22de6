use crate::{StepHandler, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Visual node metadata attached to a step.
///
/// Kind-specific fields live in the typed [`NodeKind`] payload; anything else
/// goes in `data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowNode {
    pub id: String,
    #[serde(default)]
    pub label: String,
    #[serde(flatten)]
    pub kind: NodeKind,
    #[serde(default)]
    pub data: BTreeMap<String, Value>,
}

impl FlowNode {
    pub fn new(id: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id: id.into(),
            label: String::new(),
            kind,
            data: BTreeMap::new(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Kind name used for catalog lookups (e.g. "agent").
    pub fn kind_name(&self) -> &str {
        self.kind.name()
    }

    pub fn display_label(&self) -> &str {
        if self.label.is_empty() {
            &self.id
        } else {
            &self.label
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeKind {
    Start,
    End,
    Agent {
        model: String,
        #[serde(default = "default_temperature")]
        temperature: f64,
        #[serde(default)]
        system_prompt: String,
    },
    Tool {
        tool_name: String,
        #[serde(default)]
        tool_description: String,
    },
    Llm {
        model: String,
        #[serde(default = "default_temperature")]
        temperature: f64,
        #[serde(default = "default_max_tokens")]
        max_tokens: u32,
    },
    Condition {
        #[serde(default)]
        condition: String,
    },
    Input {
        #[serde(default)]
        source: String,
    },
    Output {
        #[serde(default)]
        destination: String,
    },
    Filter {
        #[serde(default)]
        condition: String,
    },
    Join {
        #[serde(default = "default_join_type")]
        join_type: String,
    },
    Transform {
        #[serde(default)]
        transform_type: String,
    },
    Process {
        #[serde(default)]
        description: String,
    },
    Decision {
        #[serde(default)]
        question: String,
    },
    Code {
        #[serde(default = "default_language")]
        language: String,
        #[serde(default)]
        code: String,
    },
    Custom {
        type_name: String,
    },
    #[default]
    Default,
}

fn default_temperature() -> f64 {
    0.7
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_join_type() -> String {
    "inner".to_string()
}

fn default_language() -> String {
    "python".to_string()
}

impl NodeKind {
    pub fn name(&self) -> &str {
        match self {
            NodeKind::Start => "start",
            NodeKind::End => "end",
            NodeKind::Agent { .. } => "agent",
            NodeKind::Tool { .. } => "tool",
            NodeKind::Llm { .. } => "llm",
            NodeKind::Condition { .. } => "condition",
            NodeKind::Input { .. } => "input",
            NodeKind::Output { .. } => "output",
            NodeKind::Filter { .. } => "filter",
            NodeKind::Join { .. } => "join",
            NodeKind::Transform { .. } => "transform",
            NodeKind::Process { .. } => "process",
            NodeKind::Decision { .. } => "decision",
            NodeKind::Code { .. } => "code",
            NodeKind::Custom { type_name } => type_name,
            NodeKind::Default => "default",
        }
    }

    /// Number of (input, output) ports drawn for this kind.
    pub fn ports(&self) -> (u32, u32) {
        match self {
            NodeKind::Start | NodeKind::Input { .. } => (0, 1),
            NodeKind::End | NodeKind::Output { .. } => (1, 0),
            NodeKind::Condition { .. } | NodeKind::Decision { .. } => (1, 2),
            NodeKind::Join { .. } => (2, 1),
            _ => (1, 1),
        }
    }
}

/// Checks node metadata before it is executed.
pub trait NodeValidator: Send + Sync {
    /// Returns human-readable problems; empty means valid.
    fn validate(&self, node: &FlowNode) -> Vec<String>;
}

/// Supplies the work for a step that carries node metadata but no handler.
pub trait NodeExecutor: Send + Sync {
    /// Handler running `node`; `None` keeps the simulated work.
    fn handler_for(&self, node: &FlowNode) -> Option<Arc<dyn StepHandler>>;
}
