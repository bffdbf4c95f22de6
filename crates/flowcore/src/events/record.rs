use crate::{StepId, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Pending,
    Running,
    Success,
    Error,
    Warning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeStatus {
    Pending,
    Running,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeStatusEvent {
    pub node_id: StepId,
    pub status: NodeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub graph_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeStatusEvent {
    pub source_id: StepId,
    pub target_id: StepId,
    pub status: EdgeStatus,
    pub animated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub graph_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompleteEvent {
    completed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<BTreeMap<StepId, Value>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEvent {
    error: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<StepId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<BTreeMap<String, Value>>,
}

/// A serializable progress notification.
///
/// Serializes to the bare payload; the kind travels separately as
/// [`EventRecord::event_name`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EventRecord {
    NodeStatus(NodeStatusEvent),
    EdgeStatus(EdgeStatusEvent),
    Complete(CompleteEvent),
    Error(ErrorEvent),
}

impl EventRecord {
    pub fn node_status(
        node_id: impl Into<StepId>,
        status: NodeStatus,
        graph_id: Option<&str>,
        message: Option<String>,
    ) -> Self {
        EventRecord::NodeStatus(NodeStatusEvent {
            node_id: node_id.into(),
            status,
            graph_id: tag(graph_id),
            message,
        })
    }

    pub fn edge_status(
        source_id: impl Into<StepId>,
        target_id: impl Into<StepId>,
        status: EdgeStatus,
        animated: bool,
        graph_id: Option<&str>,
    ) -> Self {
        EventRecord::EdgeStatus(EdgeStatusEvent {
            source_id: source_id.into(),
            target_id: target_id.into(),
            status,
            animated,
            graph_id: tag(graph_id),
        })
    }

    pub fn complete(message: Option<String>, results: Option<BTreeMap<StepId, Value>>) -> Self {
        EventRecord::Complete(CompleteEvent {
            completed: true,
            message,
            results,
        })
    }

    pub fn error(
        message: impl Into<String>,
        node_id: Option<StepId>,
        details: Option<BTreeMap<String, Value>>,
    ) -> Self {
        EventRecord::Error(ErrorEvent {
            error: true,
            message: message.into(),
            node_id,
            details,
        })
    }

    /// Wire event name: `nodeStatus`, `edgeStatus`, `complete` or `error`.
    pub fn event_name(&self) -> &'static str {
        match self {
            EventRecord::NodeStatus(_) => "nodeStatus",
            EventRecord::EdgeStatus(_) => "edgeStatus",
            EventRecord::Complete(_) => "complete",
            EventRecord::Error(_) => "error",
        }
    }

    /// `Complete` and `Error` end a run's stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, EventRecord::Complete(_) | EventRecord::Error(_))
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// `{"event": <name>, "data": <payload>}`, one object per record.
    pub fn to_envelope(&self) -> serde_json::Result<serde_json::Value> {
        Ok(serde_json::json!({
            "event": self.event_name(),
            "data": serde_json::to_value(self)?,
        }))
    }
}

fn tag(graph_id: Option<&str>) -> Option<String> {
    graph_id.filter(|g| !g.is_empty()).map(str::to_string)
}

impl fmt::Display for EventRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventRecord::NodeStatus(e) => {
                write!(f, "node {} -> {:?}", e.node_id, e.status)?;
                if let Some(message) = &e.message {
                    write!(f, " ({})", message)?;
                }
                Ok(())
            }
            EventRecord::EdgeStatus(e) => {
                write!(f, "edge {} -> {}: {:?}", e.source_id, e.target_id, e.status)
            }
            EventRecord::Complete(e) => {
                write!(f, "complete: {}", e.message.as_deref().unwrap_or("done"))
            }
            EventRecord::Error(e) => match &e.node_id {
                Some(node) => write!(f, "error in {}: {}", node, e.message),
                None => write!(f, "error: {}", e.message),
            },
        }
    }
}
