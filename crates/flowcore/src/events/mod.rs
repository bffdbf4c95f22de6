// crates/flowcore/src/events/mod.rs

mod record;
mod sse;

pub use record::{
    CompleteEvent, EdgeStatus, EdgeStatusEvent, ErrorEvent, EventRecord, NodeStatus,
    NodeStatusEvent,
};
pub use sse::sse_frame;
