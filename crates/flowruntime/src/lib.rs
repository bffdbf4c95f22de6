//! Flow execution runtime
//!
//! This crate provides the engine that runs step graphs: topological
//! ordering, the extension registry and built-in extensions, the executor
//! with its retry loop and event stream, and the handler registry used to
//! resolve flow files.

mod builder;
mod executor;
pub mod extensions;
mod graph;
mod registry;
mod runtime;

pub use builder::{quick_flow, run_pipeline, FlowFile, StepSpec, PIPELINE_ID, QUICK_FLOW_ID};
pub use executor::{EventStream, FlowExecutor, RunReport, DEFAULT_EVENT_BUFFER};
pub use extensions::{
    ExtensionRegistry, LoggingExtension, ProgressExtension, RetryExtension, StreamExtension,
    TimingExtension, ValidationExtension,
};
pub use graph::ExecutionGraph;
pub use registry::{ConfigKey, HandlerConfig, HandlerFactory, HandlerMetadata, HandlerRegistry};
pub use runtime::{FlowRuntime, RuntimeConfig};
