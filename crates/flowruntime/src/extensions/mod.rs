//! Extension registry and built-in extensions.

mod logging;
mod progress;
mod retry;
mod stream;
mod timing;
mod validation;

pub use logging::LoggingExtension;
pub use progress::{ProgressExtension, PROGRESS_PERCENT};
pub use retry::RetryExtension;
pub use stream::StreamExtension;
pub use timing::{TimingExtension, TOTAL_EXECUTION_TIME};
pub use validation::{ValidationExtension, VALIDATION_ERRORS};

use flowcore::{
    ControlSignal, EventRecord, ExecutionState, Extension, Hook, HookError, HookResult, StepError,
};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Extensions of a run, kept sorted by [`Extension::order`].
///
/// Sorting is stable, so equal orders keep registration order. At most one
/// stream extension is held.
pub struct ExtensionRegistry {
    extensions: Vec<Box<dyn Extension>>,
}

impl ExtensionRegistry {
    /// An empty registry. Nothing will be streamed until a
    /// [`StreamExtension`] is registered.
    pub fn new() -> Self {
        Self {
            extensions: Vec::new(),
        }
    }

    /// A registry holding the default [`StreamExtension`].
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.ensure_stream();
        registry
    }

    pub fn register(&mut self, extension: Box<dyn Extension>) {
        if extension.name() == StreamExtension::NAME {
            if let Some(pos) = self.position(StreamExtension::NAME) {
                tracing::debug!("Replacing existing stream extension");
                self.extensions.remove(pos);
            }
        }
        tracing::debug!(
            "Registering extension: {} (order {})",
            extension.name(),
            extension.order()
        );
        self.extensions.push(extension);
        self.extensions.sort_by_key(|ext| ext.order());
    }

    /// Add the default stream extension unless one is already present.
    pub fn ensure_stream(&mut self) {
        if self.position(StreamExtension::NAME).is_none() {
            self.register(Box::new(StreamExtension::new()));
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn names(&self) -> Vec<&str> {
        self.extensions.iter().map(|ext| ext.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.extensions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.extensions.iter().position(|ext| ext.name() == name)
    }

    /// Call `hook` on every extension in order.
    ///
    /// The first control signal stops the phase and is returned. Other hook
    /// failures, panics included, are logged and the next extension runs.
    pub fn dispatch(
        &mut self,
        hook: Hook,
        state: &mut ExecutionState,
    ) -> Result<(), ControlSignal> {
        self.dispatch_with(hook.name(), |ext| hook.call(ext, state))
    }

    /// Call `on_error` on every extension, with the same rules as
    /// [`dispatch`](Self::dispatch).
    pub fn dispatch_error(
        &mut self,
        state: &mut ExecutionState,
        error: &StepError,
    ) -> Result<(), ControlSignal> {
        self.dispatch_with("on_error", |ext| ext.on_error(state, error))
    }

    fn dispatch_with<F>(&mut self, phase: &str, mut call: F) -> Result<(), ControlSignal>
    where
        F: FnMut(&mut dyn Extension) -> HookResult,
    {
        for ext in self.extensions.iter_mut() {
            let outcome = catch_unwind(AssertUnwindSafe(|| call(ext.as_mut())));
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(HookError::Signal(signal))) => {
                    tracing::debug!("Extension {} raised {} in {}", ext.name(), signal, phase);
                    return Err(signal);
                }
                Ok(Err(HookError::Failed(message))) => {
                    tracing::warn!("Extension {} failed in {}: {}", ext.name(), phase, message);
                }
                Err(panic) => {
                    tracing::warn!(
                        "Extension {} panicked in {}: {}",
                        ext.name(),
                        phase,
                        panic_message(panic.as_ref())
                    );
                }
            }
        }
        Ok(())
    }

    /// Collect buffered events from every extension, in order.
    pub fn drain_events(&mut self) -> Vec<Drained> {
        let mut drained = Vec::new();
        for ext in self.extensions.iter_mut() {
            let from_stream = ext.name() == StreamExtension::NAME;
            drained.extend(ext.drain_events().into_iter().map(|record| Drained {
                closes_stream: from_stream && record.is_terminal(),
                record,
            }));
        }
        drained
    }
}

/// A buffered record handed out by [`ExtensionRegistry::drain_events`].
#[derive(Debug, Clone)]
pub struct Drained {
    pub record: EventRecord,
    /// Only the stream extension's `complete`/`error` record ends the run's
    /// event stream. Error records from other extensions are ordinary events.
    pub closes_stream: bool,
}

impl Default for ExtensionRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
