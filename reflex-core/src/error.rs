//! Reactive errors
//!
//! Every failure the engine can surface. Disposed access and cycles are
//! programming errors; they are always reported, never swallowed.

use thiserror::Error;

use crate::graph::NodeId;

/// Boxed error produced by user compute functions and effect bodies.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Reactive result type
pub type Result<T> = std::result::Result<T, ReactiveError>;

/// Reactive errors
#[derive(Debug, Error)]
pub enum ReactiveError {
    /// A read, write or disposal targeted a node that no longer exists.
    #[error("node {node} has been disposed")]
    Disposed { node: NodeId },

    /// A computation reads itself, or a write would invalidate a computation
    /// that is still executing.
    #[error("cyclic dependency detected at node {node}")]
    CyclicDependency { node: NodeId },

    /// One or more effects failed during a flush pass.
    #[error("{} effect(s) failed during flush: {}", failures.len(), summarize(failures))]
    EffectExecution { failures: Vec<EffectFailure> },

    /// A user compute function returned its own error.
    #[error("computation {node} failed: {source}")]
    Compute {
        node: NodeId,
        #[source]
        source: BoxError,
    },

    /// A single flush pass ran more effects than the configured limit.
    #[error("flush pass exceeded {limit} effect runs")]
    FlushOverflow { limit: usize },
}

impl ReactiveError {
    /// Wrap an error raised by the compute function of `node`.
    ///
    /// Engine errors raised by nested reads keep their kind.
    pub(crate) fn from_compute(node: NodeId, err: BoxError) -> Self {
        match err.downcast::<ReactiveError>() {
            Ok(inner) => *inner,
            Err(source) => ReactiveError::Compute { node, source },
        }
    }

    /// Whether this is a disposed-node access.
    pub fn is_disposed(&self) -> bool {
        matches!(self, ReactiveError::Disposed { .. })
    }

    /// Whether this is a cycle.
    pub fn is_cycle(&self) -> bool {
        matches!(self, ReactiveError::CyclicDependency { .. })
    }
}

/// A single effect failure recorded during a flush pass.
#[derive(Debug)]
pub struct EffectFailure {
    /// The effect that failed.
    pub effect: NodeId,
    /// Debug name given through `EffectOptions`, if any.
    pub name: Option<String>,
    /// What went wrong.
    pub error: Box<ReactiveError>,
}

impl std::fmt::Display for EffectFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.name {
            Some(name) => write!(f, "effect `{}` ({}): {}", name, self.effect, self.error),
            None => write!(f, "effect {}: {}", self.effect, self.error),
        }
    }
}

fn summarize(failures: &[EffectFailure]) -> String {
    failures
        .iter()
        .map(|failure| failure.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
