//! Runtime configuration.

use std::fmt;
use std::rc::Rc;

use crate::error::EffectFailure;

/// Callback invoked for every effect failure.
pub type EffectErrorHook = Rc<dyn Fn(&EffectFailure)>;

/// Default number of effect runs allowed in one flush pass.
pub const DEFAULT_MAX_FLUSH_RUNS: usize = 100_000;

/// Configuration for a [`Runtime`](crate::Runtime).
///
/// # Example
///
/// ```rust
/// use reflex_core::{Runtime, RuntimeConfig};
///
/// let config = RuntimeConfig::default()
///     .max_flush_runs(1_000)
///     .on_effect_error(|failure| eprintln!("{failure}"));
/// let rt = Runtime::with_config(config);
/// # drop(rt);
/// ```
#[derive(Clone)]
pub struct RuntimeConfig {
    /// Effect runs allowed in one flush pass before it is aborted with
    /// `ReactiveError::FlushOverflow`.
    pub max_flush_runs: usize,

    /// Hook invoked for every effect failure, including failures from
    /// flushes that have no caller to return them to.
    pub on_effect_error: Option<EffectErrorHook>,
}

impl RuntimeConfig {
    /// Set the effect run limit for a single flush pass.
    pub fn max_flush_runs(mut self, limit: usize) -> Self {
        self.max_flush_runs = limit;
        self
    }

    /// Install an effect failure hook.
    pub fn on_effect_error<F>(mut self, hook: F) -> Self
    where
        F: Fn(&EffectFailure) + 'static,
    {
        self.on_effect_error = Some(Rc::new(hook));
        self
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_flush_runs: DEFAULT_MAX_FLUSH_RUNS,
            on_effect_error: None,
        }
    }
}

impl fmt::Debug for RuntimeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeConfig")
            .field("max_flush_runs", &self.max_flush_runs)
            .field("on_effect_error", &self.on_effect_error.is_some())
            .finish()
    }
}
