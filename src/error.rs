//! Error types for module registration and analysis runs.
//!
//! Fatal errors are represented by [`AnalysisError`]. Module hooks report
//! their own failures through [`ModuleError`], which the dispatcher either
//! wraps into a fatal [`AnalysisError`] (initialize / finalize) or records
//! as a recovered [`crate::dispatcher::EventFault`] (per-event delivery).

use crate::module::LifecyclePhase;
use crate::module_id::ModuleId;
use thiserror::Error;

/// Format a cycle path as a readable string.
fn format_cycle_path(path: &[ModuleId]) -> String {
    if path.is_empty() {
        return String::from("(empty cycle)");
    }
    path.iter()
        .map(|id| id.as_str())
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Errors that abort registration or an analysis run.
///
/// # Examples
///
/// ```rust
/// use zzparse::{AnalysisError, ModuleId};
///
/// let err = AnalysisError::UnresolvedDependency {
///     module: ModuleId::from_str("iron_fur"),
///     dependency: ModuleId::from_str("combatants"),
/// };
/// assert!(err.to_string().contains("combatants"));
/// ```
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AnalysisError {
    /// The module dependency graph contains a cycle.
    ///
    /// The path is closed: `[A, B, A]` for `A -> B -> A`.
    #[error("Cyclic module dependency: {}", format_cycle_path(.path))]
    CyclicDependency { path: Vec<ModuleId> },

    /// A module declared a dependency that was never registered.
    #[error("Module {module} depends on unregistered module {dependency}")]
    UnresolvedDependency {
        module: ModuleId,
        dependency: ModuleId,
    },

    /// A module was requested that was never registered.
    #[error("Unknown module: {0}")]
    UnknownModule(ModuleId),

    /// Two registrations used the same identity.
    #[error("Module registered twice: {0}")]
    DuplicateModule(ModuleId),

    /// The event stream went backwards in time.
    #[error("Event {index} at {timestamp}ms precedes previous event at {previous}ms")]
    UnorderedStream {
        index: usize,
        previous: i64,
        timestamp: i64,
    },

    /// The event stream could not be decoded.
    #[error("Invalid event stream: {0}")]
    InvalidStream(String),

    /// A module's initialize hook failed; the run was aborted.
    #[error("Module {module} failed during initialize: {source}")]
    ModuleInitialization {
        module: ModuleId,
        #[source]
        source: ModuleError,
    },

    /// A module's finalize hook failed; the run was aborted.
    #[error("Module {module} failed during finalize: {source}")]
    ModuleFinalization {
        module: ModuleId,
        #[source]
        source: ModuleError,
    },

    /// The run was cancelled through its cancellation token.
    #[error("Analysis cancelled during {phase} after {events_delivered} events")]
    Cancelled {
        phase: LifecyclePhase,
        events_delivered: usize,
    },
}

impl AnalysisError {
    /// The module and lifecycle phase responsible for a fatal hook failure.
    pub fn failed_module(&self) -> Option<(&ModuleId, LifecyclePhase)> {
        match self {
            AnalysisError::ModuleInitialization { module, .. } => {
                Some((module, LifecyclePhase::Initialize))
            }
            AnalysisError::ModuleFinalization { module, .. } => {
                Some((module, LifecyclePhase::Finalize))
            }
            _ => None,
        }
    }
}

/// Errors raised by a module's own lifecycle hooks.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ModuleError {
    /// Free-form failure reported by the module.
    #[error("{0}")]
    Failed(String),

    /// A declared dependency has no instance in this run.
    #[error("Missing dependency: {0}")]
    MissingDependency(ModuleId),

    /// The module asked for a module it never declared as a dependency.
    #[error("Undeclared dependency: {0}")]
    UndeclaredDependency(ModuleId),

    /// The dependency exists but is not of the requested type.
    #[error("Dependency {0} has an unexpected type")]
    DependencyType(ModuleId),
}

impl ModuleError {
    /// Shorthand for [`ModuleError::Failed`].
    pub fn failed(message: impl Into<String>) -> Self {
        ModuleError::Failed(message.into())
    }
}
