//! # zzparse - Deterministic, Dependency-Ordered Combat Log Analysis
//!
//! An analysis engine for MMORPG combat logs that provides:
//! - **Deterministic** runs (same modules and stream → same results)
//! - **Pluggable** analysis modules with declared dependencies
//! - **Single-pass** replay of the event stream
//! - **Stack-aware** buff tracking through [`StackTimeline`]
//!
//! ## Core Concepts
//!
//! ### Run Pipeline
//!
//! ```text
//! [ModuleRegistry] → [ModulePlan] → [Dispatcher] → [CompletedRun] → [AnalysisReport]
//! ```
//!
//! 1. **Modules** are registered with a factory and a static descriptor
//! 2. **Plans** order modules so every dependency runs before its dependents
//! 3. **Dispatchers** initialize, replay the stream and finalize
//! 4. **Reports** collect metrics and evaluated thresholds
//!
//! ### Key Features
//!
//! - **Dependency Graph**: execution order derived from declared dependencies
//! - **Cycle Detection**: cyclic dependencies are rejected before any run
//! - **Fault Isolation**: a failing event handler never stops the run
//! - **Parallel Runs**: a plan and a stream can be shared across threads
//!
//! ## Example
//!
//! ```rust
//! use zzparse::*;
//! use zzparse::event::{Ability, Event, EventType, School};
//! use zzparse::modules::{Combatants, IronFur};
//!
//! let mut registry = ModuleRegistry::new();
//! registry.register(|| Box::new(Combatants::new())).unwrap();
//! registry.register(|| Box::new(IronFur::default())).unwrap();
//! let plan = registry.build().unwrap();
//!
//! let player = 1;
//! let stream = EventStream::new(vec![
//!     Event::new(0, EventType::Cast, Ability::new(spells::IRONFUR)).with_source(player),
//!     Event::new(5_000, EventType::Damage, Ability::new(1).with_school(School::PHYSICAL))
//!         .with_target(player)
//!         .with_amount(1_000),
//!     Event::new(10_000, EventType::Damage, Ability::new(1).with_school(School::PHYSICAL))
//!         .with_target(player)
//!         .with_amount(1_000),
//! ])
//! .unwrap();
//! let context = AnalysisContext::for_stream(player, &stream);
//!
//! let report = analyze(&plan, &stream, &context).unwrap();
//! let iron_fur = report.module("iron_fur").unwrap();
//! assert_eq!(iron_fur.metric("hits_mitigated"), Some(0.5));
//! ```
//!
//! ## Modules
//!
//! - [`event`] - Combat events and the event stream
//! - [`timeline`] - Stack counts over time
//! - [`module`] - The analysis module contract
//! - [`registry`] - Module registration and execution plans
//! - [`dispatcher`] - Runs a plan over a stream
//! - [`stats`] - Derived statistics and threshold evaluation
//! - [`report`] - Serializable run results
//! - [`context`] - Player and fight information for a run
//! - [`graph`] - Dependency graph management
//! - [`modules`] - Built-in analysis modules
//! - [`error`] - Error types

pub mod context;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod graph;
pub mod module;
pub mod module_id;
pub mod modules;
pub mod registry;
pub mod report;
pub mod spells;
pub mod stats;
pub mod timeline;

// Re-export main types for convenience
pub use context::{AnalysisContext, CombatantInfo, Fight};
pub use dispatcher::{CancellationToken, CompletedRun, DispatchState, Dispatcher, EventFault};
pub use error::{AnalysisError, ModuleError};
pub use event::{Event, EventStream, EventType};
pub use module::{AnalysisModule, Dependencies, LifecyclePhase, ModuleDescriptor, Relation};
pub use module_id::ModuleId;
pub use registry::{ModulePlan, ModuleRegistry};
pub use report::{AnalysisReport, ModuleReport, ModuleSnapshot};
pub use stats::{Severity, StatisticsAggregator};
pub use timeline::{Breakpoint, StackTimeline};

/// Run `plan` over `stream` and collect the report.
///
/// # Errors
///
/// Any error [`Dispatcher::run`] returns.
pub fn analyze(
    plan: &ModulePlan,
    stream: &EventStream,
    context: &AnalysisContext,
) -> Result<AnalysisReport, AnalysisError> {
    let run = Dispatcher::new(plan).run(stream, context)?;
    Ok(run.report(context))
}
