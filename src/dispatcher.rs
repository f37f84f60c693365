//! Event dispatcher.
//!
//! The `Dispatcher` drives one analysis run over a [`ModulePlan`]:
//!
//! ```text
//! Uninitialized → Initializing → Running → Finalizing → Done
//! ```
//!
//! Every module is initialized in execution order, the event stream is
//! replayed once with each event delivered to its subscribers in
//! execution order, and every module is finalized in execution order.
//!
//! A failing initialize or finalize hook aborts the run. A failing event
//! handler does not: the fault is logged and recorded against the
//! module, and delivery continues to the other modules and to the rest
//! of the stream.

use crate::context::AnalysisContext;
use crate::error::{AnalysisError, ModuleError};
use crate::event::{EventStream, Timestamp};
use crate::module::{AnalysisModule, Dependencies, LifecyclePhase};
use crate::module_id::ModuleId;
use crate::registry::ModulePlan;
use crate::report::AnalysisReport;
use crate::stats::StatisticsAggregator;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Where a dispatcher is in its run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DispatchState {
    Uninitialized,
    Initializing,
    Running,
    Finalizing,
    Done,
}

impl DispatchState {
    fn successor(self) -> Option<DispatchState> {
        match self {
            DispatchState::Uninitialized => Some(DispatchState::Initializing),
            DispatchState::Initializing => Some(DispatchState::Running),
            DispatchState::Running => Some(DispatchState::Finalizing),
            DispatchState::Finalizing => Some(DispatchState::Done),
            DispatchState::Done => None,
        }
    }
}

/// Shared flag for aborting a run from another thread.
///
/// Checked before each event delivery and before finalizing.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// A recovered per-event handler failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventFault {
    pub module: ModuleId,
    /// Position of the event in the stream.
    pub index: usize,
    pub timestamp: Timestamp,
    pub message: String,
}

/// Drives analysis runs over a [`ModulePlan`].
///
/// Each call to [`run`](Self::run) starts from fresh module instances.
///
/// # Examples
///
/// ```rust
/// use zzparse::context::AnalysisContext;
/// use zzparse::dispatcher::{DispatchState, Dispatcher};
/// use zzparse::event::EventStream;
/// use zzparse::modules::Combatants;
/// use zzparse::ModuleRegistry;
///
/// let mut registry = ModuleRegistry::new();
/// registry.register(|| Box::new(Combatants::new())).unwrap();
/// let plan = registry.build().unwrap();
///
/// let stream = EventStream::new(Vec::new()).unwrap();
/// let context = AnalysisContext::for_stream(1, &stream);
///
/// let mut dispatcher = Dispatcher::new(&plan);
/// let run = dispatcher.run(&stream, &context).unwrap();
/// assert_eq!(dispatcher.state(), DispatchState::Done);
/// assert!(run.faults().is_empty());
/// ```
pub struct Dispatcher {
    plan: ModulePlan,
    state: DispatchState,
}

impl Dispatcher {
    pub fn new(plan: &ModulePlan) -> Self {
        Self {
            plan: plan.clone(),
            state: DispatchState::Uninitialized,
        }
    }

    /// Current state. After a failed run this is the phase that failed.
    pub fn state(&self) -> DispatchState {
        self.state
    }

    fn transition(&mut self, next: DispatchState) {
        debug_assert_eq!(self.state.successor(), Some(next));
        tracing::debug!(from = ?self.state, to = ?next, "dispatcher transition");
        self.state = next;
    }

    /// Run the plan over `stream`.
    ///
    /// # Errors
    ///
    /// * [`AnalysisError::ModuleInitialization`] if an initialize hook fails
    /// * [`AnalysisError::ModuleFinalization`] if a finalize hook fails
    pub fn run(
        &mut self,
        stream: &EventStream,
        context: &AnalysisContext,
    ) -> Result<CompletedRun, AnalysisError> {
        self.run_with_cancellation(stream, context, &CancellationToken::new())
    }

    /// Run the plan, aborting as soon as `token` is cancelled.
    ///
    /// A cancelled run never reaches the finalize phase and its module
    /// state is discarded.
    ///
    /// # Errors
    ///
    /// As [`run`](Self::run), plus [`AnalysisError::Cancelled`].
    pub fn run_with_cancellation(
        &mut self,
        stream: &EventStream,
        context: &AnalysisContext,
        token: &CancellationToken,
    ) -> Result<CompletedRun, AnalysisError> {
        self.state = DispatchState::Uninitialized;
        let mut modules = self.plan.instantiate();

        self.transition(DispatchState::Initializing);
        self.initialize(&mut modules, context)?;

        self.transition(DispatchState::Running);
        let faults = self.deliver(&mut modules, stream, context, token)?;

        if token.is_cancelled() {
            return Err(AnalysisError::Cancelled {
                phase: LifecyclePhase::Finalize,
                events_delivered: stream.len(),
            });
        }

        self.transition(DispatchState::Finalizing);
        self.finalize(&mut modules, context)?;

        self.transition(DispatchState::Done);
        tracing::info!(
            modules = modules.len(),
            events = stream.len(),
            faults = faults.len(),
            "analysis complete"
        );

        Ok(CompletedRun {
            plan: self.plan.clone(),
            modules,
            faults,
            events_delivered: stream.len(),
        })
    }

    fn initialize(
        &self,
        modules: &mut [Box<dyn AnalysisModule>],
        context: &AnalysisContext,
    ) -> Result<(), AnalysisError> {
        for position in 0..modules.len() {
            let descriptor = self.plan.descriptor_at(position);
            if !descriptor.implements(LifecyclePhase::Initialize) {
                continue;
            }

            let (done, rest) = modules.split_at_mut(position);
            let deps = Dependencies::new(descriptor, done, self.plan.index());
            rest[0].on_initialize(&deps, context).map_err(|source| {
                tracing::error!(module = %descriptor.id, error = %source, "initialize failed");
                AnalysisError::ModuleInitialization {
                    module: descriptor.id.clone(),
                    source,
                }
            })?;
        }
        Ok(())
    }

    fn deliver(
        &self,
        modules: &mut [Box<dyn AnalysisModule>],
        stream: &EventStream,
        context: &AnalysisContext,
        token: &CancellationToken,
    ) -> Result<Vec<EventFault>, AnalysisError> {
        let player = context.player.id;
        let mut faults = Vec::new();

        for (index, event) in stream.iter().enumerate() {
            if token.is_cancelled() {
                tracing::debug!(events_delivered = index, "analysis cancelled");
                return Err(AnalysisError::Cancelled {
                    phase: LifecyclePhase::Event,
                    events_delivered: index,
                });
            }

            for route in self.plan.routes(event.kind) {
                if !route.relations.iter().any(|r| r.matches(event, player)) {
                    continue;
                }

                let descriptor = self.plan.descriptor_at(route.module);
                let (done, rest) = modules.split_at_mut(route.module);
                let deps = Dependencies::new(descriptor, done, self.plan.index());
                if let Err(error) = rest[0].on_event(event, &deps, context) {
                    tracing::warn!(
                        module = %descriptor.id,
                        index,
                        timestamp = event.timestamp,
                        error = %error,
                        "event handler failed"
                    );
                    faults.push(EventFault {
                        module: descriptor.id.clone(),
                        index,
                        timestamp: event.timestamp,
                        message: error.to_string(),
                    });
                }
            }
        }

        Ok(faults)
    }

    fn finalize(
        &self,
        modules: &mut [Box<dyn AnalysisModule>],
        context: &AnalysisContext,
    ) -> Result<(), AnalysisError> {
        for position in 0..modules.len() {
            let descriptor = self.plan.descriptor_at(position);
            if !descriptor.implements(LifecyclePhase::Finalize) {
                continue;
            }

            let (done, rest) = modules.split_at_mut(position);
            let deps = Dependencies::new(descriptor, done, self.plan.index());
            rest[0].on_finalize(&deps, context).map_err(|source: ModuleError| {
                tracing::error!(module = %descriptor.id, error = %source, "finalize failed");
                AnalysisError::ModuleFinalization {
                    module: descriptor.id.clone(),
                    source,
                }
            })?;
        }
        Ok(())
    }
}

/// The modules of a finished run, in execution order.
pub struct CompletedRun {
    plan: ModulePlan,
    modules: Vec<Box<dyn AnalysisModule>>,
    faults: Vec<EventFault>,
    events_delivered: usize,
}

impl std::fmt::Debug for CompletedRun {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletedRun")
            .field("faults", &self.faults)
            .field("events_delivered", &self.events_delivered)
            .finish_non_exhaustive()
    }
}

impl CompletedRun {
    /// Borrow module `id` as its concrete type.
    pub fn module<T: AnalysisModule + 'static>(&self, id: &str) -> Option<&T> {
        self.plan
            .index()
            .get(id)
            .and_then(|&idx| self.modules.get(idx))
            .and_then(|module| module.as_any().downcast_ref::<T>())
    }

    /// Every module with its identity, in execution order.
    pub fn modules(&self) -> impl Iterator<Item = (&ModuleId, &dyn AnalysisModule)> {
        self.plan.order().zip(self.modules.iter().map(|m| &**m))
    }

    /// Recovered event handler failures, in delivery order.
    pub fn faults(&self) -> &[EventFault] {
        &self.faults
    }

    /// Whether any event handler of module `id` failed during the run.
    pub fn is_incomplete(&self, id: &str) -> bool {
        self.faults.iter().any(|f| f.module.as_str() == id)
    }

    pub fn events_delivered(&self) -> usize {
        self.events_delivered
    }

    /// Collect metrics and evaluations into a report.
    pub fn report(&self, context: &AnalysisContext) -> AnalysisReport {
        StatisticsAggregator::new().collect(self, context)
    }
}
