//! Analysis module contract.
//!
//! A module is an independently pluggable unit of analysis. It declares
//! up front, through its [`ModuleDescriptor`], which modules it depends
//! on, which events it wants delivered and which lifecycle hooks it
//! implements. The dispatcher only ever consults the descriptor; it
//! never probes a module for capabilities while a run is in progress.

use crate::context::AnalysisContext;
use crate::error::ModuleError;
use crate::event::{ActorId, Event, EventType};
use crate::module_id::ModuleId;
use crate::report::ModuleSnapshot;
use crate::stats::{Metric, MetricCheck};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::HashMap;

/// Lifecycle phase of a run, as seen by modules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecyclePhase {
    Initialize,
    Event,
    Finalize,
}

impl std::fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LifecyclePhase::Initialize => "initialize",
            LifecyclePhase::Event => "event",
            LifecyclePhase::Finalize => "finalize",
        };
        f.write_str(name)
    }
}

/// Which actor an event must involve to be delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    /// Every event of the type.
    #[default]
    Any,
    /// Events whose source is the analyzed player.
    ByPlayer,
    /// Events whose target is the analyzed player.
    ToPlayer,
}

impl Relation {
    /// Whether `event` satisfies this relation for `player`.
    pub fn matches(self, event: &Event, player: ActorId) -> bool {
        match self {
            Relation::Any => true,
            Relation::ByPlayer => event.source == Some(player),
            Relation::ToPlayer => event.target == Some(player),
        }
    }
}

/// One event type a module wants delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Subscription {
    pub event: EventType,
    #[serde(default)]
    pub relation: Relation,
}

/// Static declaration of a module: identity, dependencies, subscriptions
/// and implemented hooks.
///
/// # Examples
///
/// ```rust
/// use zzparse::event::EventType;
/// use zzparse::module::{LifecyclePhase, ModuleDescriptor, Relation};
///
/// let descriptor = ModuleDescriptor::new("iron_fur")
///     .depends_on("combatants")
///     .subscribe(EventType::Cast, Relation::ByPlayer)
///     .subscribe(EventType::Damage, Relation::ToPlayer)
///     .with_hook(LifecyclePhase::Initialize);
///
/// assert_eq!(descriptor.dependencies.len(), 1);
/// assert!(descriptor.implements(LifecyclePhase::Initialize));
/// assert!(!descriptor.implements(LifecyclePhase::Finalize));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleDescriptor {
    pub id: ModuleId,
    #[serde(default)]
    pub dependencies: Vec<ModuleId>,
    #[serde(default)]
    pub subscriptions: Vec<Subscription>,
    /// Initialize / finalize hooks the module implements. Event delivery
    /// is implied by `subscriptions`.
    #[serde(default)]
    pub hooks: Vec<LifecyclePhase>,
}

impl ModuleDescriptor {
    pub fn new(id: impl Into<ModuleId>) -> Self {
        Self {
            id: id.into(),
            dependencies: Vec::new(),
            subscriptions: Vec::new(),
            hooks: Vec::new(),
        }
    }

    pub fn depends_on(mut self, dependency: impl Into<ModuleId>) -> Self {
        let dependency = dependency.into();
        if !self.dependencies.contains(&dependency) {
            self.dependencies.push(dependency);
        }
        self
    }

    pub fn subscribe(mut self, event: EventType, relation: Relation) -> Self {
        let subscription = Subscription { event, relation };
        if !self.subscriptions.contains(&subscription) {
            self.subscriptions.push(subscription);
        }
        self
    }

    pub fn with_hook(mut self, phase: LifecyclePhase) -> Self {
        if !self.hooks.contains(&phase) {
            self.hooks.push(phase);
        }
        self
    }

    /// Whether the module implements the hook for `phase`.
    pub fn implements(&self, phase: LifecyclePhase) -> bool {
        match phase {
            LifecyclePhase::Event => !self.subscriptions.is_empty(),
            _ => self.hooks.contains(&phase),
        }
    }
}

/// Read-only access to the dependencies of the module being called.
///
/// Dependencies always run before their dependents, so during event
/// delivery a dependency has already seen the current event.
pub struct Dependencies<'a> {
    owner: &'a ModuleDescriptor,
    modules: &'a [Box<dyn AnalysisModule>],
    index: &'a HashMap<ModuleId, usize>,
}

impl<'a> Dependencies<'a> {
    pub(crate) fn new(
        owner: &'a ModuleDescriptor,
        modules: &'a [Box<dyn AnalysisModule>],
        index: &'a HashMap<ModuleId, usize>,
    ) -> Self {
        Self {
            owner,
            modules,
            index,
        }
    }

    /// Borrow the declared dependency `id` as its concrete type.
    ///
    /// # Errors
    ///
    /// * [`ModuleError::UndeclaredDependency`] if `id` is not in the
    ///   caller's descriptor
    /// * [`ModuleError::MissingDependency`] if no instance exists
    /// * [`ModuleError::DependencyType`] if the instance is not a `T`
    pub fn get<T: AnalysisModule + 'static>(&self, id: &str) -> Result<&'a T, ModuleError> {
        if !self.owner.dependencies.iter().any(|d| d.as_str() == id) {
            return Err(ModuleError::UndeclaredDependency(ModuleId::from_str(id)));
        }
        let module = self
            .index
            .get(id)
            .and_then(|&idx| self.modules.get(idx))
            .ok_or_else(|| ModuleError::MissingDependency(ModuleId::from_str(id)))?;
        module
            .as_any()
            .downcast_ref::<T>()
            .ok_or_else(|| ModuleError::DependencyType(ModuleId::from_str(id)))
    }
}

/// An analysis module.
///
/// Only [`descriptor`](Self::descriptor) and [`as_any`](Self::as_any)
/// are required; every hook defaults to doing nothing. A hook is only
/// called when the descriptor declares it.
///
/// Hooks may mutate the module's own state and nothing else.
pub trait AnalysisModule: Send {
    /// The module's static declaration. Read once, at registration.
    fn descriptor(&self) -> ModuleDescriptor;

    /// Called once, after every dependency has been initialized.
    fn on_initialize(
        &mut self,
        _deps: &Dependencies<'_>,
        _context: &AnalysisContext,
    ) -> Result<(), ModuleError> {
        Ok(())
    }

    /// Called for each subscribed event, in stream order.
    fn on_event(
        &mut self,
        _event: &Event,
        _deps: &Dependencies<'_>,
        _context: &AnalysisContext,
    ) -> Result<(), ModuleError> {
        Ok(())
    }

    /// Called once after the whole stream has been delivered.
    fn on_finalize(
        &mut self,
        _deps: &Dependencies<'_>,
        _context: &AnalysisContext,
    ) -> Result<(), ModuleError> {
        Ok(())
    }

    /// Read-only copy of the module's accumulators.
    fn snapshot(&self) -> ModuleSnapshot {
        ModuleSnapshot::new()
    }

    /// Derived values for reporting.
    fn metrics(&self, _context: &AnalysisContext) -> Vec<Metric> {
        Vec::new()
    }

    /// Thresholds the module's results should meet.
    fn checks(&self, _context: &AnalysisContext) -> Vec<MetricCheck> {
        Vec::new()
    }

    fn as_any(&self) -> &dyn Any;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Ability;

    struct Probe;

    impl AnalysisModule for Probe {
        fn descriptor(&self) -> ModuleDescriptor {
            ModuleDescriptor::new("probe")
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    struct Other;

    impl AnalysisModule for Other {
        fn descriptor(&self) -> ModuleDescriptor {
            ModuleDescriptor::new("other")
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[test]
    fn test_relation_matches() {
        let event = Event::new(0, EventType::Damage, Ability::new(1))
            .with_source(1)
            .with_target(2);
        assert!(Relation::Any.matches(&event, 9));
        assert!(Relation::ByPlayer.matches(&event, 1));
        assert!(!Relation::ByPlayer.matches(&event, 2));
        assert!(Relation::ToPlayer.matches(&event, 2));
        assert!(!Relation::ToPlayer.matches(&event, 1));
    }

    #[test]
    fn test_descriptor_deduplicates() {
        let descriptor = ModuleDescriptor::new("m")
            .depends_on("a")
            .depends_on("a")
            .subscribe(EventType::Cast, Relation::Any)
            .subscribe(EventType::Cast, Relation::Any)
            .with_hook(LifecyclePhase::Finalize)
            .with_hook(LifecyclePhase::Finalize);
        assert_eq!(descriptor.dependencies.len(), 1);
        assert_eq!(descriptor.subscriptions.len(), 1);
        assert_eq!(descriptor.hooks.len(), 1);
        assert!(descriptor.implements(LifecyclePhase::Event));
    }

    #[test]
    fn test_descriptor_from_json() {
        let json = r#"{
            "id": "iron_fur",
            "dependencies": ["combatants"],
            "subscriptions": [{"event": "cast", "relation": "by_player"}, {"event": "damage"}],
            "hooks": ["initialize"]
        }"#;
        let descriptor: ModuleDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(descriptor.id.as_str(), "iron_fur");
        assert_eq!(descriptor.subscriptions[1].relation, Relation::Any);
        assert!(descriptor.implements(LifecyclePhase::Initialize));
    }

    #[test]
    fn test_dependencies_get() {
        let modules: Vec<Box<dyn AnalysisModule>> = vec![Box::new(Probe), Box::new(Other)];
        let mut index = HashMap::new();
        index.insert(ModuleId::from_str("probe"), 0);
        index.insert(ModuleId::from_str("other"), 1);
        let owner = ModuleDescriptor::new("user")
            .depends_on("probe")
            .depends_on("other")
            .depends_on("ghost");

        let deps = Dependencies::new(&owner, &modules[..1], &index);
        assert!(deps.get::<Probe>("probe").is_ok());
        assert_eq!(
            deps.get::<Other>("probe").err(),
            Some(ModuleError::DependencyType(ModuleId::from_str("probe")))
        );
        // Declared but not visible in this slice.
        assert_eq!(
            deps.get::<Other>("other").err(),
            Some(ModuleError::MissingDependency(ModuleId::from_str("other")))
        );
        assert_eq!(
            deps.get::<Probe>("ghost").err(),
            Some(ModuleError::MissingDependency(ModuleId::from_str("ghost")))
        );
        assert_eq!(
            deps.get::<Probe>("stranger").err(),
            Some(ModuleError::UndeclaredDependency(ModuleId::from_str("stranger")))
        );
    }
}
