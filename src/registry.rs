//! Module registry.
//!
//! Provides the `ModuleRegistry` type, where modules are declared before
//! any analysis starts, and the `ModulePlan` it resolves into. A plan is
//! the validated, dependency-ordered set of modules plus the event
//! routing table derived from their subscriptions. It is immutable and
//! cheap to clone, so one plan can drive any number of runs, including
//! runs on different threads.

use crate::error::AnalysisError;
use crate::event::EventType;
use crate::graph::ModuleGraph;
use crate::module::{AnalysisModule, ModuleDescriptor, Relation};
use crate::module_id::ModuleId;
use std::collections::HashMap;
use std::sync::Arc;

/// Creates a fresh module instance for one run.
pub type ModuleFactory = dyn Fn() -> Box<dyn AnalysisModule> + Send + Sync;

struct Registration {
    descriptor: ModuleDescriptor,
    factory: Arc<ModuleFactory>,
}

/// Collects module registrations and resolves them into a [`ModulePlan`].
///
/// Registration order matters: among modules that do not depend on each
/// other, the one registered first runs first.
///
/// # Examples
///
/// ```rust
/// use zzparse::ModuleRegistry;
/// use zzparse::modules::{Combatants, IronFur};
///
/// let mut registry = ModuleRegistry::new();
/// registry.register(|| Box::new(IronFur::default())).unwrap();
/// registry.register(|| Box::new(Combatants::new())).unwrap();
///
/// let plan = registry.build().unwrap();
/// let order: Vec<&str> = plan.order().map(|id| id.as_str()).collect();
/// assert_eq!(order, vec!["combatants", "iron_fur"]);
/// ```
#[derive(Default)]
pub struct ModuleRegistry {
    registrations: Vec<Registration>,
}

impl ModuleRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a module through a factory.
    ///
    /// The factory is called once here to read the module's descriptor,
    /// then once per run to create that run's private instance.
    ///
    /// # Errors
    ///
    /// [`AnalysisError::DuplicateModule`] if the identity is taken.
    pub fn register<F>(&mut self, factory: F) -> Result<&ModuleDescriptor, AnalysisError>
    where
        F: Fn() -> Box<dyn AnalysisModule> + Send + Sync + 'static,
    {
        let descriptor = factory().descriptor();
        if self.contains(&descriptor.id) {
            return Err(AnalysisError::DuplicateModule(descriptor.id));
        }

        self.registrations.push(Registration {
            descriptor,
            factory: Arc::new(factory),
        });
        let registration = &self.registrations[self.registrations.len() - 1];
        Ok(&registration.descriptor)
    }

    /// Register a module that is built with `Default`.
    pub fn register_default<M>(&mut self) -> Result<&ModuleDescriptor, AnalysisError>
    where
        M: AnalysisModule + Default + 'static,
    {
        self.register(|| Box::new(M::default()))
    }

    /// Whether a module with this identity is registered.
    pub fn contains(&self, id: &ModuleId) -> bool {
        self.registrations.iter().any(|r| &r.descriptor.id == id)
    }

    /// Resolve every registered module into a plan.
    ///
    /// # Errors
    ///
    /// * [`AnalysisError::UnresolvedDependency`] if a dependency is not registered
    /// * [`AnalysisError::CyclicDependency`] if the dependencies form a cycle
    pub fn build(&self) -> Result<ModulePlan, AnalysisError> {
        let graph = self.build_graph()?;
        let order = graph.topological_sort()?;
        self.plan(order)
    }

    /// Resolve only `targets` and the modules they transitively depend on.
    ///
    /// # Errors
    ///
    /// As [`build`](Self::build), plus [`AnalysisError::UnknownModule`]
    /// for a target that was never registered.
    pub fn build_for(&self, targets: &[&str]) -> Result<ModulePlan, AnalysisError> {
        let graph = self.build_graph()?;
        let targets: Vec<ModuleId> = targets.iter().map(|t| ModuleId::from_str(t)).collect();
        if let Some(unknown) = targets.iter().find(|t| !self.contains(t)) {
            return Err(AnalysisError::UnknownModule(unknown.clone()));
        }

        let needed = graph.dependency_closure(&targets);
        let order = graph
            .topological_sort()?
            .into_iter()
            .filter(|id| needed.contains(id))
            .collect();
        self.plan(order)
    }

    /// Build the dependency graph, nodes in registration order.
    fn build_graph(&self) -> Result<ModuleGraph, AnalysisError> {
        let mut graph = ModuleGraph::new();

        for registration in &self.registrations {
            graph.add_node(registration.descriptor.id.clone());
        }

        for registration in &self.registrations {
            let descriptor = &registration.descriptor;
            for dep in &descriptor.dependencies {
                if !self.contains(dep) {
                    return Err(AnalysisError::UnresolvedDependency {
                        module: descriptor.id.clone(),
                        dependency: dep.clone(),
                    });
                }
                graph.add_edge(descriptor.id.clone(), dep.clone());
            }
        }

        Ok(graph)
    }

    fn plan(&self, order: Vec<ModuleId>) -> Result<ModulePlan, AnalysisError> {
        let mut entries = Vec::with_capacity(order.len());
        for id in &order {
            let registration = self
                .registrations
                .iter()
                .find(|r| &r.descriptor.id == id)
                .ok_or_else(|| AnalysisError::UnknownModule(id.clone()))?;
            entries.push(PlanEntry {
                descriptor: registration.descriptor.clone(),
                factory: Arc::clone(&registration.factory),
            });
        }

        let names: Vec<&str> = order.iter().map(ModuleId::as_str).collect();
        tracing::debug!(order = ?names, "resolved module order");
        Ok(ModulePlan::new(entries))
    }
}

struct PlanEntry {
    descriptor: ModuleDescriptor,
    factory: Arc<ModuleFactory>,
}

/// Delivery target for one event type.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Route {
    /// Position of the module in execution order.
    pub module: usize,
    /// The event is delivered if any of these match.
    pub relations: Vec<Relation>,
}

struct PlanInner {
    entries: Vec<PlanEntry>,
    index: HashMap<ModuleId, usize>,
    routes: HashMap<EventType, Vec<Route>>,
}

/// A resolved, validated module set in execution order.
///
/// Cloning shares the underlying plan.
#[derive(Clone)]
pub struct ModulePlan {
    inner: Arc<PlanInner>,
}

impl ModulePlan {
    fn new(entries: Vec<PlanEntry>) -> Self {
        let index = entries
            .iter()
            .enumerate()
            .map(|(idx, entry)| (entry.descriptor.id.clone(), idx))
            .collect();

        let mut routes: HashMap<EventType, Vec<Route>> = HashMap::new();
        for (idx, entry) in entries.iter().enumerate() {
            for subscription in &entry.descriptor.subscriptions {
                let slot = routes.entry(subscription.event).or_default();
                match slot.last_mut() {
                    Some(route) if route.module == idx => {
                        route.relations.push(subscription.relation);
                    }
                    _ => slot.push(Route {
                        module: idx,
                        relations: vec![subscription.relation],
                    }),
                }
            }
        }

        Self {
            inner: Arc::new(PlanInner {
                entries,
                index,
                routes,
            }),
        }
    }

    /// Module identities in execution order.
    pub fn order(&self) -> impl Iterator<Item = &ModuleId> {
        self.inner.entries.iter().map(|e| &e.descriptor.id)
    }

    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    /// Fresh module instances for one run, in execution order.
    pub(crate) fn instantiate(&self) -> Vec<Box<dyn AnalysisModule>> {
        self.inner.entries.iter().map(|e| (e.factory)()).collect()
    }

    pub(crate) fn descriptor_at(&self, position: usize) -> &ModuleDescriptor {
        &self.inner.entries[position].descriptor
    }

    pub(crate) fn index(&self) -> &HashMap<ModuleId, usize> {
        &self.inner.index
    }

    pub(crate) fn routes(&self, event: EventType) -> &[Route] {
        self.inner
            .routes
            .get(&event)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}
