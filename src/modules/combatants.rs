//! Buff tracking for the analyzed player.

use crate::context::{AnalysisContext, CombatantInfo, Fight};
use crate::error::ModuleError;
use crate::event::{AbilityId, Event, EventType, Timestamp};
use crate::module::{AnalysisModule, Dependencies, LifecyclePhase, ModuleDescriptor, Relation};
use crate::report::ModuleSnapshot;
use crate::timeline::StackTimeline;
use std::any::Any;
use std::collections::{BTreeMap, HashMap};

/// Tracks which buffs the analyzed player had, and when.
///
/// Every buff gets its own [`StackTimeline`] holding the spans it was
/// active. A buff removed without a preceding apply was already up when
/// the fight started; a buff still up when the stream ends is closed at
/// the end of the fight.
///
/// # Examples
///
/// ```rust
/// use zzparse::context::AnalysisContext;
/// use zzparse::dispatcher::Dispatcher;
/// use zzparse::event::{Ability, Event, EventStream, EventType};
/// use zzparse::modules::Combatants;
/// use zzparse::ModuleRegistry;
///
/// let stream = EventStream::new(vec![
///     Event::new(0, EventType::Cast, Ability::new(1)),
///     Event::new(2_000, EventType::ApplyBuff, Ability::new(192081)).with_target(7),
///     Event::new(8_000, EventType::RemoveBuff, Ability::new(192081)).with_target(7),
///     Event::new(10_000, EventType::Cast, Ability::new(1)),
/// ])
/// .unwrap();
/// let context = AnalysisContext::for_stream(7, &stream);
///
/// let mut registry = ModuleRegistry::new();
/// registry.register(|| Box::new(Combatants::new())).unwrap();
/// let plan = registry.build().unwrap();
/// let run = Dispatcher::new(&plan).run(&stream, &context).unwrap();
///
/// let combatants = run.module::<Combatants>("combatants").unwrap();
/// assert!(combatants.has_buff(192081, 5_000));
/// assert!(!combatants.has_buff(192081, 9_000));
/// assert_eq!(combatants.buff_uptime(192081), 6_000);
/// ```
#[derive(Debug, Default)]
pub struct Combatants {
    player: CombatantInfo,
    fight: Fight,
    buffs: HashMap<AbilityId, StackTimeline>,
    /// Buffs currently up, with the time they were applied.
    open: HashMap<AbilityId, Timestamp>,
}

impl Combatants {
    pub const ID: &'static str = "combatants";

    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the buff was up at `timestamp`.
    pub fn has_buff(&self, ability: AbilityId, timestamp: Timestamp) -> bool {
        let closed = self
            .buffs
            .get(&ability)
            .is_some_and(|timeline| timeline.query(timestamp) > 0);
        closed || self.open.get(&ability).is_some_and(|&since| since <= timestamp)
    }

    /// Milliseconds the buff was up within the fight.
    pub fn buff_uptime(&self, ability: AbilityId) -> i64 {
        let closed = self
            .buffs
            .get(&ability)
            .map_or(0, |timeline| timeline.active_duration(self.fight.start, self.fight.end));
        let open = self
            .open
            .get(&ability)
            .map_or(0, |&since| (self.fight.end - since.max(self.fight.start)).max(0));
        closed + open
    }

    /// Recorded spans of one buff.
    pub fn buff_timeline(&self, ability: AbilityId) -> Option<&StackTimeline> {
        self.buffs.get(&ability)
    }

    /// Rank of a passive trait, `0` when the player does not have it.
    pub fn trait_rank(&self, ability: AbilityId) -> u32 {
        self.player.traits.get(&ability).copied().unwrap_or(0)
    }

    pub fn has_talent(&self, ability: AbilityId) -> bool {
        self.player.talents.contains(&ability)
    }

    fn open_buff(&mut self, ability: AbilityId, since: Timestamp) {
        self.open.entry(ability).or_insert(since);
    }

    fn close_buff(&mut self, ability: AbilityId, until: Timestamp) {
        let since = self.open.remove(&ability).unwrap_or(self.fight.start);
        self.buffs.entry(ability).or_default().insert(since, until);
    }
}

impl AnalysisModule for Combatants {
    fn descriptor(&self) -> ModuleDescriptor {
        ModuleDescriptor::new(Self::ID)
            .subscribe(EventType::ApplyBuff, Relation::ToPlayer)
            .subscribe(EventType::RefreshBuff, Relation::ToPlayer)
            .subscribe(EventType::RemoveBuff, Relation::ToPlayer)
            .with_hook(LifecyclePhase::Initialize)
            .with_hook(LifecyclePhase::Finalize)
    }

    fn on_initialize(
        &mut self,
        _deps: &Dependencies<'_>,
        context: &AnalysisContext,
    ) -> Result<(), ModuleError> {
        self.player = context.player.clone();
        self.fight = context.fight;
        Ok(())
    }

    fn on_event(
        &mut self,
        event: &Event,
        _deps: &Dependencies<'_>,
        _context: &AnalysisContext,
    ) -> Result<(), ModuleError> {
        let ability = event.ability.guid;
        match event.kind {
            EventType::ApplyBuff => self.open_buff(ability, event.timestamp),
            // A refresh of a buff we never saw applied: it was up before the pull.
            EventType::RefreshBuff => self.open_buff(ability, self.fight.start),
            EventType::RemoveBuff => self.close_buff(ability, event.timestamp),
            _ => {}
        }
        Ok(())
    }

    fn on_finalize(
        &mut self,
        _deps: &Dependencies<'_>,
        _context: &AnalysisContext,
    ) -> Result<(), ModuleError> {
        let still_open: Vec<AbilityId> = self.open.keys().copied().collect();
        for ability in still_open {
            self.close_buff(ability, self.fight.end);
        }
        tracing::debug!(buffs = self.buffs.len(), "combatants finalized");
        Ok(())
    }

    fn snapshot(&self) -> ModuleSnapshot {
        let uptimes: BTreeMap<AbilityId, i64> = self
            .buffs
            .keys()
            .chain(self.open.keys())
            .map(|&ability| (ability, self.buff_uptime(ability)))
            .collect();
        let mut snapshot = ModuleSnapshot::new();
        snapshot.set("player", self.player.id);
        snapshot.set("buff_uptime", uptimes);
        snapshot
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
