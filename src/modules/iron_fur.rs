//! Ironfur mitigation analysis for Guardian Druids.
//!
//! Ironfur stacks: every cast adds one independent stack for the
//! ability's duration, so the buff is modelled with a [`StackTimeline`]
//! instead of the plain applied/removed spans `Combatants` keeps.
//! Leaving Bear Form drops every stack at once.

use crate::context::AnalysisContext;
use crate::error::ModuleError;
use crate::event::{Event, EventType, Timestamp};
use crate::module::{AnalysisModule, Dependencies, LifecyclePhase, ModuleDescriptor, Relation};
use crate::modules::Combatants;
use crate::report::ModuleSnapshot;
use crate::spells;
use crate::stats::{self, Metric, MetricCheck};
use crate::timeline::StackTimeline;
use serde::{Deserialize, Serialize};
use std::any::Any;

/// Tuning for [`IronFur`]. Durations are in milliseconds.
///
/// # Examples
///
/// ```rust
/// use zzparse::modules::IronFurConfig;
///
/// let config = IronFurConfig::from_json(r#"{"recommended_mitigation": 0.85}"#).unwrap();
/// assert_eq!(config.recommended_mitigation, 0.85);
/// assert_eq!(config.base_duration, 6_000);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IronFurConfig {
    pub base_duration: i64,
    /// Extra duration per rank of Ursoc's Endurance.
    pub duration_per_trait_rank: i64,
    /// Extra duration while Guardian of Elune is up at cast time.
    pub guardian_of_elune_bonus: i64,
    /// Share of physical damage that should land while Ironfur is up.
    pub recommended_mitigation: f64,
    pub regular_below: f64,
    pub major_below: f64,
}

impl Default for IronFurConfig {
    fn default() -> Self {
        Self {
            base_duration: 6_000,
            duration_per_trait_rank: 500,
            guardian_of_elune_bonus: 2_000,
            recommended_mitigation: 0.90,
            regular_below: 0.80,
            major_below: 0.70,
        }
    }
}

impl IronFurConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Physical hits and damage taken, split by whether Ironfur was up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HitTally {
    pub hits: u64,
    pub damage: i64,
}

impl HitTally {
    fn record(&mut self, damage: i64) {
        self.hits += 1;
        self.damage += damage;
    }
}

/// Tracks Ironfur stacks and the physical damage they covered.
#[derive(Debug)]
pub struct IronFur {
    config: IronFurConfig,
    /// Duration without Guardian of Elune, set at initialize.
    duration: i64,
    timeline: StackTimeline,
    /// `hits_per_stack[n]` is the number of physical hits taken at `n` stacks.
    hits_per_stack: Vec<u64>,
    with_ironfur: HitTally,
    without_ironfur: HitTally,
    /// Ironfur buff uptime as seen by `combatants`, read at finalize.
    buff_uptime: i64,
}

impl IronFur {
    pub const ID: &'static str = "iron_fur";

    pub fn new(config: IronFurConfig) -> Self {
        Self {
            duration: config.base_duration,
            config,
            timeline: StackTimeline::new(),
            hits_per_stack: Vec::new(),
            with_ironfur: HitTally::default(),
            without_ironfur: HitTally::default(),
            buff_uptime: 0,
        }
    }

    pub fn config(&self) -> &IronFurConfig {
        &self.config
    }

    /// Base stack duration for this player, before Guardian of Elune.
    pub fn duration(&self) -> i64 {
        self.duration
    }

    pub fn timeline(&self) -> &StackTimeline {
        &self.timeline
    }

    pub fn hits_per_stack(&self) -> &[u64] {
        &self.hits_per_stack
    }

    pub fn with_ironfur(&self) -> HitTally {
        self.with_ironfur
    }

    pub fn without_ironfur(&self) -> HitTally {
        self.without_ironfur
    }

    /// Share of physical hits taken with at least one stack.
    pub fn hits_mitigated(&self) -> Option<f64> {
        stats::ratio(
            self.with_ironfur.hits as f64,
            (self.with_ironfur.hits + self.without_ironfur.hits) as f64,
        )
    }

    /// Share of physical damage taken with at least one stack.
    pub fn damage_mitigated(&self) -> Option<f64> {
        stats::ratio(
            self.with_ironfur.damage as f64,
            (self.with_ironfur.damage + self.without_ironfur.damage) as f64,
        )
    }

    /// Average stack count per physical hit.
    pub fn average_stacks_per_hit(&self) -> Option<f64> {
        stats::average_stacks(&self.hits_per_stack)
    }

    fn record_hit(&mut self, stacks: u32, damage: i64) {
        let slot = stacks as usize;
        if self.hits_per_stack.len() <= slot {
            self.hits_per_stack.resize(slot + 1, 0);
        }
        self.hits_per_stack[slot] += 1;

        if stacks > 0 {
            self.with_ironfur.record(damage);
        } else {
            self.without_ironfur.record(damage);
        }
    }

    fn on_cast(&mut self, timestamp: Timestamp, combatants: &Combatants) {
        let mut duration = self.duration;
        if combatants.has_buff(spells::GUARDIAN_OF_ELUNE, timestamp) {
            duration += self.config.guardian_of_elune_bonus;
        }
        self.timeline.insert(timestamp, timestamp + duration);
    }
}

impl Default for IronFur {
    fn default() -> Self {
        Self::new(IronFurConfig::default())
    }
}

impl AnalysisModule for IronFur {
    fn descriptor(&self) -> ModuleDescriptor {
        ModuleDescriptor::new(Self::ID)
            .depends_on(Combatants::ID)
            .subscribe(EventType::Cast, Relation::ByPlayer)
            .subscribe(EventType::RemoveBuff, Relation::ByPlayer)
            .subscribe(EventType::Damage, Relation::ToPlayer)
            .with_hook(LifecyclePhase::Initialize)
            .with_hook(LifecyclePhase::Finalize)
    }

    fn on_initialize(
        &mut self,
        deps: &Dependencies<'_>,
        _context: &AnalysisContext,
    ) -> Result<(), ModuleError> {
        let combatants = deps.get::<Combatants>(Combatants::ID)?;
        let rank = combatants.trait_rank(spells::URSOCS_ENDURANCE);
        self.duration =
            self.config.base_duration + i64::from(rank) * self.config.duration_per_trait_rank;
        Ok(())
    }

    fn on_event(
        &mut self,
        event: &Event,
        deps: &Dependencies<'_>,
        _context: &AnalysisContext,
    ) -> Result<(), ModuleError> {
        match event.kind {
            EventType::Cast if event.ability.guid == spells::IRONFUR => {
                let combatants = deps.get::<Combatants>(Combatants::ID)?;
                self.on_cast(event.timestamp, combatants);
            }
            EventType::RemoveBuff if event.ability.guid == spells::BEAR_FORM => {
                self.timeline.truncate(event.timestamp, 0);
            }
            EventType::Damage if event.ability.school.is_physical() => {
                let stacks = self.timeline.query(event.timestamp);
                self.record_hit(stacks, event.total_damage());
            }
            _ => {}
        }
        Ok(())
    }

    fn on_finalize(
        &mut self,
        deps: &Dependencies<'_>,
        _context: &AnalysisContext,
    ) -> Result<(), ModuleError> {
        let combatants = deps.get::<Combatants>(Combatants::ID)?;
        self.buff_uptime = combatants.buff_uptime(spells::IRONFUR);

        tracing::debug!(
            hits_with = self.with_ironfur.hits,
            damage_with = self.with_ironfur.damage,
            hits_without = self.without_ironfur.hits,
            damage_without = self.without_ironfur.damage,
            hits_per_stack = ?self.hits_per_stack,
            "ironfur finalized"
        );
        Ok(())
    }

    fn snapshot(&self) -> ModuleSnapshot {
        let mut snapshot = ModuleSnapshot::new();
        snapshot.set("duration", self.duration);
        snapshot.set("hits_per_stack", &self.hits_per_stack);
        snapshot.set("with_ironfur", self.with_ironfur);
        snapshot.set("without_ironfur", self.without_ironfur);
        snapshot.set("timeline", &self.timeline);
        snapshot.set("buff_uptime", self.buff_uptime);
        snapshot
    }

    fn metrics(&self, context: &AnalysisContext) -> Vec<Metric> {
        let fight = context.fight;
        let mut metrics = vec![
            Metric::new(
                "hits_with_ironfur",
                "Physical hits with Ironfur",
                self.with_ironfur.hits as f64,
            ),
            Metric::new(
                "hits_without_ironfur",
                "Physical hits without Ironfur",
                self.without_ironfur.hits as f64,
            ),
            Metric::new(
                "damage_with_ironfur",
                "Physical damage with Ironfur",
                self.with_ironfur.damage as f64,
            ),
            Metric::new(
                "damage_without_ironfur",
                "Physical damage without Ironfur",
                self.without_ironfur.damage as f64,
            ),
        ];

        let derived = [
            ("hits_mitigated", "Physical hits mitigated", self.hits_mitigated()),
            ("damage_mitigated", "Physical damage mitigated", self.damage_mitigated()),
            ("average_stacks_per_hit", "Average stacks per hit", self.average_stacks_per_hit()),
            (
                "average_stacks",
                "Average stacks over the fight",
                stats::time_weighted_average(&self.timeline, fight.start, fight.end),
            ),
            (
                "stack_uptime",
                "Ironfur stack uptime",
                stats::uptime(&self.timeline, fight.start, fight.end),
            ),
            (
                "buff_uptime",
                "Ironfur buff uptime",
                stats::ratio(self.buff_uptime as f64, fight.duration() as f64),
            ),
        ];
        metrics.extend(
            derived
                .into_iter()
                .filter_map(|(key, label, value)| value.map(|v| Metric::new(key, label, v))),
        );

        for (stacks, share) in stats::distribution(&self.hits_per_stack).into_iter().enumerate() {
            metrics.push(Metric::new(
                format!("hits_at_{stacks}_stacks"),
                format!("Hits taken at {stacks} stacks"),
                share,
            ));
        }
        metrics
    }

    fn checks(&self, _context: &AnalysisContext) -> Vec<MetricCheck> {
        self.damage_mitigated()
            .map(|mitigated| {
                MetricCheck::when("damage_mitigated", mitigated)
                    .is_less_than(self.config.recommended_mitigation)
                    .regular(self.config.regular_below)
                    .major(self.config.major_below)
            })
            .into_iter()
            .collect()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
