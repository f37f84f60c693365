//! Cooldown usage analysis.
//!
//! For each tracked ability the module compares how often the player
//! cast it against how often it could have been cast over the fight.

use crate::context::AnalysisContext;
use crate::error::ModuleError;
use crate::event::{AbilityId, Event, EventType};
use crate::module::{AnalysisModule, Dependencies, LifecyclePhase, ModuleDescriptor, Relation};
use crate::modules::Combatants;
use crate::report::ModuleSnapshot;
use crate::spells;
use crate::stats::{Metric, MetricCheck};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::{BTreeMap, HashMap, HashSet};

/// How an ability is grouped when results are presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpellCategory {
    Rotational,
    Cooldowns,
    Defensive,
    Other,
}

/// One ability whose cast efficiency is tracked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedAbility {
    pub ability: AbilityId,
    pub name: String,
    pub category: SpellCategory,
    /// Cooldown in seconds, before haste.
    pub cooldown: f64,
    /// Whether haste shortens the cooldown.
    #[serde(default)]
    pub haste_scaled: bool,
    pub recommended_efficiency: f64,
    /// Only tracked when the player has this talent.
    #[serde(default)]
    pub requires_talent: Option<AbilityId>,
    /// Only tracked when the player does not have this talent.
    #[serde(default)]
    pub excludes_talent: Option<AbilityId>,
}

impl TrackedAbility {
    pub fn new(
        ability: AbilityId,
        name: impl Into<String>,
        category: SpellCategory,
        cooldown: f64,
        recommended_efficiency: f64,
    ) -> Self {
        Self {
            ability,
            name: name.into(),
            category,
            cooldown,
            haste_scaled: false,
            recommended_efficiency,
            requires_talent: None,
            excludes_talent: None,
        }
    }

    pub fn haste_scaled(mut self) -> Self {
        self.haste_scaled = true;
        self
    }

    pub fn requires_talent(mut self, talent: AbilityId) -> Self {
        self.requires_talent = Some(talent);
        self
    }

    pub fn excludes_talent(mut self, talent: AbilityId) -> Self {
        self.excludes_talent = Some(talent);
        self
    }

    /// Cooldown in seconds at `haste`.
    pub fn effective_cooldown(&self, haste: f64) -> f64 {
        if self.haste_scaled {
            self.cooldown / (1.0 + haste)
        } else {
            self.cooldown
        }
    }

    /// Most casts possible in `duration` milliseconds, or `None` for a
    /// non-positive cooldown.
    pub fn max_casts(&self, duration: i64, haste: f64) -> Option<u32> {
        let cooldown = self.effective_cooldown(haste);
        if cooldown <= 0.0 {
            return None;
        }
        let seconds = duration.max(0) as f64 / 1000.0;
        Some((seconds / cooldown).ceil() as u32)
    }

    fn is_active(&self, combatants: &Combatants) -> bool {
        let required = match self.requires_talent {
            Some(talent) => combatants.has_talent(talent),
            None => true,
        };
        let excluded = self
            .excludes_talent
            .is_some_and(|talent| combatants.has_talent(talent));
        required && !excluded
    }
}

/// Abilities to track.
///
/// # Examples
///
/// ```rust
/// use zzparse::modules::{CastEfficiencyConfig, SpellCategory};
///
/// let config = CastEfficiencyConfig::from_json(r#"{
///     "abilities": [{
///         "ability": 204598,
///         "name": "Sigil of Flame",
///         "category": "rotational",
///         "cooldown": 30.0,
///         "recommended_efficiency": 0.9
///     }]
/// }"#).unwrap();
///
/// assert_eq!(config.abilities[0].category, SpellCategory::Rotational);
/// assert!(!config.abilities[0].haste_scaled);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CastEfficiencyConfig {
    #[serde(default)]
    pub abilities: Vec<TrackedAbility>,
}

impl CastEfficiencyConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn with_ability(mut self, ability: TrackedAbility) -> Self {
        self.abilities.push(ability);
        self
    }

    /// Vengeance Demon Hunter abilities.
    pub fn vengeance_demon_hunter() -> Self {
        use SpellCategory::{Cooldowns, Rotational};

        Self::default()
            .with_ability(
                TrackedAbility::new(
                    spells::IMMOLATION_AURA,
                    "Immolation Aura",
                    Rotational,
                    15.0,
                    0.95,
                )
                .haste_scaled(),
            )
            .with_ability(TrackedAbility::new(
                spells::SIGIL_OF_FLAME,
                "Sigil of Flame",
                Rotational,
                9.0,
                0.90,
            ))
            // Razor Spikes turns Demon Spikes into a damage cooldown.
            .with_ability(
                TrackedAbility::new(spells::DEMON_SPIKES, "Demon Spikes", Rotational, 15.0, 1.0)
                    .haste_scaled()
                    .requires_talent(spells::RAZOR_SPIKES),
            )
            .with_ability(
                TrackedAbility::new(spells::DEMON_SPIKES, "Demon Spikes", Rotational, 15.0, 0.75)
                    .haste_scaled()
                    .excludes_talent(spells::RAZOR_SPIKES),
            )
            .with_ability(TrackedAbility::new(
                spells::SOUL_CARVER,
                "Soul Carver",
                Cooldowns,
                40.0,
                0.90,
            ))
            .with_ability(
                TrackedAbility::new(spells::FRACTURE, "Fracture", Rotational, 4.0, 0.75)
                    .requires_talent(spells::FRACTURE),
            )
            .with_ability(
                TrackedAbility::new(spells::FELBLADE, "Felblade", Cooldowns, 15.0, 0.90)
                    .requires_talent(spells::FELBLADE),
            )
            .with_ability(
                TrackedAbility::new(spells::FEL_ERUPTION, "Fel Eruption", Cooldowns, 30.0, 0.95)
                    .requires_talent(spells::FEL_ERUPTION),
            )
            .with_ability(
                TrackedAbility::new(
                    spells::FEL_DEVASTATION,
                    "Fel Devastation",
                    Cooldowns,
                    60.0,
                    0.55,
                )
                .requires_talent(spells::FEL_DEVASTATION),
            )
            .with_ability(
                TrackedAbility::new(spells::SOUL_BARRIER, "Soul Barrier", Cooldowns, 30.0, 0.50)
                    .requires_talent(spells::SOUL_BARRIER),
            )
    }
}

/// Cast efficiency of one ability over a fight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbilityEfficiency {
    pub ability: AbilityId,
    pub name: String,
    pub category: SpellCategory,
    pub casts: u32,
    pub max_casts: Option<u32>,
    /// `min(casts / max_casts, 1)`; `None` when nothing could be cast.
    pub efficiency: Option<f64>,
    pub recommended_efficiency: f64,
}

/// Counts casts of the configured abilities.
///
/// Talent-gated abilities are resolved once, at initialize, against the
/// player's talents as seen by `combatants`.
#[derive(Debug, Default)]
pub struct CastEfficiency {
    config: CastEfficiencyConfig,
    /// Indices into `config.abilities` that apply to this player.
    active: Vec<usize>,
    casts: HashMap<AbilityId, u32>,
}

impl CastEfficiency {
    pub const ID: &'static str = "cast_efficiency";

    pub fn new(config: CastEfficiencyConfig) -> Self {
        Self {
            config,
            active: Vec::new(),
            casts: HashMap::new(),
        }
    }

    pub fn casts(&self, ability: AbilityId) -> u32 {
        self.casts.get(&ability).copied().unwrap_or(0)
    }

    /// Abilities tracked for this player.
    pub fn tracked(&self) -> impl Iterator<Item = &TrackedAbility> {
        self.active.iter().map(|&idx| &self.config.abilities[idx])
    }

    /// Per-ability results over the context's fight, in config order.
    pub fn efficiencies(&self, context: &AnalysisContext) -> Vec<AbilityEfficiency> {
        let duration = context.fight.duration();
        let haste = context.player.haste;
        self.tracked()
            .map(|tracked| {
                let casts = self.casts(tracked.ability);
                let max_casts = tracked.max_casts(duration, haste);
                let efficiency = max_casts
                    .filter(|&max| max > 0)
                    .map(|max| (f64::from(casts) / f64::from(max)).min(1.0));
                AbilityEfficiency {
                    ability: tracked.ability,
                    name: tracked.name.clone(),
                    category: tracked.category,
                    casts,
                    max_casts,
                    efficiency,
                    recommended_efficiency: tracked.recommended_efficiency,
                }
            })
            .collect()
    }
}

impl AnalysisModule for CastEfficiency {
    fn descriptor(&self) -> ModuleDescriptor {
        ModuleDescriptor::new(Self::ID)
            .depends_on(Combatants::ID)
            .subscribe(EventType::Cast, Relation::ByPlayer)
            .with_hook(LifecyclePhase::Initialize)
    }

    fn on_initialize(
        &mut self,
        deps: &Dependencies<'_>,
        _context: &AnalysisContext,
    ) -> Result<(), ModuleError> {
        let combatants = deps.get::<Combatants>(Combatants::ID)?;
        self.active = self
            .config
            .abilities
            .iter()
            .enumerate()
            .filter(|(_, tracked)| tracked.is_active(combatants))
            .map(|(idx, _)| idx)
            .collect();

        // Results are keyed by ability id, so at most one entry per ability
        // may apply to a player.
        let mut seen = HashSet::new();
        if let Some(duplicate) = self.tracked().find(|tracked| !seen.insert(tracked.ability)) {
            return Err(ModuleError::failed(format!(
                "ability {} ({}) is tracked more than once",
                duplicate.ability, duplicate.name
            )));
        }
        tracing::debug!(
            tracked = self.active.len(),
            configured = self.config.abilities.len(),
            "cast efficiency abilities resolved"
        );
        Ok(())
    }

    fn on_event(
        &mut self,
        event: &Event,
        _deps: &Dependencies<'_>,
        _context: &AnalysisContext,
    ) -> Result<(), ModuleError> {
        let ability = event.ability.guid;
        if self.tracked().any(|tracked| tracked.ability == ability) {
            *self.casts.entry(ability).or_insert(0) += 1;
        }
        Ok(())
    }

    fn snapshot(&self) -> ModuleSnapshot {
        let casts: BTreeMap<AbilityId, u32> = self.casts.iter().map(|(&a, &c)| (a, c)).collect();
        let mut snapshot = ModuleSnapshot::new();
        snapshot.set("casts", casts);
        snapshot
    }

    fn metrics(&self, context: &AnalysisContext) -> Vec<Metric> {
        let mut metrics = Vec::new();
        for result in self.efficiencies(context) {
            metrics.push(Metric::new(
                format!("casts_{}", result.ability),
                format!("{} casts", result.name),
                f64::from(result.casts),
            ));
            if let Some(max_casts) = result.max_casts {
                metrics.push(Metric::new(
                    format!("max_casts_{}", result.ability),
                    format!("{} possible casts", result.name),
                    f64::from(max_casts),
                ));
            }
            if let Some(efficiency) = result.efficiency {
                metrics.push(Metric::new(
                    format!("efficiency_{}", result.ability),
                    format!("{} cast efficiency", result.name),
                    efficiency,
                ));
            }
        }
        metrics
    }

    fn checks(&self, context: &AnalysisContext) -> Vec<MetricCheck> {
        self.efficiencies(context)
            .into_iter()
            .filter_map(|result| {
                let recommended = result.recommended_efficiency;
                result.efficiency.map(|efficiency| {
                    MetricCheck::when(format!("efficiency_{}", result.ability), efficiency)
                        .is_less_than(recommended)
                        .regular(recommended - 0.05)
                        .major(recommended - 0.15)
                })
            })
            .collect()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
