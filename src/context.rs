//! Context information for an analysis run.
//!
//! The `AnalysisContext` carries what the analysis needs to know about
//! the encounter but cannot read from the event stream itself: which
//! player is being analyzed, the fight window and the player's
//! character setup. Extra settings can be attached as free-form
//! key-value pairs; the core does not interpret them.

use crate::event::{AbilityId, ActorId, EventStream, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// The encounter window, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Fight {
    pub start: Timestamp,
    pub end: Timestamp,
}

impl Fight {
    pub fn new(start: Timestamp, end: Timestamp) -> Self {
        Self { start, end }
    }

    /// Fight length in milliseconds (never negative).
    pub fn duration(&self) -> i64 {
        (self.end - self.start).max(0)
    }
}

/// Character setup of the analyzed player.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CombatantInfo {
    pub id: ActorId,
    #[serde(default)]
    pub name: String,
    /// Artifact / passive trait ranks, keyed by ability id.
    #[serde(default)]
    pub traits: HashMap<AbilityId, u32>,
    /// Selected talents.
    #[serde(default)]
    pub talents: HashSet<AbilityId>,
    /// Haste as a fraction (0.2 = 20%).
    #[serde(default)]
    pub haste: f64,
}

/// Context for one analysis run.
///
/// # Examples
///
/// ```rust
/// use zzparse::context::{AnalysisContext, Fight};
///
/// let mut context = AnalysisContext::new(42, Fight::new(0, 300_000))
///     .with_trait(200399, 3)
///     .with_haste(0.25);
/// context.set("difficulty", "mythic");
///
/// assert_eq!(context.player.traits[&200399], 3);
/// assert_eq!(context.fight.duration(), 300_000);
/// assert_eq!(context.get::<String>("difficulty").as_deref(), Some("mythic"));
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisContext {
    pub player: CombatantInfo,
    pub fight: Fight,
    /// Generic key-value pairs for extra settings.
    #[serde(default)]
    data: HashMap<String, serde_json::Value>,
}

impl AnalysisContext {
    /// Create a context for `player` over `fight`.
    pub fn new(player: ActorId, fight: Fight) -> Self {
        Self {
            player: CombatantInfo {
                id: player,
                ..CombatantInfo::default()
            },
            fight,
            data: HashMap::new(),
        }
    }

    /// Create a context whose fight window spans the whole stream.
    pub fn for_stream(player: ActorId, stream: &EventStream) -> Self {
        let start = stream.start().unwrap_or(0);
        let end = stream.end().unwrap_or(start);
        Self::new(player, Fight::new(start, end))
    }

    /// Decode a context from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn with_trait(mut self, ability: AbilityId, rank: u32) -> Self {
        self.player.traits.insert(ability, rank);
        self
    }

    pub fn with_talent(mut self, ability: AbilityId) -> Self {
        self.player.talents.insert(ability);
        self
    }

    pub fn with_haste(mut self, haste: f64) -> Self {
        self.player.haste = haste;
        self
    }

    /// Set a context value.
    ///
    /// The value must be serializable. If serialization fails, the value
    /// is silently not added.
    pub fn set(&mut self, key: impl Into<String>, value: impl Serialize) {
        if let Ok(json_value) = serde_json::to_value(value) {
            self.data.insert(key.into(), json_value);
        }
    }

    /// Get a context value.
    ///
    /// Returns `None` if the key doesn't exist or if the value
    /// cannot be deserialized to the requested type.
    pub fn get<T: for<'de> Deserialize<'de>>(&self, key: &str) -> Option<T> {
        self.data.get(key).and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Check if a key exists in the context.
    pub fn contains_key(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Ability, Event, EventType};

    #[test]
    fn test_context_set_get() {
        let mut ctx = AnalysisContext::default();
        ctx.set("difficulty", 5);

        let difficulty: Option<i32> = ctx.get("difficulty");
        assert_eq!(difficulty, Some(5));
        assert!(ctx.contains_key("difficulty"));
    }

    #[test]
    fn test_context_missing_key() {
        let ctx = AnalysisContext::default();
        let value: Option<i32> = ctx.get("missing");
        assert_eq!(value, None);
    }

    #[test]
    fn test_for_stream_uses_stream_bounds() {
        let stream = EventStream::new(vec![
            Event::new(1_000, EventType::Cast, Ability::new(1)),
            Event::new(61_000, EventType::Cast, Ability::new(1)),
        ])
        .unwrap();
        let ctx = AnalysisContext::for_stream(7, &stream);
        assert_eq!(ctx.player.id, 7);
        assert_eq!(ctx.fight, Fight::new(1_000, 61_000));
        assert_eq!(ctx.fight.duration(), 60_000);
    }

    #[test]
    fn test_context_from_json() {
        let json = r#"{
            "player": {"id": 7, "name": "Bear", "traits": {"200399": 2}, "talents": [213680]},
            "fight": {"start": 0, "end": 120000}
        }"#;
        let ctx = AnalysisContext::from_json(json).unwrap();
        assert_eq!(ctx.player.name, "Bear");
        assert_eq!(ctx.player.traits.get(&200399), Some(&2));
        assert!(ctx.player.talents.contains(&213680));
        assert_eq!(ctx.player.haste, 0.0);
    }

    #[test]
    fn test_inverted_fight_has_zero_duration() {
        assert_eq!(Fight::new(100, 50).duration(), 0);
    }
}
