//! Combat events and the replayable event stream.
//!
//! Events are produced by an external log parser. The core never sorts
//! them: [`EventStream`] only validates that timestamps never go
//! backwards and then hands out a read-only, cheaply clonable view.

use crate::error::AnalysisError;
use serde::{Deserialize, Serialize};
use std::ops::Deref;
use std::sync::Arc;

/// Spell / ability identifier as found in the combat log.
pub type AbilityId = u32;

/// Player or unit identifier as found in the combat log.
pub type ActorId = u64;

/// Timestamp in milliseconds.
pub type Timestamp = i64;

/// Kind of combat event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Cast,
    BeginCast,
    ApplyBuff,
    ApplyBuffStack,
    RefreshBuff,
    RemoveBuffStack,
    RemoveBuff,
    ApplyDebuff,
    RemoveDebuff,
    Damage,
    Heal,
    Absorbed,
    Death,
}

/// Magic school of an ability, as a bit mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct School(pub u8);

impl School {
    pub const PHYSICAL: School = School(1);
    pub const HOLY: School = School(2);
    pub const FIRE: School = School(4);
    pub const NATURE: School = School(8);
    pub const FROST: School = School(16);
    pub const SHADOW: School = School(32);
    pub const ARCANE: School = School(64);

    /// Whether this is pure physical damage.
    pub fn is_physical(self) -> bool {
        self == School::PHYSICAL
    }
}

/// The ability an event refers to.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Ability {
    pub guid: AbilityId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub school: School,
}

impl Ability {
    /// An ability with only an id.
    pub fn new(guid: AbilityId) -> Self {
        Self {
            guid,
            ..Self::default()
        }
    }

    /// Set the ability's school.
    pub fn with_school(mut self, school: School) -> Self {
        self.school = school;
        self
    }
}

/// A single timestamped combat log entry.
///
/// # Examples
///
/// ```rust
/// use zzparse::event::{Ability, Event, EventType, School};
///
/// let hit = Event::new(5_000, EventType::Damage, Ability::new(1).with_school(School::PHYSICAL))
///     .with_source(99)
///     .with_target(7)
///     .with_amount(1_200);
///
/// assert_eq!(hit.total_damage(), 1_200);
/// assert_eq!(hit.target, Some(7));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub timestamp: Timestamp,
    #[serde(rename = "type")]
    pub kind: EventType,
    #[serde(default)]
    pub source: Option<ActorId>,
    #[serde(default)]
    pub target: Option<ActorId>,
    pub ability: Ability,
    #[serde(default)]
    pub amount: Option<i64>,
    #[serde(default)]
    pub overkill: Option<i64>,
    #[serde(default)]
    pub absorbed: Option<i64>,
}

impl Event {
    pub fn new(timestamp: Timestamp, kind: EventType, ability: Ability) -> Self {
        Self {
            timestamp,
            kind,
            source: None,
            target: None,
            ability,
            amount: None,
            overkill: None,
            absorbed: None,
        }
    }

    pub fn with_source(mut self, actor: ActorId) -> Self {
        self.source = Some(actor);
        self
    }

    pub fn with_target(mut self, actor: ActorId) -> Self {
        self.target = Some(actor);
        self
    }

    pub fn with_amount(mut self, amount: i64) -> Self {
        self.amount = Some(amount);
        self
    }

    pub fn with_absorbed(mut self, absorbed: i64) -> Self {
        self.absorbed = Some(absorbed);
        self
    }

    pub fn with_overkill(mut self, overkill: i64) -> Self {
        self.overkill = Some(overkill);
        self
    }

    /// Raw damage of the hit: amount plus absorbed plus overkill.
    pub fn total_damage(&self) -> i64 {
        self.amount.unwrap_or(0) + self.absorbed.unwrap_or(0) + self.overkill.unwrap_or(0)
    }
}

/// An ordered, finite, replayable sequence of events.
///
/// Backed by an `Arc<[Event]>`: cloning shares the events, so the same
/// stream can be handed to several concurrent runs.
///
/// # Examples
///
/// ```rust
/// use zzparse::event::{Ability, Event, EventStream, EventType};
///
/// let stream = EventStream::new(vec![
///     Event::new(0, EventType::Cast, Ability::new(1)),
///     Event::new(10, EventType::Cast, Ability::new(2)),
/// ]).unwrap();
/// assert_eq!(stream.len(), 2);
///
/// let backwards = EventStream::new(vec![
///     Event::new(10, EventType::Cast, Ability::new(1)),
///     Event::new(0, EventType::Cast, Ability::new(2)),
/// ]);
/// assert!(backwards.is_err());
/// ```
#[derive(Debug, Clone)]
pub struct EventStream {
    events: Arc<[Event]>,
}

impl EventStream {
    /// Build a stream, failing on the first timestamp regression.
    pub fn new(events: Vec<Event>) -> Result<Self, AnalysisError> {
        for (index, pair) in events.windows(2).enumerate() {
            if pair[1].timestamp < pair[0].timestamp {
                return Err(AnalysisError::UnorderedStream {
                    index: index + 1,
                    previous: pair[0].timestamp,
                    timestamp: pair[1].timestamp,
                });
            }
        }
        Ok(Self {
            events: events.into(),
        })
    }

    /// Decode a JSON array of events and validate its ordering.
    pub fn from_json(json: &str) -> Result<Self, AnalysisError> {
        let events: Vec<Event> =
            serde_json::from_str(json).map_err(|e| AnalysisError::InvalidStream(e.to_string()))?;
        Self::new(events)
    }

    /// Timestamp of the first event, if any.
    pub fn start(&self) -> Option<Timestamp> {
        self.events.first().map(|e| e.timestamp)
    }

    /// Timestamp of the last event, if any.
    pub fn end(&self) -> Option<Timestamp> {
        self.events.last().map(|e| e.timestamp)
    }
}

impl Deref for EventStream {
    type Target = [Event];

    fn deref(&self) -> &[Event] {
        &self.events
    }
}
