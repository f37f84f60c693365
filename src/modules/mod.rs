//! Built-in analysis modules.
//!
//! - [`Combatants`] - buff spans and character setup of the analyzed player
//! - [`IronFur`] - Guardian Druid Ironfur stack mitigation
//! - [`CastEfficiency`] - casts against possible casts per cooldown

pub mod cast_efficiency;
pub mod combatants;
pub mod iron_fur;

pub use cast_efficiency::{
    AbilityEfficiency, CastEfficiency, CastEfficiencyConfig, SpellCategory, TrackedAbility,
};
pub use combatants::Combatants;
pub use iron_fur::{HitTally, IronFur, IronFurConfig};
