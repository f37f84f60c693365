//! Ability identifiers used by the built-in modules.

use crate::event::AbilityId;

// Guardian Druid
pub const IRONFUR: AbilityId = 192081;
pub const BEAR_FORM: AbilityId = 5487;
pub const GUARDIAN_OF_ELUNE: AbilityId = 213680;
/// Artifact trait, +0.5s Ironfur duration per rank.
pub const URSOCS_ENDURANCE: AbilityId = 200399;

// Vengeance Demon Hunter
pub const IMMOLATION_AURA: AbilityId = 178740;
pub const SIGIL_OF_FLAME: AbilityId = 204598;
pub const DEMON_SPIKES: AbilityId = 203720;
pub const SOUL_CARVER: AbilityId = 207407;
pub const FRACTURE: AbilityId = 209795;
pub const FELBLADE: AbilityId = 232893;
pub const FEL_ERUPTION: AbilityId = 211881;
pub const FEL_DEVASTATION: AbilityId = 212084;
pub const SOUL_BARRIER: AbilityId = 227225;
pub const RAZOR_SPIKES: AbilityId = 209400;
