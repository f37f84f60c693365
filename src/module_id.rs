//! Module identifier.
//!
//! Provides the `ModuleId` type, an interned string identifier for
//! analysis modules. Uses `Arc<str>` so cloning into graph nodes,
//! routing tables and error values stays cheap.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::borrow::Borrow;
use std::sync::Arc;

/// Interned string identifier for analysis modules.
///
/// # Examples
///
/// ```rust
/// use zzparse::ModuleId;
///
/// let combatants = ModuleId::from_str("combatants");
/// let again: ModuleId = "combatants".into();
/// let owned: ModuleId = String::from("combatants").into();
///
/// assert_eq!(combatants, again);
/// assert_eq!(combatants, owned);
/// ```
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct ModuleId(Arc<str>);

impl Serialize for ModuleId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.0.as_ref().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ModuleId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(ModuleId::from(s))
    }
}

impl ModuleId {
    /// Create a new `ModuleId` from a string slice.
    pub fn from_str(s: &str) -> Self {
        Self(Arc::from(s))
    }

    /// Get the string representation of this `ModuleId`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use zzparse::ModuleId;
    ///
    /// let id = ModuleId::from_str("iron_fur");
    /// assert_eq!(id.as_str(), "iron_fur");
    /// ```
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ModuleId {
    fn from(s: &str) -> Self {
        Self::from_str(s)
    }
}

impl From<String> for ModuleId {
    fn from(s: String) -> Self {
        Self(Arc::from(s))
    }
}

impl Borrow<str> for ModuleId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ModuleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_id_equality() {
        let a = ModuleId::from_str("combatants");
        let b: ModuleId = "combatants".into();
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "combatants");
    }

    #[test]
    fn test_module_id_lookup_by_str() {
        let mut map = std::collections::HashMap::new();
        map.insert(ModuleId::from_str("combatants"), 1);
        assert_eq!(map.get("combatants"), Some(&1));
    }

    #[test]
    fn test_module_id_serde_as_plain_string() {
        let id = ModuleId::from_str("iron_fur");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"iron_fur\"");

        let back: ModuleId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
