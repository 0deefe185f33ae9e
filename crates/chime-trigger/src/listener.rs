//! Ordered, duplicate-free listener names attached to a trigger.

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use crate::TriggerError;

/// Listener names in first-insertion order.
///
/// Names are resolved against a listener registry by the scheduler; the chain
/// never holds listener objects. Serializes as a plain list, and a missing or
/// `null` list loads as an empty chain.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(into = "Vec<String>", try_from = "Option<Vec<String>>")]
pub struct ListenerChain {
    names: IndexSet<String>,
}

impl ListenerChain {
    /// Create an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a chain from names, rejecting duplicates.
    pub fn from_names<I, S>(names: I) -> Result<Self, TriggerError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut chain = Self::new();
        for name in names {
            chain.add(name)?;
        }
        Ok(chain)
    }

    /// Append a listener name.
    ///
    /// # Errors
    ///
    /// Returns `TriggerError::DuplicateListener` if the name is already
    /// attached; the chain is left unchanged.
    pub fn add(&mut self, name: impl Into<String>) -> Result<(), TriggerError> {
        let name = name.into();
        if self.names.contains(&name) {
            return Err(TriggerError::DuplicateListener(name));
        }
        self.names.insert(name);
        Ok(())
    }

    /// Remove a listener name, keeping the order of the rest.
    ///
    /// Returns whether the name was present.
    pub fn remove(&mut self, name: &str) -> bool {
        self.names.shift_remove(name)
    }

    /// Replace the whole chain.
    ///
    /// `None` or an empty list leaves an empty chain. On a duplicate the old
    /// chain is kept.
    pub fn replace(&mut self, names: Option<Vec<String>>) -> Result<(), TriggerError> {
        *self = Self::from_names(names.unwrap_or_default())?;
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Iterate names in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    /// Owned snapshot of the names in order.
    pub fn to_vec(&self) -> Vec<String> {
        self.names.iter().cloned().collect()
    }
}

// Order is part of a chain's value.
impl PartialEq for ListenerChain {
    fn eq(&self, other: &Self) -> bool {
        self.names.iter().eq(other.names.iter())
    }
}

impl Eq for ListenerChain {}

impl From<ListenerChain> for Vec<String> {
    fn from(chain: ListenerChain) -> Self {
        chain.names.into_iter().collect()
    }
}

impl TryFrom<Option<Vec<String>>> for ListenerChain {
    type Error = TriggerError;

    fn try_from(names: Option<Vec<String>>) -> Result<Self, Self::Error> {
        Self::from_names(names.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_add_preserves_order() {
        let mut chain = ListenerChain::new();
        for name in ["X", "A", "B"] {
            chain.add(name).unwrap();
        }
        assert_eq!(chain.to_vec(), vec!["X", "A", "B"]);
    }

    #[test]
    fn test_add_rejects_duplicates() {
        let mut chain = ListenerChain::from_names(["X", "A", "B"]).unwrap();
        for name in ["X", "A", "B"] {
            let err = chain.add(name).unwrap_err();
            assert!(matches!(err, TriggerError::DuplicateListener(ref n) if n == name));
        }
        assert_eq!(chain.to_vec(), vec!["X", "A", "B"]);
    }

    #[test]
    fn test_remove_keeps_order_and_ignores_missing() {
        let mut chain = ListenerChain::from_names(["L1", "L2", "L3"]).unwrap();
        assert!(chain.remove("L2"));
        assert!(!chain.remove("nope"));
        assert_eq!(chain.to_vec(), vec!["L1", "L3"]);
    }

    #[test]
    fn test_replace_normalizes_none_to_empty() {
        let mut chain = ListenerChain::new();

        chain.replace(None).unwrap();
        assert!(chain.is_empty());

        chain
            .replace(Some(vec!["FOO".to_string(), "BAR".to_string()]))
            .unwrap();
        assert_eq!(chain.len(), 2);

        chain.replace(Some(vec!["BAZ".to_string()])).unwrap();
        assert_eq!(chain.len(), 1);

        chain.replace(None).unwrap();
        assert!(chain.is_empty());
    }

    #[test]
    fn test_replace_with_duplicates_keeps_old_chain() {
        let mut chain = ListenerChain::from_names(["A"]).unwrap();
        let result = chain.replace(Some(vec!["B".to_string(), "B".to_string()]));
        assert!(matches!(result, Err(TriggerError::DuplicateListener(_))));
        assert_eq!(chain.to_vec(), vec!["A"]);
    }

    #[test]
    fn test_equality_is_order_sensitive() {
        let ab = ListenerChain::from_names(["A", "B"]).unwrap();
        let ba = ListenerChain::from_names(["B", "A"]).unwrap();
        assert_ne!(ab, ba);
        assert_eq!(ab, ab.clone());
    }

    #[test]
    fn test_serde_null_and_duplicates() {
        let chain: ListenerChain = serde_json::from_str("null").unwrap();
        assert!(chain.is_empty());

        let chain: ListenerChain = serde_json::from_str(r#"["L1","L2"]"#).unwrap();
        assert_eq!(serde_json::to_string(&chain).unwrap(), r#"["L1","L2"]"#);

        assert!(serde_json::from_str::<ListenerChain>(r#"["L1","L1"]"#).is_err());
    }
}
