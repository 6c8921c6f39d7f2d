//! Transition registry
//!
//! Maps transition names to shared instances so a described pipeline can be
//! rebuilt on the far side of an execution boundary.

use super::{ConcatBag, PartitionTable, Transition};
use crate::error::ConfigError;
use indexmap::IndexMap;
use std::sync::Arc;

/// Registry of transitions by name
#[derive(Debug, Default, Clone)]
pub struct TransitionRegistry {
    transitions: IndexMap<String, Arc<dyn Transition>>,
}

impl TransitionRegistry {
    /// Create new empty registry
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create registry with built-in transitions
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.transitions.insert(PartitionTable::NAME.to_string(), PartitionTable::shared());
        registry.transitions.insert(ConcatBag::NAME.to_string(), ConcatBag::shared());
        registry
    }

    /// Register a transition under its own name
    ///
    /// # Errors
    /// - `ConfigError::DuplicateTransition` if the name is taken
    pub fn register(&mut self, transition: Arc<dyn Transition>) -> Result<(), ConfigError> {
        let name = transition.name().to_string();
        if self.transitions.contains_key(&name) {
            return Err(ConfigError::DuplicateTransition(name));
        }
        self.transitions.insert(name, transition);
        Ok(())
    }

    /// Look up a transition
    ///
    /// # Errors
    /// - `ConfigError::UnknownTransition` if the name is not registered
    pub fn get(&self, name: &str) -> Result<Arc<dyn Transition>, ConfigError> {
        self.transitions
            .get(name)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownTransition(name.to_string()))
    }

    /// Check if a name is registered
    #[inline]
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.transitions.contains_key(name)
    }

    /// Registered names in registration order
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.transitions.keys().map(String::as_str).collect()
    }

    /// Number of registered transitions
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    /// Check if registry is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_include_builtins() {
        let registry = TransitionRegistry::with_defaults();
        assert!(registry.contains(PartitionTable::NAME));
        assert!(registry.contains(ConcatBag::NAME));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn duplicate_names_rejected() {
        let mut registry = TransitionRegistry::with_defaults();
        assert_eq!(
            registry.register(PartitionTable::shared()),
            Err(ConfigError::DuplicateTransition(PartitionTable::NAME.into()))
        );
    }

    #[test]
    fn unknown_name_rejected() {
        let registry = TransitionRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(
            registry.get("probe").unwrap_err(),
            ConfigError::UnknownTransition("probe".into())
        );
    }
}
