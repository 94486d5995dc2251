//! Environment - внешний источник properties и активных profiles.
//!
//! Контейнер сам properties не читает: их используют conditions
//! (`on_profile`, `on_property`) и пользовательские constructors, которые
//! зависят от `Arc<dyn Environment>` или `Arc<dyn PropertyProvider>`.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::injectable::{Component, Provides};

/// Источник значений по ключу
pub trait PropertyProvider: Send + Sync {
    fn property(&self, key: &str) -> Option<String>;

    fn contains_property(&self, key: &str) -> bool {
        self.property(key).is_some()
    }
}

/// Properties + активные profiles
pub trait Environment: PropertyProvider {
    fn active_profiles(&self) -> Vec<String>;

    fn accepts_profile(&self, profile: &str) -> bool {
        self.active_profiles().iter().any(|p| p == profile)
    }
}

crate::interface!(dyn PropertyProvider, dyn Environment);

/// In-memory environment
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StaticEnvironment {
    #[serde(default)]
    profiles: Vec<String>,
    #[serde(default)]
    properties: BTreeMap<String, String>,
}

impl StaticEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        let profile = profile.into();
        if !self.profiles.contains(&profile) {
            self.profiles.push(profile);
        }
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn set_property(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.properties.insert(key.into(), value.into());
    }

    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }
}

impl PropertyProvider for StaticEnvironment {
    fn property(&self, key: &str) -> Option<String> {
        self.properties.get(key).cloned()
    }
}

impl Environment for StaticEnvironment {
    fn active_profiles(&self) -> Vec<String> {
        self.profiles.clone()
    }
}

impl Component for StaticEnvironment {
    fn interfaces(provides: &mut Provides<Self>) {
        provides
            .provide::<dyn Environment>(|env| env)
            .provide::<dyn PropertyProvider>(|env| env);
    }
}

/// Пустое environment по умолчанию
pub fn empty() -> Arc<dyn Environment> {
    Arc::new(StaticEnvironment::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::TypeDescriptor;

    #[test]
    fn test_profiles_and_properties() {
        let env = StaticEnvironment::new()
            .with_profile("dev")
            .with_profile("dev")
            .with_property("db.url", "sqlite::memory:");

        assert_eq!(env.active_profiles(), vec!["dev".to_string()]);
        assert!(env.accepts_profile("dev"));
        assert!(!env.accepts_profile("prod"));
        assert_eq!(env.property("db.url").as_deref(), Some("sqlite::memory:"));
        assert!(!env.contains_property("db.user"));
    }

    #[test]
    fn test_environment_is_an_interface() {
        let pointer = TypeDescriptor::of::<Arc<StaticEnvironment>>();
        assert!(pointer.can_convert_to(&TypeDescriptor::of::<Arc<dyn Environment>>()));
        assert!(pointer.can_convert_to(&TypeDescriptor::of::<Arc<dyn PropertyProvider>>()));
    }

    #[test]
    fn test_deserialize_from_json() {
        let env: StaticEnvironment =
            serde_json::from_str(r#"{"profiles":["test"],"properties":{"a":"1"}}"#)
                .expect("valid environment json");
        assert!(env.accepts_profile("test"));
        assert_eq!(env.property("a").as_deref(), Some("1"));
    }
}
