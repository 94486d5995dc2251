//! Global Registration Table
//!
//! Process-wide таблица definitions. Модули регистрируют constructors до
//! создания контейнера; каждый новый [`Container`](crate::Container) берёт
//! снапшот таблицы, поэтому последующие регистрации на него не влияют.
//!
//! ```
//! use std::sync::Arc;
//! use container::{global, Component, Container};
//!
//! struct Clock;
//! impl Component for Clock {}
//!
//! global::register(|| Arc::new(Clock), [container::with_name("docClock")]);
//!
//! let container = Container::new();
//! assert!(container.definition_registry().contains("docClock"));
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::definition::{Constructor, Definition, DefinitionOption};
use crate::environment::Environment;
use crate::errors::{ContainerError, Result};
use crate::registry::DefinitionRegistry;

static GLOBAL_DEFINITIONS: Lazy<GlobalDefinitions> = Lazy::new(GlobalDefinitions::new);

/// Глобальная таблица процесса
pub fn global() -> &'static GlobalDefinitions {
    &GLOBAL_DEFINITIONS
}

/// Зарегистрировать constructor в глобальной таблице.
///
/// # Panics
///
/// Некорректный constructor, некорректная option или занятое имя -
/// ошибки конфигурации, они останавливают процесс при старте.
pub fn register<M, C>(constructor: C, options: impl IntoIterator<Item = DefinitionOption>) -> String
where
    C: Constructor<M>,
{
    global().register(constructor, options)
}

/// Вариант [`register`] без panic
pub fn try_register<M, C>(
    constructor: C,
    options: impl IntoIterator<Item = DefinitionOption>,
) -> Result<String>
where
    C: Constructor<M>,
{
    global().try_register(constructor, options)
}

/// `name -> Definition` под RwLock
#[derive(Debug, Default)]
pub struct GlobalDefinitions {
    definitions: RwLock<BTreeMap<String, Arc<Definition>>>,
}

impl GlobalDefinitions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<M, C>(
        &self,
        constructor: C,
        options: impl IntoIterator<Item = DefinitionOption>,
    ) -> String
    where
        C: Constructor<M>,
    {
        match self.try_register(constructor, options) {
            Ok(name) => name,
            Err(error) => panic!("global registration failed: {}", error),
        }
    }

    pub fn try_register<M, C>(
        &self,
        constructor: C,
        options: impl IntoIterator<Item = DefinitionOption>,
    ) -> Result<String>
    where
        C: Constructor<M>,
    {
        let definition = Definition::new(constructor, options)?;
        let name = definition.name().to_string();
        self.insert(definition)?;
        Ok(name)
    }

    /// Добавить готовую definition; занятое имя - `DuplicateName`
    pub fn insert(&self, definition: impl Into<Arc<Definition>>) -> Result<()> {
        let definition = definition.into();
        let mut definitions = self.definitions.write();
        if definitions.contains_key(definition.name()) {
            return Err(ContainerError::DuplicateName {
                name: definition.name().to_string(),
            });
        }
        debug!("Globally registered '{}'", definition.name());
        definitions.insert(definition.name().to_string(), definition);
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.definitions.read().contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.definitions.read().keys().cloned().collect()
    }

    pub fn count(&self) -> usize {
        self.definitions.read().len()
    }

    /// Definitions, condition которых принимает `env`
    pub fn active_definitions(&self, env: &dyn Environment) -> Vec<Arc<Definition>> {
        self.definitions
            .read()
            .values()
            .filter(|definition| {
                let active = definition.is_active(env);
                if !active {
                    trace!("Definition '{}' dropped by its condition", definition.name());
                }
                active
            })
            .cloned()
            .collect()
    }

    /// Отдельная копия для нового контейнера
    pub fn snapshot(&self, env: &dyn Environment) -> DefinitionRegistry {
        let registry = DefinitionRegistry::new();
        for definition in self.active_definitions(env) {
            // имена в таблице уникальны, поэтому add не может вернуть DuplicateName
            if let Err(error) = registry.add(definition) {
                debug!("Skipping global definition: {}", error);
            }
        }
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{on_profile, with_name};
    use crate::environment::StaticEnvironment;
    use crate::injectable::Component;

    struct Cache;
    impl Component for Cache {}

    #[test]
    fn test_register_derives_name() {
        let table = GlobalDefinitions::new();
        let name = table.register(|| Arc::new(Cache), []);

        assert_eq!(name, "cache");
        assert!(table.contains("cache"));
        assert_eq!(table.count(), 1);
    }

    #[test]
    #[should_panic(expected = "already registered")]
    fn test_duplicate_registration_panics() {
        let table = GlobalDefinitions::new();
        table.register(|| Arc::new(Cache), []);
        table.register(|| Arc::new(Cache), []);
    }

    #[test]
    fn test_try_register_reports_duplicates() {
        let table = GlobalDefinitions::new();
        table.try_register(|| Arc::new(Cache), []).unwrap();
        assert!(matches!(
            table.try_register(|| Arc::new(Cache), []),
            Err(ContainerError::DuplicateName { .. })
        ));
        table
            .try_register(|| Arc::new(Cache), [with_name("otherCache")])
            .unwrap();
        assert_eq!(table.names(), vec!["cache".to_string(), "otherCache".to_string()]);
    }

    #[test]
    fn test_snapshot_is_detached_and_filtered() {
        let table = GlobalDefinitions::new();
        table.register(|| Arc::new(Cache), []);
        table.register(|| Arc::new(Cache), [with_name("devCache"), on_profile("dev")]);

        let prod = table.snapshot(&StaticEnvironment::new());
        let dev = table.snapshot(&StaticEnvironment::new().with_profile("dev"));
        assert_eq!(prod.definition_names(), vec!["cache".to_string()]);
        assert_eq!(dev.count(), 2);

        table.register(|| Arc::new(Cache), [with_name("late")]);
        assert!(!prod.contains("late"));
        assert!(!dev.contains("late"));
    }
}
