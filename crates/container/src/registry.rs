//! Definition Registry - thread-safe хранилище definitions по имени

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::definition::Definition;
use crate::descriptor::TypeDescriptor;
use crate::errors::{ContainerError, Result};

/// `name -> Definition`. Итерация идёт в порядке имён, поэтому стабильна.
#[derive(Debug)]
pub struct DefinitionRegistry {
    definitions: RwLock<BTreeMap<String, Arc<Definition>>>,
    max_definitions: usize,
}

impl Default for DefinitionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DefinitionRegistry {
    pub fn new() -> Self {
        Self::with_limit(usize::MAX)
    }

    /// Registry с ограничением количества definitions
    pub fn with_limit(max_definitions: usize) -> Self {
        Self {
            definitions: RwLock::new(BTreeMap::new()),
            max_definitions,
        }
    }

    pub fn add(&self, definition: impl Into<Arc<Definition>>) -> Result<()> {
        let definition = definition.into();
        let mut definitions = self.definitions.write();

        if definitions.contains_key(definition.name()) {
            return Err(ContainerError::DuplicateName {
                name: definition.name().to_string(),
            });
        }
        if definitions.len() >= self.max_definitions {
            return Err(ContainerError::configuration(
                format!(
                    "cannot add '{}': registry is limited to {} definitions",
                    definition.name(),
                    self.max_definitions
                ),
                Some("max_definitions"),
            ));
        }

        debug!(
            "Registered definition '{}' -> {} ({})",
            definition.name(),
            definition.result_type(),
            definition.scope()
        );
        definitions.insert(definition.name().to_string(), definition);
        Ok(())
    }

    pub fn remove(&self, name: &str) -> Result<Arc<Definition>> {
        self.definitions
            .write()
            .remove(name)
            .ok_or_else(|| ContainerError::UnknownDefinition {
                name: name.to_string(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.definitions.read().contains_key(name)
    }

    pub fn find(&self, name: &str) -> Option<Arc<Definition>> {
        self.definitions.read().get(name).cloned()
    }

    /// Снапшот всех definitions
    pub fn definitions(&self) -> Vec<Arc<Definition>> {
        self.definitions.read().values().cloned().collect()
    }

    pub fn definition_names(&self) -> Vec<String> {
        self.definitions.read().keys().cloned().collect()
    }

    pub fn count(&self) -> usize {
        self.definitions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.read().is_empty()
    }

    /// Имена definitions, результат которых совместим с `target`
    pub fn definition_names_by_type(&self, target: &TypeDescriptor) -> Vec<String> {
        self.definitions_by_type(target)
            .into_iter()
            .map(|definition| definition.name().to_string())
            .collect()
    }

    /// Definitions, результат которых совместим с `target`
    pub fn definitions_by_type(&self, target: &TypeDescriptor) -> Vec<Arc<Definition>> {
        let matches: Vec<_> = self
            .definitions
            .read()
            .values()
            .filter(|definition| definition.result_type().is_compatible_with(target))
            .cloned()
            .collect();
        trace!("{} definitions compatible with {}", matches.len(), target);
        matches
    }

    /// Независимая копия registry
    pub fn snapshot(&self) -> DefinitionRegistry {
        DefinitionRegistry {
            definitions: RwLock::new(self.definitions.read().clone()),
            max_definitions: self.max_definitions,
        }
    }
}
