//! Конфигурация контейнера
//!
//! ПРИНЦИПЫ:
//! - Только то, что меняет поведение контейнера
//! - Default values для всего, JSON с пропущенными полями валиден
//! - Presets вместо сложной иерархии

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::{ContainerError, Result};

/// Конфигурация [`Container`](crate::Container)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerConfig {
    /// Имя контейнера (для логов и stats)
    pub name: String,

    /// `start()` строит все Shared definitions в порядке зависимостей
    pub eager_init: bool,

    /// Снапшотить глобальную таблицу регистрации при сборке
    pub include_global_definitions: bool,

    /// `start()` сначала проверяет граф зависимостей
    pub validate_on_start: bool,

    /// Максимальное количество definitions
    pub max_definitions: usize,
}

impl ContainerConfig {
    pub fn new() -> Self {
        Self {
            name: "application".to_string(),
            eager_init: false,
            include_global_definitions: true,
            validate_on_start: false,
            max_definitions: 10_000,
        }
    }

    /// Конфигурация для разработки: ошибки графа видны сразу
    pub fn development() -> Self {
        Self {
            validate_on_start: true,
            ..Self::new()
        }
    }

    /// Production: всё строится и проверяется при старте
    pub fn production() -> Self {
        Self {
            eager_init: true,
            validate_on_start: true,
            ..Self::new()
        }
    }

    /// Изолированный контейнер для тестов: без глобальных definitions
    pub fn minimal() -> Self {
        Self {
            name: "minimal".to_string(),
            include_global_definitions: false,
            max_definitions: 100,
            ..Self::new()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(ContainerError::configuration(
                "name must not be empty",
                Some("name"),
            ));
        }
        if self.max_definitions == 0 {
            return Err(ContainerError::configuration(
                "max_definitions must be greater than 0",
                Some("max_definitions"),
            ));
        }
        Ok(())
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| {
            ContainerError::configuration(format!("invalid container config: {}", e), None::<String>)
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            ContainerError::configuration(
                format!("cannot read {}: {}", path.display(), e),
                None::<String>,
            )
        })?;
        Self::from_json_str(&json)
    }
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder для конфигурации
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: ContainerConfig,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    pub fn eager_init(mut self, enabled: bool) -> Self {
        self.config.eager_init = enabled;
        self
    }

    pub fn include_global_definitions(mut self, enabled: bool) -> Self {
        self.config.include_global_definitions = enabled;
        self
    }

    pub fn validate_on_start(mut self, enabled: bool) -> Self {
        self.config.validate_on_start = enabled;
        self
    }

    pub fn max_definitions(mut self, max: usize) -> Self {
        self.config.max_definitions = max;
        self
    }

    pub fn build(self) -> Result<ContainerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = ContainerConfig::default();

        assert_eq!(config.name, "application");
        assert!(!config.eager_init);
        assert!(config.include_global_definitions);
        assert!(!config.validate_on_start);
        assert_eq!(config.max_definitions, 10_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_preset_configs() {
        assert!(ContainerConfig::development().validate_on_start);

        let prod = ContainerConfig::production();
        assert!(prod.eager_init);
        assert!(prod.validate_on_start);

        let minimal = ContainerConfig::minimal();
        assert!(!minimal.include_global_definitions);
        assert_eq!(minimal.max_definitions, 100);
    }

    #[test]
    fn test_config_validation() {
        let mut config = ContainerConfig::new();
        config.max_definitions = 0;
        match config.validate() {
            Err(ContainerError::Configuration { field, .. }) => {
                assert_eq!(field.as_deref(), Some("max_definitions"))
            }
            other => panic!("unexpected: {:?}", other),
        }

        assert!(ConfigBuilder::new().name("  ").build().is_err());
    }

    #[test]
    fn test_config_builder() {
        let config = ConfigBuilder::new()
            .name("orders")
            .eager_init(true)
            .include_global_definitions(false)
            .validate_on_start(true)
            .max_definitions(42)
            .build()
            .unwrap();

        assert_eq!(config.name, "orders");
        assert!(config.eager_init);
        assert!(!config.include_global_definitions);
        assert!(config.validate_on_start);
        assert_eq!(config.max_definitions, 42);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = ContainerConfig::from_json_str(r#"{"name":"api","eager_init":true}"#).unwrap();
        assert_eq!(config.name, "api");
        assert!(config.eager_init);
        assert_eq!(config.max_definitions, 10_000);

        assert!(ContainerConfig::from_json_str(r#"{"max_definitions":0}"#).is_err());
        assert!(ContainerConfig::from_json_str("not json").is_err());
    }

    #[test]
    fn test_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let json = serde_json::to_string(&ContainerConfig::production()).unwrap();
        file.write_all(json.as_bytes()).unwrap();

        let loaded = ContainerConfig::from_json_file(file.path()).unwrap();
        assert_eq!(loaded, ContainerConfig::production());

        assert!(ContainerConfig::from_json_file("/definitely/not/here.json").is_err());
    }
}
