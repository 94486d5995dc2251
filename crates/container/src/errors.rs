//! 🚫 CONTAINER ERROR HANDLING
//!
//! Единый error type для всех операций контейнера: регистрация definitions,
//! разрешение экземпляров, hooks, валидация графа зависимостей.
//!
//! # КАТЕГОРИИ
//!
//! - **configuration-time**: `InvalidConstructor`, `DuplicateName`, `InvalidOption`,
//!   `Configuration` — ошибки регистрации, исправляются только в коде/конфиге
//! - **resolution-time**: всё остальное, возвращается вызывающему без изменений,
//!   чтобы он мог реализовать fallback (например optional inputs)
//!
//! Ошибки пользовательского кода (constructor, hook) сохраняются как `#[source]`,
//! поэтому цепочка `anyhow` не теряется.

use std::fmt;
use std::sync::Arc;

use anyhow::Context;
use thiserror::Error;

/// Результат операций контейнера
pub type Result<T, E = ContainerError> = std::result::Result<T, E>;

/// Исходная ошибка constructor/hook в clone-able форме
pub type ErrorSource = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// Фаза инициализации, в которой сработал hook
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookPhase {
    PreInit,
    PostInit,
}

impl fmt::Display for HookPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookPhase::PreInit => f.write_str("pre-init"),
            HookPhase::PostInit => f.write_str("post-init"),
        }
    }
}

/// Основной error type контейнера
#[derive(Debug, Error, Clone)]
pub enum ContainerError {
    /// Constructor некорректен (нет thunk, не ровно один результат, Option-результат)
    #[error("Invalid constructor: {message}")]
    InvalidConstructor { message: String },

    /// Definition с таким именем уже существует
    #[error("Definition '{name}' is already registered")]
    DuplicateName { name: String },

    /// Hook уже добавлен в набор
    #[error("Hook is already registered")]
    DuplicateHook,

    /// Option ссылается на несуществующий input
    #[error("Invalid option {option} for '{definition}': {message}")]
    InvalidOption {
        definition: String,
        option: String,
        message: String,
    },

    #[error("Unknown definition '{name}'")]
    UnknownDefinition { name: String },

    /// Результат definition не совместим с запрошенным типом
    #[error("Definition '{name}' produces {actual}, which is not assignable to {expected}")]
    TypeMismatch {
        name: String,
        expected: String,
        actual: String,
    },

    #[error("Argument mismatch for '{name}': {message}")]
    ArgumentMismatch { name: String, message: String },

    #[error("No instance or definition assignable to {target}")]
    NotFound { target: String },

    #[error("Ambiguous resolution for {target}: candidates {candidates:?}")]
    Ambiguous {
        target: String,
        candidates: Vec<String>,
    },

    /// Повторный вход в построение того же имени в одной цепочке разрешения
    #[error("Circular dependency detected while building '{name}': {}", .chain.join(" -> "))]
    Circular { name: String, chain: Vec<String> },

    #[error("Constructor of '{name}' failed: {source}")]
    ConstructorFailed {
        name: String,
        #[source]
        source: ErrorSource,
    },

    #[error("{phase} hook failed for '{name}': {source}")]
    HookFailed {
        name: String,
        phase: HookPhase,
        #[source]
        source: ErrorSource,
    },

    #[error("Bad request: {message}")]
    BadRequest { message: String },

    #[error("Container '{name}' is closed")]
    Closed { name: String },

    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        field: Option<String>,
    },
}

impl ContainerError {
    pub fn invalid_constructor(message: impl Into<String>) -> Self {
        ContainerError::InvalidConstructor {
            message: message.into(),
        }
    }

    pub fn invalid_option(
        definition: impl Into<String>,
        option: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        ContainerError::InvalidOption {
            definition: definition.into(),
            option: option.into(),
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        ContainerError::BadRequest {
            message: message.into(),
        }
    }

    pub fn argument_mismatch(name: impl Into<String>, message: impl Into<String>) -> Self {
        ContainerError::ArgumentMismatch {
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>, field: Option<impl Into<String>>) -> Self {
        ContainerError::Configuration {
            message: message.into(),
            field: field.map(|f| f.into()),
        }
    }

    /// Обернуть ошибку constructor
    pub fn constructor_failed(name: impl Into<String>, error: anyhow::Error) -> Self {
        ContainerError::ConstructorFailed {
            name: name.into(),
            source: into_source(error),
        }
    }

    /// Обернуть ошибку hook
    pub fn hook_failed(name: impl Into<String>, phase: HookPhase, error: anyhow::Error) -> Self {
        ContainerError::HookFailed {
            name: name.into(),
            phase,
            source: into_source(error),
        }
    }

    /// Ошибка возникла на этапе регистрации (fail-fast при старте)
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            ContainerError::InvalidConstructor { .. }
                | ContainerError::DuplicateName { .. }
                | ContainerError::DuplicateHook
                | ContainerError::InvalidOption { .. }
                | ContainerError::Configuration { .. }
        )
    }

    /// Можно ли повторить запрос (или подставить fallback)
    pub fn is_recoverable(&self) -> bool {
        match self {
            ContainerError::NotFound { .. } => true, // может появиться после register_instance
            ContainerError::UnknownDefinition { .. } => true,
            ContainerError::ConstructorFailed { .. } => true, // constructor мог упасть на I/O
            ContainerError::HookFailed { .. } => true,
            ContainerError::Ambiguous { .. } => false,
            ContainerError::Circular { .. } => false,
            ContainerError::TypeMismatch { .. } => false,
            ContainerError::ArgumentMismatch { .. } => false,
            ContainerError::BadRequest { .. } => false,
            ContainerError::Closed { .. } => false,
            _ => false, // configuration-time
        }
    }

    /// Категория ошибки для monitoring/alerting
    pub fn category(&self) -> &'static str {
        match self {
            ContainerError::InvalidConstructor { .. }
            | ContainerError::DuplicateName { .. }
            | ContainerError::DuplicateHook
            | ContainerError::InvalidOption { .. } => "registration",
            ContainerError::Configuration { .. } => "configuration",
            ContainerError::UnknownDefinition { .. }
            | ContainerError::NotFound { .. }
            | ContainerError::Ambiguous { .. } => "lookup",
            ContainerError::TypeMismatch { .. } | ContainerError::ArgumentMismatch { .. } => {
                "type"
            }
            ContainerError::Circular { .. } => "graph",
            ContainerError::ConstructorFailed { .. } => "constructor",
            ContainerError::HookFailed { .. } => "hook",
            ContainerError::BadRequest { .. } | ContainerError::Closed { .. } => "request",
        }
    }
}

fn into_source(error: anyhow::Error) -> ErrorSource {
    Arc::from(Box::<dyn std::error::Error + Send + Sync + 'static>::from(error))
}

/// Helper trait для добавления context к ошибкам контейнера
pub trait ContainerContextExt<T> {
    fn container_context(self, message: &str) -> anyhow::Result<T>;
    fn container_with_context<F>(self, f: F) -> anyhow::Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ContainerContextExt<T> for Result<T, ContainerError> {
    fn container_context(self, message: &str) -> anyhow::Result<T> {
        self.map_err(anyhow::Error::from)
            .with_context(|| message.to_string())
    }

    fn container_with_context<F>(self, f: F) -> anyhow::Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(anyhow::Error::from).with_context(f)
    }
}
