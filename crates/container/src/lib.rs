//! Dependency Injection контейнер
//!
//! - [`Definition`] - constructor + имя + scope + inputs, собирается из options
//! - [`DefinitionRegistry`] - definitions по имени и по совместимому типу
//! - [`SharedInstances`] - кэш Shared экземпляров с детекцией циклов
//! - [`HookSet`] - pre/post-init hooks
//! - [`Container`] - разрешение по имени и/или типу
//! - [`global`] - process-wide таблица регистрации, снапшотится новым контейнером
//!
//! ```
//! use std::sync::Arc;
//! use container::{Component, Container};
//!
//! struct Repository;
//! impl Component for Repository {}
//!
//! struct Service {
//!     repository: Arc<Repository>,
//! }
//! impl Component for Service {}
//!
//! let container = Container::empty();
//! container.register(|| Arc::new(Repository), []).unwrap();
//! container
//!     .register(|repository: Arc<Repository>| Arc::new(Service { repository }), [])
//!     .unwrap();
//!
//! let service: Arc<Service> = container.resolve_named("service").unwrap();
//! let repository: Arc<Repository> = container.resolve().unwrap();
//! assert!(Arc::ptr_eq(&service.repository, &repository));
//! ```

mod config;
mod container;
mod definition;
mod dependency_graph;
mod descriptor;
pub mod environment;
mod errors;
pub mod global;
mod hooks;
mod injectable;
mod instance;
pub mod interfaces;
mod registry;
mod shared_instances;
mod stats;

pub use config::{ConfigBuilder, ContainerConfig};
pub use container::{Container, ContainerBuilder, ENVIRONMENT_INSTANCE};
pub use definition::{
    on_profile, on_property, optional, optional_at, qualifier, qualifier_at, with_condition,
    with_name, with_primary, with_scope, Condition, Constructor, ConstructorParts, Definition,
    DefinitionOption, Fallible, Input, InvokeError, Plain, Raw, RawConstructor, Scope, Thunk,
};
pub use dependency_graph::{
    DependencyGraph, DependencyGraphStats, MissingDependency, ValidationReport,
};
pub use descriptor::{CastFn, TypeDescriptor, TypeKind, Upcast};
pub use environment::{Environment, PropertyProvider, StaticEnvironment};
pub use errors::{ContainerContextExt, ContainerError, ErrorSource, HookPhase, Result};
pub use global::{register, try_register, GlobalDefinitions};
pub use hooks::{Hook, HookFn, HookSet};
pub use injectable::{Component, Injectable, Pointee, Provides};
pub use instance::{arg, AnyArc, Instance};
pub use interfaces::{EventPublisher, Lifecycle};
pub use registry::DefinitionRegistry;
pub use shared_instances::{ChainId, SharedInstances};
pub use stats::ContainerStats;
