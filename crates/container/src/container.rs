//! Container - фасад над registry, shared store и hooks
//!
//! Запрос `(name, target, args)` разрешается так:
//! 1. только target - сначала уже построенные shared экземпляры, затем
//!    единственная подходящая definition (exact type > compatible, затем primary)
//! 2. name - definition по имени, проверка совместимости с target
//! 3. Shared - через [`SharedInstances`] (не более одного построения на имя),
//!    Prototype - всегда новый экземпляр
//! 4. build: inputs разрешаются рекурсивно (или берутся из args), constructor,
//!    pre-init hooks, кэширование (Shared), post-init hooks
//!
//! Каждый top-level вызов - отдельная resolution chain: стек имён, которые она
//! сейчас строит, и [`ChainId`] для shared store.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use common::OperationTimer;
use tracing::{debug, info, trace, warn};

use crate::config::ContainerConfig;
use crate::definition::{Constructor, Definition, DefinitionOption, InvokeError, Scope};
use crate::dependency_graph::{DependencyGraph, ValidationReport};
use crate::descriptor::TypeDescriptor;
use crate::environment::{self, Environment};
use crate::errors::{ContainerError, Result};
use crate::global;
use crate::hooks::{Hook, HookSet};
use crate::injectable::Injectable;
use crate::instance::Instance;
use crate::registry::DefinitionRegistry;
use crate::shared_instances::{ChainId, SharedInstances};
use crate::stats::{ContainerStats, StatsCounters};

/// Имя, под которым `ContainerBuilder::expose_environment` регистрирует environment
pub const ENVIRONMENT_INSTANCE: &str = "environment";

/// Одна логическая цепочка разрешения
#[derive(Debug)]
pub(crate) struct ResolutionChain {
    id: ChainId,
    path: Vec<String>,
}

impl ResolutionChain {
    pub(crate) fn new() -> Self {
        Self {
            id: ChainId::next(),
            path: Vec::new(),
        }
    }

    pub(crate) fn id(&self) -> ChainId {
        self.id
    }

    /// Войти в построение `name`; повторный вход - цикл
    pub(crate) fn enter(&mut self, name: &str) -> Result<()> {
        if let Some(start) = self.path.iter().position(|n| n == name) {
            let mut chain: Vec<String> = self.path[start..].to_vec();
            chain.push(name.to_string());
            warn!("Circular dependency detected: {}", chain.join(" -> "));
            return Err(ContainerError::Circular {
                name: name.to_string(),
                chain,
            });
        }
        self.path.push(name.to_string());
        Ok(())
    }

    pub(crate) fn exit(&mut self) {
        self.path.pop();
    }
}

struct ContainerInner {
    config: ContainerConfig,
    environment: Arc<dyn Environment>,
    registry: DefinitionRegistry,
    shared: SharedInstances,
    hooks: HookSet,
    stats: StatsCounters,
    closed: AtomicBool,
}

/// DI контейнер. Клонирование дешёвое: клоны разделяют состояние.
#[derive(Clone)]
pub struct Container {
    inner: Arc<ContainerInner>,
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl Container {
    /// Контейнер со снапшотом глобальной таблицы и пустым environment
    pub fn new() -> Self {
        let environment = environment::empty();
        let registry = global::global().snapshot(environment.as_ref());
        Self::from_parts(ContainerConfig::default(), environment, registry)
    }

    /// Контейнер без глобальных definitions
    pub fn empty() -> Self {
        let config = ContainerConfig {
            include_global_definitions: false,
            ..ContainerConfig::default()
        };
        Self::from_parts(config, environment::empty(), DefinitionRegistry::new())
    }

    pub fn builder() -> ContainerBuilder {
        ContainerBuilder::new()
    }

    fn from_parts(
        config: ContainerConfig,
        environment: Arc<dyn Environment>,
        registry: DefinitionRegistry,
    ) -> Self {
        debug!(
            "Container '{}' created with {} definitions",
            config.name,
            registry.count()
        );
        Self {
            inner: Arc::new(ContainerInner {
                config,
                environment,
                registry,
                shared: SharedInstances::new(),
                hooks: HookSet::new(),
                stats: StatsCounters::default(),
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    pub fn config(&self) -> &ContainerConfig {
        &self.inner.config
    }

    pub fn environment(&self) -> &dyn Environment {
        self.inner.environment.as_ref()
    }

    pub fn definition_registry(&self) -> &DefinitionRegistry {
        &self.inner.registry
    }

    pub fn shared_instances(&self) -> &SharedInstances {
        &self.inner.shared
    }

    pub fn hooks(&self) -> &HookSet {
        &self.inner.hooks
    }

    /// Есть ли уже построенный shared экземпляр
    pub fn contains(&self, name: &str) -> bool {
        self.inner.shared.contains(name)
    }

    // === Регистрация ===

    /// Зарегистрировать constructor только в этом контейнере
    pub fn register<M, C>(
        &self,
        constructor: C,
        options: impl IntoIterator<Item = DefinitionOption>,
    ) -> Result<()>
    where
        C: Constructor<M>,
    {
        self.add_definition(Definition::new(constructor, options)?)
            .map(|_| ())
    }

    /// Добавить definition, если её condition принимает environment контейнера.
    /// Возвращает `false`, если definition отброшена condition.
    pub fn add_definition(&self, definition: impl Into<Arc<Definition>>) -> Result<bool> {
        self.ensure_open()?;
        let definition = definition.into();
        if !definition.is_active(self.environment()) {
            debug!("Definition '{}' is inactive in this environment", definition.name());
            return Ok(false);
        }
        self.inner.registry.add(definition)?;
        Ok(true)
    }

    /// Положить готовый экземпляр как shared
    pub fn register_instance<T: Injectable>(&self, name: impl Into<String>, value: T) -> Result<()> {
        self.ensure_open()?;
        self.inner.shared.add(name, value.into_instance())
    }

    pub fn register_pre_init<F>(&self, f: F) -> Result<Arc<Hook>>
    where
        F: Fn(&str, Instance) -> anyhow::Result<Instance> + Send + Sync + 'static,
    {
        let hook = Arc::new(Hook::pre_init(f));
        self.inner.hooks.add(hook.clone())?;
        Ok(hook)
    }

    pub fn register_post_init<F>(&self, f: F) -> Result<Arc<Hook>>
    where
        F: Fn(&str, Instance) -> anyhow::Result<Instance> + Send + Sync + 'static,
    {
        let hook = Arc::new(Hook::post_init(f));
        self.inner.hooks.add(hook.clone())?;
        Ok(hook)
    }

    // === Разрешение ===

    pub fn get(&self, name: &str) -> Result<Instance> {
        self.request(Some(name), None, &[])
    }

    pub fn get_by_type(&self, target: &TypeDescriptor) -> Result<Instance> {
        self.request(None, Some(target), &[])
    }

    pub fn get_by_name_and_type(&self, name: &str, target: &TypeDescriptor) -> Result<Instance> {
        self.request(Some(name), Some(target), &[])
    }

    /// По имени, с позиционными аргументами вместо разрешения inputs.
    /// Для уже построенного Shared экземпляра аргументы не используются.
    pub fn get_by_name_and_args(&self, name: &str, args: &[Instance]) -> Result<Instance> {
        self.request(Some(name), None, args)
    }

    /// Общая точка входа: пустое имя равно отсутствию имени
    pub fn request(
        &self,
        name: Option<&str>,
        target: Option<&TypeDescriptor>,
        args: &[Instance],
    ) -> Result<Instance> {
        let result = self.ensure_open().and_then(|_| {
            let mut chain = ResolutionChain::new();
            self.resolve_in(&mut chain, name, target, args)
        });

        self.inner.stats.record_resolution(result.is_ok());
        if let Err(error) = &result {
            debug!(
                "Resolution of {} failed: {}",
                describe_request(name, target),
                error
            );
        }
        result
    }

    /// Типизированное разрешение по типу
    pub fn resolve<T: Injectable>(&self) -> Result<T> {
        self.resolve_typed(None)
    }

    /// Типизированное разрешение по имени
    pub fn resolve_named<T: Injectable>(&self, name: &str) -> Result<T> {
        self.resolve_typed(Some(name))
    }

    pub fn try_resolve<T: Injectable>(&self) -> Option<T> {
        self.resolve::<T>().ok()
    }

    /// Все уже построенные shared экземпляры, совместимые с `T`
    pub fn resolve_all<T: Injectable>(&self) -> Vec<T> {
        self.inner
            .shared
            .find_all_by_type(&T::descriptor())
            .iter()
            .filter_map(T::from_instance)
            .collect()
    }

    fn resolve_typed<T: Injectable>(&self, name: Option<&str>) -> Result<T> {
        let target = T::descriptor();
        let instance = match target.optional_inner() {
            // Option<T>: отсутствие зависимости - это None, а не ошибка
            Some(inner) => match self.request(name, Some(inner), &[]) {
                Ok(instance) => instance,
                Err(ContainerError::NotFound { .. })
                | Err(ContainerError::UnknownDefinition { .. }) => target.zero_instance(),
                Err(error) => return Err(error),
            },
            None => self.request(name, Some(&target), &[])?,
        };

        T::from_instance(&instance).ok_or_else(|| ContainerError::TypeMismatch {
            name: name.unwrap_or_else(|| target.name()).to_string(),
            expected: target.name().to_string(),
            actual: instance.ty().name().to_string(),
        })
    }

    fn resolve_in(
        &self,
        chain: &mut ResolutionChain,
        name: Option<&str>,
        target: Option<&TypeDescriptor>,
        args: &[Instance],
    ) -> Result<Instance> {
        match (name.filter(|n| !n.is_empty()), target) {
            (None, None) => Err(ContainerError::bad_request(
                "either a name or a target type is required",
            )),
            (None, Some(target)) => {
                if !args.is_empty() {
                    return Err(ContainerError::bad_request(format!(
                        "arguments require a definition name (target {})",
                        target
                    )));
                }
                self.resolve_by_type(chain, target)
            }
            (Some(name), target) => self.resolve_by_name(chain, name, target, args),
        }
    }

    fn resolve_by_name(
        &self,
        chain: &mut ResolutionChain,
        name: &str,
        target: Option<&TypeDescriptor>,
        args: &[Instance],
    ) -> Result<Instance> {
        trace!("Resolving '{}'", name);
        let definition = match self.inner.registry.find(name) {
            Some(definition) => definition,
            None => {
                // экземпляр, добавленный через register_instance
                let instance = self.inner.shared.find(name).ok_or_else(|| {
                    ContainerError::UnknownDefinition {
                        name: name.to_string(),
                    }
                })?;
                if !args.is_empty() {
                    return Err(ContainerError::argument_mismatch(
                        name,
                        "instance was registered without a constructor",
                    ));
                }
                self.inner.stats.record_cache_hit();
                return convert(name, instance, target);
            }
        };

        if let Some(target) = target {
            if !definition.result_type().is_compatible_with(target) {
                return Err(ContainerError::TypeMismatch {
                    name: name.to_string(),
                    expected: target.name().to_string(),
                    actual: definition.result_type().name().to_string(),
                });
            }
        }

        if !args.is_empty() && args.len() != definition.input_count() {
            return Err(ContainerError::argument_mismatch(
                name,
                format!(
                    "expected 0 or {} arguments, got {}",
                    definition.input_count(),
                    args.len()
                ),
            ));
        }

        let instance = match definition.scope() {
            Scope::Shared => self.shared_instance(chain, &definition, args)?,
            Scope::Prototype => self.prototype_instance(chain, &definition, args)?,
        };
        convert(name, instance, target)
    }

    fn shared_instance(
        &self,
        chain: &mut ResolutionChain,
        definition: &Definition,
        args: &[Instance],
    ) -> Result<Instance> {
        let name = definition.name();
        if let Some(cached) = self.inner.shared.find(name) {
            trace!("Shared instance cache hit for '{}'", name);
            self.inner.stats.record_cache_hit();
            return Ok(cached);
        }

        chain.enter(name)?;
        let chain_id = chain.id();
        let result = self.inner.shared.get_or_build(
            chain_id,
            name,
            || self.build(chain, definition, args),
            |instance| self.inner.hooks.apply_post_init(name, instance),
        );
        chain.exit();
        let instance = result?;

        // close() мог очистить store, пока шла сборка
        if self.is_closed() {
            self.inner.shared.remove(name);
            return Err(self.closed_error());
        }
        Ok(instance)
    }

    fn prototype_instance(
        &self,
        chain: &mut ResolutionChain,
        definition: &Definition,
        args: &[Instance],
    ) -> Result<Instance> {
        chain.enter(definition.name())?;
        let result = self
            .build(chain, definition, args)
            .and_then(|instance| self.inner.hooks.apply_post_init(definition.name(), instance));
        chain.exit();
        let instance = result?;
        self.ensure_open()?;
        Ok(instance)
    }

    /// Constructor + pre-init hooks
    fn build(
        &self,
        chain: &mut ResolutionChain,
        definition: &Definition,
        args: &[Instance],
    ) -> Result<Instance> {
        let name = definition.name();
        let resolved;
        let args = if args.is_empty() && definition.input_count() > 0 {
            resolved = self.resolve_inputs(chain, definition)?;
            resolved.as_slice()
        } else {
            args
        };

        debug!("Building '{}' ({}, {})", name, definition.result_type(), definition.scope());
        let instance = definition.invoke(args).map_err(|error| match error {
            InvokeError::Failed(error) => ContainerError::constructor_failed(name, error),
            other => ContainerError::argument_mismatch(name, other.to_string()),
        })?;
        self.inner.stats.record_instance_created();

        self.inner.hooks.apply_pre_init(name, instance)
    }

    fn resolve_inputs(
        &self,
        chain: &mut ResolutionChain,
        definition: &Definition,
    ) -> Result<Vec<Instance>> {
        let mut args = Vec::with_capacity(definition.input_count());

        for input in definition.inputs() {
            let target = input.resolution_type();
            let resolved = match input.name() {
                Some(qualifier) => self.resolve_by_name(chain, qualifier, Some(target), &[]),
                None => self.resolve_by_type(chain, target),
            };

            match resolved {
                Ok(instance) => args.push(instance),
                Err(error) if input.is_optional() => {
                    debug!(
                        "Optional input #{} of '{}' not resolved ({}), using zero value",
                        input.index(),
                        definition.name(),
                        error
                    );
                    args.push(input.ty().zero_instance());
                }
                Err(error) => return Err(error),
            }
        }

        Ok(args)
    }

    fn resolve_by_type(
        &self,
        chain: &mut ResolutionChain,
        target: &TypeDescriptor,
    ) -> Result<Instance> {
        trace!("Resolving by type {}", target);
        let ambiguity = match self.inner.shared.find_by_type(target) {
            Ok(instance) => {
                self.inner.stats.record_cache_hit();
                return Ok(instance);
            }
            Err(ContainerError::NotFound { .. }) => None,
            Err(error) => Some(error),
        };

        let definition = match self.select_definition(target) {
            Ok(definition) => definition,
            Err(error) => return Err(ambiguity.unwrap_or(error)),
        };
        self.resolve_by_name(chain, definition.name(), Some(target), &[])
    }

    /// Единственная лучшая definition для target
    fn select_definition(&self, target: &TypeDescriptor) -> Result<Arc<Definition>> {
        let candidates = self.inner.registry.definitions_by_type(target);
        if candidates.is_empty() {
            return Err(ContainerError::NotFound {
                target: target.name().to_string(),
            });
        }

        let exact: Vec<_> = candidates
            .iter()
            .filter(|definition| definition.result_type() == target)
            .cloned()
            .collect();
        let best = if exact.is_empty() { candidates } else { exact };

        if best.len() == 1 {
            return Ok(best[0].clone());
        }

        let primaries: Vec<_> = best.iter().filter(|d| d.is_primary()).collect();
        if primaries.len() == 1 {
            return Ok(primaries[0].clone());
        }

        Err(ContainerError::Ambiguous {
            target: target.name().to_string(),
            candidates: best.iter().map(|d| d.name().to_string()).collect(),
        })
    }

    // === Lifecycle ===

    /// Без `eager_init` ничего не строит. С `eager_init` строит все Shared
    /// definitions в порядке зависимостей; с `validate_on_start` сначала
    /// проверяет граф.
    pub fn start(&self) -> Result<()> {
        self.ensure_open()?;
        let config = &self.inner.config;

        if config.validate_on_start {
            let report = self.validate();
            if !report.is_valid() {
                warn!("Container '{}' failed validation: {}", config.name, report);
                return Err(ContainerError::configuration(
                    report.to_string(),
                    None::<String>,
                ));
            }
        }

        if config.eager_init {
            let mut timer = OperationTimer::new("container_eager_init");
            timer.add_field("container", &config.name);

            let order = DependencyGraph::from_registry(&self.inner.registry).topological_order();
            let mut built = 0usize;
            for name in order {
                let shared = self
                    .inner
                    .registry
                    .find(&name)
                    .map_or(false, |definition| definition.scope() == Scope::Shared);
                if shared && !self.contains(&name) {
                    self.get(&name)?;
                    built += 1;
                }
            }

            timer.add_field("instances", built);
            timer.finish();
        }

        info!(
            "Container '{}' started: {} definitions, {} shared instances",
            config.name,
            self.inner.registry.count(),
            self.inner.shared.count()
        );
        Ok(())
    }

    /// Освободить shared экземпляры. Дальнейшие запросы возвращают `Closed`.
    ///
    /// Сборка, начатая до close, после сохранения экземпляра видит флаг
    /// и удаляет свою запись: флаг ставится раньше очистки store.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let released = self.inner.shared.count();
        self.inner.shared.clear();
        info!(
            "Container '{}' closed, released {} shared instances",
            self.name(),
            released
        );
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(self.closed_error());
        }
        Ok(())
    }

    fn closed_error(&self) -> ContainerError {
        ContainerError::Closed {
            name: self.name().to_string(),
        }
    }

    /// Статическая проверка графа definitions.
    /// Inputs, которые закрывают уже зарегистрированные экземпляры, не считаются missing.
    pub fn validate(&self) -> ValidationReport {
        let mut report = DependencyGraph::from_registry(&self.inner.registry).validate();
        report.missing.retain(|missing| match &missing.qualifier {
            Some(qualifier) => !self.inner.shared.contains(qualifier),
            None => self.inner.shared.find_by_type(&missing.target).is_err(),
        });
        report
    }

    pub fn stats(&self) -> ContainerStats {
        let mut stats = ContainerStats {
            name: self.name().to_string(),
            definition_count: self.inner.registry.count(),
            shared_instance_count: self.inner.shared.count(),
            hook_count: self.inner.hooks.count(),
            ..ContainerStats::default()
        };
        self.inner.stats.fill(&mut stats);
        stats
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("name", &self.name())
            .field("definitions", &self.inner.registry.count())
            .field("shared_instances", &self.inner.shared.count())
            .field("hooks", &self.inner.hooks.count())
            .field("closed", &self.is_closed())
            .finish()
    }
}

fn convert(name: &str, instance: Instance, target: Option<&TypeDescriptor>) -> Result<Instance> {
    match target {
        None => Ok(instance),
        Some(target) => instance
            .convert_to(target)
            .ok_or_else(|| ContainerError::TypeMismatch {
                name: name.to_string(),
                expected: target.name().to_string(),
                actual: instance.ty().name().to_string(),
            }),
    }
}

fn describe_request(name: Option<&str>, target: Option<&TypeDescriptor>) -> String {
    match (name, target) {
        (Some(name), Some(target)) => format!("'{}' as {}", name, target),
        (Some(name), None) => format!("'{}'", name),
        (None, Some(target)) => target.name().to_string(),
        (None, None) => "<empty request>".to_string(),
    }
}

/// Builder контейнера: конфигурация, environment, локальные definitions и hooks
pub struct ContainerBuilder {
    config: ContainerConfig,
    environment: Option<Arc<dyn Environment>>,
    expose_environment: bool,
    definitions: Vec<Result<Definition>>,
    hooks: Vec<Arc<Hook>>,
}

impl Default for ContainerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ContainerBuilder {
    pub fn new() -> Self {
        Self {
            config: ContainerConfig::default(),
            environment: None,
            expose_environment: false,
            definitions: Vec::new(),
            hooks: Vec::new(),
        }
    }

    pub fn config(mut self, config: ContainerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    pub fn environment(mut self, environment: impl Environment + 'static) -> Self {
        self.environment = Some(Arc::new(environment));
        self
    }

    pub fn shared_environment(mut self, environment: Arc<dyn Environment>) -> Self {
        self.environment = Some(environment);
        self
    }

    /// Зарегистрировать environment как shared экземпляр `"environment"`
    pub fn expose_environment(mut self) -> Self {
        self.expose_environment = true;
        self
    }

    pub fn without_global_definitions(mut self) -> Self {
        self.config.include_global_definitions = false;
        self
    }

    /// Локальная definition; ошибка constructor/options проявится в `build()`
    pub fn register<M, C>(
        mut self,
        constructor: C,
        options: impl IntoIterator<Item = DefinitionOption>,
    ) -> Self
    where
        C: Constructor<M>,
    {
        self.definitions.push(Definition::new(constructor, options));
        self
    }

    pub fn definition(mut self, definition: Definition) -> Self {
        self.definitions.push(Ok(definition));
        self
    }

    pub fn hook(mut self, hook: Arc<Hook>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn build(self) -> Result<Container> {
        self.config.validate()?;
        let environment = self.environment.unwrap_or_else(environment::empty);

        let registry = DefinitionRegistry::with_limit(self.config.max_definitions);
        if self.config.include_global_definitions {
            for definition in global::global().active_definitions(environment.as_ref()) {
                registry.add(definition)?;
            }
        }
        for definition in self.definitions {
            let definition = definition?;
            if definition.is_active(environment.as_ref()) {
                registry.add(definition)?;
            } else {
                debug!("Definition '{}' is inactive in this environment", definition.name());
            }
        }

        let container = Container::from_parts(self.config, environment.clone(), registry);
        if self.expose_environment {
            container
                .inner
                .shared
                .add(ENVIRONMENT_INSTANCE, Instance::of(environment))?;
        }
        for hook in self.hooks {
            container.inner.hooks.add(hook)?;
        }

        info!(
            "Container '{}' built: {} definitions",
            container.name(),
            container.inner.registry.count()
        );
        Ok(container)
    }
}
