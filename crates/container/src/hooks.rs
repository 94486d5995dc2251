//! Hook Set - pre/post-initialization callbacks
//!
//! Каждый hook получает имя definition и экземпляр, может вернуть другой
//! экземпляр (proxy, decorator) или отклонить его ошибкой.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::warn;

use crate::errors::{ContainerError, HookPhase, Result};
use crate::instance::Instance;

/// Callback `(name, instance) -> instance`
pub type HookFn = Arc<dyn Fn(&str, Instance) -> anyhow::Result<Instance> + Send + Sync>;

/// Пара optional callbacks. Identity hook'а - его `Arc`.
#[derive(Clone, Default)]
pub struct Hook {
    pre_init: Option<HookFn>,
    post_init: Option<HookFn>,
}

impl Hook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pre_init<F>(f: F) -> Self
    where
        F: Fn(&str, Instance) -> anyhow::Result<Instance> + Send + Sync + 'static,
    {
        Self::new().with_pre_init(f)
    }

    pub fn post_init<F>(f: F) -> Self
    where
        F: Fn(&str, Instance) -> anyhow::Result<Instance> + Send + Sync + 'static,
    {
        Self::new().with_post_init(f)
    }

    pub fn with_pre_init<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, Instance) -> anyhow::Result<Instance> + Send + Sync + 'static,
    {
        self.pre_init = Some(Arc::new(f));
        self
    }

    pub fn with_post_init<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, Instance) -> anyhow::Result<Instance> + Send + Sync + 'static,
    {
        self.post_init = Some(Arc::new(f));
        self
    }

    pub fn has_pre_init(&self) -> bool {
        self.pre_init.is_some()
    }

    pub fn has_post_init(&self) -> bool {
        self.post_init.is_some()
    }
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hook")
            .field("pre_init", &self.pre_init.is_some())
            .field("post_init", &self.post_init.is_some())
            .finish()
    }
}

/// Упорядоченный набор hooks без дубликатов
#[derive(Debug, Default)]
pub struct HookSet {
    hooks: RwLock<Vec<Arc<Hook>>>,
}

impl HookSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, hook: Arc<Hook>) -> Result<()> {
        let mut hooks = self.hooks.write();
        if hooks.iter().any(|existing| Arc::ptr_eq(existing, &hook)) {
            return Err(ContainerError::DuplicateHook);
        }
        hooks.push(hook);
        Ok(())
    }

    /// Удалить hook; отсутствие не ошибка. Возвращает, был ли hook удалён.
    pub fn remove(&self, hook: &Arc<Hook>) -> bool {
        let mut hooks = self.hooks.write();
        let before = hooks.len();
        hooks.retain(|existing| !Arc::ptr_eq(existing, hook));
        hooks.len() != before
    }

    pub fn remove_all(&self) {
        self.hooks.write().clear();
    }

    /// Снапшот в порядке добавления
    pub fn to_vec(&self) -> Vec<Arc<Hook>> {
        self.hooks.read().clone()
    }

    pub fn count(&self) -> usize {
        self.hooks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.read().is_empty()
    }

    pub fn apply_pre_init(&self, name: &str, instance: Instance) -> Result<Instance> {
        self.apply(name, instance, HookPhase::PreInit)
    }

    pub fn apply_post_init(&self, name: &str, instance: Instance) -> Result<Instance> {
        self.apply(name, instance, HookPhase::PostInit)
    }

    // Lock не держится во время вызова callbacks: hook может сам трогать набор
    fn apply(&self, name: &str, mut instance: Instance, phase: HookPhase) -> Result<Instance> {
        for hook in self.to_vec() {
            let callback = match phase {
                HookPhase::PreInit => hook.pre_init.as_ref(),
                HookPhase::PostInit => hook.post_init.as_ref(),
            };
            if let Some(callback) = callback {
                instance = callback(name, instance).map_err(|error| {
                    warn!("{} hook rejected '{}': {}", phase, name, error);
                    ContainerError::hook_failed(name, phase, error)
                })?;
            }
        }
        Ok(instance)
    }
}
