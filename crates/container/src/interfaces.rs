//! Интерфейсы, которые контейнер не вызывает сам, но умеет находить:
//! orchestrator или приложение перечисляет их через `resolve_all`.

use std::any::Any;

use crate::environment::Environment;

/// Компонент с управляемым жизненным циклом.
/// Context - environment приложения, в котором компонент запускается.
pub trait Lifecycle: Send + Sync {
    fn start(&self, ctx: &dyn Environment) -> anyhow::Result<()>;

    fn stop(&self, ctx: &dyn Environment) -> anyhow::Result<()>;

    fn is_running(&self) -> bool;
}

/// Публикация событий приложения
pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: &(dyn Any + Send + Sync));
}

crate::interface!(dyn Lifecycle, dyn EventPublisher);
