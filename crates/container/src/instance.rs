//! Type-erased экземпляр вместе с его runtime descriptor'ом

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::descriptor::TypeDescriptor;
use crate::injectable::Injectable;

/// Erased storage для любого экземпляра
pub type AnyArc = Arc<dyn Any + Send + Sync>;

/// Экземпляр, произведённый контейнером (или переданный как аргумент).
///
/// Pointer-экземпляры делят allocation с типизированным `Arc<T>`, поэтому
/// identity проверяется через [`Instance::ptr_eq`].
#[derive(Clone)]
pub struct Instance {
    value: Option<AnyArc>,
    ty: TypeDescriptor,
}

impl Instance {
    pub fn new(value: AnyArc, ty: TypeDescriptor) -> Self {
        Self {
            value: Some(value),
            ty,
        }
    }

    /// Типизированный экземпляр
    pub fn of<T: Injectable>(value: T) -> Self {
        value.into_instance()
    }

    /// Absent marker: подставляется для optional input без zero value
    pub fn absent(ty: TypeDescriptor) -> Self {
        Self { value: None, ty }
    }

    pub fn is_absent(&self) -> bool {
        self.value.is_none()
    }

    /// Runtime тип экземпляра
    pub fn ty(&self) -> &TypeDescriptor {
        &self.ty
    }

    pub fn value(&self) -> Option<&AnyArc> {
        self.value.as_ref()
    }

    pub fn downcast<T: Injectable>(&self) -> Option<T> {
        T::from_instance(self)
    }

    /// Один и тот же объект (absent никогда не равен ничему)
    pub fn ptr_eq(&self, other: &Instance) -> bool {
        match (&self.value, &other.value) {
            (Some(a), Some(b)) => {
                Arc::as_ptr(a) as *const u8 == Arc::as_ptr(b) as *const u8
            }
            _ => false,
        }
    }

    /// Привести экземпляр к target типу по правилу совместимости.
    /// Для interface target применяется объявленный up-cast; для pointer -> value
    /// представление не меняется, меняется только descriptor.
    pub fn convert_to(&self, target: &TypeDescriptor) -> Option<Instance> {
        if self.ty == *target {
            return Some(self.clone());
        }
        let value = self.value.as_ref()?;
        if target.is_interface() {
            let upcast = self.ty.upcast_to(target.type_id())?;
            return upcast
                .apply(value)
                .map(|converted| Instance::new(converted, target.clone()));
        }
        if self.ty.is_compatible_with(target) {
            return Some(Instance::new(value.clone(), target.clone()));
        }
        None
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("ty", &self.ty.name())
            .field("absent", &self.is_absent())
            .finish()
    }
}

/// Сокращение для передачи аргументов в `Container::get_by_name_and_args`
pub fn arg<T: Injectable>(value: T) -> Instance {
    value.into_instance()
}
