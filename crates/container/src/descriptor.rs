//! Type Descriptor - runtime описание injectable типа
//!
//! В Rust нет reflection для assignability, поэтому descriptor строится
//! trait-impl'ами (`Injectable`, `Pointee`) один раз на тип и несёт:
//! - nominal identity (`TypeId`)
//! - имя, полное имя и package (module path)
//! - вид типа: value / pointer (`Arc<T>`) / interface (`Arc<dyn Trait>`) / optional
//! - zero value factory (если тип instantiable)
//! - таблицу up-cast'ов в интерфейсы, которые тип объявил через `Component::interfaces`

use std::any::TypeId;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::instance::{AnyArc, Instance};

/// Type-erased преобразование concrete значения в interface handle
pub type CastFn = Arc<dyn Fn(&AnyArc) -> Option<AnyArc> + Send + Sync>;

/// Объявленная реализация интерфейса
#[derive(Clone)]
pub struct Upcast {
    target: TypeId,
    target_name: String,
    cast: CastFn,
}

impl Upcast {
    pub fn new(target: TypeId, target_name: impl Into<String>, cast: CastFn) -> Self {
        Self {
            target,
            target_name: target_name.into(),
            cast,
        }
    }

    /// `TypeId` interface handle'а (`Arc<dyn Trait>`)
    pub fn target(&self) -> TypeId {
        self.target
    }

    pub fn target_name(&self) -> &str {
        &self.target_name
    }

    pub(crate) fn apply(&self, value: &AnyArc) -> Option<AnyArc> {
        (self.cast)(value)
    }
}

impl fmt::Debug for Upcast {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Upcast")
            .field("target", &self.target_name)
            .finish()
    }
}

/// Вид типа
#[derive(Debug, Clone)]
pub enum TypeKind {
    /// Clone-able значение (`value_type!`)
    Value,
    /// `Arc<T>` для concrete `T: Component`
    Pointer(TypeDescriptor),
    /// `Arc<dyn Trait>` (`interface!`)
    Interface,
    /// `Option<T>` - nullable обёртка
    Optional(TypeDescriptor),
}

struct DescriptorInner {
    id: TypeId,
    name: String,
    full_name: &'static str,
    package: String,
    kind: TypeKind,
    zero: Option<fn() -> Instance>,
    upcasts: Vec<Upcast>,
}

/// Runtime descriptor типа. Равенство - по `TypeId`, не по объекту descriptor'а.
#[derive(Clone)]
pub struct TypeDescriptor {
    inner: Arc<DescriptorInner>,
}

impl TypeDescriptor {
    /// Descriptor по статическому type parameter
    pub fn of<T: crate::Injectable>() -> Self {
        T::descriptor()
    }

    /// Descriptor по runtime значению
    pub fn of_val<T: crate::Injectable>(_value: &T) -> Self {
        T::descriptor()
    }

    /// Value descriptor. Вызывается из `value_type!` и blanket impl `Pointee`.
    #[doc(hidden)]
    pub fn value<T: 'static>(zero: Option<fn() -> Instance>, upcasts: Vec<Upcast>) -> Self {
        let full_name = std::any::type_name::<T>();
        Self::build(
            TypeId::of::<T>(),
            full_name,
            strip_paths(full_name),
            package_of(full_name),
            TypeKind::Value,
            zero,
            upcasts,
        )
    }

    /// Pointer descriptor для handle `H = Arc<T>`
    #[doc(hidden)]
    pub fn pointer<H: 'static>(elem: TypeDescriptor) -> Self {
        let full_name = std::any::type_name::<H>();
        let upcasts = elem.inner.upcasts.clone();
        let package = elem.inner.package.clone();
        Self::build(
            TypeId::of::<H>(),
            full_name,
            format!("Arc<{}>", elem.name()),
            package,
            TypeKind::Pointer(elem),
            None,
            upcasts,
        )
    }

    /// Interface descriptor для `Arc<I>`, где `I = dyn Trait`
    #[doc(hidden)]
    pub fn interface<I: ?Sized + 'static>() -> Self {
        let full_name = std::any::type_name::<I>();
        Self::build(
            TypeId::of::<Arc<I>>(),
            full_name,
            strip_paths(full_name),
            package_of(full_name),
            TypeKind::Interface,
            None,
            Vec::new(),
        )
    }

    /// Optional descriptor для `O = Option<T>`
    #[doc(hidden)]
    pub fn optional<O: 'static>(inner: TypeDescriptor) -> Self {
        let full_name = std::any::type_name::<O>();
        let package = inner.inner.package.clone();
        Self::build(
            TypeId::of::<O>(),
            full_name,
            format!("Option<{}>", inner.name()),
            package,
            TypeKind::Optional(inner),
            None,
            Vec::new(),
        )
    }

    fn build(
        id: TypeId,
        full_name: &'static str,
        name: String,
        package: String,
        kind: TypeKind,
        zero: Option<fn() -> Instance>,
        upcasts: Vec<Upcast>,
    ) -> Self {
        Self {
            inner: Arc::new(DescriptorInner {
                id,
                name,
                full_name,
                package,
                kind,
                zero,
                upcasts,
            }),
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.inner.id
    }

    /// Каноническое короткое имя: `A`, `Arc<A>`, `dyn Greeter`, `Option<Arc<E>>`
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Полное имя из `std::any::type_name`
    pub fn full_name(&self) -> &'static str {
        self.inner.full_name
    }

    pub fn package_name(&self) -> &str {
        &self.inner.package
    }

    pub fn kind(&self) -> &TypeKind {
        &self.inner.kind
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self.inner.kind, TypeKind::Pointer(_))
    }

    pub fn is_interface(&self) -> bool {
        matches!(self.inner.kind, TypeKind::Interface)
    }

    pub fn is_optional(&self) -> bool {
        matches!(self.inner.kind, TypeKind::Optional(_))
    }

    /// Существует ли zero value (value types с `Default`, `Option<T>`)
    pub fn is_instantiable(&self) -> bool {
        self.inner.zero.is_some() || self.is_optional()
    }

    /// Pointee для pointer descriptor'а
    pub fn elem(&self) -> Option<&TypeDescriptor> {
        match &self.inner.kind {
            TypeKind::Pointer(elem) => Some(elem),
            _ => None,
        }
    }

    /// Внутренний тип `Option<T>`
    pub fn optional_inner(&self) -> Option<&TypeDescriptor> {
        match &self.inner.kind {
            TypeKind::Optional(inner) => Some(inner),
            _ => None,
        }
    }

    /// Базовое имя без generics/`dyn`/маркерных trait'ов; для pointer - имя pointee
    pub fn base_name(&self) -> String {
        match &self.inner.kind {
            TypeKind::Pointer(elem) | TypeKind::Optional(elem) => elem.base_name(),
            TypeKind::Value | TypeKind::Interface => {
                let name = self.inner.name.trim_start_matches("dyn ");
                let name = name.split(" + ").next().unwrap_or(name);
                name.split('<').next().unwrap_or(name).trim().to_string()
            }
        }
    }

    /// Интерфейсы, которые реализует тип
    pub fn interfaces(&self) -> &[Upcast] {
        &self.inner.upcasts
    }

    pub(crate) fn upcast_to(&self, target: TypeId) -> Option<&Upcast> {
        self.inner.upcasts.iter().find(|u| u.target == target)
    }

    /// Nominal assignability: тот же тип или объявленная реализация интерфейса
    pub fn can_convert_to(&self, other: &TypeDescriptor) -> bool {
        if self.inner.id == other.inner.id {
            return true;
        }
        other.is_interface() && self.upcast_to(other.inner.id).is_some()
    }

    /// Правило совместимости instance -> target:
    /// 1. прямая assignability;
    /// 2. pointer удовлетворяет non-pointer non-interface target через pointee.
    ///
    /// Обратное (value -> pointer) не допускается.
    pub fn is_compatible_with(&self, target: &TypeDescriptor) -> bool {
        if self.can_convert_to(target) {
            return true;
        }
        match &self.inner.kind {
            TypeKind::Pointer(elem) => {
                !target.is_pointer() && !target.is_interface() && elem.can_convert_to(target)
            }
            _ => false,
        }
    }

    /// Zero value для optional substitution; absent marker, если zero не существует
    pub fn zero_instance(&self) -> Instance {
        match self.inner.zero {
            Some(zero) => zero(),
            None => Instance::absent(self.clone()),
        }
    }
}

impl PartialEq for TypeDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for TypeDescriptor {}

impl Hash for TypeDescriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.id.hash(state);
    }
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("name", &self.inner.name)
            .field("package", &self.inner.package)
            .field("kind", &self.inner.kind)
            .finish()
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inner.name)
    }
}

/// Убрать module paths: `alloc::sync::Arc<app::A>` -> `Arc<A>`
pub(crate) fn strip_paths(full: &str) -> String {
    let mut out = String::with_capacity(full.len());
    let mut segment = String::new();
    for ch in full.chars() {
        match ch {
            '<' | '>' | ',' | ' ' | '(' | ')' | '[' | ']' | '&' | ';' | '*' => {
                out.push_str(last_segment(&segment));
                segment.clear();
                out.push(ch);
            }
            _ => segment.push(ch),
        }
    }
    out.push_str(last_segment(&segment));
    out
}

fn last_segment(path: &str) -> &str {
    path.rsplit("::").next().unwrap_or(path)
}

/// Module path базового типа: `app::model::A<T>` -> `app::model`
pub(crate) fn package_of(full: &str) -> String {
    let base = full.trim_start_matches("dyn ");
    let base = base.split(" + ").next().unwrap_or(base);
    let base = base.split('<').next().unwrap_or(base);
    base.rsplit_once("::")
        .map(|(package, _)| package.to_string())
        .unwrap_or_default()
}

/// `HttpServer` -> `httpServer`
pub(crate) fn lower_camel(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}
