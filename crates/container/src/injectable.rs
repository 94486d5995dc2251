//! Injectable типы - замена runtime reflection
//!
//! АРХИТЕКТУРА:
//! - [`Component`] - concrete struct, управляемый контейнером; объявляет интерфейсы
//! - [`Pointee`] - всё, что может стоять за `Arc`: каждый `Component` и каждый
//!   `dyn Trait`, зарегистрированный через [`interface!`](crate::interface)
//! - [`Injectable`] - всё, что может быть параметром или результатом constructor:
//!   `Arc<T: Pointee>`, `Option<T>`, value types ([`value_type!`](crate::value_type))
//!
//! ```
//! use std::sync::Arc;
//! use container::{interface, Component, Provides};
//!
//! pub trait Greeter: Send + Sync {
//!     fn greet(&self) -> String;
//! }
//! interface!(dyn Greeter);
//!
//! struct English;
//!
//! impl Greeter for English {
//!     fn greet(&self) -> String {
//!         "hello".to_string()
//!     }
//! }
//!
//! impl Component for English {
//!     fn interfaces(provides: &mut Provides<Self>) {
//!         provides.provide::<dyn Greeter>(|english| english);
//!     }
//! }
//! ```

use std::any::{Any, TypeId};
use std::marker::PhantomData;
use std::sync::Arc;

use crate::descriptor::{TypeDescriptor, Upcast};
use crate::instance::{AnyArc, Instance};

/// Concrete тип, которым управляет контейнер
pub trait Component: Any + Send + Sync + Sized {
    /// Объявить интерфейсы (`dyn Trait`), которым удовлетворяет тип
    fn interfaces(provides: &mut Provides<Self>) {
        let _ = provides;
    }
}

/// Коллектор объявленных интерфейсов
pub struct Provides<T: Component> {
    upcasts: Vec<Upcast>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Component> Provides<T> {
    fn new() -> Self {
        Self {
            upcasts: Vec::new(),
            _marker: PhantomData,
        }
    }

    /// Все up-cast'ы, объявленные `T`
    #[doc(hidden)]
    pub fn declared() -> Vec<Upcast> {
        let mut provides = Self::new();
        T::interfaces(&mut provides);
        provides.upcasts
    }

    /// `T` реализует интерфейс `I`; `cast` - unsizing coercion `Arc<T> -> Arc<I>`
    pub fn provide<I: ?Sized + Pointee>(&mut self, cast: fn(Arc<T>) -> Arc<I>) -> &mut Self {
        let target = TypeId::of::<Arc<I>>();
        if self.upcasts.iter().any(|u| u.target() == target) {
            return self;
        }
        self.upcasts.push(Upcast::new(
            target,
            crate::descriptor::strip_paths(std::any::type_name::<I>()),
            Arc::new(move |value: &AnyArc| {
                let concrete = value.clone().downcast::<T>().ok()?;
                Some(I::into_any(cast(concrete)))
            }),
        ));
        self
    }
}

/// Тип, который может стоять за `Arc`-handle
pub trait Pointee: Send + Sync + 'static {
    /// Descriptor handle'а `Arc<Self>`
    fn handle_descriptor() -> TypeDescriptor;

    fn into_any(handle: Arc<Self>) -> AnyArc;

    fn from_any(value: &AnyArc) -> Option<Arc<Self>>;
}

impl<T: Component> Pointee for T {
    fn handle_descriptor() -> TypeDescriptor {
        let elem = TypeDescriptor::value::<T>(None, Provides::<T>::declared());
        TypeDescriptor::pointer::<Arc<T>>(elem)
    }

    fn into_any(handle: Arc<Self>) -> AnyArc {
        handle
    }

    fn from_any(value: &AnyArc) -> Option<Arc<Self>> {
        value.clone().downcast::<T>().ok()
    }
}

/// Параметр или результат constructor
pub trait Injectable: Sized + Send + Sync + 'static {
    fn descriptor() -> TypeDescriptor;

    fn into_instance(self) -> Instance;

    fn from_instance(instance: &Instance) -> Option<Self>;
}

impl<T: ?Sized + Pointee> Injectable for Arc<T> {
    fn descriptor() -> TypeDescriptor {
        T::handle_descriptor()
    }

    fn into_instance(self) -> Instance {
        Instance::new(T::into_any(self), T::handle_descriptor())
    }

    fn from_instance(instance: &Instance) -> Option<Self> {
        instance.value().and_then(T::from_any)
    }
}

impl<T: Injectable> Injectable for Option<T> {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::optional::<Option<T>>(T::descriptor())
    }

    fn into_instance(self) -> Instance {
        match self {
            Some(value) => value.into_instance(),
            None => Instance::absent(Self::descriptor()),
        }
    }

    fn from_instance(instance: &Instance) -> Option<Self> {
        if instance.is_absent() {
            return Some(None);
        }
        T::from_instance(instance).map(Some)
    }
}

/// Объявить `dyn Trait` интерфейсом. Trait должен иметь supertraits `Send + Sync`.
#[macro_export]
macro_rules! interface {
    ($($t:ty),+ $(,)?) => {
        $(
            impl $crate::Pointee for $t {
                fn handle_descriptor() -> $crate::TypeDescriptor {
                    $crate::TypeDescriptor::interface::<$t>()
                }

                fn into_any(handle: ::std::sync::Arc<Self>) -> $crate::AnyArc {
                    ::std::sync::Arc::new(handle)
                }

                fn from_any(value: &$crate::AnyArc) -> ::std::option::Option<::std::sync::Arc<Self>> {
                    value.downcast_ref::<::std::sync::Arc<Self>>().cloned()
                }
            }
        )+
    };
}

/// Объявить `Component + Clone + Default` тип value type'ом.
/// Zero value - `Default::default()`.
#[macro_export]
macro_rules! value_type {
    ($($t:ty),+ $(,)?) => {
        $(
            impl $crate::Injectable for $t {
                fn descriptor() -> $crate::TypeDescriptor {
                    fn zero() -> $crate::Instance {
                        $crate::Injectable::into_instance(<$t as ::std::default::Default>::default())
                    }
                    $crate::TypeDescriptor::value::<$t>(
                        ::std::option::Option::Some(zero as fn() -> $crate::Instance),
                        $crate::Provides::<$t>::declared(),
                    )
                }

                fn into_instance(self) -> $crate::Instance {
                    $crate::Instance::new(
                        ::std::sync::Arc::new(self),
                        <Self as $crate::Injectable>::descriptor(),
                    )
                }

                fn from_instance(instance: &$crate::Instance) -> ::std::option::Option<Self> {
                    instance.value()?.downcast_ref::<$t>().cloned()
                }
            }
        )+
    };
}

// Встроенные value types без интерфейсов
macro_rules! builtin_value {
    ($($t:ty),+ $(,)?) => {
        $(
            impl Injectable for $t {
                fn descriptor() -> TypeDescriptor {
                    fn zero() -> Instance {
                        <$t as Default>::default().into_instance()
                    }
                    TypeDescriptor::value::<$t>(Some(zero as fn() -> Instance), Vec::new())
                }

                fn into_instance(self) -> Instance {
                    Instance::new(Arc::new(self), Self::descriptor())
                }

                fn from_instance(instance: &Instance) -> Option<Self> {
                    instance.value()?.downcast_ref::<$t>().cloned()
                }
            }
        )+
    };
}

builtin_value!(String, bool, char, i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64);

#[cfg(test)]
mod tests {
    use super::*;

    trait Speaker: Send + Sync {
        fn speak(&self) -> String;
    }
    crate::interface!(dyn Speaker);

    trait Silent: Send + Sync {}
    crate::interface!(dyn Silent);

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Dog {
        name: String,
    }

    impl Speaker for Dog {
        fn speak(&self) -> String {
            format!("{}: woof", self.name)
        }
    }

    impl Component for Dog {
        fn interfaces(provides: &mut Provides<Self>) {
            provides.provide::<dyn Speaker>(|dog| dog);
        }
    }
    crate::value_type!(Dog);

    #[test]
    fn test_pointer_descriptor() {
        let ty = TypeDescriptor::of::<Arc<Dog>>();
        assert!(ty.is_pointer());
        assert!(!ty.is_interface());
        assert!(!ty.is_instantiable());
        assert_eq!(ty.name(), "Arc<Dog>");
        assert_eq!(ty.base_name(), "Dog");
        assert_eq!(ty.elem().map(|e| e.type_id()), Some(TypeId::of::<Dog>()));
        assert!(ty.package_name().ends_with("injectable::tests"));
    }

    #[test]
    fn test_value_descriptor_is_instantiable() {
        let ty = TypeDescriptor::of::<Dog>();
        assert!(!ty.is_pointer());
        assert!(ty.is_instantiable());

        let zero = ty.zero_instance();
        assert_eq!(zero.downcast::<Dog>(), Some(Dog::default()));
    }

    #[test]
    fn test_interface_assignability() {
        let pointer = TypeDescriptor::of::<Arc<Dog>>();
        let speaker = TypeDescriptor::of::<Arc<dyn Speaker>>();
        let silent = TypeDescriptor::of::<Arc<dyn Silent>>();

        assert!(speaker.is_interface());
        assert_eq!(speaker.name(), "dyn Speaker");
        assert!(pointer.can_convert_to(&speaker));
        assert!(!pointer.can_convert_to(&silent));
        assert!(!speaker.can_convert_to(&pointer));
    }

    #[test]
    fn test_pointer_unwraps_to_value_but_not_back() {
        let pointer = TypeDescriptor::of::<Arc<Dog>>();
        let value = TypeDescriptor::of::<Dog>();

        assert!(!pointer.can_convert_to(&value));
        assert!(pointer.is_compatible_with(&value));
        assert!(!value.is_compatible_with(&pointer));
    }

    #[test]
    fn test_upcast_instance_to_interface() {
        let dog = Arc::new(Dog {
            name: "rex".to_string(),
        });
        let instance = Instance::of(dog.clone());
        let speaker_ty = TypeDescriptor::of::<Arc<dyn Speaker>>();

        let converted = instance.convert_to(&speaker_ty).expect("dog is a speaker");
        let speaker: Arc<dyn Speaker> = converted.downcast().expect("typed interface handle");
        assert_eq!(speaker.speak(), "rex: woof");
    }

    #[test]
    fn test_pointer_identity_is_preserved() {
        let dog = Arc::new(Dog::default());
        let instance = Instance::of(dog.clone());
        let back: Arc<Dog> = instance.downcast().expect("same type");
        assert!(Arc::ptr_eq(&dog, &back));
        assert!(instance.ptr_eq(&Instance::of(dog)));
    }

    #[test]
    fn test_optional_descriptor_and_absent() {
        let ty = TypeDescriptor::of::<Option<Arc<Dog>>>();
        assert!(ty.is_optional());
        assert!(ty.is_instantiable());
        assert_eq!(ty.name(), "Option<Arc<Dog>>");
        assert_eq!(ty.optional_inner(), Some(&TypeDescriptor::of::<Arc<Dog>>()));

        let absent = ty.zero_instance();
        assert!(absent.is_absent());
        assert_eq!(absent.downcast::<Option<Arc<Dog>>>().map(|d| d.is_none()), Some(true));
        assert!(absent.downcast::<Arc<Dog>>().is_none());
    }

    #[test]
    fn test_builtin_values() {
        let ty = TypeDescriptor::of_val(&42u32);
        assert_eq!(ty.name(), "u32");
        assert_eq!(ty.zero_instance().downcast::<u32>(), Some(0));
        assert_eq!(Instance::of("x".to_string()).downcast::<String>(), Some("x".to_string()));
    }
}
