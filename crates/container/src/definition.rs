//! Definition - неизменяемое описание того, как построить один экземпляр
//!
//! Definition собирается один раз из constructor + options и дальше
//! разделяется как `Arc<Definition>` между registry, глобальной таблицей
//! и снапшотами контейнеров.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::descriptor::{lower_camel, TypeDescriptor};
use crate::environment::Environment;
use crate::errors::{ContainerError, Result};
use crate::injectable::Injectable;
use crate::instance::Instance;

/// Scope экземпляра
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Один экземпляр на контейнер, кэшируется
    #[default]
    Shared,
    /// Новый экземпляр на каждый запрос
    Prototype,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Shared => f.write_str("shared"),
            Scope::Prototype => f.write_str("prototype"),
        }
    }
}

impl FromStr for Scope {
    type Err = ContainerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "shared" | "singleton" => Ok(Scope::Shared),
            "prototype" => Ok(Scope::Prototype),
            other => Err(ContainerError::configuration(
                format!("unknown scope '{}'", other),
                Some("scope"),
            )),
        }
    }
}

/// Predicate, вычисляемый при снапшоте глобальной таблицы
pub type Condition = Arc<dyn Fn(&dyn Environment) -> bool + Send + Sync>;

/// Erased вызов constructor с позиционными аргументами
pub type Thunk = Arc<dyn Fn(&[Instance]) -> std::result::Result<Instance, InvokeError> + Send + Sync>;

/// Ошибка вызова thunk
#[derive(Debug)]
pub enum InvokeError {
    /// Неверное количество аргументов
    Count { expected: usize, actual: usize },
    /// Аргумент не приводится к типу параметра
    Argument {
        index: usize,
        expected: String,
        actual: String,
    },
    /// Constructor вернул ошибку
    Failed(anyhow::Error),
}

impl fmt::Display for InvokeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvokeError::Count { expected, actual } => {
                write!(f, "expected {} arguments, got {}", expected, actual)
            }
            InvokeError::Argument {
                index,
                expected,
                actual,
            } => write!(f, "argument {} is {}, expected {}", index, actual, expected),
            InvokeError::Failed(error) => write!(f, "{}", error),
        }
    }
}

/// Один позиционный параметр constructor
#[derive(Debug, Clone)]
pub struct Input {
    index: usize,
    name: Option<String>,
    ty: TypeDescriptor,
    optional: bool,
}

impl Input {
    pub fn index(&self) -> usize {
        self.index
    }

    /// Qualifier: `Some` означает разрешение по имени
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn ty(&self) -> &TypeDescriptor {
        &self.ty
    }

    pub fn is_optional(&self) -> bool {
        self.optional
    }

    /// Тип, по которому ищется зависимость: для `Option<T>` это `T`
    pub fn resolution_type(&self) -> &TypeDescriptor {
        self.ty.optional_inner().unwrap_or(&self.ty)
    }

    /// Optional input должен иметь zero value: `Arc<T>` его не имеет
    fn mark_optional<F>(&mut self, definition: &str, option: F) -> Result<()>
    where
        F: FnOnce() -> String,
    {
        if !self.ty.is_instantiable() {
            return Err(ContainerError::invalid_option(
                definition,
                option(),
                format!(
                    "input #{} of type {} has no zero value, declare it as Option<{}>",
                    self.index, self.ty, self.ty
                ),
            ));
        }
        self.optional = true;
        Ok(())
    }

    fn matches(&self, ty: &TypeDescriptor) -> bool {
        self.ty == *ty || self.ty.optional_inner() == Some(ty)
    }
}

/// Разобранный constructor: descriptor'ы параметров и результатов + thunk
pub struct ConstructorParts {
    pub results: Vec<TypeDescriptor>,
    pub params: Vec<TypeDescriptor>,
    pub thunk: Option<Thunk>,
}

/// Всё, что можно зарегистрировать как constructor.
///
/// Реализовано для `Fn(A1..An) -> R` и `Fn(A1..An) -> Result<R, E>` (n до 8),
/// где параметры и результат - [`Injectable`], а также для [`RawConstructor`].
pub trait Constructor<Marker>: Send + Sync + 'static {
    fn into_parts(self) -> ConstructorParts;
}

/// Marker для infallible constructors
pub struct Plain;

/// Marker для constructors, возвращающих `Result`
pub struct Fallible;

/// Marker для [`RawConstructor`]
pub struct Raw;

/// Constructor с явной таблицей descriptor'ов и erased thunk
#[derive(Default)]
pub struct RawConstructor {
    results: Vec<TypeDescriptor>,
    params: Vec<TypeDescriptor>,
    thunk: Option<Thunk>,
}

impl RawConstructor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn param(mut self, ty: TypeDescriptor) -> Self {
        self.params.push(ty);
        self
    }

    pub fn result(mut self, ty: TypeDescriptor) -> Self {
        self.results.push(ty);
        self
    }

    pub fn thunk<F>(mut self, thunk: F) -> Self
    where
        F: Fn(&[Instance]) -> anyhow::Result<Instance> + Send + Sync + 'static,
    {
        self.thunk = Some(Arc::new(move |args: &[Instance]| {
            thunk(args).map_err(InvokeError::Failed)
        }));
        self
    }
}

impl Constructor<Raw> for RawConstructor {
    fn into_parts(self) -> ConstructorParts {
        ConstructorParts {
            results: self.results,
            params: self.params,
            thunk: self.thunk,
        }
    }
}

struct ArgReader<'a> {
    args: &'a [Instance],
    position: usize,
}

impl<'a> ArgReader<'a> {
    fn new(args: &'a [Instance], arity: usize) -> std::result::Result<Self, InvokeError> {
        if args.len() != arity {
            return Err(InvokeError::Count {
                expected: arity,
                actual: args.len(),
            });
        }
        Ok(Self { args, position: 0 })
    }

    fn next<T: Injectable>(&mut self) -> std::result::Result<T, InvokeError> {
        let index = self.position;
        self.position += 1;
        let expected = T::descriptor();
        let instance = self.args.get(index).ok_or(InvokeError::Count {
            expected: index + 1,
            actual: self.args.len(),
        })?;

        let typed = match expected.optional_inner() {
            // `Option<T>`: absent marker -> None, иначе аргумент приводится к T
            Some(_) if instance.is_absent() => T::from_instance(instance),
            Some(inner) => instance
                .convert_to(&expected)
                .or_else(|| instance.convert_to(inner))
                .and_then(|converted| T::from_instance(&converted)),
            None => instance
                .convert_to(&expected)
                .and_then(|converted| T::from_instance(&converted)),
        };

        typed.ok_or_else(|| InvokeError::Argument {
            index,
            expected: expected.name().to_string(),
            actual: if instance.is_absent() {
                format!("absent {}", instance.ty().name())
            } else {
                instance.ty().name().to_string()
            },
        })
    }
}

macro_rules! impl_constructor {
    ($($arg:ident),*) => {
        impl<Func, R, $($arg,)*> Constructor<(Plain, R, $($arg,)*)> for Func
        where
            Func: Fn($($arg),*) -> R + Send + Sync + 'static,
            R: Injectable,
            $($arg: Injectable,)*
        {
            #[allow(non_snake_case, unused_mut, unused_variables)]
            fn into_parts(self) -> ConstructorParts {
                let params = vec![$($arg::descriptor()),*];
                let arity = params.len();
                ConstructorParts {
                    results: vec![R::descriptor()],
                    params,
                    thunk: Some(Arc::new(move |args: &[Instance]| {
                        let mut reader = ArgReader::new(args, arity)?;
                        $(let $arg = reader.next::<$arg>()?;)*
                        Ok((self)($($arg),*).into_instance())
                    })),
                }
            }
        }

        impl<Func, R, E, $($arg,)*> Constructor<(Fallible, R, E, $($arg,)*)> for Func
        where
            Func: Fn($($arg),*) -> std::result::Result<R, E> + Send + Sync + 'static,
            R: Injectable,
            E: Into<anyhow::Error> + 'static,
            $($arg: Injectable,)*
        {
            #[allow(non_snake_case, unused_mut, unused_variables)]
            fn into_parts(self) -> ConstructorParts {
                let params = vec![$($arg::descriptor()),*];
                let arity = params.len();
                ConstructorParts {
                    results: vec![R::descriptor()],
                    params,
                    thunk: Some(Arc::new(move |args: &[Instance]| {
                        let mut reader = ArgReader::new(args, arity)?;
                        $(let $arg = reader.next::<$arg>()?;)*
                        (self)($($arg),*)
                            .map(Injectable::into_instance)
                            .map_err(|e| InvokeError::Failed(e.into()))
                    })),
                }
            }
        }
    };
}

impl_constructor!();
impl_constructor!(A1);
impl_constructor!(A1, A2);
impl_constructor!(A1, A2, A3);
impl_constructor!(A1, A2, A3, A4);
impl_constructor!(A1, A2, A3, A4, A5);
impl_constructor!(A1, A2, A3, A4, A5, A6);
impl_constructor!(A1, A2, A3, A4, A5, A6, A7);
impl_constructor!(A1, A2, A3, A4, A5, A6, A7, A8);

/// Option, применяемая при сборке Definition (по порядку)
#[derive(Clone)]
pub enum DefinitionOption {
    Name(String),
    Scope(Scope),
    /// Первый input типа `T` (или `Option<T>`) становится optional
    Optional(TypeDescriptor),
    OptionalAt(usize),
    /// Первый input типа `T` разрешается по имени
    Qualifier(TypeDescriptor, String),
    QualifierAt(usize, String),
    Condition(Condition),
    Primary,
}

impl fmt::Debug for DefinitionOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefinitionOption::Name(name) => write!(f, "Name({})", name),
            DefinitionOption::Scope(scope) => write!(f, "Scope({})", scope),
            DefinitionOption::Optional(ty) => write!(f, "Optional<{}>", ty),
            DefinitionOption::OptionalAt(index) => write!(f, "OptionalAt({})", index),
            DefinitionOption::Qualifier(ty, name) => write!(f, "Qualifier<{}>({})", ty, name),
            DefinitionOption::QualifierAt(index, name) => {
                write!(f, "QualifierAt({}, {})", index, name)
            }
            DefinitionOption::Condition(_) => f.write_str("Condition"),
            DefinitionOption::Primary => f.write_str("Primary"),
        }
    }
}

pub fn with_name(name: impl Into<String>) -> DefinitionOption {
    DefinitionOption::Name(name.into())
}

pub fn with_scope(scope: Scope) -> DefinitionOption {
    DefinitionOption::Scope(scope)
}

pub fn optional<T: Injectable>() -> DefinitionOption {
    DefinitionOption::Optional(T::descriptor())
}

pub fn optional_at(index: usize) -> DefinitionOption {
    DefinitionOption::OptionalAt(index)
}

pub fn qualifier<T: Injectable>(name: impl Into<String>) -> DefinitionOption {
    DefinitionOption::Qualifier(T::descriptor(), name.into())
}

pub fn qualifier_at(index: usize, name: impl Into<String>) -> DefinitionOption {
    DefinitionOption::QualifierAt(index, name.into())
}

pub fn with_condition<F>(condition: F) -> DefinitionOption
where
    F: Fn(&dyn Environment) -> bool + Send + Sync + 'static,
{
    DefinitionOption::Condition(Arc::new(condition))
}

/// Definition активна только при активном profile
pub fn on_profile(profile: impl Into<String>) -> DefinitionOption {
    let profile = profile.into();
    with_condition(move |env| env.accepts_profile(&profile))
}

/// Definition активна только если property равна значению
pub fn on_property(key: impl Into<String>, value: impl Into<String>) -> DefinitionOption {
    let key = key.into();
    let value = value.into();
    with_condition(move |env| env.property(&key).as_deref() == Some(value.as_str()))
}

pub fn with_primary() -> DefinitionOption {
    DefinitionOption::Primary
}

/// Неизменяемое описание constructor'а
pub struct Definition {
    name: String,
    result_type: TypeDescriptor,
    scope: Scope,
    inputs: Vec<Input>,
    primary: bool,
    condition: Option<Condition>,
    thunk: Thunk,
}

impl Definition {
    /// Собрать Definition из constructor и options
    pub fn new<M, C>(constructor: C, options: impl IntoIterator<Item = DefinitionOption>) -> Result<Self>
    where
        C: Constructor<M>,
    {
        let parts = constructor.into_parts();
        let thunk = parts
            .thunk
            .ok_or_else(|| ContainerError::invalid_constructor("constructor has no callable thunk"))?;

        let mut results = parts.results.into_iter();
        let result_type = match (results.next(), results.next()) {
            (Some(ty), None) => ty,
            (None, _) => {
                return Err(ContainerError::invalid_constructor(
                    "constructor must return exactly one result, got none",
                ))
            }
            (Some(_), Some(_)) => {
                return Err(ContainerError::invalid_constructor(format!(
                    "constructor must return exactly one result, got {}",
                    2 + results.count()
                )))
            }
        };
        if result_type.is_optional() {
            return Err(ContainerError::invalid_constructor(format!(
                "constructor result {} is optional; definitions must produce an instance",
                result_type
            )));
        }

        let inputs = parts
            .params
            .into_iter()
            .enumerate()
            .map(|(index, ty)| Input {
                index,
                name: None,
                ty,
                optional: false,
            })
            .collect();

        let mut definition = Self {
            name: lower_camel(&result_type.base_name()),
            result_type,
            scope: Scope::default(),
            inputs,
            primary: false,
            condition: None,
            thunk,
        };

        for option in options {
            definition.apply(option)?;
        }

        if definition.name.is_empty() {
            return Err(ContainerError::invalid_option(
                definition.result_type.name(),
                "Name",
                "definition name must not be empty",
            ));
        }

        Ok(definition)
    }

    fn apply(&mut self, option: DefinitionOption) -> Result<()> {
        match option {
            DefinitionOption::Name(name) => self.name = name,
            DefinitionOption::Scope(scope) => self.scope = scope,
            DefinitionOption::Optional(ty) => {
                let definition = self.name.clone();
                let input = self.input_of_type(&ty, "Optional")?;
                input.mark_optional(&definition, || format!("Optional<{}>", ty))?;
            }
            DefinitionOption::OptionalAt(index) => {
                let definition = self.name.clone();
                let input = self.input_at(index, "OptionalAt")?;
                input.mark_optional(&definition, || format!("OptionalAt({})", index))?;
            }
            DefinitionOption::Qualifier(ty, name) => {
                let input = self.input_of_type(&ty, "Qualifier")?;
                input.name = Some(name);
            }
            DefinitionOption::QualifierAt(index, name) => {
                let input = self.input_at(index, "QualifierAt")?;
                input.name = Some(name);
            }
            DefinitionOption::Condition(condition) => self.condition = Some(condition),
            DefinitionOption::Primary => self.primary = true,
        }
        Ok(())
    }

    fn input_of_type(&mut self, ty: &TypeDescriptor, option: &str) -> Result<&mut Input> {
        let definition = self.name.clone();
        self.inputs
            .iter_mut()
            .find(|input| input.matches(ty))
            .ok_or_else(|| {
                ContainerError::invalid_option(
                    definition,
                    format!("{}<{}>", option, ty),
                    "no input of that type",
                )
            })
    }

    fn input_at(&mut self, index: usize, option: &str) -> Result<&mut Input> {
        let count = self.inputs.len();
        let definition = self.name.clone();
        self.inputs.get_mut(index).ok_or_else(|| {
            ContainerError::invalid_option(
                definition,
                format!("{}({})", option, index),
                format!("index out of range, constructor has {} inputs", count),
            )
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn result_type(&self) -> &TypeDescriptor {
        &self.result_type
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn inputs(&self) -> &[Input] {
        &self.inputs
    }

    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    pub fn is_primary(&self) -> bool {
        self.primary
    }

    pub fn condition(&self) -> Option<&Condition> {
        self.condition.as_ref()
    }

    /// Definition активна в данном environment (нет condition - всегда)
    pub fn is_active(&self, env: &dyn Environment) -> bool {
        self.condition.as_ref().map_or(true, |condition| condition(env))
    }

    /// Вызвать constructor с уже разрешёнными аргументами
    pub fn invoke(&self, args: &[Instance]) -> std::result::Result<Instance, InvokeError> {
        (self.thunk)(args)
    }
}

impl fmt::Debug for Definition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Definition")
            .field("name", &self.name)
            .field("result_type", &self.result_type.name())
            .field("scope", &self.scope)
            .field("inputs", &self.inputs)
            .field("primary", &self.primary)
            .field("conditional", &self.condition.is_some())
            .finish()
    }
}
