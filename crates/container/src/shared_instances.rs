//! Shared-Instance Store - кэш построенных singleton экземпляров
//!
//! Помимо самих экземпляров store отслеживает имена, которые сейчас строятся,
//! и какая resolution chain ими владеет:
//! - повторный вход той же chain в то же имя - цикл (`Circular`)
//! - другая chain ждёт на condvar и перечитывает кэш после освобождения имени
//! - если ожидание замкнёт цикл между chains, возвращается `Circular`, а не deadlock
//!
//! ПОРЯДОК LOCK'ОВ: `construction` -> `instances`, никогда наоборот.
//! Constructor вызывается без удержания каких-либо lock'ов store.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Condvar, Mutex, RwLock};
use tracing::{debug, trace, warn};

use crate::descriptor::TypeDescriptor;
use crate::errors::{ContainerError, Result};
use crate::instance::Instance;

static NEXT_CHAIN_ID: AtomicU64 = AtomicU64::new(1);

/// Идентификатор одной логической resolution chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChainId(u64);

impl ChainId {
    /// Новый уникальный в пределах процесса идентификатор
    pub fn next() -> Self {
        ChainId(NEXT_CHAIN_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "chain#{}", self.0)
    }
}

#[derive(Debug, Default)]
struct ConstructionState {
    /// name -> chain, которая строит name
    owners: HashMap<String, ChainId>,
    /// chain -> name, освобождения которого она ждёт
    waiting: HashMap<ChainId, String>,
}

impl ConstructionState {
    /// Имена по wait-for графу от `owner`, если он приводит обратно к `chain`
    fn wait_cycle(&self, chain: ChainId, name: &str, mut owner: ChainId) -> Option<Vec<String>> {
        let mut path = vec![name.to_string()];
        for _ in 0..=self.waiting.len() {
            if owner == chain {
                return Some(path);
            }
            let waited = self.waiting.get(&owner)?;
            path.push(waited.clone());
            owner = *self.owners.get(waited)?;
        }
        None
    }
}

/// Снимает marker "under construction" на любом пути выхода
struct ConstructionGuard<'a> {
    store: &'a SharedInstances,
    name: &'a str,
    chain: ChainId,
}

impl Drop for ConstructionGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.store.construction.lock();
        if state.owners.get(self.name) == Some(&self.chain) {
            state.owners.remove(self.name);
        }
        drop(state);
        self.store.released.notify_all();
        trace!("Released construction marker for '{}'", self.name);
    }
}

/// `name -> Instance` плюс набор имён в процессе построения
#[derive(Default)]
pub struct SharedInstances {
    instances: RwLock<BTreeMap<String, Instance>>,
    construction: Mutex<ConstructionState>,
    released: Condvar,
}

impl SharedInstances {
    pub fn new() -> Self {
        Self::default()
    }

    /// Добавить готовый экземпляр
    pub fn add(&self, name: impl Into<String>, instance: Instance) -> Result<()> {
        let name = name.into();
        let mut instances = self.instances.write();
        if instances.contains_key(&name) {
            return Err(ContainerError::DuplicateName { name });
        }
        debug!("Stored shared instance '{}' ({})", name, instance.ty());
        instances.insert(name, instance);
        Ok(())
    }

    pub fn find(&self, name: &str) -> Option<Instance> {
        self.instances.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.instances.read().contains_key(name)
    }

    pub fn instance_names(&self) -> Vec<String> {
        self.instances.read().keys().cloned().collect()
    }

    pub fn count(&self) -> usize {
        self.instances.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.read().is_empty()
    }

    /// Единственный экземпляр, совместимый с `target`.
    /// Pointer-экземпляр для value target возвращается разыменованным.
    pub fn find_by_type(&self, target: &TypeDescriptor) -> Result<Instance> {
        let mut matches = self.matching(target);
        match matches.len() {
            0 => Err(ContainerError::NotFound {
                target: target.name().to_string(),
            }),
            1 => Ok(matches.remove(0).1),
            _ => Err(ContainerError::Ambiguous {
                target: target.name().to_string(),
                candidates: matches.into_iter().map(|(name, _)| name).collect(),
            }),
        }
    }

    /// Все экземпляры, совместимые с `target`, в порядке имён
    pub fn find_all_by_type(&self, target: &TypeDescriptor) -> Vec<Instance> {
        self.matching(target)
            .into_iter()
            .map(|(_, instance)| instance)
            .collect()
    }

    fn matching(&self, target: &TypeDescriptor) -> Vec<(String, Instance)> {
        self.instances
            .read()
            .iter()
            .filter_map(|(name, instance)| {
                instance
                    .convert_to(target)
                    .map(|converted| (name.clone(), converted))
            })
            .collect()
    }

    /// Вернуть экземпляр `name`, построив его через `supplier`, если его нет.
    /// Каждый вызов - отдельная resolution chain.
    pub fn or_else_get<F>(&self, name: &str, supplier: F) -> Result<Instance>
    where
        F: FnOnce() -> Result<Instance>,
    {
        self.get_or_build(ChainId::next(), name, supplier, Ok)
    }

    /// Построить `name` от имени `chain` не более одного раза.
    ///
    /// `build` (constructor + pre-init) выполняется без lock'ов; результат
    /// кладётся в store, затем вызывается `publish` (post-init). Если `publish`
    /// вернул другой экземпляр, он заменяет закэшированный; при ошибке запись
    /// удаляется. Marker снимается на любом пути выхода.
    ///
    /// Пока идёт `publish`, экземпляр уже виден через `find` другим chains.
    /// Если post-init затем падает, запись удаляется, но параллельный вызов
    /// мог успеть получить отвергнутый экземпляр.
    pub(crate) fn get_or_build<B, P>(
        &self,
        chain: ChainId,
        name: &str,
        build: B,
        publish: P,
    ) -> Result<Instance>
    where
        B: FnOnce() -> Result<Instance>,
        P: FnOnce(Instance) -> Result<Instance>,
    {
        {
            let mut state = self.construction.lock();
            loop {
                if let Some(existing) = self.find(name) {
                    return Ok(existing);
                }
                match state.owners.get(name).copied() {
                    None => {
                        state.owners.insert(name.to_string(), chain);
                        break;
                    }
                    Some(owner) if owner == chain => {
                        warn!("Circular dependency: '{}' re-entered by {}", name, chain);
                        return Err(ContainerError::Circular {
                            name: name.to_string(),
                            chain: vec![name.to_string(), name.to_string()],
                        });
                    }
                    Some(owner) => {
                        if let Some(mut cycle) = state.wait_cycle(chain, name, owner) {
                            cycle.push(name.to_string());
                            warn!(
                                "Circular dependency across chains: {}",
                                cycle.join(" -> ")
                            );
                            return Err(ContainerError::Circular {
                                name: name.to_string(),
                                chain: cycle,
                            });
                        }
                        trace!("{} waits for '{}' owned by {}", chain, name, owner);
                        state.waiting.insert(chain, name.to_string());
                        self.released.wait(&mut state);
                        state.waiting.remove(&chain);
                    }
                }
            }
        }

        let _guard = ConstructionGuard {
            store: self,
            name,
            chain,
        };

        let instance = build()?;
        self.instances
            .write()
            .insert(name.to_string(), instance.clone());

        match publish(instance.clone()) {
            Ok(published) => {
                if !published.ptr_eq(&instance) || published.ty() != instance.ty() {
                    self.replace(name, published.clone());
                }
                Ok(published)
            }
            Err(error) => {
                self.instances.write().remove(name);
                Err(error)
            }
        }
    }

    /// Имена, которые сейчас строятся
    pub fn under_construction(&self) -> Vec<String> {
        let mut names: Vec<_> = self.construction.lock().owners.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn is_under_construction(&self, name: &str) -> bool {
        self.construction.lock().owners.contains_key(name)
    }

    pub fn remove(&self, name: &str) -> Option<Instance> {
        self.instances.write().remove(name)
    }

    pub(crate) fn replace(&self, name: &str, instance: Instance) {
        self.instances.write().insert(name.to_string(), instance);
    }

    pub fn clear(&self) {
        let mut instances = self.instances.write();
        debug!("Clearing {} shared instances", instances.len());
        instances.clear();
    }
}

impl fmt::Debug for SharedInstances {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedInstances")
            .field("instances", &self.instance_names())
            .field("under_construction", &self.under_construction())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::injectable::{Component, Provides};
    use std::sync::atomic::AtomicUsize;
    use std::sync::{Arc, Barrier};
    use std::thread;
    use std::time::Duration;

    trait Shape: Send + Sync {
        fn area(&self) -> u32;
    }
    crate::interface!(dyn Shape);

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Square(u32);
    impl Shape for Square {
        fn area(&self) -> u32 {
            self.0 * self.0
        }
    }
    impl Component for Square {
        fn interfaces(provides: &mut Provides<Self>) {
            provides.provide::<dyn Shape>(|square| square);
        }
    }
    crate::value_type!(Square);

    #[test]
    fn test_add_and_find() {
        let store = SharedInstances::new();
        store.add("square", Instance::of(Arc::new(Square(2)))).unwrap();

        assert!(store.contains("square"));
        assert_eq!(store.count(), 1);
        assert_eq!(store.instance_names(), vec!["square".to_string()]);
        assert!(matches!(
            store.add("square", Instance::of(Arc::new(Square(3)))),
            Err(ContainerError::DuplicateName { .. })
        ));
    }

    #[test]
    fn test_find_by_type_unwraps_pointer() {
        let store = SharedInstances::new();
        let square = Arc::new(Square(3));
        store.add("square", Instance::of(square.clone())).unwrap();

        let as_pointer = store.find_by_type(&TypeDescriptor::of::<Arc<Square>>()).unwrap();
        assert!(Arc::ptr_eq(&as_pointer.downcast::<Arc<Square>>().unwrap(), &square));

        let as_value = store.find_by_type(&TypeDescriptor::of::<Square>()).unwrap();
        assert_eq!(as_value.downcast::<Square>(), Some(Square(3)));

        let as_shape = store.find_by_type(&TypeDescriptor::of::<Arc<dyn Shape>>()).unwrap();
        assert_eq!(as_shape.downcast::<Arc<dyn Shape>>().unwrap().area(), 9);
    }

    #[test]
    fn test_value_does_not_satisfy_pointer() {
        let store = SharedInstances::new();
        store.add("square", Instance::of(Square(1))).unwrap();

        assert!(matches!(
            store.find_by_type(&TypeDescriptor::of::<Arc<Square>>()),
            Err(ContainerError::NotFound { .. })
        ));
        assert!(store.find_by_type(&TypeDescriptor::of::<Square>()).is_ok());
    }

    #[test]
    fn test_find_by_type_ambiguous() {
        let store = SharedInstances::new();
        store.add("a", Instance::of(Arc::new(Square(1)))).unwrap();
        store.add("b", Instance::of(Arc::new(Square(2)))).unwrap();

        match store.find_by_type(&TypeDescriptor::of::<Arc<dyn Shape>>()) {
            Err(ContainerError::Ambiguous { candidates, .. }) => {
                assert_eq!(candidates, vec!["a".to_string(), "b".to_string()])
            }
            other => panic!("expected ambiguity, got {:?}", other),
        }
        assert_eq!(store.find_all_by_type(&TypeDescriptor::of::<Arc<dyn Shape>>()).len(), 2);
    }

    #[test]
    fn test_or_else_get_builds_once() {
        let store = SharedInstances::new();
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            store
                .or_else_get("square", || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(Instance::of(Arc::new(Square(4))))
                })
                .unwrap();
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(store.under_construction().is_empty());
    }

    #[test]
    fn test_reentry_is_circular_and_marker_is_cleared() {
        let store = SharedInstances::new();
        let chain = ChainId::next();

        let result = store.get_or_build(
            chain,
            "x",
            || {
                assert!(store.is_under_construction("x"));
                store.get_or_build(chain, "x", || unreachable!(), Ok)
            },
            Ok,
        );

        assert!(matches!(result, Err(ContainerError::Circular { .. })));
        assert!(store.under_construction().is_empty());
        assert_eq!(store.count(), 0);
    }

    #[test]
    fn test_failed_supplier_leaves_no_entry() {
        let store = SharedInstances::new();
        let result = store.or_else_get("broken", || Err(ContainerError::bad_request("nope")));

        assert!(result.is_err());
        assert!(!store.contains("broken"));
        assert!(store.under_construction().is_empty());

        // Повторная попытка снова вызывает supplier
        let retried = store.or_else_get("broken", || Ok(Instance::of(Arc::new(Square(1)))));
        assert!(retried.is_ok());
    }

    #[test]
    fn test_publish_failure_evicts_and_replacement_is_cached() {
        let store = SharedInstances::new();
        let chain = ChainId::next();

        let result = store.get_or_build(
            chain,
            "rejected",
            || Ok(Instance::of(Arc::new(Square(1)))),
            |_| Err(ContainerError::bad_request("rejected")),
        );
        assert!(result.is_err());
        assert!(!store.contains("rejected"));

        let replacement = Arc::new(Square(7));
        let published = store
            .get_or_build(
                chain,
                "replaced",
                || Ok(Instance::of(Arc::new(Square(1)))),
                |_| Ok(Instance::of(replacement.clone())),
            )
            .unwrap();
        assert!(published.ptr_eq(&store.find("replaced").unwrap()));
        assert!(Arc::ptr_eq(
            &store.find("replaced").unwrap().downcast::<Arc<Square>>().unwrap(),
            &replacement
        ));
    }

    #[test]
    fn test_concurrent_chains_build_once() {
        let store = Arc::new(SharedInstances::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                let calls = calls.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    store
                        .or_else_get("slow", || {
                            calls.fetch_add(1, Ordering::SeqCst);
                            thread::sleep(Duration::from_millis(20));
                            Ok(Instance::of(Arc::new(Square(5))))
                        })
                        .unwrap()
                })
            })
            .collect();

        let results: Vec<Instance> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(|r| r.ptr_eq(&results[0])));
    }

    #[test]
    fn test_cross_chain_wait_cycle_is_detected() {
        let store = Arc::new(SharedInstances::new());
        let barrier = Arc::new(Barrier::new(2));

        let spawn = |outer: &'static str, inner: &'static str| {
            let store = store.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                let chain = ChainId::next();
                store.get_or_build(
                    chain,
                    outer,
                    || {
                        barrier.wait();
                        store.get_or_build(chain, inner, || Ok(Instance::of(Arc::new(Square(1)))), Ok)
                    },
                    Ok,
                )
            })
        };

        let first = spawn("left", "right");
        let second = spawn("right", "left");
        let results = [first.join().unwrap(), second.join().unwrap()];

        assert!(results
            .iter()
            .any(|r| matches!(r, Err(ContainerError::Circular { .. }))));
        assert!(store.under_construction().is_empty());
    }
}
