//! Property-based тесты поведения контейнера

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use container::{
    interface, optional_at, qualifier_at, value_type, with_name, with_scope, Component, Container,
    ContainerError, DefinitionRegistry, Definition, Provides, Scope, TypeDescriptor,
};
use parking_lot::Mutex;
use proptest::prelude::*;

const CASES: u32 = if cfg!(feature = "extended-tests") { 512 } else { 64 };

pub trait Named: Send + Sync {
    fn label(&self) -> &'static str;
}
interface!(dyn Named);

#[derive(Clone, Default)]
struct Alpha;
value_type!(Alpha);

impl Named for Alpha {
    fn label(&self) -> &'static str {
        "alpha"
    }
}

impl Component for Alpha {
    fn interfaces(provides: &mut Provides<Self>) {
        provides.provide::<dyn Named>(|alpha| alpha);
    }
}

struct Beta;

impl Named for Beta {
    fn label(&self) -> &'static str {
        "beta"
    }
}

impl Component for Beta {
    fn interfaces(provides: &mut Provides<Self>) {
        provides.provide::<dyn Named>(|beta| beta);
    }
}

struct Gamma;
impl Component for Gamma {}

struct Node {
    _next: Arc<Node>,
}
impl Component for Node {}

struct Leaf;
impl Component for Leaf {}

struct Composite {
    present: [bool; 3],
}
impl Component for Composite {}

fn definition_of_kind(kind: u8, name: String) -> Definition {
    let result = match kind {
        0 => Definition::new(|| Arc::new(Alpha), [with_name(name)]),
        1 => Definition::new(|| Arc::new(Beta), [with_name(name)]),
        _ => Definition::new(|| Arc::new(Gamma), [with_name(name)]),
    };
    result.unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(CASES))]

    #[test]
    fn prop_shared_is_idempotent(calls in 1usize..16) {
        let container = Container::empty();
        container.register(|| Arc::new(Gamma), []).unwrap();

        let first = container.get("gamma").unwrap();
        for _ in 0..calls {
            prop_assert!(container.get("gamma").unwrap().ptr_eq(&first));
        }
        prop_assert_eq!(container.stats().instances_created, 1);
    }

    #[test]
    fn prop_prototype_is_fresh(calls in 2usize..16) {
        let container = Container::empty();
        container
            .register(|| Arc::new(Gamma), [with_scope(Scope::Prototype)])
            .unwrap();

        let instances: Vec<Arc<Gamma>> = (0..calls)
            .map(|_| container.resolve_named("gamma").unwrap())
            .collect();
        for (i, a) in instances.iter().enumerate() {
            for b in &instances[i + 1..] {
                prop_assert!(!Arc::ptr_eq(a, b));
            }
        }
        prop_assert!(!container.contains("gamma"));
    }

    #[test]
    fn prop_names_are_unique(names in prop::collection::vec("[a-d]{1,2}", 1..24)) {
        let registry = DefinitionRegistry::new();
        let mut seen = BTreeSet::new();

        for name in &names {
            let result = registry.add(definition_of_kind(2, name.clone()));
            if seen.insert(name.clone()) {
                prop_assert!(result.is_ok());
            } else {
                let is_duplicate = matches!(result, Err(ContainerError::DuplicateName { .. }));
                prop_assert!(is_duplicate);
            }
        }
        prop_assert_eq!(registry.count(), seen.len());
        prop_assert_eq!(registry.definition_names(), seen.into_iter().collect::<Vec<_>>());
    }

    #[test]
    fn prop_type_lookup_is_sound(kinds in prop::collection::vec(0u8..3, 0..12)) {
        let registry = DefinitionRegistry::new();
        for (i, kind) in kinds.iter().enumerate() {
            registry.add(definition_of_kind(*kind, format!("d{}", i))).unwrap();
        }

        let names_of = |accepted: &[u8]| -> Vec<String> {
            let mut names: Vec<String> = kinds
                .iter()
                .enumerate()
                .filter(|(_, kind)| accepted.contains(kind))
                .map(|(i, _)| format!("d{}", i))
                .collect();
            names.sort();
            names
        };

        let cases: Vec<(TypeDescriptor, Vec<String>)> = vec![
            (TypeDescriptor::of::<Arc<Alpha>>(), names_of(&[0])),
            (TypeDescriptor::of::<Arc<Beta>>(), names_of(&[1])),
            (TypeDescriptor::of::<Arc<Gamma>>(), names_of(&[2])),
            (TypeDescriptor::of::<Arc<dyn Named>>(), names_of(&[0, 1])),
            (TypeDescriptor::of::<Alpha>(), names_of(&[0])),
        ];

        for (target, expected) in cases {
            let mut actual = registry.definition_names_by_type(&target);
            actual.sort();
            prop_assert_eq!(actual, expected, "target {}", target);
        }
    }

    #[test]
    fn prop_cycles_are_detected(len in 1usize..8, start in 0usize..8) {
        let container = Container::empty();
        for i in 0..len {
            container
                .register(
                    |next: Arc<Node>| Arc::new(Node { _next: next }),
                    [with_name(format!("n{}", i)), qualifier_at(0, format!("n{}", (i + 1) % len))],
                )
                .unwrap();
        }

        let entry = format!("n{}", start % len);
        match container.get(&entry) {
            Err(ContainerError::Circular { chain, .. }) => {
                prop_assert_eq!(chain.len(), len + 1);
                prop_assert_eq!(chain.first(), chain.last());
            }
            other => prop_assert!(false, "expected Circular, got {:?}", other),
        }
        prop_assert!(container.shared_instances().under_construction().is_empty());
        prop_assert_eq!(container.shared_instances().count(), 0);
    }

    #[test]
    fn prop_hooks_keep_insertion_order(pre in 0usize..6, post in 0usize..6) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let container = Container::empty();
        container.register(|| Arc::new(Gamma), []).unwrap();

        for i in 0..pre {
            let log = log.clone();
            container
                .register_pre_init(move |_, instance| {
                    log.lock().push(format!("pre{}", i));
                    Ok(instance)
                })
                .unwrap();
        }
        for i in 0..post {
            let log = log.clone();
            container
                .register_post_init(move |_, instance| {
                    log.lock().push(format!("post{}", i));
                    Ok(instance)
                })
                .unwrap();
        }

        container.get("gamma").unwrap();

        let expected: Vec<String> = (0..pre)
            .map(|i| format!("pre{}", i))
            .chain((0..post).map(|i| format!("post{}", i)))
            .collect();
        prop_assert_eq!(&*log.lock(), &expected);
    }

    #[test]
    fn prop_optional_inputs_fall_back(present in prop::array::uniform3(any::<bool>())) {
        let built = Arc::new(AtomicUsize::new(0));
        let container = Container::empty();

        for (i, registered) in present.iter().enumerate() {
            if *registered {
                container
                    .register(|| Arc::new(Leaf), [with_name(format!("leaf{}", i))])
                    .unwrap();
            }
        }

        let counter = built.clone();
        container
            .register(
                move |a: Option<Arc<Leaf>>, b: Option<Arc<Leaf>>, c: Option<Arc<Leaf>>| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Arc::new(Composite {
                        present: [a.is_some(), b.is_some(), c.is_some()],
                    })
                },
                [
                    qualifier_at(0, "leaf0"),
                    qualifier_at(1, "leaf1"),
                    qualifier_at(2, "leaf2"),
                    optional_at(0),
                    optional_at(1),
                    optional_at(2),
                ],
            )
            .unwrap();

        let composite: Arc<Composite> = container.resolve_named("composite").unwrap();
        prop_assert_eq!(composite.present, present);
        prop_assert_eq!(built.load(Ordering::SeqCst), 1);
    }
}
