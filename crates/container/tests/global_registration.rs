//! Global Registration Table: регистрация до создания контейнера, снапшоты,
//! conditions и fail-fast на конфигурационных ошибках.
//!
//! Таблица общая для процесса, поэтому каждый тест использует свои имена.

use std::sync::Arc;

use container::{
    global, on_profile, on_property, optional_at, qualifier_at, with_name, Component, Container,
    ContainerError, StaticEnvironment,
};

struct Clock;
impl Component for Clock {}

struct Scheduler {
    clock: Arc<Clock>,
}
impl Component for Scheduler {}

struct Mailer;
impl Component for Mailer {}

#[test]
fn test_new_container_sees_global_definitions() {
    common::init_test_logging();

    let clock = global::register(|| Arc::new(Clock), [with_name("globalClock")]);
    let scheduler = global::register(
        |clock: Arc<Clock>| Arc::new(Scheduler { clock }),
        [with_name("globalScheduler"), qualifier_at(0, "globalClock")],
    );
    assert_eq!(clock, "globalClock");
    assert!(global::global().contains(&scheduler));

    let container = Container::new();
    let scheduler: Arc<Scheduler> = container.resolve_named("globalScheduler").unwrap();
    let clock: Arc<Clock> = container.resolve_named("globalClock").unwrap();
    assert!(Arc::ptr_eq(&scheduler.clock, &clock));

    // у второго контейнера свои shared экземпляры
    let other = Container::new();
    let other_clock: Arc<Clock> = other.resolve_named("globalClock").unwrap();
    assert!(!Arc::ptr_eq(&clock, &other_clock));
}

#[test]
fn test_snapshot_is_taken_at_creation() {
    let container = Container::new();
    global::register(|| Arc::new(Clock), [with_name("lateClock")]);

    assert!(!container.definition_registry().contains("lateClock"));
    assert!(Container::new().definition_registry().contains("lateClock"));
    assert!(!Container::empty().definition_registry().contains("lateClock"));
}

#[test]
fn test_try_register_reports_duplicates() {
    global::try_register(|| Arc::new(Mailer), [with_name("duplicateMailer")]).unwrap();

    let result = global::try_register(|| Arc::new(Mailer), [with_name("duplicateMailer")]);
    assert!(matches!(result, Err(ContainerError::DuplicateName { .. })));

    let result = global::try_register(
        |clock: Arc<Clock>| Arc::new(Scheduler { clock }),
        [with_name("brokenScheduler"), optional_at(1)],
    );
    match result {
        Err(error @ ContainerError::InvalidOption { .. }) => {
            assert!(error.is_configuration_error());
            assert_eq!(error.category(), "registration");
        }
        other => panic!("expected InvalidOption, got {:?}", other),
    }
    assert!(!global::global().contains("brokenScheduler"));
}

#[test]
#[should_panic(expected = "global registration failed")]
fn test_register_panics_on_duplicate_name() {
    global::register(|| Arc::new(Mailer), [with_name("panickyMailer")]);
    global::register(|| Arc::new(Mailer), [with_name("panickyMailer")]);
}

#[test]
fn test_conditions_filter_global_definitions() {
    global::register(
        || Arc::new(Mailer),
        [with_name("smtpMailer"), on_profile("production")],
    );
    global::register(
        || Arc::new(Mailer),
        [with_name("logMailer"), on_property("mail.transport", "log")],
    );

    let production = Container::builder()
        .environment(StaticEnvironment::new().with_profile("production"))
        .build()
        .unwrap();
    assert!(production.definition_registry().contains("smtpMailer"));
    assert!(!production.definition_registry().contains("logMailer"));

    let local = Container::builder()
        .environment(StaticEnvironment::new().with_property("mail.transport", "log"))
        .build()
        .unwrap();
    assert!(!local.definition_registry().contains("smtpMailer"));
    assert!(local.definition_registry().contains("logMailer"));

    // Container::new использует пустой environment
    let plain = Container::new();
    assert!(!plain.definition_registry().contains("smtpMailer"));
    assert!(!plain.definition_registry().contains("logMailer"));
}
