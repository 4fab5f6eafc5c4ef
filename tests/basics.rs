use ferrous_container::{
    Argument, Arguments, Autowire, BoxError, DiError, MethodCall, Parameter, Resolver,
    ServiceContainer, ServiceDefinition, Settings, TypeHandle,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

struct Logger {
    lines: Mutex<Vec<String>>,
}

impl Autowire for Logger {
    fn construct(_: &Arguments) -> Result<Self, BoxError> {
        Ok(Logger { lines: Mutex::new(Vec::new()) })
    }
}

struct Service {
    logger: Arc<Logger>,
}

impl Autowire for Service {
    fn parameters() -> Vec<Parameter> {
        vec![Parameter::of::<Logger>("logger")]
    }

    fn construct(args: &Arguments) -> Result<Self, BoxError> {
        let logger: Arc<Logger> = args.get("logger")?;
        logger.lines.lock().unwrap().push("service built".into());
        Ok(Service { logger })
    }
}

fn container(definitions: Vec<ServiceDefinition>) -> ServiceContainer {
    definitions
        .into_iter()
        .fold(ServiceContainer::builder(Settings::without_cache()), |b, d| b.register(d))
        .build()
        .unwrap()
}

#[test]
fn test_dependency_built_first_and_shared() {
    let c = container(vec![ServiceDefinition::of::<Logger>(), ServiceDefinition::of::<Service>()]);

    let service = c.get::<Service>().unwrap();
    let logger = c.get::<Logger>().unwrap();

    assert!(Arc::ptr_eq(&service.logger, &logger));
    assert_eq!(logger.lines.lock().unwrap().as_slice(), ["service built"]);
}

#[test]
fn test_singleton_identity_across_other_resolutions() {
    let c = container(vec![ServiceDefinition::of::<Logger>(), ServiceDefinition::of::<Service>()]);

    let first = c.get::<Service>().unwrap();
    let _ = c.get::<Logger>().unwrap();
    let second = c.get::<Service>().unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(c.get_stats().instances, 2);
}

#[test]
fn test_get_by_name_full_and_short() {
    let c = container(vec![ServiceDefinition::of::<Logger>()]);

    let by_short = c.get_by_name_as::<Logger>("Logger").unwrap();
    let by_path = c.get_by_name_as::<Logger>(std::any::type_name::<Logger>()).unwrap();
    assert!(Arc::ptr_eq(&by_short, &by_path));

    assert!(matches!(c.get_by_name("logger"), Err(DiError::ServiceNotFound(_))));
    assert!(matches!(c.get_by_name_as::<Service>("Logger"), Err(DiError::TypeMismatch(_))));
}

#[test]
fn test_alias_lookup() {
    let c = container(vec![ServiceDefinition::of::<Logger>().with_alias("app.logger").unwrap()]);
    assert!(c.has("app.logger"));
    assert!(c.get_by_name("app.logger").is_ok());
}

#[test]
fn test_private_service_hidden_by_name_but_injectable() {
    let c = container(vec![
        ServiceDefinition::of::<Logger>().with_public(false).unwrap(),
        ServiceDefinition::of::<Service>(),
    ]);

    assert!(!c.has("Logger"));
    assert!(matches!(c.get_by_name("Logger"), Err(DiError::ServiceNotFound(_))));
    assert!(c.definition("Logger").is_some());
    assert!(c.get::<Service>().is_ok());
}

#[test]
fn test_missing_service() {
    let c = container(vec![]);
    match c.get::<Logger>() {
        Err(DiError::ServiceNotFound(name)) => assert_eq!(name, std::any::type_name::<Logger>()),
        other => panic!("unexpected: {:?}", other.map(|_| ())),
    }
    assert!(c.get_optional::<Logger>().unwrap().is_none());
}

#[test]
fn test_unresolvable_dependency_names_parameter() {
    let c = container(vec![ServiceDefinition::of::<Service>()]);
    match c.get::<Service>() {
        Err(DiError::UnresolvableDependency { service, parameter, expected }) => {
            assert_eq!(service, std::any::type_name::<Service>());
            assert_eq!(parameter, "logger");
            assert_eq!(expected, std::any::type_name::<Logger>());
        }
        other => panic!("unexpected: {:?}", other.map(|_| ())),
    }
    assert_eq!(c.get_stats().instances, 0);
}

struct Pager {
    size: Arc<usize>,
}

impl Autowire for Pager {
    fn parameters() -> Vec<Parameter> {
        vec![Parameter::optional("size", || 25usize)]
    }

    fn construct(args: &Arguments) -> Result<Self, BoxError> {
        Ok(Pager { size: args.get("size")? })
    }
}

#[test]
fn test_default_used_when_type_unregistered() {
    let c = container(vec![ServiceDefinition::of::<Pager>()]);
    assert_eq!(*c.get::<Pager>().unwrap().size, 25);
}

#[test]
fn test_registered_service_beats_default() {
    let c = ServiceContainer::builder(Settings::without_cache())
        .instance(Arc::new(100usize))
        .register(ServiceDefinition::of::<Pager>())
        .build()
        .unwrap();
    assert_eq!(*c.get::<Pager>().unwrap().size, 100);
}

#[test]
fn test_explicit_argument_overrides_autowiring() {
    let c = ServiceContainer::builder(Settings::without_cache())
        .instance(Arc::new(100usize))
        .register(
            ServiceDefinition::of::<Pager>()
                .with_arguments(vec![Argument::value(7usize)])
                .unwrap(),
        )
        .build()
        .unwrap();
    assert_eq!(*c.get::<Pager>().unwrap().size, 7);
}

#[test]
fn test_autowire_disabled_falls_back_to_default() {
    let c = ServiceContainer::builder(Settings::without_cache())
        .instance(Arc::new(100usize))
        .register(ServiceDefinition::of::<Pager>().with_autowire(false).unwrap())
        .build()
        .unwrap();
    assert_eq!(*c.get::<Pager>().unwrap().size, 25);
}

#[test]
fn test_service_reference_argument() {
    struct Audit;
    let audit = ServiceDefinition::new(
        TypeHandle::builder::<Audit>().constructor(vec![], |_| Ok(Audit)).build(),
    )
    .with_alias("audit")
    .unwrap();

    struct Holder {
        audit: Arc<Audit>,
    }
    let holder = ServiceDefinition::new(
        TypeHandle::builder::<Holder>()
            .constructor(vec![Parameter::of::<Audit>("audit")], |args| {
                Ok(Holder { audit: args.get("audit")? })
            })
            .build(),
    )
    .with_arguments(vec![Argument::service("audit")])
    .unwrap();

    let c = container(vec![audit, holder]);
    let holder = c.get::<Holder>().unwrap();
    assert!(Arc::ptr_eq(&holder.audit, &c.get::<Audit>().unwrap()));
}

#[test]
fn test_method_calls_run_in_order() {
    struct Pipeline {
        steps: Mutex<Vec<String>>,
    }
    let push = |step: &'static str| {
        MethodCall::new::<Pipeline, _>("push", vec![Argument::value(step.to_string())], |p, args| {
            p.steps.lock().unwrap().push(args.at::<String>(0)?.to_string());
            Ok(())
        })
    };
    let definition = ServiceDefinition::new(
        TypeHandle::builder::<Pipeline>()
            .constructor(vec![], |_| Ok(Pipeline { steps: Mutex::new(vec![]) }))
            .build(),
    )
    .with_method_call(push("parse"))
    .and_then(|d| d.with_method_call(push("check")))
    .unwrap();

    let c = container(vec![definition]);
    let pipeline = c.get::<Pipeline>().unwrap();
    assert_eq!(pipeline.steps.lock().unwrap().as_slice(), ["parse", "check"]);
}

#[test]
fn test_method_call_without_argument_value_fails() {
    struct Target;
    let definition = ServiceDefinition::new(
        TypeHandle::builder::<Target>().constructor(vec![], |_| Ok(Target)).build(),
    )
    .with_method_call(MethodCall::new::<Target, _>("init", vec![Argument::Autowired], |_, _| Ok(())))
    .unwrap();

    let c = container(vec![definition]);
    assert!(matches!(c.get::<Target>(), Err(DiError::UnresolvableDependency { .. })));
}

#[test]
fn test_factory_resolves_dependencies() {
    static CALLS: AtomicUsize = AtomicUsize::new(0);

    struct Report {
        logger: Arc<Logger>,
    }
    let report = ServiceDefinition::new(TypeHandle::external::<Report>())
        .with_factory::<Report, _>(|r| {
            CALLS.fetch_add(1, Ordering::SeqCst);
            Ok(Report { logger: r.get::<Logger>()? })
        })
        .unwrap();

    let c = container(vec![ServiceDefinition::of::<Logger>(), report]);
    let first = c.get::<Report>().unwrap();
    let second = c.get::<Report>().unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert!(Arc::ptr_eq(&first.logger, &c.get::<Logger>().unwrap()));
    assert_eq!(CALLS.load(Ordering::SeqCst), 1);
}

#[test]
fn test_factory_error_is_wrapped() {
    struct Flaky;
    let flaky = ServiceDefinition::new(TypeHandle::external::<Flaky>())
        .with_factory::<Flaky, _>(|_| Err("connection refused".into()))
        .unwrap();

    let c = container(vec![flaky]);
    match c.get::<Flaky>() {
        Err(DiError::ServiceInstantiationFailed { service, source }) => {
            assert_eq!(service, std::any::type_name::<Flaky>());
            assert_eq!(source.to_string(), "connection refused");
        }
        other => panic!("unexpected: {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_factory_resolution_error_keeps_kind() {
    struct Needy;
    let needy = ServiceDefinition::new(TypeHandle::external::<Needy>())
        .with_factory::<Needy, _>(|r| {
            r.get::<Logger>()?;
            Ok(Needy)
        })
        .unwrap();

    let c = container(vec![needy]);
    assert!(matches!(c.get::<Needy>(), Err(DiError::ServiceNotFound(_))));
}

#[test]
fn test_synthetic_requires_set() {
    struct Request(u32);
    let c = container(vec![ServiceDefinition::synthetic_of::<Request>()]);

    assert!(matches!(c.get::<Request>(), Err(DiError::ServiceInstantiationFailed { .. })));

    c.set(Arc::new(Request(7))).unwrap();
    assert_eq!(c.get::<Request>().unwrap().0, 7);
}

#[test]
fn test_set_registers_synthetic_definition() {
    struct Clock(u64);
    let c = container(vec![]);
    c.set(Arc::new(Clock(42))).unwrap();

    let definition = c.definition("Clock").unwrap();
    assert!(definition.is_synthetic());
    assert_eq!(c.get_by_name_as::<Clock>("Clock").unwrap().0, 42);
}

#[test]
fn test_abstract_definition_not_instantiated() {
    trait Repository: Send + Sync {}
    let c = container(vec![ServiceDefinition::interface::<dyn Repository>()]);

    match c.get_trait::<dyn Repository>() {
        Err(DiError::AbstractInstantiation(name)) => assert!(name.contains("Repository")),
        other => panic!("unexpected: {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_frozen_registry_rejects_register() {
    let c = container(vec![]);
    c.freeze_registry();
    assert!(matches!(
        c.register(ServiceDefinition::of::<Logger>()),
        Err(DiError::RegistryFrozen(_))
    ));
}

#[test]
fn test_duplicate_manual_registration_fails_build() {
    let result = ServiceContainer::builder(Settings::without_cache())
        .register(ServiceDefinition::of::<Logger>())
        .register(ServiceDefinition::of::<Logger>())
        .build();
    assert!(matches!(result, Err(DiError::DuplicateService(_))));
}
