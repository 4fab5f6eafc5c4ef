//! Module discovery, interface selection and container maintenance operations.
use ferrous_container::{
    Arguments, Autowire, BoxError, DiError, DiResult, Parameter, Resolver, ServiceContainer,
    ServiceDefinition, ServiceManifest, ServiceModule, Settings, TypeCatalog, TypeHandle,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

trait Notifier: Send + Sync {
    fn channel(&self) -> &'static str;
}

struct EmailNotifier;
struct SmsNotifier;

impl Notifier for EmailNotifier {
    fn channel(&self) -> &'static str {
        "email"
    }
}

impl Notifier for SmsNotifier {
    fn channel(&self) -> &'static str {
        "sms"
    }
}

fn email() -> TypeHandle {
    TypeHandle::builder::<EmailNotifier>()
        .constructor(vec![], |_| Ok(EmailNotifier))
        .implements::<dyn Notifier, _>(|n| n as Arc<dyn Notifier>)
        .build()
}

fn sms() -> TypeHandle {
    TypeHandle::builder::<SmsNotifier>()
        .constructor(vec![], |_| Ok(SmsNotifier))
        .implements::<dyn Notifier, _>(|n| n as Arc<dyn Notifier>)
        .build()
}

struct Clock;

impl Autowire for Clock {
    fn construct(_: &Arguments) -> Result<Self, BoxError> {
        Ok(Clock)
    }
}

fn boot(modules: Vec<ServiceManifest>) -> ServiceContainer {
    modules
        .into_iter()
        .fold(ServiceContainer::builder(Settings::without_cache()), |b, m| b.module(m))
        .build()
        .unwrap()
}

#[test]
fn test_single_implementation_selected() {
    let c = boot(vec![ServiceManifest::new("notify").service(ServiceDefinition::new(email()))]);
    assert_eq!(c.get_trait::<dyn Notifier>().unwrap().channel(), "email");
}

#[test]
fn test_multiple_implementations_are_ambiguous() {
    let c = boot(vec![ServiceManifest::new("notify")
        .service(ServiceDefinition::new(email()))
        .service(ServiceDefinition::new(sms()))]);

    match c.get_trait::<dyn Notifier>() {
        Err(DiError::AmbiguousDependency { candidates, .. }) => assert_eq!(candidates.len(), 2),
        other => panic!("unexpected: {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_primary_breaks_tie() {
    let c = boot(vec![ServiceManifest::new("notify")
        .service(ServiceDefinition::new(email()))
        .service(ServiceDefinition::new(sms()).with_primary(true).unwrap())]);

    let first = c.get_trait::<dyn Notifier>().unwrap();
    assert_eq!(first.channel(), "sms");
    assert_eq!(c.get_stats().resolution_cache_entries, 1);

    let concrete = c.get::<SmsNotifier>().unwrap();
    let again = c.get_trait::<dyn Notifier>().unwrap();
    assert!(Arc::ptr_eq(&first, &again));
    assert_eq!(
        Arc::as_ptr(&concrete) as *const u8,
        Arc::as_ptr(&again) as *const () as *const u8
    );
}

#[test]
fn test_tagged_interface_views() {
    let c = boot(vec![ServiceManifest::new("notify")
        .service(ServiceDefinition::new(email()).with_tag("notifier").unwrap())
        .service(ServiceDefinition::new(sms()).with_tag("notifier").unwrap())
        .service(ServiceDefinition::interface::<dyn Notifier>().with_tag("notifier").unwrap())]);

    let channels: Vec<_> = c
        .get_tagged::<dyn Notifier>("notifier")
        .unwrap()
        .iter()
        .map(|n| n.channel())
        .collect();
    assert_eq!(channels, vec!["email", "sms"]);
    assert!(c.get_all_by_tag("missing").unwrap().is_empty());
}

#[test]
fn test_failing_module_skipped() {
    struct Broken;

    impl ServiceModule for Broken {
        fn name(&self) -> &str {
            "broken"
        }
        fn register_types(&self, _: &mut TypeCatalog) {}
        fn discover(&self) -> DiResult<Vec<ServiceDefinition>> {
            Err(DiError::InvalidServiceDefinition("syntax error".into()))
        }
    }

    let c = ServiceContainer::builder(Settings::without_cache())
        .module(Broken)
        .module(ServiceManifest::new("core").service(ServiceDefinition::of::<Clock>()))
        .build()
        .unwrap();

    assert_eq!(c.scanned_modules(), vec!["core".to_string()]);
    assert!(c.get::<Clock>().is_ok());
    assert_eq!(c.definition("Clock").unwrap().module(), Some("core"));
}

/// Fails its first discovery, then succeeds.
struct Recovering {
    failed_once: AtomicBool,
    scans: Arc<AtomicUsize>,
}

impl Recovering {
    fn new(scans: &Arc<AtomicUsize>) -> Self {
        Self { failed_once: AtomicBool::new(false), scans: Arc::clone(scans) }
    }
}

impl ServiceModule for Recovering {
    fn name(&self) -> &str {
        "late"
    }

    fn register_types(&self, catalog: &mut TypeCatalog) {
        catalog.add::<Clock>();
    }

    fn discover(&self) -> DiResult<Vec<ServiceDefinition>> {
        self.scans.fetch_add(1, Ordering::SeqCst);
        if !self.failed_once.swap(true, Ordering::SeqCst) {
            return Err(DiError::InvalidServiceDefinition("not ready".into()));
        }
        Ok(vec![ServiceDefinition::of::<Clock>().with_tag("time")?])
    }
}

#[test]
fn test_auto_discovery_after_reset() {
    let scans = Arc::new(AtomicUsize::new(0));
    let c = ServiceContainer::builder(Settings::without_cache())
        .module(Recovering::new(&scans))
        .build()
        .unwrap();

    assert!(matches!(c.get::<Clock>(), Err(DiError::ServiceNotFound(_))));
    assert_eq!(scans.load(Ordering::SeqCst), 1);

    c.reset_scanned_modules();
    assert!(c.get::<Clock>().is_ok());
    assert_eq!(scans.load(Ordering::SeqCst), 2);
    assert_eq!(c.scanned_modules(), vec!["late".to_string()]);

    // Nothing pending anymore, so further misses do not rescan.
    assert!(c.get::<EmailNotifier>().is_err());
    assert_eq!(scans.load(Ordering::SeqCst), 2);
}

#[test]
fn test_tag_lookup_triggers_discovery() {
    let scans = Arc::new(AtomicUsize::new(0));
    let c = ServiceContainer::builder(Settings::without_cache())
        .module(Recovering::new(&scans))
        .build()
        .unwrap();

    c.cleanup_memory();
    assert_eq!(c.get_all_by_tag("time").unwrap().len(), 1);
}

#[test]
fn test_frozen_registry_disables_discovery() {
    let scans = Arc::new(AtomicUsize::new(0));
    let c = ServiceContainer::builder(Settings {
        freeze_after_boot: true,
        ..Settings::without_cache()
    })
    .module(Recovering::new(&scans))
    .build()
    .unwrap();

    assert!(c.is_frozen());
    c.reset_scanned_modules();
    assert!(c.get::<Clock>().is_err());
    assert_eq!(scans.load(Ordering::SeqCst), 1);
}

#[test]
fn test_force_complete_scan_keeps_manual_and_instances() {
    let c = ServiceContainer::builder(Settings::without_cache())
        .module(ServiceManifest::new("core").service(ServiceDefinition::of::<Clock>()))
        .register(ServiceDefinition::new(email()))
        .build()
        .unwrap();

    let clock = c.get::<Clock>().unwrap();
    assert_eq!(c.force_complete_scan(), 2);
    assert!(Arc::ptr_eq(&clock, &c.get::<Clock>().unwrap()));
    assert!(c.get::<EmailNotifier>().is_ok());
    assert_eq!(c.scanned_modules(), vec!["core".to_string()]);
}

#[test]
fn test_clear_instances_rebuilds_but_keeps_set_values() {
    struct Request(u32);
    let c = boot(vec![ServiceManifest::new("core").service(ServiceDefinition::of::<Clock>())]);

    let before = c.get::<Clock>().unwrap();
    c.set(Arc::new(Request(3))).unwrap();
    assert_eq!(c.clear_instances(), 1);

    let after = c.get::<Clock>().unwrap();
    assert!(!Arc::ptr_eq(&before, &after));
    assert_eq!(c.get::<Request>().unwrap().0, 3);
}

#[test]
fn test_stats_and_describe() {
    let c = boot(vec![ServiceManifest::new("core")
        .service(ServiceDefinition::of::<Clock>().with_alias("clock").unwrap())
        .service(ServiceDefinition::new(email()).with_tag("notifier").unwrap())
        .service(ServiceDefinition::new(sms()).with_public(false).unwrap())]);

    c.get::<Clock>().unwrap();
    let stats = c.get_stats();
    assert_eq!(stats.total_definitions, 3);
    assert_eq!(stats.public_definitions, 2);
    assert_eq!(stats.instances, 1);
    assert_eq!(stats.tags, 1);
    assert_eq!(stats.scanned_modules, 1);

    let report = c.describe("clock").unwrap();
    assert_eq!(report.short_name, "Clock");
    assert!(report.instantiated);
    assert_eq!(report.module.as_deref(), Some("core"));

    let notifier = c.describe("EmailNotifier").unwrap();
    assert!(!notifier.instantiated);
    assert_eq!(notifier.interfaces.len(), 1);
    assert!(notifier.to_string().contains("tags:         notifier"));

    assert!(c.describe("SmsNotifier").is_some());
    assert!(c.describe("Nope").is_none());
}

#[test]
fn test_with_registry_exposes_definitions() {
    let c = boot(vec![
        ServiceManifest::new("core").service(ServiceDefinition::of::<Clock>()),
        ServiceManifest::new("notify").service(ServiceDefinition::new(email())),
    ]);
    let modules: Vec<_> = c.with_registry(|r| {
        r.definitions().filter_map(|d| d.module().map(str::to_string)).collect()
    });
    assert_eq!(modules, vec!["core", "notify"]);
}

struct Dispatcher(Arc<dyn Notifier>);

struct NullNotifier;

impl Notifier for NullNotifier {
    fn channel(&self) -> &'static str {
        "null"
    }
}

fn dispatcher(fallback: bool) -> TypeHandle {
    let mut notifier = Parameter::of_trait::<dyn Notifier>("notifier");
    if fallback {
        notifier = notifier.with_default_trait(|| Arc::new(NullNotifier) as Arc<dyn Notifier>);
    }
    TypeHandle::builder::<Dispatcher>()
        .constructor(vec![notifier], |args| {
            Ok(Dispatcher(args.get_trait::<dyn Notifier>("notifier")?))
        })
        .build()
}

#[test]
fn test_interface_without_implementation_uses_parameter_default() {
    let c = boot(vec![ServiceManifest::new("notify")
        .service(ServiceDefinition::interface::<dyn Notifier>().with_tag("notifier").unwrap())
        .service(ServiceDefinition::new(dispatcher(true)))]);
    assert_eq!(c.get::<Dispatcher>().unwrap().0.channel(), "null");

    let c = boot(vec![ServiceManifest::new("notify")
        .service(ServiceDefinition::interface::<dyn Notifier>())
        .service(ServiceDefinition::new(dispatcher(false)))]);
    match c.get::<Dispatcher>() {
        Err(DiError::UnresolvableDependency { parameter, .. }) => assert_eq!(parameter, "notifier"),
        other => panic!("unexpected: {:?}", other.map(|_| ())),
    }
    assert!(matches!(
        c.get_trait::<dyn Notifier>(),
        Err(DiError::AbstractInstantiation(_))
    ));
}

#[test]
fn test_interface_implementation_wins_over_default() {
    let c = boot(vec![ServiceManifest::new("notify")
        .service(ServiceDefinition::interface::<dyn Notifier>())
        .service(ServiceDefinition::new(sms()))
        .service(ServiceDefinition::new(dispatcher(true)))]);
    assert_eq!(c.get::<Dispatcher>().unwrap().0.channel(), "sms");
}

#[test]
fn test_get_by_name_on_interface_selects_implementation() {
    let c = boot(vec![ServiceManifest::new("notify")
        .service(ServiceDefinition::interface::<dyn Notifier>())
        .service(ServiceDefinition::new(email()))]);

    let by_name = c
        .get_by_name("Notifier")
        .unwrap()
        .downcast::<Arc<dyn Notifier>>()
        .map(|view| Arc::clone(&*view))
        .unwrap_or_else(|_| panic!("Notifier is not a trait view"));
    let by_trait = c.get_trait::<dyn Notifier>().unwrap();
    assert_eq!(by_name.channel(), "email");
    assert!(Arc::ptr_eq(&by_name, &by_trait));
}

#[test]
fn test_cleanup_memory_keeps_instances() {
    let c = boot(vec![
        ServiceManifest::new("notify").service(ServiceDefinition::new(email())),
        ServiceManifest::new("core").service(ServiceDefinition::of::<Clock>()),
    ]);
    let clock = c.get::<Clock>().unwrap();
    let notifier = c.get_trait::<dyn Notifier>().unwrap();

    let before = c.get_stats();
    assert_eq!(before.resolution_cache_entries, 1);
    assert_eq!(before.scanned_modules, 2);

    c.cleanup_memory();
    let after = c.get_stats();
    assert_eq!(after.resolution_cache_entries, 0);
    assert_eq!(after.scanned_modules, 0);
    assert_eq!(after.instances, before.instances);
    assert_eq!(after.total_definitions, before.total_definitions);

    assert!(Arc::ptr_eq(&clock, &c.get::<Clock>().unwrap()));
    assert!(Arc::ptr_eq(&notifier, &c.get_trait::<dyn Notifier>().unwrap()));
}
