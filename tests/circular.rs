use ferrous_container::{
    render_error, Arguments, Autowire, BoxError, DiError, Parameter, Resolver, ServiceContainer,
    ServiceDefinition, Settings, TypeHandle,
};
use std::sync::Arc;

struct A {
    _b: Arc<B>,
}
struct B {
    _c: Arc<C>,
}
struct C {
    _a: Arc<A>,
}

impl Autowire for A {
    fn parameters() -> Vec<Parameter> {
        vec![Parameter::of::<B>("b")]
    }
    fn construct(args: &Arguments) -> Result<Self, BoxError> {
        Ok(A { _b: args.get("b")? })
    }
}

impl Autowire for B {
    fn parameters() -> Vec<Parameter> {
        vec![Parameter::of::<C>("c")]
    }
    fn construct(args: &Arguments) -> Result<Self, BoxError> {
        Ok(B { _c: args.get("c")? })
    }
}

impl Autowire for C {
    fn parameters() -> Vec<Parameter> {
        vec![Parameter::of::<A>("a")]
    }
    fn construct(args: &Arguments) -> Result<Self, BoxError> {
        Ok(C { _a: args.get("a")? })
    }
}

fn name<T>() -> &'static str {
    std::any::type_name::<T>()
}

fn build(definitions: Vec<ServiceDefinition>) -> ServiceContainer {
    definitions
        .into_iter()
        .fold(ServiceContainer::builder(Settings::without_cache()), |b, d| b.register(d))
        .build()
        .unwrap()
}

#[test]
fn test_three_step_cycle_reports_chain() {
    let c = build(vec![
        ServiceDefinition::of::<A>(),
        ServiceDefinition::of::<B>(),
        ServiceDefinition::of::<C>(),
    ]);

    match c.get::<A>() {
        Err(DiError::CircularDependencyDetected { chain }) => {
            assert_eq!(&chain[..3], &[name::<A>(), name::<B>(), name::<C>()]);
            assert_eq!(chain.last(), Some(&name::<A>()));
        }
        other => panic!("expected circular dependency, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_cycle_entered_midway() {
    let c = build(vec![
        ServiceDefinition::of::<A>(),
        ServiceDefinition::of::<B>(),
        ServiceDefinition::of::<C>(),
    ]);

    let err = c.get::<B>().err().expect("cycle");
    assert_eq!(err.chain(), Some(&[name::<B>(), name::<C>(), name::<A>(), name::<B>()][..]));
}

#[test]
fn test_two_way_cycle_contains_both() {
    struct Left;
    struct Right;

    let left = TypeHandle::builder::<Left>()
        .constructor(vec![Parameter::of::<Right>("right")], |args| {
            args.get::<Right>("right")?;
            Ok(Left)
        })
        .build();
    let right = TypeHandle::builder::<Right>()
        .constructor(vec![Parameter::of::<Left>("left")], |args| {
            args.get::<Left>("left")?;
            Ok(Right)
        })
        .build();

    let c = build(vec![ServiceDefinition::new(left), ServiceDefinition::new(right)]);
    let err = c.get::<Left>().err().expect("cycle");
    let chain = err.chain().expect("chain");
    assert!(chain.contains(&name::<Left>()));
    assert!(chain.contains(&name::<Right>()));
}

#[test]
fn test_self_reference_through_factory() {
    struct Narcissus;
    let definition = ServiceDefinition::new(TypeHandle::external::<Narcissus>())
        .with_factory::<Narcissus, _>(|r| {
            r.get::<Narcissus>()?;
            Ok(Narcissus)
        })
        .unwrap();

    let c = build(vec![definition]);
    let err = c.get::<Narcissus>().err().expect("cycle");
    assert_eq!(err.chain(), Some(&[name::<Narcissus>(), name::<Narcissus>()][..]));
}

#[test]
fn test_stack_unwound_after_failure() {
    struct Standalone;
    let c = build(vec![
        ServiceDefinition::of::<A>(),
        ServiceDefinition::of::<B>(),
        ServiceDefinition::of::<C>(),
        ServiceDefinition::new(
            TypeHandle::builder::<Standalone>().constructor(vec![], |_| Ok(Standalone)).build(),
        ),
    ]);

    assert!(c.get::<A>().is_err());
    // A second attempt reports the same cycle rather than a stale one.
    let err = c.get::<A>().err().expect("cycle");
    assert_eq!(err.chain().map(<[_]>::len), Some(4));
    assert!(c.get::<Standalone>().is_ok());
}

#[test]
fn test_cycle_rendering_lists_short_names() {
    let c = build(vec![
        ServiceDefinition::of::<A>(),
        ServiceDefinition::of::<B>(),
        ServiceDefinition::of::<C>(),
    ]);
    let err = c.get::<A>().err().expect("cycle");
    let text = render_error(&err);
    assert!(text.contains("A -> B -> C -> A"), "{text}");
}
