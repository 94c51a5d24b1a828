use std::sync::{Arc, LazyLock};

use weld::{
    Container, Dependencies, Dependency, InjectError, Injectable, InjectionToken, Module, Provider,
    Resolved, Scope, StdError, Testing, Token,
};

trait Weapon: Send + Sync {
    fn name(&self) -> &'static str;
}

static WEAPON: LazyLock<InjectionToken<Arc<dyn Weapon>>> =
    LazyLock::new(|| InjectionToken::new("WEAPON"));

struct Katana;

impl Injectable for Katana {
    fn construct(_resolved: &Resolved) -> Result<Self, StdError> {
        Ok(Self)
    }
}

impl Weapon for Katana {
    fn name(&self) -> &'static str {
        "katana"
    }
}

struct Shuriken;

impl Injectable for Shuriken {
    fn construct(_resolved: &Resolved) -> Result<Self, StdError> {
        Ok(Self)
    }
}

impl Weapon for Shuriken {
    fn name(&self) -> &'static str {
        "shuriken"
    }
}

struct Ninja {
    weapons: Vec<Arc<dyn Weapon>>,
}

impl Injectable for Ninja {
    fn dependencies() -> Dependencies {
        Dependencies::new().multi_inject(&*WEAPON)
    }

    fn construct(resolved: &Resolved) -> Result<Self, StdError> {
        Ok(Self {
            weapons: resolved.get_all(0)?,
        })
    }
}

fn weapons() -> [Provider; 2] {
    [
        Provider::provide(&*WEAPON)
            .use_class_as(|v: Arc<Katana>| -> Arc<dyn Weapon> { v })
            .multi(),
        Provider::provide(&*WEAPON)
            .use_class_as(|v: Arc<Shuriken>| -> Arc<dyn Weapon> { v })
            .multi(),
    ]
}

#[tokio::test]
async fn test_ninja_weapons() {
    let container = Testing::create()
        .providers(weapons())
        .provider(Provider::class::<Ninja>())
        .compile()
        .await
        .unwrap();
    let weapons = container.get_all(&*WEAPON).await.unwrap();
    let names: Vec<_> = weapons.iter().map(|v| v.name()).collect();
    assert_eq!(names, vec!["katana", "shuriken"]);
    let ninja = container.get_class::<Ninja>().await.unwrap();
    assert_eq!(ninja.weapons.len(), weapons.len());
    for (left, right) in ninja.weapons.iter().zip(&weapons) {
        assert!(std::ptr::addr_eq(Arc::as_ptr(left), Arc::as_ptr(right)));
    }
}

#[tokio::test]
async fn test_multi_get_single() {
    let container = Testing::create()
        .providers(weapons())
        .compile()
        .await
        .unwrap();
    assert!(matches!(
        container.get(&*WEAPON).await,
        Err(InjectError::MultiBindingMismatch { multi: true, .. })
    ));
}

#[tokio::test]
async fn test_single_get_all() {
    let name = InjectionToken::<String>::new("NAME");
    let container = Testing::create()
        .provider(Provider::provide(&name).use_value("weld".to_string()))
        .compile()
        .await
        .unwrap();
    assert!(matches!(
        container.get_all(&name).await,
        Err(InjectError::MultiBindingMismatch { multi: false, .. })
    ));
}

#[tokio::test]
async fn test_multi_class_token() {
    let result = Testing::create()
        .provider(Provider::class::<Katana>().multi())
        .compile()
        .await;
    match result {
        Err(InjectError::MissingInjectionToken { site }) => assert!(site.contains("Katana")),
        _ => panic!("expected missing injection token"),
    }
}

struct Dojo;

impl Injectable for Dojo {
    fn dependencies() -> Dependencies {
        Dependencies::new().multi_inject(Token::of::<Katana>())
    }

    fn construct(_resolved: &Resolved) -> Result<Self, StdError> {
        Ok(Self)
    }
}

#[tokio::test]
async fn test_multi_class_dependency() {
    let result = Testing::create()
        .provider(Provider::class::<Katana>())
        .provider(Provider::class::<Dojo>())
        .compile()
        .await;
    match result {
        Err(InjectError::MissingInjectionToken { site }) => {
            assert!(site.contains("Dojo"));
            assert!(site.contains("parameter #0"));
        }
        _ => panic!("expected missing injection token"),
    }
}

struct Counter;

impl Injectable for Counter {
    fn construct(_resolved: &Resolved) -> Result<Self, StdError> {
        Ok(Self)
    }
}

#[tokio::test]
async fn test_singleton_identity() {
    let container = Testing::create()
        .provider(Provider::class::<Counter>())
        .compile()
        .await
        .unwrap();
    let first = container.get_class::<Counter>().await.unwrap();
    let second = container.get_class::<Counter>().await.unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    let cloned = container.clone();
    let third = cloned.get_class::<Counter>().await.unwrap();
    assert!(Arc::ptr_eq(&first, &third));
}

#[tokio::test]
async fn test_transient_distinct() {
    let container = Testing::create()
        .provider(Provider::class::<Counter>().with_scope(Scope::Transient))
        .compile()
        .await
        .unwrap();
    let first = container.get_class::<Counter>().await.unwrap();
    let second = container.get_class::<Counter>().await.unwrap();
    assert!(!Arc::ptr_eq(&first, &second));
}

struct CycleA;

impl Injectable for CycleA {
    fn dependencies() -> Dependencies {
        Dependencies::new().inject(Token::of::<CycleB>())
    }

    fn construct(_resolved: &Resolved) -> Result<Self, StdError> {
        Ok(Self)
    }
}

struct CycleB;

impl Injectable for CycleB {
    fn dependencies() -> Dependencies {
        Dependencies::new().inject(Token::of::<CycleA>())
    }

    fn construct(_resolved: &Resolved) -> Result<Self, StdError> {
        Ok(Self)
    }
}

#[tokio::test]
async fn test_circular_dependency() {
    let result = Testing::create()
        .provider(Provider::class::<CycleA>())
        .provider(Provider::class::<CycleB>())
        .compile()
        .await;
    match result {
        Err(InjectError::CircularDependency { cycle }) => assert_eq!(
            cycle,
            vec![
                Token::of::<CycleA>(),
                Token::of::<CycleB>(),
                Token::of::<CycleA>(),
            ]
        ),
        _ => panic!("expected circular dependency"),
    }
}

#[tokio::test]
async fn test_circular_dependency_message() {
    let a = InjectionToken::<u32>::new("A");
    let b = InjectionToken::<u32>::new("B");
    let result = Testing::create()
        .provider(
            Provider::provide(&a)
                .use_factory(Dependencies::new().inject(&b), |v| Ok(v.get::<u32>(0)?)),
        )
        .provider(
            Provider::provide(&b)
                .use_factory(Dependencies::new().inject(&a), |v| Ok(v.get::<u32>(0)?)),
        )
        .compile()
        .await;
    let err = result.err().unwrap();
    assert_eq!(err.to_string(), "Circular dependency detected: A -> B -> A");
}

struct Service {
    counter: Arc<Counter>,
}

impl Injectable for Service {
    fn dependencies() -> Dependencies {
        Dependencies::new().inject(Token::of::<Counter>())
    }

    fn construct(resolved: &Resolved) -> Result<Self, StdError> {
        Ok(Self {
            counter: resolved.get(0)?,
        })
    }
}

#[tokio::test]
async fn test_unknown_dependency() {
    let result = Testing::create()
        .provider(Provider::class::<Service>())
        .compile()
        .await;
    match result {
        Err(InjectError::UnknownDependency {
            token,
            module,
            chain,
        }) => {
            assert_eq!(token, Token::of::<Counter>());
            assert_eq!(module.as_str(), "TestingModule");
            assert_eq!(chain, vec![Token::of::<Service>(), Token::of::<Counter>()]);
        }
        _ => panic!("expected unknown dependency"),
    }
}

#[tokio::test]
async fn test_shared_dependency() {
    let container = Testing::create()
        .provider(Provider::class::<Counter>())
        .provider(Provider::class::<Service>())
        .compile()
        .await
        .unwrap();
    let service = container.get_class::<Service>().await.unwrap();
    let counter = container.get_class::<Counter>().await.unwrap();
    assert!(Arc::ptr_eq(&service.counter, &counter));
}

static LOGGER: LazyLock<InjectionToken<String>> = LazyLock::new(|| InjectionToken::new("LOGGER"));
static TRACER: LazyLock<InjectionToken<String>> = LazyLock::new(|| InjectionToken::new("TRACER"));

struct Handler {
    tracer: Option<String>,
    logger: Option<String>,
}

impl Injectable for Handler {
    fn dependencies() -> Dependencies {
        Dependencies::new()
            .inject_optional(&*TRACER)
            .property("logger", Dependency::new(&*LOGGER))
    }

    fn construct(resolved: &Resolved) -> Result<Self, StdError> {
        Ok(Self {
            tracer: resolved.get_optional(0)?,
            logger: None,
        })
    }

    fn inject_properties(&mut self, resolved: &Resolved) -> Result<(), StdError> {
        self.logger = Some(resolved.property("logger")?);
        Ok(())
    }
}

#[tokio::test]
async fn test_optional_and_property() {
    let container = Testing::create()
        .provider(Provider::provide(&*LOGGER).use_value("stdout".to_string()))
        .provider(Provider::class::<Handler>())
        .compile()
        .await
        .unwrap();
    let handler = container.get_class::<Handler>().await.unwrap();
    assert_eq!(handler.tracer, None);
    assert_eq!(handler.logger.as_deref(), Some("stdout"));
}

#[tokio::test]
async fn test_optional_present() {
    let container = Testing::create()
        .provider(Provider::provide(&*LOGGER).use_value("stdout".to_string()))
        .provider(Provider::provide(&*TRACER).use_value("otlp".to_string()))
        .provider(Provider::class::<Handler>())
        .compile()
        .await
        .unwrap();
    let handler = container.get_class::<Handler>().await.unwrap();
    assert_eq!(handler.tracer.as_deref(), Some("otlp"));
}

#[tokio::test]
async fn test_alias() {
    let counter = InjectionToken::<Arc<Counter>>::new("COUNTER");
    let container = Testing::create()
        .provider(Provider::class::<Counter>())
        .provider(Provider::provide(&counter).use_existing(Token::of::<Counter>()))
        .compile()
        .await
        .unwrap();
    let aliased = container.get(&counter).await.unwrap();
    let original = container.get_class::<Counter>().await.unwrap();
    assert!(Arc::ptr_eq(&aliased, &original));
}

#[tokio::test]
async fn test_factories() {
    let host = InjectionToken::<String>::new("HOST");
    let port = InjectionToken::<u16>::new("PORT");
    let url = InjectionToken::<String>::new("URL");
    let container = Testing::create()
        .provider(Provider::provide(&host).use_value("localhost".to_string()))
        .provider(
            Provider::provide(&port).use_async_factory(Dependencies::new(), |_| async {
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
                Ok::<_, StdError>(8080u16)
            }),
        )
        .provider(Provider::provide(&url).use_factory(
            Dependencies::new().inject(&host).inject(&port),
            |v| {
                let host: String = v.get(0)?;
                let port: u16 = v.get(1)?;
                Ok(format!("http://{host}:{port}"))
            },
        ))
        .compile()
        .await
        .unwrap();
    assert_eq!(container.get(&url).await.unwrap(), "http://localhost:8080");
}

#[tokio::test]
async fn test_provider_error() {
    let broken = InjectionToken::<u32>::new("BROKEN");
    let result = Testing::create()
        .provider(
            Provider::provide(&broken)
                .use_factory(Dependencies::new(), |_| Err::<u32, _>("boom".into())),
        )
        .compile()
        .await;
    match result {
        Err(InjectError::ProviderError { token, source }) => {
            assert_eq!(token, broken.token());
            assert_eq!(source.to_string(), "boom");
        }
        _ => panic!("expected provider error"),
    }
}

#[tokio::test]
async fn test_conflicting_providers() {
    let name = InjectionToken::<String>::new("NAME");
    let result = Testing::create()
        .provider(Provider::provide(&name).use_value("a".to_string()))
        .provider(Provider::provide(&name).use_value("b".to_string()))
        .compile()
        .await;
    assert!(matches!(
        result,
        Err(InjectError::ConflictingProvider { .. })
    ));
    let result = Testing::create()
        .provider(Provider::provide(&name).use_value("a".to_string()).multi())
        .provider(Provider::provide(&name).use_value("b".to_string()))
        .compile()
        .await;
    assert!(matches!(
        result,
        Err(InjectError::ConflictingProvider { .. })
    ));
}

#[tokio::test]
async fn test_type_mismatch() {
    let name = InjectionToken::<String>::new("NAME");
    let container = Testing::create()
        .provider(Provider::provide(name.token()).use_value(42u32))
        .compile()
        .await
        .unwrap();
    assert!(matches!(
        container.get(&name).await,
        Err(InjectError::TypeMismatch { .. })
    ));
}

#[tokio::test]
async fn test_empty_container() {
    let container = Container::builder().compile().await.unwrap();
    assert_eq!(container.root().as_str(), "AppModule");
    assert!(matches!(
        container.get_class::<Counter>().await,
        Err(InjectError::UnknownDependency { .. })
    ));
}

#[tokio::test]
async fn test_container_builder() {
    let container = Container::builder()
        .add_module(
            Module::builder("AppModule")
                .providers(weapons())
                .provider(Provider::class::<Ninja>())
                .build(),
        )
        .compile()
        .await
        .unwrap();
    let ninja = container.get_class::<Ninja>().await.unwrap();
    assert_eq!(ninja.weapons.len(), 2);
}
