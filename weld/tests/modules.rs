use std::mem::take;
use std::sync::{Arc, LazyLock, Mutex};

use weld::{
    Container, Dependencies, Export, InjectError, Injectable, InjectionToken, Module, ModuleId,
    Provider, Resolved, StdError, Testing, Token,
};

static SECRET: LazyLock<InjectionToken<String>> = LazyLock::new(|| InjectionToken::new("SECRET"));
static PUBLIC: LazyLock<InjectionToken<String>> = LazyLock::new(|| InjectionToken::new("PUBLIC"));

fn vault_module() -> Module {
    Module::builder("VaultModule")
        .provider(Provider::provide(&*SECRET).use_value("secret".to_string()))
        .provider(Provider::provide(&*PUBLIC).use_value("public".to_string()))
        .export(&*PUBLIC)
        .build()
}

#[tokio::test]
async fn test_export_visibility() {
    let container = Testing::create()
        .import(vault_module())
        .compile()
        .await
        .unwrap();
    assert_eq!(container.get(&*PUBLIC).await.unwrap(), "public");
    match container.get(&*SECRET).await {
        Err(InjectError::UnknownDependency { token, module, .. }) => {
            assert_eq!(token, SECRET.token());
            assert_eq!(module.as_str(), "TestingModule");
        }
        _ => panic!("expected unknown dependency"),
    }
    let vault = container.select("VaultModule").unwrap();
    assert_eq!(vault.get(&*SECRET).await.unwrap(), "secret");
}

#[tokio::test]
async fn test_select_unknown_module() {
    let container = Testing::create().compile().await.unwrap();
    assert!(matches!(
        container.select("MissingModule"),
        Err(InjectError::UnknownModule { referrer: None, .. })
    ));
}

struct Repository {
    secret: String,
}

impl Injectable for Repository {
    fn dependencies() -> Dependencies {
        Dependencies::new().inject(&*SECRET)
    }

    fn construct(resolved: &Resolved) -> Result<Self, StdError> {
        Ok(Self {
            secret: resolved.get(0)?,
        })
    }
}

#[tokio::test]
async fn test_exported_class_uses_private_dependency() {
    let storage = Module::builder("StorageModule")
        .provider(Provider::provide(&*SECRET).use_value("hidden".to_string()))
        .provider(Provider::class::<Repository>())
        .export(Token::of::<Repository>())
        .build();
    let container = Testing::create().import(storage).compile().await.unwrap();
    let repository = container.get_class::<Repository>().await.unwrap();
    assert_eq!(repository.secret, "hidden");
}

#[tokio::test]
async fn test_imports_are_not_transitive() {
    let middle = Module::builder("MiddleModule")
        .import(vault_module())
        .build();
    let container = Testing::create().import(middle).compile().await.unwrap();
    assert!(matches!(
        container.get(&*PUBLIC).await,
        Err(InjectError::UnknownDependency { .. })
    ));
    let middle = container.select("MiddleModule").unwrap();
    assert_eq!(middle.get(&*PUBLIC).await.unwrap(), "public");
}

#[tokio::test]
async fn test_reexport_token() {
    let middle = Module::builder("MiddleModule")
        .import(vault_module())
        .export(&*PUBLIC)
        .build();
    let container = Testing::create().import(middle).compile().await.unwrap();
    assert_eq!(container.get(&*PUBLIC).await.unwrap(), "public");
}

#[tokio::test]
async fn test_reexport_module() {
    let middle = Module::builder("MiddleModule")
        .import(vault_module())
        .export_module("VaultModule")
        .build();
    let container = Testing::create().import(middle).compile().await.unwrap();
    assert_eq!(container.get(&*PUBLIC).await.unwrap(), "public");
    assert!(matches!(
        container.get(&*SECRET).await,
        Err(InjectError::UnknownDependency { .. })
    ));
}

struct Cat {
    dog: Arc<Dog>,
}

impl Injectable for Cat {
    fn dependencies() -> Dependencies {
        Dependencies::new().inject(Token::of::<Dog>())
    }

    fn construct(resolved: &Resolved) -> Result<Self, StdError> {
        Ok(Self {
            dog: resolved.get(0)?,
        })
    }
}

struct Dog;

impl Injectable for Dog {
    fn construct(_resolved: &Resolved) -> Result<Self, StdError> {
        Ok(Self)
    }
}

#[tokio::test]
async fn test_circular_imports() {
    let cats = Module::builder("CatsModule")
        .import("DogsModule")
        .provider(Provider::class::<Cat>())
        .export(Token::of::<Cat>())
        .build();
    let dogs = Module::builder("DogsModule")
        .import("CatsModule")
        .provider(Provider::class::<Dog>())
        .export(Token::of::<Dog>())
        .build();
    let container = Container::builder()
        .add_module(cats)
        .add_module(dogs)
        .compile()
        .await
        .unwrap();
    let cat = container.get_class::<Cat>().await.unwrap();
    let dog = container.select("CatsModule").unwrap().get_class::<Dog>().await.unwrap();
    assert!(Arc::ptr_eq(&cat.dog, &dog));
    let dogs = container.select("DogsModule").unwrap();
    assert!(Arc::ptr_eq(&dogs.get_class::<Cat>().await.unwrap(), &cat));
}

#[tokio::test]
async fn test_unknown_import() {
    let result = Testing::create().import("MissingModule").compile().await;
    match result {
        Err(InjectError::UnknownModule { module, referrer }) => {
            assert_eq!(module.as_str(), "MissingModule");
            assert_eq!(referrer, Some(ModuleId::from("TestingModule")));
        }
        _ => panic!("expected unknown module"),
    }
}

#[tokio::test]
async fn test_unknown_export() {
    let module = Module::builder("BrokenModule").export(&*SECRET).build();
    let result = Testing::create().import(module).compile().await;
    assert!(matches!(
        result,
        Err(InjectError::UnknownExport {
            export: Export::Token(_),
            ..
        })
    ));
    let module = Module::builder("BrokenModule")
        .export_module("VaultModule")
        .build();
    let result = Testing::create()
        .import(vault_module())
        .import(module)
        .compile()
        .await;
    assert!(matches!(
        result,
        Err(InjectError::UnknownExport {
            export: Export::Module(_),
            ..
        })
    ));
}

#[tokio::test]
async fn test_duplicate_module() {
    let result = Testing::create()
        .import(vault_module())
        .import(vault_module())
        .compile()
        .await;
    assert!(matches!(
        result,
        Err(InjectError::DuplicateModule { .. })
    ));
    let vault = vault_module();
    let container = Testing::create()
        .import(&vault)
        .import(&vault)
        .compile()
        .await
        .unwrap();
    assert_eq!(container.get(&*PUBLIC).await.unwrap(), "public");
}

#[tokio::test]
async fn test_conflicting_imports() {
    let other = Module::builder("OtherModule")
        .provider(Provider::provide(&*PUBLIC).use_value("other".to_string()))
        .export(&*PUBLIC)
        .build();
    let result = Testing::create()
        .import(vault_module())
        .import(other)
        .compile()
        .await;
    match result {
        Err(InjectError::ConflictingProvider { modules, .. }) => assert_eq!(
            modules,
            vec![ModuleId::from("VaultModule"), ModuleId::from("OtherModule")]
        ),
        _ => panic!("expected conflicting providers"),
    }
}

#[tokio::test]
async fn test_conflicting_multi_with_import() {
    let hooks = InjectionToken::<&'static str>::new("HOOKS");
    let lib = Module::builder("LibModule")
        .provider(Provider::provide(&hooks).use_value("lib"))
        .export(&hooks)
        .build();
    let result = Testing::create()
        .import(lib)
        .provider(Provider::provide(&hooks).use_value("local").multi())
        .compile()
        .await;
    match result {
        Err(InjectError::ConflictingProvider { token, modules }) => {
            assert_eq!(token, hooks.token());
            assert_eq!(
                modules,
                vec![ModuleId::from("TestingModule"), ModuleId::from("LibModule")]
            );
        }
        _ => panic!("expected conflicting providers"),
    }
}

fn recording_module(
    name: &'static str,
    labels: &[&'static str],
    log: &Arc<Mutex<Vec<&'static str>>>,
) -> Module {
    let mut builder = Module::builder(name);
    for &label in labels {
        let token = InjectionToken::<&'static str>::new(label);
        let log = Arc::clone(log);
        builder = builder.provider(Provider::provide(&token).use_factory(
            Dependencies::new(),
            move |_| {
                log.lock().unwrap().push(label);
                Ok(label)
            },
        ));
    }
    builder.build()
}

async fn construction_order() -> Vec<&'static str> {
    let log = Arc::new(Mutex::new(Vec::new()));
    Testing::create()
        .import(recording_module("FirstModule", &["first.a", "first.b"], &log))
        .import(recording_module("SecondModule", &["second.a"], &log))
        .compile()
        .await
        .unwrap();
    take(&mut *log.lock().unwrap())
}

#[tokio::test]
async fn test_singleton_construction_order() {
    let order = construction_order().await;
    assert_eq!(order, vec!["first.a", "first.b", "second.a"]);
    assert_eq!(construction_order().await, order);
}

#[tokio::test]
async fn test_multi_across_modules() {
    let hooks = InjectionToken::<&'static str>::new("HOOKS");
    let audit = Module::builder("AuditModule")
        .provider(Provider::provide(&hooks).use_value("audit").multi())
        .export(&hooks)
        .build();
    let container = Testing::create()
        .provider(Provider::provide(&hooks).use_value("local").multi())
        .import(audit)
        .compile()
        .await
        .unwrap();
    assert_eq!(container.get_all(&hooks).await.unwrap(), vec!["local", "audit"]);
}

struct UsersController;

impl Injectable for UsersController {
    fn construct(_resolved: &Resolved) -> Result<Self, StdError> {
        Ok(Self)
    }
}

#[tokio::test]
async fn test_controllers() {
    let users = Module::builder("UsersModule")
        .controller(Provider::class::<UsersController>())
        .build();
    let container = Testing::create().import(users).compile().await.unwrap();
    let controllers: Vec<_> = container
        .controllers()
        .map(|(module, token)| (module.clone(), token.clone()))
        .collect();
    assert_eq!(
        controllers,
        vec![(
            ModuleId::from("UsersModule"),
            Token::of::<UsersController>()
        )]
    );
    let users = container.select("UsersModule").unwrap();
    users.get_class::<UsersController>().await.unwrap();
    assert!(matches!(
        container.get_class::<UsersController>().await,
        Err(InjectError::UnknownDependency { .. })
    ));
}

#[tokio::test]
async fn test_module_graph() {
    let container = Testing::create()
        .import(Module::builder("MiddleModule").import(vault_module()).build())
        .compile()
        .await
        .unwrap();
    let modules: Vec<_> = container.graph().modules().map(|v| v.as_str()).collect();
    assert_eq!(modules, vec!["TestingModule", "MiddleModule", "VaultModule"]);
    let imports = container
        .graph()
        .imports(&ModuleId::from("MiddleModule"))
        .unwrap();
    assert_eq!(imports, &[ModuleId::from("VaultModule")]);
}
