use std::collections::HashMap;
use std::mem::take;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::Instrument;

use crate::injector::{Injector, ResolutionStack};
use crate::provider::downcast;
use crate::{
    Import, InjectError, InjectionToken, Instance, Key, Module, ModuleGraph, ModuleId, Provider,
    ProviderTable, RequestContext, Resolution, Token,
};

const DEFAULT_ROOT: &str = "AppModule";

/// Replacement of every provider bound to one token, applied before the
/// provider table is frozen.
///
/// The replacement fully supersedes the original unless it is told to keep
/// the original scope or multiplicity.
#[derive(Debug, Clone)]
pub struct Override {
    provider: Provider,
    preserve_scope: bool,
    preserve_multi: bool,
}

impl Override {
    pub fn new(provider: Provider) -> Self {
        Self {
            provider,
            preserve_scope: false,
            preserve_multi: false,
        }
    }

    pub fn preserve_scope(mut self) -> Self {
        self.preserve_scope = true;
        self
    }

    pub fn preserve_multi(mut self) -> Self {
        self.preserve_multi = true;
        self
    }

    pub fn token(&self) -> &Token {
        self.provider.token()
    }

    fn apply(&self, original: &Provider) -> Provider {
        let mut provider = self.provider.clone();
        if self.preserve_scope {
            provider = provider.with_scope(original.scope());
        }
        if self.preserve_multi {
            provider = provider.with_multi(original.is_multi());
        }
        provider
    }
}

impl From<Provider> for Override {
    fn from(value: Provider) -> Self {
        Self::new(value)
    }
}

/// Compiled, immutable dependency container.
///
/// Cloning is cheap and every clone shares the same singletons.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use weld::{Container, Dependencies, Injectable, InjectionToken, Module, Provider, Resolved, StdError};
///
/// struct Greeter {
///     greeting: String,
/// }
///
/// impl Injectable for Greeter {
///     fn dependencies() -> Dependencies {
///         Dependencies::new().inject(&*GREETING)
///     }
///
///     fn construct(resolved: &Resolved) -> Result<Self, StdError> {
///         Ok(Self { greeting: resolved.get(0)? })
///     }
/// }
///
/// static GREETING: std::sync::LazyLock<InjectionToken<String>> =
///     std::sync::LazyLock::new(|| InjectionToken::new("GREETING"));
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let container = Container::builder()
///     .add_module(
///         Module::builder("AppModule")
///             .provider(Provider::provide(&*GREETING).use_value("hello".to_string()))
///             .provider(Provider::class::<Greeter>())
///             .build(),
///     )
///     .compile()
///     .await?;
///
/// let greeter: Arc<Greeter> = container.get_class().await?;
/// assert_eq!(greeter.greeting, "hello");
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Container {
    injector: Arc<Injector>,
    root: ModuleId,
    next_context_id: Arc<AtomicU64>,
}

impl Container {
    pub fn builder() -> ContainerBuilder {
        ContainerBuilder::default()
    }

    /// Module used by the root-level query methods.
    pub fn root(&self) -> &ModuleId {
        &self.root
    }

    pub fn graph(&self) -> &ModuleGraph {
        self.injector.graph()
    }

    /// Returns a view resolving tokens with the visibility of `module`.
    pub fn select(&self, module: impl Into<ModuleId>) -> Result<ModuleRef<'_>, InjectError> {
        let module = module.into();
        if !self.graph().contains(&module) {
            return Err(InjectError::UnknownModule {
                module,
                referrer: None,
            });
        }
        Ok(ModuleRef {
            container: self,
            module,
            context: None,
        })
    }

    /// Allocates an isolated request context.
    pub fn create_request_context(&self) -> RequestContext {
        RequestContext::new(self.next_context_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns a root view bound to `ctx`.
    pub fn scoped(&self, ctx: &RequestContext) -> ModuleRef<'_> {
        self.root_ref().scoped(ctx)
    }

    /// Resolves `token` as seen from `module`.
    pub async fn resolve(
        &self,
        module: &ModuleId,
        token: &Token,
        ctx: Option<&RequestContext>,
    ) -> Result<Resolution, InjectError> {
        let mut stack = ResolutionStack::default();
        self.injector.resolve(module, token, ctx, &mut stack).await
    }

    /// Lists controller tokens together with the module declaring them.
    pub fn controllers(&self) -> impl Iterator<Item = (&ModuleId, &Token)> {
        self.graph().controllers()
    }

    pub async fn get<K>(&self, key: &K) -> Result<K::Value, InjectError>
    where
        K: Key,
    {
        self.root_ref().get(key).await
    }

    pub async fn get_all<V>(&self, token: &InjectionToken<V>) -> Result<Vec<V>, InjectError>
    where
        V: Clone + Send + Sync + 'static,
    {
        self.root_ref().get_all(token).await
    }

    pub async fn get_class<C>(&self) -> Result<Arc<C>, InjectError>
    where
        C: Send + Sync + 'static,
    {
        self.root_ref().get_class().await
    }

    pub async fn get_instance(&self, token: &Token) -> Result<Instance, InjectError> {
        self.root_ref().get_instance(token).await
    }

    pub async fn get_all_instances(&self, token: &Token) -> Result<Vec<Instance>, InjectError> {
        self.root_ref().get_all_instances(token).await
    }

    fn root_ref(&self) -> ModuleRef<'_> {
        ModuleRef {
            container: self,
            module: self.root.clone(),
            context: None,
        }
    }
}

/// View of a [`Container`] from one module, optionally bound to a request.
#[derive(Clone)]
pub struct ModuleRef<'a> {
    container: &'a Container,
    module: ModuleId,
    context: Option<RequestContext>,
}

impl ModuleRef<'_> {
    pub fn module(&self) -> &ModuleId {
        &self.module
    }

    pub fn context(&self) -> Option<&RequestContext> {
        self.context.as_ref()
    }

    pub fn scoped(mut self, ctx: &RequestContext) -> Self {
        self.context = Some(ctx.clone());
        self
    }

    /// Resolves a single-bound key.
    pub async fn get<K>(&self, key: &K) -> Result<K::Value, InjectError>
    where
        K: Key,
    {
        let token = key.token();
        let instance = self.get_instance(&token).await?;
        downcast(&token, &instance)
    }

    /// Resolves every provider of a multi-bound token, in declaration order.
    pub async fn get_all<V>(&self, token: &InjectionToken<V>) -> Result<Vec<V>, InjectError>
    where
        V: Clone + Send + Sync + 'static,
    {
        let token = token.token();
        self.get_all_instances(&token)
            .await?
            .iter()
            .map(|v| downcast(&token, v))
            .collect()
    }

    /// Resolves the class `C` bound to its own class token.
    pub async fn get_class<C>(&self) -> Result<Arc<C>, InjectError>
    where
        C: Send + Sync + 'static,
    {
        let token = Token::of::<C>();
        let instance = self.get_instance(&token).await?;
        downcast(&token, &instance)
    }

    pub async fn get_instance(&self, token: &Token) -> Result<Instance, InjectError> {
        match self.resolve(token).await? {
            Resolution::Single(instance) => Ok(instance),
            Resolution::Multiple(_) => Err(InjectError::MultiBindingMismatch {
                token: token.clone(),
                multi: true,
            }),
        }
    }

    pub async fn get_all_instances(&self, token: &Token) -> Result<Vec<Instance>, InjectError> {
        if token.is_class() {
            return Err(InjectError::MissingInjectionToken {
                site: format!("get_all({token})"),
            });
        }
        match self.resolve(token).await? {
            Resolution::Multiple(instances) => Ok(instances),
            Resolution::Single(_) => Err(InjectError::MultiBindingMismatch {
                token: token.clone(),
                multi: false,
            }),
        }
    }

    async fn resolve(&self, token: &Token) -> Result<Resolution, InjectError> {
        self.container
            .resolve(&self.module, token, self.context.as_ref())
            .await
    }
}

/// Builder for a [`Container`].
///
/// Collects modules and overrides; nothing is validated until
/// [`compile`](Self::compile).
#[derive(Default)]
pub struct ContainerBuilder {
    modules: Vec<Module>,
    root: Option<ModuleId>,
    overrides: Vec<Override>,
}

impl ContainerBuilder {
    /// Adds a top-level module. Its singletons and the singletons of every
    /// module it imports are built during compilation.
    pub fn add_module(&mut self, module: Module) -> &mut Self {
        self.modules.push(module);
        self
    }

    /// Sets the module used by the root-level query methods. Defaults to the
    /// first added module.
    pub fn root(&mut self, module: impl Into<ModuleId>) -> &mut Self {
        self.root = Some(module.into());
        self
    }

    pub fn override_provider(&mut self, provider: impl Into<Override>) -> &mut Self {
        self.overrides.push(provider.into());
        self
    }

    pub async fn compile(&mut self) -> Result<Container, InjectError> {
        let span = tracing::info_span!("compile");
        self.compile_modules().instrument(span).await
    }

    async fn compile_modules(&mut self) -> Result<Container, InjectError> {
        let mut top = take(&mut self.modules);
        if top.is_empty() {
            top.push(Module::builder(DEFAULT_ROOT).build());
        }
        let roots: Vec<ModuleId> = top.iter().map(|v| v.id().clone()).collect();
        let root = take(&mut self.root).unwrap_or_else(|| roots[0].clone());
        let modules = flatten(top)?;
        let mut table = ProviderTable::new();
        for module in &modules {
            for provider in module.providers().iter().chain(module.controllers()) {
                table.register(module.id(), provider.clone())?;
            }
        }
        for item in take(&mut self.overrides) {
            item.provider.validate()?;
            if !table.replace(item.token(), |original| item.apply(original)) {
                return Err(InjectError::OverrideTargetNotFound {
                    token: item.token().clone(),
                });
            }
        }
        let mut graph = ModuleGraph::new(table);
        for module in &modules {
            graph.add_module(
                module.id().clone(),
                module.imports().iter().map(|v| v.id().clone()).collect(),
                module.exports().to_vec(),
                module.controllers().iter().map(|v| v.token().clone()).collect(),
            )?;
        }
        graph.validate()?;
        if !graph.contains(&root) {
            return Err(InjectError::UnknownModule {
                module: root,
                referrer: None,
            });
        }
        let injector = Injector::new(graph);
        injector.validate_bindings(&roots)?;
        injector.instantiate_singletons(&roots).await?;
        tracing::info!(modules = modules.len(), root = %root, "Container compiled");
        Ok(Container {
            injector: Arc::new(injector),
            root,
            next_context_id: Arc::new(AtomicU64::new(1)),
        })
    }
}

/// Collects nested module definitions, parents before their nested imports.
fn flatten(top: Vec<Module>) -> Result<Vec<Module>, InjectError> {
    let mut seen: HashMap<ModuleId, Module> = HashMap::new();
    let mut order = Vec::new();
    let mut pending: Vec<Module> = top.into_iter().rev().collect();
    while let Some(module) = pending.pop() {
        if let Some(existing) = seen.get(module.id()) {
            if existing.same_definition(&module) {
                continue;
            }
            return Err(InjectError::DuplicateModule {
                module: module.id().clone(),
            });
        }
        for import in module.imports().iter().rev() {
            if let Import::Module(nested) = import {
                pending.push(nested.clone());
            }
        }
        seen.insert(module.id().clone(), module.clone());
        order.push(module);
    }
    Ok(order)
}
