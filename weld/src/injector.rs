use std::borrow::Cow;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use futures::FutureExt;
use futures::future::BoxFuture;

use crate::graph::VisibleProvider;
use crate::provider::{DynFactory, ProviderKind, Slot};
use crate::wrapper::{InFlight, InstanceWrapper, WrapperKey};
use crate::{
    Dependencies, Dependency, InjectError, Instance, ModuleGraph, ModuleId, Resolved, Scope, Token,
};

/// Outcome of resolving one token.
#[derive(Clone)]
pub enum Resolution {
    /// The token is bound to a single provider.
    Single(Instance),
    /// The token is multi-bound; instances follow declaration order.
    Multiple(Vec<Instance>),
}

/// Instance cache of one logical request.
///
/// Request-scoped providers are built at most once per context and never
/// shared between contexts. Clones share the same cache.
#[derive(Clone)]
pub struct RequestContext {
    inner: Arc<RequestScope>,
}

struct RequestScope {
    id: u64,
    wrappers: DashMap<WrapperKey, Arc<InstanceWrapper>>,
    in_flight: InFlight,
}

impl RequestContext {
    pub(crate) fn new(id: u64) -> Self {
        Self {
            inner: Arc::new(RequestScope {
                id,
                wrappers: DashMap::new(),
                in_flight: InFlight::default(),
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Number of request-scoped instances created in this context so far.
    pub fn len(&self) -> usize {
        self.inner
            .wrappers
            .iter()
            .filter(|v| v.value().instance().is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn wrapper(&self, key: &WrapperKey) -> Arc<InstanceWrapper> {
        Arc::clone(&self.inner.wrappers.entry(key.clone()).or_default())
    }
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("id", &self.inner.id)
            .finish()
    }
}

static NEXT_RESOLUTION_ID: AtomicU64 = AtomicU64::new(1);

/// Provider slots currently being resolved, outermost first.
pub(crate) struct ResolutionStack {
    id: u64,
    frames: Vec<WrapperKey>,
}

impl Default for ResolutionStack {
    fn default() -> Self {
        Self {
            id: NEXT_RESOLUTION_ID.fetch_add(1, Ordering::Relaxed),
            frames: Vec::new(),
        }
    }
}

impl ResolutionStack {
    fn push(&mut self, key: WrapperKey) {
        self.frames.push(key);
    }

    fn pop(&mut self) {
        self.frames.pop();
    }

    /// Returns the cycle closed by `key`, if `key` is already on the stack.
    fn cycle(&self, key: &WrapperKey) -> Option<Vec<Token>> {
        let start = self.frames.iter().position(|v| v == key)?;
        let mut cycle: Vec<Token> = self.frames[start..]
            .iter()
            .map(|v| v.token.clone())
            .collect();
        cycle.push(key.token.clone());
        Some(cycle)
    }

    fn chain(&self, token: &Token) -> Vec<Token> {
        let mut chain: Vec<Token> = self.frames.iter().map(|v| v.token.clone()).collect();
        chain.push(token.clone());
        chain
    }
}

/// Walks the module graph and produces instances.
pub(crate) struct Injector {
    graph: ModuleGraph,
    singletons: DashMap<WrapperKey, Arc<InstanceWrapper>>,
    in_flight: InFlight,
}

impl Injector {
    pub fn new(graph: ModuleGraph) -> Self {
        Self {
            graph,
            singletons: DashMap::new(),
            in_flight: InFlight::default(),
        }
    }

    pub fn graph(&self) -> &ModuleGraph {
        &self.graph
    }

    /// Checks every token visible from the modules reachable from `roots`
    /// for conflicting bindings.
    pub fn validate_bindings(&self, roots: &[ModuleId]) -> Result<(), InjectError> {
        let mut seen = HashSet::new();
        let mut tokens = Vec::new();
        for module in self.graph.modules() {
            for (_, provider) in self.graph.table().providers(module) {
                if seen.insert(provider.token()) {
                    tokens.push(provider.token());
                }
            }
        }
        for module in self.graph.reachable_from(roots) {
            for &token in &tokens {
                let visible = self.graph.resolve_visible(module, token)?;
                if !visible.is_empty() {
                    binding_is_multi(token, &visible)?;
                }
            }
        }
        Ok(())
    }

    /// Builds every singleton of the modules reachable from `roots`.
    pub async fn instantiate_singletons(&self, roots: &[ModuleId]) -> Result<(), InjectError> {
        for module in self.graph.reachable_from(roots) {
            for (slot, provider) in self.graph.table().providers(module) {
                // Aliases and values hold no singleton state of their own.
                let constructed = matches!(
                    provider.kind(),
                    ProviderKind::Class { .. } | ProviderKind::Factory { .. }
                );
                if !constructed || provider.scope() != Scope::Singleton {
                    continue;
                }
                let visible = VisibleProvider {
                    owner: module,
                    slot,
                    provider,
                };
                let mut stack = ResolutionStack::default();
                self.instantiate(visible, None, &mut stack).await?;
            }
            tracing::info!("{module} dependencies initialized");
        }
        Ok(())
    }

    /// Resolves `token` as seen from `module`.
    pub fn resolve<'a>(
        &'a self,
        module: &'a ModuleId,
        token: &'a Token,
        ctx: Option<&'a RequestContext>,
        stack: &'a mut ResolutionStack,
    ) -> BoxFuture<'a, Result<Resolution, InjectError>> {
        async move {
            let visible = self.graph.resolve_visible(module, token)?;
            let Some(first) = visible.first() else {
                return Err(InjectError::UnknownDependency {
                    token: token.clone(),
                    module: module.clone(),
                    chain: stack.chain(token),
                });
            };
            if binding_is_multi(token, &visible)? {
                let mut instances = Vec::with_capacity(visible.len());
                for v in visible {
                    instances.push(self.instantiate(v, ctx, &mut *stack).await?);
                }
                Ok(Resolution::Multiple(instances))
            } else {
                let instance = self.instantiate(*first, ctx, stack).await?;
                Ok(Resolution::Single(instance))
            }
        }
        .boxed()
    }

    fn instantiate<'a>(
        &'a self,
        visible: VisibleProvider<'a>,
        ctx: Option<&'a RequestContext>,
        stack: &'a mut ResolutionStack,
    ) -> BoxFuture<'a, Result<Instance, InjectError>> {
        async move {
            let provider = visible.provider;
            let key = WrapperKey {
                module: visible.owner.clone(),
                token: provider.token().clone(),
                slot: visible.slot,
            };
            if let Some(cycle) = stack.cycle(&key) {
                return Err(InjectError::CircularDependency { cycle });
            }
            let (dependencies, factory) = match provider.kind() {
                ProviderKind::Value(value) => return Ok(value.clone()),
                ProviderKind::Alias(target) => {
                    stack.push(key);
                    let result = self.resolve(visible.owner, target, ctx, &mut *stack).await;
                    stack.pop();
                    return match result? {
                        Resolution::Single(instance) => Ok(instance),
                        Resolution::Multiple(_) => Err(InjectError::MultiBindingMismatch {
                            token: target.clone(),
                            multi: true,
                        }),
                    };
                }
                ProviderKind::Class {
                    dependencies,
                    factory,
                    ..
                }
                | ProviderKind::Factory {
                    dependencies,
                    factory,
                } => (dependencies, factory),
            };
            let wrapper = match provider.scope() {
                Scope::Transient => None,
                Scope::Singleton => Some((
                    Arc::clone(&self.singletons.entry(key.clone()).or_default()),
                    &self.in_flight,
                    None,
                )),
                Scope::Request => {
                    let ctx = ctx.ok_or_else(|| InjectError::MissingRequestContext {
                        token: provider.token().clone(),
                    })?;
                    Some((ctx.wrapper(&key), &ctx.inner.in_flight, Some(ctx)))
                }
            };
            stack.push(key.clone());
            let result = match wrapper {
                None => self.create(visible, dependencies, factory, ctx, stack).await,
                Some((wrapper, in_flight, scope_ctx)) => {
                    if let Some(instance) = wrapper.instance() {
                        Ok(instance.clone())
                    } else if let Err(err) = in_flight.wait(stack.id, &stack.frames, &key) {
                        Err(err)
                    } else {
                        let id = stack.id;
                        let frames = &mut *stack;
                        let result = wrapper
                            .get_or_try_init(move || async move {
                                in_flight.claim(id, &key);
                                let result = self
                                    .create(visible, dependencies, factory, scope_ctx, frames)
                                    .await;
                                in_flight.release(&key);
                                result
                            })
                            .await;
                        in_flight.resume(id);
                        result
                    }
                }
            };
            stack.pop();
            result
        }
        .boxed()
    }

    async fn create(
        &self,
        visible: VisibleProvider<'_>,
        dependencies: &Dependencies,
        factory: &Arc<dyn DynFactory>,
        ctx: Option<&RequestContext>,
        stack: &mut ResolutionStack,
    ) -> Result<Instance, InjectError> {
        let owner = visible.owner;
        let provider = visible.provider;
        let mut params = Vec::with_capacity(dependencies.params().len());
        for dependency in dependencies.params() {
            let slot = self.resolve_dependency(owner, dependency, ctx, stack).await?;
            params.push((dependency.token().clone(), slot));
        }
        let mut properties = Vec::new();
        for (key, dependency) in dependencies.properties() {
            let slot = self.resolve_dependency(owner, dependency, ctx, stack).await?;
            properties.push((Cow::Owned(key.to_owned()), dependency.token().clone(), slot));
        }
        let resolved = Resolved::new(provider.declaration(), params, properties);
        let instance = factory
            .produce(resolved)
            .await
            .map_err(|err| InjectError::provider(provider.token(), err))?;
        tracing::debug!(
            module = %owner,
            token = %provider.token(),
            scope = %provider.scope(),
            "Instance created",
        );
        Ok(instance)
    }

    async fn resolve_dependency(
        &self,
        module: &ModuleId,
        dependency: &Dependency,
        ctx: Option<&RequestContext>,
        stack: &mut ResolutionStack,
    ) -> Result<Slot, InjectError> {
        let token = dependency.token();
        if dependency.is_optional() && self.graph.resolve_visible(module, token)?.is_empty() {
            return Ok(if dependency.is_multi() {
                Slot::Many(Vec::new())
            } else {
                Slot::Absent
            });
        }
        match self.resolve(module, token, ctx, stack).await? {
            Resolution::Single(instance) if !dependency.is_multi() => Ok(Slot::One(instance)),
            Resolution::Multiple(instances) if dependency.is_multi() => Ok(Slot::Many(instances)),
            Resolution::Single(_) => Err(InjectError::MultiBindingMismatch {
                token: token.clone(),
                multi: false,
            }),
            Resolution::Multiple(_) => Err(InjectError::MultiBindingMismatch {
                token: token.clone(),
                multi: true,
            }),
        }
    }
}

/// Returns whether `visible` forms a multi-binding.
///
/// Mixing multi and single providers, or seeing more than one single
/// provider, is a conflict.
fn binding_is_multi(token: &Token, visible: &[VisibleProvider<'_>]) -> Result<bool, InjectError> {
    let multi = visible.first().is_some_and(|v| v.provider.is_multi());
    let mixed = visible.iter().any(|v| v.provider.is_multi() != multi);
    if mixed || (!multi && visible.len() > 1) {
        let mut modules: Vec<ModuleId> = Vec::new();
        for v in visible {
            if !modules.contains(v.owner) {
                modules.push(v.owner.clone());
            }
        }
        return Err(InjectError::ConflictingProvider {
            token: token.clone(),
            modules,
        });
    }
    Ok(multi)
}
