//! Provider definitions.
//!
//! A [`Provider`] binds one [`Token`] to a production rule: a class, a
//! precomputed value, a factory or an alias of another token. Classes describe
//! themselves through the [`Injectable`] trait.
//!
//! # Examples
//!
//! ```rust
//! use weld::{Dependencies, Injectable, InjectionToken, Provider, Resolved, Scope, StdError, Token};
//!
//! struct Database {
//!     url: String,
//! }
//!
//! impl Injectable for Database {
//!     fn dependencies() -> Dependencies {
//!         Dependencies::new().inject(Token::of::<String>())
//!     }
//!
//!     fn construct(resolved: &Resolved) -> Result<Self, StdError> {
//!         Ok(Self { url: resolved.get(0)? })
//!     }
//! }
//!
//! let url = Provider::provide(Token::of::<String>()).use_value("sqlite::memory:".to_string());
//! let database = Provider::class::<Database>();
//! let counter = Provider::provide(InjectionToken::<u32>::new("COUNTER"))
//!     .use_factory(Dependencies::new(), |_| Ok(0u32))
//!     .with_scope(Scope::Transient);
//!
//! assert_eq!(database.scope(), Scope::Singleton);
//! assert_eq!(counter.scope(), Scope::Transient);
//! assert!(!url.is_multi());
//! ```

use std::any::{Any, type_name};
use std::borrow::Cow;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;

use crate::{InjectError, StdError, Token};

/// Type-erased instance as stored by the container.
///
/// The boxed value is whatever the provider produced; class providers produce
/// `Arc<C>`.
pub type Instance = Arc<dyn Any + Send + Sync>;

/// Lifetime policy of a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Scope {
    /// One instance per container, built during compilation.
    #[default]
    Singleton,
    /// A new instance on every resolution.
    Transient,
    /// One instance per [`RequestContext`](crate::RequestContext).
    Request,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Singleton => "singleton",
            Scope::Transient => "transient",
            Scope::Request => "request",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Descriptor of a single dependency.
#[derive(Debug, Clone)]
pub struct Dependency {
    token: Token,
    multi: bool,
    optional: bool,
}

impl Dependency {
    pub fn new(token: impl Into<Token>) -> Self {
        Self {
            token: token.into(),
            multi: false,
            optional: false,
        }
    }

    pub fn multi(mut self) -> Self {
        self.multi = true;
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn token(&self) -> &Token {
        &self.token
    }

    pub fn is_multi(&self) -> bool {
        self.multi
    }

    pub fn is_optional(&self) -> bool {
        self.optional
    }
}

/// Ordered constructor-parameter and property dependency descriptors.
///
/// Parameters are resolved in declaration order and handed to the constructor
/// positionally; properties are resolved afterwards and looked up by key.
#[derive(Debug, Clone, Default)]
pub struct Dependencies {
    params: Vec<Dependency>,
    properties: Vec<(Cow<'static, str>, Dependency)>,
}

impl Dependencies {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn param(mut self, dependency: Dependency) -> Self {
        self.params.push(dependency);
        self
    }

    pub fn inject(self, token: impl Into<Token>) -> Self {
        self.param(Dependency::new(token))
    }

    pub fn inject_optional(self, token: impl Into<Token>) -> Self {
        self.param(Dependency::new(token).optional())
    }

    /// Declares a parameter receiving every provider of a multi-bound token.
    pub fn multi_inject(self, token: impl Into<Token>) -> Self {
        self.param(Dependency::new(token).multi())
    }

    pub fn property(mut self, key: impl Into<Cow<'static, str>>, dependency: Dependency) -> Self {
        self.properties.push((key.into(), dependency));
        self
    }

    pub fn params(&self) -> &[Dependency] {
        &self.params
    }

    pub fn properties(&self) -> impl Iterator<Item = (&str, &Dependency)> {
        self.properties.iter().map(|(k, v)| (k.as_ref(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty() && self.properties.is_empty()
    }

    /// Appends the descriptors of `other` after the descriptors of `self`.
    pub fn merge(mut self, other: Dependencies) -> Self {
        self.params.extend(other.params);
        self.properties.extend(other.properties);
        self
    }

    /// Checks that no multi descriptor points at a class token.
    pub(crate) fn validate(&self, declaration: &str) -> Result<(), InjectError> {
        for (i, dep) in self.params.iter().enumerate() {
            if dep.multi && dep.token.is_class() {
                return Err(InjectError::MissingInjectionToken {
                    site: format!("{declaration} parameter #{i}"),
                });
            }
        }
        for (key, dep) in &self.properties {
            if dep.multi && dep.token.is_class() {
                return Err(InjectError::MissingInjectionToken {
                    site: format!("{declaration} property `{key}`"),
                });
            }
        }
        Ok(())
    }
}

pub(crate) enum Slot {
    One(Instance),
    Many(Vec<Instance>),
    Absent,
}

/// Resolved dependencies handed to a constructor or factory.
pub struct Resolved {
    declaration: String,
    params: Vec<(Token, Slot)>,
    properties: Vec<(Cow<'static, str>, Token, Slot)>,
}

impl Resolved {
    pub(crate) fn new(
        declaration: String,
        params: Vec<(Token, Slot)>,
        properties: Vec<(Cow<'static, str>, Token, Slot)>,
    ) -> Self {
        Self {
            declaration,
            params,
            properties,
        }
    }

    /// Number of positional arguments.
    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn get<V>(&self, index: usize) -> Result<V, InjectError>
    where
        V: Clone + 'static,
    {
        let (token, slot) = self.param(index)?;
        match slot {
            Slot::One(instance) => downcast(token, instance),
            _ => Err(self.mismatch(format!("parameter #{index}"), "a single instance")),
        }
    }

    pub fn get_all<V>(&self, index: usize) -> Result<Vec<V>, InjectError>
    where
        V: Clone + 'static,
    {
        let (token, slot) = self.param(index)?;
        match slot {
            Slot::Many(instances) => instances.iter().map(|v| downcast(token, v)).collect(),
            _ => Err(self.mismatch(format!("parameter #{index}"), "a list")),
        }
    }

    pub fn get_optional<V>(&self, index: usize) -> Result<Option<V>, InjectError>
    where
        V: Clone + 'static,
    {
        let (token, slot) = self.param(index)?;
        match slot {
            Slot::One(instance) => downcast(token, instance).map(Some),
            Slot::Absent => Ok(None),
            Slot::Many(_) => Err(self.mismatch(format!("parameter #{index}"), "an optional")),
        }
    }

    pub fn property<V>(&self, key: &str) -> Result<V, InjectError>
    where
        V: Clone + 'static,
    {
        let (token, slot) = self.property_slot(key)?;
        match slot {
            Slot::One(instance) => downcast(token, instance),
            _ => Err(self.mismatch(format!("property `{key}`"), "a single instance")),
        }
    }

    pub fn property_all<V>(&self, key: &str) -> Result<Vec<V>, InjectError>
    where
        V: Clone + 'static,
    {
        let (token, slot) = self.property_slot(key)?;
        match slot {
            Slot::Many(instances) => instances.iter().map(|v| downcast(token, v)).collect(),
            _ => Err(self.mismatch(format!("property `{key}`"), "a list")),
        }
    }

    pub fn property_optional<V>(&self, key: &str) -> Result<Option<V>, InjectError>
    where
        V: Clone + 'static,
    {
        let (token, slot) = self.property_slot(key)?;
        match slot {
            Slot::One(instance) => downcast(token, instance).map(Some),
            Slot::Absent => Ok(None),
            Slot::Many(_) => Err(self.mismatch(format!("property `{key}`"), "an optional")),
        }
    }

    fn param(&self, index: usize) -> Result<(&Token, &Slot), InjectError> {
        self.params
            .get(index)
            .map(|(token, slot)| (token, slot))
            .ok_or_else(|| InjectError::MissingArgument {
                site: format!("{} parameter #{index} is not declared", self.declaration),
            })
    }

    fn property_slot(&self, key: &str) -> Result<(&Token, &Slot), InjectError> {
        self.properties
            .iter()
            .find(|(k, _, _)| k == key)
            .map(|(_, token, slot)| (token, slot))
            .ok_or_else(|| InjectError::MissingArgument {
                site: format!("{} property `{key}` is not declared", self.declaration),
            })
    }

    fn mismatch(&self, what: String, expected: &str) -> InjectError {
        InjectError::MissingArgument {
            site: format!("{} {what} is not declared as {expected}", self.declaration),
        }
    }
}

pub(crate) fn downcast<V>(token: &Token, instance: &Instance) -> Result<V, InjectError>
where
    V: Clone + 'static,
{
    instance
        .downcast_ref::<V>()
        .cloned()
        .ok_or_else(|| InjectError::TypeMismatch {
            token: token.clone(),
            expected: type_name::<V>(),
        })
}

/// Trait for classes the container can construct.
///
/// The container calls [`construct`](Injectable::construct) with the
/// constructor parameters declared by
/// [`dependencies`](Injectable::dependencies), then
/// [`inject_properties`](Injectable::inject_properties) with the property
/// dependencies, and stores the result as `Arc<Self>`.
pub trait Injectable: Send + Sync + Sized + 'static {
    /// Declares constructor-parameter and property dependencies.
    fn dependencies() -> Dependencies {
        Dependencies::new()
    }

    /// Default scope of class providers built from this type.
    fn scope() -> Scope {
        Scope::Singleton
    }

    fn construct(resolved: &Resolved) -> Result<Self, StdError>;

    /// Assigns property-style dependencies after construction.
    fn inject_properties(&mut self, resolved: &Resolved) -> Result<(), StdError> {
        let _ = resolved;
        Ok(())
    }
}

#[async_trait]
pub(crate) trait DynFactory: Send + Sync {
    async fn produce(&self, resolved: Resolved) -> Result<Instance, StdError>;
}

struct ClassFactory<C, V, F> {
    cast: F,
    _types: PhantomData<fn() -> (C, V)>,
}

#[async_trait]
impl<C, V, F> DynFactory for ClassFactory<C, V, F>
where
    C: Injectable,
    V: Clone + Send + Sync + 'static,
    F: Fn(Arc<C>) -> V + Send + Sync,
{
    async fn produce(&self, resolved: Resolved) -> Result<Instance, StdError> {
        let mut instance = C::construct(&resolved)?;
        instance.inject_properties(&resolved)?;
        Ok(Arc::new((self.cast)(Arc::new(instance))))
    }
}

struct SyncFactory<V, F> {
    func: F,
    _value: PhantomData<fn() -> V>,
}

#[async_trait]
impl<V, F> DynFactory for SyncFactory<V, F>
where
    V: Clone + Send + Sync + 'static,
    F: Fn(&Resolved) -> Result<V, StdError> + Send + Sync,
{
    async fn produce(&self, resolved: Resolved) -> Result<Instance, StdError> {
        Ok(Arc::new((self.func)(&resolved)?))
    }
}

struct AsyncFactory<V, F, Fut> {
    func: F,
    _types: PhantomData<fn() -> (V, Fut)>,
}

#[async_trait]
impl<V, F, Fut> DynFactory for AsyncFactory<V, F, Fut>
where
    V: Clone + Send + Sync + 'static,
    F: Fn(Resolved) -> Fut + Send + Sync,
    Fut: Future<Output = Result<V, StdError>> + Send + 'static,
{
    async fn produce(&self, resolved: Resolved) -> Result<Instance, StdError> {
        Ok(Arc::new((self.func)(resolved).await?))
    }
}

#[derive(Clone)]
pub(crate) enum ProviderKind {
    Class {
        name: &'static str,
        dependencies: Dependencies,
        factory: Arc<dyn DynFactory>,
    },
    Value(Instance),
    Factory {
        dependencies: Dependencies,
        factory: Arc<dyn DynFactory>,
    },
    Alias(Token),
}

/// Variant tag of a [`Provider`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderType {
    Class,
    Value,
    Factory,
    Alias,
}

/// Binding of a token to a production rule.
#[derive(Clone)]
pub struct Provider {
    token: Token,
    kind: ProviderKind,
    scope: Scope,
    multi: bool,
}

impl Provider {
    /// Binds the class `C` to its own class token.
    pub fn class<C>() -> Self
    where
        C: Injectable,
    {
        Self::provide(Token::of::<C>()).use_class::<C>()
    }

    /// Starts a provider for `token`.
    pub fn provide(token: impl Into<Token>) -> ProviderBuilder {
        ProviderBuilder {
            token: token.into(),
        }
    }

    pub fn token(&self) -> &Token {
        &self.token
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn is_multi(&self) -> bool {
        self.multi
    }

    pub fn provider_type(&self) -> ProviderType {
        match self.kind {
            ProviderKind::Class { .. } => ProviderType::Class,
            ProviderKind::Value(_) => ProviderType::Value,
            ProviderKind::Factory { .. } => ProviderType::Factory,
            ProviderKind::Alias(_) => ProviderType::Alias,
        }
    }

    /// Declared dependencies of class and factory providers.
    pub fn dependencies(&self) -> Option<&Dependencies> {
        match &self.kind {
            ProviderKind::Class { dependencies, .. } => Some(dependencies),
            ProviderKind::Factory { dependencies, .. } => Some(dependencies),
            _ => None,
        }
    }

    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    /// Marks the provider as one entry of a multi-binding.
    pub fn multi(self) -> Self {
        self.with_multi(true)
    }

    pub fn with_multi(mut self, multi: bool) -> Self {
        self.multi = multi;
        self
    }

    pub(crate) fn kind(&self) -> &ProviderKind {
        &self.kind
    }

    /// Human-readable declaration site used in diagnostics.
    pub(crate) fn declaration(&self) -> String {
        match &self.kind {
            ProviderKind::Class { name, .. } => (*name).to_owned(),
            ProviderKind::Value(_) => format!("value for {}", self.token),
            ProviderKind::Factory { .. } => format!("factory for {}", self.token),
            ProviderKind::Alias(target) => format!("alias {} -> {target}", self.token),
        }
    }

    /// Rejects multi-bindings keyed by class tokens, on the provider itself
    /// or on any of its dependency descriptors.
    pub(crate) fn validate(&self) -> Result<(), InjectError> {
        if self.multi && self.token.is_class() {
            return Err(InjectError::MissingInjectionToken {
                site: format!("provider {}", self.declaration()),
            });
        }
        match self.dependencies() {
            Some(dependencies) => dependencies.validate(&self.declaration()),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provider")
            .field("token", &self.token)
            .field("type", &self.provider_type())
            .field("scope", &self.scope)
            .field("multi", &self.multi)
            .finish()
    }
}

/// Builder returned by [`Provider::provide`].
pub struct ProviderBuilder {
    token: Token,
}

impl ProviderBuilder {
    /// Binds the token to the class `C`, producing `Arc<C>`.
    pub fn use_class<C>(self) -> Provider
    where
        C: Injectable,
    {
        self.use_class_as(|v: Arc<C>| v)
    }

    /// Binds the token to the class `C` and converts the constructed `Arc<C>`,
    /// typically into a trait object.
    pub fn use_class_as<C, V, F>(self, cast: F) -> Provider
    where
        C: Injectable,
        V: Clone + Send + Sync + 'static,
        F: Fn(Arc<C>) -> V + Send + Sync + 'static,
    {
        self.finish(
            ProviderKind::Class {
                name: type_name::<C>(),
                dependencies: C::dependencies(),
                factory: Arc::new(ClassFactory {
                    cast,
                    _types: PhantomData,
                }),
            },
            C::scope(),
        )
    }

    pub fn use_value<V>(self, value: V) -> Provider
    where
        V: Clone + Send + Sync + 'static,
    {
        self.finish(ProviderKind::Value(Arc::new(value)), Scope::Singleton)
    }

    pub fn use_factory<V, F>(self, dependencies: Dependencies, func: F) -> Provider
    where
        V: Clone + Send + Sync + 'static,
        F: Fn(&Resolved) -> Result<V, StdError> + Send + Sync + 'static,
    {
        self.finish(
            ProviderKind::Factory {
                dependencies,
                factory: Arc::new(SyncFactory {
                    func,
                    _value: PhantomData,
                }),
            },
            Scope::Singleton,
        )
    }

    /// Binds the token to a factory whose result is produced asynchronously.
    /// The dependent provider stays resolving until the future settles.
    pub fn use_async_factory<V, F, Fut>(self, dependencies: Dependencies, func: F) -> Provider
    where
        V: Clone + Send + Sync + 'static,
        F: Fn(Resolved) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V, StdError>> + Send + 'static,
    {
        self.finish(
            ProviderKind::Factory {
                dependencies,
                factory: Arc::new(AsyncFactory {
                    func,
                    _types: PhantomData,
                }),
            },
            Scope::Singleton,
        )
    }

    /// Binds the token to whatever `existing` resolves to.
    pub fn use_existing(self, existing: impl Into<Token>) -> Provider {
        self.finish(ProviderKind::Alias(existing.into()), Scope::Singleton)
    }

    fn finish(self, kind: ProviderKind, scope: Scope) -> Provider {
        Provider {
            token: self.token,
            kind,
            scope,
            multi: false,
        }
    }
}
