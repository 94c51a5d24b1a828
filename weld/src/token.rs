//! Dependency keys.
//!
//! A [`Token`] is either a class reference, whose identity is the Rust type
//! itself, or an explicit token allocated at runtime. Explicit tokens compare
//! by allocation, so two tokens created with the same description are still
//! distinct keys.
//!
//! ```rust
//! use weld::{InjectionToken, Token};
//!
//! struct Katana;
//!
//! let weapon = InjectionToken::<String>::new("WEAPON");
//! let other = InjectionToken::<String>::new("WEAPON");
//!
//! assert_eq!(Token::of::<Katana>(), Token::of::<Katana>());
//! assert_ne!(weapon.token(), other.token());
//! assert_eq!(weapon.token(), weapon.clone().token());
//! ```

use std::any::{TypeId, type_name};
use std::borrow::Cow;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::Arc;

/// Identity key of a dependency.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum Token {
    /// Key derived from a Rust type.
    Class(ClassToken),
    /// Key allocated by [`Token::create`] or [`InjectionToken::new`].
    Explicit(ExplicitToken),
}

impl Token {
    /// Returns the class-reference token of `T`.
    pub fn of<T>() -> Self
    where
        T: ?Sized + 'static,
    {
        Token::Class(ClassToken {
            type_id: TypeId::of::<T>(),
            name: type_name::<T>(),
        })
    }

    /// Allocates a fresh explicit token.
    ///
    /// The returned token is distinct from every class token and from every
    /// other explicit token, whatever their descriptions are.
    pub fn create(description: Option<Cow<'static, str>>) -> Self {
        Token::Explicit(ExplicitToken(Arc::new(TokenMeta { description })))
    }

    /// Allocates a fresh explicit token carrying a description.
    pub fn explicit(description: impl Into<Cow<'static, str>>) -> Self {
        Self::create(Some(description.into()))
    }

    /// Allocates a fresh explicit token without a description.
    pub fn anonymous() -> Self {
        Self::create(None)
    }

    /// Returns `true` for class-reference tokens.
    ///
    /// Class tokens can never carry multi-bindings.
    pub fn is_class(&self) -> bool {
        matches!(self, Token::Class(_))
    }

    /// Returns the human-readable part of the token.
    pub fn description(&self) -> Option<&str> {
        match self {
            Token::Class(v) => Some(v.name),
            Token::Explicit(v) => v.0.description.as_deref(),
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Class(v) => f.write_str(v.name),
            Token::Explicit(v) => match &v.0.description {
                Some(description) => f.write_str(description),
                None => write!(f, "InjectionToken({:p})", Arc::as_ptr(&v.0)),
            },
        }
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Class(v) => write!(f, "Class({})", v.name),
            Token::Explicit(_) => write!(f, "InjectionToken({self})"),
        }
    }
}

impl From<&Token> for Token {
    fn from(value: &Token) -> Self {
        value.clone()
    }
}

/// Class-reference half of [`Token`].
#[derive(Clone, Copy)]
pub struct ClassToken {
    type_id: TypeId,
    name: &'static str,
}

impl ClassToken {
    pub fn type_name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for ClassToken {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for ClassToken {}

impl Hash for ClassToken {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
    }
}

struct TokenMeta {
    description: Option<Cow<'static, str>>,
}

/// Explicit half of [`Token`]. Equality is allocation identity.
#[derive(Clone)]
pub struct ExplicitToken(Arc<TokenMeta>);

impl PartialEq for ExplicitToken {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for ExplicitToken {}

impl Hash for ExplicitToken {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::ptr::hash(Arc::as_ptr(&self.0), state);
    }
}

/// Explicit token that remembers the value type its providers produce.
///
/// Usually declared once as a static and shared between the module that binds
/// it and the classes that depend on it:
///
/// ```rust
/// use std::sync::{Arc, LazyLock};
/// use weld::InjectionToken;
///
/// trait Weapon: Send + Sync {}
///
/// static WEAPON: LazyLock<InjectionToken<Arc<dyn Weapon>>> =
///     LazyLock::new(|| InjectionToken::new("WEAPON"));
/// ```
pub struct InjectionToken<V> {
    token: Token,
    _value: PhantomData<fn() -> V>,
}

impl<V> InjectionToken<V> {
    pub fn new(description: impl Into<Cow<'static, str>>) -> Self {
        Self {
            token: Token::explicit(description),
            _value: PhantomData,
        }
    }

    pub fn anonymous() -> Self {
        Self {
            token: Token::anonymous(),
            _value: PhantomData,
        }
    }

    /// Returns the untyped key.
    pub fn token(&self) -> Token {
        self.token.clone()
    }
}

impl<V> Clone for InjectionToken<V> {
    fn clone(&self) -> Self {
        Self {
            token: self.token.clone(),
            _value: PhantomData,
        }
    }
}

impl<V> fmt::Debug for InjectionToken<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.token, f)
    }
}

impl<V> From<&InjectionToken<V>> for Token {
    fn from(value: &InjectionToken<V>) -> Self {
        value.token()
    }
}

impl<V> From<InjectionToken<V>> for Token {
    fn from(value: InjectionToken<V>) -> Self {
        value.token
    }
}

/// Typed key accepted by the container query methods.
pub trait Key {
    /// Value produced by the providers bound to this key.
    type Value: Clone + Send + Sync + 'static;

    fn token(&self) -> Token;
}

impl<V> Key for InjectionToken<V>
where
    V: Clone + Send + Sync + 'static,
{
    type Value = V;

    fn token(&self) -> Token {
        self.token.clone()
    }
}
