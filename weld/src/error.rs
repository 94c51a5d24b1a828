use std::fmt;
use std::sync::Arc;

use crate::{Export, ModuleId, Token};

/// Type alias for boxed errors that can be sent across threads.
///
/// Constructors and factories report their own failures with this type; the
/// injector wraps them into [`InjectError::ProviderError`].
pub type StdError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur while compiling a container or resolving a token.
#[derive(Debug, Clone)]
pub enum InjectError {
    /// No provider for the token is visible from the requesting module.
    UnknownDependency {
        token: Token,
        module: ModuleId,
        /// Tokens from the resolution root down to the missing one.
        chain: Vec<Token>,
    },
    /// A token was re-entered while it was still being resolved.
    CircularDependency {
        /// Tokens from the first occurrence back to itself.
        cycle: Vec<Token>,
    },
    /// Several single providers, or providers with mismatched `multi` flags,
    /// are bound to one token within one visibility scope.
    ConflictingProvider { token: Token, modules: Vec<ModuleId> },
    /// A multi-binding was declared against a class token.
    MissingInjectionToken { site: String },
    /// An override names a token no module declares.
    OverrideTargetNotFound { token: Token },
    /// A module id is referenced but never declared.
    UnknownModule {
        module: ModuleId,
        referrer: Option<ModuleId>,
    },
    /// Two distinct definitions share one module id.
    DuplicateModule { module: ModuleId },
    /// A module exports a token or module it can not see.
    UnknownExport { module: ModuleId, export: Export },
    /// The caller expected the opposite multiplicity than the token is bound with.
    MultiBindingMismatch { token: Token, multi: bool },
    /// A request-scoped provider was resolved outside of a request context.
    MissingRequestContext { token: Token },
    /// The produced instance is not of the requested type.
    TypeMismatch {
        token: Token,
        expected: &'static str,
    },
    /// A constructor asked for an argument it did not declare.
    MissingArgument { site: String },
    /// A constructor or factory failed.
    ProviderError {
        token: Token,
        source: Arc<dyn std::error::Error + Send + Sync>,
    },
}

impl InjectError {
    pub(crate) fn provider(token: &Token, source: StdError) -> Self {
        Self::ProviderError {
            token: token.clone(),
            source: Arc::from(source),
        }
    }
}

fn write_tokens(f: &mut fmt::Formatter<'_>, tokens: &[Token]) -> fmt::Result {
    for (i, token) in tokens.iter().enumerate() {
        if i > 0 {
            f.write_str(" -> ")?;
        }
        write!(f, "{token}")?;
    }
    Ok(())
}

impl fmt::Display for InjectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InjectError::UnknownDependency {
                token,
                module,
                chain,
            } => {
                write!(f, "Unknown dependency {token} in module {module} (")?;
                write_tokens(f, chain)?;
                f.write_str(")")
            }
            InjectError::CircularDependency { cycle } => {
                f.write_str("Circular dependency detected: ")?;
                write_tokens(f, cycle)
            }
            InjectError::ConflictingProvider { token, modules } => {
                write!(f, "Conflicting providers for {token} in modules [")?;
                for (i, module) in modules.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{module}")?;
                }
                f.write_str("]")
            }
            InjectError::MissingInjectionToken { site } => write!(
                f,
                "Missing injection token at {site}: multi-bindings require an explicit token"
            ),
            InjectError::OverrideTargetNotFound { token } => {
                write!(f, "Override target {token} is not provided by any module")
            }
            InjectError::UnknownModule { module, referrer } => match referrer {
                Some(referrer) => write!(f, "Unknown module {module} imported by {referrer}"),
                None => write!(f, "Unknown module {module}"),
            },
            InjectError::DuplicateModule { module } => {
                write!(f, "Module {module} is declared more than once")
            }
            InjectError::UnknownExport { module, export } => {
                write!(f, "Module {module} exports {export} which it neither provides nor imports")
            }
            InjectError::MultiBindingMismatch { token, multi } => {
                if *multi {
                    write!(f, "Token {token} is multi-bound, resolve it as a list")
                } else {
                    write!(f, "Token {token} is not multi-bound, resolve it as a single instance")
                }
            }
            InjectError::MissingRequestContext { token } => {
                write!(f, "Request-scoped {token} resolved outside of a request context")
            }
            InjectError::TypeMismatch { token, expected } => {
                write!(f, "Instance of {token} is not of type {expected}")
            }
            InjectError::MissingArgument { site } => write!(f, "Missing argument: {site}"),
            InjectError::ProviderError { token, source } => {
                write!(f, "Provider error for {token}: {source}")
            }
        }
    }
}

impl std::error::Error for InjectError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            InjectError::ProviderError { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}
