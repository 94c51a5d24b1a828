//! # weld
//!
//! A module-based dependency injection runtime. Providers are grouped into
//! modules with explicit imports and exports, compiled into an immutable
//! container, and resolved with singleton, request or transient lifetimes.
//!
//! ## Core Concepts
//!
//! - **Token**: identity of a dependency, either a Rust type or an explicit
//!   [`InjectionToken`]
//! - **Provider**: how to produce the value of a token (class, value, factory
//!   or alias)
//! - **Module**: a named group of providers with controlled visibility
//! - **Container**: the compiled graph, answering `get` and `get_all` queries
//!
//! ## Basic Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use weld::{Container, Dependencies, Injectable, Module, Provider, Resolved, StdError, Token};
//!
//! struct Config {
//!     url: String,
//! }
//!
//! impl Injectable for Config {
//!     fn construct(_resolved: &Resolved) -> Result<Self, StdError> {
//!         Ok(Self {
//!             url: "postgresql://localhost:5432/app".to_string(),
//!         })
//!     }
//! }
//!
//! struct Database {
//!     config: Arc<Config>,
//! }
//!
//! impl Injectable for Database {
//!     fn dependencies() -> Dependencies {
//!         Dependencies::new().inject(Token::of::<Config>())
//!     }
//!
//!     fn construct(resolved: &Resolved) -> Result<Self, StdError> {
//!         Ok(Self {
//!             config: resolved.get(0)?,
//!         })
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let container = Container::builder()
//!         .add_module(
//!             Module::builder("AppModule")
//!                 .provider(Provider::class::<Config>())
//!                 .provider(Provider::class::<Database>())
//!                 .build(),
//!         )
//!         .compile()
//!         .await?;
//!
//!     let database = container.get_class::<Database>().await?;
//!     println!("Database url: {}", database.config.url);
//!     Ok(())
//! }
//! ```
//!
//! ## Multi-bindings
//!
//! Several providers may share one explicit token when each of them is
//! marked `multi`. They resolve as a list in declaration order:
//!
//! ```rust
//! use std::sync::LazyLock;
//! use weld::{InjectionToken, Provider, Testing};
//!
//! static PLUGINS: LazyLock<InjectionToken<&'static str>> =
//!     LazyLock::new(|| InjectionToken::new("PLUGINS"));
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let container = Testing::create()
//!     .provider(Provider::provide(&*PLUGINS).use_value("auth").multi())
//!     .provider(Provider::provide(&*PLUGINS).use_value("metrics").multi())
//!     .compile()
//!     .await?;
//!
//! assert_eq!(container.get_all(&*PLUGINS).await?, vec!["auth", "metrics"]);
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! A token declared in a module is only visible to importers when the module
//! exports it:
//!
//! ```rust
//! use weld::{InjectError, InjectionToken, Module, Provider, Testing};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let secret = InjectionToken::<String>::new("SECRET");
//!
//! let vault = Module::builder("VaultModule")
//!     .provider(Provider::provide(&secret).use_value("42".to_string()))
//!     .build();
//!
//! let container = Testing::create().import(vault).compile().await?;
//!
//! assert!(matches!(
//!     container.get(&secret).await,
//!     Err(InjectError::UnknownDependency { .. })
//! ));
//! assert_eq!(container.select("VaultModule")?.get(&secret).await?, "42");
//! # Ok(())
//! # }
//! ```

mod container;
mod error;
mod graph;
mod injector;
mod module;
mod provider;
mod table;
mod testing;
mod token;
mod wrapper;

pub use container::*;
pub use error::*;
pub use graph::*;
pub use injector::{RequestContext, Resolution};
pub use module::*;
pub use provider::{
    Dependencies, Dependency, Injectable, Instance, Provider, ProviderBuilder, ProviderType,
    Resolved, Scope,
};
pub use table::*;
pub use testing::*;
pub use token::*;
pub use wrapper::*;
