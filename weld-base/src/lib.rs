//! # weld-base
//!
//! Configuration and logging for weld applications, packaged as a module
//! that the application imports.
//!
//! ## Core Components
//!
//! - **Configuration**: JSON sections merged from several sources and read
//!   through typed [`ConfigSection`]s
//! - **Tracing**: a `tracing-subscriber` registry with a reloadable level
//!   filter, installed while the container compiles
//!
//! ## Quick Start
//!
//! ```rust
//! use weld::Testing;
//! use weld_base::{CONFIG, Config, base_module};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//! let config = Config::new().with("app", "demo");
//!
//! let container = Testing::create()
//!     .import(base_module(config))
//!     .compile()
//!     .await?;
//!
//! let config = container.get(&*CONFIG).await?;
//! let name: String = config.get("app")?;
//! assert_eq!(name, "demo");
//! # Ok(())
//! # }
//! ```

mod config;
mod module;
mod tracing;

pub use config::*;
pub use module::*;
pub use tracing::*;
