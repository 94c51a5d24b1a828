use std::sync::Arc;

use weld::{Module, Provider};

use crate::{CONFIG, Config, TRACING, tracing_provider};

pub const BASE_MODULE: &str = "BaseModule";

/// Builds the module exporting [`CONFIG`] and [`TRACING`].
///
/// Importing it installs the tracing subscriber during compilation when
/// `config` has a `tracing` section.
pub fn base_module(config: Config) -> Module {
    Module::builder(BASE_MODULE)
        .provider(Provider::provide(&*CONFIG).use_value(Arc::new(config)))
        .provider(tracing_provider())
        .export(&*CONFIG)
        .export(&*TRACING)
        .build()
}
