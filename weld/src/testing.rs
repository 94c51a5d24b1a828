use crate::{Container, Import, InjectError, Module, ModuleBuilder, Override, Provider};

const TESTING_MODULE: &str = "TestingModule";

/// Harness that compiles a container for tests.
///
/// ```rust
/// use weld::{InjectionToken, Provider, Testing};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let port = InjectionToken::<u16>::new("PORT");
///
/// let container = Testing::create()
///     .provider(Provider::provide(&port).use_value(8080u16))
///     .override_provider(Provider::provide(&port).use_value(0u16))
///     .compile()
///     .await?;
///
/// assert_eq!(container.get(&port).await?, 0);
/// # Ok(())
/// # }
/// ```
pub struct Testing {
    module: ModuleBuilder,
    target: Option<Module>,
    overrides: Vec<Override>,
}

impl Testing {
    /// Starts a flat testing module.
    pub fn create() -> Self {
        Self {
            module: Module::builder(TESTING_MODULE),
            target: None,
            overrides: Vec::new(),
        }
    }

    /// Starts from an application module tree, which becomes the root.
    ///
    /// Providers added to the harness live in a separate testing module that
    /// imports `module`.
    pub fn for_module(module: Module) -> Self {
        Self {
            module: Module::builder(TESTING_MODULE).import(module.id().clone()),
            target: Some(module),
            overrides: Vec::new(),
        }
    }

    pub fn provider(mut self, provider: Provider) -> Self {
        self.module = self.module.provider(provider);
        self
    }

    pub fn providers(mut self, providers: impl IntoIterator<Item = Provider>) -> Self {
        self.module = self.module.providers(providers);
        self
    }

    pub fn controller(mut self, controller: Provider) -> Self {
        self.module = self.module.controller(controller);
        self
    }

    pub fn import(mut self, import: impl Into<Import>) -> Self {
        self.module = self.module.import(import);
        self
    }

    pub fn override_provider(mut self, provider: impl Into<Override>) -> Self {
        self.overrides.push(provider.into());
        self
    }

    pub async fn compile(self) -> Result<Container, InjectError> {
        let mut builder = Container::builder();
        if let Some(target) = &self.target {
            builder.add_module(target.clone()).root(target.id().clone());
        }
        builder.add_module(self.module.build());
        for item in self.overrides {
            builder.override_provider(item);
        }
        builder.compile().await
    }
}
