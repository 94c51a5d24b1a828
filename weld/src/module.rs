use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use crate::{Provider, Token};

/// Name of a module in the graph.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(Cow<'static, str>);

impl ModuleId {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ModuleId({})", self.0)
    }
}

impl From<&'static str> for ModuleId {
    fn from(value: &'static str) -> Self {
        Self(Cow::Borrowed(value))
    }
}

impl From<String> for ModuleId {
    fn from(value: String) -> Self {
        Self(Cow::Owned(value))
    }
}

impl From<&ModuleId> for ModuleId {
    fn from(value: &ModuleId) -> Self {
        value.clone()
    }
}

/// Edge from a module to one of its imports.
#[derive(Clone)]
pub enum Import {
    /// Reference by id. The target may be declared later, which is how
    /// circular module imports are expressed.
    Ref(ModuleId),
    /// Nested definition, registered together with the importer.
    Module(Module),
}

impl Import {
    pub fn id(&self) -> &ModuleId {
        match self {
            Import::Ref(id) => id,
            Import::Module(module) => module.id(),
        }
    }
}

impl From<&'static str> for Import {
    fn from(value: &'static str) -> Self {
        Import::Ref(value.into())
    }
}

impl From<ModuleId> for Import {
    fn from(value: ModuleId) -> Self {
        Import::Ref(value)
    }
}

impl From<Module> for Import {
    fn from(value: Module) -> Self {
        Import::Module(value)
    }
}

impl From<&Module> for Import {
    fn from(value: &Module) -> Self {
        Import::Module(value.clone())
    }
}

/// Entry of a module export list.
#[derive(Clone, Debug)]
pub enum Export {
    /// A local or imported token made visible to importers.
    Token(Token),
    /// Everything an imported module exports, re-exported verbatim.
    Module(ModuleId),
}

impl fmt::Display for Export {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Export::Token(token) => write!(f, "{token}"),
            Export::Module(module) => write!(f, "module {module}"),
        }
    }
}

/// Declarative description of a module.
///
/// Modules are immutable once built and cheap to clone.
///
/// ```rust
/// use weld::{InjectionToken, Module, Provider};
///
/// let greeting = InjectionToken::<String>::new("GREETING");
///
/// let module = Module::builder("GreetingModule")
///     .provider(Provider::provide(&greeting).use_value("hello".to_string()))
///     .export(&greeting)
///     .build();
///
/// assert_eq!(module.id().as_str(), "GreetingModule");
/// assert_eq!(module.providers().len(), 1);
/// ```
#[derive(Clone)]
pub struct Module {
    def: Arc<ModuleDef>,
}

struct ModuleDef {
    id: ModuleId,
    providers: Vec<Provider>,
    controllers: Vec<Provider>,
    imports: Vec<Import>,
    exports: Vec<Export>,
}

impl Module {
    pub fn builder(id: impl Into<ModuleId>) -> ModuleBuilder {
        ModuleBuilder {
            def: ModuleDef {
                id: id.into(),
                providers: Vec::new(),
                controllers: Vec::new(),
                imports: Vec::new(),
                exports: Vec::new(),
            },
        }
    }

    pub fn id(&self) -> &ModuleId {
        &self.def.id
    }

    pub fn providers(&self) -> &[Provider] {
        &self.def.providers
    }

    pub fn controllers(&self) -> &[Provider] {
        &self.def.controllers
    }

    pub fn imports(&self) -> &[Import] {
        &self.def.imports
    }

    pub fn exports(&self) -> &[Export] {
        &self.def.exports
    }

    /// Returns `true` when both values come from the same definition.
    pub(crate) fn same_definition(&self, other: &Module) -> bool {
        Arc::ptr_eq(&self.def, &other.def)
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("id", &self.def.id)
            .field("providers", &self.def.providers.len())
            .field("controllers", &self.def.controllers.len())
            .field(
                "imports",
                &self.def.imports.iter().map(Import::id).collect::<Vec<_>>(),
            )
            .field("exports", &self.def.exports)
            .finish()
    }
}

/// Builder returned by [`Module::builder`].
pub struct ModuleBuilder {
    def: ModuleDef,
}

impl ModuleBuilder {
    pub fn provider(mut self, provider: Provider) -> Self {
        self.def.providers.push(provider);
        self
    }

    pub fn providers(mut self, providers: impl IntoIterator<Item = Provider>) -> Self {
        self.def.providers.extend(providers);
        self
    }

    /// Adds a controller. Controllers are resolved like local providers but
    /// are never exported.
    pub fn controller(mut self, controller: Provider) -> Self {
        self.def.controllers.push(controller);
        self
    }

    pub fn import(mut self, import: impl Into<Import>) -> Self {
        self.def.imports.push(import.into());
        self
    }

    pub fn export(mut self, token: impl Into<Token>) -> Self {
        self.def.exports.push(Export::Token(token.into()));
        self
    }

    pub fn export_module(mut self, module: impl Into<ModuleId>) -> Self {
        self.def.exports.push(Export::Module(module.into()));
        self
    }

    pub fn build(self) -> Module {
        Module {
            def: Arc::new(self.def),
        }
    }
}
