use std::collections::{HashMap, HashSet, VecDeque};

use crate::{Export, InjectError, ModuleId, Provider, ProviderTable, Token};

/// Provider visible from a module, together with the module that owns it.
#[derive(Clone, Copy)]
pub struct VisibleProvider<'a> {
    pub owner: &'a ModuleId,
    pub slot: usize,
    pub provider: &'a Provider,
}

struct ModuleNode {
    id: ModuleId,
    imports: Vec<ModuleId>,
    exports: Vec<Export>,
    controllers: Vec<Token>,
}

impl ModuleNode {
    fn exports_token(&self, token: &Token) -> bool {
        self.exports
            .iter()
            .any(|v| matches!(v, Export::Token(t) if t == token))
    }

    fn exports_module(&self, module: &ModuleId) -> bool {
        self.exports
            .iter()
            .any(|v| matches!(v, Export::Module(m) if m == module))
    }
}

/// Directed graph of modules and the provider table they own.
///
/// The graph is built in two phases: [`add_module`](Self::add_module) records
/// identities and edges, [`validate`](Self::validate) checks that every edge
/// and export points somewhere. Visibility is computed on demand, so an
/// import of a module declared later needs nothing but its id.
pub struct ModuleGraph {
    nodes: Vec<ModuleNode>,
    index: HashMap<ModuleId, usize>,
    table: ProviderTable,
}

impl ModuleGraph {
    pub fn new(table: ProviderTable) -> Self {
        Self {
            nodes: Vec::new(),
            index: HashMap::new(),
            table,
        }
    }

    pub fn add_module(
        &mut self,
        id: ModuleId,
        imports: Vec<ModuleId>,
        exports: Vec<Export>,
        controllers: Vec<Token>,
    ) -> Result<(), InjectError> {
        if self.index.contains_key(&id) {
            return Err(InjectError::DuplicateModule { module: id });
        }
        self.index.insert(id.clone(), self.nodes.len());
        self.nodes.push(ModuleNode {
            id,
            imports,
            exports,
            controllers,
        });
        Ok(())
    }

    /// Checks imports and exports once every module has been added.
    pub fn validate(&self) -> Result<(), InjectError> {
        for node in &self.nodes {
            for import in &node.imports {
                if !self.index.contains_key(import) {
                    return Err(InjectError::UnknownModule {
                        module: import.clone(),
                        referrer: Some(node.id.clone()),
                    });
                }
            }
            for export in &node.exports {
                match export {
                    Export::Token(token) => {
                        if !self.table.contains(&node.id, token)
                            && !self.visible_through_imports(node, token)
                        {
                            return Err(InjectError::UnknownExport {
                                module: node.id.clone(),
                                export: export.clone(),
                            });
                        }
                    }
                    Export::Module(module) => {
                        if !node.imports.contains(module) {
                            return Err(InjectError::UnknownExport {
                                module: node.id.clone(),
                                export: export.clone(),
                            });
                        }
                    }
                }
            }
        }
        Ok(())
    }

    pub fn contains(&self, module: &ModuleId) -> bool {
        self.index.contains_key(module)
    }

    /// Returns module ids in declaration order.
    pub fn modules(&self) -> impl Iterator<Item = &ModuleId> {
        self.nodes.iter().map(|v| &v.id)
    }

    pub fn imports(&self, module: &ModuleId) -> Option<&[ModuleId]> {
        self.node(module).map(|v| v.imports.as_slice())
    }

    pub fn table(&self) -> &ProviderTable {
        &self.table
    }

    /// Returns controller tokens together with their module.
    pub fn controllers(&self) -> impl Iterator<Item = (&ModuleId, &Token)> {
        self.nodes
            .iter()
            .flat_map(|node| node.controllers.iter().map(move |v| (&node.id, v)))
    }

    /// Returns modules reachable from `roots` through imports, in declaration
    /// order.
    pub fn reachable_from(&self, roots: &[ModuleId]) -> Vec<&ModuleId> {
        let mut seen = vec![false; self.nodes.len()];
        let mut queue: VecDeque<usize> =
            roots.iter().filter_map(|v| self.index.get(v).copied()).collect();
        while let Some(idx) = queue.pop_front() {
            if seen[idx] {
                continue;
            }
            seen[idx] = true;
            for import in &self.nodes[idx].imports {
                if let Some(&next) = self.index.get(import) {
                    queue.push_back(next);
                }
            }
        }
        self.nodes
            .iter()
            .zip(seen)
            .filter_map(|(node, seen)| seen.then_some(&node.id))
            .collect()
    }

    /// Returns every provider of `token` visible from `module`.
    ///
    /// Local providers come first, followed by the providers exported by each
    /// import in declaration order. An imported module exposes its own
    /// imports only for tokens or modules it explicitly re-exports.
    pub fn resolve_visible(
        &self,
        module: &ModuleId,
        token: &Token,
    ) -> Result<Vec<VisibleProvider<'_>>, InjectError> {
        let idx = *self
            .index
            .get(module)
            .ok_or_else(|| InjectError::UnknownModule {
                module: module.clone(),
                referrer: None,
            })?;
        let mut visited = HashSet::new();
        let mut found = Vec::new();
        self.collect(idx, token, true, &mut visited, &mut found);
        Ok(found)
    }

    fn collect<'a>(
        &'a self,
        idx: usize,
        token: &Token,
        requester: bool,
        visited: &mut HashSet<usize>,
        found: &mut Vec<VisibleProvider<'a>>,
    ) {
        if !visited.insert(idx) {
            return;
        }
        let node = &self.nodes[idx];
        let exported = node.exports_token(token);
        if requester || exported {
            found.extend(
                self.table
                    .lookup_local(&node.id, token)
                    .into_iter()
                    .map(|(slot, provider)| VisibleProvider {
                        owner: &node.id,
                        slot,
                        provider,
                    }),
            );
        }
        for import in &node.imports {
            let Some(&next) = self.index.get(import) else {
                continue;
            };
            if requester || exported || node.exports_module(import) {
                self.collect(next, token, false, visited, found);
            }
        }
    }

    fn visible_through_imports(&self, node: &ModuleNode, token: &Token) -> bool {
        let mut visited = HashSet::new();
        let mut found = Vec::new();
        if let Some(&idx) = self.index.get(&node.id) {
            visited.insert(idx);
        }
        for import in &node.imports {
            if let Some(&next) = self.index.get(import) {
                self.collect(next, token, false, &mut visited, &mut found);
            }
        }
        !found.is_empty()
    }

    fn node(&self, module: &ModuleId) -> Option<&ModuleNode> {
        self.index.get(module).map(|&v| &self.nodes[v])
    }
}
