use std::collections::HashMap;

use crate::{InjectError, ModuleId, Provider, Token};

/// Per-module mapping of tokens to their providers.
///
/// Entries are kept in registration order, which is also the order in which
/// multi-binding instances are returned.
#[derive(Default)]
pub struct ProviderTable {
    modules: HashMap<ModuleId, LocalProviders>,
}

#[derive(Default)]
struct LocalProviders {
    // Replaced entries leave a hole so that slot numbers stay stable.
    entries: Vec<Option<Provider>>,
    by_token: HashMap<Token, Vec<usize>>,
}

impl ProviderTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a provider to the table of `module` and returns its slot.
    ///
    /// Several providers may share a token only when all of them are
    /// multi-bound.
    pub fn register(&mut self, module: &ModuleId, provider: Provider) -> Result<usize, InjectError> {
        provider.validate()?;
        let local = self.modules.entry(module.clone()).or_default();
        let slots = local.by_token.entry(provider.token().clone()).or_default();
        if let Some(&first) = slots.first() {
            let existing_multi = local.entries[first]
                .as_ref()
                .is_some_and(Provider::is_multi);
            if !existing_multi || !provider.is_multi() {
                return Err(InjectError::ConflictingProvider {
                    token: provider.token().clone(),
                    modules: vec![module.clone()],
                });
            }
        }
        let slot = local.entries.len();
        slots.push(slot);
        local.entries.push(Some(provider));
        Ok(slot)
    }

    /// Returns providers declared directly in `module` for `token`.
    pub fn lookup_local(&self, module: &ModuleId, token: &Token) -> Vec<(usize, &Provider)> {
        let Some(local) = self.modules.get(module) else {
            return Vec::new();
        };
        let Some(slots) = local.by_token.get(token) else {
            return Vec::new();
        };
        slots
            .iter()
            .filter_map(|&slot| local.entries[slot].as_ref().map(|v| (slot, v)))
            .collect()
    }

    pub fn contains(&self, module: &ModuleId, token: &Token) -> bool {
        self.modules
            .get(module)
            .is_some_and(|v| v.by_token.contains_key(token))
    }

    /// Returns every provider of `module` in registration order.
    pub fn providers(&self, module: &ModuleId) -> Vec<(usize, &Provider)> {
        match self.modules.get(module) {
            Some(local) => local
                .entries
                .iter()
                .enumerate()
                .filter_map(|(slot, v)| v.as_ref().map(|v| (slot, v)))
                .collect(),
            None => Vec::new(),
        }
    }

    /// Replaces all local providers of `token` in every module that declares
    /// it with the provider built by `replace` from the first original entry.
    ///
    /// Returns `false` when no module declares the token.
    pub(crate) fn replace<F>(&mut self, token: &Token, replace: F) -> bool
    where
        F: Fn(&Provider) -> Provider,
    {
        let mut found = false;
        for local in self.modules.values_mut() {
            let Some(slots) = local.by_token.get_mut(token) else {
                continue;
            };
            let Some(&first) = slots.first() else {
                continue;
            };
            let Some(original) = local.entries[first].as_ref() else {
                continue;
            };
            let replacement = replace(original);
            for &slot in slots.iter() {
                local.entries[slot] = None;
            }
            local.entries[first] = Some(replacement);
            slots.truncate(1);
            found = true;
        }
        found
    }
}
