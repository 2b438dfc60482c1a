use std::collections::HashMap;

use valparam::ValParamList;

use crate::definition::Directive;
use crate::error::DirectiveError;

/// Table of directives known to an assembly pass, indexed by name.
pub struct DirectiveRegistry<O> {
    directives: HashMap<String, Directive<O>>,
    /// Lowercased name to the first registered spelling that folds to it.
    folded: HashMap<String, String>,
}

impl<O> DirectiveRegistry<O> {
    pub fn new() -> Self {
        DirectiveRegistry {
            directives: HashMap::new(),
            folded: HashMap::new(),
        }
    }

    /// Add a directive, returning any earlier directive registered under the same name.
    pub fn register(&mut self, directive: Directive<O>) -> Option<Directive<O>> {
        let name = directive.name().to_string();
        self.folded
            .entry(name.to_ascii_lowercase())
            .or_insert_with(|| name.clone());
        self.directives.insert(name, directive)
    }

    pub fn get(&self, name: &str) -> Option<&Directive<O>> {
        self.directives.get(name)
    }

    /// Case-insensitive directive lookup. Tries exact match first, then case-insensitive.
    /// When several spellings fold together, the one registered first answers.
    pub fn get_entry(&self, name: &str) -> Option<&Directive<O>> {
        self.directives.get(name).or_else(|| {
            self.folded
                .get(&name.to_ascii_lowercase())
                .and_then(|registered| self.directives.get(registered))
        })
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.directives.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.directives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.directives.is_empty()
    }

    /// Look up `name` and run it through the argument checks.
    /// Unknown names fail without touching the lists, so the caller may try elsewhere.
    pub fn dispatch(
        &self,
        name: &str,
        object: &mut O,
        valparams: Option<&mut ValParamList>,
        objext_valparams: Option<&mut ValParamList>,
        line: u64,
    ) -> Result<(), DirectiveError> {
        let directive = self.get_entry(name).ok_or_else(|| {
            log::debug!("line {}: no directive named `{}'", line, name);
            DirectiveError::Unrecognized {
                name: name.to_string(),
            }
        })?;
        directive.call(object, valparams, objext_valparams, line)
    }
}

impl<O> Default for DirectiveRegistry<O> {
    fn default() -> Self {
        DirectiveRegistry::new()
    }
}
