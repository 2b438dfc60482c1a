use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// Index of a symbol within its table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolId(pub usize);

/// Handle to a symbol, as stored inside expressions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolRef {
    id: SymbolId,
    name: Rc<str>,
}

impl SymbolRef {
    pub fn id(&self) -> SymbolId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for SymbolRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// A named symbol and every line it has been used on.
#[derive(Debug, Clone)]
pub struct Symbol {
    name: Rc<str>,
    use_lines: Vec<u64>,
}

impl Symbol {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn first_use_line(&self) -> Option<u64> {
        self.use_lines.first().copied()
    }

    /// All recorded uses, oldest first. Repeated uses on the same line are kept.
    pub fn use_lines(&self) -> &[u64] {
        &self.use_lines
    }
}

/// Name-to-symbol table. Symbols are created on first use and never removed.
#[derive(Debug)]
pub struct SymbolTable {
    symbols: Vec<Symbol>,
    index: HashMap<String, SymbolId>,
    case_sensitive: bool,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable {
            symbols: Vec::new(),
            index: HashMap::new(),
            case_sensitive: true,
        }
    }

    /// A table whose lookups ignore ASCII case. The first spelling seen is kept.
    pub fn case_insensitive() -> Self {
        SymbolTable {
            case_sensitive: false,
            ..SymbolTable::new()
        }
    }

    pub fn is_case_sensitive(&self) -> bool {
        self.case_sensitive
    }

    fn key(&self, name: &str) -> String {
        if self.case_sensitive {
            name.to_string()
        } else {
            name.to_ascii_lowercase()
        }
    }

    /// Look up `name`, creating it if needed, and record a use at `line`.
    pub fn use_symbol(&mut self, name: &str, line: u64) -> SymbolRef {
        let key = self.key(name);
        let id = match self.index.get(&key) {
            Some(&id) => id,
            None => {
                let id = SymbolId(self.symbols.len());
                log::trace!("new symbol `{}' (first used on line {})", name, line);
                self.symbols.push(Symbol {
                    name: Rc::from(name),
                    use_lines: Vec::new(),
                });
                self.index.insert(key, id);
                id
            }
        };

        let symbol = &mut self.symbols[id.0];
        symbol.use_lines.push(line);
        SymbolRef {
            id,
            name: Rc::clone(&symbol.name),
        }
    }

    pub fn get(&self, id: SymbolId) -> Option<&Symbol> {
        self.symbols.get(id.0)
    }

    /// Look up a symbol without recording a use.
    pub fn lookup(&self, name: &str) -> Option<&Symbol> {
        self.index
            .get(&self.key(name))
            .and_then(|id| self.symbols.get(id.0))
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Symbols in creation order.
    pub fn iter(&self) -> impl Iterator<Item = (SymbolId, &Symbol)> {
        self.symbols
            .iter()
            .enumerate()
            .map(|(i, sym)| (SymbolId(i), sym))
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        SymbolTable::new()
    }
}
