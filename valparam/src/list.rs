use std::fmt;
use std::io::{self, Write};
use std::ops::Deref;

use crate::expr::Expr;
use crate::symbol::SymbolTable;

/// One value/parameter of a directive: an identifier or string (`val`), an expression
/// (`param`), both, or neither.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValParam {
    val: Option<String>,
    param: Option<Expr>,
}

impl ValParam {
    pub fn new(val: Option<String>, param: Option<Expr>) -> Self {
        ValParam { val, param }
    }

    /// A bare identifier or string parameter.
    pub fn id(val: impl Into<String>) -> Self {
        ValParam {
            val: Some(val.into()),
            param: None,
        }
    }

    /// An expression parameter.
    pub fn expr(param: Expr) -> Self {
        ValParam {
            val: None,
            param: Some(param),
        }
    }

    pub fn val(&self) -> Option<&str> {
        self.val.as_deref()
    }

    pub fn param(&self) -> Option<&Expr> {
        self.param.as_ref()
    }

    /// Move the expression out, leaving the parameter without one.
    pub fn take_param(&mut self) -> Option<Expr> {
        self.param.take()
    }

    /// Convert the parameter to an expression.
    ///
    /// When `val` is set it wins: it is resolved as a symbol name (recording a use at
    /// `line`) and wrapped in an identity expression, leaving the entry untouched. Each
    /// call records a fresh use. Otherwise the stored expression is moved out, so a
    /// second call yields `None`.
    pub fn to_expr(&mut self, symtab: &mut SymbolTable, line: u64) -> Option<Expr> {
        if let Some(val) = &self.val {
            let sym = symtab.use_symbol(val, line);
            return Some(Expr::sym(sym, line));
        }
        self.take_param()
    }
}

/// [`ValParam::to_expr`] for a parameter that may not exist.
pub fn to_expr(vp: Option<&mut ValParam>, symtab: &mut SymbolTable, line: u64) -> Option<Expr> {
    vp.and_then(|vp| vp.to_expr(symtab, line))
}

impl fmt::Display for ValParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.val {
            Some(val) => write!(f, "(\"{}\",", val)?,
            None => write!(f, "((nil),")?,
        }
        match &self.param {
            Some(param) => write!(f, "{}", param)?,
            None => write!(f, "(nil)")?,
        }
        write!(f, ")")
    }
}

/// Ordered list of value/parameters attached to a directive.
/// The list owns its entries; entries are appended at the tail and only ever
/// removed all at once.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValParamList {
    entries: Vec<ValParam>,
}

impl ValParamList {
    pub fn new() -> Self {
        ValParamList {
            entries: Vec::new(),
        }
    }

    /// Append at the tail. Appending `None` does nothing.
    pub fn append(&mut self, vp: impl Into<Option<ValParam>>) {
        if let Some(vp) = vp.into() {
            self.entries.push(vp);
        }
    }

    /// Chained form of [`append`](Self::append).
    pub fn with(mut self, vp: impl Into<Option<ValParam>>) -> Self {
        self.append(vp);
        self
    }

    pub fn first(&self) -> Option<Entry<'_>> {
        self.entry(0)
    }

    pub fn first_mut(&mut self) -> Option<&mut ValParam> {
        self.entries.first_mut()
    }

    pub fn entry(&self, index: usize) -> Option<Entry<'_>> {
        (index < self.entries.len()).then_some(Entry { list: self, index })
    }

    pub fn get(&self, index: usize) -> Option<&ValParam> {
        self.entries.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut ValParam> {
        self.entries.get_mut(index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ValParam> {
        self.entries.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, ValParam> {
        self.entries.iter_mut()
    }

    /// Drop every entry. The list stays usable.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Write the diagnostic rendering of a list that may be absent.
    /// An absent list renders as `(none)`; an empty one renders as nothing.
    pub fn print(list: Option<&ValParamList>, out: &mut dyn Write) -> io::Result<()> {
        match list {
            Some(list) => write!(out, "{}", list),
            None => write!(out, "(none)"),
        }
    }

    /// [`print`](Self::print) into a string.
    pub fn render(list: Option<&ValParamList>) -> String {
        match list {
            Some(list) => list.to_string(),
            None => "(none)".to_string(),
        }
    }
}

impl fmt::Display for ValParamList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, vp) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}", vp)?;
        }
        Ok(())
    }
}

/// A borrowed position in a [`ValParamList`], for walking it one entry at a time.
#[derive(Debug, Clone, Copy)]
pub struct Entry<'a> {
    list: &'a ValParamList,
    index: usize,
}

impl<'a> Entry<'a> {
    pub fn index(&self) -> usize {
        self.index
    }

    /// The entry after this one, if any.
    pub fn next(self) -> Option<Entry<'a>> {
        self.list.entry(self.index + 1)
    }

    pub fn get(&self) -> &'a ValParam {
        &self.list.entries[self.index]
    }
}

impl Deref for Entry<'_> {
    type Target = ValParam;

    fn deref(&self) -> &ValParam {
        self.get()
    }
}

impl FromIterator<ValParam> for ValParamList {
    fn from_iter<I: IntoIterator<Item = ValParam>>(iter: I) -> Self {
        ValParamList {
            entries: iter.into_iter().collect(),
        }
    }
}

impl Extend<ValParam> for ValParamList {
    fn extend<I: IntoIterator<Item = ValParam>>(&mut self, iter: I) {
        self.entries.extend(iter);
    }
}

impl IntoIterator for ValParamList {
    type Item = ValParam;
    type IntoIter = std::vec::IntoIter<ValParam>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a> IntoIterator for &'a ValParamList {
    type Item = &'a ValParam;
    type IntoIter = std::slice::Iter<'a, ValParam>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl<'a> IntoIterator for &'a mut ValParamList {
    type Item = &'a mut ValParam;
    type IntoIter = std::slice::IterMut<'a, ValParam>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter_mut()
    }
}
