pub mod expr;
pub mod list;
pub mod symbol;

pub use expr::{Expr, ExprTerm, Operator};
pub use list::{Entry, ValParam, ValParamList, to_expr};
pub use symbol::{Symbol, SymbolId, SymbolRef, SymbolTable};
