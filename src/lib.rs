pub mod ast;
pub mod codegen;
pub mod jit;
pub mod lexer;
pub mod optimizer;
pub mod parser;
pub mod session;

pub use ast::ANON_FN_NAME;
pub use session::{CompileError, Compiled, ConstructKind, Outcome, Session};
