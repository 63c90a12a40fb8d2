//! One compilation context: a module plus the machinery that fills it.
//!
//! A [`Session`] replaces any process-wide compiler state. Several sessions
//! can live side by side in one process as long as each is driven by one
//! thread at a time.

use anyhow::bail;
use inkwell::{context::Context, module::Module, values::FunctionValue};

use crate::{
    ast::ASTNode,
    codegen::{Codegen, CodegenError},
    jit, optimizer,
    parser::{Parser, ParserError},
};

#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("syntax error: {0}")]
    Syntax(#[from] ParserError),
    #[error("codegen error: {0}")]
    Codegen(#[from] CodegenError),
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ConstructKind {
    Definition,
    Extern,
    TopLevelExpression,
}

/// A top-level construct that made it into the module.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Compiled {
    pub name: String,
    pub kind: ConstructKind,
}

pub type Outcome = Result<Compiled, CompileError>;

pub struct Session<'ctx> {
    codegen: Codegen<'ctx>,
}

impl<'ctx> Session<'ctx> {
    pub fn new(context: &'ctx Context, module_name: &str) -> Self {
        Self {
            codegen: Codegen::new(context, module_name),
        }
    }

    pub fn module(&self) -> &Module<'ctx> {
        &self.codegen.module
    }

    pub fn function(&self, name: &str) -> Option<FunctionValue<'ctx>> {
        self.codegen.module.get_function(name)
    }

    pub fn ir(&self) -> String {
        self.codegen.print_ir()
    }

    pub fn optimize(&self) {
        optimizer::optimize(&self.codegen.module);
    }

    /// Evaluates a zero-argument function of the module.
    pub fn run(&self, name: &str) -> anyhow::Result<f64> {
        for func in self.codegen.module.get_functions() {
            let callee = func.get_name().to_string_lossy();
            if self.codegen.is_forward_declared(&callee) && jit::is_called_declaration(func) {
                bail!("function {} is declared but never defined", callee);
            }
        }
        jit::run_function(&self.codegen.module, name)
    }

    pub fn compile(&mut self, source: &str) -> Vec<Outcome> {
        self.compile_with(source, |_, _| ())
    }

    /// Compiles every top-level construct of `source` in order, calling
    /// `on_compiled` right after each one lands in the module.
    ///
    /// Named definitions parsed before the first syntax error are declared
    /// up front, so a construct may call a function defined further down.
    /// Failures are reported on stderr and do not stop later constructs.
    pub fn compile_with<F>(&mut self, source: &str, mut on_compiled: F) -> Vec<Outcome>
    where
        F: FnMut(&Self, &Compiled),
    {
        let mut parser = Parser::new(source);
        let mut nodes = Vec::new();
        let mut syntax_error = None;
        while let Some(node) = parser.parse_top_level() {
            match node {
                Ok(node) => nodes.push(node),
                Err(err) => {
                    syntax_error = Some(err);
                    break;
                }
            }
        }

        for node in &nodes {
            if let ASTNode::Function(func) = node {
                self.codegen.declare(&func.prototype);
            }
        }

        let mut outcomes = Vec::with_capacity(nodes.len() + 1);
        for node in &nodes {
            let outcome = self.compile_node(node);
            match &outcome {
                Ok(compiled) => on_compiled(self, compiled),
                Err(err) => eprintln!("error: {}", err),
            }
            outcomes.push(outcome);
        }

        if let Some(err) = syntax_error {
            let err = CompileError::from(err);
            eprintln!("error: {}", err);
            outcomes.push(Err(err));
        }

        outcomes
    }

    pub fn compile_node(&mut self, node: &ASTNode) -> Outcome {
        let func = self.codegen.codegen_node(node)?;
        let kind = match node {
            ASTNode::Function(_) => ConstructKind::Definition,
            ASTNode::Extern(_) => ConstructKind::Extern,
            ASTNode::TopLevel(_) => ConstructKind::TopLevelExpression,
        };
        Ok(Compiled {
            name: func.get_name().to_string_lossy().into_owned(),
            kind,
        })
    }
}
