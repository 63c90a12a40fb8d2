use std::collections::{HashMap, HashSet};

use inkwell::{
    basic_block::BasicBlock,
    builder::{Builder, BuilderError},
    context::Context,
    module::Module,
    types::BasicMetadataTypeEnum,
    values::{BasicMetadataValueEnum, BasicValue, FloatValue, FunctionValue},
};

use crate::ast::{ASTNode, Expression, Function, Prototype};

#[derive(Debug, thiserror::Error)]
pub enum CodegenError {
    #[error("unknown variable referenced {0}")]
    UnresolvedSymbol(String),
    #[error("unknown operator {0}")]
    UnknownOperator(char),
    #[error("unknown function {0}")]
    UndefinedFunction(String),
    #[error("invalid number of args in call {name} expected {expected} found {found}")]
    ArityMismatch {
        name: String,
        expected: usize,
        found: usize,
    },
    #[error("function {name} redefined with {found} parameters, previously declared with {expected}")]
    PrototypeMismatch {
        name: String,
        expected: usize,
        found: usize,
    },
    #[error("failed to verify function {0}")]
    InvalidFunction(String),
    #[error("failed to remove a basic block of {0}")]
    BlockRemoval(String),
    #[error("failed to build instruction: {0}")]
    Builder(#[from] BuilderError),
}

pub type CodegenResult<T> = Result<T, CodegenError>;

/// Lowers AST nodes into a single LLVM module.
///
/// `named_values` is the symbol table of the function currently being
/// generated; it is rebuilt from scratch for every definition.
/// `forward_declared` holds the names [`Codegen::declare`] added that have
/// not received a body yet. Definitions may call them, top-level expressions
/// may not.
pub struct Codegen<'a> {
    pub context: &'a Context,
    pub module: Module<'a>,
    pub builder: Builder<'a>,
    pub named_values: HashMap<String, FloatValue<'a>>,
    forward_declared: HashSet<String>,
    in_top_level: bool,
}

impl<'a> Codegen<'a> {
    pub fn new(context: &'a Context, module_name: &str) -> Codegen<'a> {
        let module = context.create_module(module_name);
        let builder = context.create_builder();

        Codegen {
            context,
            module,
            builder,
            named_values: HashMap::new(),
            forward_declared: HashSet::new(),
            in_top_level: false,
        }
    }

    fn codegen_expr(&mut self, expr: &Expression) -> CodegenResult<FloatValue<'a>> {
        match expr {
            Expression::Literal(value) => Ok(self.context.f64_type().const_float(*value)),
            Expression::Variable(name) => match self.named_values.get(name) {
                Some(var) => Ok(*var),
                None => Err(CodegenError::UnresolvedSymbol(name.clone())),
            },
            Expression::Binary(op, left, right) => {
                let lhs = self.codegen_expr(left)?;
                let rhs = self.codegen_expr(right)?;

                let value = match op {
                    '+' => self.builder.build_float_add(lhs, rhs, "addtmp")?,
                    '-' => self.builder.build_float_sub(lhs, rhs, "subtmp")?,
                    '*' => self.builder.build_float_mul(lhs, rhs, "multmp")?,
                    '/' => self.builder.build_float_div(lhs, rhs, "divtmp")?,
                    _ => return Err(CodegenError::UnknownOperator(*op)),
                };
                Ok(value)
            }
            Expression::Call(callee, args) => {
                let func = self
                    .module
                    .get_function(callee)
                    .ok_or_else(|| CodegenError::UndefinedFunction(callee.clone()))?;
                if self.in_top_level && self.forward_declared.contains(callee) {
                    return Err(CodegenError::UndefinedFunction(callee.clone()));
                }

                let expected = func.count_params() as usize;
                if expected != args.len() {
                    return Err(CodegenError::ArityMismatch {
                        name: callee.clone(),
                        expected,
                        found: args.len(),
                    });
                }

                let mut argsv: Vec<BasicMetadataValueEnum> = Vec::with_capacity(args.len());
                for arg in args {
                    argsv.push(self.codegen_expr(arg)?.into());
                }

                let call = self.builder.build_call(func, &argsv, "calltmp")?;
                match call.try_as_basic_value().left() {
                    Some(value) => Ok(value.into_float_value()),
                    None => Err(CodegenError::InvalidFunction(callee.clone())),
                }
            }
        }
    }

    fn compile_proto(&self, proto: &Prototype) -> FunctionValue<'a> {
        let args_types = std::iter::repeat(self.context.f64_type())
            .take(proto.args.len())
            .map(|f| f.into())
            .collect::<Vec<BasicMetadataTypeEnum>>();

        let fn_type = self.context.f64_type().fn_type(&args_types, false);
        let fn_val = self.module.add_function(proto.name.as_str(), fn_type, None);

        for (arg, name) in fn_val.get_param_iter().zip(&proto.args) {
            arg.into_float_value().set_name(name);
        }

        fn_val
    }

    /// Adds a body-less declaration for `proto` unless the name already
    /// exists, so that earlier constructs can call it.
    pub fn declare(&mut self, proto: &Prototype) -> FunctionValue<'a> {
        match self.module.get_function(&proto.name) {
            Some(func) => func,
            None => {
                self.forward_declared.insert(proto.name.clone());
                self.compile_proto(proto)
            }
        }
    }

    /// True when `name` was only declared ahead of its definition.
    pub fn is_forward_declared(&self, name: &str) -> bool {
        self.forward_declared.contains(name)
    }

    fn compile_extern(&mut self, proto: &Prototype) -> CodegenResult<FunctionValue<'a>> {
        self.forward_declared.remove(&proto.name);
        match self.module.get_function(&proto.name) {
            Some(func) => {
                check_arity(func, proto)?;
                Ok(func)
            }
            None => Ok(self.compile_proto(proto)),
        }
    }

    fn compile_fn(&mut self, function: &Function) -> CodegenResult<FunctionValue<'a>> {
        let Function {
            prototype: proto,
            body,
        } = function;

        let llvm_func = match self.module.get_function(&proto.name) {
            Some(func) => {
                check_arity(func, proto)?;
                func
            }
            None => self.compile_proto(proto),
        };
        let previous_body = llvm_func.get_basic_blocks();

        let entry = self.context.append_basic_block(llvm_func, "entry");
        self.builder.position_at_end(entry);

        self.named_values.clear();
        self.named_values.reserve(proto.args.len());
        for (arg, name) in llvm_func.get_param_iter().zip(&proto.args) {
            let arg = arg.into_float_value();
            arg.set_name(name);
            // later duplicates shadow earlier ones
            self.named_values.insert(name.clone(), arg);
        }

        let generated = self
            .codegen_expr(body)
            .and_then(|ret| Ok(self.builder.build_return(Some(&ret))?));
        if let Err(err) = generated {
            self.discard_body(llvm_func, entry, previous_body.is_empty())?;
            return Err(err);
        }

        if !llvm_func.verify(true) {
            self.discard_body(llvm_func, entry, previous_body.is_empty())?;
            return Err(CodegenError::InvalidFunction(proto.name.clone()));
        }

        // the new body replaces whatever a previous definition left behind
        for block in previous_body {
            delete_block(llvm_func, block)?;
        }
        self.forward_declared.remove(&proto.name);

        Ok(llvm_func)
    }

    /// Undoes a failed definition: drops the block it appended and, when the
    /// function had no body before and nothing calls it, the function itself.
    fn discard_body(
        &mut self,
        func: FunctionValue<'a>,
        entry: BasicBlock<'a>,
        was_declaration: bool,
    ) -> CodegenResult<()> {
        self.builder.clear_insertion_position();
        delete_block(func, entry)?;

        let unused = func
            .as_global_value()
            .as_pointer_value()
            .get_first_use()
            .is_none();
        if was_declaration && unused {
            if let Ok(name) = func.get_name().to_str() {
                self.forward_declared.remove(name);
            }
            unsafe {
                func.delete();
            }
        }
        Ok(())
    }

    pub fn codegen_node(&mut self, node: &ASTNode) -> CodegenResult<FunctionValue<'a>> {
        match node {
            ASTNode::Function(func) => self.compile_fn(func),
            ASTNode::TopLevel(func) => {
                self.in_top_level = true;
                let compiled = self.compile_fn(func);
                self.in_top_level = false;
                compiled
            }
            ASTNode::Extern(proto) => self.compile_extern(proto),
        }
    }

    pub fn codegen(&mut self, ast_nodes: &[ASTNode]) -> CodegenResult<()> {
        for node in ast_nodes {
            self.codegen_node(node)?;
        }

        Ok(())
    }

    pub fn print_ir(&self) -> String {
        self.module.print_to_string().to_string()
    }
}

fn delete_block(func: FunctionValue<'_>, block: BasicBlock<'_>) -> CodegenResult<()> {
    // only fails for a block that is already detached from its function
    let deleted = unsafe { block.delete() };
    deleted.map_err(|()| {
        CodegenError::BlockRemoval(func.get_name().to_string_lossy().into_owned())
    })
}

fn check_arity(func: FunctionValue<'_>, proto: &Prototype) -> CodegenResult<()> {
    let expected = func.count_params() as usize;
    if expected == proto.args.len() {
        Ok(())
    } else {
        Err(CodegenError::PrototypeMismatch {
            name: proto.name.clone(),
            expected,
            found: proto.args.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use inkwell::context::Context;

    use super::{Codegen, CodegenError};
    use crate::{
        ast::{ASTNode, Prototype},
        parser::Parser,
    };

    fn compile<'a>(codegen: &mut Codegen<'a>, source: &str) -> Result<(), CodegenError> {
        let ast = Parser::parse_str(source).unwrap();
        codegen.codegen(&ast)
    }

    #[test]
    fn codegen_works() {
        let context = Context::create();
        let mut codegen = Codegen::new(&context, "test");
        compile(&mut codegen, "extern sin(x); def thing(x) sin(x) * x;").unwrap();

        let thing = codegen.module.get_function("thing").unwrap();
        assert_eq!(thing.count_params(), 1);
        assert_eq!(thing.count_basic_blocks(), 1);
        let sin = codegen.module.get_function("sin").unwrap();
        assert_eq!(sin.count_basic_blocks(), 0);

        let ir = codegen.print_ir();
        assert!(ir.contains("define double @thing(double %x)"), "{}", ir);
        assert!(ir.contains("declare double @sin(double"), "{}", ir);
        assert!(ir.contains("fmul"), "{}", ir);
    }

    #[test]
    fn unresolved_symbol_removes_function() {
        let context = Context::create();
        let mut codegen = Codegen::new(&context, "test");
        assert!(matches!(
            compile(&mut codegen, "def f(x) x + y"),
            Err(CodegenError::UnresolvedSymbol(ref name)) if name == "y"
        ));
        assert!(codegen.module.get_function("f").is_none());

        compile(&mut codegen, "def f(x y) x + y").unwrap();
        assert_eq!(codegen.module.get_function("f").unwrap().count_params(), 2);
    }

    #[test]
    fn call_checks() {
        let context = Context::create();
        let mut codegen = Codegen::new(&context, "test");
        compile(&mut codegen, "def f(x y) x + y").unwrap();
        assert!(matches!(
            compile(&mut codegen, "f(1)"),
            Err(CodegenError::ArityMismatch { expected: 2, found: 1, .. })
        ));
        assert!(matches!(
            compile(&mut codegen, "g(1)"),
            Err(CodegenError::UndefinedFunction(ref name)) if name == "g"
        ));
        assert!(codegen.module.get_function("g").is_none());
        compile(&mut codegen, "f(1, 2)").unwrap();
    }

    #[test]
    fn comparison_has_no_lowering() {
        let context = Context::create();
        let mut codegen = Codegen::new(&context, "test");
        assert!(matches!(
            compile(&mut codegen, "def less(a b) a < b"),
            Err(CodegenError::UnknownOperator('<'))
        ));
        assert!(codegen.module.get_function("less").is_none());
    }

    #[test]
    fn redefinition_replaces_body() {
        let context = Context::create();
        let mut codegen = Codegen::new(&context, "test");
        compile(&mut codegen, "def f(x) x * 2").unwrap();
        compile(&mut codegen, "def f(y) y / 4").unwrap();

        let f = codegen.module.get_function("f").unwrap();
        assert_eq!(f.count_basic_blocks(), 1);
        let ir = codegen.print_ir();
        assert!(ir.contains("fdiv"), "{}", ir);
        assert!(!ir.contains("fmul"), "{}", ir);
    }

    #[test]
    fn failed_redefinition_keeps_previous_body() {
        let context = Context::create();
        let mut codegen = Codegen::new(&context, "test");
        compile(&mut codegen, "def f(x) x * 2").unwrap();
        assert!(compile(&mut codegen, "def f(x) x * z").is_err());

        let f = codegen.module.get_function("f").unwrap();
        assert_eq!(f.count_basic_blocks(), 1);
        assert!(f.verify(false));
    }

    #[test]
    fn redefinition_with_other_arity_fails() {
        let context = Context::create();
        let mut codegen = Codegen::new(&context, "test");
        compile(&mut codegen, "def f(x) x").unwrap();
        assert!(matches!(
            compile(&mut codegen, "def f(x y) x"),
            Err(CodegenError::PrototypeMismatch { expected: 1, found: 2, .. })
        ));
    }

    #[test]
    fn top_level_cannot_call_forward_declarations() {
        let context = Context::create();
        let mut codegen = Codegen::new(&context, "test");
        let ast = Parser::parse_str("def a() b(); b(); def b() 1; b()").unwrap();
        for node in &ast {
            if let ASTNode::Function(func) = node {
                codegen.declare(&func.prototype);
            }
        }
        assert!(codegen.is_forward_declared("a"));

        assert!(codegen.codegen_node(&ast[0]).is_ok());
        assert!(matches!(
            codegen.codegen_node(&ast[1]),
            Err(CodegenError::UndefinedFunction(ref name)) if name == "b"
        ));
        assert!(codegen.codegen_node(&ast[2]).is_ok());
        assert!(!codegen.is_forward_declared("b"));
        assert!(codegen.codegen_node(&ast[3]).is_ok());
    }

    #[test]
    fn extern_is_callable_from_top_level() {
        let context = Context::create();
        let mut codegen = Codegen::new(&context, "test");
        let proto = Prototype::new("sin", vec!["x".to_string()]);
        codegen.declare(&proto);
        compile(&mut codegen, "extern sin(x)").unwrap();
        compile(&mut codegen, "sin(0)").unwrap();
    }

    #[test]
    fn duplicate_parameters_shadow() {
        let context = Context::create();
        let mut codegen = Codegen::new(&context, "test");
        compile(&mut codegen, "def f(x x) x").unwrap();
        assert_eq!(codegen.module.get_function("f").unwrap().count_params(), 2);
    }
}
