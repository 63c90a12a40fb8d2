use anyhow::{anyhow, bail, Context};
use inkwell::{
    execution_engine::JitFunction,
    module::Module,
    targets::{InitializationConfig, Target},
    values::{BasicValue, FunctionValue},
    OptimizationLevel,
};
use lazy_static::lazy_static;
use llvm_sys::support::{LLVMLoadLibraryPermanently, LLVMSearchForAddressOfSymbol};

type EntryFunc = unsafe extern "C" fn() -> f64;

fn init_native_target() -> Result<(), String> {
    Target::initialize_native(&InitializationConfig::default())?;
    // null loads the symbols of the running process
    if unsafe { LLVMLoadLibraryPermanently(std::ptr::null()) } != 0 {
        return Err("failed to load process symbols".to_string());
    }
    Ok(())
}

lazy_static! {
    static ref NATIVE_TARGET: Result<(), String> = init_native_target();
}

/// A declaration without a body that some instruction calls.
pub fn is_called_declaration(func: FunctionValue<'_>) -> bool {
    func.count_basic_blocks() == 0
        && func
            .as_global_value()
            .as_pointer_value()
            .get_first_use()
            .is_some()
}

fn resolves_in_process(func: FunctionValue<'_>) -> bool {
    let address = unsafe { LLVMSearchForAddressOfSymbol(func.get_name().as_ptr()) };
    !address.is_null()
}

/// JIT-compiles a copy of `module` and calls the zero-argument function
/// `name`. The module itself stays free for further definitions.
pub fn run_function(module: &Module<'_>, name: &str) -> anyhow::Result<f64> {
    let func = module
        .get_function(name)
        .with_context(|| format!("no function named {}", name))?;
    if func.count_params() != 0 {
        bail!(
            "cannot run {}: it takes {} arguments",
            name,
            func.count_params()
        );
    }

    NATIVE_TARGET.clone().map_err(|e| anyhow!(e))?;

    for declared in module.get_functions() {
        if is_called_declaration(declared) && !resolves_in_process(declared) {
            bail!(
                "function {} is declared but never defined",
                declared.get_name().to_string_lossy()
            );
        }
    }

    let module = module.clone();
    let ee = module
        .create_jit_execution_engine(OptimizationLevel::None)
        .map_err(|e| anyhow!("{}", e.to_string()))?;

    let entry: JitFunction<EntryFunc> = unsafe { ee.get_function(name) }?;

    Ok(unsafe { entry.call() })
}

#[cfg(test)]
mod tests {
    use inkwell::context::Context;

    use super::run_function;
    use crate::{ast::ANON_FN_NAME, session::Session};

    #[test]
    fn runs_zero_argument_functions() {
        let context = Context::create();
        let mut session = Session::new(&context, "test");
        session.compile("def half(x) x / 2; def answer() half(84)");

        assert_eq!(run_function(session.module(), "answer").unwrap(), 42.0);
        assert!(run_function(session.module(), "half").is_err());
        assert!(run_function(session.module(), "missing").is_err());
    }

    #[test]
    fn resolves_process_symbols() {
        let context = Context::create();
        let mut session = Session::new(&context, "test");
        session.compile("extern sin(x); sin(0)");

        assert_eq!(run_function(session.module(), ANON_FN_NAME).unwrap(), 0.0);
    }

    #[test]
    fn unresolved_extern_is_an_error() {
        let context = Context::create();
        let mut session = Session::new(&context, "test");
        assert!(session.compile("extern nosuch(x); nosuch(1)").iter().all(Result::is_ok));

        let err = run_function(session.module(), ANON_FN_NAME).unwrap_err();
        assert!(err.to_string().contains("nosuch"), "{}", err);
    }

    #[test]
    fn failed_callee_definition_is_an_error() {
        let context = Context::create();
        let mut session = Session::new(&context, "test");
        let mut results = Vec::new();
        let outcomes = session.compile_with("def a() b(); def b() y; a()", |session, compiled| {
            results.push(session.run(&compiled.name));
        });

        assert!(outcomes[0].is_ok());
        assert!(outcomes[1].is_err());
        assert!(outcomes[2].is_ok());
        assert!(results.iter().all(Result::is_err));
        assert!(session.run(ANON_FN_NAME).is_err());
    }
}
