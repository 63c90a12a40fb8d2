use inkwell::{module::Module, passes::PassManager};

/// Runs the fixed whole-module pipeline over `module`.
///
/// Function names and their observable behaviour survive; instruction layout
/// does not.
pub fn optimize(module: &Module<'_>) {
    let passes: PassManager<Module> = PassManager::create(());
    passes.add_promote_memory_to_register_pass();
    passes.add_instruction_combining_pass();
    passes.add_reassociate_pass();
    passes.add_gvn_pass();
    passes.add_cfg_simplification_pass();
    passes.run_on(module);
}
