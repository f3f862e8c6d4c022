//! Native compilation pipeline.
//!
//! Takes a syntactically complete module, verifies it, and JIT-compiles it to
//! a directly callable entry point. The compiled code's memory is owned by
//! the returned [`CompiledLoopNest`]; the entry pointer is valid exactly as
//! long as that artifact is alive.

use inkwell::execution_engine::ExecutionEngine;
use inkwell::module::Module;
use inkwell::targets::{InitializationConfig, Target};
use inkwell::values::FunctionValue;
use inkwell::OptimizationLevel;

use crate::core::error::PipelineError;

/// Verifies and JIT-compiles generated modules.
///
/// One pipeline instance can compile any number of modules, but each module
/// gets its own execution engine. Every error this pipeline reports indicates
/// an unrecoverable environment or generator defect; callers are expected to
/// abort, not retry.
#[derive(Debug, Clone, Copy)]
pub struct NativePipeline {
    opt_level: OptimizationLevel,
}

impl Default for NativePipeline {
    fn default() -> Self {
        Self {
            opt_level: OptimizationLevel::None,
        }
    }
}

impl NativePipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a non-default optimization level for subsequent compiles.
    pub fn with_opt_level(opt_level: OptimizationLevel) -> Self {
        Self { opt_level }
    }

    /// Check structural well-formedness of a generated module.
    ///
    /// Verification does not mutate the module; re-verifying an already
    /// verified module succeeds and reports nothing.
    pub fn verify(&self, module: &Module<'_>) -> Result<(), PipelineError> {
        module
            .verify()
            .map_err(|diag| PipelineError::Verify(diag.to_string()))
    }

    /// Verify `module` and compile it, resolving `entry_name` as the native
    /// entry point.
    pub fn compile<'ctx>(
        &self,
        module: &Module<'ctx>,
        entry_name: &str,
    ) -> Result<CompiledLoopNest<'ctx>, PipelineError> {
        self.compile_with_symbols(module, entry_name, &[])
    }

    /// Like [`NativePipeline::compile`], additionally mapping declared
    /// external functions to host addresses before finalization.
    pub fn compile_with_symbols<'ctx>(
        &self,
        module: &Module<'ctx>,
        entry_name: &str,
        symbols: &[(FunctionValue<'ctx>, usize)],
    ) -> Result<CompiledLoopNest<'ctx>, PipelineError> {
        Target::initialize_native(&InitializationConfig::default())
            .map_err(PipelineError::TargetInit)?;
        self.verify(module)?;

        let engine = module
            .create_jit_execution_engine(self.opt_level)
            .map_err(|err| PipelineError::EngineCreation(err.to_string()))?;
        for (function, address) in symbols {
            engine.add_global_mapping(function, *address);
        }
        let entry_address = engine
            .get_function_address(entry_name)
            .map_err(|_| PipelineError::FunctionLookup(entry_name.to_owned()))?;
        log::debug!(
            "compiled module `{}`, entry `{}` at {:#x}",
            module.get_name().to_string_lossy(),
            entry_name,
            entry_address
        );

        Ok(CompiledLoopNest {
            engine,
            entry_address,
        })
    }
}

/// A compiled loop nest: the owning handle for the JITed code plus its entry
/// address.
///
/// Dropping this frees the compiled code; the entry pointer must not be
/// invoked afterwards.
pub struct CompiledLoopNest<'ctx> {
    engine: ExecutionEngine<'ctx>,
    entry_address: usize,
}

impl<'ctx> CompiledLoopNest<'ctx> {
    /// Raw address of the compiled entry point.
    pub fn entry_address(&self) -> usize {
        self.entry_address
    }

    /// The typed entry pointer.
    ///
    /// # Safety
    /// The entry function must have been generated with a
    /// `void(void)`-compatible signature, and the returned pointer must not
    /// outlive `self`.
    pub unsafe fn entry_fn(&self) -> unsafe extern "C" fn() {
        std::mem::transmute(self.entry_address)
    }

    /// Invoke the compiled entry point.
    pub fn invoke(&self) {
        // SAFETY: the pipeline resolved this address from a verified function
        // with a void() signature, and `self` keeps the code pages alive for
        // the duration of the call.
        unsafe { (self.entry_fn())() }
    }

    /// The execution engine owning the compiled code.
    pub fn engine(&self) -> &ExecutionEngine<'ctx> {
        &self.engine
    }
}
