//! nestjit - fused loop-nest code generation for multi-way join evaluation.
//!
//! Given an ordered list of join-level descriptors (one per joined relation,
//! outermost first), nestjit emits a single fused LLVM IR loop nest that
//! evaluates all levels together and short-circuits as soon as any level
//! fails to match, then JIT-compiles the containing function to a callable
//! native entry point.
//!
//! # Primary Usage
//!
//! ```ignore
//! use bumpalo::Bump;
//! use inkwell::context::Context;
//! use nestjit::{GenerationSession, LoopNestGenerator, NativePipeline};
//!
//! let context = Context::create();
//! let module = context.create_module("join");
//! let builder = context.create_builder();
//!
//! let arena = Bump::new();
//! let mut session = GenerationSession::new(&arena);
//! let mut generator = LoopNestGenerator::new(&context, &builder, function, &mut session);
//! let layout = generator.generate(&descriptors, &mut body_gen, None, exit_block)?;
//!
//! let compiled = NativePipeline::new().compile(&module, "join_loops")?;
//! compiled.invoke();
//! ```
//!
//! # Architecture
//!
//! - [`nest`] - Loop descriptors and the recursive loop-nest generator
//! - [`jit`] - Verification and native compilation via MCJIT
//! - [`core`] - Shared infrastructure (session, errors)

pub mod core;
pub mod jit;
pub mod nest;

pub use crate::core::{
    CodegenError, CodegenResult, GenerationSession, PipelineError, SessionStats,
};
pub use crate::jit::{CompiledLoopNest, NativePipeline};
pub use crate::nest::{
    Domain, DomainProvider, IteratorTuple, JoinLoopKind, JoinSemantics, LevelBlocks,
    LoopDescriptor, LoopNestGenerator, NestLayout, ProbeFailHook, NO_MATCH_SENTINEL,
};
