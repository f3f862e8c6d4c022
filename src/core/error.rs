//! Error types for loop-nest generation and native compilation.
//!
//! Using thiserror for more idiomatic error handling.

use thiserror::Error;

use crate::nest::descriptor::JoinLoopKind;

/// Errors raised while emitting the loop-nest IR.
///
/// All of these indicate descriptor misuse or a generator defect, never a
/// data-dependent runtime condition; callers treat them as fatal.
#[derive(Error, Debug)]
pub enum CodegenError {
    #[error("loop nest requires at least one level")]
    EmptyLoopNest,

    #[error("descriptor `{name}` returned a {returned} domain but has kind {kind:?}")]
    DomainShapeMismatch {
        name: String,
        kind: JoinLoopKind,
        returned: &'static str,
    },

    #[error("IR builder error: {0}")]
    Builder(#[from] inkwell::builder::BuilderError),
}

/// Result type alias for generation operations.
pub type CodegenResult<T> = Result<T, CodegenError>;

/// Errors raised by the native compilation pipeline.
///
/// Target initialization and verification failures indicate an unrecoverable
/// environment or generator defect; no retry policy applies to any variant.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("native target initialization failed: {0}")]
    TargetInit(String),

    #[error("IR verification failed: {0}")]
    Verify(String),

    #[error("execution engine creation failed: {0}")]
    EngineCreation(String),

    #[error("compiled entry point `{0}` not found")]
    FunctionLookup(String),
}
