//! Shared infrastructure for the code generator.
//!
//! # Key Components
//!
//! ## Session Management (`session`)
//! - Arena-based allocation using `bumpalo`
//! - Generation statistics per session
//!
//! ## Error Handling (`error`)
//! - `CodegenError` for descriptor misuse and IR emission failures
//! - `PipelineError` for native compilation failures

pub mod error;
pub mod session;

pub use error::{CodegenError, CodegenResult, PipelineError};
pub use session::{GenerationSession, SessionStats};
