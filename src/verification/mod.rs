//! Source verification: submissions are stored as jobs, compiled by a bounded
//! worker pool and matched against the recorded creation bytecode.

pub mod compiler;
mod pipeline;
pub mod types;

pub use compiler::{CompilationError, Compiler, SolcCompiler};
pub use pipeline::{VerificationHandle, complete, enqueue, spawn_verifier};
pub use types::{
    CodeFormat, CompilationArtifacts, SourceCodeData, VerificationJob, VerificationRequest,
    VerificationStatus, VerificationStatusInfo,
};
