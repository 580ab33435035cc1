// This module defines the error type returned by code generation using the thiserror crate.
// CompileError covers every way `emit_code` can fail: instructions rejected by `check`,
// out-of-range IR indices, opcode/type combinations the target cannot lower, register
// allocation failures, registers reaching emission without an assignment, invalid SIMD
// widths, branches to labels that were never emitted and encoder failures. Each variant
// carries the instruction id, opcode or register involved so the diagnostic can be traced
// back to the IR. Errors from the IR tables, the allocator and the encoder convert into
// CompileError through `From`, so the whole pipeline propagates failures with `?`.

//! Error types for code generation.

use crate::gen::encoder::EncodingError;
use crate::gen::register_file::RegAllocError;
use crate::ir::{InsnId, IrError, LabelIndex, Opcode, RegisterIndex, Type};
use thiserror::Error;

/// Main error type for compiling one function.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    #[error("Malformed instruction {id} ({opcode}): {reason}")]
    Malformed {
        id: InsnId,
        opcode: Opcode,
        reason: String,
    },

    #[error("Invalid IR: {0}")]
    Ir(#[from] IrError),

    #[error("Unsupported {opcode}.{ty}: {reason}")]
    Unsupported {
        opcode: Opcode,
        ty: Type,
        reason: &'static str,
    },

    #[error("Register allocation failed: {0}")]
    RegisterAllocation(#[from] RegAllocError),

    #[error("Register {0} reached emission without an allocation")]
    UnallocatedRegister(RegisterIndex),

    #[error("Unsupported SIMD width {0} (expected 8 or 16)")]
    InvalidSimdWidth(u32),

    #[error("Branch {branch} targets {label} which was never emitted")]
    UnresolvedLabel { branch: InsnId, label: LabelIndex },

    #[error("Encoding failed: {0}")]
    Encoding(#[from] EncodingError),
}

/// Result type alias for compile operations.
pub type CompileResult<T> = Result<T, CompileError>;
