// This module defines the seams of the code generation pipeline. GenContext drives a fixed
// sequence (stack pointer setup, selection, register allocation, emission, branch
// patching) but delegates three jobs to collaborators behind traits: the Emitter encodes
// native instructions and patches jumps, the SelectionEngine turns an IR function into the
// ordered stream of instructions to lower, and the RegisterAllocator assigns every virtual
// register referenced by that stream a location in the general register file. The Gen
// implementations live in `crate::gen`; tests and tools can substitute their own.

//! Collaborator traits of the code generation context.
//!
//! Typical flow:
//! ```text
//! selection  = engine.select(function)
//! allocation = allocator.allocate(function, selection, simd_width)
//! for each block in selection {
//!     for each selected instruction {
//!         emitter.emit(native instructions)
//!     }
//! }
//! for each recorded branch {
//!     emitter.patch_jump(branch offset, label offset)
//! }
//! ```

use super::error::CompileResult;
use super::session::CompilationSession;
use crate::gen::encoder::{EncodingError, NativeInsn};
use crate::gen::register_file::RegisterAllocation;
use crate::gen::selection::Selection;
use crate::ir::Function;

/// Encodes native instructions into a byte stream.
pub trait Emitter {
    /// Byte offset the next instruction will be written at.
    fn position(&self) -> u32;

    /// Encode `insn` at the current position and return that position.
    fn emit(&mut self, insn: &NativeInsn) -> Result<u32, EncodingError>;

    /// Rewrite the target of the jump encoded at `at`.
    fn patch_jump(&mut self, at: u32, target: u32) -> Result<(), EncodingError>;

    /// Hand over the encoded stream, leaving the emitter empty.
    fn finish(&mut self) -> Vec<u8>;
}

/// Chooses the instructions to lower, in program order.
pub trait SelectionEngine {
    /// Every instruction must be validated before it is selected; a failed
    /// check aborts selection.
    fn select(&self, func: &Function, session: &CompilationSession<'_>) -> CompileResult<Selection>;
}

/// Assigns physical registers to the virtual registers of a selection.
pub trait RegisterAllocator {
    fn allocate(
        &self,
        func: &Function,
        selection: &Selection,
        simd_width: u32,
    ) -> CompileResult<RegisterAllocation>;
}
