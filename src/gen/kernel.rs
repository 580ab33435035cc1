//! Compiled kernels.

use super::encoder::{self, EncodingError, INSN_SIZE};
use crate::ir::{RegisterFamily, RegisterIndex};
use std::fmt;

/// Register location of a kernel argument or output, in the GRF.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelArgument {
    pub register: RegisterIndex,
    pub family: RegisterFamily,
    /// Byte offset in the register file.
    pub offset: u32,
    /// Bytes occupied, all lanes included.
    pub size: u32,
}

/// Output of code generation for one function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Kernel {
    pub name: String,
    pub code: Vec<u8>,
    pub simd_width: u32,
    /// Private stack bytes per lane.
    pub stack_size: u32,
    /// One past the highest GRF used.
    pub grf_used: u32,
    /// Inputs in declaration order.
    pub arguments: Vec<KernelArgument>,
    pub outputs: Vec<KernelArgument>,
    pub insn_count: usize,
}

impl Kernel {
    pub fn code_size(&self) -> usize {
        self.code.len()
    }

    /// Native instruction at byte offset `at`.
    pub fn insn_at(&self, at: u32) -> Result<encoder::NativeInsn, EncodingError> {
        let start = at as usize;
        let end = start + INSN_SIZE as usize;
        if at % INSN_SIZE != 0 || end > self.code.len() {
            return Err(EncodingError::OutOfBounds(at));
        }
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&self.code[start..end]);
        encoder::NativeInsn::decode(bytes)
    }

    pub fn disassemble(&self) -> Result<String, EncodingError> {
        encoder::disassemble(&self.code)
    }
}

impl fmt::Display for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "kernel {} simd{} ({} instructions, {} GRFs, {} bytes stack/lane)",
            self.name, self.simd_width, self.insn_count, self.grf_used, self.stack_size
        )?;
        for arg in &self.arguments {
            writeln!(f, "  arg {} {} @{} size {}", arg.register, arg.family, arg.offset, arg.size)?;
        }
        for out in &self.outputs {
            writeln!(f, "  out {} {} @{} size {}", out.register, out.family, out.offset, out.size)?;
        }
        Ok(())
    }
}
