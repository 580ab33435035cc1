//! Virtual registers and register tuples.
//!
//! Instructions never hold registers directly. They store a [`RegisterIndex`]
//! into the register file of their function, or a [`TupleIndex`] when more
//! registers are needed than fit in the instruction payload. Both are plain
//! indices, so instructions stay `Copy` and free of lifetimes.

use super::error::{IrError, IrResult};
use super::types::RegisterFamily;
use std::fmt;

/// Index of a register in the function register file.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegisterIndex(pub u16);

impl RegisterIndex {
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for RegisterIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// Index of a register tuple in the function tuple table.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TupleIndex(pub u16);

impl TupleIndex {
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for TupleIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Register resolved from the register file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Register {
    pub index: RegisterIndex,
    pub family: RegisterFamily,
    /// Uniform registers hold one value shared by all lanes.
    pub uniform: bool,
}

impl Register {
    /// Bool registers are lane masks and uniform registers hold a single
    /// value: neither needs per-lane storage.
    pub fn is_scalar_or_bool(&self) -> bool {
        self.uniform || self.family == RegisterFamily::Bool
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RegisterData {
    family: RegisterFamily,
    uniform: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TupleSpan {
    start: u32,
    len: u16,
}

/// Registers and tuples declared by one function.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegisterFile {
    regs: Vec<RegisterData>,
    tuples: Vec<TupleSpan>,
    tuple_regs: Vec<RegisterIndex>,
}

impl RegisterFile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registers declared.
    pub fn reg_num(&self) -> usize {
        self.regs.len()
    }

    /// Number of tuples declared.
    pub fn tuple_num(&self) -> usize {
        self.tuples.len()
    }

    pub(crate) fn append(&mut self, family: RegisterFamily, uniform: bool) -> Option<RegisterIndex> {
        let index = u16::try_from(self.regs.len()).ok()?;
        self.regs.push(RegisterData { family, uniform });
        Some(RegisterIndex(index))
    }

    pub(crate) fn append_tuple(&mut self, regs: &[RegisterIndex]) -> Option<TupleIndex> {
        let index = u16::try_from(self.tuples.len()).ok()?;
        let len = u16::try_from(regs.len()).ok()?;
        let start = u32::try_from(self.tuple_regs.len()).ok()?;
        self.tuples.push(TupleSpan { start, len });
        self.tuple_regs.extend_from_slice(regs);
        Some(TupleIndex(index))
    }

    /// Resolve a register index.
    pub fn get(&self, index: RegisterIndex) -> IrResult<Register> {
        let data = self.regs.get(index.index()).ok_or(IrError::OutOfRange {
            what: "register",
            index: index.0 as u32,
            len: self.regs.len() as u32,
        })?;
        Ok(Register {
            index,
            family: data.family,
            uniform: data.uniform,
        })
    }

    /// All registers of a tuple, in creation order.
    pub fn tuple(&self, tuple: TupleIndex) -> IrResult<&[RegisterIndex]> {
        let span = self.tuples.get(tuple.index()).ok_or(IrError::OutOfRange {
            what: "tuple",
            index: tuple.0 as u32,
            len: self.tuples.len() as u32,
        })?;
        let start = span.start as usize;
        Ok(&self.tuple_regs[start..start + span.len as usize])
    }

    /// Register at position `which` of a tuple.
    pub fn get_tuple_entry(&self, tuple: TupleIndex, which: u32) -> IrResult<RegisterIndex> {
        let regs = self.tuple(tuple)?;
        regs.get(which as usize).copied().ok_or(IrError::OutOfRange {
            what: "tuple entry",
            index: which,
            len: regs.len() as u32,
        })
    }
}
