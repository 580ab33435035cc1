//! General register file allocation.
//!
//! This module assigns every virtual register a location in the GRF. The
//! file is a flat array of 32-byte registers tracked with a bit set. A few
//! registers are reserved up front: `r0` holds the thread header, then the
//! per-lane stack pointer, then a scratch area used for message payloads and
//! temporaries. Allocation never reuses a register: the function owns its
//! registers for the whole kernel.

use super::encoder::{Operand, RegType, GRF_SIZE};
use crate::core::compiler::RegisterAllocator;
use crate::core::config::GenConfig;
use crate::core::error::CompileResult;
use crate::gen::selection::Selection;
use crate::ir::{Function, RegisterFamily, RegisterIndex};
use hashbrown::HashMap;
use thiserror::Error;

/// Largest GRF count addressable by an operand.
pub const MAX_GRF_COUNT: u32 = 256;

/// Number of dword vector temporaries the scratch area must hold.
pub const SCRATCH_SLOTS: u32 = 8;

/// Location of a virtual register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GenReg {
    pub nr: u8,
    /// Byte offset inside `nr`, non-zero only for packed scalars.
    pub subnr: u8,
    /// 1 for scalar and bool registers, the SIMD width otherwise.
    pub lanes: u8,
    pub family: RegisterFamily,
}

impl GenReg {
    pub fn is_scalar(&self) -> bool {
        self.lanes == 1
    }

    /// Bytes occupied.
    pub fn size(&self) -> u32 {
        self.lanes as u32 * self.family.size()
    }

    /// Whole GRFs spanned by a vector register.
    pub fn grfs(&self) -> u32 {
        self.size().div_ceil(GRF_SIZE)
    }

    /// Byte offset in the register file.
    pub fn offset(&self) -> u32 {
        self.nr as u32 * GRF_SIZE + self.subnr as u32
    }

    /// Operand reading or writing this register as `ty`.
    pub fn operand(&self, ty: RegType) -> Operand {
        if self.is_scalar() {
            Operand::scalar(self.nr, self.subnr, ty)
        } else {
            Operand::vec(self.nr, ty)
        }
    }
}

/// Error types for register allocation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegAllocError {
    #[error("Out of registers allocating {reg} ({needed} GRFs needed, {free} free)")]
    OutOfRegisters {
        reg: RegisterIndex,
        needed: u32,
        free: u32,
    },

    #[error("Reserved registers ({reserved}) exceed the register file ({grf_count})")]
    ReservedExceedsFile { reserved: u32, grf_count: u32 },

    #[error("Register file of {0} GRFs is not addressable")]
    InvalidFileSize(u32),

    #[error("Scratch area of {available} GRFs is smaller than the {needed} required")]
    ScratchTooSmall { needed: u32, available: u32 },
}

/// Bit set over the general register file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GrfBitSet {
    words: [u64; (MAX_GRF_COUNT / 64) as usize],
}

impl GrfBitSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, nr: u32) -> bool {
        nr < MAX_GRF_COUNT && self.words[(nr / 64) as usize] & (1u64 << (nr % 64)) != 0
    }

    pub fn set(&mut self, nr: u32) {
        if nr < MAX_GRF_COUNT {
            self.words[(nr / 64) as usize] |= 1u64 << (nr % 64);
        }
    }

    pub fn set_range(&mut self, start: u32, len: u32) {
        for nr in start..start + len {
            self.set(nr);
        }
    }

    pub fn count(&self) -> u32 {
        self.words.iter().map(|w| w.count_ones()).sum()
    }

    /// One past the highest set register.
    pub fn high_water(&self) -> u32 {
        for (i, word) in self.words.iter().enumerate().rev() {
            if *word != 0 {
                return i as u32 * 64 + 64 - word.leading_zeros();
            }
        }
        0
    }

    /// First run of `len` clear registers below `limit`.
    pub fn find_free_run(&self, len: u32, limit: u32) -> Option<u32> {
        let mut run = 0;
        for nr in 0..limit.min(MAX_GRF_COUNT) {
            if self.contains(nr) {
                run = 0;
            } else {
                run += 1;
                if run == len {
                    return Some(nr + 1 - len);
                }
            }
        }
        None
    }
}

/// Result of register allocation for one function.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegisterAllocation {
    regs: HashMap<RegisterIndex, GenReg>,
    /// GRF holding the thread header.
    pub header: u8,
    /// First GRF of the per-lane stack pointer.
    pub stack_pointer: u8,
    /// First GRF of the scratch area.
    pub scratch: u8,
    pub scratch_grfs: u8,
    /// One past the highest GRF in use.
    pub grf_used: u32,
    pub simd_width: u32,
}

impl RegisterAllocation {
    pub fn get(&self, reg: RegisterIndex) -> Option<GenReg> {
        self.regs.get(&reg).copied()
    }

    pub fn len(&self) -> usize {
        self.regs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regs.is_empty()
    }

    /// GRFs taken by one dword per lane.
    pub fn dword_vector_grfs(&self) -> u8 {
        (self.simd_width * 4).div_ceil(GRF_SIZE) as u8
    }

    /// Scratch temporary `slot`, one dword per lane.
    pub fn scratch_slot(&self, slot: u8, ty: RegType) -> Operand {
        Operand::vec(self.scratch + slot * self.dword_vector_grfs(), ty)
    }

    pub fn iter(&self) -> impl Iterator<Item = (RegisterIndex, GenReg)> + '_ {
        self.regs.iter().map(|(r, g)| (*r, *g))
    }
}

/// First-fit, non-reusing allocator over the GRF.
#[derive(Debug, Clone)]
pub struct GenRegAllocator {
    grf_count: u32,
    scratch_grfs: u32,
}

impl GenRegAllocator {
    pub fn new(config: &GenConfig) -> Self {
        Self {
            grf_count: config.grf_count,
            scratch_grfs: config.scratch_grfs,
        }
    }
}

struct AllocState {
    used: GrfBitSet,
    grf_count: u32,
    simd_width: u32,
    /// GRF currently receiving packed scalars and its next free byte.
    scalar_grf: Option<(u32, u32)>,
    regs: HashMap<RegisterIndex, GenReg>,
}

impl AllocState {
    fn take_run(&mut self, reg: RegisterIndex, len: u32) -> Result<u32, RegAllocError> {
        let start = self
            .used
            .find_free_run(len, self.grf_count)
            .ok_or(RegAllocError::OutOfRegisters {
                reg,
                needed: len,
                free: self.grf_count - self.used.count(),
            })?;
        self.used.set_range(start, len);
        Ok(start)
    }

    fn allocate(&mut self, func: &Function, reg: RegisterIndex) -> CompileResult<()> {
        if self.regs.contains_key(&reg) {
            return Ok(());
        }
        let info = func.get_register(reg)?;
        let size = info.family.size();

        let gen_reg = if info.is_scalar_or_bool() {
            // Packed at natural alignment into a shared GRF.
            let (nr, offset) = match self.scalar_grf {
                Some((nr, next)) if next.next_multiple_of(size) + size <= GRF_SIZE => {
                    (nr, next.next_multiple_of(size))
                }
                _ => (self.take_run(reg, 1)?, 0),
            };
            self.scalar_grf = Some((nr, offset + size));
            GenReg {
                nr: nr as u8,
                subnr: offset as u8,
                lanes: 1,
                family: info.family,
            }
        } else {
            let grfs = (self.simd_width * size).div_ceil(GRF_SIZE);
            let nr = self.take_run(reg, grfs)?;
            GenReg {
                nr: nr as u8,
                subnr: 0,
                lanes: self.simd_width as u8,
                family: info.family,
            }
        };
        log::trace!(
            "{} -> r{}.{} ({} lanes, {})",
            reg,
            gen_reg.nr,
            gen_reg.subnr,
            gen_reg.lanes,
            gen_reg.family
        );
        self.regs.insert(reg, gen_reg);
        Ok(())
    }
}

impl RegisterAllocator for GenRegAllocator {
    fn allocate(
        &self,
        func: &Function,
        selection: &Selection,
        simd_width: u32,
    ) -> CompileResult<RegisterAllocation> {
        if self.grf_count > MAX_GRF_COUNT {
            return Err(RegAllocError::InvalidFileSize(self.grf_count).into());
        }
        let vector_grfs = (simd_width * 4).div_ceil(GRF_SIZE);
        let min_scratch = SCRATCH_SLOTS * vector_grfs;
        if self.scratch_grfs < min_scratch {
            return Err(RegAllocError::ScratchTooSmall {
                needed: min_scratch,
                available: self.scratch_grfs,
            }
            .into());
        }
        let reserved = 1 + vector_grfs + self.scratch_grfs;
        if reserved > self.grf_count {
            return Err(RegAllocError::ReservedExceedsFile {
                reserved,
                grf_count: self.grf_count,
            }
            .into());
        }

        let mut state = AllocState {
            used: GrfBitSet::new(),
            grf_count: self.grf_count,
            simd_width,
            scalar_grf: None,
            regs: HashMap::new(),
        };
        state.used.set_range(0, reserved);

        // Inputs first so the argument layout follows declaration order.
        for &reg in func.inputs() {
            state.allocate(func, reg)?;
        }
        for reg in selection.registers(func)? {
            state.allocate(func, reg)?;
        }
        for &reg in func.outputs() {
            state.allocate(func, reg)?;
        }

        let grf_used = state.used.high_water();
        log::debug!(
            "Allocated {} registers for {} in {} GRFs",
            state.regs.len(),
            func.name(),
            grf_used
        );
        Ok(RegisterAllocation {
            regs: state.regs,
            header: 0,
            stack_pointer: 1,
            scratch: (1 + vector_grfs) as u8,
            scratch_grfs: self.scratch_grfs as u8,
            grf_used,
            simd_width,
        })
    }
}
