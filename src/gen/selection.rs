// This module implements instruction selection for the Gen backend. SimpleSelection first
// runs `check` over every instruction of the function so malformed IR is reported with its
// instruction id before anything is allocated or emitted. It then copies the block
// structure into a Selection, one SelectedInsn per IR instruction, in program order. The
// only rewrite is multiply-add fusion: a float `mul t, a, b` immediately followed in the
// same block by an `add d, t, c` (or `add d, c, t`) becomes a single fused multiply-add
// when `t` has no other use and is not a function output. Fusion can be disabled through
// GenConfig. The Selection also reports the registers it references in first-use order,
// which drives the register allocator.

//! Instruction selection.

use crate::core::compiler::SelectionEngine;
use crate::core::config::GenConfig;
use crate::core::error::{CompileError, CompileResult};
use crate::core::session::CompilationSession;
use crate::ir::{
    BinaryInstruction, Function, InsnId, IrResult, LabelIndex, Opcode, RegisterIndex, Type,
};

/// One unit of lowering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectedInsn {
    /// Lower the IR instruction as is.
    Ir(InsnId),
    /// `dst = src[0] * src[1] + src[2]` replacing a `mul` and the `add`
    /// consuming it.
    FusedMad {
        mul: InsnId,
        add: InsnId,
        ty: Type,
        dst: RegisterIndex,
        src: [RegisterIndex; 3],
    },
}

impl SelectedInsn {
    /// Visit source registers then destination registers.
    pub fn for_each_register(
        &self,
        func: &Function,
        mut f: impl FnMut(RegisterIndex),
    ) -> IrResult<()> {
        match *self {
            SelectedInsn::Ir(id) => {
                let insn = func.insn(id)?;
                for i in 0..insn.src_num() {
                    f(insn.src_index(func, i)?);
                }
                for i in 0..insn.dst_num() {
                    f(insn.dst_index(func, i)?);
                }
            }
            SelectedInsn::FusedMad { dst, src, .. } => {
                src.into_iter().for_each(&mut f);
                f(dst);
            }
        }
        Ok(())
    }
}

/// Selected instructions of one basic block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionBlock {
    /// Index of the block in the function.
    pub index: usize,
    pub label: LabelIndex,
    pub insns: Vec<SelectedInsn>,
}

/// Ordered selection of a whole function.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    pub blocks: Vec<SelectionBlock>,
}

impl Selection {
    pub fn insns(&self) -> impl Iterator<Item = &SelectedInsn> + '_ {
        self.blocks.iter().flat_map(|b| b.insns.iter())
    }

    pub fn len(&self) -> usize {
        self.blocks.iter().map(|b| b.insns.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registers referenced by the selection, in order of first use.
    pub fn registers(&self, func: &Function) -> IrResult<Vec<RegisterIndex>> {
        let mut seen = vec![false; func.reg_num()];
        let mut order = Vec::new();
        for insn in self.insns() {
            insn.for_each_register(func, |reg| {
                if let Some(slot) = seen.get_mut(reg.index()) {
                    if !*slot {
                        *slot = true;
                        order.push(reg);
                    }
                }
            })?;
        }
        Ok(order)
    }
}

/// In-order selection with optional multiply-add fusion.
#[derive(Debug, Clone)]
pub struct SimpleSelection {
    fuse_mad: bool,
}

impl SimpleSelection {
    pub fn new(config: &GenConfig) -> Self {
        Self {
            fuse_mad: config.fuse_mad,
        }
    }

    /// Source uses of every register.
    fn use_counts(func: &Function) -> IrResult<Vec<u32>> {
        let mut uses = vec![0u32; func.reg_num()];
        for (_, insn) in func.insns() {
            for i in 0..insn.src_num() {
                let reg = insn.src_index(func, i)?;
                if let Some(count) = uses.get_mut(reg.index()) {
                    *count += 1;
                }
            }
        }
        Ok(uses)
    }

    /// Fused form of `mul` at `mul_id` and the next instruction, if legal.
    fn try_fuse(
        func: &Function,
        uses: &[u32],
        mul_id: InsnId,
        add_id: InsnId,
    ) -> IrResult<Option<SelectedInsn>> {
        let (mul, add) = (func.insn(mul_id)?, func.insn(add_id)?);
        if mul.opcode() != Opcode::Mul || add.opcode() != Opcode::Add {
            return Ok(None);
        }
        let (mul, add) = (mul.cast::<BinaryInstruction>(), add.cast::<BinaryInstruction>());
        if !mul.ty().is_float() || mul.ty() != add.ty() {
            return Ok(None);
        }

        let t = mul.dst();
        if uses.get(t.index()) != Some(&1) || func.is_output(t) {
            return Ok(None);
        }
        let addend = match (add.src0() == t, add.src1() == t) {
            (true, false) => add.src1(),
            (false, true) => add.src0(),
            _ => return Ok(None),
        };
        Ok(Some(SelectedInsn::FusedMad {
            mul: mul_id,
            add: add_id,
            ty: mul.ty(),
            dst: add.dst(),
            src: [mul.src0(), mul.src1(), addend],
        }))
    }
}

impl SelectionEngine for SimpleSelection {
    fn select(&self, func: &Function, session: &CompilationSession<'_>) -> CompileResult<Selection> {
        for (id, insn) in func.insns() {
            insn.check(func).map_err(|reason| CompileError::Malformed {
                id,
                opcode: insn.opcode(),
                reason,
            })?;
        }

        let uses = if self.fuse_mad {
            Self::use_counts(func)?
        } else {
            Vec::new()
        };

        let mut selection = Selection::default();
        let mut fused = 0;
        for (index, block) in func.blocks().iter().enumerate() {
            let mut insns = Vec::with_capacity(block.len());
            let mut i = 0;
            while i < block.len() {
                let id = func.insn_id(index, i)?;
                if self.fuse_mad && i + 1 < block.len() {
                    let next = func.insn_id(index, i + 1)?;
                    if let Some(mad) = Self::try_fuse(func, &uses, id, next)? {
                        log::trace!("Fusing {} and {} into mad", id, next);
                        session.record_mad_fused();
                        insns.push(mad);
                        fused += 1;
                        i += 2;
                        continue;
                    }
                }
                insns.push(SelectedInsn::Ir(id));
                i += 1;
            }
            selection.blocks.push(SelectionBlock {
                index,
                label: block.label(),
                insns,
            });
        }

        log::debug!(
            "Selected {} instructions in {} blocks for {} ({} fused)",
            selection.len(),
            selection.blocks.len(),
            func.name(),
            fused
        );
        Ok(selection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{FunctionBuilder, Instruction, RegisterFamily};
    use bumpalo::Bump;

    fn mul_add(ty: Type, extra_use: bool) -> Function {
        let mut b = FunctionBuilder::new("mad");
        let (a, x, c, t, d) = (
            b.reg(RegisterFamily::DWord),
            b.reg(RegisterFamily::DWord),
            b.reg(RegisterFamily::DWord),
            b.reg(RegisterFamily::DWord),
            b.reg(RegisterFamily::DWord),
        );
        b.append(Instruction::mul(ty, t, a, x));
        b.append(Instruction::add(ty, d, c, t));
        if extra_use {
            b.append(Instruction::mov(ty, a, t));
        }
        b.output(d);
        b.finish().unwrap()
    }

    fn select(func: &Function, config: &GenConfig) -> CompileResult<Selection> {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        SimpleSelection::new(config).select(func, &session)
    }

    #[test]
    fn test_float_mul_add_is_fused() {
        let func = mul_add(Type::F32, false);
        let selection = select(&func, &GenConfig::default()).unwrap();
        // label + fused mad
        assert_eq!(selection.len(), 2);
        match selection.blocks[0].insns[1] {
            SelectedInsn::FusedMad { ty, dst, src, .. } => {
                assert_eq!(ty, Type::F32);
                assert_eq!(dst, RegisterIndex(4));
                assert_eq!(src, [RegisterIndex(0), RegisterIndex(1), RegisterIndex(2)]);
            }
            other => panic!("expected a fused mad, got {other:?}"),
        }
        // The temporary is never referenced.
        let regs = selection.registers(&func).unwrap();
        assert!(!regs.contains(&RegisterIndex(3)));
    }

    #[test]
    fn test_no_fusion_for_integers_or_shared_temporaries() {
        let int = select(&mul_add(Type::U32, false), &GenConfig::default()).unwrap();
        assert_eq!(int.len(), 3);

        let shared = select(&mul_add(Type::F32, true), &GenConfig::default()).unwrap();
        assert_eq!(shared.len(), 4);

        let disabled = GenConfig::default().with_mad_fusion(false);
        assert_eq!(select(&mul_add(Type::F32, false), &disabled).unwrap().len(), 3);
    }

    #[test]
    fn test_registers_in_first_use_order() {
        let func = mul_add(Type::U32, false);
        let selection = select(&func, &GenConfig::default()).unwrap();
        let regs = selection.registers(&func).unwrap();
        assert_eq!(
            regs,
            [
                RegisterIndex(0),
                RegisterIndex(1),
                RegisterIndex(3),
                RegisterIndex(2),
                RegisterIndex(4)
            ]
        );
    }
}
