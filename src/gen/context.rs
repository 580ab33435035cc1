// This module implements GenContext, the driver turning one IR function into a Gen kernel.
// `emit_code` runs a strictly ordered pipeline: validate the SIMD width, select
// instructions, allocate registers, emit the per-lane stack pointer setup, lower every
// selected instruction in program order, terminate the thread, patch branch targets and
// package the kernel. Lowering is split per instruction family. Most families map to one
// or two native instructions; 32x32 integer multiplies expand to an accumulator sequence
// per 8-lane half, compares go through the flag register, and memory accesses become
// data-port messages whose shape depends on the alignment policy (untyped dword messages
// or one byte gather/scatter per element). While emitting, the context records the offset
// of every label and every branch in arena vectors from the compilation session. Branches
// to labels already emitted get their target immediately; the others carry a placeholder
// until the patch pass, which rewrites every branch from the final label table.

//! Code generation context.
//!
//! ```
//! use bumpalo::Bump;
//! use genbe::core::{CompilationSession, GenConfig};
//! use genbe::gen::GenContext;
//! use genbe::ir::{FunctionBuilder, Instruction, RegisterFamily, Type};
//!
//! let mut b = FunctionBuilder::new("add");
//! let (x, y, z) = (b.reg(RegisterFamily::DWord), b.reg(RegisterFamily::DWord), b.reg(RegisterFamily::DWord));
//! b.input(x);
//! b.input(y);
//! b.append(Instruction::add(Type::U32, z, x, y));
//! b.output(z);
//! let func = b.finish().unwrap();
//!
//! let arena = Bump::new();
//! let session = CompilationSession::new(&arena);
//! let config = GenConfig::default();
//! let kernel = GenContext::new(&func, &session, &config).emit_code().unwrap();
//! assert_eq!(kernel.arguments.len(), 2);
//! ```

use super::encoder::{
    CondMod, GenEmitter, GenOpcode, MathFunction, MessageDescriptor, MessageKind, NativeInsn,
    Operand, Predicate, RegType, Region, SharedFunction, Source, INSN_SIZE,
};
use super::kernel::{Kernel, KernelArgument};
use super::register_file::{GenReg, GenRegAllocator, RegisterAllocation};
use super::selection::{SelectedInsn, Selection, SimpleSelection};
use crate::core::compiler::{Emitter, RegisterAllocator, SelectionEngine};
use crate::core::config::{AccessPath, GenConfig, SUPPORTED_SIMD_WIDTHS};
use crate::core::error::{CompileError, CompileResult};
use crate::core::session::CompilationSession;
use crate::ir::{
    BinaryInstruction, BranchInstruction, CompareInstruction, ConvertInstruction, Family,
    FenceInstruction, Function, InsnId, Instruction, IrError, IrResult, LabelIndex,
    LabelInstruction, LoadImmInstruction, LoadInstruction, MemorySpace, Opcode, RegisterIndex,
    SelectInstruction, StoreInstruction, TernaryInstruction, TextureInstruction, TextureOp, Type,
    UnaryInstruction, Value,
};
use bumpalo::collections::Vec as BumpVec;

/// Binding table indices of the memory spaces.
pub mod bti {
    pub const GLOBAL: u8 = 0;
    pub const CONSTANT: u8 = 1;
    /// Shared local memory.
    pub const LOCAL: u8 = 254;
}

// Scratch slots, one dword per lane each.
const PAYLOAD_SLOT: u8 = 0;
const RESPONSE_SLOT: u8 = 1;
const SAMPLE_RESPONSE_SLOT: u8 = 4;
const ADDRESS_SLOT: u8 = 7;

/// Untyped messages carry at most four channels.
const MAX_UNTYPED_CHANNELS: usize = 4;

fn surface(space: MemorySpace) -> u8 {
    match space {
        MemorySpace::Global | MemorySpace::Private => bti::GLOBAL,
        MemorySpace::Constant => bti::CONSTANT,
        MemorySpace::Local => bti::LOCAL,
    }
}

/// Native register type of an IR type. Bools are 16-bit lane masks.
pub fn reg_type(ty: Type) -> RegType {
    match ty {
        Type::Bool => RegType::UW,
        Type::S8 => RegType::B,
        Type::U8 => RegType::UB,
        Type::S16 => RegType::W,
        Type::U16 => RegType::UW,
        Type::S32 => RegType::D,
        Type::U32 => RegType::UD,
        Type::S64 => RegType::Q,
        Type::U64 => RegType::UQ,
        Type::F32 => RegType::F,
        Type::F64 => RegType::DF,
    }
}

/// Unsigned type moving `size` bytes without conversion.
fn raw_type(size: u32) -> RegType {
    match size {
        1 => RegType::UB,
        2 => RegType::UW,
        _ => RegType::UD,
    }
}

/// Byte immediates do not exist; they are widened to words.
fn imm_type(ty: RegType) -> RegType {
    match ty {
        RegType::B => RegType::W,
        RegType::UB => RegType::UW,
        other => other,
    }
}

fn as_unsigned(ty: RegType) -> RegType {
    match ty {
        RegType::B => RegType::UB,
        RegType::W => RegType::UW,
        RegType::D => RegType::UD,
        RegType::Q => RegType::UQ,
        other => other,
    }
}

fn as_signed(ty: RegType) -> RegType {
    match ty {
        RegType::UB => RegType::B,
        RegType::UW => RegType::W,
        RegType::UD => RegType::D,
        RegType::UQ => RegType::Q,
        other => other,
    }
}

/// Immediate bits, sign extended to 32 bits for narrow signed types.
fn imm_bits(value: Value) -> u32 {
    match value {
        Value::S8(v) => v as i32 as u32,
        Value::S16(v) => v as i32 as u32,
        other => other.to_bits() as u32,
    }
}

fn is_int64(ty: Type) -> bool {
    ty.is_integer() && ty.size() == 8
}

fn unsupported(opcode: Opcode, ty: Type, reason: &'static str) -> CompileError {
    CompileError::Unsupported { opcode, ty, reason }
}

#[derive(Debug, Clone, Copy)]
struct BranchRecord {
    id: InsnId,
    label: LabelIndex,
    at: u32,
}

/// Lowers one function to a [`Kernel`].
pub struct GenContext<'a, 'arena> {
    func: &'a Function,
    session: &'a CompilationSession<'arena>,
    config: &'a GenConfig,
    simd_width: u32,
    p: Box<dyn Emitter + 'a>,
    sel: Box<dyn SelectionEngine + 'a>,
    ra: Box<dyn RegisterAllocator + 'a>,
    regs: RegisterAllocation,
    /// Offset of each label, once emitted.
    label_pos: BumpVec<'arena, Option<u32>>,
    /// Offset of each branch, in emission order.
    branch_pos: BumpVec<'arena, BranchRecord>,
}

impl<'a, 'arena> GenContext<'a, 'arena> {
    /// Context with the Gen emitter, selection and allocator.
    pub fn new(
        func: &'a Function,
        session: &'a CompilationSession<'arena>,
        config: &'a GenConfig,
    ) -> Self {
        Self::with_collaborators(
            func,
            session,
            config,
            Box::new(GenEmitter::new()),
            Box::new(SimpleSelection::new(config)),
            Box::new(GenRegAllocator::new(config)),
        )
    }

    pub fn with_collaborators(
        func: &'a Function,
        session: &'a CompilationSession<'arena>,
        config: &'a GenConfig,
        emitter: Box<dyn Emitter + 'a>,
        selection: Box<dyn SelectionEngine + 'a>,
        allocator: Box<dyn RegisterAllocator + 'a>,
    ) -> Self {
        let arena = session.arena();
        Self {
            func,
            session,
            config,
            simd_width: config.resolve_simd_width(func.simd_width()),
            p: emitter,
            sel: selection,
            ra: allocator,
            regs: RegisterAllocation::default(),
            label_pos: BumpVec::new_in(arena),
            branch_pos: BumpVec::new_in(arena),
        }
    }

    pub fn function(&self) -> &'a Function {
        self.func
    }

    pub fn simd_width(&self) -> u32 {
        self.simd_width
    }

    /// Offset of `label` in the stream, once emitted.
    pub fn label_position(&self, label: LabelIndex) -> Option<u32> {
        self.label_pos.get(label.index()).copied().flatten()
    }

    /// Offset of every branch emitted, keyed by instruction id.
    pub fn branch_positions(&self) -> impl Iterator<Item = (InsnId, u32)> + '_ {
        self.branch_pos.iter().map(|b| (b.id, b.at))
    }

    /// Compile the function.
    ///
    /// Any failure aborts the whole compilation; no partial kernel is
    /// produced.
    pub fn emit_code(&mut self) -> CompileResult<Kernel> {
        let width = self.simd_width;
        if !SUPPORTED_SIMD_WIDTHS.contains(&width) {
            return Err(CompileError::InvalidSimdWidth(width));
        }
        self.session.set_current_kernel(self.func.name());
        log::info!("Compiling {} at SIMD{}", self.func.name(), width);

        let selection = self.sel.select(self.func, self.session)?;
        self.regs = self.ra.allocate(self.func, &selection, width)?;
        self.check_allocation(&selection)?;
        self.session
            .record_registers_allocated(self.regs.len(), self.regs.grf_used);

        self.label_pos.clear();
        self.label_pos.resize(self.func.label_num(), None);
        self.branch_pos.clear();

        self.emit_stack_pointer()?;
        self.emit_instruction_stream(&selection)?;
        self.emit_end_of_thread()?;
        self.patch_branches()?;
        self.allocate_kernel()
    }

    fn check_allocation(&self, selection: &Selection) -> CompileResult<()> {
        let referenced = selection.registers(self.func)?;
        let declared = self.func.inputs().iter().chain(self.func.outputs());
        for &reg in referenced.iter().chain(declared) {
            self.gen_reg(reg)?;
        }
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Helpers
    // ---------------------------------------------------------------------

    fn w(&self) -> u8 {
        self.simd_width as u8
    }

    fn gen_reg(&self, reg: RegisterIndex) -> CompileResult<GenReg> {
        self.regs
            .get(reg)
            .ok_or(CompileError::UnallocatedRegister(reg))
    }

    fn operand(&self, reg: RegisterIndex, ty: RegType) -> CompileResult<Operand> {
        Ok(self.gen_reg(reg)?.operand(ty))
    }

    /// Scalar and bool destinations execute on one lane.
    fn exec_size(&self, dst: RegisterIndex) -> CompileResult<u8> {
        Ok(if self.gen_reg(dst)?.is_scalar() {
            1
        } else {
            self.w()
        })
    }

    fn temp(&self, slot: u8, ty: RegType, exec: u8) -> Operand {
        let op = self.regs.scratch_slot(slot, ty);
        if exec == 1 {
            op.with_region(Region::Scalar)
        } else {
            op
        }
    }

    fn emit(&mut self, insn: NativeInsn) -> CompileResult<u32> {
        Ok(self.p.emit(&insn)?)
    }

    fn send(
        &mut self,
        exec: u8,
        dst: Operand,
        payload: Operand,
        sfid: SharedFunction,
        desc: MessageDescriptor,
    ) -> CompileResult<u32> {
        self.emit(
            NativeInsn::new(GenOpcode::Send, exec, dst)
                .src0(payload)
                .src1(Source::ud(desc.encode()?))
                .sfid(sfid),
        )
    }

    /// Copy `reg` into `f0.0`.
    fn load_flag(&mut self, reg: RegisterIndex) -> CompileResult<()> {
        let pred = self.operand(reg, RegType::UW)?;
        self.emit(NativeInsn::new(GenOpcode::Mov, 1, Operand::flag()).src0(pred))?;
        Ok(())
    }

    fn tuple_regs(&self, tuple: crate::ir::TupleIndex, count: u32) -> IrResult<Vec<RegisterIndex>> {
        (0..count)
            .map(|i| self.func.get_register_index(tuple, i))
            .collect()
    }

    // ---------------------------------------------------------------------
    // Pipeline stages
    // ---------------------------------------------------------------------

    /// Per-lane private stack base: `(thread id * W + lane id) * stack size`.
    fn emit_stack_pointer(&mut self) -> CompileResult<()> {
        let w = self.w();
        let stack_size = self.config.stack_size;
        let sp = Operand::vec(self.regs.stack_pointer, RegType::UD);
        let lanes = Operand::vec(self.regs.scratch, RegType::UW);

        self.emit(
            NativeInsn::new(GenOpcode::Mov, 8, lanes).src0(Source::imm(RegType::V, 0x7654_3210)),
        )?;
        if w == 16 {
            let upper = Operand { subnr: 16, ..lanes };
            self.emit(
                NativeInsn::new(GenOpcode::Add, 8, upper)
                    .src0(lanes)
                    .src1(Source::uw(8)),
            )?;
        }
        self.emit(
            NativeInsn::new(GenOpcode::Mul, w, sp)
                .src0(lanes)
                .src1(Source::ud(stack_size)),
        )?;

        let tid = Operand::scalar(self.regs.scratch, 0, RegType::UW);
        let header_tid = Operand::scalar(self.regs.header, 20, RegType::UW);
        self.emit(
            NativeInsn::new(GenOpcode::And, 1, tid)
                .src0(header_tid)
                .src1(Source::uw(0x1ff)),
        )?;
        let thread_base = Operand::scalar(self.regs.scratch, 4, RegType::UD);
        self.emit(
            NativeInsn::new(GenOpcode::Mul, 1, thread_base)
                .src0(tid)
                .src1(Source::ud(stack_size.saturating_mul(w as u32))),
        )?;
        self.emit(
            NativeInsn::new(GenOpcode::Add, w, sp)
                .src0(sp)
                .src1(thread_base),
        )?;
        Ok(())
    }

    fn emit_instruction_stream(&mut self, selection: &Selection) -> CompileResult<()> {
        let func = self.func;
        for block in &selection.blocks {
            log::trace!("Emitting block {} ({})", block.index, block.label);
            for selected in &block.insns {
                match *selected {
                    SelectedInsn::Ir(id) => {
                        let insn = func.insn(id)?;
                        self.session.record_instruction_compiled(insn.opcode());
                        self.emit_instruction(id, insn)?;
                    }
                    SelectedInsn::FusedMad { ty, dst, src, .. } => {
                        self.session.record_instruction_compiled(Opcode::Mad);
                        self.emit_mad(ty, dst, src)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn emit_instruction(&mut self, id: InsnId, insn: &Instruction) -> CompileResult<()> {
        match insn.family() {
            Family::Unary => self.emit_unary(insn.cast()),
            Family::Binary => self.emit_binary(insn.cast()),
            Family::Ternary => self.emit_ternary(insn.cast()),
            Family::Select => self.emit_select(insn.cast()),
            Family::Compare => self.emit_compare(insn.cast()),
            Family::Convert => self.emit_convert(insn.cast()),
            Family::Branch => self.emit_branch(id, insn.cast()),
            Family::LoadImm => self.emit_load_imm(insn.cast()),
            Family::Load => self.emit_load(insn.cast()),
            Family::Store => self.emit_store(insn.cast()),
            Family::Texture => self.emit_texture(insn.cast()),
            Family::Fence => self.emit_fence(insn.cast()),
            Family::Label => {
                let label = insn.cast::<LabelInstruction>().label();
                let at = self.p.position();
                log::trace!("{} at {:#x}", label, at);
                let len = self.label_pos.len() as u32;
                let slot = self
                    .label_pos
                    .get_mut(label.index())
                    .ok_or(IrError::OutOfRange {
                        what: "label",
                        index: label.index() as u32,
                        len,
                    })?;
                *slot = Some(at);
                Ok(())
            }
        }
    }

    fn emit_end_of_thread(&mut self) -> CompileResult<()> {
        let header = Operand::vec(self.regs.header, RegType::UD);
        let desc = MessageDescriptor::new(MessageKind::EndOfThread, 0).lengths(1, 0);
        self.emit(
            NativeInsn::new(GenOpcode::Send, 8, Operand::NULL)
                .src0(header)
                .src1(Source::ud(desc.encode()?))
                .sfid(SharedFunction::ThreadSpawner)
                .eot(),
        )?;
        Ok(())
    }

    /// Rewrite every branch with the final label offsets.
    fn patch_branches(&mut self) -> CompileResult<()> {
        for record in self.branch_pos.iter() {
            let target = self
                .label_pos
                .get(record.label.index())
                .copied()
                .flatten()
                .ok_or(CompileError::UnresolvedLabel {
                    branch: record.id,
                    label: record.label,
                })?;
            self.p.patch_jump(record.at, target)?;
            self.session.record_branch_patched();
        }
        log::debug!("Patched {} branches", self.branch_pos.len());
        Ok(())
    }

    fn allocate_kernel(&mut self) -> CompileResult<Kernel> {
        let describe = |reg: RegisterIndex| -> CompileResult<KernelArgument> {
            let gen_reg = self.gen_reg(reg)?;
            Ok(KernelArgument {
                register: reg,
                family: gen_reg.family,
                offset: gen_reg.offset(),
                size: gen_reg.size(),
            })
        };
        let arguments = self
            .func
            .inputs()
            .iter()
            .map(|&r| describe(r))
            .collect::<CompileResult<Vec<_>>>()?;
        let outputs = self
            .func
            .outputs()
            .iter()
            .map(|&r| describe(r))
            .collect::<CompileResult<Vec<_>>>()?;

        let code = self.p.finish();
        let insn_count = code.len() / INSN_SIZE as usize;
        self.session
            .record_kernel_compiled(self.func.name(), code.len());
        Ok(Kernel {
            name: self.func.name().to_string(),
            code,
            simd_width: self.simd_width,
            stack_size: self.config.stack_size,
            grf_used: self.regs.grf_used,
            arguments,
            outputs,
            insn_count,
        })
    }

    // ---------------------------------------------------------------------
    // Per-family lowering
    // ---------------------------------------------------------------------

    fn emit_unary(&mut self, insn: UnaryInstruction<'_>) -> CompileResult<()> {
        let (op, ty) = (insn.opcode(), insn.ty());
        let exec = self.exec_size(insn.dst())?;
        let rt = reg_type(ty);
        let dst = self.operand(insn.dst(), rt)?;
        let src = self.operand(insn.src(), rt)?;

        if op == Opcode::Mov {
            self.emit(NativeInsn::new(GenOpcode::Mov, exec, dst).src0(src))?;
            return Ok(());
        }
        if ty != Type::F32 {
            return Err(unsupported(op, ty, "math functions need f32"));
        }
        if op == Opcode::Tan {
            let sin = self.temp(0, RegType::F, exec);
            let cos = self.temp(1, RegType::F, exec);
            self.emit(NativeInsn::new(GenOpcode::Math, exec, sin).src0(src).math(MathFunction::Sin))?;
            self.emit(NativeInsn::new(GenOpcode::Math, exec, cos).src0(src).math(MathFunction::Cos))?;
            self.emit(
                NativeInsn::new(GenOpcode::Math, exec, dst)
                    .src0(sin)
                    .src1(cos)
                    .math(MathFunction::Fdiv),
            )?;
            return Ok(());
        }

        let function = match op {
            Opcode::Cos => MathFunction::Cos,
            Opcode::Sin => MathFunction::Sin,
            Opcode::Log => MathFunction::Log,
            Opcode::Sqr => MathFunction::Sqrt,
            Opcode::Rsq => MathFunction::Rsq,
            _ => unreachable!("{op} is not a unary opcode"),
        };
        self.emit(NativeInsn::new(GenOpcode::Math, exec, dst).src0(src).math(function))?;
        Ok(())
    }

    fn emit_binary(&mut self, insn: BinaryInstruction<'_>) -> CompileResult<()> {
        let (op, ty) = (insn.opcode(), insn.ty());
        let exec = self.exec_size(insn.dst())?;
        let rt = reg_type(ty);
        let dst = self.operand(insn.dst(), rt)?;
        let src0 = self.operand(insn.src0(), rt)?;
        let src1 = self.operand(insn.src1(), rt)?;
        let native = |opcode| NativeInsn::new(opcode, exec, dst).src0(src0).src1(src1);
        let math = |function| native(GenOpcode::Math).math(function);

        let lowered = match op {
            Opcode::And | Opcode::Or | Opcode::Xor => {
                if ty.is_float() {
                    return Err(unsupported(op, ty, "bitwise operation on floats"));
                }
                if is_int64(ty) {
                    return Err(unsupported(op, ty, "64-bit integer arithmetic"));
                }
                native(match op {
                    Opcode::And => GenOpcode::And,
                    Opcode::Or => GenOpcode::Or,
                    _ => GenOpcode::Xor,
                })
            }
            _ if ty == Type::Bool => return Err(unsupported(op, ty, "arithmetic on bool")),
            _ if is_int64(ty) => return Err(unsupported(op, ty, "64-bit integer arithmetic")),
            Opcode::Add => native(GenOpcode::Add),
            Opcode::Sub => NativeInsn::new(GenOpcode::Add, exec, dst)
                .src0(src0)
                .src1(src1.negated()),
            Opcode::Shl | Opcode::Shr | Opcode::Asr => {
                if ty.is_float() {
                    return Err(unsupported(op, ty, "shift of floats"));
                }
                let (opcode, shifted) = match op {
                    Opcode::Shl => (GenOpcode::Shl, rt),
                    Opcode::Shr => (GenOpcode::Shr, as_unsigned(rt)),
                    _ => (GenOpcode::Asr, as_signed(rt)),
                };
                NativeInsn::new(opcode, exec, dst.retyped(shifted))
                    .src0(src0.retyped(shifted))
                    .src1(src1)
            }
            Opcode::Mul if ty.is_float() || ty.size() < 4 => native(GenOpcode::Mul),
            Opcode::Mul => return self.emit_int_mul32(exec, dst, src0, src1),
            Opcode::Div if ty == Type::F32 => math(MathFunction::Fdiv),
            Opcode::Div if ty.size() == 4 && ty.is_integer() => math(MathFunction::IntDivQuotient),
            Opcode::Rem if ty.size() == 4 && ty.is_integer() => math(MathFunction::IntDivRemainder),
            Opcode::Pow if ty == Type::F32 => math(MathFunction::Pow),
            Opcode::Div | Opcode::Rem | Opcode::Pow => {
                return Err(unsupported(op, ty, "no math function for this type"))
            }
            _ => unreachable!("{op} is not a binary opcode"),
        };
        self.emit(lowered)?;
        Ok(())
    }

    /// 32x32 integer multiply through the accumulator, one 8-lane half at a
    /// time.
    fn emit_int_mul32(
        &mut self,
        exec: u8,
        dst: Operand,
        src0: Operand,
        src1: Operand,
    ) -> CompileResult<()> {
        let width = exec.min(8);
        let halves = if exec > 8 { exec / 8 } else { 1 };
        let acc = Operand::acc0(dst.ty);
        for half in 0..halves {
            let (a, b) = (src0.advance(half), src1.advance(half));
            self.emit(NativeInsn::new(GenOpcode::Mul, width, acc).src0(a).src1(b))?;
            self.emit(NativeInsn::new(GenOpcode::Mach, width, Operand::NULL.retyped(dst.ty)).src0(a).src1(b))?;
            self.emit(NativeInsn::new(GenOpcode::Mov, width, dst.advance(half)).src0(acc))?;
        }
        Ok(())
    }

    fn emit_ternary(&mut self, insn: TernaryInstruction<'_>) -> CompileResult<()> {
        let regs = self.tuple_regs(insn.src(), 3)?;
        self.emit_mad(insn.ty(), insn.dst(), [regs[0], regs[1], regs[2]])
    }

    /// `dst = src[0] * src[1] + src[2]`
    fn emit_mad(&mut self, ty: Type, dst: RegisterIndex, src: [RegisterIndex; 3]) -> CompileResult<()> {
        let exec = self.exec_size(dst)?;
        let rt = reg_type(ty);
        let d = self.operand(dst, rt)?;
        let a = self.operand(src[0], rt)?;
        let b = self.operand(src[1], rt)?;
        let c = self.operand(src[2], rt)?;
        match ty {
            Type::F32 | Type::F64 => {
                // Native mad computes src1 * src2 + src0.
                self.emit(NativeInsn::new(GenOpcode::Mad, exec, d).src0(c).src1(a).src2(b))?;
            }
            Type::S32 | Type::U32 => {
                let product = self.temp(PAYLOAD_SLOT, rt, exec);
                self.emit_int_mul32(exec, product, a, b)?;
                self.emit(NativeInsn::new(GenOpcode::Add, exec, d).src0(product).src1(c))?;
            }
            _ => return Err(unsupported(Opcode::Mad, ty, "mad needs 32-bit or float operands")),
        }
        Ok(())
    }

    fn emit_select(&mut self, insn: SelectInstruction<'_>) -> CompileResult<()> {
        let regs = self.tuple_regs(insn.src(), 3)?;
        let exec = self.exec_size(insn.dst())?;
        let rt = reg_type(insn.ty());
        let dst = self.operand(insn.dst(), rt)?;
        let then = self.operand(regs[1], rt)?;
        let otherwise = self.operand(regs[2], rt)?;
        self.load_flag(regs[0])?;
        self.emit(
            NativeInsn::new(GenOpcode::Sel, exec, dst)
                .src0(then)
                .src1(otherwise)
                .pred(Predicate::Normal),
        )?;
        Ok(())
    }

    fn emit_compare(&mut self, insn: CompareInstruction<'_>) -> CompileResult<()> {
        let (op, ty) = (insn.opcode(), insn.ty());
        if is_int64(ty) {
            return Err(unsupported(op, ty, "64-bit integer comparison"));
        }
        let cond = match op {
            Opcode::Eq => CondMod::Z,
            Opcode::Ne => CondMod::NZ,
            Opcode::Lt => CondMod::L,
            Opcode::Le => CondMod::LE,
            Opcode::Gt => CondMod::G,
            Opcode::Ge => CondMod::GE,
            _ => unreachable!("{op} is not a comparison"),
        };
        let rt = reg_type(ty);
        let src0 = self.operand(insn.src0(), rt)?;
        let src1 = self.operand(insn.src1(), rt)?;
        let dst = self.operand(insn.dst(), RegType::UW)?;
        let w = self.w();
        self.emit(
            NativeInsn::new(GenOpcode::Cmp, w, Operand::NULL.retyped(rt))
                .src0(src0)
                .src1(src1)
                .cond(cond),
        )?;
        self.emit(NativeInsn::new(GenOpcode::Mov, 1, dst).src0(Operand::flag()))?;
        Ok(())
    }

    fn emit_convert(&mut self, insn: ConvertInstruction<'_>) -> CompileResult<()> {
        let (dst_ty, src_ty) = (insn.dst_type(), insn.src_type());
        if is_int64(dst_ty) || is_int64(src_ty) {
            let ty = if is_int64(dst_ty) { dst_ty } else { src_ty };
            return Err(unsupported(Opcode::Cvt, ty, "64-bit integer conversion"));
        }
        let exec = self.exec_size(insn.dst())?;
        let dst = self.operand(insn.dst(), reg_type(dst_ty))?;
        let src = self.operand(insn.src(), reg_type(src_ty))?;
        let w = self.w();

        match (src_ty == Type::Bool, dst_ty == Type::Bool) {
            (true, true) => {
                self.emit(NativeInsn::new(GenOpcode::Mov, 1, dst).src0(src))?;
            }
            (true, false) => {
                // 0 or 1 per lane from the mask, then a converting move.
                let bits = self.temp(PAYLOAD_SLOT, RegType::UD, w);
                self.load_flag(insn.src())?;
                self.emit(NativeInsn::new(GenOpcode::Mov, w, bits).src0(Source::ud(0)))?;
                self.emit(
                    NativeInsn::new(GenOpcode::Mov, w, bits)
                        .src0(Source::ud(1))
                        .pred(Predicate::Normal),
                )?;
                self.emit(NativeInsn::new(GenOpcode::Mov, exec, dst).src0(bits))?;
            }
            (false, true) => {
                let zero = Source::imm(imm_type(reg_type(src_ty)), 0);
                self.emit(
                    NativeInsn::new(GenOpcode::Cmp, w, Operand::NULL.retyped(reg_type(src_ty)))
                        .src0(src)
                        .src1(zero)
                        .cond(CondMod::NZ),
                )?;
                self.emit(NativeInsn::new(GenOpcode::Mov, 1, dst).src0(Operand::flag()))?;
            }
            (false, false) => {
                self.emit(NativeInsn::new(GenOpcode::Mov, exec, dst).src0(src))?;
            }
        }
        Ok(())
    }

    fn emit_branch(&mut self, id: InsnId, insn: BranchInstruction<'_>) -> CompileResult<()> {
        let label = insn.label();
        let pred = match insn.predicate_index() {
            Some(reg) => {
                self.load_flag(reg)?;
                Predicate::Normal
            }
            None => Predicate::None,
        };
        // Backward targets are already known, forward ones wait for the patch pass.
        let target = self.label_pos.get(label.index()).copied().flatten();
        let at = self.emit(NativeInsn::jump(target.unwrap_or(0)).pred(pred))?;
        log::trace!(
            "{} to {} at {:#x} ({})",
            id,
            label,
            at,
            if target.is_some() { "backward" } else { "forward" }
        );
        self.branch_pos.push(BranchRecord { id, label, at });
        Ok(())
    }

    fn emit_load_imm(&mut self, insn: LoadImmInstruction<'_>) -> CompileResult<()> {
        let ty = insn.ty();
        let value = insn.value(self.func)?;
        let reg = self.gen_reg(insn.dst())?;
        let exec = if reg.is_scalar() { 1 } else { self.w() };

        match ty {
            Type::Bool => {
                let mask = if value.to_bits() != 0 { 0xffff } else { 0 };
                self.emit(NativeInsn::new(GenOpcode::Mov, 1, reg.operand(RegType::UW)).src0(Source::uw(mask)))?;
            }
            Type::S64 | Type::U64 | Type::F64 => {
                let bits = value.to_bits();
                let (lo, hi) = if reg.is_scalar() {
                    (
                        Operand::scalar(reg.nr, reg.subnr, RegType::UD),
                        Operand::scalar(reg.nr, reg.subnr + 4, RegType::UD),
                    )
                } else {
                    let lo = Operand::vec(reg.nr, RegType::UD).with_region(Region::Stride2);
                    (lo, Operand { subnr: 4, ..lo })
                };
                self.emit(NativeInsn::new(GenOpcode::Mov, exec, lo).src0(Source::ud(bits as u32)))?;
                self.emit(NativeInsn::new(GenOpcode::Mov, exec, hi).src0(Source::ud((bits >> 32) as u32)))?;
            }
            _ => {
                let rt = reg_type(ty);
                self.emit(
                    NativeInsn::new(GenOpcode::Mov, exec, reg.operand(rt))
                        .src0(Source::imm(imm_type(rt), imm_bits(value))),
                )?;
            }
        }
        Ok(())
    }

    /// Address operand of an access to `space`. Private addresses are
    /// relative to the lane's stack.
    fn address(&mut self, reg: RegisterIndex, space: MemorySpace) -> CompileResult<Operand> {
        let addr = self.operand(reg, RegType::UD)?;
        if space != MemorySpace::Private {
            return Ok(addr);
        }
        let w = self.w();
        let absolute = self.regs.scratch_slot(ADDRESS_SLOT, RegType::UD);
        let sp = Operand::vec(self.regs.stack_pointer, RegType::UD);
        self.emit(NativeInsn::new(GenOpcode::Add, w, absolute).src0(addr).src1(sp))?;
        Ok(absolute)
    }

    fn emit_payload_address(&mut self, payload: Operand, address: Operand, offset: u32) -> CompileResult<()> {
        let w = self.w();
        let insn = if offset == 0 {
            NativeInsn::new(GenOpcode::Mov, w, payload).src0(address)
        } else {
            NativeInsn::new(GenOpcode::Add, w, payload)
                .src0(address)
                .src1(Source::ud(offset))
        };
        self.emit(insn)?;
        Ok(())
    }

    fn emit_load(&mut self, insn: LoadInstruction<'_>) -> CompileResult<()> {
        let ty = insn.value_type();
        if ty.size() == 8 {
            return Err(unsupported(Opcode::Load, ty, "64-bit memory access"));
        }
        let values = self.tuple_regs(insn.values(), insn.value_num())?;
        let space = insn.address_space();
        let address = self.address(insn.address(), space)?;
        match self.config.alignment.access_path(ty, insn.alignment()) {
            AccessPath::Untyped => self.emit_untyped_read(surface(space), address, &values),
            AccessPath::ByteScatter => self.emit_byte_gather(surface(space), address, ty, &values),
        }
    }

    fn emit_store(&mut self, insn: StoreInstruction<'_>) -> CompileResult<()> {
        let ty = insn.value_type();
        if ty.size() == 8 {
            return Err(unsupported(Opcode::Store, ty, "64-bit memory access"));
        }
        let values = self.tuple_regs(insn.values(), insn.value_num())?;
        let space = insn.address_space();
        let address = self.address(insn.address(), space)?;
        match self.config.alignment.access_path(ty, insn.alignment()) {
            AccessPath::Untyped => self.emit_untyped_write(surface(space), address, &values),
            AccessPath::ByteScatter => self.emit_byte_scatter(surface(space), address, ty, &values),
        }
    }

    fn emit_untyped_read(&mut self, bti: u8, address: Operand, values: &[RegisterIndex]) -> CompileResult<()> {
        let w = self.w();
        let vg = self.regs.dword_vector_grfs();
        let payload = self.regs.scratch_slot(PAYLOAD_SLOT, RegType::UD);
        let response = self.regs.scratch_slot(RESPONSE_SLOT, RegType::UD);

        for (i, chunk) in values.chunks(MAX_UNTYPED_CHANNELS).enumerate() {
            let channels = chunk.len() as u8;
            self.emit_payload_address(payload, address, (i * MAX_UNTYPED_CHANNELS * 4) as u32)?;
            let desc = MessageDescriptor::new(MessageKind::UntypedRead, bti)
                .channels(channels)
                .lengths(vg, channels * vg);
            self.send(w, response, payload, SharedFunction::DataPort, desc)?;
            for (c, &reg) in chunk.iter().enumerate() {
                let exec = self.exec_size(reg)?;
                let dst = self.operand(reg, RegType::UD)?;
                self.emit(NativeInsn::new(GenOpcode::Mov, exec, dst).src0(response.advance(c as u8 * vg)))?;
            }
        }
        Ok(())
    }

    fn emit_untyped_write(&mut self, bti: u8, address: Operand, values: &[RegisterIndex]) -> CompileResult<()> {
        let w = self.w();
        let vg = self.regs.dword_vector_grfs();
        let payload = self.regs.scratch_slot(PAYLOAD_SLOT, RegType::UD);

        for (i, chunk) in values.chunks(MAX_UNTYPED_CHANNELS).enumerate() {
            let channels = chunk.len() as u8;
            self.emit_payload_address(payload, address, (i * MAX_UNTYPED_CHANNELS * 4) as u32)?;
            for (c, &reg) in chunk.iter().enumerate() {
                let src = self.operand(reg, RegType::UD)?;
                let data = payload.advance((1 + c as u8) * vg);
                self.emit(NativeInsn::new(GenOpcode::Mov, w, data).src0(src))?;
            }
            let desc = MessageDescriptor::new(MessageKind::UntypedWrite, bti)
                .channels(channels)
                .lengths((1 + channels) * vg, 0);
            self.send(w, Operand::NULL, payload, SharedFunction::DataPort, desc)?;
        }
        Ok(())
    }

    fn emit_byte_gather(
        &mut self,
        bti: u8,
        address: Operand,
        ty: Type,
        values: &[RegisterIndex],
    ) -> CompileResult<()> {
        let w = self.w();
        let vg = self.regs.dword_vector_grfs();
        let size = ty.size();
        let payload = self.regs.scratch_slot(PAYLOAD_SLOT, RegType::UD);
        let response = self.regs.scratch_slot(RESPONSE_SLOT, RegType::UD);

        for (i, &reg) in values.iter().enumerate() {
            self.emit_payload_address(payload, address, i as u32 * size)?;
            let desc = MessageDescriptor::new(MessageKind::ByteGather, bti)
                .channels(size as u8)
                .lengths(vg, vg);
            self.send(w, response, payload, SharedFunction::DataPort, desc)?;
            let exec = self.exec_size(reg)?;
            let dst = self.operand(reg, raw_type(size))?;
            self.emit(NativeInsn::new(GenOpcode::Mov, exec, dst).src0(response))?;
        }
        Ok(())
    }

    fn emit_byte_scatter(
        &mut self,
        bti: u8,
        address: Operand,
        ty: Type,
        values: &[RegisterIndex],
    ) -> CompileResult<()> {
        let w = self.w();
        let vg = self.regs.dword_vector_grfs();
        let size = ty.size();
        let payload = self.regs.scratch_slot(PAYLOAD_SLOT, RegType::UD);
        let data = payload.advance(vg);

        for (i, &reg) in values.iter().enumerate() {
            self.emit_payload_address(payload, address, i as u32 * size)?;
            let src = self.operand(reg, raw_type(size))?;
            self.emit(NativeInsn::new(GenOpcode::Mov, w, data).src0(src))?;
            let desc = MessageDescriptor::new(MessageKind::ByteScatter, bti)
                .channels(size as u8)
                .lengths(2 * vg, 0);
            self.send(w, Operand::NULL, payload, SharedFunction::DataPort, desc)?;
        }
        Ok(())
    }

    fn emit_texture(&mut self, insn: TextureInstruction<'_>) -> CompileResult<()> {
        let w = self.w();
        let vg = self.regs.dword_vector_grfs();
        let payload = self.regs.scratch_slot(PAYLOAD_SLOT, RegType::UD);

        match insn.op() {
            TextureOp::Sample {
                dst,
                dst_num,
                coords,
                coord_num,
                surface,
            } => {
                for (i, reg) in self.tuple_regs(coords, coord_num as u32)?.into_iter().enumerate() {
                    let src = self.operand(reg, RegType::UD)?;
                    self.emit(NativeInsn::new(GenOpcode::Mov, w, payload.advance(i as u8 * vg)).src0(src))?;
                }
                let response = self.regs.scratch_slot(SAMPLE_RESPONSE_SLOT, RegType::F);
                let desc = MessageDescriptor::new(MessageKind::Sample, surface)
                    .channels(dst_num)
                    .lengths(coord_num * vg, dst_num * vg)
                    .sampler(surface);
                self.send(w, response, payload, SharedFunction::Sampler, desc)?;
                for (i, reg) in self.tuple_regs(dst, dst_num as u32)?.into_iter().enumerate() {
                    let exec = self.exec_size(reg)?;
                    let out = self.operand(reg, RegType::F)?;
                    self.emit(NativeInsn::new(GenOpcode::Mov, exec, out).src0(response.advance(i as u8 * vg)))?;
                }
            }
            TextureOp::TypedWrite {
                src,
                coord_num,
                value_num,
                surface,
                ty,
            } => {
                if ty.size() == 8 {
                    return Err(unsupported(Opcode::TypedWrite, ty, "64-bit typed write"));
                }
                let count = coord_num as u32 + value_num as u32;
                for (i, reg) in self.tuple_regs(src, count)?.into_iter().enumerate() {
                    let raw = if i < coord_num as usize { RegType::UD } else { raw_type(ty.size()) };
                    let value = self.operand(reg, raw)?;
                    self.emit(NativeInsn::new(GenOpcode::Mov, w, payload.advance(i as u8 * vg)).src0(value))?;
                }
                let desc = MessageDescriptor::new(MessageKind::TypedWrite, surface)
                    .channels(value_num)
                    .lengths(count as u8 * vg, 0);
                self.send(w, Operand::NULL, payload, SharedFunction::DataPort, desc)?;
            }
        }
        Ok(())
    }

    fn emit_fence(&mut self, insn: FenceInstruction<'_>) -> CompileResult<()> {
        let header = Operand::vec(self.regs.header, RegType::UD);
        let desc = MessageDescriptor::new(MessageKind::Fence, surface(insn.address_space())).lengths(1, 0);
        self.send(8, Operand::NULL, header, SharedFunction::DataPort, desc)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gen::encoder::decode_stream;
    use crate::ir::{FunctionBuilder, RegisterFamily};
    use bumpalo::Bump;

    #[test]
    fn test_type_mapping() {
        assert_eq!(reg_type(Type::Bool), RegType::UW);
        assert_eq!(reg_type(Type::F32), RegType::F);
        assert_eq!(as_unsigned(RegType::D), RegType::UD);
        assert_eq!(as_signed(RegType::UB), RegType::B);
        assert_eq!(imm_type(RegType::B), RegType::W);
        assert_eq!(imm_bits(Value::S8(-1)), 0xffff_ffff);
    }

    #[test]
    fn test_stack_pointer_prologue() {
        let func = FunctionBuilder::new("empty").finish().unwrap();
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        for (width, prologue) in [(8u32, 5usize), (16, 6)] {
            let config = GenConfig::default().with_simd_width(width);
            let kernel = GenContext::new(&func, &session, &config).emit_code().unwrap();
            let insns = decode_stream(&kernel.code).unwrap();
            // Prologue then end of thread.
            assert_eq!(insns.len(), prologue + 1);
            assert_eq!(insns[0].src[0], Source::imm(RegType::V, 0x7654_3210));
            let last = insns[prologue - 1];
            assert_eq!(last.opcode, GenOpcode::Add);
            assert_eq!(last.exec_size, width as u8);
            assert_eq!(last.dst, Operand::vec(1, RegType::UD));
            assert!(insns[prologue].eot);
        }
    }

    #[test]
    fn test_invalid_simd_width() {
        let mut b = FunctionBuilder::new("w4");
        b.simd_width(4);
        let x = b.reg(RegisterFamily::DWord);
        b.append(Instruction::mov(Type::U32, x, x));
        let func = b.finish().unwrap();

        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        let config = GenConfig::default();
        let mut ctx = GenContext::new(&func, &session, &config);
        assert_eq!(ctx.simd_width(), 4);
        assert_eq!(ctx.emit_code(), Err(CompileError::InvalidSimdWidth(4)));
    }

    #[test]
    fn test_label_outside_table_is_an_error() {
        let func = FunctionBuilder::new("labels").finish().unwrap();
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        let config = GenConfig::default();
        let mut ctx = GenContext::new(&func, &session, &config);

        // The label table is sized by emit_code; nothing is bound yet.
        let label = Instruction::label(LabelIndex(3));
        assert_eq!(
            ctx.emit_instruction(InsnId(0), &label),
            Err(CompileError::Ir(IrError::OutOfRange {
                what: "label",
                index: 3,
                len: 0,
            }))
        );
        assert_eq!(ctx.label_position(LabelIndex(3)), None);
    }
}
