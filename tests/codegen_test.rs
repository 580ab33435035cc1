//! Test kernel compilation end to end.
//!
//! These tests build small IR functions, run the whole code generation
//! pipeline and inspect the decoded native stream: branch targets, message
//! descriptors, register layout and the errors that abort compilation.

use bumpalo::Bump;
use genbe::core::{CompilationSession, CompileError, CompileResult, Emitter, GenConfig};
use genbe::gen::encoder::{decode_stream, CondMod, Predicate};
use genbe::gen::{
    EncodingError, GenContext, GenEmitter, GenOpcode, GenRegAllocator, Kernel, MessageDescriptor,
    MessageKind, NativeInsn, Operand, RegAllocError, RegType, SimpleSelection, Source,
};
use genbe::ir::{
    Function, FunctionBuilder, InsnId, Instruction, LabelIndex, MemorySpace, Opcode,
    RegisterFamily, RegisterIndex, Type,
};
use std::cell::Cell;

/// Prologue length at SIMD16: lane ids (two), scale, thread id, thread base, add.
const PROLOGUE16: usize = 6;
const PROLOGUE8: usize = 5;

fn compile(func: &Function, config: &GenConfig) -> CompileResult<Kernel> {
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let code = GenContext::new(func, &session, config).emit_code();
    code
}

fn insns(kernel: &Kernel) -> Vec<NativeInsn> {
    decode_stream(&kernel.code).unwrap()
}

/// Descriptors of every message but the end of thread.
fn messages(kernel: &Kernel) -> Vec<MessageDescriptor> {
    insns(kernel)
        .iter()
        .filter_map(|insn| insn.descriptor())
        .filter(|desc| desc.kind != MessageKind::EndOfThread)
        .collect()
}

/// `L0: p = x < y; (p) bra L2` / `L1: z = x + y` / `L2: z = x`
fn diamond() -> (Function, [LabelIndex; 3]) {
    let mut b = FunctionBuilder::new("diamond");
    let (x, y, z) = (
        b.reg(RegisterFamily::DWord),
        b.reg(RegisterFamily::DWord),
        b.reg(RegisterFamily::DWord),
    );
    let p = b.reg(RegisterFamily::Bool);
    b.input(x);
    b.input(y);
    b.output(z);
    let labels = [b.new_label(), b.new_label(), b.new_label()];

    b.start_block(labels[0]);
    b.append(Instruction::lt(Type::F32, p, x, y));
    b.append(Instruction::bra_if(labels[2], p));
    b.start_block(labels[1]);
    b.append(Instruction::add(Type::F32, z, x, y));
    b.start_block(labels[2]);
    b.append(Instruction::mov(Type::F32, z, x));
    (b.finish().unwrap(), labels)
}

fn single_load(ty: Type, family: RegisterFamily, space: MemorySpace, count: u8, alignment: u32) -> Function {
    let mut b = FunctionBuilder::new("load");
    let addr = b.reg(RegisterFamily::DWord);
    let values: Vec<_> = (0..count).map(|_| b.reg(family)).collect();
    b.input(addr);
    let tuple = b.tuple(&values);
    b.append(Instruction::load(ty, tuple, addr, space, count, alignment));
    b.finish().unwrap()
}

#[test]
fn test_forward_branch_targets_label() {
    let (func, labels) = diamond();
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let config = GenConfig::default();
    let mut ctx = GenContext::new(&func, &session, &config);
    let kernel = ctx.emit_code().unwrap();

    // cmp, mov p; mov f0, jmpi; add; mov; eot
    assert_eq!(kernel.insn_count, PROLOGUE16 + 7);
    let l0 = (PROLOGUE16 * 16) as u32;
    assert_eq!(ctx.label_position(labels[0]), Some(l0));
    assert_eq!(ctx.label_position(labels[1]), Some(l0 + 64));
    assert_eq!(ctx.label_position(labels[2]), Some(l0 + 80));

    let branches: Vec<_> = ctx.branch_positions().collect();
    assert_eq!(branches, [(InsnId(2), l0 + 48)]);

    let jump = kernel.insn_at(l0 + 48).unwrap();
    assert_eq!(jump.opcode, GenOpcode::Jmpi);
    assert_eq!(jump.pred, Predicate::Normal);
    assert_eq!(jump.jump_target(), Some(l0 + 80));
    assert_eq!(kernel.insn_at(l0 + 80).unwrap().opcode, GenOpcode::Mov);
    assert_eq!(session.stats().branches_patched, 1);
}

#[test]
fn test_both_blocks_branch_to_join_label() {
    // [B0: add r2,r0,r1; bra B2] [B1: mul r3,r2,r2; bra B2] [B2: mov r4,r2]
    let mut b = FunctionBuilder::new("join");
    let r: Vec<_> = (0..5).map(|_| b.reg(RegisterFamily::DWord)).collect();
    b.input(r[0]);
    b.input(r[1]);
    b.output(r[4]);
    let (b0, b1, b2) = (b.new_label(), b.new_label(), b.new_label());
    b.start_block(b0);
    b.append(Instruction::add(Type::U32, r[2], r[0], r[1]));
    b.append(Instruction::bra(b2));
    b.start_block(b1);
    b.append(Instruction::mul(Type::U32, r[3], r[2], r[2]));
    b.append(Instruction::bra(b2));
    b.append(Instruction::label(b2));
    b.append(Instruction::mov(Type::U32, r[4], r[2]));
    let func = b.finish().unwrap();

    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let config = GenConfig::default();
    let mut ctx = GenContext::new(&func, &session, &config);
    let kernel = ctx.emit_code().unwrap();

    let join = ctx.label_position(b2).unwrap();
    let branches: Vec<_> = ctx.branch_positions().collect();
    assert_eq!(branches.len(), 2);
    assert_eq!(branches[0].0, InsnId(2));
    assert_eq!(branches[1].0, InsnId(5));
    for (_, at) in branches {
        let jump = kernel.insn_at(at).unwrap();
        assert_eq!(jump.pred, Predicate::None);
        assert_eq!(jump.jump_target(), Some(join));
    }
    // add, jmpi, two (mul, mach, mov) halves at SIMD16, jmpi
    let l0 = (PROLOGUE16 * 16) as u32;
    assert_eq!(join, l0 + 9 * 16);
    assert_eq!(session.stats().branches_patched, 2);
}

#[test]
fn test_backward_branch_targets_loop_head() {
    let mut b = FunctionBuilder::new("loop");
    let n = b.uniform_reg(RegisterFamily::DWord);
    let i = b.uniform_reg(RegisterFamily::DWord);
    let one = b.uniform_reg(RegisterFamily::DWord);
    let more = b.reg(RegisterFamily::Bool);
    b.input(n);
    let (entry, body) = (b.new_label(), b.new_label());
    let zero_imm = b.immediate(genbe::ir::Value::U32(0));
    let one_imm = b.immediate(genbe::ir::Value::U32(1));
    b.start_block(entry);
    b.append(Instruction::loadi(Type::U32, i, zero_imm));
    b.append(Instruction::loadi(Type::U32, one, one_imm));
    b.start_block(body);
    b.append(Instruction::add(Type::U32, i, i, one));
    b.append(Instruction::lt(Type::U32, more, i, n));
    b.append(Instruction::bra_if(body, more));
    let func = b.finish().unwrap();

    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let config = GenConfig::default().with_simd_width(8);
    let mut ctx = GenContext::new(&func, &session, &config);
    let kernel = ctx.emit_code().unwrap();

    let head = (PROLOGUE8 * 16 + 32) as u32;
    assert_eq!(ctx.label_position(body), Some(head));
    let (_, at) = ctx.branch_positions().next().unwrap();
    assert!(at > head);
    assert_eq!(kernel.insn_at(at).unwrap().jump_target(), Some(head));

    // Uniform operands execute on a single lane.
    let add = kernel.insn_at(head).unwrap();
    assert_eq!(add.opcode, GenOpcode::Add);
    assert_eq!(add.exec_size, 1);
}

struct CountingEmitter<'a> {
    inner: GenEmitter,
    patched: &'a Cell<usize>,
}

impl Emitter for CountingEmitter<'_> {
    fn position(&self) -> u32 {
        self.inner.position()
    }

    fn emit(&mut self, insn: &NativeInsn) -> Result<u32, EncodingError> {
        self.inner.emit(insn)
    }

    fn patch_jump(&mut self, at: u32, target: u32) -> Result<(), EncodingError> {
        self.patched.set(self.patched.get() + 1);
        self.inner.patch_jump(at, target)
    }

    fn finish(&mut self) -> Vec<u8> {
        self.inner.finish()
    }
}

#[test]
fn test_every_branch_is_patched_through_the_emitter() {
    let patched = Cell::new(0);
    let (func, _) = diamond();
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let config = GenConfig::default();
    let mut ctx = GenContext::with_collaborators(
        &func,
        &session,
        &config,
        Box::new(CountingEmitter {
            inner: GenEmitter::new(),
            patched: &patched,
        }),
        Box::new(SimpleSelection::new(&config)),
        Box::new(GenRegAllocator::new(&config)),
    );
    let kernel = ctx.emit_code().unwrap();
    assert_eq!(patched.get(), 1);
    assert_eq!(kernel, compile(&func, &config).unwrap());
}

#[test]
fn test_alignment_selects_message_path() {
    let default = GenConfig::default();
    let kinds = |func: &Function, config: &GenConfig| -> Vec<MessageKind> {
        messages(&compile(func, config).unwrap())
            .iter()
            .map(|m| m.kind)
            .collect()
    };

    let aligned = single_load(Type::F32, RegisterFamily::DWord, MemorySpace::Global, 1, 4);
    assert_eq!(kinds(&aligned, &default), [MessageKind::UntypedRead]);

    let misaligned = single_load(Type::F32, RegisterFamily::DWord, MemorySpace::Global, 1, 2);
    assert_eq!(kinds(&misaligned, &default), [MessageKind::ByteGather]);

    let bytes = single_load(Type::U8, RegisterFamily::Byte, MemorySpace::Global, 2, 4);
    assert_eq!(
        kinds(&bytes, &default),
        [MessageKind::ByteGather, MessageKind::ByteGather]
    );

    let strict = GenConfig::default().with_untyped_alignment(16);
    assert_eq!(kinds(&aligned, &strict), [MessageKind::ByteGather]);
}

#[test]
fn test_sub_dword_elements_never_go_untyped() {
    let gathers = |func: &Function, config: &GenConfig| -> Vec<(MessageKind, u8)> {
        messages(&compile(func, config).unwrap())
            .iter()
            .map(|m| (m.kind, m.channels))
            .collect()
    };

    let words = single_load(Type::U16, RegisterFamily::Word, MemorySpace::Global, 2, 2);
    let word_boundary = GenConfig::default().with_untyped_alignment(2);
    assert_eq!(
        gathers(&words, &word_boundary),
        [(MessageKind::ByteGather, 2), (MessageKind::ByteGather, 2)]
    );

    let bytes = single_load(Type::U8, RegisterFamily::Byte, MemorySpace::Global, 2, 1);
    let byte_boundary = GenConfig::default().with_untyped_alignment(1);
    assert_eq!(
        gathers(&bytes, &byte_boundary),
        [(MessageKind::ByteGather, 1), (MessageKind::ByteGather, 1)]
    );

    // Dwords still take the untyped path under a loose boundary.
    let dwords = single_load(Type::U32, RegisterFamily::DWord, MemorySpace::Global, 2, 2);
    assert_eq!(
        gathers(&dwords, &word_boundary),
        [(MessageKind::UntypedRead, 2)]
    );
}

#[test]
fn test_untyped_read_splits_into_four_channel_messages() {
    let func = single_load(Type::U32, RegisterFamily::DWord, MemorySpace::Global, 6, 4);
    let kernel = compile(&func, &GenConfig::default()).unwrap();

    let msgs = messages(&kernel);
    assert_eq!(msgs.len(), 2);
    assert_eq!((msgs[0].channels, msgs[0].rlen), (4, 8));
    assert_eq!((msgs[1].channels, msgs[1].rlen), (2, 4));
    assert!(msgs.iter().all(|m| m.surface == 0 && m.msg_len == 2));

    // The second message reads 16 bytes further.
    assert!(insns(&kernel)
        .iter()
        .any(|i| i.opcode == GenOpcode::Add && i.src[1] == Source::ud(16)));
}

#[test]
fn test_stores_and_fences_use_space_surfaces() {
    let mut b = FunctionBuilder::new("store");
    let addr = b.reg(RegisterFamily::DWord);
    let v = b.reg(RegisterFamily::DWord);
    b.input(addr);
    b.input(v);
    let tuple = b.tuple(&[v]);
    b.append(Instruction::store(Type::F32, tuple, addr, MemorySpace::Local, 1, 4));
    b.append(Instruction::fence(MemorySpace::Local));
    b.append(Instruction::store(Type::U16, tuple, addr, MemorySpace::Constant, 1, 2));
    let func = b.finish().unwrap();
    // u16 values need a word register
    let err = compile(&func, &GenConfig::default()).unwrap_err();
    assert!(matches!(err, CompileError::Malformed { id: InsnId(3), opcode: Opcode::Store, .. }));

    let mut b = FunctionBuilder::new("store");
    let addr = b.reg(RegisterFamily::DWord);
    let v = b.reg(RegisterFamily::DWord);
    let w = b.reg(RegisterFamily::Word);
    let (tv, tw) = (b.tuple(&[v]), b.tuple(&[w]));
    b.append(Instruction::store(Type::F32, tv, addr, MemorySpace::Local, 1, 4));
    b.append(Instruction::fence(MemorySpace::Local));
    b.append(Instruction::store(Type::U16, tw, addr, MemorySpace::Constant, 1, 2));
    let func = b.finish().unwrap();
    let kernel = compile(&func, &GenConfig::default()).unwrap();

    let msgs = messages(&kernel);
    assert_eq!(msgs.len(), 3);
    assert_eq!((msgs[0].kind, msgs[0].surface), (MessageKind::UntypedWrite, 254));
    assert_eq!((msgs[1].kind, msgs[1].surface), (MessageKind::Fence, 254));
    assert_eq!((msgs[2].kind, msgs[2].surface), (MessageKind::ByteScatter, 1));
    assert_eq!(msgs[2].channels, 2);
}

#[test]
fn test_private_addresses_are_stack_relative() {
    let func = single_load(Type::F32, RegisterFamily::DWord, MemorySpace::Private, 1, 4);
    let kernel = compile(&func, &GenConfig::default()).unwrap();
    let stack_pointer = Source::from(Operand::vec(1, RegType::UD));
    let stream = insns(&kernel);
    let body = &stream[PROLOGUE16..];
    assert_eq!(body[0].opcode, GenOpcode::Add);
    assert_eq!(body[0].src[1], stack_pointer);
    assert_eq!(messages(&kernel)[0].surface, 0);
}

#[test]
fn test_scalar_and_bool_registers_take_one_lane() {
    let mut b = FunctionBuilder::new("layout");
    let v = b.reg(RegisterFamily::DWord);
    let s = b.uniform_reg(RegisterFamily::DWord);
    let p = b.reg(RegisterFamily::Bool);
    b.input(v);
    b.input(s);
    b.input(p);
    b.append(Instruction::mov(Type::U32, s, s));
    let func = b.finish().unwrap();
    let kernel = compile(&func, &GenConfig::default()).unwrap();

    // r0 header, r1-r2 stack pointer, r3-r18 scratch
    let layout: Vec<_> = kernel.arguments.iter().map(|a| (a.offset, a.size)).collect();
    assert_eq!(layout, [(19 * 32, 64), (21 * 32, 4), (21 * 32 + 4, 2)]);
    assert_eq!(kernel.grf_used, 22);
    assert_eq!(insns(&kernel)[PROLOGUE16].exec_size, 1);
}

#[test]
fn test_int_mul32_uses_accumulator_per_half() {
    let mut b = FunctionBuilder::new("mul32");
    let (x, y, z) = (
        b.reg(RegisterFamily::DWord),
        b.reg(RegisterFamily::DWord),
        b.reg(RegisterFamily::DWord),
    );
    b.append(Instruction::mul(Type::U32, z, x, y));
    let func = b.finish().unwrap();
    let kernel = compile(&func, &GenConfig::default()).unwrap();

    let stream = insns(&kernel);
    let body = &stream[PROLOGUE16..];
    let ops: Vec<_> = body.iter().map(|i| i.opcode).collect();
    assert_eq!(
        ops,
        [
            GenOpcode::Mul,
            GenOpcode::Mach,
            GenOpcode::Mov,
            GenOpcode::Mul,
            GenOpcode::Mach,
            GenOpcode::Mov,
            GenOpcode::Send,
        ]
    );
    assert!(body[..6].iter().all(|i| i.exec_size == 8));
    assert_eq!(body[0].dst, Operand::acc0(RegType::UD));
    assert_eq!(body[5].dst.nr, body[2].dst.nr + 1);
    assert!(body[6].eot);
}

#[test]
fn test_float_mul_add_becomes_mad() {
    let mut b = FunctionBuilder::new("mad");
    let regs: Vec<_> = (0..5).map(|_| b.reg(RegisterFamily::DWord)).collect();
    b.output(regs[4]);
    b.append(Instruction::mul(Type::F32, regs[3], regs[0], regs[1]));
    b.append(Instruction::add(Type::F32, regs[4], regs[3], regs[2]));
    let func = b.finish().unwrap();

    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let config = GenConfig::default();
    let kernel = GenContext::new(&func, &session, &config).emit_code().unwrap();

    let stream = insns(&kernel);
    let body = &stream[PROLOGUE16..];
    assert_eq!(body.len(), 2);
    assert_eq!(body[0].opcode, GenOpcode::Mad);
    let stats = session.stats();
    assert_eq!(stats.mads_fused, 1);
    assert_eq!(stats.instruction_counts.get("mad"), Some(&1));
    assert_eq!(stats.instruction_counts.get("mul"), None);

    let unfused = compile(&func, &GenConfig::default().with_mad_fusion(false)).unwrap();
    assert_eq!(unfused.insn_count, kernel.insn_count + 1);
}

#[test]
fn test_compare_writes_flag_to_bool() {
    let (func, _) = diamond();
    let kernel = compile(&func, &GenConfig::default()).unwrap();
    let stream = insns(&kernel);
    let body = &stream[PROLOGUE16..];
    assert_eq!(body[0].opcode, GenOpcode::Cmp);
    assert_eq!(body[0].cond, CondMod::L);
    assert_eq!(body[0].exec_size, 16);
    assert_eq!(body[1].opcode, GenOpcode::Mov);
    assert_eq!(body[1].exec_size, 1);
    assert_eq!(body[1].src[0], Source::from(Operand::flag()));
}

#[test]
fn test_sample_then_typed_write() {
    let mut b = FunctionBuilder::new("texture");
    let (u, v) = (b.reg(RegisterFamily::DWord), b.reg(RegisterFamily::DWord));
    let texel: Vec<_> = (0..4).map(|_| b.reg(RegisterFamily::DWord)).collect();
    let coords = b.tuple(&[u, v]);
    let dst = b.tuple(&texel);
    let mut payload = vec![u, v];
    payload.extend_from_slice(&texel);
    let src = b.tuple(&payload);
    b.append(Instruction::sample(2, dst, 4, coords, 2));
    b.append(Instruction::typed_write(Type::F32, 3, src, 2, 4));
    let func = b.finish().unwrap();
    let kernel = compile(&func, &GenConfig::default()).unwrap();

    let msgs = messages(&kernel);
    assert_eq!(msgs.len(), 2);
    assert_eq!(msgs[0].kind, MessageKind::Sample);
    assert_eq!((msgs[0].surface, msgs[0].sampler), (2, 2));
    assert_eq!((msgs[0].channels, msgs[0].msg_len, msgs[0].rlen), (4, 4, 8));
    assert_eq!(msgs[1].kind, MessageKind::TypedWrite);
    assert_eq!((msgs[1].surface, msgs[1].channels, msgs[1].msg_len), (3, 4, 12));
}

#[test]
fn test_sample_surface_must_name_a_sampler() {
    let mut b = FunctionBuilder::new("sampler16");
    let u = b.reg(RegisterFamily::DWord);
    let texel = b.reg(RegisterFamily::DWord);
    let coords = b.tuple(&[u]);
    let dst = b.tuple(&[texel]);
    b.append(Instruction::sample(16, dst, 1, coords, 1));
    let func = b.finish().unwrap();

    match compile(&func, &GenConfig::default()) {
        Err(CompileError::Malformed { id, opcode, .. }) => {
            assert_eq!(id, InsnId(1));
            assert_eq!(opcode, Opcode::Sample);
        }
        other => panic!("expected a malformed sample, got {other:?}"),
    }
}

#[test]
fn test_malformed_instruction_aborts_compilation() {
    let mut b = FunctionBuilder::new("empty_store");
    let addr = b.reg(RegisterFamily::DWord);
    let v = b.reg(RegisterFamily::DWord);
    let tuple = b.tuple(&[v]);
    b.append(Instruction::store(Type::U32, tuple, addr, MemorySpace::Global, 0, 4));
    let func = b.finish().unwrap();

    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let config = GenConfig::default();
    let result = GenContext::new(&func, &session, &config).emit_code();
    assert_eq!(
        result,
        Err(CompileError::Malformed {
            id: InsnId(1),
            opcode: Opcode::Store,
            reason: "store with zero values".to_string(),
        })
    );
    assert_eq!(session.stats().kernels_compiled, 0);
}

#[test]
fn test_register_file_exhaustion() {
    let func = single_load(Type::F32, RegisterFamily::DWord, MemorySpace::Global, 1, 4);

    let result = compile(&func, &GenConfig::default().with_grf_count(20));
    assert_eq!(
        result,
        Err(CompileError::RegisterAllocation(RegAllocError::OutOfRegisters {
            reg: RegisterIndex(0),
            needed: 2,
            free: 1,
        }))
    );

    let result = compile(&func, &GenConfig::default().with_grf_count(10));
    assert_eq!(
        result,
        Err(CompileError::RegisterAllocation(
            RegAllocError::ReservedExceedsFile {
                reserved: 19,
                grf_count: 10,
            }
        ))
    );
}

#[test]
fn test_simd_width_resolution() {
    let func = single_load(Type::F32, RegisterFamily::DWord, MemorySpace::Global, 1, 4);
    assert_eq!(
        compile(&func, &GenConfig::default().with_simd_width(32)),
        Err(CompileError::InvalidSimdWidth(32))
    );

    let mut b = FunctionBuilder::new("simd8");
    b.simd_width(8);
    let x = b.reg(RegisterFamily::DWord);
    b.append(Instruction::mov(Type::U32, x, x));
    let func = b.finish().unwrap();
    let kernel = compile(&func, &GenConfig::default()).unwrap();
    assert_eq!(kernel.simd_width, 8);
    assert_eq!(kernel.insn_count, PROLOGUE8 + 2);
}

#[test]
fn test_unsupported_operations() {
    let mut b = FunctionBuilder::new("cos64");
    let (x, y) = (b.reg(RegisterFamily::QWord), b.reg(RegisterFamily::QWord));
    b.append(Instruction::cos(Type::F64, y, x));
    let func = b.finish().unwrap();
    assert_eq!(
        compile(&func, &GenConfig::default()),
        Err(CompileError::Unsupported {
            opcode: Opcode::Cos,
            ty: Type::F64,
            reason: "math functions need f32",
        })
    );

    let func = single_load(Type::U64, RegisterFamily::QWord, MemorySpace::Global, 1, 8);
    assert!(matches!(
        compile(&func, &GenConfig::default()),
        Err(CompileError::Unsupported { opcode: Opcode::Load, ty: Type::U64, .. })
    ));
}

#[test]
fn test_disassembly_lists_every_instruction() {
    let (func, _) = diamond();
    let kernel = compile(&func, &GenConfig::default()).unwrap();
    let text = kernel.disassemble().unwrap();
    assert_eq!(text.lines().count(), kernel.insn_count);
    assert!(text.contains("jmpi"));
    assert!(text.contains("cmp.l"));
}

#[test]
fn test_concurrent_compilation() {
    let (func, _) = diamond();
    let config = GenConfig::default();
    let expected = compile(&func, &config).unwrap();

    let kernels: Vec<Kernel> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..4)
            .map(|_| s.spawn(|| compile(&func, &config).unwrap()))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    assert!(kernels.iter().all(|k| *k == expected));
}
