//! Test the IR data model: operand resolution through tuples, well-formedness
//! checks and the function builder.

use genbe::ir::{
    BranchInstruction, Family, FunctionBuilder, InsnId, Instruction, IrError, LoadInstruction,
    MemorySpace, Opcode, RegisterFamily, RegisterIndex, StoreInstruction, TextureInstruction, Type,
    UnaryInstruction, Value,
};

#[test]
fn test_tuple_operands_resolve_in_order() {
    let mut b = FunctionBuilder::new("tuples");
    let addr = b.reg(RegisterFamily::DWord);
    let values: Vec<_> = (0..3).map(|_| b.reg(RegisterFamily::DWord)).collect();
    let tuple = b.tuple(&values);
    b.append(Instruction::store(Type::U32, tuple, addr, MemorySpace::Global, 3, 4));
    b.append(Instruction::load(Type::U32, tuple, addr, MemorySpace::Global, 3, 4));
    let func = b.finish().unwrap();

    let store = func.insn(InsnId(1)).unwrap();
    assert_eq!(store.src_num(), 4);
    assert_eq!(store.dst_num(), 0);
    assert_eq!(store.src_index(&func, 0).unwrap(), addr);
    for (i, &reg) in values.iter().enumerate() {
        assert_eq!(store.src_index(&func, i as u32 + 1).unwrap(), reg);
    }

    let load = func.insn(InsnId(2)).unwrap();
    assert_eq!(load.src_num(), 1);
    assert_eq!(load.dst_num(), 3);
    for (i, &reg) in values.iter().enumerate() {
        assert_eq!(load.dst_index(&func, i as u32).unwrap(), reg);
    }
    assert!(matches!(
        load.dst_index(&func, 3),
        Err(IrError::OutOfRange { what: "destination", index: 3, len: 3 })
    ));
}

#[test]
fn test_typed_write_sources_are_coordinates_then_values() {
    let mut b = FunctionBuilder::new("typed_write");
    let regs: Vec<_> = (0..5).map(|_| b.reg(RegisterFamily::DWord)).collect();
    let tuple = b.tuple(&regs);
    b.append(Instruction::typed_write(Type::F32, 3, tuple, 2, 3));
    let func = b.finish().unwrap();

    let insn = func.insn(InsnId(1)).unwrap();
    assert_eq!(insn.family(), Family::Texture);
    assert!(insn.is_member_of::<TextureInstruction>());
    assert_eq!(insn.src_num(), 5);
    let resolved: Vec<_> = (0..5).map(|i| insn.src_index(&func, i).unwrap()).collect();
    assert_eq!(resolved, regs);
    assert_eq!(insn.check(&func), Ok(()));
}

#[test]
fn test_views_are_exclusive() {
    let insn = Instruction::mov(Type::F32, RegisterIndex(1), RegisterIndex(0));
    assert!(insn.is_member_of::<UnaryInstruction>());
    assert!(!insn.is_member_of::<LoadInstruction>());
    assert!(!insn.is_member_of::<StoreInstruction>());
    assert!(insn.try_cast::<BranchInstruction>().is_none());

    assert_eq!(insn.family(), Family::Unary);
    assert_eq!(Opcode::Load.family(), Family::Load);
    assert_eq!(Opcode::TypedWrite.family(), Family::Texture);
}

#[test]
fn test_store_with_zero_values_is_malformed() {
    let mut b = FunctionBuilder::new("empty_store");
    let addr = b.reg(RegisterFamily::DWord);
    let v = b.reg(RegisterFamily::DWord);
    let tuple = b.tuple(&[v]);
    b.append(Instruction::store(Type::U32, tuple, addr, MemorySpace::Global, 0, 4));
    let func = b.finish().unwrap();

    let insn = func.insn(InsnId(1)).unwrap();
    assert_eq!(insn.check(&func), Err("store with zero values".to_string()));
}

#[test]
fn test_compare_needs_bool_destination() {
    let mut b = FunctionBuilder::new("cmp");
    let x = b.reg(RegisterFamily::DWord);
    let y = b.reg(RegisterFamily::DWord);
    let p = b.reg(RegisterFamily::Bool);
    let q = b.reg(RegisterFamily::DWord);
    b.append(Instruction::lt(Type::F32, p, x, y));
    b.append(Instruction::lt(Type::F32, q, x, y));
    let func = b.finish().unwrap();

    assert_eq!(func.insn(InsnId(1)).unwrap().check(&func), Ok(()));
    assert!(func.insn(InsnId(2)).unwrap().check(&func).is_err());
}

#[test]
fn test_unresolvable_operand_fails_check() {
    let mut b = FunctionBuilder::new("dangling");
    let x = b.reg(RegisterFamily::DWord);
    b.append(Instruction::add(Type::U32, x, x, RegisterIndex(7)));
    let func = b.finish().unwrap();
    assert!(func.insn(InsnId(1)).unwrap().check(&func).is_err());
}

#[test]
fn test_load_imm_value_type_must_match() {
    let mut b = FunctionBuilder::new("loadi");
    let x = b.reg(RegisterFamily::DWord);
    let good = b.immediate(Value::U32(7));
    let bad = b.immediate(Value::F64(1.0));
    b.append(Instruction::loadi(Type::U32, x, good));
    b.append(Instruction::loadi(Type::U32, x, bad));
    let func = b.finish().unwrap();

    assert_eq!(func.insn(InsnId(1)).unwrap().check(&func), Ok(()));
    assert!(func.insn(InsnId(2)).unwrap().check(&func).is_err());
    assert_eq!(func.get_value(good).unwrap(), Value::U32(7));
}

#[test]
fn test_blocks_and_labels() {
    let mut b = FunctionBuilder::new("blocks");
    let p = b.reg(RegisterFamily::Bool);
    let (l0, l1, l2) = (b.new_label(), b.new_label(), b.new_label());
    b.start_block(l0);
    b.append(Instruction::bra_if(l2, p));
    b.start_block(l1);
    b.append(Instruction::bra(l0));
    b.append(Instruction::label(l2));
    let func = b.finish().unwrap();

    assert_eq!(func.block_num(), 3);
    assert_eq!(func.label_block(l2).unwrap(), 2);
    // Label instructions count in program order.
    assert_eq!(func.insn_num(), 5);
    assert_eq!(func.insn_id(2, 0).unwrap(), InsnId(4));
    let branch = func.insn(InsnId(1)).unwrap().cast::<BranchInstruction>();
    assert!(branch.is_predicated());
    assert_eq!(branch.predicate_index(), Some(p));
    assert_eq!(branch.label(), l2);
}

#[test]
fn test_builder_errors() {
    let mut b = FunctionBuilder::new("unbound");
    let l = b.new_label();
    b.append(Instruction::bra(l));
    b.new_label();
    assert!(matches!(b.finish(), Err(IrError::UnboundLabel(_))));

    let mut b = FunctionBuilder::new("twice");
    let l = b.new_label();
    b.start_block(l);
    b.start_block(l);
    assert_eq!(b.finish().unwrap_err(), IrError::LabelAlreadyBound(l));
}

#[test]
fn test_factories_round_trip_through_views() {
    use genbe::ir::{
        ConvertInstruction, FenceInstruction, LoadImmInstruction, TextureOp, TupleIndex,
        ValueIndex,
    };
    let (a, b) = (RegisterIndex(3), RegisterIndex(9));

    let cvt = Instruction::cvt(Type::F32, Type::S16, a, b);
    let cvt = cvt.cast::<ConvertInstruction>();
    assert_eq!((cvt.dst_type(), cvt.src_type()), (Type::F32, Type::S16));
    assert_eq!((cvt.dst(), cvt.src()), (a, b));

    let loadi = Instruction::loadi(Type::U16, a, ValueIndex(5));
    let loadi = loadi.cast::<LoadImmInstruction>();
    assert_eq!(loadi.value_index(), ValueIndex(5));
    assert_eq!(loadi.ty(), Type::U16);

    let load = Instruction::load(Type::S32, TupleIndex(2), b, MemorySpace::Local, 3, 8);
    let load = load.cast::<LoadInstruction>();
    assert_eq!(load.value_type(), Type::S32);
    assert_eq!(load.values(), TupleIndex(2));
    assert_eq!(load.address(), b);
    assert_eq!(load.address_space(), MemorySpace::Local);
    assert_eq!(load.value_num(), 3);
    assert_eq!(load.alignment(), 8);

    let sample = Instruction::sample(6, TupleIndex(1), 4, TupleIndex(0), 2);
    assert_eq!(
        sample.cast::<TextureInstruction>().op(),
        TextureOp::Sample {
            dst: TupleIndex(1),
            dst_num: 4,
            coords: TupleIndex(0),
            coord_num: 2,
            surface: 6,
        }
    );

    let fence = Instruction::fence(MemorySpace::Constant);
    assert_eq!(fence.cast::<FenceInstruction>().address_space(), MemorySpace::Constant);
    assert_eq!(fence.src_num() + fence.dst_num(), 0);
}

/// Families whose view accepts `insn`.
fn member_families(insn: &Instruction) -> Vec<Family> {
    use genbe::ir::{
        BinaryInstruction, CompareInstruction, ConvertInstruction, FenceInstruction,
        LabelInstruction, LoadImmInstruction, SelectInstruction, TernaryInstruction,
    };
    let checks = [
        (Family::Unary, insn.is_member_of::<UnaryInstruction>()),
        (Family::Binary, insn.is_member_of::<BinaryInstruction>()),
        (Family::Ternary, insn.is_member_of::<TernaryInstruction>()),
        (Family::Select, insn.is_member_of::<SelectInstruction>()),
        (Family::Compare, insn.is_member_of::<CompareInstruction>()),
        (Family::Convert, insn.is_member_of::<ConvertInstruction>()),
        (Family::Branch, insn.is_member_of::<BranchInstruction>()),
        (Family::LoadImm, insn.is_member_of::<LoadImmInstruction>()),
        (Family::Load, insn.is_member_of::<LoadInstruction>()),
        (Family::Store, insn.is_member_of::<StoreInstruction>()),
        (Family::Texture, insn.is_member_of::<TextureInstruction>()),
        (Family::Fence, insn.is_member_of::<FenceInstruction>()),
        (Family::Label, insn.is_member_of::<LabelInstruction>()),
    ];
    checks
        .iter()
        .filter(|(_, member)| *member)
        .map(|(family, _)| *family)
        .collect()
}

/// One instruction per opcode, built through its factory, with the
/// expected (src_num, dst_num).
fn one_of_each() -> Vec<(Instruction, u32, u32)> {
    use genbe::ir::{LabelIndex, TupleIndex, ValueIndex};
    let (d, a, b) = (RegisterIndex(0), RegisterIndex(1), RegisterIndex(2));
    let t = TupleIndex(0);
    let l = LabelIndex(0);
    let ty = Type::F32;
    vec![
        (Instruction::mov(ty, d, a), 1, 1),
        (Instruction::cos(ty, d, a), 1, 1),
        (Instruction::sin(ty, d, a), 1, 1),
        (Instruction::tan(ty, d, a), 1, 1),
        (Instruction::log(ty, d, a), 1, 1),
        (Instruction::sqr(ty, d, a), 1, 1),
        (Instruction::rsq(ty, d, a), 1, 1),
        (Instruction::pow(ty, d, a, b), 2, 1),
        (Instruction::mul(ty, d, a, b), 2, 1),
        (Instruction::add(ty, d, a, b), 2, 1),
        (Instruction::sub(ty, d, a, b), 2, 1),
        (Instruction::div(ty, d, a, b), 2, 1),
        (Instruction::rem(ty, d, a, b), 2, 1),
        (Instruction::shl(Type::U32, d, a, b), 2, 1),
        (Instruction::shr(Type::U32, d, a, b), 2, 1),
        (Instruction::asr(Type::S32, d, a, b), 2, 1),
        (Instruction::or(Type::U32, d, a, b), 2, 1),
        (Instruction::xor(Type::U32, d, a, b), 2, 1),
        (Instruction::and(Type::U32, d, a, b), 2, 1),
        (Instruction::mad(ty, d, t), 3, 1),
        (Instruction::sel(ty, d, t), 3, 1),
        (Instruction::eq(ty, d, a, b), 2, 1),
        (Instruction::ne(ty, d, a, b), 2, 1),
        (Instruction::lt(ty, d, a, b), 2, 1),
        (Instruction::le(ty, d, a, b), 2, 1),
        (Instruction::gt(ty, d, a, b), 2, 1),
        (Instruction::ge(ty, d, a, b), 2, 1),
        (Instruction::cvt(Type::S32, ty, d, a), 1, 1),
        (Instruction::bra_if(l, a), 1, 0),
        (Instruction::loadi(ty, d, ValueIndex(0)), 0, 1),
        (Instruction::load(ty, t, a, MemorySpace::Global, 5, 4), 1, 5),
        (Instruction::store(ty, t, a, MemorySpace::Global, 3, 4), 4, 0),
        (Instruction::sample(0, t, 4, t, 2), 2, 4),
        (Instruction::typed_write(ty, 1, t, 3, 4), 7, 0),
        (Instruction::fence(MemorySpace::Local), 0, 0),
        (Instruction::label(l), 0, 0),
    ]
}

#[test]
fn test_every_factory_belongs_to_exactly_its_family() {
    let insns = one_of_each();
    assert_eq!(insns.len(), Opcode::ALL.len());

    for ((insn, src_num, dst_num), opcode) in insns.iter().zip(Opcode::ALL) {
        assert_eq!(insn.opcode(), opcode);
        assert_eq!(member_families(insn), [opcode.family()], "{opcode}");
        assert_eq!((insn.src_num(), insn.dst_num()), (*src_num, *dst_num), "{opcode}");
    }

    // An unpredicated branch has no source.
    let bra = Instruction::bra(genbe::ir::LabelIndex(0));
    assert_eq!(member_families(&bra), [Family::Branch]);
    assert_eq!((bra.src_num(), bra.dst_num()), (0, 0));
}
