// This module defines the IR instruction: one 8-byte record made of an opcode byte and a
// 7-byte payload whose layout depends on the opcode family. Payload layouts are packed
// structs sharing a union; the opcode is the tag selecting the active layout. Instructions
// are built only through the opcode factories on `Instruction`, so the tag and the payload
// always agree. Typed views (UnaryInstruction, LoadInstruction, ...) are obtained with
// `Instruction::cast`, which asserts family membership before the view reads the union.
// Operands that do not fit in 7 bytes go through the owning function: register tuples for
// multi-register operands and the value table for immediates. `check` validates an
// instruction against its function and reports a diagnostic without mutating anything.

//! IR instructions and their family views.
//!
//! ```
//! use genbe::ir::{FunctionBuilder, Instruction, BinaryInstruction, RegisterFamily, Type};
//!
//! let mut b = FunctionBuilder::new("k");
//! let (x, y, z) = (b.reg(RegisterFamily::DWord), b.reg(RegisterFamily::DWord), b.reg(RegisterFamily::DWord));
//! let insn = Instruction::add(Type::U32, z, x, y);
//! assert!(insn.is_member_of::<BinaryInstruction>());
//! assert_eq!(insn.cast::<BinaryInstruction>().src1(), y);
//! ```

use super::error::{IrError, IrResult};
use super::function::Function;
use super::register::{Register, RegisterIndex, TupleIndex};
use super::types::{RegisterFamily, Type};
use super::value::Value;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Identifies a basic block as a branch target.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LabelIndex(pub u16);

impl LabelIndex {
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for LabelIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// Index of an immediate in the function value table.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueIndex(pub u16);

impl ValueIndex {
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Memory space addressed by loads, stores and fences.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemorySpace {
    Global = 0,
    /// Memory shared by a thread group.
    Local = 1,
    /// Read-only global memory.
    Constant = 2,
    /// Per-lane memory addressed relative to the stack pointer.
    Private = 3,
}

impl MemorySpace {
    const fn from_bits(bits: u8) -> Self {
        match bits & 0x3 {
            0 => MemorySpace::Global,
            1 => MemorySpace::Local,
            2 => MemorySpace::Constant,
            _ => MemorySpace::Private,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            MemorySpace::Global => "global",
            MemorySpace::Local => "local",
            MemorySpace::Constant => "constant",
            MemorySpace::Private => "private",
        }
    }
}

impl fmt::Display for MemorySpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Instruction families. Every opcode belongs to exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    Unary,
    Binary,
    Ternary,
    Select,
    Compare,
    Convert,
    Branch,
    LoadImm,
    Load,
    Store,
    Texture,
    Fence,
    Label,
}

/// All opcodes.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Mov,
    Cos,
    Sin,
    Tan,
    Log,
    Sqr,
    Rsq,
    Pow,
    Mul,
    Add,
    Sub,
    Div,
    Rem,
    Shl,
    Shr,
    Asr,
    Or,
    Xor,
    And,
    Mad,
    Sel,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Cvt,
    Bra,
    LoadI,
    Load,
    Store,
    Sample,
    TypedWrite,
    Fence,
    Label,
}

impl Opcode {
    pub const ALL: [Opcode; 36] = [
        Opcode::Mov,
        Opcode::Cos,
        Opcode::Sin,
        Opcode::Tan,
        Opcode::Log,
        Opcode::Sqr,
        Opcode::Rsq,
        Opcode::Pow,
        Opcode::Mul,
        Opcode::Add,
        Opcode::Sub,
        Opcode::Div,
        Opcode::Rem,
        Opcode::Shl,
        Opcode::Shr,
        Opcode::Asr,
        Opcode::Or,
        Opcode::Xor,
        Opcode::And,
        Opcode::Mad,
        Opcode::Sel,
        Opcode::Eq,
        Opcode::Ne,
        Opcode::Lt,
        Opcode::Le,
        Opcode::Gt,
        Opcode::Ge,
        Opcode::Cvt,
        Opcode::Bra,
        Opcode::LoadI,
        Opcode::Load,
        Opcode::Store,
        Opcode::Sample,
        Opcode::TypedWrite,
        Opcode::Fence,
        Opcode::Label,
    ];

    pub const fn family(self) -> Family {
        use Opcode::*;
        match self {
            Mov | Cos | Sin | Tan | Log | Sqr | Rsq => Family::Unary,
            Pow | Mul | Add | Sub | Div | Rem | Shl | Shr | Asr | Or | Xor | And => Family::Binary,
            Mad => Family::Ternary,
            Sel => Family::Select,
            Eq | Ne | Lt | Le | Gt | Ge => Family::Compare,
            Cvt => Family::Convert,
            Bra => Family::Branch,
            LoadI => Family::LoadImm,
            Load => Family::Load,
            Store => Family::Store,
            Sample | TypedWrite => Family::Texture,
            Fence => Family::Fence,
            Label => Family::Label,
        }
    }

    pub const fn name(self) -> &'static str {
        use Opcode::*;
        match self {
            Mov => "mov",
            Cos => "cos",
            Sin => "sin",
            Tan => "tan",
            Log => "log",
            Sqr => "sqr",
            Rsq => "rsq",
            Pow => "pow",
            Mul => "mul",
            Add => "add",
            Sub => "sub",
            Div => "div",
            Rem => "rem",
            Shl => "shl",
            Shr => "shr",
            Asr => "asr",
            Or => "or",
            Xor => "xor",
            And => "and",
            Mad => "mad",
            Sel => "sel",
            Eq => "eq",
            Ne => "ne",
            Lt => "lt",
            Le => "le",
            Gt => "gt",
            Ge => "ge",
            Cvt => "cvt",
            Bra => "bra",
            LoadI => "loadi",
            Load => "load",
            Store => "store",
            Sample => "sample",
            TypedWrite => "typed_write",
            Fence => "fence",
            Label => "label",
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// Payload layouts. Each must fit in the 7 bytes following the opcode.

#[repr(C, packed)]
#[derive(Clone, Copy)]
struct UnaryData {
    ty: Type,
    dst: RegisterIndex,
    src: RegisterIndex,
}

#[repr(C, packed)]
#[derive(Clone, Copy)]
struct BinaryData {
    ty: Type,
    dst: RegisterIndex,
    src0: RegisterIndex,
    src1: RegisterIndex,
}

#[repr(C, packed)]
#[derive(Clone, Copy)]
struct TernaryData {
    ty: Type,
    dst: RegisterIndex,
    src: TupleIndex,
}

#[repr(C, packed)]
#[derive(Clone, Copy)]
struct ConvertData {
    dst_ty: Type,
    src_ty: Type,
    dst: RegisterIndex,
    src: RegisterIndex,
}

#[repr(C, packed)]
#[derive(Clone, Copy)]
struct BranchData {
    label: LabelIndex,
    predicate: RegisterIndex,
    predicated: bool,
}

#[repr(C, packed)]
#[derive(Clone, Copy)]
struct LoadImmData {
    ty: Type,
    dst: RegisterIndex,
    value: ValueIndex,
}

/// Shared by loads and stores. `flags` holds the space in bits 0-1 and the
/// log2 of the alignment above it.
#[repr(C, packed)]
#[derive(Clone, Copy)]
struct MemoryData {
    ty: Type,
    values: TupleIndex,
    address: RegisterIndex,
    flags: u8,
    value_num: u8,
}

#[repr(C, packed)]
#[derive(Clone, Copy)]
struct SampleData {
    dst: TupleIndex,
    coords: TupleIndex,
    dst_num: u8,
    coord_num: u8,
    surface: u8,
}

#[repr(C, packed)]
#[derive(Clone, Copy)]
struct TypedWriteData {
    src: TupleIndex,
    coord_num: u8,
    value_num: u8,
    surface: u8,
    ty: Type,
}

#[repr(C, packed)]
#[derive(Clone, Copy)]
struct FenceData {
    space: MemorySpace,
}

#[repr(C, packed)]
#[derive(Clone, Copy)]
struct LabelData {
    label: LabelIndex,
}

#[repr(C)]
#[derive(Clone, Copy)]
union Payload {
    raw: [u8; 7],
    unary: UnaryData,
    binary: BinaryData,
    ternary: TernaryData,
    convert: ConvertData,
    branch: BranchData,
    load_imm: LoadImmData,
    memory: MemoryData,
    sample: SampleData,
    typed_write: TypedWriteData,
    fence: FenceData,
    label: LabelData,
}

/// One IR instruction: an opcode and an opcode-specific payload in 8 bytes.
#[repr(C, align(8))]
#[derive(Clone, Copy)]
pub struct Instruction {
    opcode: Opcode,
    payload: Payload,
}

const _: () = assert!(std::mem::size_of::<Payload>() == 7);
const _: () = assert!(std::mem::size_of::<Instruction>() == std::mem::size_of::<u64>());

const MAX_ALIGN_LOG2: u32 = 12;

impl Instruction {
    /// All payload bytes start zeroed so `raw` is always fully initialized.
    fn build(opcode: Opcode, fill: impl FnOnce(&mut Payload)) -> Self {
        let mut payload = Payload { raw: [0; 7] };
        fill(&mut payload);
        Self { opcode, payload }
    }

    fn raw(&self) -> [u8; 7] {
        // SAFETY: every constructor starts from a zeroed `raw` and the other
        // layouts only contain plain bytes, so all 7 bytes are initialized.
        unsafe { self.payload.raw }
    }

    pub fn opcode(&self) -> Opcode {
        self.opcode
    }

    pub fn family(&self) -> Family {
        self.opcode.family()
    }

    /// True if the instruction belongs to the family of view `T`.
    pub fn is_member_of<'a, T: InstructionView<'a>>(&self) -> bool {
        T::is_class_of(self)
    }

    /// Specialize the instruction to the view `T`.
    ///
    /// # Panics
    /// Panics if the instruction is not a member of `T`'s family. That is a
    /// compiler bug, not bad input.
    pub fn cast<'a, T: InstructionView<'a>>(&'a self) -> T {
        assert!(
            T::is_class_of(self),
            "cannot view {} instruction as {:?}",
            self.opcode,
            T::FAMILY
        );
        // SAFETY: membership checked above.
        unsafe { T::from_insn_unchecked(self) }
    }

    /// Like [`cast`](Self::cast) but returns `None` on a family mismatch.
    pub fn try_cast<'a, T: InstructionView<'a>>(&'a self) -> Option<T> {
        if T::is_class_of(self) {
            // SAFETY: membership checked above.
            Some(unsafe { T::from_insn_unchecked(self) })
        } else {
            None
        }
    }

    // ---------------------------------------------------------------------
    // Factories
    // ---------------------------------------------------------------------

    fn unary(opcode: Opcode, ty: Type, dst: RegisterIndex, src: RegisterIndex) -> Self {
        Self::build(opcode, |p| p.unary = UnaryData { ty, dst, src })
    }

    fn binary(
        opcode: Opcode,
        ty: Type,
        dst: RegisterIndex,
        src0: RegisterIndex,
        src1: RegisterIndex,
    ) -> Self {
        Self::build(opcode, |p| p.binary = BinaryData { ty, dst, src0, src1 })
    }

    /// `mov.type dst src`
    pub fn mov(ty: Type, dst: RegisterIndex, src: RegisterIndex) -> Self {
        Self::unary(Opcode::Mov, ty, dst, src)
    }
    /// `cos.type dst src`
    pub fn cos(ty: Type, dst: RegisterIndex, src: RegisterIndex) -> Self {
        Self::unary(Opcode::Cos, ty, dst, src)
    }
    /// `sin.type dst src`
    pub fn sin(ty: Type, dst: RegisterIndex, src: RegisterIndex) -> Self {
        Self::unary(Opcode::Sin, ty, dst, src)
    }
    /// `tan.type dst src`
    pub fn tan(ty: Type, dst: RegisterIndex, src: RegisterIndex) -> Self {
        Self::unary(Opcode::Tan, ty, dst, src)
    }
    /// `log.type dst src`
    pub fn log(ty: Type, dst: RegisterIndex, src: RegisterIndex) -> Self {
        Self::unary(Opcode::Log, ty, dst, src)
    }
    /// `sqr.type dst src` (square root)
    pub fn sqr(ty: Type, dst: RegisterIndex, src: RegisterIndex) -> Self {
        Self::unary(Opcode::Sqr, ty, dst, src)
    }
    /// `rsq.type dst src`
    pub fn rsq(ty: Type, dst: RegisterIndex, src: RegisterIndex) -> Self {
        Self::unary(Opcode::Rsq, ty, dst, src)
    }

    /// `pow.type dst src0 src1`
    pub fn pow(ty: Type, dst: RegisterIndex, src0: RegisterIndex, src1: RegisterIndex) -> Self {
        Self::binary(Opcode::Pow, ty, dst, src0, src1)
    }
    /// `mul.type dst src0 src1`
    pub fn mul(ty: Type, dst: RegisterIndex, src0: RegisterIndex, src1: RegisterIndex) -> Self {
        Self::binary(Opcode::Mul, ty, dst, src0, src1)
    }
    /// `add.type dst src0 src1`
    pub fn add(ty: Type, dst: RegisterIndex, src0: RegisterIndex, src1: RegisterIndex) -> Self {
        Self::binary(Opcode::Add, ty, dst, src0, src1)
    }
    /// `sub.type dst src0 src1`
    pub fn sub(ty: Type, dst: RegisterIndex, src0: RegisterIndex, src1: RegisterIndex) -> Self {
        Self::binary(Opcode::Sub, ty, dst, src0, src1)
    }
    /// `div.type dst src0 src1`
    pub fn div(ty: Type, dst: RegisterIndex, src0: RegisterIndex, src1: RegisterIndex) -> Self {
        Self::binary(Opcode::Div, ty, dst, src0, src1)
    }
    /// `rem.type dst src0 src1`
    pub fn rem(ty: Type, dst: RegisterIndex, src0: RegisterIndex, src1: RegisterIndex) -> Self {
        Self::binary(Opcode::Rem, ty, dst, src0, src1)
    }
    /// `shl.type dst src0 src1`
    pub fn shl(ty: Type, dst: RegisterIndex, src0: RegisterIndex, src1: RegisterIndex) -> Self {
        Self::binary(Opcode::Shl, ty, dst, src0, src1)
    }
    /// `shr.type dst src0 src1` (logical)
    pub fn shr(ty: Type, dst: RegisterIndex, src0: RegisterIndex, src1: RegisterIndex) -> Self {
        Self::binary(Opcode::Shr, ty, dst, src0, src1)
    }
    /// `asr.type dst src0 src1` (arithmetic)
    pub fn asr(ty: Type, dst: RegisterIndex, src0: RegisterIndex, src1: RegisterIndex) -> Self {
        Self::binary(Opcode::Asr, ty, dst, src0, src1)
    }
    /// `or.type dst src0 src1`
    pub fn or(ty: Type, dst: RegisterIndex, src0: RegisterIndex, src1: RegisterIndex) -> Self {
        Self::binary(Opcode::Or, ty, dst, src0, src1)
    }
    /// `xor.type dst src0 src1`
    pub fn xor(ty: Type, dst: RegisterIndex, src0: RegisterIndex, src1: RegisterIndex) -> Self {
        Self::binary(Opcode::Xor, ty, dst, src0, src1)
    }
    /// `and.type dst src0 src1`
    pub fn and(ty: Type, dst: RegisterIndex, src0: RegisterIndex, src1: RegisterIndex) -> Self {
        Self::binary(Opcode::And, ty, dst, src0, src1)
    }

    /// `mad.type dst {src0, src1, src2}` computing `src0 * src1 + src2`
    pub fn mad(ty: Type, dst: RegisterIndex, src: TupleIndex) -> Self {
        Self::build(Opcode::Mad, |p| p.ternary = TernaryData { ty, dst, src })
    }

    /// `sel.type dst {pred, then, else}`
    pub fn sel(ty: Type, dst: RegisterIndex, src: TupleIndex) -> Self {
        Self::build(Opcode::Sel, |p| p.ternary = TernaryData { ty, dst, src })
    }

    /// `eq.type dst src0 src1`, `dst` is a bool register
    pub fn eq(ty: Type, dst: RegisterIndex, src0: RegisterIndex, src1: RegisterIndex) -> Self {
        Self::binary(Opcode::Eq, ty, dst, src0, src1)
    }
    /// `ne.type dst src0 src1`
    pub fn ne(ty: Type, dst: RegisterIndex, src0: RegisterIndex, src1: RegisterIndex) -> Self {
        Self::binary(Opcode::Ne, ty, dst, src0, src1)
    }
    /// `lt.type dst src0 src1`
    pub fn lt(ty: Type, dst: RegisterIndex, src0: RegisterIndex, src1: RegisterIndex) -> Self {
        Self::binary(Opcode::Lt, ty, dst, src0, src1)
    }
    /// `le.type dst src0 src1`
    pub fn le(ty: Type, dst: RegisterIndex, src0: RegisterIndex, src1: RegisterIndex) -> Self {
        Self::binary(Opcode::Le, ty, dst, src0, src1)
    }
    /// `gt.type dst src0 src1`
    pub fn gt(ty: Type, dst: RegisterIndex, src0: RegisterIndex, src1: RegisterIndex) -> Self {
        Self::binary(Opcode::Gt, ty, dst, src0, src1)
    }
    /// `ge.type dst src0 src1`
    pub fn ge(ty: Type, dst: RegisterIndex, src0: RegisterIndex, src1: RegisterIndex) -> Self {
        Self::binary(Opcode::Ge, ty, dst, src0, src1)
    }

    /// `cvt.{dst_ty <- src_ty} dst src`
    pub fn cvt(dst_ty: Type, src_ty: Type, dst: RegisterIndex, src: RegisterIndex) -> Self {
        Self::build(Opcode::Cvt, |p| {
            p.convert = ConvertData {
                dst_ty,
                src_ty,
                dst,
                src,
            }
        })
    }

    /// `bra label`
    pub fn bra(label: LabelIndex) -> Self {
        Self::build(Opcode::Bra, |p| {
            p.branch = BranchData {
                label,
                predicate: RegisterIndex(0),
                predicated: false,
            }
        })
    }

    /// `(pred) bra label`
    pub fn bra_if(label: LabelIndex, predicate: RegisterIndex) -> Self {
        Self::build(Opcode::Bra, |p| {
            p.branch = BranchData {
                label,
                predicate,
                predicated: true,
            }
        })
    }

    /// `loadi.type dst value`
    pub fn loadi(ty: Type, dst: RegisterIndex, value: ValueIndex) -> Self {
        Self::build(Opcode::LoadI, |p| p.load_imm = LoadImmData { ty, dst, value })
    }

    fn memory(
        opcode: Opcode,
        ty: Type,
        values: TupleIndex,
        address: RegisterIndex,
        space: MemorySpace,
        value_num: u8,
        alignment: u32,
    ) -> Self {
        // Largest power of two dividing the alignment is what is guaranteed.
        let align_log2 = alignment.max(1).trailing_zeros().min(MAX_ALIGN_LOG2) as u8;
        Self::build(opcode, |p| {
            p.memory = MemoryData {
                ty,
                values,
                address,
                flags: (space as u8) | (align_log2 << 2),
                value_num,
            }
        })
    }

    /// `load.type.space {dst0, ..., dst(n-1)} [address]`
    ///
    /// Loads `value_num` contiguous values. `alignment` is the byte alignment
    /// of `address` known by the front end.
    pub fn load(
        ty: Type,
        dst: TupleIndex,
        address: RegisterIndex,
        space: MemorySpace,
        value_num: u8,
        alignment: u32,
    ) -> Self {
        Self::memory(Opcode::Load, ty, dst, address, space, value_num, alignment)
    }

    /// `store.type.space [address] {src0, ..., src(n-1)}`
    pub fn store(
        ty: Type,
        src: TupleIndex,
        address: RegisterIndex,
        space: MemorySpace,
        value_num: u8,
        alignment: u32,
    ) -> Self {
        Self::memory(Opcode::Store, ty, src, address, space, value_num, alignment)
    }

    /// `sample surface {dst...} {coords...}`, results are f32 channels.
    pub fn sample(surface: u8, dst: TupleIndex, dst_num: u8, coords: TupleIndex, coord_num: u8) -> Self {
        Self::build(Opcode::Sample, |p| {
            p.sample = SampleData {
                dst,
                coords,
                dst_num,
                coord_num,
                surface,
            }
        })
    }

    /// `typed_write.type surface {coords..., values...}`
    pub fn typed_write(ty: Type, surface: u8, src: TupleIndex, coord_num: u8, value_num: u8) -> Self {
        Self::build(Opcode::TypedWrite, |p| {
            p.typed_write = TypedWriteData {
                src,
                coord_num,
                value_num,
                surface,
                ty,
            }
        })
    }

    /// `fence.space`
    pub fn fence(space: MemorySpace) -> Self {
        Self::build(Opcode::Fence, |p| p.fence = FenceData { space })
    }

    /// `label index`
    pub fn label(label: LabelIndex) -> Self {
        Self::build(Opcode::Label, |p| p.label = LabelData { label })
    }

    // ---------------------------------------------------------------------
    // Operand access
    // ---------------------------------------------------------------------

    /// Number of source registers.
    pub fn src_num(&self) -> u32 {
        match self.family() {
            Family::Unary | Family::Convert => 1,
            Family::Binary | Family::Compare => 2,
            Family::Ternary | Family::Select => 3,
            Family::Branch => self.cast::<BranchInstruction>().is_predicated() as u32,
            Family::LoadImm | Family::Fence | Family::Label => 0,
            Family::Load => 1,
            Family::Store => 1 + self.cast::<StoreInstruction>().value_num(),
            Family::Texture => match self.cast::<TextureInstruction>().op() {
                TextureOp::Sample { coord_num, .. } => coord_num as u32,
                TextureOp::TypedWrite {
                    coord_num,
                    value_num,
                    ..
                } => coord_num as u32 + value_num as u32,
            },
        }
    }

    /// Number of destination registers.
    pub fn dst_num(&self) -> u32 {
        match self.family() {
            Family::Unary
            | Family::Binary
            | Family::Ternary
            | Family::Select
            | Family::Compare
            | Family::Convert
            | Family::LoadImm => 1,
            Family::Load => self.cast::<LoadInstruction>().value_num(),
            Family::Texture => match self.cast::<TextureInstruction>().op() {
                TextureOp::Sample { dst_num, .. } => dst_num as u32,
                TextureOp::TypedWrite { .. } => 0,
            },
            Family::Branch | Family::Store | Family::Fence | Family::Label => 0,
        }
    }

    /// Register index of source `id`, resolving tuples through `func`.
    pub fn src_index(&self, func: &Function, id: u32) -> IrResult<RegisterIndex> {
        let num = self.src_num();
        if id >= num {
            return Err(IrError::OutOfRange {
                what: "source",
                index: id,
                len: num,
            });
        }
        match self.family() {
            Family::Unary => Ok(self.cast::<UnaryInstruction>().src()),
            Family::Convert => Ok(self.cast::<ConvertInstruction>().src()),
            Family::Binary => {
                let insn = self.cast::<BinaryInstruction>();
                Ok(if id == 0 { insn.src0() } else { insn.src1() })
            }
            Family::Compare => {
                let insn = self.cast::<CompareInstruction>();
                Ok(if id == 0 { insn.src0() } else { insn.src1() })
            }
            Family::Ternary => func.get_register_index(self.cast::<TernaryInstruction>().src(), id),
            Family::Select => func.get_register_index(self.cast::<SelectInstruction>().src(), id),
            Family::Branch => Ok(self.cast::<BranchInstruction>().predicate_raw()),
            Family::Load => Ok(self.cast::<LoadInstruction>().address()),
            Family::Store => {
                let insn = self.cast::<StoreInstruction>();
                if id == 0 {
                    Ok(insn.address())
                } else {
                    func.get_register_index(insn.values(), id - 1)
                }
            }
            Family::Texture => match self.cast::<TextureInstruction>().op() {
                TextureOp::Sample { coords, .. } => func.get_register_index(coords, id),
                TextureOp::TypedWrite { src, .. } => func.get_register_index(src, id),
            },
            Family::LoadImm | Family::Fence | Family::Label => unreachable!("no sources"),
        }
    }

    /// Register index of destination `id`, resolving tuples through `func`.
    pub fn dst_index(&self, func: &Function, id: u32) -> IrResult<RegisterIndex> {
        let num = self.dst_num();
        if id >= num {
            return Err(IrError::OutOfRange {
                what: "destination",
                index: id,
                len: num,
            });
        }
        match self.family() {
            Family::Unary => Ok(self.cast::<UnaryInstruction>().dst()),
            Family::Binary => Ok(self.cast::<BinaryInstruction>().dst()),
            Family::Ternary => Ok(self.cast::<TernaryInstruction>().dst()),
            Family::Select => Ok(self.cast::<SelectInstruction>().dst()),
            Family::Compare => Ok(self.cast::<CompareInstruction>().dst()),
            Family::Convert => Ok(self.cast::<ConvertInstruction>().dst()),
            Family::LoadImm => Ok(self.cast::<LoadImmInstruction>().dst()),
            Family::Load => func.get_register_index(self.cast::<LoadInstruction>().values(), id),
            Family::Texture => match self.cast::<TextureInstruction>().op() {
                TextureOp::Sample { dst, .. } => func.get_register_index(dst, id),
                TextureOp::TypedWrite { .. } => unreachable!("typed writes have no destination"),
            },
            Family::Branch | Family::Store | Family::Fence | Family::Label => {
                unreachable!("no destinations")
            }
        }
    }

    /// Register of source `id`.
    pub fn src(&self, func: &Function, id: u32) -> IrResult<Register> {
        func.get_register(self.src_index(func, id)?)
    }

    /// Register of destination `id`.
    pub fn dst(&self, func: &Function, id: u32) -> IrResult<Register> {
        func.get_register(self.dst_index(func, id)?)
    }

    /// Check that the instruction is well formed in `func`.
    ///
    /// Returns a diagnostic on failure. The check is advisory: the caller
    /// decides whether a failure is fatal.
    pub fn check(&self, func: &Function) -> Result<(), String> {
        for id in 0..self.src_num() {
            self.src(func, id).map_err(|e| format!("source {id}: {e}"))?;
        }
        for id in 0..self.dst_num() {
            self.dst(func, id).map_err(|e| format!("destination {id}: {e}"))?;
        }

        match self.family() {
            Family::Unary => {
                let insn = self.cast::<UnaryInstruction>();
                expect_family(func, insn.dst(), insn.ty().family(), "destination")?;
                expect_family(func, insn.src(), insn.ty().family(), "source")
            }
            Family::Binary => {
                let insn = self.cast::<BinaryInstruction>();
                let family = insn.ty().family();
                expect_family(func, insn.dst(), family, "destination")?;
                expect_family(func, insn.src0(), family, "source 0")?;
                expect_family(func, insn.src1(), family, "source 1")
            }
            Family::Ternary => {
                let insn = self.cast::<TernaryInstruction>();
                let family = insn.ty().family();
                expect_family(func, insn.dst(), family, "destination")?;
                for id in 0..3 {
                    expect_family(func, self.src_index(func, id).map_err(|e| e.to_string())?, family, "source")?;
                }
                Ok(())
            }
            Family::Select => {
                let insn = self.cast::<SelectInstruction>();
                let family = insn.ty().family();
                let pred = self.src_index(func, 0).map_err(|e| e.to_string())?;
                expect_family(func, pred, RegisterFamily::Bool, "predicate")?;
                expect_family(func, insn.dst(), family, "destination")?;
                for id in 1..3 {
                    expect_family(func, self.src_index(func, id).map_err(|e| e.to_string())?, family, "source")?;
                }
                Ok(())
            }
            Family::Compare => {
                let insn = self.cast::<CompareInstruction>();
                let family = insn.ty().family();
                expect_family(func, insn.dst(), RegisterFamily::Bool, "destination")?;
                expect_family(func, insn.src0(), family, "source 0")?;
                expect_family(func, insn.src1(), family, "source 1")
            }
            Family::Convert => {
                let insn = self.cast::<ConvertInstruction>();
                expect_family(func, insn.dst(), insn.dst_type().family(), "destination")?;
                expect_family(func, insn.src(), insn.src_type().family(), "source")
            }
            Family::Branch => {
                let insn = self.cast::<BranchInstruction>();
                expect_label(func, insn.label())?;
                match insn.predicate_index() {
                    Some(pred) => expect_family(func, pred, RegisterFamily::Bool, "predicate"),
                    None => Ok(()),
                }
            }
            Family::LoadImm => {
                let insn = self.cast::<LoadImmInstruction>();
                let value = insn.value(func).map_err(|e| e.to_string())?;
                if value.ty() != insn.ty() {
                    return Err(format!(
                        "immediate has type {} but instruction has type {}",
                        value.ty(),
                        insn.ty()
                    ));
                }
                expect_family(func, insn.dst(), insn.ty().family(), "destination")
            }
            Family::Load => {
                let insn = self.cast::<LoadInstruction>();
                check_memory(func, self, insn.value_type(), insn.value_num(), insn.address())
            }
            Family::Store => {
                let insn = self.cast::<StoreInstruction>();
                check_memory(func, self, insn.value_type(), insn.value_num(), insn.address())
            }
            Family::Texture => match self.cast::<TextureInstruction>().op() {
                TextureOp::Sample {
                    dst_num,
                    coord_num,
                    surface,
                    ..
                } => {
                    // The surface doubles as the sampler index.
                    if surface >= 16 {
                        return Err(format!("sample surface {surface} has no sampler (0 to 15)"));
                    }
                    if !(1..=4).contains(&dst_num) {
                        return Err(format!("sample must write 1 to 4 channels, not {dst_num}"));
                    }
                    if !(1..=4).contains(&coord_num) {
                        return Err(format!("sample takes 1 to 4 coordinates, not {coord_num}"));
                    }
                    for id in 0..self.dst_num() {
                        let reg = self.dst_index(func, id).map_err(|e| e.to_string())?;
                        expect_family(func, reg, RegisterFamily::DWord, "sample destination")?;
                    }
                    for id in 0..self.src_num() {
                        let reg = self.src_index(func, id).map_err(|e| e.to_string())?;
                        expect_family(func, reg, RegisterFamily::DWord, "sample coordinate")?;
                    }
                    Ok(())
                }
                TextureOp::TypedWrite {
                    coord_num,
                    value_num,
                    ty,
                    ..
                } => {
                    if !(1..=3).contains(&coord_num) {
                        return Err(format!("typed write takes 1 to 3 coordinates, not {coord_num}"));
                    }
                    if !(1..=4).contains(&value_num) {
                        return Err(format!("typed write must store 1 to 4 values, not {value_num}"));
                    }
                    for id in 0..coord_num as u32 {
                        let reg = self.src_index(func, id).map_err(|e| e.to_string())?;
                        expect_family(func, reg, RegisterFamily::DWord, "typed write coordinate")?;
                    }
                    for id in coord_num as u32..self.src_num() {
                        let reg = self.src_index(func, id).map_err(|e| e.to_string())?;
                        expect_family(func, reg, ty.family(), "typed write value")?;
                    }
                    Ok(())
                }
            },
            Family::Fence => Ok(()),
            Family::Label => expect_label(func, self.cast::<LabelInstruction>().label()),
        }
    }
}

fn expect_family(
    func: &Function,
    reg: RegisterIndex,
    family: RegisterFamily,
    what: &str,
) -> Result<(), String> {
    let found = func.get_register(reg).map_err(|e| e.to_string())?.family;
    if found != family {
        return Err(format!("{what} {reg} is a {found} register, expected {family}"));
    }
    Ok(())
}

fn expect_label(func: &Function, label: LabelIndex) -> Result<(), String> {
    if label.index() >= func.label_num() {
        return Err(format!(
            "label {label} out of range (function has {} labels)",
            func.label_num()
        ));
    }
    Ok(())
}

fn check_memory(
    func: &Function,
    insn: &Instruction,
    ty: Type,
    value_num: u32,
    address: RegisterIndex,
) -> Result<(), String> {
    if value_num == 0 {
        return Err(format!("{} with zero values", insn.opcode()));
    }
    if ty == Type::Bool {
        return Err(format!("{} of bool values", insn.opcode()));
    }
    expect_family(func, address, RegisterFamily::DWord, "address")?;
    let tuple = match insn.family() {
        Family::Load => insn.cast::<LoadInstruction>().values(),
        _ => insn.cast::<StoreInstruction>().values(),
    };
    for which in 0..value_num {
        let reg = func.get_register_index(tuple, which).map_err(|e| e.to_string())?;
        expect_family(func, reg, ty.family(), "value")?;
    }
    Ok(())
}

impl PartialEq for Instruction {
    fn eq(&self, other: &Self) -> bool {
        self.opcode == other.opcode && self.raw() == other.raw()
    }
}

impl Eq for Instruction {}

impl Hash for Instruction {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.opcode.hash(state);
        self.raw().hash(state);
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = self.opcode;
        match self.family() {
            Family::Unary => {
                let i = self.cast::<UnaryInstruction>();
                write!(f, "{op}.{} {} {}", i.ty(), i.dst(), i.src())
            }
            Family::Binary => {
                let i = self.cast::<BinaryInstruction>();
                write!(f, "{op}.{} {} {} {}", i.ty(), i.dst(), i.src0(), i.src1())
            }
            Family::Compare => {
                let i = self.cast::<CompareInstruction>();
                write!(f, "{op}.{} {} {} {}", i.ty(), i.dst(), i.src0(), i.src1())
            }
            Family::Ternary => {
                let i = self.cast::<TernaryInstruction>();
                write!(f, "{op}.{} {} {}", i.ty(), i.dst(), i.src())
            }
            Family::Select => {
                let i = self.cast::<SelectInstruction>();
                write!(f, "{op}.{} {} {}", i.ty(), i.dst(), i.src())
            }
            Family::Convert => {
                let i = self.cast::<ConvertInstruction>();
                write!(f, "cvt.{}<-{} {} {}", i.dst_type(), i.src_type(), i.dst(), i.src())
            }
            Family::Branch => {
                let i = self.cast::<BranchInstruction>();
                match i.predicate_index() {
                    Some(pred) => write!(f, "({pred}) bra {}", i.label()),
                    None => write!(f, "bra {}", i.label()),
                }
            }
            Family::LoadImm => {
                let i = self.cast::<LoadImmInstruction>();
                write!(f, "loadi.{} {} ${}", i.ty(), i.dst(), i.value_index().0)
            }
            Family::Load => {
                let i = self.cast::<LoadInstruction>();
                write!(
                    f,
                    "load.{}.{} {}x{} [{}] align {}",
                    i.value_type(),
                    i.address_space(),
                    i.values(),
                    i.value_num(),
                    i.address(),
                    i.alignment()
                )
            }
            Family::Store => {
                let i = self.cast::<StoreInstruction>();
                write!(
                    f,
                    "store.{}.{} [{}] {}x{} align {}",
                    i.value_type(),
                    i.address_space(),
                    i.address(),
                    i.values(),
                    i.value_num(),
                    i.alignment()
                )
            }
            Family::Texture => match self.cast::<TextureInstruction>().op() {
                TextureOp::Sample {
                    dst,
                    dst_num,
                    coords,
                    coord_num,
                    surface,
                } => write!(f, "sample s{surface} {dst}x{dst_num} {coords}x{coord_num}"),
                TextureOp::TypedWrite {
                    src,
                    coord_num,
                    value_num,
                    surface,
                    ty,
                } => write!(f, "typed_write.{ty} s{surface} {src} coords {coord_num} values {value_num}"),
            },
            Family::Fence => write!(f, "fence.{}", self.cast::<FenceInstruction>().address_space()),
            Family::Label => write!(f, "label {}", self.cast::<LabelInstruction>().label()),
        }
    }
}

impl fmt::Debug for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Instruction({self})")
    }
}

// -------------------------------------------------------------------------
// Family views
// -------------------------------------------------------------------------

/// A typed, non-owning view of an instruction of one family.
pub trait InstructionView<'a>: Sized {
    const FAMILY: Family;

    /// Wrap `insn` without checking its family.
    ///
    /// # Safety
    /// `insn.family()` must equal `Self::FAMILY`; the view reads the payload
    /// layout of that family.
    unsafe fn from_insn_unchecked(insn: &'a Instruction) -> Self;

    fn is_class_of(insn: &Instruction) -> bool {
        insn.family() == Self::FAMILY
    }
}

macro_rules! declare_view {
    ($(#[$meta:meta])* $name:ident, $family:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy)]
        pub struct $name<'a>(&'a Instruction);

        impl<'a> InstructionView<'a> for $name<'a> {
            const FAMILY: Family = Family::$family;

            unsafe fn from_insn_unchecked(insn: &'a Instruction) -> Self {
                $name(insn)
            }
        }

        impl<'a> $name<'a> {
            pub fn opcode(&self) -> Opcode {
                self.0.opcode
            }

            pub fn insn(&self) -> &'a Instruction {
                self.0
            }
        }
    };
}

declare_view!(
    /// Typed one-source instruction; destination and source share the type.
    UnaryInstruction, Unary
);
declare_view!(
    /// Typed two-source instruction; destination and sources share the type.
    BinaryInstruction, Binary
);
declare_view!(
    /// Multiply-add with its three sources in a tuple.
    TernaryInstruction, Ternary
);
declare_view!(
    /// Lane-wise select; the tuple holds the predicate then both choices.
    SelectInstruction, Select
);
declare_view!(
    /// Comparison producing a bool register.
    CompareInstruction, Compare
);
declare_view!(
    /// Conversion from one type to another.
    ConvertInstruction, Convert
);
declare_view!(
    /// Unified branch, predicated or not.
    BranchInstruction, Branch
);
declare_view!(
    /// Loads an immediate from the function value table into one register.
    LoadImmInstruction, LoadImm
);
declare_view!(
    /// Loads contiguous values from an address into a tuple of registers.
    LoadInstruction, Load
);
declare_view!(
    /// Stores a tuple of registers contiguously at an address.
    StoreInstruction, Store
);
declare_view!(
    /// Sampler or typed surface access.
    TextureInstruction, Texture
);
declare_view!(
    /// Orders memory accesses of one space.
    FenceInstruction, Fence
);
declare_view!(
    /// No-op marking a branch target.
    LabelInstruction, Label
);

// SAFETY for all accessors below: a view only exists for an instruction of
// its family, and the family fixes which payload layout was written.

impl UnaryInstruction<'_> {
    fn data(&self) -> UnaryData {
        unsafe { self.0.payload.unary }
    }
    pub fn ty(&self) -> Type {
        self.data().ty
    }
    pub fn dst(&self) -> RegisterIndex {
        self.data().dst
    }
    pub fn src(&self) -> RegisterIndex {
        self.data().src
    }
}

impl BinaryInstruction<'_> {
    fn data(&self) -> BinaryData {
        unsafe { self.0.payload.binary }
    }
    pub fn ty(&self) -> Type {
        self.data().ty
    }
    pub fn dst(&self) -> RegisterIndex {
        self.data().dst
    }
    pub fn src0(&self) -> RegisterIndex {
        self.data().src0
    }
    pub fn src1(&self) -> RegisterIndex {
        self.data().src1
    }
}

impl CompareInstruction<'_> {
    fn data(&self) -> BinaryData {
        unsafe { self.0.payload.binary }
    }
    /// Type of the compared sources. The destination is always bool.
    pub fn ty(&self) -> Type {
        self.data().ty
    }
    pub fn dst(&self) -> RegisterIndex {
        self.data().dst
    }
    pub fn src0(&self) -> RegisterIndex {
        self.data().src0
    }
    pub fn src1(&self) -> RegisterIndex {
        self.data().src1
    }
}

impl TernaryInstruction<'_> {
    fn data(&self) -> TernaryData {
        unsafe { self.0.payload.ternary }
    }
    pub fn ty(&self) -> Type {
        self.data().ty
    }
    pub fn dst(&self) -> RegisterIndex {
        self.data().dst
    }
    pub fn src(&self) -> TupleIndex {
        self.data().src
    }
}

impl SelectInstruction<'_> {
    fn data(&self) -> TernaryData {
        unsafe { self.0.payload.ternary }
    }
    pub fn ty(&self) -> Type {
        self.data().ty
    }
    pub fn dst(&self) -> RegisterIndex {
        self.data().dst
    }
    pub fn src(&self) -> TupleIndex {
        self.data().src
    }
    pub fn predicate(&self, func: &Function) -> IrResult<RegisterIndex> {
        func.get_register_index(self.src(), 0)
    }
}

impl ConvertInstruction<'_> {
    fn data(&self) -> ConvertData {
        unsafe { self.0.payload.convert }
    }
    pub fn src_type(&self) -> Type {
        self.data().src_ty
    }
    pub fn dst_type(&self) -> Type {
        self.data().dst_ty
    }
    pub fn dst(&self) -> RegisterIndex {
        self.data().dst
    }
    pub fn src(&self) -> RegisterIndex {
        self.data().src
    }
}

impl BranchInstruction<'_> {
    fn data(&self) -> BranchData {
        unsafe { self.0.payload.branch }
    }
    pub fn label(&self) -> LabelIndex {
        self.data().label
    }
    pub fn is_predicated(&self) -> bool {
        self.data().predicated
    }
    pub fn predicate_index(&self) -> Option<RegisterIndex> {
        let data = self.data();
        data.predicated.then_some(data.predicate)
    }
    fn predicate_raw(&self) -> RegisterIndex {
        self.data().predicate
    }
}

impl LoadImmInstruction<'_> {
    fn data(&self) -> LoadImmData {
        unsafe { self.0.payload.load_imm }
    }
    pub fn ty(&self) -> Type {
        self.data().ty
    }
    pub fn dst(&self) -> RegisterIndex {
        self.data().dst
    }
    pub fn value_index(&self) -> ValueIndex {
        self.data().value
    }
    /// Immediate materialized from the function value table.
    pub fn value(&self, func: &Function) -> IrResult<Value> {
        func.get_value(self.value_index())
    }
}

macro_rules! memory_accessors {
    ($name:ident) => {
        impl $name<'_> {
            fn data(&self) -> MemoryData {
                unsafe { self.0.payload.memory }
            }
            /// Type of every value accessed.
            pub fn value_type(&self) -> Type {
                self.data().ty
            }
            /// Number of contiguous values accessed.
            pub fn value_num(&self) -> u32 {
                self.data().value_num as u32
            }
            pub fn address_space(&self) -> MemorySpace {
                MemorySpace::from_bits(self.data().flags)
            }
            pub fn address(&self) -> RegisterIndex {
                self.data().address
            }
            /// Tuple of value registers.
            pub fn values(&self) -> TupleIndex {
                self.data().values
            }
            /// Byte alignment known for the address. Always a power of two.
            pub fn alignment(&self) -> u32 {
                1 << (self.data().flags >> 2)
            }
        }
    };
}

memory_accessors!(LoadInstruction);
memory_accessors!(StoreInstruction);

/// Decoded operands of a texture instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureOp {
    Sample {
        dst: TupleIndex,
        dst_num: u8,
        coords: TupleIndex,
        coord_num: u8,
        surface: u8,
    },
    TypedWrite {
        /// Coordinates followed by the values.
        src: TupleIndex,
        coord_num: u8,
        value_num: u8,
        surface: u8,
        ty: Type,
    },
}

impl TextureInstruction<'_> {
    pub fn op(&self) -> TextureOp {
        match self.0.opcode {
            Opcode::Sample => {
                let data = unsafe { self.0.payload.sample };
                TextureOp::Sample {
                    dst: data.dst,
                    dst_num: data.dst_num,
                    coords: data.coords,
                    coord_num: data.coord_num,
                    surface: data.surface,
                }
            }
            _ => {
                let data = unsafe { self.0.payload.typed_write };
                TextureOp::TypedWrite {
                    src: data.src,
                    coord_num: data.coord_num,
                    value_num: data.value_num,
                    surface: data.surface,
                    ty: data.ty,
                }
            }
        }
    }
}

impl FenceInstruction<'_> {
    pub fn address_space(&self) -> MemorySpace {
        unsafe { self.0.payload.fence }.space
    }
}

impl LabelInstruction<'_> {
    pub fn label(&self) -> LabelIndex {
        unsafe { self.0.payload.label }.label
    }
}
