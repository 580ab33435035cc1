// This module encodes the Gen-style pseudo ISA targeted by the backend. Every native
// instruction is 16 bytes: a 32-bit header (opcode, execution width, condition modifier,
// predication, function control, immediate flags, end of thread) followed by four 24-bit
// operand slots for the destination and up to three sources. A single 32-bit immediate may
// replace src0 or src1; it overlays the src1 slot and half of src2. Operands name a
// register file (null, GRF or ARF), a register type, a register number, a byte sub-register
// and a region (scalar, contiguous, stride 2). Messages to shared functions (data port,
// sampler, gateway) are `send` instructions whose immediate is a MessageDescriptor.
// GenEmitter appends encoded instructions to a byte buffer, reports offsets and patches
// the immediate of `jmpi` instructions once label positions are known. The stream can be
// decoded back into NativeInsn values and printed as a disassembly.

//! Gen-style instruction encoding.

use crate::core::compiler::Emitter;
use std::fmt;

/// Size of one encoded instruction in bytes.
pub const INSN_SIZE: u32 = 16;

/// Size of a general register in bytes.
pub const GRF_SIZE: u32 = 32;

/// Error types for instruction encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodingError {
    /// Execution size is not a power of two up to 16.
    InvalidExecSize(u8),
    /// Immediate placed in a slot whose neighbour is also used.
    ImmediateConflict,
    /// More than one immediate source.
    TooManyImmediates,
    /// Opcode byte not part of the ISA.
    UnknownOpcode(u8),
    /// Operand bits that do not decode.
    InvalidOperand(u32),
    /// Stream length is not a multiple of the instruction size.
    Truncated(usize),
    /// Patch offset outside the stream or misaligned.
    OutOfBounds(u32),
    /// Patch offset does not hold a jump.
    NotAJump(u32),
    /// Message descriptor field wider than its bit field.
    DescriptorOverflow { field: &'static str, value: u8 },
}

impl fmt::Display for EncodingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncodingError::InvalidExecSize(size) => write!(f, "Invalid execution size {size}"),
            EncodingError::ImmediateConflict => {
                write!(f, "Immediate operand overlaps a used source slot")
            }
            EncodingError::TooManyImmediates => write!(f, "More than one immediate operand"),
            EncodingError::UnknownOpcode(op) => write!(f, "Unknown opcode 0x{op:02x}"),
            EncodingError::InvalidOperand(bits) => write!(f, "Invalid operand encoding 0x{bits:06x}"),
            EncodingError::Truncated(len) => {
                write!(f, "Stream of {len} bytes is not a whole number of instructions")
            }
            EncodingError::OutOfBounds(at) => write!(f, "Offset 0x{at:x} is not an instruction boundary"),
            EncodingError::NotAJump(at) => write!(f, "Instruction at 0x{at:x} is not a jump"),
            EncodingError::DescriptorOverflow { field, value } => {
                write!(f, "Descriptor {field} {value} does not fit its field")
            }
        }
    }
}

impl std::error::Error for EncodingError {}

macro_rules! code_enum {
    ($(#[$meta:meta])* pub enum $name:ident { $($(#[$vmeta:meta])* $variant:ident = $value:literal => $text:literal),* $(,)? }) => {
        $(#[$meta])*
        #[repr(u8)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($(#[$vmeta])* $variant = $value),*
        }

        impl $name {
            pub fn from_bits(bits: u8) -> Option<Self> {
                match bits {
                    $($value => Some($name::$variant),)*
                    _ => None,
                }
            }

            pub const fn name(self) -> &'static str {
                match self {
                    $($name::$variant => $text),*
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.name())
            }
        }
    };
}

code_enum! {
    /// Native opcodes.
    pub enum GenOpcode {
        Mov = 0x01 => "mov",
        Sel = 0x02 => "sel",
        And = 0x05 => "and",
        Or = 0x06 => "or",
        Xor = 0x07 => "xor",
        Shr = 0x08 => "shr",
        Shl = 0x09 => "shl",
        Asr = 0x0c => "asr",
        Cmp = 0x10 => "cmp",
        Jmpi = 0x20 => "jmpi",
        Send = 0x31 => "send",
        Math = 0x38 => "math",
        Add = 0x40 => "add",
        Mul = 0x41 => "mul",
        Mach = 0x49 => "mach",
        Mad = 0x5b => "mad",
        Nop = 0x7e => "nop",
    }
}

code_enum! {
    /// Condition written to the flag register by `cmp`.
    pub enum CondMod {
        None = 0 => "",
        Z = 1 => "z",
        NZ = 2 => "nz",
        G = 3 => "g",
        GE = 4 => "ge",
        L = 5 => "l",
        LE = 6 => "le",
    }
}

code_enum! {
    /// Predication by `f0.0`.
    pub enum Predicate {
        None = 0 => "",
        Normal = 1 => "f0",
        Inverse = 2 => "-f0",
    }
}

code_enum! {
    /// Function computed by the `math` instruction.
    pub enum MathFunction {
        Log = 2 => "log",
        Sqrt = 4 => "sqrt",
        Rsq = 5 => "rsq",
        Sin = 6 => "sin",
        Cos = 7 => "cos",
        Fdiv = 9 => "fdiv",
        Pow = 10 => "pow",
        IntDivQuotient = 12 => "idiv",
        IntDivRemainder = 13 => "irem",
    }
}

code_enum! {
    /// Shared function targeted by `send`.
    pub enum SharedFunction {
        Sampler = 2 => "sampler",
        ThreadSpawner = 7 => "ts",
        DataPort = 10 => "dp",
    }
}

code_enum! {
    /// Register data types.
    pub enum RegType {
        UD = 0 => "ud",
        D = 1 => "d",
        UW = 2 => "uw",
        W = 3 => "w",
        UB = 4 => "ub",
        B = 5 => "b",
        DF = 6 => "df",
        F = 7 => "f",
        UQ = 8 => "uq",
        Q = 9 => "q",
        /// Packed vector of eight signed nibbles, immediates only.
        V = 10 => "v",
    }
}

impl RegType {
    /// Element size in bytes.
    pub const fn size(self) -> u32 {
        match self {
            RegType::UB | RegType::B => 1,
            RegType::UW | RegType::W | RegType::V => 2,
            RegType::UD | RegType::D | RegType::F => 4,
            RegType::DF | RegType::UQ | RegType::Q => 8,
        }
    }
}

code_enum! {
    pub enum RegFile {
        Null = 0 => "null",
        Grf = 1 => "grf",
        Arf = 2 => "arf",
    }
}

code_enum! {
    /// Access pattern of an operand across lanes.
    pub enum Region {
        /// Same element for every lane.
        Scalar = 0 => "<0>",
        Contiguous = 1 => "",
        Stride2 = 2 => "<2>",
    }
}

/// Architecture register numbers.
pub mod arf {
    pub const NULL: u8 = 0x00;
    pub const ACC0: u8 = 0x20;
    pub const F0: u8 = 0x30;
    pub const IP: u8 = 0xa0;
}

/// A register operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Operand {
    pub file: RegFile,
    pub ty: RegType,
    pub nr: u8,
    /// Byte offset inside the register.
    pub subnr: u8,
    pub region: Region,
    pub negate: bool,
}

impl Operand {
    pub const NULL: Operand = Operand {
        file: RegFile::Null,
        ty: RegType::UD,
        nr: 0,
        subnr: 0,
        region: Region::Contiguous,
        negate: false,
    };

    /// One element per lane starting at `nr`.
    pub const fn vec(nr: u8, ty: RegType) -> Self {
        Self {
            file: RegFile::Grf,
            ty,
            nr,
            subnr: 0,
            region: Region::Contiguous,
            negate: false,
        }
    }

    /// The element at `nr.subnr`, broadcast to every lane.
    pub const fn scalar(nr: u8, subnr: u8, ty: RegType) -> Self {
        Self {
            file: RegFile::Grf,
            ty,
            nr,
            subnr,
            region: Region::Scalar,
            negate: false,
        }
    }

    pub const fn acc0(ty: RegType) -> Self {
        Self {
            file: RegFile::Arf,
            ty,
            nr: arf::ACC0,
            subnr: 0,
            region: Region::Contiguous,
            negate: false,
        }
    }

    /// Flag register `f0.0` as a 16-bit lane mask.
    pub const fn flag() -> Self {
        Self {
            file: RegFile::Arf,
            ty: RegType::UW,
            nr: arf::F0,
            subnr: 0,
            region: Region::Scalar,
            negate: false,
        }
    }

    pub const fn ip() -> Self {
        Self {
            file: RegFile::Arf,
            ty: RegType::UD,
            nr: arf::IP,
            subnr: 0,
            region: Region::Scalar,
            negate: false,
        }
    }

    pub const fn negated(mut self) -> Self {
        self.negate = !self.negate;
        self
    }

    pub const fn retyped(mut self, ty: RegType) -> Self {
        self.ty = ty;
        self
    }

    pub const fn with_region(mut self, region: Region) -> Self {
        self.region = region;
        self
    }

    /// Same operand `grfs` registers further. Scalars are left in place.
    pub const fn advance(mut self, grfs: u8) -> Self {
        if matches!(self.file, RegFile::Grf) && !matches!(self.region, Region::Scalar) {
            self.nr += grfs;
        }
        self
    }

    pub const fn is_null(&self) -> bool {
        matches!(self.file, RegFile::Null)
    }

    fn encode(&self) -> u32 {
        (self.file as u32)
            | (self.ty as u32) << 2
            | (self.nr as u32) << 6
            | (self.subnr as u32 & 0x1f) << 14
            | (self.region as u32) << 19
            | (self.negate as u32) << 21
    }

    fn decode(bits: u32) -> Result<Self, EncodingError> {
        let invalid = EncodingError::InvalidOperand(bits);
        Ok(Self {
            file: RegFile::from_bits((bits & 0x3) as u8).ok_or(invalid.clone())?,
            ty: RegType::from_bits((bits >> 2 & 0xf) as u8).ok_or(invalid.clone())?,
            nr: (bits >> 6 & 0xff) as u8,
            subnr: (bits >> 14 & 0x1f) as u8,
            region: Region::from_bits((bits >> 19 & 0x3) as u8).ok_or(invalid)?,
            negate: bits >> 21 & 1 != 0,
        })
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negate {
            f.write_str("-")?;
        }
        match self.file {
            RegFile::Null => f.write_str("null"),
            RegFile::Arf => {
                let name = match self.nr {
                    arf::ACC0 => "acc0",
                    arf::F0 => "f0",
                    arf::IP => "ip",
                    _ => "arf",
                };
                write!(f, "{name}:{}", self.ty)
            }
            RegFile::Grf => {
                write!(f, "r{}", self.nr)?;
                if self.subnr != 0 {
                    write!(f, ".{}", self.subnr)?;
                }
                write!(f, "{}:{}", self.region, self.ty)
            }
        }
    }
}

/// A source operand: a register or a 32-bit immediate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Source {
    Reg(Operand),
    Imm { ty: RegType, bits: u32 },
}

impl Source {
    pub const NONE: Source = Source::Reg(Operand::NULL);

    pub const fn imm(ty: RegType, bits: u32) -> Self {
        Source::Imm { ty, bits }
    }

    pub const fn ud(value: u32) -> Self {
        Source::Imm {
            ty: RegType::UD,
            bits: value,
        }
    }

    pub const fn uw(value: u16) -> Self {
        Source::Imm {
            ty: RegType::UW,
            bits: value as u32,
        }
    }

    pub const fn is_none(&self) -> bool {
        matches!(self, Source::Reg(op) if op.is_null())
    }

    pub const fn is_imm(&self) -> bool {
        matches!(self, Source::Imm { .. })
    }
}

impl From<Operand> for Source {
    fn from(op: Operand) -> Self {
        Source::Reg(op)
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Reg(op) => write!(f, "{op}"),
            Source::Imm { ty, bits } => write!(f, "0x{bits:x}:{ty}"),
        }
    }
}

code_enum! {
    /// Kind of message sent to a shared function.
    pub enum MessageKind {
        UntypedRead = 0 => "untyped_read",
        UntypedWrite = 1 => "untyped_write",
        ByteGather = 2 => "byte_gather",
        ByteScatter = 3 => "byte_scatter",
        Sample = 4 => "sample",
        TypedWrite = 5 => "typed_write",
        Fence = 6 => "fence",
        EndOfThread = 7 => "eot",
    }
}

/// Immediate descriptor of a `send`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageDescriptor {
    pub kind: MessageKind,
    /// Binding table index.
    pub surface: u8,
    /// Channel count for untyped and sampler messages, element size in
    /// bytes for byte gather/scatter.
    pub channels: u8,
    /// Payload length in registers.
    pub msg_len: u8,
    /// Response length in registers.
    pub rlen: u8,
    pub sampler: u8,
}

impl MessageDescriptor {
    pub const fn new(kind: MessageKind, surface: u8) -> Self {
        Self {
            kind,
            surface,
            channels: 0,
            msg_len: 1,
            rlen: 0,
            sampler: 0,
        }
    }

    pub const fn channels(mut self, channels: u8) -> Self {
        self.channels = channels;
        self
    }

    pub const fn lengths(mut self, msg_len: u8, rlen: u8) -> Self {
        self.msg_len = msg_len;
        self.rlen = rlen;
        self
    }

    pub const fn sampler(mut self, sampler: u8) -> Self {
        self.sampler = sampler;
        self
    }

    pub fn encode(&self) -> Result<u32, EncodingError> {
        let fit = |field: &'static str, value: u8, bits: u32| {
            if (value as u32) >> bits == 0 {
                Ok(value as u32)
            } else {
                Err(EncodingError::DescriptorOverflow { field, value })
            }
        };
        Ok((self.surface as u32)
            | (self.kind as u32) << 8
            | fit("channels", self.channels, 4)? << 12
            | fit("msg_len", self.msg_len, 4)? << 16
            | fit("rlen", self.rlen, 5)? << 20
            | fit("sampler", self.sampler, 4)? << 25)
    }

    pub fn decode(bits: u32) -> Option<Self> {
        Some(Self {
            surface: (bits & 0xff) as u8,
            kind: MessageKind::from_bits((bits >> 8 & 0xf) as u8)?,
            channels: (bits >> 12 & 0xf) as u8,
            msg_len: (bits >> 16 & 0xf) as u8,
            rlen: (bits >> 20 & 0x1f) as u8,
            sampler: (bits >> 25 & 0xf) as u8,
        })
    }
}

impl fmt::Display for MessageDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} bti={} ch={} mlen={} rlen={}",
            self.kind, self.surface, self.channels, self.msg_len, self.rlen
        )?;
        if self.kind == MessageKind::Sample {
            write!(f, " sampler={}", self.sampler)?;
        }
        Ok(())
    }
}

/// One native instruction before encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeInsn {
    pub opcode: GenOpcode,
    pub exec_size: u8,
    pub cond: CondMod,
    pub pred: Predicate,
    /// Math function or shared function id.
    pub fctrl: u8,
    pub eot: bool,
    pub dst: Operand,
    pub src: [Source; 3],
}

// Bit positions in the 128-bit instruction word.
const OPCODE_LO: u32 = 0;
const EXEC_LO: u32 = 8;
const COND_LO: u32 = 11;
const PRED_LO: u32 = 15;
const FCTRL_LO: u32 = 17;
const SRC1_IMM_BIT: u32 = 21;
const SRC0_IMM_BIT: u32 = 22;
const IMM_TYPE_LO: u32 = 23;
const EOT_BIT: u32 = 27;
const DST_LO: u32 = 32;
const SRC_LO: [u32; 3] = [56, 80, 104];
const IMM_LO: u32 = 80;
const OPERAND_BITS: u32 = 24;

fn put(word: &mut u128, lo: u32, width: u32, value: u128) {
    let mask = ((1u128 << width) - 1) << lo;
    *word = (*word & !mask) | ((value << lo) & mask);
}

fn get(word: u128, lo: u32, width: u32) -> u128 {
    (word >> lo) & ((1u128 << width) - 1)
}

impl NativeInsn {
    pub const fn new(opcode: GenOpcode, exec_size: u8, dst: Operand) -> Self {
        Self {
            opcode,
            exec_size,
            cond: CondMod::None,
            pred: Predicate::None,
            fctrl: 0,
            eot: false,
            dst,
            src: [Source::NONE; 3],
        }
    }

    pub fn src0(mut self, src: impl Into<Source>) -> Self {
        self.src[0] = src.into();
        self
    }

    pub fn src1(mut self, src: impl Into<Source>) -> Self {
        self.src[1] = src.into();
        self
    }

    pub fn src2(mut self, src: impl Into<Source>) -> Self {
        self.src[2] = src.into();
        self
    }

    pub const fn cond(mut self, cond: CondMod) -> Self {
        self.cond = cond;
        self
    }

    pub const fn pred(mut self, pred: Predicate) -> Self {
        self.pred = pred;
        self
    }

    pub const fn math(mut self, function: MathFunction) -> Self {
        self.fctrl = function as u8;
        self
    }

    pub const fn sfid(mut self, sfid: SharedFunction) -> Self {
        self.fctrl = sfid as u8;
        self
    }

    pub const fn eot(mut self) -> Self {
        self.eot = true;
        self
    }

    /// `jmpi` to the absolute byte offset `target`.
    pub fn jump(target: u32) -> Self {
        Self::new(GenOpcode::Jmpi, 1, Operand::ip()).src0(Source::ud(target))
    }

    /// Target of a `jmpi`.
    pub fn jump_target(&self) -> Option<u32> {
        match (self.opcode, self.src[0]) {
            (GenOpcode::Jmpi, Source::Imm { bits, .. }) => Some(bits),
            _ => None,
        }
    }

    /// Descriptor of a `send`.
    pub fn descriptor(&self) -> Option<MessageDescriptor> {
        match (self.opcode, self.src[1]) {
            (GenOpcode::Send, Source::Imm { bits, .. }) => MessageDescriptor::decode(bits),
            _ => None,
        }
    }

    pub fn encode(&self) -> Result<[u8; 16], EncodingError> {
        if !self.exec_size.is_power_of_two() || self.exec_size > 16 {
            return Err(EncodingError::InvalidExecSize(self.exec_size));
        }

        let mut word: u128 = 0;
        put(&mut word, OPCODE_LO, 8, self.opcode as u128);
        put(&mut word, EXEC_LO, 3, self.exec_size.trailing_zeros() as u128);
        put(&mut word, COND_LO, 4, self.cond as u128);
        put(&mut word, PRED_LO, 2, self.pred as u128);
        put(&mut word, FCTRL_LO, 4, self.fctrl as u128);
        put(&mut word, EOT_BIT, 1, self.eot as u128);
        put(&mut word, DST_LO, OPERAND_BITS, self.dst.encode() as u128);

        let mut imm = None;
        for (slot, src) in self.src.iter().enumerate() {
            match *src {
                Source::Reg(op) => put(&mut word, SRC_LO[slot], OPERAND_BITS, op.encode() as u128),
                Source::Imm { ty, bits } => {
                    if imm.is_some() {
                        return Err(EncodingError::TooManyImmediates);
                    }
                    // The immediate overlays the slot after its own.
                    let flag = match slot {
                        0 if self.src[1].is_none() && self.src[2].is_none() => SRC0_IMM_BIT,
                        1 if self.src[2].is_none() => SRC1_IMM_BIT,
                        _ => return Err(EncodingError::ImmediateConflict),
                    };
                    put(&mut word, flag, 1, 1);
                    put(&mut word, IMM_TYPE_LO, 4, ty as u128);
                    imm = Some(bits);
                }
            }
        }
        if let Some(bits) = imm {
            put(&mut word, IMM_LO, 32, bits as u128);
        }
        Ok(word.to_le_bytes())
    }

    pub fn decode(bytes: [u8; 16]) -> Result<Self, EncodingError> {
        let word = u128::from_le_bytes(bytes);
        let op = get(word, OPCODE_LO, 8) as u8;
        let opcode = GenOpcode::from_bits(op).ok_or(EncodingError::UnknownOpcode(op))?;
        let field = |lo, width| get(word, lo, width) as u8;
        let bad_header = EncodingError::InvalidOperand(word as u32);

        let exec_log2 = field(EXEC_LO, 3);
        if exec_log2 > 4 {
            return Err(EncodingError::InvalidExecSize(exec_log2));
        }
        let mut insn = NativeInsn::new(
            opcode,
            1 << exec_log2,
            Operand::decode(get(word, DST_LO, OPERAND_BITS) as u32)?,
        );
        insn.cond = CondMod::from_bits(field(COND_LO, 4)).ok_or(bad_header.clone())?;
        insn.pred = Predicate::from_bits(field(PRED_LO, 2)).ok_or(bad_header.clone())?;
        insn.fctrl = field(FCTRL_LO, 4);
        insn.eot = field(EOT_BIT, 1) != 0;

        let imm_ty = RegType::from_bits(field(IMM_TYPE_LO, 4)).ok_or(bad_header)?;
        let imm = Source::imm(imm_ty, get(word, IMM_LO, 32) as u32);
        let reg = |slot: usize| -> Result<Source, EncodingError> {
            Ok(Source::Reg(Operand::decode(get(word, SRC_LO[slot], OPERAND_BITS) as u32)?))
        };
        if field(SRC0_IMM_BIT, 1) != 0 {
            insn.src[0] = imm;
        } else if field(SRC1_IMM_BIT, 1) != 0 {
            insn.src[0] = reg(0)?;
            insn.src[1] = imm;
        } else {
            insn.src = [reg(0)?, reg(1)?, reg(2)?];
        }
        Ok(insn)
    }
}

impl fmt::Display for NativeInsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.pred {
            Predicate::None => {}
            pred => write!(f, "({pred}) ")?,
        }
        write!(f, "{}", self.opcode)?;
        if self.opcode == GenOpcode::Math {
            if let Some(function) = MathFunction::from_bits(self.fctrl) {
                write!(f, ".{function}")?;
            }
        }
        if self.cond != CondMod::None {
            write!(f, ".{}.f0", self.cond)?;
        }
        write!(f, "({})", self.exec_size)?;

        if let Some(target) = self.jump_target() {
            return write!(f, " 0x{target:x}");
        }
        write!(f, " {}", self.dst)?;
        if let Some(desc) = self.descriptor() {
            write!(f, " {}", self.src[0])?;
            if let Some(sfid) = SharedFunction::from_bits(self.fctrl) {
                write!(f, " {sfid}")?;
            }
            write!(f, " {{{desc}}}")?;
        } else {
            for src in self.src.iter().filter(|s| !s.is_none()) {
                write!(f, " {src}")?;
            }
        }
        if self.eot {
            f.write_str(" EOT")?;
        }
        Ok(())
    }
}

/// Decode a whole instruction stream.
pub fn decode_stream(code: &[u8]) -> Result<Vec<NativeInsn>, EncodingError> {
    if code.len() % INSN_SIZE as usize != 0 {
        return Err(EncodingError::Truncated(code.len()));
    }
    code.chunks_exact(INSN_SIZE as usize)
        .map(|chunk| {
            let mut bytes = [0u8; 16];
            bytes.copy_from_slice(chunk);
            NativeInsn::decode(bytes)
        })
        .collect()
}

/// Disassembly listing with byte offsets.
pub fn disassemble(code: &[u8]) -> Result<String, EncodingError> {
    let mut out = String::new();
    for (i, insn) in decode_stream(code)?.iter().enumerate() {
        out.push_str(&format!("{:#06x}: {}\n", i as u32 * INSN_SIZE, insn));
    }
    Ok(out)
}

/// Emitter writing the encoding into a growable buffer.
#[derive(Debug, Default)]
pub struct GenEmitter {
    code: Vec<u8>,
}

impl GenEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn code(&self) -> &[u8] {
        &self.code
    }
}

impl Emitter for GenEmitter {
    fn position(&self) -> u32 {
        self.code.len() as u32
    }

    fn emit(&mut self, insn: &NativeInsn) -> Result<u32, EncodingError> {
        let at = self.position();
        let bytes = insn.encode()?;
        log::trace!("{at:#06x}: {insn}");
        self.code.extend_from_slice(&bytes);
        Ok(at)
    }

    fn patch_jump(&mut self, at: u32, target: u32) -> Result<(), EncodingError> {
        let start = at as usize;
        if at % INSN_SIZE != 0 || start + INSN_SIZE as usize > self.code.len() {
            return Err(EncodingError::OutOfBounds(at));
        }
        if self.code[start] != GenOpcode::Jmpi as u8 {
            return Err(EncodingError::NotAJump(at));
        }
        let imm = start + (IMM_LO / 8) as usize;
        self.code[imm..imm + 4].copy_from_slice(&target.to_le_bytes());
        Ok(())
    }

    fn finish(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_three_sources() {
        let insn = NativeInsn::new(GenOpcode::Mad, 16, Operand::vec(40, RegType::F))
            .src0(Operand::vec(20, RegType::F))
            .src1(Operand::vec(22, RegType::F).negated())
            .src2(Operand::scalar(24, 12, RegType::F));
        let decoded = NativeInsn::decode(insn.encode().unwrap()).unwrap();
        assert_eq!(decoded, insn);
    }

    #[test]
    fn test_encode_decode_immediates() {
        let mov = NativeInsn::new(GenOpcode::Mov, 8, Operand::vec(5, RegType::UW))
            .src0(Source::imm(RegType::V, 0x7654_3210));
        assert_eq!(NativeInsn::decode(mov.encode().unwrap()).unwrap(), mov);

        let add = NativeInsn::new(GenOpcode::Add, 1, Operand::scalar(5, 16, RegType::UW))
            .src0(Operand::scalar(5, 0, RegType::UW))
            .src1(Source::uw(8))
            .cond(CondMod::NZ)
            .pred(Predicate::Inverse);
        assert_eq!(NativeInsn::decode(add.encode().unwrap()).unwrap(), add);
    }

    #[test]
    fn test_unknown_codes_do_not_decode() {
        let mut bytes = NativeInsn::new(GenOpcode::Nop, 1, Operand::NULL).encode().unwrap();
        bytes[0] = 0x04;
        assert_eq!(NativeInsn::decode(bytes), Err(EncodingError::UnknownOpcode(0x04)));
        assert_eq!(MathFunction::from_bits(1), None);
        assert_eq!(SharedFunction::from_bits(3), None);
    }

    #[test]
    fn test_immediate_conflicts() {
        let two_imms = NativeInsn::new(GenOpcode::Add, 8, Operand::vec(1, RegType::D))
            .src0(Source::ud(1))
            .src1(Source::ud(2));
        assert_eq!(two_imms.encode(), Err(EncodingError::TooManyImmediates));

        let overlap = NativeInsn::new(GenOpcode::Mad, 8, Operand::vec(1, RegType::F))
            .src0(Operand::vec(2, RegType::F))
            .src1(Source::ud(2))
            .src2(Operand::vec(3, RegType::F));
        assert_eq!(overlap.encode(), Err(EncodingError::ImmediateConflict));

        let wide = NativeInsn::new(GenOpcode::Mov, 32, Operand::vec(1, RegType::F));
        assert_eq!(wide.encode(), Err(EncodingError::InvalidExecSize(32)));
    }

    #[test]
    fn test_message_descriptor() {
        let desc = MessageDescriptor::new(MessageKind::UntypedRead, 254)
            .channels(4)
            .lengths(2, 8);
        assert_eq!(MessageDescriptor::decode(desc.encode().unwrap()), Some(desc));
        assert_eq!(MessageDescriptor::decode(0xf00), None);

        let sample = MessageDescriptor::new(MessageKind::Sample, 20).sampler(20);
        assert_eq!(
            sample.encode(),
            Err(EncodingError::DescriptorOverflow {
                field: "sampler",
                value: 20,
            })
        );
        let long = MessageDescriptor::new(MessageKind::UntypedRead, 0).lengths(2, 32);
        assert_eq!(
            long.encode(),
            Err(EncodingError::DescriptorOverflow {
                field: "rlen",
                value: 32,
            })
        );
    }

    #[test]
    fn test_patch_jump() {
        let mut emitter = GenEmitter::new();
        let nop = NativeInsn::new(GenOpcode::Nop, 1, Operand::NULL);
        assert_eq!(emitter.emit(&nop).unwrap(), 0);
        let at = emitter.emit(&NativeInsn::jump(0)).unwrap();
        assert_eq!(at, 16);

        emitter.patch_jump(at, 0x40).unwrap();
        assert_eq!(emitter.patch_jump(0, 0x40), Err(EncodingError::NotAJump(0)));
        assert_eq!(emitter.patch_jump(8, 0x40), Err(EncodingError::OutOfBounds(8)));
        assert_eq!(emitter.patch_jump(32, 0x40), Err(EncodingError::OutOfBounds(32)));

        let code = emitter.finish();
        let insns = decode_stream(&code).unwrap();
        assert_eq!(insns[1].jump_target(), Some(0x40));
        assert!(decode_stream(&code[..20]).is_err());
    }

    #[test]
    fn test_disassembly_text() {
        let cmp = NativeInsn::new(GenOpcode::Cmp, 16, Operand::NULL)
            .src0(Operand::vec(10, RegType::F))
            .src1(Operand::vec(12, RegType::F))
            .cond(CondMod::L);
        assert_eq!(cmp.to_string(), "cmp.l.f0(16) null r10:f r12:f");

        let cos = NativeInsn::new(GenOpcode::Math, 8, Operand::vec(3, RegType::F))
            .src0(Operand::vec(2, RegType::F))
            .math(MathFunction::Cos);
        assert_eq!(cos.to_string(), "math.cos(8) r3:f r2:f");

        let jump = NativeInsn::jump(0x80).pred(Predicate::Normal);
        assert_eq!(jump.to_string(), "(f0) jmpi(1) 0x80");
    }
}
