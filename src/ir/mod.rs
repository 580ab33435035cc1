//! Register-based, SIMD-oriented intermediate representation.
//!
//! Every instruction operates on all lanes of the SIMD width at once.
//! Registers, tuples, immediates and labels are indices into tables owned by
//! the [`Function`], which keeps [`Instruction`] a plain 8-byte value.

pub mod error;
pub mod function;
pub mod instruction;
pub mod register;
pub mod types;
pub mod value;

pub use error::{IrError, IrResult};
pub use function::{BasicBlock, Function, FunctionBuilder, InsnId};
pub use instruction::{
    BinaryInstruction, BranchInstruction, CompareInstruction, ConvertInstruction, Family,
    FenceInstruction, Instruction, InstructionView, LabelIndex, LabelInstruction,
    LoadImmInstruction, LoadInstruction, MemorySpace, Opcode, SelectInstruction,
    StoreInstruction, TernaryInstruction, TextureInstruction, TextureOp, UnaryInstruction,
    ValueIndex,
};
pub use register::{Register, RegisterFile, RegisterIndex, TupleIndex};
pub use types::{RegisterFamily, Type};
pub use value::Value;
