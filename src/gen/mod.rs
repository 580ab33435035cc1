// This module groups the Gen backend: the native instruction encoder and its emitter, the
// general register file allocator, instruction selection, the code generation context that
// drives them, and the kernel produced at the end. Everything target specific lives here;
// the IR in `crate::ir` and the pipeline seams in `crate::core` know nothing about the
// native encoding.

//! Gen backend.
//!
//! - [`encoder`] - native instructions, message descriptors, [`GenEmitter`]
//! - [`register_file`] - GRF layout and [`GenRegAllocator`]
//! - [`selection`] - [`SimpleSelection`] with multiply-add fusion
//! - [`context`] - [`GenContext`], the lowering driver
//! - [`kernel`] - compiled [`Kernel`]

pub mod context;
pub mod encoder;
pub mod kernel;
pub mod register_file;
pub mod selection;

pub use context::GenContext;
pub use encoder::{
    disassemble, EncodingError, GenEmitter, GenOpcode, MessageDescriptor, MessageKind,
    NativeInsn, Operand, RegType, Source,
};
pub use kernel::{Kernel, KernelArgument};
pub use register_file::{GenReg, GenRegAllocator, RegAllocError, RegisterAllocation};
pub use selection::{SelectedInsn, Selection, SimpleSelection};
