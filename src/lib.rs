//! genbe - code generation core of a Gen-class GPU JIT.
//!
//! A kernel is written in a typed, register-based SIMD IR where every
//! instruction runs on all lanes at once. [`gen::GenContext`] lowers one
//! [`ir::Function`] to a native instruction stream: it sets up the per-lane
//! stack pointer, selects and allocates, emits every instruction and patches
//! branch targets.
//!
//! # Primary Usage
//!
//! ```
//! use bumpalo::Bump;
//! use genbe::core::{CompilationSession, GenConfig};
//! use genbe::gen::GenContext;
//! use genbe::ir::{FunctionBuilder, Instruction, RegisterFamily, Type};
//!
//! let mut builder = FunctionBuilder::new("scale");
//! let x = builder.reg(RegisterFamily::DWord);
//! let y = builder.reg(RegisterFamily::DWord);
//! builder.input(x);
//! builder.append(Instruction::mul(Type::F32, y, x, x));
//! builder.output(y);
//! let func = builder.finish().unwrap();
//!
//! // Create compilation session with arena allocation
//! let arena = Bump::new();
//! let session = CompilationSession::new(&arena);
//! let config = GenConfig::default().with_simd_width(8);
//!
//! let kernel = GenContext::new(&func, &session, &config).emit_code().unwrap();
//! assert_eq!(kernel.simd_width, 8);
//! assert_eq!(session.stats().kernels_compiled, 1);
//! ```
//!
//! # Architecture
//!
//! - [`ir`] - instructions, functions and the builder
//! - [`core`] - session, errors, configuration and pipeline traits
//! - [`gen`] - Gen encoder, register allocation, selection and lowering

pub mod core;
pub mod gen;
pub mod ir;

pub use core::{CompilationSession, CompileError, CompileResult, GenConfig, SessionStats};
pub use gen::{GenContext, Kernel};
pub use ir::{Function, FunctionBuilder, Instruction};
