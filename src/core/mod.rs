// This module serves as the hub for the target independent pieces of the compiler: the
// compilation session (arena allocation and statistics shared by every kernel compiled in
// it), the error type every stage reports through, the code generation configuration
// (SIMD width, stack size, register file budget, alignment policy) and the collaborator
// traits the code generation context delegates to. The Gen specific implementations of
// those traits live in `crate::gen`.

//! Core infrastructure.
//!
//! # Key Components
//!
//! ## Session Management (`session`)
//! - Arena-based allocation of per-kernel tables using `bumpalo`
//! - Compilation statistics across kernels
//!
//! ## Configuration (`config`)
//! - SIMD width resolution and per-lane stack size
//! - Alignment policy choosing between untyped and byte messages
//!
//! ## Pipeline Traits (`compiler`)
//! - [`Emitter`], [`SelectionEngine`], [`RegisterAllocator`]

pub mod compiler;
pub mod config;
pub mod error;
pub mod session;

pub use compiler::{Emitter, RegisterAllocator, SelectionEngine};
pub use config::{AccessPath, AlignmentPolicy, GenConfig, SUPPORTED_SIMD_WIDTHS};
pub use error::{CompileError, CompileResult};
pub use session::{CompilationSession, SessionStats};
