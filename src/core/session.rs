// This module provides arena-based compilation session management using the bumpalo crate.
// CompilationSession owns a reference to the arena that backs the transient tables of a
// GenContext (label positions, branch positions) so they are released in one step when the
// session's arena is dropped. It also accumulates statistics over every kernel compiled
// with it: kernel count, code size, per-opcode instruction counts, registers allocated,
// branches patched and multiply-adds fused. A session is used by one thread at a time;
// concurrent compilations each create their own arena and session.

//! Arena-based compilation session management.
//!
//! All per-compilation tables are allocated in the session arena and share
//! its lifetime.

use crate::ir::Opcode;
use bumpalo::Bump;
use hashbrown::HashMap;
use std::cell::RefCell;
use std::fmt;

/// Arena-based compilation session.
pub struct CompilationSession<'arena> {
    /// Arena allocator for compilation objects.
    arena: &'arena Bump,

    /// Session statistics for debugging and tuning.
    stats: RefCell<SessionStats>,

    /// Kernel currently being compiled.
    current_kernel: RefCell<Option<String>>,
}

impl<'arena> CompilationSession<'arena> {
    /// Create a new compilation session with the given arena.
    pub fn new(arena: &'arena Bump) -> Self {
        Self {
            arena,
            stats: RefCell::new(SessionStats::default()),
            current_kernel: RefCell::new(None),
        }
    }

    /// Get access to the arena allocator.
    pub fn arena(&self) -> &'arena Bump {
        self.arena
    }

    pub fn set_current_kernel(&self, name: &str) {
        *self.current_kernel.borrow_mut() = Some(name.to_string());
    }

    pub fn current_kernel(&self) -> Option<String> {
        self.current_kernel.borrow().clone()
    }

    /// Record that a kernel was produced.
    pub fn record_kernel_compiled(&self, name: &str, code_size: usize) {
        let mut stats = self.stats.borrow_mut();
        stats.kernels_compiled += 1;
        stats.total_code_size += code_size;

        if stats.largest_kernel_size < code_size {
            stats.largest_kernel_size = code_size;
            stats.largest_kernel_name = name.to_string();
        }
        *self.current_kernel.borrow_mut() = None;
        log::debug!("Kernel {} compiled ({} bytes)", name, code_size);
    }

    /// Record the lowering of one IR instruction.
    pub fn record_instruction_compiled(&self, opcode: Opcode) {
        let mut stats = self.stats.borrow_mut();
        stats.instructions_compiled += 1;
        *stats.instruction_counts.entry(opcode.name()).or_insert(0) += 1;
    }

    /// Record register allocation results.
    pub fn record_registers_allocated(&self, count: usize, grf_used: u32) {
        let mut stats = self.stats.borrow_mut();
        stats.registers_allocated += count;
        stats.max_grf_used = stats.max_grf_used.max(grf_used);
    }

    pub fn record_branch_patched(&self) {
        self.stats.borrow_mut().branches_patched += 1;
    }

    pub fn record_mad_fused(&self) {
        self.stats.borrow_mut().mads_fused += 1;
    }

    /// Get compilation statistics.
    pub fn stats(&self) -> SessionStats {
        self.stats.borrow().clone()
    }
}

/// Compilation session statistics.
#[derive(Debug, Default, Clone)]
pub struct SessionStats {
    /// Number of kernels produced.
    pub kernels_compiled: usize,

    /// Total code size generated (bytes).
    pub total_code_size: usize,

    /// Number of IR instructions lowered.
    pub instructions_compiled: usize,

    /// Count of each IR opcode lowered.
    pub instruction_counts: HashMap<&'static str, usize>,

    pub largest_kernel_size: usize,
    pub largest_kernel_name: String,

    /// Virtual registers given a GRF location.
    pub registers_allocated: usize,

    /// Highest GRF count used by one kernel.
    pub max_grf_used: u32,

    pub branches_patched: usize,
    pub mads_fused: usize,
}

impl fmt::Display for SessionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Compilation Session Statistics:")?;
        writeln!(f, "  Kernels compiled: {}", self.kernels_compiled)?;
        writeln!(f, "  Instructions compiled: {}", self.instructions_compiled)?;
        writeln!(f, "  Total code size: {} bytes", self.total_code_size)?;
        writeln!(f, "  Registers allocated: {}", self.registers_allocated)?;
        writeln!(f, "  Max GRFs used: {}", self.max_grf_used)?;
        writeln!(f, "  Branches patched: {}", self.branches_patched)?;
        writeln!(f, "  Multiply-adds fused: {}", self.mads_fused)?;

        if !self.largest_kernel_name.is_empty() {
            writeln!(
                f,
                "  Largest kernel: {} ({} bytes)",
                self.largest_kernel_name, self.largest_kernel_size
            )?;
        }

        if !self.instruction_counts.is_empty() {
            writeln!(f, "  Instruction breakdown:")?;
            let mut sorted: Vec<_> = self.instruction_counts.iter().collect();
            sorted.sort_by_key(|(opcode, count)| (std::cmp::Reverse(**count), **opcode));

            for (opcode, count) in sorted.into_iter().take(10) {
                writeln!(f, "    {}: {}", opcode, count)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compilation_session_creation() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);

        let stats = session.stats();
        assert_eq!(stats.kernels_compiled, 0);
        assert_eq!(stats.instructions_compiled, 0);
        assert!(session.current_kernel().is_none());
    }

    #[test]
    fn test_session_statistics() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);

        session.set_current_kernel("k");
        assert_eq!(session.current_kernel().as_deref(), Some("k"));
        session.record_instruction_compiled(Opcode::Add);
        session.record_instruction_compiled(Opcode::Eq);
        session.record_instruction_compiled(Opcode::Add);
        session.record_registers_allocated(3, 20);
        session.record_registers_allocated(1, 12);
        session.record_branch_patched();
        session.record_kernel_compiled("k", 128);

        let stats = session.stats();
        assert_eq!(stats.kernels_compiled, 1);
        assert_eq!(stats.total_code_size, 128);
        assert_eq!(stats.instructions_compiled, 3);
        assert_eq!(stats.instruction_counts.get("add"), Some(&2));
        assert_eq!(stats.instruction_counts.get("eq"), Some(&1));
        assert_eq!(stats.registers_allocated, 4);
        assert_eq!(stats.max_grf_used, 20);
        assert_eq!(stats.branches_patched, 1);
        assert_eq!(stats.largest_kernel_name, "k");
        assert!(session.current_kernel().is_none());

        let display = format!("{}", stats);
        assert!(display.contains("Kernels compiled: 1"));
        assert!(display.contains("add: 2"));
    }
}
