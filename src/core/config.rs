//! Code generation configuration.
//!
//! A [`GenConfig`] is plain data: build it once, share it by reference
//! between compilations on any number of threads.

use crate::ir::Type;

/// SIMD widths the target executes natively.
pub const SUPPORTED_SIMD_WIDTHS: [u32; 2] = [8, 16];

/// Strategy used to reach memory for one load or store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessPath {
    /// Dword-granular untyped read/write, up to four channels per message.
    Untyped,
    /// One element per message, any size and alignment.
    ByteScatter,
}

/// Picks the memory access path from the alignment known for an access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlignmentPolicy {
    /// Byte boundary required by untyped messages.
    pub untyped_alignment: u32,
}

impl Default for AlignmentPolicy {
    fn default() -> Self {
        Self {
            untyped_alignment: 4,
        }
    }
}

impl AlignmentPolicy {
    /// Untyped messages move whole dwords: the element must be a dword or
    /// wider, and both the address alignment and the element size must reach
    /// the boundary.
    pub fn access_path(&self, ty: Type, alignment: u32) -> AccessPath {
        let size = ty.size();
        if size >= 4 && alignment >= self.untyped_alignment && size >= self.untyped_alignment {
            AccessPath::Untyped
        } else {
            AccessPath::ByteScatter
        }
    }
}

/// Configuration of the Gen backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenConfig {
    /// SIMD width to compile at when the function does not request one.
    pub simd_width: u32,
    /// Overrides the width requested by the function.
    pub force_simd_width: Option<u32>,
    /// Private stack bytes reserved per lane.
    pub stack_size: u32,
    /// Number of 32-byte general registers.
    pub grf_count: u32,
    /// General registers reserved for message payloads and temporaries.
    pub scratch_grfs: u32,
    pub alignment: AlignmentPolicy,
    /// Fuse `mul` followed by `add` into `mad`.
    pub fuse_mad: bool,
}

impl Default for GenConfig {
    fn default() -> Self {
        Self {
            simd_width: 16,
            force_simd_width: None,
            stack_size: 1024,
            grf_count: 128,
            scratch_grfs: 16,
            alignment: AlignmentPolicy::default(),
            fuse_mad: true,
        }
    }
}

impl GenConfig {
    pub fn with_simd_width(mut self, width: u32) -> Self {
        self.force_simd_width = Some(width);
        self
    }

    pub fn with_stack_size(mut self, bytes: u32) -> Self {
        self.stack_size = bytes;
        self
    }

    pub fn with_grf_count(mut self, count: u32) -> Self {
        self.grf_count = count;
        self
    }

    pub fn with_scratch_grfs(mut self, count: u32) -> Self {
        self.scratch_grfs = count;
        self
    }

    pub fn with_untyped_alignment(mut self, bytes: u32) -> Self {
        self.alignment.untyped_alignment = bytes;
        self
    }

    pub fn with_mad_fusion(mut self, enabled: bool) -> Self {
        self.fuse_mad = enabled;
        self
    }

    /// Width to compile `requested` at: the forced width, else the request,
    /// else the default.
    pub fn resolve_simd_width(&self, requested: Option<u32>) -> u32 {
        self.force_simd_width
            .or(requested)
            .unwrap_or(self.simd_width)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_path_dispatch() {
        let policy = AlignmentPolicy::default();
        assert_eq!(policy.access_path(Type::U32, 4), AccessPath::Untyped);
        assert_eq!(policy.access_path(Type::F32, 16), AccessPath::Untyped);
        assert_eq!(policy.access_path(Type::U32, 2), AccessPath::ByteScatter);
        assert_eq!(policy.access_path(Type::U8, 4), AccessPath::ByteScatter);
        assert_eq!(policy.access_path(Type::U16, 8), AccessPath::ByteScatter);

        let strict = AlignmentPolicy {
            untyped_alignment: 8,
        };
        assert_eq!(strict.access_path(Type::U32, 4), AccessPath::ByteScatter);

        // A boundary below a dword never sends sub-dword elements untyped.
        let loose = AlignmentPolicy {
            untyped_alignment: 1,
        };
        assert_eq!(loose.access_path(Type::U16, 2), AccessPath::ByteScatter);
        assert_eq!(loose.access_path(Type::U8, 1), AccessPath::ByteScatter);
        assert_eq!(loose.access_path(Type::U32, 2), AccessPath::Untyped);
    }

    #[test]
    fn test_simd_width_resolution() {
        let config = GenConfig::default();
        assert_eq!(config.resolve_simd_width(None), 16);
        assert_eq!(config.resolve_simd_width(Some(8)), 8);
        let forced = config.with_simd_width(8);
        assert_eq!(forced.resolve_simd_width(Some(16)), 8);
    }
}
