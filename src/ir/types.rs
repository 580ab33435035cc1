//! Scalar types manipulated by IR instructions.

use std::fmt;

/// Storage class of a register. All registers of one family have the same
/// per-lane size.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegisterFamily {
    /// One bit per lane, stored as a 16-bit lane mask.
    Bool,
    Byte,
    Word,
    DWord,
    QWord,
}

impl RegisterFamily {
    /// Bytes taken by one lane of a vector register of this family. A bool
    /// register is a lane mask and has no per-lane storage; its whole size is
    /// returned instead.
    pub const fn size(self) -> u32 {
        match self {
            RegisterFamily::Bool => 2,
            RegisterFamily::Byte => 1,
            RegisterFamily::Word => 2,
            RegisterFamily::DWord => 4,
            RegisterFamily::QWord => 8,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            RegisterFamily::Bool => "bool",
            RegisterFamily::Byte => "byte",
            RegisterFamily::Word => "word",
            RegisterFamily::DWord => "dword",
            RegisterFamily::QWord => "qword",
        }
    }
}

impl fmt::Display for RegisterFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Type of the values an instruction operates on.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Type {
    Bool,
    S8,
    U8,
    S16,
    U16,
    S32,
    U32,
    S64,
    U64,
    F32,
    F64,
}

impl Type {
    /// Size in bytes of one element in memory.
    pub const fn size(self) -> u32 {
        match self {
            Type::Bool | Type::S8 | Type::U8 => 1,
            Type::S16 | Type::U16 => 2,
            Type::S32 | Type::U32 | Type::F32 => 4,
            Type::S64 | Type::U64 | Type::F64 => 8,
        }
    }

    pub const fn is_float(self) -> bool {
        matches!(self, Type::F32 | Type::F64)
    }

    pub const fn is_signed(self) -> bool {
        matches!(self, Type::S8 | Type::S16 | Type::S32 | Type::S64 | Type::F32 | Type::F64)
    }

    pub const fn is_integer(self) -> bool {
        !self.is_float() && !matches!(self, Type::Bool)
    }

    /// Register family able to hold a value of this type.
    pub const fn family(self) -> RegisterFamily {
        match self {
            Type::Bool => RegisterFamily::Bool,
            Type::S8 | Type::U8 => RegisterFamily::Byte,
            Type::S16 | Type::U16 => RegisterFamily::Word,
            Type::S32 | Type::U32 | Type::F32 => RegisterFamily::DWord,
            Type::S64 | Type::U64 | Type::F64 => RegisterFamily::QWord,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Type::Bool => "bool",
            Type::S8 => "s8",
            Type::U8 => "u8",
            Type::S16 => "s16",
            Type::U16 => "u16",
            Type::S32 => "s32",
            Type::U32 => "u32",
            Type::S64 => "s64",
            Type::U64 => "u64",
            Type::F32 => "f32",
            Type::F64 => "f64",
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_families() {
        assert_eq!(Type::Bool.family(), RegisterFamily::Bool);
        assert_eq!(Type::U8.family(), RegisterFamily::Byte);
        assert_eq!(Type::S16.family(), RegisterFamily::Word);
        assert_eq!(Type::F32.family(), RegisterFamily::DWord);
        assert_eq!(Type::U32.family(), RegisterFamily::DWord);
        assert_eq!(Type::F64.family(), RegisterFamily::QWord);
    }

    #[test]
    fn test_type_predicates() {
        assert!(Type::F32.is_float());
        assert!(Type::S32.is_signed());
        assert!(!Type::U32.is_signed());
        assert!(Type::U64.is_integer());
        assert!(!Type::Bool.is_integer());
        assert_eq!(Type::S64.size(), 8);
    }
}
