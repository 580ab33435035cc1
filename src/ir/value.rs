//! Immediate values stored in the function value table.
//!
//! A `loadi` instruction only has room for a 16-bit [`ValueIndex`](super::ValueIndex),
//! so every immediate lives in the function and is looked up at emission time.

use super::types::Type;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Bool(bool),
    S8(i8),
    U8(u8),
    S16(i16),
    U16(u16),
    S32(i32),
    U32(u32),
    S64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
}

impl Value {
    pub fn ty(&self) -> Type {
        match self {
            Value::Bool(_) => Type::Bool,
            Value::S8(_) => Type::S8,
            Value::U8(_) => Type::U8,
            Value::S16(_) => Type::S16,
            Value::U16(_) => Type::U16,
            Value::S32(_) => Type::S32,
            Value::U32(_) => Type::U32,
            Value::S64(_) => Type::S64,
            Value::U64(_) => Type::U64,
            Value::F32(_) => Type::F32,
            Value::F64(_) => Type::F64,
        }
    }

    /// Raw bits, zero extended to 64 bits. Signed values are reinterpreted
    /// at their own width first so that `S8(-1)` gives `0xff`.
    pub fn to_bits(&self) -> u64 {
        match *self {
            Value::Bool(b) => b as u64,
            Value::S8(v) => v as u8 as u64,
            Value::U8(v) => v as u64,
            Value::S16(v) => v as u16 as u64,
            Value::U16(v) => v as u64,
            Value::S32(v) => v as u32 as u64,
            Value::U32(v) => v as u64,
            Value::S64(v) => v as u64,
            Value::U64(v) => v,
            Value::F32(v) => v.to_bits() as u64,
            Value::F64(v) => v.to_bits(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(v) => write!(f, "{v}"),
            Value::S8(v) => write!(f, "{v}"),
            Value::U8(v) => write!(f, "{v}"),
            Value::S16(v) => write!(f, "{v}"),
            Value::U16(v) => write!(f, "{v}"),
            Value::S32(v) => write!(f, "{v}"),
            Value::U32(v) => write!(f, "{v}"),
            Value::S64(v) => write!(f, "{v}"),
            Value::U64(v) => write!(f, "{v}"),
            Value::F32(v) => write!(f, "{v:?}"),
            Value::F64(v) => write!(f, "{v:?}"),
        }
    }
}
