//! Errors raised while building or reading an IR function.

use super::instruction::LabelIndex;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IrError {
    #[error("{what} index {index} out of range (function has {len})")]
    OutOfRange {
        what: &'static str,
        index: u32,
        len: u32,
    },

    #[error("Too many {what} in function (index space is 16 bits)")]
    TooMany { what: &'static str },

    #[error("Label {0} is referenced but never bound to a block")]
    UnboundLabel(LabelIndex),

    #[error("Label {0} is bound to more than one block")]
    LabelAlreadyBound(LabelIndex),
}

pub type IrResult<T> = Result<T, IrError>;
