use thiserror::Error;

use lang_component::block::Opcode;
use lang_component::memory::InvalidAddress;

/// A fatal runtime failure, annotated with the command being executed and
/// the instruction pointer it was fetched from.
#[derive(Debug, Error)]
#[error("Error: {kind}\nCode: {code:?}\nPointer: {pointer}")]
pub struct RuntimeError {
    pub kind: RuntimeErrorKind,
    pub code: Opcode,
    pub pointer: i64,
}

#[derive(Debug, Error)]
pub enum RuntimeErrorKind {
    #[error(transparent)]
    Memory(#[from] InvalidAddress),
    #[error("Could not find field {0}.")]
    MissingField(String),
    #[error("Expression does not exist at index {0}.")]
    MissingExpression(usize),
    #[error("No conditional present.")]
    MissingConditional,
    #[error("Stack underflow.")]
    StackUnderflow,
    #[error("Could not load file {0}.")]
    LoadFailed(String),
    #[error("Could not save file {0}.")]
    SaveFailed(String),
    #[error("Sub object property is invalid.")]
    InvalidProperty,
    #[error("Invalid object file line {0}.")]
    InvalidObjectLine(String),
}
