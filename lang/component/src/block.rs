use indexmap::IndexMap;

use crate::expr::{Conditional, Expression};
use crate::value::Value;

/// The command a block executes when the instruction pointer reaches it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    None,
    Store,
    Set,
    Test,
    Call,
    Return,
    Stop,
    Output,
    Draw,
    Refresh,
    Sound,
    Music,
    Silence,
    Input,
    Timeout,
    Color,
    Load,
    Save,
    Push,
    Pop,
    Repeat,
    GetObject,
    GetList,
}

impl Default for Opcode {
    fn default() -> Self {
        Opcode::None
    }
}

/// Named sub-values of a block. Insertion order is preserved so that saved
/// object files list fields in the order they were assigned.
pub type Fields = IndexMap<String, Value>;

/// The universal memory cell. A block carries data and code at the same
/// time; commands like `store` and `set` may overwrite any block at
/// runtime, including one that is itself a command.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Block {
    pub value: Value,
    pub code: Opcode,
    pub expressions: Vec<Expression>,
    pub conditional: Option<Conditional>,
    pub fields: Fields,
}

impl Block {
    pub fn new() -> Self {
        Block::default()
    }

    /// Resets the scalar value, the opcode, and the fields. Expressions and
    /// the conditional are deliberately left in place.
    pub fn clear(&mut self) {
        self.value = Value::default();
        self.code = Opcode::None;
        self.fields.clear();
    }
}

#[cfg(test)]
mod block_test {
    use super::*;
    use crate::expr::{AddrMode, Expression, Operand};

    #[test]
    fn test_defaults() {
        let block = Block::new();
        assert_eq!(block.value, Value::Number(0));
        assert_eq!(block.code, Opcode::None);
        assert!(block.expressions.is_empty());
        assert!(block.conditional.is_none());
        assert!(block.fields.is_empty());
    }

    #[test]
    fn test_clear_keeps_expressions() {
        let mut block = Block::new();
        block.value = Value::Number(9);
        block.code = Opcode::Store;
        block.fields.insert("hp".to_string(), Value::Number(3));
        block
            .expressions
            .push(Expression::new(Operand::new(AddrMode::LiteralNumber)));

        block.clear();

        assert_eq!(block.value, Value::Number(0));
        assert_eq!(block.code, Opcode::None);
        assert!(block.fields.is_empty());
        assert_eq!(block.expressions.len(), 1);
    }
}
