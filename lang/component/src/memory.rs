use thiserror::Error;

use crate::block::Block;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Invalid memory address {0}.")]
pub struct InvalidAddress(pub i64);

/// A fixed-size, flat array of blocks. Addresses are signed so that a
/// sentinel like -1 can travel through expressions; any access outside
/// `[0, size)` fails.
#[derive(Debug)]
pub struct Memory {
    blocks: Vec<Block>,
}

impl Memory {
    pub fn new(size: usize) -> Self {
        Memory {
            blocks: vec![Block::new(); size],
        }
    }

    pub fn size(&self) -> usize {
        self.blocks.len()
    }

    pub fn get(&self, address: i64) -> Result<&Block, InvalidAddress> {
        self.blocks
            .get(Self::index(address, self.blocks.len())?)
            .ok_or(InvalidAddress(address))
    }

    pub fn get_mut(&mut self, address: i64) -> Result<&mut Block, InvalidAddress> {
        let index = Self::index(address, self.blocks.len())?;
        self.blocks.get_mut(index).ok_or(InvalidAddress(address))
    }

    pub fn clear(&mut self) {
        for block in &mut self.blocks {
            block.clear();
        }
    }

    fn index(address: i64, size: usize) -> Result<usize, InvalidAddress> {
        if address < 0 || address as usize >= size {
            Err(InvalidAddress(address))
        } else {
            Ok(address as usize)
        }
    }
}

#[cfg(test)]
mod memory_test {
    use super::*;
    use crate::value::Value;

    #[test]
    fn test_bounds() {
        let memory = Memory::new(4);
        assert!(memory.get(0).is_ok());
        assert!(memory.get(3).is_ok());
        assert_eq!(memory.get(4), Err(InvalidAddress(4)));
        assert_eq!(memory.get(-1), Err(InvalidAddress(-1)));
    }

    #[test]
    fn test_clear() {
        let mut memory = Memory::new(2);
        memory.get_mut(1).unwrap().value = Value::Number(7);
        memory.clear();
        assert_eq!(memory.get(1).unwrap().value, Value::Number(0));
    }
}
