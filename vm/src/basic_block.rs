use crate::{
    decoder::decode,
    executor::ExecutionError,
    hart::Hart,
    isa::Instruction,
};
use tracing::trace;

/// Slots per block, including the one reserved for a closing marker.
pub const MAX_INSTRUCTIONS: usize = 32;

pub const CACHE_INDEX_BITS: u32 = 8;
pub const CACHE_ENTRIES: usize = 1 << CACHE_INDEX_BITS;

#[derive(Debug, Clone)]
pub struct BasicBlock {
    address: u64,
    len: usize,
    instructions: [Instruction; MAX_INSTRUCTIONS],
}

impl BasicBlock {
    pub const fn new() -> Self {
        Self {
            address: 0,
            len: 0,
            instructions: [Instruction::UNSET; MAX_INSTRUCTIONS],
        }
    }

    pub fn address(&self) -> u64 {
        self.address
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The filled slots. The last one is always a terminator.
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions[..self.len]
    }

    pub fn flush(&mut self) {
        self.address = 0;
        self.len = 0;
        self.instructions = [Instruction::UNSET; MAX_INSTRUCTIONS];
    }

    /// Refills the block by decoding from the hart's current `pc` until a
    /// terminator or the cap. A full block is closed with a block end marker.
    pub fn update(&mut self, hart: &mut Hart) -> Result<(), ExecutionError> {
        let start = hart.pc();

        self.flush();

        let mut address = start;
        let mut len = 0;

        while len < MAX_INSTRUCTIONS - 1 {
            let raw = hart
                .fetch(address)
                .map_err(|source| ExecutionError::Fetch { address, source })?;
            let instruction =
                decode(raw).map_err(|source| ExecutionError::Decode { address, source })?;

            self.instructions[len] = instruction;
            len += 1;

            if instruction.is_terminal() {
                break;
            }

            address = address.wrapping_add(4);
        }

        if !self.instructions[len - 1].is_terminal() {
            self.instructions[len] = Instruction::block_end();
            len += 1;
        }

        self.address = start;
        self.len = len;

        trace!(len, "Decoded block at 0x{start:x}");

        Ok(())
    }
}

impl Default for BasicBlock {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct BasicBlockCache {
    blocks: Box<[BasicBlock]>,
}

impl BasicBlockCache {
    pub fn new() -> Self {
        Self {
            blocks: vec![BasicBlock::new(); CACHE_ENTRIES].into_boxed_slice(),
        }
    }

    /// Slot for a block starting at `address`.
    #[inline(always)]
    pub const fn index(address: u64) -> usize {
        ((address >> 2) & (CACHE_ENTRIES as u64 - 1)) as usize
    }

    /// The slot `address` maps to. It may hold another block or none at all;
    /// callers check [`BasicBlock::address`] before executing it.
    #[inline(always)]
    pub fn find(&mut self, address: u64) -> &mut BasicBlock {
        &mut self.blocks[Self::index(address)]
    }

    pub fn flush(&mut self) {
        for block in self.blocks.iter_mut() {
            block.flush();
        }
    }
}

impl Default for BasicBlockCache {
    fn default() -> Self {
        Self::new()
    }
}
