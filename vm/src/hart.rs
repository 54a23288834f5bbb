use crate::{
    memory::{Memory, MemoryError, DEFAULT_MEMORY_SIZE},
    mmu::{MMUError, TranslationMode, MMU},
    registers::{Register, Registers},
};

#[derive(Debug, Clone, Copy)]
pub struct HartConfig {
    pub memory_size: usize,
    pub translation: TranslationMode,
}

impl Default for HartConfig {
    fn default() -> Self {
        Self {
            memory_size: DEFAULT_MEMORY_SIZE,
            translation: TranslationMode::default(),
        }
    }
}

/// One hardware thread: its registers, the memory it owns and the MMU that
/// every load, store and fetch goes through.
#[derive(Debug, Clone)]
pub struct Hart {
    pub registers: Registers,
    pub memory: Memory,
    pub mmu: MMU,
    retired: u64,
}

impl Hart {
    pub fn new(config: HartConfig) -> Result<Self, MemoryError> {
        Ok(Self {
            registers: Registers::default(),
            memory: Memory::new(config.memory_size)?,
            mmu: MMU::new(config.translation),
            retired: 0,
        })
    }

    #[inline(always)]
    pub fn pc(&self) -> u64 {
        self.registers.pc()
    }

    #[inline(always)]
    pub fn pc_next(&self) -> u64 {
        self.registers.pc_next()
    }

    /// Jumps to `pc` as if the previous instruction had been straight-line.
    pub fn set_pc(&mut self, pc: u64) {
        *self.registers.pc_mut() = pc;
        *self.registers.pc_next_mut() = pc.wrapping_add(4);
    }

    #[inline(always)]
    pub fn set_pc_next(&mut self, pc_next: u64) {
        *self.registers.pc_next_mut() = pc_next;
    }

    #[inline(always)]
    pub fn advance_pc(&mut self) {
        self.registers.advance();
    }

    #[inline(always)]
    pub fn reg(&self, register: Register) -> u64 {
        self.registers.get(register)
    }

    #[inline(always)]
    pub fn set_reg(&mut self, register: Register, value: u64) {
        self.registers.set(register, value);
    }

    #[inline(always)]
    fn translate(&mut self, address: u64) -> Result<u64, MMUError> {
        self.mmu.translate(&self.memory, address)
    }

    pub fn load_u8(&mut self, address: u64) -> Result<u8, MMUError> {
        let address = self.translate(address)?;

        Ok(self.memory.read_u8(address)?)
    }

    pub fn load_u16(&mut self, address: u64) -> Result<u16, MMUError> {
        let address = self.translate(address)?;

        Ok(self.memory.read_u16(address)?)
    }

    pub fn load_u32(&mut self, address: u64) -> Result<u32, MMUError> {
        let address = self.translate(address)?;

        Ok(self.memory.read_u32(address)?)
    }

    pub fn load_u64(&mut self, address: u64) -> Result<u64, MMUError> {
        let address = self.translate(address)?;

        Ok(self.memory.read_u64(address)?)
    }

    pub fn store_u8(&mut self, value: u8, address: u64) -> Result<(), MMUError> {
        let address = self.translate(address)?;

        Ok(self.memory.write_u8(value, address)?)
    }

    pub fn store_u16(&mut self, value: u16, address: u64) -> Result<(), MMUError> {
        let address = self.translate(address)?;

        Ok(self.memory.write_u16(value, address)?)
    }

    pub fn store_u32(&mut self, value: u32, address: u64) -> Result<(), MMUError> {
        let address = self.translate(address)?;

        Ok(self.memory.write_u32(value, address)?)
    }

    pub fn store_u64(&mut self, value: u64, address: u64) -> Result<(), MMUError> {
        let address = self.translate(address)?;

        Ok(self.memory.write_u64(value, address)?)
    }

    /// Reads the instruction word at virtual address `address`.
    pub fn fetch(&mut self, address: u64) -> Result<u32, MMUError> {
        self.load_u32(address)
    }

    /// Instructions retired since the hart was created.
    pub fn retired(&self) -> u64 {
        self.retired
    }

    pub(crate) fn retire(&mut self, count: u64) {
        self.retired += count;
    }

    pub fn dump_registers(&self) -> String {
        self.registers.to_string()
    }
}
