use thiserror::Error;

pub const PAGE_BITS: u32 = 12;
pub const PAGE_SIZE: u64 = 1 << PAGE_BITS;
pub const PAGE_MASK: u64 = PAGE_SIZE - 1;

/// 1 MiB, enough for the statically linked test programs.
pub const DEFAULT_MEMORY_SIZE: usize = 0x10_0000;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MemoryError {
    #[error("Memory size should be a non-zero multiple of the page size, but it is {size}")]
    InvalidSize { size: usize },
    #[error("The address '0x{address:0X}' is out of bounds")]
    OutOfBounds { address: u64 },
    #[error("Access of {size} bytes at '0x{address:0X}' crosses a page boundary")]
    CrossesPage { address: u64, size: usize },
}

const fn check_page(address: u64, size: usize) -> Result<(), MemoryError> {
    if (address & PAGE_MASK) + size as u64 > PAGE_SIZE {
        return Err(MemoryError::CrossesPage { address, size });
    }

    Ok(())
}

const fn check_bounds(address: u64, size: usize, len: usize) -> Result<usize, MemoryError> {
    match address.checked_add(size as u64) {
        Some(end) if end <= len as u64 => Ok(address as usize),
        _ => Err(MemoryError::OutOfBounds { address }),
    }
}

/// Flat physical memory. Addresses are offsets from the start of the region.
#[derive(Debug, Clone)]
pub struct Memory {
    memory: Vec<u8>,
}

impl Memory {
    pub fn new(size: usize) -> Result<Self, MemoryError> {
        if size == 0 || size as u64 % PAGE_SIZE != 0 {
            return Err(MemoryError::InvalidSize { size });
        }

        let memory = vec![0; size];

        Ok(Self { memory })
    }

    pub fn size(&self) -> usize {
        self.memory.len()
    }

    /// Copies an image segment into memory. Unlike typed accesses, the copy
    /// may span several pages.
    pub fn load(&mut self, address: u64, bytes: &[u8]) -> Result<(), MemoryError> {
        let start = check_bounds(address, bytes.len(), self.memory.len())?;

        self.memory[start..start + bytes.len()].copy_from_slice(bytes);

        Ok(())
    }

    fn read<const N: usize>(&self, address: u64) -> Result<[u8; N], MemoryError> {
        check_page(address, N)?;
        let start = check_bounds(address, N, self.memory.len())?;

        let mut bytes = [0; N];
        bytes.copy_from_slice(&self.memory[start..start + N]);

        Ok(bytes)
    }

    fn write<const N: usize>(&mut self, bytes: [u8; N], address: u64) -> Result<(), MemoryError> {
        check_page(address, N)?;
        let start = check_bounds(address, N, self.memory.len())?;

        self.memory[start..start + N].copy_from_slice(&bytes);

        Ok(())
    }

    pub fn read_u8(&self, address: u64) -> Result<u8, MemoryError> {
        Ok(u8::from_le_bytes(self.read(address)?))
    }

    pub fn read_u16(&self, address: u64) -> Result<u16, MemoryError> {
        Ok(u16::from_le_bytes(self.read(address)?))
    }

    pub fn read_u32(&self, address: u64) -> Result<u32, MemoryError> {
        Ok(u32::from_le_bytes(self.read(address)?))
    }

    pub fn read_u64(&self, address: u64) -> Result<u64, MemoryError> {
        Ok(u64::from_le_bytes(self.read(address)?))
    }

    pub fn write_u8(&mut self, value: u8, address: u64) -> Result<(), MemoryError> {
        self.write(value.to_le_bytes(), address)
    }

    pub fn write_u16(&mut self, value: u16, address: u64) -> Result<(), MemoryError> {
        self.write(value.to_le_bytes(), address)
    }

    pub fn write_u32(&mut self, value: u32, address: u64) -> Result<(), MemoryError> {
        self.write(value.to_le_bytes(), address)
    }

    pub fn write_u64(&mut self, value: u64, address: u64) -> Result<(), MemoryError> {
        self.write(value.to_le_bytes(), address)
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self {
            memory: vec![0; DEFAULT_MEMORY_SIZE],
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::memory::{Memory, MemoryError, PAGE_SIZE};

    #[test]
    fn invalid_size() {
        let memory = Memory::new(33);

        assert!(memory.is_err());
        assert_eq!(memory.unwrap_err(), MemoryError::InvalidSize { size: 33 });
        assert_eq!(
            Memory::new(0).unwrap_err(),
            MemoryError::InvalidSize { size: 0 }
        );
    }

    #[test]
    fn write_read() {
        let mut memory = Memory::new(PAGE_SIZE as usize).unwrap();

        assert_eq!(memory.write_u8(1, 0x1), Ok(()));
        assert_eq!(memory.read_u8(0x1), Ok(1));

        // u16
        assert_eq!(memory.write_u16(2, 0x0), Ok(()));
        assert_eq!(memory.read_u16(0x0), Ok(2));
        assert_eq!(memory.write_u16(4, 0x2), Ok(()));
        assert_eq!(memory.read_u16(0x2), Ok(4));

        // u32
        assert_eq!(memory.write_u32(8, 0x0), Ok(()));
        assert_eq!(memory.read_u32(0x0), Ok(8));
        assert_eq!(memory.write_u32(0xdead_beef, 0x8), Ok(()));
        assert_eq!(memory.read_u32(0x8), Ok(0xdead_beef));

        // u64
        assert_eq!(memory.write_u64(0x0123_4567_89ab_cdef, 0x10), Ok(()));
        assert_eq!(memory.read_u64(0x10), Ok(0x0123_4567_89ab_cdef));
        assert_eq!(memory.read_u8(0x10), Ok(0xef));
        assert_eq!(memory.read_u16(0x16), Ok(0x0123));
    }

    #[test]
    fn out_of_bounds() {
        let mut memory = Memory::new(PAGE_SIZE as usize).unwrap();

        assert_eq!(
            memory.read_u8(PAGE_SIZE),
            Err(MemoryError::OutOfBounds { address: PAGE_SIZE })
        );
        assert_eq!(
            memory.write_u32(1, u64::MAX - 1),
            Err(MemoryError::CrossesPage {
                address: u64::MAX - 1,
                size: 4
            })
        );
        assert_eq!(
            memory.load(PAGE_SIZE - 2, &[1, 2, 3]),
            Err(MemoryError::OutOfBounds {
                address: PAGE_SIZE - 2
            })
        );
    }

    #[test]
    fn crosses_page() {
        let mut memory = Memory::new(2 * PAGE_SIZE as usize).unwrap();

        assert_eq!(
            memory.read_u32(PAGE_SIZE - 2),
            Err(MemoryError::CrossesPage {
                address: PAGE_SIZE - 2,
                size: 4
            })
        );
        assert_eq!(
            memory.write_u64(0, PAGE_SIZE - 4),
            Err(MemoryError::CrossesPage {
                address: PAGE_SIZE - 4,
                size: 8
            })
        );
        // The last fitting slot of a page is fine.
        assert_eq!(memory.write_u64(7, PAGE_SIZE - 8), Ok(()));
        assert_eq!(memory.read_u64(PAGE_SIZE - 8), Ok(7));
    }

    #[test]
    fn load_spans_pages() {
        let mut memory = Memory::new(2 * PAGE_SIZE as usize).unwrap();

        assert_eq!(memory.load(PAGE_SIZE - 2, &[0x11, 0x22, 0x33, 0x44]), Ok(()));
        assert_eq!(memory.read_u16(PAGE_SIZE - 2), Ok(0x2211));
        assert_eq!(memory.read_u16(PAGE_SIZE), Ok(0x4433));
    }
}
