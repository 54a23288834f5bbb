use crate::{
    bits::bits,
    memory::{PAGE_BITS, PAGE_MASK},
};

pub const TLB_INDEX_BITS: u32 = 8;
pub const TLB_ENTRIES: usize = 1 << TLB_INDEX_BITS;

#[derive(Debug, Default, Clone, Copy)]
struct Entry {
    virtual_page: u64,
    physical_page: u64,
    valid: bool,
}

/// Direct-mapped on the address bits right above the page offset.
#[derive(Debug, Clone)]
pub struct TLB {
    entries: [Entry; TLB_ENTRIES],
}

impl TLB {
    pub fn new() -> Self {
        Self {
            entries: [Entry::default(); TLB_ENTRIES],
        }
    }

    #[inline(always)]
    pub const fn index(virtual_address: u64) -> usize {
        bits(virtual_address, PAGE_BITS + TLB_INDEX_BITS - 1, PAGE_BITS) as usize
    }

    /// Returns the physical address for `virtual_address` if its page is cached.
    #[inline(always)]
    pub fn find(&self, virtual_address: u64) -> Option<u64> {
        let entry = &self.entries[Self::index(virtual_address)];

        if entry.valid && entry.virtual_page == virtual_address & !PAGE_MASK {
            Some(entry.physical_page | (virtual_address & PAGE_MASK))
        } else {
            None
        }
    }

    pub fn update(&mut self, virtual_address: u64, physical_address: u64) {
        self.entries[Self::index(virtual_address)] = Entry {
            virtual_page: virtual_address & !PAGE_MASK,
            physical_page: physical_address & !PAGE_MASK,
            valid: true,
        };
    }

    pub fn flush(&mut self) {
        for entry in &mut self.entries {
            entry.valid = false;
        }
    }
}

impl Default for TLB {
    fn default() -> Self {
        Self::new()
    }
}
