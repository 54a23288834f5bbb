use crate::{
    bits::bits,
    memory::{Memory, MemoryError, PAGE_BITS},
    pte::{PageTableEntry, PTE_SIZE},
    tlb::TLB,
};
use thiserror::Error;

/// Sv39 has three levels of 9-bit virtual page numbers.
pub const LEVELS: usize = 3;
const VPN_BITS: u32 = 9;

pub const DEFAULT_ROOT_PAGE_TABLE: u64 = 0x1000;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum MMUError {
    #[error(transparent)]
    MemoryError(#[from] MemoryError),
    #[error("Page fault at '0x{address:0X}'")]
    PageFault { address: u64 },
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum TranslationMode {
    /// Virtual addresses are physical addresses.
    #[default]
    Bare,
    /// Three-level walk starting from the page table at `root`.
    Sv39 { root: u64 },
}

/// `VPN[level]` of a virtual address.
pub const fn vpn(virtual_address: u64, level: usize) -> u64 {
    assert!(level < LEVELS, "Sv39 has no VPN level above 2");

    let low = PAGE_BITS + level as u32 * VPN_BITS;

    bits(virtual_address, low + VPN_BITS - 1, low)
}

#[derive(Debug, Clone, Default)]
pub struct MMU {
    mode: TranslationMode,
    tlb: TLB,
}

impl MMU {
    pub fn new(mode: TranslationMode) -> Self {
        Self {
            mode,
            tlb: TLB::new(),
        }
    }

    pub fn mode(&self) -> TranslationMode {
        self.mode
    }

    /// Cached translations belong to the old mode, so they are dropped.
    pub fn set_mode(&mut self, mode: TranslationMode) {
        self.mode = mode;
        self.tlb.flush();
    }

    pub fn tlb(&self) -> &TLB {
        &self.tlb
    }

    pub fn flush_tlb(&mut self) {
        self.tlb.flush();
    }

    #[inline(always)]
    pub fn translate(&mut self, memory: &Memory, virtual_address: u64) -> Result<u64, MMUError> {
        match self.mode {
            TranslationMode::Bare => Ok(virtual_address),
            TranslationMode::Sv39 { root } => {
                if let Some(physical_address) = self.tlb.find(virtual_address) {
                    return Ok(physical_address);
                }

                let physical_address = walk(memory, root, virtual_address)?;
                self.tlb.update(virtual_address, physical_address);

                Ok(physical_address)
            }
        }
    }
}

fn walk(memory: &Memory, root: u64, virtual_address: u64) -> Result<u64, MMUError> {
    let fault = MMUError::PageFault {
        address: virtual_address,
    };

    let mut table = root;
    let mut level = LEVELS - 1;

    let pte = loop {
        let address = table
            .checked_add(vpn(virtual_address, level) * PTE_SIZE)
            .ok_or(MemoryError::OutOfBounds { address: table })?;
        let pte = PageTableEntry::new(memory.read_u64(address)?);

        if !pte.valid() || (!pte.r() && pte.w()) || pte.reserved() != 0 {
            return Err(fault);
        }

        if pte.is_leaf() {
            break pte;
        }

        if level == 0 {
            return Err(fault);
        }

        table = pte.page_address();
        level -= 1;
    };

    // A superpage must be aligned to its own size.
    if (0..level).any(|i| pte.ppn(i) != 0) {
        return Err(fault);
    }

    // For a superpage the VPN bits below the leaf level pass through as well.
    let offset_mask: u64 = (1 << (PAGE_BITS + level as u32 * VPN_BITS)) - 1;

    Ok(pte.page_address() | (virtual_address & offset_mask))
}
