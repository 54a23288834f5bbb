use crate::{
    bits::{bit, bits},
    memory::PAGE_BITS,
};

pub const PTE_SIZE: u64 = 8;

pub const FLAG_V: u64 = 1 << 0;
pub const FLAG_R: u64 = 1 << 1;
pub const FLAG_W: u64 = 1 << 2;
pub const FLAG_X: u64 = 1 << 3;
pub const FLAG_U: u64 = 1 << 4;
pub const FLAG_G: u64 = 1 << 5;
pub const FLAG_A: u64 = 1 << 6;
pub const FLAG_D: u64 = 1 << 7;

const PPN_LOW: u32 = 10;
const PPN_HIGH: u32 = 53;
const PPN_LEVEL_BITS: u32 = 9;

/// Reserved in bits 63..54, PPN in 53..10, flags in 7..0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageTableEntry(u64);

impl PageTableEntry {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Builds an entry pointing at the page containing `physical_address`.
    pub const fn from_parts(physical_address: u64, flags: u8) -> Self {
        let ppn = physical_address >> PAGE_BITS;

        Self((ppn << PPN_LOW) | flags as u64)
    }

    pub const fn raw(&self) -> u64 {
        self.0
    }

    pub const fn valid(&self) -> bool {
        bit(self.0, 0) == 1
    }

    pub const fn r(&self) -> bool {
        bit(self.0, 1) == 1
    }

    pub const fn w(&self) -> bool {
        bit(self.0, 2) == 1
    }

    pub const fn x(&self) -> bool {
        bit(self.0, 3) == 1
    }

    pub const fn u(&self) -> bool {
        bit(self.0, 4) == 1
    }

    pub const fn g(&self) -> bool {
        bit(self.0, 5) == 1
    }

    pub const fn a(&self) -> bool {
        bit(self.0, 6) == 1
    }

    pub const fn d(&self) -> bool {
        bit(self.0, 7) == 1
    }

    /// Readable or executable entries end the walk.
    pub const fn is_leaf(&self) -> bool {
        self.r() || self.x()
    }

    /// Bits 63..54 (`N`, `PBMT` and the reserved range), none of which are
    /// implemented.
    pub const fn reserved(&self) -> u64 {
        bits(self.0, 63, PPN_HIGH + 1)
    }

    /// `PPN[level]`; the top level holds the remaining 26 bits.
    pub const fn ppn(&self, level: usize) -> u64 {
        assert!(level < 3, "Sv39 has no PPN level above 2");

        let low = PPN_LOW + level as u32 * PPN_LEVEL_BITS;
        let high = if level == 2 {
            PPN_HIGH
        } else {
            low + PPN_LEVEL_BITS - 1
        };

        bits(self.0, high, low)
    }

    pub const fn page_address(&self) -> u64 {
        bits(self.0, PPN_HIGH, PPN_LOW) << PAGE_BITS
    }
}

#[cfg(test)]
mod tests {
    use super::{PageTableEntry, FLAG_D, FLAG_R, FLAG_V, FLAG_W, FLAG_X};
    use proptest::{prop_assert_eq, proptest};

    #[test]
    fn flags() {
        let pte = PageTableEntry::from_parts(0x8000_0000, (FLAG_V | FLAG_R | FLAG_X | FLAG_D) as u8);

        assert!(pte.valid());
        assert!(pte.r());
        assert!(!pte.w());
        assert!(pte.x());
        assert!(!pte.u());
        assert!(!pte.g());
        assert!(!pte.a());
        assert!(pte.d());
        assert!(pte.is_leaf());
        assert_eq!(pte.page_address(), 0x8000_0000);
    }

    #[test]
    fn pointer_is_not_leaf() {
        let pte = PageTableEntry::from_parts(0x2000, FLAG_V as u8);

        assert!(!pte.is_leaf());
        assert_eq!(pte.reserved(), 0);
        assert_eq!(PageTableEntry::new(pte.raw() | 1 << 60).reserved(), 1 << 6);
        assert!(!PageTableEntry::from_parts(0x2000, FLAG_W as u8).r());
    }

    proptest! {
        #[test]
        fn ppn_fields(ppn_0 in 0_u64..(1 << 9), ppn_1 in 0_u64..(1 << 9), ppn_2 in 0_u64..(1 << 26)) {
            let ppn = ppn_0 | ppn_1 << 9 | ppn_2 << 18;
            let pte = PageTableEntry::new(ppn << 10 | FLAG_V);

            prop_assert_eq!(pte.ppn(0), ppn_0);
            prop_assert_eq!(pte.ppn(1), ppn_1);
            prop_assert_eq!(pte.ppn(2), ppn_2);
            prop_assert_eq!(pte.page_address(), ppn << 12);
        }
    }
}
