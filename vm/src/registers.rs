use std::fmt;

/// Hardwired to 0, ignores writes
pub const ZERO: Register = Register(0);
/// Return address for jumps
pub const RA: Register = Register(1);
/// Stack pointer
pub const SP: Register = Register(2);
/// Global pointer
pub const GP: Register = Register(3);
/// Thread pointer
pub const TP: Register = Register(4);
/// Temporary register 0
pub const T0: Register = Register(5);
/// Temporary register 1
pub const T1: Register = Register(6);
/// Temporary register 2
pub const T2: Register = Register(7);
/// Saved register 0 or frame pointer
pub const S0: Register = Register(8);
/// Saved register 1
pub const S1: Register = Register(9);
/// Return value or function argument 0
pub const A0: Register = Register(10);
/// Return value or function argument 1
pub const A1: Register = Register(11);
/// Function argument 2
pub const A2: Register = Register(12);
/// Function argument 3
pub const A3: Register = Register(13);
/// Function argument 4
pub const A4: Register = Register(14);
/// Function argument 5
pub const A5: Register = Register(15);
/// Function argument 6
pub const A6: Register = Register(16);
/// Function argument 7
pub const A7: Register = Register(17);
/// Saved register 2
pub const S2: Register = Register(18);
/// Saved register 3
pub const S3: Register = Register(19);
/// Saved register 4
pub const S4: Register = Register(20);
/// Saved register 5
pub const S5: Register = Register(21);
/// Saved register 6
pub const S6: Register = Register(22);
/// Saved register 7
pub const S7: Register = Register(23);
/// Saved register 8
pub const S8: Register = Register(24);
/// Saved register 9
pub const S9: Register = Register(25);
/// Saved register 10
pub const S10: Register = Register(26);
/// Saved register 11
pub const S11: Register = Register(27);
/// Temporary register 3
pub const T3: Register = Register(28);
/// Temporary register 4
pub const T4: Register = Register(29);
/// Temporary register 5
pub const T5: Register = Register(30);
/// Temporary register 6
pub const T6: Register = Register(31);

pub const REGISTER_COUNT: usize = 32;

const ABI_NAMES: [&str; REGISTER_COUNT] = [
    "zero", "ra", "sp", "gp", "tp", "t0", "t1", "t2", "s0", "s1", "a0", "a1", "a2", "a3", "a4",
    "a5", "a6", "a7", "s2", "s3", "s4", "s5", "s6", "s7", "s8", "s9", "s10", "s11", "t3", "t4",
    "t5", "t6",
];

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Register(u8);

impl Register {
    pub const fn new(i: u8) -> Option<Self> {
        if (i as usize) < REGISTER_COUNT {
            Some(Self(i))
        } else {
            None
        }
    }

    /// Takes the low five bits of an instruction field, which always name a
    /// valid register.
    pub const fn from_field(field: u64) -> Self {
        Self((field & 0b11111) as u8)
    }

    pub const fn as_u8(&self) -> u8 {
        self.0
    }

    pub const fn abi_name(&self) -> &'static str {
        ABI_NAMES[self.0 as usize]
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "x{}", self.0)
    }
}

/// General purpose registers plus the `pc`/`pc_next` pair. Taken branches and
/// jumps only overwrite `pc_next`.
///
/// See [ASM Manual](https://github.com/riscv-non-isa/riscv-asm-manual/blob/main/riscv-asm.md#general-registers)
#[derive(Debug, Default, Clone)]
pub struct Registers {
    registers: [u64; REGISTER_COUNT - 1],
    pc: u64,
    pc_next: u64,
}

impl Registers {
    #[inline(always)]
    pub fn get(&self, register: Register) -> u64 {
        match register.as_u8() as usize {
            0 => 0,
            i => self.registers[i - 1],
        }
    }

    #[inline(always)]
    pub fn set(&mut self, register: Register, value: u64) {
        match register.as_u8() as usize {
            0 => {}
            i => self.registers[i - 1] = value,
        }
    }

    pub fn pc(&self) -> u64 {
        self.pc
    }

    pub fn pc_mut(&mut self) -> &mut u64 {
        &mut self.pc
    }

    pub fn pc_next(&self) -> u64 {
        self.pc_next
    }

    pub fn pc_next_mut(&mut self) -> &mut u64 {
        &mut self.pc_next
    }

    /// Commits `pc_next` and assumes straight-line flow for the one after it.
    #[inline(always)]
    pub fn advance(&mut self) {
        self.pc = self.pc_next;
        self.pc_next = self.pc.wrapping_add(4);
    }

    pub fn iter(&self) -> impl Iterator<Item = (Register, u64)> + '_ {
        (0..REGISTER_COUNT as u8).map(|i| {
            let register = Register(i);

            (register, self.get(register))
        })
    }
}

impl fmt::Display for Registers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "pc       = 0x{:016x}", self.pc)?;

        for (register, value) in self.iter() {
            writeln!(
                f,
                "{:<4} {:>4} = 0x{value:016x} ({})",
                register.to_string(),
                register.abi_name(),
                value as i64
            )?;
        }

        Ok(())
    }
}
