use std::fmt;

use crate::{
    executor::{self, ExecutionError},
    hart::Hart,
    registers::{Register, ZERO},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    R,
    I,
    S,
    B,
    U,
    J,
}

/// Lists every supported mnemonic once. Keyed opcodes are found by their
/// masked match key; derived ones share a key with a sibling and are split
/// off after decoding.
macro_rules! opcodes {
    (
        keyed { $($name:ident = $key:literal, $format:ident;)* }
        derived { $($derived:ident, $derived_format:ident;)* }
    ) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Opcode {
            $($name,)*
            $($derived,)*
            /// Closes a block that reached its length cap.
            BlockEnd,
            /// Slot that no decode has filled yet.
            Unset,
        }

        impl Opcode {
            /// Every real instruction, markers excluded.
            pub const ALL: &'static [Opcode] = &[$(Opcode::$name,)* $(Opcode::$derived,)*];

            pub const fn from_match_key(key: u32) -> Option<Self> {
                match key {
                    $($key => Some(Self::$name),)*
                    _ => None,
                }
            }

            pub const fn format(self) -> Option<Format> {
                match self {
                    $(Self::$name => Some(Format::$format),)*
                    $(Self::$derived => Some(Format::$derived_format),)*
                    Self::BlockEnd | Self::Unset => None,
                }
            }

            pub const fn name(self) -> &'static str {
                match self {
                    $(Self::$name => stringify!($name),)*
                    $(Self::$derived => stringify!($derived),)*
                    Self::BlockEnd => "BLOCK_END",
                    Self::Unset => "UNSET",
                }
            }
        }
    };
}

opcodes! {
    keyed {
        // R - type
        ADD = 0x33, R;
        SUB = 0x4000_0033, R;
        SLL = 0x1033, R;
        SLT = 0x2033, R;
        SLTU = 0x3033, R;
        XOR = 0x4033, R;
        SRL = 0x5033, R;
        SRA = 0x4000_5033, R;
        OR = 0x6033, R;
        AND = 0x7033, R;
        ADDW = 0x3b, R;
        SUBW = 0x4000_003b, R;
        SLLW = 0x103b, R;
        SRLW = 0x503b, R;
        SRAW = 0x4000_503b, R;

        // I - type
        JALR = 0x67, I;
        LB = 0x3, I;
        LH = 0x1003, I;
        LW = 0x2003, I;
        LD = 0x3003, I;
        LBU = 0x4003, I;
        LHU = 0x5003, I;
        LWU = 0x6003, I;
        ADDI = 0x13, I;
        SLLI = 0x1013, I;
        SLTI = 0x2013, I;
        SLTIU = 0x3013, I;
        XORI = 0x4013, I;
        SRLI = 0x5013, I;
        ORI = 0x6013, I;
        ANDI = 0x7013, I;
        ADDIW = 0x1b, I;
        SLLIW = 0x101b, I;
        SRLIW = 0x501b, I;
        FENCE = 0xf, I;
        ECALL = 0x73, I;

        // S - type
        SB = 0x23, S;
        SH = 0x1023, S;
        SW = 0x2023, S;
        SD = 0x3023, S;

        // B - type
        BEQ = 0x63, B;
        BNE = 0x1063, B;
        BLT = 0x4063, B;
        BGE = 0x5063, B;
        BLTU = 0x6063, B;
        BGEU = 0x7063, B;

        // U - type
        LUI = 0x37, U;
        AUIPC = 0x17, U;

        // J - type
        JAL = 0x6f, J;
    }
    derived {
        SRAI, I;
        SRAIW, I;
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Threaded handler: runs `block[index]` and everything it chains into,
/// returning how many instructions retired.
pub type Handler = fn(&mut Hart, &[Instruction], usize) -> Result<u64, ExecutionError>;

#[derive(Clone, Copy)]
pub enum Continuation {
    /// Falls through into the next instruction of the block.
    Chain(Handler),
    /// Hands control back to the run loop.
    Terminal(Handler),
}

impl fmt::Debug for Continuation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Continuation::Chain(_) => f.write_str("Chain"),
            Continuation::Terminal(_) => f.write_str("Terminal"),
        }
    }
}

impl Continuation {
    pub const fn handler(self) -> Handler {
        match self {
            Continuation::Chain(handler) | Continuation::Terminal(handler) => handler,
        }
    }

    pub const fn is_terminal(&self) -> bool {
        matches!(self, Continuation::Terminal(_))
    }
}

/// A decoded instruction. Fields the format does not use stay zero and `imm`
/// is already sign-extended.
#[derive(Debug, Clone, Copy)]
pub struct Instruction {
    pub opcode: Opcode,
    pub rd: Register,
    pub rs1: Register,
    pub rs2: Register,
    pub imm: u64,
    continuation: Continuation,
}

impl Instruction {
    pub const UNSET: Self = Self {
        opcode: Opcode::Unset,
        rd: ZERO,
        rs1: ZERO,
        rs2: ZERO,
        imm: 0,
        continuation: Continuation::Terminal(executor::unset),
    };

    pub fn new(opcode: Opcode) -> Self {
        Self {
            opcode,
            rd: ZERO,
            rs1: ZERO,
            rs2: ZERO,
            imm: 0,
            continuation: executor::continuation(opcode),
        }
    }

    pub fn block_end() -> Self {
        Self::new(Opcode::BlockEnd)
    }

    /// Replaces the opcode, rebinding the semantics to match.
    pub fn with_opcode(self, opcode: Opcode) -> Self {
        Self {
            opcode,
            continuation: executor::continuation(opcode),
            ..self
        }
    }

    pub fn continuation(&self) -> Continuation {
        self.continuation
    }

    pub fn is_terminal(&self) -> bool {
        self.continuation.is_terminal()
    }

    #[inline(always)]
    pub fn execute(
        &self,
        hart: &mut Hart,
        block: &[Instruction],
        index: usize,
    ) -> Result<u64, ExecutionError> {
        (self.continuation.handler())(hart, block, index)
    }
}

impl PartialEq for Instruction {
    fn eq(&self, other: &Self) -> bool {
        self.opcode == other.opcode
            && self.rd == other.rd
            && self.rs1 == other.rs1
            && self.rs2 == other.rs2
            && self.imm == other.imm
    }
}

impl Eq for Instruction {}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.opcode.name().to_lowercase();
        let Self {
            rd, rs1, rs2, imm, ..
        } = *self;
        let simm = imm as i64;

        match self.opcode {
            Opcode::ECALL | Opcode::FENCE => f.write_str(&name),
            Opcode::BlockEnd | Opcode::Unset => write!(f, "<{name}>"),
            Opcode::LB
            | Opcode::LH
            | Opcode::LW
            | Opcode::LD
            | Opcode::LBU
            | Opcode::LHU
            | Opcode::LWU
            | Opcode::JALR => write!(f, "{name} {rd}, {simm}({rs1})"),
            opcode => match opcode.format() {
                Some(Format::R) => write!(f, "{name} {rd}, {rs1}, {rs2}"),
                Some(Format::I) => write!(f, "{name} {rd}, {rs1}, {simm}"),
                Some(Format::S) => write!(f, "{name} {rs2}, {simm}({rs1})"),
                Some(Format::B) => write!(f, "{name} {rs1}, {rs2}, {simm}"),
                Some(Format::U) => write!(f, "{name} {rd}, 0x{:x}", imm >> 12 & 0xf_ffff),
                Some(Format::J) => write!(f, "{name} {rd}, {simm}"),
                None => f.write_str(&name),
            },
        }
    }
}
