use crate::{
    bits::{bit, bits, sbits, sext},
    isa::{Format, Instruction, Opcode},
    registers::Register,
};
use thiserror::Error;

#[derive(Debug, Clone, Copy, Error, PartialEq)]
pub enum DecodeError {
    #[error("Unknown instruction '0x{instruction:08X}'")]
    UnknownInstruction { instruction: u32 },
}

/// Bits that tell apart instructions sharing a major opcode (funct3, funct7).
/// Zero marks an unsupported major opcode.
const MASKS: [u32; 128] = {
    let mut masks = [0; 128];

    masks[0b000_0011] = 0x707f; // LOAD
    masks[0b000_1111] = 0x707f; // MISC-MEM
    masks[0b001_0011] = 0x707f; // OP-IMM
    masks[0b001_0111] = 0x7f; // AUIPC
    masks[0b001_1011] = 0x707f; // OP-IMM-32
    masks[0b010_0011] = 0x707f; // STORE
    masks[0b011_0011] = 0xfe00_707f; // OP
    masks[0b011_0111] = 0x7f; // LUI
    masks[0b011_1011] = 0xfe00_707f; // OP-32
    masks[0b110_0011] = 0x707f; // BRANCH
    masks[0b110_0111] = 0x707f; // JALR
    masks[0b110_1111] = 0x7f; // JAL
    masks[0b111_0011] = 0x707f; // SYSTEM

    masks
};

const ECALL_WORD: u32 = 0x73;

/// The masked instruction word used to look the opcode up.
pub const fn match_key(instruction: u32) -> u32 {
    instruction & MASKS[bits(instruction as u64, 6, 0) as usize]
}

const fn fetch_rd(instruction: u64) -> Register {
    Register::from_field(bits(instruction, 11, 7))
}

const fn fetch_rs1(instruction: u64) -> Register {
    Register::from_field(bits(instruction, 19, 15))
}

const fn fetch_rs2(instruction: u64) -> Register {
    Register::from_field(bits(instruction, 24, 20))
}

const fn fetch_imm_i(instruction: u64) -> u64 {
    sbits(instruction, 31, 20)
}

const fn fetch_imm_s(instruction: u64) -> u64 {
    (sbits(instruction, 31, 25) << 5) | bits(instruction, 11, 7)
}

const fn fetch_imm_b(instruction: u64) -> u64 {
    let imm = (bit(instruction, 31) << 12)
        | (bits(instruction, 30, 25) << 5)
        | (bits(instruction, 11, 8) << 1)
        | (bit(instruction, 7) << 11);

    sext(imm, 12)
}

const fn fetch_imm_u(instruction: u64) -> u64 {
    sbits(instruction, 31, 12) << 12
}

const fn fetch_imm_j(instruction: u64) -> u64 {
    let imm = (bit(instruction, 31) << 20)
        | (bits(instruction, 30, 21) << 1)
        | (bit(instruction, 20) << 11)
        | (bits(instruction, 19, 12) << 12);

    sext(imm, 20)
}

fn decode_format(opcode: Opcode, format: Format, instruction: u64) -> Instruction {
    let mut decoded = Instruction::new(opcode);

    match format {
        Format::R => {
            decoded.rd = fetch_rd(instruction);
            decoded.rs1 = fetch_rs1(instruction);
            decoded.rs2 = fetch_rs2(instruction);
        }
        Format::I => {
            decoded.rd = fetch_rd(instruction);
            decoded.rs1 = fetch_rs1(instruction);
            decoded.imm = fetch_imm_i(instruction);
        }
        Format::S => {
            decoded.rs1 = fetch_rs1(instruction);
            decoded.rs2 = fetch_rs2(instruction);
            decoded.imm = fetch_imm_s(instruction);
        }
        Format::B => {
            decoded.rs1 = fetch_rs1(instruction);
            decoded.rs2 = fetch_rs2(instruction);
            decoded.imm = fetch_imm_b(instruction);
        }
        Format::U => {
            decoded.rd = fetch_rd(instruction);
            decoded.imm = fetch_imm_u(instruction);
        }
        Format::J => {
            decoded.rd = fetch_rd(instruction);
            decoded.imm = fetch_imm_j(instruction);
        }
    }

    decoded
}

/// Decodes one 32-bit instruction word and binds its semantics.
pub fn decode(instruction: u32) -> Result<Instruction, DecodeError> {
    let unknown = DecodeError::UnknownInstruction { instruction };

    let opcode = Opcode::from_match_key(match_key(instruction)).ok_or(unknown)?;
    let format = opcode.format().ok_or(unknown)?;
    let decoded = decode_format(opcode, format, instruction as u64);

    // Right shifts by immediate share a key; imm[10] selects the arithmetic one.
    let decoded = match decoded.opcode {
        Opcode::SRLI if bit(decoded.imm, 10) == 1 => decoded.with_opcode(Opcode::SRAI),
        Opcode::SRLIW if bit(decoded.imm, 10) == 1 => decoded.with_opcode(Opcode::SRAIW),
        Opcode::ECALL if instruction != ECALL_WORD => return Err(unknown),
        _ => decoded,
    };

    if !valid_shift(decoded.opcode, decoded.imm) {
        return Err(unknown);
    }

    Ok(decoded)
}

/// Shift immediates carry a 6-bit shamt (5-bit for the word forms); every
/// bit above it is zero apart from imm[10] on arithmetic shifts.
const fn valid_shift(opcode: Opcode, imm: u64) -> bool {
    match opcode {
        Opcode::SLLI | Opcode::SRLI => bits(imm, 11, 6) == 0,
        Opcode::SRAI => bits(imm, 11, 6) == 0b01_0000,
        Opcode::SLLIW | Opcode::SRLIW => bits(imm, 11, 5) == 0,
        Opcode::SRAIW => bits(imm, 11, 5) == 0b010_0000,
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::{decode, match_key, DecodeError};
    use crate::{
        isa::{Instruction, Opcode},
        registers::{Register, A0, A1, A5, GP, RA, S0, SP, T0, T1, T2, T4, T5, T6, TP, ZERO},
    };

    fn expected(opcode: Opcode, rd: Register, rs1: Register, rs2: Register, imm: i64) -> Instruction {
        let mut instruction = Instruction::new(opcode);

        instruction.rd = rd;
        instruction.rs1 = rs1;
        instruction.rs2 = rs2;
        instruction.imm = imm as u64;

        instruction
    }

    #[test]
    fn opcode_by_opcode() {
        let table = [
            (0x37, Opcode::LUI, 0),
            (0x17, Opcode::AUIPC, 0),
            (0x6f, Opcode::JAL, 0),
            (0x33, Opcode::ADD, 0),
            (0x4000_0033, Opcode::SUB, 0),
            (0x1033, Opcode::SLL, 0),
            (0x2033, Opcode::SLT, 0),
            (0x3033, Opcode::SLTU, 0),
            (0x4033, Opcode::XOR, 0),
            (0x5033, Opcode::SRL, 0),
            (0x4000_5033, Opcode::SRA, 0),
            (0x6033, Opcode::OR, 0),
            (0x7033, Opcode::AND, 0),
            (0x3b, Opcode::ADDW, 0),
            (0x103b, Opcode::SLLW, 0),
            (0x503b, Opcode::SRLW, 0),
            (0x4000_003b, Opcode::SUBW, 0),
            (0x4000_503b, Opcode::SRAW, 0),
            (0x67, Opcode::JALR, 0),
            (0x3, Opcode::LB, 0),
            (0x1003, Opcode::LH, 0),
            (0x2003, Opcode::LW, 0),
            (0x4003, Opcode::LBU, 0),
            (0x5003, Opcode::LHU, 0),
            (0x6003, Opcode::LWU, 0),
            (0x3003, Opcode::LD, 0),
            (0x13, Opcode::ADDI, 0),
            (0x2013, Opcode::SLTI, 0),
            (0x3013, Opcode::SLTIU, 0),
            (0x4013, Opcode::XORI, 0),
            (0x6013, Opcode::ORI, 0),
            (0x7013, Opcode::ANDI, 0),
            (0x1013, Opcode::SLLI, 0),
            (0x5013, Opcode::SRLI, 0),
            (0x4000_5013, Opcode::SRAI, 1 << 10),
            (0x1b, Opcode::ADDIW, 0),
            (0x101b, Opcode::SLLIW, 0),
            (0x501b, Opcode::SRLIW, 0),
            (0x4000_501b, Opcode::SRAIW, 1 << 10),
            (0x23, Opcode::SB, 0),
            (0x1023, Opcode::SH, 0),
            (0x2023, Opcode::SW, 0),
            (0x3023, Opcode::SD, 0),
            (0x63, Opcode::BEQ, 0),
            (0x1063, Opcode::BNE, 0),
            (0x4063, Opcode::BLT, 0),
            (0x5063, Opcode::BGE, 0),
            (0x6063, Opcode::BLTU, 0),
            (0x7063, Opcode::BGEU, 0),
            (0xf, Opcode::FENCE, 0),
            (0x73, Opcode::ECALL, 0),
        ];

        for (word, opcode, imm) in table {
            assert_eq!(
                decode(word),
                Ok(expected(opcode, ZERO, ZERO, ZERO, imm)),
                "0x{word:08x}"
            );
        }
    }

    #[test]
    fn instruction_r() {
        // add x1, x2, x3
        assert_eq!(decode(0x003100b3), Ok(expected(Opcode::ADD, RA, SP, GP, 0)));
        // subw x31, x30, x29
        assert_eq!(decode(0x41df0fbb), Ok(expected(Opcode::SUBW, T6, T5, T4, 0)));
    }

    #[test]
    fn instruction_i() {
        // addi x2, x1, 2000
        assert_eq!(decode(0x7d008113), Ok(expected(Opcode::ADDI, SP, RA, ZERO, 2000)));
        // addi x5, x6, -1
        assert_eq!(decode(0xfff30293), Ok(expected(Opcode::ADDI, T0, T1, ZERO, -1)));
        // lw x2, -4(x1)
        assert_eq!(decode(0xffc0a103), Ok(expected(Opcode::LW, SP, RA, ZERO, -4)));
        // jalr x1, -12(x5)
        assert_eq!(decode(0xff4280e7), Ok(expected(Opcode::JALR, RA, T0, ZERO, -12)));
        // fence
        assert_eq!(decode(0x0ff0000f), Ok(expected(Opcode::FENCE, ZERO, ZERO, ZERO, 0xff)));
    }

    #[test]
    fn shift_immediates() {
        // srai x10, x11, 63
        assert_eq!(decode(0x43f5d513), Ok(expected(Opcode::SRAI, A0, A1, ZERO, 0x43f)));
        // srli x10, x11, 63
        assert_eq!(decode(0x03f5d513), Ok(expected(Opcode::SRLI, A0, A1, ZERO, 63)));
        // sraiw x10, x11, 31
        assert_eq!(decode(0x41f5d51b), Ok(expected(Opcode::SRAIW, A0, A1, ZERO, 0x41f)));
        // slli x1, x1, 32
        assert_eq!(decode(0x02009093), Ok(expected(Opcode::SLLI, RA, RA, ZERO, 32)));
    }

    #[test]
    fn reserved_shift_encodings() {
        let unknown = |instruction| Err(DecodeError::UnknownInstruction { instruction });

        // slliw x1, x1, 32
        assert_eq!(decode(0x0200909b), unknown(0x0200909b));
        // srli x1, x1 with imm[11] set
        assert_eq!(decode(0x8000d093), unknown(0x8000d093));
        // srai x1, x1, 1 with imm[9] set
        assert_eq!(decode(0x6010d093), unknown(0x6010d093));
        // sraiw x1, x1, 32
        assert_eq!(decode(0x4200d09b), unknown(0x4200d09b));
        // slliw x1, x1, 31 is still fine
        assert_eq!(decode(0x01f0909b), Ok(expected(Opcode::SLLIW, RA, RA, ZERO, 31)));
    }

    #[test]
    fn instruction_s() {
        // sd x15, -20(x8)
        assert_eq!(decode(0xfef43623), Ok(expected(Opcode::SD, ZERO, S0, A5, -20)));
        // sb x1, 2047(x2)
        assert_eq!(decode(0x7e110fa3), Ok(expected(Opcode::SB, ZERO, SP, RA, 2047)));
    }

    #[test]
    fn instruction_b() {
        // beq x1, x2, 8
        assert_eq!(decode(0x00208463), Ok(expected(Opcode::BEQ, ZERO, RA, SP, 8)));
        // bge x10, x11, -16
        assert_eq!(decode(0xfeb558e3), Ok(expected(Opcode::BGE, ZERO, A0, A1, -16)));
        // bltu x3, x4, 4094
        assert_eq!(decode(0x7e41efe3), Ok(expected(Opcode::BLTU, ZERO, GP, TP, 4094)));
        // bne x0, x0, -4096
        assert_eq!(decode(0x80001063), Ok(expected(Opcode::BNE, ZERO, ZERO, ZERO, -4096)));
    }

    #[test]
    fn instruction_u() {
        // lui x1, 0x32
        assert_eq!(decode(0x000320b7), Ok(expected(Opcode::LUI, RA, ZERO, ZERO, 0x32000)));
        // lui x7, 0x80000
        assert_eq!(
            decode(0x800003b7),
            Ok(expected(Opcode::LUI, T2, ZERO, ZERO, 0xffff_ffff_8000_0000_u64 as i64))
        );
        // auipc x3, 0xfffff
        assert_eq!(decode(0xfffff197), Ok(expected(Opcode::AUIPC, GP, ZERO, ZERO, -4096)));
    }

    #[test]
    fn instruction_j() {
        // jal x1, 4
        assert_eq!(decode(0x004000ef), Ok(expected(Opcode::JAL, RA, ZERO, ZERO, 4)));
        // jal x0, -8
        assert_eq!(decode(0xff9ff06f), Ok(expected(Opcode::JAL, ZERO, ZERO, ZERO, -8)));
        // jal x1, 1048574
        assert_eq!(decode(0x7ffff0ef), Ok(expected(Opcode::JAL, RA, ZERO, ZERO, 1048574)));
    }

    #[test]
    fn unknown_instruction() {
        let unknown = |instruction| Err(DecodeError::UnknownInstruction { instruction });

        // All zeroes is a defined illegal instruction.
        assert_eq!(decode(0x0000_0000), unknown(0x0000_0000));
        // ebreak
        assert_eq!(decode(0x0010_0073), unknown(0x0010_0073));
        // mul x1, x2, x3
        assert_eq!(decode(0x023100b3), unknown(0x023100b3));
        // compressed c.nop
        assert_eq!(decode(0x0000_0001), unknown(0x0000_0001));
        // load with funct3 = 0b111
        assert_eq!(decode(0x0000_7003), unknown(0x0000_7003));
    }

    #[test]
    fn match_keys() {
        assert_eq!(match_key(0x003100b3), 0x33);
        assert_eq!(match_key(0x43f5d513), 0x5013);
        assert_eq!(match_key(0x7d008113), 0x13);
        assert_eq!(match_key(0x000320b7), 0x37);
    }
}
