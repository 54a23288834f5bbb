use crate::{
    basic_block::{BasicBlock, BasicBlockCache},
    decoder::DecodeError,
    hart::Hart,
    isa::{Continuation, Instruction, Opcode},
    mmu::MMUError,
};
use thiserror::Error;
use tracing::{debug, trace};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ExecutionError {
    #[error("Failed to decode the instruction at '0x{address:0X}'")]
    Decode {
        address: u64,
        #[source]
        source: DecodeError,
    },
    #[error("Failed to fetch the instruction at '0x{address:0X}'")]
    Fetch {
        address: u64,
        #[source]
        source: MMUError,
    },
    #[error(transparent)]
    MMU(#[from] MMUError),
    #[error("Block ran out of instructions at '0x{address:0X}'")]
    UnterminatedBlock { address: u64 },
    #[error("Executed an empty block slot")]
    UnsetSlot,
}

type Semantics = Result<(), ExecutionError>;

#[inline(always)]
fn address(hart: &Hart, instruction: &Instruction) -> u64 {
    hart.reg(instruction.rs1).wrapping_add(instruction.imm)
}

#[inline(always)]
fn branch(hart: &mut Hart, instruction: &Instruction, taken: bool) -> Semantics {
    if taken {
        hart.set_pc_next(hart.pc().wrapping_add(instruction.imm));
    }

    Ok(())
}

/// Results of 32-bit operations are sign-extended into the register.
#[inline(always)]
const fn word(value: u32) -> u64 {
    value as i32 as i64 as u64
}

fn lui(hart: &mut Hart, instruction: &Instruction) -> Semantics {
    hart.set_reg(instruction.rd, instruction.imm);

    Ok(())
}

fn auipc(hart: &mut Hart, instruction: &Instruction) -> Semantics {
    hart.set_reg(instruction.rd, hart.pc().wrapping_add(instruction.imm));

    Ok(())
}

fn jal(hart: &mut Hart, instruction: &Instruction) -> Semantics {
    let link = hart.pc_next();

    hart.set_pc_next(hart.pc().wrapping_add(instruction.imm));
    hart.set_reg(instruction.rd, link);

    Ok(())
}

fn jalr(hart: &mut Hart, instruction: &Instruction) -> Semantics {
    let link = hart.pc_next();
    let target = address(hart, instruction) & !1;

    hart.set_pc_next(target);
    hart.set_reg(instruction.rd, link);

    Ok(())
}

fn beq(hart: &mut Hart, instruction: &Instruction) -> Semantics {
    let taken = hart.reg(instruction.rs1) == hart.reg(instruction.rs2);

    branch(hart, instruction, taken)
}

fn bne(hart: &mut Hart, instruction: &Instruction) -> Semantics {
    let taken = hart.reg(instruction.rs1) != hart.reg(instruction.rs2);

    branch(hart, instruction, taken)
}

fn blt(hart: &mut Hart, instruction: &Instruction) -> Semantics {
    let taken = (hart.reg(instruction.rs1) as i64) < (hart.reg(instruction.rs2) as i64);

    branch(hart, instruction, taken)
}

fn bge(hart: &mut Hart, instruction: &Instruction) -> Semantics {
    let taken = (hart.reg(instruction.rs1) as i64) >= (hart.reg(instruction.rs2) as i64);

    branch(hart, instruction, taken)
}

fn bltu(hart: &mut Hart, instruction: &Instruction) -> Semantics {
    let taken = hart.reg(instruction.rs1) < hart.reg(instruction.rs2);

    branch(hart, instruction, taken)
}

fn bgeu(hart: &mut Hart, instruction: &Instruction) -> Semantics {
    let taken = hart.reg(instruction.rs1) >= hart.reg(instruction.rs2);

    branch(hart, instruction, taken)
}

fn lb(hart: &mut Hart, instruction: &Instruction) -> Semantics {
    let value = hart.load_u8(address(hart, instruction))?;
    hart.set_reg(instruction.rd, value as i8 as i64 as u64);

    Ok(())
}

fn lh(hart: &mut Hart, instruction: &Instruction) -> Semantics {
    let value = hart.load_u16(address(hart, instruction))?;
    hart.set_reg(instruction.rd, value as i16 as i64 as u64);

    Ok(())
}

fn lw(hart: &mut Hart, instruction: &Instruction) -> Semantics {
    let value = hart.load_u32(address(hart, instruction))?;
    hart.set_reg(instruction.rd, word(value));

    Ok(())
}

fn ld(hart: &mut Hart, instruction: &Instruction) -> Semantics {
    let value = hart.load_u64(address(hart, instruction))?;
    hart.set_reg(instruction.rd, value);

    Ok(())
}

fn lbu(hart: &mut Hart, instruction: &Instruction) -> Semantics {
    let value = hart.load_u8(address(hart, instruction))?;
    hart.set_reg(instruction.rd, value as u64);

    Ok(())
}

fn lhu(hart: &mut Hart, instruction: &Instruction) -> Semantics {
    let value = hart.load_u16(address(hart, instruction))?;
    hart.set_reg(instruction.rd, value as u64);

    Ok(())
}

fn lwu(hart: &mut Hart, instruction: &Instruction) -> Semantics {
    let value = hart.load_u32(address(hart, instruction))?;
    hart.set_reg(instruction.rd, value as u64);

    Ok(())
}

fn sb(hart: &mut Hart, instruction: &Instruction) -> Semantics {
    let value = hart.reg(instruction.rs2) as u8;

    Ok(hart.store_u8(value, address(hart, instruction))?)
}

fn sh(hart: &mut Hart, instruction: &Instruction) -> Semantics {
    let value = hart.reg(instruction.rs2) as u16;

    Ok(hart.store_u16(value, address(hart, instruction))?)
}

fn sw(hart: &mut Hart, instruction: &Instruction) -> Semantics {
    let value = hart.reg(instruction.rs2) as u32;

    Ok(hart.store_u32(value, address(hart, instruction))?)
}

fn sd(hart: &mut Hart, instruction: &Instruction) -> Semantics {
    let value = hart.reg(instruction.rs2);

    Ok(hart.store_u64(value, address(hart, instruction))?)
}

/// Register-immediate and register-register arithmetic. The closure receives
/// `rs1` and the second operand (`imm` or `rs2`).
macro_rules! alu {
    ($(imm $name:ident = |$a:ident, $b:ident| $body:expr;)* $(reg $rname:ident = |$ra:ident, $rb:ident| $rbody:expr;)*) => {
        $(
            fn $name(hart: &mut Hart, instruction: &Instruction) -> Semantics {
                let $a = hart.reg(instruction.rs1);
                let $b = instruction.imm;
                hart.set_reg(instruction.rd, $body);

                Ok(())
            }
        )*
        $(
            fn $rname(hart: &mut Hart, instruction: &Instruction) -> Semantics {
                let $ra = hart.reg(instruction.rs1);
                let $rb = hart.reg(instruction.rs2);
                hart.set_reg(instruction.rd, $rbody);

                Ok(())
            }
        )*
    };
}

alu! {
    imm addi = |a, b| a.wrapping_add(b);
    imm slti = |a, b| ((a as i64) < (b as i64)) as u64;
    imm sltiu = |a, b| (a < b) as u64;
    imm xori = |a, b| a ^ b;
    imm ori = |a, b| a | b;
    imm andi = |a, b| a & b;
    imm slli = |a, b| a << (b & 0x3f);
    imm srli = |a, b| a >> (b & 0x3f);
    imm srai = |a, b| ((a as i64) >> (b & 0x3f)) as u64;
    imm addiw = |a, b| word((a as u32).wrapping_add(b as u32));
    imm slliw = |a, b| word((a as u32) << (b & 0x1f));
    imm srliw = |a, b| word((a as u32) >> (b & 0x1f));
    imm sraiw = |a, b| ((a as i32) >> (b & 0x1f)) as i64 as u64;

    reg add = |a, b| a.wrapping_add(b);
    reg sub = |a, b| a.wrapping_sub(b);
    reg sll = |a, b| a << (b & 0x3f);
    reg slt = |a, b| ((a as i64) < (b as i64)) as u64;
    reg sltu = |a, b| (a < b) as u64;
    reg xor = |a, b| a ^ b;
    reg srl = |a, b| a >> (b & 0x3f);
    reg sra = |a, b| ((a as i64) >> (b & 0x3f)) as u64;
    reg or = |a, b| a | b;
    reg and = |a, b| a & b;
    reg addw = |a, b| word((a as u32).wrapping_add(b as u32));
    reg subw = |a, b| word((a as u32).wrapping_sub(b as u32));
    reg sllw = |a, b| word((a as u32) << (b & 0x1f));
    reg srlw = |a, b| word((a as u32) >> (b & 0x1f));
    reg sraw = |a, b| ((a as i32) >> (b & 0x1f)) as i64 as u64;
}

fn fence(_: &mut Hart, _: &Instruction) -> Semantics {
    Ok(())
}

/// Halts the hart: the run loop stops once `pc` reaches zero.
fn ecall(hart: &mut Hart, _: &Instruction) -> Semantics {
    hart.set_pc_next(0);

    Ok(())
}

/// Runs `block[index]`, counting it as retired on top of whatever it chains
/// into.
#[inline(always)]
fn chain(hart: &mut Hart, block: &[Instruction], index: usize) -> Result<u64, ExecutionError> {
    match block.get(index) {
        Some(next) => next.execute(hart, block, index).map(|retired| retired + 1),
        None => Err(ExecutionError::UnterminatedBlock { address: hart.pc() }),
    }
}

/// Generates the threaded handler for every opcode and the table binding
/// them. A handler counts its instruction as retired once the PC commits.
macro_rules! threaded {
    (
        chain { $($chain_opcode:ident => $chain:ident,)* }
        terminal { $($terminal_opcode:ident => $terminal:ident,)* }
    ) => {
        mod handlers {
            use super::ExecutionError;
            use crate::{hart::Hart, isa::Instruction};

            $(
                pub fn $chain(
                    hart: &mut Hart,
                    block: &[Instruction],
                    index: usize,
                ) -> Result<u64, ExecutionError> {
                    super::$chain(hart, &block[index])?;
                    hart.advance_pc();
                    hart.retire(1);

                    super::chain(hart, block, index + 1)
                }
            )*

            $(
                pub fn $terminal(
                    hart: &mut Hart,
                    block: &[Instruction],
                    index: usize,
                ) -> Result<u64, ExecutionError> {
                    super::$terminal(hart, &block[index])?;
                    hart.advance_pc();
                    hart.retire(1);

                    Ok(1)
                }
            )*
        }

        /// The handler an instruction with `opcode` is bound to.
        pub fn continuation(opcode: Opcode) -> Continuation {
            match opcode {
                $(Opcode::$chain_opcode => Continuation::Chain(handlers::$chain),)*
                $(Opcode::$terminal_opcode => Continuation::Terminal(handlers::$terminal),)*
                Opcode::BlockEnd => Continuation::Terminal(block_end),
                Opcode::Unset => Continuation::Terminal(unset),
            }
        }
    };
}

threaded! {
    chain {
        LUI => lui,
        AUIPC => auipc,
        LB => lb,
        LH => lh,
        LW => lw,
        LD => ld,
        LBU => lbu,
        LHU => lhu,
        LWU => lwu,
        SB => sb,
        SH => sh,
        SW => sw,
        SD => sd,
        ADDI => addi,
        SLTI => slti,
        SLTIU => sltiu,
        XORI => xori,
        ORI => ori,
        ANDI => andi,
        SLLI => slli,
        SRLI => srli,
        SRAI => srai,
        ADDIW => addiw,
        SLLIW => slliw,
        SRLIW => srliw,
        SRAIW => sraiw,
        ADD => add,
        SUB => sub,
        SLL => sll,
        SLT => slt,
        SLTU => sltu,
        XOR => xor,
        SRL => srl,
        SRA => sra,
        OR => or,
        AND => and,
        ADDW => addw,
        SUBW => subw,
        SLLW => sllw,
        SRLW => srlw,
        SRAW => sraw,
        FENCE => fence,
    }
    terminal {
        JAL => jal,
        JALR => jalr,
        BEQ => beq,
        BNE => bne,
        BLT => blt,
        BGE => bge,
        BLTU => bltu,
        BGEU => bgeu,
        ECALL => ecall,
    }
}

/// Closes a block that hit the length cap. The instruction before it has
/// already moved `pc` to the first undecoded word.
fn block_end(_: &mut Hart, _: &[Instruction], _: usize) -> Result<u64, ExecutionError> {
    Ok(0)
}

pub fn unset(_: &mut Hart, _: &[Instruction], _: usize) -> Result<u64, ExecutionError> {
    Err(ExecutionError::UnsetSlot)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Running,
    Halted,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionStats {
    pub blocks: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub instructions: u64,
}

#[derive(Debug, Clone, Default)]
pub struct Executor {
    cache: BasicBlockCache,
    stats: ExecutionStats,
}

impl Executor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> ExecutionStats {
        self.stats
    }

    /// Drops every cached block, e.g. after code was written to memory.
    pub fn flush(&mut self) {
        self.cache.flush();
    }

    /// Runs the block at the current PC through its threaded handlers and
    /// returns how many instructions retired. The hart's own counter is
    /// bumped as each one retires.
    #[inline(always)]
    pub fn execute_block(hart: &mut Hart, block: &BasicBlock) -> Result<u64, ExecutionError> {
        let instructions = block.instructions();

        match instructions.first() {
            Some(first) => first.execute(hart, instructions, 0),
            None => Err(ExecutionError::UnsetSlot),
        }
    }

    /// Executes one block, rebuilding it first if its cache slot is stale.
    pub fn step(&mut self, hart: &mut Hart) -> Result<State, ExecutionError> {
        let pc = hart.pc();

        if pc == 0 {
            return Ok(State::Halted);
        }

        let block = self.cache.find(pc);

        if block.address() == pc && !block.is_empty() {
            self.stats.cache_hits += 1;
        } else {
            self.stats.cache_misses += 1;
            debug!("Rebuilding block at 0x{pc:x}");

            block.update(hart)?;
        }

        let before = hart.retired();
        let result = Self::execute_block(hart, block);

        // Instructions ahead of a fault stay retired.
        self.stats.instructions += hart.retired() - before;

        let retired = result?;

        trace!(retired, "Executed block at 0x{pc:x}, next 0x{:x}", hart.pc());

        self.stats.blocks += 1;

        Ok(State::Running)
    }

    /// Steps until the hart halts and returns the number of instructions
    /// this executor retired.
    pub fn run(&mut self, hart: &mut Hart) -> Result<u64, ExecutionError> {
        while self.step(hart)? == State::Running {}

        debug!(
            instructions = self.stats.instructions,
            blocks = self.stats.blocks,
            cache_hits = self.stats.cache_hits,
            cache_misses = self.stats.cache_misses,
            "Hart halted"
        );

        Ok(self.stats.instructions)
    }
}

/// Runs `hart` to completion with caches scoped to this run.
pub fn run(hart: &mut Hart) -> Result<u64, ExecutionError> {
    Executor::new().run(hart)
}
