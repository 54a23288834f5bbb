use executor::{ExecutionError, Executor};
use hart::Hart;

pub mod basic_block;
pub mod bits;
pub mod decoder;
pub mod executor;
pub mod hart;
pub mod isa;
pub mod memory;
pub mod mmu;
pub mod pte;
pub mod registers;
pub mod tlb;

#[derive(Debug)]
pub struct VM {
    pub hart: Hart,
    pub executor: Executor,
}

impl VM {
    pub fn new(hart: Hart) -> Self {
        Self {
            hart,
            executor: Executor::new(),
        }
    }

    /// Runs until the hart halts, returning the number of retired instructions.
    pub fn run(&mut self) -> Result<u64, ExecutionError> {
        self.executor.run(&mut self.hart)
    }
}

#[cfg(test)]
mod tests {
    use super::VM;
    use crate::executor::tests::make_hart;
    use hex_literal::hex;

    #[test]
    fn run_to_halt() {
        // addi x1, x0, 5
        // ecall
        let mut vm = VM::new(make_hart(&hex!("00500093 00000073")));

        assert_eq!(vm.run(), Ok(2));
        assert_eq!(vm.executor.stats().blocks, 1);
        assert_eq!(vm.hart.retired(), 2);
    }
}
