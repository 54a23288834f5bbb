use anyhow::{bail, Context};
use object::{Architecture, Object, ObjectSegment};
use tracing::debug;
use vm::{hart::Hart, registers::SP};

/// Copies every loadable segment of a RISC-V ELF64 image into the hart's
/// memory and points it at the entry with `sp` set to `stack_pointer`.
pub fn load_elf(hart: &mut Hart, image: &[u8], stack_pointer: u64) -> anyhow::Result<()> {
    let file = object::File::parse(image).context("Failed to parse the ELF image")?;

    if !file.is_64() || file.architecture() != Architecture::Riscv64 {
        bail!(
            "Expected a RISC-V 64-bit ELF image, found {:?}",
            file.architecture()
        );
    }

    if !file.is_little_endian() {
        bail!("Big-endian images are not supported");
    }

    for segment in file.segments() {
        let address = segment.address();
        let data = segment
            .data()
            .with_context(|| format!("Failed to read the segment at 0x{address:x}"))?;

        debug!("Loading {} bytes at 0x{address:x}", data.len());

        hart.memory
            .load(address, data)
            .with_context(|| format!("Segment at 0x{address:x} does not fit in memory"))?;
    }

    let entry = file.entry();

    hart.set_pc(entry);
    hart.set_reg(SP, stack_pointer);

    debug!("Entry point 0x{entry:x}, sp 0x{stack_pointer:x}");

    Ok(())
}
