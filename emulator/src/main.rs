mod loader;

use std::{num::ParseIntError, path::PathBuf, time::Instant};

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;
use vm::{
    hart::{Hart, HartConfig},
    memory::DEFAULT_MEMORY_SIZE,
    VM,
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogSeverity {
    /// Warnings and errors only.
    Release,
    /// Run summary and block cache statistics.
    Standard,
    /// Every executed block.
    Verbose,
}

impl LogSeverity {
    fn directive(self) -> &'static str {
        match self {
            LogSeverity::Release => "warn",
            LogSeverity::Standard => "info",
            LogSeverity::Verbose => "trace",
        }
    }
}

fn parse_number(value: &str) -> Result<u64, ParseIntError> {
    match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => value.parse(),
    }
}

#[derive(Debug, Parser)]
struct App {
    /// Path to a RISC-V binary file.
    pub bin: PathBuf,

    /// Configure the log level. `RUST_LOG` takes precedence.
    #[arg(long, value_enum, default_value_t = LogSeverity::Standard)]
    pub log_severity: LogSeverity,

    /// Physical memory size in bytes, a multiple of 4096.
    #[arg(long, value_parser = parse_number, default_value_t = DEFAULT_MEMORY_SIZE as u64)]
    pub memory_size: u64,

    /// Initial value of `sp`.
    #[arg(long, value_parser = parse_number, default_value_t = 0x90000)]
    pub stack_pointer: u64,

    /// Print every register once the program halts.
    #[arg(long, default_value_t = false)]
    pub dump_registers: bool,
}

fn init_tracing(severity: LogSeverity) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(severity.directive()));

    tracing_subscriber::fmt()
        .without_time()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    let app = App::parse();

    init_tracing(app.log_severity);

    let image = std::fs::read(&app.bin)
        .with_context(|| format!("Failed to read '{}'", app.bin.display()))?;

    let memory_size = usize::try_from(app.memory_size).context("Memory size does not fit")?;
    let mut hart = Hart::new(HartConfig {
        memory_size,
        ..HartConfig::default()
    })
    .context("Failed to create the hart")?;

    loader::load_elf(&mut hart, &image, app.stack_pointer)?;

    info!("Running '{}'", app.bin.display());

    let mut vm = VM::new(hart);

    let start = Instant::now();
    let result = vm.run();
    let elapsed = start.elapsed().as_secs_f64();

    if app.dump_registers {
        print!("{}", vm.hart.dump_registers());
    }

    let instructions = result.context("Execution failed")?;
    let stats = vm.executor.stats();

    println!("Time: {elapsed:.6} s");
    println!("Instructions: {instructions}");
    println!("IPS: {:.0}", instructions as f64 / elapsed.max(f64::EPSILON));

    info!(
        blocks = stats.blocks,
        cache_hits = stats.cache_hits,
        cache_misses = stats.cache_misses,
        "Block cache"
    );

    Ok(())
}
