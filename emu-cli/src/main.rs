use std::fs;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::time::Instant;

use clap::Parser;
use colored::*;

use emu_6502::asm::Assembler;
use emu_6502::constants::{DEFAULT_ORG, DEFAULT_RUN_BUDGET};
use emu_6502::cpu_6502::Cpu6502;
use emu_6502::monitor::{Console, Monitor};
use emu_6502::opcodes::INSTRUCTIONS;
use emu_6502::policy::{DebugPolicy, DefaultPolicy, Policy};

#[derive(Parser)]
#[command(name = "emu6502", about = "A cycle-counted 6502 emulator with an assembler and monitor")]
struct Cli {
    /// List the dispatch entries while checking opcodes
    #[arg(long)]
    disassemble: bool,

    /// Check all opcodes against the dispatch tables
    #[arg(short = 'O', long)]
    check_opcodes: bool,

    /// Run the built-in benchmarks
    #[arg(short = 'B', long)]
    benchmarks: bool,

    /// Run the full 6502 validation binary (6502test.bin)
    #[arg(short = 'F', long)]
    full_test: bool,

    /// Jump into the interactive monitor
    #[arg(short = 'm', long)]
    monitor: bool,

    /// Assembly file to compile
    asmfile: Option<PathBuf>,
}

/// Stops the run when the program stops making progress. The validation
/// ROM loops in place on a failed test, which is exactly a repeated PC.
#[derive(Default)]
struct CheckPolicy {
    last_pc: Option<u16>,
    stalled: bool,
}

impl Policy for CheckPolicy {
    fn each_op(&mut self, m: &mut Cpu6502<Self>) -> bool {
        if self.last_pc == Some(m.pc) {
            self.stalled = true;
            let (a, x, y, sr, sp, pc) = m.regs();
            println!(
                "{}",
                format!(
                    "STALL @ {:04x} A {:02x} X {:02x} Y {:02x} SR {:02x} SP {:02x}",
                    pc, a, x, y, sr, sp
                )
                .red()
            );
            for i in 0..=255u16 {
                print!("{:02x} ", m.read_ram(0x0100 + i));
            }
            println!();
            return true;
        }
        self.last_pc = Some(m.pc);
        false
    }
}

struct StdioConsole;

impl Console for StdioConsole {
    fn read_line(&mut self, prompt: &str) -> Option<String> {
        print!("{}", prompt);
        io::stdout().flush().ok();
        let mut line = String::new();
        match io::stdin().lock().read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line.trim_end().to_string()),
        }
    }

    fn write(&mut self, text: &str) {
        print!("{}", text);
        io::stdout().flush().ok();
    }
}

fn check_opcodes(disassemble: bool) {
    let m = Cpu6502::<DefaultPolicy>::new();
    let mut count = 0;
    let mut mismatches = 0;
    for ins in INSTRUCTIONS {
        for op in ins.ops {
            count += 1;
            if disassemble {
                println!(
                    "{:02x}  {}  {:?}  {} cycles",
                    op.code, ins.name, op.mode, op.cycles
                );
            }
            if m.op_mode(op.code) != op.mode || m.op_name(op.code) != ins.name {
                mismatches += 1;
                println!("{}", format!("MISMATCH at {:02x} ({})", op.code, ins.name).red());
            }
        }
    }
    println!(
        "### {} opcodes checked, {} undefined bytes, {} mismatches",
        count,
        256 - count,
        mismatches
    );
}

#[rustfmt::skip]
const SORT_CODE: [u8; 40] = [
    0xa0, 0x00, 0x84, 0x32, 0xb1, 0x30, 0xaa, 0xc8,
    0xca, 0xb1, 0x30, 0xc8, 0xd1, 0x30, 0x90, 0x10,
    0xf0, 0x0e, 0x48, 0xb1, 0x30, 0x88, 0x91, 0x30,
    0x68, 0xc8, 0x91, 0x30, 0xa9, 0xff, 0x85, 0x32,
    0xca, 0xd0, 0xe6, 0x24, 0x32, 0x30, 0xd9, 0x60,
];

#[rustfmt::skip]
const SORT_DATA: [u8; 39] = [
    19, 73, 2, 54, 97, 21, 45, 66, 13, 139, 56, 220, 50,
    30, 20, 67, 111, 109, 175, 4, 66, 100, 19, 73, 2, 54,
    97, 21, 45, 66, 13, 139, 56, 220, 50, 30, 20, 67, 111,
];

#[rustfmt::skip]
const WEEK_CODE: [u8; 55] = [
    0xa0, 0x74, 0xa2, 0x0a, 0xa9, 0x07, 0x20, 0x0a,
    0x10, 0x60, 0xe0, 0x03, 0xb0, 0x01, 0x88, 0x49,
    0x7f, 0xc0, 0xc8, 0x7d, 0x2a, 0x10, 0x85, 0x06,
    0x98, 0x20, 0x26, 0x10, 0xe5, 0x06, 0x85, 0x06,
    0x98, 0x4a, 0x4a, 0x18, 0x65, 0x06, 0x69, 0x07,
    0x90, 0xfc, 0x60, 0x01, 0x05, 0x06, 0x03, 0x01,
    0x05, 0x03, 0x00, 0x04, 0x02, 0x06, 0x04,
];

fn run_benchmarks() {
    // The sort inner loop, reloaded with scrambled data every iteration.
    let mut m = Cpu6502::<DefaultPolicy>::new();
    m.write_ram(0x1000, &SORT_CODE);
    m.write_ram(0x0030, &[0x00, 0x20]);
    let iterations = 2000u32;
    let mut cycles = 0u64;
    let started = Instant::now();
    for _ in 0..iterations {
        m.write_ram(0x2000, &[SORT_DATA.len() as u8]);
        m.write_ram(0x2001, &SORT_DATA);
        m.pc = 0x1000;
        let before = m.cycles;
        m.run(5_000_000);
        cycles += m.cycles - before;
    }
    report_benchmark("sort", cycles, started);

    // The weekday lookup, dominated by subroutine calls and table math.
    let mut m = Cpu6502::<DefaultPolicy>::new();
    m.write_ram(0x1000, &WEEK_CODE);
    let mut cycles = 0u64;
    let started = Instant::now();
    for _ in 0..iterations {
        m.pc = 0x1000;
        let before = m.cycles;
        m.run(5000);
        cycles += m.cycles - before;
    }
    report_benchmark("weekday", cycles, started);
}

fn report_benchmark(name: &str, cycles: u64, started: Instant) {
    let elapsed = started.elapsed().as_secs_f64();
    println!(
        "{:8} {:>12} cycles in {:.3}s, {:.1} Mcycles/s",
        name,
        cycles,
        elapsed,
        cycles as f64 / elapsed / 1e6
    );
}

fn full_test() -> Result<(), String> {
    println!("Running full 6502 test...");
    let mut image =
        fs::read("6502test.bin").map_err(|err| format!("6502test.bin: {}", err))?;
    image.resize(0x10000, 0);
    // Patch the success loop into a top-level RTS so stack-wrap termination
    // reports completion.
    image[0x3b91] = 0x60;

    let mut m = Cpu6502::<CheckPolicy>::new();
    m.write_ram(0, &image[..0x10000]);
    m.pc = 0x1000;
    m.run(1_000_000_000);
    if m.policy.stalled {
        return Err("the 6502 validation test stalled".to_string());
    }
    println!("{}", "Done.".green());
    Ok(())
}

/// Assemble a file into a fresh debug machine, install its assertions as
/// breakpoints, and persist the image from the default origin upward.
fn compile(path: &PathBuf) -> Result<Cpu6502<DebugPolicy>, String> {
    let text = fs::read_to_string(path).map_err(|err| format!("{}: {}", path.display(), err))?;
    let mut asm = Assembler::new();
    let out = match asm.assemble(&text) {
        Ok(out) => out,
        Err(parse_error) => {
            eprintln!("{}", parse_error.report());
            return Err(format!("{}", parse_error));
        }
    };

    let mut m = Cpu6502::<DebugPolicy>::new();
    m.write_ram(out.first as u16, out.bytes());
    for assertion in &out.assertions {
        let assertion = assertion.clone();
        m.set_break(assertion.adr, move |m| assertion.check(m));
    }

    if out.end > DEFAULT_ORG as usize {
        fs::write("dump.dat", &out.mem[DEFAULT_ORG as usize..out.end])
            .map_err(|err| format!("dump.dat: {}", err))?;
    }
    Ok(m)
}

fn main() -> Result<(), String> {
    let cli = Cli::parse();

    if cli.check_opcodes {
        check_opcodes(cli.disassemble);
    }
    if cli.benchmarks {
        run_benchmarks();
    }
    if cli.full_test {
        full_test()?;
    }
    if cli.check_opcodes || cli.benchmarks || cli.full_test {
        return Ok(());
    }

    let mut m = match &cli.asmfile {
        Some(path) => compile(path)?,
        None => Cpu6502::new(),
    };

    if cli.monitor {
        Monitor::new(StdioConsole).run(&mut m);
    } else if cli.asmfile.is_some() {
        m.pc = DEFAULT_ORG;
        m.run_debug(DEFAULT_RUN_BUDGET)?;
        let (a, x, y, sr, sp, pc) = m.regs();
        println!(
            "PC {:04x} A {:02x} X {:02x} Y {:02x} SR {:02x} SP {:02x}  ({} cycles)",
            pc, a, x, y, sr, sp, m.cycles
        );
    }
    Ok(())
}
