//! The interactive monitor: a line-oriented command grammar plus the
//! read-eval-print driver. The terminal itself is a collaborator behind the
//! `Console` trait, so tests can script a session and hosts can bring their
//! own line editor.

use std::fs;

use crate::asm::Assembler;
use crate::constants::DEFAULT_RUN_BUDGET;
use crate::cpu_6502::Cpu6502;
use crate::disasm;
use crate::opcodes::find_instruction;
use crate::policy::DebugPolicy;

pub trait Console {
    /// Present the prompt and read one line. None means end of input.
    fn read_line(&mut self, prompt: &str) -> Option<String>;
    fn write(&mut self, text: &str);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `m [addr] [count]` — dump memory.
    Mem {
        adr: Option<u16>,
        count: Option<u16>,
    },
    /// `d [addr] [count]` — disassemble instructions.
    Disasm {
        adr: Option<u16>,
        count: Option<u16>,
    },
    /// `a [addr] <asm>` — assemble one instruction.
    Asm { adr: Option<u16>, text: String },
    /// `af <filename>` — assemble a file.
    AsmFile { path: String },
    /// `r` — print the registers.
    Regs,
    /// `g <addr>` — set the PC and run.
    Go { adr: u16 },
    /// `c` — continue from the current PC.
    Continue,
    /// `trace on|off`.
    Trace { on: bool },
    /// `<symbol> = <expression>`.
    Define { name: String, expr: String },
}

/// Monitor numbers are hexadecimal by default; `$` and `0x` prefixes are
/// tolerated.
fn parse_adr(text: &str) -> Option<u16> {
    let digits = text
        .strip_prefix('$')
        .or_else(|| text.strip_prefix("0x"))
        .unwrap_or(text);
    u16::from_str_radix(digits, 16).ok()
}

pub fn parse_command(line: &str) -> Result<Command, String> {
    let line = line.trim();
    let (head, tail) = match line.find(char::is_whitespace) {
        Some(i) => (&line[..i], line[i..].trim_start()),
        None => (line, ""),
    };

    // A symbol definition is the one command that isn't keyed by its first
    // word.
    if !matches!(head, "m" | "d" | "a" | "af" | "r" | "g" | "c" | "trace") {
        if let Some((name, expr)) = line.split_once('=') {
            let name = name.trim();
            if !name.is_empty() && name.chars().all(|c| c.is_alphanumeric() || c == '_') {
                return Ok(Command::Define {
                    name: name.to_string(),
                    expr: expr.trim().to_string(),
                });
            }
        }
        return Err(format!("unknown command \"{}\"", head));
    }

    let mut args = tail.split_whitespace();
    match head {
        "m" | "d" => {
            let adr = match args.next() {
                Some(token) => Some(parse_adr(token).ok_or(format!("bad address \"{}\"", token))?),
                None => None,
            };
            let count = match args.next() {
                Some(token) => Some(parse_adr(token).ok_or(format!("bad count \"{}\"", token))?),
                None => None,
            };
            if head == "m" {
                Ok(Command::Mem { adr, count })
            } else {
                Ok(Command::Disasm { adr, count })
            }
        }
        "a" => {
            // The first word doubles as an address unless it reads as a
            // mnemonic; `a dec $20` assembles, `a 1000 dec $20` places.
            let (first, rest) = match tail.find(char::is_whitespace) {
                Some(i) => (&tail[..i], tail[i..].trim_start()),
                None => (tail, ""),
            };
            if first.is_empty() {
                return Err("expected an instruction to assemble".to_string());
            }
            if find_instruction(&first.to_lowercase()).is_none() {
                let adr =
                    parse_adr(first).ok_or(format!("bad address \"{}\"", first))?;
                if rest.is_empty() {
                    return Err("expected an instruction to assemble".to_string());
                }
                Ok(Command::Asm {
                    adr: Some(adr),
                    text: rest.to_string(),
                })
            } else {
                Ok(Command::Asm {
                    adr: None,
                    text: tail.to_string(),
                })
            }
        }
        "af" => {
            if tail.is_empty() {
                return Err("expected a filename".to_string());
            }
            Ok(Command::AsmFile {
                path: tail.to_string(),
            })
        }
        "r" => Ok(Command::Regs),
        "g" => {
            let token = args.next().ok_or("expected an address")?;
            let adr = parse_adr(token).ok_or(format!("bad address \"{}\"", token))?;
            Ok(Command::Go { adr })
        }
        "c" => Ok(Command::Continue),
        "trace" => match tail {
            "on" => Ok(Command::Trace { on: true }),
            "off" => Ok(Command::Trace { on: false }),
            other => Err(format!("expected on or off, found \"{}\"", other)),
        },
        _ => unreachable!(),
    }
}

pub struct Monitor<C: Console> {
    console: C,
    asm: Assembler,
    /// The remembered address: `m`/`d` pick up where they left off, and a
    /// bare `a <asm>` continues after the last assembled instruction.
    start: u16,
    count: u16,
}

impl<C: Console> Monitor<C> {
    pub fn new(console: C) -> Monitor<C> {
        Monitor {
            console,
            asm: Assembler::new(),
            start: 0,
            count: 16,
        }
    }

    /// The read-eval-print loop. Returns when the console runs out of
    /// input.
    pub fn run(&mut self, m: &mut Cpu6502<DebugPolicy>) {
        while let Some(line) = self.console.read_line(">>") {
            if line.trim().is_empty() {
                continue;
            }
            match parse_command(&line) {
                Ok(command) => self.exec(m, command),
                Err(_) => self.console.write("?SYNTAX  ERROR\n"),
            }
        }
    }

    pub fn exec(&mut self, m: &mut Cpu6502<DebugPolicy>, command: Command) {
        match command {
            Command::Mem { adr, count } => {
                if let Some(adr) = adr {
                    self.start = adr;
                }
                if let Some(count) = count {
                    self.count = count;
                }
                let mut text = format!("{:04x} : ", self.start);
                for i in 0..self.count {
                    text.push_str(&format!("{:02x} ", m.read_ram(self.start.wrapping_add(i))));
                }
                text.push('\n');
                self.console.write(&text);
                self.start = self.start.wrapping_add(self.count);
            }
            Command::Disasm { adr, count } => {
                if let Some(adr) = adr {
                    self.start = adr;
                }
                if let Some(count) = count {
                    self.count = count;
                }
                for _ in 0..self.count {
                    let (text, len) = disasm::disasm(m, self.start);
                    self.console
                        .write(&format!("{:04x}: {}\n", self.start, text));
                    self.start = self.start.wrapping_add(len);
                }
            }
            Command::Asm { adr, text } => {
                let adr = adr.unwrap_or(self.start);
                match self.asm.assemble_line(adr, &text) {
                    Ok(bytes) => {
                        m.write_ram(adr, &bytes);
                        self.start = adr.wrapping_add(bytes.len() as u16);
                    }
                    Err(message) => {
                        self.console.write(&format!("{}\n", message));
                    }
                }
            }
            Command::AsmFile { path } => match fs::read_to_string(&path) {
                Ok(text) => match self.asm.assemble(&text) {
                    Ok(out) => {
                        m.write_ram(out.first as u16, out.bytes());
                        for assertion in &out.assertions {
                            let assertion = assertion.clone();
                            m.set_break(assertion.adr, move |m| assertion.check(m));
                        }
                        self.console
                            .write(&format!("{} bytes\n", out.end - out.first));
                    }
                    Err(parse_error) => {
                        self.console.write(parse_error.report());
                        self.console.write("\n");
                    }
                },
                Err(err) => {
                    self.console.write(&format!("{}: {}\n", path, err));
                }
            },
            Command::Regs => {
                let (a, x, y, sr, sp, pc) = m.regs();
                self.console.write(&format!(
                    "PC {:04x} A {:02x} X {:02x} Y {:02x} SR {:02x} SP {:02x}\n",
                    pc, a, x, y, sr, sp
                ));
            }
            Command::Go { adr } => {
                m.pc = adr;
                self.continue_run(m);
            }
            Command::Continue => {
                self.continue_run(m);
            }
            Command::Trace { on } => {
                m.policy.trace = on;
            }
            Command::Define { name, expr } => match self.asm.eval(&expr) {
                Ok(value) => self.asm.define(&name, value),
                Err(message) => self.console.write(&format!("{}\n", message)),
            },
        }
    }

    fn continue_run(&mut self, m: &mut Cpu6502<DebugPolicy>) {
        match m.run_debug(DEFAULT_RUN_BUDGET) {
            Ok(_) => {}
            Err(message) => self.console.write(&format!("{}\n", message)),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::VecDeque;

    #[test]
    fn parses_the_command_grammar() {
        assert_eq!(
            parse_command("m 2000 8").unwrap(),
            Command::Mem {
                adr: Some(0x2000),
                count: Some(8)
            }
        );
        assert_eq!(
            parse_command("d").unwrap(),
            Command::Disasm {
                adr: None,
                count: None
            }
        );
        assert_eq!(
            parse_command("a 1000 lda #$42").unwrap(),
            Command::Asm {
                adr: Some(0x1000),
                text: "lda #$42".to_string()
            }
        );
        // `dec` reads as hex, but it's a mnemonic, so no address here.
        assert_eq!(
            parse_command("a dec $20").unwrap(),
            Command::Asm {
                adr: None,
                text: "dec $20".to_string()
            }
        );
        assert_eq!(parse_command("g 1000").unwrap(), Command::Go { adr: 0x1000 });
        assert_eq!(parse_command("c").unwrap(), Command::Continue);
        assert_eq!(parse_command("r").unwrap(), Command::Regs);
        assert_eq!(
            parse_command("trace on").unwrap(),
            Command::Trace { on: true }
        );
        assert_eq!(
            parse_command("screen = $0400").unwrap(),
            Command::Define {
                name: "screen".to_string(),
                expr: "$0400".to_string()
            }
        );
        assert!(parse_command("frobnicate").is_err());
    }

    struct ScriptConsole {
        input: VecDeque<String>,
        output: String,
    }

    impl ScriptConsole {
        fn new(lines: &[&str]) -> ScriptConsole {
            ScriptConsole {
                input: lines.iter().map(|s| s.to_string()).collect(),
                output: String::new(),
            }
        }
    }

    impl Console for ScriptConsole {
        fn read_line(&mut self, _prompt: &str) -> Option<String> {
            self.input.pop_front()
        }
        fn write(&mut self, text: &str) {
            self.output.push_str(text);
        }
    }

    #[test]
    fn scripted_session_assembles_and_runs() {
        let console = ScriptConsole::new(&[
            "a 1000 lda #$42",
            // No address: continues at $1002.
            "a rts",
            "d 1000 2",
            "g 1000",
            "r",
        ]);
        let mut m = Cpu6502::new();
        let mut monitor = Monitor::new(console);
        monitor.run(&mut m);

        let output = &monitor.console.output;
        assert!(output.contains("1000: lda #$42"), "{}", output);
        assert!(output.contains("1002: rts"), "{}", output);
        assert!(
            output.contains("PC 1002 A 42 X 00 Y 00 SR 30 SP ff"),
            "{}",
            output
        );
    }

    #[test]
    fn defined_symbols_reach_the_assembler() {
        let console = ScriptConsole::new(&["screen = $0400", "a 1000 sta screen", "d 1000 1"]);
        let mut m = Cpu6502::new();
        let mut monitor = Monitor::new(console);
        monitor.run(&mut m);
        assert!(
            monitor.console.output.contains("1000: sta $0400"),
            "{}",
            monitor.console.output
        );
    }
}
