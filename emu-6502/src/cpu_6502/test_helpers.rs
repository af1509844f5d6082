use super::Cpu6502;
use crate::asm::Assembler;
use crate::constants::{DEFAULT_ORG, RTS_OPCODE};
use crate::policy::DefaultPolicy;

/// Assemble `text` at the default origin and run it to completion. The
/// program ends at a top-level RTS: either its own, or the one placed just
/// past the last assembled byte.
pub fn run_program(text: &str) -> Cpu6502<DefaultPolicy> {
    let mut asm = Assembler::new();
    let out = match asm.assemble(text) {
        Ok(out) => out,
        Err(parse_error) => panic!("{}", parse_error.report()),
    };
    let mut m = Cpu6502::new();
    m.write_ram(out.first as u16, out.bytes());
    m.write_ram(out.end as u16, &[RTS_OPCODE]);
    m.pc = DEFAULT_ORG;
    m.run(100_000);
    m
}

pub fn assert_register_a(text: &str, value: u8, status: u8) {
    let m = run_program(text);
    if m.a != value {
        panic!(
            "\n{}\nExpected register A to be {:#x} ({:#b}) but it was {:#x} ({:#b})",
            text, value, value, m.a, m.a
        );
    }
    assert_status(&m, status, text);
}

pub fn assert_register_x(text: &str, value: u8, status: u8) {
    let m = run_program(text);
    if m.x != value {
        panic!(
            "\n{}\nExpected register X to be {:#x} ({:#b}) but it was {:#x} ({:#b})",
            text, value, value, m.x, m.x
        );
    }
    assert_status(&m, status, text);
}

pub fn assert_register_y(text: &str, value: u8, status: u8) {
    let m = run_program(text);
    if m.y != value {
        panic!(
            "\n{}\nExpected register Y to be {:#x} ({:#b}) but it was {:#x} ({:#b})",
            text, value, value, m.y, m.y
        );
    }
    assert_status(&m, status, text);
}

pub fn assert_status(m: &Cpu6502<DefaultPolicy>, value: u8, text: &str) {
    if m.get_p() != value {
        panic!(
            "\n{}\nExpected cpu status 0b{:08b} to match 0b{:08b}",
            text,
            m.get_p(),
            value
        );
    }
}

macro_rules! register_a {
    ($name:ident, $text:expr, $a:expr, $p:expr) => {
        #[test]
        fn $name() {
            $crate::cpu_6502::test_helpers::assert_register_a($text, $a, $p);
        }
    };
}

macro_rules! register_x {
    ($name:ident, $text:expr, $x:expr, $p:expr) => {
        #[test]
        fn $name() {
            $crate::cpu_6502::test_helpers::assert_register_x($text, $x, $p);
        }
    };
}

macro_rules! register_y {
    ($name:ident, $text:expr, $y:expr, $p:expr) => {
        #[test]
        fn $name() {
            $crate::cpu_6502::test_helpers::assert_register_y($text, $y, $p);
        }
    };
}

pub(crate) use register_a;
pub(crate) use register_x;
pub(crate) use register_y;
