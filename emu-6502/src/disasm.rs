//! Table-driven disassembler used by the monitor's `d` command and the
//! per-opcode trace.

use crate::cpu_6502::Cpu6502;
use crate::opcodes::Mode;
use crate::policy::Policy;

/// Disassemble the instruction at `org`, reading raw RAM so no I/O callback
/// fires. Returns the text and the number of bytes consumed. Undefined
/// bytes render as `db $xx`.
pub fn disasm<P: Policy>(m: &Cpu6502<P>, org: u16) -> (String, u16) {
    let code = m.read_ram(org);
    let mode = m.op_mode(code);
    if mode == Mode::Bad {
        return (format!("db ${:02x}", code), 1);
    }
    let name = m.op_name(code);

    let operand_bytes = mode.operand_bytes();
    let mut value = 0u16;
    if operand_bytes >= 1 {
        value = m.read_ram(org.wrapping_add(1)) as u16;
    }
    if operand_bytes >= 2 {
        value |= (m.read_ram(org.wrapping_add(2)) as u16) << 8;
    }

    let text = match mode {
        Mode::None => name.to_string(),
        Mode::Acc => format!("{} a", name),
        Mode::Imm => format!("{} #${:02x}", name, value),
        Mode::Rel => {
            let target = org
                .wrapping_add(2)
                .wrapping_add(value as u8 as i8 as u16);
            format!("{} ${:04x}", name, target)
        }
        Mode::Zp => format!("{} ${:02x}", name, value),
        Mode::Zpx => format!("{} ${:02x},x", name, value),
        Mode::Zpy => format!("{} ${:02x},y", name, value),
        Mode::Indx => format!("{} (${:02x},x)", name, value),
        Mode::Indy => format!("{} (${:02x}),y", name, value),
        Mode::Ind => format!("{} (${:04x})", name, value),
        Mode::Abs => format!("{} ${:04x}", name, value),
        Mode::Absx => format!("{} ${:04x},x", name, value),
        Mode::Absy => format!("{} ${:04x},y", name, value),
        Mode::Bad => unreachable!(),
    };
    (text, 1 + operand_bytes)
}
