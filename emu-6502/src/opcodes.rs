use crate::cpu_6502::opcodes_jump::*;
use crate::cpu_6502::opcodes_logical::*;
use crate::cpu_6502::opcodes_move::*;
use crate::cpu_6502::Cpu6502;
use crate::cpu_6502::{CARRY, DECIMAL, IRQ, OVERFLOW, SIGN, ZERO};
use crate::cpu_6502::{REG_A, REG_SP, REG_X, REG_Y};
use crate::policy::Policy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Not an addressing mode: marks undefined opcode bytes in the tables.
    Bad = 0,
    None = 1,
    Acc = 2,
    Imm = 3,
    Rel = 4,
    Zp = 5,
    Zpx = 6,
    Zpy = 7,
    Indx = 8,
    Indy = 9,
    Ind = 10,
    Abs = 11,
    Absx = 12,
    Absy = 13,
}

impl Mode {
    /// How many bytes follow the opcode byte.
    pub fn operand_bytes(self) -> u16 {
        match self {
            Mode::Bad | Mode::None | Mode::Acc => 0,
            Mode::Imm | Mode::Rel | Mode::Zp | Mode::Zpx | Mode::Zpy | Mode::Indx | Mode::Indy => 1,
            Mode::Ind | Mode::Abs | Mode::Absx | Mode::Absy => 2,
        }
    }
}

// Const mirrors of the modes, for the handlers' const generic parameters.
pub const ACC: u8 = Mode::Acc as u8;
pub const IMM: u8 = Mode::Imm as u8;
pub const REL: u8 = Mode::Rel as u8;
pub const ZP: u8 = Mode::Zp as u8;
pub const ZPX: u8 = Mode::Zpx as u8;
pub const ZPY: u8 = Mode::Zpy as u8;
pub const INDX: u8 = Mode::Indx as u8;
pub const INDY: u8 = Mode::Indy as u8;
pub const IND: u8 = Mode::Ind as u8;
pub const ABS: u8 = Mode::Abs as u8;
pub const ABSX: u8 = Mode::Absx as u8;
pub const ABSY: u8 = Mode::Absy as u8;

pub type OpFn<P> = fn(&mut Cpu6502<P>);

/// One populated dispatch-table entry.
pub struct Opcode<P: Policy> {
    pub code: u8,
    pub cycles: u8,
    pub mode: Mode,
    pub op: OpFn<P>,
}

impl<P: Policy> Clone for Opcode<P> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<P: Policy> Copy for Opcode<P> {}

/// One opcode variant of a mnemonic, without the handler. This is the side
/// of the table the assembler and disassembler consume.
#[derive(Debug, Clone, Copy)]
pub struct OpMeta {
    pub code: u8,
    pub cycles: u8,
    pub mode: Mode,
}

pub struct InsMeta {
    pub name: &'static str,
    pub ops: &'static [OpMeta],
}

pub fn find_instruction(name: &str) -> Option<&'static InsMeta> {
    INSTRUCTIONS.iter().find(|ins| ins.name == name)
}

/// The whole instruction set is written down once, here. The macro expands
/// the listing twice: into `INSTRUCTIONS` (metadata for the assembler and
/// disassembler) and into `fill_table` (the generic dispatch-table filler,
/// monomorphized per policy).
///
/// Variant order matters to the assembler: zero-page variants come before
/// their absolute counterparts, so an exact match wins before promotion.
macro_rules! instruction_set {
    ($P:ident; $( $name:literal => [ $( ($code:literal, $cycles:literal, $mode:ident, $op:expr) ),* $(,)? ] ),* $(,)? ) => {
        pub static INSTRUCTIONS: &[InsMeta] = &[
            $( InsMeta {
                name: $name,
                ops: &[ $( OpMeta { code: $code, cycles: $cycles, mode: Mode::$mode } ),* ],
            } ),*
        ];

        fn fill_table<$P: Policy>(table: &mut [Opcode<$P>; 256]) {
            $( $(
                table[$code as usize] = Opcode {
                    code: $code,
                    cycles: $cycles,
                    mode: Mode::$mode,
                    op: $op,
                };
            )* )*
        }
    };
}

#[rustfmt::skip]
instruction_set! { P;
    "nop" => [(0xea, 2, None, nop::<P>)],

    "lda" => [
        (0xa9, 2, Imm,  load::<P, REG_A, IMM>),
        (0xa5, 3, Zp,   load::<P, REG_A, ZP>),
        (0xb5, 4, Zpx,  load::<P, REG_A, ZPX>),
        (0xad, 4, Abs,  load::<P, REG_A, ABS>),
        (0xbd, 4, Absx, load::<P, REG_A, ABSX>),
        (0xb9, 4, Absy, load::<P, REG_A, ABSY>),
        (0xa1, 6, Indx, load::<P, REG_A, INDX>),
        (0xb1, 5, Indy, load::<P, REG_A, INDY>),
    ],

    "ldx" => [
        (0xa2, 2, Imm,  load::<P, REG_X, IMM>),
        (0xa6, 3, Zp,   load::<P, REG_X, ZP>),
        (0xb6, 4, Zpy,  load::<P, REG_X, ZPY>),
        (0xae, 4, Abs,  load::<P, REG_X, ABS>),
        (0xbe, 4, Absy, load::<P, REG_X, ABSY>),
    ],

    "ldy" => [
        (0xa0, 2, Imm,  load::<P, REG_Y, IMM>),
        (0xa4, 3, Zp,   load::<P, REG_Y, ZP>),
        (0xb4, 4, Zpx,  load::<P, REG_Y, ZPX>),
        (0xac, 4, Abs,  load::<P, REG_Y, ABS>),
        (0xbc, 4, Absx, load::<P, REG_Y, ABSX>),
    ],

    "sta" => [
        (0x85, 3, Zp,   store::<P, REG_A, ZP>),
        (0x95, 4, Zpx,  store::<P, REG_A, ZPX>),
        (0x8d, 4, Abs,  store::<P, REG_A, ABS>),
        (0x9d, 5, Absx, store::<P, REG_A, ABSX>),
        (0x99, 5, Absy, store::<P, REG_A, ABSY>),
        (0x81, 6, Indx, store::<P, REG_A, INDX>),
        (0x91, 6, Indy, store::<P, REG_A, INDY>),
    ],

    "stx" => [
        (0x86, 3, Zp,  store::<P, REG_X, ZP>),
        (0x96, 4, Zpy, store::<P, REG_X, ZPY>),
        (0x8e, 4, Abs, store::<P, REG_X, ABS>),
    ],

    "sty" => [
        (0x84, 3, Zp,  store::<P, REG_Y, ZP>),
        (0x94, 4, Zpx, store::<P, REG_Y, ZPX>),
        (0x8c, 4, Abs, store::<P, REG_Y, ABS>),
    ],

    "dec" => [
        (0xc6, 5, Zp,   inc::<P, ZP, -1>),
        (0xd6, 6, Zpx,  inc::<P, ZPX, -1>),
        (0xce, 6, Abs,  inc::<P, ABS, -1>),
        (0xde, 7, Absx, inc::<P, ABSX, -1>),
    ],

    "inc" => [
        (0xe6, 5, Zp,   inc::<P, ZP, 1>),
        (0xf6, 6, Zpx,  inc::<P, ZPX, 1>),
        (0xee, 6, Abs,  inc::<P, ABS, 1>),
        (0xfe, 7, Absx, inc::<P, ABSX, 1>),
    ],

    "tax" => [(0xaa, 2, None, transfer::<P, REG_A, REG_X>)],
    "txa" => [(0x8a, 2, None, transfer::<P, REG_X, REG_A>)],
    "tay" => [(0xa8, 2, None, transfer::<P, REG_A, REG_Y>)],
    "tya" => [(0x98, 2, None, transfer::<P, REG_Y, REG_A>)],
    "txs" => [(0x9a, 2, None, transfer::<P, REG_X, REG_SP>)],
    "tsx" => [(0xba, 2, None, transfer::<P, REG_SP, REG_X>)],

    "dex" => [(0xca, 2, None, inc_reg::<P, REG_X, -1>)],
    "inx" => [(0xe8, 2, None, inc_reg::<P, REG_X, 1>)],
    "dey" => [(0x88, 2, None, inc_reg::<P, REG_Y, -1>)],
    "iny" => [(0xc8, 2, None, inc_reg::<P, REG_Y, 1>)],

    "pha" => [(0x48, 3, None, pha::<P>)],
    "pla" => [(0x68, 4, None, pla::<P>)],
    "php" => [(0x08, 3, None, php::<P>)],
    "plp" => [(0x28, 4, None, plp::<P>)],

    "bcc" => [(0x90, 2, Rel, branch::<P, CARRY, false>)],
    "bcs" => [(0xb0, 2, Rel, branch::<P, CARRY, true>)],
    "bne" => [(0xd0, 2, Rel, branch::<P, ZERO, false>)],
    "beq" => [(0xf0, 2, Rel, branch::<P, ZERO, true>)],
    "bpl" => [(0x10, 2, Rel, branch::<P, SIGN, false>)],
    "bmi" => [(0x30, 2, Rel, branch::<P, SIGN, true>)],
    "bvc" => [(0x50, 2, Rel, branch::<P, OVERFLOW, false>)],
    "bvs" => [(0x70, 2, Rel, branch::<P, OVERFLOW, true>)],

    "adc" => [
        (0x69, 2, Imm,  adc::<P, IMM>),
        (0x65, 3, Zp,   adc::<P, ZP>),
        (0x75, 4, Zpx,  adc::<P, ZPX>),
        (0x6d, 4, Abs,  adc::<P, ABS>),
        (0x7d, 4, Absx, adc::<P, ABSX>),
        (0x79, 4, Absy, adc::<P, ABSY>),
        (0x61, 6, Indx, adc::<P, INDX>),
        (0x71, 5, Indy, adc::<P, INDY>),
    ],

    "sbc" => [
        (0xe9, 2, Imm,  sbc::<P, IMM>),
        (0xe5, 3, Zp,   sbc::<P, ZP>),
        (0xf5, 4, Zpx,  sbc::<P, ZPX>),
        (0xed, 4, Abs,  sbc::<P, ABS>),
        (0xfd, 4, Absx, sbc::<P, ABSX>),
        (0xf9, 4, Absy, sbc::<P, ABSY>),
        (0xe1, 6, Indx, sbc::<P, INDX>),
        (0xf1, 5, Indy, sbc::<P, INDY>),
    ],

    "cmp" => [
        (0xc9, 2, Imm,  cmp::<P, REG_A, IMM>),
        (0xc5, 3, Zp,   cmp::<P, REG_A, ZP>),
        (0xd5, 4, Zpx,  cmp::<P, REG_A, ZPX>),
        (0xcd, 4, Abs,  cmp::<P, REG_A, ABS>),
        (0xdd, 4, Absx, cmp::<P, REG_A, ABSX>),
        (0xd9, 4, Absy, cmp::<P, REG_A, ABSY>),
        (0xc1, 6, Indx, cmp::<P, REG_A, INDX>),
        (0xd1, 5, Indy, cmp::<P, REG_A, INDY>),
    ],

    "cpx" => [
        (0xe0, 2, Imm, cmp::<P, REG_X, IMM>),
        (0xe4, 3, Zp,  cmp::<P, REG_X, ZP>),
        (0xec, 4, Abs, cmp::<P, REG_X, ABS>),
    ],

    "cpy" => [
        (0xc0, 2, Imm, cmp::<P, REG_Y, IMM>),
        (0xc4, 3, Zp,  cmp::<P, REG_Y, ZP>),
        (0xcc, 4, Abs, cmp::<P, REG_Y, ABS>),
    ],

    "and" => [
        (0x29, 2, Imm,  and::<P, IMM>),
        (0x25, 3, Zp,   and::<P, ZP>),
        (0x35, 4, Zpx,  and::<P, ZPX>),
        (0x2d, 4, Abs,  and::<P, ABS>),
        (0x3d, 4, Absx, and::<P, ABSX>),
        (0x39, 4, Absy, and::<P, ABSY>),
        (0x21, 6, Indx, and::<P, INDX>),
        (0x31, 5, Indy, and::<P, INDY>),
    ],

    "eor" => [
        (0x49, 2, Imm,  eor::<P, IMM>),
        (0x45, 3, Zp,   eor::<P, ZP>),
        (0x55, 4, Zpx,  eor::<P, ZPX>),
        (0x4d, 4, Abs,  eor::<P, ABS>),
        (0x5d, 4, Absx, eor::<P, ABSX>),
        (0x59, 4, Absy, eor::<P, ABSY>),
        (0x41, 6, Indx, eor::<P, INDX>),
        (0x51, 5, Indy, eor::<P, INDY>),
    ],

    "ora" => [
        (0x09, 2, Imm,  ora::<P, IMM>),
        (0x05, 3, Zp,   ora::<P, ZP>),
        (0x15, 4, Zpx,  ora::<P, ZPX>),
        (0x0d, 4, Abs,  ora::<P, ABS>),
        (0x1d, 4, Absx, ora::<P, ABSX>),
        (0x19, 4, Absy, ora::<P, ABSY>),
        (0x01, 6, Indx, ora::<P, INDX>),
        (0x11, 5, Indy, ora::<P, INDY>),
    ],

    "sec" => [(0x38, 2, None, set_flag::<P, CARRY, true>)],
    "clc" => [(0x18, 2, None, set_flag::<P, CARRY, false>)],
    "sei" => [(0x78, 2, None, set_flag::<P, IRQ, true>)],
    "cli" => [(0x58, 2, None, set_flag::<P, IRQ, false>)],
    "sed" => [(0xf8, 2, None, set_flag::<P, DECIMAL, true>)],
    "cld" => [(0xd8, 2, None, set_flag::<P, DECIMAL, false>)],
    "clv" => [(0xb8, 2, None, set_flag::<P, OVERFLOW, false>)],

    "lsr" => [
        (0x4a, 2, Acc,  lsr::<P, ACC>),
        (0x46, 5, Zp,   lsr::<P, ZP>),
        (0x56, 6, Zpx,  lsr::<P, ZPX>),
        (0x4e, 6, Abs,  lsr::<P, ABS>),
        (0x5e, 7, Absx, lsr::<P, ABSX>),
    ],

    "asl" => [
        (0x0a, 2, Acc,  asl::<P, ACC>),
        (0x06, 5, Zp,   asl::<P, ZP>),
        (0x16, 6, Zpx,  asl::<P, ZPX>),
        (0x0e, 6, Abs,  asl::<P, ABS>),
        (0x1e, 7, Absx, asl::<P, ABSX>),
    ],

    "ror" => [
        (0x6a, 2, Acc,  ror::<P, ACC>),
        (0x66, 5, Zp,   ror::<P, ZP>),
        (0x76, 6, Zpx,  ror::<P, ZPX>),
        (0x6e, 6, Abs,  ror::<P, ABS>),
        (0x7e, 7, Absx, ror::<P, ABSX>),
    ],

    "rol" => [
        (0x2a, 2, Acc,  rol::<P, ACC>),
        (0x26, 5, Zp,   rol::<P, ZP>),
        (0x36, 6, Zpx,  rol::<P, ZPX>),
        (0x2e, 6, Abs,  rol::<P, ABS>),
        (0x3e, 7, Absx, rol::<P, ABSX>),
    ],

    "bit" => [
        (0x24, 3, Zp,  bit::<P, ZP>),
        (0x2c, 4, Abs, bit::<P, ABS>),
    ],

    "rti" => [(0x40, 6, None, rti::<P>)],
    "brk" => [(0x00, 7, None, brk::<P>)],
    "rts" => [(0x60, 6, None, rts::<P>)],

    "jmp" => [
        (0x4c, 3, Abs, jmp_abs::<P>),
        (0x6c, 5, Ind, jmp_ind::<P>),
    ],

    "jsr" => [(0x20, 6, Abs, jsr::<P>)],
}

/// Replace the ADC/SBC handlers with their decimal-mode counterparts. This
/// is the only difference between the two dispatch tables.
#[rustfmt::skip]
fn patch_decimal<P: Policy>(table: &mut [Opcode<P>; 256]) {
    table[0x69].op = adc_bcd::<P, IMM>;
    table[0x65].op = adc_bcd::<P, ZP>;
    table[0x75].op = adc_bcd::<P, ZPX>;
    table[0x6d].op = adc_bcd::<P, ABS>;
    table[0x7d].op = adc_bcd::<P, ABSX>;
    table[0x79].op = adc_bcd::<P, ABSY>;
    table[0x61].op = adc_bcd::<P, INDX>;
    table[0x71].op = adc_bcd::<P, INDY>;
    table[0xe9].op = sbc_bcd::<P, IMM>;
    table[0xe5].op = sbc_bcd::<P, ZP>;
    table[0xf5].op = sbc_bcd::<P, ZPX>;
    table[0xed].op = sbc_bcd::<P, ABS>;
    table[0xfd].op = sbc_bcd::<P, ABSX>;
    table[0xf9].op = sbc_bcd::<P, ABSY>;
    table[0xe1].op = sbc_bcd::<P, INDX>;
    table[0xf1].op = sbc_bcd::<P, INDY>;
}

/// Build the binary and decimal dispatch tables for a policy. Every entry
/// is populated: bytes outside the documented set get the 2-cycle sink.
pub fn dispatch_tables<P: Policy>() -> (Box<[Opcode<P>; 256]>, Box<[Opcode<P>; 256]>) {
    let sink = Opcode {
        code: 0,
        cycles: 2,
        mode: Mode::Bad,
        op: undefined::<P> as OpFn<P>,
    };
    let mut jn = Box::new([sink; 256]);
    for (code, op) in jn.iter_mut().enumerate() {
        op.code = code as u8;
    }
    fill_table(&mut jn);
    let mut jd = jn.clone();
    patch_decimal(&mut jd);
    (jn, jd)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn every_documented_opcode_is_in_the_table() {
        let (jn, jd) = dispatch_tables::<crate::policy::DefaultPolicy>();
        let mut documented = 0;
        for ins in INSTRUCTIONS {
            for op in ins.ops {
                documented += 1;
                let entry = jn[op.code as usize];
                assert_eq!(entry.code, op.code);
                assert_eq!(entry.cycles, op.cycles, "cycles for {}", ins.name);
                assert_eq!(entry.mode, op.mode, "mode for {}", ins.name);
                assert_eq!(jd[op.code as usize].cycles, op.cycles);
            }
        }
        // The official instruction set.
        assert_eq!(documented, 151);
        let undefined = jn.iter().filter(|op| op.mode == Mode::Bad).count();
        assert_eq!(undefined, 256 - 151);
    }

    #[test]
    fn operand_sizes_follow_the_mode() {
        assert_eq!(Mode::None.operand_bytes(), 0);
        assert_eq!(Mode::Acc.operand_bytes(), 0);
        assert_eq!(Mode::Imm.operand_bytes(), 1);
        assert_eq!(Mode::Indy.operand_bytes(), 1);
        assert_eq!(Mode::Abs.operand_bytes(), 2);
        assert_eq!(Mode::Ind.operand_bytes(), 2);
    }
}
