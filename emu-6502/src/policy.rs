use colored::*;

use crate::constants::memory_range;
use crate::cpu_6502::Cpu6502;
use crate::disasm;

/// How one class of memory access (PC fetch, data read, data write) reaches
/// the address space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Raw RAM indexing, no indirection. The bank tables are ignored.
    Direct,
    /// Page-table indirection: RAM or ROM pages. I/O sentinel entries fall
    /// through to RAM, so a pure table lookup stays branch-predictable.
    Banked,
    /// Full page-table dispatch, including per-page I/O callbacks.
    Callback,
}

/// The compile-time configuration bundle of a machine. Each policy produces
/// its own monomorphized `Cpu6502`, so the all-`Direct` machine pays nothing
/// for banking or I/O it never uses.
///
/// The per-opcode hook runs before every fetch; returning true stops the
/// current `run` call. Hook state (trace flags, stall detectors) lives in the
/// policy value itself, which the machine owns.
pub trait Policy: Default + Sized {
    const PC_FETCH: Access = Access::Direct;
    const DATA_READ: Access = Access::Direct;
    const DATA_WRITE: Access = Access::Direct;

    /// Always 65536 for a stock 6502.
    const MEM_SIZE: usize = memory_range::MEM_SIZE;

    /// When set, an RTS fetched while SP is 0xFF ends the `run` call instead
    /// of executing. This lets small routines be called top-level.
    const EXIT_ON_STACK_WRAP: bool = true;

    fn each_op(&mut self, _m: &mut Cpu6502<Self>) -> bool {
        false
    }
}

/// Plain flat memory, no I/O, stack-wrap termination. The fast machine.
#[derive(Default)]
pub struct DefaultPolicy;

impl Policy for DefaultPolicy {}

/// Banked data accesses for ROM overlays and bank switching. Opcode fetches
/// stay direct; self-modifying code in ROM regions is not a concern here.
#[derive(Default)]
pub struct BankedPolicy;

impl Policy for BankedPolicy {
    const DATA_READ: Access = Access::Banked;
    const DATA_WRITE: Access = Access::Banked;
}

/// Data accesses consult per-page I/O callbacks, for memory-mapped devices.
#[derive(Default)]
pub struct IoPolicy;

impl Policy for IoPolicy {
    const DATA_READ: Access = Access::Callback;
    const DATA_WRITE: Access = Access::Callback;
}

/// The machine the monitor drives: direct memory plus a per-opcode trace.
#[derive(Default)]
pub struct DebugPolicy {
    pub trace: bool,
}

impl Policy for DebugPolicy {
    fn each_op(&mut self, m: &mut Cpu6502<Self>) -> bool {
        if self.trace {
            let (text, _) = disasm::disasm(m, m.pc);
            let line = format!(
                "{:04x}: {:<12} a={:02x} x={:02x} y={:02x} sp={:02x} sr={:02x}",
                m.pc,
                text,
                m.a,
                m.x,
                m.y,
                m.s,
                m.get_p()
            );
            println!("{}", line.dimmed());
        }
        false
    }
}
