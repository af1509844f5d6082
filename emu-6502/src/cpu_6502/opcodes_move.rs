//! Data movement: loads, stores, register transfers and the stack pairs.

use super::{Cpu6502, REG_SP};
use crate::policy::Policy;

pub fn load<P: Policy, const REG: u8, const MODE: u8>(m: &mut Cpu6502<P>) {
    let value = m.load_ea::<MODE>();
    m.set_reg::<REG>(value);
    m.set_sz(value);
}

pub fn store<P: Policy, const REG: u8, const MODE: u8>(m: &mut Cpu6502<P>) {
    let value = m.reg::<REG>();
    m.store_ea::<MODE>(value);
}

pub fn transfer<P: Policy, const FROM: u8, const TO: u8>(m: &mut Cpu6502<P>) {
    let value = m.reg::<FROM>();
    m.set_reg::<TO>(value);
    // TXS is the one transfer that leaves the flags alone.
    if TO != REG_SP {
        m.set_sz(value);
    }
}

pub fn pha<P: Policy>(m: &mut Cpu6502<P>) {
    let value = m.a;
    m.push(value);
}

pub fn pla<P: Policy>(m: &mut Cpu6502<P>) {
    let value = m.pull();
    m.a = value;
    m.set_sz(value);
}

pub fn php<P: Policy>(m: &mut Cpu6502<P>) {
    // The pushed copy carries the break bit, like BRK's.
    let value = m.get_p() | 0x10;
    m.push(value);
}

pub fn plp<P: Policy>(m: &mut Cpu6502<P>) {
    let value = m.pull();
    m.set_p(value);
}
