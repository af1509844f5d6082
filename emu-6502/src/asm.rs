//! The assembler, in three layers: an expression parser with a symbol
//! table, a one-line instruction assembler, and a multi-pass driver that
//! iterates whole sources until every symbol resolves.

use std::collections::HashMap;
use std::fmt;

use colored::*;

use crate::constants::DEFAULT_ORG;
use crate::cpu_6502::Cpu6502;
use crate::opcodes::{find_instruction, Mode};
use crate::policy::Policy;

/// A parse failure with enough context to print the offending lines the way
/// a human wants to read them.
#[derive(Debug)]
pub struct ParseError {
    pub message: String,
    /// 1-based line number.
    pub row: usize,
    nice_message: String,
}

impl ParseError {
    fn new(message: String, text: &str, row_index: usize) -> ParseError {
        let range = 3usize;
        let min = row_index.saturating_sub(range);
        let max = row_index + range;

        let mut nice_message = String::from("\n\n");
        for (i, row_text) in text.lines().enumerate() {
            if i > max {
                break;
            }
            if i < min {
                continue;
            }
            let col_string = format!("{:>4}: ", i + 1);
            nice_message.push_str(&format!("{}", col_string.cyan()));
            nice_message.push_str(&format!("{}", row_text.bright_white()));
            nice_message.push('\n');

            if i == row_index {
                let indent = " ".repeat(6);
                let error_message = format!("^ parse error on line {}", i + 1);
                nice_message.push_str(&indent);
                nice_message.push_str(&format!("{}", error_message.bright_red()));
                nice_message.push('\n');
                nice_message.push_str(&indent);
                nice_message.push_str(&format!("{}", message.bright_red()));
                nice_message.push('\n');
            }
        }
        nice_message.push('\n');

        ParseError {
            message,
            row: row_index + 1,
            nice_message,
        }
    }

    fn undefined(names: &[String]) -> ParseError {
        let message = format!("undefined symbols: {}", names.join(", "));
        ParseError {
            nice_message: message.clone(),
            message,
            row: 0,
        }
    }

    /// The multi-line, colored report for terminals.
    pub fn report(&self) -> &str {
        &self.nice_message
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.row == 0 {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{} (line {})", self.message, self.row)
        }
    }
}

/// What an `@` metaline compares, and against what.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssertTarget {
    A,
    X,
    Y,
    Sr,
    Sp,
    Pc,
    Mem(u16),
}

impl AssertTarget {
    fn describe(self) -> String {
        match self {
            AssertTarget::A => "a".to_string(),
            AssertTarget::X => "x".to_string(),
            AssertTarget::Y => "y".to_string(),
            AssertTarget::Sr => "sr".to_string(),
            AssertTarget::Sp => "sp".to_string(),
            AssertTarget::Pc => "pc".to_string(),
            AssertTarget::Mem(adr) => format!("${:04x}", adr),
        }
    }
}

/// A machine-state check attached to an address. The host installs these as
/// breakpoints; when the PC reaches `adr` the live state is compared.
#[derive(Debug, Clone)]
pub struct Assertion {
    pub adr: u16,
    pub checks: Vec<(AssertTarget, i64)>,
}

impl Assertion {
    pub fn check<P: Policy>(&self, m: &Cpu6502<P>) -> Result<(), String> {
        for (target, expected) in &self.checks {
            let live = match target {
                AssertTarget::A => m.a as i64,
                AssertTarget::X => m.x as i64,
                AssertTarget::Y => m.y as i64,
                AssertTarget::Sr => m.get_p() as i64,
                AssertTarget::Sp => m.s as i64,
                AssertTarget::Pc => m.pc as i64,
                AssertTarget::Mem(adr) => m.read_ram(*adr) as i64,
            };
            if live != *expected {
                return Err(format!(
                    "assertion failed at ${:04x}: {} is ${:02x}, expected ${:02x}",
                    self.adr,
                    target.describe(),
                    live,
                    expected
                ));
            }
        }
        Ok(())
    }
}

/// The result of assembling a source: a full 64 KiB image plus the written
/// watermarks and the collected assertions.
#[derive(Debug)]
pub struct Assembly {
    pub mem: Vec<u8>,
    pub first: usize,
    pub end: usize,
    pub assertions: Vec<Assertion>,
}

impl Assembly {
    fn new() -> Assembly {
        Assembly {
            mem: vec![0; 0x10000],
            first: usize::MAX,
            end: 0,
            assertions: Vec::new(),
        }
    }

    /// The contiguous span from the lowest to the highest written address.
    pub fn bytes(&self) -> &[u8] {
        if self.first >= self.end {
            &[]
        } else {
            &self.mem[self.first..self.end]
        }
    }
}

/// A byte-offset cursor over one line of text. Multi-character operators
/// need two characters of lookahead, which `Peekable` won't give us.
struct Scanner<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Scanner<'a> {
    fn new(text: &'a str) -> Scanner<'a> {
        Scanner { text, pos: 0 }
    }

    fn peek(&self) -> Option<char> {
        self.text[self.pos..].chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        let mut chars = self.text[self.pos..].chars();
        chars.next();
        chars.next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn eat(&mut self, want: char) -> bool {
        if self.peek() == Some(want) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.bump();
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.text.len()
    }

    fn rest(&self) -> &'a str {
        &self.text[self.pos..]
    }

    /// Consume a run of alphanumerics and underscores.
    fn word(&mut self) -> &'a str {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_alphanumeric() || c == '_') {
            self.bump();
        }
        &self.text[start..self.pos]
    }
}

fn strip_comment(line: &str) -> &str {
    let mut in_string = false;
    for (i, c) in line.char_indices() {
        match c {
            '"' => in_string = !in_string,
            ';' if !in_string => return &line[..i],
            _ => {}
        }
    }
    line
}

/// `label:` at the start of a line, if present.
fn split_label(text: &str) -> Option<(&str, &str)> {
    let end = text.find(|c: char| !(c.is_alphanumeric() || c == '_'))?;
    if end == 0 {
        return None;
    }
    if text[end..].starts_with(':') {
        Some((&text[..end], &text[end + 1..]))
    } else {
        None
    }
}

fn is_symbol_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_')
}

/// Hexadecimal with an optional `$` or `0x` prefix, the monitor convention.
fn parse_hex(text: &str) -> Result<i64, String> {
    let digits = text
        .strip_prefix('$')
        .or_else(|| text.strip_prefix("0x"))
        .unwrap_or(text);
    i64::from_str_radix(digits, 16).map_err(|_| format!("expected a hex number, found \"{}\"", text))
}

/// A classified operand.
struct Arg {
    mode: Mode,
    val: i64,
    /// True when an undefined symbol fed the value. The encoder then
    /// assumes worst-case operand sizes so later passes converge.
    unknown: bool,
}

pub struct Assembler {
    symbols: HashMap<String, i64>,
    undefined: Vec<String>,
    symbols_changed: bool,
    /// Where assembly starts when the source doesn't say.
    pub org_start: u16,
    org: u16,
}

impl Assembler {
    pub fn new() -> Assembler {
        Assembler {
            symbols: HashMap::new(),
            undefined: Vec::new(),
            symbols_changed: false,
            org_start: DEFAULT_ORG,
            org: DEFAULT_ORG,
        }
    }

    /// Define a symbol, as the monitor's `name = expression` command does.
    /// Names are case-insensitive.
    pub fn define(&mut self, name: &str, value: i64) {
        self.symbols.insert(name.to_lowercase(), value);
    }

    pub fn symbol(&self, name: &str) -> Option<i64> {
        self.symbols.get(&name.to_lowercase()).copied()
    }

    /// Evaluate a standalone expression. Undefined symbols are an error
    /// here; only whole-source assembly gets extra passes.
    pub fn eval(&mut self, text: &str) -> Result<i64, String> {
        let undef_before = self.undefined.len();
        let mut s = Scanner::new(text);
        let value = self.expr(&mut s)?;
        s.skip_whitespace();
        if !s.at_end() {
            return Err(format!("trailing characters \"{}\"", s.rest()));
        }
        if self.undefined.len() > undef_before {
            let missing = self.undefined.split_off(undef_before);
            return Err(format!("undefined symbol \"{}\"", missing.join("\", \"")));
        }
        Ok(value)
    }

    /// Assemble a single instruction at `pc`, returning its 1-3 bytes.
    /// This is the monitor's `a` command.
    pub fn assemble_line(&mut self, pc: u16, line: &str) -> Result<Vec<u8>, String> {
        self.org = pc;
        let undef_before = self.undefined.len();
        let text = strip_comment(line).trim();
        let (name, operand) = match text.find(char::is_whitespace) {
            Some(i) => (&text[..i], text[i..].trim_start()),
            None => (text, ""),
        };
        let bytes = self.encode_instruction(pc, name, operand)?;
        if self.undefined.len() > undef_before {
            let missing = self.undefined.split_off(undef_before);
            return Err(format!("undefined symbol \"{}\"", missing.join("\", \"")));
        }
        Ok(bytes)
    }

    /// Assemble a whole source. Passes repeat from `org_start` until every
    /// symbol resolves and no label moved; if a pass fails to shrink the
    /// undefined set, the assembly fails listing what's missing.
    pub fn assemble(&mut self, text: &str) -> Result<Assembly, ParseError> {
        let mut last_undefined: Option<usize> = None;
        // Size promotion can only shrink operands, so this converges fast.
        // The cap is a guard against pathological self-referential sources.
        for _pass in 0..16 {
            self.org = self.org_start;
            self.undefined.clear();
            self.symbols_changed = false;
            let mut out = Assembly::new();

            for (row, line) in text.lines().enumerate() {
                if let Err(message) = self.process_line(line, &mut out) {
                    return Err(ParseError::new(message, text, row));
                }
            }

            if self.undefined.is_empty() {
                if !self.symbols_changed {
                    return Ok(out);
                }
            } else {
                if let Some(previous) = last_undefined {
                    if self.undefined.len() >= previous {
                        return Err(ParseError::undefined(&self.undefined));
                    }
                }
                last_undefined = Some(self.undefined.len());
            }
        }
        if self.undefined.is_empty() {
            let message = "assembly did not converge".to_string();
            return Err(ParseError {
                nice_message: message.clone(),
                message,
                row: 0,
            });
        }
        Err(ParseError::undefined(&self.undefined))
    }

    fn process_line(&mut self, line: &str, out: &mut Assembly) -> Result<(), String> {
        let stripped = strip_comment(line);
        let mut text = stripped.trim();

        if let Some((label, rest)) = split_label(text) {
            self.define_tracked(label, self.org as i64);
            text = rest.trim();
        }
        if text.is_empty() {
            return Ok(());
        }

        if let Some(meta) = text.strip_prefix('@') {
            let assertion = self.parse_assertion(meta)?;
            out.assertions.push(assertion);
            return Ok(());
        }

        // `symbol = expression`, or `* = expression` to move the origin.
        if let Some(eq) = text.find('=') {
            let name = text[..eq].trim();
            if name == "*" || name == "$" || is_symbol_name(name) {
                let value_text = &text[eq + 1..];
                let mut s = Scanner::new(value_text);
                let value = self.expr(&mut s)?;
                s.skip_whitespace();
                if !s.at_end() {
                    return Err(format!("trailing characters \"{}\"", s.rest()));
                }
                if name == "*" || name == "$" {
                    self.org = value as u16;
                } else {
                    self.define_tracked(name, value);
                }
                return Ok(());
            }
        }

        let (token, rest) = match text.find(char::is_whitespace) {
            Some(i) => (&text[..i], text[i..].trim_start()),
            None => (text, ""),
        };
        match token.to_lowercase().as_str() {
            ".byte" | "db" => {
                let bytes = self.parse_data(rest, false)?;
                self.emit(out, &bytes)
            }
            ".word" => {
                let bytes = self.parse_data(rest, true)?;
                self.emit(out, &bytes)
            }
            _ => {
                let bytes = self.encode_instruction(self.org, token, rest)?;
                self.emit(out, &bytes)
            }
        }
    }

    fn emit(&mut self, out: &mut Assembly, bytes: &[u8]) -> Result<(), String> {
        let org = self.org as usize;
        if org + bytes.len() > out.mem.len() {
            return Err("program runs past the end of memory".to_string());
        }
        out.mem[org..org + bytes.len()].copy_from_slice(bytes);
        out.first = out.first.min(org);
        out.end = out.end.max(org + bytes.len());
        self.org = self.org.wrapping_add(bytes.len() as u16);
        Ok(())
    }

    fn define_tracked(&mut self, name: &str, value: i64) {
        if self.symbols.insert(name.to_lowercase(), value) != Some(value) {
            self.symbols_changed = true;
        }
    }

    /// `@a=5, x=3, 2000=ff` — numbers are hexadecimal throughout.
    fn parse_assertion(&mut self, text: &str) -> Result<Assertion, String> {
        let mut checks = Vec::new();
        for part in text.split(',') {
            let part = part.trim();
            let (what, value_text) = part
                .split_once('=')
                .ok_or_else(|| format!("expected target=value, found \"{}\"", part))?;
            let value = parse_hex(value_text.trim())?;
            let target = match what.trim().to_lowercase().as_str() {
                "a" => AssertTarget::A,
                "x" => AssertTarget::X,
                "y" => AssertTarget::Y,
                "sr" => AssertTarget::Sr,
                "sp" => AssertTarget::Sp,
                "pc" => AssertTarget::Pc,
                other => AssertTarget::Mem(parse_hex(other)? as u16),
            };
            checks.push((target, value));
        }
        Ok(Assertion {
            adr: self.org,
            checks,
        })
    }

    fn parse_data(&mut self, text: &str, words: bool) -> Result<Vec<u8>, String> {
        let mut bytes = Vec::new();
        let mut s = Scanner::new(text);
        loop {
            s.skip_whitespace();
            if s.peek() == Some('"') {
                s.bump();
                loop {
                    match s.bump() {
                        Some('"') => break,
                        Some(c) => bytes.push(c as u8),
                        None => return Err("unterminated string".to_string()),
                    }
                }
            } else {
                let value = self.expr(&mut s)?;
                bytes.push(value as u8);
                if words {
                    bytes.push((value >> 8) as u8);
                }
            }
            s.skip_whitespace();
            if !s.eat(',') {
                break;
            }
        }
        s.skip_whitespace();
        if !s.at_end() {
            return Err(format!("trailing characters \"{}\"", s.rest()));
        }
        Ok(bytes)
    }

    /// Assemble one `mnemonic operand` pair into bytes. The scan over the
    /// opcode variants also performs the zero-page-to-absolute promotion
    /// and the absolute-to-relative conversion for branches.
    fn encode_instruction(&mut self, pc: u16, name: &str, operand: &str) -> Result<Vec<u8>, String> {
        let name_lc = name.to_lowercase();
        let ins = find_instruction(&name_lc)
            .ok_or_else(|| format!("unknown instruction \"{}\"", name))?;
        let arg = self.parse_operand(operand)?;
        let mut mode = arg.mode;
        let mut val = arg.val;

        for op in ins.ops {
            // Zero-page variants are listed before their absolute siblings,
            // so an exact match has already won when these promotions fire.
            if op.mode == Mode::Absy && mode == Mode::Zpy {
                mode = Mode::Absy;
            }
            if op.mode == Mode::Absx && mode == Mode::Zpx {
                mode = Mode::Absx;
            }
            if op.mode == Mode::Abs && mode == Mode::Zp {
                mode = Mode::Abs;
            }
            if op.mode == Mode::Acc && mode == Mode::None {
                mode = Mode::Acc;
            }
            if op.mode == Mode::Rel && (mode == Mode::Abs || mode == Mode::Zp) {
                if arg.unknown {
                    // Placeholder until the label resolves in a later pass.
                    val = 0;
                } else {
                    let diff = val - pc as i64 - 2;
                    if !(-0x80..=0x7f).contains(&diff) {
                        return Err(format!("branch target out of range ({} bytes away)", diff));
                    }
                    val = diff & 0xff;
                }
                mode = Mode::Rel;
            }
            if op.mode == mode {
                let mut bytes = vec![op.code];
                if mode.operand_bytes() >= 1 {
                    bytes.push(val as u8);
                }
                if mode.operand_bytes() >= 2 {
                    bytes.push((val >> 8) as u8);
                }
                return Ok(bytes);
            }
        }
        Err(format!(
            "\"{}\" has no {:?} addressing mode",
            name_lc, mode
        ))
    }

    /// Classify an operand by shape, then by value: `#` marks immediate,
    /// parentheses the indirect family, `,x`/`,y` indexing, and values
    /// under 256 select the zero-page variants.
    fn parse_operand(&mut self, text: &str) -> Result<Arg, String> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(Arg {
                mode: Mode::None,
                val: 0,
                unknown: false,
            });
        }
        if text.eq_ignore_ascii_case("a") {
            return Ok(Arg {
                mode: Mode::Acc,
                val: 0,
                unknown: false,
            });
        }

        let undef_before = self.undefined.len();
        let mut s = Scanner::new(text);
        s.skip_whitespace();

        let mode;
        let val;
        if s.eat('#') {
            val = self.expr(&mut s)?;
            mode = Mode::Imm;
        } else if s.peek() == Some('(') {
            s.bump();
            val = self.expr(&mut s)?;
            s.skip_whitespace();
            if s.eat(',') {
                // ($zp,x)
                s.skip_whitespace();
                if !(s.eat('x') || s.eat('X')) {
                    return Err("expected x after the comma".to_string());
                }
                s.skip_whitespace();
                if !s.eat(')') {
                    return Err("expected a closing parenthesis".to_string());
                }
                mode = Mode::Indx;
            } else if s.eat(')') {
                s.skip_whitespace();
                if s.eat(',') {
                    // ($zp),y
                    s.skip_whitespace();
                    if !(s.eat('y') || s.eat('Y')) {
                        return Err("expected y after the comma".to_string());
                    }
                    mode = Mode::Indy;
                } else {
                    mode = Mode::Ind;
                }
            } else {
                return Err("expected a closing parenthesis".to_string());
            }
        } else {
            val = self.expr(&mut s)?;
            s.skip_whitespace();
            let unknown = self.undefined.len() > undef_before;
            let small = (0..256).contains(&val) && !unknown;
            if s.eat(',') {
                s.skip_whitespace();
                mode = match s.bump() {
                    Some('x') | Some('X') => {
                        if small {
                            Mode::Zpx
                        } else {
                            Mode::Absx
                        }
                    }
                    Some('y') | Some('Y') => {
                        if small {
                            Mode::Zpy
                        } else {
                            Mode::Absy
                        }
                    }
                    other => return Err(format!("unexpected index register {:?}", other)),
                };
            } else if small {
                mode = Mode::Zp;
            } else {
                mode = Mode::Abs;
            }
        }

        s.skip_whitespace();
        if !s.at_end() {
            return Err(format!("trailing characters \"{}\"", s.rest()));
        }
        let unknown = self.undefined.len() > undef_before;
        if (mode == Mode::Indx || mode == Mode::Indy) && !unknown && !(0..256).contains(&val) {
            return Err("indexed-indirect pointers live in the zero page".to_string());
        }
        Ok(Arg { mode, val, unknown })
    }

    /////////////////////////////////////////////////////////////////////////
    //
    // EXPRESSIONS
    //
    // Precedence, loosest first: || &&, then | & ^, then comparisons,
    // then << >>, then + -, then * / %, then atoms.
    //
    /////////////////////////////////////////////////////////////////////////

    fn expr(&mut self, s: &mut Scanner) -> Result<i64, String> {
        self.logical(s)
    }

    fn logical(&mut self, s: &mut Scanner) -> Result<i64, String> {
        let mut value = self.bitwise(s)?;
        loop {
            s.skip_whitespace();
            if s.peek() == Some('|') && s.peek_second() == Some('|') {
                s.bump();
                s.bump();
                let rhs = self.bitwise(s)?;
                value = (value != 0 || rhs != 0) as i64;
            } else if s.peek() == Some('&') && s.peek_second() == Some('&') {
                s.bump();
                s.bump();
                let rhs = self.bitwise(s)?;
                value = (value != 0 && rhs != 0) as i64;
            } else {
                return Ok(value);
            }
        }
    }

    fn bitwise(&mut self, s: &mut Scanner) -> Result<i64, String> {
        let mut value = self.comparison(s)?;
        loop {
            s.skip_whitespace();
            match s.peek() {
                Some('|') if s.peek_second() != Some('|') => {
                    s.bump();
                    value |= self.comparison(s)?;
                }
                Some('&') if s.peek_second() != Some('&') => {
                    s.bump();
                    value &= self.comparison(s)?;
                }
                Some('^') => {
                    s.bump();
                    value ^= self.comparison(s)?;
                }
                _ => return Ok(value),
            }
        }
    }

    fn comparison(&mut self, s: &mut Scanner) -> Result<i64, String> {
        let mut value = self.shift(s)?;
        loop {
            s.skip_whitespace();
            match (s.peek(), s.peek_second()) {
                (Some('='), Some('=')) => {
                    s.bump();
                    s.bump();
                    value = (value == self.shift(s)?) as i64;
                }
                (Some('!'), Some('=')) => {
                    s.bump();
                    s.bump();
                    value = (value != self.shift(s)?) as i64;
                }
                (Some('>'), Some('=')) => {
                    s.bump();
                    s.bump();
                    value = (value >= self.shift(s)?) as i64;
                }
                (Some('<'), Some('=')) => {
                    s.bump();
                    s.bump();
                    value = (value <= self.shift(s)?) as i64;
                }
                (Some('>'), _) => {
                    s.bump();
                    value = (value > self.shift(s)?) as i64;
                }
                (Some('<'), _) => {
                    s.bump();
                    value = (value < self.shift(s)?) as i64;
                }
                _ => return Ok(value),
            }
        }
    }

    fn shift(&mut self, s: &mut Scanner) -> Result<i64, String> {
        let mut value = self.sum(s)?;
        loop {
            s.skip_whitespace();
            match (s.peek(), s.peek_second()) {
                (Some('<'), Some('<')) => {
                    s.bump();
                    s.bump();
                    value <<= self.sum(s)?;
                }
                (Some('>'), Some('>')) => {
                    s.bump();
                    s.bump();
                    value >>= self.sum(s)?;
                }
                _ => return Ok(value),
            }
        }
    }

    fn sum(&mut self, s: &mut Scanner) -> Result<i64, String> {
        let mut value = self.term(s)?;
        loop {
            s.skip_whitespace();
            match s.peek() {
                Some('+') => {
                    s.bump();
                    value += self.term(s)?;
                }
                Some('-') => {
                    s.bump();
                    value -= self.term(s)?;
                }
                _ => return Ok(value),
            }
        }
    }

    fn term(&mut self, s: &mut Scanner) -> Result<i64, String> {
        let mut value = self.atom(s)?;
        loop {
            s.skip_whitespace();
            match s.peek() {
                Some('*') => {
                    s.bump();
                    value *= self.atom(s)?;
                }
                Some('/') => {
                    s.bump();
                    let rhs = self.atom(s)?;
                    if rhs == 0 {
                        return Err("division by zero".to_string());
                    }
                    value /= rhs;
                }
                Some('%') => {
                    // A binary literal also starts with %, but in operator
                    // position this can only be modulo.
                    s.bump();
                    let rhs = self.atom(s)?;
                    if rhs == 0 {
                        return Err("division by zero".to_string());
                    }
                    value %= rhs;
                }
                _ => return Ok(value),
            }
        }
    }

    fn atom(&mut self, s: &mut Scanner) -> Result<i64, String> {
        s.skip_whitespace();
        match s.peek() {
            None => Err("unexpected end of expression".to_string()),
            Some('-') => {
                s.bump();
                Ok(-self.atom(s)?)
            }
            Some('(') => {
                s.bump();
                let value = self.expr(s)?;
                s.skip_whitespace();
                if !s.eat(')') {
                    return Err("expected a closing parenthesis".to_string());
                }
                Ok(value)
            }
            // `*` (or a bare `$`) is the current origin.
            Some('*') => {
                s.bump();
                Ok(self.org as i64)
            }
            Some('$') => {
                s.bump();
                if matches!(s.peek(), Some(c) if c.is_ascii_hexdigit()) {
                    let word = s.word();
                    i64::from_str_radix(word, 16)
                        .map_err(|_| format!("bad hex number \"${}\"", word))
                } else {
                    Ok(self.org as i64)
                }
            }
            Some('%') => {
                s.bump();
                let word = s.word();
                i64::from_str_radix(word, 2).map_err(|_| format!("bad binary number \"%{}\"", word))
            }
            Some('\'') => {
                s.bump();
                let c = s.bump().ok_or("unterminated character literal")?;
                if !s.eat('\'') {
                    return Err("unterminated character literal".to_string());
                }
                Ok(c as i64)
            }
            Some(c) if c.is_ascii_digit() => {
                let word = s.word();
                if let Some(hex) = word.strip_prefix("0x") {
                    i64::from_str_radix(hex, 16).map_err(|_| format!("bad hex number \"{}\"", word))
                } else {
                    word.parse()
                        .map_err(|_| format!("bad number \"{}\"", word))
                }
            }
            Some(c) if c.is_alphabetic() || c == '_' => {
                let word = s.word();
                let key = word.to_lowercase();
                match self.symbols.get(&key) {
                    Some(value) => Ok(*value),
                    None => {
                        if !self.undefined.contains(&key) {
                            self.undefined.push(key);
                        }
                        Ok(0)
                    }
                }
            }
            Some(c) => Err(format!("unexpected character {:?} in expression", c)),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    macro_rules! assert_program {
        ( $text:expr, [$( $bytes:expr ),* $(,)?] ) => {
            let mut asm = Assembler::new();
            match asm.assemble($text) {
                Ok(out) => {
                    assert_eq!(out.bytes(), &[$( $bytes as u8, )*][..]);
                }
                Err(parse_error) => panic!("{}", parse_error.report()),
            }
        };
    }

    #[test]
    fn test_immediate_mode() {
        assert_program!(
            "lda #$66    ; Load 0x66 into the A register",
            [0xa9, 0x66]
        );
    }

    #[test]
    fn test_multiple_lines() {
        assert_program!(
            "
                lda #$66    ; Load 0x66 into the A register
                adc #$55    ; Add 0x55 to it
            ",
            [0xa9, 0x66, 0x69, 0x55]
        );
    }

    #[test]
    fn test_all_modes() {
        assert_program!(
            "
                lda #$66    ; immediate
                ora $1234   ; absolute
                asl $12,x   ; zero page indexed X
                eor $1234,y ; absolute indexed Y
                near:
                sty $04     ; zero page
                sta $05,x   ; zero page indexed X
                stx $06,y   ; zero page indexed Y
                bpl near    ; relative, backwards
                jmp ($1234) ; indirect
                and ($aa,X) ; indirect indexed x
                and ($bb),Y ; indirect indexed y
                lsr a       ; accumulator
                rts
            ",
            [
                0xa9, 0x66, 0x0d, 0x34, 0x12, 0x16, 0x12, 0x59, 0x34, 0x12, 0x84, 0x04,
                0x95, 0x05, 0x96, 0x06, 0x10, 0xf8, 0x6c, 0x34, 0x12, 0x21, 0xaa, 0x31,
                0xbb, 0x4a, 0x60
            ]
        );
    }

    #[test]
    fn test_binary_and_decimal_literals() {
        assert_program!(
            "
                lda #%11110000
                ldx #123
                ldy #0x2a
            ",
            [0xa9, 0b1111_0000, 0xa2, 123, 0xa0, 0x2a]
        );
    }

    #[test]
    fn test_labels_resolve_forward() {
        assert_program!(
            "
                jmp mylabel
                lda #$11
                mylabel: ; This is address 0x1005
                lda #$22
            ",
            [0x4c, 0x05, 0x10, 0xa9, 0x11, 0xa9, 0x22]
        );
    }

    #[test]
    fn test_pragmas() {
        assert_program!(
            "
                            jmp mylabel
                            .byte $11
                            .byte $22, $33
                mylabel:    .word $5544      ; This is address 0x1006
            ",
            [0x4c, 0x06, 0x10, 0x11, 0x22, 0x33, 0x44, 0x55]
        );
    }

    #[test]
    fn test_data_strings() {
        assert_program!(
            "db \"AB\", $00",
            [0x41, 0x42, 0x00]
        );
    }

    #[test]
    fn test_expressions() {
        // Multiplication binds tighter than addition.
        assert_program!("lda #2+3*4", [0xa9, 14]);
        assert_program!("lda #(2+3)*4", [0xa9, 20]);
        assert_program!("lda #1<<4", [0xa9, 0x10]);
        assert_program!("lda #$ff & $0f", [0xa9, 0x0f]);
        // `*` as an atom is the current origin.
        assert_program!("sta *", [0x8d, 0x00, 0x10]);
    }

    #[test]
    fn test_symbol_definitions() {
        assert_program!(
            "
                screen = $0400
                lda #' '
                sta screen
            ",
            [0xa9, 0x20, 0x8d, 0x00, 0x04]
        );
    }

    #[test]
    fn test_org_change() {
        let mut asm = Assembler::new();
        let out = asm.assemble("* = $2000\nlda #$01").unwrap();
        assert_eq!(out.first, 0x2000);
        assert_eq!(out.bytes(), &[0xa9, 0x01]);
    }

    #[test]
    fn test_symbols_are_case_insensitive() {
        assert_program!(
            "
                Screen = $0400
                STA screen
            ",
            [0x8d, 0x00, 0x04]
        );
    }

    #[test]
    fn test_branch_out_of_range() {
        let mut asm = Assembler::new();
        let err = asm.assemble("bne $2000").unwrap_err();
        assert!(err.message.contains("out of range"), "{}", err.message);
    }

    #[test]
    fn test_unknown_instruction() {
        let mut asm = Assembler::new();
        let err = asm.assemble("xyz $12").unwrap_err();
        assert!(err.message.contains("unknown instruction"), "{}", err.message);
    }

    #[test]
    fn test_undefined_symbol_fails_when_passes_stop_helping() {
        let mut asm = Assembler::new();
        let err = asm.assemble("lda missing").unwrap_err();
        assert!(err.message.contains("undefined"), "{}", err.message);
    }

    #[test]
    fn test_assertions_attach_to_the_current_address() {
        let mut asm = Assembler::new();
        let out = asm
            .assemble("lda #$05\n@a=5, 2000=ff\nrts")
            .unwrap();
        assert_eq!(out.assertions.len(), 1);
        let assertion = &out.assertions[0];
        assert_eq!(assertion.adr, 0x1002);
        assert_eq!(assertion.checks[0], (AssertTarget::A, 5));
        assert_eq!(assertion.checks[1], (AssertTarget::Mem(0x2000), 0xff));
    }

    #[test]
    fn test_eval_and_define() {
        let mut asm = Assembler::new();
        asm.define("base", 0x400);
        assert_eq!(asm.eval("base + $10").unwrap(), 0x410);
        assert_eq!(asm.eval("1 == 2").unwrap(), 0);
        assert_eq!(asm.eval("3 % 2").unwrap(), 1);
        assert!(asm.eval("nosuch").is_err());
    }

    #[test]
    fn every_mnemonic_mode_pair_round_trips() {
        let mut asm = Assembler::new();
        for ins in crate::opcodes::INSTRUCTIONS {
            for op in ins.ops {
                let operand = match op.mode {
                    Mode::None => "",
                    Mode::Acc => "a",
                    Mode::Imm => "#$12",
                    Mode::Rel => "$1003",
                    Mode::Zp => "$12",
                    Mode::Zpx => "$12,x",
                    Mode::Zpy => "$12,y",
                    Mode::Indx => "($12,x)",
                    Mode::Indy => "($12),y",
                    Mode::Ind => "($1234)",
                    Mode::Abs => "$1234",
                    Mode::Absx => "$1234,x",
                    Mode::Absy => "$1234,y",
                    Mode::Bad => unreachable!(),
                };
                let text = format!("{} {}", ins.name, operand);
                let bytes = asm
                    .assemble_line(0x1000, &text)
                    .unwrap_or_else(|e| panic!("{}: {}", text, e));
                assert_eq!(bytes[0], op.code, "{}", text);
                assert_eq!(bytes.len() as u16, 1 + op.mode.operand_bytes(), "{}", text);
            }
        }
    }
}
