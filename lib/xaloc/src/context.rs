use crate::address::Address;
use crate::errors::{ResolveError, ResolveErrorReason};
use std::collections::HashMap;

type Result<T> = std::result::Result<T, ResolveError>;

/// Holds the label table and the PRG/CPU bank correspondence for one
/// assembly unit, and resolves source-level references into concrete
/// addresses. Resolution is a pure function of the state accumulated from
/// the directives processed so far, so the order in which lines feed this
/// struct is the order of the source text.
#[derive(Debug, Default)]
pub struct Context {
    /// Definitions for every label, kept ascending by `Address::sort_key`
    /// and deduplicated. Only relative labels (runs of '-' or '+') are
    /// expected to hold more than one entry.
    pub(crate) labels: HashMap<String, Vec<Address>>,

    /// PRG offset to CPU address for the banks currently declared.
    prg_to_cpu: HashMap<u32, u16>,

    /// CPU address back to PRG offset, the reverse of `prg_to_cpu`.
    cpu_to_prg: HashMap<u16, u32>,

    /// Program counter: the PRG offset the next emitted byte lands on.
    pub pc: u32,
}

impl Context {
    /// Returns a fresh context: empty label table, no banks, pc at zero.
    pub fn new() -> Self {
        Context::default()
    }

    /// Registers a definition for `label` at the given address. Definitions
    /// stay sorted by their key so relative references can binary search
    /// them; registering the same address twice is a no-op.
    pub fn add_label(&mut self, label: &str, addr: Address) {
        let addrs = self.labels.entry(label.to_string()).or_default();
        match addrs.binary_search_by_key(&addr.sort_key(), |a| a.sort_key()) {
            Ok(_) => {}
            Err(pos) => addrs.insert(pos, addr),
        }
    }

    /// The number of definitions currently registered for `label`.
    pub fn definitions(&self, label: &str) -> usize {
        self.labels.get(label).map(Vec::len).unwrap_or(0)
    }

    /// Installs a contiguous bank window: CPU addresses `[cpu, cpu+length)`
    /// map one to one onto PRG offsets `[prg, prg+length)`. Anything the CPU
    /// range previously mapped to is erased first, in both directions, so a
    /// superseded bank never answers for its old PRG range again.
    pub fn update_bank(&mut self, prg: u32, cpu: u16, length: u32) {
        for i in 0..length {
            let cpu_addr = u32::from(cpu) + i;
            if cpu_addr > 0xFFFF {
                break;
            }
            if let Some(old_prg) = self.cpu_to_prg.remove(&(cpu_addr as u16)) {
                self.prg_to_cpu.remove(&old_prg);
            }
        }

        for i in 0..length {
            let cpu_addr = u32::from(cpu) + i;
            if cpu_addr > 0xFFFF {
                break;
            }
            self.prg_to_cpu.insert(prg + i, cpu_addr as u16);
            self.cpu_to_prg.insert(cpu_addr as u16, prg + i);
        }
    }

    /// Translates a PRG offset into the CPU address currently mapping it.
    pub fn map_prg_to_cpu(&self, prg: u32) -> Result<u16> {
        match self.prg_to_cpu.get(&prg) {
            Some(&cpu) => Ok(cpu),
            None => Err(ResolveError::new(
                ResolveErrorReason::UnmappedAddress,
                format!(
                    "PRG address ${:06X} is not mapped: a '.bank' directive for it is missing",
                    prg
                ),
            )),
        }
    }

    /// Translates an already-resolved address into the concrete CPU value
    /// usable for emission.
    pub fn map_addr(&self, addr: Address) -> Result<u16> {
        match addr {
            Address::Absolute(value) => Ok(value),
            Address::PrgRelative(prg) => self.map_prg_to_cpu(prg),
        }
    }

    /// The single resolution entry point for textual references: resolves
    /// `expr` through the label table and translates the result into a CPU
    /// value. `pc` is the PRG offset of the referencing instruction and is
    /// what disambiguates relative labels.
    pub fn map(&self, expr: &str, pc: Option<u32>) -> Result<u16> {
        let addr = self.map_label(expr, pc)?;
        self.map_addr(addr)
    }

    /// Resolves a label expression into an address. Arithmetic forms are
    /// peeled off first ('A+B'/'A-B', then '<A'/'>A', then 'A*B', in that
    /// order), with each operand resolved recursively through `map`; number
    /// literals and plain identifiers bottom the recursion out.
    pub fn map_label(&self, expr: &str, pc: Option<u32>) -> Result<Address> {
        if let Some((a, op, b)) = split_arithmetic(expr) {
            let lhs = i64::from(self.map(a, pc)?);
            let rhs = i64::from(self.map(b, pc)?);
            let value = if op == '+' { lhs + rhs } else { lhs - rhs };
            return Ok(Address::Absolute((value & 0xFFFF) as u16));
        }
        if let Some(rest) = expr.strip_prefix('<') {
            return Ok(Address::Absolute(self.map(rest, pc)? & 0x00FF));
        }
        if let Some(rest) = expr.strip_prefix('>') {
            return Ok(Address::Absolute(self.map(rest, pc)? >> 8));
        }
        if let Some((a, b)) = expr.split_once('*') {
            let product = i64::from(self.map(a, pc)?) * i64::from(self.map(b, pc)?);
            return Ok(Address::Absolute((product & 0xFFFF) as u16));
        }
        if let Some(value) = parse_number(expr)? {
            return Ok(Address::Absolute((value & 0xFFFF) as u16));
        }

        self.lookup(expr, pc)
    }

    // Plain identifier lookup, including the relative-label disambiguation.
    fn lookup(&self, label: &str, pc: Option<u32>) -> Result<Address> {
        let addrs = self.labels.get(label).ok_or_else(|| {
            ResolveError::new(
                ResolveErrorReason::UndefinedLabel,
                format!("label '{}' is not defined", label),
            )
        })?;

        let Some(pc) = pc else {
            if addrs.len() > 1 {
                return Err(ResolveError::new(
                    ResolveErrorReason::AmbiguousLabel,
                    format!(
                        "label '{}' has {} definitions and no position to tell them apart",
                        label,
                        addrs.len()
                    ),
                ));
            }
            return Ok(addrs[0]);
        };

        // The reference sits right after the instruction, encoded the same
        // way PRG-relative definitions are. Searching for that key places
        // the instruction among the definitions.
        let key = Address::PrgRelative(pc + 2).sort_key();
        match addrs.binary_search_by_key(&key, |a| a.sort_key()) {
            Ok(i) => Ok(addrs[i]),
            Err(0) => Ok(addrs[0]),
            Err(i) if i == addrs.len() => Ok(addrs[addrs.len() - 1]),
            Err(i) => {
                // Two definitions bracket the reference. In key space the
                // upper one is the most recent prior definition and the
                // lower one the next definition in the text.
                if label.starts_with('-') {
                    return Ok(addrs[i]);
                }
                if label.starts_with('+') {
                    return Ok(addrs[i - 1]);
                }
                // Neither prefix: the bracketing entry whose key is closest
                // to the search key wins, the lower one on an exact tie.
                let lo = addrs[i - 1].sort_key();
                let hi = addrs[i].sort_key();
                if key - lo <= hi - key {
                    Ok(addrs[i - 1])
                } else {
                    Ok(addrs[i])
                }
            }
        }
    }
}

// Splits 'A+B'/'A-B' on the first operator past the start of the string.
// A leading '+'/'-' is part of a relative label name, never an operator,
// and the left side cannot contain operators at all.
fn split_arithmetic(expr: &str) -> Option<(&str, char, &str)> {
    for (i, c) in expr.char_indices() {
        if c != '+' && c != '-' {
            continue;
        }
        if i == 0 {
            return None;
        }
        let a = &expr[..i];
        let b = &expr[i + 1..];
        if b.is_empty() {
            return None;
        }
        return Some((a, c, b));
    }
    None
}

/// Parses a number literal: '$' hexadecimal, '%' binary, or plain decimal.
/// Returns Ok(None) when `s` does not look like a number at all, so the
/// caller can fall through to the label table.
pub(crate) fn parse_number(s: &str) -> Result<Option<u32>> {
    if let Some(hex) = s.strip_prefix('$') {
        return match u32::from_str_radix(hex, 16) {
            Ok(value) => Ok(Some(value)),
            Err(_) => Err(ResolveError::new(
                ResolveErrorReason::BadNumber,
                format!("could not parse '{}' as a hexadecimal number", s),
            )),
        };
    }
    if let Some(bin) = s.strip_prefix('%') {
        return match u32::from_str_radix(bin, 2) {
            Ok(value) => Ok(Some(value)),
            Err(_) => Err(ResolveError::new(
                ResolveErrorReason::BadNumber,
                format!("could not parse '{}' as a binary number", s),
            )),
        };
    }
    if !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()) {
        return match s.parse::<u32>() {
            Ok(value) => Ok(Some(value)),
            Err(_) => Err(ResolveError::new(
                ResolveErrorReason::BadNumber,
                format!("decimal number '{}' is too big", s),
            )),
        };
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_reason(res: Result<impl std::fmt::Debug>, reason: ResolveErrorReason) {
        match res {
            Ok(v) => panic!("expected an error, got {:?}", v),
            Err(e) => assert_eq!(e.reason, reason),
        }
    }

    #[test]
    fn single_label_round_trip() {
        let mut ctx = Context::new();
        ctx.add_label("foo", Address::Absolute(10));

        assert_eq!(ctx.map("foo", None).unwrap(), 10);
        // A single candidate is unambiguous from any position.
        assert_eq!(ctx.map("foo", Some(0x4000)).unwrap(), 10);
    }

    #[test]
    fn undefined_and_ambiguous_labels() {
        let mut ctx = Context::new();
        ctx.add_label("-", Address::PrgRelative(100));
        ctx.add_label("-", Address::PrgRelative(200));

        assert_reason(ctx.map("missing", None), ResolveErrorReason::UndefinedLabel);
        assert_reason(ctx.map_label("-", None), ResolveErrorReason::AmbiguousLabel);
    }

    #[test]
    fn relative_labels_resolve_to_the_nearest_definition() {
        let mut back = Context::new();
        back.add_label("-", Address::PrgRelative(100));
        back.add_label("-", Address::PrgRelative(200));
        let mut fwd = Context::new();
        fwd.add_label("+", Address::PrgRelative(100));
        fwd.add_label("+", Address::PrgRelative(200));

        // From in between, '-' is the prior definition and '+' the next one.
        assert_eq!(back.map_label("-", Some(150)).unwrap(), Address::PrgRelative(100));
        assert_eq!(fwd.map_label("+", Some(150)).unwrap(), Address::PrgRelative(200));

        // From outside the bracket there is only one direction left.
        assert_eq!(back.map_label("-", Some(300)).unwrap(), Address::PrgRelative(200));
        assert_eq!(fwd.map_label("+", Some(10)).unwrap(), Address::PrgRelative(100));
    }

    #[test]
    fn bank_mapping_round_trip() {
        let mut ctx = Context::new();
        ctx.update_bank(0x8000, 0xC000, 0x10);

        assert_eq!(ctx.map_prg_to_cpu(0x8005).unwrap(), 0xC005);
        assert_reason(ctx.map_prg_to_cpu(0x9000), ResolveErrorReason::UnmappedAddress);
    }

    #[test]
    fn bank_switches_invalidate_the_old_window() {
        let mut ctx = Context::new();
        ctx.update_bank(0x0000, 0x8000, 0x10);
        ctx.update_bank(0x0100, 0x8000, 0x10);

        assert_eq!(ctx.map_prg_to_cpu(0x0105).unwrap(), 0x8005);
        // The superseded window no longer answers.
        assert_reason(ctx.map_prg_to_cpu(0x0005), ResolveErrorReason::UnmappedAddress);
    }

    #[test]
    fn mapping_translates_prg_relative_labels() {
        let mut ctx = Context::new();
        ctx.update_bank(0x0000, 0x8000, 0x100);
        ctx.add_label("start", Address::PrgRelative(0x20));

        assert_eq!(ctx.map("start", None).unwrap(), 0x8020);

        // Without the bank, the same reference is an unmapped address.
        let mut bare = Context::new();
        bare.add_label("start", Address::PrgRelative(0x20));
        assert_reason(bare.map("start", None), ResolveErrorReason::UnmappedAddress);
    }

    #[test]
    fn arithmetic_expressions() {
        let ctx = Context::new();

        assert_eq!(ctx.map_label("$10+$20", None).unwrap(), Address::Absolute(0x30));
        assert_eq!(ctx.map_label("$30-$10", None).unwrap(), Address::Absolute(0x20));
        assert_eq!(ctx.map_label("<$1234", None).unwrap(), Address::Absolute(0x34));
        assert_eq!(ctx.map_label(">$1234", None).unwrap(), Address::Absolute(0x12));
        assert_eq!(ctx.map_label("2*3", None).unwrap(), Address::Absolute(6));
        assert_eq!(ctx.map_label("%1010", None).unwrap(), Address::Absolute(10));
        assert_eq!(ctx.map_label("42", None).unwrap(), Address::Absolute(42));
    }

    #[test]
    fn arithmetic_over_labels() {
        let mut ctx = Context::new();
        ctx.add_label("table", Address::Absolute(0x0300));

        assert_eq!(ctx.map("table+2", None).unwrap(), 0x0302);
        assert_eq!(ctx.map("<table", None).unwrap(), 0x00);
        assert_eq!(ctx.map(">table", None).unwrap(), 0x03);
    }

    #[test]
    fn malformed_numbers() {
        let ctx = Context::new();
        assert_reason(ctx.map("$ZZ", None), ResolveErrorReason::BadNumber);
        assert_reason(ctx.map("%12", None), ResolveErrorReason::BadNumber);
    }

    #[test]
    fn duplicate_definitions_are_collapsed() {
        let mut ctx = Context::new();
        ctx.add_label("-", Address::PrgRelative(100));
        ctx.add_label("-", Address::PrgRelative(100));

        assert_eq!(ctx.definitions("-"), 1);
    }
}
