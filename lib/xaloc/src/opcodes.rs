use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

/// The addressing mode an instruction was written in. This assembler only
/// distinguishes the modes the line layer needs to pick an encoding; the
/// indexed and indirect families are not part of it.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum AddressingMode {
    Implied,
    Immediate,
    Absolute,
    Relative,
}

impl fmt::Display for AddressingMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AddressingMode::Implied => write!(f, "implied"),
            AddressingMode::Immediate => write!(f, "immediate"),
            AddressingMode::Absolute => write!(f, "absolute"),
            AddressingMode::Relative => write!(f, "relative"),
        }
    }
}

/// Encoding data for one instruction in one addressing mode.
#[derive(Debug)]
pub struct ShortEntry {
    pub opcode: u8,
    pub size: u8,
}

// Shorthand used when building the table below.
fn entry(opcode: u8, size: u8) -> ShortEntry {
    ShortEntry { opcode, size }
}

/// Map of instructions known to this assembler, accessed by mnemonic first
/// and `AddressingMode` second.
pub static INSTRUCTIONS: LazyLock<HashMap<String, HashMap<AddressingMode, ShortEntry>>> =
    LazyLock::new(|| {
        use AddressingMode::*;

        let mut instrs: HashMap<String, HashMap<AddressingMode, ShortEntry>> = HashMap::new();
        let mut set = |name: &str, mode: AddressingMode, e: ShortEntry| {
            instrs.entry(String::from(name)).or_default().insert(mode, e);
        };

        // Loads, stores and arithmetic in the two common modes.
        set("lda", Immediate, entry(0xA9, 2));
        set("lda", Absolute, entry(0xAD, 3));
        set("ldx", Immediate, entry(0xA2, 2));
        set("ldx", Absolute, entry(0xAE, 3));
        set("ldy", Immediate, entry(0xA0, 2));
        set("ldy", Absolute, entry(0xAC, 3));
        set("sta", Absolute, entry(0x8D, 3));
        set("stx", Absolute, entry(0x8E, 3));
        set("sty", Absolute, entry(0x8C, 3));
        set("adc", Immediate, entry(0x69, 2));
        set("adc", Absolute, entry(0x6D, 3));
        set("sbc", Immediate, entry(0xE9, 2));
        set("sbc", Absolute, entry(0xED, 3));
        set("and", Immediate, entry(0x29, 2));
        set("and", Absolute, entry(0x2D, 3));
        set("ora", Immediate, entry(0x09, 2));
        set("ora", Absolute, entry(0x0D, 3));
        set("eor", Immediate, entry(0x49, 2));
        set("eor", Absolute, entry(0x4D, 3));
        set("cmp", Immediate, entry(0xC9, 2));
        set("cmp", Absolute, entry(0xCD, 3));
        set("cpx", Immediate, entry(0xE0, 2));
        set("cpx", Absolute, entry(0xEC, 3));
        set("cpy", Immediate, entry(0xC0, 2));
        set("cpy", Absolute, entry(0xCC, 3));
        set("inc", Absolute, entry(0xEE, 3));
        set("dec", Absolute, entry(0xCE, 3));
        set("bit", Absolute, entry(0x2C, 3));

        // Jumps and branches.
        set("jmp", Absolute, entry(0x4C, 3));
        set("jsr", Absolute, entry(0x20, 3));
        set("bpl", Relative, entry(0x10, 2));
        set("bmi", Relative, entry(0x30, 2));
        set("bvc", Relative, entry(0x50, 2));
        set("bvs", Relative, entry(0x70, 2));
        set("bcc", Relative, entry(0x90, 2));
        set("bcs", Relative, entry(0xB0, 2));
        set("bne", Relative, entry(0xD0, 2));
        set("beq", Relative, entry(0xF0, 2));

        // Implied instructions.
        set("brk", Implied, entry(0x00, 1));
        set("rts", Implied, entry(0x60, 1));
        set("rti", Implied, entry(0x40, 1));
        set("nop", Implied, entry(0xEA, 1));
        set("clc", Implied, entry(0x18, 1));
        set("sec", Implied, entry(0x38, 1));
        set("cli", Implied, entry(0x58, 1));
        set("sei", Implied, entry(0x78, 1));
        set("cld", Implied, entry(0xD8, 1));
        set("sed", Implied, entry(0xF8, 1));
        set("clv", Implied, entry(0xB8, 1));
        set("inx", Implied, entry(0xE8, 1));
        set("iny", Implied, entry(0xC8, 1));
        set("dex", Implied, entry(0xCA, 1));
        set("dey", Implied, entry(0x88, 1));
        set("tax", Implied, entry(0xAA, 1));
        set("tay", Implied, entry(0xA8, 1));
        set("txa", Implied, entry(0x8A, 1));
        set("tya", Implied, entry(0x98, 1));
        set("txs", Implied, entry(0x9A, 1));
        set("tsx", Implied, entry(0xBA, 1));
        set("pha", Implied, entry(0x48, 1));
        set("pla", Implied, entry(0x68, 1));
        set("php", Implied, entry(0x08, 1));
        set("plp", Implied, entry(0x28, 1));

        instrs
    });
