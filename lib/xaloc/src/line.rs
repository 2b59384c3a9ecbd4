use crate::address::Address;
use crate::context::Context;
use crate::errors::{ResolveError, ResolveErrorReason};
use crate::opcodes::{AddressingMode, ShortEntry, INSTRUCTIONS};

type Result<T> = std::result::Result<T, ResolveError>;

/// A byte or word operand as written in the source: either a value already
/// known at parse time, or a reference that has to go through the label
/// table when the line expands.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Literal(u16),
    Reference(String),
}

impl Operand {
    /// Resolves the operand into a CPU value against the current context.
    /// `pc` is the PRG offset of the line being expanded.
    pub fn resolve(&self, ctx: &Context, pc: Option<u32>) -> Result<u16> {
        match self {
            Operand::Literal(value) => Ok(*value),
            Operand::Reference(expr) => ctx.map(expr, pc),
        }
    }
}

/// Bytes produced by expanding one line, located at the PRG offset they
/// belong to.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub pc: u32,
    pub bytes: Vec<u8>,
}

/// One parsed source line. The set of kinds is closed: everything the
/// assembly driver handles is one of these, and `expand` matches over them
/// exhaustively.
#[derive(Debug, Clone, PartialEq)]
pub enum Line {
    /// `.org $addr`: moves the program counter to the given PRG offset.
    Org { addr: u32 },
    /// `.bank $prg $cpu $len`: declares a PRG-to-CPU bank window.
    Bank { prg: u32, cpu: u16, len: u32 },
    /// `name:` or a bare run of '-'/'+': defines a label at the current pc.
    Label { name: String },
    /// `.byte v, v, ...`: emits single bytes.
    Byte { values: Vec<Operand> },
    /// `.word v, v, ...`: emits little-endian words.
    Word { values: Vec<Operand> },
    /// `.assert $addr`: checks that the program counter reached `addr`.
    Assert { addr: u32 },
    /// An instruction with its addressing mode and optional operand.
    Instruction {
        mnemonic: String,
        mode: AddressingMode,
        operand: Option<Operand>,
    },
}

impl Line {
    /// The number of bytes the line will occupy. The label collection pass
    /// advances the program counter with this, without resolving anything.
    pub fn size(&self) -> u32 {
        match self {
            Line::Org { .. } | Line::Bank { .. } | Line::Label { .. } | Line::Assert { .. } => 0,
            Line::Byte { values } => values.len() as u32,
            Line::Word { values } => values.len() as u32 * 2,
            Line::Instruction { mnemonic, mode, .. } => match lookup(mnemonic, mode) {
                Ok(entry) => u32::from(entry.size),
                Err(_) => 0,
            },
        }
    }

    /// First-pass effect: program counter movement and label definitions.
    /// Labels are registered at the current pc as PRG-relative addresses,
    /// which is what lets a later bank switch move where they land.
    pub fn declare(&self, ctx: &mut Context) {
        match self {
            Line::Org { addr } => ctx.pc = *addr,
            Line::Label { name } => ctx.add_label(name, Address::PrgRelative(ctx.pc)),
            _ => ctx.pc += self.size(),
        }
    }

    /// Second-pass effect: applies directives to the context in textual
    /// order and emits the line's bytes, resolving references against the
    /// current program counter.
    pub fn expand(&self, ctx: &mut Context) -> Result<Option<Chunk>> {
        match self {
            Line::Org { addr } => {
                ctx.pc = *addr;
                Ok(None)
            }
            Line::Bank { prg, cpu, len } => {
                ctx.update_bank(*prg, *cpu, *len);
                Ok(None)
            }
            Line::Label { .. } => Ok(None),
            Line::Assert { addr } => {
                if ctx.pc == *addr {
                    Ok(None)
                } else {
                    Err(ResolveError::new(
                        ResolveErrorReason::Assertion,
                        format!(
                            "expected the program counter at ${:06X} but it is at ${:06X}",
                            addr, ctx.pc
                        ),
                    ))
                }
            }
            Line::Byte { values } => {
                let pc = ctx.pc;
                let mut bytes = Vec::with_capacity(values.len());
                for value in values {
                    let v = value.resolve(ctx, Some(ctx.pc))?;
                    if v > 0xFF {
                        return Err(ResolveError::new(
                            ResolveErrorReason::OutOfRange,
                            format!("value ${:04X} does not fit in a byte", v),
                        ));
                    }
                    bytes.push(v as u8);
                }
                ctx.pc += bytes.len() as u32;
                Ok(Some(Chunk { pc, bytes }))
            }
            Line::Word { values } => {
                let pc = ctx.pc;
                let mut bytes = Vec::with_capacity(values.len() * 2);
                for value in values {
                    let v = value.resolve(ctx, Some(ctx.pc))?;
                    bytes.extend_from_slice(&v.to_le_bytes());
                }
                ctx.pc += bytes.len() as u32;
                Ok(Some(Chunk { pc, bytes }))
            }
            Line::Instruction {
                mnemonic,
                mode,
                operand,
            } => self.expand_instruction(ctx, mnemonic, mode, operand.as_ref()),
        }
    }

    fn expand_instruction(
        &self,
        ctx: &mut Context,
        mnemonic: &str,
        mode: &AddressingMode,
        operand: Option<&Operand>,
    ) -> Result<Option<Chunk>> {
        let entry = lookup(mnemonic, mode)?;
        let pc = ctx.pc;
        let mut bytes = vec![entry.opcode];

        match mode {
            AddressingMode::Implied => {}
            AddressingMode::Immediate => {
                let v = required(mnemonic, operand)?.resolve(ctx, Some(pc))?;
                if v > 0xFF {
                    return Err(ResolveError::new(
                        ResolveErrorReason::OutOfRange,
                        format!("immediate value ${:04X} does not fit in a byte", v),
                    ));
                }
                bytes.push(v as u8);
            }
            AddressingMode::Absolute => {
                let v = required(mnemonic, operand)?.resolve(ctx, Some(pc))?;
                bytes.extend_from_slice(&v.to_le_bytes());
            }
            AddressingMode::Relative => {
                // Branch offsets are relative to the CPU address right after
                // the instruction, so the branch's own position has to be
                // bank-mapped as well.
                let target = i64::from(required(mnemonic, operand)?.resolve(ctx, Some(pc))?);
                let from = i64::from(ctx.map_prg_to_cpu(pc)?) + 2;
                let delta = target - from;
                if !(-128..=127).contains(&delta) {
                    return Err(ResolveError::new(
                        ResolveErrorReason::OutOfRange,
                        format!("branch target is {} bytes away", delta),
                    ));
                }
                bytes.push(delta as i8 as u8);
            }
        }

        ctx.pc += u32::from(entry.size);
        Ok(Some(Chunk { pc, bytes }))
    }
}

fn lookup(mnemonic: &str, mode: &AddressingMode) -> Result<&'static ShortEntry> {
    INSTRUCTIONS
        .get(mnemonic)
        .and_then(|modes| modes.get(mode))
        .ok_or_else(|| {
            ResolveError::new(
                ResolveErrorReason::BadInstruction,
                format!("instruction '{}' has no {} addressing mode", mnemonic, mode),
            )
        })
}

fn required<'a>(mnemonic: &str, operand: Option<&'a Operand>) -> Result<&'a Operand> {
    operand.ok_or_else(|| {
        ResolveError::new(
            ResolveErrorReason::BadInstruction,
            format!("instruction '{}' requires an operand", mnemonic),
        )
    })
}
