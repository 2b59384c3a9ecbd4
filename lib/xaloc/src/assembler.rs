use crate::context::Context;
use crate::errors::AssembleError;
use crate::line::{Chunk, Line, Operand};
use crate::opcodes::{AddressingMode, INSTRUCTIONS};
use std::io::Read;

/// Drives the assembly of one source unit: parses the text into lines, runs
/// the label collection pass, then expands every line in textual order.
/// Failures come back attributed to the offending line, and anything merely
/// suspicious lands on the warnings list instead.
#[derive(Debug, Default)]
pub struct SourceUnit {
    context: Context,
    warnings: Vec<String>,
}

impl SourceUnit {
    pub fn new() -> Self {
        SourceUnit::default()
    }

    /// The context accumulated so far. Mostly useful to pre-seed bank
    /// windows before assembling, and to inspect the label table after.
    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut Context {
        &mut self.context
    }

    /// Warnings gathered during the last `assemble` call.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Assembles the source read from `input`, attributing diagnostics to
    /// `name`. Returns the emitted chunks in textual order, or every error
    /// found, each carrying the file, 1-based line and raw source text.
    pub fn assemble(
        &mut self,
        name: &str,
        mut input: impl Read,
    ) -> Result<Vec<Chunk>, Vec<AssembleError>> {
        self.warnings.clear();

        let mut text = String::new();
        if let Err(e) = input.read_to_string(&mut text) {
            return Err(vec![error(name, 0, "", format!("could not read the input: {}", e))]);
        }

        let mut parsed: Vec<(usize, &str, Line)> = Vec::new();
        let mut errors = Vec::new();
        for (num, raw) in text.lines().enumerate() {
            match parse_line(raw) {
                Ok(lines) => {
                    for line in lines {
                        parsed.push((num, raw, line));
                    }
                }
                Err(message) => errors.push(error(name, num, raw, message)),
            }
        }
        if !errors.is_empty() {
            return Err(errors);
        }

        // First pass: register every label at the program counter it will
        // land on, so the expansion pass can see forward definitions.
        self.context.pc = 0;
        for (_, _, line) in &parsed {
            line.declare(&mut self.context);
        }
        self.collect_warnings();

        // Second pass: expand in textual order against the running state.
        self.context.pc = 0;
        let mut chunks = Vec::new();
        for (num, raw, line) in &parsed {
            match line.expand(&mut self.context) {
                Ok(Some(chunk)) => chunks.push(chunk),
                Ok(None) => {}
                Err(e) => errors.push(error(name, *num, raw, e.to_string())),
            }
        }

        if errors.is_empty() {
            Ok(chunks)
        } else {
            Err(errors)
        }
    }

    // Multiple definitions only make sense for relative labels; anything
    // else redefined is almost surely a copy-paste accident.
    fn collect_warnings(&mut self) {
        let mut names: Vec<&String> = self.context.labels.keys().collect();
        names.sort();
        for name in names {
            let defs = self.context.labels[name].len();
            if defs > 1 && !is_relative_name(name) {
                self.warnings
                    .push(format!("label '{}' is defined {} times", name, defs));
            }
        }
    }
}

fn error(file: &str, line: usize, source: &str, message: String) -> AssembleError {
    AssembleError {
        file: file.to_string(),
        line,
        source: source.to_string(),
        message,
    }
}

// Parses one raw source line into zero, one or two `Line`s (a label prefix
// plus whatever follows it). Comments start at ';'.
fn parse_line(text: &str) -> Result<Vec<Line>, String> {
    let code = match text.find(';') {
        Some(i) => &text[..i],
        None => text,
    }
    .trim();
    if code.is_empty() {
        return Ok(vec![]);
    }

    let mut out = Vec::new();
    let mut rest = code;

    if let Some(i) = code.find(':') {
        let name = code[..i].trim();
        is_valid_identifier(name)?;
        out.push(Line::Label {
            name: name.to_string(),
        });
        rest = code[i + 1..].trim();
    } else {
        // A bare run of '-'/'+' at the start of the line is a relative
        // label definition.
        let first = code.split_whitespace().next().unwrap_or("");
        if is_relative_name(first) {
            out.push(Line::Label {
                name: first.to_string(),
            });
            rest = code[first.len()..].trim();
        }
    }

    if rest.is_empty() {
        return Ok(out);
    }
    out.push(if rest.starts_with('.') {
        parse_directive(rest)?
    } else {
        parse_instruction(rest)?
    });
    Ok(out)
}

fn parse_directive(code: &str) -> Result<Line, String> {
    let (name, args) = match code.split_once(char::is_whitespace) {
        Some((name, args)) => (name, args.trim()),
        None => (code, ""),
    };

    match name {
        ".org" => Ok(Line::Org {
            addr: parse_numeric(args)?,
        }),
        ".bank" => {
            let parts: Vec<&str> = args.split_whitespace().collect();
            if parts.len() != 3 {
                return Err(String::from(
                    "'.bank' takes exactly three arguments: prg, cpu and length",
                ));
            }
            let prg = parse_numeric(parts[0])?;
            let cpu = parse_numeric(parts[1])?;
            if cpu > 0xFFFF {
                return Err(format!("CPU address ${:X} is out of bounds", cpu));
            }
            Ok(Line::Bank {
                prg,
                cpu: cpu as u16,
                len: parse_numeric(parts[2])?,
            })
        }
        ".byte" => Ok(Line::Byte {
            values: parse_operands(args)?,
        }),
        ".word" => Ok(Line::Word {
            values: parse_operands(args)?,
        }),
        ".assert" => Ok(Line::Assert {
            addr: parse_numeric(args)?,
        }),
        _ => Err(format!("unknown directive '{}'", name)),
    }
}

fn parse_instruction(code: &str) -> Result<Line, String> {
    let (mnemonic, arg) = match code.split_once(char::is_whitespace) {
        Some((m, a)) => (m, a.trim()),
        None => (code, ""),
    };
    let mnemonic = mnemonic.to_lowercase();

    let Some(modes) = INSTRUCTIONS.get(&mnemonic) else {
        return Err(format!("unknown instruction '{}'", mnemonic));
    };

    if arg.is_empty() {
        if !modes.contains_key(&AddressingMode::Implied) {
            return Err(format!("instruction '{}' requires an operand", mnemonic));
        }
        return Ok(Line::Instruction {
            mnemonic,
            mode: AddressingMode::Implied,
            operand: None,
        });
    }

    if let Some(imm) = arg.strip_prefix('#') {
        if !modes.contains_key(&AddressingMode::Immediate) {
            return Err(format!(
                "instruction '{}' does not take an immediate operand",
                mnemonic
            ));
        }
        return Ok(Line::Instruction {
            mnemonic,
            mode: AddressingMode::Immediate,
            operand: Some(parse_operand(imm)),
        });
    }

    let mode = if modes.contains_key(&AddressingMode::Relative) {
        AddressingMode::Relative
    } else if modes.contains_key(&AddressingMode::Absolute) {
        AddressingMode::Absolute
    } else {
        return Err(format!("instruction '{}' does not take an operand", mnemonic));
    };
    Ok(Line::Instruction {
        mnemonic,
        mode,
        operand: Some(parse_operand(arg)),
    })
}

// Operands that fully parse as numbers become literals right away; anything
// else stays textual and goes through the label table at expansion time,
// where a failure gets a position attached.
fn parse_operand(arg: &str) -> Operand {
    match crate::context::parse_number(arg) {
        Ok(Some(value)) if value <= 0xFFFF => Operand::Literal(value as u16),
        _ => Operand::Reference(arg.to_string()),
    }
}

fn parse_operands(args: &str) -> Result<Vec<Operand>, String> {
    if args.is_empty() {
        return Err(String::from("expected at least one value"));
    }
    Ok(args.split(',').map(|arg| parse_operand(arg.trim())).collect())
}

// Directive arguments have to be plain number literals.
fn parse_numeric(arg: &str) -> Result<u32, String> {
    match crate::context::parse_number(arg) {
        Ok(Some(value)) => Ok(value),
        Ok(None) => Err(format!("expected a number, found '{}'", arg)),
        Err(e) => Err(e.to_string()),
    }
}

fn is_relative_name(name: &str) -> bool {
    !name.is_empty()
        && (name.chars().all(|c| c == '-') || name.chars().all(|c| c == '+'))
}

fn is_valid_identifier(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err(String::from("empty label name"));
    }
    // Register names would shadow the addressing syntax.
    if matches!(name.to_lowercase().as_str(), "a" | "x" | "y") {
        return Err(format!("cannot use reserved name '{}'", name));
    }
    let mut chars = name.chars();
    let first = chars.next().unwrap();
    if !(first.is_ascii_alphabetic() || first == '_')
        || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(format!("'{}' is not a valid label name", name));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assemble(src: &str) -> Vec<Chunk> {
        let mut unit = SourceUnit::new();
        unit.assemble("test.s", src.as_bytes()).unwrap()
    }

    fn flatten(chunks: &[Chunk]) -> Vec<u8> {
        chunks.iter().flat_map(|c| c.bytes.clone()).collect()
    }

    fn assert_error(src: &str, message: &str) {
        let mut unit = SourceUnit::new();
        let errors = unit.assemble("test.s", src.as_bytes()).unwrap_err();
        assert_eq!(errors.first().unwrap().to_string(), message);
    }

    #[test]
    fn assembles_a_small_program() {
        let chunks = assemble(
            r#"
.bank $0000 $8000 $4000
.org $0000

reset:
  lda #$01
  sta $0200
  rts
"#,
        );

        assert_eq!(flatten(&chunks), vec![0xA9, 0x01, 0x8D, 0x00, 0x02, 0x60]);
        assert_eq!(chunks[0].pc, 0);
        assert_eq!(chunks[2].pc, 5);
    }

    #[test]
    fn labels_resolve_through_the_bank() {
        let chunks = assemble(
            r#"
.bank $0000 $8000 $4000
.org $0000
.word main
main:
  rts
"#,
        );

        // 'main' sits at PRG $0002, which the bank maps to CPU $8002.
        assert_eq!(flatten(&chunks), vec![0x02, 0x80, 0x60]);
    }

    #[test]
    fn relative_labels_pick_the_nearest_definition() {
        let chunks = assemble(
            r#"
.bank $0000 $8000 $4000
.org $0000
-
  dex
  bne -
"#,
        );

        // The branch at CPU $8001 jumps back to the label at $8000.
        assert_eq!(flatten(&chunks), vec![0xCA, 0xD0, 0xFD]);
    }

    #[test]
    fn label_and_instruction_share_a_line() {
        let chunks = assemble(
            r#"
.bank $0000 $8000 $4000
loop: dex
beq loop
"#,
        );

        assert_eq!(flatten(&chunks), vec![0xCA, 0xF0, 0xFD]);
    }

    #[test]
    fn asserts_check_the_program_counter() {
        assemble(
            r#"
.org $0010
.byte $00, $01
.assert $0012
"#,
        );

        assert_error(
            ".assert $0005",
            "expected the program counter at $000005 but it is at $000000 \
             (test.s: line 1: '.assert $0005')",
        );
    }

    #[test]
    fn undefined_labels_are_attributed_to_their_line() {
        assert_error(
            "  jmp nowhere",
            "label 'nowhere' is not defined (test.s: line 1: 'jmp nowhere')",
        );
    }

    #[test]
    fn parse_errors_are_attributed_to_their_line() {
        assert_error(
            "\nfoo $12",
            "unknown instruction 'foo' (test.s: line 2: 'foo $12')",
        );
        assert_error(
            ".bank $00 $8000",
            "'.bank' takes exactly three arguments: prg, cpu and length \
             (test.s: line 1: '.bank $00 $8000')",
        );
        assert_error(
            "a: rts",
            "cannot use reserved name 'a' (test.s: line 1: 'a: rts')",
        );
    }

    #[test]
    fn duplicate_labels_warn() {
        let mut unit = SourceUnit::new();
        unit.assemble(
            "test.s",
            r#"
foo:
.byte $00
foo:
"#
            .as_bytes(),
        )
        .unwrap();

        assert_eq!(unit.warnings(), &["label 'foo' is defined 2 times"]);
    }

    #[test]
    fn relative_labels_do_not_warn() {
        let mut unit = SourceUnit::new();
        unit.assemble(
            "test.s",
            r#"
-
.byte $00
-
"#
            .as_bytes(),
        )
        .unwrap();

        assert!(unit.warnings().is_empty());
    }

    #[test]
    fn comments_and_blanks_are_skipped() {
        let chunks = assemble(
            r#"
; a comment on its own
  nop ; and one after code
"#,
        );

        assert_eq!(flatten(&chunks), vec![0xEA]);
    }
}
