use crate::context::Context;
use std::fs;
use std::path::Path;

/// One contiguous PRG-to-CPU window of a memory layout.
#[derive(Debug, Clone, PartialEq)]
pub struct Bank {
    pub prg: u32,
    pub cpu: u16,
    pub len: u32,
}

/// Resolves a layout identifier into its bank list. The identifier can name
/// one of the layouts baked into this library, or be a path to a TOML file
/// describing a custom one.
pub fn get_bank_layout(id: &str) -> Result<Vec<Bank>, String> {
    match id {
        // The common 32K PRG cartridge: everything visible at once.
        "nrom" => Ok(vec![Bank {
            prg: 0x0000,
            cpu: 0x8000,
            len: 0x8000,
        }]),
        // No windows at all: every bank comes from '.bank' directives.
        "empty" => Ok(vec![]),
        _ => {
            let path = Path::new(id);
            if !path.is_file() {
                return Err(format!("unknown bank layout '{}'", id));
            }
            let contents = fs::read_to_string(path)
                .map_err(|e| format!("could not read layout '{}': {}", id, e))?;
            parse_layout(&contents)
        }
    }
}

/// Parses a TOML bank layout:
///
/// ```toml
/// [[bank]]
/// prg = 0x0000
/// cpu = 0x8000
/// len = 0x4000
/// ```
pub fn parse_layout(contents: &str) -> Result<Vec<Bank>, String> {
    let table: toml::Table = contents
        .parse()
        .map_err(|e| format!("malformed layout: {}", e))?;

    let Some(banks) = table.get("bank") else {
        return Err(String::from("layout does not declare any 'bank' entries"));
    };
    let Some(list) = banks.as_array() else {
        return Err(String::from("'bank' has to be an array of tables"));
    };

    let mut ret = Vec::with_capacity(list.len());
    for (i, value) in list.iter().enumerate() {
        let Some(entry) = value.as_table() else {
            return Err(format!("bank #{} is not a table", i + 1));
        };
        let prg = integer(entry, "prg", i)?;
        let cpu = integer(entry, "cpu", i)?;
        let len = integer(entry, "len", i)?;
        if cpu > 0xFFFF {
            return Err(format!("bank #{}: CPU address {:#X} is out of bounds", i + 1, cpu));
        }
        ret.push(Bank {
            prg: prg as u32,
            cpu: cpu as u16,
            len: len as u32,
        });
    }
    Ok(ret)
}

/// Installs every window of `banks` into the given context.
pub fn apply(ctx: &mut Context, banks: &[Bank]) {
    for bank in banks {
        ctx.update_bank(bank.prg, bank.cpu, bank.len);
    }
}

fn integer(entry: &toml::Table, key: &str, index: usize) -> Result<i64, String> {
    match entry.get(key).and_then(toml::Value::as_integer) {
        Some(value) if value >= 0 => Ok(value),
        Some(_) => Err(format!("bank #{}: '{}' cannot be negative", index + 1, key)),
        None => Err(format!("bank #{} is missing the '{}' integer", index + 1, key)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn baked_in_layouts() {
        let nrom = get_bank_layout("nrom").unwrap();
        assert_eq!(nrom.len(), 1);
        assert_eq!(nrom[0].cpu, 0x8000);
        assert_eq!(nrom[0].len, 0x8000);

        assert!(get_bank_layout("empty").unwrap().is_empty());
        assert!(get_bank_layout("bogus").is_err());
    }

    #[test]
    fn parses_a_custom_layout() {
        let banks = parse_layout(
            r#"
[[bank]]
prg = 0x0000
cpu = 0x8000
len = 0x4000

[[bank]]
prg = 0x4000
cpu = 0xC000
len = 0x4000
"#,
        )
        .unwrap();

        assert_eq!(banks.len(), 2);
        assert_eq!(banks[1].prg, 0x4000);
        assert_eq!(banks[1].cpu, 0xC000);
    }

    #[test]
    fn layout_errors() {
        assert_eq!(
            parse_layout("answer = 42").unwrap_err(),
            "layout does not declare any 'bank' entries"
        );
        assert_eq!(
            parse_layout("[[bank]]\nprg = 0\ncpu = 0x8000").unwrap_err(),
            "bank #1 is missing the 'len' integer"
        );
        assert_eq!(
            parse_layout("[[bank]]\nprg = 0\ncpu = 0x10000\nlen = 1").unwrap_err(),
            "bank #1: CPU address 0x10000 is out of bounds"
        );
    }

    #[test]
    fn apply_installs_the_windows() {
        let mut ctx = Context::new();
        apply(&mut ctx, &get_bank_layout("nrom").unwrap());

        assert_eq!(ctx.map_prg_to_cpu(0x0000).unwrap(), 0x8000);
        assert_eq!(ctx.map_prg_to_cpu(0x7FFF).unwrap(), 0xFFFF);
    }
}
