use anyhow::{bail, Result};
use clap::Parser as ClapParser;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;
use xaloc::assembler::SourceUnit;
use xaloc::cfg::{apply, get_bank_layout};

/// Assembler for the 6502 microprocessor that targets the NES/Famicom.
#[derive(ClapParser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Assemble the instructions given on this file. The standard input is
    /// used when this argument is not given.
    file: Option<String>,

    /// Bank layout to be used. This can be an identifier for the layouts
    /// already baked in into this application, or it can be a file path to a
    /// TOML layout of your choosing. Defaults to 'nrom'.
    #[arg(short = 'c', long)]
    config: Option<String>,

    /// Place the output into the given <OUT> file. Ignored if the `stdout`
    /// flag is provided. Defaults to `out.bin`.
    #[arg(short = 'o', long)]
    out: Option<String>,

    /// Treat warnings as errors.
    #[arg(short = 'W', value_name = "Error")]
    w: Option<String>,

    /// Spit the output into the standard output instead. This ignores any
    /// given `out` flag. Disabled by default.
    #[arg(long, default_value_t = false)]
    stdout: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Select the input stream and the name used on diagnostics.
    let input: Box<dyn Read>;
    let input_name = match &args.file {
        Some(file) => {
            if !Path::new(file).is_file() {
                bail!("Input file must be a valid file");
            }
            input = Box::new(File::open(file)?);
            file.as_str()
        }
        None => {
            input = Box::new(io::stdin());
            "<stdin>"
        }
    };

    // Select the output stream.
    let mut output: Box<dyn Write> = if args.stdout {
        Box::new(io::stdout())
    } else {
        Box::new(File::create(args.out.unwrap_or(String::from("out.bin")))?)
    };

    // Check if warnings have to be treated as errors.
    let warn_as_errors = match args.w {
        Some(value) => {
            if value.to_lowercase() != "error" {
                bail!("The '-W' flag can only be used as '-Werror'");
            } else {
                true
            }
        }
        None => false,
    };

    // Select the bank layout.
    let config = args.config.unwrap_or(String::from("nrom"));
    let layout = match get_bank_layout(&config) {
        Ok(layout) => layout,
        Err(e) => {
            eprintln!("error: {}", e);
            std::process::exit(1);
        }
    };

    // And assemble.
    let mut error_count = 0;
    let mut unit = SourceUnit::new();
    apply(unit.context_mut(), &layout);
    match unit.assemble(input_name, input) {
        Ok(chunks) => {
            for warning in unit.warnings() {
                if warn_as_errors {
                    eprintln!("error: {}", warning);
                    error_count += 1;
                } else {
                    eprintln!("warning: {}", warning);
                }
            }
            if error_count == 0 {
                for chunk in chunks {
                    output.write_all(&chunk.bytes)?;
                }
            }
        }
        Err(errors) => {
            for warning in unit.warnings() {
                if warn_as_errors {
                    eprintln!("error: {}", warning);
                    error_count += 1;
                } else {
                    eprintln!("warning: {}", warning);
                }
            }
            for err in errors {
                eprintln!("error: {}", err);
                error_count += 1;
            }
        }
    }

    std::process::exit(error_count);
}
