use anyhow::{Context, Result};
use clap::Parser as ClapParser;
use serde::Serialize;
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use sauce_script::format::SourceFile;
use sauce_script::script::{
    decode, DecodeOptions, Formatter, Listing, OpcodeSet, SymbolTable, SyscallNames,
    UnknownOpcodePolicy,
};
use sauce_script::{Nls, SobUnit, SobUnits};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    Text,
    Yaml,
}

/// Disassemble Sauce `.sob` units and recover their embedded sources
#[derive(ClapParser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Opcode-set revision (v0, v1, v2)
    #[arg(short = 's', long = "opcodes", default_value = "v2")]
    opcodes: OpcodeSet,

    /// Abort a unit on the first unknown opcode
    #[arg(long)]
    strict: bool,

    /// Encoding of string literals and source file names
    #[arg(short, long, default_value = "latin1")]
    lang: Nls,

    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Write the disassembly here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// YAML map of syscall id to name
    #[arg(long)]
    syscalls: Option<PathBuf>,

    /// Where recovered sources go (default: next to the input)
    #[arg(long)]
    source_dir: Option<PathBuf>,

    #[arg(long)]
    no_source: bool,

    #[arg(long)]
    no_disasm: bool,

    #[arg(long)]
    no_header: bool,
}

#[derive(Debug, Serialize)]
struct FileListing {
    file: String,
    units: Vec<Listing>,
}

struct Session<'a> {
    args: &'a Args,
    syscalls: Option<SyscallNames>,
    listings: Vec<FileListing>,
}

impl<'a> Session<'a> {
    fn new(args: &'a Args) -> Result<Self> {
        let syscalls = match &args.syscalls {
            Some(path) => {
                let text = fs::read_to_string(path)
                    .with_context(|| format!("read syscall table {:?}", path))?;
                let names: SyscallNames = serde_yaml::from_str(&text)
                    .with_context(|| format!("parse syscall table {:?}", path))?;
                log::info!("loaded {} syscall names", names.len());
                Some(names)
            }
            None => None,
        };
        Ok(Self {
            args,
            syscalls,
            listings: Vec::new(),
        })
    }

    fn decode_options(&self) -> DecodeOptions {
        DecodeOptions {
            opcode_set: self.args.opcodes,
            on_unknown: if self.args.strict {
                UnknownOpcodePolicy::Fail
            } else {
                UnknownOpcodePolicy::Continue
            },
        }
    }

    /// Process every unit of one buffer. Returns `false` when any unit was
    /// malformed.
    fn process_buffer(&mut self, input: &Path, bytes: &[u8], out: &mut dyn Write) -> Result<bool> {
        let mut clean = true;
        let mut units = Vec::new();

        for unit in SobUnits::new(bytes) {
            let unit = match unit {
                Ok(unit) => unit,
                Err(e) => {
                    log::error!("{}: {e}", input.display());
                    clean = false;
                    break;
                }
            };

            if let Some(source) = &unit.source {
                if let Some(e) = &source.truncated {
                    log::error!("{}: {e}", input.display());
                    clean = false;
                }
                if !self.args.no_source {
                    self.write_sources(input, &source.files)?;
                }
            }

            if !self.args.no_disasm {
                clean &= self.disassemble_unit(&unit, out, &mut units)?;
            }
        }

        if self.args.format == OutputFormat::Yaml && !self.args.no_disasm {
            self.listings.push(FileListing {
                file: input.display().to_string(),
                units,
            });
        }
        Ok(clean)
    }

    /// `false` when the bytecode could not be decoded.
    fn disassemble_unit(
        &self,
        unit: &SobUnit<'_>,
        out: &mut dyn Write,
        listings: &mut Vec<Listing>,
    ) -> Result<bool> {
        let symbols = SymbolTable::from_unit(unit, self.args.lang);
        let decoded = match decode(unit.bytecode, &self.decode_options()) {
            Ok(decoded) => decoded,
            Err(e) => {
                log::error!("unit #{}: {e}", unit.index);
                return Ok(false);
            }
        };

        let mut formatter = Formatter::new(&symbols);
        if let Some(names) = &self.syscalls {
            formatter = formatter.with_syscalls(names);
        }

        match self.args.format {
            OutputFormat::Text => {
                if !self.args.no_header {
                    out.write_all(formatter.render_header(unit).as_bytes())?;
                }
                let text = formatter.render_text(unit, &decoded);
                out.write_all(text.as_bytes())?;
                out.write_all(formatter.render_summary(unit).as_bytes())?;
                writeln!(out)?;
            }
            OutputFormat::Yaml => listings.push(formatter.listing(unit, &decoded)),
        }

        let stats = formatter.stats();
        log::info!(
            "unit #{} ({}): {} instructions, {} unknown opcodes, {} unresolved symbols",
            unit.index,
            symbols.class_label(1),
            stats.instructions,
            stats.unknown_opcodes,
            stats.unresolved_symbols
        );
        Ok(true)
    }

    fn write_sources(&self, input: &Path, files: &[SourceFile]) -> Result<()> {
        let dir = match &self.args.source_dir {
            Some(dir) => dir.clone(),
            None => input.parent().map(Path::to_path_buf).unwrap_or_default(),
        };
        if !dir.as_os_str().is_empty() && !dir.exists() {
            fs::create_dir_all(&dir).with_context(|| format!("create {:?}", dir))?;
        }

        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        for file in files {
            let name = self.args.lang.decode(&file.name);
            let path = dir.join(source_file_name(&stem, &name));
            fs::write(&path, &file.contents).with_context(|| format!("write {:?}", path))?;
            log::info!("recovered {}", path.display());
        }
        Ok(())
    }

    fn finish(self, out: &mut dyn Write) -> Result<()> {
        if self.args.format == OutputFormat::Yaml && !self.args.no_disasm {
            serde_yaml::to_writer(&mut *out, &self.listings)?;
        }
        out.flush()?;
        Ok(())
    }
}

/// `<stem>-<name>`, with path separators in `name` flattened.
fn source_file_name(stem: &str, name: &str) -> String {
    let name: String = name
        .trim_end_matches('\r')
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | ':') { '_' } else { c })
        .collect();
    format!("{stem}-{name}")
}

fn main() -> Result<ExitCode> {
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));
    let args = Args::parse();

    let mut out: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(BufWriter::new(
            fs::File::create(path).with_context(|| format!("create {:?}", path))?,
        )),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };

    let mut session = Session::new(&args)?;
    let mut clean = true;
    for input in &args.inputs {
        let bytes = match fs::read(input) {
            Ok(bytes) => bytes,
            Err(e) => {
                log::error!("read {:?}: {e}", input);
                clean = false;
                continue;
            }
        };
        clean &= session
            .process_buffer(input, &bytes, &mut out)
            .with_context(|| format!("process {:?}", input))?;
    }
    session.finish(&mut out)?;

    Ok(if clean { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}
