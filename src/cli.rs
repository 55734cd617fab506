//! Command-line entry point (spec §6 "CLI").

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser as ClapParser;
use tracing::{debug, error};

use crate::compiler::Compiler;
use crate::host::StdHost;
use crate::opcode::Op;
use crate::vm::Vm;

/// Compile and run an Ascension script.
///
/// `-debug` is spec.md:132's literal single-dash, multi-letter flag
/// spelling, which clap derive cannot itself produce (clap would parse it as
/// a cluster of unknown single-letter flags `-d -e -b -u -g`). It is
/// stripped out of `env::args()` by hand before the rest of the argument
/// list reaches clap, rather than approximated by clap's own `-d`/`--debug`
/// convention.
#[derive(Debug, ClapParser)]
#[command(name = "ascension", version, about = "Compiler and virtual machine for the Ascension scripting language")]
struct RawCli {
    /// Path to the `.asc` source file to run.
    pub file: PathBuf,
}

#[derive(Debug)]
pub struct Cli {
    pub file: PathBuf,
    pub debug: bool,
}

impl Cli {
    pub fn parse() -> Self {
        let mut args: Vec<String> = std::env::args().collect();
        let debug = match args.iter().position(|a| a == "-debug") {
            Some(pos) => {
                args.remove(pos);
                true
            }
            None => false,
        };
        let raw = RawCli::parse_from(args);
        Cli { file: raw.file, debug }
    }
}

pub fn run() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .without_time()
        .init();

    let cli = Cli::parse();
    match run_file(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn run_file(cli: &Cli) -> Result<(), String> {
    let source = std::fs::read_to_string(&cli.file).map_err(|e| format!("cannot read '{}': {e}", cli.file.display()))?;
    let base_dir = cli.file.parent().unwrap_or_else(|| Path::new("."));

    debug!(file = %cli.file.display(), "compiling");
    let program = Compiler::compile(&source, base_dir).map_err(|e| e.diagnostic())?;

    if cli.debug {
        print_listing(&program);
    }

    let mut vm = Vm::new(Box::new(StdHost::new()));
    vm.run(&program).map_err(|e| {
        error!(ip = ?e.ip, kind = %e.kind, "uncaught error");
        e.diagnostic()
    })
}

fn print_listing(program: &crate::opcode::Program) {
    for (i, op) in program.ops.iter().enumerate() {
        println!("{i:>5}  {}", describe(op));
    }
}

fn describe(op: &Op) -> String {
    format!("{op:?}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["ascension".to_string()];
        argv.extend(args.iter().map(|a| a.to_string()));
        let debug = match argv.iter().position(|a| a == "-debug") {
            Some(pos) => {
                argv.remove(pos);
                true
            }
            None => false,
        };
        let raw = RawCli::parse_from(argv);
        Cli { file: raw.file, debug }
    }

    #[test]
    fn literal_dash_debug_flag_is_recognized() {
        let cli = parse(&["script.asc", "-debug"]);
        assert!(cli.debug);
        assert_eq!(cli.file, PathBuf::from("script.asc"));
    }

    #[test]
    fn debug_flag_absent_by_default() {
        let cli = parse(&["script.asc"]);
        assert!(!cli.debug);
    }
}
