//! Hoare verifier CLI

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use hoare::config::{Backend, Config};
use hoare::ir::Program;
use hoare::smt::SmtGenerator;
use hoare::verify::{self, Verdict, Verifier};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "hoare", version, about = "Deductive verifier for annotated CFG programs")]
struct Cli {
    /// Configuration file (defaults to ./hoare.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Solver backend: z3 or bounded
    #[arg(long, global = true)]
    solver: Option<Backend>,

    /// Path to the z3 binary
    #[arg(long, global = true)]
    z3: Option<PathBuf>,

    /// Per-query solver timeout in milliseconds
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Verify every function of a program
    Verify {
        /// Program in JSON IR form
        file: PathBuf,
    },
    /// List the basic paths of every function
    Paths {
        /// Program in JSON IR form
        file: PathBuf,
    },
    /// Print every verification condition without solving
    Vcs {
        /// Program in JSON IR form
        file: PathBuf,
        /// Print SMT-LIB2 queries instead of formulas
        #[arg(long)]
        smt: bool,
    },
}

/// Exit statuses
const EXIT_VALID: u8 = 0;
const EXIT_INVALID: u8 = 1;
const EXIT_UNKNOWN: u8 = 2;
const EXIT_ERROR: u8 = 3;

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match &cli.command {
        Command::Verify { file } => verify_file(&cli, file),
        Command::Paths { file } => paths_file(file).map(|()| EXIT_VALID),
        Command::Vcs { file, smt } => vcs_file(file, *smt).map(|()| EXIT_VALID),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(EXIT_ERROR)
        }
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "hoare=debug",
        _ => "hoare=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_program(path: &Path) -> Result<Program, Box<dyn std::error::Error>> {
    let text = std::fs::read_to_string(path)?;
    Ok(Program::from_json(&text)?)
}

fn load_config(cli: &Cli) -> Result<Config, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    };
    if let Some(backend) = cli.solver {
        config.solver.backend = backend;
    }
    if let Some(path) = &cli.z3 {
        config.solver.path = Some(path.clone());
    }
    if let Some(timeout) = cli.timeout {
        config.solver.timeout_ms = timeout;
    }
    Ok(config)
}

fn verify_file(cli: &Cli, path: &Path) -> Result<u8, Box<dyn std::error::Error>> {
    let program = load_program(path)?;
    let config = load_config(cli)?;
    let solver = config.solver.build()?;

    let verdict = Verifier::new(solver).apply(&program)?;
    println!("{verdict}");
    println!("result: {}", verdict.code());
    Ok(match verdict {
        Verdict::Valid => EXIT_VALID,
        Verdict::Invalid(_) => EXIT_INVALID,
        Verdict::Unknown(_) => EXIT_UNKNOWN,
    })
}

fn paths_file(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let program = load_program(path)?;
    program.validate()?;
    for func in &program.functions {
        println!("{}:", func.name);
        for path in verify::find_basic_paths(func)? {
            println!("  {path}");
        }
    }
    Ok(())
}

fn vcs_file(path: &Path, smt: bool) -> Result<(), Box<dyn std::error::Error>> {
    let program = load_program(path)?;
    let mut generator = SmtGenerator::new();
    if smt {
        for predicate in &program.predicates {
            generator.define_predicate(predicate)?;
        }
    }

    for obligation in verify::obligations(&program)? {
        println!(
            "; {} of `{}` on {}",
            obligation.kind, obligation.function, obligation.path
        );
        if smt {
            print!("{}", generator.validity_query(&obligation.formula)?);
        } else {
            println!("{}", obligation.formula);
        }
    }
    Ok(())
}
