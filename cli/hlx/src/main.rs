//! hlx CLI: lower op modules to target programs and inspect the results.

mod commands;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use log::LevelFilter;
use simplelog::{Config, SimpleLogger};

use commands::inspect::Export;
use commands::lower::Emit;

#[derive(Parser)]
#[command(name = "hlx", version, about = "Lower hlx op modules to flat programs")]
struct Cli {
    /// Log every lowered op
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a JSON op module into a program
    Lower {
        /// Input module (.json)
        input: PathBuf,
        /// Options file with a [lowering] table
        #[arg(long)]
        config: Option<PathBuf>,
        /// Pass all entry arguments as one tuple parameter
        #[arg(long)]
        tuple_args: bool,
        /// Always return a tuple from the entry computation
        #[arg(long)]
        return_tuple: bool,
        /// Output encoding
        #[arg(long, value_enum, default_value_t = Emit::Json)]
        emit: Emit,
        /// Output file (default: stdout)
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Verify and print a binary program container
    Inspect {
        /// Input container (.hlxp)
        input: PathBuf,
        /// Output format
        #[arg(long, value_enum, default_value_t = Export::Text)]
        export: Export,
    },
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose {
        LevelFilter::Trace
    } else {
        LevelFilter::Info
    };
    // Only fails if a logger is already installed.
    let _ = SimpleLogger::init(level, Config::default());

    if let Err(e) = run(cli) {
        eprintln!("error: {e:#}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Lower {
            input,
            config,
            tuple_args,
            return_tuple,
            emit,
            output,
        } => commands::lower::run(
            &input,
            config.as_deref(),
            tuple_args,
            return_tuple,
            emit,
            output.as_deref(),
        ),
        Commands::Inspect { input, export } => commands::inspect::run(&input, export),
    }
}
