//! Cur Compiler CLI
//!
//! Command-line interface for compiling `.cur` programs to native
//! executables and running them.

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{Shell, generate};
use std::io;
use std::path::PathBuf;
use std::process;

use curc::BuildOptions;

#[derive(Parser)]
#[command(name = "curc")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Cur compiler - compile .cur programs to executables", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a .cur file to an executable
    Build {
        /// Input .cur source file
        input: PathBuf,

        /// Keep intermediate output.c / output.h files
        #[arg(long)]
        keepc: bool,

        /// Print the token stream before parsing
        #[arg(long)]
        dump_tokens: bool,

        /// Print the parsed AST before analysis
        #[arg(long)]
        dump_ast: bool,
    },

    /// Compile a .cur file and immediately run it
    Run {
        /// Input .cur source file
        input: PathBuf,

        /// Keep intermediate output.c / output.h files
        #[arg(long)]
        keepc: bool,
    },

    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Build {
            input,
            keepc,
            dump_tokens,
            dump_ast,
        } => {
            let opts = BuildOptions {
                keepc,
                dump_tokens,
                dump_ast,
            };
            run_build(&input, &opts);
        }
        Commands::Run { input, keepc } => {
            let opts = BuildOptions {
                keepc,
                ..BuildOptions::default()
            };
            let exe = run_build(&input, &opts);
            match curc::run_executable(&exe) {
                Ok(code) => process::exit(code),
                Err(e) => {
                    eprintln!("{}", e);
                    process::exit(1);
                }
            }
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "curc", &mut io::stdout());
        }
    }
}

fn run_build(input: &std::path::Path, opts: &BuildOptions) -> PathBuf {
    match curc::compile_file(input, opts) {
        Ok(exe) => {
            println!("Compiled {} -> {}", input.display(), exe.display());
            exe
        }
        Err(e) => {
            eprintln!("{}", e);
            process::exit(1);
        }
    }
}
