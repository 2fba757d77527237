//! CLI tool to validate batspp test descriptions and inspect the
//! front end's output.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use batspp::{Context, Error, Settings};
use clap::{Args, Parser, Subcommand};
use tracing::Level;

#[derive(Parser, Debug)]
#[command(name = "batspp")]
#[command(version)]
#[command(about = "Check batspp test files and dump their syntax tree")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    options: Options,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check that files parse and resolve
    Check {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Print the resolved syntax tree of a file
    Ast { file: PathBuf },
    /// Print the token stream of a file
    Tokens { file: PathBuf },
}

#[derive(Args, Debug)]
struct Options {
    /// Read tests from the comments of a host script
    #[arg(long, global = true)]
    embedded_tests: bool,

    /// File to source before the tests (repeatable)
    #[arg(long = "source", global = true)]
    sources: Vec<PathBuf>,

    /// Directory to add to PATH (repeatable)
    #[arg(long = "visible-path", global = true)]
    visible_paths: Vec<PathBuf>,

    /// Scratch directory for test runs
    #[arg(long, global = true, default_value = batspp::settings::DEFAULT_TEMP_DIR)]
    temp_dir: PathBuf,

    /// Directory copied into each test's folder
    #[arg(long, global = true, default_value = "")]
    copy_dir: PathBuf,

    /// Shell redirection for debug output
    #[arg(long, global = true, default_value = "")]
    debug_sink: String,

    /// Do not enable alias expansion
    #[arg(long, global = true)]
    disable_aliases: bool,
}

impl Options {
    fn settings(&self) -> Settings {
        Settings::new()
            .sources(self.sources.iter().cloned())
            .visible_paths(self.visible_paths.iter().cloned())
            .temp_dir(&self.temp_dir)
            .copy_dir(&self.copy_dir)
            .debug_sink(self.debug_sink.clone())
            .disable_aliases(self.disable_aliases)
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn report(path: &Path, error: &Error) {
    eprintln!("{}: {error}", path.display());
    eprintln!("{}", error.span().excerpt());
}

fn read(path: &Path) -> Option<String> {
    match fs::read_to_string(path) {
        Ok(content) => Some(content),
        Err(e) => {
            eprintln!("{}: {e}", path.display());
            None
        }
    }
}

/// Run every pass over each file; returns whether all succeeded.
fn check(files: &[PathBuf], embedded: bool, settings: &Settings) -> bool {
    let mut ok = true;
    for path in files {
        let Some(content) = read(path) else {
            ok = false;
            continue;
        };
        match batspp::front_end(&content, embedded, settings) {
            Ok(suite) => {
                let tests = suite.tests().count();
                eprintln!("{}: valid ({tests} test(s))", path.display());
            }
            Err(e) => {
                report(path, &e);
                ok = false;
            }
        }
    }
    ok
}

fn print_ast(path: &Path, embedded: bool, settings: &Settings) -> bool {
    let Some(content) = read(path) else {
        return false;
    };
    match batspp::front_end(&content, embedded, settings) {
        Ok(suite) => {
            println!("{suite:#?}");
            true
        }
        Err(e) => {
            report(path, &e);
            false
        }
    }
}

fn print_tokens(path: &Path, embedded: bool) -> bool {
    let Some(content) = read(path) else {
        return false;
    };
    let mut context = Context {
        embedded_tests: embedded,
        ..Context::default()
    };
    match batspp::tokenize(&content, &mut context) {
        Ok(tokens) => {
            for token in tokens {
                println!(
                    "{}:{}\t{}\t{:?}",
                    token.span.line, token.span.column, token.kind, token.text
                );
            }
            true
        }
        Err(e) => {
            report(path, &Error::from(e));
            false
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let settings = cli.options.settings();
    let embedded = cli.options.embedded_tests;

    let ok = match &cli.command {
        Command::Check { files } => check(files, embedded, &settings),
        Command::Ast { file } => print_ast(file, embedded, &settings),
        Command::Tokens { file } => print_tokens(file, embedded),
    };

    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
