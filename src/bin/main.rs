use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use walkdir::WalkDir;

use jfront::config::parse_path_list;
use jfront::consts::SOURCE_SUFFIX;
use jfront::ir::{ClassSink, DirectorySink, MemorySink};
use jfront::parser::{parse, Lexer};
use jfront::Config;

#[derive(Parser)]
#[command(name = "jfront")]
#[command(about = "Semantic analysis and lowering front end")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile source files (and every unit they reach) to the IR
    Compile {
        /// Source files or directories to search for them
        #[arg(value_name = "FILES", required = true)]
        inputs: Vec<PathBuf>,

        /// Source roots, in platform path-list syntax
        #[arg(short, long, value_name = "PATH")]
        sourcepath: Option<String>,

        /// Compiled-class roots, in platform path-list syntax
        #[arg(short, long, value_name = "PATH")]
        classpath: Option<String>,

        /// Write one textual IR file per class under DIR
        #[arg(short = 'd', value_name = "DIR")]
        output: Option<PathBuf>,

        /// Print the IR of every class
        #[arg(long)]
        print_ir: bool,

        /// More logging (-v stages, -vv details)
        #[arg(short, long, action = ArgAction::Count)]
        verbose: u8,
    },

    /// Parse a file and show the AST
    Parse {
        #[arg(value_name = "FILE")]
        input: PathBuf,
    },

    /// Lexically analyze a file
    Lex {
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Show token locations
        #[arg(short, long)]
        locations: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let verbosity = match &cli.command {
        Commands::Compile { verbose, .. } => *verbose,
        _ => 0,
    };
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match cli.command {
        Commands::Compile { inputs, sourcepath, classpath, output, print_ir, .. } => {
            compile(&inputs, sourcepath.as_deref(), classpath.as_deref(), output, print_ir)
        }
        Commands::Parse { input } => parse_file(&input),
        Commands::Lex { input, locations } => lex_file(&input, locations),
    }
}

/// Expand directory arguments into the source files below them
fn source_files(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for input in inputs {
        if !input.is_dir() {
            files.push(input.clone());
            continue;
        }
        for entry in WalkDir::new(input).sort_by_file_name() {
            let entry = entry.with_context(|| format!("cannot walk {}", input.display()))?;
            let path = entry.path();
            if entry.file_type().is_file() && path.extension().is_some_and(|ext| ext == SOURCE_SUFFIX) {
                files.push(path.to_path_buf());
            }
        }
    }
    Ok(files)
}

fn compile(
    inputs: &[PathBuf],
    sourcepath: Option<&str>,
    classpath: Option<&str>,
    output: Option<PathBuf>,
    print_ir: bool,
) -> Result<()> {
    let mut config = Config::from_env();
    if let Some(paths) = sourcepath {
        config.source_roots = parse_path_list(paths);
    }
    if let Some(paths) = classpath {
        config.class_roots = parse_path_list(paths);
    }
    if let Some(dir) = &output {
        config = config.with_output_dir(dir);
    }
    config.validate()?;

    let files = source_files(inputs)?;
    log::info!("compiling {} files", files.len());
    let mut memory = MemorySink::new();
    jfront::compile_files(config, &files, &mut memory)?;

    if print_ir {
        for class in &memory.classes {
            println!("{}", class);
        }
    }
    if let Some(dir) = output {
        let mut sink = DirectorySink::new(dir);
        for class in memory.classes {
            sink.accept(class)?;
        }
        log::info!("wrote {} files under {}", sink.written().len(), sink.root().display());
    }
    Ok(())
}

fn parse_file(input: &Path) -> Result<()> {
    let source = fs::read_to_string(input).with_context(|| format!("cannot read {}", input.display()))?;
    let ast = parse(&source).map_err(|e| e.with_file(input))?;
    println!("{:#?}", ast);
    Ok(())
}

fn lex_file(input: &Path, locations: bool) -> Result<()> {
    let source = fs::read_to_string(input).with_context(|| format!("cannot read {}", input.display()))?;
    let tokens = Lexer::new(&source).tokenize().map_err(|e| e.with_file(input))?;
    for token in tokens {
        if locations {
            println!("{:?} at {}", token.token, token.location);
        } else {
            println!("{:?}: '{}'", token.token, token.lexeme);
        }
    }
    Ok(())
}
