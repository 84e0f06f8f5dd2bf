//! stepforge CLI
//!
//! Usage:
//!   stepforge [OPTIONS] [FILE]
//!
//! Options:
//!   -c, --catalog <FILE>    Command catalog (JSON)
//!   --config <FILE>         Generator configuration (TOML)
//!   -b, --backend <NAME>    Override the project's default backend
//!   -o, --output <FILE>     Write the program to a file instead of stdout
//!   --resolve <TEMPLATE>    Resolve one template with --bind k=v and print it
//!   --print-config          Print the default configuration
//!   -h, --help              Print help

use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use stepforge::{compile, resolve, Backend, Catalog, GeneratorConfig, ParameterBinding, Project};

#[derive(Parser)]
#[command(name = "stepforge")]
#[command(about = "Compile instrument automation step trees into Python")]
struct Cli {
    /// Project file (reads from stdin if not provided)
    input: Option<PathBuf>,

    /// Command catalog (JSON)
    #[arg(short, long)]
    catalog: Option<PathBuf>,

    /// Generator configuration (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the project's default backend
    #[arg(short, long, value_enum)]
    backend: Option<BackendArg>,

    /// Output file (stdout if not provided)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Resolve a single template and print the command
    #[arg(long, value_name = "TEMPLATE")]
    resolve: Option<String>,

    /// Binding for --resolve, as key=value
    #[arg(long = "bind", value_name = "KEY=VALUE")]
    bindings: Vec<String>,

    /// Print the default configuration as TOML
    #[arg(long)]
    print_config: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum BackendArg {
    #[value(alias = "pyvisa")]
    DirectRaw,
    #[value(alias = "tm-devices")]
    HighLevelDriver,
    #[value(alias = "tekhsi")]
    Streaming,
    Hybrid,
}

impl From<BackendArg> for Backend {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::DirectRaw => Backend::DirectRaw,
            BackendArg::HighLevelDriver => Backend::HighLevelDriver,
            BackendArg::Streaming => Backend::Streaming,
            BackendArg::Hybrid => Backend::Hybrid,
        }
    }
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(io::stderr)
        .init();

    if cli.print_config {
        match GeneratorConfig::default().to_toml() {
            Ok(text) => print!("{}", text),
            Err(e) => fail(format!("Error serializing configuration: {}", e)),
        }
        return;
    }

    if let Some(template) = &cli.resolve {
        let mut bindings = ParameterBinding::new();
        for pair in &cli.bindings {
            match pair.split_once('=') {
                Some((key, value)) => bindings.insert(key.trim(), value.trim()),
                None => fail(format!("Invalid binding '{}': expected key=value", pair)),
            }
        }
        match resolve(template, &[], &bindings) {
            Ok(command) => println!("{}", command),
            Err(e) => fail(e.format(template, "template")),
        }
        return;
    }

    let config = match &cli.config {
        Some(path) => GeneratorConfig::from_file(path).unwrap_or_else(|e| {
            fail(format!("Error loading config '{}': {}", path.display(), e))
        }),
        None => GeneratorConfig::default(),
    };

    let catalog = match &cli.catalog {
        Some(path) => Catalog::from_file(path).unwrap_or_else(|e| {
            fail(format!("Error loading catalog '{}': {}", path.display(), e))
        }),
        None => Catalog::new(),
    };

    let source = match &cli.input {
        Some(path) => fs::read_to_string(path)
            .unwrap_or_else(|e| fail(format!("Error reading file '{}': {}", path.display(), e))),
        None => {
            let mut buffer = String::new();
            if let Err(e) = io::stdin().read_to_string(&mut buffer) {
                fail(format!("Error reading from stdin: {}", e));
            }
            buffer
        }
    };

    let mut project = Project::from_json(&source)
        .unwrap_or_else(|e| fail(format!("Error parsing project: {}", e)));
    if let Some(backend) = cli.backend {
        project.backend = backend.into();
    }

    let script = compile(&project, &catalog, &config).unwrap_or_else(|e| fail(e.report()));
    for diagnostic in &script.diagnostics {
        eprintln!("warning: {}", diagnostic);
    }

    match &cli.output {
        Some(path) => {
            if let Err(e) = fs::write(path, &script.source) {
                fail(format!("Error writing '{}': {}", path.display(), e));
            }
        }
        None => print!("{}", script.source),
    }
}

fn fail(message: String) -> ! {
    eprintln!("{}", message);
    std::process::exit(1);
}
