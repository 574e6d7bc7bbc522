//! obnova - Rebuild .proto schema files from compiled-binary type metadata
//!
//! This tool consumes a descriptor set — the type-metadata dump an assembly
//! metadata reader produces from a binary that embeds generated protobuf
//! messages — and reconstructs a set of compilable `.proto` source files.

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use obnova_core::{DescriptorSet, Rebuilder};
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, warn, Level};
use tracing_subscriber::EnvFilter;

/// Rebuild .proto schema files from compiled-binary type metadata
#[derive(Parser, Debug)]
#[command(name = "obnova")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the descriptor set extracted from the target binary
    input: PathBuf,

    /// Directory where the generated .proto files will be saved
    output: PathBuf,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    // accept the Windows-style help flag alongside -h/--help
    if std::env::args().any(|arg| arg == "/?") {
        let _ = Cli::command().print_help();
        return ExitCode::from(1);
    }

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            // help output is not a successful run; only --version is
            return match e.kind() {
                ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::from(1),
            };
        }
    };

    // Initialize tracing
    let level = match cli.verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_target(false)
        .init();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Error: {e:#}");
            ExitCode::from(1)
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    info!("Analyzing descriptor set: {}", cli.input.display());
    let set = DescriptorSet::from_file(&cli.input).with_context(|| {
        format!(
            "failed to load descriptor set from {}",
            cli.input.display()
        )
    })?;

    let schema = Rebuilder::new(set).rebuild()?;

    info!("{} .proto file(s) will be written:", schema.files().len());
    for file in schema.files() {
        info!("  {}", file.file_name);
        info!(
            "    package: {}, namespace: {}, messages: {}, enums: {}",
            file.package_name,
            file.namespace,
            file.messages.len(),
            file.enums.len()
        );
    }

    // render everything up front so a fatal error leaves no partial output
    let mut rendered = Vec::with_capacity(schema.files().len());
    for file in schema.files() {
        rendered.push((file.file_name.clone(), schema.render(file)?));
    }

    if !cli.output.exists() {
        warn!(
            "Directory does not exist, creating: {}",
            cli.output.display()
        );
        fs::create_dir_all(&cli.output).with_context(|| {
            format!("failed to create directory {}", cli.output.display())
        })?;
    }

    info!("Writing .proto files to {}...", cli.output.display());
    for (file_name, content) in rendered {
        let path = cli.output.join(&file_name);
        info!("Writing {}...", path.display());
        fs::write(&path, content)
            .with_context(|| format!("failed to write {}", path.display()))?;
    }

    info!("Done.");
    Ok(())
}
