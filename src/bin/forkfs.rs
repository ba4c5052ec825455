//! # forkfs CLI
//!
//! Builds a virtual filesystem from a JSON layout and inspects it.
//!
//! ## Usage
//! ```bash
//! # Print the whole tree
//! forkfs --config layout.json tree
//!
//! # Resolve paths, optionally for writing and from another directory
//! forkfs --config layout.json lookup --write --cwd /etc passwd ../tmp
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use forkfs::{Dir, Entry, FsConfig, FsError, Lookup};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Inspect fork-aware virtual filesystems
#[derive(Parser)]
#[command(name = "forkfs")]
#[command(version, about = "Build and inspect a virtual filesystem layout")]
#[command(long_about = None)]
struct Cli {
    /// JSON layout describing the filesystem
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the directory tree
    Tree {
        /// Stop descending below this depth
        #[arg(short, long)]
        depth: Option<usize>,
    },

    /// Resolve one or more paths
    Lookup {
        /// Resolve for writing
        #[arg(short, long)]
        write: bool,

        /// Directory that relative paths start from
        #[arg(long, default_value = "/")]
        cwd: String,

        /// Paths to resolve
        #[arg(required = true)]
        paths: Vec<String>,
    },
}

fn main() {
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose {
        EnvFilter::new("forkfs=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if std::env::var("NO_COLOR").is_ok() {
        colored::control::set_override(false);
    }

    if let Err(e) = run(cli) {
        eprintln!("{}: {:#}", "Error".red().bold(), e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => FsConfig::load(path)
            .with_context(|| format!("failed to load layout {}", path.display()))?,
        None => FsConfig::default(),
    };
    let root = config.build().context("failed to build filesystem")?;

    match cli.command {
        Commands::Tree { depth } => cmd_tree(&root, depth),
        Commands::Lookup { write, cwd, paths } => cmd_lookup(&root, &cwd, write, &paths),
    }
}

/// Print the tree below `root`
fn cmd_tree(root: &Dir, depth: Option<usize>) -> Result<()> {
    println!("{}", root.pathsep().to_string().blue().bold());
    print_children(root, "", depth.unwrap_or(usize::MAX))?;
    Ok(())
}

fn print_children(dir: &Dir, prefix: &str, remaining: usize) -> Result<()> {
    if remaining == 0 {
        return Ok(());
    }
    let names: Vec<String> = dir
        .names()
        .into_iter()
        .filter(|name| name != "." && name != "..")
        .collect();

    for (i, name) in names.iter().enumerate() {
        let last = i + 1 == names.len();
        let branch = if last { "└── " } else { "├── " };
        match dir.lookup(name, false) {
            Ok(Lookup::Found(Entry::Dir(sub))) => {
                let label = if sub.is_host() {
                    format!("{} {}", name.blue().bold(), "(host)".dimmed())
                } else {
                    name.blue().bold().to_string()
                };
                println!("{}{}{}", prefix, branch, label);
                let nested = format!("{}{}", prefix, if last { "    " } else { "│   " });
                print_children(&sub, &nested, remaining - 1)?;
            }
            Ok(Lookup::Found(Entry::File(file))) => {
                let marker = if file.writable() { "" } else { " (read-only)" };
                println!("{}{}{}{}", prefix, branch, name, marker.dimmed());
            }
            Ok(_) => println!("{}{}{}", prefix, branch, name.dimmed()),
            Err(FsError::UnsupportedHostNode { .. }) => {
                println!("{}{}{} {}", prefix, branch, name.yellow(), "(unsupported)".dimmed());
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

/// Resolve every path from `cwd` and report the outcome
fn cmd_lookup(root: &Dir, cwd: &str, write: bool, paths: &[String]) -> Result<()> {
    let start = match root.lookup(cwd, false)? {
        Lookup::Found(Entry::Dir(dir)) => dir,
        _ => anyhow::bail!("working directory {} is not a directory", cwd),
    };

    for path in paths {
        let outcome = match start.lookup(path, write)? {
            Lookup::Found(Entry::Dir(_)) => "found dir".green().bold(),
            Lookup::Found(Entry::File(_)) => "found file".green().bold(),
            Lookup::NotFound => "not found".red().bold(),
            Lookup::NotWritable => "not writable".yellow().bold(),
        };
        println!("{}: {}", path, outcome);
    }
    Ok(())
}
