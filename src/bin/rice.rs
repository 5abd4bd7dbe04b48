// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use ricing::{
    catalog::{Catalog, CatalogError, File, Program, RiceConfig, TextEncoding},
    service::{CatalogService, DeleteTarget},
};

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use inquire::Confirm;
use std::process::exit;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "rice [options] <rice-command>",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    /// Show debug output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    fn run(self) -> Result<()> {
        match self.command {
            Command::Init => run_init(),
            Command::Add(opts) => match opts.target {
                AddTarget::Program(opts) => run_add_program(opts),
                AddTarget::File(opts) => run_add_file(opts),
            },
            Command::List(opts) => run_list(opts),
            Command::Delete(opts) => run_delete(opts),
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Write default settings and create database.
    #[command(override_usage = "rice init")]
    Init,

    /// Track new program or file.
    #[command(override_usage = "rice add <program|file> [options]")]
    Add(AddOptions),

    /// List stored rices.
    #[command(override_usage = "rice list [options]")]
    List(ListOptions),

    /// Delete rice, or the entire catalog.
    #[command(override_usage = "rice delete [options] [<rice>]")]
    Delete(DeleteOptions),
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct AddOptions {
    #[command(subcommand)]
    pub target: AddTarget,
}

#[derive(Debug, Clone, Subcommand)]
enum AddTarget {
    /// Track program of a rice.
    #[command(override_usage = "rice add program [options] <name> <executable>")]
    Program(AddProgramOptions),

    /// Track configuration file of a program.
    #[command(override_usage = "rice add file [options] --program <program> <name> <path>")]
    File(AddFileOptions),
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct AddProgramOptions {
    /// Name of program.
    #[arg(required = true, value_name = "name")]
    pub name: String,

    /// Executable to locate program by.
    #[arg(required = true, value_name = "executable")]
    pub executable: String,

    /// Configuration path of program, defaults to ~/.config/<name>.
    #[arg(short, long, value_name = "path")]
    pub config_path: Option<String>,

    /// Rice to add program to.
    #[arg(short, long, value_name = "rice", default_value = "default")]
    pub rice: String,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct AddFileOptions {
    /// Name of file.
    #[arg(required = true, value_name = "name")]
    pub name: String,

    /// Path to file.
    #[arg(required = true, value_name = "path")]
    pub path: String,

    /// Name of program owning file.
    #[arg(short, long, required = true, value_name = "program")]
    pub program: String,

    /// Rice to add file to.
    #[arg(short, long, value_name = "rice", default_value = "default")]
    pub rice: String,

    /// Store content as raw bytes.
    #[arg(short, long)]
    pub bytes: bool,

    /// Text encoding of content.
    #[arg(short, long, value_name = "encoding", default_value = "utf-8")]
    pub encoding: TextEncoding,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct ListOptions {
    /// Show stored content of every file.
    #[arg(short, long)]
    pub contents: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct DeleteOptions {
    /// Rice to delete, every rice is deleted when omitted.
    #[arg(value_name = "rice")]
    pub rice: Option<String>,

    /// Back up database before deleting.
    #[arg(short, long)]
    pub backup: bool,

    /// Do not ask for confirmation.
    #[arg(short, long)]
    pub yes: bool,
}

fn main() {
    let cli = Cli::parse();

    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .with_timer(false)
        .without_time();
    let level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    if let Err(error) = cli.run() {
        error!("{error:?}");
        exit(1);
    }

    exit(0)
}

/// Open service and catalog, with stored rices loaded.
///
/// The store stays connected until the catalog is dropped.
fn open_session() -> Result<(CatalogService, Catalog)> {
    let service = CatalogService::from_env()?;
    let mut catalog = service.create_catalog();
    catalog.store_mut().open()?;
    service.load(&mut catalog)?;

    Ok((service, catalog))
}

fn rice_mut<'c>(catalog: &'c mut Catalog, name: &str) -> Result<&'c mut RiceConfig> {
    if catalog.config(name).is_none() {
        info!("create rice {name:?}");
        catalog.add_config(RiceConfig::new(name)?)?;
    }

    Ok(catalog
        .config_mut(name)
        .ok_or_else(|| CatalogError::UnknownConfig(name.into()))?)
}

fn run_init() -> Result<()> {
    let service = CatalogService::from_env()?;
    let settings = service.settings();
    let path = settings.settings_path();
    if path.exists() {
        info!("keep existing settings at {}", path.display());
    } else {
        std::fs::create_dir_all(&settings.home)?;
        std::fs::write(&path, settings.to_string())?;
        info!("wrote settings to {}", path.display());
    }

    let mut catalog = service.create_catalog();
    catalog.store_mut().create_schema()?;
    info!("catalog ready at {}", catalog.store().conn_str());

    Ok(())
}

fn run_add_program(opts: AddProgramOptions) -> Result<()> {
    let (service, mut catalog) = open_session()?;
    let config_path = opts
        .config_path
        .unwrap_or_else(|| format!("~/.config/{}", opts.name));
    let mut program = Program::new(service.resolver(), opts.name, opts.executable, config_path)?;
    if let Some(path) = service.discover(&mut program).cloned() {
        info!("found {:?} at {path}", program.name());
    }

    rice_mut(&mut catalog, &opts.rice)?.add_program(program)?;
    service.persist(&mut catalog)?;

    Ok(())
}

fn run_add_file(opts: AddFileOptions) -> Result<()> {
    let (service, mut catalog) = open_session()?;
    let program = catalog
        .program_by_name(&opts.program)
        .cloned()
        .ok_or_else(|| anyhow!("no program named {:?} is tracked", opts.program))?;
    let file = File::new(service.resolver(), opts.name, opts.path, &program)?
        .with_bytes(opts.bytes)
        .with_encoding(opts.encoding);

    let rice = rice_mut(&mut catalog, &opts.rice)?;
    if rice.program(program.name()).is_none() {
        rice.add_program(program)?;
    }
    rice.add_file(file)?;
    service.persist(&mut catalog)?;

    Ok(())
}

fn run_list(opts: ListOptions) -> Result<()> {
    // Listing connects only to an existing database.
    let service = CatalogService::from_env()?;
    let mut catalog = service.create_catalog();
    let report = service.retrieve_all(&mut catalog, opts.contents)?;
    if report.configs.is_empty() {
        info!("no rices stored");
    }
    print!("{report}");

    Ok(())
}

fn run_delete(opts: DeleteOptions) -> Result<()> {
    let service = CatalogService::from_env()?;
    let mut catalog = service.create_catalog();
    let (target, what) = match opts.rice {
        Some(name) => (DeleteTarget::Config(name.clone()), format!("rice {name:?}")),
        None => (DeleteTarget::Catalog, "every rice".to_string()),
    };

    if !opts.backup && !opts.yes {
        let proceed = Confirm::new(&format!("Delete {what} without backup?"))
            .with_default(false)
            .with_help_message("deleted rices cannot be recovered")
            .prompt()?;
        if !proceed {
            warn!("nothing deleted");
            return Ok(());
        }
    }

    if let Some(backup) = service.delete(&mut catalog, target, opts.backup)? {
        info!("backup written to {}", backup.display());
    }

    Ok(())
}
