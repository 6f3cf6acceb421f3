use anyhow::{Context, bail};
use arena_launch::render::{OutputFormat, render_fleet, render_plan};
use arena_launch::settings::Settings;
use arena_launch::{Catalog, Composer, DEFAULT_INSTANCE_ARG, FragmentId, instance_ids};
use clap::{Args, Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub type Result<T> = anyhow::Result<T>;

#[derive(Parser)]
#[command(name = "arena-launch")]
#[command(about = "Resolve launch fragments into a process plan", long_about = None)]
struct Cli {
    /// Settings file (YAML) with defaults for catalog, args and format.
    #[arg(long, global = true, env = "ARENA_LAUNCH_CONFIG")]
    config: Option<PathBuf>,

    /// Log filter used when RUST_LOG is not set.
    #[arg(long, global = true, env = "ARENA_LAUNCH_LOG_LEVEL", default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Args)]
struct Output {
    #[arg(long, value_enum)]
    format: Option<OutputFormat>,

    /// Write to a file instead of stdout.
    #[arg(short = 'o', long)]
    out: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve one root fragment into a plan.
    Resolve {
        #[arg(long)]
        catalog: Option<PathBuf>,

        #[arg(long)]
        root: String,

        /// Root argument, `name=value`. Repeatable.
        #[arg(long = "arg", value_parser = parse_key_val)]
        args: Vec<(String, String)>,

        /// Root namespace prefix.
        #[arg(long)]
        namespace: Option<String>,

        #[command(flatten)]
        output: Output,
    },
    /// Load and validate every file in a catalog.
    Check {
        #[arg(long)]
        catalog: Option<PathBuf>,
    },
    /// Resolve one plan per training environment.
    Fleet {
        #[arg(long)]
        catalog: Option<PathBuf>,

        #[arg(long)]
        root: String,

        #[arg(long)]
        instances: usize,

        /// Instance ids are `{prefix}_1` .. `{prefix}_N`.
        #[arg(long)]
        prefix: Option<String>,

        #[arg(long, default_value = DEFAULT_INSTANCE_ARG)]
        instance_arg: String,

        #[arg(long = "arg", value_parser = parse_key_val)]
        args: Vec<(String, String)>,

        #[command(flatten)]
        output: Output,
    },
}

fn parse_key_val(s: &str) -> std::result::Result<(String, String), String> {
    let (k, v) = s
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got {:?}", s))?;
    Ok((k.trim().to_string(), v.to_string()))
}

fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    Ok(())
}

fn load_catalog(flag: Option<PathBuf>, settings: &Settings) -> Result<Catalog> {
    let dir = flag
        .or_else(|| settings.catalog.clone())
        .context("no catalog directory: pass --catalog or set `catalog` in the settings file")?;
    Catalog::load_dir(&dir).with_context(|| format!("loading catalog {}", dir.display()))
}

fn root_args(settings: &Settings, cli: Vec<(String, String)>) -> BTreeMap<String, String> {
    let mut args = settings.args.clone();
    args.extend(cli);
    args
}

fn emit(text: &str, out: Option<&Path>) -> Result<()> {
    match out {
        Some(path) => {
            std::fs::write(path, text).with_context(|| format!("writing {}", path.display()))?;
            info!(path = %path.display(), "plan written");
        }
        None => print!("{}", text),
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    let settings = match &cli.config {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };

    match cli.cmd {
        Commands::Resolve {
            catalog,
            root,
            args,
            namespace,
            output,
        } => {
            let catalog = load_catalog(catalog, &settings)?;
            let mut composer = Composer::new(&catalog);
            if let Some(ns) = &namespace {
                composer = composer.with_namespace(ns)?;
            }
            let root = FragmentId::new(root);
            let plan = composer
                .resolve(&root, &root_args(&settings, args))
                .with_context(|| format!("resolving {}", root))?;
            let format = output.format.or(settings.format).unwrap_or_default();
            emit(&render_plan(&plan, format)?, output.out.as_deref())?;
        }
        Commands::Check { catalog } => {
            let catalog = load_catalog(catalog, &settings)?;
            let (cycles, missing) = catalog.include_cycles();
            for (from, to) in &missing {
                warn!(fragment = %from, target = %to, "include target not in catalog");
            }
            for cycle in &cycles {
                let chain: Vec<String> = cycle.iter().map(|id| id.to_string()).collect();
                eprintln!("cycle: {}", chain.join(" -> "));
            }
            if !cycles.is_empty() {
                bail!("{} include cycle(s) found", cycles.len());
            }
            println!(
                "ok: {} fragment(s), {} parameter file(s)",
                catalog.fragments().count(),
                catalog.param_files().count()
            );
        }
        Commands::Fleet {
            catalog,
            root,
            instances,
            prefix,
            instance_arg,
            args,
            output,
        } => {
            let catalog = load_catalog(catalog, &settings)?;
            let prefix = prefix
                .or_else(|| settings.fleet_prefix.clone())
                .unwrap_or_else(|| "env".to_string());
            let ids = instance_ids(&prefix, instances);
            let root = FragmentId::new(root);
            let plans = Composer::new(&catalog)
                .resolve_fleet(&root, &root_args(&settings, args), &ids, &instance_arg)
                .with_context(|| format!("resolving fleet of {} for {}", instances, root))?;
            let format = output.format.or(settings.format).unwrap_or_default();
            emit(&render_fleet(&plans, format)?, output.out.as_deref())?;
        }
    }

    Ok(())
}
