//! dvwa-deploy - Main entry point

use anyhow::{Context, Result};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use dvwa_deploy::cli::{Cli, Commands, DeployArgs};
use dvwa_deploy::config::DeployConfig;
use dvwa_deploy::{DeployError, Deployer, normalizer, process_guard, sanity};

/// Initialize the logger with appropriate settings
///
/// Console progress goes to stdout; logs go to stderr at `warn` by default,
/// raised by `-v`. RUST_LOG overrides both.
fn init_logger(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,dvwa_deploy={}", default_level)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_file(true)
        .with_line_number(true)
        .init();
}

fn main() {
    let cli = Cli::parse_args();
    init_logger(cli.verbose);
    info!("dvwa-deploy starting up");

    // Children are terminated and the scratch clone removed on SIGINT/SIGTERM
    if let Err(e) = process_guard::init_signal_handlers() {
        warn!("Failed to initialize signal handlers: {}", e);
    }
    debug!("Signal handlers initialized");

    if let Err(err) = run(cli) {
        eprintln!("dvwa-deploy error: {:#}", err);
        let code = err
            .downcast_ref::<DeployError>()
            .map_or(1, DeployError::exit_code);
        std::process::exit(code);
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Some(Commands::Deploy(args)) => run_deploy(&args, cli.dry_run),
        None => run_deploy(&cli.deploy, cli.dry_run),
        Some(Commands::Normalize { source, dest }) => {
            if cli.dry_run {
                let root = normalizer::resolve_source_root(&source)?;
                println!("[dry-run] would copy {} into {}", root.display(), dest.display());
                return Ok(());
            }
            let summary = normalizer::normalize(&source, &dest)?;
            println!(
                "✓ {} files, {} directories, {} symlinks copied from {}",
                summary.files,
                summary.directories,
                summary.symlinks,
                summary.effective_root.display()
            );
            Ok(())
        }
        Some(Commands::Validate { config }) => {
            info!("Validating configuration file: {:?}", config);
            let loaded = DeployConfig::load_from_file(&config)?;
            loaded
                .validate()
                .with_context(|| format!("Configuration {:?} is invalid", config))?;
            println!("✓ Configuration file is valid: {}", config.display());
            Ok(())
        }
        Some(Commands::InitConfig { path, force }) => {
            if path.exists() && !force {
                anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
            }
            DeployConfig::default().save_to_file(&path)?;
            println!("✓ Default configuration written to {}", path.display());
            Ok(())
        }
    }
}

fn run_deploy(args: &DeployArgs, dry_run: bool) -> Result<()> {
    let config = args.resolve_config()?;
    config.validate().context("Invalid deployment configuration")?;

    sanity::run_preflight_checks(args.skip_root_check || dry_run)?;

    info!(
        repo = %config.repo_url,
        dest = %config.dest_dir.display(),
        dry_run,
        "starting deployment"
    );
    let report = Deployer::new(config, dry_run).run()?;

    let failures = report.failures();
    if !failures.is_empty() {
        warn!("{} best-effort step(s) did not succeed: {:?}", failures.len(), failures);
    }
    Ok(())
}
