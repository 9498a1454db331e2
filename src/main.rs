use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::time::Duration;

use trimps_shell::client;
use trimps_shell::content::{HttpFetcher, SessionOutcome};
use trimps_shell::{Config, LocalInstallation, TerminalShell, Updater, UpdaterSettings};

#[derive(Parser, Debug)]
#[command(name = "trimps")]
#[command(about = "Play Trimps from a local copy that keeps itself up to date", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Config file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Install the game here instead of the platform data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Do not poll for game updates while running
    #[arg(long, global = true)]
    no_auto_check: bool,

    /// Log debug output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check for a newer game version and install it
    Update {
        /// Only check for updates without installing
        #[arg(long)]
        check: bool,
    },

    /// Check for a newer launcher and install it
    Client {
        /// Only check for updates without installing
        #[arg(long)]
        check: bool,
    },

    /// Show installed versions and paths
    Status,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let config = load_config(&cli)?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let result = runtime.block_on(async {
        match cli.command {
            Some(Command::Update { check }) => run_update_command(&config, check).await,
            Some(Command::Client { check }) => run_client_command(&config, check).await,
            Some(Command::Status) => run_status_command(&config),
            None => run_shell(&config).await,
        }
    });

    // A prompt may still be waiting on stdin
    runtime.shutdown_timeout(Duration::from_millis(100));
    result
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    if let Some(dir) = &cli.data_dir {
        config.data_dir = Some(dir.clone());
    }
    if cli.no_auto_check {
        config.auto_check = false;
    }
    Ok(config)
}

fn build_updater(config: &Config) -> Result<Updater<HttpFetcher, TerminalShell>> {
    let installation = LocalInstallation::new(config.data_dir(), &config.archive_subtree);
    let fetcher =
        HttpFetcher::new(config.request_timeout()).context("Failed to create HTTP client")?;
    Ok(Updater::new(
        UpdaterSettings::from_config(config),
        installation,
        fetcher,
        TerminalShell::new(),
    ))
}

async fn run_shell(config: &Config) -> Result<()> {
    let mut updater = build_updater(config)?;
    println!(
        "{} Data directory: {}",
        "●".cyan(),
        config.data_dir().display().to_string().dimmed()
    );

    let restarting = tokio::select! {
        restarting = async {
            updater.startup().await;
            if offer_client_update(config, updater.shell()).await {
                return true;
            }
            updater.run().await;
            false
        } => restarting,
        _ = tokio::signal::ctrl_c() => false,
    };

    updater.shell().close();
    if restarting {
        println!("{} Restarting into the new launcher", "↻".cyan());
    } else {
        println!("{} Bye", "✓".green());
    }
    Ok(())
}

/// Returns true when the process should exit for a relaunch
async fn offer_client_update(config: &Config, shell: &TerminalShell) -> bool {
    let latest = match client::check_for_update(config).await {
        Ok(Some(latest)) => latest,
        Ok(None) => return false,
        Err(e) => {
            log::warn!("Client update check failed: {:#}", e);
            return false;
        }
    };

    let staged = match client::stage(&latest).await {
        Ok(staged) => staged,
        Err(e) => {
            log::warn!("Could not stage client {}: {:#}", latest.tag_name, e);
            return false;
        }
    };

    if !client::offer_restart(shell, &staged).await {
        return false;
    }

    let executable = match staged.install() {
        Ok(path) => path,
        Err(e) => {
            eprintln!("{} Client update failed: {:#}", "✗".red(), e);
            return false;
        }
    };

    // No failure dialogs from here on
    shell.begin_close();
    if let Err(e) = client::relaunch(&executable) {
        eprintln!("{} {:#}", "✗".red(), e);
    }
    true
}

async fn run_update_command(config: &Config, check_only: bool) -> Result<()> {
    let mut updater = build_updater(config)?;
    let installed = updater.load_installed();
    let current = updater.versions().current().clone();

    println!("{}", "Checking for game updates...".cyan());
    let target = match updater
        .check_for_update()
        .await
        .context("Failed to check for updates")?
    {
        Some(version) => version,
        None if installed => {
            println!(
                "{} You're running the latest version ({})",
                "✓".green(),
                current
            );
            return Ok(());
        }
        None => current.clone(),
    };

    if check_only {
        if installed {
            println!(
                "{} New version available: {} → {}",
                "↑".yellow(),
                current.as_str().dimmed(),
                target.as_str().green()
            );
        } else {
            println!(
                "{} Not installed yet, latest is {}",
                "↑".yellow(),
                target.as_str().green()
            );
        }
        println!("  Run `trimps update` to install");
        return Ok(());
    }

    updater.update_to(target).await;

    match updater.last_outcome() {
        Some(SessionOutcome::Installed) => {
            println!(
                "\n{} Updated to version {}",
                "✓".green(),
                updater.versions().current().as_str().green()
            );
            Ok(())
        }
        Some(SessionOutcome::Failed(reason)) => Err(anyhow!("Update failed: {}", reason)),
        None => Ok(()),
    }
}

async fn run_client_command(config: &Config, check_only: bool) -> Result<()> {
    if config.client_release_url.is_none() {
        println!(
            "{} No release endpoint configured, set client_release_url in {}",
            "✗".red(),
            Config::config_path().display()
        );
        return Ok(());
    }

    println!("{}", "Checking for launcher updates...".cyan());
    let Some(latest) = client::check_for_update(config).await? else {
        println!(
            "{} You're running the latest launcher ({})",
            "✓".green(),
            client::CURRENT_VERSION
        );
        return Ok(());
    };

    println!(
        "{} New launcher version available: {} → {}",
        "↑".yellow(),
        client::CURRENT_VERSION.dimmed(),
        latest.version().green()
    );

    if let Some(body) = latest.body.as_deref().filter(|b| !b.is_empty()) {
        println!("\n{}", "Release notes:".cyan());
        println!("{}\n", body.dimmed());
    }

    if check_only {
        println!("  Run `trimps client` to install");
        return Ok(());
    }

    println!("Downloading {}...", latest.platform_asset()?.name);
    let staged = client::stage(&latest).await?;

    println!("{}", "Installing...".cyan());
    staged.install().context("Failed to install update")?;

    println!(
        "\n{} Updated to version {}",
        "✓".green(),
        staged.version.green()
    );
    Ok(())
}

fn run_status_command(config: &Config) -> Result<()> {
    let installation = LocalInstallation::new(config.data_dir(), &config.archive_subtree);

    println!("{} {}", "Launcher".bold(), client::CURRENT_VERSION);
    match installation.read_version() {
        Ok(version) if !version.is_default() => {
            println!("{}     {}", "Game".bold(), version.as_str().green())
        }
        _ => println!("{}     {}", "Game".bold(), "not installed".dimmed()),
    }
    println!(
        "{}  {}",
        "Content".bold(),
        installation.content_dir().display().to_string().dimmed()
    );
    println!(
        "{}   {}",
        "Config".bold(),
        Config::config_path().display().to_string().dimmed()
    );

    if config.auto_check {
        println!(
            "{}   every {} min",
            "Checks".bold(),
            config.poll_interval().as_secs() / 60
        );
    } else {
        println!("{}   {}", "Checks".bold(), "disabled".dimmed());
    }
    Ok(())
}
