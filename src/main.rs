//! sc - block distracting websites by default, unblock them on a timer
//!
//! The same binary is both the daemon (`sc daemon`, normally started by
//! launchd) and the client used for every other command.

use std::io;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};

use sc::audit::{self, QueryOptions};
use sc::cli::{
    confirm_unblock, unblock_target, Cli, Commands, ConfigAction, Display, IpcClient, LogsArgs,
    UnblockArgs,
};
use sc::config::{Config, Paths};
use sc::{daemon, launchd};

/// Main entry point
#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Parse command line arguments
    let cli = Cli::parse();

    // Initialize logging
    init_tracing(matches!(cli.command, Some(Commands::Daemon)), cli.verbose);

    // Execute command
    if let Err(e) = execute(cli).await {
        Display::show_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

/// Initializes the tracing subscriber for logging.
///
/// The daemon logs at `info` with timestamps, client commands at `warn`.
/// `--verbose` raises either to `debug`; `RUST_LOG` overrides both.
fn init_tracing(daemon: bool, verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_level = match (daemon, verbose) {
        (_, true) => "debug",
        (true, false) => "info",
        (false, false) => "warn",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr);
    if daemon {
        builder.init();
    } else {
        builder.without_time().init();
    }
}

/// Executes the CLI command.
async fn execute(cli: Cli) -> Result<()> {
    let paths = Paths::from_env();
    let client = || IpcClient::new(paths.socket());

    match cli.command {
        Some(Commands::Status) => {
            let data = client().status().await?;
            Display::show_status(&data);
        }
        Some(Commands::Unblock(args)) => {
            unblock(&paths, &args).await?;
        }
        Some(Commands::Reblock { domains }) => {
            let data = client().reblock(&domains).await?;
            Display::show_reblocked(&data);
        }
        Some(Commands::Add { domains }) => {
            let data = client().add(&domains).await?;
            Display::show_added(&data);
        }
        Some(Commands::Remove { domains }) => {
            let data = client().remove(&domains).await?;
            Display::show_removed(&data);
        }
        Some(Commands::List) => {
            let data = client().list().await?;
            Display::show_list(&data.domains);
        }
        Some(Commands::Logs(args)) => {
            show_logs(&paths, args)?;
        }
        Some(Commands::Config { action }) => {
            config(&paths, action.unwrap_or(ConfigAction::Show))?;
        }
        Some(Commands::Daemon) => {
            daemon::run(&paths).await?;
        }
        Some(Commands::Install) => {
            let plist = launchd::install(&paths)?;
            Display::show_install_success(&plist, &paths);
        }
        Some(Commands::Uninstall) => {
            launchd::uninstall(&paths)?;
            Display::show_uninstall_success();
        }
        Some(Commands::Completions { shell }) => {
            generate_completions(shell);
        }
        None => {
            // No command provided, show help
            Cli::command().print_help()?;
        }
    }

    Ok(())
}

/// Resolves the duration, applies the local cap, asks for confirmation and
/// sends the unblock request.
async fn unblock(paths: &Paths, args: &UnblockArgs) -> Result<()> {
    let config = Config::load_or_default(&paths.config_file());
    let settings = &config.settings;

    let (domains, requested) = args.split();
    let requested = requested.unwrap_or(settings.default_duration);
    let duration = settings.cap_duration(requested);
    if duration < requested {
        Display::show_cap_notice(requested, duration);
    }

    if !args.yes && !settings.unblock_warnings.is_empty() {
        let confirmed = confirm_unblock(
            io::stdin().lock(),
            io::stdout(),
            &settings.unblock_warnings,
            &unblock_target(&domains),
            duration,
        )?;
        if !confirmed {
            return Ok(());
        }
    }

    let data = IpcClient::new(paths.socket())
        .unblock(&domains, duration)
        .await?;
    Display::show_unblocked(&data);
    Ok(())
}

/// Reads the audit log directly; the daemon does not need to be running.
fn show_logs(paths: &Paths, args: LogsArgs) -> Result<()> {
    let opts = QueryOptions {
        domain: args.domain,
        period: args.period,
    };
    let entries = audit::query(&paths.audit_log(), &opts)?;
    let stats = audit::stats(&entries);
    Display::show_logs(&entries, &stats);
    Ok(())
}

fn config(paths: &Paths, action: ConfigAction) -> Result<()> {
    let path = paths.config_file();
    match action {
        ConfigAction::Show => match std::fs::read_to_string(&path) {
            Ok(contents) => Display::show_config(&path, Some(&contents)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Display::show_config(&path, None),
            Err(e) => return Err(e).with_context(|| format!("Failed to read {:?}", path)),
        },
        ConfigAction::Path => println!("{}", path.display()),
        ConfigAction::Edit => {
            let editor = std::env::var("EDITOR")
                .ok()
                .filter(|e| !e.trim().is_empty())
                .unwrap_or_else(|| "vim".to_string());
            let status = std::process::Command::new(&editor)
                .arg(&path)
                .status()
                .with_context(|| format!("Failed to launch editor {:?}", editor))?;
            if !status.success() {
                anyhow::bail!("{} exited with {}", editor, status);
            }
        }
    }
    Ok(())
}

/// Generates shell completion scripts.
fn generate_completions(shell: clap_complete::Shell) {
    use clap_complete::generate;

    let mut cmd = Cli::command();
    let bin_name = cmd.get_name().to_string();
    generate(shell, &mut cmd, bin_name, &mut io::stdout());
}

// ============================================================================
// Tests
// ============================================================================
