//! Autoupdate - schedule periodic package-manager updates with launchd.

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

use tracing::error;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use autoupdate::commands::{Installer, StatusReporter, Uninstaller, UpdateOptions};
use autoupdate::config::Settings;
use autoupdate::error::AutoupdateError;
use autoupdate::launchd::Launchctl;
use autoupdate::templates::TemplateEngine;

const VERSION: &str = env!("CARGO_PKG_VERSION");
const NAME: &str = env!("CARGO_PKG_NAME");

fn main() -> ExitCode {
    let args: Vec<String> = env::args().skip(1).collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_help();
        return ExitCode::SUCCESS;
    }

    if args.iter().any(|a| a == "--version" || a == "-V") {
        println!("{} {}", NAME, VERSION);
        return ExitCode::SUCCESS;
    }

    let config_path = get_config_path(&args);
    let settings = match Settings::load_or_default(config_path.as_deref()) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error loading configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    init_logging(&settings);

    let Some(subcommand) = get_subcommand(&args) else {
        print_help();
        return ExitCode::FAILURE;
    };

    match run(&settings, subcommand, &args) {
        Ok(output) => {
            print!("{}", output);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Command failed");
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(settings: &Settings, subcommand: &str, args: &[String]) -> Result<String, AutoupdateError> {
    let identity = settings.identity()?;
    let launchctl = Launchctl::new(&settings.launchctl);

    match subcommand {
        "start" => {
            let templates = TemplateEngine::new()?;
            let options = UpdateOptions {
                upgrade: has_flag(args, "--upgrade"),
                cleanup: has_flag(args, "--cleanup"),
                greedy: has_flag(args, "--greedy"),
            };
            let report = Installer::new(&identity, &launchctl, &templates).start(options)?;
            Ok(report.summary())
        }
        "status" => Ok(StatusReporter::new(&identity, &launchctl).report()),
        "stop" => Ok(Uninstaller::new(&identity, &launchctl)
            .stop()
            .summary("stopped")),
        "delete" => Ok(Uninstaller::new(&identity, &launchctl)
            .delete()?
            .summary("deleted")),
        other => Err(AutoupdateError::Config {
            message: format!("Unknown command '{}'. See `{} --help`.", other, NAME),
        }),
    }
}

/// Print help message.
fn print_help() {
    println!(
        r#"{} {}
Keep the package manager up to date with a per-user launchd agent.

USAGE:
    {} [OPTIONS] <COMMAND>

COMMANDS:
    start      Install and load the agent (runs every 24 hours and at load)
    stop       Unload the agent, keeping its files
    delete     Unload the agent and remove its files
    status     Show whether the agent is running and how it is configured

START OPTIONS:
    --upgrade              Also upgrade outdated formulae
    --cleanup              Run cleanup after upgrading (requires --upgrade)
    --greedy               Also upgrade casks greedily (requires --upgrade)

OPTIONS:
    -c, --config <PATH>    Path to configuration file
                           [default: <config dir>/autoupdate/config.toml]
    -h, --help             Print help information
    -V, --version          Print version information
"#,
        NAME, VERSION, NAME
    );
}

/// Get configuration file path from command line arguments.
fn get_config_path(args: &[String]) -> Option<PathBuf> {
    for (i, arg) in args.iter().enumerate() {
        if (arg == "--config" || arg == "-c") && i + 1 < args.len() {
            return Some(PathBuf::from(&args[i + 1]));
        }
        if let Some(path) = arg.strip_prefix("--config=") {
            return Some(PathBuf::from(path));
        }
    }
    None
}

/// First argument that is neither a flag nor a flag's value.
fn get_subcommand(args: &[String]) -> Option<&str> {
    let mut skip_next = false;
    for arg in args {
        if skip_next {
            skip_next = false;
            continue;
        }
        if arg == "--config" || arg == "-c" {
            skip_next = true;
            continue;
        }
        if !arg.starts_with('-') {
            return Some(arg.as_str());
        }
    }
    None
}

fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

/// Initialize logging based on settings. Logs go to stderr so they never mix
/// with command output.
fn init_logging(settings: &Settings) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.logging.level));

    match settings.logging.format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}
