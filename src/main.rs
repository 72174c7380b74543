use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Result;
use clap::{ArgAction, CommandFactory, Parser, Subcommand};
use log::LevelFilter;

mod api;
mod auth;
mod commands;
mod config;
mod edgerc;
mod eventlog;
mod moniker;
mod utils;

use config::{exit_code, ConfigError, ExitWith, Settings};
use utils::stop::StopFlag;

const BIN_NAME: &str = "akamai-eaa";

#[derive(Parser)]
#[command(name = "akamai-eaa")]
#[command(about = "Akamai Enterprise Application Access (EAA) management CLI", long_about = None)]
#[command(version)]
struct Cli {
    /// Batch mode, remove the extra header and footer lines in CSV outputs
    #[arg(short = 'b', long, global = true)]
    batch: bool,

    /// Debug mode (log API calls)
    #[arg(short = 'd', long, global = true, action = ArgAction::Count)]
    debug: u8,

    /// Verbose mode
    #[arg(short = 'v', long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Location of the credentials file
    #[arg(
        long,
        global = true,
        env = "AKAMAI_EDGERC",
        value_name = "PATH",
        default_value_os_t = config::default_edgerc_path()
    )]
    edgerc: PathBuf,

    /// Credentials file section
    #[arg(
        long,
        global = true,
        env = "AKAMAI_EDGERC_SECTION",
        value_name = "NAME",
        default_value = config::DEFAULT_SECTION
    )]
    section: String,

    /// Account switch key (Akamai partners and employees)
    #[arg(
        long = "accountkey",
        visible_alias = "account-key",
        global = true,
        env = "AKAMAI_EDGERC_ACCOUNT_KEY",
        value_name = "KEY"
    )]
    accountkey: Option<String>,

    /// HTTPS proxy to reach the APIs, e.g. user:password@proxy.example.net:8888
    #[arg(long, global = true, value_name = "PROXY")]
    proxy: Option<String>,

    /// Log file destination, default is stderr
    #[arg(long, global = true, value_name = "FILE")]
    logfile: Option<PathBuf>,

    /// Prefix for the User-Agent header sent to the APIs
    #[arg(long, global = true, value_name = "PREFIX", default_value = "Akamai-CLI", hide = true)]
    user_agent_prefix: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch access or admin event logs
    #[command(visible_alias = "l")]
    Log(commands::log::LogArgs),

    /// Search applications by name, host or cname
    #[command(visible_alias = "s")]
    Search {
        /// Case-insensitive substring to look for
        pattern: Option<String>,
    },

    /// Manage applications
    #[command(visible_alias = "a")]
    App(commands::app::AppArgs),

    /// Manage directories, groups and users
    #[command(visible_alias = "d")]
    Dir(commands::dir::DirectoryArgs),

    /// Manage certificates
    #[command(visible_alias = "certificate")]
    Cert(commands::cert::CertArgs),

    /// Manage connectors
    #[command(visible_aliases = ["c", "con"])]
    Connector(commands::connector::ConnectorArgs),

    /// Manage identity providers
    #[command(visible_alias = "i")]
    Idp(commands::idp::IdpArgs),

    /// Built-in reports
    #[command(visible_alias = "r")]
    Report(commands::report::ReportArgs),

    /// EAA Device Posture inventory
    Dp(commands::dp::DpArgs),

    /// Display cloud zone information
    Info(commands::info::InfoArgs),

    /// Print the module version and exit
    Version,

    /// Generate shell completion scripts
    GenerateCompletion {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.debug, cli.verbose, cli.logfile.as_deref());

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{err:#}");
            exit_code_for(&err)
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let Cli {
        batch,
        edgerc,
        section,
        accountkey,
        proxy,
        user_agent_prefix,
        command,
        ..
    } = cli;

    // Version and completion generation must work without a credentials file.
    if let Commands::Version = command {
        println!("{}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }
    if let Commands::GenerateCompletion { shell } = command {
        let mut cmd = Cli::command();
        clap_complete::generate(shell, &mut cmd, BIN_NAME, &mut io::stdout());
        return Ok(());
    }

    let settings = Settings::load(edgerc, section, accountkey, proxy, user_agent_prefix, batch)?;

    let stop = StopFlag::new();
    let signal_stop = stop.clone();
    ctrlc::set_handler(move || {
        log::debug!("stop signal received");
        signal_stop.trigger();
    })?;

    match command {
        Commands::Log(args) => commands::log::run(&settings, &args, &stop),
        Commands::Search { pattern } => commands::search::run(&settings, pattern.as_deref()),
        Commands::App(args) => commands::app::run(&settings, &args),
        Commands::Dir(args) => commands::dir::run(&settings, &args, &stop),
        Commands::Cert(args) => commands::cert::run(&settings, &args),
        Commands::Connector(args) => commands::connector::run(&settings, &args, &stop),
        Commands::Idp(args) => commands::idp::run(&settings, &args),
        Commands::Report(args) => commands::report::run(&settings, &args),
        Commands::Dp(args) => commands::dp::run(&settings, &args, &stop),
        Commands::Info(args) => commands::info::run(&settings, &args),
        // Dispatched before the credentials load.
        Commands::Version | Commands::GenerateCompletion { .. } => Ok(()),
    }
}

fn init_logging(debug: u8, verbose: u8, logfile: Option<&Path>) {
    let level = if debug > 1 {
        LevelFilter::Trace
    } else if debug == 1 {
        LevelFilter::Debug
    } else if verbose > 0 {
        LevelFilter::Info
    } else {
        LevelFilter::Error
    };

    let mut builder = env_logger::Builder::new();
    builder.filter_level(level).format_timestamp_millis();
    if let Some(path) = logfile {
        match File::create(path) {
            Ok(f) => {
                builder.target(env_logger::Target::Pipe(Box::new(f)));
            }
            Err(err) => eprintln!("cannot open log file {}: {err}", path.display()),
        }
    }
    builder.init();
}

/// Map a failure to the process exit code, honoring the dedicated codes
/// carried by [`ConfigError`] and [`ExitWith`] anywhere in the chain.
fn exit_code_for(err: &anyhow::Error) -> ExitCode {
    let code = err
        .chain()
        .find_map(|cause| {
            cause
                .downcast_ref::<ConfigError>()
                .map(ConfigError::exit_code)
                .or_else(|| cause.downcast_ref::<ExitWith>().map(|e| e.code))
        })
        .unwrap_or(exit_code::GENERAL_ERROR);
    ExitCode::from(code as u8)
}
