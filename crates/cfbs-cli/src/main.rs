use std::fs::File;
use std::io::IsTerminal;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::debug;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cfbs_core::constants::ADDED_BY_ADD;
use cfbs_core::{CfbsError, Settings};
use cfbs_git::Identity;

mod commands;
mod git_magic;
mod prompts;
mod session;
mod styles;
#[cfg(test)]
mod test_support;

use git_magic::{commit_after_command, plural_s, quoted_list};
use session::Session;
use styles as s;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogLevel {
    Critical,
    Error,
    Warning,
    Info,
    Debug,
}

impl LogLevel {
    fn directive(self) -> &'static str {
        match self {
            Self::Critical | Self::Error => "error",
            Self::Warning => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum YesNo {
    Yes,
    No,
}

/// The command-line interface for cfbs.
#[derive(Debug, Parser)]
#[command(name = "cfbs")]
#[command(version)]
#[command(styles = s::get_clap_styles())]
#[command(
    help_template = "{bin} {version}\n\n{about-with-newline}{usage-heading} {usage}\n\n{all-args}{after-help}"
)]
#[command(about = "CFEngine Build System")]
#[command(
    long_about = "cfbs assembles CFEngine policy sets from modules. Modules come from the
CFEngine Build index, from git repositories or archives, or from local files,
and are listed in the cfbs.json file of a project.

Common Commands:
  init              Initialize a new CFEngine Build project
  add               Add modules to the project
  build             Download modules and assemble out/masterfiles
  install           Install the built policy set on this machine
"
)]
#[command(
    after_help = "\x1b[1;32mExamples:\x1b[0m\n  \x1b[36mcfbs init\x1b[0m                 \x1b[2m# Start a project on top of masterfiles\x1b[0m\n  \x1b[36mcfbs add autorun\x1b[0m          \x1b[2m# Add a module from the index\x1b[0m\n  \x1b[36mcfbs add ./my_policy.cf\x1b[0m   \x1b[2m# Add a local policy file\x1b[0m\n  \x1b[36mcfbs build\x1b[0m                \x1b[2m# Build out/masterfiles and out/masterfiles.tgz\x1b[0m\n  \x1b[36msudo cfbs install\x1b[0m         \x1b[2m# Install to /var/cfengine/masterfiles\x1b[0m\n\n\x1b[1;32mDocumentation:\x1b[0m https://build.cfengine.com"
)]
pub(crate) struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
    /// How much diagnostic output to print.
    #[arg(short, long, global = true, value_enum, default_value = "warning")]
    loglevel: LogLevel,
    /// Answer every prompt with its default.
    #[arg(short = 'M', long, global = true, env = "CFBS_NON_INTERACTIVE")]
    non_interactive: bool,
    /// Index to use instead of the project's own.
    #[arg(long, global = true)]
    index: Option<String>,
    /// Whether `init` sets up git and commits.
    #[arg(long, global = true, value_enum)]
    git: Option<YesNo>,
    /// Author name for commits.
    #[arg(long, global = true)]
    git_user_name: Option<String>,
    /// Author email for commits.
    #[arg(long, global = true)]
    git_user_email: Option<String>,
    /// Commit message replacing the default one.
    #[arg(long, global = true)]
    git_commit_message: Option<String>,
    /// Redownload modules already in the cache.
    #[arg(long, global = true)]
    force: bool,
    /// Only report files `pretty` would change.
    #[arg(long, global = true)]
    check: bool,
    /// Expected SHA-1 or SHA-256 checksum of an archive added by URL.
    #[arg(long, global = true)]
    checksum: Option<String>,
    /// Keep the key order of files formatted by `pretty`.
    #[arg(long, global = true)]
    keep_order: bool,
    /// Clone module repositories instead of downloading release archives.
    #[arg(long = "ignore-versions-json", global = true)]
    ignore_versions: bool,
    /// Masterfiles for `init`: a version, a branch, or `no`.
    #[arg(long, global = true)]
    masterfiles: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Initialize a new CFEngine Build project
    Init,
    /// Show the project and the download state of its modules
    Status,
    /// Search the index for modules
    Search { terms: Vec<String> },
    /// Add modules by name, local path, or repository/archive URL
    Add {
        #[arg(required = true)]
        modules: Vec<String>,
    },
    /// Remove modules by name or URL
    Remove {
        #[arg(required = true)]
        modules: Vec<String>,
    },
    /// Remove dependencies no module needs any more
    Clean,
    /// Update modules to the newest version in the index or repository
    Update { modules: Vec<String> },
    /// Validate the project, or projects at the given paths
    Validate { paths: Vec<String> },
    /// Download all modules of the build
    Download,
    /// Build out/masterfiles
    Build,
    /// Install the built policy set
    Install { destination: Vec<String> },
    /// Show information about modules
    #[command(visible_alias = "show")]
    Info { modules: Vec<String> },
    /// Answer the input questions of modules
    Input {
        #[arg(required = true)]
        modules: Vec<String>,
    },
    /// Store module input read from a file, or `-` for stdin
    SetInput { module: String, file: String },
    /// Print the stored input of a module, or its input definition
    GetInput { module: String, file: Option<String> },
    /// Format JSON files
    Pretty { files: Vec<String> },
}

fn init_logging(level: LogLevel) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.directive()));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).without_time())
        .with(filter)
        .init();
}

fn session_from(cli: &Cli) -> Result<Session> {
    let root = std::env::current_dir().context("cannot determine the current directory")?;
    let mut session = Session::new(root, Settings::load()?, cli.non_interactive);
    session.index = cli.index.clone();
    session.git = cli.git.map(|git| git == YesNo::Yes);
    session.identity = Identity {
        name: cli.git_user_name.clone(),
        email: cli.git_user_email.clone(),
    };
    session.commit_message = cli.git_commit_message.clone();
    session.force = cli.force;
    session.check = cli.check;
    session.checksum = cli.checksum.clone();
    session.keep_order = cli.keep_order;
    session.ignore_versions = cli.ignore_versions;
    session.masterfiles = cli.masterfiles.clone();
    Ok(session)
}

fn execute(session: &mut Session, command: &Commands) -> Result<i32> {
    use commands::*;

    match command {
        Commands::Init => init::run(session),
        Commands::Status => status::run(session),
        Commands::Search { terms } => search::run(session, terms),
        Commands::Add { modules } => {
            let outcome = add::run(session, modules, ADDED_BY_ADD)?;
            let message = format!("Added module{} {}", plural_s(modules), quoted_list(modules));
            commit_after_command(session, &message, outcome)
        }
        Commands::Remove { modules } => {
            let outcome = remove::run(session, modules)?;
            let message = format!("Removed module{} {}", plural_s(modules), quoted_list(modules));
            commit_after_command(session, &message, outcome)
        }
        Commands::Clean => {
            let outcome = clean::run(session)?;
            commit_after_command(session, "Cleaned unused modules", outcome)
        }
        Commands::Update { modules } => {
            let outcome = update::run(session, modules)?;
            commit_after_command(session, &format!("Updated module{}", plural_s(modules)), outcome)
        }
        Commands::Validate { paths } => validate::run(session, paths),
        Commands::Download => build::download(session),
        Commands::Build => build::build(session),
        Commands::Install { destination } => build::install(session, destination),
        Commands::Info { modules } => info::run(session, modules),
        Commands::Input { modules } => {
            let outcome = input::run(session, modules)?;
            let message = format!("Added input for module{}", plural_s(modules));
            commit_after_command(session, &message, outcome)
        }
        Commands::SetInput { module, file } => {
            let outcome = if file == "-" {
                input::set(session, module, &mut std::io::stdin().lock())?
            } else {
                let mut reader = File::open(session.path(file))
                    .with_context(|| format!("failed to open '{file}'"))?;
                input::set(session, module, &mut reader)?
            };
            commit_after_command(session, &format!("Set input for module '{module}'"), outcome)
        }
        Commands::GetInput { module, file } => match file.as_deref() {
            None | Some("-") => input::get(session, module, &mut std::io::stdout().lock()),
            Some(file) => {
                let mut writer = File::create(session.path(file))
                    .with_context(|| format!("failed to create '{file}'"))?;
                input::get(session, module, &mut writer)
            }
        },
        Commands::Pretty { files } => pretty::run(session, files),
    }
}

fn report_error(error: &anyhow::Error) {
    let is_bug = error
        .downcast_ref::<CfbsError>()
        .is_some_and(CfbsError::is_bug);
    let label = if is_bug { "Bug:" } else { "Error:" };
    if std::io::stderr().is_terminal() {
        eprintln!("{}{label}{} {error:#}", s::ERROR.render(), s::ERROR.render_reset());
    } else {
        eprintln!("{label} {error:#}");
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.loglevel);
    debug!("parsed cli arguments: {:?}", cli);

    let Some(command) = &cli.command else {
        use clap::CommandFactory;
        return match Cli::command().print_help() {
            Ok(()) => {
                println!();
                ExitCode::SUCCESS
            }
            Err(_) => ExitCode::FAILURE,
        };
    };

    let result = session_from(&cli).and_then(|mut session| execute(&mut session, command));
    match result {
        Ok(0) => ExitCode::SUCCESS,
        Ok(rc) => ExitCode::from(u8::try_from(rc).unwrap_or(1)),
        Err(error) => {
            report_error(&error);
            ExitCode::FAILURE
        }
    }
}
