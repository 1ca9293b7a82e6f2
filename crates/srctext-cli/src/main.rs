use clap::{Args, Parser, Subcommand, ValueEnum};
use color_eyre::eyre::Result;
use srctext_core::{CommentPolicy, EscapePolicy, Rules};
use std::io::IsTerminal;
use std::path::PathBuf;
use tracing::{debug, error};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

mod commands;
mod ui;

#[derive(Parser)]
#[command(
    name = "srctext",
    version,
    about = "Promote translator EN: comments into localization XML"
)]
struct Cli {
    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Log progress and print per-file results and totals
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file to use instead of the srctext.toml search
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Also write debug logs to a daily rolling file in this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub(crate) enum Format {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum CommentPolicyArg {
    Keep,
    Remove,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum EscapePolicyArg {
    AllowList,
    AllGt,
}

/// Overrides for the configured propagation rules.
#[derive(Args, Debug, Clone, Default)]
pub(crate) struct RuleArgs {
    /// Comment prefix that marks propagation text
    #[arg(long)]
    marker: Option<String>,
    /// Keep or remove marker comments once applied
    #[arg(long, value_enum)]
    comment_policy: Option<CommentPolicyArg>,
    /// Which escaped `>` sequences are restored after serialization
    #[arg(long, value_enum)]
    escape_policy: Option<EscapePolicyArg>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Rewrite every XML file under a folder in place
    Apply {
        #[arg(short, long)]
        root: PathBuf,
        #[arg(long, default_value_t = false)]
        dry_run: bool,
        #[arg(long, default_value_t = false)]
        backup: bool,
        /// Exit with an error if any file failed
        #[arg(long, default_value_t = false)]
        strict: bool,
        #[arg(long, value_enum, default_value = "text")]
        format: Format,
        #[command(flatten)]
        rules: RuleArgs,
    },

    /// Rewrite the given files in place
    File {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Print the result of a single file instead of writing it
        #[arg(long, default_value_t = false)]
        stdout: bool,
        #[arg(long, default_value_t = false)]
        dry_run: bool,
        #[arg(long, default_value_t = false)]
        backup: bool,
        #[arg(long, default_value_t = false)]
        strict: bool,
        #[arg(long, value_enum, default_value = "text")]
        format: Format,
        #[command(flatten)]
        rules: RuleArgs,
    },

    /// Report files that would change; fails if there are any
    Check {
        #[arg(short, long)]
        root: PathBuf,
        #[arg(long, value_enum, default_value = "text")]
        format: Format,
        #[command(flatten)]
        rules: RuleArgs,
    },
}

/// Settings shared by all commands.
pub(crate) struct Ctx {
    pub use_color: bool,
    pub verbose: bool,
    pub config: srctext_config::SrcTextConfig,
}

impl Ctx {
    pub fn rules(&self, args: &RuleArgs) -> Result<Rules> {
        let mut rules = self.config.rules()?;
        if let Some(m) = &args.marker {
            rules.marker_prefix = m.clone();
        }
        if let Some(p) = args.comment_policy {
            rules.comment_policy = match p {
                CommentPolicyArg::Keep => CommentPolicy::Keep,
                CommentPolicyArg::Remove => CommentPolicy::Remove,
            };
        }
        if let Some(p) = args.escape_policy {
            rules.escape_policy = match p {
                EscapePolicyArg::AllowList => EscapePolicy::AllowList,
                EscapePolicyArg::AllGt => EscapePolicy::AllGt,
            };
        }
        srctext_config::validate(&rules)?;
        debug!(event = "rules_resolved", rules = ?rules);
        Ok(rules)
    }

    pub fn backup(&self, flag: bool) -> bool {
        flag || self.config.backup.unwrap_or(false)
    }
}

trait Runnable {
    fn run(self, ctx: &Ctx) -> Result<()>;
}

impl Runnable for Commands {
    fn run(self, ctx: &Ctx) -> Result<()> {
        let cmd_name = match &self {
            Commands::Apply { .. } => "apply",
            Commands::File { .. } => "file",
            Commands::Check { .. } => "check",
        };
        debug!(event = "command_start", command = cmd_name);

        let result = match self {
            Commands::Apply {
                root,
                dry_run,
                backup,
                strict,
                format,
                rules,
            } => commands::apply::run_apply(ctx, root, dry_run, backup, strict, format, &rules),
            Commands::File {
                paths,
                stdout,
                dry_run,
                backup,
                strict,
                format,
                rules,
            } => commands::file::run_file(
                ctx, paths, stdout, dry_run, backup, strict, format, &rules,
            ),
            Commands::Check {
                root,
                format,
                rules,
            } => commands::check::run_check(ctx, root, format, &rules),
        };

        match &result {
            Ok(_) => debug!(event = "command_done", command = cmd_name),
            Err(e) => error!(event = "command_failed", command = cmd_name, error = %e),
        }
        result
    }
}

fn init_tracing(cli: &Cli, ansi: bool) -> Option<WorkerGuard> {
    let default_level = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (_, true) => "info",
        _ => "warn",
    };
    let console_layer = fmt::layer()
        .with_ansi(ansi)
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        );

    let (file_layer, guard) = match &cli.log_dir {
        Some(dir) => {
            let file_appender = tracing_appender::rolling::daily(dir, "srctext.log");
            let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
            let layer = fmt::layer()
                .with_ansi(false)
                .with_target(true)
                .with_writer(file_writer)
                .with_filter(EnvFilter::new("debug"));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .init();
    guard
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    let color_allowed = !cli.no_color && std::env::var_os("NO_COLOR").is_none();
    let _guard = init_tracing(&cli, color_allowed && std::io::stderr().is_terminal());

    let config = match &cli.config {
        Some(path) => srctext_config::load_config_from(path)?,
        None => srctext_config::load_config()?,
    };

    let ctx = Ctx {
        use_color: color_allowed && std::io::stdout().is_terminal(),
        verbose: cli.verbose,
        config,
    };
    cli.cmd.run(&ctx)
}
