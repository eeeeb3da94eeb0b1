// Target-specific transitive dependency split (mio/crossterm stack) is accepted for now.
#![allow(clippy::multiple_crate_versions)]

use std::collections::BTreeSet;
use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use clap::error::ErrorKind;
use clap::{Args, Parser, Subcommand, ValueEnum};
use minus::{ExitStrategy, Pager, page_all};
use swarmcp_engine::{
    ApplyOptions, MemoryDriver, apply_plan, build_plan_for_project, load_project, plan_project,
    resolve_project, validate_project,
};
use swarmcp_report::{
    ColorChoice, OutputFormat, RenderOptions, redact_sensitive, render_apply, render_effective,
    render_plan,
};
use tracing::debug;
use tracing_subscriber::EnvFilter;

mod error;

pub use error::CliError;

#[derive(Debug, Parser)]
#[command(name = "swarmcp", about = "Declarative control plane for container swarms")]
struct Cli {
    /// Project directory or project.yaml file.
    #[arg(short, long, global = true, env = "SWARMCP_PROJECT", default_value = ".")]
    project: PathBuf,
    #[command(flatten)]
    render: RenderFlags,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Load every manifest and check secret declarations.
    Validate,
    /// Resolve the project and print rendered configs and secret targets.
    Render,
    /// Print the desired cluster objects.
    Plan {
        #[arg(long, value_enum, default_value_t = FormatArg::Text)]
        format: FormatArg,
    },
    /// Apply the plan against the in-memory cluster driver.
    Apply {
        #[arg(long, value_enum, default_value_t = FormatArg::Text)]
        format: FormatArg,
        /// Remove owned configs, secrets and services missing from the plan.
        #[arg(long)]
        prune: bool,
        /// Attempt every step instead of stopping at the first failure.
        #[arg(long)]
        keep_going: bool,
        /// Treat a config of this name as already present in the cluster.
        #[arg(long = "external-config", value_name = "NAME")]
        external_configs: Vec<String>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FormatArg {
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ColorArg {
    Auto,
    Always,
    Never,
}

#[derive(Debug, Clone, Args)]
struct RenderFlags {
    #[arg(long, global = true, value_enum, default_value_t = ColorArg::Auto)]
    color: ColorArg,
    /// Show unchanged objects and details; also enables debug logging.
    #[arg(long, global = true)]
    verbose: bool,
}

impl RenderFlags {
    fn render_options(&self, target: &Path) -> RenderOptions {
        RenderOptions {
            color: self.color.into(),
            verbose: self.verbose,
            target: Some(target.display().to_string()),
        }
    }
}

impl From<FormatArg> for OutputFormat {
    fn from(value: FormatArg) -> Self {
        match value {
            FormatArg::Text => Self::Text,
            FormatArg::Json => Self::Json,
        }
    }
}

impl From<ColorArg> for ColorChoice {
    fn from(value: ColorArg) -> Self {
        match value {
            ColorArg::Auto => Self::Auto,
            ColorArg::Always => Self::Always,
            ColorArg::Never => Self::Never,
        }
    }
}

/// Run the CLI using process arguments.
///
/// # Errors
///
/// Returns an error when argument parsing fails (excluding help/version) or command
/// execution fails.
pub fn run() -> Result<i32, CliError> {
    run_from(std::env::args_os())
}

fn run_from<I, T>(args: I) -> Result<i32, CliError>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = match Cli::try_parse_from(args) {
        Ok(parsed) => parsed,
        Err(error) => match error.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                print!("{error}");
                return Ok(0);
            }
            _ => return Err(error.into()),
        },
    };
    init_logging(cli.render.verbose);
    debug!(project = %cli.project.display(), "starting");
    let render_options = cli.render.render_options(&cli.project);

    match cli.command {
        Commands::Validate => {
            let (project, summary) = validate_project(&cli.project)?;
            println!(
                "{}: {} stack(s), {} service(s), {} config(s), {} secret(s)",
                project.name(),
                summary.stacks,
                summary.services,
                summary.configs,
                summary.secrets
            );
            Ok(0)
        }
        Commands::Render => {
            let project = load_project(&cli.project)?;
            let resolution = resolve_project(&project)?;
            let rendered = render_effective(&resolution.project, &render_options);
            emit_output(&rendered, OutputFormat::Text, &resolution.sensitive_values);
            Ok(0)
        }
        Commands::Plan { format } => {
            let (plan, sensitive_values) = build_plan_for_project(&cli.project)?;
            let output_format: OutputFormat = format.into();
            let rendered = render_plan(&plan, output_format, &render_options)?;
            emit_output(&rendered, output_format, &sensitive_values);
            Ok(0)
        }
        Commands::Apply {
            format,
            prune,
            keep_going,
            external_configs,
        } => {
            let project = load_project(&cli.project)?;
            let (plan, sensitive_values) = plan_project(&project)?;
            let driver = external_configs
                .iter()
                .fold(MemoryDriver::new(), |driver, name| driver.with_external_config(name));
            let options = ApplyOptions {
                fail_fast: !keep_going,
                prune: prune.then(|| project.name().to_string()),
            };

            let report = apply_plan(&plan, &driver, &options);
            let output_format: OutputFormat = format.into();
            let rendered = render_apply(&report, output_format, &render_options)?;
            emit_output(&rendered, output_format, &sensitive_values);
            Ok(i32::from(report.has_failures()))
        }
    }
}

/// Logs go to stderr so stdout stays scriptable. `RUST_LOG` applies unless
/// `--verbose` asks for debug output.
fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    // A second run in the same process keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn emit_output(rendered: &str, format: OutputFormat, sensitive_values: &BTreeSet<String>) {
    let redacted = redact_sensitive(rendered, sensitive_values);

    if format == OutputFormat::Text && should_use_pager() && page_output(&redacted).is_ok() {
        return;
    }

    if redacted.ends_with('\n') {
        print!("{redacted}");
    } else {
        println!("{redacted}");
    }
}

fn should_use_pager() -> bool {
    std::io::stdout().is_terminal() && std::env::var_os("NO_PAGER").is_none()
}

fn page_output(rendered: &str) -> Result<(), minus::MinusError> {
    let pager = Pager::new();
    pager.set_exit_strategy(ExitStrategy::PagerQuit)?;
    pager.set_text(rendered)?;
    page_all(pager)
}
