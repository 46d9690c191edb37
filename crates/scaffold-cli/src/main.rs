use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{ArgAction, Args, Parser, Subcommand};
use scaffold_cli::{
    create_project, display_batch_report, display_bulk_report, display_discovered,
    display_history, display_status, display_templates, init_tracing, level_for_verbosity,
    ensure_valid_config, preview, run_batch, run_bulk, BulkError, BulkOptions, CreateOptions, MaintenanceOp,
    ProjectError, TemplateError,
};
use scaffold_core::{
    default_config_path, is_valid, load_config, load_or_default, BulkCommand, ConfigError,
    ProjectConfig, ProjectType, ResultFilter, ResultStore, ScaffoldConfig, StoreError, Validate,
    ValidationLevel, DEFAULT_PYTHON_VERSION,
};
use scaffold_git::GitCli;
use scaffold_verify::{discover_repositories, DiscoverError, TaskRunner};

#[derive(Debug, Parser)]
#[command(
    name = "scaffold",
    version,
    about = "Scaffold Python projects and run maintenance across many of them"
)]
struct Cli {
    /// Config file (default: ~/.scaffold/config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Directory holding the result log (overrides config).
    #[arg(long, global = true)]
    storage_dir: Option<PathBuf>,
    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    /// Emit logs as JSON lines on stderr.
    #[arg(long, global = true)]
    log_json: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create a new project.
    New(NewArgs),
    /// List available project templates.
    Templates,
    /// Operate on every project below a directory.
    Bulk {
        #[command(subcommand)]
        command: BulkCmd,
    },
}

#[derive(Debug, Args)]
struct NewArgs {
    name: String,
    #[arg(short = 't', long = "type", default_value_t = ProjectType::Package)]
    project_type: ProjectType,
    #[arg(long)]
    author: Option<String>,
    #[arg(long)]
    email: Option<String>,
    #[arg(short, long, default_value = "")]
    description: String,
    #[arg(long, default_value = DEFAULT_PYTHON_VERSION)]
    python_version: String,
    #[arg(long)]
    no_git_init: bool,
    /// Skip `uv sync` and pre-commit installation.
    #[arg(long)]
    no_setup: bool,
    /// Print the files that would be created and exit.
    #[arg(long)]
    preview: bool,
}

#[derive(Debug, Args)]
struct DiscoverArgs {
    #[arg(long, default_value = ".")]
    path: PathBuf,
    #[arg(long)]
    max_depth: Option<usize>,
}

#[derive(Debug, Args)]
struct RunArgs {
    #[command(flatten)]
    discover: DiscoverArgs,
    /// Ignore cached results.
    #[arg(long)]
    force: bool,
    /// Per-repository timeout in seconds.
    #[arg(long)]
    timeout: Option<u64>,
    #[arg(long)]
    workers: Option<usize>,
    /// Print the report as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
struct StatusArgs {
    /// Only show repositories below this directory.
    #[arg(long)]
    path: Option<PathBuf>,
    #[arg(long)]
    command: Option<BulkCommand>,
}

#[derive(Debug, Args)]
struct HistoryArgs {
    #[arg(long)]
    command: Option<BulkCommand>,
    #[arg(long)]
    repo: Option<PathBuf>,
    #[arg(long)]
    limit: Option<usize>,
}

#[derive(Debug, Args)]
struct UpgradeArgs {
    #[command(flatten)]
    discover: DiscoverArgs,
    #[arg(long)]
    dry_run: bool,
}

#[derive(Debug, Subcommand)]
enum BulkCmd {
    /// List discovered projects.
    Dir(DiscoverArgs),
    /// Run the test suite in every project.
    Test(RunArgs),
    /// Run lint hooks in every project.
    Lint(RunArgs),
    /// Latest result per project.
    Status(StatusArgs),
    /// Raw result history.
    History(HistoryArgs),
    /// Report structural issues in every project.
    Check(DiscoverArgs),
    /// Regenerate infrastructure files in every project.
    Upgrade(UpgradeArgs),
}

#[derive(Debug, thiserror::Error)]
enum MainError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Discover(#[from] DiscoverError),
    #[error(transparent)]
    Bulk(#[from] BulkError),
    #[error(transparent)]
    Project(#[from] ProjectError),
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error("failed to resolve {path}: {source}")]
    ResolvePath {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to start async runtime: {0}")]
    Runtime(#[source] std::io::Error),
    #[error("failed to serialize report as json: {0}")]
    Json(#[from] serde_json::Error),
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_json, level_for_verbosity(cli.verbose));

    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("scaffold: {err}");
            ExitCode::FAILURE
        }
    }
}

/// `Ok(false)` means the command ran but some repository failed.
fn run(cli: Cli) -> Result<bool, MainError> {
    match cli.command {
        Command::Templates => {
            print!("{}", display_templates());
            Ok(true)
        }
        Command::New(args) => run_new(args),
        Command::Bulk { command } => {
            let config = load_settings(cli.config.as_deref())?;
            let store = match cli.storage_dir {
                Some(dir) => ResultStore::new(dir),
                None => config.result_store()?,
            };
            run_bulk_command(command, &config, store)
        }
    }
}

fn load_settings(explicit: Option<&Path>) -> Result<ScaffoldConfig, MainError> {
    let config = match explicit {
        Some(path) => load_config(path)?,
        None => match default_config_path() {
            Some(path) => load_or_default(path)?,
            None => ScaffoldConfig::default(),
        },
    };

    let issues = config.validate();
    for issue in &issues {
        if issue.level == ValidationLevel::Warning {
            tracing::warn!(code = issue.code, "{}", issue.message);
        }
    }
    if !is_valid(&issues) {
        let message = issues
            .iter()
            .filter(|issue| issue.level == ValidationLevel::Error)
            .map(|issue| format!("{}: {}", issue.code, issue.message))
            .collect::<Vec<_>>()
            .join("; ");
        return Err(MainError::InvalidConfig(message));
    }
    Ok(config)
}

fn run_new(args: NewArgs) -> Result<bool, MainError> {
    let author = args.author.unwrap_or_else(git_user_name);
    let mut config = ProjectConfig::new(&args.name, args.project_type, author, args.description);
    config.email = args.email;
    config.python_version = args.python_version;
    config.git_init = !args.no_git_init;

    if args.preview {
        println!("Files for {} ({}):", config.name, config.project_type);
        for path in preview_files(&config)? {
            println!("  {}", path.display());
        }
        return Ok(true);
    }

    let cwd = env::current_dir().map_err(|source| MainError::ResolvePath {
        path: PathBuf::from("."),
        source,
    })?;
    let output_dir = cwd.join(&config.name);
    let mut options = CreateOptions::for_config(&config);
    if args.no_setup {
        options = options.without_setup();
    }

    let written = create_project(&config, &output_dir, &options)?;
    println!(
        "Created {} project '{}' at {} ({} files)",
        config.project_type,
        config.name,
        output_dir.display(),
        written.len()
    );
    println!("\nNext steps:\n  cd {}", config.name);
    if args.no_setup {
        println!("  uv sync\n  uv run pre-commit install");
    }
    println!("  uv run pytest");
    Ok(true)
}

fn preview_files(config: &ProjectConfig) -> Result<Vec<PathBuf>, MainError> {
    ensure_valid_config(config)?;
    Ok(preview(config)?)
}

fn git_user_name() -> String {
    let cwd = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    GitCli::default()
        .run(&cwd, ["config", "user.name"])
        .map(|output| output.stdout.trim().to_string())
        .unwrap_or_default()
}

fn run_bulk_command(
    command: BulkCmd,
    config: &ScaffoldConfig,
    store: ResultStore,
) -> Result<bool, MainError> {
    match command {
        BulkCmd::Dir(args) => {
            let root = resolve(&args.path)?;
            let max_depth = args.max_depth.unwrap_or(config.bulk.max_depth);
            let repos = discover_repositories(&root, max_depth, &config.bulk.marker)?;
            print!("{}", display_discovered(&root, &repos));
            Ok(true)
        }
        BulkCmd::Test(args) => run_tool_command(BulkCommand::Test, args, config, store),
        BulkCmd::Lint(args) => run_tool_command(BulkCommand::Lint, args, config, store),
        BulkCmd::Status(args) => {
            let scope = args.path.as_deref().map(resolve).transpose()?;
            let commands = match args.command {
                Some(command) => vec![command],
                None => BulkCommand::ALL.to_vec(),
            };
            let mut latest = BTreeMap::new();
            for command in commands {
                let mut by_repo = store.latest_by_repo(command)?;
                if let Some(scope) = &scope {
                    by_repo.retain(|repo, _| repo.starts_with(scope));
                }
                latest.insert(command, by_repo);
            }
            print!("{}", display_status(&latest));
            Ok(true)
        }
        BulkCmd::History(args) => {
            let mut filter = ResultFilter::default();
            if let Some(command) = args.command {
                filter = filter.command(command);
            }
            if let Some(repo) = &args.repo {
                filter = filter.repo(resolve(repo)?);
            }
            if let Some(limit) = args.limit {
                filter = filter.limit(limit);
            }
            print!("{}", display_history(&store.load(&filter)?));
            Ok(true)
        }
        BulkCmd::Check(args) => run_maintenance(MaintenanceOp::Check, &args, false, config),
        BulkCmd::Upgrade(args) => {
            run_maintenance(MaintenanceOp::Upgrade, &args.discover, args.dry_run, config)
        }
    }
}

fn run_tool_command(
    command: BulkCommand,
    args: RunArgs,
    config: &ScaffoldConfig,
    store: ResultStore,
) -> Result<bool, MainError> {
    let options = bulk_options(command, &args, config)?;
    let runner = TaskRunner::from_config(config, store.clone());
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(MainError::Runtime)?;
    let report = runtime.block_on(run_bulk(Arc::new(runner), &store, &options))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", display_bulk_report(&report));
    }
    Ok(report.all_passed())
}

fn bulk_options(
    command: BulkCommand,
    args: &RunArgs,
    config: &ScaffoldConfig,
) -> Result<BulkOptions, MainError> {
    if args.timeout == Some(0) {
        return Err(MainError::InvalidArgument(
            "--timeout must be greater than zero".to_string(),
        ));
    }
    let mut options = BulkOptions::new(resolve(&args.discover.path)?, command);
    options.max_depth = args.discover.max_depth.unwrap_or(config.bulk.max_depth);
    options.marker = config.bulk.marker.clone();
    options.force = args.force;
    options.timeout = args
        .timeout
        .map(Duration::from_secs)
        .unwrap_or_else(|| config.bulk.timeout());
    options.workers = args
        .workers
        .filter(|workers| *workers > 0)
        .unwrap_or_else(|| config.bulk.effective_workers());
    Ok(options)
}

fn run_maintenance(
    operation: MaintenanceOp,
    args: &DiscoverArgs,
    dry_run: bool,
    config: &ScaffoldConfig,
) -> Result<bool, MainError> {
    let root = resolve(&args.path)?;
    let max_depth = args.max_depth.unwrap_or(config.bulk.max_depth);
    let report = run_batch(&root, operation, max_depth, &config.bulk.marker, dry_run)?;
    print!("{}", display_batch_report(&report));
    Ok(report.errors() == 0)
}

fn resolve(path: &Path) -> Result<PathBuf, MainError> {
    path.canonicalize().map_err(|source| MainError::ResolvePath {
        path: path.to_path_buf(),
        source,
    })
}
