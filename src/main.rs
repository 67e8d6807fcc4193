/*!
 * rpmrepo CLI - Command Line Interface
 *
 * `rpmrepo rpm` publishes packages to (or rebuilds) an RPM repository kept
 * under a bucket prefix. All flags are checked before any network access.
 */

use clap::{Args, Parser, Subcommand, ValueEnum};
use rpmrepo::{
    config::{LeaseConfig, LogConfig, LogLevel, SigningConfig, WorkspaceConfig},
    error::{RepoError, Result, EXIT_SUCCESS},
    logging, CreateRepo, GpgSigner, MergeRepo, RemotePrefix, S3Store, S3StoreConfig,
    SyncConfig, SyncMode, SyncOrchestrator, SyncReport, ToolsFile, Visibility,
};
use secrecy::SecretString;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "rpmrepo")]
#[command(version, about = "Publish RPM packages to a yum repository stored in S3", long_about = None)]
struct Cli {
    /// Log level (error, warn, info, debug, trace)
    #[arg(long, value_enum, default_value = "info", global = true)]
    log_level: LogLevelArg,

    /// Write JSON logs to this file instead of stderr
    #[arg(long, value_name = "FILE", global = true)]
    log_file: Option<PathBuf>,

    /// Enable verbose logging (equivalent to --log-level=debug)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Publish packages to, or rebuild, an RPM repository in a bucket
    Rpm(RpmArgs),

    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Args)]
struct RpmArgs {
    /// Target bucket
    #[arg(short = 'b', long)]
    bucket: String,

    /// Key prefix of the repository inside the bucket (empty = bucket root)
    #[arg(short = 'p', long, default_value = "")]
    prefix: String,

    /// Access control applied to uploaded objects
    #[arg(long, value_enum, default_value = "private")]
    visibility: VisibilityArg,

    /// AWS access key id
    #[arg(long, env = "AWS_ACCESS_KEY_ID", hide_env_values = true)]
    aws_access_key: Option<String>,

    /// AWS secret access key
    #[arg(long, env = "AWS_SECRET_ACCESS_KEY", hide_env_values = true)]
    aws_secret_key: Option<String>,

    /// AWS region
    #[arg(long, default_value = "us-east-1")]
    region: String,

    /// Custom endpoint URL for S3-compatible stores
    #[arg(long, value_name = "URL")]
    endpoint: Option<String>,

    /// Use path-style bucket addressing
    #[arg(long)]
    force_path_style: bool,

    /// Sign packages and the catalog manifest
    #[arg(long)]
    sign: bool,

    /// Signing key passphrase (empty = use an unlocked gpg agent)
    #[arg(long, env = "RPMREPO_SIGN_PASS", hide_env_values = true)]
    sign_pass: Option<String>,

    /// Rebuild the published repository instead of adding packages
    #[arg(long)]
    rebuild: bool,

    /// TOML file overriding external tool paths and the signing key
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Parent directory for the temporary snapshot workspace
    #[arg(long, value_name = "DIR")]
    work_dir: Option<PathBuf>,

    /// Keep the workspace after the run for inspection
    #[arg(long)]
    keep_work_dir: bool,

    /// Parallel transfers within one upload or download step
    #[arg(long, default_value_t = rpmrepo::config::DEFAULT_CONCURRENCY)]
    concurrency: usize,

    /// Hold a lease on the prefix so concurrent runs fail fast
    #[arg(long)]
    lock: bool,

    /// Lease lifetime in seconds
    #[arg(long, default_value_t = rpmrepo::config::DEFAULT_LEASE_TTL_SECS, value_name = "SECS")]
    lock_ttl: u64,

    /// Print the run report as JSON on stdout
    #[arg(long)]
    json: bool,

    /// Package files to publish (required unless --rebuild)
    #[arg(value_name = "PACKAGE")]
    packages: Vec<PathBuf>,
}

impl RpmArgs {
    fn store_config(&self) -> Result<S3StoreConfig> {
        let access_key = self.aws_access_key.clone().unwrap_or_default();
        let secret_key = SecretString::from(self.aws_secret_key.clone().unwrap_or_default());

        let mut config = S3StoreConfig::new(&self.bucket, access_key, secret_key);
        config.region = self.region.clone();
        config.endpoint = self.endpoint.clone();
        config.force_path_style = self.force_path_style;
        config
            .validate()
            .map_err(|e| RepoError::validation(e.to_string()))?;
        Ok(config)
    }

    fn sync_config(&self, tools: &ToolsFile) -> SyncConfig {
        let mode = if self.rebuild {
            SyncMode::Rebuild
        } else {
            SyncMode::Publish {
                packages: self.packages.clone(),
            }
        };

        let mut config = SyncConfig::new(RemotePrefix::new(&self.prefix), mode);
        config.visibility = self.visibility.into();
        config.concurrency = self.concurrency;
        config.workspace = WorkspaceConfig {
            parent: self.work_dir.clone(),
            keep: self.keep_work_dir,
        };
        if self.sign {
            config.signing = Some(SigningConfig {
                passphrase: self.sign_pass.clone().map(SecretString::from),
                key_name: tools.signing_key.clone(),
            });
        }
        if self.lock {
            config.lease = Some(LeaseConfig {
                ttl: Duration::from_secs(self.lock_ttl),
            });
        }
        config
    }
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum VisibilityArg {
    Public,
    Private,
}

impl From<VisibilityArg> for Visibility {
    fn from(arg: VisibilityArg) -> Self {
        match arg {
            VisibilityArg::Public => Visibility::Public,
            VisibilityArg::Private => Visibility::Private,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevelArg> for LogLevel {
    fn from(arg: LogLevelArg) -> Self {
        match arg {
            LogLevelArg::Error => LogLevel::Error,
            LogLevelArg::Warn => LogLevel::Warn,
            LogLevelArg::Info => LogLevel::Info,
            LogLevelArg::Debug => LogLevel::Debug,
            LogLevelArg::Trace => LogLevel::Trace,
        }
    }
}

fn main() {
    let code = match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            e.exit_code()
        }
    };
    std::process::exit(code);
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Rpm(args) => {
            let log_config = LogConfig {
                level: cli.log_level.into(),
                file: cli.log_file,
                verbose: cli.verbose,
            };
            if let Err(e) = logging::init_logging(&log_config) {
                eprintln!("Warning: Failed to initialize logging: {}", e);
            }
            handle_rpm_command(&args)
        }
        Commands::Completions { shell } => {
            use clap::CommandFactory;
            use clap_complete::generate;
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "rpmrepo", &mut std::io::stdout());
            Ok(())
        }
    }
}

fn handle_rpm_command(args: &RpmArgs) -> Result<()> {
    // Everything below is local; nothing touches the network until validated
    let tools = match &args.config {
        Some(path) => ToolsFile::from_file(path)?,
        None => ToolsFile::default(),
    };
    let sync_config = args.sync_config(&tools);
    sync_config.validate()?;
    let store_config = args.store_config()?;

    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| RepoError::local_io("async runtime", e))?;

    let report = runtime.block_on(async {
        let store = S3Store::connect(&store_config)
            .await
            .map_err(|e| RepoError::remote("connect", &store_config.bucket, e))?;
        let builder = CreateRepo::new(&tools.tools.createrepo);
        let merger = MergeRepo::new(&tools.tools.mergerepo);
        let signer = sync_config
            .signing
            .clone()
            .map(|signing| GpgSigner::new(tools.tools.clone(), signing));

        let mut orchestrator = SyncOrchestrator::new(&store, &builder, &merger, &sync_config);
        if let Some(signer) = &signer {
            orchestrator = orchestrator.with_signer(signer);
        }
        orchestrator.run().await
    })?;

    if args.json {
        let json = serde_json::to_string_pretty(&report)
            .map_err(|e| RepoError::local_io("stdout", e.into()))?;
        println!("{}", json);
    } else {
        print_summary(&report);
    }
    Ok(())
}

fn print_summary(report: &SyncReport) {
    let plan = report
        .plan
        .map(|p| p.to_string())
        .unwrap_or_else(|| "none".to_string());
    let prefix = if report.prefix.is_empty() {
        "<root>"
    } else {
        report.prefix.as_str()
    };
    eprintln!("Repository s3://{}/{} synced ({})", report.bucket, prefix, plan);
    eprintln!(
        "  downloaded {}, uploaded {}, deleted {}, signed packages {}{}",
        report.downloaded,
        report.uploaded,
        report.deleted,
        report.signed_packages,
        if report.manifest_signed {
            ", manifest signed"
        } else {
            ""
        }
    );
    if let Some(digest) = &report.manifest_sha256 {
        eprintln!("  repomd.xml sha256 {}", digest);
    }
    if !report.delete_failures.is_empty() {
        eprintln!(
            "  {} stale catalog objects could not be deleted",
            report.delete_failures.len()
        );
    }
    if let Some(path) = &report.workspace {
        eprintln!("  workspace kept at {}", path.display());
    }
}
