mod filters;
mod remote;
mod session;

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::filters::{FilterSyncError, RuleSource, SyncEngine, sync::SyncConfig};
use crate::remote::{ClientConfig, MutationOutcome, RemoteFilterClient};
use crate::session::CredentialContext;

/// Keep a danmaku filter rule list in sync with the platform's copy
#[derive(Parser)]
#[command(name = "danmaku-filter-sync", version)]
struct Cli {
	/// Persisted session credentials
	#[arg(long, env = "FILTER_SYNC_CREDENTIALS", default_value = "cookies.json", global = true)]
	credentials: PathBuf,

	/// Base URL of the filter API
	#[arg(long, env = "FILTER_SYNC_BASE_URL", global = true)]
	base_url: Option<String>,

	/// Request timeout in seconds
	#[arg(long, default_value_t = 30, global = true)]
	timeout_secs: u64,

	/// Enable debug logging
	#[arg(short, long, global = true)]
	verbose: bool,

	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand)]
enum Command {
	/// Turn a browser cookie export into persisted credentials
	ImportLogin {
		/// JSON array of {name, value, domain} cookies
		cookies: PathBuf,

		/// User agent of the browser that performed the login
		#[arg(long)]
		user_agent: Option<String>,
	},

	/// Print the remote rules, or the rules in a local file
	List {
		#[arg(long)]
		local: Option<PathBuf>,
	},

	/// Upload the rules of a local CSV file
	Upload {
		file: PathBuf,

		/// Extra passes over rules that failed
		#[arg(long, default_value_t = 0)]
		retries: u32,

		/// Pause after every add call during the first pass
		#[arg(long, default_value_t = 500)]
		interval_ms: u64,

		/// Added to the pause on every retry pass
		#[arg(long, default_value_t = 500)]
		step_ms: u64,
	},

	/// Write the remote rules to a CSV file
	Dump {
		file: PathBuf,

		#[arg(long)]
		append: bool,
	},

	/// Add a single rule
	Add {
		pattern: String,

		/// Rule type: 0 text, 1 regex, 2 user
		#[arg(long)]
		category: Option<String>,
	},

	/// Delete a remote rule by id
	Delete { id: u64 },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
	let cli = Cli::parse();

	let level = if cli.verbose {
		"danmaku_filter_sync=debug"
	} else {
		"danmaku_filter_sync=info"
	};
	let filter = tracing_subscriber::EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_target(false)
		.with_thread_ids(false)
		.with_thread_names(false)
		.with_file(false)
		.with_line_number(false)
		.with_timer(tracing_subscriber::fmt::time::time())
		.init();

	match run(cli).await {
		Ok(code) => code,
		Err(e) => {
			error!("{}", e);
			ExitCode::FAILURE
		}
	}
}

async fn run(cli: Cli) -> Result<ExitCode, FilterSyncError> {
	let mut client_config = ClientConfig {
		timeout: Duration::from_secs(cli.timeout_secs),
		..ClientConfig::default()
	};
	if let Some(base_url) = cli.base_url {
		client_config.base_url = base_url;
	}

	let code = match cli.command {
		Command::ImportLogin {
			cookies,
			user_agent,
		} => {
			let cookies = CredentialContext::import_cookies(&cookies).await?;
			let context = CredentialContext::from_external_login(cookies, user_agent);
			context.save(&cli.credentials).await?;
			ExitCode::SUCCESS
		}
		Command::List { local: Some(path) } => {
			let mut store = filters::RuleStore::new();
			store.load_local(&path)?;
			print!("{}", store.list_filters(RuleSource::Local));
			ExitCode::SUCCESS
		}
		Command::List { local: None } => {
			let mut engine = connect(&cli.credentials, &client_config, SyncConfig::default()).await?;
			engine.fetch_remote().await?;
			print!("{}", engine.store().list_filters(RuleSource::Remote));
			persist_refreshed(&engine, &cli.credentials).await?;
			ExitCode::SUCCESS
		}
		Command::Upload {
			file,
			retries,
			interval_ms,
			step_ms,
		} => {
			let mut engine = connect(
				&cli.credentials,
				&client_config,
				SyncConfig {
					max_retries: retries,
					initial_interval: Duration::from_millis(interval_ms),
					interval_step: Duration::from_millis(step_ms),
					..SyncConfig::default()
				},
			)
			.await?;
			engine.store_mut().load_local(&file)?;
			let failed = engine.upload_pending().await?;
			if let Some(stats) = engine.last_stats() {
				info!("{}", stats.summary());
			}
			persist_refreshed(&engine, &cli.credentials).await?;

			if failed.is_empty() {
				info!("All rules uploaded");
				ExitCode::SUCCESS
			} else {
				warn!("{} rules could not be uploaded:", failed.len());
				for rule in &failed {
					println!("{}\t{}", rule.category, rule.pattern);
				}
				ExitCode::from(2)
			}
		}
		Command::Dump { file, append } => {
			let mut engine = connect(&cli.credentials, &client_config, SyncConfig::default()).await?;
			engine.fetch_remote().await?;
			engine.store().dump_remote(&file, append)?;
			persist_refreshed(&engine, &cli.credentials).await?;
			ExitCode::SUCCESS
		}
		Command::Add { pattern, category } => {
			let mut engine = connect(&cli.credentials, &client_config, SyncConfig::default()).await?;
			let outcome = engine.add_rule(category.as_deref(), &pattern).await?;
			persist_refreshed(&engine, &cli.credentials).await?;
			rejection_code("Rule", outcome)
		}
		Command::Delete { id } => {
			let mut engine = connect(&cli.credentials, &client_config, SyncConfig::default()).await?;
			let outcome = engine.delete_remote(id).await?;
			persist_refreshed(&engine, &cli.credentials).await?;
			rejection_code("Delete", outcome)
		}
	};

	Ok(code)
}

fn rejection_code(what: &str, outcome: MutationOutcome) -> ExitCode {
	if outcome.accepted {
		return ExitCode::SUCCESS;
	}
	warn!(
		"{} rejected with code {}: {}",
		what,
		outcome.raw_status,
		outcome.message.unwrap_or_default()
	);
	ExitCode::from(2)
}

/// Load credentials and build an engine. Fails before any remote call if the credential
/// material is missing or corrupt.
async fn connect(
	credentials: &Path,
	client_config: &ClientConfig,
	config: SyncConfig,
) -> Result<SyncEngine<RemoteFilterClient>, FilterSyncError> {
	let credentials = CredentialContext::load(credentials).await?;
	let client = RemoteFilterClient::new(credentials, client_config)?;
	Ok(SyncEngine::new(client, config))
}

/// Write back session cookies the server refreshed during this run.
async fn persist_refreshed(
	engine: &SyncEngine<RemoteFilterClient>,
	path: &Path,
) -> Result<(), FilterSyncError> {
	if let Some(credentials) = engine.api().refreshed_credentials() {
		info!("Server refreshed the session cookies");
		credentials.save(path).await?;
	}
	Ok(())
}
