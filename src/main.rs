//! `feishu-broker` command-line interface.

// std
use std::{path::PathBuf, sync::Arc};
// crates.io
use clap::{Parser, Subcommand};
use color_eyre::{Result, Section, eyre::WrapErr};
use feishu_broker::{
	config::BrokerConfig,
	flows::ReqwestTokenBroker,
	store::{FileStore, SecretStore},
	url::Url,
};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "feishu-broker", about = "Feishu/Lark Open Platform token broker", version)]
struct Cli {
	/// Load environment variables from this file instead of `./.env`.
	#[arg(long, global = true)]
	env_file: Option<PathBuf>,
	/// Persist the user token in a JSON file instead of the system keychain.
	#[arg(long, global = true, env = "FEISHU_TOKEN_FILE")]
	token_file: Option<PathBuf>,
	/// Raise the default log level to `debug`; `RUST_LOG` still wins.
	#[arg(short, long, global = true)]
	verbose: bool,
	#[command(subcommand)]
	command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
	/// Print the tenant access token.
	TenantToken,
	/// Print the app access token.
	AppToken,
	/// Print the stored user access token if it is still valid.
	UserToken,
	/// Authorize in the browser and store the user access token.
	Login,
	/// Refresh the stored user access token.
	Refresh,
	/// Forget the stored user access token.
	Reset,
	/// Print a JSAPI ticket.
	Ticket,
	/// Send a request with the user access token and print the JSON response.
	Request {
		/// HTTP method.
		method: String,
		/// Absolute URL.
		url: Url,
		/// Query parameter, repeatable.
		#[arg(long = "query", value_name = "KEY=VALUE", value_parser = parse_pair)]
		query: Vec<(String, String)>,
		/// Request header, repeatable; overrides the defaults.
		#[arg(long = "header", value_name = "NAME=VALUE", value_parser = parse_pair)]
		headers: Vec<(String, String)>,
		/// JSON request body.
		#[arg(long, value_parser = parse_json)]
		body: Option<serde_json::Value>,
	},
}

fn main() -> Result<()> {
	color_eyre::install()?;

	let cli = Cli::parse();

	match &cli.env_file {
		Some(path) => {
			dotenvy::from_path(path).wrap_err_with(|| format!("failed to load {}", path.display()))?;
		},
		None => {
			let _ = dotenvy::dotenv();
		},
	}

	init_tracing(cli.verbose);

	tokio::runtime::Builder::new_current_thread()
		.enable_all()
		.build()
		.wrap_err("failed to build the async runtime")?
		.block_on(run(cli))
}

fn init_tracing(verbose: bool) {
	let default = if verbose { "debug" } else { "info" };
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

	tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

async fn run(cli: Cli) -> Result<()> {
	let config = BrokerConfig::from_env()
		.wrap_err("invalid configuration")
		.suggestion("set FEISHU_APP_ID and FEISHU_APP_SECRET, or pass --env-file")?;
	let broker = ReqwestTokenBroker::new(config, open_store(cli.token_file)?)?;

	match cli.command {
		Command::TenantToken => println!("{}", broker.get_tenant_token().await?.value()),
		Command::AppToken => println!("{}", broker.get_app_token().await?.expose()),
		Command::UserToken => {
			let credential = broker
				.get_user_token()
				.await
				.suggestion("run `feishu-broker login` to authorize")?;

			println!("{}", credential.access_token.expose());
		},
		Command::Login => {
			let credential = broker.interactive_authorize().await?;

			eprintln!("Authorized as {}.", credential.name().unwrap_or("<unknown>"));
			println!("{}", credential.access_token.expose());
		},
		Command::Refresh => {
			let credential = broker
				.refresh_user_token()
				.await
				.suggestion("run `feishu-broker login` to authorize")?;

			println!("{}", credential.access_token.expose());
		},
		Command::Reset => {
			broker.reset_user_token().await?;

			eprintln!("Stored user access token removed.");
		},
		Command::Ticket => println!("{}", broker.get_jsapi_ticket().await?),
		Command::Request { method, url, query, headers, body } => {
			broker.user_access_token().await?;

			let value =
				broker.authenticated_request(&method, &url, &query, &headers, body.as_ref()).await?;

			println!("{}", serde_json::to_string_pretty(&value)?);
		},
	}

	Ok(())
}

#[cfg(feature = "keyring")]
fn open_store(token_file: Option<PathBuf>) -> Result<Arc<dyn SecretStore>> {
	match token_file {
		Some(path) => Ok(Arc::new(FileStore::open(path)?)),
		None => Ok(Arc::new(feishu_broker::store::KeyringStore::default())),
	}
}

#[cfg(not(feature = "keyring"))]
fn open_store(token_file: Option<PathBuf>) -> Result<Arc<dyn SecretStore>> {
	let path = match token_file {
		Some(path) => path,
		None => dirs::config_dir()
			.ok_or_else(|| color_eyre::eyre::eyre!("no config directory; pass --token-file"))?
			.join("feishu-broker")
			.join("user_access_token.json"),
	};

	Ok(Arc::new(FileStore::open(path)?))
}

fn parse_pair(raw: &str) -> Result<(String, String), String> {
	match raw.split_once('=') {
		Some((key, value)) if !key.is_empty() => Ok((key.to_owned(), value.to_owned())),
		_ => Err(format!("expected KEY=VALUE, got `{raw}`")),
	}
}

fn parse_json(raw: &str) -> Result<serde_json::Value, String> {
	serde_json::from_str(raw).map_err(|e| format!("invalid JSON body: {e}"))
}
