//! Broker configuration, validated once at build time.

// std
use std::{env, path::PathBuf};
// self
use crate::{
	_prelude::*,
	auth::{AppId, TokenSecret},
	cache::{self, ResponseCache},
	error::ConfigError,
	retry::RetryPolicy,
};

/// Default Open Platform host.
pub const DEFAULT_HOST: &str = "https://open.feishu.cn";
/// Default redirect address served by the callback listener.
pub const DEFAULT_REDIRECT_URI: &str = "http://localhost:3000/user_access_token";
/// Default bound on the wait for the authorization callback.
pub const DEFAULT_CALLBACK_TIMEOUT: Duration = Duration::seconds(300);

/// Environment variable holding the application identifier.
pub const ENV_APP_ID: &str = "FEISHU_APP_ID";
/// Environment variable holding the application secret.
pub const ENV_APP_SECRET: &str = "FEISHU_APP_SECRET";
/// Environment variable overriding [`DEFAULT_HOST`].
pub const ENV_HOST: &str = "FEISHU_HOST";
/// Environment variable overriding [`DEFAULT_REDIRECT_URI`].
pub const ENV_REDIRECT_URI: &str = "FEISHU_REDIRECT_URI";
/// Environment variable overriding [`DEFAULT_CALLBACK_TIMEOUT`], in seconds.
pub const ENV_CALLBACK_TIMEOUT_SECS: &str = "FEISHU_CALLBACK_TIMEOUT_SECS";
/// Environment variable overriding the response cache TTL, in seconds; `0` disables the cache.
pub const ENV_CACHE_TTL_SECS: &str = "FEISHU_CACHE_TTL_SECS";

/// Response cache location and lifetime.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheSettings {
	/// Directory holding cache entries.
	pub dir: PathBuf,
	/// Entry lifetime.
	pub ttl: Duration,
}

/// Validated broker configuration.
#[derive(Clone, Debug)]
pub struct BrokerConfig {
	/// Application identifier (`cli_…`).
	pub app_id: AppId,
	/// Application secret.
	pub app_secret: TokenSecret,
	/// Open Platform host every endpoint is joined onto.
	pub host: Url,
	/// Redirect address registered for the app and served by the callback listener.
	pub redirect_uri: Url,
	/// Bound on the wait for the authorization callback.
	pub callback_timeout: Duration,
	/// Response cache settings; `None` disables caching.
	pub cache: Option<CacheSettings>,
	/// Retry policy for the low-level request primitive.
	pub retry: RetryPolicy,
}
impl BrokerConfig {
	/// Starts a builder for the provided application credentials.
	pub fn builder(app_id: AppId, app_secret: impl Into<String>) -> BrokerConfigBuilder {
		BrokerConfigBuilder {
			app_id,
			app_secret: app_secret.into(),
			host: None,
			redirect_uri: None,
			callback_timeout: DEFAULT_CALLBACK_TIMEOUT,
			cache_dir: None,
			cache_ttl: cache::DEFAULT_TTL,
			cache_enabled: true,
			retry: RetryPolicy::default(),
		}
	}

	/// Loads the configuration from `FEISHU_*` environment variables.
	pub fn from_env() -> Result<Self, ConfigError> {
		Self::from_lookup(|name| env::var(name).ok())
	}

	/// Loads the configuration through `lookup`, which maps variable names to values.
	pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
	where
		F: Fn(&'static str) -> Option<String>,
	{
		let required = |name| {
			lookup(name)
				.filter(|value| !value.trim().is_empty())
				.ok_or(ConfigError::MissingEnv { name })
		};
		let app_id = AppId::new(required(ENV_APP_ID)?)?;
		let mut builder = Self::builder(app_id, required(ENV_APP_SECRET)?);

		if let Some(host) = lookup(ENV_HOST) {
			builder = builder.host(parse_env_url(ENV_HOST, host)?);
		}
		if let Some(redirect) = lookup(ENV_REDIRECT_URI) {
			builder = builder.redirect_uri(parse_env_url(ENV_REDIRECT_URI, redirect)?);
		}
		if let Some(raw) = lookup(ENV_CALLBACK_TIMEOUT_SECS) {
			builder = builder.callback_timeout(parse_env_secs(ENV_CALLBACK_TIMEOUT_SECS, raw)?);
		}
		if let Some(raw) = lookup(ENV_CACHE_TTL_SECS) {
			let ttl = parse_env_secs(ENV_CACHE_TTL_SECS, raw)?;

			builder = if ttl.is_zero() { builder.disable_cache() } else { builder.cache_ttl(ttl) };
		}

		builder.build()
	}

	/// Opens the response cache described by [`BrokerConfig::cache`].
	pub fn open_cache(&self) -> Result<Option<ResponseCache>> {
		match &self.cache {
			Some(settings) => Ok(Some(ResponseCache::open(&settings.dir, settings.ttl)?)),
			None => Ok(None),
		}
	}
}

/// Builder for [`BrokerConfig`].
#[derive(Clone, Debug)]
pub struct BrokerConfigBuilder {
	app_id: AppId,
	app_secret: String,
	host: Option<Url>,
	redirect_uri: Option<Url>,
	callback_timeout: Duration,
	cache_dir: Option<PathBuf>,
	cache_ttl: Duration,
	cache_enabled: bool,
	retry: RetryPolicy,
}
impl BrokerConfigBuilder {
	/// Overrides the Open Platform host (for example a Lark or mock host).
	pub fn host(mut self, host: Url) -> Self {
		self.host = Some(host);

		self
	}

	/// Overrides the redirect address.
	pub fn redirect_uri(mut self, redirect_uri: Url) -> Self {
		self.redirect_uri = Some(redirect_uri);

		self
	}

	/// Overrides the callback wait bound.
	pub fn callback_timeout(mut self, timeout: Duration) -> Self {
		self.callback_timeout = timeout;

		self
	}

	/// Places the response cache under `dir` instead of the platform cache directory.
	pub fn cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
		self.cache_dir = Some(dir.into());

		self
	}

	/// Overrides the response cache TTL.
	pub fn cache_ttl(mut self, ttl: Duration) -> Self {
		self.cache_ttl = ttl;

		self
	}

	/// Turns the response cache off.
	pub fn disable_cache(mut self) -> Self {
		self.cache_enabled = false;

		self
	}

	/// Overrides the retry policy.
	pub fn retry(mut self, retry: RetryPolicy) -> Self {
		self.retry = retry;

		self
	}

	/// Validates the inputs and produces the configuration.
	pub fn build(self) -> Result<BrokerConfig, ConfigError> {
		if self.app_secret.trim().is_empty() {
			return Err(ConfigError::EmptyAppSecret);
		}

		let host = match self.host {
			Some(host) => host,
			None => parse_default(DEFAULT_HOST, "host")?,
		};

		if !matches!(host.scheme(), "http" | "https") {
			return Err(ConfigError::UnsupportedScheme {
				field: "host",
				expected: "http or https",
				url: host.to_string(),
			});
		}

		let redirect_uri = match self.redirect_uri {
			Some(uri) => uri,
			None => parse_default(DEFAULT_REDIRECT_URI, "redirect")?,
		};

		if redirect_uri.scheme() != "http" {
			return Err(ConfigError::UnsupportedScheme {
				field: "redirect",
				expected: "http",
				url: redirect_uri.to_string(),
			});
		}
		if redirect_uri.host_str().is_none_or(str::is_empty) {
			return Err(ConfigError::MissingRedirectHost { url: redirect_uri.to_string() });
		}

		let cache = if self.cache_enabled && self.cache_ttl.is_positive() {
			self.cache_dir
				.or_else(ResponseCache::default_dir)
				.map(|dir| CacheSettings { dir, ttl: self.cache_ttl })
		} else {
			None
		};

		Ok(BrokerConfig {
			app_id: self.app_id,
			app_secret: TokenSecret::new(self.app_secret),
			host,
			redirect_uri,
			callback_timeout: self.callback_timeout,
			cache,
			retry: self.retry,
		})
	}
}

fn parse_default(raw: &str, field: &'static str) -> Result<Url, ConfigError> {
	Url::parse(raw).map_err(|source| ConfigError::InvalidUrl { field, source })
}

fn parse_env_url(name: &'static str, value: String) -> Result<Url, ConfigError> {
	Url::parse(value.trim()).map_err(|_| ConfigError::InvalidEnv { name, value })
}

fn parse_env_secs(name: &'static str, value: String) -> Result<Duration, ConfigError> {
	match value.trim().parse::<u32>() {
		Ok(secs) => Ok(Duration::seconds(secs.into())),
		Err(_) => Err(ConfigError::InvalidEnv { name, value }),
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn app_id() -> AppId {
		AppId::new("cli_a1b2").expect("App identifier fixture should be valid.")
	}

	#[test]
	fn defaults_match_documented_values() {
		let config = BrokerConfig::builder(app_id(), "secret")
			.cache_dir("/tmp/feishu-broker-config-test")
			.build()
			.expect("Default configuration should build.");

		assert_eq!(config.host.as_str(), "https://open.feishu.cn/");
		assert_eq!(config.redirect_uri.as_str(), DEFAULT_REDIRECT_URI);
		assert_eq!(config.callback_timeout, Duration::seconds(300));
		assert_eq!(config.retry, RetryPolicy::default());
		assert_eq!(
			config.cache,
			Some(CacheSettings {
				dir: PathBuf::from("/tmp/feishu-broker-config-test"),
				ttl: Duration::seconds(300),
			})
		);
	}

	#[test]
	fn rejects_empty_secret_and_bad_schemes() {
		assert!(matches!(
			BrokerConfig::builder(app_id(), " ").build(),
			Err(ConfigError::EmptyAppSecret)
		));

		let ftp = Url::parse("ftp://open.feishu.cn").expect("URL should parse.");

		assert!(matches!(
			BrokerConfig::builder(app_id(), "s").host(ftp).build(),
			Err(ConfigError::UnsupportedScheme { field: "host", .. })
		));

		let https_redirect = Url::parse("https://localhost:3000/cb").expect("URL should parse.");

		assert!(matches!(
			BrokerConfig::builder(app_id(), "s").redirect_uri(https_redirect).build(),
			Err(ConfigError::UnsupportedScheme { field: "redirect", .. })
		));
	}

	#[test]
	fn lookup_reads_every_variable() {
		let vars = HashMap::from([
			(ENV_APP_ID, "cli_env"),
			(ENV_APP_SECRET, "env-secret"),
			(ENV_HOST, "https://open.larksuite.com"),
			(ENV_REDIRECT_URI, "http://127.0.0.1:8080/cb"),
			(ENV_CALLBACK_TIMEOUT_SECS, "30"),
			(ENV_CACHE_TTL_SECS, "0"),
		]);
		let config = BrokerConfig::from_lookup(|name| vars.get(name).map(|v| v.to_string()))
			.expect("Environment configuration should build.");

		assert_eq!(config.app_id.as_ref(), "cli_env");
		assert_eq!(config.app_secret.expose(), "env-secret");
		assert_eq!(config.host.host_str(), Some("open.larksuite.com"));
		assert_eq!(config.redirect_uri.port(), Some(8080));
		assert_eq!(config.callback_timeout, Duration::seconds(30));
		assert!(config.cache.is_none());
	}

	#[test]
	fn lookup_reports_missing_and_invalid_values() {
		let missing = BrokerConfig::from_lookup(|_| None).expect_err("Empty lookup should fail.");

		assert!(matches!(missing, ConfigError::MissingEnv { name: ENV_APP_ID }));

		let vars = HashMap::from([
			(ENV_APP_ID, "cli_env"),
			(ENV_APP_SECRET, "env-secret"),
			(ENV_CALLBACK_TIMEOUT_SECS, "soon"),
		]);
		let invalid = BrokerConfig::from_lookup(|name| vars.get(name).map(|v| v.to_string()))
			.expect_err("Non-numeric timeout should fail.");

		assert!(matches!(invalid, ConfigError::InvalidEnv { name: ENV_CALLBACK_TIMEOUT_SECS, .. }));
	}
}
