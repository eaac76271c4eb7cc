//! User credential lifecycle: redirect authorization, code exchange, refresh, and reset.
//!
//! ```text
//! [no credential] --authorize--> [pending code] --callback--> [exchange] --> [valid, cached]
//! [valid, cached] --now >= expires_at--> [expired] --refresh or authorize--> ...
//! [pending code] --timeout / cancel / malformed callback--> Error::Callback
//! ```

// crates.io
use rand::{Rng, distr::Alphanumeric};
// self
use crate::{
	_prelude::*,
	api::{self, DataEnvelope, TransportErrorMapper},
	auth::{AuthorizationCode, UserCredential, UserTokenGrant},
	callback::{CallbackError, CallbackListener},
	error::ConfigError,
	flows::TokenBroker,
	http::TokenHttpClient,
	obs::{self, FlowKind},
};

const STATE_LEN: usize = 32;

impl<C, M> TokenBroker<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Returns the held user credential if it has not expired. Never touches the network.
	pub async fn get_user_token(&self) -> Result<UserCredential> {
		match self.current_user().await? {
			Some(credential) if !credential.is_expired() => Ok(credential),
			Some(_) => Err(Error::NeedsAuthorization { reason: "the user access token expired".into() }),
			None =>
				Err(Error::NeedsAuthorization { reason: "no user access token is stored".into() }),
		}
	}

	/// Builds the consent page URL for `state` using the configured redirect address.
	pub fn authorize_url(&self, state: &str) -> Result<Url> {
		self.authorize_url_for(state, &self.config.redirect_uri)
	}

	/// Runs the full redirect authorization: listen, open the consent page, await the callback,
	/// verify `state`, exchange the code, and persist the result.
	pub async fn interactive_authorize(&self) -> Result<UserCredential> {
		const KIND: FlowKind = FlowKind::Authorization;

		obs::observe(KIND, "interactive_authorize", async move {
			let state = random_state();
			let listener = CallbackListener::bind(&self.config.redirect_uri).await?;
			let redirect_uri = listener.redirect_uri().clone();
			let url = self.authorize_url_for(&state, &redirect_uri)?;
			let pending = listener.spawn();

			obs::info_awaiting_callback(&url, &redirect_uri);

			if let Err(e) = self.opener.open(&url) {
				obs::warn_open_failed(&url, &e);
			}

			let params = pending.wait(self.config.callback_timeout).await?;

			if params.state != state {
				return Err(CallbackError::StateMismatch.into());
			}

			self.grant_user_token(
				KIND,
				api::USER_ACCESS_TOKEN_PATH,
				code_exchange_body(params.code),
			)
			.await
		})
		.await
	}

	/// Exchanges an authorization code received out of band. Never retried.
	pub async fn exchange_code(&self, code: AuthorizationCode) -> Result<UserCredential> {
		const KIND: FlowKind = FlowKind::Authorization;

		obs::observe(
			KIND,
			"exchange_code",
			self.grant_user_token(KIND, api::USER_ACCESS_TOKEN_PATH, code_exchange_body(code)),
		)
		.await
	}

	/// Trades the held refresh token for a new user credential.
	///
	/// Fails with [`Error::NeedsAuthorization`] when no refresh token is held.
	pub async fn refresh_user_token(&self) -> Result<UserCredential> {
		const KIND: FlowKind = FlowKind::Refresh;

		obs::observe(KIND, "refresh_user_token", async move {
			let refresh = self
				.current_user()
				.await?
				.and_then(|credential| credential.refresh_token)
				.filter(|secret| !secret.is_empty())
				.ok_or_else(|| Error::NeedsAuthorization {
					reason: "no refresh token is stored".into(),
				})?;
			let body = serde_json::json!({
				"grant_type": "refresh_token",
				"refresh_token": refresh.expose(),
			});

			self.grant_user_token(KIND, api::REFRESH_ACCESS_TOKEN_PATH, body).await
		})
		.await
	}

	/// Returns a usable user credential, refreshing or authorizing interactively as needed.
	pub async fn user_access_token(&self) -> Result<UserCredential> {
		match self.get_user_token().await {
			Ok(credential) => return Ok(credential),
			Err(e) if e.is_needs_authorization() => (),
			Err(e) => return Err(e),
		}

		if self.current_user().await?.is_some_and(|credential| credential.has_refresh_token()) {
			match self.refresh_user_token().await {
				Ok(credential) => return Ok(credential),
				Err(e) => obs::warn_refresh_fallback(&e),
			}
		}

		self.interactive_authorize().await
	}

	/// Forgets the user credential, in memory and in the secret store.
	pub async fn reset_user_token(&self) -> Result<()> {
		self.store.clear().await?;
		self.set_user(None);

		Ok(())
	}

	fn authorize_url_for(&self, state: &str, redirect_uri: &Url) -> Result<Url> {
		let mut url = api::endpoint(&self.config.host, api::AUTHORIZE_PATH)?;

		url.query_pairs_mut()
			.append_pair("app_id", &self.config.app_id)
			.append_pair("redirect_uri", redirect_uri.as_str())
			.append_pair("state", state);

		Ok(url)
	}

	async fn grant_user_token(
		&self,
		kind: FlowKind,
		path: &str,
		body: JsonValue,
	) -> Result<UserCredential> {
		let app = self.get_app_token().await?;
		let url = api::endpoint(&self.config.host, path)?;
		let headers = api::authenticated_headers(&app, &[]);
		let request = api::build_request("POST", &url, &headers, Some(&body))?;
		let value = self.execute(kind, &url, request).await?.into_envelope()?;
		let grant = api::decode::<DataEnvelope<UserTokenGrant>>(value)?;
		let credential =
			grant.data.into_credential(OffsetDateTime::now_utc()).map_err(ConfigError::from)?;

		self.store.save(credential.clone()).await?;
		self.set_user(Some(credential.clone()));

		Ok(credential)
	}

	async fn current_user(&self) -> Result<Option<UserCredential>> {
		{
			let slot = self.user.lock();

			if slot.loaded {
				return Ok(slot.credential.clone());
			}
		}

		let loaded = self.store.load().await?;
		let mut slot = self.user.lock();

		if !slot.loaded {
			slot.loaded = true;
			slot.credential = loaded;
		}

		Ok(slot.credential.clone())
	}

	fn set_user(&self, credential: Option<UserCredential>) {
		let mut slot = self.user.lock();

		slot.loaded = true;
		slot.credential = credential;
	}
}

fn code_exchange_body(code: AuthorizationCode) -> JsonValue {
	serde_json::json!({
		"grant_type": "authorization_code",
		"code": code.into_secret().expose(),
	})
}

fn random_state() -> String {
	rand::rng().sample_iter(Alphanumeric).take(STATE_LEN).map(char::from).collect()
}
