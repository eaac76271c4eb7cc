//! Application-level bearers (tenant and app tokens) and the JSAPI ticket.

// self
use crate::{
	_prelude::*,
	api::{self, AppTokenResponse, DataEnvelope, TenantTokenResponse, TicketData, TransportErrorMapper},
	auth::{TenantCredential, TokenSecret},
	flows::TokenBroker,
	http::TokenHttpClient,
	obs::{self, FlowKind},
};

impl<C, M> TokenBroker<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Returns the tenant credential, fetching it on first use.
	///
	/// The credential is kept for the lifetime of the broker; the declared expiry is not
	/// consulted.
	pub async fn get_tenant_token(&self) -> Result<TenantCredential> {
		const KIND: FlowKind = FlowKind::TenantToken;

		if let Some(held) = self.tenant.lock().clone() {
			return Ok(held);
		}

		obs::observe(KIND, "get_tenant_token", async move {
			let url = api::endpoint(&self.config.host, api::TENANT_ACCESS_TOKEN_PATH)?;
			let body = self.app_credentials_body();
			let value = self.send_with_retry(KIND, "POST", &url, &[], Some(&body)).await?;
			let response = api::decode::<TenantTokenResponse>(value)?;
			let credential = TenantCredential::new(response.tenant_access_token, response.expire);

			*self.tenant.lock() = Some(credential.clone());

			Ok(credential)
		})
		.await
	}

	/// Returns the app bearer used to authenticate code exchanges and refreshes.
	pub async fn get_app_token(&self) -> Result<TokenSecret> {
		const KIND: FlowKind = FlowKind::AppToken;

		if let Some(held) = self.app.lock().clone() {
			return Ok(held);
		}

		obs::observe(KIND, "get_app_token", async move {
			let url = api::endpoint(&self.config.host, api::APP_ACCESS_TOKEN_PATH)?;
			let body = self.app_credentials_body();
			let value = self.send_with_retry(KIND, "POST", &url, &[], Some(&body)).await?;
			let response = api::decode::<AppTokenResponse>(value)?;
			let secret = TokenSecret::new(response.app_access_token);

			*self.app.lock() = Some(secret.clone());

			Ok(secret)
		})
		.await
	}

	/// Fetches a JSAPI ticket using the tenant bearer.
	pub async fn get_jsapi_ticket(&self) -> Result<String> {
		const KIND: FlowKind = FlowKind::Ticket;

		obs::observe(KIND, "get_jsapi_ticket", async move {
			let tenant = self.get_tenant_token().await?;
			let url = api::endpoint(&self.config.host, api::JSAPI_TICKET_PATH)?;
			let headers = api::authenticated_headers(&tenant.token, &[]);
			let value = self.send_with_retry(KIND, "POST", &url, &headers, None).await?;
			let response = api::decode::<DataEnvelope<TicketData>>(value)?;

			Ok(response.data.ticket)
		})
		.await
	}

	fn app_credentials_body(&self) -> JsonValue {
		serde_json::json!({
			"app_id": &*self.config.app_id,
			"app_secret": self.config.app_secret.expose(),
		})
	}
}
