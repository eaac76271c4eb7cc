//! Fetches a tenant token and a JSAPI ticket from a mock Open Platform host using the default
//! reqwest transport, then shows the tenant token being served from memory on the second call.

// std
use std::sync::Arc;
// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
use url::Url;
// self
use feishu_broker::{
	auth::AppId,
	config::BrokerConfig,
	flows::ReqwestTokenBroker,
	store::{MemoryStore, SecretStore},
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start_async().await;
	let token_mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/open-apis/auth/v3/tenant_access_token/internal")
				.json_body(serde_json::json!({ "app_id": "cli_demo", "app_secret": "demo-secret" }));
			then.status(200).header("content-type", "application/json").body(
				r#"{"code":0,"msg":"ok","tenant_access_token":"t-demo","expire":7200}"#,
			);
		})
		.await;
	let ticket_mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/open-apis/jssdk/ticket/get")
				.header("authorization", "Bearer t-demo");
			then.status(200)
				.header("content-type", "application/json")
				.body(r#"{"code":0,"msg":"ok","data":{"ticket":"jsapi-demo","expire_in":7200}}"#);
		})
		.await;
	let config = BrokerConfig::builder(AppId::new("cli_demo")?, "demo-secret")
		.host(Url::parse(&server.base_url())?)
		.disable_cache()
		.build()?;
	let store: Arc<dyn SecretStore> = Arc::new(MemoryStore::default());
	let broker = ReqwestTokenBroker::new(config, store)?;
	let tenant = broker.get_tenant_token().await?;

	println!("Tenant token: {} (expires in {:?}s).", tenant.value(), tenant.expire);
	println!("JSAPI ticket: {}.", broker.get_jsapi_ticket().await?);

	token_mock.assert_calls_async(1).await;
	ticket_mock.assert_async().await;

	Ok(())
}
