//!
//! HTTP client for the remote danmaku filter endpoints.
//!
//! Every request carries the session cookies of a [`CredentialContext`]; mutating requests also
//! carry its anti-forgery token. Calls are issued one at a time and awaited to completion.

use super::types::*;
use crate::filters::FilterRule;
use crate::session::CredentialContext;

use reqwest::cookie::Jar;
use reqwest::{Client, RequestBuilder, Url, header};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const FETCH_PATH: &str = "/x/dm/filter/user";
const ADD_PATH: &str = "/x/dm/filter/user/add";
const DELETE_PATH: &str = "/x/dm/filter/user/del";

/// Connection settings for the remote filter API.
#[derive(Debug, Clone)]
pub struct ClientConfig {
	/// Base URL of the API host, without a trailing path.
	pub base_url: String,
	/// Per-request timeout.
	pub timeout: Duration,
	/// Used when the credentials carry no user agent of their own.
	pub user_agent: String,
}

impl Default for ClientConfig {
	fn default() -> Self {
		Self {
			base_url: "https://api.bilibili.com".to_string(),
			timeout: Duration::from_secs(30),
			user_agent: concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).to_string(),
		}
	}
}

/// Remote rule store operations used by the sync engine.
#[async_trait::async_trait]
pub trait FilterApi: Send + Sync {
	/// Fetch every rule currently stored on the server.
	async fn fetch_all(&self) -> Result<Vec<FilterRule>, RemoteError>;

	/// Add a rule. A non-zero server code is returned as `accepted = false`, not as an error.
	async fn add_rule(&self, category: &str, pattern: &str) -> Result<MutationOutcome, RemoteError>;

	/// Delete a rule by its server identifier.
	async fn delete_rule(&self, remote_id: u64) -> Result<MutationOutcome, RemoteError>;
}

/// Remote filter API client
pub struct RemoteFilterClient {
	/// The underlying HTTP client.
	http_client: Client,
	/// Parsed base URL of the API.
	base_url: Url,
	/// Session cookies and anti-forgery token used for every call.
	credentials: CredentialContext,
	/// Cookie store shared with `http_client`; picks up `Set-Cookie` refreshes.
	jar: Arc<Jar>,
	user_agent: String,
}

impl RemoteFilterClient {
	/// Create a new client bound to the given credentials.
	pub fn new(credentials: CredentialContext, config: &ClientConfig) -> Result<Self, RemoteError> {
		let base_url = Url::parse(&config.base_url)
			.map_err(|e| RemoteError::InvalidUrl(format!("{}: {}", config.base_url, e)))?;
		if base_url.host_str().is_none() {
			return Err(RemoteError::InvalidUrl(format!(
				"{}: missing host",
				config.base_url
			)));
		}

		let jar = Arc::new(credentials.cookie_jar());
		let http_client = Client::builder()
			.timeout(config.timeout)
			.cookie_provider(jar.clone())
			.build()?;
		let user_agent = credentials
			.user_agent()
			.map(str::to_string)
			.unwrap_or_else(|| config.user_agent.clone());

		if !credentials.token().is_present() {
			warn!("No anti-forgery token available; add and delete calls will be rejected");
		}

		Ok(Self {
			http_client,
			base_url,
			credentials,
			jar,
			user_agent,
		})
	}

	/// The credentials with every cookie the server set during this session folded in, or `None`
	/// if nothing changed.
	pub fn refreshed_credentials(&self) -> Option<CredentialContext> {
		let mut credentials = self.credentials.clone();
		credentials
			.absorb_jar(&self.jar, &self.base_url)
			.then_some(credentials)
	}

	fn endpoint(&self, path: &str) -> Result<Url, RemoteError> {
		self.base_url
			.join(path)
			.map_err(|e| RemoteError::InvalidUrl(format!("{}: {}", path, e)))
	}

	fn fetch_request(&self) -> Result<RequestBuilder, RemoteError> {
		Ok(self
			.http_client
			.get(self.endpoint(FETCH_PATH)?)
			.header(header::USER_AGENT, &self.user_agent)
			.query(&[("jsonp", "jsonp")]))
	}

	fn add_request(&self, category: &str, pattern: &str) -> Result<RequestBuilder, RemoteError> {
		self.form_request(
			ADD_PATH,
			&[
				("type", category),
				("filter", pattern),
				("jsonp", "jsonp"),
				("csrf", self.credentials.token().as_str()),
			],
		)
	}

	fn delete_request(&self, remote_id: u64) -> Result<RequestBuilder, RemoteError> {
		let ids = remote_id.to_string();
		self.form_request(
			DELETE_PATH,
			&[
				("ids", ids.as_str()),
				("jsonp", "jsonp"),
				("csrf", self.credentials.token().as_str()),
			],
		)
	}

	fn form_request(&self, path: &str, form: &[(&str, &str)]) -> Result<RequestBuilder, RemoteError> {
		Ok(self
			.http_client
			.post(self.endpoint(path)?)
			.header(header::USER_AGENT, &self.user_agent)
			.form(form))
	}

	/// Send a request and return the body of a 2xx response.
	async fn send(&self, request: RequestBuilder) -> Result<Vec<u8>, RemoteError> {
		let response = request.send().await?;

		if !response.status().is_success() {
			return Err(RemoteError::HttpStatus(response.status().as_u16()));
		}

		Ok(response.bytes().await?.to_vec())
	}

	async fn send_mutation(&self, request: RequestBuilder) -> Result<MutationOutcome, RemoteError> {
		let body = self.send(request).await?;
		let outcome = parse_mutation(&body)?;
		debug!(
			"Mutation -> code {} ({})",
			outcome.raw_status,
			outcome.message.as_deref().unwrap_or("")
		);
		Ok(outcome)
	}
}

#[async_trait::async_trait]
impl FilterApi for RemoteFilterClient {
	async fn fetch_all(&self) -> Result<Vec<FilterRule>, RemoteError> {
		let body = self.send(self.fetch_request()?).await?;
		let rules = parse_rule_list(&body)?;
		debug!("Fetched {} remote rules", rules.len());
		Ok(rules)
	}

	async fn add_rule(&self, category: &str, pattern: &str) -> Result<MutationOutcome, RemoteError> {
		self.send_mutation(self.add_request(category, pattern)?).await
	}

	async fn delete_rule(&self, remote_id: u64) -> Result<MutationOutcome, RemoteError> {
		self.send_mutation(self.delete_request(remote_id)?).await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::session::SessionCookie;
	use tokio::io::{AsyncReadExt, AsyncWriteExt};
	use tokio::net::TcpListener;
	use tokio::task::JoinHandle;

	fn credentials() -> CredentialContext {
		CredentialContext::from_external_login(
			vec![
				SessionCookie::new("SESSDATA", "abc", ".bilibili.com"),
				SessionCookie::new("bili_jct", "tok", ".bilibili.com"),
			],
			None,
		)
	}

	fn local_client(base_url: &str) -> RemoteFilterClient {
		let config = ClientConfig {
			base_url: base_url.to_string(),
			..ClientConfig::default()
		};
		RemoteFilterClient::new(credentials(), &config).unwrap()
	}

	fn form_body(request: RequestBuilder) -> String {
		let request = request.build().unwrap();
		String::from_utf8(request.body().unwrap().as_bytes().unwrap().to_vec()).unwrap()
	}

	fn request_complete(request: &[u8]) -> bool {
		let text = String::from_utf8_lossy(request);
		let Some(end) = text.find("\r\n\r\n") else {
			return false;
		};
		let length = text[..end]
			.lines()
			.find_map(|line| {
				let (name, value) = line.split_once(':')?;
				if name.eq_ignore_ascii_case("content-length") {
					value.trim().parse::<usize>().ok()
				} else {
					None
				}
			})
			.unwrap_or(0);
		request.len() >= end + 4 + length
	}

	/// Accept a single connection on localhost, answer it with `response` and hand back the raw
	/// request.
	async fn serve_once(response: String) -> (String, JoinHandle<String>) {
		let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
		let base_url = format!("http://{}", listener.local_addr().unwrap());
		let handle = tokio::spawn(async move {
			let (mut socket, _) = listener.accept().await.unwrap();
			let mut request = Vec::new();
			let mut buf = [0u8; 4096];
			while !request_complete(&request) {
				let n = socket.read(&mut buf).await.unwrap();
				if n == 0 {
					break;
				}
				request.extend_from_slice(&buf[..n]);
			}
			socket.write_all(response.as_bytes()).await.unwrap();
			socket.shutdown().await.unwrap();
			String::from_utf8(request).unwrap()
		});
		(base_url, handle)
	}

	#[test]
	fn rejects_base_url_without_host() {
		let config = ClientConfig {
			base_url: "not a url".to_string(),
			..ClientConfig::default()
		};
		let err = RemoteFilterClient::new(credentials(), &config).err();
		assert!(matches!(err, Some(RemoteError::InvalidUrl(_))));
	}

	#[test]
	fn endpoints_resolve_against_base() {
		let client = RemoteFilterClient::new(credentials(), &ClientConfig::default()).unwrap();
		assert_eq!(
			client.endpoint(ADD_PATH).unwrap().as_str(),
			"https://api.bilibili.com/x/dm/filter/user/add"
		);
	}

	#[test]
	fn credential_user_agent_wins() {
		let ctx = CredentialContext::from_external_login(vec![], Some("Firefox".into()));
		let client = RemoteFilterClient::new(ctx, &ClientConfig::default()).unwrap();
		assert_eq!(client.user_agent, "Firefox");

		let client = RemoteFilterClient::new(credentials(), &ClientConfig::default()).unwrap();
		assert!(client.user_agent.starts_with("danmaku-filter-sync/"));
	}

	#[test]
	fn fetch_request_shape() {
		let client = RemoteFilterClient::new(credentials(), &ClientConfig::default()).unwrap();
		let request = client.fetch_request().unwrap().build().unwrap();

		assert_eq!(request.method(), reqwest::Method::GET);
		assert_eq!(
			request.url().as_str(),
			"https://api.bilibili.com/x/dm/filter/user?jsonp=jsonp"
		);
		assert!(request.headers().contains_key(header::USER_AGENT));
	}

	#[test]
	fn add_form_carries_rule_and_token() {
		let client = RemoteFilterClient::new(credentials(), &ClientConfig::default()).unwrap();
		let request = client.add_request("1", "^foo$").unwrap();

		assert_eq!(
			form_body(request),
			"type=1&filter=%5Efoo%24&jsonp=jsonp&csrf=tok"
		);
	}

	#[test]
	fn delete_form_carries_id() {
		let client = RemoteFilterClient::new(credentials(), &ClientConfig::default()).unwrap();
		let request = client.delete_request(42).unwrap();

		assert_eq!(form_body(request), "ids=42&jsonp=jsonp&csrf=tok");
	}

	#[test]
	fn missing_token_sends_empty_csrf() {
		let ctx = CredentialContext::from_external_login(
			vec![SessionCookie::new("SESSDATA", "abc", ".bilibili.com")],
			None,
		);
		let client = RemoteFilterClient::new(ctx, &ClientConfig::default()).unwrap();

		assert_eq!(
			form_body(client.add_request("0", "foo").unwrap()),
			"type=0&filter=foo&jsonp=jsonp&csrf="
		);
	}

	#[tokio::test]
	async fn non_success_status_is_a_transport_error() {
		let (base_url, server) = serve_once(
			"HTTP/1.1 503 Service Unavailable\r\ncontent-length: 0\r\nconnection: close\r\n\r\n"
				.to_string(),
		)
		.await;
		let client = local_client(&base_url);

		let err = client.add_rule("0", "foo").await.unwrap_err();

		assert!(matches!(err, RemoteError::HttpStatus(503)));
		assert!(err.is_transport());
		server.await.unwrap();
	}

	#[tokio::test]
	async fn rejection_is_an_outcome_and_set_cookie_refreshes_session() {
		let body = r#"{"code":36005,"message":"exists"}"#;
		let (base_url, server) = serve_once(format!(
			"HTTP/1.1 200 OK\r\ncontent-type: application/json\r\nset-cookie: bili_jct=fresh; Path=/\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
			body.len(),
			body
		))
		.await;
		let client = local_client(&base_url);
		assert!(client.refreshed_credentials().is_none());

		let outcome = client.add_rule("0", "foo").await.unwrap();

		assert_eq!(
			outcome,
			MutationOutcome {
				accepted: false,
				raw_status: 36005,
				message: Some("exists".to_string()),
			}
		);
		let request = server.await.unwrap();
		assert!(request.starts_with("POST /x/dm/filter/user/add "));
		assert!(request.ends_with("type=0&filter=foo&jsonp=jsonp&csrf=tok"));

		let refreshed = client.refreshed_credentials().unwrap();
		assert_eq!(refreshed.token().as_str(), "fresh");
	}
}
