use reqwest::Url;
use reqwest::cookie::{CookieStore, Jar};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Cookie that carries the anti-forgery token required by mutating calls.
pub const CSRF_COOKIE_NAME: &str = "bili_jct";

/// A single session cookie as handed over by a browser login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCookie {
	pub name: String,
	pub value: String,
	pub domain: String,
}

impl SessionCookie {
	#[cfg(test)]
	pub fn new(name: impl Into<String>, value: impl Into<String>, domain: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			value: value.into(),
			domain: domain.into(),
		}
	}

	/// `Set-Cookie` line and origin URL that load this cookie into a jar.
	///
	/// A leading dot marks a domain cookie sent to every subdomain; any other domain is host-only.
	fn jar_entry(&self) -> Option<(String, Url)> {
		let (host, domain_attr) = match self.domain.strip_prefix('.') {
			Some(domain) => (domain, format!("; Domain={}", domain)),
			None => (self.domain.as_str(), String::new()),
		};
		if host.is_empty() {
			return None;
		}
		let origin = Url::parse(&format!("https://{}/", host)).ok()?;
		Some((format!("{}={}; Path=/{}", self.name, self.value, domain_attr), origin))
	}
}

/// Outcome of deriving the anti-forgery token from session cookies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AntiForgeryToken {
	Present(String),
	/// No usable token cookie. Reads still work; every mutation will be rejected by the server.
	Missing,
}

impl AntiForgeryToken {
	/// Value to send with a mutating request. Empty when the token is missing.
	pub fn as_str(&self) -> &str {
		match self {
			AntiForgeryToken::Present(token) => token,
			AntiForgeryToken::Missing => "",
		}
	}

	pub fn is_present(&self) -> bool {
		matches!(self, AntiForgeryToken::Present(_))
	}
}

/// Errors raised while loading or saving credential material
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
	#[error("Credential material not found at {0}")]
	Missing(PathBuf),

	#[error("Corrupt credential material: {0}")]
	Corrupt(String),

	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
}

/// On-disk shape of persisted credentials.
#[derive(Debug, Serialize, Deserialize)]
struct CredentialMaterial {
	cookies: Vec<SessionCookie>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	user_agent: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	saved_at: Option<String>,
}

/// Transport session state plus the anti-forgery token derived from it.
#[derive(Debug, Clone)]
pub struct CredentialContext {
	cookies: Vec<SessionCookie>,
	user_agent: Option<String>,
	token: AntiForgeryToken,
}

impl CredentialContext {
	/// Restore a context from material written by [`CredentialContext::save`].
	pub async fn load(path: &Path) -> Result<Self, CredentialError> {
		let bytes = match tokio::fs::read(path).await {
			Ok(bytes) => bytes,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
				return Err(CredentialError::Missing(path.to_path_buf()));
			}
			Err(e) => return Err(e.into()),
		};

		let material: CredentialMaterial = serde_json::from_slice(&bytes)
			.map_err(|e| CredentialError::Corrupt(format!("{}: {}", path.display(), e)))?;

		info!(
			"Loaded {} session cookies from {}",
			material.cookies.len(),
			path.display()
		);
		Ok(Self::with_cookies(material.cookies, material.user_agent))
	}

	/// Persist the current session state.
	pub async fn save(&self, path: &Path) -> Result<(), CredentialError> {
		let material = CredentialMaterial {
			cookies: self.cookies.clone(),
			user_agent: self.user_agent.clone(),
			saved_at: Some(chrono::Utc::now().to_rfc3339()),
		};
		let json = serde_json::to_vec_pretty(&material)
			.map_err(|e| CredentialError::Corrupt(e.to_string()))?;

		if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
			tokio::fs::create_dir_all(parent).await?;
		}
		tokio::fs::write(path, json).await?;

		info!("Saved session credentials to {}", path.display());
		Ok(())
	}

	/// Build a context from cookies produced by an external interactive login.
	pub fn from_external_login(cookies: Vec<SessionCookie>, user_agent: Option<String>) -> Self {
		Self::with_cookies(cookies, user_agent)
	}

	/// Read a browser cookie export: a JSON array of objects with at least
	/// `name`, `value` and `domain`. Other fields are ignored.
	pub async fn import_cookies(path: &Path) -> Result<Vec<SessionCookie>, CredentialError> {
		let bytes = match tokio::fs::read(path).await {
			Ok(bytes) => bytes,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
				return Err(CredentialError::Missing(path.to_path_buf()));
			}
			Err(e) => return Err(e.into()),
		};
		serde_json::from_slice(&bytes)
			.map_err(|e| CredentialError::Corrupt(format!("{}: {}", path.display(), e)))
	}

	fn with_cookies(cookies: Vec<SessionCookie>, user_agent: Option<String>) -> Self {
		let token = derive_token(&cookies);
		Self {
			cookies,
			user_agent,
			token,
		}
	}

	/// Replace the session cookies, re-deriving the token.
	fn replace_cookies(&mut self, cookies: Vec<SessionCookie>) {
		self.token = derive_token(&cookies);
		self.cookies = cookies;
	}

	pub fn token(&self) -> &AntiForgeryToken {
		&self.token
	}

	pub fn user_agent(&self) -> Option<&str> {
		self.user_agent.as_deref()
	}

	#[cfg(test)]
	pub fn cookies(&self) -> &[SessionCookie] {
		&self.cookies
	}

	/// Load the session cookies into a jar that applies RFC 6265 domain matching.
	pub fn cookie_jar(&self) -> Jar {
		let jar = Jar::default();
		for cookie in &self.cookies {
			match cookie.jar_entry() {
				Some((line, origin)) => jar.add_cookie_str(&line, &origin),
				None => warn!(
					"Skipping cookie {} with unusable domain {:?}",
					cookie.name, cookie.domain
				),
			}
		}
		jar
	}

	/// Fold the values `jar` holds for `url` back into the session. Cookies the session does not
	/// know yet are kept as host-only cookies of `url`. Returns whether anything changed.
	pub fn absorb_jar(&mut self, jar: &Jar, url: &Url) -> bool {
		let Some(header) = jar.cookies(url) else {
			return false;
		};
		let Ok(header) = header.to_str() else {
			return false;
		};

		let mut cookies = self.cookies.clone();
		let mut changed = false;
		for pair in header.split("; ") {
			let Some((name, value)) = pair.split_once('=') else {
				continue;
			};
			match cookies.iter_mut().find(|c| c.name == name) {
				Some(cookie) if cookie.value == value => {}
				Some(cookie) => {
					cookie.value = value.to_string();
					changed = true;
				}
				None => {
					cookies.push(SessionCookie {
						name: name.to_string(),
						value: value.to_string(),
						domain: url.host_str().unwrap_or_default().to_string(),
					});
					changed = true;
				}
			}
		}

		if changed {
			debug!("Session cookies refreshed from {}", url);
			self.replace_cookies(cookies);
		}
		changed
	}
}

fn derive_token(cookies: &[SessionCookie]) -> AntiForgeryToken {
	match cookies
		.iter()
		.find(|c| c.name == CSRF_COOKIE_NAME && !c.value.is_empty())
	{
		Some(cookie) => {
			debug!("Anti-forgery token derived from {}", CSRF_COOKIE_NAME);
			AntiForgeryToken::Present(cookie.value.clone())
		}
		None => {
			warn!(
				"Session has no {} cookie; only read-only calls will succeed",
				CSRF_COOKIE_NAME
			);
			AntiForgeryToken::Missing
		}
	}
}
