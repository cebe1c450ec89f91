use crate::remote::RemoteError;
use crate::session::CredentialError;

use std::fmt;

/// A danmaku filter rule.
///
/// Rules read from a local file have no `remote_id`; rules fetched from the server always do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterRule {
	/// Rule type code: `0` text, `1` regular expression, `2` user.
	pub category: String,
	pub pattern: String,
	pub remote_id: Option<u64>,
}

impl FilterRule {
	/// A rule that has not been confirmed by the server yet.
	pub fn local(category: impl Into<String>, pattern: impl Into<String>) -> Self {
		Self {
			category: category.into(),
			pattern: pattern.into(),
			remote_id: None,
		}
	}

	pub fn is_remote(&self) -> bool {
		self.remote_id.is_some()
	}
}

impl fmt::Display for FilterRule {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}:{}", self.category, self.pattern)
	}
}

/// Errors surfaced by filter sync operations
#[derive(Debug, thiserror::Error)]
pub enum FilterSyncError {
	#[error("Remote error: {0}")]
	Remote(#[from] RemoteError),

	#[error("Credential error: {0}")]
	Credential(#[from] CredentialError),

	#[error("CSV error: {0}")]
	Csv(#[from] csv::Error),

	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
}
