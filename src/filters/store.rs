use crate::filters::persistence;
use crate::filters::{FilterRule, FilterSyncError};

use std::path::Path;

/// Which side of the store to project.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleSource {
	Local,
	Remote,
}

/// Local rule list plus the last snapshot fetched from the server.
#[derive(Debug, Clone, Default)]
pub struct RuleStore {
	local: Vec<FilterRule>,
	remote: Vec<FilterRule>,
}

impl RuleStore {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn local(&self) -> &[FilterRule] {
		&self.local
	}

	pub fn remote(&self) -> &[FilterRule] {
		&self.remote
	}

	/// Replace the local list with rules read from a CSV file.
	pub fn load_local(&mut self, path: &Path) -> Result<(), FilterSyncError> {
		self.local = persistence::load_local(path)?;
		Ok(())
	}

	#[cfg(test)]
	pub fn set_local(&mut self, rules: Vec<FilterRule>) {
		self.local = rules;
	}

	/// Write the remote snapshot as `type,filter` rows, dropping identifiers so the file can be
	/// loaded back as a local list.
	pub fn dump_remote(&self, path: &Path, append: bool) -> Result<(), FilterSyncError> {
		let rules: Vec<FilterRule> = self
			.remote
			.iter()
			.map(|r| FilterRule::local(r.category.clone(), r.pattern.clone()))
			.collect();
		persistence::dump_local(&rules, path, append)
	}

	/// Replace the remote snapshot. Only called with the result of a fetch.
	pub(crate) fn replace_remote(&mut self, rules: Vec<FilterRule>) {
		self.remote = rules;
	}

	/// Tab-separated listing for human inspection.
	pub fn list_filters(&self, source: RuleSource) -> String {
		let mut report = String::new();
		match source {
			RuleSource::Local => {
				report.push_str("type\tfilter\n");
				for rule in &self.local {
					report.push_str(&format!("{}\t{}\n", rule.category, rule.pattern));
				}
			}
			RuleSource::Remote => {
				report.push_str("id\ttype\tfilter\n");
				for rule in &self.remote {
					let id = rule.remote_id.map(|id| id.to_string()).unwrap_or_default();
					report.push_str(&format!("{}\t{}\t{}\n", id, rule.category, rule.pattern));
				}
			}
		}
		report
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use pretty_assertions::assert_eq;

	fn remote_rule(id: u64, category: &str, pattern: &str) -> FilterRule {
		FilterRule {
			category: category.to_string(),
			pattern: pattern.to_string(),
			remote_id: Some(id),
		}
	}

	#[test]
	fn listing_shapes() {
		let mut store = RuleStore::new();
		store.set_local(vec![FilterRule::local("0", "foo")]);
		store.replace_remote(vec![remote_rule(7, "1", "bar")]);

		assert_eq!(store.list_filters(RuleSource::Local), "type\tfilter\n0\tfoo\n");
		assert_eq!(store.list_filters(RuleSource::Remote), "id\ttype\tfilter\n7\t1\tbar\n");
	}

	#[test]
	fn dump_remote_reloads_as_local() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("remote.csv");
		let mut store = RuleStore::new();
		store.replace_remote(vec![remote_rule(1, "0", "foo"), remote_rule(2, "2", "abc")]);

		store.dump_remote(&path, false).unwrap();
		store.load_local(&path).unwrap();

		assert_eq!(
			store.local(),
			&[FilterRule::local("0", "foo"), FilterRule::local("2", "abc")]
		);
	}
}
