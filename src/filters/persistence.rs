//! CSV load and dump of rule lists.
//!
//! Files are UTF-8 with a `type,filter` header followed by one rule per row.

use crate::filters::{FilterRule, FilterSyncError};

use std::fs::OpenOptions;
use std::path::Path;
use tracing::{debug, info};

/// Header written at the top of a fresh rule file.
pub const HEADER: [&str; 2] = ["type", "filter"];

/// Read local rules from a CSV file.
///
/// The first row is always treated as a header. Rows with fewer than two fields are skipped and
/// extra fields are ignored.
pub fn load_local(path: &Path) -> Result<Vec<FilterRule>, FilterSyncError> {
	let mut reader = csv::ReaderBuilder::new()
		.has_headers(true)
		.flexible(true)
		.from_path(path)?;

	let mut rules = Vec::new();
	for record in reader.records() {
		let record = record?;
		match (record.get(0), record.get(1)) {
			(Some(category), Some(pattern)) => rules.push(FilterRule::local(category, pattern)),
			_ => debug!("Skipping short row at {:?}", record.position()),
		}
	}

	info!("Loaded {} local rules from {}", rules.len(), path.display());
	Ok(rules)
}

/// Write rules as `type,filter` rows.
///
/// The header is written only when not appending. Append mode creates the file if needed.
pub fn dump_local(rules: &[FilterRule], path: &Path, append: bool) -> Result<(), FilterSyncError> {
	let file = if append {
		OpenOptions::new().create(true).append(true).open(path)?
	} else {
		OpenOptions::new()
			.create(true)
			.write(true)
			.truncate(true)
			.open(path)?
	};

	let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
	if !append {
		writer.write_record(HEADER)?;
	}
	for rule in rules {
		writer.write_record([rule.category.as_str(), rule.pattern.as_str()])?;
	}
	writer.flush()?;

	info!(
		"Wrote {} rules to {}{}",
		rules.len(),
		path.display(),
		if append { " (append)" } else { "" }
	);
	Ok(())
}
