use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use serde_json::{Map, Value, json};
use tracing::warn;
use uuid::Uuid;

use crate::project::paths;
use crate::util::now_utc_string;

/// Append an event record to the global journal. Journal failures are logged
/// and swallowed; telemetry must never break a build.
pub fn log_event(project_id: Uuid, dce_version: &str, event_type: &str, extra: Map<String, Value>) {
    let journal_file = paths::journal_file(&paths::state_dir());
    if let Err(e) = append_record(&journal_file, project_id, dce_version, event_type, extra) {
        warn!(error = %e, "could not write event journal record");
    }
}

fn append_record(
    journal_file: &Path,
    project_id: Uuid,
    dce_version: &str,
    event_type: &str,
    extra: Map<String, Value>,
) -> std::io::Result<()> {
    if let Some(parent) = journal_file.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut record = json!({
        "id": Uuid::new_v4().to_string(),
        "project_id": project_id.to_string(),
        "dce_version": dce_version,
        "timestamp": now_utc_string(),
        "type": event_type,
    });
    if let Value::Object(object) = &mut record {
        object.extend(extra);
    }

    let mut handle = OpenOptions::new()
        .create(true)
        .append(true)
        .open(journal_file)?;
    handle.write_all(record.to_string().as_bytes())?;
    handle.write_all(b"\n")
}
