use chrono::{SecondsFormat, Utc};

/// Current UTC time as an RFC 3339 string, used to stamp ingested records.
pub fn ingestion_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Join a base path and a file name with exactly one separator.
pub fn join_path(base: &str, file_name: &str) -> String {
    let base = base.trim_end_matches('/');
    let file_name = file_name.trim_start_matches('/');
    if base.is_empty() {
        format!("/{}", file_name)
    } else {
        format!("{}/{}", base, file_name)
    }
}
