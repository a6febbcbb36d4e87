use time::OffsetDateTime;
use uuid::Uuid;

pub fn unix_millis() -> i128 {
    OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000
}

/// Correlation id attached to every log line of one request.
pub fn new_request_id() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("opt-{}-{}", unix_millis(), &suffix[..8])
}

/// Random file name for a staged upload.
pub fn staged_file_name() -> String {
    Uuid::new_v4().simple().to_string()
}
