/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Opaque job handle issued by the generation provider.
pub type JobId = String;
