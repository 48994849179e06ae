/// Generation jobs are keyed by UUID v7, so ids sort by submission time.
pub type JobId = uuid::Uuid;

/// Content entities (shots) are identified by the caller's opaque id.
pub type EntityId = String;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
