/// Account primary keys are PostgreSQL BIGSERIAL.
pub type DbId = i64;

/// Generation jobs are keyed by UUID v7 so ids are unguessable but sortable.
pub type JobId = uuid::Uuid;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
