#![forbid(unsafe_code)]

pub type StatusCode = u32;

/// Primary key of a persisted event.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventKey {
    pub account_id: String,
    pub device_id: String,
    pub timestamp: i64,
    pub status_code: StatusCode,
}

/// One telemetry sample. Everything outside `key` and the positional fields
/// is carried as an opaque JSON payload.
#[derive(Clone, Debug, PartialEq)]
pub struct EventRecord {
    pub key: EventKey,
    pub latitude: f64,
    pub longitude: f64,
    pub cell_latitude: Option<f64>,
    pub cell_longitude: Option<f64>,
    pub creation_time: i64,
    pub payload_json: String,
}

impl EventRecord {
    pub fn new(
        account_id: impl Into<String>,
        device_id: impl Into<String>,
        timestamp: i64,
        status_code: StatusCode,
    ) -> Self {
        Self {
            key: EventKey {
                account_id: account_id.into(),
                device_id: device_id.into(),
                timestamp,
                status_code,
            },
            latitude: 0.0,
            longitude: 0.0,
            cell_latitude: None,
            cell_longitude: None,
            creation_time: timestamp,
            payload_json: "{}".to_string(),
        }
    }

    pub fn with_position(mut self, latitude: f64, longitude: f64) -> Self {
        self.latitude = latitude;
        self.longitude = longitude;
        self
    }

    pub fn with_cell_position(mut self, latitude: f64, longitude: f64) -> Self {
        self.cell_latitude = Some(latitude);
        self.cell_longitude = Some(longitude);
        self
    }

    pub fn with_creation_time(mut self, creation_time: i64) -> Self {
        self.creation_time = creation_time;
        self
    }

    pub fn with_payload(mut self, payload_json: impl Into<String>) -> Self {
        self.payload_json = payload_json.into();
        self
    }

    pub fn account_id(&self) -> &str {
        &self.key.account_id
    }

    pub fn device_id(&self) -> &str {
        &self.key.device_id
    }

    pub fn timestamp(&self) -> i64 {
        self.key.timestamp
    }

    pub fn status_code(&self) -> StatusCode {
        self.key.status_code
    }
}

/// Result of a scoped count. `Unavailable` means the engine could not produce
/// the number cheaply; it is never conflated with zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordCount {
    Exact(u64),
    Unavailable,
}

impl RecordCount {
    pub fn exact(self) -> Option<u64> {
        match self {
            Self::Exact(value) => Some(value),
            Self::Unavailable => None,
        }
    }
}

impl std::fmt::Display for RecordCount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exact(value) => write!(f, "{value}"),
            Self::Unavailable => f.write_str("unavailable"),
        }
    }
}
