#![forbid(unsafe_code)]

use super::{Predicate, StatusCode};

pub const ALL_DEVICES: &str = "*";

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum DeviceFilter {
    #[default]
    All,
    Device(String),
}

impl DeviceFilter {
    /// Absent, blank, and `*` all mean every device of the account.
    pub fn parse(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            None | Some("") | Some(ALL_DEVICES) => Self::All,
            Some(device_id) => Self::Device(device_id.to_string()),
        }
    }

    pub fn device_id(&self) -> Option<&str> {
        match self {
            Self::All => None,
            Self::Device(device_id) => Some(device_id.as_str()),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SelectionCriteria {
    pub account_id: String,
    pub device: DeviceFilter,
    pub time_start: Option<i64>,
    pub time_end: Option<i64>,
    pub status_codes: Vec<StatusCode>,
    pub gps_required: bool,
    pub extra_predicates: Vec<Predicate>,
}

impl SelectionCriteria {
    pub fn for_account(account_id: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            ..Self::default()
        }
    }

    pub fn for_device(account_id: impl Into<String>, device_id: &str) -> Self {
        Self {
            account_id: account_id.into(),
            device: DeviceFilter::parse(Some(device_id)),
            ..Self::default()
        }
    }

    pub fn with_range(mut self, time_start: Option<i64>, time_end: Option<i64>) -> Self {
        self.time_start = time_start;
        self.time_end = time_end;
        self
    }

    pub fn with_status_codes(mut self, codes: impl IntoIterator<Item = StatusCode>) -> Self {
        self.status_codes = codes.into_iter().collect();
        self
    }

    pub fn require_gps(mut self) -> Self {
        self.gps_required = true;
        self
    }

    pub fn with_extra(mut self, predicate: Predicate) -> Self {
        self.extra_predicates.push(predicate);
        self
    }

    /// False when the criteria can only ever select nothing: no account, or
    /// both bounds supplied with the start after the end.
    pub fn is_satisfiable(&self) -> bool {
        if self.account_id.trim().is_empty() {
            return false;
        }
        match (
            self.time_start.filter(|t| *t >= 0),
            self.time_end.filter(|t| *t >= 0),
        ) {
            (Some(start), Some(end)) => start <= end,
            _ => true,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LimitType {
    First,
    Last,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

/// How many matches to keep and in which order to return them.
/// A `limit` of zero or less means unlimited.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FetchPolicy {
    pub limit_type: LimitType,
    pub limit: i64,
    pub ascending: bool,
}

impl FetchPolicy {
    pub fn unlimited() -> Self {
        Self {
            limit_type: LimitType::First,
            limit: 0,
            ascending: true,
        }
    }

    pub fn first(limit: i64) -> Self {
        Self {
            limit_type: LimitType::First,
            limit,
            ascending: true,
        }
    }

    pub fn last(limit: i64) -> Self {
        Self {
            limit_type: LimitType::Last,
            limit,
            ascending: true,
        }
    }

    pub fn descending(mut self) -> Self {
        self.ascending = false;
        self
    }

    pub fn direction(&self) -> SortDirection {
        if self.ascending {
            SortDirection::Ascending
        } else {
            SortDirection::Descending
        }
    }

    pub fn bounded_limit(&self) -> Option<u64> {
        u64::try_from(self.limit).ok().filter(|limit| *limit > 0)
    }
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self::unlimited()
    }
}
