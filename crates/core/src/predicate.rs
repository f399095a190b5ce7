#![forbid(unsafe_code)]

use super::SelectionCriteria;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Column {
    AccountId,
    DeviceId,
    Timestamp,
    StatusCode,
    Latitude,
    Longitude,
    CellLatitude,
    CellLongitude,
    CreationTime,
}

impl Column {
    pub fn name(self) -> &'static str {
        match self {
            Self::AccountId => "account_id",
            Self::DeviceId => "device_id",
            Self::Timestamp => "timestamp",
            Self::StatusCode => "status_code",
            Self::Latitude => "latitude",
            Self::Longitude => "longitude",
            Self::CellLatitude => "cell_latitude",
            Self::CellLongitude => "cell_longitude",
            Self::CreationTime => "creation_time",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Text(String),
    Integer(i64),
    Real(f64),
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Real(value)
    }
}

/// Filter expression tree. Adapters render it; nothing here is free-form text.
///
/// An empty `And` is always true and an empty `Or` is always false.
#[derive(Clone, Debug, PartialEq)]
pub enum Predicate {
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Eq(Column, Value),
    Ne(Column, Value),
    Ge(Column, Value),
    Le(Column, Value),
    Lt(Column, Value),
    In(Column, Vec<Value>),
}

impl Predicate {
    pub fn all() -> Self {
        Self::And(Vec::new())
    }

    pub fn eq(column: Column, value: impl Into<Value>) -> Self {
        Self::Eq(column, value.into())
    }

    pub fn ne(column: Column, value: impl Into<Value>) -> Self {
        Self::Ne(column, value.into())
    }

    pub fn ge(column: Column, value: impl Into<Value>) -> Self {
        Self::Ge(column, value.into())
    }

    pub fn le(column: Column, value: impl Into<Value>) -> Self {
        Self::Le(column, value.into())
    }

    pub fn lt(column: Column, value: impl Into<Value>) -> Self {
        Self::Lt(column, value.into())
    }

    pub fn is_in<V: Into<Value>>(column: Column, values: impl IntoIterator<Item = V>) -> Self {
        Self::In(column, values.into_iter().map(Into::into).collect())
    }

    /// Conjunction that flattens nested `And` nodes instead of stacking them.
    pub fn and(self, other: Predicate) -> Self {
        match (self, other) {
            (Self::And(mut left), Self::And(right)) => {
                left.extend(right);
                Self::And(left)
            }
            (Self::And(mut left), right) => {
                left.push(right);
                Self::And(left)
            }
            (left, Self::And(mut right)) => {
                right.insert(0, left);
                Self::And(right)
            }
            (left, right) => Self::And(vec![left, right]),
        }
    }
}

/// Optional columns an event table may expose.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EventSchema {
    pub has_cell_position: bool,
}

impl Default for EventSchema {
    fn default() -> Self {
        Self {
            has_cell_position: true,
        }
    }
}

pub const MAX_EXTRA_PREDICATES: usize = 2;

/// Turns selection criteria into an AND of fragments.
///
/// Extra predicates past `MAX_EXTRA_PREDICATES` are ignored.
pub fn build_predicate(criteria: &SelectionCriteria, schema: EventSchema) -> Predicate {
    let mut parts = Vec::new();

    let account_id = criteria.account_id.trim();
    if !account_id.is_empty() {
        parts.push(Predicate::eq(Column::AccountId, account_id));
    }
    if let Some(device_id) = criteria.device.device_id() {
        parts.push(Predicate::eq(Column::DeviceId, device_id));
    }

    if !criteria.status_codes.is_empty() {
        parts.push(Predicate::is_in(
            Column::StatusCode,
            criteria.status_codes.iter().copied(),
        ));
    }

    if criteria.gps_required {
        let mut located = vec![
            Predicate::ne(Column::Latitude, 0.0),
            Predicate::ne(Column::Longitude, 0.0),
        ];
        if schema.has_cell_position {
            located.push(Predicate::ne(Column::CellLatitude, 0.0));
            located.push(Predicate::ne(Column::CellLongitude, 0.0));
        }
        parts.push(Predicate::Or(located));
    }

    if let Some(start) = criteria.time_start.filter(|t| *t >= 0) {
        parts.push(Predicate::ge(Column::Timestamp, start));
    }
    if let Some(end) = criteria.time_end.filter(|t| *t >= 0) {
        parts.push(Predicate::le(Column::Timestamp, end));
    }

    parts.extend(
        criteria
            .extra_predicates
            .iter()
            .take(MAX_EXTRA_PREDICATES)
            .cloned(),
    );

    Predicate::And(parts)
}
