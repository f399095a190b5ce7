#![forbid(unsafe_code)]

mod criteria;
mod predicate;
mod record;

pub use criteria::*;
pub use predicate::*;
pub use record::*;

pub mod ids {
    const MAX_ID_LEN: usize = 32;

    #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
    pub struct AccountId(String);

    impl AccountId {
        pub fn as_str(&self) -> &str {
            &self.0
        }

        pub fn try_new(value: impl Into<String>) -> Result<Self, IdError> {
            let value = value.into();
            validate_id(&value)?;
            Ok(Self(value))
        }
    }

    impl std::fmt::Display for AccountId {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str(&self.0)
        }
    }

    #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
    pub struct DeviceId(String);

    impl DeviceId {
        pub fn as_str(&self) -> &str {
            &self.0
        }

        pub fn try_new(value: impl Into<String>) -> Result<Self, IdError> {
            let value = value.into();
            if value == "*" {
                return Err(IdError::Wildcard);
            }
            validate_id(&value)?;
            Ok(Self(value))
        }
    }

    impl std::fmt::Display for DeviceId {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str(&self.0)
        }
    }

    #[derive(Clone, Debug, PartialEq, Eq)]
    pub enum IdError {
        Empty,
        TooLong,
        Wildcard,
        InvalidChar { ch: char, index: usize },
    }

    impl IdError {
        pub fn message(&self) -> &'static str {
            match self {
                Self::Empty => "id must not be empty",
                Self::TooLong => "id is too long",
                Self::Wildcard => "wildcard is not a concrete id",
                Self::InvalidChar { .. } => "id contains an invalid character",
            }
        }
    }

    fn validate_id(value: &str) -> Result<(), IdError> {
        if value.trim().is_empty() {
            return Err(IdError::Empty);
        }
        if value.len() > MAX_ID_LEN {
            return Err(IdError::TooLong);
        }
        for (index, ch) in value.chars().enumerate() {
            if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-' | '@') {
                continue;
            }
            return Err(IdError::InvalidChar { ch, index });
        }
        Ok(())
    }
}
