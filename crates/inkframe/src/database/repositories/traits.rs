//! Shared conversion helpers for the SeaORM repositories

use crate::errors::{RepositoryError, RepositoryResult};
use std::fmt::Display;
use std::str::FromStr;

/// Conversion from a stored SeaORM model to its domain type
pub trait EntityToDomain<Entity, Domain> {
    fn to_domain(&self, entity: Entity) -> RepositoryResult<Domain>;
}

pub struct ConversionUtils;

impl ConversionUtils {
    /// Parse a stored string column into a domain enum
    pub fn parse_column<T: FromStr>(field: &str, value: &str) -> RepositoryResult<T> {
        value.parse().map_err(|_| RepositoryError::InvalidValue {
            field: field.to_string(),
            value: value.to_string(),
        })
    }

    /// Narrow a stored integer column
    pub fn convert_int<S, T>(field: &str, value: S) -> RepositoryResult<T>
    where
        S: Copy + Display,
        T: TryFrom<S>,
    {
        T::try_from(value).map_err(|_| RepositoryError::InvalidValue {
            field: field.to_string(),
            value: value.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::JobStatus;

    #[test]
    fn test_parse_column() {
        let status: JobStatus = ConversionUtils::parse_column("status", "failed").unwrap();
        assert_eq!(status, JobStatus::Failed);

        let err = ConversionUtils::parse_column::<JobStatus>("status", "bogus").unwrap_err();
        assert!(err.to_string().contains("bogus"));
    }

    #[test]
    fn test_convert_int() {
        let width: u32 = ConversionUtils::convert_int("width", 800i32).unwrap();
        assert_eq!(width, 800);
        assert!(ConversionUtils::convert_int::<i32, u32>("width", -1).is_err());
    }
}
