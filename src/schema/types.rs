//! Abstract-to-native type mapping.
//!
//! The substitution table is fixed: a dialect without a native
//! representation for an abstract type gets the nearest native one
//! (`SQLite` stores BOOLEAN as INTEGER and JSON or TIMESTAMP as TEXT), and
//! an abstract type with no sensible substitute is simply absent from that
//! dialect's supported set.

use crate::models::{ColumnSpec, ColumnType, Dialect};
use crate::{Error, Result};

/// Translates abstract column types into dialect SQL type strings.
///
/// Stateless; every function is pure and deterministic.
pub struct TypeMapper;

impl TypeMapper {
    /// Renders `column_type` for `dialect`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if a length-bearing type has no
    /// length, or the dialect has no representation for the type.
    pub fn map_type(
        column_type: ColumnType,
        dialect: Dialect,
        length: Option<u32>,
    ) -> Result<String> {
        let native = native_name(column_type, dialect).ok_or_else(|| {
            Error::Configuration(format!(
                "type {column_type} is not supported by {dialect}"
            ))
        })?;

        if !column_type.requires_length() {
            return Ok(native.to_string());
        }

        let length = length.ok_or_else(|| {
            Error::Configuration(format!("length must be specified for {column_type}"))
        })?;

        // The embedded dialect has no bounded text types; the length is
        // validated but not rendered.
        if dialect == Dialect::Sqlite {
            Ok(native.to_string())
        } else {
            Ok(format!("{native}({length})"))
        }
    }

    /// Renders a column's declared type.
    ///
    /// # Errors
    ///
    /// Same as [`TypeMapper::map_type`].
    pub fn map_column(column: &ColumnSpec, dialect: Dialect) -> Result<String> {
        Self::map_type(column.column_type(), dialect, column.length())
    }

    /// Renders a type given by name for a dialect given by name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] for an unknown type name, an
    /// unsupported dialect name, or any [`TypeMapper::map_type`] failure.
    pub fn map_named(type_name: &str, dialect: &str, length: Option<u32>) -> Result<String> {
        let dialect = Dialect::parse(dialect)?;
        let column_type = ColumnType::parse(type_name)?;
        Self::map_type(column_type, dialect, length)
    }

    /// Abstract types `dialect` can represent.
    #[must_use]
    pub fn supported_types(dialect: Dialect) -> Vec<ColumnType> {
        ColumnType::all()
            .iter()
            .copied()
            .filter(|ty| native_name(*ty, dialect).is_some())
            .collect()
    }

    /// Whether `dialect` can represent `column_type`.
    #[must_use]
    pub fn validate_type(column_type: ColumnType, dialect: Dialect) -> bool {
        native_name(column_type, dialect).is_some()
    }
}

/// The substitution table. Length-bearing types return their bare name.
const fn native_name(column_type: ColumnType, dialect: Dialect) -> Option<&'static str> {
    use ColumnType as T;

    let name = match dialect {
        Dialect::Postgres => match column_type {
            T::Text => "TEXT",
            T::Char => "CHAR",
            T::Varchar => "VARCHAR",
            T::Integer => "INTEGER",
            T::SmallInt => "SMALLINT",
            T::BigInt => "BIGINT",
            T::Real => "REAL",
            T::Decimal => "DECIMAL",
            T::Serial => "SERIAL",
            T::Timestamp => "TIMESTAMP",
            T::Date => "DATE",
            T::Time => "TIME",
            T::Interval => "INTERVAL",
            T::Boolean => "BOOLEAN",
            T::Blob | T::Bytea => "BYTEA",
            T::Json => "JSON",
            T::Jsonb => "JSONB",
        },
        Dialect::MySql => match column_type {
            T::Text => "TEXT",
            T::Char => "CHAR",
            T::Varchar => "VARCHAR",
            T::Integer => "INT",
            T::SmallInt => "SMALLINT",
            T::BigInt => "BIGINT",
            T::Real => "DOUBLE",
            T::Decimal => "DECIMAL",
            T::Serial => "SERIAL",
            T::Timestamp => "DATETIME",
            T::Date => "DATE",
            T::Time => "TIME",
            T::Interval => return None,
            T::Boolean => "TINYINT(1)",
            T::Blob | T::Bytea => "BLOB",
            T::Json | T::Jsonb => "JSON",
        },
        Dialect::Sqlite => match column_type {
            T::Text
            | T::Char
            | T::Varchar
            | T::Timestamp
            | T::Date
            | T::Time
            | T::Interval
            | T::Json
            | T::Jsonb => "TEXT",
            T::Integer | T::SmallInt | T::BigInt | T::Serial | T::Boolean => "INTEGER",
            T::Real | T::Decimal => "REAL",
            T::Blob | T::Bytea => "BLOB",
        },
    };
    Some(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(ColumnType::Boolean, Dialect::Sqlite, "INTEGER")]
    #[test_case(ColumnType::Json, Dialect::Sqlite, "TEXT")]
    #[test_case(ColumnType::Timestamp, Dialect::Sqlite, "TEXT")]
    #[test_case(ColumnType::Bytea, Dialect::Sqlite, "BLOB")]
    #[test_case(ColumnType::Boolean, Dialect::MySql, "TINYINT(1)")]
    #[test_case(ColumnType::Timestamp, Dialect::MySql, "DATETIME")]
    #[test_case(ColumnType::Jsonb, Dialect::MySql, "JSON")]
    #[test_case(ColumnType::Blob, Dialect::Postgres, "BYTEA")]
    #[test_case(ColumnType::Jsonb, Dialect::Postgres, "JSONB")]
    #[test_case(ColumnType::Serial, Dialect::Postgres, "SERIAL")]
    fn test_fixed_substitutions(ty: ColumnType, dialect: Dialect, expected: &str) {
        assert_eq!(TypeMapper::map_type(ty, dialect, None).unwrap(), expected);
    }

    #[test_case(Dialect::Postgres, "VARCHAR(40)")]
    #[test_case(Dialect::MySql, "VARCHAR(40)")]
    #[test_case(Dialect::Sqlite, "TEXT")]
    fn test_varchar_rendering(dialect: Dialect, expected: &str) {
        assert_eq!(
            TypeMapper::map_type(ColumnType::Varchar, dialect, Some(40)).unwrap(),
            expected
        );
    }

    #[test]
    fn test_sized_types_without_length_fail_for_every_dialect() {
        for dialect in Dialect::all() {
            for ty in [ColumnType::Char, ColumnType::Varchar] {
                let err = TypeMapper::map_type(ty, *dialect, None).unwrap_err();
                assert!(matches!(err, Error::Configuration(_)), "{ty} on {dialect}");
            }
        }
    }

    #[test]
    fn test_mapping_is_total_over_supported_set() {
        for dialect in Dialect::all() {
            for ty in TypeMapper::supported_types(*dialect) {
                let length = ty.requires_length().then_some(16);
                let first = TypeMapper::map_type(ty, *dialect, length).unwrap();
                let second = TypeMapper::map_type(ty, *dialect, length).unwrap();
                assert_eq!(first, second);
                assert!(TypeMapper::validate_type(ty, *dialect));
            }
        }
    }

    #[test]
    fn test_mysql_has_no_interval() {
        assert!(!TypeMapper::validate_type(ColumnType::Interval, Dialect::MySql));
        assert!(!TypeMapper::supported_types(Dialect::MySql).contains(&ColumnType::Interval));
        assert!(matches!(
            TypeMapper::map_type(ColumnType::Interval, Dialect::MySql, None),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_unknown_dialect_name_is_configuration_error() {
        assert!(matches!(
            TypeMapper::map_named("text", "oracle", None),
            Err(Error::Configuration(_))
        ));
        assert_eq!(
            TypeMapper::map_named("varchar", "mysql", Some(8)).unwrap(),
            "VARCHAR(8)"
        );
    }
}
