//! Postgres column types and the mapping from Rust value types.

use std::fmt;

/// Postgres column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PgType {
    /// SMALLINT (2 bytes)
    SmallInt,
    /// INTEGER (4 bytes)
    Integer,
    /// BIGINT (8 bytes)
    BigInt,
    /// REAL (4 bytes floating point)
    Real,
    /// DOUBLE PRECISION (8 bytes floating point)
    DoublePrecision,
    /// NUMERIC (arbitrary precision)
    Numeric,
    /// BOOLEAN
    Boolean,
    /// TEXT
    Text,
    /// BYTEA (binary)
    Bytea,
    /// TIMESTAMPTZ
    Timestamptz,
    /// DATE
    Date,
    /// TIME
    Time,
    /// UUID
    Uuid,
}

impl PgType {
    /// Map a type name as reported by `information_schema.columns.data_type`.
    ///
    /// Returns `None` for types relmap never generates.
    pub fn from_catalog_name(name: &str) -> Option<PgType> {
        let ty = match name.trim().to_ascii_lowercase().as_str() {
            "smallint" | "int2" => PgType::SmallInt,
            "integer" | "int" | "int4" => PgType::Integer,
            "bigint" | "int8" => PgType::BigInt,
            "real" | "float4" => PgType::Real,
            "double precision" | "float8" => PgType::DoublePrecision,
            "numeric" | "decimal" => PgType::Numeric,
            "boolean" | "bool" => PgType::Boolean,
            "text" => PgType::Text,
            "bytea" => PgType::Bytea,
            "timestamp with time zone" | "timestamptz" => PgType::Timestamptz,
            "date" => PgType::Date,
            "time without time zone" | "time" => PgType::Time,
            "uuid" => PgType::Uuid,
            _ => return None,
        };
        Some(ty)
    }
}

impl fmt::Display for PgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PgType::SmallInt => write!(f, "SMALLINT"),
            PgType::Integer => write!(f, "INTEGER"),
            PgType::BigInt => write!(f, "BIGINT"),
            PgType::Real => write!(f, "REAL"),
            PgType::DoublePrecision => write!(f, "DOUBLE PRECISION"),
            PgType::Numeric => write!(f, "NUMERIC"),
            PgType::Boolean => write!(f, "BOOLEAN"),
            PgType::Text => write!(f, "TEXT"),
            PgType::Bytea => write!(f, "BYTEA"),
            PgType::Timestamptz => write!(f, "TIMESTAMPTZ"),
            PgType::Date => write!(f, "DATE"),
            PgType::Time => write!(f, "TIME"),
            PgType::Uuid => write!(f, "UUID"),
        }
    }
}

/// A Rust value type that maps onto a single column.
///
/// Used by [`PropertyDescriptor::scalar`](crate::PropertyDescriptor::scalar)
/// so entity declarations can name the Rust type instead of the column type.
pub trait SqlScalar {
    /// Column type the value is stored as.
    const PG_TYPE: PgType;

    /// Whether the declared type admits NULL.
    const NULLABLE: bool = false;
}

impl<T: SqlScalar> SqlScalar for Option<T> {
    const PG_TYPE: PgType = T::PG_TYPE;
    const NULLABLE: bool = true;
}

macro_rules! sql_scalar {
    ($pg:ident => $($ty:ty),+ $(,)?) => {
        $(
            impl SqlScalar for $ty {
                const PG_TYPE: PgType = PgType::$pg;
            }
        )+
    };
}

sql_scalar!(SmallInt => i8, u8, i16);
sql_scalar!(Integer => u16, i32);
sql_scalar!(BigInt => u32, i64, u64, isize, usize);
sql_scalar!(Real => f32);
sql_scalar!(DoublePrecision => f64);
sql_scalar!(Numeric => rust_decimal::Decimal);
sql_scalar!(Boolean => bool);
sql_scalar!(Text => String);
sql_scalar!(Bytea => Vec<u8>);
sql_scalar!(Uuid => uuid::Uuid);
sql_scalar!(
    Timestamptz => jiff::Timestamp,
    jiff::Zoned,
    chrono::DateTime<chrono::Utc>,
    chrono::DateTime<chrono::Local>,
    chrono::NaiveDateTime,
);
sql_scalar!(Date => jiff::civil::Date, chrono::NaiveDate);
sql_scalar!(Time => jiff::civil::Time, chrono::NaiveTime);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_option_is_nullable() {
        assert_eq!(<Option<i64>>::PG_TYPE, PgType::BigInt);
        const { assert!(<Option<String>>::NULLABLE) };
        const { assert!(!String::NULLABLE) };
    }

    #[test]
    fn test_catalog_names_round_trip_display() {
        for ty in [
            PgType::SmallInt,
            PgType::Integer,
            PgType::BigInt,
            PgType::Real,
            PgType::DoublePrecision,
            PgType::Numeric,
            PgType::Boolean,
            PgType::Text,
            PgType::Bytea,
            PgType::Timestamptz,
            PgType::Date,
            PgType::Time,
            PgType::Uuid,
        ] {
            assert_eq!(PgType::from_catalog_name(&ty.to_string()), Some(ty), "{ty}");
        }
        assert_eq!(
            PgType::from_catalog_name("timestamp with time zone"),
            Some(PgType::Timestamptz)
        );
        assert_eq!(PgType::from_catalog_name("character varying"), None);
    }
}
