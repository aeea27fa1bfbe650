use std::fmt;

use crate::errors::{GridError, Result};

/// Representation the application uses for a bound value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientType {
    BigInt,
    Integer,
    SmallInt,
    Double,
    Char,
}

/// Declared database type of a statement parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbType {
    Numeric { precision: u8, scale: u8 },
    Char(usize),
    VarChar(usize),
    BigInt,
    Integer,
    SmallInt,
    Double,
}

impl fmt::Display for ClientType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientType::BigInt => write!(f, "SBIGINT"),
            ClientType::Integer => write!(f, "SLONG"),
            ClientType::SmallInt => write!(f, "SSHORT"),
            ClientType::Double => write!(f, "DOUBLE"),
            ClientType::Char => write!(f, "CHAR"),
        }
    }
}

impl fmt::Display for DbType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DbType::Numeric { precision, scale } => write!(f, "NUMERIC({precision},{scale})"),
            DbType::Char(n) => write!(f, "CHAR({n})"),
            DbType::VarChar(n) => write!(f, "VARCHAR({n})"),
            DbType::BigInt => write!(f, "BIGINT"),
            DbType::Integer => write!(f, "INTEGER"),
            DbType::SmallInt => write!(f, "SMALLINT"),
            DbType::Double => write!(f, "DOUBLE"),
        }
    }
}

/// Worst-case bytes per character of a CHAR value
const CHAR_BYTES_PER_CHAR: usize = 4;

impl ClientType {
    fn fixed_width(self) -> Option<usize> {
        match self {
            ClientType::BigInt => Some(8),
            ClientType::Integer => Some(4),
            ClientType::SmallInt => Some(2),
            ClientType::Double => Some(8),
            ClientType::Char => None,
        }
    }
}

fn char_buffer(len: usize) -> usize {
    len * CHAR_BYTES_PER_CHAR + 1
}

/// Buffer size for a parameter of `client` type bound to a `db` column,
/// or a type mismatch if the pair cannot be converted.
pub fn param_buffer_size(client: ClientType, db: DbType) -> Result<usize> {
    let size = match (client, db) {
        (ClientType::Char, DbType::Char(n) | DbType::VarChar(n)) if n > 0 => char_buffer(n),

        (ClientType::BigInt, DbType::BigInt | DbType::Integer | DbType::SmallInt) => 8,
        (ClientType::Integer, DbType::BigInt | DbType::Integer | DbType::SmallInt) => 4,
        (ClientType::SmallInt, DbType::BigInt | DbType::Integer | DbType::SmallInt) => 2,

        // integers only bind to exact numerics without a fractional part
        (ClientType::BigInt, DbType::Numeric { precision, scale: 0 }) if precision > 0 => 8,
        (ClientType::Integer, DbType::Numeric { precision, scale: 0 }) if precision > 0 => 4,
        (ClientType::SmallInt, DbType::Numeric { precision, scale: 0 }) if precision > 0 => 2,

        (ClientType::Double, DbType::Double) => 8,
        (ClientType::Double, DbType::Numeric { precision, scale }) if precision > 0 && scale <= precision => 8,

        _ => {
            return Err(GridError::TypeMismatch(format!(
                "cannot bind {client} to {db}"
            )));
        }
    };
    Ok(size)
}

/// Buffer size for an output column of `client` type
pub fn column_buffer_size(client: ClientType, max_len: usize) -> Result<usize> {
    match client.fixed_width() {
        Some(width) => Ok(width),
        None if max_len > 0 => Ok(char_buffer(max_len)),
        None => Err(GridError::InvalidParameter(
            "CHAR column requires a maximum length".to_string(),
        )),
    }
}

/// A value exchanged with the driver
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    BigInt(i64),
    Integer(i32),
    SmallInt(i16),
    Double(f64),
    Char(String),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Convert to the representation a column of `client` type expects.
    /// Returns `None` when the value cannot be represented.
    pub fn convert(&self, client: ClientType, max_len: usize) -> Option<SqlValue> {
        if self.is_null() {
            return Some(SqlValue::Null);
        }
        let converted = match client {
            ClientType::BigInt => SqlValue::BigInt(self.as_i64()?),
            ClientType::Integer => SqlValue::Integer(i32::try_from(self.as_i64()?).ok()?),
            ClientType::SmallInt => SqlValue::SmallInt(i16::try_from(self.as_i64()?).ok()?),
            ClientType::Double => SqlValue::Double(self.as_f64()?),
            ClientType::Char => {
                let text = self.as_text();
                SqlValue::Char(text.chars().take(max_len).collect())
            }
        };
        Some(converted)
    }

    fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::BigInt(v) => Some(*v),
            SqlValue::Integer(v) => Some(i64::from(*v)),
            SqlValue::SmallInt(v) => Some(i64::from(*v)),
            SqlValue::Double(v) if v.fract() == 0.0 => Some(*v as i64),
            SqlValue::Char(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            SqlValue::BigInt(v) => Some(*v as f64),
            SqlValue::Integer(v) => Some(f64::from(*v)),
            SqlValue::SmallInt(v) => Some(f64::from(*v)),
            SqlValue::Double(v) => Some(*v),
            SqlValue::Char(s) => s.trim().parse().ok(),
            SqlValue::Null => None,
        }
    }

    fn as_text(&self) -> String {
        match self {
            SqlValue::Null => String::new(),
            SqlValue::BigInt(v) => v.to_string(),
            SqlValue::Integer(v) => v.to_string(),
            SqlValue::SmallInt(v) => v.to_string(),
            SqlValue::Double(v) => v.to_string(),
            SqlValue::Char(s) => s.clone(),
        }
    }
}
