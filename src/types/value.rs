//! Typed cell values and the conversion between Rust field types and cells.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};

/// A single typed cell value as held by a column.
#[derive(Clone, Debug, PartialEq)]
pub enum Datum {
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(DateTime<Utc>),
    Blob(Vec<u8>),
}

impl Datum {
    pub fn kind(&self) -> &'static str {
        match self {
            Datum::Int(_) => "integer",
            Datum::Float(_) => "float",
            Datum::Bool(_) => "boolean",
            Datum::Text(_) => "text",
            Datum::Date(_) => "date",
            Datum::Time(_) => "time",
            Datum::DateTime(_) => "datetime",
            Datum::Blob(_) => "blob",
        }
    }
}

/// Rust types that can live inside a `Column<V>`.
pub trait ColumnValue: Clone + Send + Sync + 'static {
    /// Name used in mismatch diagnostics.
    const KIND: &'static str;

    fn to_datum(&self) -> Datum;

    fn from_datum(datum: Datum) -> Option<Self>;
}

macro_rules! int_value {
    ($($ty:ty),*) => {
        $(
            impl ColumnValue for $ty {
                const KIND: &'static str = "integer";

                fn to_datum(&self) -> Datum {
                    Datum::Int(i64::from(*self))
                }

                fn from_datum(datum: Datum) -> Option<Self> {
                    match datum {
                        Datum::Int(n) => <$ty>::try_from(n).ok(),
                        _ => None,
                    }
                }
            }
        )*
    };
}

int_value!(i8, i16, i32, i64, u8, u16, u32);

impl ColumnValue for f64 {
    const KIND: &'static str = "float";

    fn to_datum(&self) -> Datum {
        Datum::Float(*self)
    }

    fn from_datum(datum: Datum) -> Option<Self> {
        match datum {
            Datum::Float(f) => Some(f),
            Datum::Int(n) => Some(n as f64),
            _ => None,
        }
    }
}

impl ColumnValue for f32 {
    const KIND: &'static str = "float";

    fn to_datum(&self) -> Datum {
        Datum::Float(f64::from(*self))
    }

    fn from_datum(datum: Datum) -> Option<Self> {
        match datum {
            Datum::Float(f) => Some(f as f32),
            Datum::Int(n) => Some(n as f32),
            _ => None,
        }
    }
}

impl ColumnValue for bool {
    const KIND: &'static str = "boolean";

    fn to_datum(&self) -> Datum {
        Datum::Bool(*self)
    }

    fn from_datum(datum: Datum) -> Option<Self> {
        match datum {
            Datum::Bool(b) => Some(b),
            Datum::Int(0) => Some(false),
            Datum::Int(1) => Some(true),
            _ => None,
        }
    }
}

impl ColumnValue for String {
    const KIND: &'static str = "text";

    fn to_datum(&self) -> Datum {
        Datum::Text(self.clone())
    }

    fn from_datum(datum: Datum) -> Option<Self> {
        match datum {
            Datum::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl ColumnValue for NaiveDate {
    const KIND: &'static str = "date";

    fn to_datum(&self) -> Datum {
        Datum::Date(*self)
    }

    fn from_datum(datum: Datum) -> Option<Self> {
        match datum {
            Datum::Date(d) => Some(d),
            Datum::DateTime(dt) => Some(dt.date_naive()),
            _ => None,
        }
    }
}

impl ColumnValue for NaiveTime {
    const KIND: &'static str = "time";

    fn to_datum(&self) -> Datum {
        Datum::Time(*self)
    }

    fn from_datum(datum: Datum) -> Option<Self> {
        match datum {
            Datum::Time(t) => Some(t),
            Datum::DateTime(dt) => Some(dt.time()),
            _ => None,
        }
    }
}

impl ColumnValue for DateTime<Utc> {
    const KIND: &'static str = "datetime";

    fn to_datum(&self) -> Datum {
        Datum::DateTime(*self)
    }

    fn from_datum(datum: Datum) -> Option<Self> {
        match datum {
            Datum::DateTime(dt) => Some(dt),
            _ => None,
        }
    }
}

impl ColumnValue for Vec<u8> {
    const KIND: &'static str = "blob";

    fn to_datum(&self) -> Datum {
        Datum::Blob(self.clone())
    }

    fn from_datum(datum: Datum) -> Option<Self> {
        match datum {
            Datum::Blob(b) => Some(b),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn narrow_integers_reject_out_of_range_cells() {
        assert_eq!(i8::from_datum(Datum::Int(127)), Some(127));
        assert_eq!(i8::from_datum(Datum::Int(128)), None);
        assert_eq!(u8::from_datum(Datum::Int(-1)), None);
    }

    #[test]
    fn bool_accepts_zero_and_one() {
        assert_eq!(bool::from_datum(Datum::Int(1)), Some(true));
        assert_eq!(bool::from_datum(Datum::Int(0)), Some(false));
        assert_eq!(bool::from_datum(Datum::Int(2)), None);
    }
}
