use polars::prelude::{DataType, TimeUnit};
use serde::{Deserialize, Serialize};

pub const OPEN_DT: &str = "open_dt";
pub const CLOSED_DT: &str = "closed_dt";
pub const TARGET_DT: &str = "target_dt";
pub const CASE_STATUS: &str = "case_status";
pub const DELAY_DAYS: &str = "delay_days";

pub const STATUS_CLOSED: &str = "Closed";

pub const SECONDS_PER_DAY: f64 = 86_400.0;

/// Date-like source columns that are coerced to timestamps.
pub const TIMESTAMP_COLUMNS: [&str; 3] = [OPEN_DT, CLOSED_DT, TARGET_DT];

/// Output columns, in the order downstream consumers read them.
pub const OUTPUT_COLUMNS: [&str; 17] = [
    "case_enquiry_id",
    OPEN_DT,
    CLOSED_DT,
    TARGET_DT,
    CASE_STATUS,
    "ontime",
    "closure_reason_normalized",
    "case_title",
    "subject",
    "reason",
    "neighborhood",
    "location_street_name",
    "location_zipcode",
    "latitude",
    "longitude",
    "source",
    DELAY_DAYS,
];

/// The timestamp type every date-like column is normalized to.
pub fn timestamp_dtype() -> DataType {
    DataType::Datetime(TimeUnit::Microseconds, None)
}

/// Logical column types a table definition can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    String,
    Timestamp,
    Date,
    Double,
    Bigint,
    Int,
    Boolean,
}

impl ColumnType {
    pub fn to_dtype(self) -> DataType {
        match self {
            ColumnType::String => DataType::String,
            ColumnType::Timestamp => timestamp_dtype(),
            ColumnType::Date => DataType::Date,
            ColumnType::Double => DataType::Float64,
            ColumnType::Bigint => DataType::Int64,
            ColumnType::Int => DataType::Int32,
            ColumnType::Boolean => DataType::Boolean,
        }
    }

    /// Whether values of `dtype` can be written into a column of this type.
    pub fn accepts(self, dtype: &DataType) -> bool {
        if matches!(dtype, DataType::Null) {
            return true;
        }
        match self {
            ColumnType::String => true,
            ColumnType::Timestamp | ColumnType::Date => {
                matches!(dtype, DataType::Datetime(_, _) | DataType::Date)
            }
            ColumnType::Double | ColumnType::Bigint | ColumnType::Int => {
                dtype.is_primitive_numeric()
            }
            ColumnType::Boolean => matches!(dtype, DataType::Boolean),
        }
    }
}

/// Schema of the output table, as a table definition would declare it.
pub fn output_column_types() -> Vec<(&'static str, ColumnType)> {
    OUTPUT_COLUMNS
        .iter()
        .map(|&name| {
            let ty = match name {
                OPEN_DT | CLOSED_DT | TARGET_DT => ColumnType::Timestamp,
                "latitude" | "longitude" | DELAY_DAYS => ColumnType::Double,
                _ => ColumnType::String,
            };
            (name, ty)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_days_is_the_last_output_column() {
        assert_eq!(OUTPUT_COLUMNS.last(), Some(&DELAY_DAYS));
        assert_eq!(output_column_types().len(), OUTPUT_COLUMNS.len());
    }

    #[test]
    fn timestamp_accepts_dates_but_not_strings() {
        assert!(ColumnType::Timestamp.accepts(&DataType::Date));
        assert!(ColumnType::Timestamp.accepts(&timestamp_dtype()));
        assert!(!ColumnType::Timestamp.accepts(&DataType::String));
        assert!(ColumnType::String.accepts(&DataType::Float64));
        assert!(ColumnType::Double.accepts(&DataType::Int64));
    }
}
