use polars::prelude::*;

/// Canonical column names and the upstream warehouse names accepted for each.
pub const COLUMN_ALIASES: [(&str, &[&str]); 5] = [
    ("date", &["date", "dt"]),
    ("store", &["store", "store_name"]),
    ("product", &["product", "e_code"]),
    ("oos_count", &["oos_count", "oos_cnt"]),
    ("total_count", &["total_count", "total_cnt"]),
];

/// Expected schema for daily aggregate tables
pub struct AggregateSchema;

impl AggregateSchema {
    /// Get the canonical daily aggregate schema
    pub fn schema() -> Schema {
        Schema::from_iter(vec![
            Field::new("date".into(), DataType::Date),
            Field::new("store".into(), DataType::String),
            Field::new("product".into(), DataType::String),
            Field::new("oos_count".into(), DataType::UInt64),
            Field::new("total_count".into(), DataType::UInt64),
        ])
    }

    /// Name actually used in `df` for a canonical column, if any alias is present.
    pub fn resolve_name(df: &DataFrame, canonical: &str) -> Option<String> {
        let aliases = COLUMN_ALIASES
            .iter()
            .find(|(name, _)| *name == canonical)
            .map(|(_, aliases)| *aliases)?;
        let schema = df.schema();
        aliases
            .iter()
            .find(|alias| schema.contains(alias))
            .map(|alias| alias.to_string())
    }

    /// Column for a canonical name, looked up through its aliases.
    pub fn resolve<'a>(df: &'a DataFrame, canonical: &str) -> Result<&'a Column, SchemaError> {
        let name = Self::resolve_name(df, canonical)
            .ok_or_else(|| SchemaError::MissingColumn(canonical.to_string()))?;
        df.column(&name)
            .map_err(|_| SchemaError::MissingColumn(canonical.to_string()))
    }

    /// Validate DataFrame against schema.
    ///
    /// Counts may use any integer width; the date may be `Date` or an ISO string.
    pub fn validate(df: &DataFrame) -> Result<(), SchemaError> {
        // Check all required columns exist
        for field in Self::schema().iter_fields() {
            Self::resolve(df, field.name())?;
        }

        let date = Self::resolve(df, "date")?;
        if !matches!(date.dtype(), DataType::Date | DataType::String) {
            return Err(SchemaError::TypeMismatch {
                column: "date".into(),
                expected: DataType::Date,
                actual: date.dtype().clone(),
            });
        }

        for name in ["store", "product"] {
            let column = Self::resolve(df, name)?;
            if column.dtype() != &DataType::String {
                return Err(SchemaError::TypeMismatch {
                    column: name.into(),
                    expected: DataType::String,
                    actual: column.dtype().clone(),
                });
            }
        }

        for name in ["oos_count", "total_count"] {
            let column = Self::resolve(df, name)?;
            if !column.dtype().is_integer() {
                return Err(SchemaError::TypeMismatch {
                    column: name.into(),
                    expected: DataType::UInt64,
                    actual: column.dtype().clone(),
                });
            }
        }

        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("Missing required column: {0}")]
    MissingColumn(String),

    #[error("Type mismatch in column {column}: expected {expected:?}, got {actual:?}")]
    TypeMismatch {
        column: String,
        expected: DataType,
        actual: DataType,
    },
}
