//! DataFrame ⇄ DailyAggregate conversion and Parquet I/O helpers.

use chrono::NaiveDate;
use polars::prelude::*;
use std::fs;
use std::path::Path;

use crate::data::schema::{AggregateSchema, SchemaError};
use crate::domain::DailyAggregate;

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("parquet error: {0}")]
    Parquet(String),

    #[error("null value in column '{column}' at row {row}")]
    NullValue { column: &'static str, row: usize },

    #[error("invalid date '{value}' at row {row} (expected YYYY-MM-DD)")]
    InvalidDate { value: String, row: usize },

    #[error("negative count {value} in column '{column}' at row {row}")]
    NegativeCount {
        column: &'static str,
        value: i64,
        row: usize,
    },
}

fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default()
}

/// Convert daily aggregates to a Polars DataFrame with the canonical schema.
pub fn aggregates_to_dataframe(rows: &[DailyAggregate]) -> Result<DataFrame, IngestError> {
    let epoch = epoch();
    let dates: Vec<i32> = rows
        .iter()
        .map(|r| (r.date - epoch).num_days() as i32)
        .collect();
    let stores: Vec<&str> = rows.iter().map(|r| r.key.store.as_str()).collect();
    let products: Vec<&str> = rows.iter().map(|r| r.key.product.as_str()).collect();
    let oos: Vec<u64> = rows.iter().map(|r| r.oos_count).collect();
    let totals: Vec<u64> = rows.iter().map(|r| r.total_count).collect();

    DataFrame::new(vec![
        Column::new("date".into(), dates)
            .cast(&DataType::Date)
            .map_err(|e| IngestError::Parquet(format!("date cast: {e}")))?,
        Column::new("store".into(), stores),
        Column::new("product".into(), products),
        Column::new("oos_count".into(), oos),
        Column::new("total_count".into(), totals),
    ])
    .map_err(|e| IngestError::Parquet(format!("dataframe creation: {e}")))
}

/// Convert a validated DataFrame back into daily aggregates, in row order.
pub fn dataframe_to_aggregates(df: &DataFrame) -> Result<Vec<DailyAggregate>, IngestError> {
    AggregateSchema::validate(df)?;
    let map_err = |e: PolarsError| IngestError::Parquet(format!("column read: {e}"));

    let dates = read_dates(AggregateSchema::resolve(df, "date")?)?;
    let stores_col = AggregateSchema::resolve(df, "store")?;
    let products_col = AggregateSchema::resolve(df, "product")?;
    let stores = stores_col.str().map_err(map_err)?;
    let products = products_col.str().map_err(map_err)?;

    let oos_col = AggregateSchema::resolve(df, "oos_count")?
        .cast(&DataType::Int64)
        .map_err(map_err)?;
    let total_col = AggregateSchema::resolve(df, "total_count")?
        .cast(&DataType::Int64)
        .map_err(map_err)?;
    let oos = oos_col.i64().map_err(map_err)?;
    let totals = total_col.i64().map_err(map_err)?;

    let n = df.height();
    let mut rows = Vec::with_capacity(n);
    for (i, date) in dates.into_iter().enumerate().take(n) {
        let store = stores
            .get(i)
            .ok_or(IngestError::NullValue { column: "store", row: i })?;
        let product = products
            .get(i)
            .ok_or(IngestError::NullValue { column: "product", row: i })?;
        let oos_count = count_at(oos.get(i), "oos_count", i)?;
        let total_count = count_at(totals.get(i), "total_count", i)?;

        rows.push(DailyAggregate::new(store, product, date, oos_count, total_count));
    }

    Ok(rows)
}

fn count_at(value: Option<i64>, column: &'static str, row: usize) -> Result<u64, IngestError> {
    let value = value.ok_or(IngestError::NullValue { column, row })?;
    u64::try_from(value).map_err(|_| IngestError::NegativeCount { column, value, row })
}

fn read_dates(column: &Column) -> Result<Vec<NaiveDate>, IngestError> {
    let map_err = |e: PolarsError| IngestError::Parquet(format!("date column type: {e}"));

    if column.dtype() == &DataType::String {
        let values = column.str().map_err(map_err)?;
        return (0..values.len())
            .map(|i| {
                let raw = values
                    .get(i)
                    .ok_or(IngestError::NullValue { column: "date", row: i })?;
                NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|_| {
                    IngestError::InvalidDate {
                        value: raw.to_string(),
                        row: i,
                    }
                })
            })
            .collect();
    }

    let epoch = epoch();
    let values = column.date().map_err(map_err)?;
    (0..values.len())
        .map(|i| {
            let days = values
                .get(i)
                .ok_or(IngestError::NullValue { column: "date", row: i })?;
            Ok(epoch + chrono::Duration::days(days as i64))
        })
        .collect()
}

/// Read daily aggregates from a Parquet file.
pub fn read_parquet(path: &Path) -> Result<Vec<DailyAggregate>, IngestError> {
    let file = fs::File::open(path).map_err(|e| IngestError::Parquet(format!("open: {e}")))?;
    let df = ParquetReader::new(file)
        .finish()
        .map_err(|e| IngestError::Parquet(format!("read: {e}")))?;
    dataframe_to_aggregates(&df)
}

/// Write daily aggregates to a Parquet file.
pub fn write_parquet(rows: &[DailyAggregate], path: &Path) -> Result<(), IngestError> {
    let mut df = aggregates_to_dataframe(rows)?;
    let file =
        fs::File::create(path).map_err(|e| IngestError::Parquet(format!("create file: {e}")))?;
    ParquetWriter::new(file)
        .finish(&mut df)
        .map_err(|e| IngestError::Parquet(format!("write parquet: {e}")))?;
    Ok(())
}
