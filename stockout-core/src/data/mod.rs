//! Tabular input: schema validation and Parquet ingestion

pub mod ingest;
pub mod schema;

pub use ingest::{
    aggregates_to_dataframe, dataframe_to_aggregates, read_parquet, write_parquet, IngestError,
};
pub use schema::{AggregateSchema, SchemaError};
