//! Parquet codec (default)
//!
//! Tables and bags are written as one record batch. Each column is typed from
//! the cells it holds:
//! - only integers: `Int64`
//! - only floats: `Float64`
//! - only booleans: `Boolean`
//! - only strings: `Utf8`
//! - anything else: `Utf8` holding JSON text, listed in the schema metadata
//!
//! A missing cell is a parquet null, so missing and explicit `null` cells stay
//! distinct. Bags keep their partition boundaries and per-partition columns in
//! the schema metadata. Scalars, mappings and tables without columns are
//! stored as a single JSON text cell.

use super::codec::{ArtifactCodec, CodecError};
use arrow::array::{Array, ArrayRef, BooleanArray, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use bytes::Bytes;
use canopy_table::{Bag, Row, Table, Value};
use indexmap::IndexSet;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::errors::ParquetError;
use parquet::file::properties::WriterProperties;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use std::collections::HashMap;
use std::sync::Arc;

const KIND_KEY: &str = "canopy.kind";
const JSON_COLUMNS_KEY: &str = "canopy.json_columns";
const PARTITIONS_KEY: &str = "canopy.partitions";
const VALUE_COLUMN: &str = "value";

const TABLE_KIND: &str = "table";
const BAG_KIND: &str = "bag";
const VALUE_KIND: &str = "value";

impl From<ArrowError> for CodecError {
    fn from(e: ArrowError) -> Self {
        Self(e.to_string())
    }
}

impl From<ParquetError> for CodecError {
    fn from(e: ParquetError) -> Self {
        Self(e.to_string())
    }
}

/// Row count and columns of one bag partition
#[derive(Debug, Serialize, Deserialize)]
struct PartitionLayout {
    rows: usize,
    columns: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnType {
    Int,
    Float,
    Bool,
    Text,
    Json,
}

impl ColumnType {
    fn of(cell: &Json) -> Self {
        match cell {
            Json::Bool(_) => Self::Bool,
            Json::Number(n) if n.is_i64() => Self::Int,
            Json::Number(n) if n.is_f64() => Self::Float,
            Json::String(_) => Self::Text,
            _ => Self::Json,
        }
    }

    /// Narrowest type holding every present cell
    fn infer<'a>(cells: impl Iterator<Item = Option<&'a Json>>) -> Self {
        let mut found = None;
        for ty in cells.flatten().map(Self::of) {
            match found {
                None => found = Some(ty),
                Some(seen) if seen == ty => {}
                Some(_) => return Self::Json,
            }
        }
        found.unwrap_or(Self::Text)
    }

    fn data_type(self) -> DataType {
        match self {
            Self::Int => DataType::Int64,
            Self::Float => DataType::Float64,
            Self::Bool => DataType::Boolean,
            Self::Text | Self::Json => DataType::Utf8,
        }
    }
}

/// Columnar codec writing `.parquet` artifacts
#[derive(Debug, Clone, Copy, Default)]
pub struct ParquetCodec;

impl ArtifactCodec for ParquetCodec {
    fn extension(&self) -> &str {
        "parquet"
    }

    fn encode(&self, value: &Value) -> Result<Vec<u8>, CodecError> {
        match value {
            Value::Table(table) if !table.columns().is_empty() => {
                let rows: Vec<&Row> = table.iter().collect();
                encode_rows(table.columns(), &rows, kind_metadata(TABLE_KIND))
            }
            Value::Bag(bag) => {
                let columns: IndexSet<String> = bag
                    .partitions()
                    .iter()
                    .flat_map(|partition| partition.columns().iter().cloned())
                    .collect();
                if columns.is_empty() {
                    return encode_whole(value);
                }
                let columns: Vec<String> = columns.into_iter().collect();
                let layouts: Vec<PartitionLayout> = bag
                    .partitions()
                    .iter()
                    .map(|partition| PartitionLayout {
                        rows: partition.len(),
                        columns: partition.columns().to_vec(),
                    })
                    .collect();
                let rows: Vec<&Row> = bag.partitions().iter().flat_map(Table::iter).collect();

                let mut metadata = kind_metadata(BAG_KIND);
                metadata.insert(PARTITIONS_KEY.to_string(), serde_json::to_string(&layouts)?);
                encode_rows(&columns, &rows, metadata)
            }
            other => encode_whole(other),
        }
    }

    fn decode(&self, bytes: &[u8]) -> Result<Value, CodecError> {
        let builder = ParquetRecordBatchReaderBuilder::try_new(Bytes::copy_from_slice(bytes))?;
        let schema = builder.schema().clone();
        let batches = builder.build()?.collect::<Result<Vec<_>, _>>()?;

        let kind = schema
            .metadata()
            .get(KIND_KEY)
            .ok_or_else(|| CodecError(format!("artifact has no '{KIND_KEY}' metadata")))?;

        match kind.as_str() {
            TABLE_KIND => {
                let mut table = Table::with_columns(schema.fields().iter().map(|field| field.name().clone()));
                for row in decode_rows(&schema, &batches)? {
                    table.push(row);
                }
                Ok(Value::Table(table))
            }
            BAG_KIND => {
                let layouts: Vec<PartitionLayout> = match schema.metadata().get(PARTITIONS_KEY) {
                    Some(text) => serde_json::from_str(text)?,
                    None => return Err(CodecError(format!("bag artifact has no '{PARTITIONS_KEY}' metadata"))),
                };
                let rows = decode_rows(&schema, &batches)?;
                let expected: usize = layouts.iter().map(|layout| layout.rows).sum();
                if expected != rows.len() {
                    return Err(CodecError(format!(
                        "bag layout covers {expected} rows, artifact holds {}",
                        rows.len()
                    )));
                }

                let mut rows = rows.into_iter();
                let partitions = layouts
                    .into_iter()
                    .map(|layout| {
                        let mut partition = Table::with_columns(layout.columns);
                        for row in rows.by_ref().take(layout.rows) {
                            partition.push(row);
                        }
                        partition
                    })
                    .collect();
                Ok(Value::Bag(Bag::new(partitions)))
            }
            VALUE_KIND => {
                let text = batches
                    .first()
                    .and_then(|batch| batch.column_by_name(VALUE_COLUMN))
                    .and_then(|column| column.as_any().downcast_ref::<StringArray>())
                    .filter(|column| column.len() == 1 && !column.is_null(0))
                    .map(|column| column.value(0))
                    .ok_or_else(|| CodecError(format!("value artifact has no '{VALUE_COLUMN}' cell")))?;
                Ok(serde_json::from_str(text)?)
            }
            other => Err(CodecError(format!("unknown artifact kind '{other}'"))),
        }
    }
}

fn kind_metadata(kind: &str) -> HashMap<String, String> {
    HashMap::from([(KIND_KEY.to_string(), kind.to_string())])
}

fn encode_whole(value: &Value) -> Result<Vec<u8>, CodecError> {
    let text = serde_json::to_string(value)?;
    let schema = Schema::new_with_metadata(
        vec![Field::new(VALUE_COLUMN, DataType::Utf8, false)],
        kind_metadata(VALUE_KIND),
    );
    let column: ArrayRef = Arc::new(StringArray::from(vec![text]));
    write_batch(schema, vec![column])
}

fn encode_rows(
    columns: &[String],
    rows: &[&Row],
    mut metadata: HashMap<String, String>,
) -> Result<Vec<u8>, CodecError> {
    let mut fields = Vec::with_capacity(columns.len());
    let mut arrays = Vec::with_capacity(columns.len());
    let mut json_columns = Vec::new();

    for name in columns {
        let ty = ColumnType::infer(rows.iter().map(|row| row.get(name)));
        if ty == ColumnType::Json {
            json_columns.push(name.clone());
        }
        fields.push(Field::new(name.as_str(), ty.data_type(), true));
        arrays.push(encode_column(rows, name, ty)?);
    }

    metadata.insert(JSON_COLUMNS_KEY.to_string(), serde_json::to_string(&json_columns)?);
    write_batch(Schema::new_with_metadata(fields, metadata), arrays)
}

fn encode_column(rows: &[&Row], name: &str, ty: ColumnType) -> Result<ArrayRef, CodecError> {
    let cells = rows.iter().map(|row| row.get(name));
    let array: ArrayRef = match ty {
        ColumnType::Int => Arc::new(cells.map(|cell| cell.and_then(Json::as_i64)).collect::<Int64Array>()),
        ColumnType::Float => Arc::new(cells.map(|cell| cell.and_then(Json::as_f64)).collect::<Float64Array>()),
        ColumnType::Bool => Arc::new(cells.map(|cell| cell.and_then(Json::as_bool)).collect::<BooleanArray>()),
        ColumnType::Text => Arc::new(cells.map(|cell| cell.and_then(Json::as_str)).collect::<StringArray>()),
        ColumnType::Json => {
            let texts = cells
                .map(|cell| cell.map(serde_json::to_string).transpose())
                .collect::<Result<Vec<Option<String>>, _>>()?;
            Arc::new(StringArray::from(texts))
        }
    };
    Ok(array)
}

fn write_batch(schema: Schema, arrays: Vec<ArrayRef>) -> Result<Vec<u8>, CodecError> {
    let schema = Arc::new(schema);
    let batch = RecordBatch::try_new(schema.clone(), arrays)?;
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();

    let mut buffer = Vec::new();
    let mut writer = ArrowWriter::try_new(&mut buffer, schema, Some(props))?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(buffer)
}

fn decode_rows(schema: &Schema, batches: &[RecordBatch]) -> Result<Vec<Row>, CodecError> {
    let json_columns: Vec<String> = match schema.metadata().get(JSON_COLUMNS_KEY) {
        Some(text) => serde_json::from_str(text)?,
        None => Vec::new(),
    };

    let mut rows = Vec::new();
    for batch in batches {
        let mut batch_rows = vec![Row::new(); batch.num_rows()];
        for (field, column) in schema.fields().iter().zip(batch.columns()) {
            let as_json = json_columns.contains(field.name());
            for (index, row) in batch_rows.iter_mut().enumerate() {
                if let Some(cell) = decode_cell(column.as_ref(), index, as_json)? {
                    row.insert(field.name().clone(), cell);
                }
            }
        }
        rows.extend(batch_rows);
    }
    Ok(rows)
}

fn decode_cell(column: &dyn Array, index: usize, as_json: bool) -> Result<Option<Json>, CodecError> {
    if column.is_null(index) {
        return Ok(None);
    }
    let cell = match column.data_type() {
        DataType::Int64 => Json::from(downcast::<Int64Array>(column)?.value(index)),
        DataType::Float64 => serde_json::Number::from_f64(downcast::<Float64Array>(column)?.value(index))
            .map_or(Json::Null, Json::Number),
        DataType::Boolean => Json::Bool(downcast::<BooleanArray>(column)?.value(index)),
        DataType::Utf8 => {
            let text = downcast::<StringArray>(column)?.value(index);
            if as_json {
                serde_json::from_str(text)?
            } else {
                Json::from(text)
            }
        }
        other => return Err(CodecError(format!("unsupported column type {other}"))),
    };
    Ok(Some(cell))
}

fn downcast<T: 'static>(column: &dyn Array) -> Result<&T, CodecError> {
    column
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| CodecError(format!("column of type {} does not match its schema", column.data_type())))
}
