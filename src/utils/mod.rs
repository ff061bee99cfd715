use crate::error::{Error, Result};
use duckdb::arrow::array::{Array, Float64Array, Int32Array, Int64Array, RecordBatch};
use duckdb::arrow::datatypes::DataType;
use duckdb::arrow::util::display::{ArrayFormatter, FormatOptions};
use serde_json::{Map, Value as JsonValue};

/// Convert an Arrow RecordBatch to a JSON array of objects
pub fn record_batch_to_json(batch: &RecordBatch) -> Result<Vec<JsonValue>> {
    let schema = batch.schema();
    let options = FormatOptions::default();
    let mut json_rows = Vec::with_capacity(batch.num_rows());
    for row_idx in 0..batch.num_rows() {
        let mut row = Map::new();
        for (col_idx, field) in schema.fields().iter().enumerate() {
            let col = batch.column(col_idx);
            let value = if col.is_null(row_idx) {
                JsonValue::Null
            } else {
                match col.data_type() {
                    DataType::Int64 => {
                        let array = col
                            .as_any()
                            .downcast_ref::<Int64Array>()
                            .ok_or_else(|| Error::Serialization("Failed to downcast to Int64Array".into()))?;
                        JsonValue::Number(array.value(row_idx).into())
                    }
                    DataType::Int32 => {
                        let array = col
                            .as_any()
                            .downcast_ref::<Int32Array>()
                            .ok_or_else(|| Error::Serialization("Failed to downcast to Int32Array".into()))?;
                        JsonValue::Number(array.value(row_idx).into())
                    }
                    DataType::Float64 => {
                        let array = col
                            .as_any()
                            .downcast_ref::<Float64Array>()
                            .ok_or_else(|| Error::Serialization("Failed to downcast to Float64Array".into()))?;
                        serde_json::Number::from_f64(array.value(row_idx))
                            .map_or(JsonValue::Null, JsonValue::Number)
                    }
                    _ => {
                        // Dates, timestamps, strings and anything else use
                        // Arrow's display form
                        let formatter = ArrayFormatter::try_new(col.as_ref(), &options)
                            .map_err(|e| Error::Serialization(e.to_string()))?;
                        JsonValue::String(formatter.value(row_idx).to_string())
                    }
                }
            };
            row.insert(field.name().clone(), value);
        }
        json_rows.push(JsonValue::Object(row));
    }
    Ok(json_rows)
}

/// Render `value` as a single-quoted SQL string literal
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
