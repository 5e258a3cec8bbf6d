//! Parquet encoding of a drained batch.

use super::WriteResult;
use crate::config::Compression;
use crate::record::{Record, TypedRecord};
use crate::{ConvertError, Error};
use arrow::array::{
    ArrayRef, BooleanArray, Float64Array, Int64Array, ListBuilder, StringArray, StringBuilder,
    TimestampMillisecondArray,
};
use arrow::datatypes::{DataType, SchemaRef, TimeUnit};
use arrow::record_batch::RecordBatch;
use bytes::Bytes;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression as CodecCompression;
use parquet::file::properties::WriterProperties;
use serde_json::Value;
use std::io::Cursor;
use std::sync::Arc;
use tracing::debug;

/// Output of one batch conversion.
pub struct ConvertOutput {
    /// The finalized file, absent when the batch failed or held no
    /// encodable records
    pub bytes: Option<Bytes>,
    /// Per-record failures plus, on batch failure, one record-less entry
    pub results: Vec<WriteResult>,
    /// The records that were encoded into the (possibly failed) file,
    /// returned so a failed batch can be retained for retry
    pub encoded: Vec<Record>,
}

/// One cell of an extracted row.
enum ColumnValue {
    Utf8(Option<String>),
    Bool(Option<bool>),
    Float(Option<f64>),
    Int(Option<i64>),
    Utf8List(Option<Vec<String>>),
    TimestampMs(Option<i64>),
}

/// Converts batches of records into Parquet files.
pub struct ParquetConverter {
    compression: Compression,
    row_group_size: usize,
}

impl ParquetConverter {
    /// Create a converter with the given codec and row-group bound.
    pub fn new(compression: Compression, row_group_size: usize) -> Self {
        Self {
            compression,
            row_group_size: row_group_size.max(1),
        }
    }

    /// Encode a batch of records for one key against the given schema.
    ///
    /// Records are attempted one at a time: a single record's encoding
    /// failure is collected and the batch continues. After all records are
    /// attempted the writer is finalized; a finalization failure appends a
    /// record-less result and the batch yields no bytes.
    pub fn write(&self, key: &str, records: Vec<Record>, schema: &SchemaRef) -> ConvertOutput {
        let mut results = Vec::new();
        let mut encoded = Vec::new();
        let mut rows = Vec::new();

        for record in records {
            match record_to_row(&record, schema) {
                Ok(row) => {
                    rows.push(row);
                    encoded.push(record);
                }
                Err(error) => {
                    results.push(WriteResult::record_failure(key, error, record));
                }
            }
        }

        if rows.is_empty() {
            return ConvertOutput {
                bytes: None,
                results,
                encoded,
            };
        }

        let codec = match self.compression {
            Compression::Snappy => CodecCompression::SNAPPY,
            Compression::Gzip => CodecCompression::GZIP(Default::default()),
            Compression::None => CodecCompression::UNCOMPRESSED,
        };
        let props = WriterProperties::builder()
            .set_compression(codec)
            .set_max_row_group_size(self.row_group_size)
            .build();

        let mut buffer = Cursor::new(Vec::new());
        {
            let mut writer = match ArrowWriter::try_new(&mut buffer, schema.clone(), Some(props)) {
                Ok(writer) => writer,
                Err(e) => {
                    results.push(WriteResult::batch_failure(
                        key,
                        ConvertError::Finalize(format!("failed to open columnar writer: {}", e))
                            .into(),
                    ));
                    return ConvertOutput {
                        bytes: None,
                        results,
                        encoded,
                    };
                }
            };

            for chunk in rows.chunks(self.row_group_size) {
                let batch = match build_batch(schema, chunk) {
                    Ok(batch) => batch,
                    Err(message) => {
                        results.push(WriteResult::batch_failure(
                            key,
                            ConvertError::Finalize(message).into(),
                        ));
                        return ConvertOutput {
                            bytes: None,
                            results,
                            encoded,
                        };
                    }
                };
                if let Err(e) = writer.write(&batch) {
                    results.push(WriteResult::batch_failure(
                        key,
                        ConvertError::Finalize(format!("row group write failed: {}", e)).into(),
                    ));
                    return ConvertOutput {
                        bytes: None,
                        results,
                        encoded,
                    };
                }
            }

            if let Err(e) = writer.close() {
                results.push(WriteResult::batch_failure(
                    key,
                    ConvertError::Finalize(format!("footer flush failed: {}", e)).into(),
                ));
                return ConvertOutput {
                    bytes: None,
                    results,
                    encoded,
                };
            }
        }

        let bytes = Bytes::from(buffer.into_inner());
        debug!(
            key = %key,
            rows = encoded.len(),
            failed = results.len(),
            size_bytes = bytes.len(),
            "Converted batch to Parquet"
        );

        ConvertOutput {
            bytes: Some(bytes),
            results,
            encoded,
        }
    }
}

/// Extract one record into schema-ordered cells.
fn record_to_row(record: &Record, schema: &SchemaRef) -> crate::Result<Vec<ColumnValue>> {
    match record {
        Record::Typed(typed) => typed_row(typed, schema),
        Record::Dynamic(dynamic) => {
            let mut row = Vec::with_capacity(schema.fields().len());
            for field in schema.fields() {
                row.push(dynamic_cell(
                    field.name(),
                    field.data_type(),
                    dynamic.get(field.name()),
                )?);
            }
            Ok(row)
        }
    }
}

fn typed_row(record: &TypedRecord, schema: &SchemaRef) -> crate::Result<Vec<ColumnValue>> {
    let mut row = Vec::with_capacity(schema.fields().len());
    for field in schema.fields() {
        let cell = match field.name().as_str() {
            "timestamp" => ColumnValue::Float(Some(record.timestamp)),
            "level" => ColumnValue::Utf8(Some(record.level.clone())),
            "message" => ColumnValue::Utf8(Some(record.message.clone())),
            "correlation_id" => ColumnValue::Utf8(Some(record.correlation_id.clone())),
            "session_id" => ColumnValue::Utf8(Some(record.session_id.clone())),
            "person_id" => ColumnValue::Utf8(Some(record.person_id.clone())),
            "device_id" => ColumnValue::Utf8(Some(record.device_id.clone())),
            "capability" => ColumnValue::Utf8(Some(record.capability.clone())),
            "domain" => ColumnValue::Utf8(Some(record.domain.clone())),
            "service" => ColumnValue::Utf8(Some(record.service.clone())),
            "application" => ColumnValue::Utf8(Some(record.application.clone())),
            "http_method" => ColumnValue::Utf8(Some(record.http_method.clone())),
            "http_path" => ColumnValue::Utf8(Some(record.http_path.clone())),
            "http_status" => ColumnValue::Int(Some(record.http_status)),
            "error_code" => ColumnValue::Utf8(Some(record.error_code.clone())),
            "error_message" => ColumnValue::Utf8(Some(record.error_message.clone())),
            "duration_ms" => ColumnValue::Float(Some(record.duration_ms)),
            "trace_id" => ColumnValue::Utf8(Some(record.trace_id.clone())),
            "span_id" => ColumnValue::Utf8(Some(record.span_id.clone())),
            "trace_sampled" => ColumnValue::Bool(Some(record.trace_sampled)),
            "tags" => ColumnValue::Utf8List(Some(record.tags.clone())),
            "args" => ColumnValue::Utf8(Some(serde_json::to_string(&record.args)?)),
            "extra" => ColumnValue::Utf8(Some(serde_json::to_string(&record.extra)?)),
            other => {
                return Err(ConvertError::Encode {
                    field: other.to_string(),
                    reason: "not part of the typed record layout".into(),
                }
                .into())
            }
        };
        row.push(cell);
    }
    Ok(row)
}

fn dynamic_cell(
    field: &str,
    data_type: &DataType,
    value: Option<&Value>,
) -> crate::Result<ColumnValue> {
    let mismatch = |expected: &str, value: &Value| -> Error {
        ConvertError::Encode {
            field: field.to_string(),
            reason: format!("expected {}, got {}", expected, value),
        }
        .into()
    };

    let value = match value {
        None | Some(Value::Null) => {
            return Ok(match data_type {
                DataType::Utf8 => ColumnValue::Utf8(None),
                DataType::Boolean => ColumnValue::Bool(None),
                DataType::Float64 => ColumnValue::Float(None),
                DataType::Int64 => ColumnValue::Int(None),
                DataType::Timestamp(TimeUnit::Millisecond, _) => ColumnValue::TimestampMs(None),
                other => {
                    return Err(ConvertError::Encode {
                        field: field.to_string(),
                        reason: format!("unsupported data type {}", other),
                    }
                    .into())
                }
            })
        }
        Some(value) => value,
    };

    match data_type {
        DataType::Utf8 => match value {
            Value::String(s) => Ok(ColumnValue::Utf8(Some(s.clone()))),
            other => Err(mismatch("string", other)),
        },
        DataType::Boolean => match value {
            Value::Bool(b) => Ok(ColumnValue::Bool(Some(*b))),
            other => Err(mismatch("bool", other)),
        },
        DataType::Float64 => match value.as_f64() {
            Some(f) => Ok(ColumnValue::Float(Some(f))),
            None => Err(mismatch("number", value)),
        },
        DataType::Int64 => match integral(value) {
            Some(i) => Ok(ColumnValue::Int(Some(i))),
            None => Err(mismatch("integer", value)),
        },
        DataType::Timestamp(TimeUnit::Millisecond, _) => match integral(value) {
            Some(ms) => Ok(ColumnValue::TimestampMs(Some(ms))),
            None => Err(mismatch("epoch milliseconds", value)),
        },
        other => Err(ConvertError::Encode {
            field: field.to_string(),
            reason: format!("unsupported data type {}", other),
        }
        .into()),
    }
}

fn integral(value: &Value) -> Option<i64> {
    if let Some(i) = value.as_i64() {
        return Some(i);
    }
    match value.as_f64() {
        Some(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 => {
            Some(f as i64)
        }
        _ => None,
    }
}

/// Assemble one row-group chunk into an arrow batch.
fn build_batch(
    schema: &SchemaRef,
    rows: &[Vec<ColumnValue>],
) -> std::result::Result<RecordBatch, String> {
    let mut arrays: Vec<ArrayRef> = Vec::with_capacity(schema.fields().len());

    for (column, field) in schema.fields().iter().enumerate() {
        let array: ArrayRef = match field.data_type() {
            DataType::Utf8 => {
                let values: Vec<Option<String>> = rows
                    .iter()
                    .map(|row| match &row[column] {
                        ColumnValue::Utf8(v) => v.clone(),
                        _ => None,
                    })
                    .collect();
                Arc::new(StringArray::from(values))
            }
            DataType::Boolean => {
                let values: Vec<Option<bool>> = rows
                    .iter()
                    .map(|row| match &row[column] {
                        ColumnValue::Bool(v) => *v,
                        _ => None,
                    })
                    .collect();
                Arc::new(BooleanArray::from(values))
            }
            DataType::Float64 => {
                let values: Vec<Option<f64>> = rows
                    .iter()
                    .map(|row| match &row[column] {
                        ColumnValue::Float(v) => *v,
                        _ => None,
                    })
                    .collect();
                Arc::new(Float64Array::from(values))
            }
            DataType::Int64 => {
                let values: Vec<Option<i64>> = rows
                    .iter()
                    .map(|row| match &row[column] {
                        ColumnValue::Int(v) => *v,
                        _ => None,
                    })
                    .collect();
                Arc::new(Int64Array::from(values))
            }
            DataType::Timestamp(TimeUnit::Millisecond, _) => {
                let values: Vec<Option<i64>> = rows
                    .iter()
                    .map(|row| match &row[column] {
                        ColumnValue::TimestampMs(v) => *v,
                        _ => None,
                    })
                    .collect();
                Arc::new(TimestampMillisecondArray::from(values))
            }
            DataType::List(_) => {
                let mut builder = ListBuilder::new(StringBuilder::new());
                for row in rows {
                    match &row[column] {
                        ColumnValue::Utf8List(Some(items)) => {
                            for item in items {
                                builder.values().append_value(item);
                            }
                            builder.append(true);
                        }
                        _ => builder.append(true),
                    }
                }
                Arc::new(builder.finish())
            }
            other => return Err(format!("unsupported column type {}", other)),
        };
        arrays.push(array);
    }

    RecordBatch::try_new(schema.clone(), arrays).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RecordVariant;
    use crate::convert::{check_failed, parse_schema_description, typed_schema};
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
    use serde_json::json;

    fn typed_record(n: usize) -> Record {
        let map = json!({
            "timestamp": 1754600000.0 + n as f64,
            "capability": "payments",
            "domain": "checkout",
            "service": "gateway",
            "application": "web",
            "message": format!("event-{}", n),
            "tags": ["a", "b"],
            "args": {"n": n.to_string()},
        });
        match map {
            Value::Object(m) => Record::new(RecordVariant::Typed, m).unwrap(),
            _ => unreachable!(),
        }
    }

    fn dynamic_record(value: Value) -> Record {
        match value {
            Value::Object(m) => Record::new(RecordVariant::Dynamic, m).unwrap(),
            _ => unreachable!(),
        }
    }

    fn read_row_count(bytes: &Bytes) -> usize {
        let reader = ParquetRecordBatchReaderBuilder::try_new(bytes.clone())
            .unwrap()
            .build()
            .unwrap();
        reader.map(|batch| batch.unwrap().num_rows()).sum()
    }

    #[test]
    fn test_typed_batch_writes_all_rows() {
        let converter = ParquetConverter::new(Compression::Snappy, 1024);
        let schema = typed_schema();
        let records: Vec<Record> = (0..5).map(typed_record).collect();

        let output = converter.write("payments.checkout.gateway.web", records, &schema);
        assert!(output.results.is_empty());
        assert!(!check_failed(&output.results));
        assert_eq!(output.encoded.len(), 5);

        let bytes = output.bytes.unwrap();
        assert_eq!(&bytes[0..4], b"PAR1");
        assert_eq!(read_row_count(&bytes), 5);
    }

    #[test]
    fn test_one_bad_record_does_not_void_the_batch() {
        let converter = ParquetConverter::new(Compression::Snappy, 1024);
        let schema = parse_schema_description(
            r#"[{"name": "user", "type": "string"}, {"name": "count", "type": "int64"}]"#,
        )
        .unwrap();

        let records = vec![
            dynamic_record(json!({"user": "alice", "count": 1})),
            dynamic_record(json!({"user": "bob", "count": "seven"})),
            dynamic_record(json!({"user": "carol", "count": 3})),
        ];

        let output = converter.write("k", records, &schema);
        assert_eq!(output.results.len(), 1);
        assert!(check_failed(&output.results));
        assert!(!output.results[0].is_batch_failure());

        // The offending record is referenced by the result
        let failed = output.results[0].record.as_ref().unwrap();
        let Record::Dynamic(d) = failed else { panic!() };
        assert_eq!(d.get("user"), Some(&json!("bob")));

        // The remaining records are present in the finalized output
        assert_eq!(read_row_count(&output.bytes.unwrap()), 2);
    }

    #[test]
    fn test_row_group_size_bounds_groups() {
        let converter = ParquetConverter::new(Compression::None, 3);
        let schema = typed_schema();
        let records: Vec<Record> = (0..10).map(typed_record).collect();

        let output = converter.write("k", records, &schema);
        let bytes = output.bytes.unwrap();
        let builder = ParquetRecordBatchReaderBuilder::try_new(bytes.clone()).unwrap();
        assert_eq!(builder.metadata().num_row_groups(), 4);
        assert_eq!(read_row_count(&bytes), 10);
    }

    #[test]
    fn test_all_records_failing_yields_no_file() {
        let converter = ParquetConverter::new(Compression::Snappy, 1024);
        let schema =
            parse_schema_description(r#"[{"name": "count", "type": "int64"}]"#).unwrap();
        let records = vec![dynamic_record(json!({"count": "x"}))];

        let output = converter.write("k", records, &schema);
        assert!(output.bytes.is_none());
        assert!(output.encoded.is_empty());
        assert_eq!(output.results.len(), 1);
    }

    #[test]
    fn test_compression_codecs_produce_valid_files() {
        let schema = typed_schema();
        for compression in [Compression::Snappy, Compression::Gzip, Compression::None] {
            let converter = ParquetConverter::new(compression, 1024);
            let output = converter.write("k", vec![typed_record(0)], &schema);
            assert!(
                output.bytes.is_some(),
                "failed for compression {:?}",
                compression
            );
        }
    }

    #[test]
    fn test_dynamic_nullable_fields() {
        let converter = ParquetConverter::new(Compression::Snappy, 1024);
        let schema = parse_schema_description(
            r#"[{"name": "user", "type": "string"}, {"name": "seen_at", "type": "timestamp"}]"#,
        )
        .unwrap();
        let records = vec![
            dynamic_record(json!({"user": "alice", "seen_at": 1754600000000i64})),
            dynamic_record(json!({"user": "bob"})),
        ];

        let output = converter.write("k", records, &schema);
        assert!(output.results.is_empty());
        assert_eq!(read_row_count(&output.bytes.unwrap()), 2);
    }
}
