use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::Value;
use tokio_postgres::types::{FromSql, Kind, Type};
use tokio_postgres::{Row, Statement};

use super::decode::{TextForm, WireBytes};
use crate::error::GatewayError;
use crate::results::ResultSet;
use crate::types::RowValues;

/// Build a result set using statement metadata for column names.
///
/// `rows_affected` is the count from the server's command tag when known, otherwise the number
/// of rows.
///
/// # Errors
/// Returns errors from row value extraction.
pub fn build_result_set(
    stmt: &Statement,
    rows: &[Row],
    rows_affected: Option<u64>,
) -> Result<ResultSet, GatewayError> {
    let column_names: Vec<String> = stmt
        .columns()
        .iter()
        .map(|col| col.name().to_string())
        .collect();
    let column_count = column_names.len();

    let mut result_set = ResultSet::with_capacity(rows.len());
    result_set.set_column_names(Arc::new(column_names));

    for row in rows {
        let mut row_values = Vec::with_capacity(column_count);
        for idx in 0..column_count {
            row_values.push(postgres_extract_value(row, idx)?);
        }
        result_set.add_row_values(row_values);
    }
    if let Some(count) = rows_affected {
        result_set.rows_affected = usize::try_from(count).unwrap_or(usize::MAX);
    }

    Ok(result_set)
}

/// Decode a one-dimensional array column into a JSON array.
fn array_json<'a, T>(row: &'a Row, idx: usize) -> Result<Option<RowValues>, GatewayError>
where
    T: FromSql<'a> + Into<Value>,
{
    let items = row.try_get::<_, Option<Vec<Option<T>>>>(idx)?;
    Ok(items.map(|items| {
        RowValues::JSON(Value::Array(
            items
                .into_iter()
                .map(|item| item.map_or(Value::Null, Into::into))
                .collect(),
        ))
    }))
}

/// Extracts a `RowValues` from a `tokio_postgres` Row at the given index.
///
/// # Errors
/// Returns `GatewayError` if the column cannot be decoded.
pub fn postgres_extract_value(row: &Row, idx: usize) -> Result<RowValues, GatewayError> {
    let ty = row
        .columns()
        .get(idx)
        .ok_or_else(|| GatewayError::ExecutionError(format!("no column at index {idx}")))?
        .type_()
        .clone();

    let value = match ty {
        Type::INT2 => row.try_get::<_, Option<i16>>(idx)?.map(|v| RowValues::Int(v.into())),
        Type::INT4 => row.try_get::<_, Option<i32>>(idx)?.map(|v| RowValues::Int(v.into())),
        Type::INT8 => row.try_get::<_, Option<i64>>(idx)?.map(RowValues::Int),
        Type::OID => row.try_get::<_, Option<u32>>(idx)?.map(|v| RowValues::Int(v.into())),
        Type::FLOAT4 => row
            .try_get::<_, Option<f32>>(idx)?
            .map(|v| RowValues::Float(v.into())),
        Type::FLOAT8 => row.try_get::<_, Option<f64>>(idx)?.map(RowValues::Float),
        Type::BOOL => row.try_get::<_, Option<bool>>(idx)?.map(RowValues::Bool),
        Type::TIMESTAMP => row
            .try_get::<_, Option<NaiveDateTime>>(idx)?
            .map(RowValues::Timestamp),
        Type::TIMESTAMPTZ => row
            .try_get::<_, Option<DateTime<Utc>>>(idx)?
            .map(|v| RowValues::Timestamp(v.naive_utc())),
        Type::DATE => row
            .try_get::<_, Option<NaiveDate>>(idx)?
            .map(|v| RowValues::Timestamp(v.and_time(NaiveTime::MIN))),
        Type::JSON | Type::JSONB => row.try_get::<_, Option<Value>>(idx)?.map(RowValues::JSON),
        Type::BYTEA => row.try_get::<_, Option<Vec<u8>>>(idx)?.map(RowValues::Blob),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN => {
            row.try_get::<_, Option<String>>(idx)?.map(RowValues::Text)
        }
        Type::TIME => row
            .try_get::<_, Option<NaiveTime>>(idx)?
            .map(|v| RowValues::Text(v.to_string())),
        Type::INT2_ARRAY => array_json::<i16>(row, idx)?,
        Type::INT4_ARRAY => array_json::<i32>(row, idx)?,
        Type::INT8_ARRAY => array_json::<i64>(row, idx)?,
        Type::FLOAT8_ARRAY => array_json::<f64>(row, idx)?,
        Type::BOOL_ARRAY => array_json::<bool>(row, idx)?,
        Type::TEXT_ARRAY | Type::VARCHAR_ARRAY => array_json::<String>(row, idx)?,
        ref other if <TextForm as FromSql>::accepts(other) => row
            .try_get::<_, Option<TextForm>>(idx)?
            .map(|v| RowValues::Text(v.0)),
        // Unmapped types keep their binary wire form.
        _ => row
            .try_get::<_, Option<WireBytes>>(idx)?
            .map(|v| RowValues::Blob(v.0)),
    };

    Ok(value.unwrap_or(RowValues::Null))
}
