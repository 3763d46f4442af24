//! Rendering PostgreSQL values as display text.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use tokio_postgres::types::{FromSql, Type};
use tokio_postgres::{Column, Row};
use uuid::Uuid;

use crate::models::{ColumnInfo, RowSet};

/// Accepts any value; used to tell NULL apart from an unrenderable value.
struct Present;

impl<'a> FromSql<'a> for Present {
    fn from_sql(
        _: &Type,
        _: &'a [u8],
    ) -> Result<Self, Box<dyn std::error::Error + Sync + Send>> {
        Ok(Present)
    }

    fn accepts(_: &Type) -> bool {
        true
    }
}

/// Convert driver rows into text cells.
pub fn rowset_from(columns: &[Column], rows: &[Row]) -> RowSet {
    let columns = columns
        .iter()
        .map(|c| ColumnInfo {
            name: c.name().to_string(),
            type_oid: c.type_().oid(),
            type_name: c.type_().name().to_string(),
        })
        .collect();
    let rows = rows.iter().map(render_row).collect();
    RowSet { columns, rows }
}

pub fn render_row(row: &Row) -> Vec<Option<String>> {
    (0..row.len()).map(|i| render_value(row, i)).collect()
}

/// Text for one cell. `None` is SQL NULL.
pub fn render_value(row: &Row, index: usize) -> Option<String> {
    let ty = row.columns()[index].type_().clone();

    let rendered = match ty {
        Type::BOOL => get::<bool>(row, index),
        Type::INT2 => get::<i16>(row, index),
        Type::INT4 => get::<i32>(row, index),
        Type::INT8 => get::<i64>(row, index),
        Type::OID => get::<u32>(row, index),
        Type::FLOAT4 => get::<f32>(row, index),
        Type::FLOAT8 => get::<f64>(row, index),
        Type::NUMERIC => get::<Decimal>(row, index),
        Type::JSON | Type::JSONB => get::<serde_json::Value>(row, index),
        Type::UUID => get::<Uuid>(row, index),
        Type::TIMESTAMP => get::<NaiveDateTime>(row, index),
        Type::TIMESTAMPTZ => get::<DateTime<Utc>>(row, index),
        Type::DATE => get::<NaiveDate>(row, index),
        Type::TIME => get::<NaiveTime>(row, index),
        Type::BYTEA => row
            .try_get::<_, Option<Vec<u8>>>(index)
            .map(|v| v.map(|bytes| format!("<{} bytes>", bytes.len())))
            .ok(),
        Type::INT2_ARRAY => get_array::<i16>(row, index),
        Type::INT4_ARRAY => get_array::<i32>(row, index),
        Type::INT8_ARRAY => get_array::<i64>(row, index),
        Type::BOOL_ARRAY => get_array::<bool>(row, index),
        Type::TEXT_ARRAY | Type::VARCHAR_ARRAY | Type::NAME_ARRAY => {
            get_array::<String>(row, index)
        }
        _ => get::<String>(row, index),
    };

    match rendered {
        Some(value) => value,
        None => match row.try_get::<_, Option<Present>>(index) {
            Ok(None) => None,
            _ => Some(format!("<{}>", ty.name())),
        },
    }
}

/// `Some(cell)` when the column decodes as `T`, `None` when it does not.
fn get<'a, T>(row: &'a Row, index: usize) -> Option<Option<String>>
where
    T: FromSql<'a> + ToString,
{
    row.try_get::<_, Option<T>>(index).ok().map(|v| v.map(|v| v.to_string()))
}

fn get_array<'a, T>(row: &'a Row, index: usize) -> Option<Option<String>>
where
    T: FromSql<'a> + ToString,
{
    row.try_get::<_, Option<Vec<Option<T>>>>(index).ok().map(|v| {
        v.map(|items| {
            let parts: Vec<String> = items
                .into_iter()
                .map(|item| item.map_or_else(|| "NULL".to_string(), |i| i.to_string()))
                .collect();
            format!("{{{}}}", parts.join(","))
        })
    })
}
