use base64::Engine;
use base64::prelude::BASE64_STANDARD;
use indexmap::IndexMap;
use serde_json::Value as JsonValue;
use sqlx::mysql::{MySqlRow, MySqlValueRef};
use sqlx::{Column, Decode, MySql, Row as _, TypeInfo, ValueRef};
use time::macros::format_description;
use time::{Date, PrimitiveDateTime, Time};

use crate::{Error, Result};

/// A decoded result row: column name to JSON value, in select-list order
pub type Row = IndexMap<String, JsonValue>;

/// How a MySQL column type maps onto JSON
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
   Null,
   Boolean,
   Signed,
   Unsigned,
   Float,
   /// DECIMAL, kept as a string so no precision is lost
   Decimal,
   Text,
   /// Binary strings and blobs, base64 encoded
   Binary,
   /// BIT(n), folded into an unsigned integer
   Bit,
   Date,
   Time,
   DateTime,
   Json,
}

/// Map a sqlx MySQL type name to the JSON representation used for it.
///
/// Returns `None` for types with no JSON mapping.
pub fn classify(type_name: &str) -> Option<ValueKind> {
   if type_name.ends_with(" UNSIGNED") {
      return Some(ValueKind::Unsigned);
   }

   let kind = match type_name {
      "NULL" => ValueKind::Null,
      "BOOLEAN" => ValueKind::Boolean,
      "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" | "YEAR" => ValueKind::Signed,
      "FLOAT" | "DOUBLE" => ValueKind::Float,
      "DECIMAL" => ValueKind::Decimal,
      "CHAR" | "VARCHAR" | "TINYTEXT" | "TEXT" | "MEDIUMTEXT" | "LONGTEXT" | "ENUM" | "SET" => {
         ValueKind::Text
      }
      "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" | "GEOMETRY" => {
         ValueKind::Binary
      }
      "BIT" => ValueKind::Bit,
      "DATE" => ValueKind::Date,
      "TIME" => ValueKind::Time,
      "DATETIME" | "TIMESTAMP" => ValueKind::DateTime,
      "JSON" => ValueKind::Json,
      _ => return None,
   };

   Some(kind)
}

/// Convert a single column value to JSON
pub fn to_json(value: MySqlValueRef<'_>) -> Result<JsonValue> {
   if value.is_null() {
      return Ok(JsonValue::Null);
   }

   let type_name = value.type_info().name().to_owned();
   let kind = classify(&type_name).ok_or(Error::UnsupportedDatatype(type_name))?;

   let json = match kind {
      ValueKind::Null => JsonValue::Null,
      ValueKind::Boolean => JsonValue::Bool(decode::<i64>(value)? != 0),
      ValueKind::Signed => JsonValue::from(decode::<i64>(value)?),
      ValueKind::Unsigned => JsonValue::from(decode::<u64>(value)?),
      ValueKind::Float => float_to_json(decode::<f64>(value)?),
      ValueKind::Decimal | ValueKind::Text => JsonValue::String(decode::<String>(value)?),
      ValueKind::Binary => JsonValue::String(BASE64_STANDARD.encode(decode::<Vec<u8>>(value)?)),
      ValueKind::Bit => JsonValue::from(fold_bits(&decode::<Vec<u8>>(value)?)),
      ValueKind::Date => JsonValue::String(format_date(decode::<Date>(value)?)?),
      ValueKind::Time => JsonValue::String(format_time(decode::<Time>(value)?)?),
      ValueKind::DateTime => {
         let datetime = decode::<PrimitiveDateTime>(value)?;
         JsonValue::String(format!(
            "{} {}",
            format_date(datetime.date())?,
            format_time(datetime.time())?
         ))
      }
      ValueKind::Json => decode::<JsonValue>(value)?,
   };

   Ok(json)
}

/// Decode every column of a row
pub fn decode_row(row: &MySqlRow) -> Result<Row> {
   let mut decoded = IndexMap::with_capacity(row.len());
   for (i, column) in row.columns().iter().enumerate() {
      let value = row.try_get_raw(i)?;
      decoded.insert(column.name().to_string(), to_json(value)?);
   }
   Ok(decoded)
}

/// Decode the first column of a row, `None` if the row has no columns
pub(crate) fn first_column(row: &MySqlRow) -> Result<Option<JsonValue>> {
   if row.columns().is_empty() {
      return Ok(None);
   }
   to_json(row.try_get_raw(0)?).map(Some)
}

// Type compatibility was settled by `classify`, so decode without the
// per-type checks sqlx would otherwise apply.
fn decode<'r, T: Decode<'r, MySql>>(value: MySqlValueRef<'r>) -> Result<T> {
   T::decode(value).map_err(|e| Error::Sqlx(sqlx::Error::Decode(e)))
}

fn float_to_json(value: f64) -> JsonValue {
   serde_json::Number::from_f64(value).map_or(JsonValue::Null, JsonValue::Number)
}

fn fold_bits(bytes: &[u8]) -> u64 {
   bytes
      .iter()
      .fold(0u64, |acc, &byte| (acc << 8) | u64::from(byte))
}

fn format_date(date: Date) -> Result<String> {
   Ok(date.format(format_description!("[year]-[month]-[day]"))?)
}

fn format_time(time: Time) -> Result<String> {
   if time.nanosecond() == 0 {
      Ok(time.format(format_description!("[hour]:[minute]:[second]"))?)
   } else {
      Ok(time.format(format_description!(
         "[hour]:[minute]:[second].[subsecond digits:6]"
      ))?)
   }
}

#[cfg(test)]
mod tests {
   use time::macros::{date, time};

   use super::*;

   #[test]
   fn test_classify_integer_types() {
      assert_eq!(classify("INT"), Some(ValueKind::Signed));
      assert_eq!(classify("BIGINT"), Some(ValueKind::Signed));
      assert_eq!(classify("INT UNSIGNED"), Some(ValueKind::Unsigned));
      assert_eq!(classify("BIGINT UNSIGNED"), Some(ValueKind::Unsigned));
      assert_eq!(classify("BOOLEAN"), Some(ValueKind::Boolean));
   }

   #[test]
   fn test_classify_text_and_binary() {
      assert_eq!(classify("VARCHAR"), Some(ValueKind::Text));
      assert_eq!(classify("ENUM"), Some(ValueKind::Text));
      assert_eq!(classify("DECIMAL"), Some(ValueKind::Decimal));
      assert_eq!(classify("VARBINARY"), Some(ValueKind::Binary));
      assert_eq!(classify("LONGBLOB"), Some(ValueKind::Binary));
   }

   #[test]
   fn test_classify_temporal_and_json() {
      assert_eq!(classify("DATE"), Some(ValueKind::Date));
      assert_eq!(classify("TIME"), Some(ValueKind::Time));
      assert_eq!(classify("DATETIME"), Some(ValueKind::DateTime));
      assert_eq!(classify("TIMESTAMP"), Some(ValueKind::DateTime));
      assert_eq!(classify("JSON"), Some(ValueKind::Json));
   }

   #[test]
   fn test_classify_unknown_type() {
      assert_eq!(classify("VECTOR"), None);
      assert_eq!(classify("int"), None);
   }

   #[test]
   fn test_non_finite_floats_become_null() {
      assert_eq!(float_to_json(f64::NAN), JsonValue::Null);
      assert_eq!(float_to_json(f64::INFINITY), JsonValue::Null);
      assert_eq!(float_to_json(1.5), serde_json::json!(1.5));
   }

   #[test]
   fn test_fold_bits_is_big_endian() {
      assert_eq!(fold_bits(&[]), 0);
      assert_eq!(fold_bits(&[0b101]), 5);
      assert_eq!(fold_bits(&[0x01, 0x00]), 256);
   }

   #[test]
   fn test_temporal_formatting_matches_mysql() {
      assert_eq!(format_date(date!(2024 - 02 - 09)).unwrap(), "2024-02-09");
      assert_eq!(format_time(time!(07:05:03)).unwrap(), "07:05:03");
      assert_eq!(
         format_time(time!(07:05:03.25)).unwrap(),
         "07:05:03.250000"
      );
   }
}
