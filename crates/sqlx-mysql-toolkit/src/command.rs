//! Named-parameter commands
//!
//! Query text references parameters as `@name`. Before execution each
//! reference is rewritten to a positional `?` placeholder and the matching
//! value is bound, so every command runs as a server-side prepared statement.

use std::sync::OnceLock;

use indexmap::IndexMap;
use regex::Regex;
use serde_json::Value as JsonValue;
use sqlx::MySql;
use sqlx::mysql::MySqlArguments;
use sqlx::query::Query;

use crate::{Error, Result};

fn param_name_regex() -> &'static Regex {
   static RE: OnceLock<Regex> = OnceLock::new();

   RE.get_or_init(|| {
      // Same identifier rules MySQL applies to unquoted user variables
      Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*$").expect("invalid regex")
   })
}

/// Ordered map of parameter name to value.
///
/// Names may be given with or without the leading `@`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params(IndexMap<String, JsonValue>);

impl Params {
   pub fn new() -> Self {
      Self::default()
   }

   /// Builder-style insert
   pub fn with(mut self, name: impl Into<String>, value: impl Into<JsonValue>) -> Self {
      self.insert(name, value);
      self
   }

   /// Insert a value, returning the previous value bound to that name
   pub fn insert(
      &mut self,
      name: impl Into<String>,
      value: impl Into<JsonValue>,
   ) -> Option<JsonValue> {
      let mut name = name.into();
      if name.starts_with('@') {
         name.remove(0);
      }
      self.0.insert(name, value.into())
   }

   pub fn get(&self, name: &str) -> Option<&JsonValue> {
      self.0.get(name.strip_prefix('@').unwrap_or(name))
   }

   pub fn len(&self) -> usize {
      self.0.len()
   }

   pub fn is_empty(&self) -> bool {
      self.0.is_empty()
   }

   pub fn iter(&self) -> impl Iterator<Item = (&str, &JsonValue)> {
      self.0.iter().map(|(name, value)| (name.as_str(), value))
   }

   fn validate(&self) -> Result<()> {
      match self.0.keys().find(|name| !param_name_regex().is_match(name)) {
         Some(name) => Err(Error::InvalidParameterName { name: name.clone() }),
         None => Ok(()),
      }
   }
}

impl<K: Into<String>, V: Into<JsonValue>> FromIterator<(K, V)> for Params {
   fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
      let mut params = Params::new();
      for (name, value) in iter {
         params.insert(name, value);
      }
      params
   }
}

impl<K: Into<String>, V: Into<JsonValue>, const N: usize> From<[(K, V); N]> for Params {
   fn from(pairs: [(K, V); N]) -> Self {
      pairs.into_iter().collect()
   }
}

/// A query with its named parameters resolved to positional ones
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
   sql: String,
   values: Vec<JsonValue>,
}

impl Command {
   /// Resolve `@name` references in `template` against `params`.
   ///
   /// - `@@name` (system variables) is left alone
   /// - references inside string literals, quoted identifiers, and comments
   ///   are left alone
   /// - `@name` with no matching parameter is left as a MySQL user variable
   /// - a parameter referenced several times is bound once per reference
   ///
   /// Fails if any supplied parameter is never referenced, or if a
   /// parameter name is not a valid identifier.
   pub fn new(template: &str, params: &Params) -> Result<Self> {
      params.validate()?;

      if params.is_empty() {
         return Ok(Self {
            sql: template.to_string(),
            values: Vec::new(),
         });
      }

      let bytes = template.as_bytes();
      let mut sql = String::with_capacity(template.len());
      let mut values = Vec::new();
      let mut referenced = vec![false; params.len()];
      let mut copied = 0;
      let mut i = 0;

      while i < bytes.len() {
         i = match bytes[i] {
            quote @ (b'\'' | b'"' | b'`') => skip_quoted(bytes, i, quote),
            b'#' => skip_line(bytes, i),
            b'-' if starts_dash_comment(bytes, i) => skip_line(bytes, i),
            b'/' if bytes.get(i + 1) == Some(&b'*') => skip_block_comment(bytes, i),
            b'@' if bytes.get(i + 1) == Some(&b'@') => identifier_end(bytes, i + 2),
            b'@' => {
               let end = identifier_end(bytes, i + 1);
               if let Some((index, _, value)) = params.0.get_full(&template[i + 1..end]) {
                  sql.push_str(&template[copied..i]);
                  sql.push('?');
                  values.push(value.clone());
                  referenced[index] = true;
                  copied = end;
               }
               end.max(i + 1)
            }
            _ => i + 1,
         };
      }
      sql.push_str(&template[copied..]);

      if let Some(index) = referenced.iter().position(|used| !used)
         && let Some((name, _)) = params.0.get_index(index)
      {
         return Err(Error::UnusedParameter { name: name.clone() });
      }

      Ok(Self { sql, values })
   }

   /// Query text with positional placeholders
   pub fn sql(&self) -> &str {
      &self.sql
   }

   /// Values in placeholder order
   pub fn values(&self) -> &[JsonValue] {
      &self.values
   }

   /// Build the sqlx query.
   ///
   /// Arguments are always attached, even when empty, which makes sqlx use
   /// the prepared-statement protocol instead of a plain text query.
   pub(crate) fn query(&self) -> Query<'_, MySql, MySqlArguments> {
      self
         .values
         .iter()
         .cloned()
         .fold(sqlx::query_with(&self.sql, MySqlArguments::default()), bind_value)
   }
}

/// Bind a JSON value using the closest MySQL type
pub(crate) fn bind_value<'q>(
   query: Query<'q, MySql, MySqlArguments>,
   value: JsonValue,
) -> Query<'q, MySql, MySqlArguments> {
   match value {
      JsonValue::Null => query.bind(None::<String>),
      JsonValue::Bool(flag) => query.bind(flag),
      JsonValue::String(text) => query.bind(text),
      JsonValue::Number(number) => {
         if let Some(int_val) = number.as_i64() {
            query.bind(int_val)
         } else if let Some(uint_val) = number.as_u64() {
            query.bind(uint_val)
         } else {
            query.bind(number.as_f64().unwrap_or_default())
         }
      }
      // Arrays and objects go over the wire as JSON documents
      other => query.bind(other),
   }
}

fn skip_quoted(bytes: &[u8], start: usize, quote: u8) -> usize {
   let mut i = start + 1;
   while i < bytes.len() {
      match bytes[i] {
         b'\\' if quote != b'`' => i += 2,
         b if b == quote => {
            // A doubled quote is an escaped quote
            if bytes.get(i + 1) == Some(&quote) {
               i += 2;
            } else {
               return i + 1;
            }
         }
         _ => i += 1,
      }
   }
   bytes.len()
}

fn starts_dash_comment(bytes: &[u8], i: usize) -> bool {
   bytes.get(i + 1) == Some(&b'-')
      && bytes
         .get(i + 2)
         .is_none_or(|b| b.is_ascii_whitespace() || b.is_ascii_control())
}

fn skip_line(bytes: &[u8], start: usize) -> usize {
   bytes[start..]
      .iter()
      .position(|&b| b == b'\n')
      .map_or(bytes.len(), |offset| start + offset + 1)
}

fn skip_block_comment(bytes: &[u8], start: usize) -> usize {
   bytes[start + 2..]
      .windows(2)
      .position(|pair| pair == b"*/")
      .map_or(bytes.len(), |offset| start + 2 + offset + 2)
}

fn identifier_end(bytes: &[u8], start: usize) -> usize {
   bytes[start..]
      .iter()
      .position(|&b| !(b.is_ascii_alphanumeric() || b == b'_' || b == b'$'))
      .map_or(bytes.len(), |offset| start + offset)
}
