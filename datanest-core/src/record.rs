//! Records, predicates and read options shared by both backends

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ValidationError;

/// A stored or to-be-stored row/document
pub type Record = serde_json::Map<String, Value>;

/// Synthetic identity key carried by every record
pub const ID_FIELD: &str = "_id";

static IDENTIFIER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,62}$").expect("invalid identifier regex"));

/// True for names that can be used as a bare SQL identifier
pub fn is_identifier(name: &str) -> bool {
    IDENTIFIER_RE.is_match(name)
}

/// Accept a JSON value as a non-empty record.
pub fn into_record(value: Value) -> Result<Record, ValidationError> {
    match value {
        Value::Object(map) if map.is_empty() => Err(ValidationError::Empty),
        Value::Object(map) => Ok(map),
        _ => Err(ValidationError::NotAnObject),
    }
}

/// A where-condition
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Predicate {
    /// Matches everything
    #[default]
    All,
    /// Equality conjunction over fields. The document backend passes the
    /// map through as a native filter, so operator documents work there.
    Fields(Record),
    /// Raw conditional with `$1`, `$2`, ... placeholders bound to `params`.
    /// Relational backend only.
    Expr { text: String, params: Vec<Value> },
}

impl Predicate {
    /// Single-field equality
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        let mut map = Record::new();
        map.insert(field.into(), value.into());
        Predicate::Fields(map)
    }

    pub fn fields(map: Record) -> Self {
        Predicate::Fields(map)
    }

    pub fn expr(text: impl Into<String>, params: Vec<Value>) -> Self {
        Predicate::Expr {
            text: text.into(),
            params,
        }
    }

    /// Add another equality to a field map. `All` becomes a field map.
    pub fn and_eq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        match self {
            Predicate::All => Predicate::eq(field, value),
            Predicate::Fields(mut map) => {
                map.insert(field.into(), value.into());
                Predicate::Fields(map)
            }
            expr @ Predicate::Expr { .. } => expr,
        }
    }
}

impl From<Record> for Predicate {
    fn from(map: Record) -> Self {
        if map.is_empty() {
            Predicate::All
        } else {
            Predicate::Fields(map)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }

    /// Sort direction as the document store spells it
    pub fn as_i32(&self) -> i32 {
        match self {
            SortOrder::Asc => 1,
            SortOrder::Desc => -1,
        }
    }
}

/// Ordering and paging for reads
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    pub sort: Vec<(String, SortOrder)>,
    pub limit: Option<u64>,
    pub skip: Option<u64>,
}

impl FindOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sort_by(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.sort.push((field.into(), order));
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }
}

/// One page of results plus the unpaged match count
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub list: Vec<Record>,
    pub count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn identifiers() {
        assert!(is_identifier("username"));
        assert!(is_identifier("_id"));
        assert!(is_identifier("verification_code2"));
        assert!(!is_identifier("2fa"));
        assert!(!is_identifier("name; DROP TABLE users"));
        assert!(!is_identifier(""));
    }

    #[test]
    fn into_record_rejects_non_objects() {
        assert_eq!(into_record(json!([1, 2])).unwrap_err(), ValidationError::NotAnObject);
        assert_eq!(into_record(json!({})).unwrap_err(), ValidationError::Empty);
        assert!(into_record(json!({ "a": 1 })).is_ok());
    }

    #[test]
    fn predicate_builders() {
        let p = Predicate::All.and_eq("username", "alice").and_eq("isactive", true);
        let Predicate::Fields(map) = p else {
            panic!("expected field predicate");
        };
        assert_eq!(map.get("username"), Some(&json!("alice")));
        assert_eq!(map.get("isactive"), Some(&json!(true)));

        assert_eq!(Predicate::from(Record::new()), Predicate::All);
    }

    #[test]
    fn find_options_builder() {
        let opts = FindOptions::new()
            .sort_by("createdat", SortOrder::Desc)
            .limit(10)
            .skip(20);
        assert_eq!(opts.sort, vec![("createdat".to_string(), SortOrder::Desc)]);
        assert_eq!(opts.limit, Some(10));
        assert_eq!(opts.skip, Some(20));
    }
}
