//! Per-field validators built from [`FieldSpec`]s
//!
//! Checks run in a fixed order: base type, format (`accepts`), `min`, `max`,
//! and finally presence. An absent optional field therefore never reaches
//! the range checks. `null` stands for "no value" and is only accepted for
//! fields that were not declared required, on insert and update alike.

use chrono::{DateTime, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::error::{SchemaError, ValidationError};
use crate::record::Record;
use crate::schema::{Accepts, FieldSpec, FieldType};

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?)+$")
        .expect("invalid email regex")
});

/// Format narrowing compiled from `accepts`
#[derive(Debug, Clone)]
enum Format {
    Alphanum,
    Pattern(Regex),
    Email,
}

/// Compiled checks for a single field
#[derive(Debug, Clone)]
pub struct FieldValidator {
    name: String,
    kind: FieldType,
    format: Option<Format>,
    min: Option<f64>,
    max: Option<f64>,
    required: bool,
    /// `null` is accepted only for fields not declared required
    nullable: bool,
}

/// Build the validator for one field declaration.
pub fn compile_validator(name: &str, spec: &FieldSpec) -> Result<FieldValidator, SchemaError> {
    let format = match spec.accepts {
        None => None,
        Some(Accepts::Alphanum) => Some(Format::Alphanum),
        Some(Accepts::Email) => Some(Format::Email),
        Some(Accepts::Regex) => {
            let pattern = spec.regex.as_deref().ok_or_else(|| SchemaError::MissingPattern {
                field: name.to_string(),
            })?;
            let regex = Regex::new(pattern).map_err(|e| SchemaError::InvalidPattern {
                field: name.to_string(),
                reason: e.to_string(),
            })?;
            Some(Format::Pattern(regex))
        }
    };

    if let (Some(min), Some(max)) = (spec.min, spec.max) {
        if min > max {
            return Err(SchemaError::InvalidRange {
                field: name.to_string(),
            });
        }
    }

    Ok(FieldValidator {
        name: name.to_string(),
        kind: spec.kind.clone(),
        format,
        min: spec.min,
        max: spec.max,
        required: spec.required,
        nullable: !spec.required,
    })
}

impl FieldValidator {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &FieldType {
        &self.kind
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    /// The same checks with presence no longer enforced. A declared-required
    /// field still refuses `null`.
    pub fn for_update(mut self) -> Self {
        self.required = false;
        self
    }

    /// Validate the value supplied for this field, `None` meaning absent.
    pub fn check(&self, value: Option<&Value>) -> Result<(), ValidationError> {
        match value {
            None if self.required => Err(ValidationError::Missing {
                field: self.name.clone(),
            }),
            None => Ok(()),
            Some(Value::Null) if self.required || !self.nullable => {
                Err(ValidationError::Missing {
                    field: self.name.clone(),
                })
            }
            Some(Value::Null) => Ok(()),
            Some(value) => {
                self.check_type(value)?;
                self.check_format(value)?;
                self.check_min(value)?;
                self.check_max(value)
            }
        }
    }

    fn check_type(&self, value: &Value) -> Result<(), ValidationError> {
        check_kind(&self.kind, value).map_err(|expected| ValidationError::WrongType {
            field: self.name.clone(),
            expected,
        })
    }

    fn check_format(&self, value: &Value) -> Result<(), ValidationError> {
        let Some(format) = &self.format else {
            return Ok(());
        };
        let Value::String(s) = value else {
            return Err(self.invalid("must be a string to match its format"));
        };
        if s.is_empty() && self.kind.is_string_like() {
            return Ok(());
        }

        match format {
            Format::Alphanum if !s.chars().all(|c| c.is_ascii_alphanumeric()) => {
                Err(self.invalid("must only contain alpha-numeric characters"))
            }
            Format::Pattern(regex) if !regex.is_match(s) => {
                Err(self.invalid("fails to match the required pattern"))
            }
            Format::Email if !EMAIL_RE.is_match(s) => Err(self.invalid("must be a valid email")),
            _ => Ok(()),
        }
    }

    fn check_min(&self, value: &Value) -> Result<(), ValidationError> {
        let Some(min) = self.min else {
            return Ok(());
        };
        match measure(value) {
            Some(Measure::Length(len)) if len < min => Err(ValidationError::TooShort {
                field: self.name.clone(),
                min,
            }),
            Some(Measure::Value(n)) if n < min => Err(ValidationError::BelowMinimum {
                field: self.name.clone(),
                min,
            }),
            _ => Ok(()),
        }
    }

    fn check_max(&self, value: &Value) -> Result<(), ValidationError> {
        let Some(max) = self.max else {
            return Ok(());
        };
        match measure(value) {
            Some(Measure::Length(len)) if len > max => Err(ValidationError::TooLong {
                field: self.name.clone(),
                max,
            }),
            Some(Measure::Value(n)) if n > max => Err(ValidationError::AboveMaximum {
                field: self.name.clone(),
                max,
            }),
            _ => Ok(()),
        }
    }

    fn invalid(&self, reason: &'static str) -> ValidationError {
        ValidationError::InvalidFormat {
            field: self.name.clone(),
            reason,
        }
    }
}

enum Measure {
    Length(f64),
    Value(f64),
}

/// Strings and arrays are measured by length, numbers by value.
fn measure(value: &Value) -> Option<Measure> {
    match value {
        Value::String(s) => Some(Measure::Length(s.chars().count() as f64)),
        Value::Array(items) => Some(Measure::Length(items.len() as f64)),
        Value::Number(n) => n.as_f64().map(Measure::Value),
        _ => None,
    }
}

/// Base type check. On mismatch returns the expected type's description.
fn check_kind(kind: &FieldType, value: &Value) -> Result<(), &'static str> {
    let ok = match kind {
        FieldType::Char
        | FieldType::String
        | FieldType::Text
        | FieldType::Time
        | FieldType::Interval
        | FieldType::Box
        | FieldType::Line
        | FieldType::Point
        | FieldType::LineSegment
        | FieldType::Polygon
        | FieldType::Inet
        | FieldType::MacAddr => value.is_string(),
        FieldType::Binary => value
            .as_str()
            .is_some_and(|s| !s.is_empty() && s.chars().all(|c| c == '0' || c == '1')),
        FieldType::Number | FieldType::Serial => value
            .as_i64()
            .is_some_and(|n| i32::try_from(n).is_ok()),
        FieldType::SmallNumber => value
            .as_i64()
            .is_some_and(|n| i16::try_from(n).is_ok()),
        FieldType::BigNumber => value.is_i64(),
        FieldType::Double | FieldType::Real | FieldType::Numeric => value.is_number(),
        FieldType::Boolean => value.is_boolean(),
        FieldType::Timestamp => value
            .as_str()
            .is_some_and(|s| DateTime::parse_from_rfc3339(s).is_ok()),
        FieldType::Date => value
            .as_str()
            .is_some_and(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()),
        FieldType::Uuid => value
            .as_str()
            .is_some_and(|s| uuid::Uuid::parse_str(s).is_ok()),
        FieldType::Object | FieldType::SmartObject => value.is_object() || value.is_array(),
        FieldType::Array(inner) => {
            let Value::Array(items) = value else {
                return Err(kind_name(kind));
            };
            return items
                .iter()
                .try_for_each(|item| check_kind(inner, item))
                .map_err(|_| kind_name(kind));
        }
    };

    if ok {
        Ok(())
    } else {
        Err(kind_name(kind))
    }
}

fn kind_name(kind: &FieldType) -> &'static str {
    match kind {
        FieldType::Char | FieldType::String | FieldType::Text => "string",
        FieldType::Time => "time string",
        FieldType::Interval => "interval string",
        FieldType::Box
        | FieldType::Line
        | FieldType::Point
        | FieldType::LineSegment
        | FieldType::Polygon => "geometric string",
        FieldType::Inet => "network address string",
        FieldType::MacAddr => "MAC address string",
        FieldType::Binary => "bit string",
        FieldType::Number | FieldType::Serial => "32-bit integer",
        FieldType::SmallNumber => "16-bit integer",
        FieldType::BigNumber => "64-bit integer",
        FieldType::Double | FieldType::Real | FieldType::Numeric => "number",
        FieldType::Boolean => "boolean",
        FieldType::Timestamp => "RFC 3339 timestamp",
        FieldType::Date => "YYYY-MM-DD date",
        FieldType::Uuid => "UUID",
        FieldType::Object | FieldType::SmartObject => "JSON object or array",
        FieldType::Array(_) => "array of matching values",
    }
}

/// Validators for every declared field, in declaration order
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<FieldValidator>,
}

impl RuleSet {
    pub fn new(rules: Vec<FieldValidator>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[FieldValidator] {
        &self.rules
    }

    /// Validate a record, stopping at the first failure. Undeclared keys
    /// are rejected.
    pub fn validate(&self, record: &Record) -> Result<(), ValidationError> {
        if let Some(unknown) = record
            .keys()
            .find(|key| !self.rules.iter().any(|rule| &rule.name == *key))
        {
            return Err(ValidationError::UnknownField {
                field: unknown.clone(),
            });
        }

        self.rules
            .iter()
            .try_for_each(|rule| rule.check(record.get(&rule.name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn validator(spec: FieldSpec) -> FieldValidator {
        compile_validator("field", &spec).unwrap()
    }

    #[test]
    fn strings_allow_empty() {
        let v = validator(FieldSpec::string().required());
        assert!(v.check(Some(&json!(""))).is_ok());
        assert!(v.check(Some(&json!(12))).is_err());
    }

    #[test]
    fn absent_optional_skips_range() {
        let v = validator(FieldSpec::string().min(3.0).max(8.0));
        assert!(v.check(None).is_ok());
        assert!(v.check(Some(&Value::Null)).is_ok());
    }

    #[test]
    fn update_rule_refuses_null_for_required_field() {
        let v = validator(FieldSpec::string().required()).for_update();
        assert!(!v.is_required());
        assert!(v.check(None).is_ok());
        assert_eq!(
            v.check(Some(&Value::Null)).unwrap_err(),
            ValidationError::Missing {
                field: "field".into()
            }
        );
        assert!(v.check(Some(&json!("bob"))).is_ok());

        let optional = validator(FieldSpec::string()).for_update();
        assert!(optional.check(Some(&Value::Null)).is_ok());
    }

    #[test]
    fn absent_required_fails() {
        let v = validator(FieldSpec::string().required().min(3.0));
        assert_eq!(
            v.check(None).unwrap_err(),
            ValidationError::Missing {
                field: "field".into()
            }
        );
    }

    #[test]
    fn string_length_bounds() {
        let v = validator(FieldSpec::string().min(3.0).max(5.0));
        assert!(matches!(
            v.check(Some(&json!("ab"))).unwrap_err(),
            ValidationError::TooShort { .. }
        ));
        assert!(matches!(
            v.check(Some(&json!("abcdef"))).unwrap_err(),
            ValidationError::TooLong { .. }
        ));
        // counted in characters, not bytes
        assert!(v.check(Some(&json!("héllo"))).is_ok());
    }

    #[test]
    fn numeric_bounds() {
        let v = validator(FieldSpec::new(FieldType::Number).min(0.0).max(120.0));
        assert!(v.check(Some(&json!(42))).is_ok());
        assert!(matches!(
            v.check(Some(&json!(-1))).unwrap_err(),
            ValidationError::BelowMinimum { .. }
        ));
        assert!(matches!(
            v.check(Some(&json!(121))).unwrap_err(),
            ValidationError::AboveMaximum { .. }
        ));
    }

    #[test]
    fn integer_widths() {
        let small = validator(FieldSpec::new(FieldType::SmallNumber));
        assert!(small.check(Some(&json!(32767))).is_ok());
        assert!(small.check(Some(&json!(32768))).is_err());

        let int = validator(FieldSpec::new(FieldType::Number));
        assert!(int.check(Some(&json!(1.5))).is_err());
        assert!(int.check(Some(&json!(3_000_000_000_i64))).is_err());

        let big = validator(FieldSpec::new(FieldType::BigNumber));
        assert!(big.check(Some(&json!(3_000_000_000_i64))).is_ok());
    }

    #[test]
    fn email_format() {
        let v = validator(FieldSpec::string().accepts(Accepts::Email));
        assert!(v.check(Some(&json!("alice@example.com"))).is_ok());
        assert!(v.check(Some(&json!("alice@"))).is_err());
        assert!(v.check(Some(&json!("not an email"))).is_err());
    }

    #[test]
    fn alphanum_format() {
        let v = validator(FieldSpec::string().accepts(Accepts::Alphanum));
        assert!(v.check(Some(&json!("alice42"))).is_ok());
        assert!(v.check(Some(&json!("alice_42"))).is_err());
    }

    #[test]
    fn regex_format() {
        let v = validator(FieldSpec::string().pattern(r"^[a-z]+-\d+$"));
        assert!(v.check(Some(&json!("order-17"))).is_ok());
        assert!(matches!(
            v.check(Some(&json!("order17"))).unwrap_err(),
            ValidationError::InvalidFormat { .. }
        ));
    }

    #[test]
    fn regex_requires_pattern() {
        let spec = FieldSpec::string().accepts(Accepts::Regex);
        assert!(matches!(
            compile_validator("code", &spec).unwrap_err(),
            SchemaError::MissingPattern { .. }
        ));

        let spec = FieldSpec::string().pattern("([");
        assert!(matches!(
            compile_validator("code", &spec).unwrap_err(),
            SchemaError::InvalidPattern { .. }
        ));
    }

    #[test]
    fn min_above_max_rejected() {
        let spec = FieldSpec::string().min(5.0).max(1.0);
        assert!(matches!(
            compile_validator("name", &spec).unwrap_err(),
            SchemaError::InvalidRange { .. }
        ));
    }

    #[test]
    fn temporal_and_uuid_kinds() {
        let ts = validator(FieldSpec::new(FieldType::Timestamp));
        assert!(ts.check(Some(&json!("2024-05-01T10:00:00Z"))).is_ok());
        assert!(ts.check(Some(&json!("yesterday"))).is_err());

        let date = validator(FieldSpec::new(FieldType::Date));
        assert!(date.check(Some(&json!("2024-05-01"))).is_ok());
        assert!(date.check(Some(&json!("05/01/2024"))).is_err());

        let id = validator(FieldSpec::new(FieldType::Uuid));
        assert!(id
            .check(Some(&json!("67e55044-10b1-426f-9247-bb680e5fe0c8")))
            .is_ok());
        assert!(id.check(Some(&json!("67e55044"))).is_err());
    }

    #[test]
    fn array_elements_checked() {
        let v = validator(FieldSpec::new(FieldType::array_of(FieldType::String)).max(2.0));
        assert!(v.check(Some(&json!(["a", "b"]))).is_ok());
        assert!(v.check(Some(&json!(["a", 1]))).is_err());
        assert!(matches!(
            v.check(Some(&json!(["a", "b", "c"]))).unwrap_err(),
            ValidationError::TooLong { .. }
        ));
    }

    #[test]
    fn rule_set_rejects_unknown_keys() {
        let rules = RuleSet::new(vec![compile_validator("username", &FieldSpec::string()).unwrap()]);
        let mut record = Record::new();
        record.insert("username".into(), json!("alice"));
        record.insert("role".into(), json!("admin"));

        assert_eq!(
            rules.validate(&record).unwrap_err(),
            ValidationError::UnknownField {
                field: "role".into()
            }
        );
    }
}
