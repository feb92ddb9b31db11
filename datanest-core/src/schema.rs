//! Declarative field specifications and the schema compiler
//!
//! A [`SchemaDef`] lists fields in declaration order. [`CompiledSchema::compile`]
//! turns it into an insert rule set (required fields enforced), an update
//! rule set (required-ness stripped so partial updates pass, though a
//! required field still refuses `null`) and the
//! default-value table applied on insert.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{SchemaError, ValidationError};
use crate::record::{is_identifier, Record, ID_FIELD};
use crate::validate::{compile_validator, RuleSet};

/// Field names the stores manage themselves
const RESERVED_FIELDS: &[&str] = &[ID_FIELD, "createdat", "createdAt"];

/// Primitive kinds a field can be declared as
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum FieldType {
    Timestamp,
    Date,
    Time,
    Interval,
    /// 4-byte integer
    Number,
    /// 8-byte integer
    BigNumber,
    /// 2-byte integer
    SmallNumber,
    Serial,
    Double,
    Real,
    Numeric,
    Char,
    String,
    Text,
    /// Plain JSON
    Object,
    /// Binary JSON
    SmartObject,
    Binary,
    Boolean,
    Uuid,
    Box,
    Line,
    Point,
    LineSegment,
    Polygon,
    Inet,
    MacAddr,
    /// Array of another primitive, written `String[]`
    Array(std::boxed::Box<FieldType>),
}

impl FieldType {
    pub fn array_of(inner: FieldType) -> Self {
        FieldType::Array(std::boxed::Box::new(inner))
    }

    /// Character types, which accept the empty string
    pub fn is_string_like(&self) -> bool {
        matches!(self, FieldType::Char | FieldType::String | FieldType::Text)
    }

    pub fn is_json(&self) -> bool {
        matches!(self, FieldType::Object | FieldType::SmartObject)
    }

    fn name(&self) -> std::borrow::Cow<'static, str> {
        let name = match self {
            FieldType::Timestamp => "Timestamp",
            FieldType::Date => "Date",
            FieldType::Time => "Time",
            FieldType::Interval => "Interval",
            FieldType::Number => "Number",
            FieldType::BigNumber => "BNumber",
            FieldType::SmallNumber => "SNumber",
            FieldType::Serial => "Serial",
            FieldType::Double => "Double",
            FieldType::Real => "Real",
            FieldType::Numeric => "Numeric",
            FieldType::Char => "Char",
            FieldType::String => "String",
            FieldType::Text => "Text",
            FieldType::Object => "Object",
            FieldType::SmartObject => "SmartObject",
            FieldType::Binary => "Binary",
            FieldType::Boolean => "Boolean",
            FieldType::Uuid => "UUID",
            FieldType::Box => "Box",
            FieldType::Line => "Line",
            FieldType::Point => "Point",
            FieldType::LineSegment => "LSEG",
            FieldType::Polygon => "Polygon",
            FieldType::Inet => "INET",
            FieldType::MacAddr => "Mac",
            FieldType::Array(inner) => return format!("{}[]", inner.name()).into(),
        };
        name.into()
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

impl FromStr for FieldType {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(inner) = s.strip_suffix("[]") {
            let inner: FieldType = inner.parse()?;
            if matches!(inner, FieldType::Array(_) | FieldType::Serial) {
                return Err(SchemaError::UnknownType { name: s.to_string() });
            }
            return Ok(FieldType::array_of(inner));
        }

        let kind = match s {
            "Timestamp" => FieldType::Timestamp,
            "Date" => FieldType::Date,
            "Time" => FieldType::Time,
            "Interval" | "interval" => FieldType::Interval,
            "Number" => FieldType::Number,
            "BNumber" => FieldType::BigNumber,
            "SNumber" => FieldType::SmallNumber,
            "Serial" => FieldType::Serial,
            "Double" => FieldType::Double,
            "Real" => FieldType::Real,
            "Numeric" => FieldType::Numeric,
            "Char" => FieldType::Char,
            "String" => FieldType::String,
            "Text" => FieldType::Text,
            "Object" => FieldType::Object,
            "SmartObject" => FieldType::SmartObject,
            "Binary" => FieldType::Binary,
            "Boolean" => FieldType::Boolean,
            "UUID" => FieldType::Uuid,
            "Box" => FieldType::Box,
            "Line" => FieldType::Line,
            "Point" => FieldType::Point,
            "LSEG" => FieldType::LineSegment,
            "Polygon" => FieldType::Polygon,
            "INET" => FieldType::Inet,
            "Mac" => FieldType::MacAddr,
            _ => return Err(SchemaError::UnknownType { name: s.to_string() }),
        };
        Ok(kind)
    }
}

impl TryFrom<String> for FieldType {
    type Error = SchemaError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<FieldType> for String {
    fn from(kind: FieldType) -> Self {
        kind.to_string()
    }
}

/// Format narrowing for string fields. Only one applies per field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Accepts {
    Alphanum,
    Regex,
    Email,
}

/// Declaration of one field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSpec {
    #[serde(rename = "type")]
    pub kind: FieldType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accepts: Option<Accepts>,

    /// Pattern used when `accepts` is `regex`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regex: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,

    #[serde(default)]
    pub required: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
}

impl FieldSpec {
    pub fn new(kind: FieldType) -> Self {
        Self {
            kind,
            accepts: None,
            regex: None,
            min: None,
            max: None,
            required: false,
            default_value: None,
        }
    }

    pub fn string() -> Self {
        Self::new(FieldType::String)
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Narrow to a format. A later call replaces an earlier one.
    pub fn accepts(mut self, accepts: Accepts) -> Self {
        self.accepts = Some(accepts);
        self
    }

    pub fn pattern(mut self, pattern: impl Into<String>) -> Self {
        self.accepts = Some(Accepts::Regex);
        self.regex = Some(pattern.into());
        self
    }

    pub fn min(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }

    pub fn max(mut self, max: f64) -> Self {
        self.max = Some(max);
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default_value = Some(value.into());
        self
    }
}

/// Ordered collection of field declarations for one table or collection
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaDef {
    fields: Vec<(String, FieldSpec)>,
}

impl SchemaDef {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field. Re-declaring a name replaces the earlier spec in place.
    pub fn field(mut self, name: impl Into<String>, spec: FieldSpec) -> Self {
        let name = name.into();
        match self.fields.iter_mut().find(|(existing, _)| *existing == name) {
            Some(slot) => slot.1 = spec,
            None => self.fields.push((name, spec)),
        }
        self
    }

    pub fn fields(&self) -> &[(String, FieldSpec)] {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Read a `{ name: { type, required, ... } }` JSON declaration.
    pub fn from_json(value: &Value) -> Result<Self, SchemaError> {
        let Value::Object(map) = value else {
            return Err(SchemaError::InvalidDeclaration {
                reason: "expected an object of field specifications".into(),
            });
        };

        let mut def = SchemaDef::new();
        for (name, spec) in map {
            let spec: FieldSpec = serde_json::from_value(spec.clone()).map_err(|e| {
                SchemaError::InvalidDeclaration {
                    reason: format!("field '{}': {}", name, e),
                }
            })?;
            def = def.field(name.clone(), spec);
        }
        Ok(def)
    }
}

/// Validators and defaults derived from a [`SchemaDef`]. Immutable once built.
#[derive(Debug, Clone)]
pub struct CompiledSchema {
    fields: Vec<(String, FieldSpec)>,
    insert: RuleSet,
    update: RuleSet,
    defaults: Record,
}

impl CompiledSchema {
    /// Compile every field into its insert and update validators.
    pub fn compile(def: &SchemaDef) -> Result<Self, SchemaError> {
        let mut insert = Vec::with_capacity(def.fields.len());
        let mut update = Vec::with_capacity(def.fields.len());
        let mut defaults = Record::new();

        for (name, spec) in &def.fields {
            if !is_identifier(name) {
                return Err(SchemaError::InvalidIdentifier { name: name.clone() });
            }
            if RESERVED_FIELDS.contains(&name.as_str()) {
                return Err(SchemaError::ReservedField { field: name.clone() });
            }

            let insert_rule = compile_validator(name, spec)?;
            let update_rule = insert_rule.clone().for_update();

            if let Some(default) = &spec.default_value {
                update_rule.check(Some(default)).map_err(|e| SchemaError::InvalidDefault {
                    field: name.clone(),
                    reason: e.to_string(),
                })?;
                defaults.insert(name.clone(), default.clone());
            }

            insert.push(insert_rule);
            update.push(update_rule);
        }

        Ok(Self {
            fields: def.fields.clone(),
            insert: RuleSet::new(insert),
            update: RuleSet::new(update),
            defaults,
        })
    }

    pub fn fields(&self) -> &[(String, FieldSpec)] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, spec)| spec)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    pub fn insert_rules(&self) -> &RuleSet {
        &self.insert
    }

    pub fn update_rules(&self) -> &RuleSet {
        &self.update
    }

    /// Default-value table
    pub fn defaults(&self) -> &Record {
        &self.defaults
    }

    /// Check a full record before insert.
    pub fn validate_insert(&self, record: &Record) -> Result<(), ValidationError> {
        if record.is_empty() {
            return Err(ValidationError::Empty);
        }
        self.insert.validate(record)
    }

    /// Check a partial record before update.
    pub fn validate_update(&self, record: &Record) -> Result<(), ValidationError> {
        if record.is_empty() {
            return Err(ValidationError::Empty);
        }
        self.update.validate(record)
    }

    /// Backfill defaults for fields the caller left out. Insert only.
    pub fn apply_defaults(&self, record: &mut Record) {
        for (name, value) in &self.defaults {
            if !record.contains_key(name) {
                record.insert(name.clone(), value.clone());
            }
        }
    }
}
