//! Statement construction
//!
//! Every value travels as a bound parameter wrapped in `CAST($n AS <type>)`
//! using the declared column type, so text parameters land correctly in
//! UUID, timestamp, network and geometric columns. The one exception is the
//! JSON-merge assignment, which embeds the patch as a quoted `jsonb`
//! literal. Parameters of raw predicates carry no column type; the handle
//! asks the server what each one should be before binding it. Reads and
//! `RETURNING` writes are wrapped so each row comes back as a single JSON
//! object.

use std::collections::HashMap;

use datanest_core::{
    CompiledSchema, FindOptions, Predicate, Record, Result, StoreError, ID_FIELD,
};
use serde_json::Value;

use crate::ddl::column_cast;

/// How a parameter goes over the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bind {
    /// Chosen from the JSON shape: text, int8, float8, bool or a native array
    Value,
    /// As `jsonb`, whatever the shape
    Json,
    /// As `jsonb[]`, one element per array item
    JsonArray,
    /// As text, cast to the type the server infers for the placeholder
    Inferred,
}

impl Bind {
    /// Encoding for a value headed into a column with this cast type
    pub fn for_cast(cast: &str) -> Self {
        match cast {
            "JSON" | "JSONB" => Bind::Json,
            "JSON[]" | "JSONB[]" => Bind::JsonArray,
            _ => Bind::Value,
        }
    }
}

/// Positional parameters, `$1` first
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params {
    pub values: Vec<Value>,
    pub binds: Vec<Bind>,
}

impl Params {
    /// Append a parameter and return its placeholder number.
    pub fn push(&mut self, value: Value, bind: Bind) -> usize {
        self.values.push(value);
        self.binds.push(bind);
        self.values.len()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Value, Bind)> {
        self.values.iter().zip(self.binds.iter().copied())
    }

    /// Placeholder numbers whose type is left to the server
    pub fn inferred(&self) -> Vec<usize> {
        self.binds
            .iter()
            .enumerate()
            .filter(|(_, bind)| **bind == Bind::Inferred)
            .map(|(index, _)| index + 1)
            .collect()
    }

    /// Append the parameters of a raw predicate.
    pub fn extend_inferred(&mut self, values: impl IntoIterator<Item = Value>) {
        for value in values {
            self.push(value, Bind::Inferred);
        }
    }
}

/// SQL text plus its positional parameters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Statement {
    pub text: String,
    pub params: Params,
}

impl Statement {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            params: Params::default(),
        }
    }

    /// Parameters bound by their JSON shape
    pub fn with_values(text: impl Into<String>, values: Vec<Value>) -> Self {
        let mut params = Params::default();
        for value in values {
            params.push(value, Bind::Value);
        }
        Self::with_params(text, params)
    }

    pub fn with_params(text: impl Into<String>, params: Params) -> Self {
        Self {
            text: text.into(),
            params,
        }
    }
}

/// Wrap a DML statement so its `RETURNING *` rows come back as JSON objects.
pub fn returning_records(dml: &str) -> String {
    format!(
        "WITH affected AS ({} RETURNING *) SELECT to_jsonb(affected) FROM affected",
        dml
    )
}

/// Wrap a query so each row comes back as a JSON object.
pub fn select_records(select: &str) -> String {
    format!("SELECT to_jsonb(r) FROM ({}) r", select)
}

/// Quote a JSON value as a `jsonb` literal, doubling single quotes.
pub fn json_literal(value: &Value) -> String {
    format!("'{}'::jsonb", value.to_string().replace('\'', "''"))
}

/// Validate a record id and turn it into a bindable value.
pub fn record_id(id: &str) -> Result<Value> {
    uuid::Uuid::parse_str(id)
        .map(|uuid| Value::String(uuid.to_string()))
        .map_err(|_| StoreError::malformed(format!("'{}' is not a valid record id", id)))
}

/// Replace every `$n` outside single-quoted literals with `f(n)`.
fn rewrite_placeholders<F>(text: &str, mut f: F) -> Result<String>
where
    F: FnMut(usize) -> Result<String>,
{
    let mut out = String::with_capacity(text.len() + 8);
    let mut in_literal = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '\'' {
            in_literal = !in_literal;
            out.push(c);
            continue;
        }
        if c != '$' || in_literal {
            out.push(c);
            continue;
        }

        let mut digits = String::new();
        while let Some(d) = chars.peek().copied() {
            if !d.is_ascii_digit() {
                break;
            }
            digits.push(d);
            chars.next();
        }
        if digits.is_empty() {
            out.push(c);
            continue;
        }

        let index: usize = digits
            .parse()
            .map_err(|_| StoreError::malformed(format!("placeholder ${} is out of range", digits)))?;
        out.push_str(&f(index)?);
    }

    if in_literal {
        return Err(StoreError::malformed("unterminated string literal in predicate"));
    }
    Ok(out)
}

/// Shift the `$n` placeholders of a raw predicate by `offset`.
///
/// Every placeholder must refer to one of the `params` and every param must
/// be referenced. Placeholders inside single-quoted literals are left alone.
pub fn renumber_placeholders(text: &str, offset: usize, params: usize) -> Result<String> {
    let mut used = vec![false; params];
    let out = rewrite_placeholders(text, |index| {
        if index == 0 || index > params {
            return Err(StoreError::malformed(format!(
                "placeholder ${} has no matching parameter ({} supplied)",
                index, params
            )));
        }
        used[index - 1] = true;
        Ok(format!("${}", index + offset))
    })?;

    if let Some(unused) = used.iter().position(|u| !u) {
        return Err(StoreError::malformed(format!(
            "parameter {} is never referenced by the predicate",
            unused + 1
        )));
    }
    Ok(out)
}

/// Wrap the listed placeholders in `CAST($n AS <type>)`.
pub fn cast_placeholders(text: &str, casts: &HashMap<usize, String>) -> Result<String> {
    rewrite_placeholders(text, |index| {
        Ok(match casts.get(&index) {
            Some(cast) => format!("CAST(${} AS {})", index, cast),
            None => format!("${}", index),
        })
    })
}

/// Statement factory for one table
#[derive(Debug, Clone, Copy)]
pub struct Table<'a> {
    name: &'a str,
    schema: &'a CompiledSchema,
}

impl<'a> Table<'a> {
    pub fn new(name: &'a str, schema: &'a CompiledSchema) -> Self {
        Self { name, schema }
    }

    pub fn name(&self) -> &str {
        self.name
    }

    /// `INSERT INTO t(cols) VALUES($1, ...) RETURNING *`
    pub fn insert(&self, record: &Record) -> Result<Statement> {
        if record.is_empty() {
            return Err(StoreError::malformed("insert without columns"));
        }

        let mut columns = Vec::with_capacity(record.len());
        let mut placeholders = Vec::with_capacity(record.len());
        let mut params = Params::default();
        for (column, value) in record {
            let cast = self.cast(column)?;
            let n = params.push(value.clone(), Bind::for_cast(&cast));
            columns.push(column.as_str());
            placeholders.push(format!("CAST(${} AS {})", n, cast));
        }

        let dml = format!(
            "INSERT INTO {}({}) VALUES({})",
            self.name,
            columns.join(", "),
            placeholders.join(", ")
        );
        Ok(Statement::with_params(returning_records(&dml), params))
    }

    pub fn select_by_id(&self, id: &str) -> Result<Statement> {
        let text = format!("SELECT * FROM {} WHERE {} = CAST($1 AS UUID)", self.name, ID_FIELD);
        Ok(Statement::with_values(select_records(&text), vec![record_id(id)?]))
    }

    /// `SELECT * FROM t [WHERE ...] [ORDER BY ...] [LIMIT $n] [OFFSET $n]`
    pub fn select(&self, predicate: &Predicate, opts: &FindOptions) -> Result<Statement> {
        let mut params = Params::default();
        let mut text = format!("SELECT * FROM {}", self.name);
        if let Some(filter) = self.filter(predicate, &mut params)? {
            text.push_str(" WHERE ");
            text.push_str(&filter);
        }
        if let Some(order) = self.order_by(opts)? {
            text.push_str(" ORDER BY ");
            text.push_str(&order);
        }
        if let Some(limit) = opts.limit {
            let n = params.push(Value::from(i64::try_from(limit).unwrap_or(i64::MAX)), Bind::Value);
            text.push_str(&format!(" LIMIT ${}", n));
        }
        if let Some(skip) = opts.skip {
            let n = params.push(Value::from(i64::try_from(skip).unwrap_or(i64::MAX)), Bind::Value);
            text.push_str(&format!(" OFFSET ${}", n));
        }
        Ok(Statement::with_params(select_records(&text), params))
    }

    pub fn count(&self, predicate: &Predicate) -> Result<Statement> {
        let mut params = Params::default();
        let mut text = format!("SELECT COUNT(*) AS count FROM {}", self.name);
        if let Some(filter) = self.filter(predicate, &mut params)? {
            text.push_str(" WHERE ");
            text.push_str(&filter);
        }
        Ok(Statement::with_params(select_records(&text), params))
    }

    /// `UPDATE t SET ... WHERE _id = $n RETURNING *`
    pub fn update_by_id(&self, id: &str, data: &Record) -> Result<Statement> {
        let mut params = Params::default();
        let set = self.assignments(data, &mut params)?;
        let n = params.push(record_id(id)?, Bind::Value);
        let dml = format!(
            "UPDATE {} SET {} WHERE {} = CAST(${} AS UUID)",
            self.name, set, ID_FIELD, n
        );
        Ok(Statement::with_params(returning_records(&dml), params))
    }

    /// `UPDATE t SET ... [WHERE ...]`, executed for its row count
    pub fn update(&self, predicate: &Predicate, data: &Record) -> Result<Statement> {
        let mut params = Params::default();
        let set = self.assignments(data, &mut params)?;
        let mut text = format!("UPDATE {} SET {}", self.name, set);
        if let Some(filter) = self.filter(predicate, &mut params)? {
            text.push_str(" WHERE ");
            text.push_str(&filter);
        }
        Ok(Statement::with_params(text, params))
    }

    pub fn delete(&self, predicate: &Predicate) -> Result<Statement> {
        let mut params = Params::default();
        let mut text = format!("DELETE FROM {}", self.name);
        if let Some(filter) = self.filter(predicate, &mut params)? {
            text.push_str(" WHERE ");
            text.push_str(&filter);
        }
        Ok(Statement::with_params(text, params))
    }

    pub fn delete_by_id(&self, id: &str) -> Result<Statement> {
        let text = format!("DELETE FROM {} WHERE {} = CAST($1 AS UUID)", self.name, ID_FIELD);
        Ok(Statement::with_values(text, vec![record_id(id)?]))
    }

    pub fn delete_many(&self, ids: &[String]) -> Result<Statement> {
        let ids = ids
            .iter()
            .map(|id| record_id(id))
            .collect::<Result<Vec<_>>>()?;
        let text = format!(
            "DELETE FROM {} WHERE {} = ANY(CAST($1 AS UUID[]))",
            self.name, ID_FIELD
        );
        Ok(Statement::with_values(text, vec![Value::Array(ids)]))
    }

    /// Render a predicate, appending its parameters to `params`.
    /// `None` means no WHERE clause.
    pub fn filter(&self, predicate: &Predicate, params: &mut Params) -> Result<Option<String>> {
        match predicate {
            Predicate::All => Ok(None),
            Predicate::Fields(map) if map.is_empty() => Ok(None),
            Predicate::Fields(map) => {
                let mut terms = Vec::with_capacity(map.len());
                for (column, value) in map {
                    let cast = self.cast(column)?;
                    if value.is_null() {
                        terms.push(format!("{} IS NULL", column));
                        continue;
                    }
                    let n = params.push(value.clone(), Bind::for_cast(&cast));
                    terms.push(if cast == "JSON" {
                        format!("CAST({} AS JSONB) = CAST(${} AS JSONB)", column, n)
                    } else {
                        format!("{} = CAST(${} AS {})", column, n, cast)
                    });
                }
                Ok(Some(terms.join(" AND ")))
            }
            Predicate::Expr { text, params: values } => {
                if text.trim().is_empty() {
                    return Err(StoreError::malformed("empty predicate expression"));
                }
                let text = renumber_placeholders(text, params.len(), values.len())?;
                params.extend_inferred(values.iter().cloned());
                Ok(Some(format!("({})", text)))
            }
        }
    }

    /// `SET` list. Non-empty objects merge into the stored JSON value;
    /// everything else is bound.
    pub fn assignments(&self, data: &Record, params: &mut Params) -> Result<String> {
        if data.is_empty() {
            return Err(StoreError::malformed("update without columns"));
        }

        let mut set = Vec::with_capacity(data.len());
        for (column, value) in data {
            let cast = self.cast(column)?;
            let merges = matches!(value, Value::Object(map) if !map.is_empty())
                && Bind::for_cast(&cast) == Bind::Json;
            if merges {
                set.push(format!(
                    "{col} = CAST(COALESCE(CAST({col} AS JSONB), '{{}}'::jsonb) || {patch} AS {cast})",
                    col = column,
                    patch = json_literal(value),
                    cast = cast
                ));
            } else {
                let n = params.push(value.clone(), Bind::for_cast(&cast));
                set.push(format!("{} = CAST(${} AS {})", column, n, cast));
            }
        }
        Ok(set.join(", "))
    }

    fn order_by(&self, opts: &FindOptions) -> Result<Option<String>> {
        if opts.sort.is_empty() {
            return Ok(None);
        }
        let terms = opts
            .sort
            .iter()
            .map(|(column, order)| {
                self.cast(column)?;
                Ok(format!("{} {}", column, order.as_sql()))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Some(terms.join(", ")))
    }

    /// Cast target for a column, rejecting anything undeclared.
    pub fn cast(&self, column: &str) -> Result<String> {
        column_cast(self.schema, column)
            .ok_or_else(|| StoreError::malformed(format!("unknown column '{}' on {}", column, self.name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use datanest_core::{FieldSpec, FieldType, SchemaDef, SortOrder};
    use serde_json::json;

    const ID: &str = "67e55044-10b1-426f-9247-bb680e5fe0c8";

    fn schema() -> CompiledSchema {
        let def = SchemaDef::new()
            .field("username", FieldSpec::string().required())
            .field("isactive", FieldSpec::new(FieldType::Boolean).default_value(true))
            .field("age", FieldSpec::new(FieldType::Number))
            .field("data", FieldSpec::new(FieldType::SmartObject))
            .field("meta", FieldSpec::new(FieldType::Object));
        CompiledSchema::compile(&def).unwrap()
    }

    fn record(value: Value) -> Record {
        value.as_object().cloned().expect("fixture must be an object")
    }

    #[test]
    fn insert_binds_every_value() {
        let schema = schema();
        let stmt = Table::new("users", &schema)
            .insert(&record(json!({ "username": "alice", "isactive": true })))
            .unwrap();

        assert_eq!(
            stmt.text,
            "WITH affected AS (INSERT INTO users(username, isactive) \
             VALUES(CAST($1 AS VARCHAR), CAST($2 AS BOOLEAN)) RETURNING *) \
             SELECT to_jsonb(affected) FROM affected"
        );
        assert_eq!(stmt.params.values, vec![json!("alice"), json!(true)]);
    }

    #[test]
    fn json_columns_bind_as_json_whatever_the_shape() {
        let def = SchemaDef::new()
            .field("data", FieldSpec::new(FieldType::SmartObject))
            .field("notes", FieldSpec::new(FieldType::array_of(FieldType::Object)))
            .field("tags", FieldSpec::new(FieldType::array_of(FieldType::String)));
        let schema = CompiledSchema::compile(&def).unwrap();
        let stmt = Table::new("posts", &schema)
            .insert(&record(json!({
                "data": ["x", "y"],
                "notes": [{ "a": 1 }],
                "tags": ["x", "y"]
            })))
            .unwrap();

        assert!(stmt.text.contains(
            "VALUES(CAST($1 AS JSONB), CAST($2 AS JSON[]), CAST($3 AS VARCHAR[]))"
        ));
        assert_eq!(stmt.params.binds, vec![Bind::Json, Bind::JsonArray, Bind::Value]);
        assert!(stmt.params.inferred().is_empty());
    }

    #[test]
    fn insert_rejects_unknown_columns() {
        let schema = schema();
        let err = Table::new("users", &schema)
            .insert(&record(json!({ "role": "admin" })))
            .unwrap_err();
        assert!(err.is_malformed());
    }

    #[test]
    fn select_by_id_binds_id() {
        let schema = schema();
        let stmt = Table::new("users", &schema).select_by_id(ID).unwrap();
        assert_eq!(
            stmt.text,
            "SELECT to_jsonb(r) FROM (SELECT * FROM users WHERE _id = CAST($1 AS UUID)) r"
        );
        assert_eq!(stmt.params.values, vec![json!(ID)]);
    }

    #[test]
    fn invalid_id_is_malformed() {
        let schema = schema();
        let table = Table::new("users", &schema);
        assert!(table.select_by_id("42' OR '1'='1").unwrap_err().is_malformed());
        assert!(table.delete_by_id("nope").unwrap_err().is_malformed());
    }

    #[test]
    fn field_predicate_binds_values() {
        let schema = schema();
        let stmt = Table::new("users", &schema)
            .select(
                &Predicate::eq("username", "o'brien").and_eq("age", Value::Null),
                &FindOptions::new(),
            )
            .unwrap();
        assert_eq!(
            stmt.text,
            "SELECT to_jsonb(r) FROM (SELECT * FROM users \
             WHERE username = CAST($1 AS VARCHAR) AND age IS NULL) r"
        );
        assert_eq!(stmt.params.values, vec![json!("o'brien")]);
    }

    #[test]
    fn json_columns_compare_as_jsonb() {
        let schema = schema();
        let mut params = Params::default();
        let filter = Table::new("users", &schema)
            .filter(&Predicate::eq("meta", json!({ "a": 1 })), &mut params)
            .unwrap();
        assert_eq!(
            filter.as_deref(),
            Some("CAST(meta AS JSONB) = CAST($1 AS JSONB)")
        );
        assert_eq!(params.binds, vec![Bind::Json]);
    }

    #[test]
    fn select_with_options() {
        let schema = schema();
        let opts = FindOptions::new()
            .sort_by("createdat", SortOrder::Desc)
            .sort_by("username", SortOrder::Asc)
            .limit(10)
            .skip(20);
        let stmt = Table::new("users", &schema)
            .select(&Predicate::eq("isactive", true), &opts)
            .unwrap();
        assert_eq!(
            stmt.text,
            "SELECT to_jsonb(r) FROM (SELECT * FROM users \
             WHERE isactive = CAST($1 AS BOOLEAN) \
             ORDER BY createdat DESC, username ASC LIMIT $2 OFFSET $3) r"
        );
        assert_eq!(stmt.params.values, vec![json!(true), json!(10), json!(20)]);
    }

    #[test]
    fn unknown_sort_column_is_malformed() {
        let schema = schema();
        let opts = FindOptions::new().sort_by("1; DROP TABLE users", SortOrder::Asc);
        assert!(Table::new("users", &schema)
            .select(&Predicate::All, &opts)
            .unwrap_err()
            .is_malformed());
    }

    #[test]
    fn update_by_id_merges_objects_and_binds_scalars() {
        let schema = schema();
        let stmt = Table::new("users", &schema)
            .update_by_id(
                ID,
                &record(json!({ "data": { "bio": "it's me" }, "isactive": false })),
            )
            .unwrap();

        assert_eq!(
            stmt.text,
            "WITH affected AS (UPDATE users SET \
             data = CAST(COALESCE(CAST(data AS JSONB), '{}'::jsonb) || '{\"bio\":\"it''s me\"}'::jsonb AS JSONB), \
             isactive = CAST($1 AS BOOLEAN) \
             WHERE _id = CAST($2 AS UUID) RETURNING *) \
             SELECT to_jsonb(affected) FROM affected"
        );
        assert_eq!(stmt.params.values, vec![json!(false), json!(ID)]);
    }

    #[test]
    fn empty_object_replaces_instead_of_merging() {
        let schema = schema();
        let mut params = Params::default();
        let set = Table::new("users", &schema)
            .assignments(&record(json!({ "data": {} })), &mut params)
            .unwrap();
        assert_eq!(set, "data = CAST($1 AS JSONB)");
        assert_eq!(params.values, vec![json!({})]);
        assert_eq!(params.binds, vec![Bind::Json]);
    }

    #[test]
    fn update_by_predicate_renumbers_placeholders() {
        let schema = schema();
        let stmt = Table::new("users", &schema)
            .update(
                &Predicate::expr("username = $1 AND age > $2", vec![json!("alice"), json!(30)]),
                &record(json!({ "isactive": false, "age": 31 })),
            )
            .unwrap();
        assert_eq!(
            stmt.text,
            "UPDATE users SET isactive = CAST($1 AS BOOLEAN), age = CAST($2 AS INT) \
             WHERE (username = $3 AND age > $4)"
        );
        assert_eq!(
            stmt.params.values,
            vec![json!(false), json!(31), json!("alice"), json!(30)]
        );
        assert_eq!(stmt.params.inferred(), vec![3, 4]);
    }

    #[test]
    fn update_without_columns_is_malformed() {
        let schema = schema();
        assert!(Table::new("users", &schema)
            .update(&Predicate::All, &Record::new())
            .unwrap_err()
            .is_malformed());
    }

    #[test]
    fn delete_many_binds_uuid_array() {
        let schema = schema();
        let stmt = Table::new("users", &schema)
            .delete_many(&[ID.to_string()])
            .unwrap();
        assert_eq!(
            stmt.text,
            "DELETE FROM users WHERE _id = ANY(CAST($1 AS UUID[]))"
        );
        assert_eq!(stmt.params.values, vec![json!([ID])]);
    }

    #[test]
    fn count_statement() {
        let schema = schema();
        let stmt = Table::new("users", &schema).count(&Predicate::All).unwrap();
        assert_eq!(
            stmt.text,
            "SELECT to_jsonb(r) FROM (SELECT COUNT(*) AS count FROM users) r"
        );
        assert!(stmt.params.values.is_empty());
    }

    #[test]
    fn placeholder_count_mismatch() {
        assert!(renumber_placeholders("a = $1 AND b = $2", 0, 1)
            .unwrap_err()
            .is_malformed());
        assert!(renumber_placeholders("a = $1", 0, 2)
            .unwrap_err()
            .is_malformed());
        assert!(renumber_placeholders("a = $0", 0, 1)
            .unwrap_err()
            .is_malformed());
    }

    #[test]
    fn placeholders_inside_literals_untouched() {
        let text = renumber_placeholders("price = $1 AND label <> 'costs $2'", 3, 1).unwrap();
        assert_eq!(text, "price = $4 AND label <> 'costs $2'");
    }

    #[test]
    fn repeated_placeholder_allowed() {
        let text = renumber_placeholders("a = $1 OR b = $1", 1, 1).unwrap();
        assert_eq!(text, "a = $2 OR b = $2");
    }

    #[test]
    fn casts_only_listed_placeholders() {
        let casts = HashMap::from([(2, "UUID".to_string()), (10, "DATE".to_string())]);
        let text = cast_placeholders("a = $1 AND _id = $2 AND b = '$2' AND born > $10", &casts).unwrap();
        assert_eq!(
            text,
            "a = $1 AND _id = CAST($2 AS UUID) AND b = '$2' AND born > CAST($10 AS DATE)"
        );
    }

    #[test]
    fn json_literal_escapes_quotes() {
        assert_eq!(
            json_literal(&json!({ "name": "d'Arc" })),
            r#"'{"name":"d''Arc"}'::jsonb"#
        );
    }
}
