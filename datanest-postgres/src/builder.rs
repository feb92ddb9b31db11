//! Fluent select chain
//!
//! `model.select(&["username"]).where_("isactive = $1", vec![json!(true)])
//! .order("createdat", SortOrder::Desc).limit(10).offset(0).exec()`
//!
//! Each call records a clause; the clauses are joined into one statement
//! when the chain is executed. `exec` takes the builder by value, so a
//! chain runs at most once. The first invalid call poisons the chain and
//! its error is returned from `exec`.

use datanest_core::{Record, Result, SortOrder, StoreError};
use serde_json::Value;

use crate::model::PgModel;
use crate::query::{renumber_placeholders, select_records, Params, Statement};

#[must_use = "a select chain does nothing until exec() is called"]
#[derive(Debug)]
pub struct Select<'m> {
    model: &'m PgModel,
    columns: Vec<String>,
    filters: Vec<String>,
    order: Vec<String>,
    limit: Option<u64>,
    offset: Option<u64>,
    params: Params,
    error: Option<StoreError>,
}

impl<'m> Select<'m> {
    pub(crate) fn new(model: &'m PgModel, columns: &[&str]) -> Self {
        let mut select = Self {
            model,
            columns: Vec::with_capacity(columns.len()),
            filters: Vec::new(),
            order: Vec::new(),
            limit: None,
            offset: None,
            params: Params::default(),
            error: None,
        };
        for column in columns.iter().filter(|c| **c != "*") {
            match model.table().cast(column) {
                Ok(_) => select.columns.push((*column).to_string()),
                Err(e) => select.fail(e),
            }
        }
        select
    }

    /// Add a raw condition. Repeated calls are ANDed together. Each param
    /// takes the type the server infers for its placeholder.
    pub fn where_(mut self, expr: &str, params: Vec<Value>) -> Self {
        if self.error.is_some() {
            return self;
        }
        match renumber_placeholders(expr, self.params.len(), params.len()) {
            Ok(text) => {
                self.filters.push(format!("({})", text));
                self.params.extend_inferred(params);
            }
            Err(e) => self.fail(e),
        }
        self
    }

    pub fn order(mut self, column: &str, direction: SortOrder) -> Self {
        match self.model.table().cast(column) {
            Ok(_) => self.order.push(format!("{} {}", column, direction.as_sql())),
            Err(e) => self.fail(e),
        }
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// The statement `exec` would run
    pub fn to_statement(&self) -> Result<Statement> {
        match &self.error {
            Some(StoreError::MalformedQuery { reason }) => {
                return Err(StoreError::malformed(reason.clone()))
            }
            Some(other) => return Err(StoreError::malformed(other.to_string())),
            None => {}
        }

        let columns = if self.columns.is_empty() {
            "*".to_string()
        } else {
            self.columns.join(", ")
        };
        let mut fragments = vec![format!("SELECT {} FROM {}", columns, self.model.name())];
        if !self.filters.is_empty() {
            fragments.push(format!("WHERE {}", self.filters.join(" AND ")));
        }
        if !self.order.is_empty() {
            fragments.push(format!("ORDER BY {}", self.order.join(", ")));
        }
        if let Some(limit) = self.limit {
            fragments.push(format!("LIMIT {}", limit));
        }
        if let Some(offset) = self.offset {
            fragments.push(format!("OFFSET {}", offset));
        }

        Ok(Statement::with_params(
            select_records(&fragments.join(" ")),
            self.params.clone(),
        ))
    }

    pub async fn exec(mut self) -> Result<Vec<Record>> {
        if let Some(e) = self.error.take() {
            return Err(e);
        }
        let stmt = self.to_statement()?;
        let model = self.model;
        model
            .handle()
            .fetch_records(&stmt)
            .await
            .map_err(|e| StoreError::operation(format!("select from {}", model.name()), e))
    }

    fn fail(&mut self, error: StoreError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use datanest_core::{FieldSpec, FieldType, SchemaDef};
    use serde_json::json;

    use crate::connect::PgHandle;

    fn model() -> PgModel {
        // never connects: the pool is lazy and the tests only build statements
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://postgres@localhost:5432/postgres")
            .unwrap();
        let def = SchemaDef::new()
            .field("username", FieldSpec::string().required())
            .field("isactive", FieldSpec::new(FieldType::Boolean).default_value(true));
        PgModel::attach(PgHandle::Pool(pool), "users", &def).unwrap()
    }

    #[tokio::test]
    async fn joins_clauses_in_order() {
        let model = model();
        let stmt = model
            .select(&["username", "isactive"])
            .where_("isactive = $1", vec![json!(true)])
            .where_("username <> $1", vec![json!("root")])
            .order("createdat", SortOrder::Desc)
            .limit(10)
            .offset(5)
            .to_statement()
            .unwrap();

        assert_eq!(
            stmt.text,
            "SELECT to_jsonb(r) FROM (SELECT username, isactive FROM users \
             WHERE (isactive = $1) AND (username <> $2) \
             ORDER BY createdat DESC LIMIT 10 OFFSET 5) r"
        );
        assert_eq!(stmt.params.values, vec![json!(true), json!("root")]);
        assert_eq!(stmt.params.inferred(), vec![1, 2]);
    }

    #[tokio::test]
    async fn star_and_empty_select_everything() {
        let model = model();
        let star = model.select(&["*"]).to_statement().unwrap();
        let empty = model.select(&[]).to_statement().unwrap();
        assert_eq!(star, empty);
        assert_eq!(star.text, "SELECT to_jsonb(r) FROM (SELECT * FROM users) r");
    }

    #[tokio::test]
    async fn unknown_column_poisons_chain() {
        let model = model();
        let err = model
            .select(&["username", "password; DROP TABLE users"])
            .limit(1)
            .to_statement()
            .unwrap_err();
        assert!(err.is_malformed());

        let err = model
            .select(&[])
            .order("nope", SortOrder::Asc)
            .exec()
            .await
            .unwrap_err();
        assert!(err.is_malformed());
    }

    #[tokio::test]
    async fn placeholder_mismatch_is_reported_by_exec() {
        let model = model();
        let err = model
            .select(&[])
            .where_("username = $2", vec![json!("alice")])
            .exec()
            .await
            .unwrap_err();
        assert!(err.is_malformed());
    }
}
