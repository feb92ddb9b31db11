//! User accounts
//!
//! Passwords are stored as given; hashing belongs to whoever handles login.

use datanest_core::{
    into_record, Accepts, ConnectionKind, FieldSpec, FieldType, FindOptions, Predicate, Record,
    Result, SchemaDef, StoreError,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Backend, Model};

/// Table / collection name
pub const USERS: &str = "users";

/// Fields never shown outside the data layer. Dotted entries reach into
/// nested objects.
const PRIVATE_FIELDS: &[&str] = &[
    "password",
    "data",
    "createdat",
    "createdAt",
    "isactive",
    "isActive",
    "isVerified",
    "verificationcode",
    "verificationCode",
];

pub fn user_schema() -> SchemaDef {
    SchemaDef::new()
        .field("username", FieldSpec::string().required())
        .field("password", FieldSpec::string().required())
        .field("email", FieldSpec::string().accepts(Accepts::Email).required())
        .field("verificationcode", FieldSpec::string())
        .field("isactive", FieldSpec::new(FieldType::Boolean).default_value(true))
        .field("data", FieldSpec::new(FieldType::SmartObject))
}

/// Registration payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub password: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verificationcode: Option<String>,
}

#[derive(Debug)]
pub struct UserModel {
    model: Model,
}

impl UserModel {
    pub async fn declare(backend: &Backend, kind: ConnectionKind) -> Result<Self> {
        let model = backend.declare(kind, USERS, &user_schema()).await?;
        Ok(Self { model })
    }

    pub fn new(model: Model) -> Self {
        Self { model }
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub async fn register(&self, user: NewUser) -> Result<Record> {
        let value = serde_json::to_value(&user)
            .map_err(|e| StoreError::operation("encode user", e))?;
        self.model.add(into_record(value)?).await
    }

    pub async fn by_username(&self, username: &str) -> Result<Option<Record>> {
        self.model
            .find_one(&Predicate::eq("username", username), &FindOptions::new())
            .await
    }

    pub async fn by_email(&self, email: &str) -> Result<Option<Record>> {
        self.model
            .find_one(&Predicate::eq("email", email), &FindOptions::new())
            .await
    }

    /// Merge `data` into the stored profile object, keeping keys not named.
    pub async fn merge_profile(&self, id: &str, data: Record) -> Result<Option<Record>> {
        let mut update = Record::new();
        update.insert("data".to_string(), Value::Object(data));
        self.model.update_by_id(id, update).await
    }
}

/// Outward view of a user: profile data lifted to the top level, private
/// fields dropped.
pub fn public_view(record: &Record) -> Record {
    let mut view = record.clone();
    if let Some(Value::Object(data)) = record.get("data") {
        for (key, value) in data {
            view.insert(key.clone(), value.clone());
        }
    }
    for path in PRIVATE_FIELDS {
        remove_path(&mut view, path);
    }
    view
}

fn remove_path(record: &mut Record, path: &str) {
    match path.split_once('.') {
        None => {
            record.remove(path);
        }
        Some((head, rest)) => {
            if let Some(Value::Object(inner)) = record.get_mut(head) {
                remove_path(inner, rest);
            }
        }
    }
}
