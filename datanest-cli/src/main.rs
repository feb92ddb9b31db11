//! datanest CLI - administrative access to the configured data store
//!
//! - `ping` checks both connection handles
//! - `init` declares the users table/collection
//! - `user ...` runs CRUD against users through the backend-agnostic model

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use datanest::{
    public_view, Backend, ConnectionKind, FindOptions, NewUser, Predicate, Record, SortOrder,
    UserModel,
};
use serde_json::Value;
use tracing::info;

mod config;
mod tracing_setup;

#[derive(Parser, Debug)]
#[command(
    name = "datanest",
    author,
    version,
    about = "Schema-validated CRUD against MongoDB or PostgreSQL"
)]
struct Cli {
    /// Debug logging (generated statements included)
    #[arg(long, global = true)]
    debug: bool,

    /// TOML config file (default: ~/.datanest/config.toml)
    #[arg(long, global = true, env = "DATANEST_CONFIG")]
    config: Option<PathBuf>,

    /// Which handle to run on
    #[arg(long, global = true, value_enum, default_value_t = Handle::Pool)]
    handle: Handle,

    #[command(subcommand)]
    command: Commands,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum Handle {
    Pool,
    Single,
}

impl From<Handle> for ConnectionKind {
    fn from(handle: Handle) -> Self {
        match handle {
            Handle::Pool => ConnectionKind::Pool,
            Handle::Single => ConnectionKind::Single,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create both connection handles and report
    Ping,
    /// Declare the users model (creates the table if needed)
    Init,
    /// User records
    User {
        #[command(subcommand)]
        command: UserCommand,
    },
}

#[derive(Subcommand, Debug)]
enum UserCommand {
    /// Register a user
    Add {
        #[arg(long)]
        username: String,
        /// Stored as given
        #[arg(long)]
        password: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        verification_code: Option<String>,
    },
    /// Look a user up by username
    Find {
        username: String,
        /// Print the stored record, private fields included
        #[arg(long)]
        raw: bool,
    },
    /// Look a user up by id
    Get {
        id: String,
        #[arg(long)]
        raw: bool,
    },
    /// Page through users ordered by username
    List {
        #[arg(long, default_value_t = 20)]
        limit: u64,
        #[arg(long, default_value_t = 0)]
        skip: u64,
        #[arg(long)]
        raw: bool,
    },
    /// JSON-merge an object into the user's profile data
    Merge {
        id: String,
        /// e.g. '{"bio": "hello"}'
        json: String,
    },
    /// Delete a user by id
    Remove { id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    tracing_setup::init(&tracing_setup::TracingConfig { debug: cli.debug })?;
    config::load_dotenv();

    let data = config::load(cli.config.as_deref())?;
    let backend = Backend::from_config(&data);

    match cli.command {
        Commands::Ping => {
            backend
                .connect()
                .await
                .with_context(|| format!("Could not reach {}", data.redacted_url()))?;
            print_json(&serde_json::json!({
                "backend": backend.kind().to_string(),
                "url": data.redacted_url(),
                "status": "ok",
            }))
        }
        Commands::Init => {
            let users = UserModel::declare(&backend, cli.handle.into())
                .await
                .context("Failed to declare users")?;
            info!(name = users.model().name(), "Users model ready");
            print_json(&serde_json::json!({ "declared": users.model().name() }))
        }
        Commands::User { command } => {
            let users = UserModel::declare(&backend, cli.handle.into())
                .await
                .context("Failed to declare users")?;
            run_user(&users, command).await
        }
    }
}

async fn run_user(users: &UserModel, command: UserCommand) -> Result<()> {
    match command {
        UserCommand::Add {
            username,
            password,
            email,
            verification_code,
        } => {
            let stored = users
                .register(NewUser {
                    username,
                    password,
                    email,
                    verificationcode: verification_code,
                })
                .await
                .context("Failed to add user")?;
            print_record(&stored, false)
        }
        UserCommand::Find { username, raw } => {
            match users.by_username(&username).await? {
                Some(user) => print_record(&user, raw),
                None => bail!("No user named '{}'", username),
            }
        }
        UserCommand::Get { id, raw } => match users.model().find_by_id(&id).await? {
            Some(user) => print_record(&user, raw),
            None => bail!("No user with id {}", id),
        },
        UserCommand::List { limit, skip, raw } => {
            let opts = FindOptions::new()
                .sort_by("username", SortOrder::Asc)
                .limit(limit)
                .skip(skip);
            let listing = users.model().list(&Predicate::All, &opts).await?;
            let list: Vec<Value> = listing
                .list
                .iter()
                .map(|user| view(user, raw))
                .collect();
            print_json(&serde_json::json!({ "list": list, "count": listing.count }))
        }
        UserCommand::Merge { id, json } => {
            let data = match serde_json::from_str::<Value>(&json).context("Invalid JSON")? {
                Value::Object(map) => map,
                _ => bail!("Profile data must be a JSON object"),
            };
            match users.merge_profile(&id, data).await? {
                Some(user) => print_record(&user, false),
                None => bail!("No user with id {}", id),
            }
        }
        UserCommand::Remove { id } => {
            let removed = users.model().remove_by_id(&id).await?;
            print_json(&serde_json::json!({ "removed": removed }))
        }
    }
}

fn view(user: &Record, raw: bool) -> Value {
    if raw {
        Value::Object(user.clone())
    } else {
        Value::Object(public_view(user))
    }
}

fn print_record(user: &Record, raw: bool) -> Result<()> {
    print_json(&view(user, raw))
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
