//! archzero: command-line front end for the ArchZero architecture catalog
//!
//! Thin UI layer over `archzero-core`: every command goes through the session
//! store, the access guard and the relationship service, and only formats the
//! results.
//!
//! # Subcommands
//! - `login --email <e> [--password <p>]`  authenticate and persist the session
//! - `logout`                               clear the local session
//! - `whoami [--json]`                      show the current session
//! - `rel list|create|update|delete`        manage card relationships
//! - `cards available <card-id>`            cards a relationship could point to
//! - `import status <job-id> [--watch]`     follow a server-side import job

use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use archzero_core::models::{
    CreateRelationshipRequest, ImportJob, Relationship, RelationshipType, Role,
    UpdateRelationshipRequest,
};
use archzero_core::{
    ArchZeroClient, ArchZeroConfig, GuardDecision, RelationshipApi, RequestScope, SessionSource,
};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use serde_json::{Map, Value};
use tracing_subscriber::{fmt, EnvFilter};

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(
    name = "archzero",
    version,
    about = "ArchZero architecture catalog client"
)]
struct Cli {
    /// Config file (TOML). Missing file means built-in defaults.
    #[arg(short, long, env = "ARCHZERO_CONFIG", default_value = "archzero.toml")]
    config: String,

    /// API base URL (overrides the config file)
    #[arg(long, env = "ARCHZERO_API_URL")]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Log in and persist the session
    Login {
        #[arg(long)]
        email: String,

        /// Password (falls back to ARCHZERO_PASSWORD)
        #[arg(long, env = "ARCHZERO_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Clear the local session
    Logout,

    /// Show who is logged in
    Whoami {
        #[arg(long)]
        json: bool,
    },

    /// Manage relationships between cards
    #[command(subcommand)]
    Rel(RelCommand),

    /// Card queries
    #[command(subcommand)]
    Cards(CardsCommand),

    /// Import job status
    #[command(subcommand)]
    Import(ImportCommand),
}

#[derive(Debug, Subcommand)]
enum RelCommand {
    /// List relationships, optionally only those touching one card
    List {
        #[arg(long)]
        card: Option<String>,

        #[arg(long)]
        json: bool,
    },

    /// Create a relationship
    Create {
        #[arg(long)]
        from: String,

        #[arg(long)]
        to: String,

        /// depends_on | implements | similar_to | conflicts_with
        #[arg(long = "type")]
        relationship_type: String,

        #[command(flatten)]
        fields: EdgeFields,

        #[arg(long)]
        json: bool,
    },

    /// Patch a relationship (endpoints cannot change)
    Update {
        id: String,

        #[arg(long = "type")]
        relationship_type: Option<String>,

        /// Make the relationship open-ended again
        #[arg(long, conflicts_with = "valid_to")]
        clear_valid_to: bool,

        #[command(flatten)]
        fields: EdgeFields,

        #[arg(long)]
        json: bool,
    },

    /// Delete a relationship
    Delete { id: String },
}

/// Optional edge fields shared by `create` and `update`.
#[derive(Debug, Args)]
struct EdgeFields {
    /// RFC 3339 timestamp or YYYY-MM-DD
    #[arg(long)]
    valid_from: Option<String>,

    /// RFC 3339 timestamp or YYYY-MM-DD
    #[arg(long)]
    valid_to: Option<String>,

    #[arg(long)]
    confidence: Option<f64>,

    /// Attribute as key=value (repeatable); JSON values are parsed
    #[arg(long = "attr")]
    attributes: Vec<String>,
}

#[derive(Debug, Subcommand)]
enum CardsCommand {
    /// Cards other than <card-id>, for picking a relationship target
    Available {
        card_id: String,

        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Subcommand)]
enum ImportCommand {
    /// Show an import job; with --watch, poll until it finishes
    Status {
        job_id: String,

        #[arg(long)]
        watch: bool,

        #[arg(long, default_value_t = 2000)]
        interval_ms: u64,

        #[arg(long)]
        json: bool,
    },
}

/// Roles allowed to change relationships. Only enforced when
/// `guard.enforce_roles` is set.
const EDITOR_ROLES: [Role; 3] = [Role::Admin, Role::Architect, Role::Editor];

// ============================================================================
// Parsing helpers
// ============================================================================

fn parse_timestamp(s: &str) -> anyhow::Result<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Ok(ts.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .with_context(|| format!("invalid timestamp {s:?} (expected RFC 3339 or YYYY-MM-DD)"))?;
    Ok(date.and_time(chrono::NaiveTime::MIN).and_utc())
}

fn parse_attributes(pairs: &[String]) -> anyhow::Result<Option<Map<String, Value>>> {
    if pairs.is_empty() {
        return Ok(None);
    }
    let mut attributes = Map::new();
    for pair in pairs {
        let (key, raw) = pair
            .split_once('=')
            .ok_or_else(|| anyhow!("invalid attribute {pair:?} (expected key=value)"))?;
        let key = key.trim();
        if key.is_empty() {
            bail!("invalid attribute {pair:?}: empty key");
        }
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        attributes.insert(key.to_string(), value);
    }
    Ok(Some(attributes))
}

fn build_create_request(
    from: String,
    to: String,
    relationship_type: &str,
    fields: &EdgeFields,
) -> anyhow::Result<CreateRelationshipRequest> {
    let relationship_type: RelationshipType = relationship_type.parse()?;
    let mut request = CreateRelationshipRequest::new(from, to, relationship_type);
    request.valid_from = fields.valid_from.as_deref().map(parse_timestamp).transpose()?;
    request.valid_to = fields.valid_to.as_deref().map(parse_timestamp).transpose()?;
    request.attributes = parse_attributes(&fields.attributes)?;
    request.confidence = fields.confidence;
    Ok(request)
}

fn build_update_request(
    relationship_type: Option<&str>,
    clear_valid_to: bool,
    fields: &EdgeFields,
) -> anyhow::Result<UpdateRelationshipRequest> {
    let valid_to = if clear_valid_to {
        Some(None)
    } else {
        fields
            .valid_to
            .as_deref()
            .map(parse_timestamp)
            .transpose()?
            .map(Some)
    };

    Ok(UpdateRelationshipRequest {
        relationship_type: relationship_type.map(str::parse).transpose()?,
        valid_from: fields.valid_from.as_deref().map(parse_timestamp).transpose()?,
        valid_to,
        attributes: parse_attributes(&fields.attributes)?,
        confidence: fields.confidence,
    })
}

// ============================================================================
// Output
// ============================================================================

fn format_relationship(rel: &Relationship) -> String {
    let window = match rel.valid_to {
        Some(to) => format!("{} .. {}", rel.valid_from.format("%Y-%m-%d"), to.format("%Y-%m-%d")),
        None => format!("{} .. open", rel.valid_from.format("%Y-%m-%d")),
    };
    let confidence = rel
        .confidence
        .map(|c| format!("  confidence={c:.2}"))
        .unwrap_or_default();
    format!(
        "{}  {} -[{}]-> {}  [{}]{}",
        rel.id, rel.from_card_id, rel.relationship_type, rel.to_card_id, window, confidence
    )
}

fn format_import_job(job: &ImportJob) -> String {
    format!(
        "{}  {:?}  {}/{} rows ({:.0}%)  ok={} failed={} warnings={}",
        job.id,
        job.status,
        job.processed_rows,
        job.total_rows,
        job.progress() * 100.0,
        job.successful_rows,
        job.failed_rows,
        job.warnings().count()
    )
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// ============================================================================
// Commands
// ============================================================================

/// Gate a protected command the way a protected view is gated.
fn require_access(client: &ArchZeroClient, allowed_roles: &[Role]) -> anyhow::Result<()> {
    match client
        .guard(allowed_roles.iter().cloned())
        .check(&client.session)
    {
        GuardDecision::Render => Ok(()),
        GuardDecision::RedirectToLogin => bail!("not logged in; run `archzero login` first"),
        GuardDecision::RedirectToUnauthorized => {
            let role = client
                .session
                .role()
                .map(|r| r.to_string())
                .unwrap_or_else(|| "none".to_string());
            bail!("role {role} is not allowed to run this command")
        }
    }
}

async fn run(command: Commands, client: &ArchZeroClient, scope: &RequestScope) -> anyhow::Result<()> {
    match command {
        Commands::Login { email, password } => {
            let user = client.session.login_within(scope, &email, &password).await?;
            println!("Logged in as {} ({})", user.email, user.role);
        }
        Commands::Logout => {
            client.session.logout()?;
            println!("Logged out");
        }
        Commands::Whoami { json } => {
            let session = client.session.snapshot();
            if json {
                // Never print the token itself
                print_json(&serde_json::json!({
                    "isAuthenticated": session.is_authenticated,
                    "user": session.user,
                }))?;
            } else {
                match session.user.filter(|_| session.is_authenticated) {
                    Some(user) => println!("{} ({}, role {})", user.email, user.id, user.role),
                    None => println!("Not logged in"),
                }
            }
        }
        Commands::Rel(rel) => run_rel(rel, client).await?,
        Commands::Cards(CardsCommand::Available { card_id, json }) => {
            require_access(client, &[])?;
            let cards = client.relationships.get_available_cards(&card_id).await?;
            if json {
                print_json(&cards)?;
            } else if cards.is_empty() {
                eprintln!("No other cards available");
            } else {
                for card in &cards {
                    println!("{}  {}  ({})", card.id, card.name, card.card_type);
                }
            }
        }
        Commands::Import(ImportCommand::Status {
            job_id,
            watch,
            interval_ms,
            json,
        }) => {
            require_access(client, &[])?;
            let job = if watch {
                client
                    .imports
                    .poll(&job_id, Duration::from_millis(interval_ms), scope)
                    .await?
            } else {
                client.imports.get(&job_id).await?
            };
            if json {
                print_json(&job)?;
            } else {
                println!("{}", format_import_job(&job));
                for e in &job.errors {
                    let field = e.field.as_deref().unwrap_or("-");
                    println!("  row {:>5}  {:<16} {:?}: {}", e.row, field, e.severity, e.message);
                }
            }
        }
    }
    Ok(())
}

async fn run_rel(command: RelCommand, client: &ArchZeroClient) -> anyhow::Result<()> {
    match command {
        RelCommand::List { card, json } => {
            require_access(client, &[])?;
            let relationships = match card {
                Some(card_id) => client.relationships.get_for_card(&card_id).await?,
                None => client.relationships.get_all().await?,
            };
            if json {
                print_json(&relationships)?;
            } else if relationships.is_empty() {
                eprintln!("No relationships found");
            } else {
                for rel in &relationships {
                    println!("{}", format_relationship(rel));
                }
            }
        }
        RelCommand::Create {
            from,
            to,
            relationship_type,
            fields,
            json,
        } => {
            require_access(client, &EDITOR_ROLES)?;
            let request = build_create_request(from, to, &relationship_type, &fields)?;
            let created = client.relationships.create(&request).await?;
            if json {
                print_json(&created)?;
            } else {
                println!("Created {}", format_relationship(&created));
            }
        }
        RelCommand::Update {
            id,
            relationship_type,
            clear_valid_to,
            fields,
            json,
        } => {
            require_access(client, &EDITOR_ROLES)?;
            let patch = build_update_request(relationship_type.as_deref(), clear_valid_to, &fields)?;
            if patch.is_empty() {
                bail!("nothing to update; pass at least one field");
            }
            let updated = client.relationships.update(&id, &patch).await?;
            if json {
                print_json(&updated)?;
            } else {
                println!("Updated {}", format_relationship(&updated));
            }
        }
        RelCommand::Delete { id } => {
            require_access(client, &EDITOR_ROLES)?;
            client.relationships.delete(&id).await?;
            println!("Deleted {id}");
        }
    }
    Ok(())
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    // Load .env file if present (dev convenience; production uses real env vars)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let mut config = match ArchZeroConfig::load(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("archzero: failed to load config from {}: {}", cli.config, e);
            std::process::exit(1);
        }
    };
    if let Some(api_url) = cli.api_url {
        config.api.base_url = api_url;
    }

    // Logs go to stderr so --json output stays clean
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let client = match ArchZeroClient::from_config(config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("archzero: {}", e);
            std::process::exit(1);
        }
    };

    // Ctrl+C cancels whatever request is in flight
    let scope = RequestScope::new();
    let ctrl_c_scope = scope.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, cancelling");
            ctrl_c_scope.cancel();
        }
    });

    match scope.run(run(cli.command, &client, &scope)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            eprintln!("archzero: {}", e);
            std::process::exit(1);
        }
        Err(_) => {
            eprintln!("archzero: cancelled");
            std::process::exit(130);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
