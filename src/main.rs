use std::collections::BTreeMap;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use crm::access::{loader, AccessPolicy, Actor};
use crm::edit::{EditSessionStore, Editor, SubmitOutcome, Submission};
use crm::fields::actions::SubmittedValue;
use crm::resource::{ResourceId, StagedChanges, UserRole, VariantKind};
use crm::{jobs, settings, storage, web};
use migration::MigratorTrait;
use miette::{IntoDiagnostic, Result};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "crm", version, about = "Resource CRM server")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the web server (default)
    Serve,
    /// Create an administrator account
    CreateAdmin {
        #[arg(long)]
        username: String,
        #[arg(long, env = "CRM_ADMIN_PASSWORD")]
        password: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // logging
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();

    // load settings
    let settings = settings::Settings::load(&cli.config)?;
    tracing::info!(?settings, "Loaded configuration");

    // access policy, failing fast on bad overrides
    let policy = match &settings.access.policies_dir {
        Some(dir) => loader::load_policies(dir)?,
        None => AccessPolicy::from_schema(),
    };

    // init storage (database)
    let db = storage::init(&settings.database).await?;
    migration::Migrator::up(&db, None).await.into_diagnostic()?;

    let editor = Editor {
        db: db.clone(),
        policy: Arc::new(policy),
        sessions: Arc::new(EditSessionStore::new(&settings.edit_sessions)),
        default_currency: settings.currency.default_code.clone(),
    };

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            let _scheduler = jobs::init_scheduler(db.clone(), editor.sessions.clone()).await?;
            web::serve(settings, db, editor).await?;
        }
        Command::CreateAdmin { username, password } => {
            create_admin(&editor, &username, &password).await?;
        }
    }
    Ok(())
}

/// Goes through the regular create session so every user check applies.
async fn create_admin(editor: &Editor, username: &str, password: &str) -> Result<()> {
    let system = Actor {
        id: ResourceId(0),
        username: "system".to_string(),
        role: UserRole::Administrator,
    };

    let session = editor
        .start_create(&system, VariantKind::User, StagedChanges::default(), None)
        .await?;

    let text = |v: &str| SubmittedValue::Text(v.to_string());
    let values = BTreeMap::from([
        ("username".to_string(), text(username)),
        ("password".to_string(), text(password)),
        ("password.confirmation".to_string(), text(password)),
        ("role".to_string(), text(UserRole::Administrator.as_str())),
    ]);

    let outcome = editor
        .submit(
            &system,
            &session.token,
            Submission {
                values,
                ..Default::default()
            },
        )
        .await?;

    match outcome {
        SubmitOutcome::Committed { id, .. } => {
            tracing::info!(user_id = %id, username, "Created administrator");
            Ok(())
        }
        _ => {
            let view = editor.view(&system, &session.token).await?;
            let messages: Vec<String> = view
                .messages
                .iter()
                .chain(view.fields.iter().flat_map(|f| f.messages.iter()))
                .map(|m| m.message.clone())
                .collect();
            Err(miette::miette!(
                "Could not create administrator: {}",
                messages.join(" ")
            ))
        }
    }
}
