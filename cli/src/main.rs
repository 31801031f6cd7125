use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use kusina::cache::{load_json, save_json};
use kusina::supabase::{SessionTokens, SupabaseClient, SupabaseConfig};
use kusina::{
    AuthError, CacheError, ConfigError, Credentials, ErrorCode, FileStore, KeyValueStore, NavigationGuard, NavigationOutcome,
    NavigationTarget, Navigator, ProfilePatch, RouteTable, RouteTableError, SessionError, SessionStore, UserCache,
    UserIdentity,
};
use serde_json::{Value, json};
use tracing::warn;

/// Cache key for the provider session tokens, next to `userData`.
const SESSION_KEY: &str = "session";

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("invalid route table: {0}")]
    Routes(#[from] RouteTableError),
    #[error("local cache error: {0}")]
    Cache(#[from] CacheError),
    #[error("could not read {path}: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("missing password; pass --password or set KUSINA_PASSWORD")]
    MissingPassword,
    #[error("nothing to update; pass --display-name")]
    EmptyPatch,
}

impl ErrorCode for CliError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Config(e) => e.error_code(),
            Self::Auth(e) => e.error_code(),
            Self::Session(e) => e.error_code(),
            Self::Routes(e) => e.error_code(),
            Self::Cache(e) => e.error_code(),
            Self::ReadFile { .. } => "E_READ_FILE",
            Self::InvalidJson(_) => "E_INVALID_JSON",
            Self::MissingPassword => "E_MISSING_PASSWORD",
            Self::EmptyPatch => "E_EMPTY_PATCH",
        }
    }

    fn retryable(&self) -> bool {
        match self {
            Self::Auth(e) => e.retryable(),
            Self::Session(e) => e.retryable(),
            _ => false,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "kusina", about = "Kusina session and route-guard CLI")]
struct Cli {
    /// Directory holding the cached identity and session tokens.
    #[arg(long, env = "KUSINA_CACHE_DIR", default_value = ".kusina")]
    cache_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

/// Commands answered from local state alone, plus the provider-backed rest.
#[derive(Subcommand, Debug)]
enum Command {
    /// Print the cached identity without contacting the provider.
    Whoami,
    /// List the route table.
    Routes,
    #[command(flatten)]
    Online(OnlineCommand),
}

#[derive(Subcommand, Debug)]
enum OnlineCommand {
    /// Sign in with email and password.
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "KUSINA_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    /// Revoke the session and clear the local cache.
    Logout,
    /// Re-fetch the identity from the provider.
    Refresh,
    /// Update profile fields.
    Profile {
        #[arg(long)]
        display_name: Option<String>,
    },
    /// Upload a PNG avatar and point the profile at it.
    Avatar { file: PathBuf },
    /// Run the navigation guard for a path (or route name with --by-name).
    Navigate {
        target: String,
        #[arg(long)]
        by_name: bool,
    },
}

// =============================================================================
// APP WIRING
// =============================================================================

struct App {
    client: Arc<SupabaseClient>,
    session: Arc<SessionStore>,
    store: FileStore,
}

impl App {
    fn open(cache_dir: PathBuf) -> Result<Self, CliError> {
        let config = SupabaseConfig::from_env()?;
        let client = Arc::new(SupabaseClient::new(config)?);
        let store = FileStore::new(cache_dir);
        client.set_tokens(load_json::<SessionTokens>(&store, SESSION_KEY)?);

        let cache = UserCache::new(store.clone());
        let session = Arc::new(SessionStore::new(client.clone(), client.clone(), cache));
        Ok(Self { client, session, store })
    }

    fn navigator(&self) -> Result<Navigator, CliError> {
        let table = Arc::new(RouteTable::kusina()?);
        let guard = NavigationGuard::new(table, self.client.clone(), self.session.clone());
        Ok(Navigator::new(guard))
    }

    /// Persist whatever tokens the client holds now.
    fn save_tokens(&self) -> Result<(), CliError> {
        match self.client.tokens() {
            Some(tokens) => save_json(&self.store, SESSION_KEY, &tokens)?,
            None => self.store.remove_item(SESSION_KEY)?,
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", error_json(&e));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Command::Routes => run_routes(),
        Command::Whoami => run_whoami(cli.cache_dir),
        Command::Online(command) => {
            let app = App::open(cli.cache_dir)?;
            let result = run_online(&app, command).await;
            finish(result, app.save_tokens())
        }
    }
}

/// The command's own error wins over a failure to persist tokens afterwards.
fn finish(result: Result<(), CliError>, saved: Result<(), CliError>) -> Result<(), CliError> {
    match (result, saved) {
        (Err(e), Err(save)) => {
            warn!(error = %save, "could not persist session tokens");
            Err(e)
        }
        (result, saved) => result.and(saved),
    }
}

async fn run_online(app: &App, command: OnlineCommand) -> Result<(), CliError> {
    match command {
        OnlineCommand::Login { email, password } => {
            let password = password.ok_or(CliError::MissingPassword)?;
            let user = app.session.login(&Credentials::new(email, password)).await?;
            print_json(&identity_json(&user))
        }
        OnlineCommand::Logout => {
            app.session.sign_out().await?;
            print_json(&json!({ "signed_out": true }))
        }
        OnlineCommand::Refresh => {
            let user = app.session.refresh().await?;
            print_json(&identity_json(&user))
        }
        OnlineCommand::Profile { display_name } => {
            let patch = ProfilePatch { display_name, image_url: None };
            if patch.is_empty() {
                return Err(CliError::EmptyPatch);
            }
            let user = app.session.update_profile(&patch).await?;
            print_json(&identity_json(&user))
        }
        OnlineCommand::Avatar { file } => {
            let bytes = std::fs::read(&file).map_err(|source| CliError::ReadFile { path: file.clone(), source })?;
            let url = app.session.upload_avatar(bytes).await?;
            print_json(&json!({ "image_url": url }))
        }
        OnlineCommand::Navigate { target, by_name } => {
            let navigator = app.navigator()?;
            let outcome = navigator.navigate(navigation_target(target, by_name)).await;
            print_json(&outcome_json(&outcome))
        }
    }
}

fn run_routes() -> Result<(), CliError> {
    let table = RouteTable::kusina()?;
    let routes: Vec<Value> = table
        .routes()
        .iter()
        .map(|r| {
            json!({
                "name": r.name,
                "path": r.path,
                "view": format!("{:?}", r.view),
                "requires_auth": r.meta.requires_auth,
                "requires_admin": r.meta.requires_admin,
            })
        })
        .collect();
    print_json(&Value::Array(routes))
}

fn run_whoami(cache_dir: PathBuf) -> Result<(), CliError> {
    let cache = UserCache::new(FileStore::new(cache_dir));
    match cache.load_cached_user() {
        Some(user) => print_json(&identity_json(&user)),
        None => print_json(&Value::Null),
    }
}

// =============================================================================
// OUTPUT
// =============================================================================

fn navigation_target(raw: String, by_name: bool) -> NavigationTarget {
    if by_name { NavigationTarget::Name(raw) } else { NavigationTarget::Path(raw) }
}

fn identity_json(user: &UserIdentity) -> Value {
    json!({
        "id": user.id,
        "email": user.email,
        "display_name": user.display_name,
        "image_url": user.image_url,
        "role": user.role().as_str(),
    })
}

fn outcome_json(outcome: &NavigationOutcome) -> Value {
    match outcome {
        NavigationOutcome::Committed(route) => json!({
            "status": "allowed",
            "route": route.name,
            "path": route.path,
        }),
        NavigationOutcome::Redirected { requested, to, reason } => json!({
            "status": "redirected",
            "requested": requested.name,
            "route": to.name,
            "path": to.path,
            "reason": reason.as_str(),
        }),
        NavigationOutcome::Superseded => json!({ "status": "superseded" }),
    }
}

fn error_json(err: &CliError) -> Value {
    json!({
        "error": err.error_code(),
        "message": err.to_string(),
        "retryable": err.retryable(),
    })
}

fn print_json(value: &Value) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}

#[cfg(test)]
#[path = "main_test.rs"]
mod tests;
