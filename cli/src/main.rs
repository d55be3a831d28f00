use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use backend::{
    AuthApi, BackendConfig, BackendError, Bookmark, ChangeFeed, ChangeListener, FileSessionStore, Hosted, Services,
    Subscription,
};
use clap::{Parser, Subcommand};
use client::{AddOutcome, Dashboard, DashboardState, GateOutcome, InitOutcome, LastRoute, SessionGate};
use tracing_subscriber::EnvFilter;

/// Pause before resubscribing after the change-feed ends.
const RESUBSCRIBE_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("not signed in; run `marks login` first")]
    SignedOut,
    #[error("could not start sign-in with provider `{0}`")]
    SignInFailed(String),
    #[error("title and url must both be non-empty")]
    EmptyInput,
    #[error("bookmark was not added; see log output")]
    AddFailed,
    #[error("bookmark {0} is still listed; see log output")]
    DeleteFailed(String),
    #[error("invalid JSON output: {0}")]
    Json(#[from] serde_json::Error),
    #[error("signal handler failed: {0}")]
    Signal(#[from] std::io::Error),
}

#[derive(Parser, Debug)]
#[command(name = "marks", about = "Personal bookmarks on a hosted backend, kept live")]
struct Cli {
    #[arg(long, env = "BACKEND_URL")]
    backend_url: String,

    #[arg(long, env = "BACKEND_ANON_KEY", hide_env_values = true)]
    anon_key: String,

    #[arg(long, env = "MARKS_SESSION_FILE")]
    session_file: Option<PathBuf>,

    /// Print bookmarks as JSON.
    #[arg(long, global = true, default_value_t = false)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Report whether a session exists.
    Status,
    /// Print the sign-in URL, or finish sign-in from the URL the provider
    /// returned to.
    Login {
        #[arg(long)]
        provider: Option<String>,
        #[arg(long)]
        callback: Option<String>,
    },
    /// List bookmarks, newest first.
    List,
    Add {
        title: String,
        url: String,
    },
    Delete {
        id: String,
    },
    Logout,
    /// Print the list on every change until interrupted.
    Watch,
}

struct CliContext {
    config: BackendConfig,
    hosted: Hosted,
    json: bool,
}

impl CliContext {
    /// Services for commands that exit before a change could arrive.
    fn one_shot(&self) -> Services {
        Services { feed: Arc::new(DetachedFeed), ..self.hosted.services.clone() }
    }

    async fn mount(&self, services: Services) -> Result<Dashboard, CliError> {
        let mut dash = Dashboard::new(services, Arc::new(LastRoute::new())).with_table(self.config.table.clone());
        match dash.initialize().await {
            InitOutcome::Ready => Ok(dash),
            InitOutcome::Redirected => Err(CliError::SignedOut),
        }
    }
}

/// Change-feed that never connects. Subscriptions are inert.
struct DetachedFeed;

#[async_trait::async_trait]
impl ChangeFeed for DetachedFeed {
    async fn subscribe(&self, table: &str, _listener: ChangeListener) -> Result<Subscription, BackendError> {
        Ok(Subscription::new(format!("detached:{table}"), || {}))
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env is normal.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("marks: {e}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let config = BackendConfig::from_parts(&cli.backend_url, &cli.anon_key)?;
    let store = cli.session_file.map_or_else(FileSessionStore::default_location, FileSessionStore::new);
    tracing::debug!(path = %store.path().display(), "session file");
    let hosted = backend::connect(config.clone(), Arc::new(store))?;
    let ctx = CliContext { config, hosted, json: cli.json };

    match cli.command {
        Command::Status => run_status(&ctx).await,
        Command::Login { provider, callback } => run_login(&ctx, provider, callback).await,
        Command::List => run_list(&ctx).await,
        Command::Add { title, url } => run_add(&ctx, title, url).await,
        Command::Delete { id } => run_delete(&ctx, id).await,
        Command::Logout => run_logout(&ctx).await,
        Command::Watch => run_watch(&ctx).await,
    }
}

// =============================================================================
// COMMANDS
// =============================================================================

async fn run_status(ctx: &CliContext) -> Result<(), CliError> {
    let gate = SessionGate::new(Arc::clone(&ctx.hosted.services.auth), Arc::new(LastRoute::new()));
    match gate.init().await {
        GateOutcome::Redirected => {
            let session = ctx.hosted.auth.session().await?;
            let who = session.map(|s| s.user.email.unwrap_or(s.user.id)).unwrap_or_default();
            println!("signed in as {who}");
        }
        GateOutcome::SignInRequired => println!("signed out"),
    }
    Ok(())
}

async fn run_login(ctx: &CliContext, provider: Option<String>, callback: Option<String>) -> Result<(), CliError> {
    if let Some(callback) = callback {
        let session = ctx.hosted.auth.complete_sign_in(&callback).await?;
        println!("signed in as {}", session.user.email.as_deref().unwrap_or(&session.user.id));
        return Ok(());
    }

    let provider = provider.unwrap_or_else(|| ctx.config.oauth_provider.clone());
    let gate = SessionGate::new(Arc::clone(&ctx.hosted.services.auth), Arc::new(LastRoute::new()))
        .with_provider(provider);
    if gate.init().await == GateOutcome::Redirected {
        println!("already signed in");
        return Ok(());
    }

    let url = gate.sign_in().await.ok_or_else(|| CliError::SignInFailed(gate.provider().to_owned()))?;
    println!("open this URL to sign in:\n  {url}");
    println!("then run: marks login --callback '<the URL your browser was sent back to>'");
    Ok(())
}

async fn run_list(ctx: &CliContext) -> Result<(), CliError> {
    let dash = ctx.mount(ctx.one_shot()).await?;
    print_state(&dash.state(), ctx.json)
}

async fn run_add(ctx: &CliContext, title: String, url: String) -> Result<(), CliError> {
    let dash = ctx.mount(ctx.one_shot()).await?;
    dash.set_title(title);
    dash.set_url(url);
    match dash.add().await {
        AddOutcome::Added(rows) => {
            for row in &rows {
                println!("added {}", render_row(row));
            }
            Ok(())
        }
        AddOutcome::Skipped => Err(CliError::EmptyInput),
        AddOutcome::Failed => Err(CliError::AddFailed),
    }
}

async fn run_delete(ctx: &CliContext, id: String) -> Result<(), CliError> {
    let dash = ctx.mount(ctx.one_shot()).await?;
    dash.delete(&id).await;
    dash.list().await;
    if dash.state().bookmarks.iter().any(|b| b.id == id) {
        return Err(CliError::DeleteFailed(id));
    }
    println!("deleted {id}");
    Ok(())
}

async fn run_logout(ctx: &CliContext) -> Result<(), CliError> {
    let mut dash = Dashboard::new(ctx.one_shot(), Arc::new(LastRoute::new()));
    dash.logout().await;
    println!("signed out");
    Ok(())
}

async fn run_watch(ctx: &CliContext) -> Result<(), CliError> {
    let mut dash = ctx.mount(ctx.hosted.services.clone()).await?;
    if !dash.is_live() {
        eprintln!("marks: change-feed unavailable; showing a snapshot only");
    }

    let mut rx = dash.watch();
    let mut shown = rx.borrow_and_update().generation;
    print_state(&dash.state(), ctx.json)?;

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = rx.borrow_and_update().clone();
                if state.generation != shown {
                    shown = state.generation;
                    print_state(&state, ctx.json)?;
                }
            }
            () = dash.feed_ended() => {
                tracing::warn!("change-feed ended; resubscribing");
                eprintln!("marks: change-feed dropped; resubscribing");
                tokio::time::sleep(RESUBSCRIBE_DELAY).await;
                if dash.initialize().await == InitOutcome::Redirected {
                    return Err(CliError::SignedOut);
                }
                if !dash.is_live() {
                    eprintln!("marks: change-feed unavailable; showing a snapshot only");
                }
            }
            signal = &mut shutdown => {
                signal?;
                break;
            }
        }
    }

    dash.teardown();
    Ok(())
}

// =============================================================================
// OUTPUT
// =============================================================================

fn print_state(state: &DashboardState, json: bool) -> Result<(), CliError> {
    if json {
        let rendered = serde_json::to_string_pretty(&state.bookmarks)?;
        println!("{rendered}");
    } else {
        println!("{}", render_rows(&state.bookmarks));
    }
    Ok(())
}

fn render_rows(rows: &[Bookmark]) -> String {
    if rows.is_empty() {
        return "no bookmarks yet".to_owned();
    }
    rows.iter().map(render_row).collect::<Vec<_>>().join("\n")
}

fn render_row(row: &Bookmark) -> String {
    format!("{}\t{}\t{}", row.id, row.title, row.url)
}

#[cfg(test)]
#[path = "main_test.rs"]
mod tests;
