mod api;
mod app;
mod config;
mod error;
mod filter;
mod form;
mod models;
mod saved_session;
mod session;
mod store;
#[cfg(test)]
mod testing;
mod tui;

use anyhow::{Context, Result, anyhow};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use api::HttpBackend;
use app::{NoticeLevel, Tracker};
use config::Config;
use error::AppError;
use filter::{DateRange, FilterCriteria, SortOrder, StatusFilter};
use models::{Credentials, JobApplication, JobId, Status};
use saved_session::SavedSession;
use session::{SavedSessionAction, SessionGate};

const VIEW_ACTION: &str = "view applications";

#[derive(Parser)]
#[command(name = "jobtrack")]
#[command(about = "Track job applications - add, update, filter and review where you applied")]
struct Cli {
    /// Backend base URL (overrides config.toml and JOBTRACK_BACKEND_URL)
    #[arg(long, global = true)]
    backend_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in to the backend
    Login(CredentialArgs),

    /// Create an account (does not log in)
    Register(CredentialArgs),

    /// Log out and forget the saved session
    Logout,

    /// Show who is logged in
    Whoami,

    /// List applications
    List(FilterArgs),

    /// Add an application
    Add {
        #[arg(short, long)]
        company: String,

        #[arg(short, long)]
        role: String,

        /// Link to the posting
        #[arg(short, long)]
        link: String,

        #[arg(short, long, default_value = "Applied")]
        status: Status,

        /// Application date (YYYY-MM-DD), defaults to today
        #[arg(short, long)]
        date: Option<NaiveDate>,
    },

    /// Edit an application; unspecified fields keep their current value
    Edit {
        /// Application ID
        id: String,

        #[arg(short, long)]
        company: Option<String>,

        #[arg(short, long)]
        role: Option<String>,

        #[arg(short, long)]
        link: Option<String>,

        #[arg(short, long)]
        status: Option<Status>,

        #[arg(short, long)]
        date: Option<NaiveDate>,
    },

    /// Change the status of an application
    SetStatus {
        /// Application ID
        id: String,

        /// Applied, Interview, Offer or Rejected
        status: Status,
    },

    /// Delete an application
    Delete {
        /// Application ID
        id: String,
    },

    /// Browse applications interactively
    Browse(FilterArgs),
}

#[derive(Args)]
struct CredentialArgs {
    #[arg(short, long)]
    email: String,

    #[arg(short, long)]
    password: Option<String>,

    /// Read the password from a file instead
    #[arg(long)]
    password_file: Option<PathBuf>,
}

impl CredentialArgs {
    fn credentials(&self) -> Result<Credentials> {
        let password = match (&self.password, &self.password_file) {
            (Some(password), _) => password.clone(),
            (None, Some(path)) => std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read password file: {}", path.display()))?
                .trim()
                .to_string(),
            (None, None) => return Err(anyhow!("Either --password or --password-file is required")),
        };
        Ok(Credentials {
            email: self.email.trim().to_string(),
            password,
        })
    }
}

#[derive(Args)]
struct FilterArgs {
    /// all, Applied, Interview, Offer or Rejected
    #[arg(short, long, default_value = "all")]
    status: StatusFilter,

    /// newest or oldest
    #[arg(long, default_value = "newest")]
    sort: SortOrder,

    /// Start of date range (YYYY-MM-DD, inclusive)
    #[arg(long)]
    from: Option<NaiveDate>,

    /// End of date range (YYYY-MM-DD, inclusive)
    #[arg(long)]
    to: Option<NaiveDate>,
}

impl FilterArgs {
    fn criteria(&self) -> FilterCriteria {
        FilterCriteria {
            status: self.status,
            sort: self.sort,
            date_range: DateRange::new(self.from, self.to),
        }
    }
}

fn init_logging(default_filter: &str, to_file: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    // The terminal browser owns the screen, so its logs go to a file.
    let result = if to_file {
        let dir = config::data_dir();
        std::fs::create_dir_all(&dir)?;
        let path = dir.join("jobtrack.log");
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open log file: {}", path.display()))?;
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .with_writer(std::sync::Mutex::new(file))
            .try_init()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init()
    };
    result.map_err(|e| anyhow!("Failed to initialize logging: {}", e))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = Config::load(cli.backend_url.as_deref())?;
    init_logging(&config.log_filter, matches!(cli.command, Commands::Browse(_)))?;

    let session_path = SavedSession::default_path();
    let backend = HttpBackend::new(&config.backend_url)?;
    let gate = match SavedSession::load(&session_path, &config.backend_url) {
        Ok(Some(saved)) => {
            if let Some(cookies) = &saved.cookies {
                backend.restore_cookies(cookies);
            }
            SessionGate::restore(saved.user_email)
        }
        Ok(None) => SessionGate::new(),
        Err(e) => {
            warn!(error = %e, "ignoring unreadable session file");
            SessionGate::new()
        }
    };
    let mut tracker = Tracker::with_gate(backend, gate);

    let outcome = run(cli.command, &mut tracker).await;
    let noticed_error = print_notices(&mut tracker);
    persist_session(&tracker, &session_path, &config.backend_url)?;

    match outcome? {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(e) => {
            if !noticed_error {
                eprintln!("error: {}", e);
            }
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Outer `Result` is for setup failures; the inner one is the user action,
/// whose failures have already been turned into notices.
async fn run(command: Commands, tracker: &mut Tracker<HttpBackend>) -> Result<Result<(), AppError>> {
    let loaded = tracker.check_session().await;

    let action = match command {
        Commands::Login(args) => {
            let credentials = args.credentials()?;
            tracker.login(&credentials).await
        }

        Commands::Register(args) => {
            let credentials = args.credentials()?;
            tracker.register(&credentials).await
        }

        Commands::Logout => {
            if !tracker.session().authenticated {
                println!("Not logged in.");
                return Ok(Ok(()));
            }
            tracker.logout().await
        }

        Commands::Whoami => {
            let session = tracker.session();
            match (&session.user_email, session.authenticated) {
                (Some(email), true) => println!("Logged in as {}", email),
                (None, true) => println!("Logged in"),
                _ => println!("Not logged in."),
            }
            Ok(())
        }

        Commands::List(filter) => {
            if !tracker.session().authenticated {
                return Ok(Err(AppError::Unauthenticated(VIEW_ACTION)));
            }
            if let Err(e) = loaded {
                return Ok(Err(e));
            }
            *tracker.criteria_mut() = filter.criteria();
            print_jobs(&tracker.view(), tracker.store().collection().len());
            Ok(())
        }

        Commands::Add {
            company,
            role,
            link,
            status,
            date,
        } => {
            let mut draft = tracker.draft();
            draft.company = company;
            draft.role = role;
            draft.link = link;
            draft.status = status;
            if let Some(date) = date {
                draft.application_date = date.format("%Y-%m-%d").to_string();
            }
            tracker.submit(&draft).await
        }

        Commands::Edit {
            id,
            company,
            role,
            link,
            status,
            date,
        } => {
            let mut draft = match tracker.begin_edit(&JobId(id)) {
                Ok(draft) => draft,
                Err(e) => return Ok(Err(e)),
            };
            if let Some(company) = company {
                draft.company = company;
            }
            if let Some(role) = role {
                draft.role = role;
            }
            if let Some(link) = link {
                draft.link = link;
            }
            if let Some(status) = status {
                draft.status = status;
            }
            if let Some(date) = date {
                draft.application_date = date.format("%Y-%m-%d").to_string();
            }
            let result = tracker.submit(&draft).await;
            tracker.end_edit();
            result
        }

        Commands::SetStatus { id, status } => tracker.update_status(&JobId(id), status).await,

        Commands::Delete { id } => tracker.delete(&JobId(id)).await,

        Commands::Browse(filter) => {
            if !tracker.session().authenticated {
                return Ok(Err(AppError::Unauthenticated(VIEW_ACTION)));
            }
            *tracker.criteria_mut() = filter.criteria();
            tui::run_browse(tracker).await?;
            Ok(())
        }
    };

    Ok(action)
}

/// Prints pending notices; returns whether any of them was an error.
fn print_notices(tracker: &mut Tracker<HttpBackend>) -> bool {
    let mut any_error = false;
    for notice in tracker.drain_notices() {
        match notice.level {
            NoticeLevel::Success => println!("{}", notice.message),
            NoticeLevel::Error => {
                any_error = true;
                eprintln!("error: {}", notice.message);
            }
        }
    }
    any_error
}

fn persist_session(tracker: &Tracker<HttpBackend>, path: &Path, backend_url: &str) -> Result<()> {
    match tracker.saved_session_action() {
        SavedSessionAction::Save => {
            let saved = SavedSession {
                backend_url: backend_url.to_string(),
                cookies: tracker.backend().cookie_header(),
                user_email: tracker.session().user_email.clone(),
            };
            saved.save(path)?;
            info!(path = %path.display(), "session saved");
        }
        SavedSessionAction::Keep => {
            info!(path = %path.display(), "backend unreachable, saved session left in place");
        }
        SavedSessionAction::Remove => SavedSession::remove(path)?,
    }
    Ok(())
}

fn print_jobs(jobs: &[JobApplication], total: usize) {
    if jobs.is_empty() {
        if total == 0 {
            println!("No applications found. Start by adding your first job application!");
        } else {
            println!("No applications match the current filter ({} hidden).", total);
        }
        return;
    }

    println!(
        "{:<26} {:<10} {:<11} {:<22} {:<24} {}",
        "ID", "STATUS", "DATE", "COMPANY", "ROLE", "LINK"
    );
    println!("{}", "-".repeat(120));
    for job in jobs {
        println!(
            "{:<26} {:<10} {:<11} {:<22} {:<24} {}",
            truncate(job.id.as_str(), 26),
            job.status,
            job.application_date.format("%Y-%m-%d"),
            truncate(&job.company, 20),
            truncate(&job.role, 22),
            job.link
        );
    }
    if jobs.len() < total {
        println!("\n{} of {} applications shown", jobs.len(), total);
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
