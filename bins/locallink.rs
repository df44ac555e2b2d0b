use std::process::ExitCode;

use anyhow::{anyhow, bail, Context};
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use tracing::{error, info};
use uuid::Uuid;

use models::{BookingId, BookingStatus, NewBooking, ProfileUpdate, Role, SignupRole};
use service::auth::guard::{post_login_destination, redirect_param};
use service::auth::{AccessDecision, AuthError};
use service::booking::BookingError;
use service::runtime::Runtime;

#[derive(Parser)]
#[command(name = "locallink", version, about = "LocalLink marketplace client")]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sign in and remember the credential
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        /// Path the guard sent you away from (`/login?redirect=...` query)
        #[arg(long)]
        redirect: Option<String>,
    },
    /// Create a client or provider account and sign in
    Signup {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long, default_value = "client")]
        role: Role,
    },
    /// Forget the stored credential
    Logout,
    /// Show the signed-in identity
    Whoami,
    /// Update profile fields of the signed-in user
    Profile {
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        password: Option<String>,
    },
    #[command(subcommand)]
    Bookings(BookingsCommand),
    /// Check whether the current session may open a view
    Route { path: String },
}

#[derive(Subcommand)]
enum BookingsCommand {
    /// List the bookings visible to the signed-in role
    List,
    /// Statuses the signed-in user may move a booking to
    Actions { id: i64 },
    /// Move a booking to a new status
    Transition {
        id: i64,
        status: BookingStatus,
        #[arg(long)]
        note: Option<String>,
    },
    /// Delete a booking (admin)
    Delete { id: i64 },
    /// Book a service (client)
    Create {
        #[arg(long)]
        service: i64,
        /// e.g. 2026-05-01T10:00
        #[arg(long)]
        date: String,
        #[arg(long)]
        location: String,
        #[arg(long)]
        phone: String,
        #[arg(long)]
        notes: Option<String>,
    },
}

fn init_logging(json: bool) {
    dotenv().ok();
    if json {
        common::utils::logging::init_logging_json();
    } else {
        common::utils::logging::init_logging_default();
    }
    info!(service = "locallink", event = "logger_init", "tracing subscriber initialized");
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let cfg = configs::AppConfig::load_and_validate().context("loading configuration")?;
    let rt = Runtime::bootstrap(&cfg).await?;
    let sessions = &rt.sessions;

    match cli.command {
        Command::Login { email, password, redirect } => {
            sessions.initialize().await;
            let user = sessions.login(&email, &password).await?;
            let wanted = redirect.as_deref().map(|r| match r.split_once('?') {
                Some((_, query)) => redirect_param(query).unwrap_or_default(),
                None => r.to_string(),
            });
            println!("signed in as {} ({})", user.username, user.role);
            println!("continue to {}", post_login_destination(wanted.as_deref(), user.role));
        }
        Command::Signup { username, email, password, role } => {
            let role = SignupRole::try_from(role)?;
            let user = sessions.signup(&username, &email, &password, role).await?;
            println!("account created; signed in as {} ({})", user.username, user.role);
            println!("continue to {}", user.role.landing_path());
        }
        Command::Logout => {
            sessions.logout();
            println!("signed out");
        }
        Command::Whoami => {
            let session = sessions.initialize().await;
            match session.user() {
                Some(user) => print_json(user)?,
                None => println!("not signed in"),
            }
        }
        Command::Profile { username, email, password } => {
            sessions.initialize().await;
            let user = sessions.update_profile(&ProfileUpdate { username, email, password }).await?;
            print_json(&user)?;
        }
        Command::Bookings(cmd) => {
            let session = sessions.initialize().await;
            let role = session.role().ok_or_else(|| anyhow!("not signed in; run `locallink login` first"))?;
            let controller = rt.bookings(role);
            let listed = controller.fetch().await;
            match cmd {
                BookingsCommand::List => print_json(&listed)?,
                BookingsCommand::Actions { id } => {
                    let actions = controller.available_transitions(BookingId(id)).await;
                    if actions.is_empty() {
                        println!("no transitions available");
                    }
                    for status in actions {
                        println!("{status}");
                    }
                }
                BookingsCommand::Transition { id, status, note } => {
                    let booking = controller.apply_transition_with_note(BookingId(id), status, role, note).await?;
                    print_json(&booking)?;
                }
                BookingsCommand::Delete { id } => {
                    controller.delete(BookingId(id)).await?;
                    println!("booking {id} deleted");
                }
                BookingsCommand::Create { service, date, location, phone, notes } => {
                    let draft = NewBooking { service_id: service, date, location, contact_phone: phone, notes };
                    let booking = controller.create_booking(draft).await?;
                    print_json(&booking)?;
                }
            }
        }
        Command::Route { path } => {
            sessions.initialize().await;
            match rt.guard().check(&path) {
                AccessDecision::Granted => println!("granted"),
                AccessDecision::PendingDecision => bail!("session still resolving"),
                AccessDecision::DeniedUnauthenticated { redirect_to } | AccessDecision::DeniedWrongRole { redirect_to } => {
                    println!("redirect {redirect_to}")
                }
            }
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.json_logs);

    let session_id = Uuid::new_v4();
    let pid = std::process::id();
    let version = env!("CARGO_PKG_VERSION");

    std::panic::set_hook(Box::new(move |info| {
        error!(service = "locallink", event = "panic", %session_id, pid, message = %info, "unhandled panic occurred");
    }));

    let rt = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            error!(service = "locallink", event = "runtime_build_failed", error = %e, "failed to build tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    info!(service = "locallink", event = "start", %session_id, pid, version, "locallink starting");
    match rt.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let (code, kind) = if let Some(err) = e.downcast_ref::<AuthError>() {
                (err.code(), Some(err.kind()))
            } else if let Some(err) = e.downcast_ref::<BookingError>() {
                (err.code(), Some(err.kind()))
            } else {
                (0, None)
            };
            error!(service = "locallink", event = "command_failed", code, kind = ?kind, error = %e, "command failed");
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
