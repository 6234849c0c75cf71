//! `rehab`: command-line client for the RehabCare portal.
//!
//! # Usage
//!
//! ```
//! rehab --url http://localhost:8080 login --email ada@example.org
//! rehab dashboard
//! rehab patients --search hop
//! rehab --config ~/.config/rehab/config.toml open /admin/users
//! ```
//!
//! The session is kept in a JSON file between invocations, so `login` once
//! and later commands run as that user until `logout`.

mod client;
mod nav;
mod session;
mod view;

use std::{future::Future, path::PathBuf, process::ExitCode, sync::Arc};

use anyhow::{Context, Result, bail};
use chrono::Utc;
use clap::{Parser, Subcommand};
use client::{ApiClient, ApiConfig};
use nav::Destination;
use rehab_core::{
  Role,
  access::{ROOT_PATH, role_home},
  notice::{Notice, NoticeLevel},
  record::PatientStatus,
  validate::{ActivityForm, PatientForm, ProgressForm, SignInForm, SignUpForm},
};
use serde::Deserialize;
use serde_json::{Value, json};
use session::{AuthError, AuthState, SessionProvider, SignUpOutcome};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;
use view::ViewTask;

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "rehab", about = "Command-line client for the RehabCare portal")]
struct Args {
  /// Path to a TOML config file (url, session_file).
  #[arg(short, long, value_name = "FILE")]
  config: Option<PathBuf>,

  /// Base URL of the portal (default: http://localhost:8080).
  #[arg(long, env = "REHAB_URL")]
  url: Option<String>,

  /// Where the session is stored between invocations.
  #[arg(long, env = "REHAB_SESSION_FILE", value_name = "FILE")]
  session_file: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Sign in with email and password.
  Login {
    #[arg(long)]
    email:    String,
    /// Read from stdin when omitted.
    #[arg(long, env = "REHAB_PASSWORD")]
    password: Option<String>,
  },
  /// Create an account.
  Signup {
    #[arg(long)]
    email:      String,
    #[arg(long)]
    first_name: String,
    #[arg(long)]
    last_name:  String,
    #[arg(long, env = "REHAB_PASSWORD")]
    password:   Option<String>,
  },
  /// Confirm an email address with the token from the operator.
  Verify { token: String },
  /// Sign out and forget the stored session.
  Logout,
  /// Show the signed-in user and profile.
  Whoami,
  /// Navigate to a portal path and print its view.
  Open { path: String },
  /// Print the dashboard for your role.
  Dashboard,
  /// List patients visible to your role.
  Patients {
    #[arg(long)]
    search: Option<String>,
    #[arg(long)]
    status: Option<PatientStatus>,
  },
  /// Admit a patient (staff, admin).
  AddPatient {
    #[arg(long)]
    first_name:      String,
    #[arg(long)]
    last_name:       String,
    /// YYYY-MM-DD
    #[arg(long)]
    date_of_birth:   String,
    /// YYYY-MM-DD, default today.
    #[arg(long)]
    admission_date:  Option<String>,
    #[arg(long)]
    discharge_date:  Option<String>,
    #[arg(long)]
    medical_history: Option<String>,
    #[arg(long)]
    status:          Option<PatientStatus>,
  },
  /// List activities (staff).
  Activities {
    #[arg(long)]
    patient: Option<Uuid>,
    /// Only activities not yet completed.
    #[arg(long)]
    pending: bool,
  },
  /// Schedule an activity (staff).
  Schedule {
    #[arg(long)]
    patient:     Uuid,
    #[arg(long)]
    name:        String,
    /// RFC 3339 or YYYY-MM-DDTHH:MM
    #[arg(long)]
    at:          String,
    #[arg(long)]
    description: Option<String>,
  },
  /// Mark an activity completed (staff).
  Complete { id: Uuid },
  /// List progress notes (staff, therapist).
  Notes {
    #[arg(long)]
    patient: Option<Uuid>,
  },
  /// Record a progress note (staff, therapist).
  Note {
    #[arg(long)]
    patient: Uuid,
    #[arg(long)]
    notes:   String,
    /// YYYY-MM-DD, default today.
    #[arg(long)]
    date:    Option<String>,
  },
  /// List users (admin).
  Users {
    #[arg(long)]
    role: Option<Role>,
  },
  /// Set a user's role (admin). `none` clears it.
  SetRole { user: Uuid, role: String },
  /// Assign a therapist to a patient (admin).
  AssignTherapist { patient: Uuid, therapist: Uuid },
  /// Link a family member to a patient (admin).
  LinkFamily {
    patient:      Uuid,
    member:       Uuid,
    relationship: String,
  },
}

// ─── Config file ──────────────────────────────────────────────────────────────

/// Shape of the optional TOML config file.
#[derive(Deserialize, Default)]
struct ConfigFile {
  #[serde(default)]
  url:          String,
  session_file: Option<PathBuf>,
}

fn default_session_file() -> PathBuf {
  std::env::var("HOME").map_or_else(
    |_| PathBuf::from(".rehab-session.json"),
    |home| PathBuf::from(home).join(".config/rehab/session.json"),
  )
}

// ─── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<ExitCode> {
  tracing_subscriber::fmt()
    .with_writer(std::io::stderr)
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let args = Args::parse();

  let file_cfg: ConfigFile = if let Some(path) = &args.config {
    let raw = std::fs::read_to_string(path)
      .with_context(|| format!("reading config file {}", path.display()))?;
    toml::from_str(&raw).context("parsing config file")?
  } else {
    ConfigFile::default()
  };

  // CLI flags override config file, which overrides defaults.
  let api_config = ApiConfig {
    base_url:     args
      .url
      .or_else(|| (!file_cfg.url.is_empty()).then(|| file_cfg.url.clone()))
      .unwrap_or_else(|| "http://localhost:8080".to_string()),
    session_file: Some(
      args
        .session_file
        .or(file_cfg.session_file)
        .unwrap_or_else(default_session_file),
    ),
  };

  let client = Arc::new(ApiClient::new(api_config).context("building API client")?);
  let provider = Arc::new(SessionProvider::new(client.clone()));
  provider.start();
  provider.initialize().await;

  let app = App { client, provider: provider.clone() };
  let result = app.run(args.command).await;
  provider.dispose();

  match result {
    Ok(()) => Ok(ExitCode::SUCCESS),
    Err(e) => match e.downcast_ref::<client::Error>().and_then(notice_for) {
      Some(notice) => {
        print_notice(&notice);
        Ok(ExitCode::FAILURE)
      }
      None => Err(e),
    },
  }
}

// ─── Notices ──────────────────────────────────────────────────────────────────

/// User-facing failures become notices rather than error chains.
fn notice_for(e: &client::Error) -> Option<Notice> {
  match e {
    client::Error::Auth(failure) => Some(Notice::error(failure.to_string())),
    client::Error::Invalid(v) => Some(Notice::error(v.to_string())),
    client::Error::NotSignedIn => Some(Notice::error("Not signed in. Run `rehab login` first.")),
    client::Error::Redirected(to) => Some(Notice::error(format!("Not available; redirected to {to}"))),
    _ => None,
  }
}

fn print_notice(notice: &Notice) {
  match notice.level {
    NoticeLevel::Info => println!("{}: {}", notice.title, notice.description),
    NoticeLevel::Error => eprintln!("{}: {}", notice.title, notice.description),
  }
}

fn print_json(value: &Value) -> Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}

fn flatten(e: AuthError<client::Error>) -> client::Error {
  match e {
    AuthError::Invalid(v) => client::Error::Invalid(v),
    AuthError::Client(e) => e,
  }
}

/// Run `fetch` as a view-scoped task; Ctrl-C drops and aborts it.
async fn fetch<T, F>(fut: F) -> Result<T>
where
  T: Send + 'static,
  F: Future<Output = Result<T, client::Error>> + Send + 'static,
{
  let task = ViewTask::spawn(fut);
  tokio::select! {
    res = task => Ok(res.context("fetch aborted")??),
    _ = tokio::signal::ctrl_c() => bail!("cancelled"),
  }
}

fn read_password(given: Option<String>) -> Result<String> {
  if let Some(p) = given {
    return Ok(p);
  }
  use std::io::{self, BufRead, Write};
  print!("Password: ");
  io::stdout().flush().ok();
  let mut line = String::new();
  io::stdin().lock().read_line(&mut line)?;
  Ok(line.trim_end_matches(['\n', '\r']).to_string())
}

fn today() -> String { Utc::now().date_naive().format("%Y-%m-%d").to_string() }

// ─── Commands ─────────────────────────────────────────────────────────────────

struct App {
  client:   Arc<ApiClient>,
  provider: Arc<SessionProvider<ApiClient>>,
}

impl App {
  fn state(&self) -> AuthState { self.provider.state() }

  /// Check `path` against the route guard before asking the server.
  fn route(&self, path: &str) -> Result<String> {
    let state = self.state();
    match nav::resolve(state.has_session(), state.role(), path) {
      Destination::Page(p) if p == path => Ok(p),
      Destination::Page(p) => Err(client::Error::Redirected(p).into()),
      Destination::Login { .. } => Err(client::Error::NotSignedIn.into()),
      Destination::NotFound(p) => bail!("no such page: {p}"),
    }
  }

  /// `path` under the caller's role home.
  fn home_route(&self, path: &str) -> Result<String> {
    let home = role_home(self.state().role());
    if home == ROOT_PATH {
      if !self.state().has_session() {
        return Err(client::Error::NotSignedIn.into());
      }
      bail!("your account has no role yet; ask an administrator to assign one");
    }
    self.route(&format!("{home}{path}"))
  }

  async fn get(&self, path: String, query: Vec<(&'static str, String)>) -> Result<Value> {
    let client = self.client.clone();
    fetch(async move { client.get::<Value>(&path, &query).await }).await
  }

  async fn post(&self, path: String, body: Option<Value>) -> Result<Value> {
    let client = self.client.clone();
    fetch(async move { client.post::<Value>(&path, body.as_ref()).await }).await
  }

  async fn run(&self, command: Command) -> Result<()> {
    match command {
      Command::Login { email, password } => {
        let form = SignInForm { email, password: read_password(password)? };
        self.provider.sign_in(form).await.map_err(flatten)?;
        let state = self.state();
        let who = state.profile().map(|p| p.display_name()).unwrap_or_default();
        print_notice(&Notice::info("Signed in", format!("Welcome {who}")));
        if let Destination::Page(home) = nav::resolve(true, state.role(), ROOT_PATH) {
          println!("Home: {home}");
        }
      }

      Command::Signup { email, first_name, last_name, password } => {
        let form = SignUpForm { email, password: read_password(password)?, first_name, last_name };
        let notice = match self.provider.sign_up(form).await.map_err(flatten)? {
          SignUpOutcome::Authenticated => {
            Notice::info("Registration successful!", "Your account has been created.")
          }
          SignUpOutcome::VerificationPending => Notice::info(
            "Check your email",
            "Please check your email to verify your account before logging in.",
          ),
        };
        print_notice(&notice);
      }

      Command::Verify { token } => {
        let client = self.client.clone();
        let user = fetch(async move { client.verify_email(&token).await }).await?;
        print_notice(&Notice::info("Email confirmed", format!("{} can now sign in.", user.email)));
      }

      Command::Logout => {
        let was_signed_in = self.state().has_session();
        match self.provider.sign_out().await {
          Ok(()) if was_signed_in => print_notice(&Notice::info("Signed out", "See you soon.")),
          Ok(()) => print_notice(&Notice::info("Signed out", "You were not signed in.")),
          // Local state is gone either way.
          Err(e) => print_notice(&Notice::error(format!("Signed out locally; server said: {e}"))),
        }
      }

      Command::Whoami => match self.state() {
        AuthState::Authenticated { session, profile } => {
          print_json(&json!({ "user": session.user, "profile": profile }))?;
        }
        _ => return Err(client::Error::NotSignedIn.into()),
      },

      Command::Open { path } => {
        let state = self.state();
        match nav::resolve(state.has_session(), state.role(), &path) {
          Destination::Page(p) => {
            tracing::debug!(requested = %path, resolved = %p, "navigating");
            print_json(&self.get(p, Vec::new()).await?)?;
          }
          Destination::Login { from } => {
            print_notice(&Notice::error(format!("Sign in to view {from}: rehab login --email ...")));
          }
          Destination::NotFound(p) => print_notice(&Notice::error(format!("Page not found: {p}"))),
        }
      }

      Command::Dashboard => {
        let state = self.state();
        match nav::resolve(state.has_session(), state.role(), ROOT_PATH) {
          Destination::Page(p) => print_json(&self.get(p, Vec::new()).await?)?,
          _ => return Err(client::Error::NotSignedIn.into()),
        }
      }

      Command::Patients { search, status } => {
        let mut query = Vec::new();
        if let Some(s) = search {
          query.push(("search", s));
        }
        if let Some(s) = status {
          query.push(("status", s.to_string()));
        }
        let path = self.home_route("/patients")?;
        print_json(&self.get(path, query).await?)?;
      }

      Command::AddPatient {
        first_name,
        last_name,
        date_of_birth,
        admission_date,
        discharge_date,
        medical_history,
        status,
      } => {
        let form = PatientForm {
          first_name,
          last_name,
          date_of_birth,
          admission_date: admission_date.unwrap_or_else(today),
          expected_discharge_date: discharge_date,
          medical_history,
          status,
        };
        form.clone().validate().map_err(client::Error::Invalid)?;
        let path = self.home_route("/patients")?;
        let patient = self.post(path, Some(serde_json::to_value(&form)?)).await?;
        print_notice(&Notice::info("Patient added", patient["id"].as_str().unwrap_or_default()));
      }

      Command::Activities { patient, pending } => {
        let mut query = vec![("pending", pending.to_string())];
        if let Some(p) = patient {
          query.push(("patient_id", p.to_string()));
        }
        let path = self.route("/staff/activities")?;
        print_json(&self.get(path, query).await?)?;
      }

      Command::Schedule { patient, name, at, description } => {
        let form = ActivityForm {
          patient_id: patient.to_string(),
          name,
          description,
          scheduled_date: at,
        };
        form.clone().validate().map_err(client::Error::Invalid)?;
        let path = self.route("/staff/activities")?;
        let activity = self.post(path, Some(serde_json::to_value(&form)?)).await?;
        print_notice(&Notice::info("Activity scheduled", activity["id"].as_str().unwrap_or_default()));
      }

      Command::Complete { id } => {
        let path = self.route(&format!("/staff/activities/{id}/complete"))?;
        self.post(path, None).await?;
        print_notice(&Notice::info("Activity completed", id.to_string()));
      }

      Command::Notes { patient } => {
        let query = patient.map(|p| vec![("patient_id", p.to_string())]).unwrap_or_default();
        let path = self.home_route("/progress")?;
        print_json(&self.get(path, query).await?)?;
      }

      Command::Note { patient, notes, date } => {
        let author = self
          .state()
          .profile()
          .map(|p| p.id)
          .ok_or(client::Error::NotSignedIn)?;
        let form = ProgressForm {
          patient_id:   patient.to_string(),
          notes,
          session_date: date.unwrap_or_else(today),
        };
        form.clone().validate(author).map_err(client::Error::Invalid)?;
        let path = self.home_route("/progress")?;
        self.post(path, Some(serde_json::to_value(&form)?)).await?;
        print_notice(&Notice::info("Progress note saved", format!("patient {patient}")));
      }

      Command::Users { role } => {
        let query = role.map(|r| vec![("role", r.to_string())]).unwrap_or_default();
        let path = self.route("/admin/users")?;
        print_json(&self.get(path, query).await?)?;
      }

      Command::SetRole { user, role } => {
        let role: Option<Role> = match role.as_str() {
          "none" => None,
          other => Some(other.parse().with_context(|| format!("unknown role {other:?}"))?),
        };
        let path = self.route(&format!("/admin/users/{user}/role"))?;
        let client = self.client.clone();
        let profile: Value =
          fetch(async move { client.put::<Value>(&path, &json!({ "role": role })).await }).await?;
        print_json(&profile)?;
      }

      Command::AssignTherapist { patient, therapist } => {
        let path = self.route(&format!("/admin/patients/{patient}/therapists"))?;
        let link = self.post(path, Some(json!({ "therapist_id": therapist }))).await?;
        print_json(&link)?;
      }

      Command::LinkFamily { patient, member, relationship } => {
        let path = self.route(&format!("/admin/patients/{patient}/family"))?;
        let body = json!({ "family_member_id": member, "relationship": relationship });
        print_json(&self.post(path, Some(body)).await?)?;
      }
    }
    Ok(())
  }
}
