//! The session/profile provider.
//!
//! [`SessionProvider`] owns the client's view of who is signed in. It moves
//! through `Uninitialized -> Loading -> Authenticated | Anonymous` and
//! publishes every transition once on a [`watch`] channel. Auth events from
//! the collaborator are applied in arrival order by a single listener task.
//!
//! Profile reads are tagged with a ticket from a monotonic counter. A result
//! is applied only while its ticket is the newest one issued, so a slow read
//! never overwrites a fresher one and a sign-out discards reads in flight.

use std::{
  future::Future,
  sync::{
    Arc, Mutex, PoisonError,
    atomic::{AtomicU64, Ordering},
  },
};

use rehab_core::{
  Role,
  profile::Profile,
  session::{Session, SignUpOutcome as Registration, User},
  validate::{SignInForm, SignUpForm, ValidationErrors},
};
use thiserror::Error;
use tokio::{
  sync::{broadcast, watch},
  task::JoinHandle,
};

// ─── Collaborator ────────────────────────────────────────────────────────────

/// A change in the collaborator's session, pushed to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
  SignedIn(Session),
  TokenRefreshed(Session),
  UserUpdated(User),
  SignedOut,
}

/// The client-side auth collaborator.
pub trait AuthClient: Send + Sync + 'static {
  type Error: std::error::Error + Send + Sync + 'static;

  fn sign_in_with_password<'a>(
    &'a self,
    email: &'a str,
    password: &'a str,
  ) -> impl Future<Output = Result<Session, Self::Error>> + Send + 'a;

  fn sign_up<'a>(
    &'a self,
    form: &'a SignUpForm,
  ) -> impl Future<Output = Result<Registration, Self::Error>> + Send + 'a;

  fn sign_out(&self) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// The current session, if one exists and is still usable.
  fn get_session(&self) -> impl Future<Output = Result<Option<Session>, Self::Error>> + Send + '_;

  /// The signed-in user's profile row. `None` when the row is missing.
  fn fetch_profile(&self) -> impl Future<Output = Result<Option<Profile>, Self::Error>> + Send + '_;

  fn on_auth_state_change(&self) -> broadcast::Receiver<AuthEvent>;
}

// ─── State ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AuthState {
  #[default]
  Uninitialized,
  Loading,
  Authenticated {
    session: Session,
    /// `None` when the row is missing or could not be read.
    profile: Option<Profile>,
  },
  Anonymous,
}

impl AuthState {
  pub fn session(&self) -> Option<&Session> {
    match self {
      Self::Authenticated { session, .. } => Some(session),
      _ => None,
    }
  }

  pub fn profile(&self) -> Option<&Profile> {
    match self {
      Self::Authenticated { profile, .. } => profile.as_ref(),
      _ => None,
    }
  }

  pub fn has_session(&self) -> bool { self.session().is_some() }

  pub fn role(&self) -> Option<Role> { self.profile().and_then(Profile::role) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignUpOutcome {
  Authenticated,
  /// The address must be confirmed before signing in.
  VerificationPending,
}

#[derive(Debug, Error)]
pub enum AuthError<E> {
  /// Rejected locally; nothing was sent.
  #[error(transparent)]
  Invalid(#[from] ValidationErrors),

  #[error(transparent)]
  Client(E),
}

// ─── Provider ────────────────────────────────────────────────────────────────

pub struct SessionProvider<C> {
  client:   Arc<C>,
  state:    watch::Sender<AuthState>,
  ticket:   AtomicU64,
  listener: Mutex<Option<JoinHandle<()>>>,
}

impl<C: AuthClient> SessionProvider<C> {
  pub fn new(client: Arc<C>) -> Self {
    Self {
      client,
      state: watch::Sender::new(AuthState::Uninitialized),
      ticket: AtomicU64::new(0),
      listener: Mutex::new(None),
    }
  }

  pub fn subscribe(&self) -> watch::Receiver<AuthState> { self.state.subscribe() }

  /// A snapshot of the current state.
  pub fn state(&self) -> AuthState { self.state.borrow().clone() }

  /// Start applying the collaborator's auth events. Calling it twice
  /// replaces the earlier listener.
  pub fn start(self: &Arc<Self>) {
    let mut events = self.client.on_auth_state_change();
    let provider = Arc::clone(self);
    let handle = tokio::spawn(async move {
      loop {
        match events.recv().await {
          Ok(event) => provider.handle_event(event).await,
          Err(broadcast::error::RecvError::Lagged(n)) => {
            tracing::warn!(skipped = n, "auth listener lagged");
          }
          Err(broadcast::error::RecvError::Closed) => break,
        }
      }
    });

    let mut slot = self.listener.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(old) = slot.replace(handle) {
      old.abort();
    }
  }

  /// Stop the listener task.
  pub fn dispose(&self) {
    let handle = self.listener.lock().unwrap_or_else(PoisonError::into_inner).take();
    if let Some(handle) = handle {
      handle.abort();
    }
  }

  // ── Tickets ───────────────────────────────────────────────────────────────

  fn next_ticket(&self) -> u64 { self.ticket.fetch_add(1, Ordering::SeqCst) + 1 }

  fn is_current(&self, ticket: u64) -> bool { self.ticket.load(Ordering::SeqCst) == ticket }

  fn publish(&self, next: AuthState) {
    tracing::debug!(state = ?std::mem::discriminant(&next), "auth state");
    self.state.send_replace(next);
  }

  /// Publish `next` only if `ticket` is still the newest.
  fn publish_if_current(&self, ticket: u64, next: AuthState) {
    if self.is_current(ticket) {
      self.publish(next);
    } else {
      tracing::debug!(ticket, "discarding stale profile read");
    }
  }

  async fn load_profile(&self) -> Option<Profile> {
    match self.client.fetch_profile().await {
      Ok(p) => p,
      Err(e) => {
        tracing::warn!(error = %e, "profile fetch failed");
        None
      }
    }
  }

  // ── Lifecycle ─────────────────────────────────────────────────────────────

  /// Resolve the initial state from the collaborator's stored session.
  ///
  /// Never returns while the state is still `Loading`.
  pub async fn initialize(&self) {
    let ticket = self.next_ticket();
    self.publish(AuthState::Loading);

    let session = match self.client.get_session().await {
      Ok(s) => s,
      Err(e) => {
        tracing::warn!(error = %e, "session lookup failed");
        None
      }
    };

    let next = match session {
      Some(session) => AuthState::Authenticated { session, profile: self.load_profile().await },
      None => AuthState::Anonymous,
    };
    if self.is_current(ticket) {
      self.publish(next);
      return;
    }

    // The lookup itself may have refreshed the session and raised an event;
    // the newer ticket holder settles the state, so wait for it.
    tracing::debug!(ticket, "initial read superseded");
    let mut rx = self.state.subscribe();
    let _ = rx.wait_for(|s| *s != AuthState::Loading).await;
  }

  /// Adopt `session`, re-reading the profile when the identity changed.
  async fn apply_session(&self, session: Session) {
    let (same_user, profile) = {
      let current = self.state.borrow();
      let same = current.session().is_some_and(|s| s.user.id == session.user.id);
      (same, current.profile().cloned())
    };

    if same_user {
      // Token rotation only.
      self.publish(AuthState::Authenticated { session, profile });
      return;
    }

    let ticket = self.next_ticket();
    let profile = self.load_profile().await;
    self.publish_if_current(ticket, AuthState::Authenticated { session, profile });
  }

  /// Apply one auth event.
  pub async fn handle_event(&self, event: AuthEvent) {
    match event {
      AuthEvent::SignedIn(session) | AuthEvent::TokenRefreshed(session) => {
        self.apply_session(session).await;
      }
      AuthEvent::UserUpdated(user) => {
        let Some(mut session) = self.state.borrow().session().cloned() else {
          return;
        };
        if session.user.id != user.id {
          return;
        }
        session.user = user;
        let ticket = self.next_ticket();
        let profile = self.load_profile().await;
        self.publish_if_current(ticket, AuthState::Authenticated { session, profile });
      }
      AuthEvent::SignedOut => self.clear(),
    }
  }

  /// Drop the local session and invalidate reads in flight.
  fn clear(&self) {
    self.next_ticket();
    if *self.state.borrow() != AuthState::Anonymous {
      self.publish(AuthState::Anonymous);
    }
  }

  // ── Actions ───────────────────────────────────────────────────────────────

  pub async fn sign_in(&self, form: SignInForm) -> Result<(), AuthError<C::Error>> {
    form.validate()?;
    let session = self
      .client
      .sign_in_with_password(form.email.trim(), &form.password)
      .await
      .map_err(AuthError::Client)?;
    self.apply_session(session).await;
    Ok(())
  }

  /// Register an account. Validation runs before anything is sent.
  pub async fn sign_up(&self, form: SignUpForm) -> Result<SignUpOutcome, AuthError<C::Error>> {
    form.clone().validate(None)?;
    let registration = self.client.sign_up(&form).await.map_err(AuthError::Client)?;
    match registration.session {
      Some(session) => {
        self.apply_session(session).await;
        Ok(SignUpOutcome::Authenticated)
      }
      None => Ok(SignUpOutcome::VerificationPending),
    }
  }

  /// Sign out. A no-op while anonymous; otherwise local state is cleared
  /// even when the remote call fails, and that failure is returned.
  pub async fn sign_out(&self) -> Result<(), C::Error> {
    if !self.state.borrow().has_session() {
      return Ok(());
    }
    let remote = self.client.sign_out().await;
    self.clear();
    remote
  }
}

impl<C> Drop for SessionProvider<C> {
  fn drop(&mut self) {
    let handle = self.listener.get_mut().unwrap_or_else(PoisonError::into_inner).take();
    if let Some(handle) = handle {
      handle.abort();
    }
  }
}
