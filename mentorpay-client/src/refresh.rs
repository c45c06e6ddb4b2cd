//! Reconciliation/Refresh Loop.
//!
//! Re-pulls sessions, payments and mentors on a fixed interval and
//! immediately after every successful mutation, merging whatever succeeded
//! into the shared view state. The three fetches run concurrently and one
//! failing does not cancel the others. Overlapping refreshes are not
//! deduplicated; completions overwrite the shared state in arrival order
//! (last-writer-wins).

use std::sync::{Arc, RwLock};
use tokio::sync::{broadcast, Notify};

use mentorpay_core::models::{Payment, Session, User};

use crate::auth::AuthSession;
use crate::gateway::{decode_records, extract_records_lenient, ApiClient, GatewayError};

// ============================================================================
// Shared view state
// ============================================================================

/// Client-side projection of the backend collections. Discarded and rebuilt
/// on every refresh; never authoritative.
#[derive(Debug, Default)]
pub struct ViewState {
    pub sessions: Vec<Session>,
    pub payments: Vec<Payment>,
    pub mentors: Vec<User>,
    pub refresh_count: u64,
}

/// Fires the out-of-band refresh that follows a successful mutation.
#[derive(Debug, Clone, Default)]
pub struct RefreshTrigger {
    notify: Arc<Notify>,
}

impl RefreshTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fire(&self) {
        self.notify.notify_one();
    }

    pub async fn wait(&self) {
        self.notify.notified().await;
    }
}

// ============================================================================
// Collection fetches
// ============================================================================

pub async fn fetch_sessions(
    client: &ApiClient,
    fetch_size: usize,
) -> Result<Vec<Session>, GatewayError> {
    let value = client
        .get(&format!("/api/sessions?page=0&size={}", fetch_size))
        .await?;
    Ok(decode_records(extract_records_lenient(&value)))
}

pub async fn fetch_payments(
    client: &ApiClient,
    fetch_size: usize,
) -> Result<Vec<Payment>, GatewayError> {
    let value = client
        .get(&format!("/api/payments?page=0&size={}", fetch_size))
        .await?;
    Ok(decode_records(extract_records_lenient(&value)))
}

/// All users, filtered client-side to mentors — the backend's role encoding
/// is not trusted for server-side filtering.
pub async fn fetch_mentors(client: &ApiClient) -> Result<Vec<User>, GatewayError> {
    let value = client.get("/api/users").await?;
    let users: Vec<User> = decode_records(extract_records_lenient(&value));
    Ok(users.into_iter().filter(User::is_mentor).collect())
}

// ============================================================================
// Reconciler
// ============================================================================

#[derive(Clone)]
pub struct Reconciler {
    auth: AuthSession,
    state: Arc<RwLock<ViewState>>,
    trigger: RefreshTrigger,
    fetch_size: usize,
}

impl Reconciler {
    pub fn new(auth: AuthSession, fetch_size: usize) -> Self {
        Self {
            auth,
            state: Arc::new(RwLock::new(ViewState::default())),
            trigger: RefreshTrigger::new(),
            fetch_size,
        }
    }

    pub fn state(&self) -> &Arc<RwLock<ViewState>> {
        &self.state
    }

    pub fn trigger(&self) -> RefreshTrigger {
        self.trigger.clone()
    }

    pub fn snapshot_mentors(&self) -> Vec<User> {
        self.read().mentors.clone()
    }

    pub fn snapshot_sessions(&self) -> Vec<Session> {
        self.read().sessions.clone()
    }

    pub fn snapshot_payments(&self) -> Vec<Payment> {
        self.read().payments.clone()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, ViewState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, ViewState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    /// One reconciliation cycle. Each fetch goes through the bounded
    /// auth-retry policy; partial failure merges only what succeeded.
    pub async fn refresh_once(&self) {
        let client = self.auth.client().clone();
        let fetch_size = self.fetch_size;

        let sessions = self.auth.with_auth_retry(|| {
            let client = client.clone();
            async move { fetch_sessions(&client, fetch_size).await }
        });
        let payments = self.auth.with_auth_retry(|| {
            let client = client.clone();
            async move { fetch_payments(&client, fetch_size).await }
        });
        let mentors = self.auth.with_auth_retry(|| {
            let client = client.clone();
            async move { fetch_mentors(&client).await }
        });

        let (sessions, payments, mentors) = tokio::join!(sessions, payments, mentors);

        let mut state = self.write();
        state.refresh_count += 1;
        match sessions {
            Ok(s) => state.sessions = s,
            Err(e) => tracing::warn!(error = %e, "session refresh failed, keeping last known"),
        }
        match payments {
            Ok(p) => state.payments = p,
            Err(e) => tracing::warn!(error = %e, "payment refresh failed, keeping last known"),
        }
        match mentors {
            Ok(m) => state.mentors = m,
            Err(e) => tracing::warn!(error = %e, "mentor refresh failed, keeping last known"),
        }
    }
}

/// Background loop: one fixed interval plus the post-mutation trigger.
/// (The original client registered duplicate 30s and 5min timers; that was
/// a bug, consolidated here into a single interval.)
pub async fn run_refresh_loop(
    reconciler: Reconciler,
    interval_seconds: u64,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(std::time::Duration::from_secs(interval_seconds));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let trigger = reconciler.trigger();

    tracing::info!(interval_seconds, "refresh loop started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                reconciler.refresh_once().await;
            }
            _ = trigger.wait() => {
                tracing::debug!("post-mutation refresh");
                reconciler.refresh_once().await;
            }
            _ = shutdown.recv() => {
                tracing::info!("refresh loop shutting down");
                break;
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
