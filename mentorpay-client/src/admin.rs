//! Admin record mutations: session approve/reject, payment status
//! overrides, session creation and profile (bank detail) updates.
//!
//! Each successful mutation fires the refresh trigger so the view state
//! reconciles immediately instead of waiting for the next interval tick.
//! The backend is authoritative for every transition; nothing here caches
//! or pre-judges the outcome.

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde_json::json;

use mentorpay_core::models::{Payment, PaymentStatus, Session, SessionStatus, User};

use crate::auth::AuthSession;
use crate::gateway::{decode_entity, GatewayError};
use crate::refresh::RefreshTrigger;

// ============================================================================
// PUBLIC API
// ============================================================================

/// Input for creating a session on a mentor's behalf. The backend computes
/// the payout breakdown; only the raw facts are sent.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub mentor_id: i64,
    pub session_type: String,
    pub duration_minutes: i64,
    pub hourly_rate: Decimal,
    pub session_date_time: NaiveDateTime,
    pub notes: Option<String>,
}

#[derive(Clone)]
pub struct AdminActions {
    auth: AuthSession,
    trigger: RefreshTrigger,
}

impl AdminActions {
    pub fn new(auth: AuthSession, trigger: RefreshTrigger) -> Self {
        Self { auth, trigger }
    }

    /// `PUT /api/sessions/{id}/status?status=` — returns the updated record.
    pub async fn update_session_status(
        &self,
        session_id: i64,
        status: SessionStatus,
    ) -> Result<Session, GatewayError> {
        let client = self.auth.client().clone();
        let path = format!(
            "/api/sessions/{}/status?status={}",
            session_id,
            status.as_str()
        );
        let value = self
            .auth
            .with_auth_retry(|| {
                let client = client.clone();
                let path = path.clone();
                async move { client.put(&path, None).await }
            })
            .await?;

        let session: Session = decode_entity(value, "session status update")?;
        tracing::info!(session_id, status = status.as_str(), "session status updated");
        self.trigger.fire();
        Ok(session)
    }

    pub async fn approve_session(&self, session_id: i64) -> Result<Session, GatewayError> {
        self.update_session_status(session_id, SessionStatus::Approved)
            .await
    }

    pub async fn reject_session(&self, session_id: i64) -> Result<Session, GatewayError> {
        self.update_session_status(session_id, SessionStatus::Rejected)
            .await
    }

    /// `PUT /api/payments/{id}/status?status=` — manual override for
    /// payments stuck outside the provider flow.
    pub async fn update_payment_status(
        &self,
        payment_id: i64,
        status: PaymentStatus,
    ) -> Result<Payment, GatewayError> {
        let client = self.auth.client().clone();
        let path = format!(
            "/api/payments/{}/status?status={}",
            payment_id,
            status.as_str()
        );
        let value = self
            .auth
            .with_auth_retry(|| {
                let client = client.clone();
                let path = path.clone();
                async move { client.put(&path, None).await }
            })
            .await?;

        let payment: Payment = decode_entity(value, "payment status update")?;
        tracing::info!(payment_id, status = status.as_str(), "payment status updated");
        self.trigger.fire();
        Ok(payment)
    }

    /// `POST /api/sessions` — new sessions always start `PENDING`; the
    /// duration goes on the wire in the ISO form the backend stores.
    pub async fn create_session(&self, input: &NewSession) -> Result<Session, GatewayError> {
        let client = self.auth.client().clone();
        let body = json!({
            "mentor": { "id": input.mentor_id },
            "sessionType": input.session_type,
            "duration": format!("PT{}M", input.duration_minutes),
            "hourlyRate": input.hourly_rate,
            "sessionDateTime": input.session_date_time,
            "status": SessionStatus::Pending.as_str(),
            "notes": input.notes.clone().unwrap_or_default(),
        });
        let value = self
            .auth
            .with_auth_retry(|| {
                let client = client.clone();
                let body = body.clone();
                async move { client.post("/api/sessions", Some(&body)).await }
            })
            .await?;

        let session: Session = decode_entity(value, "session creation")?;
        tracing::info!(session_id = session.id, mentor_id = input.mentor_id, "session created");
        self.trigger.fire();
        Ok(session)
    }

    /// `PUT /api/users/{id}` — full-profile update carrying the bank
    /// fields. The backend preserves username/password server-side; callers
    /// send the merged profile they fetched and edited.
    pub async fn update_profile(&self, user: &User) -> Result<User, GatewayError> {
        let client = self.auth.client().clone();
        let path = format!("/api/users/{}", user.id);
        let body = serde_json::to_value(user).map_err(|e| GatewayError::Api {
            status: 0,
            message: format!("unserializable profile: {}", e),
        })?;
        let value = self
            .auth
            .with_auth_retry(|| {
                let client = client.clone();
                let path = path.clone();
                let body = body.clone();
                async move { client.put(&path, Some(&body)).await }
            })
            .await?;

        let updated: User = decode_entity(value, "profile update")?;
        tracing::info!(user_id = updated.id, "profile updated");
        self.trigger.fire();
        Ok(updated)
    }
}

// ============================================================================
// TESTS
// ============================================================================
