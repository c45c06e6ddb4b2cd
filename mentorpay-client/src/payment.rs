//! Payment Lifecycle Controller.
//!
//! Drives one payout from mentor selection through provider confirmation.
//! Local validation runs to completion before any network mutation, and a
//! declined provider confirmation leaves the flow retryable rather than
//! dead-ended.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

use mentorpay_core::aggregate::compute_payout_total;
use mentorpay_core::error::ValidationError;
use mentorpay_core::models::{Session, User};

use crate::auth::AuthSession;
use crate::gateway::{decode_records, extract_records_lenient, ApiClient, GatewayError};
use crate::refresh::RefreshTrigger;

// ============================================================================
// PUBLIC API
// ============================================================================

#[derive(Error, Debug)]
pub enum PaymentFlowError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("invalid flow step: expected {expected}, flow is at {actual}")]
    State { expected: &'static str, actual: String },
}

/// Where the flow currently stands. Validation failures never advance or
/// regress the state; gateway failures during submission land in `Failed`.
#[derive(Debug, Clone)]
pub enum FlowState {
    Idle,
    MentorSelected {
        mentor: Box<User>,
    },
    SessionsSelected {
        mentor: Box<User>,
        selected: Vec<i64>,
    },
    Submitting,
    /// `client_secret` is present when the card provider requires an
    /// interactive confirmation; absent when the backend created the payment
    /// as directly confirmable.
    AwaitingProviderConfirmation {
        payment_id: i64,
        client_secret: Option<String>,
    },
    Completed {
        payment_id: i64,
    },
    Failed {
        step: &'static str,
        message: String,
    },
}

impl FlowState {
    fn label(&self) -> &'static str {
        match self {
            FlowState::Idle => "Idle",
            FlowState::MentorSelected { .. } => "MentorSelected",
            FlowState::SessionsSelected { .. } => "SessionsSelected",
            FlowState::Submitting => "Submitting",
            FlowState::AwaitingProviderConfirmation { .. } => "AwaitingProviderConfirmation",
            FlowState::Completed { .. } => "Completed",
            FlowState::Failed { .. } => "Failed",
        }
    }
}

/// Outcome of a successful `submit`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedPayment {
    pub payment_id: i64,
    pub total: Decimal,
    pub client_secret: Option<String>,
}

pub struct PaymentFlow {
    auth: AuthSession,
    trigger: RefreshTrigger,
    mentors: Vec<User>,
    /// Session cache merged by id; selecting a new mentor never drops other
    /// mentors' cached entries.
    sessions: HashMap<i64, Session>,
    state: FlowState,
}

impl PaymentFlow {
    pub fn new(auth: AuthSession, trigger: RefreshTrigger) -> Self {
        Self {
            auth,
            trigger,
            mentors: Vec::new(),
            sessions: HashMap::new(),
            state: FlowState::Idle,
        }
    }

    pub fn state(&self) -> &FlowState {
        &self.state
    }

    /// Replaces the known-mentor snapshot used by `select_mentor` validation.
    pub fn set_mentor_list(&mut self, mentors: Vec<User>) {
        self.mentors = mentors;
    }

    /// Approved sessions currently cached for a mentor.
    pub fn approved_sessions(&self, mentor_id: i64) -> Vec<&Session> {
        self.sessions
            .values()
            .filter(|s| s.is_payable() && s.mentor.id == mentor_id)
            .collect()
    }

    /// Validates the mentor against the known list, then fetches the full
    /// profile and the mentor's approved sessions concurrently.
    pub async fn select_mentor(&mut self, mentor_id: i64) -> Result<(), PaymentFlowError> {
        if !self.mentors.iter().any(|m| m.id == mentor_id) {
            return Err(ValidationError::UnknownMentor(mentor_id).into());
        }

        let client = self.auth.client().clone();
        let profile = self.auth.with_auth_retry(|| {
            let client = client.clone();
            async move { fetch_profile(&client, mentor_id).await }
        });
        let approved = self.auth.with_auth_retry(|| {
            let client = client.clone();
            async move { fetch_approved_sessions(&client, mentor_id).await }
        });
        let (profile, approved) = futures::try_join!(profile, approved)?;

        for session in approved {
            self.sessions.insert(session.id, session);
        }
        self.state = FlowState::MentorSelected {
            mentor: Box::new(profile),
        };
        Ok(())
    }

    /// Records the selected session ids. Only legal once a mentor is chosen;
    /// re-selection is allowed until submission.
    pub fn select_sessions(&mut self, ids: Vec<i64>) -> Result<(), PaymentFlowError> {
        let mentor = match &self.state {
            FlowState::MentorSelected { mentor }
            | FlowState::SessionsSelected { mentor, .. } => mentor.clone(),
            other => {
                return Err(PaymentFlowError::State {
                    expected: "MentorSelected",
                    actual: other.label().to_string(),
                })
            }
        };
        self.state = FlowState::SessionsSelected {
            mentor,
            selected: ids,
        };
        Ok(())
    }

    /// Creates the payment. All local checks run first; a validation failure
    /// produces no network traffic and leaves the selection intact. The
    /// mutation is preceded by a connectivity probe so an unreachable server
    /// is reported as such rather than as a generic request error.
    pub async fn submit(&mut self) -> Result<CreatedPayment, PaymentFlowError> {
        let (mentor, selected) = match &self.state {
            FlowState::SessionsSelected { mentor, selected } => {
                (mentor.as_ref().clone(), selected.clone())
            }
            other => {
                return Err(PaymentFlowError::State {
                    expected: "SessionsSelected",
                    actual: other.label().to_string(),
                })
            }
        };

        let total = self.validate_selection(&mentor, &selected)?;

        self.state = FlowState::Submitting;
        let created = match self.create_payment(mentor.id, &selected, total).await {
            Ok(created) => created,
            Err(e) => {
                self.state = FlowState::Failed {
                    step: "create-payment",
                    message: e.to_string(),
                };
                return Err(e.into());
            }
        };

        tracing::info!(
            payment_id = created.payment_id,
            mentor_id = mentor.id,
            total = %created.total,
            interactive = created.client_secret.is_some(),
            "payment created"
        );
        self.state = FlowState::AwaitingProviderConfirmation {
            payment_id: created.payment_id,
            client_secret: created.client_secret.clone(),
        };
        Ok(created)
    }

    /// Provider widget reported success; finalize with the backend.
    pub async fn provider_succeeded(
        &mut self,
        transaction_id: &str,
    ) -> Result<i64, PaymentFlowError> {
        self.confirm_payment(transaction_id).await
    }

    /// Provider widget reported failure. Terminal for this attempt; the
    /// payment record stays PENDING on the backend.
    pub fn provider_failed(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(%message, "provider confirmation failed");
        self.state = FlowState::Failed {
            step: "provider",
            message,
        };
    }

    /// Marks the created payment completed on the backend. A gateway failure
    /// here keeps the flow in `AwaitingProviderConfirmation` so confirmation
    /// can be retried.
    pub async fn confirm_payment(
        &mut self,
        transaction_id: &str,
    ) -> Result<i64, PaymentFlowError> {
        let payment_id = match &self.state {
            FlowState::AwaitingProviderConfirmation { payment_id, .. } => *payment_id,
            other => {
                return Err(PaymentFlowError::State {
                    expected: "AwaitingProviderConfirmation",
                    actual: other.label().to_string(),
                })
            }
        };

        let client = self.auth.client().clone();
        client.probe().await?;

        let txn = transaction_id.to_string();
        self.auth
            .with_auth_retry(|| {
                let client = client.clone();
                let txn = txn.clone();
                async move {
                    client
                        .post(
                            &format!(
                                "/api/payments/{}/process-stripe-payment?paymentIntentId={}",
                                payment_id, txn
                            ),
                            None,
                        )
                        .await
                }
            })
            .await?;

        tracing::info!(payment_id, "payment confirmed");
        self.state = FlowState::Completed { payment_id };
        self.trigger.fire();
        Ok(payment_id)
    }

    /// Back to square one, keeping the session cache.
    pub fn reset(&mut self) {
        self.state = FlowState::Idle;
    }

    /// Resumes confirmation of an already-created payment, e.g. after a
    /// process restart. The provider secret is gone at that point; only the
    /// direct confirmation path remains.
    pub fn resume(&mut self, payment_id: i64) {
        self.state = FlowState::AwaitingProviderConfirmation {
            payment_id,
            client_secret: None,
        };
    }

    // ------------------------------------------------------------------
    // INTERNAL HELPERS
    // ------------------------------------------------------------------

    /// Every check runs before any network call: bank details, non-empty
    /// selection, and per-session existence, approval and ownership.
    fn validate_selection(
        &self,
        mentor: &User,
        selected: &[i64],
    ) -> Result<Decimal, ValidationError> {
        let missing = mentor.missing_bank_fields();
        if !missing.is_empty() {
            return Err(ValidationError::IncompleteBankDetails(missing.join(", ")));
        }
        if selected.is_empty() {
            return Err(ValidationError::EmptySelection);
        }

        let mut picked = Vec::with_capacity(selected.len());
        for id in selected {
            let session = self
                .sessions
                .get(id)
                .ok_or(ValidationError::UnknownSession(*id))?;
            if !session.is_payable() {
                return Err(ValidationError::SessionNotApproved(*id));
            }
            if session.mentor.id != mentor.id {
                return Err(ValidationError::SessionMentorMismatch {
                    session_id: *id,
                    mentor_id: mentor.id,
                });
            }
            picked.push(session);
        }

        Ok(compute_payout_total(picked))
    }

    async fn create_payment(
        &self,
        mentor_id: i64,
        selected: &[i64],
        total: Decimal,
    ) -> Result<CreatedPayment, GatewayError> {
        let client = self.auth.client().clone();
        client.probe().await?;

        let body = json!({
            "mentorId": mentor_id,
            "sessionIds": selected,
            "totalAmount": total,
        });
        let response = self
            .auth
            .with_auth_retry(|| {
                let client = client.clone();
                let body = body.clone();
                async move { client.post("/api/payments", Some(&body)).await }
            })
            .await?;

        let created: CreatedPaymentBody =
            serde_json::from_value(response.clone()).map_err(|e| GatewayError::Api {
                status: 200,
                message: format!("unreadable payment creation response: {e}"),
            })?;
        Ok(CreatedPayment {
            payment_id: created.id,
            total,
            client_secret: created.client_secret,
        })
    }
}

/// Requests a receipt PDF for a completed payment; returns the receipt URL
/// when the backend reports one.
pub async fn generate_receipt(
    auth: &AuthSession,
    payment_id: i64,
) -> Result<Option<String>, GatewayError> {
    let client = auth.client().clone();
    let value = auth
        .with_auth_retry(|| {
            let client = client.clone();
            async move {
                client
                    .post(&format!("/api/payments/{}/generate-receipt", payment_id), None)
                    .await
            }
        })
        .await?;
    Ok(value
        .get("receiptUrl")
        .and_then(|v| v.as_str())
        .map(String::from))
}

/// Emails the receipt to the mentor.
pub async fn send_receipt(auth: &AuthSession, payment_id: i64) -> Result<(), GatewayError> {
    let client = auth.client().clone();
    auth.with_auth_retry(|| {
        let client = client.clone();
        async move {
            client
                .post(&format!("/api/payments/{}/send-receipt", payment_id), None)
                .await
        }
    })
    .await?;
    Ok(())
}

// ============================================================================
// INTERNAL HELPERS
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatedPaymentBody {
    id: i64,
    #[serde(default)]
    client_secret: Option<String>,
}

async fn fetch_profile(client: &ApiClient, user_id: i64) -> Result<User, GatewayError> {
    let value = client.get(&format!("/api/users/{}", user_id)).await?;
    serde_json::from_value(value).map_err(|e| GatewayError::Api {
        status: 200,
        message: format!("unreadable user profile: {e}"),
    })
}

async fn fetch_approved_sessions(
    client: &ApiClient,
    mentor_id: i64,
) -> Result<Vec<Session>, GatewayError> {
    let value = client
        .get(&format!("/api/sessions/mentor/{}/status/APPROVED", mentor_id))
        .await?;
    Ok(decode_records(extract_records_lenient(&value)))
}

// ============================================================================
// TESTS
// ============================================================================
