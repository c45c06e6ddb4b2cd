//! Batched payout transactions.
//!
//! All tax/fee figures come from the backend fields; the hard-coded display
//! rates some clients fall back to are presentation-only and are never used
//! for computation here.

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::session::Session;
use super::user::UserRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Cancelled,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Completed => "COMPLETED",
            PaymentStatus::Failed => "FAILED",
            PaymentStatus::Cancelled => "CANCELLED",
        }
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(PaymentStatus::Pending),
            "COMPLETED" => Ok(PaymentStatus::Completed),
            "FAILED" => Ok(PaymentStatus::Failed),
            "CANCELLED" => Ok(PaymentStatus::Cancelled),
            other => Err(format!("unknown payment status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: i64,
    pub mentor: UserRef,
    /// Absent when the backend did not expand the join; displayed as
    /// "no session details", never an error.
    #[serde(default)]
    pub sessions: Option<Vec<Session>>,
    pub total_amount: Decimal,
    #[serde(default)]
    pub base_amount: Option<Decimal>,
    #[serde(default)]
    pub gst_amount: Option<Decimal>,
    #[serde(default)]
    pub gst_rate: Option<String>,
    #[serde(default)]
    pub platform_fee: Option<Decimal>,
    #[serde(default)]
    pub platform_fee_rate: Option<String>,
    #[serde(default)]
    pub other_deductions: Option<Decimal>,
    #[serde(default)]
    pub payment_date: Option<NaiveDateTime>,
    #[serde(default)]
    pub transaction_id: Option<String>,
    pub status: PaymentStatus,
    #[serde(default)]
    pub receipt_url: Option<String>,
    #[serde(default)]
    pub receipt_sent: bool,
    #[serde(default)]
    pub notes: Option<String>,
}

impl Payment {
    pub fn session_count(&self) -> Option<usize> {
        self.sessions.as_ref().map(Vec::len)
    }

    pub fn session_summary(&self) -> String {
        match self.session_count() {
            Some(n) => format!("{} session(s)", n),
            None => "no session details".to_string(),
        }
    }
}
