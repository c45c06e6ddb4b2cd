//! Users and mentors.
//!
//! The backend encodes roles two different ways depending on the endpoint:
//! a bare string (`"ROLE_MENTOR"`) or an object (`{"name": "ROLE_MENTOR"}`).
//! Both are accepted here and normalized once; nothing downstream branches
//! on the wire shape.

use serde::{Deserialize, Serialize};

/// Role entry in either wire encoding.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Role {
    Name(String),
    Object { name: String },
    Other(serde_json::Value),
}

impl Role {
    pub fn name(&self) -> Option<&str> {
        match self {
            Role::Name(s) => Some(s),
            Role::Object { name } => Some(name),
            Role::Other(_) => None,
        }
    }

    pub fn is_mentor(&self) -> bool {
        matches!(self.name(), Some("ROLE_MENTOR") | Some("MENTOR"))
    }

    pub fn is_admin(&self) -> bool {
        matches!(self.name(), Some("ROLE_ADMIN") | Some("ADMIN"))
    }
}

/// Lightweight user reference as embedded in sessions, payments and
/// messages. Unknown fields from the eagerly-serialized backend entity are
/// ignored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserRef {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
}

impl UserRef {
    pub fn display_name(&self) -> &str {
        self.full_name
            .as_deref()
            .or(self.username.as_deref())
            .unwrap_or("(unnamed)")
    }
}

/// Full user profile, including the bank fields the admin flow verifies
/// before creating a payment.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub roles: Vec<Role>,
    #[serde(default)]
    pub bank_name: Option<String>,
    #[serde(default)]
    pub account_number: Option<String>,
    #[serde(default)]
    pub account_holder_name: Option<String>,
    #[serde(default)]
    pub ifsc_code: Option<String>,
    #[serde(default)]
    pub account_type: Option<String>,
    #[serde(default)]
    pub swift_code: Option<String>,
}

impl User {
    pub fn is_mentor(&self) -> bool {
        self.roles.iter().any(Role::is_mentor)
    }

    pub fn display_name(&self) -> &str {
        self.full_name
            .as_deref()
            .or(self.username.as_deref())
            .unwrap_or("(unnamed)")
    }

    /// Bank fields that must be non-empty before a payout can be created.
    pub fn missing_bank_fields(&self) -> Vec<&'static str> {
        fn blank(v: &Option<String>) -> bool {
            v.as_deref().map(str::trim).unwrap_or("").is_empty()
        }

        let mut missing = Vec::new();
        if blank(&self.bank_name) {
            missing.push("bankName");
        }
        if blank(&self.account_number) {
            missing.push("accountNumber");
        }
        if blank(&self.account_holder_name) {
            missing.push("accountHolderName");
        }
        missing
    }

    pub fn has_complete_bank_details(&self) -> bool {
        self.missing_bank_fields().is_empty()
    }

    pub fn to_ref(&self) -> UserRef {
        UserRef {
            id: self.id,
            username: self.username.clone(),
            full_name: self.full_name.clone(),
        }
    }
}
