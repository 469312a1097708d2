//! Identity handed over by the session provider.
//!
//! The sync core does not take part in the sign-in protocol. It only needs to know
//! whether someone is signed in, who they are, and which bearer token to attach.

use serde::{Deserialize, Serialize};

use crate::error::{PlannerError, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    user_id: Option<String>,
    access_token: Option<String>,
}

impl Session {
    pub fn authenticated(user_id: impl Into<String>, access_token: Option<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            access_token,
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn is_authenticated(&self) -> bool {
        self.user_id.is_some()
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref()
    }

    /// The signed-in user id, or [`PlannerError::Unauthenticated`].
    pub fn require_user(&self) -> Result<&str> {
        self.user_id().ok_or(PlannerError::Unauthenticated)
    }
}
