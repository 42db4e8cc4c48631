//! Caller identity.
//!
//! Authentication happens upstream. The gateway forwards the authenticated
//! principal as `x-actor-id` (UUID) and `x-actor-role` headers, which the
//! [`Actor`] extractor turns into a typed value. Requests without them are
//! rejected with 401.

use crate::errors::ServiceError;
use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ActorRole {
    /// Runs campaigns or events; owns fundraisers
    Organizer,
    /// Platform staff
    Operator,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: Uuid,
    pub role: ActorRole,
}

impl Actor {
    pub fn organizer(id: Uuid) -> Self {
        Self {
            id,
            role: ActorRole::Organizer,
        }
    }

    pub fn operator(id: Uuid) -> Self {
        Self {
            id,
            role: ActorRole::Operator,
        }
    }

    pub fn is_operator(&self) -> bool {
        self.role == ActorRole::Operator
    }

    /// Operators act on every fundraiser, organizers only on their own.
    pub fn can_access(&self, owner_id: Uuid) -> bool {
        self.is_operator() || self.id == owner_id
    }

    pub fn require_operator(&self) -> Result<(), ServiceError> {
        if self.is_operator() {
            Ok(())
        } else {
            Err(ServiceError::Forbidden(
                "operator role required for this action".to_string(),
            ))
        }
    }

    /// Key under which this caller's cash-out attempts are throttled.
    pub fn client_key(&self) -> String {
        format!("cashout:{}", self.id)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &'static str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| ServiceError::Unauthorized(format!("missing {} header", name)))
        };

        let id = Uuid::parse_str(header(ACTOR_ID_HEADER)?)
            .map_err(|_| ServiceError::Unauthorized("invalid actor id".to_string()))?;
        let role = ActorRole::from_str(header(ACTOR_ROLE_HEADER)?)
            .map_err(|_| ServiceError::Unauthorized("unknown actor role".to_string()))?;

        Ok(Actor { id, role })
    }
}
