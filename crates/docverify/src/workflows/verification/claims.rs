use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use serde::{Deserialize, Serialize};

pub const ADMIN_ROLE: &str = "admin";
pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_ROLES_HEADER: &str = "x-actor-roles";

/// Identity handed over by the upstream authentication proxy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorClaims {
    pub subject: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl ActorClaims {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn user(subject: impl Into<String>) -> Self {
        Self {
            subject: Some(subject.into()),
            roles: Vec::new(),
        }
    }

    pub fn admin(subject: impl Into<String>) -> Self {
        Self {
            subject: Some(subject.into()),
            roles: vec![ADMIN_ROLE.to_string()],
        }
    }

    /// Authenticated subject, if any. Blank subjects count as anonymous.
    pub fn actor_id(&self) -> Option<&str> {
        self.subject
            .as_deref()
            .map(str::trim)
            .filter(|subject| !subject.is_empty())
    }

    pub fn is_authenticated(&self) -> bool {
        self.actor_id().is_some()
    }

    pub fn is_admin(&self) -> bool {
        self.is_authenticated()
            && self
                .roles
                .iter()
                .any(|role| role.trim().eq_ignore_ascii_case(ADMIN_ROLE))
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for ActorClaims
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
        };

        let subject = header(ACTOR_ID_HEADER);
        let roles = header(ACTOR_ROLES_HEADER)
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|role| !role.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self { subject, roles })
    }
}
