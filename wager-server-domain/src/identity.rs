use std::{collections::HashMap, sync::Arc};

use log::{debug, info};

use crate::{IdentityId, ServiceError, ServiceResult, room::Seat};

pub const GUEST_DISPLAY_NAME: &str = "Guest Player";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub id: IdentityId,
    pub display_name: String,
    pub is_guest: bool,
}

impl Identity {
    pub fn guest() -> Self {
        let id = format!(
            "guest_{}_{:04x}",
            chrono::Utc::now().timestamp_millis(),
            rand::random::<u16>()
        );
        Identity {
            id,
            display_name: GUEST_DISPLAY_NAME.to_string(),
            is_guest: true,
        }
    }

    pub fn seat(&self) -> Seat {
        Seat {
            id: self.id.clone(),
            display_name: self.display_name.clone(),
        }
    }
}

/// What an identity provider knows about a credential holder.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedIdentity {
    pub id: IdentityId,
    pub display_name: String,
}

pub type ArcIdentityResolver = Arc<Box<dyn IdentityResolver + Send + Sync + 'static>>;

#[async_trait::async_trait]
pub trait IdentityResolver {
    async fn resolve(&self, token: &str) -> ServiceResult<ResolvedIdentity>;
}

/// Connections are never refused: a missing or rejected credential yields a
/// fresh guest.
pub async fn resolve_or_guest(resolver: &ArcIdentityResolver, token: Option<&str>) -> Identity {
    let Some(token) = token.map(str::trim).filter(|t| !t.is_empty()) else {
        let guest = Identity::guest();
        debug!("No credential supplied, connecting as {}", guest.id);
        return guest;
    };
    match resolver.resolve(token).await {
        Ok(resolved) => Identity {
            id: resolved.id,
            display_name: resolved.display_name,
            is_guest: false,
        },
        Err(e) => {
            let guest = Identity::guest();
            info!("Credential rejected ({}), connecting as {}", e, guest.id);
            guest
        }
    }
}

#[derive(Clone, Default)]
pub struct MockIdentityResolver {
    known: HashMap<String, ResolvedIdentity>,
}

impl MockIdentityResolver {
    pub fn with_token(mut self, token: &str, id: &str, display_name: &str) -> Self {
        self.known.insert(
            token.to_string(),
            ResolvedIdentity {
                id: id.to_string(),
                display_name: display_name.to_string(),
            },
        );
        self
    }
}

#[async_trait::async_trait]
impl IdentityResolver for MockIdentityResolver {
    async fn resolve(&self, token: &str) -> ServiceResult<ResolvedIdentity> {
        match self.known.get(token) {
            Some(resolved) => Ok(resolved.clone()),
            None => ServiceError::unauthorized("Unknown token"),
        }
    }
}
