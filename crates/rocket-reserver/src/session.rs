//! Login state.

use std::sync::Arc;

use rocket_credentials::{Credential, CredentialStore};
use rocket_graphql::GraphqlClient;
use tracing::{debug, info};

use crate::error::ReserverError;
use crate::operations::{Login, LoginVariables};

/// Check that `email` looks like an address and return it trimmed.
pub fn validate_email(email: &str) -> Result<&str, ReserverError> {
    let trimmed = email.trim();
    if trimmed.is_empty() || !trimmed.contains('@') {
        return Err(ReserverError::InvalidEmail {
            email: email.to_string(),
        });
    }
    Ok(trimmed)
}

/// Logs in and out against a credential store shared with the client.
#[derive(Clone)]
pub struct Session {
    client: GraphqlClient,
    store: Arc<dyn CredentialStore>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("endpoint", &self.client.endpoint())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// `store` must be the store the client authenticates from.
    pub fn new(client: GraphqlClient, store: Arc<dyn CredentialStore>) -> Self {
        Self { client, store }
    }

    /// Whether an unexpired credential is stored.
    pub fn is_logged_in(&self) -> Result<bool, ReserverError> {
        Ok(self
            .store
            .get()?
            .is_some_and(|credential| !credential.is_expired()))
    }

    /// Log in with `email` and store the returned token.
    ///
    /// Nothing is sent when the address is invalid.
    pub async fn login(&self, email: &str) -> Result<(), ReserverError> {
        let email = validate_email(email)?;
        let response = self
            .client
            .mutate::<Login>(LoginVariables {
                email: email.to_string(),
            })
            .await?;

        let errors = response.error_messages();
        let token = response
            .data
            .and_then(|data| data.login)
            .and_then(|user| user.token)
            .filter(|token| !token.trim().is_empty());
        let token = match (token, errors) {
            (Some(token), _) => token,
            (None, Some(messages)) => return Err(ReserverError::Server { messages }),
            (None, None) => {
                return Err(ReserverError::MissingToken {
                    email: email.to_string(),
                });
            }
        };

        self.store.set(Credential::new(token)?)?;
        // Booking state in cached details belongs to the previous user.
        self.client.clear_cache();
        info!("logged in");
        Ok(())
    }

    /// Remove the stored credential. Returns whether one was present.
    pub fn logout(&self) -> Result<bool, ReserverError> {
        let was_logged_in = self.store.contains()?;
        self.store.clear()?;
        self.client.clear_cache();
        debug!(was_logged_in, "logged out");
        Ok(was_logged_in)
    }
}
