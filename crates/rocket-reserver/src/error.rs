//! Domain errors.

use rocket_credentials::CredentialError;
use rocket_graphql::GraphqlClientError;
use thiserror::Error;

use crate::config::ConfigError;

/// Errors that stop a launch flow.
#[derive(Debug, Error)]
pub enum ReserverError {
    /// Booking and cancelling need a logged-in session.
    #[error("you must log in to book or cancel trips")]
    LoginRequired,

    /// The email address cannot be used to log in.
    #[error("invalid email address {email:?}")]
    InvalidEmail {
        /// Address as entered.
        email: String,
    },

    /// The server accepted the login but sent no token back.
    #[error("login for {email} returned no token")]
    MissingToken {
        /// Address used.
        email: String,
    },

    /// The server has no launch with this id.
    #[error("launch {id} not found")]
    LaunchNotFound {
        /// Requested id.
        id: String,
    },

    /// The server answered with errors and no usable data.
    #[error("server reported errors: {messages}")]
    Server {
        /// Error messages, newline separated.
        messages: String,
    },

    /// Transport or protocol failure.
    #[error(transparent)]
    Client(GraphqlClientError),

    /// The credential store failed.
    #[error(transparent)]
    Credentials(#[from] CredentialError),

    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl From<GraphqlClientError> for ReserverError {
    fn from(err: GraphqlClientError) -> Self {
        if err.requires_login() {
            Self::LoginRequired
        } else {
            Self::Client(err)
        }
    }
}
