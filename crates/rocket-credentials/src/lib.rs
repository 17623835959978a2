//! Rocket Credentials - bearer token storage.
//!
//! A [`Credential`] is an opaque token created on login, read on every
//! outgoing request and removed on logout. Stores implement
//! [`CredentialStore`] and are shared between concurrent requests.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

mod credential;
mod error;
mod store;

pub use credential::Credential;
pub use error::{CredentialError, CredentialResult};
pub use store::{CredentialStore, FileCredentialStore, LOGIN_KEY, MemoryCredentialStore};
