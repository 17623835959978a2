//! Rocket Reserver - launch browsing and trip booking.
//!
//! Typed operations of the launch API and the flows built on them:
//! - [`Session`]: log in with an email address, log out.
//! - [`LaunchPager`]: walk the launch list page by page.
//! - [`LaunchDetailFlow`]: view one launch, book or cancel a seat on it.
//! - [`watch_trips`]: live notifications when anyone books a trip.
//!
//! Outcomes the user should see are reported as [`Alert`]s; failures that
//! stop a flow are [`ReserverError`]s.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]

mod alert;
pub mod config;
mod detail;
mod error;
pub mod operations;
mod pager;
pub mod render;
mod session;
mod trace;
mod watcher;

pub use alert::Alert;
pub use config::{ConfigError, ConfigOverrides, DEFAULT_ENDPOINT, ReserverConfig};
pub use detail::{LaunchDetailFlow, TripAction};
pub use error::ReserverError;
pub use pager::{LaunchPager, PageLoad, load_all_launches};
pub use session::{Session, validate_email};
pub use trace::BodyTraceInterceptor;
pub use watcher::{TRIP_BOOKED_MESSAGE, WatchEvent, watch_trips};
