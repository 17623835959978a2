//! Live "trips booked" notifications.

use rocket_graphql::{GraphqlClient, OperationResult, SubscriptionHandle};

use crate::alert::Alert;
use crate::error::ReserverError;
use crate::operations::{TripsBooked, TripsBookedData, TripsBookedVariables};

/// Notification text for a booking push.
pub const TRIP_BOOKED_MESSAGE: &str = "A new trip was booked! 🚀";

/// Something the watcher reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// Someone booked `count` trips.
    TripsBooked {
        /// Trips in the triggering booking.
        count: i64,
    },
    /// The subscription reported a problem.
    Alert(Alert),
}

impl WatchEvent {
    /// Interpret one subscription push. Pushes with neither errors nor a
    /// count produce nothing.
    pub fn from_result(result: OperationResult<TripsBookedData>) -> Option<Self> {
        match result {
            Ok(response) => {
                if let Some(alert) = Alert::for_graphql_errors(&response.errors) {
                    return Some(Self::Alert(alert));
                }
                response
                    .data
                    .and_then(|data| data.trips_booked)
                    .map(|count| Self::TripsBooked { count })
            }
            Err(err) => Some(Self::Alert(Alert::for_error(&err))),
        }
    }

    /// Text shown to the user.
    pub fn message(&self) -> String {
        match self {
            Self::TripsBooked { .. } => TRIP_BOOKED_MESSAGE.to_string(),
            Self::Alert(alert) => format!("{}: {}", alert.title, alert.message),
        }
    }
}

/// Subscribe to bookings. `on_event` runs on a background task until the
/// handle is cancelled or the server ends the subscription.
pub async fn watch_trips<F>(
    client: &GraphqlClient,
    mut on_event: F,
) -> Result<SubscriptionHandle, ReserverError>
where
    F: FnMut(WatchEvent) + Send + 'static,
{
    let handle = client
        .subscribe::<TripsBooked, _>(TripsBookedVariables {}, move |result| {
            if let Some(event) = WatchEvent::from_result(result) {
                on_event(event);
            }
        })
        .await?;
    Ok(handle)
}
