//! Launch detail and the book/cancel toggle.

use rocket_graphql::{CachePolicy, GraphqlClient, GraphqlResponse};
use tracing::{debug, info};

use crate::alert::Alert;
use crate::error::ReserverError;
use crate::operations::{
    BookTrip, BookTripVariables, CancelTrip, CancelTripVariables, LaunchDetail, LaunchDetails,
    LaunchDetailsVariables, TripUpdate,
};
use crate::session::Session;

/// Which way a booking changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TripAction {
    /// Reserve a seat.
    Book,
    /// Give the seat back.
    Cancel,
}

impl TripAction {
    /// The change that toggles the current booking state.
    pub const fn toggling(is_booked: bool) -> Self {
        if is_booked { Self::Cancel } else { Self::Book }
    }

    /// Label of the button that performs this action.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Book => "Book now!",
            Self::Cancel => "Cancel trip",
        }
    }

    /// Alert reporting a server answer to this action.
    pub fn alert(self, update: &TripUpdate) -> Alert {
        let (title, default_message) = match (self, update.success) {
            (Self::Book, true) => ("Success!", "Trips booked successfully."),
            (Self::Book, false) => ("Could not book trip", "Unknown failure."),
            (Self::Cancel, true) => ("Trip cancelled", "Your trip has been cancelled."),
            (Self::Cancel, false) => ("Could not cancel trip", "Unknown failure."),
        };
        Alert::new(
            title,
            update.message.as_deref().unwrap_or(default_message),
        )
    }
}

/// Detail page of one launch.
#[derive(Debug, Clone)]
pub struct LaunchDetailFlow {
    client: GraphqlClient,
    session: Session,
    launch_id: String,
    launch: Option<LaunchDetail>,
}

impl LaunchDetailFlow {
    /// Nothing is fetched until [`Self::load`].
    pub fn new(client: GraphqlClient, session: Session, launch_id: impl Into<String>) -> Self {
        Self {
            client,
            session,
            launch_id: launch_id.into(),
            launch: None,
        }
    }

    /// Launch id shown by this page.
    pub fn launch_id(&self) -> &str {
        &self.launch_id
    }

    /// The last loaded launch.
    pub const fn launch(&self) -> Option<&LaunchDetail> {
        self.launch.as_ref()
    }

    /// Load the launch. Without `force_reload` this is served from cache
    /// when possible and skipped when the launch is already shown.
    pub async fn load(&mut self, force_reload: bool) -> Result<Vec<Alert>, ReserverError> {
        if !force_reload
            && self
                .launch
                .as_ref()
                .is_some_and(|launch| launch.id == self.launch_id)
        {
            return Ok(Vec::new());
        }

        let policy = if force_reload {
            CachePolicy::FetchIgnoringCache
        } else {
            CachePolicy::UseCacheElseFetch
        };
        let response = self
            .client
            .fetch::<LaunchDetails>(
                LaunchDetailsVariables {
                    launch_id: self.launch_id.clone(),
                },
                policy,
            )
            .await?;
        debug!(launch = %self.launch_id, cached = response.is_cached(), "launch loaded");

        let alerts: Vec<Alert> = Alert::for_graphql_errors(&response.errors)
            .into_iter()
            .collect();
        match response.data.and_then(|data| data.launch) {
            Some(launch) => self.launch = Some(launch),
            None if alerts.is_empty() => {
                return Err(ReserverError::LaunchNotFound {
                    id: self.launch_id.clone(),
                });
            }
            None => {}
        }
        Ok(alerts)
    }

    /// Book the launch, or cancel the booking when it is already booked,
    /// then reload it bypassing the cache.
    ///
    /// Without a login this fails with [`ReserverError::LoginRequired`]
    /// before any request.
    pub async fn book_or_cancel(&mut self) -> Result<Vec<Alert>, ReserverError> {
        if !self.session.is_logged_in()? {
            return Err(ReserverError::LoginRequired);
        }

        let mut alerts = self.load(false).await?;
        let Some(is_booked) = self.launch.as_ref().map(|launch| launch.is_booked) else {
            return Ok(alerts);
        };

        let action = TripAction::toggling(is_booked);
        let response = self.change_trip(action).await?;
        if let Some(update) = &response.data {
            alerts.push(action.alert(update));
        }
        alerts.extend(Alert::for_graphql_errors(&response.errors));
        let success = response.data.as_ref().is_some_and(|update| update.success);
        info!(launch = %self.launch_id, ?action, success, "trip changed");

        match self.load(true).await {
            Ok(reload_alerts) => alerts.extend(reload_alerts),
            Err(ReserverError::Client(err)) => alerts.push(Alert::for_error(&err)),
            Err(err) => return Err(err),
        }
        Ok(alerts)
    }

    async fn change_trip(
        &self,
        action: TripAction,
    ) -> Result<GraphqlResponse<TripUpdate>, ReserverError> {
        let id = self.launch_id.clone();
        let response = match action {
            TripAction::Book => {
                let response = self.client.mutate::<BookTrip>(BookTripVariables { id }).await?;
                GraphqlResponse {
                    data: response.data.map(|data| data.book_trips),
                    errors: response.errors,
                    extensions: response.extensions,
                    source: response.source,
                }
            }
            TripAction::Cancel => {
                let response = self
                    .client
                    .mutate::<CancelTrip>(CancelTripVariables { launch_id: id })
                    .await?;
                GraphqlResponse {
                    data: response.data.map(|data| data.cancel_trip),
                    errors: response.errors,
                    extensions: response.extensions,
                    source: response.source,
                }
            }
        };
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(success: bool, message: Option<&str>) -> TripUpdate {
        TripUpdate {
            success,
            message: message.map(ToString::to_string),
        }
    }

    #[test]
    fn toggling_picks_the_opposite_state() {
        assert_eq!(TripAction::toggling(true), TripAction::Cancel);
        assert_eq!(TripAction::toggling(false), TripAction::Book);
        assert_eq!(TripAction::Book.label(), "Book now!");
    }

    #[test]
    fn alerts_prefer_the_server_message() {
        let alert = TripAction::Book.alert(&update(true, Some("trips booked successfully")));
        assert_eq!(
            alert,
            Alert::new("Success!", "trips booked successfully")
        );
        let alert = TripAction::Cancel.alert(&update(false, None));
        assert_eq!(alert, Alert::new("Could not cancel trip", "Unknown failure."));
        let alert = TripAction::Cancel.alert(&update(true, None));
        assert_eq!(
            alert,
            Alert::new("Trip cancelled", "Your trip has been cancelled.")
        );
        let alert = TripAction::Book.alert(&update(false, Some("launch is full")));
        assert_eq!(alert.title, "Could not book trip");
    }
}
