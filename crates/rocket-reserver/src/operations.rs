//! Typed operations of the launch API.

use rocket_graphql::{GraphqlOperation, OperationKind};
use serde::{Deserialize, Serialize};

/// Mission of a launch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mission {
    /// Mission name.
    pub name: Option<String>,
    /// Patch image URL, small in lists and large in details.
    pub mission_patch: Option<String>,
}

/// A launch as shown in the list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchSummary {
    /// Launch id.
    pub id: String,
    /// Launch site.
    pub site: Option<String>,
    /// Mission.
    pub mission: Option<Mission>,
}

/// One page of launches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchConnection {
    /// Whether another page follows.
    pub has_more: bool,
    /// Cursor of the last launch in this page.
    pub cursor: String,
    /// Launches; the server may return nulls.
    pub launches: Vec<Option<LaunchSummary>>,
}

/// Variables of [`LaunchList`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LaunchListVariables {
    /// Continue after this cursor; `None` for the first page.
    pub cursor: Option<String>,
}

/// `data` of [`LaunchList`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchListData {
    /// Page of launches.
    pub launches: LaunchConnection,
}

/// Paged launch list.
#[derive(Debug, Clone, Copy)]
pub struct LaunchList;

impl GraphqlOperation for LaunchList {
    type Variables = LaunchListVariables;
    type ResponseData = LaunchListData;

    const QUERY: &'static str = "query LaunchList($cursor: String) { \
        launches(after: $cursor) { hasMore cursor launches { id site \
        mission { name missionPatch(size: SMALL) } } } }";
    const OPERATION_NAME: &'static str = "LaunchList";
}

/// Rocket of a launch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rocket {
    /// Rocket name.
    pub name: Option<String>,
    /// Rocket type.
    #[serde(rename = "type")]
    pub rocket_type: Option<String>,
}

/// A launch as shown on its detail page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchDetail {
    /// Launch id.
    pub id: String,
    /// Launch site.
    pub site: Option<String>,
    /// Mission.
    pub mission: Option<Mission>,
    /// Rocket.
    pub rocket: Option<Rocket>,
    /// Whether the logged-in user holds a seat.
    pub is_booked: bool,
}

/// Variables of [`LaunchDetails`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchDetailsVariables {
    /// Launch id.
    pub launch_id: String,
}

/// `data` of [`LaunchDetails`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchDetailsData {
    /// The launch, `null` when unknown.
    pub launch: Option<LaunchDetail>,
}

/// One launch with rocket and booking state.
#[derive(Debug, Clone, Copy)]
pub struct LaunchDetails;

impl GraphqlOperation for LaunchDetails {
    type Variables = LaunchDetailsVariables;
    type ResponseData = LaunchDetailsData;

    const QUERY: &'static str = "query LaunchDetails($launchId: ID!) { \
        launch(id: $launchId) { id site mission { name missionPatch(size: LARGE) } \
        rocket { name type } isBooked } }";
    const OPERATION_NAME: &'static str = "LaunchDetails";
}

/// Result of a booking change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TripUpdate {
    /// Whether the change went through.
    pub success: bool,
    /// Server message.
    pub message: Option<String>,
}

/// Variables of [`BookTrip`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BookTripVariables {
    /// Launch id.
    pub id: String,
}

/// `data` of [`BookTrip`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookTripData {
    /// Outcome.
    pub book_trips: TripUpdate,
}

/// Book a seat on one launch.
#[derive(Debug, Clone, Copy)]
pub struct BookTrip;

impl GraphqlOperation for BookTrip {
    type Variables = BookTripVariables;
    type ResponseData = BookTripData;

    const QUERY: &'static str = "mutation BookTrip($id: ID!) { \
        bookTrips(launchIds: [$id]) { success message } }";
    const OPERATION_NAME: &'static str = "BookTrip";
    const KIND: OperationKind = OperationKind::Mutation;

    fn requires_auth() -> bool {
        true
    }
}

/// Variables of [`CancelTrip`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelTripVariables {
    /// Launch id.
    pub launch_id: String,
}

/// `data` of [`CancelTrip`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelTripData {
    /// Outcome.
    pub cancel_trip: TripUpdate,
}

/// Give up a booked seat.
#[derive(Debug, Clone, Copy)]
pub struct CancelTrip;

impl GraphqlOperation for CancelTrip {
    type Variables = CancelTripVariables;
    type ResponseData = CancelTripData;

    const QUERY: &'static str = "mutation CancelTrip($launchId: ID!) { \
        cancelTrip(launchId: $launchId) { success message } }";
    const OPERATION_NAME: &'static str = "CancelTrip";
    const KIND: OperationKind = OperationKind::Mutation;

    fn requires_auth() -> bool {
        true
    }
}

/// Variables of [`Login`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoginVariables {
    /// Email address.
    pub email: String,
}

/// The logged-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginUser {
    /// Bearer token for later requests.
    pub token: Option<String>,
}

/// `data` of [`Login`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginData {
    /// The user, `null` when the server refused.
    pub login: Option<LoginUser>,
}

/// Exchange an email address for a token.
#[derive(Debug, Clone, Copy)]
pub struct Login;

impl GraphqlOperation for Login {
    type Variables = LoginVariables;
    type ResponseData = LoginData;

    const QUERY: &'static str = "mutation Login($email: String!) { login(email: $email) { token } }";
    const OPERATION_NAME: &'static str = "Login";
    const KIND: OperationKind = OperationKind::Mutation;
}

/// Variables of [`TripsBooked`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TripsBookedVariables {}

/// `data` of [`TripsBooked`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TripsBookedData {
    /// Number of trips booked by the triggering request.
    pub trips_booked: Option<i64>,
}

/// Pushed whenever anyone books trips.
#[derive(Debug, Clone, Copy)]
pub struct TripsBooked;

impl GraphqlOperation for TripsBooked {
    type Variables = TripsBookedVariables;
    type ResponseData = TripsBookedData;

    const QUERY: &'static str = "subscription TripsBooked { tripsBooked }";
    const OPERATION_NAME: &'static str = "TripsBooked";
    const KIND: OperationKind = OperationKind::Subscription;
}
