use std::sync::Arc;

use rocket_credentials::{Credential, CredentialStore, MemoryCredentialStore};
use rocket_graphql::{GraphqlClient, PageLimit, RetryPolicy};
use rocket_reserver::{
    Alert, LaunchDetailFlow, LaunchPager, ReserverError, Session, load_all_launches,
};
use rocket_testkit::MockGraphqlServer;
use serde_json::{Value, json};

struct Harness {
    server: MockGraphqlServer,
    store: Arc<dyn CredentialStore>,
    client: GraphqlClient,
}

impl Harness {
    async fn new(store: MemoryCredentialStore) -> Self {
        rocket_testkit::init_test_tracing();
        let server = MockGraphqlServer::start().await;
        let store: Arc<dyn CredentialStore> = Arc::new(store);
        let client = GraphqlClient::builder(server.url())
            .with_retry_policy(RetryPolicy::never())
            .with_credential_store(Arc::clone(&store))
            .build()
            .unwrap();
        Self {
            server,
            store,
            client,
        }
    }

    async fn logged_in() -> Self {
        Self::new(MemoryCredentialStore::with_credential(
            Credential::new("abc123").unwrap(),
        ))
        .await
    }

    async fn logged_out() -> Self {
        Self::new(MemoryCredentialStore::new()).await
    }

    fn session(&self) -> Session {
        Session::new(self.client.clone(), Arc::clone(&self.store))
    }

    fn detail(&self, id: &str) -> LaunchDetailFlow {
        LaunchDetailFlow::new(self.client.clone(), self.session(), id)
    }
}

fn launch(id: &str) -> Value {
    json!({ "id": id, "site": "KSC LC 39A", "mission": { "name": format!("Mission {id}"), "missionPatch": null } })
}

fn page(has_more: bool, cursor: &str, launches: Vec<Value>) -> Value {
    json!({ "data": { "launches": { "hasMore": has_more, "cursor": cursor, "launches": launches } } })
}

fn details(id: &str, is_booked: bool) -> Value {
    json!({ "data": { "launch": {
        "id": id,
        "site": "CCAFS SLC 40",
        "mission": { "name": "Starlink-3", "missionPatch": "https://images2.imgbox.com/9a/96/nLppz9HW_o.png" },
        "rocket": { "name": "Falcon 9", "type": "FT" },
        "isBooked": is_booked
    } } })
}

mod session {
    use super::*;

    #[tokio::test]
    async fn login_stores_the_returned_token() {
        let h = Harness::logged_out().await;
        h.server
            .respond("Login", json!({ "data": { "login": { "token": "bWVAZXhhbXBsZS5jb20=" } } }))
            .await;

        let session = h.session();
        assert!(!session.is_logged_in().unwrap());
        session.login(" me@example.com ").await.unwrap();

        assert!(session.is_logged_in().unwrap());
        assert_eq!(h.store.get().unwrap().unwrap().token(), "bWVAZXhhbXBsZS5jb20=");
        let requests = h.server.requests_for("Login").await;
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].variables(), &json!({ "email": "me@example.com" }));
    }

    #[tokio::test]
    async fn invalid_email_is_rejected_without_a_request() {
        let h = Harness::logged_out().await;
        for email in ["", "  ", "rocketman"] {
            let err = h.session().login(email).await.unwrap_err();
            assert!(matches!(err, ReserverError::InvalidEmail { .. }));
        }
        h.server.assert_no_requests().await;
    }

    #[tokio::test]
    async fn login_without_token_fails() {
        let h = Harness::logged_out().await;
        h.server
            .respond("Login", json!({ "data": { "login": null } }))
            .await;
        let err = h.session().login("me@example.com").await.unwrap_err();
        assert!(matches!(err, ReserverError::MissingToken { .. }));
        assert!(h.store.get().unwrap().is_none());
    }

    #[tokio::test]
    async fn login_errors_are_reported() {
        let h = Harness::logged_out().await;
        h.server
            .respond(
                "Login",
                json!({ "data": null, "errors": [{ "message": "email rejected" }] }),
            )
            .await;
        match h.session().login("me@example.com").await {
            Err(ReserverError::Server { messages }) => assert_eq!(messages, "email rejected"),
            other => panic!("expected server error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn logout_clears_the_store() {
        let h = Harness::logged_in().await;
        let session = h.session();
        assert!(session.logout().unwrap());
        assert!(!session.is_logged_in().unwrap());
        assert!(!session.logout().unwrap());
    }

    #[tokio::test]
    async fn expired_credentials_do_not_count() {
        let expired = Credential::new("old")
            .unwrap()
            .with_expiry(chrono::Utc::now() - chrono::Duration::minutes(5));
        let h = Harness::new(MemoryCredentialStore::with_credential(expired)).await;
        assert!(!h.session().is_logged_in().unwrap());
    }
}

mod pager {
    use super::*;

    async fn two_pages(h: &Harness) {
        h.server
            .respond_to_variables(
                "LaunchList",
                json!({ "cursor": null }),
                page(true, "c1", vec![launch("1"), Value::Null, launch("2")]),
            )
            .await;
        h.server
            .respond_to_variables(
                "LaunchList",
                json!({ "cursor": "c1" }),
                page(false, "c2", vec![launch("3")]),
            )
            .await;
    }

    fn ids(pager: &LaunchPager) -> Vec<&str> {
        pager.launches().iter().map(|l| l.id.as_str()).collect()
    }

    #[tokio::test]
    async fn accumulates_pages_until_has_more_is_false() {
        let h = Harness::logged_out().await;
        two_pages(&h).await;
        let mut pager = LaunchPager::new(h.client.clone());
        assert!(pager.has_more());

        assert_eq!(pager.load_more().await.unwrap().added, 2);
        assert_eq!(ids(&pager), vec!["1", "2"]);
        assert!(pager.has_more());

        assert_eq!(pager.load_more().await.unwrap().added, 1);
        assert_eq!(ids(&pager), vec!["1", "2", "3"]);
        assert!(!pager.has_more());

        let load = pager.load_more().await.unwrap();
        assert_eq!(load.added, 0);
        assert!(load.alerts.is_empty());
        h.server.assert_operation_count("LaunchList", 2).await;
        let cursors: Vec<_> = h
            .server
            .requests_for("LaunchList")
            .await
            .iter()
            .map(|r| r.variables()["cursor"].clone())
            .collect();
        assert_eq!(cursors, vec![Value::Null, json!("c1")]);
    }

    #[tokio::test]
    async fn failed_page_can_be_retried() {
        let h = Harness::logged_out().await;
        h.server.respond_status_times("LaunchList", 500, 1).await;
        two_pages(&h).await;
        let mut pager = LaunchPager::new(h.client.clone());

        let err = pager.load_more().await.unwrap_err();
        assert!(matches!(err, ReserverError::Client(_)));
        assert!(pager.launches().is_empty());

        assert_eq!(pager.load_more().await.unwrap().added, 2);
        assert_eq!(
            h.server.requests_for("LaunchList").await[1].variables()["cursor"],
            Value::Null
        );
    }

    #[tokio::test]
    async fn server_errors_become_alerts() {
        let h = Harness::logged_out().await;
        h.server
            .respond(
                "LaunchList",
                json!({ "data": null, "errors": [{ "message": "rate limited" }] }),
            )
            .await;
        let mut pager = LaunchPager::new(h.client.clone());
        let load = pager.load_more().await.unwrap();
        assert_eq!(load.alerts, vec![Alert::new("GraphQL Error(s)", "rate limited")]);
        assert!(pager.has_more());
    }

    #[tokio::test]
    async fn load_all_follows_cursors() {
        let h = Harness::logged_out().await;
        two_pages(&h).await;
        let launches = load_all_launches(&h.client, None).await.unwrap();
        let ids: Vec<_> = launches.iter().map(|l| l.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
    }

    #[tokio::test]
    async fn load_all_stops_at_the_limit() {
        let h = Harness::logged_out().await;
        two_pages(&h).await;
        let launches = load_all_launches(&h.client, Some(PageLimit::new(2)))
            .await
            .unwrap();
        assert_eq!(launches.len(), 2);
        h.server.assert_operation_count("LaunchList", 1).await;
    }
}

mod detail {
    use super::*;

    #[tokio::test]
    async fn load_uses_the_cache_unless_forced() {
        let h = Harness::logged_out().await;
        h.server.respond("LaunchDetails", details("109", false)).await;

        let mut first = h.detail("109");
        assert!(first.load(false).await.unwrap().is_empty());
        assert_eq!(first.launch().unwrap().rocket.as_ref().unwrap().rocket_type.as_deref(), Some("FT"));
        assert!(first.load(false).await.unwrap().is_empty());

        let mut second = h.detail("109");
        second.load(false).await.unwrap();
        h.server.assert_operation_count("LaunchDetails", 1).await;

        second.load(true).await.unwrap();
        h.server.assert_operation_count("LaunchDetails", 2).await;
    }

    #[tokio::test]
    async fn unknown_launch_is_an_error() {
        let h = Harness::logged_out().await;
        h.server
            .respond("LaunchDetails", json!({ "data": { "launch": null } }))
            .await;
        let err = h.detail("0").load(false).await.unwrap_err();
        assert!(matches!(err, ReserverError::LaunchNotFound { id } if id == "0"));
    }

    #[tokio::test]
    async fn booking_needs_a_login_and_sends_nothing() {
        let h = Harness::logged_out().await;
        let err = h.detail("109").book_or_cancel().await.unwrap_err();
        assert!(matches!(err, ReserverError::LoginRequired));
        h.server.assert_no_requests().await;
    }

    #[tokio::test]
    async fn books_an_unbooked_launch_then_reloads() {
        let h = Harness::logged_in().await;
        h.server
            .respond_times("LaunchDetails", details("109", false), 1)
            .await;
        h.server.respond("LaunchDetails", details("109", true)).await;
        h.server
            .respond(
                "BookTrip",
                json!({ "data": { "bookTrips": { "success": true, "message": "trips booked successfully" } } }),
            )
            .await;

        let mut flow = h.detail("109");
        let alerts = flow.book_or_cancel().await.unwrap();

        assert_eq!(
            alerts,
            vec![Alert::new("Success!", "trips booked successfully")]
        );
        assert!(flow.launch().unwrap().is_booked);
        h.server.assert_operation_count("LaunchDetails", 2).await;
        h.server.assert_operation_count("CancelTrip", 0).await;
        let booking = &h.server.requests_for("BookTrip").await[0];
        assert_eq!(booking.variables(), &json!({ "id": "109" }));
        assert_eq!(booking.header("authorization"), Some("Bearer abc123"));
    }

    #[tokio::test]
    async fn cancels_a_booked_launch() {
        let h = Harness::logged_in().await;
        h.server.respond("LaunchDetails", details("109", true)).await;
        h.server
            .respond(
                "CancelTrip",
                json!({ "data": { "cancelTrip": { "success": false, "message": null } } }),
            )
            .await;

        let mut flow = h.detail("109");
        let alerts = flow.book_or_cancel().await.unwrap();

        assert_eq!(
            alerts,
            vec![Alert::new("Could not cancel trip", "Unknown failure.")]
        );
        let cancel = &h.server.requests_for("CancelTrip").await[0];
        assert_eq!(cancel.variables(), &json!({ "launchId": "109" }));
        h.server.assert_operation_count("BookTrip", 0).await;
        h.server.assert_operation_count("LaunchDetails", 2).await;
    }

    #[tokio::test]
    async fn booking_errors_are_alerts() {
        let h = Harness::logged_in().await;
        h.server.respond("LaunchDetails", details("109", false)).await;
        h.server
            .respond(
                "BookTrip",
                json!({ "data": null, "errors": [{ "message": "launch is full" }] }),
            )
            .await;

        let alerts = h.detail("109").book_or_cancel().await.unwrap();
        assert_eq!(alerts, vec![Alert::new("GraphQL Error(s)", "launch is full")]);
    }

    #[tokio::test]
    async fn rejected_token_asks_for_login() {
        let h = Harness::logged_in().await;
        h.server.respond("LaunchDetails", details("109", false)).await;
        h.server.respond_status("BookTrip", 401, "unauthorized").await;

        let err = h.detail("109").book_or_cancel().await.unwrap_err();
        assert!(matches!(err, ReserverError::LoginRequired));
    }

    #[tokio::test]
    async fn failed_reload_is_reported_as_an_alert() {
        let h = Harness::logged_in().await;
        h.server
            .respond_times("LaunchDetails", details("109", false), 1)
            .await;
        h.server.respond_status("LaunchDetails", 502, "bad gateway").await;
        h.server
            .respond(
                "BookTrip",
                json!({ "data": { "bookTrips": { "success": true, "message": null } } }),
            )
            .await;

        let mut flow = h.detail("109");
        let alerts = flow.book_or_cancel().await.unwrap();
        assert_eq!(alerts[0], Alert::new("Success!", "Trips booked successfully."));
        assert_eq!(alerts[1].title, "Network Error");
        assert!(!flow.launch().unwrap().is_booked);
    }
}
