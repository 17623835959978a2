use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use rocket_credentials::{Credential, CredentialStore, MemoryCredentialStore};
use rocket_testkit::ScriptedWsServer;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::mpsc;

use rocket_graphql::{
    AuthFailure, GraphqlClient, GraphqlClientError, GraphqlOperation, OperationKind,
    OperationResult, WsProtocol,
};

const WAIT: Duration = Duration::from_secs(5);

#[derive(Debug, Serialize)]
struct NoVars {}

#[derive(Debug, Deserialize, PartialEq)]
struct TripsBookedData {
    #[serde(rename = "tripsBooked")]
    trips_booked: Option<i64>,
}

struct TripsBooked;

impl GraphqlOperation for TripsBooked {
    type Variables = NoVars;
    type ResponseData = TripsBookedData;

    const QUERY: &'static str = "subscription TripsBooked { tripsBooked }";
    const OPERATION_NAME: &'static str = "TripsBooked";
    const KIND: OperationKind = OperationKind::Subscription;
}

struct MyTrips;

impl GraphqlOperation for MyTrips {
    type Variables = NoVars;
    type ResponseData = TripsBookedData;

    const QUERY: &'static str = "subscription MyTrips { tripsBooked }";
    const OPERATION_NAME: &'static str = "MyTrips";
    const KIND: OperationKind = OperationKind::Subscription;

    fn requires_auth() -> bool {
        true
    }
}

fn client_with_store(
    server: &ScriptedWsServer,
    protocol: WsProtocol,
    store: Arc<dyn CredentialStore>,
) -> GraphqlClient {
    GraphqlClient::builder("http://127.0.0.1:9/graphql")
        .with_subscription_url(server.url())
        .with_ws_protocol(protocol)
        .with_credential_store(store)
        .build()
        .unwrap()
}

fn client(server: &ScriptedWsServer, protocol: WsProtocol) -> GraphqlClient {
    let store = Arc::new(MemoryCredentialStore::with_credential(
        Credential::new("abc123").unwrap(),
    ));
    client_with_store(server, protocol, store)
}

fn trips(event: OperationResult<TripsBookedData>) -> Option<i64> {
    event.unwrap().data.unwrap().trips_booked
}

async fn next_event(
    rx: &mut mpsc::UnboundedReceiver<OperationResult<TripsBookedData>>,
) -> OperationResult<TripsBookedData> {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("event in time")
        .expect("subscription still open")
}

#[tokio::test]
async fn cancelling_one_subscription_leaves_the_other_running() {
    rocket_testkit::init_test_tracing();
    let server = ScriptedWsServer::start().await;
    let client = client(&server, WsProtocol::GraphqlWs);

    let (tx_a, mut rx_a) = mpsc::unbounded_channel();
    let (tx_b, mut rx_b) = mpsc::unbounded_channel();
    let a = client
        .subscribe::<TripsBooked, _>(NoVars {}, move |event| {
            let _ = tx_a.send(event);
        })
        .await
        .unwrap();
    let b = client
        .subscribe::<TripsBooked, _>(NoVars {}, move |event| {
            let _ = tx_b.send(event);
        })
        .await
        .unwrap();
    assert_ne!(a.id(), b.id());

    let started = server.wait_for_started(2).await;
    assert!(
        started
            .iter()
            .all(|op| op.operation_name.as_deref() == Some("TripsBooked"))
    );
    assert_eq!(server.connection_count(), 1);

    server.push_data(a.id(), json!({ "tripsBooked": 1 }));
    server.push_data(b.id(), json!({ "tripsBooked": 1 }));
    assert_eq!(trips(next_event(&mut rx_a).await), Some(1));
    assert_eq!(trips(next_event(&mut rx_b).await), Some(1));

    a.cancel();
    a.cancel();
    assert!(!a.is_active());
    server.wait_for_stop(a.id()).await;

    server.push_data(a.id(), json!({ "tripsBooked": 2 }));
    server.push_data(b.id(), json!({ "tripsBooked": 2 }));
    assert_eq!(trips(next_event(&mut rx_b).await), Some(2));
    assert!(rx_a.try_recv().is_err());
    assert!(b.is_active());
    assert_eq!(server.stopped(), vec![a.id().to_string()]);
}

#[tokio::test]
async fn connection_carries_bearer_token() {
    let server = ScriptedWsServer::start().await;
    let client = client(&server, WsProtocol::GraphqlWs);

    let _stream = client.subscribe_stream::<TripsBooked>(NoVars {}).await.unwrap();
    server.wait_for_started(1).await;

    let handshakes = server.handshakes();
    assert_eq!(handshakes.len(), 1);
    assert_eq!(handshakes[0].authorization.as_deref(), Some("Bearer abc123"));
    assert_eq!(handshakes[0].init_payload["Authorization"], "Bearer abc123");
    assert_eq!(handshakes[0].subprotocol.as_deref(), Some("graphql-ws"));
}

#[tokio::test]
async fn graphql_transport_ws_stream() {
    let server = ScriptedWsServer::start().await;
    let client = client(&server, WsProtocol::GraphqlTransportWs);

    let mut stream = client.subscribe_stream::<TripsBooked>(NoVars {}).await.unwrap();
    let id = stream.id().to_string();
    server.wait_for_started(1).await;
    assert_eq!(
        server.handshakes()[0].subprotocol.as_deref(),
        Some("graphql-transport-ws")
    );

    server.push_data(&id, json!({ "tripsBooked": 3 }));
    let event = tokio::time::timeout(WAIT, stream.next()).await.unwrap().unwrap();
    assert_eq!(trips(event), Some(3));

    drop(stream);
    server.wait_for_stop(&id).await;
}

#[tokio::test]
async fn server_error_ends_only_that_subscription() {
    let server = ScriptedWsServer::start().await;
    let client = client(&server, WsProtocol::GraphqlWs);

    let mut failing = client.subscribe_stream::<TripsBooked>(NoVars {}).await.unwrap();
    let mut healthy = client.subscribe_stream::<TripsBooked>(NoVars {}).await.unwrap();
    server.wait_for_started(2).await;

    server.push_error(failing.id(), "not allowed");
    let event = tokio::time::timeout(WAIT, failing.next()).await.unwrap().unwrap();
    match event {
        Err(GraphqlClientError::GraphqlErrors { errors }) => {
            assert_eq!(errors[0].message, "not allowed");
        }
        other => panic!("expected GraphQL errors, got {other:?}"),
    }
    assert!(tokio::time::timeout(WAIT, failing.next()).await.unwrap().is_none());

    server.push_data(healthy.id(), json!({ "tripsBooked": 5 }));
    let event = tokio::time::timeout(WAIT, healthy.next()).await.unwrap().unwrap();
    assert_eq!(trips(event), Some(5));
}

#[tokio::test]
async fn connection_loss_fails_every_subscription_then_reconnects() {
    let server = ScriptedWsServer::start().await;
    let client = client(&server, WsProtocol::GraphqlWs);

    let mut first = client.subscribe_stream::<TripsBooked>(NoVars {}).await.unwrap();
    let mut second = client.subscribe_stream::<TripsBooked>(NoVars {}).await.unwrap();
    server.wait_for_started(2).await;

    server.disconnect_all();
    for stream in [&mut first, &mut second] {
        let event = tokio::time::timeout(WAIT, stream.next()).await.unwrap().unwrap();
        let err = event.unwrap_err();
        assert!(matches!(err, GraphqlClientError::Subscription { .. }));
        assert!(err.is_transport());
        assert!(tokio::time::timeout(WAIT, stream.next()).await.unwrap().is_none());
    }

    let mut again = client.subscribe_stream::<TripsBooked>(NoVars {}).await.unwrap();
    server.wait_for_connections(2).await;
    server.wait_for_started(3).await;
    server.push_data(again.id(), json!({ "tripsBooked": 9 }));
    let event = tokio::time::timeout(WAIT, again.next()).await.unwrap().unwrap();
    assert_eq!(trips(event), Some(9));
}

#[tokio::test]
async fn subscribe_rejects_non_subscription_operations() {
    struct NotASubscription;

    impl GraphqlOperation for NotASubscription {
        type Variables = NoVars;
        type ResponseData = TripsBookedData;

        const QUERY: &'static str = "query Count { tripsBooked }";
        const OPERATION_NAME: &'static str = "Count";
    }

    let server = ScriptedWsServer::start().await;
    let client = client(&server, WsProtocol::GraphqlWs);

    let err = client
        .subscribe_stream::<NotASubscription>(NoVars {})
        .await
        .unwrap_err();
    assert!(matches!(err, GraphqlClientError::Protocol { .. }));
    assert_eq!(server.connection_count(), 0);
}

#[tokio::test]
async fn subscribing_while_the_connection_drops_never_ends_silently() {
    for _ in 0..10 {
        let server = ScriptedWsServer::start().await;
        let client = client(&server, WsProtocol::GraphqlWs);

        let first = client.subscribe_stream::<TripsBooked>(NoVars {}).await.unwrap();
        server.wait_for_started(1).await;
        server.disconnect_all();
        tokio::task::yield_now().await;

        let mut second = match client.subscribe_stream::<TripsBooked>(NoVars {}).await {
            Ok(stream) => stream,
            Err(err) => {
                assert!(err.is_transport(), "{err:?}");
                continue;
            }
        };
        match tokio::time::timeout(Duration::from_millis(500), second.next()).await {
            Ok(Some(event)) => {
                assert!(matches!(event, Err(GraphqlClientError::Subscription { .. })));
            }
            Ok(None) => panic!("subscription ended without reporting the lost connection"),
            Err(_) => {
                // Landed on a fresh connection and is live there.
                server.wait_for_connections(2).await;
                server.wait_for_started(2).await;
                server.push_data(second.id(), json!({ "tripsBooked": 1 }));
                assert_eq!(trips(next_stream_event(&mut second).await), Some(1));
            }
        }
        drop(first);
    }
}

async fn next_stream_event<S>(stream: &mut S) -> OperationResult<TripsBookedData>
where
    S: futures_util::Stream<Item = OperationResult<TripsBookedData>> + Unpin,
{
    tokio::time::timeout(WAIT, stream.next())
        .await
        .expect("event in time")
        .expect("subscription still open")
}

#[tokio::test]
async fn protected_subscription_reports_expired_credential() {
    let server = ScriptedWsServer::start().await;
    let expired = Credential::new("old")
        .unwrap()
        .with_expiry(chrono::Utc::now() - chrono::Duration::minutes(5));
    let client = client_with_store(
        &server,
        WsProtocol::GraphqlWs,
        Arc::new(MemoryCredentialStore::with_credential(expired)),
    );

    let err = client.subscribe_stream::<MyTrips>(NoVars {}).await.unwrap_err();
    assert!(matches!(
        err,
        GraphqlClientError::AuthenticationRequired {
            reason: AuthFailure::CredentialExpired,
            ..
        }
    ));
    assert!(err.requires_login());
    assert_eq!(server.connection_count(), 0);
}

#[tokio::test]
async fn protected_subscription_without_credential_never_connects() {
    let server = ScriptedWsServer::start().await;
    let client = client_with_store(
        &server,
        WsProtocol::GraphqlWs,
        Arc::new(MemoryCredentialStore::new()),
    );

    let err = client.subscribe_stream::<MyTrips>(NoVars {}).await.unwrap_err();
    assert!(matches!(
        err,
        GraphqlClientError::AuthenticationRequired {
            reason: AuthFailure::MissingCredential,
            ..
        }
    ));
    assert_eq!(server.connection_count(), 0);
}

#[tokio::test]
async fn changed_token_opens_a_new_connection() {
    let server = ScriptedWsServer::start().await;
    let store = Arc::new(MemoryCredentialStore::with_credential(
        Credential::new("abc123").unwrap(),
    ));
    let client = client_with_store(&server, WsProtocol::GraphqlWs, store.clone());

    let _before = client.subscribe_stream::<TripsBooked>(NoVars {}).await.unwrap();
    server.wait_for_started(1).await;
    let _same = client.subscribe_stream::<TripsBooked>(NoVars {}).await.unwrap();
    server.wait_for_started(2).await;
    assert_eq!(server.connection_count(), 1);

    store.set(Credential::new("fresh456").unwrap()).unwrap();
    let mut after = client.subscribe_stream::<TripsBooked>(NoVars {}).await.unwrap();
    server.wait_for_connections(2).await;
    server.wait_for_started(3).await;

    assert_eq!(server.connection_count(), 2);
    let handshakes = server.handshakes();
    assert_eq!(handshakes.len(), 2);
    assert_eq!(handshakes[1].authorization.as_deref(), Some("Bearer fresh456"));
    assert_eq!(handshakes[1].init_payload["Authorization"], "Bearer fresh456");
    assert_eq!(server.started()[2].connection, 1);

    server.push_data(after.id(), json!({ "tripsBooked": 4 }));
    assert_eq!(trips(next_stream_event(&mut after).await), Some(4));
}
