//! Lifecycle controller tests against a scripted mock control plane.

use std::time::Duration;

use sluice_e2e::{error, ok, MockControlPlane};
use sluice_rest::{RestClient, RestError, TunnelRequest};

const CREATED: &str = r#"{"id": "49958ce5ec9f49c796542e0c691455a6", "status": "new", "host": null}"#;
const RUNNING: &str =
    r#"{"status": "running", "user_shutdown": null, "host": "maki81134.tunnel.example.com"}"#;

fn init_test() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("sluice_rest=debug,sluice_e2e=debug")
        .with_test_writer()
        .try_init();
}

fn client_for(mock: &MockControlPlane) -> RestClient {
    RestClient::new(&mock.base_url(), "username", "password")
}

#[tokio::test]
async fn create_returns_handle_with_assigned_id_and_host() {
    init_test();
    let mock = MockControlPlane::start(vec![ok(CREATED), ok(RUNNING)]).await;
    let client = client_for(&mock);

    let tunnel = client
        .create(&TunnelRequest::default(), Duration::from_secs(60))
        .await
        .expect("create failed");

    assert_eq!(tunnel.id(), "49958ce5ec9f49c796542e0c691455a6");
    assert_eq!(tunnel.host(), Some("maki81134.tunnel.example.com"));

    let requests = mock.requests();
    assert_eq!(requests[0].method, "POST");
    assert_eq!(requests[0].uri, "/username/tunnels");
    assert_eq!(requests[1].method, "GET");
    assert_eq!(
        requests[1].uri,
        "/username/tunnels/49958ce5ec9f49c796542e0c691455a6"
    );
}

#[tokio::test]
async fn every_request_carries_basic_auth() {
    init_test();
    let mock = MockControlPlane::start(vec![ok("[]")]).await;
    let client = client_for(&mock);

    client.list().await.expect("list failed");

    let auth = mock.requests()[0]
        .header("authorization")
        .expect("no authorization header")
        .to_string();
    assert!(auth.starts_with("Basic "), "unexpected auth: {auth}");
}

#[tokio::test]
async fn unnamed_domainless_create_sends_the_default_domain() {
    init_test();
    let mock = MockControlPlane::start(vec![ok(CREATED), ok(RUNNING)]).await;
    let client = client_for(&mock);

    client
        .create(&TunnelRequest::default(), Duration::from_secs(60))
        .await
        .expect("create failed");

    let body = mock.requests()[0].json();
    assert_eq!(
        body["domain_names"],
        serde_json::json!(["sauce-connect.proxy"])
    );
    assert_eq!(body["use_kgp"], serde_json::json!(true));
}

#[tokio::test]
async fn create_times_out_when_status_never_reaches_running() {
    init_test();
    let mock = MockControlPlane::start(vec![
        ok(CREATED),
        ok(r#"{"status": "new", "user_shutdown": null}"#),
    ])
    .await;
    let client = client_for(&mock);

    let err = client
        .create(&TunnelRequest::default(), Duration::ZERO)
        .await
        .expect_err("create should have timed out");

    match err {
        RestError::Timeout { id, timeout } => {
            assert_eq!(id, "49958ce5ec9f49c796542e0c691455a6");
            assert_eq!(timeout, Duration::ZERO);
        }
        other => panic!("expected Timeout, got {other}"),
    }
}

#[tokio::test]
async fn server_error_message_is_surfaced_verbatim() {
    init_test();
    let mock = MockControlPlane::start(vec![error(
        400,
        r#"{"error": "Too many active org tunnels: 3 >= 2"}"#,
    )])
    .await;
    let client = client_for(&mock);

    let err = client
        .create(&TunnelRequest::default(), Duration::from_secs(1))
        .await
        .expect_err("create should have failed");

    match err {
        RestError::Request {
            status, message, ..
        } => {
            assert_eq!(status.as_u16(), 400);
            assert_eq!(message, "Too many active org tunnels: 3 >= 2");
        }
        other => panic!("expected Request, got {other}"),
    }
}

#[tokio::test]
async fn shutdown_reports_jobs_still_running() {
    init_test();
    let mock = MockControlPlane::start(vec![ok(r#"{"jobs_running": 2}"#)]).await;
    let client = client_for(&mock);

    let jobs = client
        .shutdown("fakeid", true)
        .await
        .expect("shutdown failed");

    assert_eq!(jobs, 2);
    let request = &mock.requests()[0];
    assert_eq!(request.method, "DELETE");
    assert_eq!(request.uri, "/username/tunnels/fakeid?wait_for_jobs=1");
}

#[tokio::test]
async fn shutdown_tolerates_an_empty_response_body() {
    init_test();
    let mock = MockControlPlane::start(vec![ok("")]).await;
    let client = client_for(&mock);

    let jobs = client
        .shutdown("fakeid", false)
        .await
        .expect("shutdown failed");

    assert_eq!(jobs, 0);
    assert_eq!(mock.requests()[0].uri, "/username/tunnels/fakeid");
}

#[tokio::test]
async fn status_reports_the_assigned_host() {
    init_test();
    let mock = MockControlPlane::start(vec![ok(RUNNING)]).await;
    let client = client_for(&mock);

    let status = client.status("fakeid").await.expect("status failed");

    assert_eq!(status.status, "running");
    assert_eq!(status.host.as_deref(), Some("maki81134.tunnel.example.com"));
}

const LISTING: &str = r#"[
  {"id": "fakeid", "tunnel_identifier": null, "domain_names": ["sauce-connect.proxy"]},
  {"id": "otherid", "tunnel_identifier": "staging", "domain_names": ["app.example.test"]}
]"#;

#[tokio::test]
async fn list_returns_every_entry() {
    init_test();
    let mock = MockControlPlane::start(vec![ok(LISTING)]).await;
    let client = client_for(&mock);

    let entries = client.list().await.expect("list failed");

    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].id, "fakeid");
    assert_eq!(entries[1].tunnel_identifier.as_deref(), Some("staging"));
    assert_eq!(mock.requests()[0].uri, "/username/tunnels?full=1");
}

#[tokio::test]
async fn find_matches_by_domain_when_no_name_is_given() {
    init_test();
    let mock = MockControlPlane::start(vec![ok(LISTING)]).await;
    let client = client_for(&mock);

    let matches = client
        .find("", &["sauce-connect.proxy".to_string()])
        .await
        .expect("find failed");

    assert_eq!(matches, vec!["fakeid"]);
}

#[tokio::test]
async fn find_prefers_the_name_over_domains() {
    init_test();
    let mock = MockControlPlane::start(vec![ok(LISTING)]).await;
    let client = client_for(&mock);

    let matches = client
        .find("staging", &["sauce-connect.proxy".to_string()])
        .await
        .expect("find failed");

    assert_eq!(matches, vec!["otherid"]);
}

const VERSIONS: &str = r#"{
  "Sauce Connect": {
    "download_url": "https://example.test/docs",
    "version": "4.3.16",
    "linux": {"build": 42, "download_url": "https://example.test/downloads/sc-new", "sha1": "123456"},
    "linux32": {"build": 42, "download_url": "https://example.test/downloads/sc-new", "sha1": "123456"},
    "osx": {"build": 42, "download_url": "https://example.test/downloads/sc-new", "sha1": "123456"},
    "win32": {"build": 42, "download_url": "https://example.test/downloads/sc-new", "sha1": "123456"}
  }
}"#;

#[tokio::test]
async fn latest_version_selects_the_platform_record() {
    init_test();
    let mock = MockControlPlane::start(vec![ok(VERSIONS)]).await;
    let client = client_for(&mock);

    let version = client
        .latest_version()
        .await
        .expect("checkversion failed")
        .expect("no record for this platform");

    assert_eq!(version.build, 42);
    assert_eq!(version.download_url, "https://example.test/downloads/sc-new");
    assert_eq!(mock.requests()[0].uri, "/versions.json");
}
