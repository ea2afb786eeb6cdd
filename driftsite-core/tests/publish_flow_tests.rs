//! End-to-end orchestrator scenarios: scripted relays, a real in-process
//! blob server, and a local signer.

use std::collections::HashMap;
use std::fs;
use std::sync::{Arc, Mutex};

use axum::body::Bytes;
use axum::extract::{Path as UrlPath, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, put};
use axum::Router;
use base64::Engine;
use ring::digest::{Context, SHA256};
use tempfile::{tempdir, TempDir};
use tokio_util::sync::CancellationToken;

use driftsite_core::event::{build, kinds};
use driftsite_core::relay::{ClientMessage, MockConnector, MockTransport, RelayError, SentLog};
use driftsite_core::{
    Event, FileEntry, Keys, LocalSigner, PublishError, PublishOptions, Publisher, Signer,
};

fn sha256_hex(data: &[u8]) -> String {
    let mut context = Context::new(&SHA256);
    context.update(data);
    hex::encode(context.finish().as_ref())
}

type BlobStore = Arc<Mutex<HashMap<String, Vec<u8>>>>;

fn auth_ok(headers: &HeaderMap, action: &str) -> bool {
    let Some(value) = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
    else {
        return false;
    };
    let Some(b64) = value.strip_prefix("Nostr ") else {
        return false;
    };
    let Ok(bytes) = base64::engine::general_purpose::STANDARD.decode(b64) else {
        return false;
    };
    let Ok(event) = serde_json::from_slice::<Event>(&bytes) else {
        return false;
    };
    event.kind == kinds::BLOB_AUTH && event.verify().is_ok() && event.tag_value("t") == Some(action)
}

async fn handle_head(
    State(store): State<BlobStore>,
    UrlPath(hash): UrlPath<String>,
) -> StatusCode {
    if store.lock().unwrap().contains_key(&hash) {
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    }
}

async fn handle_upload(
    State(store): State<BlobStore>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    if !auth_ok(&headers, "upload") {
        return StatusCode::UNAUTHORIZED;
    }
    store.lock().unwrap().insert(sha256_hex(&body), body.to_vec());
    StatusCode::OK
}

async fn handle_delete(
    State(store): State<BlobStore>,
    UrlPath(hash): UrlPath<String>,
    headers: HeaderMap,
) -> StatusCode {
    if !auth_ok(&headers, "delete") {
        return StatusCode::UNAUTHORIZED;
    }
    store.lock().unwrap().remove(&hash);
    StatusCode::OK
}

/// Starts a protocol-faithful blob server on an ephemeral port.
async fn start_blob_server() -> (String, BlobStore) {
    let store: BlobStore = Arc::new(Mutex::new(HashMap::new()));
    let app = Router::new()
        .route("/upload", put(handle_upload))
        .route("/:hash", get(handle_head).delete(handle_delete))
        .with_state(Arc::clone(&store));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), store)
}

/// Relays that answer fetches with `served` and accept every publish,
/// logging all frames.
fn accepting_relays(served: Vec<Event>, log: SentLog) -> Arc<MockConnector> {
    Arc::new(MockConnector::new(move |url| {
        Ok(MockTransport::new()
            .for_url(url)
            .auto_ok()
            .serve_events(served.clone())
            .with_log(Arc::clone(&log)))
    }))
}

fn new_log() -> SentLog {
    Arc::new(Mutex::new(Vec::new()))
}

fn published_events(log: &SentLog) -> Vec<Event> {
    log.lock()
        .unwrap()
        .iter()
        .filter_map(|frame| match &frame.frame {
            ClientMessage::Event(event) => Some(event.clone()),
            _ => None,
        })
        .collect()
}

fn site_with(files: &[(&str, &str)]) -> TempDir {
    let dir = tempdir().unwrap();
    for (name, content) in files {
        if let Some(parent) = std::path::Path::new(name).parent() {
            fs::create_dir_all(dir.path().join(parent)).unwrap();
        }
        fs::write(dir.path().join(name), content).unwrap();
    }
    dir
}

fn options(dir: &TempDir, servers: Vec<String>) -> PublishOptions {
    let mut options = PublishOptions::new(dir.path());
    options.relays = vec!["wss://r1.example".to_string(), "wss://r2.example".to_string()];
    options.servers = servers;
    options
}

/// Announcement for a file as it would already exist on the relays.
fn remote_announcement(signer: &LocalSigner, path: &str, content: &str) -> Event {
    let entry = FileEntry {
        path: path.to_string(),
        size: content.len() as u64,
        hash: sha256_hex(content.as_bytes()),
        media_type: "text/html".to_string(),
        content: None,
        source_event: None,
    };
    signer.sign_template(build::file_announcement(&entry))
}

#[tokio::test]
async fn test_fresh_publish_stores_and_announces_everything() {
    let site = site_with(&[("index.html", "<h1>hi</h1>"), ("style.css", "body{}")]);
    let (server, store) = start_blob_server().await;
    let log = new_log();
    let keys = Keys::generate();
    let signer: Arc<dyn Signer> = Arc::new(LocalSigner::new(keys));

    let publisher = Publisher::new(signer, accepting_relays(vec![], Arc::clone(&log)));
    let report = publisher
        .publish(&options(&site, vec![server]), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.uploaded, vec!["/index.html", "/style.css"]);
    assert!(report.failed.is_empty());
    assert_eq!(report.announced.len(), 2);
    assert!(!report.noop);

    let store = store.lock().unwrap();
    assert!(store.contains_key(&sha256_hex(b"<h1>hi</h1>")));
    assert!(store.contains_key(&sha256_hex(b"body{}")));
    drop(store);

    // One announcement per file per relay, each verifiable.
    let announcements: Vec<Event> = published_events(&log)
        .into_iter()
        .filter(|e| e.kind == kinds::FILE_ANNOUNCEMENT)
        .collect();
    assert_eq!(announcements.len(), 4);
    for event in &announcements {
        event.verify().unwrap();
        assert!(event.tag_value("size").is_some());
        assert!(event.tag_value("m").is_some());
    }

    for stats in report.relay_stats.values() {
        assert_eq!(stats.accepted, 2);
        assert_eq!(stats.attempted, 2);
    }
    assert!(report.gateway_url.starts_with("https://npub1"));
    assert!(report.gateway_url.ends_with(".driftsite.page/"));
}

#[tokio::test]
async fn test_idempotent_rerun_is_a_noop() {
    let site = site_with(&[("index.html", "<h1>hi</h1>"), ("style.css", "body{}")]);
    let (server, store) = start_blob_server().await;
    let log = new_log();
    let keys = Keys::generate();
    let local = LocalSigner::new(keys.clone());

    let served = vec![
        remote_announcement(&local, "/index.html", "<h1>hi</h1>"),
        remote_announcement(&local, "/style.css", "body{}"),
    ];
    let signer: Arc<dyn Signer> = Arc::new(LocalSigner::new(keys));
    let publisher = Publisher::new(signer, accepting_relays(served, Arc::clone(&log)));

    let report = publisher
        .publish(&options(&site, vec![server]), &CancellationToken::new())
        .await
        .unwrap();

    assert!(report.noop);
    assert!(report.uploaded.is_empty());
    assert!(report.announced.is_empty());
    assert_eq!(report.unchanged, 2);
    // No PUTs were issued.
    assert!(store.lock().unwrap().is_empty());
    // Nothing was published: the only traffic was the two fetch REQs.
    assert!(published_events(&log).is_empty());
}

#[tokio::test]
async fn test_changed_content_is_reuploaded_and_superseded() {
    let site = site_with(&[("index.html", "<h1>v2</h1>")]);
    let (server, store) = start_blob_server().await;
    let log = new_log();
    let keys = Keys::generate();
    let local = LocalSigner::new(keys.clone());

    // The relays still advertise the old content.
    let served = vec![remote_announcement(&local, "/index.html", "<h1>v1</h1>")];
    let signer: Arc<dyn Signer> = Arc::new(LocalSigner::new(keys));
    let publisher = Publisher::new(signer, accepting_relays(served, Arc::clone(&log)));

    let report = publisher
        .publish(&options(&site, vec![server]), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.uploaded, vec!["/index.html"]);
    assert_eq!(report.unchanged, 0);
    assert!(store
        .lock()
        .unwrap()
        .contains_key(&sha256_hex(b"<h1>v2</h1>")));

    let new_hash = sha256_hex(b"<h1>v2</h1>");
    let announcements: Vec<Event> = published_events(&log)
        .into_iter()
        .filter(|e| e.kind == kinds::FILE_ANNOUNCEMENT)
        .collect();
    assert!(!announcements.is_empty());
    assert!(announcements
        .iter()
        .all(|e| e.tag_value("x") == Some(new_hash.as_str())));
}

#[tokio::test]
async fn test_purge_deletes_remote_leftovers() {
    let site = site_with(&[("index.html", "<h1>hi</h1>")]);
    let (server, store) = start_blob_server().await;
    let log = new_log();
    let keys = Keys::generate();
    let local = LocalSigner::new(keys.clone());

    let kept = remote_announcement(&local, "/index.html", "<h1>hi</h1>");
    let stale = remote_announcement(&local, "/old.html", "<h1>old</h1>");
    let stale_id = stale.id.clone();
    let stale_hash = sha256_hex(b"<h1>old</h1>");
    store
        .lock()
        .unwrap()
        .insert(stale_hash.clone(), b"<h1>old</h1>".to_vec());

    let signer: Arc<dyn Signer> = Arc::new(LocalSigner::new(keys));
    let publisher = Publisher::new(
        signer,
        accepting_relays(vec![kept, stale], Arc::clone(&log)),
    );

    let mut opts = options(&site, vec![server]);
    opts.purge = true;
    let report = publisher
        .publish(&opts, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.deleted, vec!["/old.html"]);
    assert!(!report.noop);
    // The blob is gone from the server.
    assert!(!store.lock().unwrap().contains_key(&stale_hash));

    // A deletion event referencing the stale announcement was published.
    let deletions: Vec<Event> = published_events(&log)
        .into_iter()
        .filter(|e| e.kind == kinds::DELETION)
        .collect();
    assert!(!deletions.is_empty());
    assert!(deletions
        .iter()
        .all(|e| e.tag_value("e") == Some(stale_id.as_str())));
}

#[tokio::test]
async fn test_unknown_remote_state_with_present_blobs_requires_force() {
    let site = site_with(&[("index.html", "<h1>hi</h1>")]);
    let (server, store) = start_blob_server().await;
    let hash = sha256_hex(b"<h1>hi</h1>");
    store
        .lock()
        .unwrap()
        .insert(hash.clone(), b"<h1>hi</h1>".to_vec());

    // Every relay is down: the fetch is inconclusive.
    let connector = Arc::new(MockConnector::new(|_| {
        Err(RelayError::ConnectionFailed("refused".into()))
    }));
    let keys = Keys::generate();
    let signer: Arc<dyn Signer> = Arc::new(LocalSigner::new(keys));
    let publisher = Publisher::new(signer, connector);

    let opts = options(&site, vec![server]);
    let err = publisher
        .publish(&opts, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, PublishError::Ambiguous { .. }));

    // With force the run proceeds and re-uploads everything.
    let mut forced = opts.clone();
    forced.force = true;
    let report = publisher
        .publish(&forced, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.uploaded, vec!["/index.html"]);
}

#[tokio::test]
async fn test_force_reuploads_an_unchanged_site() {
    let site = site_with(&[("index.html", "<h1>hi</h1>")]);
    let (server, store) = start_blob_server().await;
    let log = new_log();
    let keys = Keys::generate();
    let local = LocalSigner::new(keys.clone());

    let served = vec![remote_announcement(&local, "/index.html", "<h1>hi</h1>")];
    let signer: Arc<dyn Signer> = Arc::new(LocalSigner::new(keys));
    let publisher = Publisher::new(signer, accepting_relays(served, Arc::clone(&log)));

    let mut opts = options(&site, vec![server]);
    opts.force = true;
    let report = publisher
        .publish(&opts, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.uploaded, vec!["/index.html"]);
    assert_eq!(report.announced.len(), 1);
    assert!(store
        .lock()
        .unwrap()
        .contains_key(&sha256_hex(b"<h1>hi</h1>")));
}

#[tokio::test]
async fn test_blob_counts_as_stored_when_one_server_succeeds() {
    let site = site_with(&[("index.html", "<h1>hi</h1>")]);
    let (server, store) = start_blob_server().await;
    let log = new_log();
    let keys = Keys::generate();
    let signer: Arc<dyn Signer> = Arc::new(LocalSigner::new(keys));
    let publisher = Publisher::new(signer, accepting_relays(vec![], Arc::clone(&log)));

    // Second server: nothing listens on port 9.
    let dead = "http://127.0.0.1:9/".to_string();
    let report = publisher
        .publish(
            &options(&site, vec![server.clone(), dead.clone()]),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(report.uploaded, vec!["/index.html"]);
    assert!(store
        .lock()
        .unwrap()
        .contains_key(&sha256_hex(b"<h1>hi</h1>")));

    let normalized = |url: &str| {
        if url.ends_with('/') {
            url.to_string()
        } else {
            format!("{url}/")
        }
    };
    let good = report.server_stats.get(&normalized(&server)).unwrap();
    assert_eq!(good.succeeded, 1);
    let bad = report.server_stats.get(&normalized(&dead)).unwrap();
    assert_eq!(bad.succeeded, 0);
}

#[tokio::test]
async fn test_metadata_events_are_published_on_request() {
    let site = site_with(&[("index.html", "<h1>hi</h1>")]);
    let (server, _store) = start_blob_server().await;
    let log = new_log();
    let keys = Keys::generate();
    let signer: Arc<dyn Signer> = Arc::new(LocalSigner::new(keys));
    let publisher = Publisher::new(signer, accepting_relays(vec![], Arc::clone(&log)));

    let mut opts = options(&site, vec![server]);
    opts.publish_relay_list = true;
    opts.publish_server_list = true;
    opts.profile = Some(driftsite_core::Profile {
        name: Some("alice".into()),
        ..Default::default()
    });
    publisher
        .publish(&opts, &CancellationToken::new())
        .await
        .unwrap();

    let events = published_events(&log);
    let count = |kind| events.iter().filter(|e| e.kind == kind).count();
    // One per relay.
    assert_eq!(count(kinds::RELAY_LIST), 2);
    assert_eq!(count(kinds::SERVER_LIST), 2);
    assert_eq!(count(kinds::PROFILE), 2);
}

#[tokio::test]
async fn test_cancelled_run_publishes_nothing() {
    let site = site_with(&[("index.html", "<h1>hi</h1>")]);
    let (server, store) = start_blob_server().await;
    let log = new_log();
    let keys = Keys::generate();
    let signer: Arc<dyn Signer> = Arc::new(LocalSigner::new(keys));
    let publisher = Publisher::new(signer, accepting_relays(vec![], Arc::clone(&log)));

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = publisher
        .publish(&options(&site, vec![server]), &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, PublishError::Cancelled));
    assert!(store.lock().unwrap().is_empty());
    assert!(published_events(&log).is_empty());
}

#[tokio::test]
async fn test_missing_configuration_is_rejected_up_front() {
    let site = site_with(&[("index.html", "<h1>hi</h1>")]);
    let keys = Keys::generate();
    let signer: Arc<dyn Signer> = Arc::new(LocalSigner::new(keys));
    let publisher = Publisher::new(signer, accepting_relays(vec![], new_log()));

    let mut no_relays = PublishOptions::new(site.path());
    no_relays.servers = vec!["https://blobs.example".to_string()];
    assert!(matches!(
        publisher
            .publish(&no_relays, &CancellationToken::new())
            .await,
        Err(PublishError::NoRelays)
    ));

    let mut no_servers = PublishOptions::new(site.path());
    no_servers.relays = vec!["wss://r1.example".to_string()];
    assert!(matches!(
        publisher
            .publish(&no_servers, &CancellationToken::new())
            .await,
        Err(PublishError::NoServers)
    ));
}
