mod common;

use async_trait::async_trait;
use axum::Router;
use axum::extract::State;
use axum::http::header::{ETAG, IF_NONE_MATCH};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use bytes::Bytes;
use carebridge_authdb::model::Role;
use carebridge_authdb::sync::{HttpSyncRemote, RemoteSnapshot, SyncRemote};
use carebridge_authdb::{AuthDbError, AuthDbResult, ChecksumToken, PullOutcome, SyncClient, SyncSource};
use carebridge_authz::Actions;
use carebridge_crypto::EncryptionKey;
use carebridge_storage::OpenMode;
use common::{TestDb, db_path};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::time::{Duration, Instant};
use tempfile::TempDir;

struct Pair {
    dir: TempDir,
    primary: TestDb,
    replica: TestDb,
}

fn pair() -> Pair {
    let dir = tempfile::tempdir().expect("tempdir");
    let key = EncryptionKey::generate();
    let primary = TestDb::open(&db_path(&dir, "primary.redb"), &key, OpenMode::ReadWrite);
    let replica = TestDb::open(&db_path(&dir, "replica.redb"), &key, OpenMode::ReadWrite);
    Pair {
        dir,
        primary,
        replica,
    }
}

fn client(replica: &TestDb, remote: Arc<dyn SyncRemote>) -> SyncClient {
    SyncClient::new(Arc::clone(&replica.db), remote, Arc::clone(&replica.reload))
}

fn token(db: &TestDb) -> ChecksumToken {
    ChecksumToken::from_digest(&db.db.checksum().expect("checksum"))
}

/// Replays a fixed answer regardless of the token.
struct Canned(RemoteSnapshot);

#[async_trait]
impl SyncRemote for Canned {
    async fn fetch(&self, _token: &ChecksumToken) -> AuthDbResult<RemoteSnapshot> {
        Ok(self.0.clone())
    }
}

fn incoming_leftovers(dir: &TempDir) -> Vec<String> {
    std::fs::read_dir(dir.path())
        .expect("read dir")
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| name.contains(".incoming-"))
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn second_pull_without_changes_is_unchanged() {
    let p = pair();
    let nina = p.primary.user("nina");
    let source = Arc::new(SyncSource::new(Arc::clone(&p.primary.db)));
    let sync = client(&p.replica, source);

    let first = sync.pull().await.expect("first pull");
    assert_eq!(first, PullOutcome::Replaced { token: token(&p.primary) });
    assert_eq!(token(&p.replica), token(&p.primary));
    assert_eq!(p.replica.store.get_user(nina.id).expect("replicated").username, "nina");

    let before = token(&p.replica);
    assert_eq!(sync.pull().await.expect("second pull"), PullOutcome::Unchanged);
    assert_eq!(token(&p.replica), before);
    assert!(incoming_leftovers(&p.dir).is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn replica_policy_follows_the_swap() {
    let p = pair();
    let oscar = p.primary.user("oscar");
    let subject = oscar.id.to_string();
    let own = format!("/users/{subject}");
    let requests = [(own.as_str(), Actions::READ)];
    assert_eq!(p.replica.enforcer.enforce(&subject, &requests).expect("before"), vec![false]);

    let source = Arc::new(SyncSource::new(Arc::clone(&p.primary.db)));
    client(&p.replica, source).pull().await.expect("pull");
    assert_eq!(p.replica.enforcer.enforce(&subject, &requests).expect("after"), vec![true]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn mismatched_token_leaves_the_replica_untouched() {
    let p = pair();
    p.primary.user("peggy");
    let body = SyncSource::new(Arc::clone(&p.primary.db)).export().expect("export");
    let before = token(&p.replica);

    let lying = Canned(RemoteSnapshot::Changed {
        token: before.clone(),
        body: body.clone(),
    });
    // A claimed token equal to the local one is treated as unchanged.
    assert_eq!(
        client(&p.replica, Arc::new(lying)).pull().await.expect("pull"),
        PullOutcome::Unchanged
    );

    let wrong = ChecksumToken::from_digest(&carebridge_storage::Digest::from_bytes([9; 32]));
    let tampered = Canned(RemoteSnapshot::Changed { token: wrong, body });
    let err = client(&p.replica, Arc::new(tampered))
        .pull()
        .await
        .expect_err("checksum mismatch");
    assert!(matches!(err, AuthDbError::Internal(_)));
    assert_eq!(token(&p.replica), before);
    assert!(incoming_leftovers(&p.dir).is_empty());
    assert!(p.replica.store.find_user_by_username("peggy").is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn garbage_body_is_rejected() {
    let p = pair();
    let before = token(&p.replica);
    let garbage = Canned(RemoteSnapshot::Changed {
        token: token(&p.primary),
        body: Bytes::from(vec![0xAB; 8192]),
    });
    let err = client(&p.replica, Arc::new(garbage))
        .pull()
        .await
        .expect_err("garbage");
    assert!(matches!(err, AuthDbError::Internal(_)));
    assert_eq!(token(&p.replica), before);
    assert!(incoming_leftovers(&p.dir).is_empty());
}

#[test]
fn serve_honours_if_none_match() {
    let p = pair();
    let source = SyncSource::new(Arc::clone(&p.primary.db));
    let current = source.checksum().expect("checksum");
    assert_eq!(source.serve(Some(&current)).expect("serve"), RemoteSnapshot::NotModified);
    match source.serve(Some(&token(&p.replica))).expect("serve") {
        RemoteSnapshot::Changed { token, body } => {
            assert_eq!(token, current);
            assert!(!body.is_empty());
        }
        RemoteSnapshot::NotModified => panic!("expected a body"),
    }
}

#[test]
fn not_modified_answer_does_not_wait_for_open_readers() {
    let p = pair();
    let source = SyncSource::new(Arc::clone(&p.primary.db));
    let current = source.checksum().expect("checksum");
    let (entered_tx, entered_rx) = mpsc::channel();

    std::thread::scope(|scope| {
        let db = &p.primary.db;
        scope.spawn(move || {
            db.view(|_tx| -> carebridge_storage::Result<()> {
                entered_tx.send(()).expect("signal");
                std::thread::sleep(Duration::from_secs(1));
                Ok(())
            })
            .expect("long view");
        });
        entered_rx.recv().expect("reader entered");

        let started = Instant::now();
        assert_eq!(source.serve(Some(&current)).expect("serve"), RemoteSnapshot::NotModified);
        let waited = started.elapsed();
        assert!(waited < Duration::from_millis(500), "serve waited {waited:?}");
    });
}

#[test]
fn replica_stays_usable_while_pulls_replace_it() {
    let p = pair();
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("runtime");
    let source = Arc::new(SyncSource::new(Arc::clone(&p.primary.db)));
    let sync = client(&p.replica, source);
    let sam = p.primary.user("sam");
    rt.block_on(sync.pull()).expect("initial pull");

    let subject = sam.id.to_string();
    let own = format!("/users/{subject}");
    let stop = AtomicBool::new(false);
    let ops = AtomicUsize::new(0);
    let errors = Mutex::new(Vec::new());
    const ROUNDS: usize = 8;

    let replaced = std::thread::scope(|scope| {
        for worker in 0..3 {
            let (replica, stop, ops, errors) = (&p.replica, &stop, &ops, &errors);
            let (subject, own) = (subject.as_str(), own.as_str());
            scope.spawn(move || {
                let mut n = 0usize;
                while !stop.load(Ordering::Relaxed) {
                    let result = replica
                        .store
                        .list_role_assignments()
                        .and_then(|_| replica.enforcer.enforce(subject, &[(own, Actions::READ)]))
                        .and_then(|_| replica.store.add_role(Role::new(format!("Temp {worker} {n}"))));
                    if let Err(err) = result {
                        errors.lock().expect("errors").push(err.to_string());
                    }
                    ops.fetch_add(1, Ordering::Relaxed);
                    n += 1;
                }
            });
        }

        let mut replaced = 0;
        for round in 0..ROUNDS {
            p.primary.user(&format!("user{round}"));
            if matches!(rt.block_on(sync.pull()).expect("pull"), PullOutcome::Replaced { .. }) {
                replaced += 1;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        stop.store(true, Ordering::Relaxed);
        replaced
    });

    let errors = errors.into_inner().expect("errors");
    assert!(errors.is_empty(), "replica operations failed: {errors:?}");
    assert_eq!(replaced, ROUNDS);
    assert!(ops.load(Ordering::Relaxed) > 0);
    let last = format!("user{}", ROUNDS - 1);
    assert_eq!(p.replica.store.find_user_by_username(&last).expect("last user").username, last);
    assert_eq!(
        p.replica.enforcer.enforce(&subject, &[(own.as_str(), Actions::READ)]).expect("enforce"),
        vec![true]
    );
}

async fn serve_sync(State(source): State<SyncSource>, headers: HeaderMap) -> Response {
    let presented = headers
        .get(IF_NONE_MATCH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<ChecksumToken>().ok());
    match source.serve(presented.as_ref()) {
        Ok(RemoteSnapshot::NotModified) => StatusCode::NOT_MODIFIED.into_response(),
        Ok(RemoteSnapshot::Changed { token, body }) => {
            ([(ETAG, format!("\"{token}\""))], body).into_response()
        }
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response(),
    }
}

async fn spawn_server(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("serve");
    });
    format!("http://{addr}/v1/sync")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn http_remote_uses_conditional_get() {
    let p = pair();
    p.primary.user("quinn");
    let router = Router::new()
        .route("/v1/sync", get(serve_sync))
        .with_state(SyncSource::new(Arc::clone(&p.primary.db)));
    let url = spawn_server(router).await;
    let remote = Arc::new(HttpSyncRemote::new(url, Duration::from_secs(5)).expect("remote"));
    let sync = client(&p.replica, remote);

    assert!(matches!(sync.pull().await.expect("first"), PullOutcome::Replaced { .. }));
    assert_eq!(sync.pull().await.expect("second"), PullOutcome::Unchanged);

    let rita = p.primary.user("rita");
    assert!(matches!(sync.pull().await.expect("third"), PullOutcome::Replaced { .. }));
    assert_eq!(p.replica.store.get_user(rita.id).expect("rita").username, "rita");
    assert_eq!(token(&p.replica), token(&p.primary));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn http_remote_rejects_unexpected_statuses() {
    let router = Router::new()
        .route("/v1/sync", get(|| async { StatusCode::SERVICE_UNAVAILABLE }))
        .route("/v1/no-etag", get(|| async { Bytes::from_static(b"body") }));
    let url = spawn_server(router).await;
    let token = ChecksumToken::from_digest(&carebridge_storage::Digest::from_bytes([1; 32]));

    let remote = HttpSyncRemote::new(url.clone(), Duration::from_secs(5)).expect("remote");
    assert!(matches!(remote.fetch(&token).await, Err(AuthDbError::Internal(_))));

    let no_etag = HttpSyncRemote::new(url.replace("/v1/sync", "/v1/no-etag"), Duration::from_secs(5))
        .expect("remote");
    assert!(matches!(no_etag.fetch(&token).await, Err(AuthDbError::Internal(_))));
}
