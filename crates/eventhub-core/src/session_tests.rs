//! Session lifecycle tests against a mock backend

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde_json::{Value, json};
use tempfile::TempDir;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::error::Error;
use crate::session::{
    Identity, Navigator, ProfileUpdate, Registration, SessionService, SessionState,
};
use crate::storage::{DurableStore, FileStore, MemoryStore, TOKEN_KEY, USER_KEY};

#[derive(Default)]
struct RecordingNavigator {
    redirects: AtomicUsize,
}

impl Navigator for RecordingNavigator {
    fn redirect_to_login(&self) {
        self.redirects.fetch_add(1, Ordering::SeqCst);
    }
}

impl RecordingNavigator {
    fn count(&self) -> usize {
        self.redirects.load(Ordering::SeqCst)
    }
}

struct Harness {
    server: MockServer,
    storage: Arc<MemoryStore>,
    navigator: Arc<RecordingNavigator>,
    service: SessionService,
}

impl Harness {
    async fn new() -> Self {
        Self::with_storage(MemoryStore::new()).await
    }

    async fn with_stored_session(token: &str, user: Value) -> Self {
        Self::with_storage(MemoryStore::with_entries([
            (TOKEN_KEY, token.to_string()),
            (USER_KEY, user.to_string()),
        ]))
        .await
    }

    async fn with_storage(storage: MemoryStore) -> Self {
        let server = MockServer::start().await;
        let storage = Arc::new(storage);
        let navigator = Arc::new(RecordingNavigator::default());
        let service = SessionService::builder()
            .base_url(server.uri())
            .storage(storage.clone())
            .navigator(navigator.clone())
            .build()
            .unwrap();

        Self {
            server,
            storage,
            navigator,
            service,
        }
    }

    fn stored(&self, key: &str) -> Option<String> {
        self.storage.get(key).unwrap()
    }

    fn stored_identity(&self) -> Option<Identity> {
        self.stored(USER_KEY)
            .map(|json| serde_json::from_str(&json).unwrap())
    }

    async fn mock_login(&self, token: &str, user: Value) {
        Mock::given(method("POST"))
            .and(path("/login"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"token": token, "user": user})),
            )
            .mount(&self.server)
            .await;
    }

    async fn mock_profile(&self, token: &str, user: Value) {
        Mock::given(method("GET"))
            .and(path("/profile"))
            .and(header("authorization", format!("Bearer {}", token).as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(user))
            .mount(&self.server)
            .await;
    }
}

fn ann() -> Value {
    json!({
        "id": 1,
        "email": "ann@example.com",
        "first_name": "Ann",
        "last_name": "Lee",
        "phone": "",
        "is_admin": false,
        "is_organizer": true
    })
}

// ========== Startup ==========

#[tokio::test]
async fn test_start_without_stored_session() {
    let h = Harness::new().await;
    assert_eq!(h.service.store().state(), SessionState::Initializing);

    let snapshot = h.service.start().await;

    assert!(snapshot.ready);
    assert!(!snapshot.is_authenticated());
    assert_eq!(snapshot.state(), SessionState::Unauthenticated);
    assert!(h.service.client().authorization().is_none());
    assert!(h.server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_start_with_token_but_no_user_skips_revalidation() {
    let h = Harness::with_storage(MemoryStore::with_entries([(TOKEN_KEY, "abc")])).await;

    let snapshot = h.service.start().await;

    assert_eq!(snapshot.state(), SessionState::Unauthenticated);
    assert!(h.server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_start_revalidates_stored_session() {
    let h = Harness::with_stored_session("abc", json!({"id": 1})).await;
    h.mock_profile("abc", ann()).await;

    let snapshot = h.service.start().await;

    assert!(snapshot.ready);
    assert_eq!(snapshot.state(), SessionState::Authenticated);
    let identity = snapshot.identity.unwrap();
    assert_eq!(identity.id, 1);
    assert_eq!(identity.first_name, "Ann");
    assert_eq!(
        h.service.client().authorization().as_deref(),
        Some("Bearer abc")
    );
    assert_eq!(h.stored(TOKEN_KEY).as_deref(), Some("abc"));
    assert_eq!(h.stored_identity().unwrap().first_name, "Ann");
}

#[tokio::test]
async fn test_start_with_rejected_token_logs_out_silently() {
    let h = Harness::with_stored_session("expired", json!({"id": 1})).await;
    Mock::given(method("GET"))
        .and(path("/profile"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({"error": "Invalid token"})),
        )
        .mount(&h.server)
        .await;

    let snapshot = h.service.start().await;

    assert!(snapshot.ready);
    assert_eq!(snapshot.state(), SessionState::Unauthenticated);
    assert!(h.storage.is_empty());
    assert!(h.service.client().authorization().is_none());
}

#[tokio::test]
async fn test_start_with_server_error_logs_out() {
    let h = Harness::with_stored_session("abc", json!({"id": 1})).await;
    Mock::given(method("GET"))
        .and(path("/profile"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"error": "User not found"})))
        .mount(&h.server)
        .await;

    let snapshot = h.service.start().await;

    assert_eq!(snapshot.state(), SessionState::Unauthenticated);
    assert!(h.storage.is_empty());
    // Not a 401, so no redirect
    assert_eq!(h.navigator.count(), 0);
}

#[tokio::test]
async fn test_start_runs_once() {
    let h = Harness::with_stored_session("abc", json!({"id": 1})).await;
    Mock::given(method("GET"))
        .and(path("/profile"))
        .respond_with(ResponseTemplate::new(200).set_body_json(ann()))
        .expect(1)
        .mount(&h.server)
        .await;

    h.service.start().await;
    let again = h.service.start().await;

    assert!(again.is_authenticated());
}

#[tokio::test]
async fn test_concurrent_start_waits_for_revalidation() {
    let h = Harness::with_stored_session("abc", json!({"id": 1})).await;
    Mock::given(method("GET"))
        .and(path("/profile"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(ann())
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&h.server)
        .await;

    let (first, second) = tokio::join!(h.service.start(), h.service.start());

    assert!(first.ready && second.ready);
    assert!(first.is_authenticated());
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_login_during_failed_revalidation_is_kept() {
    let h = Harness::with_stored_session("old", json!({"id": 1})).await;
    Mock::given(method("GET"))
        .and(path("/profile"))
        .respond_with(ResponseTemplate::new(500).set_delay(Duration::from_millis(300)))
        .mount(&h.server)
        .await;
    h.mock_login("fresh", ann()).await;

    let service = h.service.clone();
    let start = tokio::spawn(async move { service.start().await });

    tokio::time::sleep(Duration::from_millis(50)).await;
    h.service.login("ann@example.com", "secret").await.unwrap();

    let snapshot = start.await.unwrap();

    assert!(snapshot.ready);
    assert_eq!(snapshot.state(), SessionState::Authenticated);
    assert_eq!(h.stored(TOKEN_KEY).as_deref(), Some("fresh"));
    assert_eq!(h.stored_identity().map(|u| u.first_name), Some("Ann".to_string()));
    assert_eq!(
        h.service.client().authorization().as_deref(),
        Some("Bearer fresh")
    );
}

#[tokio::test]
async fn test_login_during_rejected_revalidation_is_kept() {
    let h = Harness::with_stored_session("old", json!({"id": 1})).await;
    Mock::given(method("GET"))
        .and(path("/profile"))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_json(json!({"error": "Invalid token"}))
                .set_delay(Duration::from_millis(300)),
        )
        .mount(&h.server)
        .await;
    h.mock_login("fresh", ann()).await;

    let service = h.service.clone();
    let start = tokio::spawn(async move { service.start().await });

    tokio::time::sleep(Duration::from_millis(50)).await;
    h.service.login("ann@example.com", "secret").await.unwrap();

    let snapshot = start.await.unwrap();

    assert!(snapshot.is_authenticated());
    assert_eq!(h.stored(TOKEN_KEY).as_deref(), Some("fresh"));
    assert_eq!(
        h.service.client().authorization().as_deref(),
        Some("Bearer fresh")
    );
    assert_eq!(h.navigator.count(), 0);
}

#[tokio::test]
async fn test_corrupt_session_file_does_not_block_login() {
    let dir = TempDir::new().unwrap();
    let session = dir.path().join("session.json");
    std::fs::write(&session, "{truncated").unwrap();

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"token": "tok1", "user": ann()})),
        )
        .mount(&server)
        .await;

    let service = SessionService::builder()
        .base_url(server.uri())
        .storage(Arc::new(FileStore::new(&session)))
        .build()
        .unwrap();

    let snapshot = service.start().await;
    assert_eq!(snapshot.state(), SessionState::Unauthenticated);

    service.logout();
    assert!(!session.exists());

    std::fs::write(&session, "{truncated").unwrap();
    service.login("ann@example.com", "secret").await.unwrap();

    let reopened = FileStore::new(&session);
    assert_eq!(reopened.get(TOKEN_KEY).unwrap().as_deref(), Some("tok1"));
    assert!(service.is_authenticated());
}

#[tokio::test]
async fn test_shutdown_keeps_durable_session() {
    let h = Harness::with_stored_session("abc", json!({"id": 1})).await;
    h.mock_profile("abc", ann()).await;

    h.service.start().await;
    h.service.shutdown();

    assert_eq!(h.service.store().state(), SessionState::Initializing);
    assert!(h.service.client().authorization().is_none());
    assert_eq!(h.stored(TOKEN_KEY).as_deref(), Some("abc"));

    let snapshot = h.service.start().await;
    assert!(snapshot.is_authenticated());
}

// ========== Login / Register ==========

#[tokio::test]
async fn test_login_persists_session() {
    let h = Harness::new().await;
    h.service.start().await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .and(body_json(json!({"email": "a@b.com", "password": "secret"})))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"token": "tok1", "user": {"id": 5}})),
        )
        .mount(&h.server)
        .await;

    let identity = h.service.login("a@b.com", "secret").await.unwrap();

    assert_eq!(identity.id, 5);
    assert_eq!(h.stored(TOKEN_KEY).as_deref(), Some("tok1"));
    assert_eq!(h.stored_identity(), Some(identity.clone()));
    assert_eq!(
        h.service.client().authorization().as_deref(),
        Some("Bearer tok1")
    );
    assert_eq!(h.service.current_user().map(|u| u.id), Some(5));
    assert_eq!(h.service.store().state(), SessionState::Authenticated);
}

#[tokio::test]
async fn test_login_failure_surfaces_server_message_without_state_change() {
    let h = Harness::new().await;
    h.service.start().await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(
            ResponseTemplate::new(400)
                .set_body_json(json!({"error": "Key: 'email' Error:Field validation"})),
        )
        .mount(&h.server)
        .await;

    let err = h.service.login("nope", "x").await.unwrap_err();

    match err {
        Error::Session(msg) => assert_eq!(msg, "Key: 'email' Error:Field validation"),
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(h.storage.is_empty());
    assert!(h.service.client().authorization().is_none());
    assert!(!h.service.is_authenticated());
}

#[tokio::test]
async fn test_login_failure_without_message_uses_fallback() {
    let h = Harness::new().await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&h.server)
        .await;

    let err = h.service.login("a@b.com", "secret").await.unwrap_err();
    assert_eq!(err.to_string(), "Login failed");
}

#[tokio::test]
async fn test_login_with_bad_credentials() {
    let h = Harness::new().await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({"error": "Invalid credentials"})),
        )
        .mount(&h.server)
        .await;

    let err = h.service.login("a@b.com", "wrong").await.unwrap_err();

    assert_eq!(err.to_string(), "Invalid credentials");
    assert!(!h.service.is_authenticated());
}

#[tokio::test]
async fn test_register_returns_user_without_logging_in() {
    let h = Harness::new().await;
    Mock::given(method("POST"))
        .and(path("/register"))
        .and(body_json(json!({
            "email": "new@example.com",
            "password": "secret1",
            "first_name": "New",
            "last_name": "User"
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": 12,
            "email": "new@example.com",
            "first_name": "New",
            "last_name": "User",
            "phone": "",
            "created_at": "2025-05-01T09:00:00Z"
        })))
        .mount(&h.server)
        .await;

    let registration = Registration {
        email: "new@example.com".to_string(),
        password: "secret1".to_string(),
        first_name: "New".to_string(),
        last_name: "User".to_string(),
        phone: None,
    };
    let user = h.service.register(&registration).await.unwrap();

    assert_eq!(user.id, 12);
    assert!(!h.service.is_authenticated());
    assert!(h.storage.is_empty());
}

#[tokio::test]
async fn test_register_duplicate_email() {
    let h = Harness::new().await;
    Mock::given(method("POST"))
        .and(path("/register"))
        .respond_with(
            ResponseTemplate::new(400)
                .set_body_json(json!({"error": "User with this email already exists"})),
        )
        .mount(&h.server)
        .await;

    let registration = Registration {
        email: "dup@example.com".to_string(),
        password: "secret1".to_string(),
        first_name: "D".to_string(),
        last_name: "U".to_string(),
        phone: Some("555".to_string()),
    };
    let err = h.service.register(&registration).await.unwrap_err();
    assert_eq!(err.to_string(), "User with this email already exists");
}

// ========== Logout ==========

#[tokio::test]
async fn test_logout_clears_session_and_is_idempotent() {
    let h = Harness::new().await;
    h.service.start().await;
    h.mock_login("tok1", json!({"id": 5})).await;
    h.service.login("a@b.com", "secret").await.unwrap();

    h.service.logout();
    let once = h.service.snapshot();

    assert!(h.storage.is_empty());
    assert!(h.service.client().authorization().is_none());
    assert!(once.identity.is_none());
    assert_eq!(once.state(), SessionState::Unauthenticated);

    h.service.logout();
    assert_eq!(h.service.snapshot(), once);
    assert!(h.storage.is_empty());
    assert_eq!(h.navigator.count(), 0);
}

#[tokio::test]
async fn test_logout_when_never_logged_in() {
    let h = Harness::new().await;
    h.service.logout();
    assert!(h.storage.is_empty());
    assert!(!h.service.is_authenticated());
}

// ========== Profile ==========

#[tokio::test]
async fn test_login_then_refresh_yields_same_identity() {
    let h = Harness::new().await;
    let user = ann();
    h.mock_login("tok1", user.clone()).await;
    h.mock_profile("tok1", user).await;

    let logged_in = h.service.login("ann@example.com", "secret").await.unwrap();
    let refreshed = h.service.refresh_user().await.unwrap();

    assert_eq!(refreshed, logged_in);
    assert_eq!(h.service.current_user(), Some(logged_in));
}

#[tokio::test]
async fn test_refresh_replaces_identity_wholesale() {
    let h = Harness::new().await;
    h.mock_login("tok1", json!({"id": 1, "first_name": "Ann", "nickname": "a"}))
        .await;
    h.mock_profile("tok1", json!({"id": 1, "first_name": "Anna"})).await;

    h.service.login("ann@example.com", "secret").await.unwrap();
    let refreshed = h.service.refresh_user().await.unwrap();

    assert_eq!(refreshed.first_name, "Anna");
    assert!(refreshed.extra.is_empty());
    assert_eq!(h.stored_identity(), Some(refreshed));
}

#[tokio::test]
async fn test_refresh_failure_message() {
    let h = Harness::new().await;
    Mock::given(method("GET"))
        .and(path("/profile"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&h.server)
        .await;

    let err = h.service.refresh_user().await.unwrap_err();
    assert_eq!(err.to_string(), "Failed to refresh user data");
}

#[tokio::test]
async fn test_update_profile_merges_partial_response() {
    let h = Harness::new().await;
    h.mock_login("tok1", ann()).await;
    Mock::given(method("PUT"))
        .and(path("/profile"))
        .and(header("authorization", "Bearer tok1"))
        .and(body_json(json!({"phone": "555-0100"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"phone": "555-0100"})))
        .mount(&h.server)
        .await;

    h.service.login("ann@example.com", "secret").await.unwrap();
    let update = ProfileUpdate {
        phone: Some("555-0100".to_string()),
        ..Default::default()
    };
    let patch = h.service.update_profile(&update).await.unwrap();

    assert_eq!(patch.get("phone"), Some(&json!("555-0100")));
    let identity = h.service.current_user().unwrap();
    assert_eq!(identity.first_name, "Ann");
    assert_eq!(identity.phone, "555-0100");
    assert_eq!(h.stored_identity(), Some(identity));
}

#[tokio::test]
async fn test_update_profile_failure_keeps_identity() {
    let h = Harness::new().await;
    h.mock_login("tok1", ann()).await;
    Mock::given(method("PUT"))
        .and(path("/profile"))
        .respond_with(
            ResponseTemplate::new(500).set_body_json(json!({"error": "Failed to update profile"})),
        )
        .mount(&h.server)
        .await;

    let before = h.service.login("ann@example.com", "secret").await.unwrap();
    let update = ProfileUpdate {
        first_name: Some("Zed".to_string()),
        ..Default::default()
    };
    let err = h.service.update_profile(&update).await.unwrap_err();

    assert!(matches!(err, Error::Session(ref m) if m == "Failed to update profile"));
    assert_eq!(h.service.current_user(), Some(before));
}

#[tokio::test]
async fn test_update_profile_unmergeable_response_refreshes() {
    let h = Harness::new().await;
    h.mock_login("tok1", ann()).await;
    Mock::given(method("PUT"))
        .and(path("/profile"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"phone": null})))
        .mount(&h.server)
        .await;
    let mut current = ann();
    current["phone"] = json!("555-0100");
    h.mock_profile("tok1", current).await;

    h.service.login("ann@example.com", "secret").await.unwrap();
    let update = ProfileUpdate {
        phone: Some("555-0100".to_string()),
        ..Default::default()
    };
    let patch = h.service.update_profile(&update).await.unwrap();

    assert_eq!(patch.get("phone"), Some(&Value::Null));
    let identity = h.service.current_user().unwrap();
    assert_eq!(identity.phone, "555-0100");
    assert_eq!(h.stored_identity(), Some(identity));
}

#[tokio::test]
async fn test_change_password() {
    let h = Harness::new().await;
    Mock::given(method("POST"))
        .and(path("/change-password"))
        .and(body_json(json!({"current_password": "old", "new_password": "newpass"})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"message": "Password updated successfully"})),
        )
        .mount(&h.server)
        .await;

    let message = h.service.change_password("old", "newpass").await.unwrap();
    assert_eq!(message, "Password updated successfully");

    let err = h.service.change_password("old", "").await.unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
}

// ========== Out-of-band invalidation ==========

#[tokio::test]
async fn test_resource_401_clears_session_and_redirects() {
    let h = Harness::with_stored_session("abc", ann()).await;
    h.mock_profile("abc", ann()).await;
    Mock::given(method("GET"))
        .and(path("/registrations"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({"error": "Invalid token: expired"})),
        )
        .mount(&h.server)
        .await;

    assert!(h.service.start().await.is_authenticated());

    let err = h
        .service
        .client()
        .get::<Value>("/registrations")
        .await
        .unwrap_err();

    // Original error reaches the caller intact
    match &err {
        Error::Api { status, body } => {
            assert_eq!(*status, 401);
            assert_eq!(body.as_ref().unwrap()["error"], "Invalid token: expired");
        }
        other => panic!("unexpected error: {other:?}"),
    }

    assert!(h.storage.is_empty());
    assert!(h.service.client().authorization().is_none());
    assert!(!h.service.is_authenticated());
    assert_eq!(h.service.store().state(), SessionState::Unauthenticated);
    assert_eq!(h.navigator.count(), 1);
}

#[tokio::test]
async fn test_inflight_refresh_does_not_resurrect_after_logout() {
    let h = Harness::new().await;
    h.mock_login("tok1", ann()).await;
    Mock::given(method("GET"))
        .and(path("/profile"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(ann())
                .set_delay(Duration::from_millis(300)),
        )
        .mount(&h.server)
        .await;

    h.service.login("ann@example.com", "secret").await.unwrap();

    let service = h.service.clone();
    let refresh = tokio::spawn(async move { service.refresh_user().await });

    tokio::time::sleep(Duration::from_millis(50)).await;
    h.service.logout();

    let refreshed = refresh.await.unwrap().unwrap();
    assert_eq!(refreshed.id, 1);

    assert!(!h.service.is_authenticated());
    assert!(h.storage.is_empty());
}

#[tokio::test]
async fn test_subscriber_observes_login_and_logout() {
    let h = Harness::new().await;
    h.mock_login("tok1", json!({"id": 7})).await;
    let mut rx = h.service.store().subscribe();

    h.service.start().await;
    rx.changed().await.unwrap();
    assert!(rx.borrow_and_update().ready);

    h.service.login("a@b.com", "secret").await.unwrap();
    rx.changed().await.unwrap();
    assert_eq!(
        rx.borrow_and_update().identity.as_ref().map(|i| i.id),
        Some(7)
    );

    h.service.logout();
    rx.changed().await.unwrap();
    assert!(rx.borrow_and_update().identity.is_none());
}
