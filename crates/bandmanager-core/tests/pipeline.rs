use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bandmanager_core::api::{ApiError, AuthMiddleware};
use bandmanager_core::auth::{
    AuthError, CredentialPair, CredentialStore, KeyValueStore, MemoryStorage, TerminalCause,
};
use bandmanager_core::models::LoginRequest;
use bandmanager_core::ApiClient;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, path_regex};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

/// Renewal latency; long enough for every concurrent 401 to queue behind it
const RENEWAL_DELAY: Duration = Duration::from_millis(300);

struct Harness {
    server: MockServer,
    api: ApiClient,
    store: Arc<CredentialStore>,
    redirects: Arc<AtomicUsize>,
}

impl Harness {
    async fn new(tokens: Option<(&str, &str)>) -> Self {
        let server = MockServer::start().await;

        let storage = Arc::new(MemoryStorage::new());
        if let Some((access, refresh)) = tokens {
            storage.set("access_token", access).unwrap();
            storage.set("refresh_token", refresh).unwrap();
        }
        let store = Arc::new(CredentialStore::open(storage).unwrap());

        let redirects = Arc::new(AtomicUsize::new(0));
        let counter = redirects.clone();
        let navigator = Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let api = ApiClient::new(&server.uri(), store.clone(), navigator).unwrap();

        Self {
            server,
            api,
            store,
            redirects,
        }
    }

    fn redirects(&self) -> usize {
        self.redirects.load(Ordering::SeqCst)
    }

    async fn requests_to(&self, prefix: &str) -> Vec<Request> {
        self.server
            .received_requests()
            .await
            .unwrap()
            .into_iter()
            .filter(|r| r.url.path().starts_with(prefix))
            .collect()
    }
}

fn authorization(request: &Request) -> Option<String> {
    request
        .headers
        .get("authorization")
        .map(|v| v.to_str().unwrap().to_string())
}

fn band_json(id: i64) -> serde_json::Value {
    json!({ "id": id, "name": format!("Band {}", id), "genre": "ROCK" })
}

/// Band endpoints accept only `Bearer A2`; everything else is 401.
async fn mount_bands_accepting_a2(server: &MockServer) {
    for id in 1..=3 {
        Mock::given(method("GET"))
            .and(path(format!("/music-bands/{}", id)))
            .and(header("authorization", "Bearer A2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(band_json(id)))
            .with_priority(1)
            .mount(server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path_regex(r"^/music-bands/\d+$"))
        .respond_with(ResponseTemplate::new(401))
        .mount(server)
        .await;
}

fn api_error(err: &anyhow::Error) -> &ApiError {
    err.downcast_ref::<ApiError>()
        .unwrap_or_else(|| panic!("expected ApiError, got: {err:#}"))
}

#[tokio::test]
async fn test_concurrent_401s_trigger_single_renewal() {
    let h = Harness::new(Some(("A1", "R1"))).await;
    mount_bands_accepting_a2(&h.server).await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .and(body_json(json!({ "refreshToken": "R1" })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "accessToken": "A2", "refreshToken": "R2" }))
                .set_delay(RENEWAL_DELAY),
        )
        .expect(1)
        .mount(&h.server)
        .await;

    let (b1, b2, b3) = tokio::join!(
        h.api.get_music_band(1),
        h.api.get_music_band(2),
        h.api.get_music_band(3)
    );
    assert_eq!(b1.unwrap().id, 1);
    assert_eq!(b2.unwrap().id, 2);
    assert_eq!(b3.unwrap().id, 3);

    assert_eq!(h.store.pair(), Some(CredentialPair::new("A2", "R2")));
    assert_eq!(h.api.coordinator().renewal_count(), 1);
    assert_eq!(h.redirects(), 0);

    let band_requests = h.requests_to("/music-bands").await;
    let with = |token: &str| {
        band_requests
            .iter()
            .filter(|r| authorization(r).as_deref() == Some(token))
            .count()
    };
    assert_eq!(with("Bearer A1"), 3);
    assert_eq!(with("Bearer A2"), 3);
    assert_eq!(band_requests.len(), 6);
}

#[tokio::test]
async fn test_rejected_renewal_ends_session_for_all_waiters() {
    let h = Harness::new(Some(("A1", "R1"))).await;
    mount_bands_accepting_a2(&h.server).await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_string("refresh token expired")
                .set_delay(RENEWAL_DELAY),
        )
        .expect(1)
        .mount(&h.server)
        .await;

    let results = futures::future::join_all((1..=3).map(|id| h.api.get_music_band(id))).await;

    for result in results {
        let err = result.unwrap_err();
        match api_error(&err) {
            ApiError::Auth(AuthError::SessionExpired(TerminalCause::RenewalRejected(msg))) => {
                assert!(msg.contains("refresh token expired"))
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    assert_eq!(h.store.access_token(), None);
    assert_eq!(h.store.refresh_token(), None);
    assert_eq!(h.redirects(), 1);
    assert!(!h.api.coordinator().is_refreshing());
}

#[tokio::test]
async fn test_second_401_after_renewal_is_not_retried_again() {
    let h = Harness::new(Some(("A1", "R1"))).await;
    Mock::given(method("GET"))
        .and(path("/music-bands/1"))
        .respond_with(ResponseTemplate::new(401).set_body_string("account locked"))
        .expect(2)
        .mount(&h.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "accessToken": "A2", "refreshToken": "R2" })),
        )
        .expect(1)
        .mount(&h.server)
        .await;

    let err = h.api.get_music_band(1).await.unwrap_err();
    match api_error(&err) {
        ApiError::RetryExhausted(body) => assert_eq!(body, "account locked"),
        other => panic!("unexpected error: {other:?}"),
    }

    let band_requests = h.requests_to("/music-bands").await;
    assert_eq!(authorization(&band_requests[0]).as_deref(), Some("Bearer A1"));
    assert_eq!(authorization(&band_requests[1]).as_deref(), Some("Bearer A2"));
    assert_eq!(h.redirects(), 0);
}

#[tokio::test]
async fn test_401_without_refresh_token_fails_fast() {
    let h = Harness::new(None).await;
    Mock::given(method("GET"))
        .and(path("/music-bands/1"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&h.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&h.server)
        .await;

    let err = h.api.get_music_band(1).await.unwrap_err();
    assert!(matches!(
        api_error(&err),
        ApiError::Auth(AuthError::SessionExpired(TerminalCause::NoCredential))
    ));

    let band_requests = h.requests_to("/music-bands").await;
    assert_eq!(authorization(&band_requests[0]), None);
    assert_eq!(h.redirects(), 1);
}

#[tokio::test]
async fn test_excluded_endpoints_carry_no_token_and_skip_renewal() {
    let h = Harness::new(Some(("A1", "R1"))).await;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(ResponseTemplate::new(401).set_body_string("Invalid username or password"))
        .expect(1)
        .mount(&h.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/register"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&h.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&h.server)
        .await;

    let err = h
        .api
        .login(&LoginRequest::new("ozzy", "wrong-password"))
        .await
        .unwrap_err();
    assert!(matches!(api_error(&err), ApiError::Unauthorized));

    let err = h
        .api
        .register(&LoginRequest::new("ozzy", "password1"))
        .await
        .unwrap_err();
    assert!(matches!(api_error(&err), ApiError::Unauthorized));

    for request in h.requests_to("/auth").await {
        assert_eq!(authorization(&request), None);
    }
    assert_eq!(h.store.pair(), Some(CredentialPair::new("A1", "R1")));
    assert_eq!(h.redirects(), 0);
}

#[tokio::test]
async fn test_other_errors_pass_through_untouched() {
    let h = Harness::new(Some(("A1", "R1"))).await;
    Mock::given(method("GET"))
        .and(path("/music-bands/9"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such band"))
        .expect(1)
        .mount(&h.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&h.server)
        .await;

    let err = h.api.get_music_band(9).await.unwrap_err();
    assert!(matches!(api_error(&err), ApiError::NotFound(m) if m == "no such band"));
    assert_eq!(h.store.pair(), Some(CredentialPair::new("A1", "R1")));
}

#[tokio::test]
async fn test_later_requests_use_renewed_token_directly() {
    let h = Harness::new(Some(("A1", "R1"))).await;
    mount_bands_accepting_a2(&h.server).await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "accessToken": "A2", "refreshToken": "R2" })),
        )
        .expect(1)
        .mount(&h.server)
        .await;

    h.api.get_music_band(1).await.unwrap();
    h.api.get_music_band(2).await.unwrap();

    let band_requests = h.requests_to("/music-bands").await;
    // 401 + retry for the first call, straight through for the second
    assert_eq!(band_requests.len(), 3);
    assert_eq!(authorization(&band_requests[2]).as_deref(), Some("Bearer A2"));
}

#[tokio::test]
async fn test_list_music_bands_sends_paging_and_filter() {
    use bandmanager_core::models::{MusicBandFilter, MusicGenre, PageRequest, SortDirection};
    use wiremock::matchers::query_param;

    let h = Harness::new(Some(("A1", "R1"))).await;
    Mock::given(method("GET"))
        .and(path("/music-bands"))
        .and(query_param("genre", "PUNK_ROCK"))
        .and(query_param("page", "1"))
        .and(query_param("size", "5"))
        .and(query_param("direction", "ASC"))
        .and(header("authorization", "Bearer A1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": [band_json(4)],
            "totalElements": 6,
            "totalPages": 2,
            "number": 1,
            "size": 5
        })))
        .expect(1)
        .mount(&h.server)
        .await;

    let filter = MusicBandFilter {
        genre: Some(MusicGenre::PunkRock),
        ..Default::default()
    };
    let page = PageRequest {
        page: 1,
        size: 5,
        sort: vec!["name".to_string()],
        direction: Some(SortDirection::Asc),
    };

    let result = h.api.list_music_bands(&filter, &page).await.unwrap();
    assert_eq!(result.total_elements, 6);
    assert_eq!(result.content[0].id, 4);
}

#[tokio::test]
async fn test_streaming_body_401_is_returned_unchanged() {
    let h = Harness::new(Some(("A1", "R1"))).await;
    Mock::given(method("POST"))
        .and(path("/music-bands"))
        .respond_with(ResponseTemplate::new(401).set_body_string("token expired"))
        .expect(1)
        .mount(&h.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&h.server)
        .await;

    let client = reqwest::Client::new();
    let middleware = AuthMiddleware::new(client.clone(), h.api.coordinator().clone());
    let chunks = futures::stream::iter(vec![
        Ok::<_, std::io::Error>("{\"name\": "),
        Ok("\"Motorhead\"}"),
    ]);
    let request = client
        .post(format!("{}/music-bands", h.server.uri()))
        .body(reqwest::Body::wrap_stream(chunks))
        .build()
        .unwrap();

    let response = middleware.send(request).await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::UNAUTHORIZED);
    assert_eq!(response.text().await.unwrap(), "token expired");

    assert_eq!(h.api.coordinator().renewal_count(), 0);
    assert_eq!(h.store.pair(), Some(CredentialPair::new("A1", "R1")));
    assert_eq!(h.redirects(), 0);

    let sent = h.requests_to("/music-bands").await;
    assert_eq!(authorization(&sent[0]).as_deref(), Some("Bearer A1"));
}

#[tokio::test]
async fn test_unreachable_backend_is_a_network_error() {
    let storage = Arc::new(MemoryStorage::new());
    storage.set("access_token", "A1").unwrap();
    storage.set("refresh_token", "R1").unwrap();
    let store = Arc::new(CredentialStore::open(storage).unwrap());
    let navigator = Arc::new(|| {});
    // Nothing listens on the discard port
    let api = ApiClient::new("http://127.0.0.1:9", store.clone(), navigator).unwrap();

    let err = api.get_music_band(1).await.unwrap_err();
    match api_error(&err) {
        ApiError::NetworkError(e) => assert!(e.is_connect()),
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(!api_error(&err).is_session_ended());
    assert_eq!(store.pair(), Some(CredentialPair::new("A1", "R1")));
}
