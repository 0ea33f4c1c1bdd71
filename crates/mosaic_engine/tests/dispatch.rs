use std::sync::Arc;
use std::time::Duration;

use mosaic_core::ProviderType;
use mosaic_engine::{
    DispatchError, DispatchSettings, Dispatcher, ProxyPool, ProxyRecord, RequestOptions,
    TransportErrorKind,
};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn dispatcher(pool: Arc<ProxyPool>) -> Dispatcher {
    Dispatcher::with_reqwest(pool, DispatchSettings::default()).expect("client builds")
}

#[tokio::test]
async fn redirect_is_followed_once_with_cookies() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/start"))
        .respond_with(
            ResponseTemplate::new(302)
                .insert_header("location", "/landing")
                .insert_header("set-cookie", "session=abc; Path=/; HttpOnly"),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/landing"))
        .and(header("cookie", "session=abc"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("landed", "text/plain; charset=utf-8"))
        .expect(1)
        .mount(&server)
        .await;

    let dispatcher = dispatcher(Arc::new(ProxyPool::in_memory()));
    let response = dispatcher
        .dispatch(&format!("{}/start", server.uri()), RequestOptions::get())
        .await
        .expect("dispatch ok");

    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(response.text().unwrap(), "landed");
}

#[tokio::test]
async fn second_redirect_is_returned_not_followed() {
    let server = MockServer::start().await;
    Mock::given(path("/a"))
        .respond_with(ResponseTemplate::new(301).insert_header("location", "/b"))
        .mount(&server)
        .await;
    Mock::given(path("/b"))
        .respond_with(ResponseTemplate::new(302).insert_header("location", "/c"))
        .mount(&server)
        .await;
    Mock::given(path("/c"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let dispatcher = dispatcher(Arc::new(ProxyPool::in_memory()));
    let response = dispatcher
        .dispatch(&format!("{}/a", server.uri()), RequestOptions::get())
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 302);
    assert_eq!(response.location(), Some("/c"));
}

#[tokio::test]
async fn error_statuses_are_responses_not_failures() {
    let server = MockServer::start().await;
    Mock::given(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let dispatcher = dispatcher(Arc::new(ProxyPool::in_memory()));
    let response = dispatcher
        .dispatch(&format!("{}/missing", server.uri()), RequestOptions::get())
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 404);
    assert!(!response.is_success());
    assert!(!response.is_failed_sentinel());
}

#[tokio::test]
async fn json_bodies_deserialize() {
    #[derive(serde::Deserialize)]
    struct Page {
        id: u32,
        title: String,
    }

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "id": 113415, "title": "Jujutsu Kaisen" })),
        )
        .mount(&server)
        .await;

    let dispatcher = dispatcher(Arc::new(ProxyPool::in_memory()));
    let response = dispatcher
        .dispatch(
            &format!("{}/graphql", server.uri()),
            RequestOptions::post(r#"{"query":"{ Media(id: 113415) { id } }"}"#)
                .header("content-type", "application/json"),
        )
        .await
        .unwrap();

    let page: Page = response.json().unwrap();
    assert_eq!(page.id, 113415);
    assert_eq!(page.title, "Jujutsu Kaisen");
}

#[tokio::test]
async fn slow_response_times_out() {
    let server = MockServer::start().await;
    Mock::given(path("/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(800)))
        .mount(&server)
        .await;

    let dispatcher = dispatcher(Arc::new(ProxyPool::in_memory()));
    let err = dispatcher
        .dispatch(
            &format!("{}/slow", server.uri()),
            RequestOptions::get()
                .with_timeout(Duration::from_millis(100))
                .with_max_retries(0),
        )
        .await
        .unwrap_err();

    match err {
        DispatchError::RetriesExhausted { attempts, last, .. } => {
            assert_eq!(attempts, 1);
            assert_eq!(last.kind, TransportErrorKind::Timeout);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn health_check_against_dead_proxy_yields_sentinel_and_evicts() {
    let server = MockServer::start().await;
    let pool = Arc::new(ProxyPool::in_memory());
    pool.add(
        ProviderType::Anime,
        "zoro",
        [ProxyRecord::new("127.0.0.1", 9, ProviderType::Anime)],
    )
    .unwrap();

    let dispatcher = dispatcher(pool.clone());
    let response = dispatcher
        .dispatch(
            &server.uri(),
            RequestOptions::get()
                .with_proxy("http://127.0.0.1:9")
                .for_provider(ProviderType::Anime, "zoro")
                .with_timeout(Duration::from_secs(2))
                .health_check(),
        )
        .await
        .expect("health checks never error");

    assert!(response.is_failed_sentinel());
    assert_eq!(response.status().as_u16(), 500);
    assert_eq!(pool.len_for(ProviderType::Anime, "zoro"), 0);
}
