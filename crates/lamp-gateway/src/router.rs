use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use lamp_llm::LlmProvider;
use subtle::ConstantTimeEq;
use tokio::sync::Mutex;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use super::handlers::{health_handler, query_handler};
use super::server::AppState;

#[derive(Clone)]
struct AuthConfig {
    token: Option<String>,
}

const MAX_RATE_LIMIT_ENTRIES: usize = 10_000;
const RATE_WINDOW: Duration = Duration::from_secs(60);

#[derive(Clone)]
struct RateLimitState {
    limit: u32,
    counters: Arc<Mutex<HashMap<IpAddr, (u32, Instant)>>>,
}

pub(crate) fn build_router<P: LlmProvider + 'static>(
    state: AppState<P>,
    auth_token: Option<String>,
    rate_limit: u32,
    max_body_size: usize,
) -> Router {
    let auth_cfg = AuthConfig { token: auth_token };
    let rate_state = RateLimitState {
        limit: rate_limit,
        counters: Arc::new(Mutex::new(HashMap::new())),
    };

    let protected = Router::new()
        .route("/query", post(query_handler::<P>))
        .layer(middleware::from_fn_with_state(
            rate_state,
            rate_limit_middleware,
        ))
        .layer(middleware::from_fn_with_state(auth_cfg, auth_middleware))
        .layer(RequestBodyLimitLayer::new(max_body_size));

    Router::new()
        .route("/", get(health_handler::<P>))
        .route("/health", get(health_handler::<P>))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn auth_middleware(State(cfg): State<AuthConfig>, req: Request<Body>, next: Next) -> Response {
    if let Some(ref expected) = cfg.token {
        let token = req
            .headers()
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .unwrap_or("");

        // Compare fixed-length digests so the token length does not leak.
        let token_hash = blake3::hash(token.as_bytes());
        let expected_hash = blake3::hash(expected.as_bytes());
        if !bool::from(token_hash.as_bytes().ct_eq(expected_hash.as_bytes())) {
            return StatusCode::UNAUTHORIZED.into_response();
        }
    }

    next.run(req).await
}

async fn rate_limit_middleware(
    State(state): State<RateLimitState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    if state.limit == 0 {
        return next.run(req).await;
    }

    let ip = req
        .extensions()
        .get::<ConnectInfo<std::net::SocketAddr>>()
        .map_or(IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED), |ci| ci.0.ip());

    let now = Instant::now();
    let mut counters = state.counters.lock().await;

    if counters.len() >= MAX_RATE_LIMIT_ENTRIES && !counters.contains_key(&ip) {
        counters.retain(|_, (_, ts)| now.duration_since(*ts) < RATE_WINDOW);
    }

    let entry = counters.entry(ip).or_insert((0, now));
    if now.duration_since(entry.1) >= RATE_WINDOW {
        *entry = (1, now);
    } else {
        entry.0 += 1;
        if entry.0 > state.limit {
            tracing::warn!(%ip, "rate limit exceeded");
            return StatusCode::TOO_MANY_REQUESTS.into_response();
        }
    }
    drop(counters);

    next.run(req).await
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use http_body_util::BodyExt;
    use lamp_core::prompt::PromptTemplate;
    use lamp_core::{RagService, Reranker, RetrievalSettings};
    use lamp_index::{FlatIndex, IndexedChunk};
    use lamp_llm::mock::MockProvider;
    use tower::ServiceExt;

    use super::*;

    async fn test_state(provider: MockProvider) -> AppState<MockProvider> {
        let docs = [
            ("insulin resistance mechanisms in skeletal muscle", "data/PMC2-b.json"),
            ("open access diabetes outcomes", "data/PMC1-a.json"),
        ];
        let mut index = FlatIndex::new("mock-embedder", lamp_llm::mock::DEFAULT_MOCK_DIMENSION);
        let mut entries = Vec::new();
        for (text, source) in docs {
            entries.push((
                provider.embed(text).await.unwrap(),
                IndexedChunk {
                    text: text.into(),
                    source: source.into(),
                    start_offset: 0,
                },
            ));
        }
        index.add(entries).unwrap();
        let service = RagService::new(
            provider,
            Arc::new(index),
            Reranker::None,
            PromptTemplate::default(),
            RetrievalSettings {
                num_retrieved_docs: 2,
                num_docs_final: 1,
            },
        );
        AppState {
            service: Arc::new(service),
            started_at: Instant::now(),
        }
    }

    async fn make_router(auth: Option<String>, rate_limit: u32) -> Router {
        let state = test_state(MockProvider::with_responses(vec!["Answer.".into()])).await;
        build_router(state, auth, rate_limit, 1_048_576)
    }

    fn query_request(query: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/query")
            .header("content-type", "application/json");
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        builder
            .body(Body::from(
                serde_json::to_vec(&serde_json::json!({ "query": query })).unwrap(),
            ))
            .unwrap()
    }

    async fn body_json(resp: Response) -> serde_json::Value {
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn health_returns_ok() {
        let app = make_router(None, 0).await;
        for uri in ["/health", "/"] {
            let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
            let resp = app.clone().oneshot(req).await.unwrap();
            assert_eq!(resp.status(), 200);
            let json = body_json(resp).await;
            assert_eq!(json["status"], "ok");
            assert_eq!(json["indexed_chunks"], 2);
        }
    }

    #[tokio::test]
    async fn query_returns_answer_with_references() {
        let app = make_router(None, 0).await;
        let resp = app
            .oneshot(query_request("insulin resistance", None))
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);

        let json = body_json(resp).await;
        assert_eq!(json["query"], "insulin resistance");
        assert_eq!(json["answer"], "Answer.");
        let refs = json["references"].as_array().unwrap();
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0][0], "insulin resistance mechanisms in skeletal muscle");
        assert_eq!(refs[0][1], "data/PMC2-b.json");
        assert!(refs[0][2].is_f64());
    }

    #[tokio::test]
    async fn blank_query_is_bad_request() {
        let app = make_router(None, 0).await;
        let resp = app.oneshot(query_request("   ", None)).await.unwrap();
        assert_eq!(resp.status(), 400);
        assert!(body_json(resp).await["detail"].is_string());
    }

    fn raw_query(content_type: Option<&str>, body: &'static str) -> Request<Body> {
        let mut builder = Request::builder().method("POST").uri("/query");
        if let Some(content_type) = content_type {
            builder = builder.header("content-type", content_type);
        }
        builder.body(Body::from(body)).unwrap()
    }

    #[tokio::test]
    async fn malformed_bodies_get_detail_json() {
        let app = make_router(None, 0).await;
        for (req, status) in [
            (raw_query(Some("application/json"), "{\"query\":"), 400),
            (raw_query(Some("application/json"), "{\"question\":\"q\"}"), 422),
            (raw_query(None, "{\"query\":\"q\"}"), 415),
        ] {
            let resp = app.clone().oneshot(req).await.unwrap();
            assert_eq!(resp.status(), status);
            let json = body_json(resp).await;
            assert!(json["detail"].as_str().is_some_and(|d| !d.is_empty()), "{json}");
        }
    }

    #[tokio::test]
    async fn model_failure_is_server_error_with_detail() {
        let state = test_state(MockProvider::failing()).await;
        let app = build_router(state, None, 0, 1_048_576);
        let resp = app.oneshot(query_request("diabetes", None)).await.unwrap();
        assert_eq!(resp.status(), 500);
        let detail = body_json(resp).await["detail"].as_str().unwrap().to_owned();
        assert!(
            detail.starts_with("An error occurred while processing the query"),
            "{detail}"
        );
    }

    #[tokio::test]
    async fn auth_rejects_missing_token() {
        let app = make_router(Some("secret".into()), 0).await;
        let resp = app.oneshot(query_request("q", None)).await.unwrap();
        assert_eq!(resp.status(), 401);
    }

    #[tokio::test]
    async fn auth_accepts_valid_token() {
        let app = make_router(Some("secret".into()), 0).await;
        let resp = app.oneshot(query_request("q", Some("secret"))).await.unwrap();
        assert_eq!(resp.status(), 200);
    }

    #[tokio::test]
    async fn auth_rejects_wrong_token() {
        let app = make_router(Some("secret".into()), 0).await;
        let resp = app.oneshot(query_request("q", Some("wrong"))).await.unwrap();
        assert_eq!(resp.status(), 401);
    }

    #[tokio::test]
    async fn health_skips_auth() {
        let app = make_router(Some("secret".into()), 0).await;
        let req = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), 200);
    }

    #[tokio::test]
    async fn rate_limit_enforced() {
        use tower::Service;

        let mut app = make_router(None, 2).await;
        let resp = app.call(query_request("a", None)).await.unwrap();
        assert_eq!(resp.status(), 200);
        let resp = app.call(query_request("b", None)).await.unwrap();
        assert_eq!(resp.status(), 200);
        let resp = app.call(query_request("c", None)).await.unwrap();
        assert_eq!(resp.status(), 429);
    }

    #[tokio::test]
    async fn body_size_limit() {
        let state = test_state(MockProvider::default()).await;
        let app = build_router(state, None, 0, 64);
        let req = Request::builder()
            .method("POST")
            .uri("/query")
            .header("content-type", "application/json")
            .body(Body::from(vec![b'a'; 128]))
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), 413);
    }
}
