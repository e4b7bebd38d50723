//! HTTP surface over a [`Storage`].
//!
//! Each collection is one path; the method picks the operation and
//! mutations carry the entity as the JSON body (`DELETE` included).

pub mod authors;
pub mod error;
pub mod posts;

use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use utoipa::{OpenApi, ToSchema};
use utoipa_scalar::{Scalar, Servable};

use crate::core::config::ServerConfig;
use crate::core::model::{Author, Post};
use crate::core::storage::Storage;

pub use error::{ApiError, ApiResult};

#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<dyn Storage>,
}

/// Answer of a successful mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Written {
    pub id: i64,
}

#[derive(OpenApi)]
#[openapi(
    info(title = "newsdesk", description = "Authors and posts catalog"),
    paths(
        authors::list_authors,
        authors::add_author,
        authors::update_author,
        authors::delete_author,
        posts::list_posts,
        posts::add_post,
        posts::update_post,
        posts::delete_post,
        health,
    ),
    components(schemas(Author, Post, Written)),
    tags(
        (name = "authors", description = "Author management"),
        (name = "posts", description = "Post management"),
    )
)]
pub struct ApiDoc;

/// Name of the storage backend in use
#[utoipa::path(get, path = "/health", responses((status = 200, body = String)))]
async fn health(State(state): State<AppState>) -> &'static str {
    state.storage.describe()
}

pub fn router(storage: Arc<dyn Storage>, config: &ServerConfig) -> Router {
    let state = AppState { storage };

    let app = Router::new()
        .route(
            "/authors",
            get(authors::list_authors)
                .post(authors::add_author)
                .put(authors::update_author)
                .delete(authors::delete_author),
        )
        .route(
            "/posts",
            get(posts::list_posts)
                .post(posts::add_post)
                .put(posts::update_post)
                .delete(posts::delete_post),
        )
        .route("/health", get(health))
        .with_state(state)
        .merge(Scalar::with_url("/docs", ApiDoc::openapi()))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            config.request_timeout(),
        ))
        .layer(TraceLayer::new_for_http());

    if config.cors {
        app.layer(CorsLayer::permissive())
    } else {
        app
    }
}

#[cfg(test)]
mod tests {
    use axum::body::{Body, to_bytes};
    use axum::http::{Method, Request, header};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::*;
    use crate::adapter::MemoryStore;

    fn app() -> Router {
        router(Arc::new(MemoryStore::new()), &ServerConfig::default())
    }

    async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, String) {
        let mut request = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(value) => {
                request = request.header(header::CONTENT_TYPE, "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };

        let response = app
            .clone()
            .oneshot(request.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn health_names_the_backend() {
        let (status, body) = send(&app(), Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "MemDB");
    }

    #[tokio::test]
    async fn author_lifecycle() {
        let app = app();

        let (status, body) = send(&app, Method::POST, "/authors", Some(json!({"id": 1, "name": "Ada"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(serde_json::from_str::<Written>(&body).unwrap(), Written { id: 1 });

        let (status, body) = send(&app, Method::POST, "/authors", Some(json!({"id": 1, "name": "Eve"}))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body, "authors id 1 already exists");

        let (status, _) = send(&app, Method::PUT, "/authors", Some(json!({"id": 1, "name": "Ada L."}))).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(&app, Method::GET, "/authors", None).await;
        assert_eq!(status, StatusCode::OK);
        let authors: Vec<Author> = serde_json::from_str(&body).unwrap();
        assert_eq!(authors, vec![Author::new(1, "Ada L.")]);

        let (status, _) = send(&app, Method::DELETE, "/authors", Some(json!({"id": 1}))).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send(&app, Method::DELETE, "/authors", Some(json!({"id": 1}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn posts_are_listed_with_derived_fields() {
        let app = app();
        send(&app, Method::POST, "/authors", Some(json!({"id": 1, "name": "Ada"}))).await;

        let post = json!({
            "id": 100,
            "author_id": 1,
            "title": "T",
            "content": "C",
            "created_at": 0,
            "published_at": 0,
            "author_name": "ignored",
        });
        let (status, _) = send(&app, Method::POST, "/posts", Some(post)).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(&app, Method::GET, "/posts", None).await;
        assert_eq!(status, StatusCode::OK);
        let posts: Vec<Post> = serde_json::from_str(&body).unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].author_name, "Ada");
        assert_eq!(posts[0].created_at_txt, crate::core::model::format_millis(0));
    }

    #[tokio::test]
    async fn unknown_author_is_unprocessable() {
        let (status, body) = send(
            &app(),
            Method::POST,
            "/posts",
            Some(json!({"id": 1, "author_id": 42})),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body, "author with id 42 does not exist");
    }

    #[tokio::test]
    async fn post_is_deleted_by_id_alone() {
        let app = app();
        send(&app, Method::POST, "/authors", Some(json!({"id": 1, "name": "Ada"}))).await;
        send(&app, Method::POST, "/posts", Some(json!({"id": 5, "author_id": 1}))).await;

        let (status, body) = send(&app, Method::DELETE, "/posts", Some(json!({"id": 5}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(serde_json::from_str::<Written>(&body).unwrap(), Written { id: 5 });

        let (_, body) = send(&app, Method::GET, "/posts", None).await;
        assert!(serde_json::from_str::<Vec<Post>>(&body).unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_post_is_not_found() {
        let (status, _) = send(&app(), Method::PUT, "/posts", Some(json!({"id": 5, "author_id": 1}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn bad_bodies_are_rejected() {
        let app = app();

        let request = Request::builder()
            .method(Method::POST)
            .uri("/authors")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        // id is required
        let (status, _) = send(&app, Method::POST, "/authors", Some(json!({"name": "Ada"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(&app, Method::POST, "/posts", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn docs_are_served() {
        let (status, _) = send(&app(), Method::GET, "/docs", None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[test]
    fn openapi_lists_every_route() {
        let doc = ApiDoc::openapi();
        for path in ["/authors", "/posts", "/health"] {
            assert!(doc.paths.paths.contains_key(path), "missing {}", path);
        }
    }
}
