pub mod auth;
pub mod chats;
pub mod uploads;
pub mod users;

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, patch, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::state::AppState;

/// Room for form fields and multipart framing around the file itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

pub fn router(state: AppState) -> Router {
    let body_limit = state.max_file_size + MULTIPART_OVERHEAD;

    Router::new()
        // Users
        .route("/users", get(users::list_users))
        .route("/users/create", post(auth::sign_up))
        .route("/users/login", post(auth::login))
        .route("/users/details/{id}", get(users::user_details))
        .route("/users/edit/{id}", patch(users::edit_user))
        .route("/users/{id}", delete(users::delete_user))
        // Chats
        .route("/chats", get(chats::list_chats))
        .route("/chats/create", post(chats::create_chat))
        .route("/chats/{id}", delete(chats::delete_chat))
        // Uploads
        .route("/uploads/create", post(uploads::create_upload))
        .route("/uploads/{owner_id}", get(uploads::list_uploads))
        .route("/uploads/update/{id}", patch(uploads::update_upload))
        .route("/uploads/delete/{id}", delete(uploads::delete_upload))
        .route("/uploads/details/{id}", get(uploads::upload_details))
        .route("/uploads/shared/{user_id}", get(uploads::shared_uploads))
        .route("/uploads/download/{filename}", get(uploads::download_upload))
        // Middleware
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        // State
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{header, Method, Request, StatusCode},
        Router,
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::router;
    use crate::test_support::{Fixture, TEST_MAX_FILE_SIZE};

    const BOUNDARY: &str = "X-DASHBOARD-BOUNDARY";

    struct Session {
        id: String,
        token: String,
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn json_request(method: Method, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn get_request(uri: &str, token: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap()
    }

    fn multipart_request(token: &str, fields: &[(&str, &str)], files: &[(&str, &[u8])]) -> Request<Body> {
        let mut body: Vec<u8> = Vec::new();
        for (name, value) in fields {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
                )
                .as_bytes(),
            );
        }
        for (file_name, data) in files {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\nContent-Type: application/pdf\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(data);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method(Method::POST)
            .uri("/uploads/create")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::from(body))
            .unwrap()
    }

    async fn register(app: &Router, name: &str) -> Session {
        let email = format!("{}@example.com", name.to_lowercase());
        let (status, body) = send(
            app,
            json_request(
                Method::POST,
                "/users/create",
                None,
                json!({"name": name, "email": email, "password": "secret-pw"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        let id = body["data"].as_str().unwrap().to_string();

        let (status, body) = send(
            app,
            json_request(
                Method::POST,
                "/users/login",
                None,
                json!({"email": email, "password": "secret-pw"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["data"]["user"]["id"], id.as_str());

        Session {
            id,
            token: body["data"]["token"].as_str().unwrap().to_string(),
        }
    }

    #[tokio::test]
    async fn test_upload_share_download_delete_flow() {
        let fx = Fixture::new().await;
        let app = router(fx.state());
        let alice = register(&app, "Alice").await;
        let bob = register(&app, "Bob").await;

        let (status, body) = send(
            &app,
            multipart_request(
                &alice.token,
                &[("userId", alice.id.as_str()), ("label", "Report"), ("fileName", "r.pdf")],
                &[("scan-001.pdf", &b"%PDF-1.4 data"[..])],
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        let upload_id = body["data"]["id"].as_str().unwrap().to_string();
        assert_eq!(body["data"]["fileName"], "r.pdf");
        assert_eq!(body["data"]["sharedTo"], json!([]));
        assert!(fx.storage.root().join("r.pdf").exists());

        let (status, body) = send(&app, get_request(&format!("/uploads/{}", alice.id), &alice.token)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"].as_array().unwrap().len(), 1);

        let (status, _) = send(
            &app,
            json_request(
                Method::PATCH,
                &format!("/uploads/update/{upload_id}"),
                Some(&bob.token),
                json!({"sharedTo": [bob.id]}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = send(
            &app,
            json_request(
                Method::PATCH,
                &format!("/uploads/update/{upload_id}"),
                Some(&alice.token),
                json!({"sharedTo": [bob.id]}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["data"]["sharedTo"], json!([bob.id]));

        let (status, body) = send(&app, get_request(&format!("/uploads/shared/{}", bob.id), &bob.token)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body["data"],
            json!([{"id": upload_id, "label": "Report", "fileName": "r.pdf", "sharedBy": "Alice"}])
        );

        let response = app
            .clone()
            .oneshot(get_request("/uploads/download/r.pdf", &bob.token))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/pdf");
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&bytes[..], b"%PDF-1.4 data");

        let delete = Request::builder()
            .method(Method::DELETE)
            .uri(format!("/uploads/delete/{upload_id}"))
            .header(header::AUTHORIZATION, format!("Bearer {}", alice.token))
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&app, delete).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], true);
        assert!(!fx.storage.root().join("r.pdf").exists());

        let (_, body) = send(&app, get_request(&format!("/uploads/shared/{}", bob.id), &bob.token)).await;
        assert_eq!(body["data"], json!([]));

        let delete_again = Request::builder()
            .method(Method::DELETE)
            .uri(format!("/uploads/delete/{upload_id}"))
            .header(header::AUTHORIZATION, format!("Bearer {}", alice.token))
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&app, delete_again).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["status"], false);
    }

    #[tokio::test]
    async fn test_download_traversal_rejected() {
        let fx = Fixture::new().await;
        let app = router(fx.state());
        let alice = register(&app, "Alice").await;

        let (status, body) = send(
            &app,
            get_request("/uploads/download/..%2F..%2Fetc%2Fpasswd", &alice.token),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"].as_str().unwrap().starts_with("Invalid file name"));
    }

    #[tokio::test]
    async fn test_requires_bearer_token() {
        let fx = Fixture::new().await;
        let app = router(fx.state());

        let request = Request::builder().uri("/users").body(Body::empty()).unwrap();
        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["status"], false);
    }

    #[tokio::test]
    async fn test_upload_without_file_is_rejected() {
        let fx = Fixture::new().await;
        let app = router(fx.state());
        let alice = register(&app, "Alice").await;

        let (status, _) = send(
            &app,
            multipart_request(&alice.token, &[("label", "Nothing")], &[]),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_upload_with_two_files_is_rejected() {
        let fx = Fixture::new().await;
        let app = router(fx.state());
        let alice = register(&app, "Alice").await;

        let (status, body) = send(
            &app,
            multipart_request(
                &alice.token,
                &[("label", "Pair")],
                &[("one.pdf", &b"first"[..]), ("two.pdf", &b"second"[..])],
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Only one file can be uploaded per request");
        assert!(!fx.storage.root().join("one.pdf").exists());
        assert!(!fx.storage.root().join("two.pdf").exists());
    }

    #[tokio::test]
    async fn test_upload_over_size_limit_is_rejected() {
        let fx = Fixture::new().await;
        let app = router(fx.state());
        let alice = register(&app, "Alice").await;
        let payload = vec![b'x'; TEST_MAX_FILE_SIZE + 1];

        let (status, body) = send(
            &app,
            multipart_request(&alice.token, &[("fileName", "big.bin")], &[("big.bin", &payload[..])]),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"].as_str().unwrap().starts_with("File too large"));
        assert!(!fx.storage.root().join("big.bin").exists());

        let (status, body) = send(&app, get_request(&format!("/uploads/{}", alice.id), &alice.token)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"], json!([]));
    }

    #[tokio::test]
    async fn test_concurrent_signups_with_same_email() {
        let fx = Fixture::new().await;
        let app = router(fx.state());
        let signup = |name: &str| {
            json_request(
                Method::POST,
                "/users/create",
                None,
                json!({"name": name, "email": "same@example.com", "password": "secret-pw"}),
            )
        };

        let ((first, _), (second, _)) =
            tokio::join!(send(&app, signup("One")), send(&app, signup("Two")));

        let mut statuses = vec![first.as_u16(), second.as_u16()];
        statuses.sort();
        assert_eq!(statuses, vec![200, 409]);
    }

    #[tokio::test]
    async fn test_signup_and_login_errors() {
        let fx = Fixture::new().await;
        let app = router(fx.state());
        register(&app, "Alice").await;

        let (status, _) = send(
            &app,
            json_request(
                Method::POST,
                "/users/create",
                None,
                json!({"name": "Other", "email": "ALICE@example.com", "password": "secret-pw"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, body) = send(
            &app,
            json_request(
                Method::POST,
                "/users/login",
                None,
                json!({"email": "alice@example.com", "password": "wrong"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "Invalid credentials");
    }

    #[tokio::test]
    async fn test_users_and_chats() {
        let fx = Fixture::new().await;
        let app = router(fx.state());
        let alice = register(&app, "Alice").await;
        let bob = register(&app, "Bob").await;

        let (status, body) = send(&app, get_request("/users", &alice.token)).await;
        assert_eq!(status, StatusCode::OK);
        let users = body["data"].as_array().unwrap();
        assert_eq!(users.len(), 2);
        assert!(users.iter().all(|u| u.get("passwordHash").is_none()));

        let (status, body) = send(
            &app,
            json_request(
                Method::POST,
                "/chats/create",
                Some(&alice.token),
                json!({"toUserId": bob.id, "message": "hello"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["data"]["user"], "Alice");
        assert_eq!(body["data"]["message"], "hello");

        let (status, body) = send(&app, get_request("/chats", &bob.token)).await;
        assert_eq!(status, StatusCode::OK);
        let chats = body["data"].as_array().unwrap();
        assert_eq!(chats.len(), 1);
        assert_eq!(chats[0]["user"], "Alice");
        assert_eq!(chats[0]["receiver"], bob.id.as_str());
        let chat_id = chats[0]["id"].as_str().unwrap().to_string();

        let delete_as_bob = Request::builder()
            .method(Method::DELETE)
            .uri(format!("/chats/{chat_id}"))
            .header(header::AUTHORIZATION, format!("Bearer {}", bob.token))
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(&app, delete_as_bob).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = send(
            &app,
            json_request(
                Method::PATCH,
                &format!("/users/edit/{}", alice.id),
                Some(&alice.token),
                json!({"name": "Alice Liddell"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["data"]["name"], "Alice Liddell");

        let (status, _) = send(
            &app,
            json_request(
                Method::PATCH,
                &format!("/users/edit/{}", bob.id),
                Some(&alice.token),
                json!({"name": "Mallory"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }
}
