use bytes::Bytes;
use http::header::{HeaderMap, CONTENT_TYPE};
use http::{Method, Request, StatusCode};
use http_body_util::BodyExt;
use napix_core::http::body::Body;
use napix_core::http::Router;
use serde::de::DeserializeOwned;
use tower::util::ServiceExt;

/// In-process HTTP test client wrapping an axum `Router`.
///
/// Uses `tower::ServiceExt::oneshot` to dispatch requests without binding
/// to a TCP port.
pub struct TestApp {
    router: Router,
}

impl TestApp {
    /// Create a `TestApp` from an assembled `axum::Router`.
    pub fn new(router: Router) -> Self {
        Self { router }
    }

    /// Send an arbitrary request.
    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("failed to send request");

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .into_body()
            .collect()
            .await
            .expect("failed to read response body")
            .to_bytes();

        TestResponse { status, headers, body }
    }

    async fn bodyless(&self, method: Method, path: &str) -> TestResponse {
        let req = Request::builder()
            .method(method)
            .uri(path)
            .body(Body::empty())
            .unwrap();
        self.send(req).await
    }

    /// Send a GET request to the given path.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.bodyless(Method::GET, path).await
    }

    /// Send a HEAD request to the given path.
    pub async fn head(&self, path: &str) -> TestResponse {
        self.bodyless(Method::HEAD, path).await
    }

    /// Send a DELETE request to the given path.
    pub async fn delete(&self, path: &str) -> TestResponse {
        self.bodyless(Method::DELETE, path).await
    }

    /// Send a request with the given method and no body.
    pub async fn request(&self, method: Method, path: &str) -> TestResponse {
        self.bodyless(method, path).await
    }

    async fn send_json(
        &self,
        method: Method,
        path: &str,
        body: &impl serde::Serialize,
    ) -> TestResponse {
        let json = serde_json::to_vec(body).unwrap();
        let req = Request::builder()
            .method(method)
            .uri(path)
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(json))
            .unwrap();
        self.send(req).await
    }

    /// Send a POST request with a JSON body.
    pub async fn post_json(&self, path: &str, body: &impl serde::Serialize) -> TestResponse {
        self.send_json(Method::POST, path, body).await
    }

    /// Send a PUT request with a JSON body.
    pub async fn put_json(&self, path: &str, body: &impl serde::Serialize) -> TestResponse {
        self.send_json(Method::PUT, path, body).await
    }

    /// Send a POST request with a form-urlencoded body.
    pub async fn post_form(&self, path: &str, fields: &[(&str, &str)]) -> TestResponse {
        let mut form = form_urlencoded::Serializer::new(String::new());
        for (key, value) in fields {
            form.append_pair(key, value);
        }
        let req = Request::builder()
            .method(Method::POST)
            .uri(path)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(form.finish()))
            .unwrap();
        self.send(req).await
    }
}

/// Response wrapper with assertion helpers.
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TestResponse {
    /// Assert status is 200 OK. Returns `self` for chaining.
    pub fn assert_ok(self) -> Self {
        assert_eq!(self.status, StatusCode::OK, "Expected 200 OK, got {}", self.status);
        self
    }

    /// Assert status is 201 Created.
    pub fn assert_created(self) -> Self {
        assert_eq!(
            self.status,
            StatusCode::CREATED,
            "Expected 201 Created, got {}",
            self.status
        );
        self
    }

    /// Assert status is 204 No Content.
    pub fn assert_no_content(self) -> Self {
        assert_eq!(
            self.status,
            StatusCode::NO_CONTENT,
            "Expected 204 No Content, got {}",
            self.status
        );
        self
    }

    /// Assert status is 400 Bad Request.
    pub fn assert_bad_request(self) -> Self {
        assert_eq!(
            self.status,
            StatusCode::BAD_REQUEST,
            "Expected 400 Bad Request, got {}",
            self.status
        );
        self
    }

    /// Assert status is 404 Not Found.
    pub fn assert_not_found(self) -> Self {
        assert_eq!(
            self.status,
            StatusCode::NOT_FOUND,
            "Expected 404 Not Found, got {}",
            self.status
        );
        self
    }

    /// Assert an arbitrary status.
    pub fn assert_status(self, expected: StatusCode) -> Self {
        assert_eq!(self.status, expected, "Expected {expected}, got {}", self.status);
        self
    }

    /// Assert a header has the given value.
    pub fn assert_header(self, name: &str, expected: &str) -> Self {
        let value = self
            .headers
            .get(name)
            .unwrap_or_else(|| panic!("missing header `{name}`"));
        assert_eq!(value.to_str().unwrap(), expected);
        self
    }

    /// A header value, when present.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    /// Deserialize the body as JSON into `T`.
    pub fn json<T: DeserializeOwned>(&self) -> T {
        serde_json::from_slice(&self.body).unwrap_or_else(|err| {
            panic!(
                "failed to parse body as JSON: {err}; body was {:?}",
                String::from_utf8_lossy(&self.body)
            )
        })
    }

    /// The body as a JSON value.
    pub fn json_value(&self) -> serde_json::Value {
        self.json()
    }

    /// The body as UTF-8 text.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}
