//! End-to-end dispatch over a `servers`/`vhosts` manager pair served from
//! memory.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use napix_core::async_trait;
use napix_core::builder::AppBuilder;
use napix_core::errors::ValidationError;
use napix_core::fields::{FieldSet, ResourceField};
use napix_core::http::body::Body;
use napix_core::http::extract::Request;
use napix_core::http::response::IntoResponse;
use napix_core::http::{header, Router, StatusCode};
use napix_core::manager::{
    Id, Manager, ManagerContext, ManagerError, ManagerSpec, OperationSet, Params, Resource,
    ResourceWrapper,
};

type ServerDb = Arc<Mutex<BTreeMap<String, Resource>>>;
type VhostDb = Arc<Mutex<BTreeMap<(String, String), Resource>>>;

struct ServerManager {
    db: ServerDb,
}

#[async_trait]
impl Manager for ServerManager {
    fn validate_field(&self, field: &str, value: Value) -> Result<Value, ValidationError> {
        if field == "port" {
            let port = value.as_i64().unwrap_or(0);
            if !(1..=65535).contains(&port) {
                return Err(ValidationError::simple("port out of range"));
            }
        }
        Ok(value)
    }

    async fn list_resources(&self) -> Result<Vec<Id>, ManagerError> {
        Ok(self.db.lock().unwrap().keys().map(|k| Id::from(k.as_str())).collect())
    }

    async fn list_resources_filter(&self, params: &Params) -> Result<Vec<Id>, ManagerError> {
        let wanted: Option<i64> = params.get("port").and_then(|p| p.parse().ok());
        Ok(self
            .db
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, resource)| match wanted {
                Some(port) => resource.get("port").and_then(Value::as_i64) == Some(port),
                None => true,
            })
            .map(|(name, _)| Id::from(name.as_str()))
            .collect())
    }

    async fn get_all_resources(&self) -> Result<Vec<(Id, Resource)>, ManagerError> {
        Ok(self
            .db
            .lock()
            .unwrap()
            .iter()
            .map(|(name, resource)| (Id::from(name.as_str()), with_alive(resource)))
            .collect())
    }

    async fn get_resource(&self, id: &Id) -> Result<Resource, ManagerError> {
        match self.db.lock().unwrap().get(&id.to_string()) {
            Some(resource) => Ok(with_alive(resource)),
            None => Err(ManagerError::not_found(id)),
        }
    }

    async fn create_resource(&self, body: Resource) -> Result<Id, ManagerError> {
        let name = body
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| ManagerError::internal("validated body lost its name"))?
            .to_string();
        let mut db = self.db.lock().unwrap();
        if db.contains_key(&name) {
            return Err(ManagerError::Duplicate(name));
        }
        db.insert(name.clone(), body);
        Ok(Id::from(name))
    }

    async fn modify_resource(
        &self,
        wrapper: &ResourceWrapper,
        body: Resource,
    ) -> Result<Option<Id>, ManagerError> {
        let old = wrapper.id.to_string();
        let new = body
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or(&old)
            .to_string();
        let mut db = self.db.lock().unwrap();
        db.remove(&old);
        db.insert(new.clone(), body);
        if new == old {
            Ok(None)
        } else {
            Ok(Some(Id::from(new)))
        }
    }

    async fn delete_resource(&self, wrapper: &ResourceWrapper) -> Result<(), ManagerError> {
        match self.db.lock().unwrap().remove(&wrapper.id.to_string()) {
            Some(_) => Ok(()),
            None => Err(ManagerError::not_found(&wrapper.id)),
        }
    }

    async fn run_action(
        &self,
        _name: &str,
        wrapper: &ResourceWrapper,
        params: Resource,
    ) -> Result<Value, ManagerError> {
        Ok(json!({
            "reloaded": wrapper.id.to_string(),
            "graceful": params.get("graceful").cloned().unwrap_or(Value::Bool(true)),
        }))
    }

    async fn format_resource(
        &self,
        _format: &str,
        wrapper: &ResourceWrapper,
    ) -> Result<napix_core::http::response::Response, ManagerError> {
        let resource = wrapper.resource.clone().unwrap_or_default();
        let text = format!(
            "{}:{}",
            wrapper.id,
            resource.get("port").and_then(Value::as_i64).unwrap_or(0)
        );
        Ok((
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain")],
            text,
        )
            .into_response())
    }
}

fn with_alive(resource: &Resource) -> Resource {
    let mut resource = resource.clone();
    resource.insert("alive".into(), Value::Bool(true));
    resource
}

struct VhostManager {
    db: VhostDb,
    server: String,
}

#[async_trait]
impl Manager for VhostManager {
    fn validate_id(&self, raw: &str) -> Result<Id, ValidationError> {
        if raw.contains('.') {
            Ok(Id::from(raw))
        } else {
            Err(ValidationError::simple("host names contain a dot"))
        }
    }

    async fn list_resources(&self) -> Result<Vec<Id>, ManagerError> {
        Ok(self
            .db
            .lock()
            .unwrap()
            .keys()
            .filter(|(server, _)| server == &self.server)
            .map(|(_, host)| Id::from(host.as_str()))
            .collect())
    }

    async fn get_resource(&self, id: &Id) -> Result<Resource, ManagerError> {
        self.db
            .lock()
            .unwrap()
            .get(&(self.server.clone(), id.to_string()))
            .cloned()
            .ok_or_else(|| ManagerError::not_found(id))
    }

    async fn create_resource(&self, body: Resource) -> Result<Id, ManagerError> {
        let host = body
            .get("host")
            .and_then(Value::as_str)
            .ok_or_else(|| ManagerError::internal("validated body lost its host"))?
            .to_string();
        self.db
            .lock()
            .unwrap()
            .insert((self.server.clone(), host.clone()), body);
        Ok(Id::from(host))
    }

    async fn delete_resource(&self, wrapper: &ResourceWrapper) -> Result<(), ManagerError> {
        let key = (self.server.clone(), wrapper.id.to_string());
        match self.db.lock().unwrap().remove(&key) {
            Some(_) => Ok(()),
            None => Err(ManagerError::not_found(&wrapper.id)),
        }
    }
}

fn app() -> Router {
    let server_db: ServerDb = Arc::new(Mutex::new(BTreeMap::new()));
    let vhost_db: VhostDb = Arc::new(Mutex::new(BTreeMap::new()));

    let vhosts = ManagerSpec::builder("vhosts")
        .doc("Virtual hosts served by a server")
        .field(ResourceField::string("host", "a.example"))
        .operations(OperationSet::new().list().get().create().delete())
        .factory(move |context: ManagerContext| {
            let server = context
                .parent
                .as_ref()
                .and_then(|parent| parent.get("name"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            Box::new(VhostManager { db: vhost_db.clone(), server }) as Box<dyn Manager>
        })
        .build()
        .unwrap();

    let servers = ManagerSpec::builder("servers")
        .doc("The servers managed by this host")
        .field(ResourceField::string("name", "web1"))
        .field(ResourceField::int("port", 80))
        .field(ResourceField::bool("alive", true).computed())
        .operations(
            OperationSet::crud().list_filter().get_all(),
        )
        .managed_many([vhosts])
        .format("text")
        .action(
            "reload",
            "Reload the server configuration",
            FieldSet::builder().field(ResourceField::bool("graceful", true).optional()),
        )
        .factory(move |_context: ManagerContext| {
            Box::new(ServerManager { db: server_db.clone() }) as Box<dyn Manager>
        })
        .build()
        .unwrap();

    AppBuilder::new().register(servers).unwrap().build()
}

async fn send(
    router: &Router,
    method: &str,
    path: &str,
    body: Option<Value>,
) -> (StatusCode, napix_core::http::HeaderMap, Value) {
    let mut builder = Request::builder().method(method).uri(path);
    let request = match body {
        Some(value) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            builder.body(Body::from(value.to_string())).unwrap()
        }
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::String(
            String::from_utf8_lossy(&bytes).into_owned(),
        ))
    };
    (status, headers, json)
}

async fn create_web1(router: &Router) {
    let (status, headers, _) = send(
        router,
        "POST",
        "/servers/",
        Some(json!({"name": "web1", "port": 80})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(headers.get(header::LOCATION).unwrap(), "/servers/web1");
}

// ── Collection verbs ────────────────────────────────────────────────────

#[tokio::test]
async fn create_then_get_round_trips() {
    let router = app();
    create_web1(&router).await;

    let (status, _, body) = send(&router, "GET", "/servers/web1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"name": "web1", "port": 80, "alive": true}));
}

#[tokio::test]
async fn create_without_required_field_is_rejected() {
    let router = app();
    let (status, _, body) = send(&router, "POST", "/servers/", Some(json!({"port": 80}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"name": "Required"}));
}

#[tokio::test]
async fn create_duplicate_conflicts() {
    let router = app();
    create_web1(&router).await;
    let (status, _, body) = send(
        &router,
        "POST",
        "/servers/",
        Some(json!({"name": "web1", "port": 80})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body, json!({"error": "`web1` already exists"}));
}

#[tokio::test]
async fn list_returns_resource_urls() {
    let router = app();
    create_web1(&router).await;

    let (status, _, body) = send(&router, "GET", "/servers/", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!(["/servers/web1"]));
}

#[tokio::test]
async fn getall_returns_serialized_resources_by_url() {
    let router = app();
    create_web1(&router).await;

    let (status, _, body) = send(&router, "GET", "/servers/?getall", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({"/servers/web1": {"name": "web1", "port": 80, "alive": true}})
    );
}

#[tokio::test]
async fn filter_params_reach_the_manager() {
    let router = app();
    create_web1(&router).await;
    send(
        &router,
        "POST",
        "/servers/",
        Some(json!({"name": "db1", "port": 5432})),
    )
    .await;

    let (status, _, body) = send(&router, "GET", "/servers/?port=5432", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!(["/servers/db1"]));
}

#[tokio::test]
async fn head_on_collection_has_no_body() {
    let router = app();
    create_web1(&router).await;
    let (status, _, body) = send(&router, "HEAD", "/servers/", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::Null);
}

// ── Resource verbs ──────────────────────────────────────────────────────

#[tokio::test]
async fn put_with_wrong_type_reports_the_field() {
    let router = app();
    create_web1(&router).await;

    let (status, _, body) = send(
        &router,
        "PUT",
        "/servers/web1",
        Some(json!({"name": "web1", "port": "eighty"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body,
        json!({"port": "Bad type: port has type str but should be int"})
    );
}

#[tokio::test]
async fn put_without_id_change_is_no_content() {
    let router = app();
    create_web1(&router).await;

    let (status, _, body) = send(
        &router,
        "PUT",
        "/servers/web1",
        Some(json!({"name": "web1", "port": 8080})),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(body, Value::Null);

    let (_, _, body) = send(&router, "GET", "/servers/web1", None).await;
    assert_eq!(body["port"], json!(8080));
}

#[tokio::test]
async fn put_changing_the_id_is_a_move() {
    let router = app();
    create_web1(&router).await;

    let (status, headers, _) = send(
        &router,
        "PUT",
        "/servers/web1",
        Some(json!({"name": "web2", "port": 80})),
    )
    .await;
    assert_eq!(status, StatusCode::RESET_CONTENT);
    assert_eq!(headers.get(header::LOCATION).unwrap(), "/servers/web2");

    let (status, _, _) = send(&router, "GET", "/servers/web1", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn delete_removes_the_resource() {
    let router = app();
    create_web1(&router).await;

    let (status, _, _) = send(&router, "DELETE", "/servers/web1", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _, body) = send(&router, "GET", "/servers/web1", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({"error": "`web1` not found"}));
}

#[tokio::test]
async fn delete_missing_resource_is_not_found() {
    let router = app();
    let (status, _, _) = send(&router, "DELETE", "/servers/web1", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unknown_verb_advertises_allowed_methods() {
    let router = app();
    create_web1(&router).await;

    let (status, headers, _) = send(&router, "PATCH", "/servers/web1", None).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(
        headers.get(header::ALLOW).unwrap(),
        "GET, HEAD, PUT, DELETE"
    );

    let (status, headers, _) = send(&router, "PUT", "/servers/", None).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(headers.get(header::ALLOW).unwrap(), "GET, HEAD, POST");
}

#[tokio::test]
async fn head_on_resource_has_no_body() {
    let router = app();
    create_web1(&router).await;
    let (status, _, body) = send(&router, "HEAD", "/servers/web1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::Null);
}

// ── Formats ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn declared_format_renders_through_the_manager() {
    let router = app();
    create_web1(&router).await;

    let request = Request::builder()
        .uri("/servers/web1?format=text")
        .body(Body::empty())
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "text/plain"
    );
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], b"web1:80");
}

#[tokio::test]
async fn unknown_format_is_not_acceptable() {
    let router = app();
    create_web1(&router).await;

    let (status, _, body) = send(&router, "GET", "/servers/web1?format=xml", None).await;
    assert_eq!(status, StatusCode::NOT_ACCEPTABLE);
    assert!(body["error"].as_str().unwrap().contains("text"));
}

// ── Nested managers ─────────────────────────────────────────────────────

#[tokio::test]
async fn nested_create_and_list() {
    let router = app();
    create_web1(&router).await;

    let (status, headers, _) = send(
        &router,
        "POST",
        "/servers/web1/vhosts/",
        Some(json!({"host": "a.example"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(
        headers.get(header::LOCATION).unwrap(),
        "/servers/web1/vhosts/a.example"
    );

    let (status, _, body) = send(&router, "GET", "/servers/web1/vhosts/", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!(["/servers/web1/vhosts/a.example"]));
}

#[tokio::test]
async fn missing_parent_resolves_to_not_found() {
    let router = app();
    let (status, _, _) = send(&router, "GET", "/servers/ghost/vhosts/", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _, _) = send(
        &router,
        "DELETE",
        "/servers/ghost/vhosts/a.example",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn invalid_child_id_is_bad_request() {
    let router = app();
    create_web1(&router).await;

    let (status, _, body) = send(&router, "GET", "/servers/web1/vhosts/nodot", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"error": "host names contain a dot"}));
}

#[tokio::test]
async fn managed_classes_listing() {
    let router = app();
    create_web1(&router).await;

    let (status, _, body) = send(&router, "GET", "/servers/web1/", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!(["/servers/web1/vhosts"]));

    let (status, _, _) = send(&router, "GET", "/servers/ghost/", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ── Actions ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn action_posts_through_the_manager() {
    let router = app();
    create_web1(&router).await;

    let (status, _, body) = send(
        &router,
        "POST",
        "/servers/web1/reload",
        Some(json!({"graceful": false})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"reloaded": "web1", "graceful": false}));
}

#[tokio::test]
async fn action_rejects_other_verbs() {
    let router = app();
    create_web1(&router).await;

    let (status, headers, _) = send(&router, "GET", "/servers/web1/reload", None).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(headers.get(header::ALLOW).unwrap(), "POST");
}

#[tokio::test]
async fn action_validates_its_own_fields() {
    let router = app();
    create_web1(&router).await;

    let (status, _, body) = send(
        &router,
        "POST",
        "/servers/web1/reload",
        Some(json!({"graceful": "yes"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body,
        json!({"graceful": "Bad type: graceful has type str but should be bool"})
    );
}

// ── Self-describing endpoints ───────────────────────────────────────────

#[tokio::test]
async fn resource_fields_exposes_the_schema() {
    let router = app();
    let (status, _, body) = send(&router, "GET", "/servers/_napix_resource_fields", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"]["type"], "string");
    assert_eq!(body["port"]["type"], "int");
    assert_eq!(body["alive"]["computed"], json!(true));
    assert_eq!(body["alive"]["editable"], json!(false));
}

#[tokio::test]
async fn help_describes_the_collection() {
    let router = app();
    let (status, _, body) = send(&router, "GET", "/servers/_napix_help", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["doc"], "The servers managed by this host");
    assert_eq!(body["managed_class"], json!(["vhosts"]));
    assert_eq!(body["collection_methods"], json!(["GET", "HEAD", "POST"]));
    assert_eq!(
        body["resource_methods"],
        json!(["GET", "HEAD", "PUT", "DELETE"])
    );
    assert!(body["resource_fields"]["port"].is_object());
}

#[tokio::test]
async fn example_resource_skips_computed_fields() {
    let router = app();
    let (status, _, body) = send(&router, "GET", "/servers/_napix_new", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"name": "web1", "port": 80}));
}

#[tokio::test]
async fn nested_collections_describe_themselves_too() {
    let router = app();
    let (status, _, body) =
        send(&router, "GET", "/servers/web1/vhosts/_napix_new", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"host": "a.example"}));
}

// ── Bodies ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn form_encoded_bodies_are_accepted() {
    let router = app();
    create_web1(&router).await;

    let request = Request::builder()
        .method("POST")
        .uri("/servers/web1/vhosts/")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from("host=b.example"))
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(
        response.headers().get(header::LOCATION).unwrap(),
        "/servers/web1/vhosts/b.example"
    );
}

#[tokio::test]
async fn non_object_json_body_is_rejected() {
    let router = app();
    let (status, _, body) = send(&router, "POST", "/servers/", Some(json!([1, 2]))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Request body must be a JSON object");
}

#[tokio::test]
async fn undeclared_fields_are_dropped_before_the_manager() {
    let router = app();
    let (status, _, _) = send(
        &router,
        "POST",
        "/servers/",
        Some(json!({"name": "web1", "port": 80, "junk": "x"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, _, body) = send(&router, "GET", "/servers/web1", None).await;
    assert!(body.get("junk").is_none());
}
