//! Request dispatch: mapping a verb, URL shape, and query parameters onto
//! one manager operation, and shaping the result into an HTTP response.

use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::sync::OwnedMutexGuard;

use crate::errors::{HttpError, ValidationError};
use crate::http::body::to_bytes;
use crate::http::extract::Request;
use crate::http::response::{IntoResponse, Response};
use crate::http::{header, Json, Method, StatusCode, Uri};
use crate::manager::{Params, Resource, ResourceWrapper};

use super::{CollectionService, ServiceInner};

/// Bodies are bounded; anything larger is rejected while reading.
const BODY_LIMIT: usize = 2 * 1024 * 1024;

/// Convert the outcome of a handler into a response, keeping internal
/// errors opaque to the client.
fn respond(result: Result<Response, HttpError>) -> Response {
    match result {
        Ok(response) => response,
        Err(HttpError::Internal(message)) => {
            tracing::error!(error = %message, "request failed");
            HttpError::Internal("Internal server error".into()).into_response()
        }
        Err(err) => err.into_response(),
    }
}

fn parse_params(uri: &Uri) -> Params {
    match uri.query() {
        Some(query) => form_urlencoded::parse(query.as_bytes())
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect(),
        None => Params::new(),
    }
}

async fn parse_body(req: Request) -> Result<Resource, HttpError> {
    let is_form = req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|content_type| {
            content_type.starts_with("application/x-www-form-urlencoded")
        });
    let bytes = to_bytes(req.into_body(), BODY_LIMIT)
        .await
        .map_err(|_| ValidationError::simple("Unable to read the request body"))?;
    if bytes.is_empty() {
        return Ok(Resource::new());
    }
    if is_form {
        return Ok(form_urlencoded::parse(&bytes)
            .map(|(key, value)| (key.into_owned(), Value::String(value.into_owned())))
            .collect());
    }
    match serde_json::from_slice::<Value>(&bytes) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(ValidationError::simple("Request body must be a JSON object").into()),
        Err(err) => Err(ValidationError::simple(format!("Invalid JSON body: {err}")).into()),
    }
}

async fn acquire_lock(
    node: &CollectionService,
    path: &str,
) -> Option<OwnedMutexGuard<()>> {
    match &node.lock {
        Some(lock) => Some(lock.acquire(path).await),
        None => None,
    }
}

fn created(location: String) -> Response {
    (StatusCode::CREATED, [(header::LOCATION, location)]).into_response()
}

fn no_content() -> Response {
    StatusCode::NO_CONTENT.into_response()
}

fn moved(location: String) -> Response {
    (StatusCode::RESET_CONTENT, [(header::LOCATION, location)]).into_response()
}

enum CollectionVerb {
    List,
    Filter,
    GetAll,
    GetAllFilter,
    Create,
    Head,
}

/// Dispatch a request on a collection URL.
pub(crate) async fn collection(
    service: Arc<ServiceInner>,
    index: usize,
    ids: Vec<String>,
    req: Request,
) -> Response {
    respond(collection_inner(service, index, ids, req).await)
}

async fn collection_inner(
    service: Arc<ServiceInner>,
    index: usize,
    ids: Vec<String>,
    req: Request,
) -> Result<Response, HttpError> {
    let node = service.node(index);
    let ops = node.spec.operations();
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let params = parse_params(req.uri());
    let not_allowed = || HttpError::MethodNotAllowed(ops.collection_methods());

    let verb = if method == Method::HEAD {
        if !ops.list {
            return Err(not_allowed());
        }
        CollectionVerb::Head
    } else if method == Method::GET {
        let getall = params.contains_key("getall");
        let has_extra = params.len() > usize::from(getall);
        if getall && has_extra && ops.get_all_filter {
            CollectionVerb::GetAllFilter
        } else if getall {
            if !ops.get_all {
                return Err(not_allowed());
            }
            CollectionVerb::GetAll
        } else if has_extra && ops.list_filter {
            CollectionVerb::Filter
        } else {
            if !ops.list {
                return Err(not_allowed());
            }
            CollectionVerb::List
        }
    } else if method == Method::POST {
        if !ops.create {
            return Err(not_allowed());
        }
        CollectionVerb::Create
    } else {
        return Err(not_allowed());
    };

    let body = match verb {
        CollectionVerb::Create => {
            let raw = parse_body(req).await?;
            let unserialized = node.spec.fields().unserialize(&raw);
            Some(unserialized)
        }
        _ => None,
    };

    let manager = service.manager_for(index, &ids).await?;
    manager.start_request(&method, &path).await;
    let _guard = acquire_lock(node, &path).await;

    let response = match verb {
        CollectionVerb::Create => {
            let validated = node
                .spec
                .fields()
                .validate(manager.as_ref(), &body.unwrap_or_default(), false)?;
            let id = manager.create_resource(validated).await?;
            let mut tokens = ids.clone();
            tokens.push(id.to_string());
            created(service.make_url(node, &tokens))
        }
        CollectionVerb::List => {
            let resource_ids = manager.list_resources().await?;
            Json(urls_for(&service, node, &ids, resource_ids)).into_response()
        }
        CollectionVerb::Filter => {
            let resource_ids = manager.list_resources_filter(&params).await?;
            Json(urls_for(&service, node, &ids, resource_ids)).into_response()
        }
        CollectionVerb::GetAll => {
            let pairs = manager.get_all_resources().await?;
            Json(all_for(&service, node, &ids, pairs)).into_response()
        }
        CollectionVerb::GetAllFilter => {
            let pairs = manager.get_all_resources_filter(&params).await?;
            Json(all_for(&service, node, &ids, pairs)).into_response()
        }
        CollectionVerb::Head => {
            manager.list_resources().await?;
            StatusCode::OK.into_response()
        }
    };
    manager.end_request(&method, &path).await;
    Ok(response)
}

fn urls_for(
    service: &ServiceInner,
    node: &CollectionService,
    parent_ids: &[String],
    resource_ids: Vec<crate::manager::Id>,
) -> Vec<String> {
    resource_ids
        .into_iter()
        .map(|id| {
            let mut tokens = parent_ids.to_vec();
            tokens.push(id.to_string());
            service.make_url(node, &tokens)
        })
        .collect()
}

fn all_for(
    service: &ServiceInner,
    node: &CollectionService,
    parent_ids: &[String],
    pairs: Vec<(crate::manager::Id, Resource)>,
) -> Value {
    let mut output = Map::new();
    for (id, resource) in pairs {
        let mut tokens = parent_ids.to_vec();
        tokens.push(id.to_string());
        let url = service.make_url(node, &tokens);
        output.insert(url, Value::Object(node.spec.fields().serialize(&resource)));
    }
    Value::Object(output)
}

/// Dispatch a request on a resource URL.
pub(crate) async fn resource(
    service: Arc<ServiceInner>,
    index: usize,
    ids: Vec<String>,
    req: Request,
) -> Response {
    respond(resource_inner(service, index, ids, req).await)
}

async fn resource_inner(
    service: Arc<ServiceInner>,
    index: usize,
    ids: Vec<String>,
    req: Request,
) -> Result<Response, HttpError> {
    let node = service.node(index);
    let ops = node.spec.operations();
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let params = parse_params(req.uri());
    let not_allowed = || HttpError::MethodNotAllowed(ops.resource_methods());

    let reads = method == Method::GET || method == Method::HEAD;
    if reads && !ops.get
        || method == Method::PUT && !ops.modify
        || method == Method::DELETE && !ops.delete
        || !(reads || method == Method::PUT || method == Method::DELETE)
    {
        return Err(not_allowed());
    }

    let body = if method == Method::PUT {
        let raw = parse_body(req).await?;
        Some(node.spec.fields().unserialize(&raw))
    } else {
        None
    };

    let (parent_ids, raw_id) = match ids.split_last() {
        Some((raw_id, parent_ids)) => (parent_ids, raw_id),
        None => return Err(HttpError::Internal("resource URL without an id".into())),
    };
    let manager = service.manager_for(index, parent_ids).await?;
    let id = manager.validate_id(raw_id)?;
    manager.start_request(&method, &path).await;
    let _guard = acquire_lock(node, &path).await;

    let response = if method == Method::GET {
        let resource = manager.get_resource(&id).await?;
        match params.get("format") {
            Some(format) => {
                if !node.spec.formats().iter().any(|known| known == format) {
                    return Err(HttpError::NotAcceptable(node.spec.formats().to_vec()));
                }
                let wrapper = ResourceWrapper::new(id, Some(resource));
                manager.format_resource(format, &wrapper).await?
            }
            None => Json(Value::Object(node.spec.fields().serialize(&resource))).into_response(),
        }
    } else if method == Method::HEAD {
        manager.get_resource(&id).await?;
        StatusCode::OK.into_response()
    } else if method == Method::PUT {
        let current = manager.get_resource(&id).await?;
        let validated = node
            .spec
            .fields()
            .validate(manager.as_ref(), &body.unwrap_or_default(), true)?;
        let wrapper = ResourceWrapper::new(id, Some(current));
        match manager.modify_resource(&wrapper, validated).await? {
            Some(new_id) => {
                let mut tokens = parent_ids.to_vec();
                tokens.push(new_id.to_string());
                moved(service.make_url(node, &tokens))
            }
            None => no_content(),
        }
    } else {
        let wrapper = ResourceWrapper::new(id, None);
        manager.delete_resource(&wrapper).await?;
        no_content()
    };
    manager.end_request(&method, &path).await;
    Ok(response)
}

/// Dispatch a custom action POSTed on a resource.
pub(crate) async fn action(
    service: Arc<ServiceInner>,
    index: usize,
    name: String,
    ids: Vec<String>,
    req: Request,
) -> Response {
    respond(action_inner(service, index, name, ids, req).await)
}

async fn action_inner(
    service: Arc<ServiceInner>,
    index: usize,
    name: String,
    ids: Vec<String>,
    req: Request,
) -> Result<Response, HttpError> {
    if req.method() != Method::POST {
        return Err(HttpError::MethodNotAllowed(vec!["POST"]));
    }
    let node = service.node(index);
    let spec = node
        .spec
        .action(&name)
        .ok_or_else(|| HttpError::Internal(format!("unknown action `{name}` routed")))?;
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let body = parse_body(req).await?;

    let (parent_ids, raw_id) = match ids.split_last() {
        Some((raw_id, parent_ids)) => (parent_ids, raw_id),
        None => return Err(HttpError::Internal("action URL without an id".into())),
    };
    let manager = service.manager_for(index, parent_ids).await?;
    let id = manager.validate_id(raw_id)?;
    manager.start_request(&method, &path).await;

    let validated = spec.fields().validate(manager.as_ref(), &body, false)?;
    let resource = manager.get_resource(&id).await?;
    let wrapper = ResourceWrapper::new(id, Some(resource));
    let _guard = acquire_lock(node, &path).await;
    let result = manager.run_action(&name, &wrapper, validated).await?;
    manager.end_request(&method, &path).await;
    Ok(Json(result).into_response())
}

/// List the child collection URLs mounted under one resource.
pub(crate) async fn managed_classes(
    service: Arc<ServiceInner>,
    index: usize,
    ids: Vec<String>,
    req: Request,
) -> Response {
    respond(managed_classes_inner(service, index, ids, req).await)
}

async fn managed_classes_inner(
    service: Arc<ServiceInner>,
    index: usize,
    ids: Vec<String>,
    req: Request,
) -> Result<Response, HttpError> {
    if req.method() != Method::GET && req.method() != Method::HEAD {
        return Err(HttpError::MethodNotAllowed(vec!["GET", "HEAD"]));
    }
    let node = service.node(index);
    let (parent_ids, raw_id) = match ids.split_last() {
        Some((raw_id, parent_ids)) => (parent_ids, raw_id),
        None => return Err(HttpError::Internal("listing URL without an id".into())),
    };
    let manager = service.manager_for(index, parent_ids).await?;
    let id = manager.validate_id(raw_id)?;
    manager.get_resource(&id).await?;

    let mut tokens = parent_ids.to_vec();
    tokens.push(id.to_string());
    let base = service.make_url(node, &tokens);
    let urls: Vec<String> = node
        .children
        .iter()
        .map(|&child| format!("{base}/{}", service.node(child).token))
        .collect();
    Ok(Json(urls).into_response())
}

/// `GET _napix_resource_fields`: the schema of the collection.
pub(crate) async fn resource_fields(service: Arc<ServiceInner>, index: usize) -> Response {
    Json(service.node(index).spec.fields().schema()).into_response()
}

/// `GET _napix_help`: documentation, children, and enabled verbs.
pub(crate) async fn help(service: Arc<ServiceInner>, index: usize) -> Response {
    let spec = &service.node(index).spec;
    let managed_names: Vec<String> = spec
        .managed()
        .children()
        .iter()
        .map(|child| child.name().to_string())
        .collect();
    Json(serde_json::json!({
        "doc": spec.doc(),
        "managed_class": managed_names,
        "collection_methods": spec.operations().collection_methods(),
        "resource_methods": spec.operations().resource_methods(),
        "resource_fields": spec.fields().schema(),
    }))
    .into_response()
}

/// `GET _napix_new`: the example resource assembled from field examples.
pub(crate) async fn example_resource(service: Arc<ServiceInner>, index: usize) -> Response {
    Json(Value::Object(service.node(index).spec.fields().example_resource())).into_response()
}
