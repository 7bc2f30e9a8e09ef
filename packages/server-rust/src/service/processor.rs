//! Built-in processor for the service document, the metadata document and
//! error bodies.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::fmt::Write as _;

use async_trait::async_trait;
use http::header::HeaderName;
use http::StatusCode;
use odata_core::{EntityContainer, EntityType, MetadataCache, Property, QualifiedName};
use serde_json::{json, Map, Value};

use super::error::{LibraryError, ODataError, ServerError};
use super::negotiate::ContentType;
use super::registry::{ErrorProcessor, ProcessContext, Processor};
use super::request::ODataResponse;
use super::route::{ResourceKind, METADATA_SEGMENT};

pub const ODATA_VERSION: HeaderName = HeaderName::from_static("odata-version");

const ERROR_XML_NAMESPACE: &str = "http://docs.oasis-open.org/odata/ns/metadata";

/// Serves [`ResourceKind::ServiceDocument`] and [`ResourceKind::Metadata`],
/// and renders error bodies in JSON or XML.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultProcessor;

#[async_trait]
impl Processor for DefaultProcessor {
    fn name(&self) -> &'static str {
        "DefaultProcessor"
    }

    fn kinds(&self) -> &'static [ResourceKind] {
        &[ResourceKind::ServiceDocument, ResourceKind::Metadata]
    }

    async fn process(&self, ctx: ProcessContext<'_>) -> Result<ODataResponse, ODataError> {
        let document = match ctx.route.kind {
            ResourceKind::ServiceDocument => {
                service_document(ctx.metadata, &ctx.request.raw_base_uri)
            }
            ResourceKind::Metadata => metadata_document(ctx.metadata),
            kind => {
                return Err(anyhow::anyhow!("DefaultProcessor cannot serve {kind:?}").into());
            }
        };
        json_response(StatusCode::OK, ctx.content_type, &document)
    }
}

impl ErrorProcessor for DefaultProcessor {
    fn process_error(&self, error: &ServerError, content_type: &ContentType) -> ODataResponse {
        let body = if content_type.subtype() == "xml" {
            error_xml(error)
        } else {
            json!({ "error": error }).to_string()
        };
        let mut response = ODataResponse::with_body(error.status, &content_type.to_string(), body);
        response.set_header(ODATA_VERSION, "4.0");
        response
    }
}

fn json_response(
    status: StatusCode,
    content_type: &ContentType,
    document: &Value,
) -> Result<ODataResponse, ODataError> {
    let body = serde_json::to_vec(document).map_err(|e| LibraryError::Serializer {
        message: e.to_string(),
    })?;
    let mut response = ODataResponse::with_body(status, &content_type.to_string(), body);
    response.set_header(ODATA_VERSION, "4.0");
    Ok(response)
}

// ---------------------------------------------------------------------------
// Service document
// ---------------------------------------------------------------------------

fn service_document(metadata: &MetadataCache, base_uri: &str) -> Value {
    let base = base_uri.trim_end_matches('/');
    let mut value = Vec::new();
    if let Some(container) = metadata.get_entity_container(None) {
        for set in container
            .entity_sets
            .iter()
            .filter(|s| s.include_in_service_document)
        {
            value.push(json!({"name": set.name, "kind": "EntitySet", "url": set.name}));
        }
        for singleton in &container.singletons {
            value.push(json!({"name": singleton.name, "kind": "Singleton", "url": singleton.name}));
        }
        for import in &container.function_imports {
            value.push(json!({"name": import.name, "kind": "FunctionImport", "url": import.name}));
        }
    }
    json!({
        "@odata.context": format!("{base}/{METADATA_SEGMENT}"),
        "value": value,
    })
}

// ---------------------------------------------------------------------------
// Metadata document (CSDL JSON)
// ---------------------------------------------------------------------------

/// Renders the default container and every entity type reachable from it.
fn metadata_document(metadata: &MetadataCache) -> Value {
    let service = metadata.service_metadata();
    let mut root = Map::new();
    root.insert("$Version".into(), json!(service.protocol_version));

    let mut namespaces: BTreeMap<String, Map<String, Value>> = BTreeMap::new();
    for schema in &service.schemas {
        let entry = namespaces.entry(schema.namespace.clone()).or_default();
        if let Some(alias) = &schema.alias {
            entry.insert("$Alias".into(), json!(alias));
        }
    }

    if let Some(container) = metadata.get_entity_container(None) {
        let name = container.qualified_name();
        root.insert("$EntityContainer".into(), json!(name.to_string()));

        for entity_type in reachable_entity_types(metadata, &container) {
            let (type_name, rendered) = entity_type;
            namespaces
                .entry(type_name.namespace().to_string())
                .or_default()
                .insert(type_name.name().to_string(), rendered);
        }
        namespaces
            .entry(container.namespace.clone())
            .or_default()
            .insert(container.name.clone(), container_json(metadata, &container));
    }

    if !service.references.is_empty() {
        let references: Map<String, Value> = service
            .references
            .iter()
            .map(|r| {
                let includes: Vec<Value> = r
                    .includes
                    .iter()
                    .map(|i| json!({"$Namespace": i.namespace, "$Alias": i.alias}))
                    .collect();
                (r.uri.clone(), json!({ "$Include": includes }))
            })
            .collect();
        root.insert("$Reference".into(), Value::Object(references));
    }

    for (namespace, members) in namespaces {
        root.insert(namespace, Value::Object(members));
    }
    Value::Object(root)
}

fn reachable_entity_types(
    metadata: &MetadataCache,
    container: &EntityContainer,
) -> Vec<(QualifiedName, Value)> {
    let mut queue: VecDeque<QualifiedName> = container
        .entity_sets
        .iter()
        .map(|s| s.entity_type.clone())
        .chain(container.singletons.iter().map(|s| s.type_name.clone()))
        .collect();
    let mut seen = HashSet::new();
    let mut rendered = Vec::new();

    while let Some(name) = queue.pop_front() {
        let Some(name) = metadata.resolve(Some(&name)) else {
            continue;
        };
        if !seen.insert(name.clone()) {
            continue;
        }
        let Some(entity_type) = metadata.get_entity_type(&name) else {
            continue;
        };
        queue.extend(entity_type.base_type.iter().cloned());
        queue.extend(
            entity_type
                .navigation_properties
                .iter()
                .map(|n| n.type_name.clone()),
        );
        rendered.push((name, entity_type_json(metadata, &entity_type)));
    }
    rendered
}

fn entity_type_json(metadata: &MetadataCache, entity_type: &EntityType) -> Value {
    let mut members = Map::new();
    members.insert("$Kind".into(), json!("EntityType"));
    if let Some(base) = metadata.resolve(entity_type.base_type.as_ref()) {
        members.insert("$BaseType".into(), json!(base.to_string()));
    }
    if !entity_type.key.is_empty() {
        members.insert("$Key".into(), json!(entity_type.key));
    }
    for (flag, set) in [
        ("$Abstract", entity_type.is_abstract),
        ("$OpenType", entity_type.is_open),
        ("$HasStream", entity_type.has_stream),
    ] {
        if set {
            members.insert(flag.into(), json!(true));
        }
    }
    for property in &entity_type.properties {
        members.insert(property.name.clone(), property_json(metadata, property));
    }
    for navigation in &entity_type.navigation_properties {
        let mut member = Map::new();
        member.insert("$Kind".into(), json!("NavigationProperty"));
        let target = metadata
            .resolve(Some(&navigation.type_name))
            .unwrap_or_else(|| navigation.type_name.clone());
        member.insert("$Type".into(), json!(target.to_string()));
        if navigation.collection {
            member.insert("$Collection".into(), json!(true));
        }
        if let Some(partner) = &navigation.partner {
            member.insert("$Partner".into(), json!(partner));
        }
        members.insert(navigation.name.clone(), Value::Object(member));
    }
    Value::Object(members)
}

fn property_json(metadata: &MetadataCache, property: &Property) -> Value {
    let mut member = Map::new();
    let type_name = metadata
        .resolve(Some(&property.type_name))
        .unwrap_or_else(|| property.type_name.clone());
    member.insert("$Type".into(), json!(type_name.to_string()));
    if property.collection {
        member.insert("$Collection".into(), json!(true));
    }
    if !property.nullable {
        member.insert("$Nullable".into(), json!(false));
    }
    if let Some(max_length) = property.max_length {
        member.insert("$MaxLength".into(), json!(max_length));
    }
    Value::Object(member)
}

fn container_json(metadata: &MetadataCache, container: &EntityContainer) -> Value {
    let mut members = Map::new();
    members.insert("$Kind".into(), json!("EntityContainer"));
    let qualified = |name: &QualifiedName| {
        metadata
            .resolve(Some(name))
            .unwrap_or_else(|| name.clone())
            .to_string()
    };
    for set in &container.entity_sets {
        let mut member = json!({"$Collection": true, "$Type": qualified(&set.entity_type)});
        if !set.include_in_service_document {
            member["$IncludeInServiceDocument"] = json!(false);
        }
        members.insert(set.name.clone(), member);
    }
    for singleton in &container.singletons {
        members.insert(
            singleton.name.clone(),
            json!({"$Type": qualified(&singleton.type_name)}),
        );
    }
    for import in &container.action_imports {
        members.insert(import.name.clone(), json!({"$Action": qualified(&import.operation)}));
    }
    for import in &container.function_imports {
        members.insert(
            import.name.clone(),
            json!({"$Function": qualified(&import.operation)}),
        );
    }
    Value::Object(members)
}

// ---------------------------------------------------------------------------
// XML error body
// ---------------------------------------------------------------------------

fn error_xml(error: &ServerError) -> String {
    let mut xml = String::from(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
    let _ = write!(
        xml,
        r#"<error xmlns="{ERROR_XML_NAMESPACE}"><code>{}</code><message>{}</message>"#,
        escape_xml(&error.code),
        escape_xml(&error.message)
    );
    if let Some(target) = &error.target {
        let _ = write!(xml, "<target>{}</target>", escape_xml(target));
    }
    xml.push_str("</error>");
    xml
}

fn escape_xml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use http::HeaderMap;
    use tokio::io::AsyncReadExt;

    use super::*;
    use crate::service::method::HttpMethod;
    use crate::service::request::ODataRequest;
    use crate::service::route::ResourceRoute;
    use crate::service::testing::metadata;

    fn request() -> ODataRequest {
        ODataRequest {
            method: HttpMethod::Get,
            protocol: "HTTP/1.1".into(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
            raw_request_uri: "http://host/odata/".into(),
            raw_base_uri: "http://host/odata/".into(),
            raw_odata_path: String::new(),
            raw_query_path: None,
            raw_service_resolution_uri: None,
        }
    }

    async fn body_of(mut response: ODataResponse) -> String {
        let mut body = String::new();
        if let Some(mut content) = response.content.take() {
            content.read_to_string(&mut body).await.unwrap();
        }
        body
    }

    async fn run(kind: ResourceKind) -> Value {
        let cache = metadata();
        let request = request();
        let route = ResourceRoute::of_kind(kind);
        let content_type = ContentType::json();
        let response = DefaultProcessor
            .process(ProcessContext {
                request: &request,
                route: &route,
                content_type: &content_type,
                metadata: &cache,
            })
            .await
            .unwrap();
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.headers[&ODATA_VERSION], "4.0");
        serde_json::from_str(&body_of(response).await).unwrap()
    }

    #[tokio::test]
    async fn service_document_lists_visible_resources() {
        let doc = run(ResourceKind::ServiceDocument).await;
        assert_eq!(doc["@odata.context"], "http://host/odata/$metadata");
        let names: Vec<&str> = doc["value"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["People", "Me"]);
    }

    #[tokio::test]
    async fn metadata_document_renders_reachable_types() {
        let doc = run(ResourceKind::Metadata).await;
        assert_eq!(doc["$Version"], "4.0");
        assert_eq!(doc["$EntityContainer"], "Demo.Model.Container");

        let schema = &doc["Demo.Model"];
        assert_eq!(schema["$Alias"], "demo");
        assert_eq!(schema["Person"]["$Key"], json!(["Id"]));
        assert_eq!(schema["Person"]["Id"]["$Nullable"], false);
        assert_eq!(schema["Person"]["Friends"]["$Type"], "Demo.Model.Person");
        assert_eq!(schema["Container"]["People"]["$Type"], "Demo.Model.Person");
        assert_eq!(
            schema["Container"]["Hidden"]["$IncludeInServiceDocument"],
            false
        );
    }

    #[tokio::test]
    async fn json_error_body() {
        let error = ServerError {
            target: Some("Nope".into()),
            ..ServerError::new(StatusCode::NOT_FOUND, "RESOURCE_NOT_FOUND", "not found")
        };
        let response = DefaultProcessor.process_error(&error, &ContentType::json());
        assert_eq!(response.status, StatusCode::NOT_FOUND);
        assert_eq!(response.content_type(), Some("application/json"));

        let body: Value = serde_json::from_str(&body_of(response).await).unwrap();
        assert_eq!(body["error"]["code"], "RESOURCE_NOT_FOUND");
        assert_eq!(body["error"]["target"], "Nope");
    }

    #[tokio::test]
    async fn xml_error_body_is_escaped() {
        let error = ServerError::new(StatusCode::BAD_REQUEST, "URI_SYNTAX", "bad <path> & more");
        let response = DefaultProcessor.process_error(&error, &ContentType::xml());
        assert_eq!(response.content_type(), Some("application/xml"));

        let body = body_of(response).await;
        assert!(body.starts_with("<?xml"));
        assert!(body.contains("<code>URI_SYNTAX</code>"));
        assert!(body.contains("bad &lt;path&gt; &amp; more"));
        assert!(!body.contains("<target>"));
    }
}
