//! The JSON graph archive.
//!
//! A whole reachable subgraph is emitted as a single self-describing
//! document. Every node appears as an object with one property named by its
//! kind (`{"Organization": {...}}`), which is also what dispatches ingestion
//! back to the right kind. The body holds `id`, `upList`, `downList`, the
//! kind's scalar fields, and any kind-specific reference fields (the
//! commitable change chain, address lines).
//!
//! Shared references and cycles use an id-sharing scheme: the first
//! occurrence of an identifier emits the full record, every later occurrence
//! emits `{"ref": "<uuid>"}`. Ingestion reconstructs shared ownership, so
//! both sides of an up/down pair point at the same record.
//!
//! Unknown kind names ingest as neutral nodes, preserving identifier and
//! edges. Malformed documents fail with [`CoreError::Deserialization`].

use std::collections::HashSet;

use serde_json::{json, Map, Value};

use crate::error::CoreError;
use crate::graph::{read_node, write_node, NodeGraph};
use crate::id::NodeId;
use crate::kind::NodeKind;
use crate::node::NodeRecord;
use crate::payload::Payload;

fn deser(reason: impl Into<String>) -> CoreError {
    CoreError::Deserialization {
        reason: reason.into(),
    }
}

// ---------------------------------------------------------------------------
// Emission
// ---------------------------------------------------------------------------

/// Serializes the reachable closure from `root` into one JSON document.
pub fn to_json(graph: &NodeGraph, root: NodeId) -> Result<Value, CoreError> {
    if !graph.contains(root) {
        return Err(CoreError::MissingNode { id: root });
    }
    let mut emitted = HashSet::new();
    Ok(emit_entry(graph, root, &mut emitted))
}

/// Serializes the reachable closure from `root` into a JSON string.
pub fn to_json_string(graph: &NodeGraph, root: NodeId) -> Result<String, CoreError> {
    let value = to_json(graph, root)?;
    serde_json::to_string(&value).map_err(|e| deser(e.to_string()))
}

/// Serializes one standalone record (no link resolution). Used for locator
/// records, which carry no links.
pub fn record_to_json(record: &NodeRecord) -> Value {
    let mut body = Map::new();
    body.insert("id".into(), Value::String(record.id_string()));
    body.insert(
        "upList".into(),
        Value::Array(record.up.iter().map(ref_entry).collect()),
    );
    body.insert(
        "downList".into(),
        Value::Array(record.down.iter().map(ref_entry).collect()),
    );
    append_scalars(record.payload(), &mut body);
    let mut entry = Map::new();
    entry.insert(record.kind_name().to_string(), Value::Object(body));
    Value::Object(entry)
}

fn ref_entry(id: &NodeId) -> Value {
    json!({ "ref": id.to_string() })
}

fn emit_entry(graph: &NodeGraph, id: NodeId, emitted: &mut HashSet<NodeId>) -> Value {
    let Some(handle) = graph.node(id) else {
        // Dangling link: preserve the identifier as a reference.
        return ref_entry(&id);
    };
    if !emitted.insert(id) {
        return ref_entry(&id);
    }

    // Snapshot under the read lock, then drop it before recursing so a
    // cyclic document never re-enters a held lock.
    let (kind_name, up, down, payload) = {
        let record = read_node(&handle);
        (
            record.kind_name(),
            record.up.clone(),
            record.down.clone(),
            record.payload().clone(),
        )
    };

    let mut body = Map::new();
    body.insert("id".into(), Value::String(id.to_string()));
    body.insert(
        "upList".into(),
        Value::Array(
            up.into_iter()
                .map(|n| emit_entry(graph, n, emitted))
                .collect(),
        ),
    );
    body.insert(
        "downList".into(),
        Value::Array(
            down.into_iter()
                .map(|n| emit_entry(graph, n, emitted))
                .collect(),
        ),
    );
    append_scalars(&payload, &mut body);

    if let Some(committed) = payload.is_committed() {
        body.insert("committed".into(), Value::Bool(committed));
        body.insert(
            "changeParent".into(),
            emit_optional(graph, payload.change_parent(), emitted),
        );
        body.insert(
            "changeChild".into(),
            emit_optional(graph, payload.change_child(), emitted),
        );
    }
    if matches!(
        payload,
        Payload::InternationalAddress(_) | Payload::UsAddress(_)
    ) {
        body.insert(
            "addressLines".into(),
            emit_optional(graph, payload.address_lines(), emitted),
        );
    }

    let mut entry = Map::new();
    entry.insert(kind_name.to_string(), Value::Object(body));
    Value::Object(entry)
}

fn emit_optional(graph: &NodeGraph, id: Option<NodeId>, emitted: &mut HashSet<NodeId>) -> Value {
    match id {
        Some(id) => emit_entry(graph, id, emitted),
        None => Value::Null,
    }
}

/// Scalar fields per kind, using the archive's camelCase names.
fn append_scalars(payload: &Payload, body: &mut Map<String, Value>) {
    match payload {
        Payload::Node => {}
        Payload::GraphNode(d) => {
            body.insert("title".into(), json!(d.title));
        }
        Payload::Organization(d) => {
            body.insert("locked".into(), json!(d.is_locked()));
            body.insert("name".into(), json!(d.name()));
        }
        Payload::Product(c) => {
            let d = c.data();
            body.insert("title".into(), json!(d.title));
            body.insert("description".into(), json!(d.description));
        }
        Payload::Project(d) => {
            body.insert("name".into(), json!(d.name));
            body.insert("description".into(), json!(d.description));
        }
        Payload::Requirement(c) => {
            let d = c.data();
            body.insert("title".into(), json!(d.title));
            body.insert("text".into(), json!(d.text));
            body.insert("functional".into(), json!(d.functional));
        }
        Payload::Story(c) => {
            let d = c.data();
            body.insert("title".into(), json!(d.title));
            body.insert("goal".into(), json!(d.goal));
            body.insert("benefit".into(), json!(d.benefit));
        }
        Payload::UseCase(c) => {
            body.insert("name".into(), json!(c.data().name));
        }
        Payload::Text(d) => {
            body.insert("text".into(), json!(d.text));
        }
        Payload::Completed(d) => {
            body.insert("description".into(), json!(d.description));
        }
        Payload::KeyValue(d) => {
            body.insert("key".into(), json!(d.key));
            body.insert("value".into(), json!(d.value));
        }
        Payload::TimeEstimate(d) => {
            body.insert("text".into(), json!(d.text));
            body.insert("estimate".into(), json!(d.estimate));
            body.insert("started".into(), json!(d.started));
            body.insert("startTimestamp".into(), json!(d.start));
        }
        Payload::Effort(d) => {
            body.insert("text".into(), json!(d.text));
            body.insert("effort".into(), json!(d.effort));
        }
        Payload::Role(d) => {
            body.insert("who".into(), json!(d.who));
        }
        Payload::Actor(d) => {
            body.insert("actor".into(), json!(d.actor));
        }
        Payload::Goal(d) => {
            body.insert("action".into(), json!(d.action));
            body.insert("outcome".into(), json!(d.outcome));
            body.insert("context".into(), json!(d.context));
            body.insert("targetDate".into(), json!(d.target_date));
            body.insert("targetDateConfidence".into(), json!(d.target_date_confidence));
            body.insert("alignment".into(), json!(d.alignment));
        }
        Payload::Purpose(d) => {
            body.insert("description".into(), json!(d.description));
            body.insert("deadline".into(), json!(d.deadline));
            body.insert("deadlineConfidence".into(), json!(d.deadline_confidence));
        }
        Payload::Person(d) => {
            body.insert("firstName".into(), json!(d.first_name));
            body.insert("lastName".into(), json!(d.last_name));
        }
        Payload::EmailAddress(d) => {
            body.insert("address".into(), json!(d.address));
        }
        Payload::PhoneNumber(d) => {
            body.insert("countryCode".into(), json!(d.country_code));
            body.insert("number".into(), json!(d.number));
            body.insert("phoneType".into(), json!(d.phone_type));
        }
        Payload::InternationalAddress(d) => {
            body.insert("countryCode".into(), json!(d.country_code));
            body.insert("locality".into(), json!(d.locality));
            body.insert("postalCode".into(), json!(d.postal_code));
        }
        Payload::UsAddress(d) => {
            body.insert("city".into(), json!(d.city));
            body.insert("state".into(), json!(d.state));
            body.insert("zipCode".into(), json!(d.zipcode));
        }
        Payload::Event(d) => {
            body.insert("name".into(), json!(d.name));
            body.insert("description".into(), json!(d.description));
        }
        Payload::RecurringTodo(d) => {
            body.insert("description".into(), json!(d.description));
            body.insert("created".into(), json!(d.created));
            body.insert("recurringInterval".into(), json!(d.recurring_interval));
            body.insert("secondsFlag".into(), json!(d.seconds_flag));
            body.insert("dayOfMonthFlag".into(), json!(d.day_of_month_flag));
            body.insert("dayOfYearFlag".into(), json!(d.day_of_year_flag));
        }
        Payload::Todo(d) => {
            body.insert("description".into(), json!(d.description));
            body.insert("created".into(), json!(d.created));
            body.insert("due".into(), json!(d.due));
            body.insert("completed".into(), json!(d.completed));
            body.insert("dateCompleted".into(), json!(d.date_completed));
            body.insert(
                "spawnedFrom".into(),
                match d.spawned_from {
                    Some(id) => Value::String(id.to_string()),
                    None => Value::Null,
                },
            );
        }
        Payload::ServerLocator(d) => {
            body.insert("graphUuid".into(), json!(d.graph_uuid));
            body.insert("graphTitle".into(), json!(d.graph_title));
            body.insert("graphAddress".into(), json!(d.graph_address));
        }
    }
}

// ---------------------------------------------------------------------------
// Ingestion
// ---------------------------------------------------------------------------

/// Rebuilds a graph from an archive document. Returns the arena and the
/// root identifier. Every ingested record is marked changed, so a posted
/// graph actually persists when handed to the save traversal.
pub fn from_json(value: &Value) -> Result<(NodeGraph, NodeId), CoreError> {
    let mut graph = NodeGraph::new();
    let root = ingest_entry(value, &mut graph)?;
    Ok((graph, root))
}

/// Rebuilds a graph from an archive string.
pub fn from_json_str(s: &str) -> Result<(NodeGraph, NodeId), CoreError> {
    let value: Value = serde_json::from_str(s).map_err(|e| deser(e.to_string()))?;
    from_json(&value)
}

fn ingest_entry(value: &Value, graph: &mut NodeGraph) -> Result<NodeId, CoreError> {
    let obj = value
        .as_object()
        .ok_or_else(|| deser("node entry is not an object"))?;

    // A reference to a node emitted earlier in the document.
    if let Some(reference) = obj.get("ref") {
        let id_str = reference
            .as_str()
            .ok_or_else(|| deser("ref is not a string"))?;
        let id = NodeId::parse(id_str)?;
        if !graph.contains(id) {
            // Forward or dangling reference: keep the identifier alive as a
            // neutral node so adjacency survives.
            let mut placeholder = NodeRecord::plain();
            placeholder.set_id(id);
            graph.add(placeholder);
        }
        return Ok(id);
    }

    if obj.len() != 1 {
        return Err(deser("node entry must have exactly one kind property"));
    }
    let (kind_name, body) = obj.iter().next().ok_or_else(|| deser("empty node entry"))?;
    let kind = NodeKind::from_name_or_node(kind_name);
    let body = body
        .as_object()
        .ok_or_else(|| deser(format!("{kind_name} body is not an object")))?;

    let id_str = body
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| deser(format!("{kind_name} entry is missing its id")))?;
    let id = NodeId::parse(id_str)?;

    let mut record = NodeRecord::new(Payload::blank(kind));
    record.set_id(id);
    apply_scalars(record.payload_raw_mut(), body);
    if body.get("committed").and_then(Value::as_bool) == Some(true) {
        // Scalars are applied first; commit freezes them afterwards.
        let _ = record.payload_raw_mut().commit();
    }
    // Insert before walking the lists so cyclic documents resolve back to
    // this record instead of a placeholder.
    graph.add(record);

    for (field, up) in [("upList", true), ("downList", false)] {
        let Some(list) = body.get(field) else {
            continue;
        };
        let list = list
            .as_array()
            .ok_or_else(|| deser(format!("{field} is not an array")))?;
        for entry in list {
            let neighbor = ingest_entry(entry, graph)?;
            let handle = graph.node(id).ok_or(CoreError::MissingNode { id })?;
            let mut record = write_node(&handle);
            if up {
                record.add_up(neighbor);
            } else {
                record.add_down(neighbor);
            }
        }
    }

    if kind.is_commitable() {
        for (field, parent) in [("changeParent", true), ("changeChild", false)] {
            let Some(entry) = body.get(field) else {
                continue;
            };
            if entry.is_null() {
                continue;
            }
            let target = ingest_entry(entry, graph)?;
            let handle = graph.node(id).ok_or(CoreError::MissingNode { id })?;
            let mut record = write_node(&handle);
            if parent {
                record.payload_raw_mut().set_change_parent(Some(target))?;
            } else {
                record.payload_raw_mut().set_change_child(Some(target))?;
            }
        }
    }

    if matches!(
        kind,
        NodeKind::InternationalAddress | NodeKind::UsAddress
    ) {
        if let Some(entry) = body.get("addressLines") {
            if !entry.is_null() {
                let lines = ingest_entry(entry, graph)?;
                let handle = graph.node(id).ok_or(CoreError::MissingNode { id })?;
                let mut record = write_node(&handle);
                match record.payload_raw_mut() {
                    Payload::InternationalAddress(d) => d.address_lines = Some(lines),
                    Payload::UsAddress(d) => d.address_lines = Some(lines),
                    _ => {}
                }
            }
        }
    }

    Ok(id)
}

fn str_field(body: &Map<String, Value>, name: &str) -> String {
    body.get(name)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn i64_field(body: &Map<String, Value>, name: &str) -> i64 {
    body.get(name).and_then(Value::as_i64).unwrap_or(0)
}

fn bool_field(body: &Map<String, Value>, name: &str) -> bool {
    body.get(name).and_then(Value::as_bool).unwrap_or(false)
}

fn apply_scalars(payload: &mut Payload, body: &Map<String, Value>) {
    match payload {
        Payload::Node | Payload::ServerLocator(_) => {}
        Payload::GraphNode(d) => {
            d.title = str_field(body, "title");
        }
        Payload::Organization(d) => {
            d.set_name_raw(str_field(body, "name"));
            if bool_field(body, "locked") {
                d.lock();
            }
        }
        Payload::Product(c) => {
            let d = c.data_raw_mut();
            d.title = str_field(body, "title");
            d.description = str_field(body, "description");
        }
        Payload::Project(d) => {
            d.name = str_field(body, "name");
            d.description = str_field(body, "description");
        }
        Payload::Requirement(c) => {
            let d = c.data_raw_mut();
            d.title = str_field(body, "title");
            d.text = str_field(body, "text");
            d.functional = bool_field(body, "functional");
        }
        Payload::Story(c) => {
            let d = c.data_raw_mut();
            d.title = str_field(body, "title");
            d.goal = str_field(body, "goal");
            d.benefit = str_field(body, "benefit");
        }
        Payload::UseCase(c) => {
            c.data_raw_mut().name = str_field(body, "name");
        }
        Payload::Text(d) => {
            d.text = str_field(body, "text");
        }
        Payload::Completed(d) => {
            d.description = str_field(body, "description");
        }
        Payload::KeyValue(d) => {
            d.key = str_field(body, "key");
            d.value = str_field(body, "value");
        }
        Payload::TimeEstimate(d) => {
            d.text = str_field(body, "text");
            d.estimate = i64_field(body, "estimate");
            d.started = bool_field(body, "started");
            d.start = i64_field(body, "startTimestamp");
        }
        Payload::Effort(d) => {
            d.text = str_field(body, "text");
            d.effort = i64_field(body, "effort");
        }
        Payload::Role(d) => {
            d.who = str_field(body, "who");
        }
        Payload::Actor(d) => {
            d.actor = str_field(body, "actor");
        }
        Payload::Goal(d) => {
            d.action = str_field(body, "action");
            d.outcome = str_field(body, "outcome");
            d.context = str_field(body, "context");
            d.target_date = i64_field(body, "targetDate");
            d.target_date_confidence = str_field(body, "targetDateConfidence");
            d.alignment = str_field(body, "alignment");
        }
        Payload::Purpose(d) => {
            d.description = str_field(body, "description");
            d.deadline = i64_field(body, "deadline");
            d.deadline_confidence = str_field(body, "deadlineConfidence");
        }
        Payload::Person(d) => {
            d.first_name = str_field(body, "firstName");
            d.last_name = str_field(body, "lastName");
        }
        Payload::EmailAddress(d) => {
            d.address = str_field(body, "address");
        }
        Payload::PhoneNumber(d) => {
            d.country_code = str_field(body, "countryCode");
            d.number = str_field(body, "number");
            d.phone_type = str_field(body, "phoneType");
        }
        Payload::InternationalAddress(d) => {
            d.country_code = str_field(body, "countryCode");
            d.locality = str_field(body, "locality");
            d.postal_code = str_field(body, "postalCode");
        }
        Payload::UsAddress(d) => {
            d.city = str_field(body, "city");
            d.state = str_field(body, "state");
            d.zipcode = str_field(body, "zipCode");
        }
        Payload::Event(d) => {
            d.name = str_field(body, "name");
            d.description = str_field(body, "description");
        }
        Payload::RecurringTodo(d) => {
            d.description = str_field(body, "description");
            d.created = i64_field(body, "created");
            d.recurring_interval = i64_field(body, "recurringInterval");
            d.seconds_flag = bool_field(body, "secondsFlag");
            d.day_of_month_flag = bool_field(body, "dayOfMonthFlag");
            d.day_of_year_flag = bool_field(body, "dayOfYearFlag");
        }
        Payload::Todo(d) => {
            d.description = str_field(body, "description");
            d.created = i64_field(body, "created");
            d.due = i64_field(body, "due");
            d.completed = bool_field(body, "completed");
            d.date_completed = i64_field(body, "dateCompleted");
            d.spawned_from = body
                .get("spawnedFrom")
                .and_then(Value::as_str)
                .and_then(|s| NodeId::parse(s).ok());
        }
    }
}
