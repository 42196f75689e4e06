use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::model::work_item::{Comment, CommentSet, SystemFields, WorkItem};
use crate::util::identity::{display_name, scalar_text};

const CUSTOM_PREFIX: &str = "Custom.";

pub fn map_items(payloads: &[Value]) -> Result<Vec<WorkItem>> {
    payloads.iter().map(map_item).collect()
}

/// Map one work item detail payload. Comments are left unset.
pub fn map_item(payload: &Value) -> Result<WorkItem> {
    let id = payload
        .get("id")
        .and_then(scalar_text)
        .ok_or_else(|| Error::validation("unknown", "id"))?;

    let empty = Map::new();
    let fields = payload
        .get("fields")
        .and_then(Value::as_object)
        .unwrap_or(&empty);

    let required = |name: &str| {
        fields
            .get(name)
            .and_then(scalar_text)
            .ok_or_else(|| Error::validation(id.as_str(), name))
    };
    let optional = |name: &str| fields.get(name).and_then(scalar_text);

    let system = SystemFields {
        title: required("System.Title")?,
        state: required("System.State")?,
        changed_date: required("System.ChangedDate")?,
        work_item_type: required("System.WorkItemType")?,
        description: optional("System.Description"),
        reason: optional("System.Reason"),
        assigned_to: fields.get("System.AssignedTo").and_then(display_name),
    };

    let custom: BTreeMap<String, Value> = fields
        .iter()
        .filter_map(|(key, value)| {
            key.strip_prefix(CUSTOM_PREFIX)
                .map(|name| (name.to_string(), value.clone()))
        })
        .collect();

    Ok(WorkItem {
        id,
        system,
        custom: (!custom.is_empty()).then_some(custom),
        comments: None,
    })
}

pub fn map_comments(item_id: &str, payload: &Value) -> Result<CommentSet> {
    let comments = match payload.get("comments").and_then(Value::as_array) {
        Some(raw) => raw
            .iter()
            .map(|c| map_comment(item_id, c))
            .collect::<Result<Vec<_>>>()?,
        None => Vec::new(),
    };

    Ok(CommentSet {
        total_count: payload
            .get("totalCount")
            .and_then(Value::as_u64)
            .unwrap_or(0),
        count: payload.get("count").and_then(Value::as_u64).unwrap_or(0),
        comments,
    })
}

fn map_comment(item_id: &str, raw: &Value) -> Result<Comment> {
    let missing = |field: &str| Error::validation(item_id, format!("comments[].{field}"));
    Ok(Comment {
        id: raw
            .get("id")
            .and_then(Value::as_i64)
            .ok_or_else(|| missing("id"))?,
        text: raw
            .get("text")
            .and_then(Value::as_str)
            .map(String::from)
            .ok_or_else(|| missing("text"))?,
        created_by: raw
            .get("createdBy")
            .and_then(display_name)
            .ok_or_else(|| missing("createdBy"))?,
        created_date: raw
            .get("createdDate")
            .and_then(scalar_text)
            .ok_or_else(|| missing("createdDate"))?,
    })
}
