use std::fmt;

use serde::Serialize;

use super::work_item::WorkItem;

/// Where in the pipeline an item was lost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Detail,
    Mapping,
    Comments,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Detail => f.write_str("detail"),
            Stage::Mapping => f.write_str("mapping"),
            Stage::Comments => f.write_str("comments"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemFailure {
    pub item_id: String,
    pub stage: Stage,
    pub error: String,
}

impl ItemFailure {
    pub fn new(item_id: impl Into<String>, stage: Stage, error: &impl fmt::Display) -> Self {
        Self {
            item_id: item_id.into(),
            stage,
            error: error.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExtractionReport {
    pub items: Vec<WorkItem>,
    /// Always empty under the abort policy.
    pub failures: Vec<ItemFailure>,
}
