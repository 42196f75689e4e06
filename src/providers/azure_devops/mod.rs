//! Azure DevOps work item extraction.
//!
//! One WIQL listing call fans out into a detail call per work item, the details
//! are mapped into [`WorkItem`]s, and a second fan-out attaches each item's
//! comments. Stages run strictly one after another; calls within a fan-out
//! stage run concurrently.

pub mod mapping;
pub mod wiql;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::config::AzureDevOpsConfig;
use crate::error::{Error, Result};
use crate::fanout::{FailurePolicy, FanOut};
use crate::http::{Auth, Method, ResilientClient, RetryPolicy, Transport};
use crate::model::report::{ExtractionReport, ItemFailure, Stage};
use crate::model::work_item::{CommentSet, WorkItem};

pub use wiql::DateWindow;

const WIQL_API_VERSION: &str = "7.2-preview.2";
const COMMENTS_API_VERSION: &str = "7.2-preview.4";

#[derive(Debug, Clone, Deserialize)]
pub struct ItemReference {
    pub id: u64,
    pub url: String,
}

#[derive(Deserialize)]
struct WiqlResponse {
    #[serde(rename = "workItems", default)]
    work_items: Vec<ItemReference>,
}

#[derive(Debug, Clone)]
pub struct WorkItemListing {
    pub count: usize,
    pub items: Vec<ItemReference>,
}

pub struct AzureDevOpsExtractor {
    base_url: String,
    project: String,
    client: ResilientClient,
    fan_out: FanOut,
    span: tracing::Span,
}

impl AzureDevOpsExtractor {
    pub fn new(
        config: &AzureDevOpsConfig,
        transport: Arc<dyn Transport>,
        retry: RetryPolicy,
        fan_out: FanOut,
    ) -> Self {
        let base_url = config.organization_url.trim_end_matches('/').to_string();
        let span = tracing::info_span!(
            "azure_devops",
            organization = %base_url,
            project = %config.project,
        );
        let auth = Auth::Basic {
            token: config.personal_access_token.clone(),
        };

        Self {
            base_url,
            project: config.project.clone(),
            client: ResilientClient::new(transport, auth, retry),
            fan_out,
            span,
        }
    }

    #[cfg(test)]
    pub fn with_sleeper(mut self, sleeper: Arc<dyn crate::http::retry::Sleeper>) -> Self {
        self.client = self.client.with_sleeper(sleeper);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.client = self.client.with_cancellation(cancel);
        self
    }

    async fn call(&self, method: Method, url: &str, body: Option<&Value>) -> Result<Value> {
        self.client
            .request(method, url, body)
            .instrument(self.span.clone())
            .await
    }

    pub async fn list_items(&self, window: &DateWindow) -> Result<WorkItemListing> {
        let url = format!(
            "{}/{}/_apis/wit/wiql?api-version={WIQL_API_VERSION}",
            self.base_url, self.project
        );
        let body = json!({ "query": wiql::work_items_query(&self.project, window) });

        let raw = self.call(Method::POST, &url, Some(&body)).await?;
        let listing: WiqlResponse =
            serde_json::from_value(raw).map_err(|source| Error::Decode { url, source })?;

        let count = listing.work_items.len();
        self.span.in_scope(|| {
            tracing::info!(
                count,
                start = %window.start,
                end = %window.end,
                "work item listing retrieved"
            )
        });

        Ok(WorkItemListing {
            count,
            items: listing.work_items,
        })
    }

    /// Fetch every referenced work item, in reference order. Any hard failure fails the batch.
    pub async fn resolve_details(&self, references: &[ItemReference]) -> Result<Vec<Value>> {
        self.span
            .in_scope(|| tracing::info!(count = references.len(), "resolving work item details"));
        self.fan_out
            .try_all(references, |r| self.call(Method::GET, &r.url, None))
            .await
    }

    pub async fn fetch_comments(&self, item_id: &str) -> Result<CommentSet> {
        let url = format!(
            "{}/{}/_apis/wit/workItems/{item_id}/comments?api-version={COMMENTS_API_VERSION}",
            self.base_url, self.project
        );
        let raw = self.call(Method::GET, &url, None).await?;
        mapping::map_comments(item_id, &raw)
    }

    async fn with_comments(&self, mut item: WorkItem) -> Result<WorkItem> {
        item.comments = Some(self.fetch_comments(&item.id).await?);
        Ok(item)
    }

    /// Attach comments to every item, in input order. Any hard failure fails the batch.
    pub async fn attach_comments(&self, items: Vec<WorkItem>) -> Result<Vec<WorkItem>> {
        self.span
            .in_scope(|| tracing::info!(count = items.len(), "attaching comments"));
        self.fan_out
            .try_all(items, |item| self.with_comments(item))
            .await
    }

    /// Run the whole pipeline for one window.
    ///
    /// Under [`FailurePolicy::CollectPartial`] items that failed are left out;
    /// use [`extract_report`](Self::extract_report) to see them.
    pub async fn extract(self, window: &DateWindow) -> Result<Vec<WorkItem>> {
        Ok(self.extract_report(window).await?.items)
    }

    /// Run the whole pipeline, consuming the extractor. The transport is
    /// released when this returns, whether the run succeeded or not.
    pub async fn extract_report(self, window: &DateWindow) -> Result<ExtractionReport> {
        let report = match self.fan_out.failure_policy {
            FailurePolicy::AbortOnFirst => self.run_all_or_nothing(window).await,
            FailurePolicy::CollectPartial => self.run_collecting(window).await,
        };

        match &report {
            Ok(report) => self.span.in_scope(|| {
                tracing::info!(
                    items = report.items.len(),
                    failures = report.failures.len(),
                    "extraction finished"
                )
            }),
            Err(e) => self
                .span
                .in_scope(|| tracing::error!(error = %e, "extraction aborted")),
        }

        drop(self);
        report
    }

    async fn run_all_or_nothing(&self, window: &DateWindow) -> Result<ExtractionReport> {
        let listing = self.list_items(window).await?;
        let details = self.resolve_details(&listing.items).await?;
        let items = mapping::map_items(&details)?;
        let items = self.attach_comments(items).await?;

        Ok(ExtractionReport {
            items,
            failures: Vec::new(),
        })
    }

    async fn run_collecting(&self, window: &DateWindow) -> Result<ExtractionReport> {
        let listing = self.list_items(window).await?;
        let mut failures = Vec::new();

        let details = self
            .fan_out
            .all(&listing.items, |r| self.call(Method::GET, &r.url, None))
            .await;

        let mut mapped = Vec::with_capacity(listing.count);
        for (reference, detail) in listing.items.iter().zip(details) {
            let item = detail
                .map_err(|e| ItemFailure::new(reference.id.to_string(), Stage::Detail, &e))
                .and_then(|raw| {
                    mapping::map_item(&raw)
                        .map_err(|e| ItemFailure::new(reference.id.to_string(), Stage::Mapping, &e))
                });
            match item {
                Ok(item) => mapped.push(item),
                Err(failure) => failures.push(failure),
            }
        }

        let with_comments = self
            .fan_out
            .all(mapped, |item| async move {
                let id = item.id.clone();
                self.with_comments(item)
                    .await
                    .map_err(|e| ItemFailure::new(id, Stage::Comments, &e))
            })
            .await;

        let mut items = Vec::with_capacity(with_comments.len());
        for outcome in with_comments {
            match outcome {
                Ok(item) => items.push(item),
                Err(failure) => failures.push(failure),
            }
        }

        for failure in &failures {
            self.span.in_scope(|| {
                tracing::warn!(
                    item_id = %failure.item_id,
                    stage = %failure.stage,
                    error = %failure.error,
                    "work item skipped"
                )
            });
        }

        Ok(ExtractionReport { items, failures })
    }
}
