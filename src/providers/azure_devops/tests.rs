use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use super::*;
use crate::http::testing::{RecordingSleeper, Reply, ScriptedTransport};

const BASE: &str = "https://dev.azure.com/org";
const PROJECT: &str = "proj";

fn config() -> AzureDevOpsConfig {
    AzureDevOpsConfig {
        organization_url: format!("{BASE}/"),
        project: PROJECT.into(),
        personal_access_token: "pat".into(),
    }
}

fn listing_url() -> String {
    format!("{BASE}/{PROJECT}/_apis/wit/wiql?api-version=7.2-preview.2")
}

fn detail_url(id: u64) -> String {
    format!("{BASE}/_apis/wit/workItems/{id}")
}

fn comments_url(id: u64) -> String {
    format!("{BASE}/{PROJECT}/_apis/wit/workItems/{id}/comments?api-version=7.2-preview.4")
}

fn listing(ids: &[u64]) -> Value {
    let refs: Vec<Value> = ids
        .iter()
        .map(|id| json!({ "id": id, "url": detail_url(*id) }))
        .collect();
    json!({
        "queryType": "flat",
        "asOf": "2024-03-28T00:00:00Z",
        "workItems": refs
    })
}

fn detail(id: u64) -> Value {
    json!({
        "id": id,
        "fields": {
            "System.Title": format!("Item {id}"),
            "System.State": "Active",
            "System.ChangedDate": "2024-03-20T08:00:00Z",
            "System.WorkItemType": "Task"
        },
        "url": detail_url(id)
    })
}

fn comments(n: u64) -> Value {
    let list: Vec<Value> = (1..=n)
        .map(|i| {
            json!({
                "id": i,
                "text": format!("comment {i}"),
                "createdBy": { "displayName": "Grace Hopper" },
                "createdDate": "2024-03-21T12:00:00Z"
            })
        })
        .collect();
    json!({ "totalCount": n, "count": n, "comments": list })
}

fn extractor(
    transport: Arc<ScriptedTransport>,
    sleeper: Arc<RecordingSleeper>,
    policy: FailurePolicy,
) -> AzureDevOpsExtractor {
    AzureDevOpsExtractor::new(
        &config(),
        transport,
        RetryPolicy::default(),
        FanOut {
            max_concurrency: None,
            failure_policy: policy,
        },
    )
    .with_sleeper(sleeper)
}

fn references(ids: &[u64]) -> Vec<ItemReference> {
    ids.iter()
        .map(|id| ItemReference {
            id: *id,
            url: detail_url(*id),
        })
        .collect()
}

fn window() -> DateWindow {
    DateWindow::parse("2024-03-18", 10).unwrap()
}

#[tokio::test]
async fn list_items_posts_windowed_query() {
    let transport = Arc::new(
        ScriptedTransport::new().route(&listing_url(), [Reply::json(200, listing(&[3, 1]))]),
    );
    let ex = extractor(
        transport.clone(),
        Arc::default(),
        FailurePolicy::AbortOnFirst,
    );

    let result = ex.list_items(&window()).await.unwrap();

    assert_eq!(result.count, 2);
    assert_eq!(result.items[0].id, 3);
    assert_eq!(result.items[1].url, detail_url(1));

    let requests = transport.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, Method::POST);
    let query = requests[0].body.as_ref().unwrap()["query"]
        .as_str()
        .unwrap()
        .to_string();
    assert!(query.contains("[System.TeamProject] = 'proj'"));
    assert!(query.contains(">= '2024-03-18'"));
    assert!(query.contains("< '2024-03-28'"));
}

#[tokio::test]
async fn empty_listing_is_not_an_error() {
    let transport = Arc::new(
        ScriptedTransport::new().route(&listing_url(), [Reply::json(200, json!({ "workItems": [] }))]),
    );
    let ex = extractor(transport, Arc::default(), FailurePolicy::AbortOnFirst);

    let result = ex.list_items(&window()).await.unwrap();
    assert_eq!(result.count, 0);
    assert!(result.items.is_empty());
}

#[tokio::test]
async fn details_come_back_in_reference_order() {
    let ids = [1, 2, 3, 4, 5];
    let mut transport = ScriptedTransport::new();
    for id in ids {
        // later references answer first
        let delay = Duration::from_millis((6 - id) * 15);
        transport = transport.route(&detail_url(id), [Reply::json(200, detail(id)).after(delay)]);
    }
    let ex = extractor(Arc::new(transport), Arc::default(), FailurePolicy::AbortOnFirst);

    let details = ex.resolve_details(&references(&ids)).await.unwrap();

    let got: Vec<u64> = details.iter().map(|d| d["id"].as_u64().unwrap()).collect();
    assert_eq!(got, ids);
}

#[tokio::test]
async fn one_not_found_aborts_details_without_retry() {
    let ids = [1, 2, 3, 4, 5];
    let mut transport = ScriptedTransport::new();
    for id in ids {
        let reply = if id == 3 {
            Reply::text(404, "work item 3 does not exist")
        } else {
            Reply::json(200, detail(id)).after(Duration::from_millis(10))
        };
        transport = transport.route(&detail_url(id), [reply]);
    }
    let transport = Arc::new(transport);
    let sleeper = Arc::new(RecordingSleeper::default());
    let ex = extractor(transport.clone(), sleeper.clone(), FailurePolicy::AbortOnFirst);

    let err = ex.resolve_details(&references(&ids)).await.unwrap_err();

    assert_eq!(err.status(), Some(404));
    assert_eq!(transport.calls_to(&detail_url(3)), 1);
    assert!(sleeper.slept().is_empty());
}

#[tokio::test]
async fn detail_recovers_from_one_503() {
    let transport = Arc::new(ScriptedTransport::new().route(
        &detail_url(9),
        [Reply::text(503, "unavailable"), Reply::json(200, detail(9))],
    ));
    let sleeper = Arc::new(RecordingSleeper::default());
    let ex = extractor(transport.clone(), sleeper.clone(), FailurePolicy::AbortOnFirst);

    let details = ex.resolve_details(&references(&[9])).await.unwrap();

    assert_eq!(details[0]["id"], json!(9));
    assert_eq!(transport.calls_to(&detail_url(9)), 2);
    let slept = sleeper.slept();
    assert_eq!(slept.len(), 1);
    assert!(slept[0] >= Duration::from_secs(60));
}

#[tokio::test]
async fn comments_attach_in_item_order() {
    let ids = [1, 2, 3];
    let mut transport = ScriptedTransport::new();
    for id in ids {
        let delay = Duration::from_millis((4 - id) * 15);
        transport = transport.route(&comments_url(id), [Reply::json(200, comments(id)).after(delay)]);
    }
    let ex = extractor(Arc::new(transport), Arc::default(), FailurePolicy::AbortOnFirst);
    let items = mapping::map_items(&ids.map(detail)).unwrap();

    let items = ex.attach_comments(items).await.unwrap();

    let got: Vec<(&str, u64)> = items
        .iter()
        .map(|i| (i.id.as_str(), i.comments.as_ref().unwrap().count))
        .collect();
    assert_eq!(got, vec![("1", 1), ("2", 2), ("3", 3)]);
}

#[tokio::test]
async fn zero_comments_yield_empty_set() {
    let transport = Arc::new(ScriptedTransport::new().route(
        &comments_url(5),
        [Reply::json(200, json!({ "totalCount": 0, "count": 0, "comments": [] }))],
    ));
    let ex = extractor(transport, Arc::default(), FailurePolicy::AbortOnFirst);
    let items = mapping::map_items(&[detail(5)]).unwrap();

    let items = ex.attach_comments(items).await.unwrap();

    let set = items[0].comments.as_ref().expect("comments attached");
    assert_eq!(set.total_count, 0);
    assert_eq!(set.count, 0);
    assert!(set.comments.is_empty());
    let json = serde_json::to_value(&items[0]).unwrap();
    assert_eq!(
        json["comments"],
        json!({ "totalCount": 0, "count": 0, "comments": [] })
    );
}

fn two_item_transport() -> ScriptedTransport {
    ScriptedTransport::new()
        .route(&listing_url(), [Reply::json(200, listing(&[11, 12]))])
        .route(
            &detail_url(11),
            [Reply::json(200, detail(11)).after(Duration::from_millis(20))],
        )
        .route(&detail_url(12), [Reply::json(200, detail(12))])
        .route(
            &comments_url(11),
            [Reply::json(200, comments(1)).after(Duration::from_millis(20))],
        )
        .route(&comments_url(12), [Reply::json(200, comments(0))])
}

#[tokio::test]
async fn extract_end_to_end() {
    let ex = extractor(
        Arc::new(two_item_transport()),
        Arc::default(),
        FailurePolicy::AbortOnFirst,
    );

    let items = ex.extract(&window()).await.unwrap();

    assert_eq!(items.len(), 2);
    assert_eq!(items[0].id, "11");
    assert_eq!(items[0].system.title, "Item 11");
    assert_eq!(items[0].comments.as_ref().unwrap().count, 1);
    assert_eq!(items[0].comments.as_ref().unwrap().comments[0].text, "comment 1");
    assert_eq!(items[1].id, "12");
    assert_eq!(items[1].comments.as_ref().unwrap().count, 0);
}

#[tokio::test]
async fn extract_releases_transport_once_on_success() {
    let transport = two_item_transport();
    let released = transport.release_counter();
    let ex = extractor(Arc::new(transport), Arc::default(), FailurePolicy::AbortOnFirst);

    ex.extract(&window()).await.unwrap();

    assert_eq!(released.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn extract_releases_transport_once_on_failure() {
    let transport = ScriptedTransport::new()
        .route(&listing_url(), [Reply::json(200, listing(&[11]))])
        .route(&detail_url(11), [Reply::text(401, "unauthorized")]);
    let released = transport.release_counter();
    let ex = extractor(Arc::new(transport), Arc::default(), FailurePolicy::AbortOnFirst);

    let err = ex.extract(&window()).await.unwrap_err();

    assert_eq!(err.status(), Some(401));
    assert_eq!(released.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn extract_fails_on_invalid_item() {
    let transport = ScriptedTransport::new()
        .route(&listing_url(), [Reply::json(200, listing(&[11, 12]))])
        .route(&detail_url(11), [Reply::json(200, detail(11))])
        .route(&detail_url(12), [Reply::json(200, json!({ "id": 12, "fields": {} }))]);
    let transport = Arc::new(transport);
    let ex = extractor(transport.clone(), Arc::default(), FailurePolicy::AbortOnFirst);

    let err = ex.extract(&window()).await.unwrap_err();

    assert!(matches!(err, Error::Validation { .. }));
    // comments are never requested once mapping fails
    assert_eq!(transport.calls_to(&comments_url(11)), 0);
}

#[tokio::test]
async fn collect_policy_reports_failures_per_item() {
    let transport = ScriptedTransport::new()
        .route(&listing_url(), [Reply::json(200, listing(&[1, 2, 3, 4]))])
        .route(&detail_url(1), [Reply::json(200, detail(1))])
        .route(&detail_url(2), [Reply::text(404, "gone")])
        .route(&detail_url(3), [Reply::json(200, json!({ "id": 3, "fields": {} }))])
        .route(&detail_url(4), [Reply::json(200, detail(4))])
        .route(&comments_url(1), [Reply::json(200, comments(2))])
        .route(&comments_url(4), [Reply::text(500, "boom")]);
    let ex = extractor(Arc::new(transport), Arc::default(), FailurePolicy::CollectPartial);

    let report = ex.extract_report(&window()).await.unwrap();

    assert_eq!(report.items.len(), 1);
    assert_eq!(report.items[0].id, "1");
    assert_eq!(report.items[0].comments.as_ref().unwrap().count, 2);

    let failures: Vec<(&str, Stage)> = report
        .failures
        .iter()
        .map(|f| (f.item_id.as_str(), f.stage))
        .collect();
    assert_eq!(
        failures,
        vec![
            ("2", Stage::Detail),
            ("3", Stage::Mapping),
            ("4", Stage::Comments)
        ]
    );
    assert!(report.failures[0].error.contains("404"));
}

#[tokio::test]
async fn collect_policy_still_fails_on_listing_error() {
    let transport =
        ScriptedTransport::new().route(&listing_url(), [Reply::text(403, "forbidden")]);
    let ex = extractor(Arc::new(transport), Arc::default(), FailurePolicy::CollectPartial);

    let err = ex.extract_report(&window()).await.unwrap_err();
    assert_eq!(err.status(), Some(403));
}

#[tokio::test]
async fn cancelled_run_stops_retrying() {
    let transport =
        ScriptedTransport::new().route(&listing_url(), [Reply::network("connection refused")]);
    let cancel = CancellationToken::new();
    let ex = AzureDevOpsExtractor::new(
        &config(),
        Arc::new(transport),
        RetryPolicy::default(),
        FanOut::default(),
    )
    .with_cancellation(cancel.clone());

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        trigger.cancel();
    });

    let err = ex.extract(&window()).await.unwrap_err();
    assert!(matches!(err, Error::Cancelled { .. }));
}
