// TelemetryStore against a temp SQLite file: merge-update semantics and settings

use sensorpoll::store::{SETTINGS_PATH, TelemetryStore};
use serde_json::json;
use tempfile::TempDir;

async fn store() -> (TempDir, TelemetryStore) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("telemetry.db");
    let store = TelemetryStore::connect(path.to_str().unwrap()).await.unwrap();
    store.init().await.unwrap();
    (dir, store)
}

#[tokio::test]
async fn empty_store_returns_none() {
    let (_dir, store) = store().await;
    assert_eq!(store.get("current").await.unwrap(), None);
    assert_eq!(store.get("").await.unwrap(), None);
    assert!(store.fetch_settings().await.unwrap().is_empty());
}

#[tokio::test]
async fn update_merges_children_and_leaves_siblings() {
    let (_dir, store) = store().await;
    store
        .update("current", &json!({"a": {"isActive": true}, "b": {"isActive": true}}))
        .await
        .unwrap();
    store
        .update("current", &json!({"a": {"isActive": false}}))
        .await
        .unwrap();

    let current = store.get("current").await.unwrap().unwrap();
    assert_eq!(current["a"], json!({"isActive": false}));
    assert_eq!(current["b"], json!({"isActive": true}));
}

#[tokio::test]
async fn listed_child_is_replaced_not_deep_merged() {
    let (_dir, store) = store().await;
    store
        .update("current", &json!({"a": {"x": 1, "y": 2}}))
        .await
        .unwrap();
    store.update("current", &json!({"a": {"x": 3}})).await.unwrap();
    assert_eq!(
        store.get("current/a").await.unwrap(),
        Some(json!({"x": 3}))
    );
}

#[tokio::test]
async fn nested_path_updates_accumulate_buckets() {
    let (_dir, store) = store().await;
    let point = |v: f64| json!({"min": v, "max": v, "mean": v});
    store
        .update("timeseries/a/temperature", &json!({"100": point(1.0)}))
        .await
        .unwrap();
    store
        .update("timeseries/a/temperature", &json!({"160": point(2.0)}))
        .await
        .unwrap();
    store
        .update("timeseries/b/humidity", &json!({"100": point(40.0)}))
        .await
        .unwrap();

    let series = store.get("/timeseries/a/temperature/").await.unwrap().unwrap();
    assert_eq!(series.as_object().unwrap().len(), 2);
    assert_eq!(series["160"]["mean"], 2.0);

    let all = store.get("timeseries").await.unwrap().unwrap();
    assert_eq!(all["b"]["humidity"]["100"]["min"], 40.0);
}

#[tokio::test]
async fn scalar_leaf_can_become_a_subtree_and_back() {
    let (_dir, store) = store().await;
    store.update("", &json!({"node": 5})).await.unwrap();
    store
        .update("node", &json!({"child": "x"}))
        .await
        .unwrap();
    assert_eq!(store.get("node").await.unwrap(), Some(json!({"child": "x"})));

    store.update("", &json!({"node": [1, 2]})).await.unwrap();
    assert_eq!(store.get("node").await.unwrap(), Some(json!([1, 2])));
    assert_eq!(store.get("node/child").await.unwrap(), None);
}

#[tokio::test]
async fn prefix_lookalike_paths_are_separate() {
    let (_dir, store) = store().await;
    store
        .update("current", &json!({"a": 1, "ab": 2}))
        .await
        .unwrap();
    assert_eq!(store.get("current/a").await.unwrap(), Some(json!(1)));
    store.update("current", &json!({"a": 9})).await.unwrap();
    assert_eq!(store.get("current/ab").await.unwrap(), Some(json!(2)));
}

#[tokio::test]
async fn replacing_the_root_is_rejected() {
    let (_dir, store) = store().await;
    assert!(store.update("/", &json!(1)).await.is_err());
}

#[tokio::test]
async fn fetch_settings_accepts_entries_and_bare_values() {
    let (_dir, store) = store().await;
    store
        .update(
            SETTINGS_PATH,
            &json!({
                "timeseriesEnable": {"name": "Enable timeseries", "value": true},
                "sensorResolution": 2
            }),
        )
        .await
        .unwrap();

    let raw = store.fetch_settings().await.unwrap();
    assert_eq!(raw["timeseriesEnable"].name, "Enable timeseries");
    assert_eq!(raw["timeseriesEnable"].value, json!(true));
    assert_eq!(raw["sensorResolution"].name, "sensorResolution");
    assert_eq!(raw["sensorResolution"].value, json!(2));
}

#[tokio::test]
async fn update_settings_writes_name_value_entries() {
    let (_dir, store) = store().await;
    let body = json!({"pollEnable": false, "logLevel": {"name": "Log level", "value": 3}});
    store
        .update_settings(body.as_object().unwrap())
        .await
        .unwrap();

    assert_eq!(
        store.get("settings/pollEnable").await.unwrap(),
        Some(json!({"name": "pollEnable", "value": false}))
    );
    let raw = store.fetch_settings().await.unwrap();
    assert_eq!(raw["logLevel"].name, "Log level");
    assert_eq!(raw["logLevel"].value, json!(3));
}
