use footway_lookup::pbf::proto::{
    DenseNodes, HeaderBlock, PrimitiveBlock, PrimitiveGroup, StringTable, Way,
};
use footway_lookup::pbf::BlockWriter;
use footway_lookup::{run_service, DataSource, ReloadCoordinator, ServiceConfig};
use serde_json::{json, Value};
use std::fs::{self, File};
use std::net::TcpListener;
use std::num::NonZeroU32;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

const STATE: i64 = 1_578_169_263;

const MOSCOW: &str =
    r#"{"bboxes":[{"west":375990000,"south":557490000,"east":376010000,"north":557510000}]}"#;

fn write_pbf(path: &Path, ways: Vec<Way>, strings: &[&str]) {
    let header = HeaderBlock {
        required_features: vec!["OsmSchema-V0.6".into(), "DenseNodes".into()],
        ..Default::default()
    };
    let data = PrimitiveBlock {
        stringtable: StringTable {
            s: strings.iter().map(|s| s.as_bytes().to_vec()).collect(),
        },
        primitivegroup: vec![
            PrimitiveGroup {
                dense: Some(DenseNodes {
                    id: vec![1, 1, 1],
                    lat: vec![557_500_000, 10, 10],
                    lon: vec![376_000_000, 20, 20],
                    ..Default::default()
                }),
                ..Default::default()
            },
            PrimitiveGroup {
                ways,
                ..Default::default()
            },
        ],
        ..Default::default()
    };
    let mut writer = BlockWriter::new(File::create(path).expect("could not create pbf"));
    writer.write_header(&header).expect("could not write header");
    writer.write_data(&data).expect("could not write data");
    writer.flush().expect("could not flush pbf");
}

fn write_state(path: &Path, state: i64) {
    fs::write(
        path,
        format!("{}\ntimestamp=2020-01-04T20\\:21\\:03Z\n", state),
    )
    .expect("could not write state");
}

fn footway() -> Way {
    Way {
        id: 42,
        refs: vec![1, 1, 1],
        ..Default::default()
    }
}

fn fixture() -> (TempDir, Arc<ReloadCoordinator>) {
    let dir = tempfile::tempdir().expect("could not create temp dir");
    let source = DataSource {
        data_path: dir.path().join("footways.pbf"),
        state_path: dir.path().join("state.txt"),
        cell_size: NonZeroU32::new(10_000).unwrap(),
    };
    write_pbf(&source.data_path, vec![footway()], &[""]);
    write_state(&source.state_path, STATE);
    (dir, Arc::new(ReloadCoordinator::new(source)))
}

fn spawn_app(coordinator: Arc<ReloadCoordinator>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    let config = ServiceConfig {
        coordinator,
        listener,
    };
    let server = run_service(config).expect("Failed to start server");
    let _ = tokio::spawn(server);
    format!("http://127.0.0.1:{}", port)
}

async fn post_ways(base_url: &str, query: &str, body: &'static str) -> reqwest::Response {
    reqwest::Client::new()
        .post(&format!("{}/ways{}", base_url, query))
        .body(body)
        .send()
        .await
        .expect("Failed to execute request.")
}

#[actix_rt::test]
async fn ways_hit() {
    // Arrange
    let (_dir, coordinator) = fixture();
    coordinator.load_initial().expect("could not load dataset");
    let base_url = spawn_app(coordinator);

    // Act
    let response = post_ways(&base_url, "", MOSCOW).await;

    // Assert
    assert!(response.status().is_success());
    assert_eq!(
        response.headers()["access-control-allow-origin"],
        "*"
    );
    let body: Value = response.json().await.expect("failed to read body");
    assert_eq!(
        body,
        json!({
            "status": "success",
            "params": [{"west": 375_990_000, "south": 557_490_000, "east": 376_010_000, "north": 557_510_000}],
            "result": {"ways": {
                "42": {"nodes": [[55.75, 37.6], [55.750001, 37.600002], [55.750002, 37.600004]]}
            }},
            "data_timestamp": "2020-01-04T20:21:03Z"
        })
    );
}

#[actix_rt::test]
async fn ways_miss() {
    let (_dir, coordinator) = fixture();
    coordinator.load_initial().expect("could not load dataset");
    let base_url = spawn_app(coordinator);

    let response = post_ways(
        &base_url,
        "?full=true",
        r#"{"bboxes":[{"west":0,"south":0,"east":100,"north":100}]}"#,
    )
    .await;

    assert!(response.status().is_success());
    let body: Value = response.json().await.expect("failed to read body");
    assert_eq!(body["status"], "success");
    assert_eq!(body["result"]["ways"], json!({}));
}

#[actix_rt::test]
async fn malformed_request() {
    let (_dir, coordinator) = fixture();
    coordinator.load_initial().expect("could not load dataset");
    let base_url = spawn_app(coordinator);

    let response = post_ways(&base_url, "", r#"{"bboxes":"everywhere"}"#).await;

    assert_eq!(response.status().as_u16(), 400);
    assert_eq!(
        response.headers()["access-control-allow-origin"],
        "*"
    );
    let body: Value = response.json().await.expect("failed to read body");
    assert_eq!(body["status"], "error");
}

#[actix_rt::test]
async fn not_ready_before_first_load() {
    let (_dir, coordinator) = fixture();
    let base_url = spawn_app(coordinator);

    let response = post_ways(&base_url, "", MOSCOW).await;
    assert_eq!(response.status().as_u16(), 503);

    let response = reqwest::get(&format!("{}/health", &base_url))
        .await
        .expect("Failed to execute request.");
    assert!(response.status().is_success());
    let text = response.text().await.expect("failed to read body");
    assert_eq!(text, "Ok");
}

#[actix_rt::test]
async fn reload_serves_newer_data() {
    let (_dir, coordinator) = fixture();
    coordinator.load_initial().expect("could not load dataset");
    let base_url = spawn_app(coordinator.clone());

    let source = coordinator.source().clone();
    let tagged = Way {
        id: 43,
        keys: vec![1],
        vals: vec![2],
        refs: vec![3],
    };
    write_pbf(
        &source.data_path,
        vec![footway(), tagged],
        &["", "highway", "footway"],
    );
    write_state(&source.state_path, STATE + 1);
    coordinator.reload_if_newer().expect("reload failed");

    let response = post_ways(&base_url, "?full=1", MOSCOW).await;
    assert!(response.status().is_success());
    let body: Value = response.json().await.expect("failed to read body");
    let ways = &body["result"]["ways"];
    assert_eq!(ways["42"]["id"], 42);
    assert_eq!(
        ways["43"],
        json!({"id": 43, "nodes": [[55.750002, 37.600004]], "tags": {"highway": "footway"}})
    );

    let response = reqwest::get(&format!("{}/status", &base_url))
        .await
        .expect("Failed to execute request.");
    assert!(response.status().is_success());
    let status: Value = response.json().await.expect("failed to read body");
    assert_eq!(status["state"], STATE + 1);
    assert_eq!(status["ways"], 2);
}

#[actix_rt::test]
async fn metrics_count_requests() {
    let (_dir, coordinator) = fixture();
    coordinator.load_initial().expect("could not load dataset");
    let base_url = spawn_app(coordinator);
    post_ways(&base_url, "", MOSCOW).await;

    let response = reqwest::get(&format!("{}/metrics", &base_url))
        .await
        .expect("Failed to execute request.");
    assert!(response.status().is_success());
    let text = response.text().await.expect("failed to read body");
    assert!(text.contains("http_requests_total"));
    assert!(text.contains("dataset_ways"));
}

#[actix_rt::test]
async fn unknown_route_answers_json_error() {
    let (_dir, coordinator) = fixture();
    coordinator.load_initial().expect("could not load dataset");
    let base_url = spawn_app(coordinator);

    let response = reqwest::get(&format!("{}/locate?loc=8.822,53.089", &base_url))
        .await
        .expect("Failed to execute request.");

    assert_eq!(response.status().as_u16(), 404);
    let body: Value = response.json().await.expect("failed to read body");
    assert_eq!(body, json!({"status": "error", "message": "not found"}));
}

#[actix_rt::test]
async fn inverted_box_is_ignored() {
    let (_dir, coordinator) = fixture();
    coordinator.load_initial().expect("could not load dataset");
    let base_url = spawn_app(coordinator);

    let response = post_ways(
        &base_url,
        "",
        r#"{"bboxes":[{"west":376010000,"south":557490000,"east":375990000,"north":557510000},{"west":375990000,"south":557490000,"east":376010000,"north":557510000}]}"#,
    )
    .await;

    assert!(response.status().is_success());
    let body: Value = response.json().await.expect("failed to read body");
    assert_eq!(body["params"].as_array().map(Vec::len), Some(1));
    assert!(body["result"]["ways"]["42"].is_object());
}
