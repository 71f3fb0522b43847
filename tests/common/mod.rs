//! Common test utilities for gridcrawl integration tests

#![allow(dead_code)]

use gridcrawl::{Config, Event, GridRegion, QueryParam, StorageBackend};
use serde_json::{Value, json};
use std::path::Path;
use std::time::Duration;
use tokio::sync::broadcast;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Path the mock search endpoint is served on
pub const SEARCH_PATH: &str = "/api/search";

/// Prefix used for export file names in tests
pub const EXPORT_PREFIX: &str = "camps";

/// Config for a 2×2 grid (lat 0..1, lon 0..1, step 1) against `server`,
/// storing everything under `dir`
///
/// Retries are fast and unjittered so failure paths finish quickly.
pub fn test_config(server: &MockServer, dir: &Path, backend: StorageBackend) -> Config {
    let mut config = Config::default();
    config.region = GridRegion::new(0.0, 1.0, 0.0, 1.0, 1.0);

    config.pool.concurrency = 2;
    config.pool.inter_task_delay = Duration::ZERO;
    config.pool.max_cells_per_run = 2;

    config.retry.max_retries = 1;
    config.retry.base_delay = Duration::from_millis(10);
    config.retry.jitter_ratio = 0.0;
    config.retry.request_timeout = Duration::from_secs(2);

    config.source.base_url = format!("{}{}", server.uri(), SEARCH_PATH);
    config.source.query = vec![QueryParam::new("lat", "{lat}"), QueryParam::new("lon", "{lon}")];

    config.persistence.backend = backend;
    config.persistence.state_dir = dir.join("state");
    config.persistence.database_path = dir.join("gridcrawl.db");
    config.persistence.export_dir = dir.join("exports");
    config.persistence.export_prefix = EXPORT_PREFIX.to_string();
    config
}

/// A raw result entry located at the given coordinate
pub fn site(id: &str, lat: f64, lon: f64) -> Value {
    json!({
        "id": id,
        "name": format!("Site {id}"),
        "latitude": lat,
        "longitude": lon,
        "rating": 4.5,
    })
}

/// Matcher for the request of a single cell
pub fn cell_request(lat: &str, lon: &str) -> wiremock::MockBuilder {
    Mock::given(method("GET"))
        .and(path(SEARCH_PATH))
        .and(query_param("lat", lat))
        .and(query_param("lon", lon))
}

/// Serve `results` for the cell at `lat`/`lon`, expecting exactly `times` requests
pub async fn mount_cell(server: &MockServer, lat: &str, lon: &str, results: Vec<Value>, times: u64) {
    cell_request(lat, lon)
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "resultList": results,
            "totalCount": results.len(),
        })))
        .expect(times)
        .mount(server)
        .await;
}

/// Serve one site per cell of the 2×2 grid, each cell expected `times` times
pub async fn mount_grid(server: &MockServer, times: u64) {
    for (lat, lon) in [("0", "0"), ("0", "1"), ("1", "0"), ("1", "1")] {
        let id = format!("site-{lat}-{lon}");
        let entry = site(
            &id,
            lat.parse::<f64>().unwrap_or_default() + 0.5,
            lon.parse::<f64>().unwrap_or_default() + 0.5,
        );
        mount_cell(server, lat, lon, vec![entry], times).await;
    }
}

/// Drain every event currently buffered on `rx`
pub fn drain_events(rx: &mut broadcast::Receiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Read and parse a GeoJSON export
pub fn read_export(dir: &Path, name: &str) -> Value {
    let raw = std::fs::read(dir.join("exports").join(name))
        .unwrap_or_else(|e| panic!("export {name} missing: {e}"));
    serde_json::from_slice(&raw).unwrap_or_else(|e| panic!("export {name} is not JSON: {e}"))
}

/// Feature ids of a GeoJSON export, in file order
pub fn feature_ids(collection: &Value) -> Vec<String> {
    collection["features"]
        .as_array()
        .map(|features| {
            features
                .iter()
                .filter_map(|f| f["properties"]["id"].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}
