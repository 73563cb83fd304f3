use nightingale_rust::live::{LiveSampler, LiveUpdate, PollingPolicy};
use nightingale_rust::model::{RangeMode, SensorSource};
use nightingale_rust::settings::{ApiSettings, CommunitySettings, LiveSettings};
use nightingale_rust::source::{CommunityClient, HttpSource, NoiseSource};
use nightingale_rust::NoiseError;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Helper: serve canned JSON bodies keyed by request path. Returns the base URL.
async fn serve(routes: Vec<(&str, u16, &str)>) -> String {
    let routes: HashMap<String, (u16, String)> = routes
        .into_iter()
        .map(|(path, status, body)| (path.to_string(), (status, body.to_string())))
        .collect();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                break;
            };
            let routes = routes.clone();
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let mut chunk = [0u8; 1024];
                while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                    match stream.read(&mut chunk).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => buf.extend_from_slice(&chunk[..n]),
                    }
                }
                let request = String::from_utf8_lossy(&buf);
                let path = request.split_whitespace().nth(1).unwrap_or("/").to_string();
                let (status, body) = routes
                    .get(&path)
                    .cloned()
                    .unwrap_or((404, r#"{"error":"not found"}"#.to_string()));
                let response = format!(
                    "HTTP/1.1 {} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            });
        }
    });

    format!("http://{}/api", addr)
}

fn api(base_url: &str) -> ApiSettings {
    ApiSettings {
        base_url: base_url.to_string(),
        timeout_secs: 5,
        ..ApiSettings::default()
    }
}

fn community(base_url: &str) -> CommunityClient {
    let settings = CommunitySettings {
        feed_url: format!("{}/feed.json", base_url),
        sensor_url: format!("{}/sensor/", base_url),
    };
    CommunityClient::new(&api(base_url), &settings).unwrap()
}

/// Helper: one sensor.community record. `lat` of `None` serializes as null.
fn community_record(sensor: u32, timestamp: &str, lat: Option<f64>, values: &[(&str, &str)]) -> String {
    let values: Vec<String> = values
        .iter()
        .map(|(kind, value)| format!(r#"{{"value_type":"{}","value":"{}"}}"#, kind, value))
        .collect();
    format!(
        r#"{{"timestamp":"{}","sensor":{{"id":{}}},"location":{{"country":"DE","latitude":{},"longitude":"13.405","altitude":"34.0","indoor":0}},"sensordatavalues":[{}]}}"#,
        timestamp,
        sensor,
        lat.map(|v| format!("\"{}\"", v)).unwrap_or_else(|| "null".to_string()),
        values.join(",")
    )
}

const HISTORY: &str = r#"{
    "locationResponse": {"country": "FR", "latitude": 48.8566, "longitude": 2.3522, "altitude": 35.0, "indoor": false},
    "noiseResponses": [
        {"timestamp": "2024-01-15T10:30:05", "noise_LAeq": 50.0, "noise_LAmax": 60.0, "noise_LAmin": 40.0},
        {"timestamp": "2024-01-15T10:30:45", "noise_LAeq": 70.0, "noise_LAmax": 80.0, "noise_LAmin": 60.0},
        {"timestamp": "2024-01-15T09:00:00", "noise_LAeq": 45.0, "noise_LAmax": 55.0, "noise_LAmin": 35.0}
    ],
    "source": "nightingale"
}"#;

#[tokio::test]
async fn test_fetch_recent_tolerates_device_field_names() {
    let base = serve(vec![(
        "/api/recentdata/42",
        200,
        r#"{"timestamp":"2024-01-15 10:30:00","noise_LAeq":"51.5","noise_LA_max":"63.2","noise_LA_min":"40.1"}"#,
    )])
    .await;
    let source = HttpSource::new(&api(&base)).unwrap();

    let reading = source.fetch_recent("42").await.unwrap();
    assert_eq!(reading.timestamp, "2024-01-15 10:30:00");
    assert_eq!(reading.noise_equivalent, 51.5);
    assert_eq!(reading.noise_max, 63.2);
    assert_eq!(reading.noise_min, 40.1);
}

#[tokio::test]
async fn test_fetch_historical_uses_range_path() {
    let base = serve(vec![("/api/day/42", 200, HISTORY)]).await;
    let source = HttpSource::new(&api(&base)).unwrap();

    let batch = source.fetch_historical("42", RangeMode::Day).await.unwrap();
    assert_eq!(batch.readings.len(), 3);
    let location = batch.location.unwrap();
    assert_eq!(location.source, Some(SensorSource::Nightingale));
    assert_eq!(location.country_code, "FR");

    let err = source.fetch_historical("42", RangeMode::Week).await.unwrap_err();
    assert!(matches!(err, NoiseError::FetchFailure(ref msg) if msg.contains("404")));
}

#[tokio::test]
async fn test_fetch_all_sensors() {
    let base = serve(vec![(
        "/api/allsensors",
        200,
        r#"[{"id":1,"latitude":48.85,"longitude":2.35,"country":"FR"},{"id":"2","latitude":null,"longitude":null}]"#,
    )])
    .await;
    let source = HttpSource::new(&api(&base)).unwrap();

    let sensors = source.fetch_all_sensors().await.unwrap();
    assert_eq!(sensors.len(), 2);
    assert_eq!(sensors[0].id, "1");
    assert_eq!(sensors[1].latitude, None);
}

#[tokio::test]
async fn test_non_success_status_is_fetch_failure() {
    let base = serve(vec![("/api/recentdata/42", 503, r#"{"error":"busy"}"#)]).await;
    let source = HttpSource::new(&api(&base)).unwrap();

    let err = source.fetch_recent("42").await.unwrap_err();
    assert!(matches!(err, NoiseError::FetchFailure(ref msg) if msg.contains("503")));
}

#[tokio::test]
async fn test_unreachable_backend_is_fetch_failure() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let source = HttpSource::new(&api(&format!("http://{}/api", addr))).unwrap();
    assert!(matches!(source.fetch_recent("42").await, Err(NoiseError::FetchFailure(_))));
}

#[tokio::test]
async fn test_live_sampler_over_http() {
    let base = serve(vec![(
        "/api/recentdata/42",
        200,
        r#"{"timestamp":"2024-01-15T10:30:00","noise_LAeq":58.0,"noise_LAmax":66.0,"noise_LAmin":49.0}"#,
    )])
    .await;
    let source: Arc<dyn NoiseSource> = Arc::new(HttpSource::new(&api(&base)).unwrap());
    let sampler = LiveSampler::new(source, &LiveSettings::default());
    let mut sub = sampler.start(
        "42",
        PollingPolicy::Decoupled { interval: Duration::from_secs(1), spacing: Duration::from_secs(5) },
    );

    let update = tokio::time::timeout(Duration::from_secs(5), sub.next()).await.unwrap();
    match update {
        Some(LiveUpdate::Latest { seq, reading }) => {
            assert_eq!(seq, 1);
            assert_eq!(reading.noise_equivalent, 58.0);
        }
        other => panic!("expected latest reading, got {:?}", other),
    }
    sub.stop().await;
    assert_eq!(sub.latest().map(|r| r.noise_max), Some(66.0));
}

// ============================================================================
// sensor.community client
// ============================================================================

#[tokio::test]
async fn test_community_recent_picks_newest_record() {
    let body = format!(
        "[{},{},{},{}]",
        community_record(7421, "2024-01-15 10:30:00", Some(52.52), &[("noise_LAeq", "50.0")]),
        community_record(7421, "2024-01-15 10:35:00", Some(52.52), &[("noise_LAeq", "63.5"), ("noise_LA_max", "71.0")]),
        community_record(7421, "2024-01-15 10:40:00", Some(52.52), &[("P1", "12.0")]),
        community_record(7421, "2024-01-15 10:32:00", Some(52.52), &[("noise_LAeq", "55.0")]),
    );
    let base = serve(vec![("/api/sensor/7421/", 200, body.as_str())]).await;
    let source = community(&base);

    let reading = source.fetch_recent("7421").await.unwrap();
    assert_eq!(reading.timestamp, "2024-01-15 10:35:00");
    assert_eq!(reading.noise_equivalent, 63.5);
    assert_eq!(reading.noise_max, 71.0);
    assert_eq!(reading.noise_min, 63.5);
}

#[tokio::test]
async fn test_community_recent_without_noise_readings_fails() {
    let body = format!("[{}]", community_record(900, "2024-01-15 10:30:00", Some(48.85), &[("P1", "12.0")]));
    let base = serve(vec![
        ("/api/sensor/900/", 200, body.as_str()),
        ("/api/sensor/901/", 200, "[]"),
    ])
    .await;
    let source = community(&base);

    for id in ["900", "901"] {
        let err = source.fetch_recent(id).await.unwrap_err();
        assert!(matches!(err, NoiseError::FetchFailure(ref msg) if msg.contains("no noise readings")), "{:?}", err);
    }
}

#[tokio::test]
async fn test_community_historical_filters_range_and_finds_location() {
    let today = chrono::Utc::now().date_naive();
    let stamp = |time: &str| format!("{} {}", today.format("%Y-%m-%d"), time);
    let body = format!(
        "[{},{},{}]",
        community_record(7421, &stamp("08:00:00"), None, &[("noise_LAeq", "44.0")]),
        community_record(7421, "2000-01-01 08:00:00", Some(52.52), &[("noise_LAeq", "99.0")]),
        community_record(7421, &stamp("09:00:00"), Some(52.52), &[("noise_LAeq", "47.0")]),
    );
    let base = serve(vec![("/api/sensor/7421/", 200, body.as_str())]).await;
    let source = community(&base);

    let batch = source.fetch_historical("7421", RangeMode::Day).await.unwrap();
    let levels: Vec<f64> = batch.readings.iter().map(|r| r.noise_equivalent).collect();
    assert_eq!(levels, vec![44.0, 47.0]);

    // The first record has no coordinates, so the location comes from a later one.
    let location = batch.location.unwrap();
    assert_eq!(location.latitude, 52.52);
    assert_eq!(location.source, Some(SensorSource::SensorCommunity));

    let batch = source.fetch_historical("7421", RangeMode::AllTime).await.unwrap();
    assert_eq!(batch.readings.len(), 3);
}

#[tokio::test]
async fn test_community_all_sensors_deduplicated_by_id() {
    let body = format!(
        "[{},{},{},{}]",
        community_record(7421, "2024-01-15 10:30:00", Some(52.52), &[("noise_LAeq", "50.0")]),
        community_record(900, "2024-01-15 10:30:00", Some(48.85), &[("P1", "12.0")]),
        community_record(7422, "2024-01-15 10:30:00", Some(52.37), &[("noise_LAeq", "47.5")]),
        community_record(7421, "2024-01-15 10:35:00", Some(52.52), &[("noise_LAeq", "51.0")]),
    );
    let base = serve(vec![("/api/feed.json", 200, body.as_str())]).await;
    let source = community(&base);

    let sensors = source.fetch_all_sensors().await.unwrap();
    let ids: Vec<&str> = sensors.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, vec!["7421", "7422"]);
    assert_eq!(sensors[0].source, Some(SensorSource::SensorCommunity));
    assert_eq!(sensors[0].country.as_deref(), Some("DE"));
}

#[tokio::test]
async fn test_community_non_success_status_is_fetch_failure() {
    let base = serve(vec![("/api/feed.json", 502, "{}")]).await;
    let source = community(&base);

    let err = source.fetch_all_sensors().await.unwrap_err();
    assert!(matches!(err, NoiseError::FetchFailure(ref msg) if msg.contains("502")));
}
