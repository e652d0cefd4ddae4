use std::fs;
use std::io::{Read, Write};
use std::net::{Shutdown, TcpListener};
use std::sync::Once;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use notice_core::{Notice, NoticeBatch, PayloadShape, IST};
use notice_engine::{
    Dispatcher, NullProgressSink, PushSink, RecordingProgressSink, RunEvent, SinkConfig, SinkError,
    SnapshotWriter, Stage,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(relay_logging::initialize_for_tests);
}

fn notice(id: &str, kind: &str) -> Notice {
    Notice {
        id: id.to_string(),
        notice_type: kind.to_string(),
        category: "Coding".to_string(),
        company: "Acme".to_string(),
        notice_text: "Apply now".to_string(),
        notice_by: "HR".to_string(),
        notice_time: "2024-01-01".to_string(),
    }
}

fn batch() -> NoticeBatch {
    let at = Utc.with_ymd_and_hms(2024, 1, 1, 4, 30, 0).unwrap().with_timezone(&IST);
    NoticeBatch::relevant(
        at,
        &[
            notice("1", "PLACEMENT"),
            notice("2", "OTHER"),
            notice("3", "INTERNSHIP"),
        ],
    )
}

fn sink(name: &str, base_url: String, key: &str, shape: PayloadShape) -> PushSink {
    PushSink::with_timeout(
        SinkConfig {
            name: name.to_string(),
            base_url,
            api_key: key.to_string(),
            shape,
        },
        Duration::from_secs(5),
    )
    .unwrap()
}

fn dispatcher(server: &MockServer, snapshot: std::path::PathBuf) -> Dispatcher {
    Dispatcher::new(
        vec![
            sink("noticeboard", format!("{}/full", server.uri()), "full-key", PayloadShape::Full),
            sink("headsup", format!("{}/min", server.uri()), "min-key", PayloadShape::Minimal),
        ],
        SnapshotWriter::new(snapshot),
    )
}

#[tokio::test]
async fn failing_sink_does_not_block_the_others() {
    init_logging();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/full/api/notices"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/min/api/notices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true, "new_notices": 2})))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let snapshot = dir.path().join("notices.json");
    let progress = RecordingProgressSink::new();
    let report = dispatcher(&server, snapshot.clone())
        .dispatch(&batch(), &progress, &CancellationToken::new())
        .await;

    assert_eq!(report.attempted(), 2);
    assert_eq!(report.succeeded(), 1);
    assert!(!report.all_pushes_failed());
    assert!(!report.interrupted);
    match &report.pushes[0].outcome {
        Err(SinkError::Status { status, body }) => {
            assert_eq!(*status, 500);
            assert_eq!(body, "boom");
        }
        other => panic!("unexpected outcome {other:?}"),
    }
    let receipt = report.pushes[1].outcome.as_ref().unwrap();
    assert_eq!(receipt.new_notices, Some(2));
    assert_eq!(receipt.body_error, None);

    assert!(report.snapshot_written());
    let saved: NoticeBatch = serde_json::from_str(&fs::read_to_string(&snapshot).unwrap()).unwrap();
    assert_eq!(saved, batch());

    assert_eq!(
        progress.events(),
        vec![
            RunEvent::StageStarted(Stage::Pushing),
            RunEvent::SinkFinished { sink: "noticeboard".to_string(), ok: false },
            RunEvent::SinkFinished { sink: "headsup".to_string(), ok: true },
            RunEvent::StageStarted(Stage::Snapshotting),
            RunEvent::SinkFinished { sink: "snapshot".to_string(), ok: true },
        ]
    );
}

#[tokio::test]
async fn each_sink_gets_its_own_key_and_shape() {
    init_logging();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/full/api/notices"))
        .and(header("x-api-key", "full-key"))
        .and(header("content-type", "application/json; charset=utf-8"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/min/api/notices"))
        .and(header("x-api-key", "min-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let report = dispatcher(&server, dir.path().join("notices.json"))
        .dispatch(&batch(), &NullProgressSink, &CancellationToken::new())
        .await;
    assert_eq!(report.succeeded(), 2);
    assert_eq!(report.pushes[0].outcome.as_ref().unwrap().new_notices, None);

    let requests = server.received_requests().await.unwrap();
    let body_for = |p: &str| -> Value {
        let request = requests.iter().find(|r| r.url.path() == p).unwrap();
        serde_json::from_slice(&request.body).unwrap()
    };

    let full = body_for("/full/api/notices");
    assert_eq!(full["total_notices"], 2);
    assert_eq!(full["notices"][0]["notice_text"], "Apply now");
    assert_eq!(full["notices"][0]["notice_by"], "HR");

    let minimal = body_for("/min/api/notices");
    assert_eq!(minimal["total_notices"], 2);
    assert_eq!(minimal["scraped_at"], full["scraped_at"]);
    assert_eq!(
        minimal["notices"][1],
        json!({
            "id": "3",
            "type": "INTERNSHIP",
            "category": "Coding",
            "company": "Acme",
            "notice_time": "2024-01-01",
        })
    );
}

#[tokio::test]
async fn unreachable_sink_is_isolated() {
    init_logging();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/min/api/notices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"new_notices": 0})))
        .expect(1)
        .mount(&server)
        .await;

    // Bind then drop a listener to get a port nothing listens on.
    let closed = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let dir = TempDir::new().unwrap();
    let dispatcher = Dispatcher::new(
        vec![
            sink("noticeboard", format!("http://127.0.0.1:{closed}"), "k", PayloadShape::Full),
            sink("headsup", format!("{}/min", server.uri()), "k", PayloadShape::Minimal),
        ],
        SnapshotWriter::new(dir.path().join("notices.json")),
    );

    let report = dispatcher
        .dispatch(&batch(), &NullProgressSink, &CancellationToken::new())
        .await;
    assert!(matches!(report.pushes[0].outcome, Err(SinkError::Http(_))));
    assert_eq!(report.pushes[1].outcome.as_ref().unwrap().new_notices, Some(0));
}

#[tokio::test]
async fn snapshot_failure_does_not_undo_pushes() {
    init_logging();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(2)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let not_a_dir = dir.path().join("file");
    fs::write(&not_a_dir, "x").unwrap();

    let report = dispatcher(&server, not_a_dir.join("notices.json"))
        .dispatch(&batch(), &NullProgressSink, &CancellationToken::new())
        .await;
    assert_eq!(report.succeeded(), 2);
    assert!(matches!(report.snapshot, Some(Err(_))));
}

#[tokio::test]
async fn all_failing_sinks_are_reported_and_snapshot_still_written() {
    init_logging();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"error": "unauthorized"})))
        .expect(2)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let report = dispatcher(&server, dir.path().join("notices.json"))
        .dispatch(&batch(), &NullProgressSink, &CancellationToken::new())
        .await;
    assert!(report.all_pushes_failed());
    assert!(report.snapshot_written());
}

#[tokio::test]
async fn cancelled_dispatch_sends_nothing() {
    init_logging();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let snapshot = dir.path().join("notices.json");
    let cancel = CancellationToken::new();
    cancel.cancel();
    let report = dispatcher(&server, snapshot.clone())
        .dispatch(&batch(), &NullProgressSink, &cancel)
        .await;
    assert!(report.interrupted);
    assert_eq!(report.attempted(), 0);
    assert!(report.snapshot.is_none());
    assert!(!snapshot.exists());
}

/// Accepts one request, answers 200 with a body shorter than its declared
/// length, then closes the connection.
fn serve_truncated_body() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    std::thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut request = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let read = stream.read(&mut chunk).unwrap();
            if read == 0 {
                break;
            }
            request.extend_from_slice(&chunk[..read]);
            let text = String::from_utf8_lossy(&request).to_string();
            let Some(head_end) = text.find("\r\n\r\n") else {
                continue;
            };
            let length = text[..head_end]
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse::<usize>().ok())?
                })
                .unwrap_or(0);
            if request.len() >= head_end + 4 + length {
                break;
            }
        }
        stream
            .write_all(
                b"HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 64\r\n\r\n{\"new_no",
            )
            .unwrap();
        stream.flush().unwrap();
        let _ = stream.shutdown(Shutdown::Both);
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn unreadable_success_body_is_recorded_on_the_receipt() {
    init_logging();
    let base_url = serve_truncated_body();
    let receipt = sink("noticeboard", base_url, "full-key", PayloadShape::Full)
        .push(&batch())
        .await
        .unwrap();

    assert_eq!(receipt.status, 200);
    assert_eq!(receipt.body, None);
    assert_eq!(receipt.new_notices, None);
    assert!(receipt.body_error.is_some());
}
