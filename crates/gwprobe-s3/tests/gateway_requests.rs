//! ---
//! probe_section: "03-gateway-control"
//! probe_subsection: "module"
//! probe_type: "source"
//! probe_scope: "code"
//! probe_description: "Signed S3 and admin requests against the gateway."
//! probe_version: "v0.0.0-prealpha"
//! probe_owner: "tbd"
//! ---
use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::Router;
use gwprobe_core::{ArtifactSink, DataPath, Interposer, PendingAction, TargetControl};
use gwprobe_s3::signer::EMPTY_PAYLOAD_SHA256;
use gwprobe_s3::{Credentials, S3ArtifactSink, S3Client, S3Interposer, SigV4Signer};
use parking_lot::Mutex;
use tokio::net::TcpListener;

#[derive(Debug, Clone)]
struct Captured {
    method: Method,
    path: String,
    query: Option<String>,
    headers: HeaderMap,
    body: Bytes,
}

type Log = Arc<Mutex<Vec<Captured>>>;

async fn record(
    State(log): State<Log>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let failing = uri.path().contains("fail");
    log.lock().push(Captured {
        method,
        path: uri.path().to_owned(),
        query: uri.query().map(str::to_owned),
        headers,
        body,
    });
    if failing {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    }
}

async fn gateway() -> (SocketAddr, Log) {
    let log: Log = Arc::default();
    let app = Router::new().fallback(record).with_state(log.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, log)
}

fn client(addr: SocketAddr) -> Arc<S3Client> {
    let signer = SigV4Signer::new(Credentials::new("AKIDEXAMPLE", "secret"), "us-east-1");
    Arc::new(S3Client::new(&format!("http://{addr}"), signer, true).unwrap())
}

#[tokio::test]
async fn termination_request_is_a_signed_admin_put() {
    let (addr, log) = gateway().await;
    client(addr)
        .request_termination("k8s_sigkill")
        .await
        .unwrap();

    let requests = log.lock();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.method, Method::PUT);
    assert_eq!(request.path, "/admin/bucket");
    assert_eq!(request.query.as_deref(), Some("die=1&how=k8s_sigkill"));
    assert_eq!(
        request.headers["x-amz-content-sha256"].to_str().unwrap(),
        EMPTY_PAYLOAD_SHA256
    );
    let auth = request.headers["authorization"].to_str().unwrap();
    assert!(auth.starts_with("AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/"));
    assert!(auth.contains("/us-east-1/s3/aws4_request"));
}

#[tokio::test]
async fn workload_writes_report_timing_and_errors() {
    let (addr, log) = gateway().await;
    let client = client(addr);

    let ok = client.write_object("probe", "obj", "payload").await;
    assert!(ok.error.is_none());
    assert!(ok.end_ts >= ok.start_ts);

    let failed = client.write_object("probe", "fail", "payload").await;
    assert!(failed.error.is_some());

    let requests = log.lock();
    assert_eq!(requests[0].path, "/probe/obj");
    assert_eq!(requests[0].body, Bytes::from_static(b"payload"));
}

#[tokio::test]
async fn fill_and_erase_actions_touch_each_object() {
    let (addr, log) = gateway().await;
    let interposer = S3Interposer::new(client(addr));

    interposer
        .interpose(&PendingAction::FillBucket {
            bucket: "fill".into(),
            prefix: "obj".into(),
            payload: "x".into(),
            count: 2,
            timestamped: false,
        })
        .await
        .unwrap();
    interposer
        .interpose(&PendingAction::EraseObjects {
            bucket: "fill".into(),
            prefix: "obj".into(),
            count: 2,
        })
        .await
        .unwrap();

    let calls: Vec<(Method, String)> = log
        .lock()
        .iter()
        .map(|c| (c.method.clone(), c.path.clone()))
        .collect();
    assert_eq!(
        calls,
        vec![
            (Method::PUT, "/fill".to_owned()),
            (Method::PUT, "/fill/obj_0".to_owned()),
            (Method::PUT, "/fill/obj_1".to_owned()),
            (Method::DELETE, "/fill/obj_0".to_owned()),
            (Method::DELETE, "/fill/obj_1".to_owned()),
        ]
    );
}

#[tokio::test]
async fn erase_reports_error_when_every_object_fails() {
    let (addr, _log) = gateway().await;
    let interposer = S3Interposer::new(client(addr));
    let result = interposer
        .interpose(&PendingAction::EraseObjects {
            bucket: "failing".into(),
            prefix: "obj".into(),
            count: 2,
        })
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn artifact_sink_creates_bucket_once() {
    let (addr, log) = gateway().await;
    let sink = S3ArtifactSink::new(client(addr), "results");
    sink.persist("m_stats_1.json", b"{}").await.unwrap();
    sink.persist("m_restarts_1.csv", b"a,b\n").await.unwrap();

    let paths: Vec<String> = log.lock().iter().map(|c| c.path.clone()).collect();
    assert_eq!(
        paths,
        vec!["/results", "/results/m_stats_1.json", "/results/m_restarts_1.csv"]
    );
}
