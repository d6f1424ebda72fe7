//! End-to-end pipeline tests: acquisition from a live HTTP server,
//! multi-node coordination over localhost TCP, parallel filtering, and the
//! rank-ordered merge. One tokio task per rank, exactly as the nodes run
//! as separate processes.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use fpipe_coord::GroupConfig;
use fpipe_media::{codec_for_path, segment_path, FramePull, RawVideoCodec, VideoCodec};
use fpipe_models::{JobDescriptor, ObjectRef, VideoMetadata};
use fpipe_storage::{split_ranges, HttpStore, HttpStoreConfig};
use fpipe_worker::{JobOrchestrator, WorkerConfig};

const OBJECT_PATH: &str = "/uploads/videos/clip.rawv";

fn test_metadata(frames: u64) -> VideoMetadata {
    VideoMetadata {
        total_frames: frames,
        width: 8,
        height: 4,
        fps: 25.0,
        codec_tag: "rawv".to_string(),
    }
}

/// Frame `i` is filled with the byte `frame_value(i)`.
fn frame_value(index: u64) -> u8 {
    (index % 200) as u8
}

/// Author a raw-container artifact and return its bytes.
async fn artifact_bytes(frames: u64) -> Vec<u8> {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("source.rawv");
    let meta = test_metadata(frames);

    let codec = RawVideoCodec;
    let mut sink = codec.create_sink(&path, &meta).await.unwrap();
    for i in 0..frames {
        sink.write_frame(&vec![frame_value(i); meta.frame_size()])
            .await
            .unwrap();
    }
    sink.finish().await.unwrap();

    tokio::fs::read(&path).await.unwrap()
}

/// Serve the artifact over HTTP: HEAD size, the one-byte size probe, and
/// one mock per download range.
async fn serve_artifact(server: &MockServer, payload: &[u8], parts: usize) {
    Mock::given(method("HEAD"))
        .and(path(OBJECT_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-length", payload.len().to_string().as_str()),
        )
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path(OBJECT_PATH))
        .and(header("range", "bytes=0-0"))
        .respond_with(
            ResponseTemplate::new(206)
                .insert_header(
                    "content-range",
                    format!("bytes 0-0/{}", payload.len()).as_str(),
                )
                .set_body_bytes(vec![payload[0]]),
        )
        .mount(server)
        .await;

    for range in split_ranges(payload.len() as u64, parts) {
        if range.start == 0 && range.end == 0 {
            continue; // covered by the probe mock
        }
        let body = payload[range.start as usize..=range.end as usize].to_vec();
        Mock::given(method("GET"))
            .and(path(OBJECT_PATH))
            .and(header("range", range.header_value().as_str()))
            .respond_with(ResponseTemplate::new(206).set_body_bytes(body))
            .mount(server)
            .await;
    }
}

fn free_addr() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr.to_string()
}

fn worker_config(work_dir: &Path) -> WorkerConfig {
    WorkerConfig {
        work_dir: work_dir.to_string_lossy().into_owned(),
        download_parts: 4,
        download_retries: 2,
        rendezvous_timeout: Duration::from_secs(10),
        connect_retry_interval: Duration::from_millis(20),
    }
}

fn job() -> JobDescriptor {
    JobDescriptor::new("job-e2e", ObjectRef::new("uploads", "videos/clip.rawv"), "invert")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn three_node_invert_job_runs_end_to_end() {
    let server = MockServer::start().await;
    let payload = artifact_bytes(300).await;
    serve_artifact(&server, &payload, 4).await;

    let work_dir = tempfile::tempdir().unwrap();
    let addr = free_addr();

    let mut handles = Vec::new();
    for rank in 0..3 {
        let server_uri = server.uri();
        let work_dir = work_dir.path().to_path_buf();
        let addr = addr.clone();

        handles.push(tokio::spawn(async move {
            let config = worker_config(&work_dir);
            let store = Arc::new(
                HttpStore::new(HttpStoreConfig {
                    base_url: server_uri,
                    request_timeout: Duration::from_secs(5),
                })
                .unwrap(),
            );

            let mut group = GroupConfig::new(rank, 3, addr);
            group.rendezvous_timeout = config.rendezvous_timeout;
            group.connect_retry_interval = config.connect_retry_interval;

            JobOrchestrator::new(config, store)
                .run_job(&job(), group)
                .await
        }));
    }

    let mut reports = Vec::new();
    for handle in handles {
        reports.push(handle.await.unwrap().expect("every node must succeed"));
    }
    reports.sort_by_key(|r| r.rank);

    // Three nodes, 100 frames each, no warnings.
    for (rank, report) in reports.iter().enumerate() {
        assert_eq!(report.rank, rank);
        assert!(report.success);
        assert_eq!(report.frames_written, 100);
        assert_eq!(report.frames_skipped, 0);
    }
    assert!(reports[1].output_path.is_none());
    assert!(reports[2].output_path.is_none());

    // The merged artifact is at the distinct processed path the
    // coordinator reported.
    let output = reports[0].output_path.clone().expect("coordinator output");
    assert_eq!(
        output,
        work_dir.path().join("video_job-e2e_processed.rawv")
    );

    let codec = codec_for_path(&output);
    let merged_meta = codec.probe(&output).await.unwrap();
    assert_eq!(merged_meta.total_frames, 300);

    // Every frame is the inverted original, in order.
    let mut source = codec
        .open_source(&output, &test_metadata(300), 0)
        .await
        .unwrap();
    for i in 0..300u64 {
        match source.next_frame().await.unwrap() {
            FramePull::Frame(frame) => {
                let expected = 255 - frame_value(i);
                assert!(
                    frame.iter().all(|&b| b == expected),
                    "frame {i} should be inverted"
                );
            }
            other => panic!("expected frame {i}, got {other:?}"),
        }
    }

    // Intermediate segments are gone; the source artifact is untouched.
    for rank in 0..3 {
        assert!(!segment_path(work_dir.path(), "job-e2e", rank, "rawv").exists());
    }
    assert!(work_dir.path().join("video_job-e2e.rawv").exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn single_node_job_runs_without_sockets() {
    let server = MockServer::start().await;
    let payload = artifact_bytes(30).await;
    serve_artifact(&server, &payload, 4).await;

    let work_dir = tempfile::tempdir().unwrap();
    let config = worker_config(work_dir.path());
    let store = Arc::new(
        HttpStore::new(HttpStoreConfig {
            base_url: server.uri(),
            request_timeout: Duration::from_secs(5),
        })
        .unwrap(),
    );

    let mut group = GroupConfig::single_node();
    group.rendezvous_timeout = config.rendezvous_timeout;

    let report = JobOrchestrator::new(config, store)
        .run_job(&job(), group)
        .await
        .expect("single-node job must succeed");

    assert_eq!(report.frames_written, 30);
    assert_eq!(report.frames_skipped, 0);
    let output = report.output_path.expect("coordinator output");
    assert!(output.exists());

    let merged = RawVideoCodec.probe(&output).await.unwrap();
    assert_eq!(merged.total_frames, 30);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn unknown_transform_runs_as_a_no_op() {
    let server = MockServer::start().await;
    let payload = artifact_bytes(12).await;
    serve_artifact(&server, &payload, 4).await;

    let work_dir = tempfile::tempdir().unwrap();
    let config = worker_config(work_dir.path());
    let store = Arc::new(
        HttpStore::new(HttpStoreConfig {
            base_url: server.uri(),
            request_timeout: Duration::from_secs(5),
        })
        .unwrap(),
    );

    let descriptor = JobDescriptor::new(
        "job-e2e",
        ObjectRef::new("uploads", "videos/clip.rawv"),
        "sepia-dream",
    );

    let report = JobOrchestrator::new(config, store)
        .run_job(&descriptor, GroupConfig::single_node())
        .await
        .expect("unknown transform is a warning, not a failure");

    let output = report.output_path.expect("coordinator output");
    let mut source = RawVideoCodec
        .open_source(&output, &test_metadata(12), 0)
        .await
        .unwrap();
    match source.next_frame().await.unwrap() {
        FramePull::Frame(frame) => {
            assert!(frame.iter().all(|&b| b == frame_value(0)), "no-op keeps pixels");
        }
        other => panic!("expected frame, got {other:?}"),
    }
}
