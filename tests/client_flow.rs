// End-to-end tests of the client library against a mock service.

use std::io::Cursor;
use std::time::{Duration, Instant};

use archive_upload_client::{
    ArchiveKind, ArchivePayload, ArchiveUploader, ClientError, Credentials, Deleted, FileRecord, Identity,
    JobPoller, JobStatus, PollConfig, ProjectClient, ResourceHandle, Transport, TransportOptions,
};
use httpmock::prelude::*;
use serde_json::json;

fn transport(server: &MockServer, default_project: Option<&str>) -> Transport {
    let creds = Credentials::new(
        &server.base_url(),
        Identity::Token("test-token".into()),
        default_project.map(String::from),
    )
    .unwrap();
    Transport::new(creds, TransportOptions::default()).unwrap()
}

fn fast_polls(max_wait: Duration) -> PollConfig {
    PollConfig {
        max_wait,
        poll_interval: Duration::from_millis(200),
        max_interval: Duration::from_millis(400),
        ..PollConfig::default()
    }
}

fn tar_payload(project: Option<&str>) -> ArchivePayload {
    ArchivePayload::new(
        project.map(String::from),
        "archive.tar",
        Box::new(Cursor::new(b"tar bytes".to_vec())),
        ArchiveKind::Tar,
        Some(9),
    )
}

// ── Projects ────────────────────────────────────────────────────────

#[test]
fn test_list_projects_keeps_server_order() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/v1/users/projects");
        then.status(200).json_body(json!({
            "projects": [
                {"identifier": "B", "quota": 2048, "used_quota": 1024},
                {"identifier": "A", "quota": 100, "used_quota": 0}
            ]
        }));
    });

    let t = transport(&server, None);
    let projects = ProjectClient::new(&t).list_projects().unwrap();

    mock.assert();
    let names: Vec<&str> = projects.iter().map(|p| p.identifier.as_str()).collect();
    assert_eq!(names, vec!["B", "A"]);
    assert_eq!(projects[0].used_bytes, 1024);
    assert_eq!(projects[0].quota_bytes, 2048);
}

#[test]
fn test_list_projects_error_mapping() {
    let cases: [(u16, &str); 3] = [(401, "auth"), (503, "service"), (200, "parse")];

    for (status, expected) in cases {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/v1/users/projects");
            if status == 200 {
                then.status(200).body("<html>not json</html>");
            } else {
                then.status(status).json_body(json!({"error": "nope"}));
            }
        });

        let t = transport(&server, None);
        let err = ProjectClient::new(&t).list_projects().unwrap_err();
        let matched = match expected {
            "auth" => matches!(err, ClientError::Auth { .. }),
            "service" => matches!(err, ClientError::Service(_)),
            _ => matches!(err, ClientError::Parse(_)),
        };
        assert!(matched, "status {} gave {:?}", status, err);
    }
}

#[test]
fn test_delete_twice_is_success_then_not_found() {
    let server = MockServer::start();
    let mut present = server.mock(|when, then| {
        when.method(DELETE).path("/v1/files/proj/data/file.txt");
        then.status(204);
    });

    let t = transport(&server, Some("proj"));
    let client = ProjectClient::new(&t);
    let handle = ResourceHandle::new(None, "/data/file.txt");

    assert_eq!(client.delete_resource(&handle).unwrap(), Deleted);
    present.assert();

    present.delete();
    server.mock(|when, then| {
        when.method(DELETE).path("/v1/files/proj/data/file.txt");
        then.status(404).json_body(json!({"error": "File not found"}));
    });

    match client.delete_resource(&handle) {
        Err(ClientError::NotFound(msg)) => assert_eq!(msg, "File not found"),
        other => panic!("expected NotFound, got {:?}", other),
    }
}

#[test]
fn test_directory_delete_waits_for_task() {
    let server = MockServer::start();
    let delete = server.mock(|when, then| {
        when.method(DELETE).path("/v1/files/proj/data");
        then.status(202).json_body(json!({"polling_url": "/v1/tasks/del-1"}));
    });
    let task = server.mock(|when, then| {
        when.method(GET).path("/v1/tasks/del-1");
        then.status(200).json_body(json!({"status": "done"}));
    });

    let t = transport(&server, None);
    let client = ProjectClient::with_poll_config(&t, fast_polls(Duration::from_secs(10)));
    client
        .delete_resource(&ResourceHandle::new(Some("proj".into()), "data/"))
        .unwrap();

    delete.assert();
    task.assert_calls(1);
}

#[test]
fn test_browse_returns_listing_in_server_order() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/v1/files/proj/");
        then.status(200).body(r#"{"identifier": "root-id", "directories": ["b", "a"], "files": []}"#);
    });

    let t = transport(&server, Some("proj"));
    let listing = ProjectClient::new(&t).browse(None, "/").unwrap();

    let keys: Vec<&str> = listing.keys().map(String::as_str).collect();
    assert_eq!(keys, vec!["identifier", "directories", "files"]);
    assert_eq!(listing["identifier"], "root-id");
}

/// Storage holding `/file1` and `/directory1/file2`.
fn mock_file_tree(server: &MockServer) {
    server.mock(|when, then| {
        when.method(GET).path("/v1/files/proj").query_param("all", "true");
        then.status(200)
            .body(r#"{"/": ["file1"], "/directory1": ["file2"]}"#);
    });
    server.mock(|when, then| {
        when.method(GET).path("/v1/files/proj/");
        then.status(200)
            .json_body(json!({"directories": ["directory1"], "files": ["file1"], "identifier": "foo1"}));
    });
    server.mock(|when, then| {
        when.method(GET).path("/v1/files/proj/directory1");
        then.status(200)
            .json_body(json!({"directories": [], "files": ["file2"], "identifier": "foo2"}));
    });
    server.mock(|when, then| {
        when.method(GET).path("/v1/files/proj/file1");
        then.status(200).json_body(json!({
            "file_path": "/file1", "identifier": "foo3", "md5": "bar3",
            "timestamp": "2021-06-21T12:45:28+00:00"
        }));
    });
    server.mock(|when, then| {
        when.method(GET).path("/v1/files/proj/directory1/file2");
        then.status(200).json_body(json!({
            "file_path": "/directory1/file2", "identifier": "foo4", "md5": "bar4",
            "timestamp": "2021-06-21T12:45:28+00:00"
        }));
    });
}

fn record(parent: &str, identifier: &str, checksum: &str, path: &str) -> FileRecord {
    FileRecord {
        parent_directory_identifier: parent.into(),
        identifier: identifier.into(),
        checksum: checksum.into(),
        path: path.into(),
    }
}

#[test]
fn test_directory_files_of_root_and_subdirectory() {
    let server = MockServer::start();
    mock_file_tree(&server);

    let t = transport(&server, Some("proj"));
    let client = ProjectClient::new(&t);

    assert_eq!(
        client.directory_files(None, "/").unwrap(),
        vec![
            record("foo1", "foo3", "bar3", "/file1"),
            record("foo2", "foo4", "bar4", "/directory1/file2"),
        ]
    );
    assert_eq!(
        client.directory_files(None, "/directory1").unwrap(),
        vec![record("foo2", "foo4", "bar4", "/directory1/file2")]
    );
    assert!(client.directory_files(None, "/dir").unwrap().is_empty());
}

#[test]
fn test_directory_files_reports_missing_metadata() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/v1/files/proj").query_param("all", "true");
        then.status(200).json_body(json!({"/": ["file1"]}));
    });
    server.mock(|when, then| {
        when.method(GET).path("/v1/files/proj/file1");
        then.status(200).json_body(json!({"file_path": "/file1", "identifier": "foo3"}));
    });
    server.mock(|when, then| {
        when.method(GET).path("/v1/files/proj/");
        then.status(200).json_body(json!({"identifier": "foo1"}));
    });

    let t = transport(&server, None);
    let err = ProjectClient::new(&t)
        .directory_files(Some("proj"), "/")
        .unwrap_err();
    assert!(matches!(err, ClientError::Parse(_)), "got {:?}", err);
}

#[test]
fn test_project_scoped_operations_need_a_project() {
    let server = MockServer::start();
    let delete = server.mock(|when, then| {
        when.method(DELETE).path("/v1/files/data");
        then.status(204);
    });
    let projects = server.mock(|when, then| {
        when.method(GET).path("/v1/users/projects");
        then.status(200).json_body(json!({"projects": []}));
    });

    let t = transport(&server, None);
    let client = ProjectClient::new(&t);

    let err = client.delete_resource(&ResourceHandle::new(None, "data")).unwrap_err();
    assert!(matches!(err, ClientError::Config(_)));

    let err = client.browse(None, "/").unwrap_err();
    assert!(matches!(err, ClientError::Config(_)));

    let uploader = ArchiveUploader::new(&t, fast_polls(Duration::from_secs(1)));
    let err = uploader.upload(tar_payload(None)).unwrap_err();
    assert!(matches!(err, ClientError::Config(_)));

    delete.assert_calls(0);
    projects.assert_calls(0);
}

// ── Upload and polling ──────────────────────────────────────────────

#[test]
fn test_upload_round_trip_over_http() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/v1/users/projects");
        then.status(200)
            .json_body(json!({"projects": [{"identifier": "proj", "quota": 1000, "used_quota": 10}]}));
    });
    let post = server.mock(|when, then| {
        when.method(POST)
            .path("/v1/archives/proj")
            .header("authorization", "Bearer test-token")
            .header("content-type", "application/x-tar")
            .body("tar bytes");
        then.status(202).json_body(json!({"polling_url": "/v1/tasks/up-1"}));
    });
    let task = server.mock(|when, then| {
        when.method(GET).path("/v1/tasks/up-1");
        then.status(200).json_body(json!({"status": "done", "message": "Archive uploaded"}));
    });

    let t = transport(&server, Some("proj"));
    let job = ArchiveUploader::new(&t, fast_polls(Duration::from_secs(10)))
        .upload(tar_payload(None))
        .unwrap();

    post.assert();
    task.assert_calls(1);
    assert_eq!(job.status, JobStatus::Done);
    assert_eq!(job.job_id, "up-1");
    assert!(job.error_detail.is_none());
}

#[test]
fn test_upload_failed_job_over_http() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/v1/archives/proj");
        then.status(202).json_body(json!({"status_url": "/v1/tasks/up-2"}));
    });
    server.mock(|when, then| {
        when.method(GET).path("/v1/tasks/up-2");
        then.status(200).json_body(json!({"status": "error", "error": "bad checksum"}));
    });

    let t = transport(&server, None);
    let err = ArchiveUploader::new(&t, fast_polls(Duration::from_secs(10)))
        .with_quota_precheck(false)
        .upload(tar_payload(Some("proj")))
        .unwrap_err();

    match err {
        ClientError::JobFailed { detail, .. } => assert_eq!(detail, "bad checksum"),
        other => panic!("expected JobFailed, got {:?}", other),
    }
}

#[test]
fn test_poll_deadline_is_honoured() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/v1/tasks/slow");
        then.status(200).json_body(json!({"status": "pending"}));
    });

    let t = transport(&server, None);
    let status_url = t.resolve("/v1/tasks/slow").unwrap();
    let poller = JobPoller::new(fast_polls(Duration::from_secs(2)));

    let started = Instant::now();
    let err = poller.poll(&t, &status_url).unwrap_err();
    let elapsed = started.elapsed();

    match err {
        ClientError::Timeout { last_status, .. } => assert_eq!(last_status, "pending"),
        other => panic!("expected Timeout, got {:?}", other),
    }
    assert!(elapsed >= Duration::from_secs(2), "returned early: {:?}", elapsed);
    assert!(elapsed < Duration::from_millis(2500), "overshot deadline: {:?}", elapsed);
}

#[test]
fn test_poll_gives_up_after_repeated_server_errors() {
    let server = MockServer::start();
    let task = server.mock(|when, then| {
        when.method(GET).path("/v1/tasks/broken");
        then.status(502).body("bad gateway");
    });

    let t = transport(&server, None);
    let status_url = t.resolve("/v1/tasks/broken").unwrap();
    let poller = JobPoller::new(PollConfig {
        max_wait: Duration::from_secs(30),
        poll_interval: Duration::from_millis(10),
        max_interval: Duration::from_millis(20),
        ..PollConfig::default()
    });

    let err = poller.poll(&t, &status_url).unwrap_err();
    assert!(matches!(err, ClientError::Service(_)), "got {:?}", err);
    task.assert_calls(4);
}
