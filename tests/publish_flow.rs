use serde_json::json;
use std::collections::HashSet;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::{Arc, Mutex};
use std::thread;

#[derive(Default)]
struct Backend {
    published: HashSet<String>,
    publish_failures_left: usize,
    malformed_row: bool,
    calls: Vec<(String, String, String)>,
}

impl Backend {
    fn record(&self, id: &str, student: &str, name: &str) -> serde_json::Value {
        let status = if self.published.contains(id) {
            "Published"
        } else {
            "Submitted"
        };
        json!({
            "_id": id,
            "studentId": student,
            "studentName": name,
            "classId": "c1",
            "subjectId": "math",
            "examId": "mid",
            "marksObtained": 50,
            "totalMarks": 100,
            "grade": "D",
            "status": status
        })
    }

    fn respond(&mut self, method: &str, target: &str, body: &str) -> (u16, serde_json::Value) {
        self.calls
            .push((method.to_string(), target.to_string(), body.to_string()));
        let path = target.split('?').next().unwrap_or(target);
        match (method, path) {
            ("GET", "/students/class/c1") => (
                200,
                json!({ "data": [
                    { "_id": "s1", "firstName": "Ada" },
                    { "_id": "s2", "firstName": "Ben" },
                    { "_id": "s3", "firstName": "Cy" }
                ]}),
            ),
            ("GET", "/exams/teacher") => (
                200,
                json!({ "data": [
                    { "_id": "final", "name": "Final" },
                    { "_id": "mid", "name": "Midterm", "totalMarks": 100, "passingMarks": 40 }
                ]}),
            ),
            ("POST", "/exams/mid/results") => {
                (200, json!({ "success": true, "message": "Results saved" }))
            }
            ("GET", "/results") => {
                let mut rows = vec![
                    self.record("r1", "s1", "Ada"),
                    self.record("r2", "s2", "Ben"),
                    self.record("r3", "s3", "Cy"),
                ];
                if self.malformed_row {
                    rows.insert(1, json!({ "_id": "rx", "studentId": null, "status": "Submitted" }));
                }
                (200, json!({ "status": "success", "data": { "results": rows } }))
            }
            ("POST", "/results/publish") => {
                if self.publish_failures_left > 0 {
                    self.publish_failures_left -= 1;
                    return (500, json!({ "status": "error", "message": "database busy" }));
                }
                let parsed: serde_json::Value = serde_json::from_str(body).unwrap_or_default();
                for id in parsed
                    .get("resultIds")
                    .and_then(|v| v.as_array())
                    .cloned()
                    .unwrap_or_default()
                {
                    if let Some(id) = id.as_str() {
                        self.published.insert(id.to_string());
                    }
                }
                (200, json!({ "status": "success" }))
            }
            _ => (404, json!({ "message": "not found" })),
        }
    }
}

fn serve_one(stream: TcpStream, backend: &Arc<Mutex<Backend>>) {
    let mut reader = BufReader::new(stream.try_clone().expect("clone stream"));
    let mut request_line = String::new();
    if reader.read_line(&mut request_line).is_err() {
        return;
    }
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or("").to_string();
    let target = parts.next().unwrap_or("").to_string();

    let mut content_length = 0usize;
    loop {
        let mut header = String::new();
        if reader.read_line(&mut header).unwrap_or(0) == 0 {
            break;
        }
        let header = header.trim_end();
        if header.is_empty() {
            break;
        }
        if let Some((name, value)) = header.split_once(':') {
            if name.eq_ignore_ascii_case("content-length") {
                content_length = value.trim().parse().unwrap_or(0);
            }
        }
    }
    let mut body = vec![0u8; content_length];
    if reader.read_exact(&mut body).is_err() {
        return;
    }
    let body = String::from_utf8_lossy(&body).to_string();

    let (code, payload) = backend
        .lock()
        .expect("backend lock")
        .respond(&method, &target, &body);
    let text = payload.to_string();
    let reason = if code == 200 { "OK" } else { "Error" };
    let mut stream = stream;
    let _ = write!(
        stream,
        "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        code,
        reason,
        text.len(),
        text
    );
    let _ = stream.flush();
}

fn start_backend(backend: Backend) -> (String, Arc<Mutex<Backend>>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind stub backend");
    let addr = listener.local_addr().expect("local addr");
    let backend = Arc::new(Mutex::new(backend));
    let shared = Arc::clone(&backend);
    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(stream) = stream else { continue };
            let shared = Arc::clone(&shared);
            thread::spawn(move || serve_one(stream, &shared));
        }
    });
    (format!("http://{}", addr), backend)
}

fn spawn_sidecar(api_url: &str) -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_resultsd");
    let mut child = Command::new(exe)
        .arg("--api-url")
        .arg(api_url)
        .arg("--api-token")
        .arg("test-token")
        .env_remove("RESULTSD_CONFIG")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn resultsd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({ "id": id, "method": method, "params": params });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");
    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn calls_to(backend: &Arc<Mutex<Backend>>, method: &str, path: &str) -> Vec<String> {
    backend
        .lock()
        .expect("backend lock")
        .calls
        .iter()
        .filter(|(m, t, _)| m == method && t.split('?').next() == Some(path))
        .map(|(_, _, body)| body.clone())
        .collect()
}

#[test]
fn mark_entry_submission_and_publication_end_to_end() {
    let (url, backend) = start_backend(Backend::default());
    let (_child, mut stdin, mut reader) = spawn_sidecar(&url);

    // Students and exam bounds come from the backend when not supplied.
    let opened = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "drafts.open",
        json!({ "classId": "c1", "subjectId": "math", "examId": "mid" }),
    );
    assert_eq!(
        opened.pointer("/spec/totalMarks").and_then(|v| v.as_f64()),
        Some(100.0)
    );
    assert_eq!(
        opened.get("drafts").and_then(|v| v.as_array()).map(|a| a.len()),
        Some(3)
    );

    for (i, (student, marks)) in [("s1", 95), ("s2", 55), ("s3", 38)].iter().enumerate() {
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            &format!("m{i}"),
            "drafts.updateMarks",
            json!({ "studentId": student, "marks": marks }),
        );
    }
    let current = request_ok(&mut stdin, &mut reader, "2", "drafts.get", json!({}));
    assert_eq!(
        current.get("allMarksEntered").and_then(|v| v.as_bool()),
        Some(true)
    );
    assert_eq!(
        current.pointer("/summary/failCount").and_then(|v| v.as_u64()),
        Some(1)
    );

    let submitted = request_ok(&mut stdin, &mut reader, "3", "drafts.submit", json!({}));
    assert_eq!(submitted.get("submitted").and_then(|v| v.as_u64()), Some(3));
    assert_eq!(
        submitted.get("message").and_then(|v| v.as_str()),
        Some("Results saved")
    );
    let bodies = calls_to(&backend, "POST", "/exams/mid/results");
    assert_eq!(bodies.len(), 1);
    let sent: serde_json::Value = serde_json::from_str(&bodies[0]).expect("submission body");
    let grades: Vec<&str> = sent
        .get("results")
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().filter_map(|r| r.get("grade").and_then(|g| g.as_str())).collect())
        .unwrap_or_default();
    assert_eq!(grades, vec!["A+", "D", "F"]);

    // Drafts are discarded once the server accepts them.
    let gone = request(&mut stdin, &mut reader, "4", "drafts.get", json!({}));
    assert_eq!(gone.pointer("/error/code").and_then(|v| v.as_str()), Some("no_drafts"));

    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "results.list",
        json!({ "query": { "classId": "c1", "status": "Submitted" }, "pageSize": 10 }),
    );
    assert_eq!(
        listed.get("eligibleIds"),
        Some(&json!(["r1", "r2", "r3"]))
    );
    let list_calls = calls_to(&backend, "GET", "/results");
    assert_eq!(list_calls.len(), 1);

    let selected = request_ok(&mut stdin, &mut reader, "6", "selection.selectAll", json!({}));
    assert_eq!(selected.get("count").and_then(|v| v.as_u64()), Some(3));

    let _ = request_ok(&mut stdin, &mut reader, "7", "publish.request", json!({}));
    let confirmed = request_ok(&mut stdin, &mut reader, "8", "publish.confirm", json!({}));
    assert_eq!(confirmed.get("phase").and_then(|v| v.as_str()), Some("succeeded"));
    assert_eq!(confirmed.get("published").and_then(|v| v.as_u64()), Some(3));
    assert_eq!(confirmed.get("refetch").and_then(|v| v.as_bool()), Some(true));
    assert_eq!(confirmed.get("selected"), Some(&json!([])));

    let publish_bodies = calls_to(&backend, "POST", "/results/publish");
    assert_eq!(publish_bodies.len(), 1);
    let sent: serde_json::Value = serde_json::from_str(&publish_bodies[0]).expect("publish body");
    assert_eq!(sent, json!({ "resultIds": ["r1", "r2", "r3"] }));

    let refreshed = request_ok(&mut stdin, &mut reader, "9", "results.list", json!({}));
    assert_eq!(refreshed.get("eligibleIds"), Some(&json!([])));
}

#[test]
fn failed_publish_keeps_selection_and_retry_succeeds() {
    let (url, backend) = start_backend(Backend {
        publish_failures_left: 1,
        ..Backend::default()
    });
    let (_child, mut stdin, mut reader) = spawn_sidecar(&url);

    let _ = request_ok(&mut stdin, &mut reader, "1", "results.list", json!({}));
    let _ = request_ok(&mut stdin, &mut reader, "2", "selection.toggle", json!({ "id": "r2" }));
    let _ = request_ok(&mut stdin, &mut reader, "3", "publish.request", json!({}));

    let failed = request(&mut stdin, &mut reader, "4", "publish.confirm", json!({}));
    assert_eq!(
        failed.pointer("/error/code").and_then(|v| v.as_str()),
        Some("transport_error")
    );
    assert_eq!(
        failed.pointer("/error/details/phase").and_then(|v| v.as_str()),
        Some("failed")
    );
    let message = failed
        .pointer("/error/message")
        .and_then(|v| v.as_str())
        .unwrap_or_default();
    assert!(message.contains("database busy"), "{message}");

    let status = request_ok(&mut stdin, &mut reader, "5", "publish.status", json!({}));
    assert_eq!(status.get("selected"), Some(&json!(["r2"])));

    let _ = request_ok(&mut stdin, &mut reader, "6", "publish.request", json!({}));
    let retried = request_ok(&mut stdin, &mut reader, "7", "publish.confirm", json!({}));
    assert_eq!(retried.get("published").and_then(|v| v.as_u64()), Some(1));
    assert_eq!(calls_to(&backend, "POST", "/results/publish").len(), 2);

    let again = request(&mut stdin, &mut reader, "8", "publish.confirm", json!({}));
    assert_eq!(
        again.pointer("/error/code").and_then(|v| v.as_str()),
        Some("invalid_transition")
    );
    assert_eq!(calls_to(&backend, "POST", "/results/publish").len(), 2);
}

#[test]
fn refetch_drops_selections_that_are_no_longer_eligible() {
    let mut backend = Backend::default();
    backend.published.insert("r1".to_string());
    let (url, _backend) = start_backend(backend);
    let (_child, mut stdin, mut reader) = spawn_sidecar(&url);

    for (i, id) in ["r1", "r3", "r9"].iter().enumerate() {
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            &format!("t{i}"),
            "selection.toggle",
            json!({ "id": id }),
        );
    }

    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "list",
        "results.list",
        json!({ "page": 1, "pageSize": 2 }),
    );
    assert_eq!(listed.get("pageCount").and_then(|v| v.as_u64()), Some(2));
    // Page one shows r1 (already published) and r2; r3 sits on page two.
    assert_eq!(listed.get("eligibleIds"), Some(&json!(["r2"])));
    assert_eq!(
        listed.get("droppedFromSelection"),
        Some(&json!(["r1", "r3", "r9"]))
    );
    assert_eq!(listed.get("selected"), Some(&json!([])));

    let empty = request(&mut stdin, &mut reader, "pub", "publish.request", json!({}));
    assert_eq!(
        empty.pointer("/error/code").and_then(|v| v.as_str()),
        Some("empty_selection")
    );
}

#[test]
fn backend_outage_surfaces_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let url = format!("http://{}", listener.local_addr().expect("addr"));
    drop(listener);
    let (_child, mut stdin, mut reader) = spawn_sidecar(&url);

    let listed = request(&mut stdin, &mut reader, "1", "results.list", json!({}));
    assert_eq!(
        listed.pointer("/error/code").and_then(|v| v.as_str()),
        Some("transport_error")
    );
    let opened = request(
        &mut stdin,
        &mut reader,
        "2",
        "drafts.open",
        json!({ "classId": "c1", "subjectId": "math", "examId": "mid" }),
    );
    assert_eq!(
        opened.pointer("/error/code").and_then(|v| v.as_str()),
        Some("transport_error")
    );
}

#[test]
fn successful_publish_requires_refetch_before_select_all() {
    let (url, backend) = start_backend(Backend::default());
    let (_child, mut stdin, mut reader) = spawn_sidecar(&url);

    let _ = request_ok(&mut stdin, &mut reader, "1", "results.list", json!({}));
    let _ = request_ok(&mut stdin, &mut reader, "2", "selection.selectAll", json!({}));
    let _ = request_ok(&mut stdin, &mut reader, "3", "publish.request", json!({}));
    let _ = request_ok(&mut stdin, &mut reader, "4", "publish.confirm", json!({}));

    let stale = request(&mut stdin, &mut reader, "5", "selection.selectAll", json!({}));
    assert_eq!(
        stale.pointer("/error/code").and_then(|v| v.as_str()),
        Some("no_results")
    );
    let again = request(&mut stdin, &mut reader, "6", "publish.request", json!({}));
    assert_eq!(
        again.pointer("/error/code").and_then(|v| v.as_str()),
        Some("empty_selection")
    );
    assert_eq!(calls_to(&backend, "POST", "/results/publish").len(), 1);

    let refreshed = request_ok(&mut stdin, &mut reader, "7", "results.list", json!({}));
    assert_eq!(refreshed.get("eligibleIds"), Some(&json!([])));
    let none = request_ok(&mut stdin, &mut reader, "8", "selection.selectAll", json!({}));
    assert_eq!(none.get("count").and_then(|v| v.as_u64()), Some(0));
}

#[test]
fn failed_batch_switch_leaves_no_drafts_behind() {
    let (url, _backend) = start_backend(Backend::default());
    let (_child, mut stdin, mut reader) = spawn_sidecar(&url);

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "drafts.open",
        json!({ "classId": "c1", "subjectId": "math", "examId": "mid" }),
    );

    // Unknown class: the roster endpoint answers 404.
    let missing_class = request(
        &mut stdin,
        &mut reader,
        "2",
        "drafts.open",
        json!({ "classId": "c2", "subjectId": "math", "examId": "mid" }),
    );
    assert_eq!(
        missing_class.pointer("/error/code").and_then(|v| v.as_str()),
        Some("transport_error")
    );
    let gone = request(&mut stdin, &mut reader, "3", "drafts.get", json!({}));
    assert_eq!(gone.pointer("/error/code").and_then(|v| v.as_str()), Some("no_drafts"));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "drafts.open",
        json!({ "classId": "c1", "subjectId": "math", "examId": "mid" }),
    );
    // "final" exists but carries no bounds.
    let no_bounds = request(
        &mut stdin,
        &mut reader,
        "5",
        "drafts.open",
        json!({ "classId": "c1", "subjectId": "math", "examId": "final" }),
    );
    assert_eq!(
        no_bounds.pointer("/error/code").and_then(|v| v.as_str()),
        Some("invalid_exam_spec")
    );
    let submit = request(&mut stdin, &mut reader, "6", "drafts.submit", json!({}));
    assert_eq!(submit.pointer("/error/code").and_then(|v| v.as_str()), Some("no_drafts"));
}

#[test]
fn malformed_rows_are_reported_and_skipped() {
    let (url, _backend) = start_backend(Backend {
        malformed_row: true,
        ..Backend::default()
    });
    let (_child, mut stdin, mut reader) = spawn_sidecar(&url);

    let listed = request_ok(&mut stdin, &mut reader, "1", "results.list", json!({}));
    assert_eq!(listed.get("matched").and_then(|v| v.as_u64()), Some(3));
    assert_eq!(listed.get("eligibleIds"), Some(&json!(["r1", "r2", "r3"])));
    let skipped = listed
        .get("skippedRows")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();
    assert_eq!(skipped.len(), 1);
    assert_eq!(skipped[0].get("index").and_then(|v| v.as_u64()), Some(1));
    assert_eq!(skipped[0].get("id").and_then(|v| v.as_str()), Some("rx"));
}
