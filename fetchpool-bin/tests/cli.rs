use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use assert_cmd::cargo::cargo_bin;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

fn spawn_server(port: u16, extra_args: &[&str]) -> Child {
    Command::new(cargo_bin("fetchpool"))
        .arg("serve")
        .args(["--host", "127.0.0.1", "--port", &port.to_string()])
        .args(extra_args)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .unwrap()
}

fn wait_for_listen(port: u16) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if TcpStream::connect(("127.0.0.1", port)).is_ok() {
            return;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    panic!("server did not start listening on port {port}");
}

fn wait_for_exit(child: &mut Child) -> ExitStatus {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        if let Some(status) = child.try_wait().unwrap() {
            return status;
        }
        if Instant::now() > deadline {
            let _ = child.kill();
            panic!("server did not exit after SHUTDOWN");
        }
        std::thread::sleep(Duration::from_millis(50));
    }
}

/// Open a fresh connection, send one line, read one response line.
fn send_line(port: u16, line: &str) -> String {
    let mut stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(2)))
        .unwrap();
    stream.write_all(line.as_bytes()).unwrap();

    let mut response = Vec::new();
    let mut byte = [0_u8; 1];
    loop {
        match stream.read(&mut byte) {
            Ok(0) => break,
            Ok(_) => {
                response.push(byte[0]);
                if byte[0] == b'\n' {
                    break;
                }
            }
            Err(error) => panic!("no response from server: {error}"),
        }
    }
    String::from_utf8_lossy(&response).into_owned()
}

#[test]
fn serve_answers_ping_and_shuts_down() {
    let port = free_port();
    let mut child = spawn_server(port, &[]);
    wait_for_listen(port);

    assert_eq!(send_line(port, "PING\n"), "PONG\n");
    assert_eq!(send_line(port, "ping with args\n"), "PONG\n");
    assert_eq!(send_line(port, "FROBNICATE\n"), "ERR unknown command\n");
    assert_eq!(send_line(port, "SHUTDOWN\n"), "BYE\n");

    assert!(wait_for_exit(&mut child).success());
}

#[test]
fn serve_survives_oversized_line() {
    let port = free_port();
    let mut child = spawn_server(port, &["--max-line-bytes", "16"]);
    wait_for_listen(port);

    let long_line = format!("{}\n", "X".repeat(200));
    assert_eq!(send_line(port, &long_line), "ERR line too long\n");

    // the server keeps responding normally afterwards
    assert_eq!(send_line(port, "PING\n"), "PONG\n");
    assert_eq!(send_line(port, "SHUTDOWN\n"), "BYE\n");
    assert!(wait_for_exit(&mut child).success());
}

#[test]
fn serve_rate_limits_commands_when_enabled() {
    let port = free_port();
    let mut child = spawn_server(
        port,
        &[
            "--limiter",
            "--limiter-capacity",
            "2",
            "--limiter-refill",
            "0.01",
        ],
    );
    wait_for_listen(port);

    assert_eq!(send_line(port, "PING\n"), "PONG\n");
    assert_eq!(send_line(port, "PING\n"), "PONG\n");
    assert_eq!(send_line(port, "PING\n"), "ERR rate limited\n");

    // SHUTDOWN bypasses the limiter
    assert_eq!(send_line(port, "SHUTDOWN\n"), "BYE\n");
    assert!(wait_for_exit(&mut child).success());
}

fn write_urls_file(lines: &[&str]) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    for line in lines {
        writeln!(file, "{line}").unwrap();
    }
    file
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn fetch_reports_compact_summary() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("hello"))
        .mount(&server)
        .await;

    let urls_file = write_urls_file(&[
        "# bench targets",
        &format!("{}/a", server.uri()),
        "",
        &format!("{}/b", server.uri()),
    ]);

    let output = Command::new(cargo_bin("fetchpool"))
        .arg("fetch")
        .arg("--urls-file")
        .arg(urls_file.path())
        .args(["--max-concurrency", "4", "--timeout", "5s"])
        .output()
        .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.contains("urls=2 ok=2 failed=0"),
        "unexpected output: {stdout}"
    );
    assert!(stdout.contains("p50="), "missing summary line: {stdout}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn fetch_emits_json_summary() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;

    let output = Command::new(cargo_bin("fetchpool"))
        .arg("fetch")
        .arg(format!("{}/x", server.uri()))
        .args(["--format", "json", "--timeout", "5s"])
        .output()
        .unwrap();

    assert!(output.status.success());
    let summary: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(summary["count"], 1);
    assert!(summary["p50_ms"].as_f64().unwrap() >= 0.0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn fetch_shows_host_stats_on_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let output = Command::new(cargo_bin("fetchpool"))
        .arg("fetch")
        .arg(format!("{}/x", server.uri()))
        .arg(format!("{}/y", server.uri()))
        .args(["--host-stats", "--timeout", "5s"])
        .output()
        .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("host stats:"), "missing host stats: {stdout}");
    assert!(
        stdout.contains("requests=2 ok=2 failed=0"),
        "unexpected host stats: {stdout}"
    );
}

#[test]
fn fetch_exits_nonzero_when_every_fetch_fails() {
    // nothing listens on port 1
    let output = Command::new(cargo_bin("fetchpool"))
        .args(["fetch", "http://127.0.0.1:1/", "--timeout", "1s"])
        .output()
        .unwrap();

    assert!(!output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.contains("urls=1 ok=0 failed=1"),
        "unexpected output: {stdout}"
    );
}

#[test]
fn fetch_requires_urls() {
    assert_cmd::Command::cargo_bin("fetchpool")
        .unwrap()
        .arg("fetch")
        .assert()
        .failure()
        .stderr(predicates::str::contains("no URLs"));
}
