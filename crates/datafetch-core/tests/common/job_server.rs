//! Minimal HTTP/1.1 server emulating the job API, file hosting and an S3 bucket.
//!
//! Routes:
//! - `POST /resources/<name>`: creates job `Q<n>` (`{"state":"queued","request_id":..}`)
//! - `GET /tasks/<id>`: `running` for the first `pending_polls` polls, then
//!   `completed` with `location` = `<base>files/f`
//! - `GET /files/<name>`: the configured body
//! - `GET /short/<name>`: announces more bytes than it sends
//! - `HEAD /<bucket>/<key>`: 200 for keys under `present/`, 404 otherwise
//! - anything else: 404

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct JobServerOptions {
    pub body: Vec<u8>,
    /// Polls answered with `running` before the job completes.
    pub pending_polls: usize,
    /// Reply `failed` instead of `completed` once pending polls are used up.
    pub fail_job: bool,
    /// Reject submissions with 401 unless this basic-auth header value is sent.
    pub required_auth: Option<String>,
}

impl Default for JobServerOptions {
    fn default() -> Self {
        Self {
            body: b"hello from the job server".to_vec(),
            pending_polls: 0,
            fail_job: false,
            required_auth: None,
        }
    }
}

/// Request counters, shared with the server thread.
#[derive(Debug, Default)]
pub struct Hits {
    pub submits: AtomicUsize,
    pub polls: AtomicUsize,
    pub downloads: AtomicUsize,
    pub heads: AtomicUsize,
    pub last_submit_body: Mutex<Option<String>>,
}

impl Hits {
    pub fn submits(&self) -> usize {
        self.submits.load(Ordering::SeqCst)
    }
    pub fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }
    pub fn downloads(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }
}

pub struct JobServer {
    /// e.g. "http://127.0.0.1:12345/"
    pub base_url: String,
    pub hits: Arc<Hits>,
}

pub fn start(opts: JobServerOptions) -> JobServer {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let base_url = format!("http://127.0.0.1:{}/", port);
    let hits = Arc::new(Hits::default());
    let opts = Arc::new(opts);
    {
        let hits = Arc::clone(&hits);
        let base_url = base_url.clone();
        thread::spawn(move || {
            for stream in listener.incoming().flatten() {
                let hits = Arc::clone(&hits);
                let opts = Arc::clone(&opts);
                let base_url = base_url.clone();
                thread::spawn(move || handle(stream, &opts, &hits, &base_url));
            }
        });
    }
    JobServer { base_url, hits }
}

struct Request {
    method: String,
    path: String,
    authorization: Option<String>,
    body: Vec<u8>,
}

fn read_request(stream: &mut TcpStream) -> Option<Request> {
    let mut data = Vec::new();
    let mut buf = [0u8; 8192];
    let header_end = loop {
        let n = stream.read(&mut buf).ok()?;
        if n == 0 {
            return None;
        }
        data.extend_from_slice(&buf[..n]);
        if let Some(pos) = data.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = std::str::from_utf8(&data[..header_end]).ok()?.to_string();
    let mut lines = head.lines();
    let mut first = lines.next()?.split_whitespace();
    let method = first.next()?.to_string();
    let path = first.next()?.to_string();
    let mut content_length = 0usize;
    let mut authorization = None;
    for line in lines {
        if let Some((name, value)) = line.split_once(':') {
            let name = name.trim();
            if name.eq_ignore_ascii_case("content-length") {
                content_length = value.trim().parse().unwrap_or(0);
            } else if name.eq_ignore_ascii_case("authorization") {
                authorization = Some(value.trim().to_string());
            }
        }
    }

    let mut body = data[header_end..].to_vec();
    while body.len() < content_length {
        let n = stream.read(&mut buf).ok()?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&buf[..n]);
    }
    Some(Request {
        method,
        path,
        authorization,
        body,
    })
}

fn respond(stream: &mut TcpStream, status: &str, content_type: &str, body: &[u8]) {
    let head = format!(
        "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        status,
        content_type,
        body.len()
    );
    let _ = stream.write_all(head.as_bytes());
    let _ = stream.write_all(body);
}

fn json(stream: &mut TcpStream, status: &str, value: serde_json::Value) {
    respond(stream, status, "application/json", value.to_string().as_bytes());
}

fn handle(mut stream: TcpStream, opts: &JobServerOptions, hits: &Hits, base_url: &str) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(2)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(2)));
    let Some(req) = read_request(&mut stream) else {
        return;
    };
    let path = req.path.split('?').next().unwrap_or("").to_string();

    match (req.method.as_str(), path.as_str()) {
        ("POST", p) if p.starts_with("/resources/") => {
            if let Some(expected) = &opts.required_auth {
                if req.authorization.as_deref() != Some(expected.as_str()) {
                    json(
                        &mut stream,
                        "401 Unauthorized",
                        serde_json::json!({"message": "invalid credentials"}),
                    );
                    return;
                }
            }
            let n = hits.submits.fetch_add(1, Ordering::SeqCst) + 1;
            *hits.last_submit_body.lock().unwrap() =
                Some(String::from_utf8_lossy(&req.body).into_owned());
            json(
                &mut stream,
                "202 Accepted",
                serde_json::json!({"state": "queued", "request_id": format!("Q{}", n)}),
            );
        }
        ("GET", p) if p.starts_with("/tasks/") => {
            let id = p.trim_start_matches("/tasks/");
            let n = hits.polls.fetch_add(1, Ordering::SeqCst) + 1;
            let reply = if n <= opts.pending_polls {
                serde_json::json!({"state": "running", "request_id": id})
            } else if opts.fail_job {
                serde_json::json!({
                    "state": "failed",
                    "request_id": id,
                    "error": {"message": "request failed", "reason": "no data for 1850"}
                })
            } else {
                serde_json::json!({
                    "state": "completed",
                    "request_id": id,
                    "location": format!("{}files/f", base_url)
                })
            };
            json(&mut stream, "200 OK", reply);
        }
        ("GET", p) if p.starts_with("/files/") => {
            hits.downloads.fetch_add(1, Ordering::SeqCst);
            respond(&mut stream, "200 OK", "application/octet-stream", &opts.body);
        }
        ("GET", p) if p.starts_with("/short/") => {
            hits.downloads.fetch_add(1, Ordering::SeqCst);
            let head = format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                opts.body.len() + 100
            );
            let _ = stream.write_all(head.as_bytes());
            let _ = stream.write_all(&opts.body);
        }
        ("HEAD", p) => {
            hits.heads.fetch_add(1, Ordering::SeqCst);
            let status = if p.contains("/present/") {
                "200 OK"
            } else {
                "404 Not Found"
            };
            let head = format!(
                "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                status,
                opts.body.len()
            );
            let _ = stream.write_all(head.as_bytes());
        }
        _ => respond(&mut stream, "404 Not Found", "text/plain", b"not found"),
    }
}
