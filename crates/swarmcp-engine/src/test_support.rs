#![allow(clippy::expect_used)]

use std::collections::BTreeMap;
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::thread;

use swarmcp_secrets::{SecretResolver, SecretStoreError};

pub fn write(root: &Path, relative: &str, contents: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().expect("manifest has parent")).expect("create dirs");
    fs::write(path, contents).expect("write fixture");
}

/// Serves fixed secret values and records every path asked for.
#[derive(Default)]
pub struct FakeResolver {
    values: BTreeMap<String, Vec<u8>>,
    pub lookups: Mutex<Vec<String>>,
}

impl FakeResolver {
    pub fn with(mut self, path: &str, value: &str) -> Self {
        self.values.insert(path.to_string(), value.as_bytes().to_vec());
        self
    }

    pub fn lookups(&self) -> Vec<String> {
        self.lookups.lock().expect("lookups lock").clone()
    }
}

impl SecretResolver for FakeResolver {
    fn resolve_secret(&self, path: &str) -> Result<Vec<u8>, SecretStoreError> {
        self.lookups.lock().expect("lookups lock").push(path.to_string());
        self.values
            .get(path)
            .cloned()
            .ok_or_else(|| SecretStoreError::NoData {
                path: path.to_string(),
            })
    }
}

/// Shared stack `core` with service `api`: one templateless config and one
/// secret read from the store.
pub fn minimal_project(root: &Path) {
    write(
        root,
        "project.yaml",
        r"apiVersion: swarmcp/v1
kind: Project
metadata:
  name: demo
spec:
  stacks:
    - name: core
      type: shared
      path: stacks/core
",
    );
    write(
        root,
        "stacks/core/stack.yaml",
        r"kind: Stack
metadata:
  name: core
spec:
  services:
    - name: api
      path: api
",
    );
    write(
        root,
        "stacks/core/api/service.yaml",
        r#"kind: Service
metadata:
  name: api
spec:
  image:
    repo: ghcr.io/demo/api
    tag: "1.0.0"
  deploy:
    replicas: 1
  configs:
    - name: app
  secrets:
    - name: db
      fromVault: "kv/db#password"
"#,
    );
}

/// Loopback secret-store server answering AppRole login and token calls; every
/// other path gets `kv_status`. Records `METHOD /path` per request.
pub struct StoreStub {
    pub addr: String,
    requests: Arc<Mutex<Vec<String>>>,
}

impl StoreStub {
    pub fn start(kv_status: u16, kv_body: &'static str) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind loopback");
        let addr = format!("http://{}", listener.local_addr().expect("local addr"));
        let requests = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&requests);
        thread::spawn(move || {
            for stream in listener.incoming().map_while(Result::ok) {
                let Some(path) = request_path(&stream) else {
                    continue;
                };
                let (status, body) = match path.split_whitespace().nth(1).unwrap_or_default() {
                    "/v1/sys/wrapping/unwrap" => (200, r#"{"data":{"secret_id":"sid"}}"#),
                    "/v1/auth/approle/login" => (
                        200,
                        r#"{"auth":{"client_token":"minted","renewable":false,"lease_duration":0}}"#,
                    ),
                    "/v1/auth/token/revoke-self" => (200, "{}"),
                    _ => (kv_status, kv_body),
                };
                recorded.lock().expect("requests lock").push(path);
                let mut stream = stream;
                let _ = write!(
                    stream,
                    "HTTP/1.1 {status} STUB\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = stream.flush();
            }
        });
        Self { addr, requests }
    }

    pub fn count(&self, request: &str) -> usize {
        self.requests
            .lock()
            .expect("requests lock")
            .iter()
            .filter(|seen| seen.as_str() == request)
            .count()
    }
}

/// Request line without the HTTP version; drains headers and any body.
fn request_path(stream: &TcpStream) -> Option<String> {
    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    reader.read_line(&mut line).ok()?;
    let mut length = 0;
    loop {
        let mut header = String::new();
        reader.read_line(&mut header).ok()?;
        let header = header.trim_end();
        if header.is_empty() {
            break;
        }
        if let Some((name, value)) = header.split_once(':') {
            if name.trim().eq_ignore_ascii_case("content-length") {
                length = value.trim().parse().unwrap_or(0);
            }
        }
    }
    let mut body = vec![0; length];
    std::io::Read::read_exact(&mut reader, &mut body).ok()?;
    let mut parts = line.split_whitespace();
    Some(format!("{} {}", parts.next()?, parts.next()?))
}

/// `minimal_project` pointed at `addr` with AppRole credential files.
pub fn approle_project(root: &Path, addr: &str) {
    minimal_project(root);
    write(
        root,
        "project.yaml",
        &format!(
            "kind: Project
metadata:
  name: demo
spec:
  secretsProvider:
    backend: bao
    addr: {addr}
    roleIdPath: role-id
    wrappedSecretIdPath: wrapped-secret-id
  stacks:
    - name: core
      type: shared
      path: stacks/core
"
        ),
    );
    write(root, "role-id", "role-123\n");
    write(root, "wrapped-secret-id", "wrap-456\n");
}
