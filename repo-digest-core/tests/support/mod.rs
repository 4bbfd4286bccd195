#![allow(dead_code)]
//! Shared fixtures: an in-process HTTP stub serving archives, zip builders and a tracing
//! layer that records emitted events.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::io::{Cursor, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::field::{Field, Visit};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use repo_digest_core::download::ArchiveFetcher;

/// One canned response.
#[derive(Clone)]
pub struct Route {
    pub status: u16,
    pub body: Vec<u8>,
    pub delay: Duration,
}

impl Route {
    pub fn ok(body: Vec<u8>) -> Self {
        Self {
            status: 200,
            body,
            delay: Duration::ZERO,
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            body: b"nope".to_vec(),
            delay: Duration::ZERO,
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[derive(Default)]
pub struct ServerStats {
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub served: AtomicUsize,
    /// Request paths in the order their responses were released.
    pub completion_order: Mutex<Vec<String>>,
}

pub struct StubServer {
    pub base_url: String,
    pub stats: Arc<ServerStats>,
}

impl StubServer {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn max_in_flight(&self) -> usize {
        self.stats.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn completion_order(&self) -> Vec<String> {
        self.stats.completion_order.lock().unwrap().clone()
    }
}

/// Serve `routes` (keyed by request path) on an ephemeral localhost port. Unknown paths get 404.
pub async fn serve(routes: Vec<(&str, Route)>) -> StubServer {
    let routes: Arc<HashMap<String, Route>> = Arc::new(
        routes
            .into_iter()
            .map(|(path, route)| (path.to_string(), route))
            .collect(),
    );
    let stats = Arc::new(ServerStats::default());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server_stats = Arc::clone(&stats);
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let routes = Arc::clone(&routes);
            let stats = Arc::clone(&server_stats);
            tokio::spawn(handle(socket, routes, stats));
        }
    });

    StubServer {
        base_url: format!("http://{addr}"),
        stats,
    }
}

async fn handle(mut socket: TcpStream, routes: Arc<HashMap<String, Route>>, stats: Arc<ServerStats>) {
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => head.extend_from_slice(&buf[..n]),
        }
    }
    let path = String::from_utf8_lossy(&head)
        .split_whitespace()
        .nth(1)
        .unwrap_or("/")
        .to_string();

    let now = stats.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
    stats.max_in_flight.fetch_max(now, Ordering::SeqCst);

    let route = routes.get(&path).cloned().unwrap_or_else(|| Route::status(404));
    tokio::time::sleep(route.delay).await;

    // Released before the response goes out, so the count never outlives the client's permit.
    stats.in_flight.fetch_sub(1, Ordering::SeqCst);
    stats.served.fetch_add(1, Ordering::SeqCst);
    stats.completion_order.lock().unwrap().push(path);

    let reason = match route.status {
        200 => "OK",
        404 => "Not Found",
        _ => "Status",
    };
    let header = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: application/zip\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        route.status,
        reason,
        route.body.len()
    );
    let _ = socket.write_all(header.as_bytes()).await;
    let _ = socket.write_all(&route.body).await;
    let _ = socket.shutdown().await;
}

/// Fetcher that talks to the stub directly, bypassing any proxy settings in the environment.
pub fn local_fetcher(limit: usize) -> ArchiveFetcher {
    let client = reqwest::Client::builder().no_proxy().build().unwrap();
    ArchiveFetcher::with_client(client, limit)
}

/// Build a zip in memory. `None` content marks a directory entry.
pub fn zip_bytes(entries: &[(&str, Option<&str>)]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, content) in entries {
        match content {
            Some(content) => {
                writer
                    .start_file(*name, SimpleFileOptions::default())
                    .unwrap();
                writer.write_all(content.as_bytes()).unwrap();
            }
            None => writer
                .add_directory(*name, SimpleFileOptions::default())
                .unwrap(),
        }
    }
    writer.finish().unwrap().into_inner()
}

/// Collects every emitted event as `name=value` pairs.
#[derive(Clone, Default)]
pub struct EventCollector {
    pub events: Arc<Mutex<Vec<String>>>,
}

struct FieldWriter<'a>(&'a mut String);

impl Visit for FieldWriter<'_> {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        let _ = write!(self.0, "{}={:?} ", field.name(), value);
    }
}

impl<S> Layer<S> for EventCollector
where
    S: tracing::Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let mut line = format!("{} ", event.metadata().level());
        event.record(&mut FieldWriter(&mut line));
        self.events.lock().unwrap().push(line);
    }
}

impl EventCollector {
    pub fn lines(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}
