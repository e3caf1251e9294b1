//! Shared fixtures: a range-aware HTTP server standing in for a leak site
//! and a minimal SOCKS5 relay standing in for the local Tor proxy.

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use futures::stream;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

pub const PAYLOAD_SIZE: usize = 256 * 1024;

pub fn payload() -> Vec<u8> {
    (0..PAYLOAD_SIZE).map(|i| (i % 251) as u8).collect()
}

#[derive(Default)]
pub struct ServerState {
    pub flaky_hits: AtomicUsize,
    pub range_hits: AtomicUsize,
    pub active_streams: AtomicUsize,
    pub max_active_streams: AtomicUsize,
}

pub struct Fixture {
    pub http_addr: SocketAddr,
    pub socks_addr: SocketAddr,
    pub state: Arc<ServerState>,
}

impl Fixture {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.http_addr, path)
    }
}

pub async fn start() -> Fixture {
    let state = Arc::new(ServerState::default());
    let app = Router::new()
        .route("/file/:name", get(serve_ranged))
        .route("/flaky/:name", get(serve_flaky))
        .route("/slow/:name", get(serve_slow))
        .route("/chunked/:name", get(serve_chunked))
        .route("/norange/:name", get(serve_norange))
        .route("/check", get(serve_check))
        .with_state(state.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let http_addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    let socks_addr = start_socks_stub().await;
    Fixture {
        http_addr,
        socks_addr,
        state,
    }
}

/// A bound-then-dropped port: connecting to it fails immediately.
pub async fn closed_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

fn parse_range_start(headers: &HeaderMap) -> Option<u64> {
    let value = headers.get(header::RANGE)?.to_str().ok()?;
    let rest = value.strip_prefix("bytes=")?;
    rest.split('-').next()?.parse::<u64>().ok()
}

fn ranged_response(headers: &HeaderMap, body: Vec<u8>) -> Response {
    let total = body.len() as u64;
    match parse_range_start(headers) {
        Some(start) if start >= total => Response::builder()
            .status(StatusCode::RANGE_NOT_SATISFIABLE)
            .header(header::CONTENT_RANGE, format!("bytes */{}", total))
            .body(Body::empty())
            .unwrap(),
        Some(start) => {
            let slice = body[start as usize..].to_vec();
            Response::builder()
                .status(StatusCode::PARTIAL_CONTENT)
                .header(
                    header::CONTENT_RANGE,
                    format!("bytes {}-{}/{}", start, total - 1, total),
                )
                .header(header::CONTENT_LENGTH, slice.len().to_string())
                .body(Body::from(slice))
                .unwrap()
        }
        None => Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_LENGTH, total.to_string())
            .body(Body::from(body))
            .unwrap(),
    }
}

async fn serve_ranged(State(state): State<Arc<ServerState>>, headers: HeaderMap) -> Response {
    if headers.contains_key(header::RANGE) {
        state.range_hits.fetch_add(1, Ordering::SeqCst);
    }
    ranged_response(&headers, payload())
}

/// First request advertises the full size then cuts the stream at the
/// halfway mark; later requests behave like a normal range-aware server.
async fn serve_flaky(State(state): State<Arc<ServerState>>, headers: HeaderMap) -> Response {
    let hit = state.flaky_hits.fetch_add(1, Ordering::SeqCst);
    if hit == 0 {
        let body = payload();
        let total = body.len();
        let half = body[..total / 2].to_vec();
        let stream = stream::iter(vec![
            Ok::<Vec<u8>, std::io::Error>(half),
            Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "dropped",
            )),
        ]);
        return Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_LENGTH, total.to_string())
            .body(Body::from_stream(stream))
            .unwrap();
    }
    ranged_response(&headers, payload())
}

/// Streams slowly while tracking how many responses are in flight, so
/// tests can observe the pool's concurrency ceiling from the server side.
async fn serve_slow(State(state): State<Arc<ServerState>>) -> Response {
    let active = state.active_streams.fetch_add(1, Ordering::SeqCst) + 1;
    state.max_active_streams.fetch_max(active, Ordering::SeqCst);

    struct Guard(Arc<ServerState>);
    impl Drop for Guard {
        fn drop(&mut self) {
            self.0.active_streams.fetch_sub(1, Ordering::SeqCst);
        }
    }

    let body = payload();
    let total = body.len();
    let chunks: Vec<Vec<u8>> = body.chunks(total / 8).map(|c| c.to_vec()).collect();
    let guard = Guard(state);
    let stream = stream::unfold((chunks.into_iter(), guard), |(mut iter, guard)| async move {
        let chunk = iter.next()?;
        tokio::time::sleep(Duration::from_millis(30)).await;
        Some((Ok::<Vec<u8>, std::io::Error>(chunk), (iter, guard)))
    });
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_LENGTH, total.to_string())
        .body(Body::from_stream(stream))
        .unwrap()
}

/// Chunked transfer, no Content-Length.
async fn serve_chunked() -> Response {
    let chunks: Vec<Vec<u8>> = payload().chunks(4096).map(|c| c.to_vec()).collect();
    let stream = stream::iter(chunks.into_iter().map(Ok::<Vec<u8>, std::io::Error>));
    Response::builder()
        .status(StatusCode::OK)
        .body(Body::from_stream(stream))
        .unwrap()
}

/// Ignores Range headers entirely and always replies 200 with the full body.
async fn serve_norange() -> Response {
    let body = payload();
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_LENGTH, body.len().to_string())
        .body(Body::from(body))
        .unwrap()
}

async fn serve_check() -> String {
    format!(
        "<html><body>{}</body></html>",
        tor_downloader::proxy::TOR_CHECK_MARKER
    )
}

/// Minimal SOCKS5 server: no auth, CONNECT only, relays bytes verbatim.
async fn start_socks_stub() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((mut inbound, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(async move {
                let _ = relay(&mut inbound).await;
            });
        }
    });
    addr
}

/// SOCKS5 server that accepts the handshake but refuses every CONNECT
/// with a general-failure reply.
pub async fn start_rejecting_socks_stub() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((mut inbound, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(async move {
                let mut head = [0u8; 2];
                if inbound.read_exact(&mut head).await.is_err() {
                    return;
                }
                let mut methods = vec![0u8; head[1] as usize];
                if inbound.read_exact(&mut methods).await.is_err() {
                    return;
                }
                let _ = inbound.write_all(&[0x05, 0x00]).await;
                let mut req = vec![0u8; 256];
                let _ = inbound.read(&mut req).await;
                let _ = inbound
                    .write_all(&[0x05, 0x01, 0x00, 0x01, 0, 0, 0, 0, 0, 0])
                    .await;
            });
        }
    });
    addr
}

async fn relay(inbound: &mut TcpStream) -> std::io::Result<()> {
    let mut head = [0u8; 2];
    inbound.read_exact(&mut head).await?;
    let mut methods = vec![0u8; head[1] as usize];
    inbound.read_exact(&mut methods).await?;
    inbound.write_all(&[0x05, 0x00]).await?;

    let mut req = [0u8; 4];
    inbound.read_exact(&mut req).await?;
    let host = match req[3] {
        0x01 => {
            let mut ip = [0u8; 4];
            inbound.read_exact(&mut ip).await?;
            std::net::Ipv4Addr::from(ip).to_string()
        }
        0x03 => {
            let mut len = [0u8; 1];
            inbound.read_exact(&mut len).await?;
            let mut name = vec![0u8; len[0] as usize];
            inbound.read_exact(&mut name).await?;
            String::from_utf8_lossy(&name).into_owned()
        }
        _ => {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "unsupported address type",
            ))
        }
    };
    let mut port = [0u8; 2];
    inbound.read_exact(&mut port).await?;
    let port = u16::from_be_bytes(port);

    let mut outbound = TcpStream::connect((host.as_str(), port)).await?;
    inbound
        .write_all(&[0x05, 0x00, 0x00, 0x01, 0, 0, 0, 0, 0, 0])
        .await?;
    tokio::io::copy_bidirectional(inbound, &mut outbound).await?;
    Ok(())
}
