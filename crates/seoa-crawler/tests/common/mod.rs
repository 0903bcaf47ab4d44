use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use seoa_crawler::{BackoffConfig, CrawlerConfig};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

#[derive(Debug, Clone)]
pub enum StubResponse {
    Reply {
        status: u16,
        headers: Vec<(&'static str, String)>,
        body: Vec<u8>,
    },
    Hang,
}

impl StubResponse {
    pub fn ok(body: &str) -> Self {
        Self::Reply {
            status: 200,
            headers: vec![("Content-Type", "text/html; charset=utf-8".into())],
            body: body.as_bytes().to_vec(),
        }
    }

    pub fn status(status: u16) -> Self {
        Self::Reply {
            status,
            headers: vec![],
            body: vec![],
        }
    }
}

pub struct StubServer {
    pub addr: SocketAddr,
    pub hits: Arc<AtomicUsize>,
}

impl StubServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

/// Minimal HTTP/1.1 server answering every request with `handler(path, hit)`.
pub async fn serve<F>(handler: F) -> StubServer
where
    F: Fn(&str, usize) -> StubResponse + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let handler = Arc::new(handler);

    let hits_c = hits.clone();
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            let hits = hits_c.clone();
            let handler = handler.clone();
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let mut chunk = [0u8; 1024];
                loop {
                    let n = socket.read(&mut chunk).await.unwrap_or(0);
                    if n == 0 {
                        return;
                    }
                    buf.extend_from_slice(&chunk[..n]);
                    if buf.windows(4).any(|w| w == b"\r\n\r\n") {
                        break;
                    }
                }
                let request = String::from_utf8_lossy(&buf);
                let path = request
                    .lines()
                    .next()
                    .and_then(|l| l.split_whitespace().nth(1))
                    .unwrap_or("/")
                    .to_string();
                let hit = hits.fetch_add(1, Ordering::SeqCst);

                match handler(&path, hit) {
                    StubResponse::Hang => {
                        tokio::time::sleep(Duration::from_secs(10)).await;
                    }
                    StubResponse::Reply {
                        status,
                        headers,
                        body,
                    } => {
                        let mut head = format!(
                            "HTTP/1.1 {status} Stub\r\nContent-Length: {}\r\nConnection: close\r\n",
                            body.len()
                        );
                        for (name, value) in headers {
                            head.push_str(&format!("{name}: {value}\r\n"));
                        }
                        head.push_str("\r\n");
                        socket.write_all(head.as_bytes()).await.ok();
                        socket.write_all(&body).await.ok();
                        socket.shutdown().await.ok();
                    }
                }
            });
        }
    });

    StubServer { addr, hits }
}

/// Crawler settings that retry fast enough for tests.
pub fn fast_config(max_retries: u32) -> CrawlerConfig {
    CrawlerConfig {
        max_retries,
        timeout_secs: 1,
        backoff: BackoffConfig {
            base_ms: 1,
            max_ms: 5,
            factor: 2.0,
            jitter: false,
        },
        ..Default::default()
    }
}
