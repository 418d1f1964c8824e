//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use switchboard_proxy::certs::{CachePolicy, CertificateCache, ChallengeStore, SelfSignedAuthority};
use switchboard_proxy::config::ProxyConfig;
use switchboard_proxy::http::ProxyServer;
use switchboard_proxy::lifecycle::Shutdown;
use switchboard_proxy::routing::{SharedSwitchboard, Switchboard};

/// Backend that answers every request with its own request head as the body.
///
/// Returns the bound port and a counter of accepted connections.
pub async fn start_echo_backend() -> (u16, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let connections = Arc::new(AtomicUsize::new(0));
    let counter = connections.clone();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(async move {
                let mut head = Vec::new();
                let mut buf = [0u8; 1024];
                while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => head.extend_from_slice(&buf[..n]),
                    }
                }

                let end = head.windows(4).position(|w| w == b"\r\n\r\n").unwrap_or(head.len());
                let body = String::from_utf8_lossy(&head[..end]).to_string();

                // Drain the request body so closing the socket does not reset it.
                let mut remaining = content_length(&body).saturating_sub(head.len() - end - 4);
                while remaining > 0 {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => remaining = remaining.saturating_sub(n),
                    }
                }

                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    (port, connections)
}

/// Backend that sends one chunk of a chunked response and then holds the body open.
///
/// The receiver fires once the proxy closes the backend connection.
pub async fn start_trickle_backend(first_chunk: &'static str) -> (u16, oneshot::Receiver<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (released_tx, released_rx) = oneshot::channel();

    tokio::spawn(async move {
        let Ok((mut socket, _)) = listener.accept().await else {
            return;
        };

        let mut head = Vec::new();
        let mut buf = [0u8; 1024];
        while !head.windows(4).any(|w| w == b"\r\n\r\n") {
            match socket.read(&mut buf).await {
                Ok(0) | Err(_) => return,
                Ok(n) => head.extend_from_slice(&buf[..n]),
            }
        }

        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nTransfer-Encoding: chunked\r\n\r\n{:x}\r\n{}\r\n",
            first_chunk.len(),
            first_chunk
        );
        if socket.write_all(response.as_bytes()).await.is_err() {
            return;
        }

        // The rest of the body never comes; wait for the other side to hang up.
        loop {
            match socket.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(_) => continue,
            }
        }
        let _ = released_tx.send(());
    });

    (port, released_rx)
}

fn content_length(head: &str) -> usize {
    head.lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse().ok())
        .unwrap_or(0)
}

/// A port with nothing listening on it.
pub async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

pub fn switchboard(entries: &[(&str, u16)]) -> SharedSwitchboard {
    SharedSwitchboard::new(Switchboard::from_entries(entries.iter().copied()).unwrap())
}

/// A running proxy on ephemeral ports.
pub struct TestProxy {
    pub http_addr: SocketAddr,
    pub https_addr: SocketAddr,
    pub certs: CertificateCache,
    pub challenges: ChallengeStore,
    pub shutdown: Shutdown,
}

impl TestProxy {
    pub async fn start(entries: &[(&str, u16)]) -> Self {
        let mut config = ProxyConfig::default();
        config.listener.http_address = "127.0.0.1:0".into();
        config.listener.https_address = "127.0.0.1:0".into();
        config.tls.cache_dir = None;

        let switchboard = switchboard(entries);
        let certs = CertificateCache::new(
            Arc::new(SelfSignedAuthority::new(Duration::from_secs(24 * 3600))),
            switchboard.clone(),
            CachePolicy::default(),
            None,
        );
        let challenges = ChallengeStore::new();

        let server = ProxyServer::bind(&config, switchboard, certs.clone(), challenges.clone())
            .await
            .unwrap();
        let http_addr = server.http_addr().unwrap();
        let https_addr = server.https_addr().unwrap();

        let shutdown = Shutdown::new(Duration::from_secs(1));
        let signal = shutdown.clone();
        tokio::spawn(async move {
            let _ = server.run(&signal).await;
        });

        Self {
            http_addr,
            https_addr,
            certs,
            challenges,
            shutdown,
        }
    }

    /// HTTPS client that sends `hostname` to this proxy and accepts its self-signed certificates.
    pub fn https_client(&self, hostname: &str) -> reqwest::Client {
        reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .resolve(hostname, self.https_addr)
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap()
    }

    pub fn https_url(&self, hostname: &str, path: &str) -> String {
        format!("https://{hostname}:{}{path}", self.https_addr.port())
    }
}

impl Drop for TestProxy {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Plain HTTP client that does not follow redirects.
pub fn plain_client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}
