// ABOUTME: Pooled PostgreSQL connection acquisition with retry/backoff
// ABOUTME: Grounded on the reference tool's connect_with_retry + retry_with_backoff idiom

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio_postgres::{Client, NoTls};

/// Retry an async operation with exponential backoff, doubling the delay on
/// each attempt. Mirrors `utils::retry_with_backoff` in the reference tool.
pub async fn retry_with_backoff<F, Fut, T>(
    mut operation: F,
    max_retries: u32,
    initial_delay: Duration,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut delay = initial_delay;
    let mut last_error = None;

    for attempt in 0..=max_retries {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                last_error = Some(e);
                if attempt < max_retries {
                    tracing::warn!(
                        "connection attempt {}/{} failed, retrying in {:?}",
                        attempt + 1,
                        max_retries + 1,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
            }
        }
    }

    Err(last_error.unwrap_or_else(|| anyhow::anyhow!("connection failed after retries")))
}

/// Connect to PostgreSQL, retrying with exponential backoff on transient
/// connect failures. The connection's background task is spawned and left to
/// run for the client's lifetime, as `tokio_postgres` requires.
pub async fn connect_with_retry(conn_str: &str) -> Result<Client> {
    retry_with_backoff(
        || async {
            let (client, connection) = tokio_postgres::connect(conn_str, NoTls)
                .await
                .context("failed to connect to postgres")?;
            tokio::spawn(async move {
                if let Err(e) = connection.await {
                    tracing::error!("postgres connection closed with error: {e}");
                }
            });
            Ok(client)
        },
        3,
        Duration::from_secs(1),
    )
    .await
}

/// A small round-robin pool of connections to one database role (source or
/// target), sized to `max_threads`. A single shared connection is not safe
/// for concurrent worker tasks; this pool gives each caller a dedicated
/// client instead of funnelling everything through a mutex.
pub struct ConnectionPool {
    conn_str: String,
    clients: Vec<std::sync::Arc<Client>>,
    next: AtomicUsize,
}

impl ConnectionPool {
    pub async fn connect(conn_str: &str, size: usize) -> Result<Self> {
        let mut clients = Vec::with_capacity(size.max(1));
        for _ in 0..size.max(1) {
            clients.push(std::sync::Arc::new(connect_with_retry(conn_str).await?));
        }
        Ok(Self {
            conn_str: conn_str.to_string(),
            clients,
            next: AtomicUsize::new(0),
        })
    }

    /// Hand out the next client in round-robin order. Cheap to clone: callers
    /// get their own `Arc` handle to a connection shared with other callers,
    /// which is safe because `tokio_postgres::Client` pipelines concurrent
    /// requests over its single connection.
    pub fn acquire(&self) -> std::sync::Arc<Client> {
        let idx = self.next.fetch_add(1, Ordering::Relaxed) % self.clients.len();
        self.clients[idx].clone()
    }

    /// Open a fresh, dedicated connection to this pool's database, for
    /// callers (like the reverifier) that want a connection outside the
    /// round-robin rotation for the lifetime of one pass.
    pub async fn connect_dedicated(&self) -> Result<Client> {
        connect_with_retry(&self.conn_str).await
    }

    pub fn size(&self) -> usize {
        self.clients.len()
    }
}
