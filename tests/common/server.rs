//! In-process HTTP server for integration testing.

use pulsewatch::config::Config;
use pulsewatch::{AppState, http};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// The admin router served on an ephemeral port.
pub struct TestServer {
    pub state: AppState,
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<std::io::Result<()>>>,
}

#[allow(dead_code)]
impl TestServer {
    pub async fn spawn(config: Config) -> anyhow::Result<Self> {
        let state = AppState::from_config(&config)?;
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let (tx, rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(http::serve(listener, state.clone(), async move {
            let _ = rx.await;
        }));
        Ok(Self {
            state,
            addr,
            shutdown: Some(tx),
            handle: Some(handle),
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn stop(mut self) -> anyhow::Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            handle.await??;
        }
        Ok(())
    }
}
