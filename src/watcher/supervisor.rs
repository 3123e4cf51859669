use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::eth::client::dial_ws;
use crate::watcher::{EventWatcher, HeaderWatcher};

const WS_RECONNECT_INTERVAL: Duration = Duration::from_secs(30 * 60);

/// Owns the streaming connection for both live watchers. A stream error in
/// either one stops the other and re-dials; a wall-clock timer forces a
/// reconnect even without errors. A dial failure is fatal and published on
/// the shutdown channel.
pub async fn run(
    ws_url: String,
    events: Arc<EventWatcher>,
    headers: Arc<HeaderWatcher>,
    shutdown: mpsc::Sender<()>,
) {
    loop {
        let ws = match dial_ws(&ws_url).await {
            Ok(provider) => Arc::new(provider),
            Err(e) => {
                tracing::error!("failed to connect to node by ws: {}", e);
                let _ = shutdown.send(()).await;
                return;
            }
        };

        let (stop_events_tx, mut stop_events_rx) = mpsc::channel::<()>(1);
        let (stop_headers_tx, mut stop_headers_rx) = mpsc::channel::<()>(1);
        let (next_tx, mut next_rx) = mpsc::channel::<()>(2);

        let events_task = {
            let events = events.clone();
            let ws = ws.clone();
            let stop_headers = stop_headers_tx.clone();
            let next = next_tx.clone();
            tokio::spawn(async move {
                if let Err(e) = events.listen(&ws, &mut stop_events_rx).await {
                    tracing::error!("event subscription error: {}", e);
                }
                // connection is gone, take the sibling down and reconnect
                let _ = stop_headers.send(()).await;
                let _ = next.send(()).await;
            })
        };

        let headers_task = {
            let headers = headers.clone();
            let ws = ws.clone();
            let stop_events = stop_events_tx.clone();
            let next = next_tx.clone();
            tokio::spawn(async move {
                if let Err(e) = headers.listen(&ws, &mut stop_headers_rx).await {
                    tracing::error!("headers subscription error: {}", e);
                }
                let _ = stop_events.send(()).await;
                let _ = next.send(()).await;
            })
        };

        tokio::select! {
            _ = next_rx.recv() => {
                tracing::info!("automatically reconnecting ws");
            }
            _ = tokio::time::sleep(WS_RECONNECT_INTERVAL) => {
                tracing::info!("reconnecting ws by timer");
                let _ = stop_events_tx.send(()).await;
                let _ = stop_headers_tx.send(()).await;
            }
        }

        // both listeners must be down before the connection is re-dialed
        let _ = events_task.await;
        let _ = headers_task.await;
    }
}
