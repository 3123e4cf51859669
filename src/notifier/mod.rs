use std::collections::HashMap;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::{interval_at, timeout, Instant};
use uuid::Uuid;

// time allowed to read the next pong from the peer
const PONG_WAIT: Duration = Duration::from_secs(30);
// ping period, must stay below the pong deadline
const PING_PERIOD: Duration = Duration::from_secs(24);

const OUTBOUND_BUFFER: usize = 32;

/// Payload delivered to subscribers when a transfer lands on chain.
#[derive(Debug, Clone, Serialize)]
pub struct TransactionCompleted {
    pub hash: String,
    #[serde(rename = "type")]
    pub tx_type: String,
    pub from: String,
    pub to: String,
    /// Display units.
    pub amount: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub client_id: String,
    pub message: TransactionCompleted,
}

struct Subscription {
    id: Uuid,
    client_id: String,
    sender: mpsc::Sender<Notification>,
}

/// Handle used by producers (the watcher) and the subscribe endpoint.
/// All map mutation happens inside the hub task; this side only sends.
#[derive(Clone)]
pub struct Notifier {
    register_tx: mpsc::Sender<Subscription>,
    unregister_tx: mpsc::Sender<(String, Uuid)>,
    notify_tx: mpsc::Sender<Notification>,
}

/// Single-writer hub owning the client-id → subscriptions map.
pub struct NotifierHub {
    clients: HashMap<String, HashMap<Uuid, mpsc::Sender<Notification>>>,
    register_rx: mpsc::Receiver<Subscription>,
    unregister_rx: mpsc::Receiver<(String, Uuid)>,
    notify_rx: mpsc::Receiver<Notification>,
}

impl Notifier {
    pub fn new() -> (Self, NotifierHub) {
        let (register_tx, register_rx) = mpsc::channel(OUTBOUND_BUFFER);
        let (unregister_tx, unregister_rx) = mpsc::channel(OUTBOUND_BUFFER);
        let (notify_tx, notify_rx) = mpsc::channel(OUTBOUND_BUFFER);

        (
            Self {
                register_tx,
                unregister_tx,
                notify_tx,
            },
            NotifierHub {
                clients: HashMap::new(),
                register_rx,
                unregister_rx,
                notify_rx,
            },
        )
    }

    /// Broadcast to every live subscription of the client; dropped when the
    /// client has none.
    pub async fn notify(&self, mut notification: Notification) {
        notification.client_id = notification.client_id.to_lowercase();
        tracing::info!(client = %notification.client_id, hash = %notification.message.hash, "notify by ws");
        let _ = self.notify_tx.send(notification).await;
    }

    /// Attach an upgraded WebSocket for the client and drive it until either
    /// side closes.
    pub async fn subscribe(&self, client_id: String, socket: WebSocket) {
        let client_id = client_id.to_lowercase();
        let (sender, receiver) = mpsc::channel(OUTBOUND_BUFFER);
        let subscription = Subscription {
            id: Uuid::new_v4(),
            client_id: client_id.clone(),
            sender,
        };
        let id = subscription.id;

        if self.register_tx.send(subscription).await.is_err() {
            return;
        }

        let (sink, stream) = socket.split();

        let writer_unregister = self.unregister_tx.clone();
        let writer_client = client_id.clone();
        tokio::spawn(async move {
            write_loop(sink, receiver).await;
            let _ = writer_unregister.send((writer_client, id)).await;
        });

        let reader_unregister = self.unregister_tx.clone();
        tokio::spawn(async move {
            read_loop(stream).await;
            let _ = reader_unregister.send((client_id, id)).await;
        });
    }
}

impl NotifierHub {
    /// Hub event loop; the sole writer to the subscription map.
    pub async fn run(mut self) {
        tracing::info!("starting notifier service");
        loop {
            tokio::select! {
                Some(subscription) = self.register_rx.recv() => {
                    self.clients
                        .entry(subscription.client_id.clone())
                        .or_default()
                        .insert(subscription.id, subscription.sender);
                }
                Some((client_id, id)) = self.unregister_rx.recv() => {
                    if let Some(subs) = self.clients.get_mut(&client_id) {
                        // dropping the sender closes the writer's queue
                        subs.remove(&id);
                        if subs.is_empty() {
                            self.clients.remove(&client_id);
                        }
                    }
                }
                Some(notification) = self.notify_rx.recv() => {
                    if let Some(subs) = self.clients.get(&notification.client_id) {
                        for sender in subs.values() {
                            let _ = sender.send(notification.clone()).await;
                        }
                    }
                }
                else => return,
            }
        }
    }
}

/// Flush outbound notifications and keep the connection alive with pings.
async fn write_loop(
    mut sink: futures_util::stream::SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<Notification>,
) {
    let mut ping = interval_at(Instant::now() + PING_PERIOD, PING_PERIOD);

    loop {
        tokio::select! {
            message = outbound.recv() => {
                match message {
                    Some(notification) => {
                        let payload = match serde_json::to_string(&notification) {
                            Ok(payload) => payload,
                            Err(_) => continue,
                        };
                        if sink.send(Message::Text(payload)).await.is_err() {
                            return;
                        }
                    }
                    // the hub dropped the subscription
                    None => {
                        let _ = sink.send(Message::Close(None)).await;
                        return;
                    }
                }
            }
            _ = ping.tick() => {
                if sink.send(Message::Ping(Vec::new())).await.is_err() {
                    return;
                }
            }
        }
    }
}

/// Enforce the pong read deadline; any inbound frame resets it.
async fn read_loop(mut stream: futures_util::stream::SplitStream<WebSocket>) {
    loop {
        match timeout(PONG_WAIT, stream.next()).await {
            // read deadline fired
            Err(_) => return,
            Ok(None) => return,
            Ok(Some(Err(_))) => return,
            Ok(Some(Ok(Message::Close(_)))) => return,
            Ok(Some(Ok(_))) => continue,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completed(hash: &str) -> TransactionCompleted {
        TransactionCompleted {
            hash: hash.to_string(),
            tx_type: "transfer_token".to_string(),
            from: "0xaaaa".to_string(),
            to: "0xbbbb".to_string(),
            amount: 1.5,
        }
    }

    #[tokio::test]
    async fn hub_routes_notifications_by_client() {
        let (notifier, hub) = Notifier::new();
        tokio::spawn(hub.run());

        let (sender, mut outbound) = mpsc::channel(4);
        notifier
            .register_tx
            .send(Subscription {
                id: Uuid::new_v4(),
                client_id: "0xaaaa".to_string(),
                sender,
            })
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        // client ids are matched case-insensitively
        notifier
            .notify(Notification {
                client_id: "0xAAAA".to_string(),
                message: completed("0xdead"),
            })
            .await;

        let delivered = outbound.recv().await.unwrap();
        assert_eq!(delivered.message.hash, "0xdead");
        assert_eq!(delivered.client_id, "0xaaaa");
    }

    #[tokio::test]
    async fn unregister_closes_the_outbound_channel() {
        let (notifier, hub) = Notifier::new();
        tokio::spawn(hub.run());

        let id = Uuid::new_v4();
        let (sender, mut outbound) = mpsc::channel(4);
        notifier
            .register_tx
            .send(Subscription {
                id,
                client_id: "0xaaaa".to_string(),
                sender,
            })
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        notifier
            .unregister_tx
            .send(("0xaaaa".to_string(), id))
            .await
            .unwrap();

        // the hub dropped the only sender, so the queue must drain to None
        assert!(outbound.recv().await.is_none());
    }

    #[tokio::test]
    async fn notifications_for_unknown_clients_are_dropped() {
        let (notifier, hub) = Notifier::new();
        tokio::spawn(hub.run());

        // nothing subscribed, must not error or block
        notifier
            .notify(Notification {
                client_id: "0xcccc".to_string(),
                message: completed("0xbeef"),
            })
            .await;
    }
}
