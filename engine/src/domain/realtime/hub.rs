//! Realtime hub
//!
//! A single event loop owns registration, unregistration, and fan-out.
//! Clients hold a bounded frame queue; fan-out enqueues without blocking and
//! evicts any client whose queue is full, so one slow consumer never stalls
//! producers. The hand-off into the loop itself is bounded by the broadcast
//! timeout. Connection writing (frames onto a socket) happens outside the
//! core.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::mpsc;

use crate::core::config::RealtimeConfig;

use super::broadcaster::{BroadcastError, BroadcastEvent, Broadcaster};

/// A frame delivered to a client queue.
#[derive(Debug, Clone)]
pub enum Frame {
    Event(BroadcastEvent),
    Ping,
}

struct ClientHandle {
    user_id: String,
    sender: mpsc::Sender<Frame>,
}

/// A registered client's receiving end. Dropping it unregisters the client on
/// the next delivery.
pub struct HubClient {
    pub id: String,
    pub receiver: mpsc::Receiver<Frame>,
}

enum HubCommand {
    Register {
        id: String,
        user_id: String,
        sender: mpsc::Sender<Frame>,
    },
    Unregister {
        id: String,
    },
    Broadcast {
        event: BroadcastEvent,
    },
    Shutdown,
}

pub struct RealtimeHub {
    commands: mpsc::Sender<HubCommand>,
    clients: Arc<RwLock<HashMap<String, ClientHandle>>>,
    config: RealtimeConfig,
}

impl RealtimeHub {
    /// Start the hub loop on the current runtime.
    pub fn spawn(config: RealtimeConfig) -> Arc<Self> {
        let (commands, rx) = mpsc::channel(1024);
        let clients: Arc<RwLock<HashMap<String, ClientHandle>>> =
            Arc::new(RwLock::new(HashMap::new()));
        let hub = Arc::new(Self {
            commands,
            clients: Arc::clone(&clients),
            config: config.clone(),
        });
        tokio::spawn(run_loop(rx, clients, config));
        hub
    }

    /// Register a client and get its frame queue.
    pub async fn register(
        &self,
        id: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Result<HubClient, BroadcastError> {
        let id = id.into();
        let (sender, receiver) = mpsc::channel(self.config.send_buffer.max(1));
        self.commands
            .send(HubCommand::Register {
                id: id.clone(),
                user_id: user_id.into(),
                sender,
            })
            .await
            .map_err(|_| BroadcastError::Closed)?;
        Ok(HubClient { id, receiver })
    }

    pub async fn unregister(&self, id: impl Into<String>) -> Result<(), BroadcastError> {
        self.commands
            .send(HubCommand::Unregister { id: id.into() })
            .await
            .map_err(|_| BroadcastError::Closed)
    }

    /// Stop the loop; pending client queues are closed.
    pub async fn shutdown(&self) {
        let _ = self.commands.send(HubCommand::Shutdown).await;
    }

    pub fn client_count(&self) -> usize {
        self.clients.read().len()
    }
}

#[async_trait]
impl Broadcaster for RealtimeHub {
    async fn broadcast(&self, event: BroadcastEvent) -> Result<(), BroadcastError> {
        match tokio::time::timeout(
            self.config.broadcast_timeout(),
            self.commands.send(HubCommand::Broadcast { event }),
        )
        .await
        {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(BroadcastError::Closed),
            Err(_) => Err(BroadcastError::Timeout),
        }
    }
}

async fn run_loop(
    mut rx: mpsc::Receiver<HubCommand>,
    clients: Arc<RwLock<HashMap<String, ClientHandle>>>,
    config: RealtimeConfig,
) {
    let mut ping = tokio::time::interval(config.ping_interval());
    ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick fires immediately; skip it
    ping.tick().await;

    loop {
        tokio::select! {
            command = rx.recv() => match command {
                Some(HubCommand::Register { id, user_id, sender }) => {
                    clients.write().insert(id.clone(), ClientHandle { user_id, sender });
                    tracing::debug!(client = %id, "Realtime client registered");
                }
                Some(HubCommand::Unregister { id }) => {
                    clients.write().remove(&id);
                    tracing::debug!(client = %id, "Realtime client unregistered");
                }
                Some(HubCommand::Broadcast { event }) => {
                    fan_out(&clients, Frame::Event(event));
                }
                Some(HubCommand::Shutdown) | None => break,
            },
            _ = ping.tick() => {
                fan_out(&clients, Frame::Ping);
            }
        }
    }

    clients.write().clear();
    tracing::debug!("Realtime hub loop stopped");
}

/// Enqueue a frame on every matching client; evict clients whose queue is
/// full or whose receiver is gone.
fn fan_out(clients: &RwLock<HashMap<String, ClientHandle>>, frame: Frame) {
    let mut evicted: Vec<String> = Vec::new();
    {
        let clients = clients.read();
        for (id, client) in clients.iter() {
            if let Frame::Event(event) = &frame
                && let Some(user_id) = &event.user_id
                && user_id != &client.user_id
            {
                continue;
            }
            match client.sender.try_send(frame.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!(client = %id, "Evicting slow realtime client");
                    evicted.push(id.clone());
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    evicted.push(id.clone());
                }
            }
        }
    }
    if !evicted.is_empty() {
        let mut clients = clients.write();
        for id in evicted {
            // Dropping the handle closes the client's queue
            clients.remove(&id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn test_config(send_buffer: usize) -> RealtimeConfig {
        RealtimeConfig {
            send_buffer,
            broadcast_timeout_secs: 1,
            ping_interval_secs: 3600,
        }
    }

    fn event_for(user: &str) -> BroadcastEvent {
        BroadcastEvent::for_user("inbox.created", user, json!({"id": "i1"}))
    }

    async fn recv_event(client: &mut HubClient) -> BroadcastEvent {
        loop {
            match tokio::time::timeout(std::time::Duration::from_secs(1), client.receiver.recv())
                .await
                .expect("frame within timeout")
                .expect("open queue")
            {
                Frame::Event(event) => return event,
                Frame::Ping => continue,
            }
        }
    }

    #[tokio::test]
    async fn test_broadcast_reaches_matching_user() {
        let hub = RealtimeHub::spawn(test_config(8));
        let mut u1 = hub.register("c1", "u1").await.unwrap();
        let mut u2 = hub.register("c2", "u2").await.unwrap();

        hub.broadcast(event_for("u1")).await.unwrap();

        let received = recv_event(&mut u1).await;
        assert_eq!(received.topic, "inbox.created");

        // u2 sees nothing
        hub.broadcast(BroadcastEvent {
            topic: "inbox.updated".into(),
            user_id: None,
            payload: json!({}),
        })
        .await
        .unwrap();
        let next = recv_event(&mut u2).await;
        assert_eq!(next.topic, "inbox.updated");
    }

    #[tokio::test]
    async fn test_unfiltered_broadcast_reaches_everyone() {
        let hub = RealtimeHub::spawn(test_config(8));
        let mut u1 = hub.register("c1", "u1").await.unwrap();
        let mut u2 = hub.register("c2", "u2").await.unwrap();

        hub.broadcast(BroadcastEvent {
            topic: "system.notice".into(),
            user_id: None,
            payload: json!({}),
        })
        .await
        .unwrap();

        assert_eq!(recv_event(&mut u1).await.topic, "system.notice");
        assert_eq!(recv_event(&mut u2).await.topic, "system.notice");
    }

    #[tokio::test]
    async fn test_slow_consumer_evicted() {
        let hub = RealtimeHub::spawn(test_config(1));
        let mut client = hub.register("c1", "u1").await.unwrap();

        // Queue capacity is 1 and nothing drains: the second broadcast evicts
        hub.broadcast(event_for("u1")).await.unwrap();
        hub.broadcast(event_for("u1")).await.unwrap();

        // Give the loop a beat to process both commands
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(hub.client_count(), 0);

        // The queued frame drains, then the closed queue reports end
        assert!(matches!(client.receiver.recv().await, Some(Frame::Event(_))));
        assert!(client.receiver.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_unregister_removes_client() {
        let hub = RealtimeHub::spawn(test_config(8));
        let _client = hub.register("c1", "u1").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(hub.client_count(), 1);

        hub.unregister("c1").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(hub.client_count(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_closes_queues() {
        let hub = RealtimeHub::spawn(test_config(8));
        let mut client = hub.register("c1", "u1").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        hub.shutdown().await;
        assert!(client.receiver.recv().await.is_none());
    }
}
