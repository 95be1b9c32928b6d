use tokio::sync::broadcast;

const BROADCAST_CAPACITY: usize = 256;

/// Fans out push-event JSON strings to every connected WS client over a single
/// `tokio::sync::broadcast` channel.
pub struct EventBroadcaster {
    tx: broadcast::Sender<String>,
}

impl EventBroadcaster {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }

    /// Pushes a JSON event string to all subscribers. Silently drops if
    /// no client is currently connected — events are not durable, only
    /// the objects they describe are.
    pub fn send(&self, payload: String) {
        let _ = self.tx.send(payload);
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}
