use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

#[derive(Clone, Serialize)]
#[serde(tag = "type")]
pub enum Event {
    WorkspaceCreated { id: Uuid },
    MemberInvited { workspace: Uuid, user: String },
    MemberRemoved { workspace: Uuid, user: String },
    CategoryCreated { id: Uuid },
    CategoryDeleted { id: Uuid },
    DocumentCreated { id: Uuid },
    DocumentDeleted { id: Uuid },
    BlocksReplaced { document: Uuid, blocks: usize },
    VersionCreated { document: Uuid, number: u64 },
    VersionRestored { document: Uuid, number: u64 },
}

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(100);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    pub fn send(&self, event: Event) {
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
