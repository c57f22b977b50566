//! The connection-and-routing hub: live connection table, login gate,
//! serialized request dispatch and fan-out.

pub mod connection;
pub mod dispatch;
pub mod fanout;
pub mod registry;
pub mod router;

pub use connection::serve_socket;
pub use dispatch::{Dispatcher, WorkItem};
pub use fanout::Broadcaster;
pub use registry::{ConnectionId, ConnectionRegistry, Recipient, Session};
pub use router::{MessageRouter, Verdict};

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::auth::Authenticator;
use crate::config::Config;
use crate::db::GraphStore;

/// Cheap-to-clone handle shared by every connection task.
#[derive(Clone)]
pub struct Hub {
    registry: ConnectionRegistry,
    router: MessageRouter,
    outbound_buffer: usize,
    write_timeout: Duration,
}

impl Hub {
    /// Build the hub and spawn its dispatch loop. The loop runs until every
    /// `Hub` clone has been dropped.
    pub fn start(
        config: &Config,
        store: Arc<dyn GraphStore>,
        authenticator: Arc<dyn Authenticator>,
    ) -> (Hub, JoinHandle<()>) {
        let registry = ConnectionRegistry::new();
        let broadcaster = Broadcaster::new(registry.clone(), config.write_timeout());
        let (work_tx, work_rx) = mpsc::channel(config.dispatch_queue);

        let dispatcher = Dispatcher::new(store, broadcaster.clone()).spawn(work_rx);
        let router = MessageRouter::new(broadcaster, authenticator, work_tx);

        let hub = Hub {
            registry,
            router,
            outbound_buffer: config.outbound_buffer.max(1),
            write_timeout: config.write_timeout(),
        };
        (hub, dispatcher)
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn router(&self) -> &MessageRouter {
        &self.router
    }

    pub fn outbound_buffer(&self) -> usize {
        self.outbound_buffer
    }

    /// Upper bound on a single socket write before the connection is dropped.
    pub fn write_timeout(&self) -> Duration {
        self.write_timeout
    }
}
