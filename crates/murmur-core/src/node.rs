//! Session startup and the main command loop
//!
//! ```text
//! start:  identity ─▶ probe transport ─▶ set_user_public_key
//!         ─▶ join channels ─▶ subscribe private topic ─▶ spawn inbound loop
//! run:    for each cmd: router.handle_command(cmd)
//! ```
//!
//! Startup failures are fatal and returned to the caller. Once running,
//! nothing a peer or the user sends can end the session.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::ChatConfig;
use crate::error::{ChatError, ChatResult};
use crate::identity::{generate_identity, Identity, PublicKey};
use crate::router::{MessageRouter, RouterStats, Session};
use crate::transport::{inbound_queue, Transport, INBOUND_QUEUE_CAPACITY};
use crate::ui::ChatUi;

/// Longest the transport probe may take before startup is aborted
pub const STARTUP_TIMEOUT: Duration = Duration::from_secs(5);

/// A running chat session.
pub struct ChatNode<T: Transport> {
    router: Arc<MessageRouter<T>>,
    inbound_task: Option<JoinHandle<()>>,
}

impl<T: Transport> ChatNode<T> {
    /// Start a session with a freshly generated identity.
    ///
    /// Fails with `CryptoUnavailable` or `TransportUnreachable`, both fatal.
    pub async fn start(config: ChatConfig, transport: T, ui: Arc<dyn ChatUi>) -> ChatResult<Self> {
        let identity = generate_identity()?;
        Self::start_with_identity(config, identity, transport, ui).await
    }

    /// Start a session with a given identity.
    pub async fn start_with_identity(
        config: ChatConfig,
        identity: Identity,
        transport: T,
        ui: Arc<dyn ChatUi>,
    ) -> ChatResult<Self> {
        config.validate()?;

        let reachable = tokio::time::timeout(STARTUP_TIMEOUT, transport.is_reachable())
            .await
            .unwrap_or(false);
        if !reachable {
            return Err(ChatError::TransportUnreachable(format!(
                "relay network not reachable within {}s",
                STARTUP_TIMEOUT.as_secs()
            )));
        }

        ui.set_user_public_key(identity.public_key());

        let channel_names: Vec<String> = config
            .channel_names()
            .into_iter()
            .map(str::to_string)
            .collect();
        let private_topic = config.topic;

        let (inbound_tx, inbound_rx) = inbound_queue(INBOUND_QUEUE_CAPACITY);
        let session = Session::new(identity, config);
        let router = Arc::new(MessageRouter::new(
            session,
            Arc::new(transport),
            ui,
            inbound_tx,
        ));

        for name in &channel_names {
            router.join_channel(name).await?;
        }
        router.subscribe(private_topic).await?;

        let inbound_task = tokio::spawn(router.clone().run_inbound(inbound_rx));

        info!(
            public_key = %router.public_key().short(),
            channels = channel_names.len(),
            private_topic = %private_topic,
            "Chat node started"
        );

        Ok(Self {
            router,
            inbound_task: Some(inbound_task),
        })
    }

    /// The router driving this session
    pub fn router(&self) -> &Arc<MessageRouter<T>> {
        &self.router
    }

    /// Our contact address
    pub fn public_key(&self) -> &PublicKey {
        self.router.public_key()
    }

    /// Counter snapshot
    pub fn stats(&self) -> RouterStats {
        self.router.stats()
    }

    /// Run one user command.
    pub async fn send(&self, command: &str) -> ChatResult<()> {
        self.router.handle_command(command).await
    }

    /// Process commands one at a time until the stream ends, then stop.
    pub async fn run(mut self, mut commands: mpsc::Receiver<String>) -> RouterStats {
        while let Some(command) = commands.recv().await {
            // Errors already reached the UI
            let _ = self.router.handle_command(&command).await;
        }
        debug!("Command stream closed");
        self.stop().await;
        self.router.stats()
    }

    async fn stop(&mut self) {
        self.router.shutdown();
        if let Some(task) = self.inbound_task.take() {
            let _ = task.await;
        }
        info!(stats = ?self.router.stats(), "Chat node stopped");
    }
}

impl<T: Transport> Drop for ChatNode<T> {
    fn drop(&mut self) {
        self.router.shutdown();
        if let Some(task) = self.inbound_task.take() {
            task.abort();
        }
    }
}

impl<T: Transport> std::fmt::Debug for ChatNode<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatNode")
            .field("router", &self.router)
            .finish_non_exhaustive()
    }
}
