// src/render.rs
//! Output side of the engine: whoever paints selected items, and the manual
//! refresh event it can raise.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::info;

use crate::model::ContentItem;

/// Paints an ordered selection into whatever slots exist. It may use fewer
/// items than offered and must not assume more will follow.
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, items: &[ContentItem]);
}

/// Headless renderer: one structured event per selection.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingRenderer;

#[async_trait]
impl Renderer for LoggingRenderer {
    async fn render(&self, items: &[ContentItem]) {
        info!(target: "engine", items = items.len(), "render");
        for (slot, it) in items.iter().enumerate() {
            info!(
                target: "engine",
                slot,
                id = %it.id,
                creator = %it.creator_id,
                published_at = %it.published_at.to_rfc3339(),
                title = %it.title,
                "slot"
            );
        }
    }
}

/// Sender half of the manual refresh event. Cheap to clone and hand to UI
/// code; requests coalesce while one is already pending.
#[derive(Debug, Clone)]
pub struct ManualRefresh {
    tx: mpsc::Sender<()>,
}

impl ManualRefresh {
    /// False once the engine side has gone away.
    pub fn request(&self) -> bool {
        match self.tx.try_send(()) {
            Ok(()) | Err(mpsc::error::TrySendError::Full(())) => true,
            Err(mpsc::error::TrySendError::Closed(())) => false,
        }
    }
}

pub fn manual_refresh_channel() -> (ManualRefresh, mpsc::Receiver<()>) {
    let (tx, rx) = mpsc::channel(1);
    (ManualRefresh { tx }, rx)
}
