use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::tui::AppEvent;

/// Minimum whitespace-delimited tokens before a selection is worth querying.
pub const MIN_SELECTION_TOKENS: usize = 3;

/// Pause between the end of a selection gesture and delivery of the text
/// captured at that moment.
pub const SETTLE_DELAY: Duration = Duration::from_millis(100);

/// Where the watcher reads the current selection from.
pub trait SelectionSource: Send + 'static {
    fn selection_text(&self) -> Option<String>;
}

/// Shared snapshot of the reader's current selection. The app writes it on
/// every selection change; the watcher reads it at gesture end.
#[derive(Clone, Default)]
pub struct SelectionSnapshot {
    text: Arc<Mutex<Option<String>>>,
}

impl SelectionSnapshot {
    pub fn set(&self, text: String) {
        if let Ok(mut slot) = self.text.lock() {
            *slot = Some(text);
        }
    }

    pub fn clear(&self) {
        if let Ok(mut slot) = self.text.lock() {
            *slot = None;
        }
    }
}

impl SelectionSource for SelectionSnapshot {
    fn selection_text(&self) -> Option<String> {
        self.text.lock().ok()?.clone()
    }
}

/// Watches for meaningful selections and reports them on the app event
/// channel. `activate` spawns the delivery task; dropping the watcher (or
/// calling `deactivate`) aborts it, so nothing outlives the owning shell.
pub struct SelectionWatcher {
    source: Box<dyn SelectionSource>,
    pending: mpsc::UnboundedSender<String>,
    task: JoinHandle<()>,
}

impl SelectionWatcher {
    pub fn activate(
        source: impl SelectionSource,
        events: mpsc::UnboundedSender<AppEvent>,
    ) -> Self {
        let (pending, mut queued) = mpsc::unbounded_channel::<String>();
        let task = tokio::spawn(async move {
            while let Some(text) = queued.recv().await {
                tokio::time::sleep(SETTLE_DELAY).await;
                if events.send(AppEvent::Selection(text)).is_err() {
                    break;
                }
            }
        });
        Self {
            source: Box::new(source),
            pending,
            task,
        }
    }

    /// Report the end of a selection gesture (mouse release, selection key).
    /// Reads the selection as of this call; at most one delivery is queued
    /// per gesture, and selections below the token threshold are dropped.
    pub fn gesture_end(&self) {
        let Some(text) = self.source.selection_text() else {
            return;
        };
        let text = text.trim();
        if text.is_empty() || text.split_whitespace().count() < MIN_SELECTION_TOKENS {
            return;
        }
        let _ = self.pending.send(text.to_string());
    }

    #[allow(dead_code)]
    pub fn deactivate(self) {
        self.task.abort();
    }
}

impl Drop for SelectionWatcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}
