use lib_nest::{Bridge, Reading};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Everything the HTTP handlers share. Cheap to clone; all fields are handles.
#[derive(Clone)]
pub struct AppState {
    /// Latest payload and the active push connection.
    pub bridge: Arc<Bridge>,
    /// Producer side of the inbound reading channel.
    pub readings_tx: mpsc::Sender<Reading>,
    /// JSON-lines log file rendered by the log page.
    pub log_file: Arc<PathBuf>,
    /// Show only the last N log records when set.
    pub log_page_limit: Option<usize>,
}

impl AppState {
    pub fn new(
        bridge: Arc<Bridge>,
        readings_tx: mpsc::Sender<Reading>,
        log_file: PathBuf,
        log_page_limit: Option<usize>,
    ) -> Self {
        Self {
            bridge,
            readings_tx,
            log_file: Arc::new(log_file),
            log_page_limit,
        }
    }
}
