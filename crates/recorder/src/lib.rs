pub mod attach;
pub mod cdp;
pub mod correlator;
pub mod debugger;
pub mod discovery;
pub mod pump;
pub mod recorder;
pub mod registry;

#[cfg(test)]
mod fake;

pub use attach::AttachmentManager;
pub use cdp::{CdpClient, CdpEvent};
pub use correlator::{NetworkEvent, PendingRecord, PendingState};
pub use debugger::{CdpDebugger, Debugger, SessionLookup};
pub use discovery::{browser_ws_url, list_tabs, TabInfo};
pub use pump::EventPump;
pub use recorder::{Recorder, StartOutcome};
pub use registry::{RecordingSession, SessionRegistry};

use skillsmith_core::{Error, Result};
use std::sync::Arc;

/// Connect to the browser at `endpoint` (the DevTools HTTP address).
pub async fn connect(endpoint: &str) -> Result<Arc<CdpDebugger>> {
    let ws_url = browser_ws_url(endpoint).await.map_err(Error::Attachment)?;
    let client = CdpClient::connect(&ws_url).await.map_err(Error::Attachment)?;
    Ok(Arc::new(CdpDebugger::new(Arc::new(client))))
}
