use tracing::{error, info};

use crate::error::{Result, TrackerError};
use crate::models::Alert;
use crate::store::TrackerStore;

/// Appends a broadcast to the shuttle's alert log. Blank messages are
/// rejected before anything is written.
pub async fn publish_alert(
    store: &dyn TrackerStore,
    shuttle_id: &str,
    shuttle_name: &str,
    message: &str,
) -> Result<Alert> {
    let message = message.trim();
    if message.is_empty() {
        return Err(TrackerError::validation("Please enter an alert message."));
    }

    let alert = store
        .append_alert(shuttle_id, message, shuttle_name)
        .await
        .map_err(|e| {
            error!("Error sending alert for {}: {}", shuttle_id, e);
            e
        })?;
    info!("Alert {} sent for shuttle {}", alert.alert_id, shuttle_id);
    Ok(alert)
}

/// The driver's alert input box.
#[derive(Debug, Default)]
pub struct AlertComposer {
    draft: String,
}

impl AlertComposer {
    pub fn set_draft(&mut self, text: impl Into<String>) {
        self.draft = text.into();
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    /// Publishes the draft and clears it once the store has accepted it.
    pub async fn send(
        &mut self,
        store: &dyn TrackerStore,
        shuttle_id: &str,
        shuttle_name: &str,
    ) -> Result<Alert> {
        let alert = publish_alert(store, shuttle_id, shuttle_name, &self.draft).await?;
        self.draft.clear();
        Ok(alert)
    }
}
