use std::sync::{Arc, Mutex, PoisonError};

use shared::protocol::Settings;
use tracing::{debug, info, warn};

use crate::{
    error::{ClientError, Result, ValidationError},
    events::{EventHub, NoticeLevel},
    gateway::BackendGateway,
    lifetime::Lifetime,
    session::Session,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    Unchanged,
    Saved(Settings),
}

pub struct SettingsController {
    gateway: Arc<dyn BackendGateway>,
    session: Session,
    events: EventHub,
    lifetime: Lifetime,
    baseline: Mutex<Option<Settings>>,
}

impl SettingsController {
    pub fn new(
        gateway: Arc<dyn BackendGateway>,
        session: Session,
        events: EventHub,
        lifetime: Lifetime,
    ) -> Self {
        Self {
            gateway,
            session,
            events,
            lifetime,
            baseline: Mutex::new(None),
        }
    }

    pub fn baseline(&self) -> Option<Settings> {
        self.baseline
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_baseline(&self, settings: Settings) {
        self.session.rename(&settings.username);
        *self.baseline.lock().unwrap_or_else(PoisonError::into_inner) = Some(settings);
    }

    pub async fn load(&self) -> Result<Settings> {
        let fetched = self
            .lifetime
            .run(self.gateway.fetch_settings())
            .await
            .ok_or(ClientError::Cancelled)?;
        match fetched {
            Ok(settings) => {
                debug!(username = %settings.username, "settings: loaded baseline");
                self.set_baseline(settings.clone());
                Ok(settings)
            }
            Err(err) => {
                self.events.surface(None, &err, "Failed to load settings");
                Err(err)
            }
        }
    }

    /// The caller keeps ownership of the draft, so a failed save leaves the
    /// user's edits intact for a retry.
    pub async fn save(&self, draft: &Settings) -> Result<SaveOutcome> {
        if let Err(err) = validate(draft) {
            self.events.error(err.to_string());
            return Err(err.into());
        }
        if self.baseline().is_some_and(|baseline| same_settings(&baseline, draft)) {
            debug!("settings: unchanged, skipping update");
            return Ok(SaveOutcome::Unchanged);
        }

        let notice = self.events.loading("Updating...");
        let sent = self.lifetime.run(self.gateway.update_settings(draft)).await;
        match sent {
            Some(Ok(())) => {
                info!(username = %draft.username, "settings: saved");
                self.events
                    .resolve(Some(notice), NoticeLevel::Success, "Settings saved!");
            }
            Some(Err(err)) => {
                warn!(%err, "settings: update failed");
                self.events
                    .surface(Some(notice), &err, "Failed to save settings!");
                return Err(err);
            }
            None => {
                self.events.dismiss(notice);
                return Err(ClientError::Cancelled);
            }
        }

        let canonical = match self.load().await {
            Ok(settings) => settings,
            Err(ClientError::Cancelled) => return Err(ClientError::Cancelled),
            Err(_) => {
                self.set_baseline(draft.clone());
                draft.clone()
            }
        };
        Ok(SaveOutcome::Saved(canonical))
    }

    pub fn dispose(&self) {
        self.lifetime.cancel();
    }
}

fn validate(draft: &Settings) -> Result<(), ValidationError> {
    if draft.username.trim().is_empty() {
        return Err(ValidationError::EmptyField("Username"));
    }
    if draft.description.trim().is_empty() {
        return Err(ValidationError::EmptyField("Description"));
    }
    Ok(())
}

// Surrounding whitespace alone is not an edit.
fn same_settings(baseline: &Settings, draft: &Settings) -> bool {
    baseline.username.trim() == draft.username.trim()
        && baseline.description.trim() == draft.description.trim()
}

#[cfg(test)]
#[path = "tests/settings_tests.rs"]
mod tests;
