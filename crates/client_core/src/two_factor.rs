//! Two-factor enrollment.
//!
//! ```text
//! Unknown --mount--> Enabled
//! Unknown --mount--> Disabled --enter code--> Enrolling --submit 6 digits--> Enabled
//! Enabled --confirmed disable--> Disabled
//! ```

use std::sync::Arc;

use shared::protocol::EnableTwoFactorRequest;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    error::{ClientError, Result},
    events::EventHub,
    gateway::BackendGateway,
    lifetime::Lifetime,
    prompt::Confirm,
};

pub const CODE_LENGTH: usize = 6;
pub const DISABLE_PROMPT: &str = "Are you sure you want to disable 2FA?";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provisioning {
    /// Full `otpauth://` URI; this is what the QR code encodes.
    pub otpauth_uri: String,
    pub secret: String,
}

impl Provisioning {
    pub fn parse(otpauth_uri: &str) -> Result<Self> {
        let parsed = Url::parse(otpauth_uri).map_err(|err| {
            ClientError::request(None, format!("invalid provisioning uri: {err}"))
        })?;
        let secret = parsed
            .query_pairs()
            .find(|(key, _)| key == "secret")
            .map(|(_, value)| value.into_owned())
            .filter(|value| !value.is_empty())
            .ok_or_else(|| ClientError::request(None, "provisioning uri has no secret"))?;
        Ok(Self {
            otpauth_uri: otpauth_uri.to_string(),
            secret,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TwoFactorState {
    Unknown,
    /// `provisioning` is `None` when fetching it failed.
    Disabled { provisioning: Option<Provisioning> },
    Enrolling {
        provisioning: Provisioning,
        code: String,
    },
    Enabled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TwoFactorSnapshot {
    pub state: TwoFactorState,
    pub submitting: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TwoFactorStep {
    Ignored,
    Moved(TwoFactorState),
}

pub struct TwoFactorController {
    gateway: Arc<dyn BackendGateway>,
    events: EventHub,
    lifetime: Lifetime,
    confirm: Arc<dyn Confirm>,
    snapshot: watch::Sender<TwoFactorSnapshot>,
}

impl TwoFactorController {
    pub fn new(
        gateway: Arc<dyn BackendGateway>,
        events: EventHub,
        lifetime: Lifetime,
        confirm: Arc<dyn Confirm>,
    ) -> Self {
        let (snapshot, _) = watch::channel(TwoFactorSnapshot {
            state: TwoFactorState::Unknown,
            submitting: false,
        });
        Self {
            gateway,
            events,
            lifetime,
            confirm,
            snapshot,
        }
    }

    pub fn state(&self) -> TwoFactorState {
        self.snapshot.borrow().state.clone()
    }

    pub fn snapshot(&self) -> TwoFactorSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<TwoFactorSnapshot> {
        self.snapshot.subscribe()
    }

    fn set_state(&self, state: TwoFactorState) {
        self.snapshot.send_modify(|snapshot| snapshot.state = state);
    }

    fn set_submitting(&self, submitting: bool) {
        self.snapshot
            .send_modify(|snapshot| snapshot.submitting = submitting);
    }

    pub async fn mount(&self) -> Result<TwoFactorState> {
        let status = self
            .lifetime
            .run(self.gateway.two_factor_status())
            .await
            .ok_or(ClientError::Cancelled)?;
        let status = match status {
            Ok(status) => status,
            Err(err) => {
                self.events
                    .surface(None, &err, "Failed to load 2FA status");
                return Err(err);
            }
        };

        let state = if status.enabled {
            TwoFactorState::Enabled
        } else {
            TwoFactorState::Disabled {
                provisioning: self.provision().await?,
            }
        };
        debug!(?state, "two_factor: mounted");
        self.set_state(state.clone());
        Ok(state)
    }

    async fn provision(&self) -> Result<Option<Provisioning>> {
        let fetched = self
            .lifetime
            .run(self.gateway.two_factor_provisioning())
            .await
            .ok_or(ClientError::Cancelled)?;
        match fetched.and_then(|p| Provisioning::parse(&p.url)) {
            Ok(provisioning) => Ok(Some(provisioning)),
            Err(err) => {
                warn!(%err, "two_factor: provisioning unavailable");
                self.events
                    .surface(None, &err, "Failed to load 2FA QR code");
                Ok(None)
            }
        }
    }

    /// Records the code typed so far. Only ASCII digits count, up to six.
    pub fn enter_code(&self, raw: &str) -> TwoFactorState {
        let code: String = raw
            .chars()
            .filter(char::is_ascii_digit)
            .take(CODE_LENGTH)
            .collect();
        let next = match self.state() {
            TwoFactorState::Disabled {
                provisioning: Some(provisioning),
            }
            | TwoFactorState::Enrolling { provisioning, .. } => {
                if code.is_empty() {
                    TwoFactorState::Disabled {
                        provisioning: Some(provisioning),
                    }
                } else {
                    TwoFactorState::Enrolling { provisioning, code }
                }
            }
            other => return other,
        };
        self.set_state(next.clone());
        next
    }

    pub async fn submit(&self) -> Result<TwoFactorStep> {
        let snapshot = self.snapshot();
        if snapshot.submitting {
            return Ok(TwoFactorStep::Ignored);
        }
        let TwoFactorState::Enrolling { provisioning, code } = snapshot.state else {
            return Ok(TwoFactorStep::Ignored);
        };
        if code.len() != CODE_LENGTH {
            return Ok(TwoFactorStep::Ignored);
        }

        self.set_submitting(true);
        let request = EnableTwoFactorRequest {
            secret: provisioning.secret,
            code,
        };
        let sent = self
            .lifetime
            .run(self.gateway.enable_two_factor(&request))
            .await;
        self.set_submitting(false);

        match sent {
            Some(Ok(())) => {
                info!("two_factor: enabled");
                self.set_state(TwoFactorState::Enabled);
                Ok(TwoFactorStep::Moved(TwoFactorState::Enabled))
            }
            Some(Err(err)) => {
                warn!(%err, "two_factor: enable rejected");
                self.events.surface(None, &err, "Failed to enable 2FA");
                Err(err)
            }
            None => Err(ClientError::Cancelled),
        }
    }

    /// Turns 2FA off after the user confirms, then fetches fresh provisioning
    /// so enrollment can start again.
    pub async fn disable(&self) -> Result<TwoFactorStep> {
        let snapshot = self.snapshot();
        if snapshot.submitting || snapshot.state != TwoFactorState::Enabled {
            return Ok(TwoFactorStep::Ignored);
        }
        if !self.confirm.confirm(DISABLE_PROMPT) {
            debug!("two_factor: disable declined");
            return Ok(TwoFactorStep::Ignored);
        }

        self.set_submitting(true);
        let sent = self.lifetime.run(self.gateway.disable_two_factor()).await;
        self.set_submitting(false);

        match sent {
            Some(Ok(())) => {
                info!("two_factor: disabled");
                let state = TwoFactorState::Disabled {
                    provisioning: self.provision().await?,
                };
                self.set_state(state.clone());
                Ok(TwoFactorStep::Moved(state))
            }
            Some(Err(err)) => {
                warn!(%err, "two_factor: disable rejected");
                self.events.surface(None, &err, "Failed to disable 2FA");
                Err(err)
            }
            None => Err(ClientError::Cancelled),
        }
    }

    pub fn dispose(&self) {
        self.lifetime.cancel();
    }
}

#[cfg(test)]
#[path = "tests/two_factor_tests.rs"]
mod tests;
