use std::sync::Arc;

use shared::{domain::UserId, protocol::Profile};
use tracing::{debug, warn};

use crate::{
    error::{ClientError, Result},
    events::{EventHub, Route},
    gateway::BackendGateway,
    lifetime::Lifetime,
    session::Session,
    upload::ImageResource,
};

pub const NO_PROFILE_DESCRIPTION: &str = "This user has no description yet!";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileView {
    pub profile: Profile,
    pub is_own: bool,
}

impl ProfileView {
    pub fn description(&self) -> &str {
        match self.profile.description.as_deref() {
            Some(text) if !text.is_empty() => text,
            _ => NO_PROFILE_DESCRIPTION,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileImages {
    pub avatar: Option<ImageResource>,
    pub banner: Option<ImageResource>,
}

pub struct ProfileController {
    gateway: Arc<dyn BackendGateway>,
    session: Session,
    events: EventHub,
    lifetime: Lifetime,
}

impl ProfileController {
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
        }
    }

    /// Any failure sends the user back to the entry route.
    pub async fn load(&self, user_id: UserId) -> Result<ProfileView> {
        let fetched = self
            .lifetime
            .run(self.gateway.fetch_profile(user_id))
            .await
            .ok_or(ClientError::Cancelled)?;
        match fetched {
            Ok(profile) => {
                let is_own = self.session.user_id() == Some(profile.id);
                debug!(user_id = user_id.0, is_own, "profile: loaded");
                Ok(ProfileView { profile, is_own })
            }
            Err(err) => {
                warn!(user_id = user_id.0, %err, "profile: load failed");
                self.events.navigate(Route::Home);
                Err(err)
            }
        }
    }

    /// Avatar and banner are fetched together; a failed fetch shows the
    /// default image.
    pub async fn load_images(&self, user_id: UserId) -> Result<ProfileImages> {
        let (avatar, banner) = self
            .lifetime
            .run(async {
                futures::join!(
                    self.gateway.fetch_avatar(user_id),
                    self.gateway.fetch_banner(user_id)
                )
            })
            .await
            .ok_or(ClientError::Cancelled)?;
        Ok(ProfileImages {
            avatar: or_default_image(avatar, "avatar"),
            banner: or_default_image(banner, "banner"),
        })
    }

    pub fn dispose(&self) {
        self.lifetime.cancel();
    }
}

fn or_default_image(fetched: Result<Option<ImageResource>>, kind: &str) -> Option<ImageResource> {
    fetched.unwrap_or_else(|err| {
        warn!(kind, %err, "profile: image unavailable");
        None
    })
}

#[cfg(test)]
#[path = "tests/profile_tests.rs"]
mod tests;
