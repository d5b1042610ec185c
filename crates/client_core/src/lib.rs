//! Client-side controllers for the envshare backend.
//!
//! Every controller talks to the backend through [`BackendGateway`], reports
//! to the user through the [`EventHub`] and stops accepting results once its
//! [`Lifetime`] is cancelled.

use std::sync::Arc;

use shared::{
    domain::{EnvironmentId, UserId},
    protocol::Environment,
};

pub mod environment;
pub mod error;
pub mod events;
pub mod gateway;
pub mod interaction;
pub mod lifetime;
pub mod pagination;
pub mod profile;
pub mod prompt;
pub mod session;
pub mod settings;
pub mod tags;
pub mod two_factor;
pub mod upload;

pub use environment::{card_affordances, CardAffordances, CardContext, EnvironmentCard};
pub use error::{ClientError, Result, ValidationError};
pub use events::{ClientEvent, EventHub, Notice, NoticeId, NoticeLevel, Route};
pub use gateway::{BackendGateway, GatewayConfig, HttpGateway};
pub use interaction::{InteractionController, InteractionState};
pub use lifetime::Lifetime;
pub use pagination::{PageRequest, Pager, RulesetPager, SkipTake, UserRulesets};
pub use profile::{ProfileController, ProfileView};
pub use prompt::{Confirm, FixedAnswer};
pub use session::{CurrentUser, Session};
pub use settings::{SaveOutcome, SettingsController};
pub use tags::{TagSearch, TagSelection};
pub use two_factor::{TwoFactorController, TwoFactorState};
pub use upload::{ImageFile, ImageResource, ImageUploadController, UploadPolicy};

/// Shared handles every view needs. Each factory call hands out a
/// controller with its own lifetime.
#[derive(Clone)]
pub struct AppContext {
    gateway: Arc<dyn BackendGateway>,
    session: Session,
    events: EventHub,
    confirm: Arc<dyn Confirm>,
}

impl AppContext {
    pub fn new(gateway: Arc<dyn BackendGateway>, session: Session, confirm: Arc<dyn Confirm>) -> Self {
        Self {
            gateway,
            session,
            events: EventHub::new(),
            confirm,
        }
    }

    pub fn gateway(&self) -> &Arc<dyn BackendGateway> {
        &self.gateway
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn events(&self) -> &EventHub {
        &self.events
    }

    pub fn profile(&self) -> ProfileController {
        ProfileController::new(
            Arc::clone(&self.gateway),
            self.session.clone(),
            self.events.clone(),
            Lifetime::new(),
        )
    }

    pub fn settings(&self) -> SettingsController {
        SettingsController::new(
            Arc::clone(&self.gateway),
            self.session.clone(),
            self.events.clone(),
            Lifetime::new(),
        )
    }

    pub fn avatar(&self, user_id: UserId) -> ImageUploadController {
        ImageUploadController::avatar(
            user_id,
            Arc::clone(&self.gateway),
            self.events.clone(),
            Lifetime::new(),
        )
    }

    pub fn logo(&self, environment_id: EnvironmentId) -> ImageUploadController {
        ImageUploadController::logo(
            environment_id,
            Arc::clone(&self.gateway),
            self.events.clone(),
            Lifetime::new(),
        )
    }

    pub fn two_factor(&self) -> TwoFactorController {
        TwoFactorController::new(
            Arc::clone(&self.gateway),
            self.events.clone(),
            Lifetime::new(),
            Arc::clone(&self.confirm),
        )
    }

    pub fn rulesets(&self, user_id: UserId, request: PageRequest) -> RulesetPager {
        Pager::new(
            UserRulesets(user_id),
            request,
            Arc::clone(&self.gateway),
            self.events.clone(),
            Lifetime::new(),
        )
    }

    pub fn environment_card(&self, environment: Environment, context: CardContext) -> EnvironmentCard {
        let context = CardContext {
            viewer: context.viewer.or_else(|| self.session.user_id()),
            ..context
        };
        EnvironmentCard::new(
            environment,
            context,
            Arc::clone(&self.gateway),
            self.events.clone(),
            Arc::clone(&self.confirm),
        )
    }

    pub async fn delete_environment(&self, environment_id: EnvironmentId) -> Result<bool> {
        environment::delete_environment(
            environment_id,
            self.gateway.as_ref(),
            &self.events,
            &Lifetime::new(),
            self.confirm.as_ref(),
        )
        .await
    }

    pub fn tag_search(&self) -> TagSearch {
        TagSearch::new(Arc::clone(&self.gateway))
    }
}

#[cfg(test)]
#[path = "tests/support.rs"]
pub(crate) mod test_support;

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
