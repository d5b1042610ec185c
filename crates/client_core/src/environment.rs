//! Everything a single environment entry offers: like/save toggles, the
//! logo, deletion, and the presentation data a list renders.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use shared::{
    domain::{CardPlacement, CardView, EnvironmentId, InteractionKind, UserId},
    protocol::{Environment, Tag},
};
use tracing::{debug, info, warn};

use crate::{
    error::{ClientError, Result},
    events::{EventHub, NoticeLevel, Route},
    gateway::BackendGateway,
    interaction::{InteractionController, InteractionState},
    lifetime::Lifetime,
    prompt::Confirm,
    upload::ImageUploadController,
};

pub const TAG_PREVIEW_LIMIT: usize = 5;
pub const NO_DESCRIPTION: &str = "No description";
pub const DELETE_PROMPT: &str = "Are you sure you want to delete this environment?";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagSummary {
    pub shown: Vec<Tag>,
    pub hidden_count: usize,
    /// Names of the hidden tags joined by ", ".
    pub hidden_names: String,
}

impl TagSummary {
    pub fn new(tags: &[Tag]) -> Self {
        let split = tags.len().min(TAG_PREVIEW_LIMIT);
        let (shown, hidden) = tags.split_at(split);
        Self {
            shown: shown.to_vec(),
            hidden_count: hidden.len(),
            hidden_names: hidden
                .iter()
                .map(|tag| tag.name.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        }
    }

    /// `"+N more"`, or `None` when every tag is shown.
    pub fn overflow_label(&self) -> Option<String> {
        (self.hidden_count > 0).then(|| format!("+{} more", self.hidden_count))
    }
}

pub fn description_or_placeholder(description: Option<&str>) -> &str {
    match description {
        Some(text) if !text.is_empty() => text,
        _ => NO_DESCRIPTION,
    }
}

pub fn relative_age(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let seconds = (now - then).num_seconds();
    let distance = humanize_seconds(seconds.unsigned_abs());
    if seconds >= 0 {
        format!("{distance} ago")
    } else {
        format!("in {distance}")
    }
}

fn humanize_seconds(seconds: u64) -> String {
    const MINUTES_PER_DAY: u64 = 60 * 24;
    const MINUTES_PER_MONTH: u64 = MINUTES_PER_DAY * 30;

    let minutes = (seconds + 30) / 60;
    let plural = |n: u64, unit: &str| {
        if n == 1 {
            format!("1 {unit}")
        } else {
            format!("{n} {unit}s")
        }
    };

    if seconds < 30 {
        "less than a minute".to_string()
    } else if minutes < 45 {
        plural(minutes.max(1), "minute")
    } else if minutes < 90 {
        "about 1 hour".to_string()
    } else if minutes < MINUTES_PER_DAY {
        format!("about {}", plural((minutes + 30) / 60, "hour"))
    } else if minutes < 42 * 60 {
        "1 day".to_string()
    } else if minutes < MINUTES_PER_MONTH {
        plural((minutes + MINUTES_PER_DAY / 2) / MINUTES_PER_DAY, "day")
    } else if minutes < 2 * MINUTES_PER_MONTH {
        let months = (minutes + MINUTES_PER_MONTH / 2) / MINUTES_PER_MONTH;
        format!("about {}", plural(months, "month"))
    } else {
        let months = (minutes + MINUTES_PER_MONTH / 2) / MINUTES_PER_MONTH;
        if months < 12 {
            return plural(months, "month");
        }
        let years = months / 12;
        match months % 12 {
            0..=2 => format!("about {}", plural(years, "year")),
            3..=8 => format!("over {}", plural(years, "year")),
            _ => format!("almost {}", plural(years + 1, "year")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timestamps {
    pub created: String,
    /// Only present when the entity was changed after creation.
    pub updated: Option<String>,
}

impl Timestamps {
    pub fn new(created_at: DateTime<Utc>, updated_at: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        Self {
            created: relative_age(created_at, now),
            updated: (updated_at != created_at).then(|| relative_age(updated_at, now)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CardContext {
    pub view: CardView,
    pub placement: CardPlacement,
    pub viewer: Option<UserId>,
    /// The surrounding list lets the owner open an editor.
    pub editing_enabled: bool,
    pub can_change_logo: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CardAffordances {
    pub title_links_to_details: bool,
    pub apply_toggle: bool,
    pub like: bool,
    pub save: bool,
    pub edit: bool,
    pub delete: bool,
    pub change_logo: bool,
}

pub fn card_affordances(context: &CardContext, owner: UserId, is_saved: bool) -> CardAffordances {
    match context.view {
        CardView::Normal => {
            let manage = context.editing_enabled && context.viewer == Some(owner);
            CardAffordances {
                title_links_to_details: context.placement == CardPlacement::Profile,
                apply_toggle: context.placement == CardPlacement::Saved,
                like: true,
                save: true,
                edit: manage,
                delete: manage,
                change_logo: context.can_change_logo,
            }
        }
        CardView::Compact => CardAffordances {
            title_links_to_details: true,
            apply_toggle: false,
            like: true,
            save: context.placement != CardPlacement::Saved
                && !is_saved
                && context.viewer.is_some(),
            edit: false,
            delete: false,
            change_logo: false,
        },
    }
}

pub struct EnvironmentCard {
    environment: Environment,
    context: CardContext,
    like: Arc<InteractionController>,
    save: Arc<InteractionController>,
    logo: ImageUploadController,
    gateway: Arc<dyn BackendGateway>,
    events: EventHub,
    lifetime: Lifetime,
    confirm: Arc<dyn Confirm>,
}

impl EnvironmentCard {
    pub fn new(
        environment: Environment,
        context: CardContext,
        gateway: Arc<dyn BackendGateway>,
        events: EventHub,
        confirm: Arc<dyn Confirm>,
    ) -> Self {
        let id = environment.id;
        let like = InteractionController::new(
            id,
            InteractionKind::Like,
            InteractionState::new(environment.is_liked, environment.likes),
            Arc::clone(&gateway),
            events.clone(),
            Lifetime::new(),
        );
        let save = InteractionController::new(
            id,
            InteractionKind::Save,
            InteractionState::new(environment.is_saved, environment.saves),
            Arc::clone(&gateway),
            events.clone(),
            Lifetime::new(),
        );
        let logo =
            ImageUploadController::logo(id, Arc::clone(&gateway), events.clone(), Lifetime::new());
        Self {
            environment,
            context,
            like,
            save,
            logo,
            gateway,
            events,
            lifetime: Lifetime::new(),
            confirm,
        }
    }

    pub fn id(&self) -> EnvironmentId {
        self.environment.id
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    pub fn like(&self) -> &Arc<InteractionController> {
        &self.like
    }

    pub fn save(&self) -> &Arc<InteractionController> {
        &self.save
    }

    pub fn logo(&self) -> &ImageUploadController {
        &self.logo
    }

    /// Uses the live save state, so a compact card hides its save button
    /// once the viewer saved the entry.
    pub fn affordances(&self) -> CardAffordances {
        card_affordances(
            &self.context,
            self.environment.user.id,
            self.save.state().active,
        )
    }

    pub fn tag_summary(&self) -> TagSummary {
        TagSummary::new(&self.environment.tags)
    }

    pub fn description(&self) -> &str {
        description_or_placeholder(self.environment.description.as_deref())
    }

    pub fn timestamps(&self, now: DateTime<Utc>) -> Timestamps {
        Timestamps::new(self.environment.created_at, self.environment.updated_at, now)
    }

    pub async fn delete(&self) -> Result<bool> {
        delete_environment(
            self.id(),
            self.gateway.as_ref(),
            &self.events,
            &self.lifetime,
            self.confirm.as_ref(),
        )
        .await
    }

    pub fn dispose(&self) {
        self.like.dispose();
        self.save.dispose();
        self.logo.dispose();
        self.lifetime.cancel();
    }
}

/// Asks for confirmation, deletes, and on success leaves for the entry route.
pub async fn delete_environment(
    environment_id: EnvironmentId,
    gateway: &dyn BackendGateway,
    events: &EventHub,
    lifetime: &Lifetime,
    confirm: &dyn Confirm,
) -> Result<bool> {
    if !confirm.confirm(DELETE_PROMPT) {
        debug!(environment_id = environment_id.0, "environment: delete declined");
        return Ok(false);
    }

    let notice = events.loading("Deleting environment...");
    match lifetime.run(gateway.delete_environment(environment_id)).await {
        Some(Ok(())) => {
            info!(environment_id = environment_id.0, "environment: deleted");
            events.resolve(Some(notice), NoticeLevel::Success, "Environment deleted");
            events.navigate(Route::Home);
            Ok(true)
        }
        Some(Err(err)) => {
            warn!(environment_id = environment_id.0, %err, "environment: delete failed");
            events.resolve(Some(notice), NoticeLevel::Error, "Something went wrong");
            Err(err)
        }
        None => {
            events.dismiss(notice);
            Err(ClientError::Cancelled)
        }
    }
}

#[cfg(test)]
#[path = "tests/environment_tests.rs"]
mod tests;
