//! In-memory gateway used by the controller tests.

use std::{
    collections::{HashMap, VecDeque},
    sync::{Mutex, PoisonError},
    time::Duration,
};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use shared::{
    domain::{EnvironmentId, InteractionKind, RulesetId, TagId, UserId},
    protocol::{
        EnableTwoFactorRequest, Environment, NewRuleset, Paginated, Profile, Ruleset, Settings,
        Tag, TwoFactorProvisioning, TwoFactorStatus, UserSummary,
    },
};
use tokio::sync::{broadcast, watch, Semaphore};

use crate::{
    error::{ClientError, Result},
    events::ClientEvent,
    gateway::BackendGateway,
    pagination::SkipTake,
    upload::{ImageResource, ImageUpload},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    FetchProfile(UserId),
    FetchSettings,
    UpdateSettings(Settings),
    FetchAvatar(UserId),
    UploadAvatar(ImageUpload),
    FetchBanner(UserId),
    FetchLogo(EnvironmentId),
    UploadLogo(EnvironmentId, ImageUpload),
    SetInteraction(EnvironmentId, InteractionKind, bool),
    DeleteEnvironment(EnvironmentId),
    ListUserEnvironments(UserId, SkipTake),
    ListSavedEnvironments(SkipTake),
    ListUserRulesets(UserId, SkipTake),
    CreateRuleset(NewRuleset),
    TwoFactorStatus,
    TwoFactorProvisioning,
    EnableTwoFactor(EnableTwoFactorRequest),
    DisableTwoFactor,
    SearchTags(String),
}

impl Call {
    fn endpoint(&self) -> Endpoint {
        match self {
            Self::FetchProfile(_) => Endpoint::FetchProfile,
            Self::FetchSettings => Endpoint::FetchSettings,
            Self::UpdateSettings(_) => Endpoint::UpdateSettings,
            Self::FetchAvatar(_) => Endpoint::FetchAvatar,
            Self::UploadAvatar(_) => Endpoint::UploadAvatar,
            Self::FetchBanner(_) => Endpoint::FetchBanner,
            Self::FetchLogo(_) => Endpoint::FetchLogo,
            Self::UploadLogo(..) => Endpoint::UploadLogo,
            Self::SetInteraction(..) => Endpoint::SetInteraction,
            Self::DeleteEnvironment(_) => Endpoint::DeleteEnvironment,
            Self::ListUserEnvironments(..) => Endpoint::ListUserEnvironments,
            Self::ListSavedEnvironments(_) => Endpoint::ListSavedEnvironments,
            Self::ListUserRulesets(..) => Endpoint::ListUserRulesets,
            Self::CreateRuleset(_) => Endpoint::CreateRuleset,
            Self::TwoFactorStatus => Endpoint::TwoFactorStatus,
            Self::TwoFactorProvisioning => Endpoint::TwoFactorProvisioning,
            Self::EnableTwoFactor(_) => Endpoint::EnableTwoFactor,
            Self::DisableTwoFactor => Endpoint::DisableTwoFactor,
            Self::SearchTags(_) => Endpoint::SearchTags,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    FetchProfile,
    FetchSettings,
    UpdateSettings,
    FetchAvatar,
    UploadAvatar,
    FetchBanner,
    FetchLogo,
    UploadLogo,
    SetInteraction,
    DeleteEnvironment,
    ListUserEnvironments,
    ListSavedEnvironments,
    ListUserRulesets,
    CreateRuleset,
    TwoFactorStatus,
    TwoFactorProvisioning,
    EnableTwoFactor,
    DisableTwoFactor,
    SearchTags,
}

#[derive(Debug, Clone)]
pub enum Reply {
    Done,
    Profile(Profile),
    Settings(Settings),
    Image(Option<ImageResource>),
    Environments(Paginated<Environment>),
    Rulesets(Paginated<Ruleset>),
    Ruleset(Ruleset),
    Status(TwoFactorStatus),
    Provisioning(TwoFactorProvisioning),
    Tags(Vec<Tag>),
    Fail(ClientError),
}

/// Records every call and answers from per-endpoint reply queues. Calls to
/// an endpoint with an empty queue succeed when they return nothing and fail
/// otherwise.
///
/// A gated gateway holds each call until the test releases a permit, which
/// is how tests observe state while requests are in flight.
pub struct ScriptedGateway {
    calls: Mutex<Vec<Call>>,
    call_count: watch::Sender<usize>,
    replies: Mutex<HashMap<Endpoint, VecDeque<Reply>>>,
    gate: Option<Semaphore>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        let (call_count, _) = watch::channel(0);
        Self {
            calls: Mutex::new(Vec::new()),
            call_count,
            replies: Mutex::new(HashMap::new()),
            gate: None,
        }
    }

    pub fn gated() -> Self {
        Self {
            gate: Some(Semaphore::new(0)),
            ..Self::new()
        }
    }

    pub fn reply(&self, endpoint: Endpoint, reply: Reply) -> &Self {
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(endpoint)
            .or_default()
            .push_back(reply);
        self
    }

    pub fn fail(&self, endpoint: Endpoint, err: ClientError) -> &Self {
        self.reply(endpoint, Reply::Fail(err))
    }

    /// Lets `n` held calls complete.
    pub fn release(&self, n: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(n);
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn calls_to(&self, endpoint: Endpoint) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|call| call.endpoint() == endpoint)
            .collect()
    }

    /// Waits until at least `n` calls were made.
    pub async fn wait_for_calls(&self, n: usize) {
        let mut rx = self.call_count.subscribe();
        let reached = rx.wait_for(|count| *count >= n);
        tokio::time::timeout(Duration::from_secs(5), reached)
            .await
            .expect("timed out waiting for gateway calls")
            .expect("call counter closed");
    }

    async fn answer(&self, call: Call) -> Option<Reply> {
        let endpoint = call.endpoint();
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
        self.call_count.send_modify(|count| *count += 1);
        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate closed").forget();
        }
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(&endpoint)
            .and_then(VecDeque::pop_front)
    }

    async fn unit(&self, call: Call) -> Result<()> {
        match self.answer(call).await {
            None | Some(Reply::Done) => Ok(()),
            Some(Reply::Fail(err)) => Err(err),
            Some(other) => panic!("unexpected reply for unit call: {other:?}"),
        }
    }

    async fn value<T>(&self, call: Call, pick: impl FnOnce(Reply) -> Option<T>) -> Result<T> {
        let endpoint = call.endpoint();
        match self.answer(call).await {
            None => Err(ClientError::request(None, format!("unscripted {endpoint:?}"))),
            Some(Reply::Fail(err)) => Err(err),
            Some(reply) => {
                Ok(pick(reply).unwrap_or_else(|| panic!("wrong reply kind for {endpoint:?}")))
            }
        }
    }
}

#[async_trait]
impl BackendGateway for ScriptedGateway {
    async fn fetch_profile(&self, user_id: UserId) -> Result<Profile> {
        self.value(Call::FetchProfile(user_id), |reply| match reply {
            Reply::Profile(profile) => Some(profile),
            _ => None,
        })
        .await
    }

    async fn fetch_settings(&self) -> Result<Settings> {
        self.value(Call::FetchSettings, |reply| match reply {
            Reply::Settings(settings) => Some(settings),
            _ => None,
        })
        .await
    }

    async fn update_settings(&self, settings: &Settings) -> Result<()> {
        self.unit(Call::UpdateSettings(settings.clone())).await
    }

    async fn fetch_avatar(&self, user_id: UserId) -> Result<Option<ImageResource>> {
        self.value(Call::FetchAvatar(user_id), image_reply).await
    }

    async fn upload_avatar(&self, upload: ImageUpload) -> Result<()> {
        self.unit(Call::UploadAvatar(upload)).await
    }

    async fn fetch_banner(&self, user_id: UserId) -> Result<Option<ImageResource>> {
        self.value(Call::FetchBanner(user_id), image_reply).await
    }

    async fn fetch_logo(&self, environment_id: EnvironmentId) -> Result<Option<ImageResource>> {
        self.value(Call::FetchLogo(environment_id), image_reply)
            .await
    }

    async fn upload_logo(&self, environment_id: EnvironmentId, upload: ImageUpload) -> Result<()> {
        self.unit(Call::UploadLogo(environment_id, upload)).await
    }

    async fn set_interaction(
        &self,
        environment_id: EnvironmentId,
        kind: InteractionKind,
        active: bool,
    ) -> Result<()> {
        self.unit(Call::SetInteraction(environment_id, kind, active))
            .await
    }

    async fn delete_environment(&self, environment_id: EnvironmentId) -> Result<()> {
        self.unit(Call::DeleteEnvironment(environment_id)).await
    }

    async fn list_user_environments(
        &self,
        user_id: UserId,
        window: SkipTake,
    ) -> Result<Paginated<Environment>> {
        self.value(Call::ListUserEnvironments(user_id, window), environments_reply)
            .await
    }

    async fn list_saved_environments(&self, window: SkipTake) -> Result<Paginated<Environment>> {
        self.value(Call::ListSavedEnvironments(window), environments_reply)
            .await
    }

    async fn list_user_rulesets(
        &self,
        user_id: UserId,
        window: SkipTake,
    ) -> Result<Paginated<Ruleset>> {
        self.value(Call::ListUserRulesets(user_id, window), |reply| match reply {
            Reply::Rulesets(page) => Some(page),
            _ => None,
        })
        .await
    }

    async fn create_ruleset(&self, ruleset: &NewRuleset) -> Result<Ruleset> {
        self.value(Call::CreateRuleset(ruleset.clone()), |reply| match reply {
            Reply::Ruleset(ruleset) => Some(ruleset),
            _ => None,
        })
        .await
    }

    async fn two_factor_status(&self) -> Result<TwoFactorStatus> {
        self.value(Call::TwoFactorStatus, |reply| match reply {
            Reply::Status(status) => Some(status),
            _ => None,
        })
        .await
    }

    async fn two_factor_provisioning(&self) -> Result<TwoFactorProvisioning> {
        self.value(Call::TwoFactorProvisioning, |reply| match reply {
            Reply::Provisioning(provisioning) => Some(provisioning),
            _ => None,
        })
        .await
    }

    async fn enable_two_factor(&self, request: &EnableTwoFactorRequest) -> Result<()> {
        self.unit(Call::EnableTwoFactor(request.clone())).await
    }

    async fn disable_two_factor(&self) -> Result<()> {
        self.unit(Call::DisableTwoFactor).await
    }

    async fn search_tags(&self, prefix: &str) -> Result<Vec<Tag>> {
        self.value(Call::SearchTags(prefix.to_string()), |reply| match reply {
            Reply::Tags(tags) => Some(tags),
            _ => None,
        })
        .await
    }
}

fn image_reply(reply: Reply) -> Option<Option<ImageResource>> {
    match reply {
        Reply::Image(image) => Some(image),
        _ => None,
    }
}

fn environments_reply(reply: Reply) -> Option<Paginated<Environment>> {
    match reply {
        Reply::Environments(page) => Some(page),
        _ => None,
    }
}

pub fn server_error() -> ClientError {
    ClientError::request(Some(500), "internal error")
}

pub fn drain(rx: &mut broadcast::Receiver<ClientEvent>) -> Vec<ClientEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

pub fn tag(id: i64, name: &str) -> Tag {
    Tag {
        id: TagId(id),
        name: name.to_string(),
    }
}

pub fn environment(id: i64, owner: i64) -> Environment {
    let created_at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
    Environment {
        id: EnvironmentId(id),
        name: format!("env-{id}"),
        description: None,
        tags: Vec::new(),
        user: UserSummary {
            id: UserId(owner),
            username: format!("user-{owner}"),
        },
        likes: 4,
        saves: 2,
        is_liked: false,
        is_saved: false,
        created_at,
        updated_at: created_at,
    }
}

pub fn ruleset(id: i64, name: &str) -> Ruleset {
    let created_at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
    Ruleset {
        id: RulesetId(id),
        name: name.to_string(),
        description: None,
        user: None,
        created_at,
        updated_at: created_at,
    }
}
