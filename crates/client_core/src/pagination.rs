//! Page/per-page listing over skip/take endpoints.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use async_trait::async_trait;
use serde::Serialize;
use shared::{
    domain::UserId,
    protocol::{Environment, NewRuleset, Paginated, Ruleset},
};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::{
    error::{ClientError, Result, ValidationError},
    events::{EventHub, NoticeLevel},
    gateway::BackendGateway,
    lifetime::Lifetime,
};

pub const DEFAULT_PER_PAGE: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SkipTake {
    pub skip: u64,
    pub take: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    page: u32,
    per_page: u32,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(1, DEFAULT_PER_PAGE)
    }
}

impl PageRequest {
    /// Page numbers are 1-based; zero for either value is treated as one.
    pub fn new(page: u32, per_page: u32) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.max(1),
        }
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn per_page(&self) -> u32 {
        self.per_page
    }

    pub fn skip_take(&self) -> SkipTake {
        SkipTake {
            skip: u64::from(self.page - 1) * u64::from(self.per_page),
            take: self.per_page,
        }
    }

    pub fn total_pages(&self, count: u64) -> u64 {
        total_pages(count, self.per_page)
    }
}

pub fn total_pages(count: u64, per_page: u32) -> u64 {
    count.div_ceil(u64::from(per_page.max(1)))
}

#[async_trait]
pub trait PageSource: Send + Sync {
    type Item: Clone + Send + Sync + 'static;

    async fn fetch(
        &self,
        gateway: &dyn BackendGateway,
        window: SkipTake,
    ) -> Result<Paginated<Self::Item>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserRulesets(pub UserId);

#[async_trait]
impl PageSource for UserRulesets {
    type Item = Ruleset;

    async fn fetch(
        &self,
        gateway: &dyn BackendGateway,
        window: SkipTake,
    ) -> Result<Paginated<Ruleset>> {
        gateway.list_user_rulesets(self.0, window).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserEnvironments(pub UserId);

#[async_trait]
impl PageSource for UserEnvironments {
    type Item = Environment;

    async fn fetch(
        &self,
        gateway: &dyn BackendGateway,
        window: SkipTake,
    ) -> Result<Paginated<Environment>> {
        gateway.list_user_environments(self.0, window).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SavedEnvironments;

#[async_trait]
impl PageSource for SavedEnvironments {
    type Item = Environment;

    async fn fetch(
        &self,
        gateway: &dyn BackendGateway,
        window: SkipTake,
    ) -> Result<Paginated<Environment>> {
        gateway.list_saved_environments(window).await
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageState<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub total_pages: u64,
    pub request: PageRequest,
    pub fetching: bool,
}

impl<T> PageState<T> {
    fn empty(request: PageRequest) -> Self {
        Self {
            items: Vec::new(),
            total: 0,
            total_pages: 0,
            request,
            fetching: false,
        }
    }
}

pub struct Pager<S: PageSource> {
    source: S,
    gateway: Arc<dyn BackendGateway>,
    events: EventHub,
    lifetime: Lifetime,
    state: watch::Sender<PageState<S::Item>>,
    generation: AtomicU64,
}

pub type RulesetPager = Pager<UserRulesets>;

impl<S: PageSource> Pager<S> {
    pub fn new(
        source: S,
        request: PageRequest,
        gateway: Arc<dyn BackendGateway>,
        events: EventHub,
        lifetime: Lifetime,
    ) -> Self {
        let (state, _) = watch::channel(PageState::empty(request));
        Self {
            source,
            gateway,
            events,
            lifetime,
            state,
            generation: AtomicU64::new(0),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn state(&self) -> PageState<S::Item> {
        self.state.borrow().clone()
    }

    pub fn request(&self) -> PageRequest {
        self.state.borrow().request
    }

    pub fn subscribe(&self) -> watch::Receiver<PageState<S::Item>> {
        self.state.subscribe()
    }

    /// Loads the current page. On failure the previous items stay in place.
    /// Only the most recent fetch may clear `fetching` or report an error.
    pub async fn fetch(&self) -> Result<PageState<S::Item>> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let request = self.request();
        self.state.send_modify(|state| state.fetching = true);

        let window = request.skip_take();
        let fetched = self
            .lifetime
            .run(self.source.fetch(self.gateway.as_ref(), window))
            .await;
        let latest = self.generation.load(Ordering::SeqCst) == generation
            && self.request() == request;

        match fetched {
            Some(Ok(page)) => {
                debug!(
                    page = request.page(),
                    per_page = request.per_page(),
                    count = page.count,
                    latest,
                    "pager: fetched"
                );
                if latest {
                    self.state.send_modify(|state| {
                        state.total = page.count;
                        state.total_pages = request.total_pages(page.count);
                        state.items = page.data;
                        state.fetching = false;
                    });
                }
                Ok(self.state())
            }
            Some(Err(err)) => {
                warn!(%err, page = request.page(), latest, "pager: fetch failed");
                if latest {
                    self.state.send_modify(|state| state.fetching = false);
                    self.events.surface(None, &err, "Failed to load page");
                }
                Err(err)
            }
            None => {
                if latest {
                    self.state.send_modify(|state| state.fetching = false);
                }
                Err(ClientError::Cancelled)
            }
        }
    }

    pub async fn refresh(&self) -> Result<PageState<S::Item>> {
        self.fetch().await
    }

    pub async fn set_page(&self, page: u32) -> Result<PageState<S::Item>> {
        self.state.send_modify(|state| {
            state.request = PageRequest::new(page, state.request.per_page());
        });
        self.fetch().await
    }

    /// Changing the page size always goes back to the first page.
    pub async fn set_per_page(&self, per_page: u32) -> Result<PageState<S::Item>> {
        self.state
            .send_modify(|state| state.request = PageRequest::new(1, per_page));
        self.fetch().await
    }

    pub fn dispose(&self) {
        self.lifetime.cancel();
    }
}

impl Pager<UserRulesets> {
    pub fn user_rulesets(
        user_id: UserId,
        gateway: Arc<dyn BackendGateway>,
        events: EventHub,
        lifetime: Lifetime,
    ) -> Self {
        Self::new(
            UserRulesets(user_id),
            PageRequest::default(),
            gateway,
            events,
            lifetime,
        )
    }

    pub async fn create(&self, draft: NewRuleset) -> Result<Ruleset> {
        let name = draft.name.trim();
        if name.is_empty() {
            let err = ValidationError::EmptyField("Name");
            self.events.error(err.to_string());
            return Err(err.into());
        }
        let ruleset = NewRuleset {
            name: name.to_string(),
            description: draft
                .description
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty()),
        };

        let notice = self.events.loading("Creating ruleset...");
        let created = self
            .lifetime
            .run(self.gateway.create_ruleset(&ruleset))
            .await;
        let created = match created {
            Some(Ok(created)) => created,
            Some(Err(err)) => {
                warn!(%err, "pager: ruleset creation failed");
                self.events
                    .surface(Some(notice), &err, "Something went wrong");
                return Err(err);
            }
            None => {
                self.events.dismiss(notice);
                return Err(ClientError::Cancelled);
            }
        };
        info!(ruleset_id = created.id.0, "pager: ruleset created");
        self.events
            .resolve(Some(notice), NoticeLevel::Success, "Ruleset created");

        // The listing is only a view; the ruleset exists either way.
        let _ = self.refresh().await;
        Ok(created)
    }
}

#[cfg(test)]
#[path = "tests/pagination_tests.rs"]
mod tests;
