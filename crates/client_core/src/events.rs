//! User-visible notices and navigation requests emitted by controllers.

use shared::domain::{EnvironmentId, UserId};
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use crate::error::ClientError;

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NoticeId(pub Uuid);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Loading,
    Success,
    Error,
}

/// A toast-style notification. A notice re-sent with the same id replaces
/// the earlier one, which is how loading notices get resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub id: NoticeId,
    pub level: NoticeLevel,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Home,
    Settings,
    Profile(UserId),
    Environment(EnvironmentId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    Notice(Notice),
    NoticeDismissed(NoticeId),
    Navigate(Route),
}

#[derive(Clone)]
pub struct EventHub {
    tx: broadcast::Sender<ClientEvent>,
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}

impl EventHub {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.tx.subscribe()
    }

    pub fn loading(&self, message: impl Into<String>) -> NoticeId {
        self.resolve(None, NoticeLevel::Loading, message)
    }

    pub fn success(&self, message: impl Into<String>) -> NoticeId {
        self.resolve(None, NoticeLevel::Success, message)
    }

    pub fn error(&self, message: impl Into<String>) -> NoticeId {
        self.resolve(None, NoticeLevel::Error, message)
    }

    pub fn resolve(
        &self,
        id: Option<NoticeId>,
        level: NoticeLevel,
        message: impl Into<String>,
    ) -> NoticeId {
        let id = id.unwrap_or_else(|| NoticeId(Uuid::new_v4()));
        let _ = self.tx.send(ClientEvent::Notice(Notice {
            id,
            level,
            message: message.into(),
        }));
        id
    }

    pub fn dismiss(&self, id: NoticeId) {
        let _ = self.tx.send(ClientEvent::NoticeDismissed(id));
    }

    pub fn navigate(&self, route: Route) {
        debug!(?route, "events: navigate");
        let _ = self.tx.send(ClientEvent::Navigate(route));
    }

    /// Reports a failed operation: validation problems show their own text,
    /// request failures show `fallback`, auth failures leave the view.
    pub fn surface(&self, id: Option<NoticeId>, err: &ClientError, fallback: &str) {
        match err {
            ClientError::Validation(validation) => {
                self.resolve(id, NoticeLevel::Error, validation.to_string());
            }
            ClientError::RequestFailure { .. } => {
                self.resolve(id, NoticeLevel::Error, fallback);
            }
            ClientError::AuthFailure => {
                if let Some(id) = id {
                    self.dismiss(id);
                }
                self.navigate(Route::Home);
            }
            ClientError::Cancelled => {
                if let Some(id) = id {
                    self.dismiss(id);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationError;

    #[test]
    fn loading_notice_is_resolved_in_place() {
        let hub = EventHub::new();
        let mut rx = hub.subscribe();

        let id = hub.loading("Updating...");
        hub.resolve(Some(id), NoticeLevel::Success, "Settings saved!");

        let first = rx.try_recv().expect("loading");
        let second = rx.try_recv().expect("resolved");
        match (first, second) {
            (ClientEvent::Notice(a), ClientEvent::Notice(b)) => {
                assert_eq!(a.id, b.id);
                assert_eq!(a.level, NoticeLevel::Loading);
                assert_eq!(b.level, NoticeLevel::Success);
                assert_eq!(b.message, "Settings saved!");
            }
            other => panic!("unexpected events: {other:?}"),
        }
    }

    #[test]
    fn surface_applies_error_taxonomy() {
        let hub = EventHub::new();
        let mut rx = hub.subscribe();

        hub.surface(None, &ValidationError::EmptyField("Username").into(), "x");
        hub.surface(None, &ClientError::request(Some(500), "boom"), "Something went wrong");
        hub.surface(None, &ClientError::AuthFailure, "ignored");

        let messages: Vec<ClientEvent> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert!(matches!(&messages[0], ClientEvent::Notice(n) if n.message == "Username can't be empty!"));
        assert!(matches!(&messages[1], ClientEvent::Notice(n) if n.message == "Something went wrong"));
        assert_eq!(messages[2], ClientEvent::Navigate(Route::Home));
        assert_eq!(messages.len(), 3);
    }

    #[test]
    fn sending_without_subscribers_is_harmless() {
        let hub = EventHub::new();
        hub.error("nobody listening");
        hub.navigate(Route::Settings);
    }
}
