use std::sync::Arc;

use shared::domain::UserId;
use tokio::sync::watch;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser {
    pub id: UserId,
    pub username: String,
}

/// The logged-in user, shared by every controller that needs it.
///
/// Readers take a snapshot or subscribe; writes go through `set_user`,
/// `rename` and `clear` only.
#[derive(Clone)]
pub struct Session {
    current: Arc<watch::Sender<Option<CurrentUser>>>,
}

impl Default for Session {
    fn default() -> Self {
        Self::anonymous()
    }
}

impl Session {
    pub fn anonymous() -> Self {
        let (current, _) = watch::channel(None);
        Self {
            current: Arc::new(current),
        }
    }

    pub fn signed_in(user: CurrentUser) -> Self {
        let session = Self::anonymous();
        session.set_user(user);
        session
    }

    pub fn snapshot(&self) -> Option<CurrentUser> {
        self.current.borrow().clone()
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.current.borrow().as_ref().map(|user| user.id)
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<CurrentUser>> {
        self.current.subscribe()
    }

    pub fn set_user(&self, user: CurrentUser) {
        self.current.send_replace(Some(user));
    }

    pub fn rename(&self, username: &str) {
        self.current.send_if_modified(|current| match current {
            Some(user) if user.username != username => {
                user.username = username.to_string();
                true
            }
            _ => false,
        });
    }

    pub fn clear(&self) {
        self.current.send_replace(None);
    }
}
