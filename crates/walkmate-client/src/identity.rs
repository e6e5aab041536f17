//! Who the local user is.
//!
//! Authentication lives outside the walk core; it only publishes the
//! resolved user id, possibly some time after the views were mounted.

use std::sync::{Arc, PoisonError, RwLock};

use walkmate_shared::UserId;

pub trait IdentitySource: Send + Sync {
    /// The authenticated user, or `None` while identity is still loading.
    fn current_user(&self) -> Option<UserId>;
}

/// An identity that is always known.
impl IdentitySource for UserId {
    fn current_user(&self) -> Option<UserId> {
        Some(*self)
    }
}

/// Identity slot filled in by the authentication layer.
#[derive(Debug, Clone, Default)]
pub struct SharedIdentity {
    inner: Arc<RwLock<Option<UserId>>>,
}

impl SharedIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, user: UserId) {
        self.replace(Some(user));
    }

    pub fn clear(&self) {
        self.replace(None);
    }

    // a poisoned slot still holds a whole `Option<UserId>`
    fn replace(&self, user: Option<UserId>) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = user;
    }
}

impl IdentitySource for SharedIdentity {
    fn current_user(&self) -> Option<UserId> {
        *self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }
}
