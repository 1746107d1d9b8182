//! Identity of the current user, as supplied by the authentication provider

use crate::model::UserId;
use std::sync::{PoisonError, RwLock};

/// Supplies the signed-in user, or `None` when nobody is signed in
pub trait AuthProvider: Send + Sync {
    fn current_user(&self) -> Option<UserId>;
}

/// A session whose user is set by the host (CLI flags, an external sign-in flow)
#[derive(Default)]
pub struct StaticSession {
    user: RwLock<Option<UserId>>,
}

impl StaticSession {
    pub fn new(user: Option<UserId>) -> Self {
        Self {
            user: RwLock::new(user),
        }
    }

    pub fn sign_in(&self, user: UserId) {
        tracing::info!("Signed in as {}", user);
        *self.user.write().unwrap_or_else(PoisonError::into_inner) = Some(user);
    }

    pub fn sign_out(&self) {
        *self.user.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl AuthProvider for StaticSession {
    fn current_user(&self) -> Option<UserId> {
        self.user
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_in_and_out() {
        let session = StaticSession::default();
        assert_eq!(session.current_user(), None);

        session.sign_in("u-42".into());
        assert_eq!(session.current_user(), Some(UserId::from("u-42")));

        session.sign_out();
        assert_eq!(session.current_user(), None);
    }
}
