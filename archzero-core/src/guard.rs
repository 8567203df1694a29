//! Access guard for protected views.
//!
//! A missing session always redirects to login. Role membership is checked
//! only when `enforce_roles` is set; it defaults to off, so any authenticated
//! user currently passes regardless of `allowed_roles`.

use crate::config::GuardConfig;
use crate::models::Role;
use crate::session::SessionSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    Render,
    RedirectToLogin,
    RedirectToUnauthorized,
}

#[derive(Debug, Clone, Default)]
pub struct AccessGuard {
    allowed_roles: Vec<Role>,
    enforce_roles: bool,
}

impl AccessGuard {
    /// An empty `allowed_roles` admits every authenticated user.
    pub fn new(allowed_roles: impl IntoIterator<Item = Role>) -> Self {
        Self {
            allowed_roles: allowed_roles.into_iter().collect(),
            enforce_roles: false,
        }
    }

    pub fn from_config(config: &GuardConfig, allowed_roles: impl IntoIterator<Item = Role>) -> Self {
        Self::new(allowed_roles).enforce_roles(config.enforce_roles)
    }

    pub fn enforce_roles(mut self, enforce: bool) -> Self {
        self.enforce_roles = enforce;
        self
    }

    pub fn allowed_roles(&self) -> &[Role] {
        &self.allowed_roles
    }

    pub fn decide(
        &self,
        is_authenticated: bool,
        token: Option<&str>,
        current_role: Option<&Role>,
    ) -> GuardDecision {
        if !is_authenticated || token.is_none() {
            return GuardDecision::RedirectToLogin;
        }

        if self.allowed_roles.is_empty() {
            return GuardDecision::Render;
        }

        let permitted = current_role.is_some_and(|role| self.allowed_roles.contains(role));
        if permitted {
            return GuardDecision::Render;
        }

        if !self.enforce_roles {
            tracing::debug!(
                role = ?current_role.map(Role::as_str),
                allowed = ?self.allowed_roles,
                "Role check not enforced; rendering"
            );
            return GuardDecision::Render;
        }

        GuardDecision::RedirectToUnauthorized
    }

    pub fn check(&self, session: &impl SessionSource) -> GuardDecision {
        let snapshot = session.snapshot();
        self.decide(
            snapshot.is_authenticated,
            snapshot.token.as_deref(),
            snapshot.role(),
        )
    }
}
