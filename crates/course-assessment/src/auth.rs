//! Bearer-token resolution. Session issuance lives elsewhere; this module
//! only maps an already-issued token to the caller's identity and role.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::assessment::domain::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Learner,
    Grader,
    Admin,
}

/// Authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: UserId,
    pub display_name: String,
    pub role: Role,
}

impl Principal {
    pub fn learner(user_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self::with_role(user_id, display_name, Role::Learner)
    }

    pub fn with_role(
        user_id: impl Into<String>,
        display_name: impl Into<String>,
        role: Role,
    ) -> Self {
        Self {
            user_id: UserId::new(user_id),
            display_name: display_name.into(),
            role,
        }
    }

    pub fn can_grade(&self) -> bool {
        matches!(self.role, Role::Grader | Role::Admin)
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

pub trait Authenticator: Send + Sync {
    fn authenticate(&self, token: &str) -> Option<Principal>;
}

/// Fixed token table, loaded from the seed file.
#[derive(Debug, Default, Clone)]
pub struct StaticTokenAuthenticator {
    tokens: HashMap<String, Principal>,
}

impl StaticTokenAuthenticator {
    pub fn new(tokens: impl IntoIterator<Item = (String, Principal)>) -> Self {
        Self {
            tokens: tokens.into_iter().collect(),
        }
    }

    pub fn insert(&mut self, token: impl Into<String>, principal: Principal) {
        self.tokens.insert(token.into(), principal);
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl Authenticator for StaticTokenAuthenticator {
    fn authenticate(&self, token: &str) -> Option<Principal> {
        self.tokens.get(token.trim()).cloned()
    }
}

/// Extracts the token from an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header_value: &str) -> Option<&str> {
    let (scheme, token) = header_value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bearer_header() {
        assert_eq!(bearer_token("Bearer abc123"), Some("abc123"));
        assert_eq!(bearer_token("bearer  abc123 "), Some("abc123"));
        assert_eq!(bearer_token("Basic abc123"), None);
        assert_eq!(bearer_token("Bearer "), None);
        assert_eq!(bearer_token("abc123"), None);
    }

    #[test]
    fn static_tokens_resolve_principals() {
        let mut auth = StaticTokenAuthenticator::default();
        auth.insert("t-grader", Principal::with_role("g1", "Grace", Role::Grader));
        let principal = auth.authenticate("t-grader").expect("known token");
        assert!(principal.can_grade());
        assert!(!principal.is_admin());
        assert!(auth.authenticate("unknown").is_none());
    }
}
