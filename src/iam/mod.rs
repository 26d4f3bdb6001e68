// This file is part of the product TagLedger.
// SPDX-FileCopyrightText: 2025-2026 Zivatar Limited
// SPDX-License-Identifier: AGPL-3.0-or-later
// The code and documentation in this repository is licensed under the GNU Affero General Public License v3.0 or later (AGPL-3.0-or-later). See LICENSE.

pub mod middleware;

pub use middleware::{AuthRequest, TokenAuthMiddlewareFactory};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::config::UserConfig;

/// A verified principal, placed in request extensions by the auth
/// middleware.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub roles: Vec<String>,
}

/// Token verification is an external concern; anything that can turn a
/// bearer token into a verified user plugs in here.
pub trait TokenVerifier: Send + Sync {
    fn verify(&self, token: &str) -> Option<User>;
}

/// Config-driven verifier for development and tests: a fixed token-to-user
/// table, no expiry, no refresh.
pub struct StaticTokenVerifier {
    users: HashMap<String, User>,
}

impl StaticTokenVerifier {
    pub fn from_config(users: &[UserConfig]) -> Self {
        let users = users
            .iter()
            .map(|entry| {
                (
                    entry.token.clone(),
                    User {
                        id: entry.id.clone(),
                        name: entry.name.clone(),
                        roles: entry.roles.clone(),
                    },
                )
            })
            .collect();
        Self { users }
    }
}

impl TokenVerifier for StaticTokenVerifier {
    fn verify(&self, token: &str) -> Option<User> {
        self.users.get(token).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;

    #[test]
    fn static_verifier_resolves_known_tokens() {
        let verifier = StaticTokenVerifier::from_config(&test_config().users);
        let user = verifier.verify("alice-token").expect("alice");
        assert_eq!(user.id, "alice");
        assert!(user.roles.iter().any(|role| role == "admin"));
        assert!(verifier.verify("unknown-token").is_none());
    }
}
