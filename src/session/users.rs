// Copyright (c) 2025 - Cowboy AI, Inc.
//! Credential check for session login

use std::collections::{BTreeSet, HashMap};

use subtle::ConstantTimeEq;

use crate::config::UserConfig;

/// Source of login credentials
pub trait UserDirectory: Send + Sync {
    /// Privileges granted to `username` if `password` matches
    fn authenticate(&self, username: &str, password: &str) -> Option<BTreeSet<String>>;
}

#[derive(Debug, Clone)]
struct UserRecord {
    password: String,
    privileges: BTreeSet<String>,
}

/// Fixed accounts, typically from configuration
#[derive(Debug, Clone, Default)]
pub struct StaticUserDirectory {
    users: HashMap<String, UserRecord>,
}

impl StaticUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(users: &[UserConfig]) -> Self {
        users.iter().fold(Self::new(), |dir, user| {
            dir.with_user(&user.username, &user.password, user.role.privileges())
        })
    }

    pub fn with_user<I, S>(mut self, username: &str, password: &str, privileges: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.users.insert(
            username.to_string(),
            UserRecord {
                password: password.to_string(),
                privileges: privileges.into_iter().map(Into::into).collect(),
            },
        );
        self
    }
}

impl UserDirectory for StaticUserDirectory {
    fn authenticate(&self, username: &str, password: &str) -> Option<BTreeSet<String>> {
        let record = self.users.get(username)?;
        let matches: bool = record
            .password
            .as_bytes()
            .ct_eq(password.as_bytes())
            .into();
        matches.then(|| record.privileges.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Role;

    #[test]
    fn test_authenticate() {
        let dir = StaticUserDirectory::from_config(&[UserConfig {
            username: "root".to_string(),
            password: "calvin".to_string(),
            role: Role::Operator,
        }]);

        assert_eq!(dir.authenticate("root", "calvin"), Some(Role::Operator.privileges()));
        assert_eq!(dir.authenticate("root", "calvi"), None);
        assert_eq!(dir.authenticate("nobody", "calvin"), None);
    }
}
