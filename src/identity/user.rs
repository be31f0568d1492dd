//! User records and the sequential `P####` identifier scheme.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::error::IdentityError;

/// Sequential user identifier, rendered as `P` plus a zero-padded decimal
/// suffix (`P0001`, `P0002`, ...). The padding widens past `P9999`; suffixes
/// are never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserId(u32);

impl UserId {
    /// First identifier handed out against an empty store.
    #[must_use]
    pub const fn first() -> Self {
        Self(1)
    }

    #[must_use]
    pub const fn from_suffix(suffix: u32) -> Self {
        Self(suffix)
    }

    #[must_use]
    pub const fn suffix(self) -> u32 {
        self.0
    }

    /// Identifier following this one in allocation order.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{:04}", self.0)
    }
}

impl FromStr for UserId {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let suffix = s
            .strip_prefix('P')
            .filter(|rest| !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()))
            .ok_or_else(|| IdentityError::Validation(format!("invalid user id: {s}")))?;
        let value: u32 = suffix
            .parse()
            .map_err(|_| IdentityError::Validation(format!("invalid user id: {s}")))?;
        if value == 0 {
            return Err(IdentityError::Validation(format!("invalid user id: {s}")));
        }
        Ok(Self(value))
    }
}

impl Serialize for UserId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for UserId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Durable user record. Created at signup or first federated link, mutated
/// only through password updates, never deleted.
#[derive(Clone, Debug)]
pub struct User {
    pub user_id: UserId,
    pub password_hash: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
}

/// Profile fields for a user that does not yet have an identifier.
#[derive(Clone, Debug)]
pub struct NewUser {
    pub password_hash: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
}

impl NewUser {
    #[must_use]
    pub fn with_id(self, user_id: UserId) -> User {
        User {
            user_id,
            password_hash: self.password_hash,
            name: self.name,
            email: self.email,
            phone: self.phone,
        }
    }
}
