// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Actor path
//!
//! `ActorPath` is the identity of an actor. It names the sender and the recipient of every
//! envelope, both in a local mailbox and on the wire, where it travels in its textual form
//! (`/user/echo`). The empty path (`/`) stands for "no actor": messages sent from outside
//! any actor carry it as their sender.
//!

use serde::{Deserialize, Serialize};

use std::cmp::Ordering;
use std::fmt::{Error, Formatter};

/// Hierarchical actor identity, stored as its non-empty segments.
#[derive(
    Clone, Default, Hash, Eq, PartialEq, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct ActorPath(Vec<String>);

impl ActorPath {
    /// The path used as sender identity when no actor is sending.
    pub fn anonymous() -> Self {
        ActorPath(Vec::new())
    }

    /// Path of the parent actor, or the empty path for top level actors.
    pub fn parent(&self) -> Self {
        if self.0.len() > 1 {
            let mut tokens = self.0.clone();
            tokens.truncate(tokens.len() - 1);
            ActorPath(tokens)
        } else {
            ActorPath(Vec::new())
        }
    }

    /// Last segment of the path.
    pub fn key(&self) -> String {
        self.0.last().cloned().unwrap_or_default()
    }

    /// Number of segments.
    pub fn level(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn is_child_of(&self, other: &ActorPath) -> bool {
        !self.is_empty() && self.parent() == *other
    }

    pub fn is_top_level(&self) -> bool {
        self.0.len() == 1
    }
}

fn segments(str: &str) -> Vec<String> {
    str.split('/')
        .filter(|x| !x.trim().is_empty())
        .map(|s| s.to_string())
        .collect()
}

impl From<&str> for ActorPath {
    fn from(str: &str) -> Self {
        ActorPath(segments(str))
    }
}

impl From<String> for ActorPath {
    fn from(string: String) -> Self {
        ActorPath::from(string.as_str())
    }
}

impl std::ops::Div<&str> for ActorPath {
    type Output = ActorPath;

    fn div(self, rhs: &str) -> Self::Output {
        let mut keys = self.0;
        keys.append(&mut segments(rhs));
        ActorPath(keys)
    }
}

impl std::fmt::Display for ActorPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        match self.level().cmp(&1) {
            Ordering::Less => write!(f, "/"),
            Ordering::Equal => write!(f, "/{}", self.0[0]),
            Ordering::Greater => write!(f, "/{}", self.0.join("/")),
        }
    }
}

impl std::fmt::Debug for ActorPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        std::fmt::Display::fmt(self, f)
    }
}
