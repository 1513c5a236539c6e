//! Per-method role requirements.
//!
//! # Design Decisions
//! - Built once from static configuration, read-only afterwards
//! - A method with no entry requires nothing (same as an empty list)

use std::collections::HashMap;

use serde::Deserialize;

use crate::routing::method::{HttpMethod, InvalidMethod};

/// Maps an HTTP method to the roles a caller must hold (any one of them).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct RoutePermissions {
    roles: HashMap<HttpMethod, Vec<String>>,
}

impl RoutePermissions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require one of `roles` for `method`.
    pub fn require<I, S>(mut self, method: HttpMethod, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles
            .insert(method, roles.into_iter().map(Into::into).collect());
        self
    }

    /// Build from string method names, rejecting names outside the method set.
    pub fn from_names<I, K, R, S>(entries: I) -> Result<Self, InvalidMethod>
    where
        I: IntoIterator<Item = (K, R)>,
        K: AsRef<str>,
        R: IntoIterator<Item = S>,
        S: Into<String>,
    {
        entries.into_iter().try_fold(Self::new(), |acc, (name, roles)| {
            Ok(acc.require(name.as_ref().parse()?, roles))
        })
    }

    /// Roles required for `method`, in declaration order.
    pub fn required_roles(&self, method: HttpMethod) -> &[String] {
        self.roles.get(&method).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Methods that carry at least one role.
    pub fn protected_methods(&self) -> Vec<HttpMethod> {
        let mut methods: Vec<_> = self
            .roles
            .iter()
            .filter(|(_, roles)| !roles.is_empty())
            .map(|(m, _)| *m)
            .collect();
        methods.sort();
        methods
    }

    pub fn is_empty(&self) -> bool {
        self.protected_methods().is_empty()
    }
}
