//! Routing policy.
//!
//! A ruleset decides, once per connection and before any relay round-trip,
//! whether the destination goes through the remote server or is dialled
//! directly from the client.

use std::net::SocketAddr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Destination predicate: `true` routes through the relay server.
pub trait Ruleset: Send + Sync {
    /// Decide the route for a resolved destination.
    fn matches(&self, addr: &SocketAddr) -> bool;
}

/// Send everything through the relay.
#[derive(Debug, Clone, Copy, Default)]
pub struct Global;

impl Ruleset for Global {
    fn matches(&self, _addr: &SocketAddr) -> bool {
        true
    }
}

/// Dial everything directly, bypassing the relay.
#[derive(Debug, Clone, Copy, Default)]
pub struct Direct;

impl Ruleset for Direct {
    fn matches(&self, _addr: &SocketAddr) -> bool {
        false
    }
}

/// Plain functions and closures work as rulesets.
impl<F> Ruleset for F
where
    F: Fn(&SocketAddr) -> bool + Send + Sync,
{
    fn matches(&self, addr: &SocketAddr) -> bool {
        self(addr)
    }
}

/// Built-in policies selectable from configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RulesetKind {
    /// [`Global`]
    #[default]
    Global,
    /// [`Direct`]
    Direct,
}

impl RulesetKind {
    /// Build the shared ruleset.
    pub fn build(self) -> Arc<dyn Ruleset> {
        match self {
            RulesetKind::Global => Arc::new(Global),
            RulesetKind::Direct => Arc::new(Direct),
        }
    }
}
