//! Semantic roles of a training step and the marker table that detects them.
//!
//! A role is recognised purely by the name of a node. The literal names live
//! in a table (overridable from the config file) rather than in match arms,
//! so adding a role means adding a row.

use crate::utils::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Role a node can play inside one training step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Forward,
    Loss,
    Backward,
    Optimizer,
    Broadcast,
    AllReduce,
}

impl Role {
    pub const ALL: [Role; 6] = [
        Role::Forward,
        Role::Loss,
        Role::Backward,
        Role::Optimizer,
        Role::Broadcast,
        Role::AllReduce,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Forward => "forward",
            Role::Loss => "loss",
            Role::Backward => "backward",
            Role::Optimizer => "optimizer",
            Role::Broadcast => "broadcast",
            Role::AllReduce => "all_reduce",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a marker pattern is compared against a node name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MatchRule {
    #[default]
    Exact,
    Contains,
}

/// Literal name (or name fragment) identifying one role
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Marker {
    pub pattern: String,
    pub rule: MatchRule,
}

impl Marker {
    pub fn new(pattern: impl Into<String>, rule: MatchRule) -> Self {
        Self {
            pattern: pattern.into(),
            rule,
        }
    }

    pub fn matches(&self, name: &str) -> bool {
        match self.rule {
            MatchRule::Exact => name == self.pattern,
            MatchRule::Contains => name.contains(self.pattern.as_str()),
        }
    }
}

/// Default role markers, as emitted by DDP training instrumented with the
/// PyTorch profiler
pub const DEFAULT_MARKERS: &[(Role, &str, MatchRule)] = &[
    (Role::Forward, "nn.Module: DistributedDataParallel_0", MatchRule::Exact),
    (Role::Loss, "aten::cross_entropy_loss", MatchRule::Exact),
    (
        Role::Backward,
        "nn.Module: DistributedDataParallel_0.backward",
        MatchRule::Exact,
    ),
    (Role::Optimizer, "Optimizer.step#", MatchRule::Contains),
    (Role::Broadcast, "nccl:broadcast", MatchRule::Exact),
    (Role::AllReduce, "nccl:all_reduce", MatchRule::Exact),
];

/// Role -> marker table
///
/// Every role always has a marker; a config file only overrides the rows it
/// names, and within a row only the fields it names. A row that sets just
/// `pattern` keeps the role's default `rule`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "MarkerTableOverrides")]
pub struct MarkerTable {
    pub forward: Marker,
    pub loss: Marker,
    pub backward: Marker,
    pub optimizer: Marker,
    pub broadcast: Marker,
    pub all_reduce: Marker,
}

impl Default for MarkerTable {
    fn default() -> Self {
        let mut table = Self {
            forward: Marker::default(),
            loss: Marker::default(),
            backward: Marker::default(),
            optimizer: Marker::default(),
            broadcast: Marker::default(),
            all_reduce: Marker::default(),
        };
        for (role, pattern, rule) in DEFAULT_MARKERS {
            *table.marker_mut(*role) = Marker::new(*pattern, *rule);
        }
        table
    }
}

/// Partial marker row as written in a config file
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct MarkerOverride {
    pattern: Option<String>,
    rule: Option<MatchRule>,
}

/// Partial marker table as written in a config file
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct MarkerTableOverrides {
    forward: MarkerOverride,
    loss: MarkerOverride,
    backward: MarkerOverride,
    optimizer: MarkerOverride,
    broadcast: MarkerOverride,
    all_reduce: MarkerOverride,
}

impl From<MarkerTableOverrides> for MarkerTable {
    fn from(overrides: MarkerTableOverrides) -> Self {
        let mut table = MarkerTable::default();
        let rows = [
            (Role::Forward, overrides.forward),
            (Role::Loss, overrides.loss),
            (Role::Backward, overrides.backward),
            (Role::Optimizer, overrides.optimizer),
            (Role::Broadcast, overrides.broadcast),
            (Role::AllReduce, overrides.all_reduce),
        ];

        for (role, row) in rows {
            let marker = table.marker_mut(role);
            if let Some(pattern) = row.pattern {
                marker.pattern = pattern;
            }
            if let Some(rule) = row.rule {
                marker.rule = rule;
            }
        }
        table
    }
}

impl MarkerTable {
    pub fn marker(&self, role: Role) -> &Marker {
        match role {
            Role::Forward => &self.forward,
            Role::Loss => &self.loss,
            Role::Backward => &self.backward,
            Role::Optimizer => &self.optimizer,
            Role::Broadcast => &self.broadcast,
            Role::AllReduce => &self.all_reduce,
        }
    }

    pub fn marker_mut(&mut self, role: Role) -> &mut Marker {
        match role {
            Role::Forward => &mut self.forward,
            Role::Loss => &mut self.loss,
            Role::Backward => &mut self.backward,
            Role::Optimizer => &mut self.optimizer,
            Role::Broadcast => &mut self.broadcast,
            Role::AllReduce => &mut self.all_reduce,
        }
    }

    /// Whether `name` carries the marker of `role`
    pub fn matches(&self, role: Role, name: &str) -> bool {
        self.marker(role).matches(name)
    }

    pub fn pattern(&self, role: Role) -> &str {
        &self.marker(role).pattern
    }

    /// Every pattern must be non-empty (an empty contains-pattern matches everything)
    pub fn validate(&self) -> Result<(), ConfigError> {
        for role in Role::ALL {
            if self.pattern(role).trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "marker for role '{}' has an empty pattern",
                    role
                )));
            }
        }
        Ok(())
    }
}
