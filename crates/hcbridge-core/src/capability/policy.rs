// ── Feature negotiation ──
//
// Decides whether an optional protocol element is attached at all. Rules
// are looked up by display name (optionally narrowed to one surface kind),
// then by optional group; anything not mentioned is enabled.

use std::collections::HashMap;

use super::sink::ServiceKind;

/// Describes one optional protocol element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityDescriptor {
    pub kind: ServiceKind,
    pub name: String,
    pub group: Option<String>,
}

impl CapabilityDescriptor {
    pub fn new(kind: ServiceKind, name: impl Into<String>, group: Option<&str>) -> Self {
        Self {
            kind,
            name: name.into(),
            group: group.map(str::to_owned),
        }
    }
}

/// Per-feature rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureRule {
    pub enabled: bool,
    /// Restrict the rule to one surface kind.
    pub kind: Option<ServiceKind>,
}

/// Feature switches of one appliance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeaturePolicy {
    features: HashMap<String, FeatureRule>,
    groups: HashMap<String, bool>,
}

impl FeaturePolicy {
    /// A policy that enables everything.
    pub fn allow_all() -> Self {
        Self::default()
    }

    pub fn with_feature(mut self, name: impl Into<String>, rule: FeatureRule) -> Self {
        self.features.insert(name.into(), rule);
        self
    }

    pub fn with_group(mut self, group: impl Into<String>, enabled: bool) -> Self {
        self.groups.insert(group.into(), enabled);
        self
    }

    pub fn allows(&self, descriptor: &CapabilityDescriptor) -> bool {
        if let Some(rule) = self.features.get(&descriptor.name) {
            if rule.kind.is_none_or(|kind| kind == descriptor.kind) {
                return rule.enabled;
            }
        }

        descriptor
            .group
            .as_ref()
            .and_then(|group| self.groups.get(group))
            .copied()
            .unwrap_or(true)
    }
}
