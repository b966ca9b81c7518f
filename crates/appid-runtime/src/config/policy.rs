//! Inherited allow/disallow feature sets.

use std::collections::BTreeSet;

/// Feature policy of a party, inherited down the configuration tree.
///
/// Each section may list `allow_features` and `disallow_features`. The
/// effective sets combine them with the parent's:
///
/// ```text
/// allow    = own_allow    ∪ (parent.allow    − own_disallow)
/// disallow = own_disallow ∪ (parent.disallow − allow)
/// ```
///
/// Feature names compare case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeaturePolicy {
    allow: BTreeSet<String>,
    disallow: BTreeSet<String>,
}

impl FeaturePolicy {
    /// Combines a section's own lists with the parent policy.
    ///
    /// Entries may hold comma-separated names.
    ///
    /// # Errors
    ///
    /// Returns the names listed in both of the section's own lists.
    pub fn inherit(
        parent: &FeaturePolicy,
        own_allow: &[String],
        own_disallow: &[String],
    ) -> Result<Self, Vec<String>> {
        let own_allow = normalize(own_allow);
        let own_disallow = normalize(own_disallow);
        let overlap: Vec<String> = own_allow.intersection(&own_disallow).cloned().collect();
        if !overlap.is_empty() {
            return Err(overlap);
        }

        let mut allow = own_allow;
        allow.extend(parent.allow.difference(&own_disallow).cloned());
        let mut disallow = own_disallow;
        disallow.extend(parent.disallow.difference(&allow).cloned());
        Ok(Self { allow, disallow })
    }

    /// Policy lookup for `feature`.
    ///
    /// When the feature is allowed by the level above, it stays allowed
    /// unless explicitly disallowed here. Otherwise it must be explicitly
    /// allowed here.
    #[must_use]
    pub fn is_allowed(&self, feature: &str, allowed_above: bool) -> bool {
        let key = feature.to_lowercase();
        if allowed_above {
            !self.disallow.contains(&key)
        } else {
            self.allow.contains(&key)
        }
    }

    /// Effective allowed features, lowercased.
    pub fn allowed(&self) -> impl Iterator<Item = &str> {
        self.allow.iter().map(String::as_str)
    }

    /// Effective disallowed features, lowercased.
    pub fn disallowed(&self) -> impl Iterator<Item = &str> {
        self.disallow.iter().map(String::as_str)
    }
}

fn normalize(entries: &[String]) -> BTreeSet<String> {
    entries
        .iter()
        .flat_map(|entry| entry.split(','))
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_lowercase)
        .collect()
}
