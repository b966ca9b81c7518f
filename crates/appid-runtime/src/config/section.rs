//! Raw party sections.

use serde::{Deserialize, Serialize};

/// One party (or group of parties) as written in configuration.
///
/// A section without a party name is a pure group: it only passes its
/// names and feature lists down to its `parties`.
///
/// ```toml
/// domain_name = "Acme"
/// party_name = "Hub"
///
/// [[parties]]
/// party_name = "Billing"
/// address = "https://billing.acme.example"
///
/// [[parties]]
/// full_name = "Acme/Sales/$Sales"
/// disallow_features = ["Telemetry"]
///
///   [[parties.parties]]
///   party_name = "Crm"
///   address = "https://crm.acme.example"
/// ```
///
/// Keys not listed below are kept in [`settings`](Self::settings) for
/// feature drivers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartySection {
    /// `Domain/$Party/#Env`; exclusive with the individual name fields it
    /// defines.
    pub full_name: Option<String>,
    /// Domain name; inherited from the owner when absent.
    pub domain_name: Option<String>,
    /// Party name, `$` prefix optional.
    pub party_name: Option<String>,
    /// Environment name, `#` prefix optional; inherited when absent.
    pub environment_name: Option<String>,
    /// Opaque remote address. A party with an address is never a domain.
    pub address: Option<String>,
    /// Features explicitly allowed here.
    pub allow_features: Vec<String>,
    /// Features explicitly disallowed here.
    pub disallow_features: Vec<String>,
    /// Nested sections.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub parties: Vec<PartySection>,
    /// Free-form feature configuration.
    #[serde(flatten)]
    pub settings: toml::Table,
}

impl PartySection {
    /// Section with only a party name.
    #[must_use]
    pub fn party(name: impl Into<String>) -> Self {
        Self {
            party_name: Some(name.into()),
            ..Self::default()
        }
    }

    /// Section with only a full name.
    #[must_use]
    pub fn full(full_name: impl Into<String>) -> Self {
        Self {
            full_name: Some(full_name.into()),
            ..Self::default()
        }
    }

    /// Pure group of `parties`.
    #[must_use]
    pub fn group(parties: impl IntoIterator<Item = PartySection>) -> Self {
        Self {
            parties: parties.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Sets the domain name.
    #[must_use]
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain_name = Some(domain.into());
        self
    }

    /// Sets the environment name.
    #[must_use]
    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment_name = Some(environment.into());
        self
    }

    /// Sets the address.
    #[must_use]
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    /// Adds an allowed feature.
    #[must_use]
    pub fn allow(mut self, feature: impl Into<String>) -> Self {
        self.allow_features.push(feature.into());
        self
    }

    /// Adds a disallowed feature.
    #[must_use]
    pub fn disallow(mut self, feature: impl Into<String>) -> Self {
        self.disallow_features.push(feature.into());
        self
    }

    /// Adds a nested section.
    #[must_use]
    pub fn with_party(mut self, party: PartySection) -> Self {
        self.parties.push(party);
        self
    }

    /// Adds a free-form setting.
    #[must_use]
    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<toml::Value>) -> Self {
        self.settings.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_nested_sections_and_settings() {
        let section: PartySection = toml::from_str(
            r#"
            domain_name = "Acme"
            party_name = "Hub"
            retries = 3

            [[parties]]
            party_name = "Billing"
            address = "tcp://billing"

            [[parties]]
            full_name = "Acme/Sales/$Sales"
            disallow_features = ["Telemetry"]
            "#,
        )
        .expect("valid section");

        assert_eq!(section.party_name.as_deref(), Some("Hub"));
        assert_eq!(section.parties.len(), 2);
        assert_eq!(section.parties[0].address.as_deref(), Some("tcp://billing"));
        assert_eq!(section.parties[1].disallow_features, vec!["Telemetry"]);
        assert_eq!(section.settings.get("retries"), Some(&toml::Value::Integer(3)));
    }

    #[test]
    fn builder_matches_fields() {
        let section = PartySection::party("Billing")
            .with_domain("Acme")
            .with_environment("Prod")
            .with_address("tcp://billing")
            .allow("Sign")
            .disallow("Crypt")
            .with_setting("timeout", 30)
            .with_party(PartySection::full("Acme/$Child"));

        assert_eq!(section.domain_name.as_deref(), Some("Acme"));
        assert_eq!(section.environment_name.as_deref(), Some("Prod"));
        assert_eq!(section.allow_features, vec!["Sign"]);
        assert_eq!(section.disallow_features, vec!["Crypt"]);
        assert_eq!(section.parties[0].full_name.as_deref(), Some("Acme/$Child"));
        assert!(section.settings.contains_key("timeout"));
    }
}
