//! Section resolution into concrete party configurations.
//!
//! # Rules
//!
//! | Situation | Result |
//! |-----------|--------|
//! | no party name | pure group: children resolved with its names and policy |
//! | no address, party name = last domain segment | tenant domain |
//! | anything else | remote party |
//! | tenant declared below a tenant | lifted to the root level |
//!
//! Domain and environment are inherited from the enclosing section when
//! absent. Full names must be unique (case-insensitively) across the whole
//! resolution, root included.

use super::{ConfigError, FeaturePolicy, PartySection};
use appid_types::name::{
    normalize_domain_name, normalize_environment_name, normalize_party_name, DEFAULT_DOMAIN_NAME,
    DEFAULT_ENVIRONMENT_NAME, DEFAULT_PARTY_NAME,
};
use appid_types::{FullName, NameParts};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Role of a party in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartyKind {
    /// The identity root.
    Root,
    /// A tenant domain, owned by the root.
    TenantDomain,
    /// A remote party, owned by the root or a tenant domain.
    Remote,
}

/// Resolved configuration of one party.
#[derive(Debug, Clone)]
pub struct PartyConfiguration {
    kind: PartyKind,
    full_name: FullName,
    address: Option<String>,
    policy: FeaturePolicy,
    settings: toml::Table,
    section_path: String,
}

impl PartyConfiguration {
    /// Role of the party.
    #[must_use]
    pub fn kind(&self) -> PartyKind {
        self.kind
    }

    /// Full name.
    #[must_use]
    pub fn full_name(&self) -> &FullName {
        &self.full_name
    }

    /// Domain name.
    #[must_use]
    pub fn domain_name(&self) -> &str {
        self.full_name.domain_name()
    }

    /// Party name with its `$` prefix.
    #[must_use]
    pub fn party_name(&self) -> &str {
        self.full_name.party_name()
    }

    /// Environment name with its `#` prefix.
    #[must_use]
    pub fn environment_name(&self) -> &str {
        self.full_name.environment_name()
    }

    /// Opaque remote address.
    #[must_use]
    pub fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }

    /// True for parties of the `External` domain.
    #[must_use]
    pub fn is_external(&self) -> bool {
        self.full_name.is_external()
    }

    /// Effective feature policy.
    #[must_use]
    pub fn policy(&self) -> &FeaturePolicy {
        &self.policy
    }

    /// See [`FeaturePolicy::is_allowed`].
    #[must_use]
    pub fn is_allowed_feature(&self, feature: &str, allowed_above: bool) -> bool {
        self.policy.is_allowed(feature, allowed_above)
    }

    /// Free-form settings of the section.
    #[must_use]
    pub fn settings(&self) -> &toml::Table {
        &self.settings
    }

    /// Where the section was found, for diagnostics.
    #[must_use]
    pub fn section_path(&self) -> &str {
        &self.section_path
    }
}

/// A tenant domain and the remotes declared inside it.
#[derive(Debug, Clone)]
pub struct TenantDomainConfiguration {
    /// The tenant domain itself.
    pub party: Arc<PartyConfiguration>,
    /// Its remotes.
    pub remotes: Vec<Arc<PartyConfiguration>>,
}

/// Parties produced by a resolution.
#[derive(Debug, Clone, Default)]
pub struct ResolvedParties {
    /// Remote parties owned by the resolving owner.
    pub remotes: Vec<Arc<PartyConfiguration>>,
    /// Tenant domains, always owned by the root.
    pub tenant_domains: Vec<TenantDomainConfiguration>,
}

impl ResolvedParties {
    /// True when nothing was declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.remotes.is_empty() && self.tenant_domains.is_empty()
    }

    /// Every full name, tenant remotes included.
    pub fn full_names(&self) -> impl Iterator<Item = &FullName> {
        self.remotes.iter().map(|r| r.full_name()).chain(
            self.tenant_domains.iter().flat_map(|t| {
                std::iter::once(t.party.full_name()).chain(t.remotes.iter().map(|r| r.full_name()))
            }),
        )
    }
}

/// Resolved root section.
#[derive(Debug, Clone)]
pub struct ResolvedRoot {
    /// Root configuration.
    pub root: Arc<PartyConfiguration>,
    /// Statically declared parties.
    pub parties: ResolvedParties,
}

/// Resolves the root section and everything it declares.
///
/// # Errors
///
/// Returns the first [`ConfigError`] met.
pub fn resolve_root(section: &PartySection) -> Result<ResolvedRoot, ConfigError> {
    let path = "root";
    let names = read_names(
        section,
        path,
        Some(DEFAULT_DOMAIN_NAME),
        Some(DEFAULT_PARTY_NAME),
        DEFAULT_ENVIRONMENT_NAME,
    )?;
    let party = names.party.as_deref().unwrap_or(DEFAULT_PARTY_NAME);
    let full_name = FullName::new(&names.domain, party, &names.environment)
        .map_err(|e| ConfigError::invalid_name(path, e))?;
    if full_name.is_external() {
        return Err(ConfigError::ExternalRoot);
    }
    let policy = inherit_policy(&FeaturePolicy::default(), section, path)?;

    let root = Arc::new(PartyConfiguration {
        kind: PartyKind::Root,
        full_name,
        address: None,
        policy,
        settings: section.settings.clone(),
        section_path: path.to_string(),
    });

    let mut resolver = Resolver::default();
    resolver.index(root.full_name(), path)?;
    let mut parties = ResolvedParties::default();
    let scope = Scope::of(&root);
    for (i, child) in section.parties.iter().enumerate() {
        resolver.read(child, &format!("{path}.parties[{i}]"), &scope, &mut parties)?;
    }
    debug!(
        root = %root.full_name(),
        remotes = parties.remotes.len(),
        tenant_domains = parties.tenant_domains.len(),
        "Resolved root configuration"
    );
    Ok(ResolvedRoot { root, parties })
}

/// Resolves an increment relative to an existing owner.
///
/// The increment is read as if it were a section nested in the owner's
/// own: it may be a single party or a pure group. Duplicates are only
/// checked inside the increment; checking against the live graph is the
/// caller's job.
///
/// # Errors
///
/// Returns the first [`ConfigError`] met.
pub fn resolve_increment(
    owner: &PartyConfiguration,
    increment: &PartySection,
) -> Result<ResolvedParties, ConfigError> {
    let mut parties = ResolvedParties::default();
    Resolver::default().read(increment, "increment", &Scope::of(owner), &mut parties)?;
    Ok(parties)
}

struct Names {
    domain: String,
    party: Option<String>,
    environment: String,
}

struct Scope {
    domain: String,
    environment: String,
    policy: FeaturePolicy,
}

impl Scope {
    fn of(owner: &PartyConfiguration) -> Self {
        Self {
            domain: owner.domain_name().to_string(),
            environment: owner.environment_name().to_string(),
            policy: owner.policy().clone(),
        }
    }
}

#[derive(Default)]
struct Resolver {
    /// Lowercased full name → section path.
    names: HashMap<String, String>,
}

impl Resolver {
    fn index(&mut self, full_name: &FullName, path: &str) -> Result<(), ConfigError> {
        if let Some(existing) = self.names.get(full_name.key()) {
            return Err(ConfigError::DuplicateParty {
                full_name: full_name.to_string(),
                section: path.to_string(),
                existing: existing.clone(),
            });
        }
        self.names
            .insert(full_name.key().to_string(), path.to_string());
        Ok(())
    }

    fn read(
        &mut self,
        section: &PartySection,
        path: &str,
        scope: &Scope,
        out: &mut ResolvedParties,
    ) -> Result<(), ConfigError> {
        let names = read_names(
            section,
            path,
            Some(scope.domain.as_str()),
            None,
            &scope.environment,
        )?;
        let policy = inherit_policy(&scope.policy, section, path)?;
        let inner = Scope {
            domain: names.domain.clone(),
            environment: names.environment.clone(),
            policy: policy.clone(),
        };

        let Some(party) = names.party else {
            debug!(section = path, "Party group found");
            for (i, child) in section.parties.iter().enumerate() {
                self.read(child, &format!("{path}.parties[{i}]"), &inner, out)?;
            }
            return Ok(());
        };

        let full_name = FullName::new(&names.domain, &party, &names.environment)
            .map_err(|e| ConfigError::invalid_name(path, e))?;
        self.index(&full_name, path)?;
        let is_domain = section.address.is_none() && full_name.names_its_domain();

        let kind = if is_domain {
            PartyKind::TenantDomain
        } else {
            PartyKind::Remote
        };
        let configuration = Arc::new(PartyConfiguration {
            kind,
            full_name,
            address: section.address.clone(),
            policy,
            settings: section.settings.clone(),
            section_path: path.to_string(),
        });

        if is_domain {
            let mut nested = ResolvedParties::default();
            for (i, child) in section.parties.iter().enumerate() {
                self.read(child, &format!("{path}.parties[{i}]"), &inner, &mut nested)?;
            }
            out.tenant_domains.extend(nested.tenant_domains);
            out.tenant_domains.push(TenantDomainConfiguration {
                party: configuration,
                remotes: nested.remotes,
            });
        } else {
            if !section.parties.is_empty() {
                warn!(section = path, "Nested parties of a remote party are ignored");
            }
            out.remotes.push(configuration);
        }
        Ok(())
    }
}

fn inherit_policy(
    parent: &FeaturePolicy,
    section: &PartySection,
    path: &str,
) -> Result<FeaturePolicy, ConfigError> {
    FeaturePolicy::inherit(parent, &section.allow_features, &section.disallow_features).map_err(
        |features| ConfigError::FeatureOverlap {
            section: path.to_string(),
            features,
        },
    )
}

fn read_names(
    section: &PartySection,
    path: &str,
    default_domain: Option<&str>,
    default_party: Option<&str>,
    default_environment: &str,
) -> Result<Names, ConfigError> {
    let invalid = |e| ConfigError::invalid_name(path, e);

    let own_party = section
        .party_name
        .as_deref()
        .map(normalize_party_name)
        .transpose()
        .map_err(invalid)?;
    let own_environment = section
        .environment_name
        .as_deref()
        .map(normalize_environment_name)
        .transpose()
        .map_err(invalid)?;

    let Some(full_name) = section.full_name.as_deref() else {
        let domain = match (section.domain_name.as_deref(), default_domain) {
            (Some(domain), _) => normalize_domain_name(domain).map_err(invalid)?,
            (None, Some(domain)) => domain.to_string(),
            (None, None) => return Err(ConfigError::name_conflict(path, "domain_name is required")),
        };
        return Ok(Names {
            domain,
            party: own_party.or_else(|| default_party.map(str::to_string)),
            environment: own_environment.unwrap_or_else(|| default_environment.to_string()),
        });
    };

    let parts = NameParts::parse(full_name).map_err(invalid)?;
    if section.domain_name.is_some() {
        return Err(ConfigError::name_conflict(
            path,
            "domain_name cannot be used when full_name is defined",
        ));
    }
    let party = match (parts.party, own_party) {
        (Some(_), Some(_)) => {
            return Err(ConfigError::name_conflict(
                path,
                "party_name cannot be used when full_name defines it",
            ))
        }
        (Some(party), None) | (None, Some(party)) => Some(party),
        (None, None) => default_party.map(str::to_string),
    };
    let environment = match (parts.environment, own_environment) {
        (Some(_), Some(_)) => {
            return Err(ConfigError::name_conflict(
                path,
                "environment_name cannot be used when full_name defines it",
            ))
        }
        (Some(environment), None) | (None, Some(environment)) => environment,
        (None, None) => default_environment.to_string(),
    };
    Ok(Names {
        domain: parts.domain,
        party,
        environment,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root_section() -> PartySection {
        PartySection::full("D/$P")
    }

    #[test]
    fn empty_root_uses_defaults() {
        let resolved = resolve_root(&PartySection::default()).expect("valid root");
        assert_eq!(resolved.root.full_name().to_string(), "Undefined/$Undefined/#Dev");
        assert!(resolved.parties.is_empty());
    }

    #[test]
    fn remotes_inherit_domain_and_environment() {
        let section = PartySection::party("P")
            .with_domain("D")
            .with_environment("Prod")
            .with_party(PartySection::party("Billing").with_address("tcp://b"));
        let resolved = resolve_root(&section).expect("valid root");
        let remote = &resolved.parties.remotes[0];
        assert_eq!(remote.full_name().to_string(), "D/$Billing/#Prod");
        assert_eq!(remote.kind(), PartyKind::Remote);
        assert_eq!(remote.address(), Some("tcp://b"));
        assert_eq!(remote.section_path(), "root.parties[0]");
    }

    #[test]
    fn tenant_domain_detection() {
        let section = root_section()
            .with_party(PartySection::full("Acme/$Acme").with_party(PartySection::party("Crm")))
            .with_party(PartySection::full("Acme/$Acme2"))
            .with_party(PartySection::full("Beta/$Beta").with_address("tcp://beta"));
        let resolved = resolve_root(&section).expect("valid root");

        assert_eq!(resolved.parties.tenant_domains.len(), 1);
        let tenant = &resolved.parties.tenant_domains[0];
        assert_eq!(tenant.party.kind(), PartyKind::TenantDomain);
        assert_eq!(tenant.remotes[0].full_name().to_string(), "Acme/$Crm/#Dev");

        // A party name differing from the domain, or an address, makes a remote.
        let remotes: Vec<_> = resolved
            .parties
            .remotes
            .iter()
            .map(|r| r.full_name().to_string())
            .collect();
        assert_eq!(remotes, vec!["Acme/$Acme2/#Dev", "Beta/$Beta/#Dev"]);
    }

    #[test]
    fn pure_groups_pass_names_down() {
        let section = root_section().with_party(
            PartySection::group([PartySection::party("A"), PartySection::party("B")])
                .with_domain("G")
                .disallow("Sign"),
        );
        let resolved = resolve_root(&section).expect("valid root");
        let names: Vec<_> = resolved
            .parties
            .remotes
            .iter()
            .map(|r| r.full_name().to_string())
            .collect();
        assert_eq!(names, vec!["G/$A/#Dev", "G/$B/#Dev"]);
        assert!(!resolved.parties.remotes[0].is_allowed_feature("Sign", true));
    }

    #[test]
    fn nested_tenants_are_lifted() {
        let section = root_section().with_party(
            PartySection::full("A/$A").with_party(PartySection::full("A/B/$B")),
        );
        let resolved = resolve_root(&section).expect("valid root");
        let tenants: Vec<_> = resolved
            .parties
            .tenant_domains
            .iter()
            .map(|t| t.party.full_name().to_string())
            .collect();
        assert_eq!(tenants, vec!["A/B/$B/#Dev", "A/$A/#Dev"]);
    }

    #[test]
    fn duplicates_are_rejected_case_insensitively() {
        let section = root_section()
            .with_party(PartySection::full("X/$One"))
            .with_party(PartySection::full("x/$ONE"));
        let err = resolve_root(&section).expect_err("duplicate");
        assert!(matches!(err, ConfigError::DuplicateParty { ref existing, .. } if existing == "root.parties[0]"));
    }

    #[test]
    fn root_name_collides_with_its_parties() {
        let section = root_section().with_party(PartySection::full("d/$p"));
        assert!(matches!(
            resolve_root(&section),
            Err(ConfigError::DuplicateParty { .. })
        ));
    }

    #[test]
    fn external_root_is_rejected() {
        let err = resolve_root(&PartySection::full("External/$Me")).expect_err("external root");
        assert!(matches!(err, ConfigError::ExternalRoot));
    }

    #[test]
    fn conflicting_name_fields_are_rejected() {
        let section = root_section().with_party(PartySection::full("A/$X").with_domain("B"));
        assert!(matches!(
            resolve_root(&section),
            Err(ConfigError::NameConflict { .. })
        ));

        let mut section = PartySection::full("A/$X");
        section.party_name = Some("Y".into());
        assert!(matches!(
            resolve_root(&section),
            Err(ConfigError::NameConflict { .. })
        ));
    }

    #[test]
    fn increment_is_relative_to_owner() {
        let root = resolve_root(&root_section()).expect("valid root").root;
        let resolved =
            resolve_increment(&root, &PartySection::party("P1")).expect("valid increment");
        assert_eq!(resolved.remotes[0].full_name().to_string(), "D/$P1/#Dev");

        // The increment is not checked against the owner itself.
        let resolved =
            resolve_increment(&root, &PartySection::full("D/$P")).expect("valid increment");
        assert_eq!(resolved.full_names().count(), 1);
    }

    #[test]
    fn feature_overlap_is_reported_with_its_section() {
        let section = root_section().with_party(PartySection::party("A").allow("X").disallow("x"));
        let err = resolve_root(&section).expect_err("overlap");
        assert!(
            matches!(err, ConfigError::FeatureOverlap { ref section, .. } if section == "root.parties[0]")
        );
    }
}
