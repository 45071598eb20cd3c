//! The catalog's data shape and pure resolution logic (§4.A).
//!
//! Every operation here is a read over an immutable [`TargetsDef`]; none of
//! them touch I/O. Loading and refreshing live in [`crate::refresh`].

use std::collections::BTreeMap;

use semver::{Version, VersionReq};
use serde::{Deserialize, Serialize};

use cbuild_protocol::{error::CatalogError, job::BuildFlag, request::RequestFlag};

/// Greater than any version a real release will carry, so `nightly` always
/// satisfies a target's `version_constraint` and never falls into
/// `exclude_targets` over a version bound.
pub fn nightly_version() -> Version {
    Version::new(u64::MAX, 0, 0)
}

pub const NIGHTLY_REF: &str = "nightly";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Release {
    pub sha: Option<String>,
    #[serde(default)]
    pub exclude_targets: Vec<String>,
    pub build_container: String,
    pub version: String,
    /// Populated from `sha`/fetched remote, or from [`nightly_version`] when
    /// `version == "nightly"`. Filled in at load time, not deserialized.
    #[serde(skip)]
    pub parsed_version: Option<Version>,
    /// Set at load time when the config carried no explicit `sha` (§4.A).
    /// Only these releases are re-resolved by the background refresher —
    /// one with an explicitly pinned `sha` stays pinned.
    #[serde(skip)]
    pub remote_backed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionFlagDef {
    pub build_flag: String,
    pub values: Vec<String>,
}

impl OptionFlagDef {
    fn has_value(&self, value: &str) -> bool {
        self.values.iter().any(|v| v == value)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Target {
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub build_flags: BTreeMap<String, String>,
    pub version_constraint: Option<String>,
    #[serde(skip)]
    pub parsed_constraint: Option<VersionReq>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TargetsDef {
    pub releases: BTreeMap<String, Release>,
    #[serde(default, rename = "flags")]
    pub option_flags: BTreeMap<String, OptionFlagDef>,
    #[serde(default)]
    pub tags: BTreeMap<String, BTreeMap<String, OptionFlagDef>>,
    pub targets: BTreeMap<String, Target>,
}

impl TargetsDef {
    pub fn is_ref_supported(&self, release_ref: &str) -> bool {
        self.releases.contains_key(release_ref)
    }

    pub fn is_target_supported(&self, target: &str, release_ref: &str) -> bool {
        let Some(release) = self.releases.get(release_ref) else {
            return false;
        };
        if release.exclude_targets.iter().any(|t| t == target) {
            return false;
        }
        let Some(target_def) = self.targets.get(target) else {
            return false;
        };
        match (&target_def.parsed_constraint, &release.parsed_version) {
            (Some(constraint), Some(version)) => constraint.matches(version),
            (Some(_), None) => false,
            (None, _) => true,
        }
    }

    pub fn is_option_supported(&self, target: &str, name: &str, value: &str) -> bool {
        if let Some(def) = self.option_flags.get(name) {
            if def.has_value(value) {
                return true;
            }
        }
        let Some(target_def) = self.targets.get(target) else {
            return false;
        };
        for tag in &target_def.tags {
            if let Some(scoped) = self.tags.get(tag) {
                if let Some(def) = scoped.get(name) {
                    if def.has_value(value) {
                        return true;
                    }
                }
            }
        }
        false
    }

    pub fn resolve_commit(&self, release_ref: &str) -> Option<String> {
        self.releases.get(release_ref).and_then(|r| r.sha.clone())
    }

    pub fn build_container(&self, release_ref: &str) -> Option<String> {
        self.releases
            .get(release_ref)
            .map(|r| r.build_container.clone())
    }

    /// Every target name excluded from `release_ref` either explicitly (its
    /// `exclude_targets` list) or because the target's `version_constraint`
    /// does not admit the release's version.
    pub fn exclude_targets(&self, release_ref: &str) -> Vec<String> {
        let Some(release) = self.releases.get(release_ref) else {
            return Vec::new();
        };
        let mut excluded: Vec<String> = release.exclude_targets.clone();
        for (name, target) in &self.targets {
            if excluded.iter().any(|t| t == name) {
                continue;
            }
            let admitted = match (&target.parsed_constraint, &release.parsed_version) {
                (Some(constraint), Some(version)) => constraint.matches(version),
                (Some(_), None) => false,
                (None, _) => true,
            };
            if !admitted {
                excluded.push(name.clone());
            }
        }
        excluded
    }

    /// The target's intrinsic `build_flags`, then each request option mapped
    /// through the applicable scope (global, else target-tag), per §4.A.
    pub fn resolve_build_flags(
        &self,
        target: &str,
        request_options: &[RequestFlag],
    ) -> Result<Vec<BuildFlag>, CatalogError> {
        let target_def = self
            .targets
            .get(target)
            .ok_or_else(|| CatalogError::TargetNotSupported(target.to_string()))?;

        let mut resolved: Vec<BuildFlag> = target_def
            .build_flags
            .iter()
            .map(|(key, value)| BuildFlag {
                key: key.clone(),
                value: value.clone(),
            })
            .collect();

        for opt in request_options {
            let build_flag_key = self
                .option_flags
                .get(&opt.name)
                .filter(|def| def.has_value(&opt.value))
                .map(|def| def.build_flag.clone())
                .or_else(|| {
                    target_def.tags.iter().find_map(|tag| {
                        self.tags.get(tag).and_then(|scoped| {
                            scoped
                                .get(&opt.name)
                                .filter(|def| def.has_value(&opt.value))
                                .map(|def| def.build_flag.clone())
                        })
                    })
                })
                .ok_or_else(|| CatalogError::OptionFlagNotSupported {
                    name: opt.name.clone(),
                    value: opt.value.clone(),
                })?;
            resolved.push(BuildFlag {
                key: build_flag_key,
                value: opt.value.clone(),
            });
        }

        Ok(resolved)
    }
}

/// Parses each release's `version` (or assigns [`nightly_version`]) and each
/// target's `version_constraint`. Called once at load time so the pure
/// resolution methods above never touch parsing.
pub fn finalize(mut def: TargetsDef) -> Result<TargetsDef, CatalogLoadError> {
    for (release_ref, release) in def.releases.iter_mut() {
        release.parsed_version = Some(if release.version == NIGHTLY_REF {
            nightly_version()
        } else {
            Version::parse(&release.version).map_err(|e| CatalogLoadError::InvalidVersion {
                release_ref: release_ref.clone(),
                source: e,
            })?
        });
    }
    for (target_name, target) in def.targets.iter_mut() {
        if let Some(raw) = &target.version_constraint {
            target.parsed_constraint =
                Some(
                    VersionReq::parse(raw).map_err(|e| CatalogLoadError::InvalidConstraint {
                        target: target_name.clone(),
                        source: e,
                    })?,
                );
        }
    }
    Ok(def)
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogLoadError {
    #[error("release {release_ref} has an invalid version: {source}")]
    InvalidVersion {
        release_ref: String,
        #[source]
        source: semver::Error,
    },
    #[error("target {target} has an invalid version constraint: {source}")]
    InvalidConstraint {
        target: String,
        #[source]
        source: semver::Error,
    },
    #[error("release {0} has no sha and no remote resolver produced one")]
    UnresolvedSha(String),
    #[error("remote sha fetch failed for release {release_ref}: {message}")]
    RemoteFetch { release_ref: String, message: String },
}

/// `EXTRA_OPTIONS=-DKEY=VALUE ...` rendering for the firmware builder's
/// environment (§6.5, §5 supplement).
pub fn render_extra_options(flags: &[BuildFlag]) -> String {
    flags
        .iter()
        .map(|f| {
            if f.value.is_empty() {
                format!("-D{}", f.key)
            } else {
                format!("-D{}={}", f.key, f.value)
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TargetsDef {
        let mut def = TargetsDef::default();
        def.releases.insert(
            "v1.2.3".to_string(),
            Release {
                sha: Some("3ca63cbb".to_string()),
                exclude_targets: vec!["excluded_target".to_string()],
                build_container: "edgetx/build:v1.2.3".to_string(),
                version: "1.2.3".to_string(),
                parsed_version: None,
                remote_backed: false,
            },
        );
        def.option_flags.insert(
            "language".to_string(),
            OptionFlagDef {
                build_flag: "TRANSLATIONS".to_string(),
                values: vec!["FR".to_string(), "EN".to_string()],
            },
        );
        let mut target_flags = BTreeMap::new();
        target_flags.insert("RADIO".to_string(), "mydreamradio".to_string());
        def.targets.insert(
            "mydreamradio".to_string(),
            Target {
                description: "test radio".to_string(),
                tags: vec!["pocket".to_string()],
                build_flags: target_flags,
                version_constraint: None,
                parsed_constraint: None,
            },
        );
        def.tags.insert(
            "pocket".to_string(),
            BTreeMap::from([(
                "foo".to_string(),
                OptionFlagDef {
                    build_flag: "FOO".to_string(),
                    values: vec!["BAR".to_string()],
                },
            )]),
        );
        def.targets.insert(
            "excluded_target".to_string(),
            Target {
                description: "never built against v1.2.3".to_string(),
                tags: vec![],
                build_flags: BTreeMap::new(),
                version_constraint: None,
                parsed_constraint: None,
            },
        );
        finalize(def).unwrap()
    }

    #[test]
    fn ref_and_target_support() {
        let def = sample();
        assert!(def.is_ref_supported("v1.2.3"));
        assert!(!def.is_ref_supported("v9.9.9"));
        assert!(def.is_target_supported("mydreamradio", "v1.2.3"));
        assert!(!def.is_target_supported("excluded_target", "v1.2.3"));
    }

    #[test]
    fn option_support_checks_global_then_tag_scope() {
        let def = sample();
        assert!(def.is_option_supported("mydreamradio", "language", "FR"));
        assert!(def.is_option_supported("mydreamradio", "foo", "BAR"));
        assert!(!def.is_option_supported("mydreamradio", "foo", "BAZ"));
        assert!(!def.is_option_supported("mydreamradio", "nonexistent", "x"));
    }

    #[test]
    fn resolve_build_flags_combines_intrinsic_and_request_scoped() {
        let def = sample();
        let opts = vec![
            RequestFlag::new("foo", "BAR"),
            RequestFlag::new("language", "FR"),
        ];
        let resolved = def.resolve_build_flags("mydreamradio", &opts).unwrap();
        assert_eq!(resolved[0], BuildFlag { key: "RADIO".into(), value: "mydreamradio".into() });
        assert_eq!(resolved[1], BuildFlag { key: "FOO".into(), value: "BAR".into() });
        assert_eq!(resolved[2], BuildFlag { key: "TRANSLATIONS".into(), value: "FR".into() });
    }

    #[test]
    fn resolve_build_flags_rejects_unknown_option() {
        let def = sample();
        let opts = vec![RequestFlag::new("bogus", "x")];
        assert!(matches!(
            def.resolve_build_flags("mydreamradio", &opts),
            Err(CatalogError::OptionFlagNotSupported { .. })
        ));
    }

    #[test]
    fn exclude_targets_includes_explicit_and_version_gated() {
        let mut def = sample();
        def.targets.get_mut("mydreamradio").unwrap().version_constraint =
            Some(">=2.0.0".to_string());
        let def = finalize(def).unwrap();
        let excluded = def.exclude_targets("v1.2.3");
        assert!(excluded.contains(&"excluded_target".to_string()));
        assert!(excluded.contains(&"mydreamradio".to_string()));
    }

    #[test]
    fn nightly_beats_every_real_version() {
        let req = VersionReq::parse(">=1.0.0").unwrap();
        assert!(req.matches(&nightly_version()));
    }

    #[test]
    fn render_extra_options_matches_builder_env_shape() {
        let flags = vec![
            BuildFlag { key: "FOO".into(), value: "BAR".into() },
            BuildFlag { key: "LTO".into(), value: "".into() },
        ];
        assert_eq!(render_extra_options(&flags), "-DFOO=BAR -DLTO");
    }
}
