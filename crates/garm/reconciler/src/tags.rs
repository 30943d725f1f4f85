//! Canonical tag set of a pool
//!
//! The backend injects `self-hosted` plus OS and architecture labels on
//! every pool. The declared tags are merged with those, deduplicated and
//! sorted so the result can be compared for exact equality.

use crate::error::{ReconcileError, Result};
use std::collections::BTreeSet;

pub const SELF_HOSTED: &str = "self-hosted";

fn arch_alias(os_arch: &str) -> Option<&'static str> {
    match os_arch {
        "amd64" => Some("x64"),
        "arm64" => Some("arm64"),
        "arm" => Some("arm"),
        "386" => Some("x86"),
        _ => None,
    }
}

fn os_alias(os_type: &str) -> Option<&'static str> {
    match os_type {
        "linux" => Some("linux"),
        "windows" => Some("windows"),
        _ => None,
    }
}

/// Platform-mandatory tags for an OS type and architecture
pub fn platform_tags(os_arch: &str, os_type: &str) -> Result<[&'static str; 3]> {
    let arch =
        arch_alias(os_arch).ok_or_else(|| ReconcileError::UnsupportedOsArch(os_arch.to_string()))?;
    let os = os_alias(os_type).ok_or_else(|| ReconcileError::UnsupportedOsType(os_type.to_string()))?;
    Ok([SELF_HOSTED, arch, os])
}

/// Declared tags merged with platform tags, deduplicated and sorted
pub fn normalize_tags(tags: &[String], os_arch: &str, os_type: &str) -> Result<Vec<String>> {
    let platform = platform_tags(os_arch, os_type)?;

    let set: BTreeSet<String> = tags
        .iter()
        .map(String::as_str)
        .chain(platform)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect();

    Ok(set.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn strings(tags: &[&str]) -> Vec<String> {
        tags.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn test_arm64_linux_example() {
        let tags = normalize_tags(&strings(&["ubuntu"]), "arm64", "linux").unwrap();
        assert_eq!(tags, strings(&["arm64", "linux", "self-hosted", "ubuntu"]));
    }

    #[test]
    fn test_duplicates_of_platform_tags_collapse() {
        let tags =
            normalize_tags(&strings(&["x64", "self-hosted", "gpu", "gpu"]), "amd64", "windows")
                .unwrap();
        assert_eq!(tags, strings(&["gpu", "self-hosted", "windows", "x64"]));
    }

    #[test]
    fn test_unsupported_platform_is_an_error() {
        assert!(matches!(
            normalize_tags(&[], "riscv64", "linux"),
            Err(ReconcileError::UnsupportedOsArch(_))
        ));
        assert!(matches!(
            normalize_tags(&[], "amd64", "darwin"),
            Err(ReconcileError::UnsupportedOsType(_))
        ));
    }

    proptest! {
        #[test]
        fn normalization_ignores_declared_order(
            mut tags in prop::collection::vec("[a-z0-9-]{1,12}", 0..12),
            arch in prop_oneof![Just("amd64"), Just("arm64"), Just("arm"), Just("386")],
            os in prop_oneof![Just("linux"), Just("windows")],
        ) {
            let forward = normalize_tags(&tags, arch, os).unwrap();
            tags.reverse();
            let reversed = normalize_tags(&tags, arch, os).unwrap();
            prop_assert_eq!(&forward, &reversed);

            let mut sorted = forward.clone();
            sorted.sort();
            sorted.dedup();
            prop_assert_eq!(&forward, &sorted);
            prop_assert!(forward.iter().any(|t| t == SELF_HOSTED));
        }
    }
}
