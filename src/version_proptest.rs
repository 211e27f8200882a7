//! Property-based tests for version parsing and repository path helpers.
//!
//! These tests use proptest to generate inputs and check that the parsing
//! and normalization invariants hold for all of them.

#[cfg(test)]
mod proptest_tests {
    use crate::path::{normalize_repo_path, sanitize_ref_segment};
    use crate::version::{parse_package_version, BuildVersion, PackageInfo};
    use proptest::prelude::*;

    // ============================================================================
    // BuildVersion property tests
    // ============================================================================

    proptest! {
        /// Property: a displayed build version parses back to itself
        #[test]
        fn build_version_display_parses_back(build in any::<u32>(), revision in any::<u32>()) {
            let version = BuildVersion::new(build, revision);
            let parsed: BuildVersion = version.to_string().parse().unwrap();
            prop_assert_eq!(parsed, version);
        }

        /// Property: dash and dot separators mean the same build
        #[test]
        fn build_version_separators_are_equivalent(build in 0u32..99_999_999, revision in 0u32..1000) {
            let dotted: BuildVersion = format!("{}.{}", build, revision).parse().unwrap();
            let dashed: BuildVersion = format!("{}-{}", build, revision).parse().unwrap();
            prop_assert_eq!(dotted, dashed);
        }

        /// Property: build versions order on (build, revision)
        #[test]
        fn build_version_orders_like_tuple(
            a in (any::<u32>(), any::<u32>()),
            b in (any::<u32>(), any::<u32>()),
        ) {
            let left = BuildVersion::new(a.0, a.1);
            let right = BuildVersion::new(b.0, b.1);
            prop_assert_eq!(left.cmp(&right), a.cmp(&b));
        }
    }

    // ============================================================================
    // Package file name property tests
    // ============================================================================

    proptest! {
        /// Property: the id and version of a well-formed file name are recovered
        #[test]
        fn package_file_name_splits_into_id_and_version(
            id in "[A-Z][a-z]{1,8}(\\.[A-Z][a-z]{1,8}){0,3}",
            major in 0u64..100,
            minor in 0u64..100,
            patch in 0u64..1000,
        ) {
            let file_name = format!("{}.{}.{}.{}.nupkg", id, major, minor, patch);
            let info = PackageInfo::parse(&file_name).unwrap();
            prop_assert_eq!(&info.library_name, &id);
            prop_assert_eq!(info.version, semver::Version::new(major, minor, patch));
            prop_assert!(!info.is_primary);
        }

        /// Property: prerelease labels stay on the version, never on the id
        #[test]
        fn package_prerelease_label_belongs_to_version(
            id in "[A-Z][a-z]{1,8}",
            label in "[a-z]{1,6}(\\.[1-9][0-9]{0,2})?",
        ) {
            let info = PackageInfo::parse(&format!("{}.1.2.3-{}.nupkg", id, label)).unwrap();
            prop_assert_eq!(&info.library_name, &id);
            prop_assert_eq!(info.version.pre.as_str(), label.as_str());
        }

        /// Property: two-part versions are padded with a zero patch
        #[test]
        fn short_versions_are_padded(major in 0u64..1000, minor in 0u64..1000) {
            let short = parse_package_version(&format!("{}.{}", major, minor)).unwrap();
            prop_assert_eq!(short, semver::Version::new(major, minor, 0));
        }
    }

    // ============================================================================
    // Repository path property tests
    // ============================================================================

    proptest! {
        /// Property: normalization is idempotent
        #[test]
        fn normalize_repo_path_is_idempotent(input in "[a-z./\\\\]{0,30}") {
            let once = normalize_repo_path(&input);
            prop_assert_eq!(normalize_repo_path(&once), once);
        }

        /// Property: normalized paths are root-relative and `/`-separated
        #[test]
        fn normalize_repo_path_is_relative(input in "[a-z./\\\\]{0,30}") {
            let result = normalize_repo_path(&input);
            prop_assert!(!result.starts_with('/'));
            prop_assert!(!result.contains('\\'));
            prop_assert!(!result.split('/').any(|s| s == ".." || s == "."));
        }

        /// Property: a sanitized ref segment never nests or contains `..`
        #[test]
        fn sanitized_ref_segment_is_single_segment(input in ".{0,40}") {
            let result = sanitize_ref_segment(&input);
            prop_assert!(!result.contains('/'));
            prop_assert!(!result.contains(".."));
            prop_assert!(!result.chars().any(char::is_whitespace));
        }
    }
}
