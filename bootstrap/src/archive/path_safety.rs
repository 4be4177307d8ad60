//! Member-name validation and destination containment.
//!
//! Two independent checks guard every write. Raw member names are
//! validated before any top-level stripping, and the final joined path is
//! resolved against the canonical destination root just before the write.

use super::error::ExtractionError;
use super::reader::{MemberInfo, MemberKind};
use std::path::{Component, Path, PathBuf};

/// Split an archive member name into its meaningful segments.
///
/// Empty segments (from doubled or trailing slashes) and `.` are dropped.
/// Backslashes are treated as separators so that zip archives produced on
/// Windows are interpreted the same way on every host.
fn segments(name: &str) -> impl Iterator<Item = &str> {
    name.split(['/', '\\'])
        .filter(|segment| !segment.is_empty() && *segment != ".")
}

/// Reject absolute member names and any name with a `..` segment.
///
/// # Errors
///
/// Returns [`ExtractionError::PathTraversal`] naming the raw member.
///
/// # Examples
///
/// ```
/// use thirdparty_bootstrap::archive::path_safety::validate_member_name;
///
/// assert!(validate_member_name("pkg-1.0/src/a.c").is_ok());
/// assert!(validate_member_name("../../etc/passwd").is_err());
/// assert!(validate_member_name("/etc/passwd").is_err());
/// ```
pub fn validate_member_name(name: &str) -> Result<(), ExtractionError> {
    let traversal = || ExtractionError::PathTraversal {
        path: name.to_owned(),
    };

    if name.starts_with(['/', '\\']) || has_drive_prefix(name) {
        return Err(traversal());
    }
    if Path::new(name)
        .components()
        .any(|c| matches!(c, Component::Prefix(_) | Component::RootDir))
    {
        return Err(traversal());
    }
    if name.split(['/', '\\']).any(|segment| segment == "..") {
        return Err(traversal());
    }
    Ok(())
}

/// Detect `C:`-style drive prefixes regardless of host platform.
fn has_drive_prefix(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(
        (chars.next(), chars.next()),
        (Some(letter), Some(':')) if letter.is_ascii_alphabetic()
    )
}

/// Infer the single top-level directory shared by every member.
///
/// Returns `None` when the archive is empty, when members disagree on the
/// first segment, or when the only shared segment is a plain file rather
/// than a directory. Special entries such as pax global headers never
/// take part in the vote.
#[must_use]
pub fn detect_top(members: &[MemberInfo]) -> Option<String> {
    let mut top: Option<&str> = None;
    let mut is_directory = false;

    for member in members.iter().filter(|m| m.kind != MemberKind::Other) {
        let mut parts = segments(&member.name);
        let Some(first) = parts.next() else {
            continue;
        };
        match top {
            None => top = Some(first),
            Some(existing) if existing != first => return None,
            Some(_) => {}
        }
        if parts.next().is_some() || member.kind == MemberKind::Directory {
            is_directory = true;
        }
    }

    top.filter(|_| is_directory).map(str::to_owned)
}

/// Return true when at least one member lives under `top`.
#[must_use]
pub fn contains_top(members: &[MemberInfo], top: &str) -> bool {
    let top_segments: Vec<&str> = segments(top).collect();
    !top_segments.is_empty()
        && members
            .iter()
            .any(|member| starts_with_segments(&member.name, &top_segments))
}

fn starts_with_segments(name: &str, prefix: &[&str]) -> bool {
    let mut parts = segments(name);
    prefix.iter().all(|expected| parts.next() == Some(*expected))
}

/// Remove `top` from the front of a member name.
///
/// The result is a `/`-joined relative path; an empty string denotes the
/// destination root. Names outside `top` keep their full relative path.
///
/// # Examples
///
/// ```
/// use thirdparty_bootstrap::archive::path_safety::strip_top;
///
/// assert_eq!(strip_top("foo-2.0/src/a.c", Some("foo-2.0")), "src/a.c");
/// assert_eq!(strip_top("foo-2.0/", Some("foo-2.0")), "");
/// assert_eq!(strip_top("other/a.c", Some("foo-2.0")), "other/a.c");
/// assert_eq!(strip_top("foo-2.0x/a.c", Some("foo-2.0")), "foo-2.0x/a.c");
/// ```
#[must_use]
pub fn strip_top(name: &str, top: Option<&str>) -> String {
    let parts: Vec<&str> = segments(name).collect();
    let Some(top) = top else {
        return parts.join("/");
    };
    let top_segments: Vec<&str> = segments(top).collect();
    if !top_segments.is_empty() && parts.starts_with(&top_segments) {
        parts.get(top_segments.len()..).unwrap_or_default().join("/")
    } else {
        parts.join("/")
    }
}

/// Join `relative` onto the destination and prove the result stays inside.
///
/// `root` must already be canonical. The deepest existing ancestor of the
/// joined path is canonicalised, so links planted in already-extracted
/// directories are followed before the containment check.
///
/// # Errors
///
/// Returns [`ExtractionError::PathTraversal`] when the resolved path does
/// not start with `root`, or [`ExtractionError::Io`] when canonicalisation
/// fails for a reason other than the path not existing yet.
pub fn resolve_within(root: &Path, relative: &str) -> Result<PathBuf, ExtractionError> {
    let joined = segments(relative).fold(root.to_path_buf(), |path, segment| path.join(segment));

    let mut existing = joined.as_path();
    let mut pending = Vec::new();
    let canonical_base = loop {
        match existing.canonicalize() {
            Ok(canonical) => break canonical,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                let (Some(parent), Some(name)) = (existing.parent(), existing.file_name()) else {
                    return Err(ExtractionError::PathTraversal {
                        path: joined.display().to_string(),
                    });
                };
                pending.push(name.to_owned());
                existing = parent;
            }
            Err(err) => return Err(ExtractionError::Io(err)),
        }
    };

    let resolved = pending
        .iter()
        .rev()
        .fold(canonical_base, |path, segment| path.join(segment));

    if resolved.starts_with(root) {
        Ok(resolved)
    } else {
        Err(ExtractionError::PathTraversal {
            path: resolved.display().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn file(name: &str) -> MemberInfo {
        MemberInfo::new(name, MemberKind::File)
    }

    fn dir(name: &str) -> MemberInfo {
        MemberInfo::new(name, MemberKind::Directory)
    }

    #[rstest]
    #[case::parent_dir("../escape.txt")]
    #[case::nested_parent("foo/../../escape.txt")]
    #[case::trailing_parent("foo/..")]
    #[case::absolute("/etc/passwd")]
    #[case::backslash_absolute("\\windows\\system32")]
    #[case::backslash_parent("foo\\..\\..\\escape.txt")]
    #[case::drive_prefix("C:/Windows/evil.dll")]
    fn rejects_unsafe_member_names(#[case] name: &str) {
        let result = validate_member_name(name);
        assert!(
            matches!(result, Err(ExtractionError::PathTraversal { .. })),
            "expected PathTraversal for {name}"
        );
    }

    #[rstest]
    #[case::nested("pkg-1.0/src/a.c")]
    #[case::dot_prefix("./pkg-1.0/README")]
    #[case::dots_in_name("pkg-1.0/..hidden/file")]
    #[case::directory("pkg-1.0/")]
    fn accepts_safe_member_names(#[case] name: &str) {
        assert!(validate_member_name(name).is_ok(), "{name} should be safe");
    }

    #[test]
    fn detect_top_finds_single_shared_directory() {
        let members = vec![dir("foo-2.0/"), file("foo-2.0/README"), file("foo-2.0/src/a.c")];
        assert_eq!(detect_top(&members).as_deref(), Some("foo-2.0"));
    }

    #[test]
    fn detect_top_without_explicit_directory_entry() {
        let members = vec![file("./foo-2.0/README"), file("foo-2.0/src/a.c")];
        assert_eq!(detect_top(&members).as_deref(), Some("foo-2.0"));
    }

    #[test]
    fn detect_top_ignores_pax_global_header() {
        let members = vec![
            MemberInfo::new("pax_global_header", MemberKind::Other),
            dir("glfw-3.4/"),
            file("glfw-3.4/CMakeLists.txt"),
        ];
        assert_eq!(detect_top(&members).as_deref(), Some("glfw-3.4"));
    }

    #[test]
    fn detect_top_is_none_when_members_disagree() {
        let members = vec![file("foo/README"), file("bar/a.c")];
        assert_eq!(detect_top(&members), None);
    }

    #[test]
    fn detect_top_is_none_for_lone_file() {
        let members = vec![file("README")];
        assert_eq!(detect_top(&members), None);
    }

    #[test]
    fn detect_top_is_none_for_empty_archive() {
        assert_eq!(detect_top(&[]), None);
    }

    #[test]
    fn contains_top_matches_whole_segments_only() {
        let members = vec![file("foo-2.0x/README")];
        assert!(!contains_top(&members, "foo-2.0"));
        assert!(contains_top(&members, "foo-2.0x"));
    }

    #[rstest]
    #[case::strips_prefix("foo-2.0/src/a.c", Some("foo-2.0"), "src/a.c")]
    #[case::exact_top("foo-2.0", Some("foo-2.0"), "")]
    #[case::multi_segment_top("a/b/c.txt", Some("a/b"), "c.txt")]
    #[case::no_top("foo-2.0/src/a.c", None, "foo-2.0/src/a.c")]
    #[case::normalises_dots("./foo-2.0//README", Some("foo-2.0"), "README")]
    fn strip_top_cases(#[case] name: &str, #[case] top: Option<&str>, #[case] expected: &str) {
        assert_eq!(strip_top(name, top), expected);
    }

    #[test]
    fn resolve_within_accepts_new_nested_path() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let root = temp_dir.path().canonicalize().expect("canonical root");

        let resolved = resolve_within(&root, "src/deep/a.c").expect("inside root");
        assert_eq!(resolved, root.join("src").join("deep").join("a.c"));
    }

    #[test]
    fn resolve_within_maps_empty_path_to_root() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let root = temp_dir.path().canonicalize().expect("canonical root");

        assert_eq!(resolve_within(&root, "").expect("root"), root);
    }

    #[cfg(unix)]
    #[test]
    fn resolve_within_rejects_escape_through_planted_symlink() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let outside = temp_dir.path().join("outside");
        let root_dir = temp_dir.path().join("root");
        std::fs::create_dir_all(&outside).expect("create outside");
        std::fs::create_dir_all(&root_dir).expect("create root");
        std::os::unix::fs::symlink(&outside, root_dir.join("link")).expect("symlink");
        let root = root_dir.canonicalize().expect("canonical root");

        let result = resolve_within(&root, "link/payload.txt");
        assert!(matches!(result, Err(ExtractionError::PathTraversal { .. })));
    }
}
