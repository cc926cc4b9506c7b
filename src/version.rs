mod build_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

/// Returns the main version identifier as used for releases, e.g. `v0.1`.
pub(crate) fn identifier() -> String {
    let digits = build_info::PKG_VERSION.strip_suffix(".0")
        .expect("Cargo package version does not end in '.0'");

    format!("v{digits}")
}

/// Returns an RFC 2822 formatted date of the build time in UTC.
pub(crate) fn build_time_utc() -> &'static str {
    build_info::BUILT_TIME_UTC
}

/// Returns the commit hash this was built from, or `None` when built outside
/// of a git checkout (e.g. from a source tarball).
pub(crate) fn git_commit_hash() -> Option<&'static str> {
    build_info::GIT_COMMIT_HASH
}

/// Returns whether the git working directory was dirty when this was built.
pub(crate) fn git_was_dirty() -> bool {
    build_info::GIT_DIRTY == Some(true)
}

/// Returns a string containing all version-related information.
pub(crate) fn full() -> String {
    let git = match git_commit_hash() {
        Some(hash) => format!("{}{}", hash, if git_was_dirty() { ", dirty" } else { "" }),
        None => "unknown commit".into(),
    };

    format!("{} ({git}), built {}", identifier(), build_time_utc())
}
