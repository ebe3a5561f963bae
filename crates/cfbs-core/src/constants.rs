//! Constants used across the cfbs workspace.

/// The filename of a cfbs project.
pub const CFBS_FILE: &str = "cfbs.json";

/// The public CFEngine Build module index.
pub const DEFAULT_INDEX_URL: &str =
    "https://raw.githubusercontent.com/cfengine/build-index/master/cfbs.json";

/// Per-version commit and checksum data for the public index.
pub const DEFAULT_VERSIONS_URL: &str =
    "https://raw.githubusercontent.com/cfengine/build-index/master/versions.json";

/// Base URL of the pre-packaged module archives.
pub const DEFAULT_MODULES_URL: &str = "https://archive.build.cfengine.com/modules";

/// Upstream repository of the default policy set.
pub const MASTERFILES_REMOTE: &str = "https://github.com/cfengine/masterfiles";

/// Schemes accepted when adding modules by URL.
pub const SUPPORTED_URI_SCHEMES: &[&str] = &["https://", "ssh://", "git://"];

/// Archive formats accepted when adding modules by URL.
pub const SUPPORTED_ARCHIVES: &[&str] = &[".zip", ".tar.gz", ".tgz", ".tar", ".tar.bz2", ".tar.xz"];

/// Keys understood at the top level of `cfbs.json`, in canonical order.
pub const TOP_LEVEL_KEYS: &[&str] = &[
    "name",
    "description",
    "type",
    "index",
    "git",
    "provides",
    "build",
];

/// Keys understood inside a module object, in canonical order.
pub const MODULE_KEYS: &[&str] = &[
    "alias",
    "name",
    "description",
    "tags",
    "repo",
    "url",
    "by",
    "version",
    "commit",
    "subdirectory",
    "dependencies",
    "added_by",
    "steps",
    "input",
];

/// Accepted values of the top level `type` key.
pub const PROJECT_TYPES: &[&str] = &["policy-set", "index", "module"];

/// `added_by` value for modules added explicitly by the user.
pub const ADDED_BY_ADD: &str = "cfbs add";

/// `added_by` value for modules added while initializing a project.
pub const ADDED_BY_INIT: &str = "cfbs init";

/// Output directory of `cfbs build`.
pub const OUT_DIR: &str = "out";

/// The assembled policy set inside [`OUT_DIR`].
pub const OUT_MASTERFILES: &str = "out/masterfiles";

/// Per-module staging directories inside [`OUT_DIR`].
pub const OUT_STEPS: &str = "out/steps";

/// File name of user supplied module input.
pub const INPUT_FILE: &str = "input.json";

/// Returns true if `url` uses one of the supported remote schemes.
pub fn is_supported_uri(url: &str) -> bool {
    SUPPORTED_URI_SCHEMES.iter().any(|scheme| url.starts_with(scheme))
}

/// Returns the archive suffix of `url`, if it names a supported archive.
///
/// Longer suffixes win, so `x.tar.gz` reports `.tar.gz` rather than `.gz`.
pub fn archive_suffix(url: &str) -> Option<&'static str> {
    SUPPORTED_ARCHIVES
        .iter()
        .filter(|ext| url.ends_with(*ext))
        .max_by_key(|ext| ext.len())
        .copied()
}
