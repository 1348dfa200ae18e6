//! The documented table of session keys.
//!
//! Context keys describe *where* the user is working (project, asset, task)
//! and are only meaningful once a project is selected. Global keys hold
//! process-wide settings and carry defaults.

pub const PROJECTS: &str = "ATRIUM_PROJECTS";
pub const PROJECT: &str = "ATRIUM_PROJECT";
pub const ASSET: &str = "ATRIUM_ASSET";
pub const SILO: &str = "ATRIUM_SILO";
pub const TASK: &str = "ATRIUM_TASK";
pub const APP: &str = "ATRIUM_APP";
pub const WORKDIR: &str = "ATRIUM_WORKDIR";
pub const SCENEDIR: &str = "ATRIUM_SCENEDIR";
/// `asset.data.parents` joined with the path separator, e.g. `ep101/scn0010`.
pub const HIERARCHY: &str = "ATRIUM_HIERARCHY";

pub const CONFIG: &str = "ATRIUM_CONFIG";
pub const LABEL: &str = "ATRIUM_LABEL";
/// Milliseconds allowed for any connection to the outside world.
pub const TIMEOUT: &str = "ATRIUM_TIMEOUT";
pub const DB_URL: &str = "ATRIUM_DB_URL";
pub const DB: &str = "ATRIUM_DB";
pub const SENTRY: &str = "ATRIUM_SENTRY";
pub const DEADLINE: &str = "ATRIUM_DEADLINE";
pub const EARLY_ADOPTER: &str = "ATRIUM_EARLY_ADOPTER";
pub const LOCATION: &str = "ATRIUM_LOCATION";
pub const UPLOAD: &str = "ATRIUM_UPLOAD";
pub const USERNAME: &str = "ATRIUM_USERNAME";
pub const PASSWORD: &str = "ATRIUM_PASSWORD";
pub const INSTANCE_ID: &str = "ATRIUM_INSTANCE_ID";
pub const CONTAINER_ID: &str = "ATRIUM_CONTAINER_ID";
pub const DEBUG: &str = "ATRIUM_DEBUG";
pub const THUMBNAIL_ROOT: &str = "ATRIUM_THUMBNAIL_ROOT";
/// Not part of the environment table; filled from the OS user when absent.
pub const USER: &str = "ATRIUM_USER";

/// Keys that only make sense once a project and asset are selected.
pub const CONTEXT_KEYS: &[&str] = &[
    PROJECTS, PROJECT, ASSET, SILO, TASK, APP, WORKDIR, SCENEDIR, HIERARCHY,
];

/// Process-wide keys and their defaults. `None` means "omit unless set".
pub const GLOBAL_KEYS: &[(&str, Option<&str>)] = &[
    (CONFIG, Some("no_config")),
    (LABEL, Some("Atrium")),
    (TIMEOUT, Some("1000")),
    (DB_URL, Some("mongodb://localhost:27017")),
    (DB, Some("avalon")),
    (SENTRY, None),
    (DEADLINE, None),
    (EARLY_ADOPTER, None),
    (LOCATION, Some("http://127.0.0.1")),
    (UPLOAD, None),
    (USERNAME, Some("avalon")),
    (PASSWORD, Some("secret")),
    (INSTANCE_ID, Some("atrium.instance")),
    (CONTAINER_ID, Some("atrium.container")),
    (DEBUG, None),
    (THUMBNAIL_ROOT, None),
];

/// Returns `true` if `key` appears in either table.
pub fn is_recognized(key: &str) -> bool {
    CONTEXT_KEYS.contains(&key) || GLOBAL_KEYS.iter().any(|(k, _)| *k == key)
}

/// Default for a global key, if it has one.
pub fn default_for(key: &str) -> Option<&'static str> {
    GLOBAL_KEYS
        .iter()
        .find(|(k, _)| *k == key)
        .and_then(|(_, default)| *default)
}
