use std::collections::BTreeMap;
use std::path::MAIN_SEPARATOR_STR;

use atrium_paths::{normalize_path_str, template};
use atrium_session::{keys, login_name, Environment, Session};
use atrium_store::{DatabaseConnection, Filter, FindOptions};
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::error::{HostError, HostResult};

/// Session entries to change, `None` meaning removal.
pub type SessionChanges = BTreeMap<String, Option<String>>;

/// Changes that move `session` to another asset, task or application.
///
/// Only values that are given, non-empty and different from the session
/// are changed. An asset change also updates `ATRIUM_SILO` and
/// `ATRIUM_HIERARCHY` from the asset document, removing them when the asset
/// has none. When anything changes and the project has a
/// `config.template.work`, `ATRIUM_WORKDIR` is recomputed from it. The
/// `{user}` field falls back to the login name found in `env`.
pub fn compute_session_changes(
    session: &Session,
    dbcon: &DatabaseConnection,
    env: &dyn Environment,
    root: Option<&str>,
    task: Option<&str>,
    asset: Option<&str>,
    app: Option<&str>,
) -> HostResult<SessionChanges> {
    let mut changes = SessionChanges::new();
    for (key, value) in [(keys::ASSET, asset), (keys::TASK, task), (keys::APP, app)] {
        if let Some(value) = value.filter(|v| !v.is_empty()) {
            if session.get(key) != Some(value) {
                changes.insert(key.to_string(), Some(value.to_string()));
            }
        }
    }
    if changes.is_empty() {
        return Ok(changes);
    }

    if let Some(Some(asset_name)) = changes.get(keys::ASSET).cloned() {
        let asset_doc = dbcon
            .find_one(
                &Filter::eq("type", "asset").and("name", asset_name.as_str()),
                &FindOptions::default(),
            )?
            .ok_or_else(|| HostError::UnknownAsset(asset_name.clone()))?;
        let parents: Vec<&str> = asset_doc
            .data_field("parents")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();
        let silo = asset_doc
            .get("silo")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        let hierarchy = Some(parents.join(MAIN_SEPARATOR_STR)).filter(|h| !h.is_empty());
        for (key, value) in [(keys::SILO, silo), (keys::HIERARCHY, hierarchy)] {
            if session.non_empty(key) != value.as_deref() {
                changes.insert(key.to_string(), value);
            }
        }
    }

    let project = dbcon.find_one(&Filter::eq("type", "project"), &FindOptions::default())?;
    let work_template = project
        .as_ref()
        .and_then(|p| p.get_path("config.template.work"))
        .and_then(Value::as_str);
    let Some(work_template) = work_template else {
        debug!("project has no work template, keeping workdir");
        return Ok(changes);
    };

    let mut next = session.clone();
    for (key, value) in &changes {
        match value {
            Some(value) => next.set(key.as_str(), value.as_str()),
            None => {
                next.remove(key);
            }
        }
    }
    let get = |key: &str| Value::from(next.get(key).unwrap_or_default());
    let mut data = Map::new();
    if let Some(root) = root {
        data.insert("root".into(), Value::from(root));
    }
    data.insert(
        "project".into(),
        json!({
            "name": next.get(keys::PROJECT).unwrap_or_default(),
            "code": project
                .as_ref()
                .and_then(|p| p.data_field("code"))
                .cloned()
                .unwrap_or(Value::Null),
        }),
    );
    data.insert("silo".into(), get(keys::SILO));
    data.insert("hierarchy".into(), get(keys::HIERARCHY));
    data.insert("asset".into(), get(keys::ASSET));
    data.insert("task".into(), get(keys::TASK));
    data.insert("app".into(), get(keys::APP));
    data.insert(
        "user".into(),
        Value::from(
            next.non_empty(keys::USER)
                .map(str::to_string)
                .or_else(|| login_name(env))
                .unwrap_or_default(),
        ),
    );

    let workdir = template::format(work_template, &data).map_err(atrium_paths::PathError::from)?;
    changes.insert(keys::WORKDIR.to_string(), Some(normalize_path_str(&workdir)));
    Ok(changes)
}
