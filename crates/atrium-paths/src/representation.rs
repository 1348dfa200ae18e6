//! Resolve a representation document to a file on disk.

use std::path::{Path, MAIN_SEPARATOR_STR};

use atrium_session::{keys, login_name};
use atrium_store::DatabaseConnection;
use atrium_types::Document;
use serde_json::{json, Map, Value};
use tracing::debug;
use walkdir::WalkDir;

use crate::normalize_path_str;
use crate::template;

/// Best-effort path of `representation`.
///
/// Three strategies run in order and the first hit wins:
/// the representation's own `data.template` and `context`, the project's
/// publish template filled from the parent chain, and finally the raw
/// `data.path` (with `#`/`%` frame patterns matched against the directory).
///
/// `root` defaults to the session's `ATRIUM_PROJECTS`.
pub fn get_representation_path(
    representation: &Document,
    root: Option<&str>,
    dbcon: &DatabaseConnection,
) -> Option<String> {
    let session_root;
    let root = match root {
        Some(root) => Some(root),
        None => {
            session_root = dbcon
                .session()
                .read()
                .expect("session lock poisoned")
                .non_empty(keys::PROJECTS)
                .map(normalize_path_str);
            session_root.as_deref()
        }
    };

    path_from_representation(representation, root)
        .or_else(|| path_from_config(representation, root, dbcon))
        .or_else(|| path_from_data(representation))
}

fn forward_slashes(path: String) -> String {
    if cfg!(windows) {
        path
    } else {
        path.replace('\\', "/")
    }
}

/// Format `data.template` with the representation's `context`.
///
/// Returns the normalized path when it exists, the raw formatted path
/// otherwise.
pub fn path_from_representation(representation: &Document, root: Option<&str>) -> Option<String> {
    let template = representation.data_field("template")?.as_str()?;
    let mut context = representation.get("context")?.as_object()?.clone();
    if let Some(root) = root {
        context.insert("root".into(), Value::from(root));
    }

    let path = match template::format(template, &context) {
        Ok(path) => forward_slashes(path),
        Err(err) => {
            debug!(error = %err, "representation template did not format");
            return None;
        }
    };
    if path.is_empty() {
        return None;
    }

    let normalized = normalize_path_str(&path);
    if Path::new(&normalized).exists() {
        Some(normalized)
    } else {
        Some(path)
    }
}

/// Fill the project's `config.template.publish` from the parent chain.
/// Only returns paths that exist.
pub fn path_from_config(
    representation: &Document,
    root: Option<&str>,
    dbcon: &DatabaseConnection,
) -> Option<String> {
    let parents = match dbcon.parenthood(representation) {
        Ok(parents) => parents,
        Err(err) => {
            debug!(error = %err, "could not walk representation parents");
            return None;
        }
    };
    let [version, subset, asset, project] = parents.as_slice() else {
        debug!(depth = parents.len(), "representation is not four levels deep");
        return None;
    };
    let template = project.get_path("config.template.publish")?.as_str()?;

    let session = dbcon.session().read().expect("session lock poisoned").clone();
    let mut data = Map::new();
    if let Some(root) = root {
        data.insert("root".into(), Value::from(root));
    }
    data.insert(
        "project".into(),
        json!({
            "name": project.name_value().cloned().unwrap_or(Value::Null),
            "code": project.data_field("code").cloned().unwrap_or(Value::Null),
        }),
    );
    let name = |doc: &Document| doc.name_value().cloned().unwrap_or(Value::Null);
    data.insert("asset".into(), name(asset));
    data.insert("silo".into(), asset.get("silo").cloned().unwrap_or(Value::Null));
    data.insert("subset".into(), name(subset));
    data.insert("version".into(), name(version));
    data.insert("representation".into(), name(representation));
    data.insert(
        "family".into(),
        representation
            .get_path("context.family")
            .cloned()
            .unwrap_or(Value::Null),
    );
    if let Some(parents) = asset.data_field("parents").and_then(Value::as_array) {
        let names: Vec<&str> = parents.iter().filter_map(Value::as_str).collect();
        if !names.is_empty() {
            data.insert("hierarchy".into(), Value::from(names.join(MAIN_SEPARATOR_STR)));
        }
    }
    let user = session
        .non_empty(keys::USER)
        .map(str::to_string)
        .or_else(|| login_name(dbcon.environment().as_ref()))
        .unwrap_or_default();
    data.insert("user".into(), Value::from(user));
    for (key, session_key) in [("app", keys::APP), ("task", keys::TASK)] {
        if let Some(value) = session.non_empty(session_key) {
            data.insert(key.into(), Value::from(value));
        }
    }

    let path = match template::format(template, &data) {
        Ok(path) => forward_slashes(path),
        Err(err) => {
            debug!(error = %err, "publish template did not format");
            return None;
        }
    };
    let normalized = normalize_path_str(&path);
    Path::new(&normalized).exists().then_some(normalized)
}

/// `os.path.splitext` semantics: a leading dot does not start an extension.
fn split_extension(file_name: &str) -> (&str, &str) {
    match file_name.rfind('.') {
        Some(idx) if file_name[..idx].chars().any(|c| c != '.') => file_name.split_at(idx),
        _ => (file_name, ""),
    }
}

/// Use `data.path` directly. A frame pattern (`shot.####.exr`,
/// `shot.%04d.exr`) resolves when any file in its directory shares the
/// prefix and extension.
pub fn path_from_data(representation: &Document) -> Option<String> {
    let path = forward_slashes(representation.data_field("path")?.as_str()?.to_string());
    if Path::new(&path).exists() {
        return Some(normalize_path_str(&path));
    }

    let as_path = Path::new(&path);
    let dir = as_path.parent().filter(|dir| dir.is_dir())?;
    let file_name = as_path.file_name()?.to_str()?;
    let (base, ext) = split_extension(file_name);

    let prefix = if base.contains('#') {
        base.split('#').find(|item| !item.is_empty())?
    } else if base.contains('%') {
        base.split('%').next()?
    } else {
        return None;
    };

    let found = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .any(|entry| {
            entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.starts_with(prefix) && name.ends_with(ext))
        });
    found.then(|| normalize_path_str(&path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use atrium_session::{MapEnvironment, Session};
    use atrium_store::{InMemoryConnector, InMemoryDocumentStore, RetryPolicy};
    use std::fs;
    use std::sync::Arc;

    fn connection(projects: &str) -> DatabaseConnection {
        let mut session = base_session(projects);
        session.set(keys::USER, "tester");
        connect(session, MapEnvironment::new())
    }

    fn base_session(projects: &str) -> Session {
        [
            (keys::DB_URL, "memory://studio"),
            (keys::PROJECT, "hulk"),
            (keys::PROJECTS, projects),
            (keys::TASK, "modeling"),
        ]
        .into_iter()
        .collect()
    }

    fn connect(session: Session, env: MapEnvironment) -> DatabaseConnection {
        let store = Arc::new(InMemoryDocumentStore::new());
        let connector = InMemoryConnector::new().with_store("studio", store);
        let conn = DatabaseConnection::new(session.into_shared())
            .with_connector(Arc::new(connector))
            .with_environment(Arc::new(env))
            .with_retry_policy(RetryPolicy::immediate());
        conn.install(false).unwrap();
        conn
    }

    fn publish_chain(conn: &DatabaseConnection, template: &str) -> Document {
        publish_chain_under(conn, template, &["characters"])
    }

    fn publish_chain_under(conn: &DatabaseConnection, template: &str, parents: &[&str]) -> Document {
        let project = Document::project("hulk")
            .with("data", json!({"code": "hlk"}))
            .with("config", json!({"template": {"publish": template}}));
        let asset = Document::asset("bruce", project.id().unwrap())
            .with_data(json!({"parents": parents}));
        let subset = Document::subset("modelDefault", asset.id().unwrap());
        let version = Document::version(3, subset.id().unwrap());
        let representation = Document::representation("ma", version.id().unwrap())
            .with("context", json!({"family": "model"}));
        conn.insert_many(vec![project, asset, subset, version, representation.clone()])
            .unwrap();
        representation
    }

    #[test]
    fn representation_template_wins() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_str().unwrap();
        let file = dir.path().join("bruce/model_v003.ma");
        fs::create_dir_all(file.parent().unwrap()).unwrap();
        fs::write(&file, b"").unwrap();

        let rep = Document::new()
            .with_data(json!({"template": "{root}/{asset}/{subset}_v{version:0>3}.{ext}"}))
            .with("context", json!({"asset": "bruce", "subset": "model", "version": 3, "ext": "ma"}));
        let path = path_from_representation(&rep, Some(root)).unwrap();
        assert_eq!(path, file.to_str().unwrap());
    }

    #[test]
    fn representation_template_returns_unnormalized_path_when_missing() {
        let rep = Document::new()
            .with_data(json!({"template": "{root}/./{asset}.{ext}"}))
            .with("context", json!({"asset": "bruce", "ext": "ma"}));
        assert_eq!(
            path_from_representation(&rep, Some("/nowhere")).unwrap(),
            "/nowhere/./bruce.ma"
        );
        assert_eq!(path_from_representation(&rep, None), None);
    }

    #[test]
    fn publish_template_needs_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_str().unwrap().to_string();
        let conn = connection(&root);
        let rep = publish_chain(
            &conn,
            "{root}/{project[name]}/{hierarchy}/{asset}/publish/{family}/{subset}/v{version:0>3}/{project[code]}_{asset}_{subset}_v{version:0>3}<_{comment}>.{representation}",
        );

        assert_eq!(path_from_config(&rep, Some(&root), &conn), None);

        let file = dir
            .path()
            .join("hulk/characters/bruce/publish/model/modelDefault/v003/hlk_bruce_modelDefault_v003.ma");
        fs::create_dir_all(file.parent().unwrap()).unwrap();
        fs::write(&file, b"").unwrap();

        assert_eq!(
            get_representation_path(&rep, None, &conn).unwrap(),
            file.to_str().unwrap()
        );
    }

    #[test]
    fn publish_template_sees_session_user_and_task() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_str().unwrap().to_string();
        let conn = connection(&root);
        let rep = publish_chain(&conn, "{root}/{user}_{task}.{representation}");
        fs::write(dir.path().join("tester_modeling.ma"), b"").unwrap();
        assert!(path_from_config(&rep, Some(&root), &conn).is_some());
    }

    #[test]
    fn publish_template_falls_back_to_the_login_name() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_str().unwrap().to_string();
        let conn = connect(base_session(&root), MapEnvironment::new().with("USER", "banner"));
        let rep = publish_chain(&conn, "{root}/{user}_{task}.{representation}");
        fs::write(dir.path().join("banner_modeling.ma"), b"").unwrap();
        assert!(path_from_config(&rep, Some(&root), &conn).is_some());
    }

    #[test]
    fn nested_hierarchy_uses_the_path_separator() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_str().unwrap().to_string();
        let conn = connection(&root);
        let rep = publish_chain_under(&conn, "{root}/{hierarchy}/{asset}.{representation}", &["characters", "heroes"]);
        let file = dir.path().join("characters").join("heroes").join("bruce.ma");
        fs::create_dir_all(file.parent().unwrap()).unwrap();
        fs::write(&file, b"").unwrap();
        assert_eq!(path_from_config(&rep, Some(&root), &conn).unwrap(), file.to_str().unwrap());
    }

    #[test]
    fn raw_path_and_frame_patterns() {
        let dir = tempfile::tempdir().unwrap();
        let plain = dir.path().join("plate.mov");
        fs::write(&plain, b"").unwrap();
        fs::write(dir.path().join("shot.1001.exr"), b"").unwrap();

        let rep = Document::new().with_data(json!({"path": plain.to_str().unwrap()}));
        assert_eq!(path_from_data(&rep).unwrap(), plain.to_str().unwrap());

        for pattern in ["shot.####.exr", "shot.%04d.exr"] {
            let path = dir.path().join(pattern);
            let rep = Document::new().with_data(json!({"path": path.to_str().unwrap()}));
            assert_eq!(path_from_data(&rep).unwrap(), path.to_str().unwrap(), "{pattern}");
        }

        let missing = dir.path().join("other.####.exr");
        let rep = Document::new().with_data(json!({"path": missing.to_str().unwrap()}));
        assert_eq!(path_from_data(&rep), None);
    }

    #[test]
    fn nothing_resolves_without_data() {
        let conn = connection("/projects");
        let rep = Document::representation("ma", atrium_types::DocumentId::new());
        assert_eq!(get_representation_path(&rep, None, &conn), None);
    }

    #[test]
    fn splitext_keeps_dotfiles_whole() {
        assert_eq!(split_extension("shot.####.exr"), ("shot.####", ".exr"));
        assert_eq!(split_extension(".hidden"), (".hidden", ""));
        assert_eq!(split_extension("noext"), ("noext", ""));
    }
}
