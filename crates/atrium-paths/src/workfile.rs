//! Find the latest workfile in a work directory.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use regex::RegexBuilder;
use serde_json::{Map, Value};
use tracing::debug;
use walkdir::WalkDir;

use crate::error::{PathError, PathResult};
use crate::normalize_path;
use crate::template::{Segment, Template};

/// Scan a work directory for files produced by a workfile template.
///
/// `{version}` matches digits, `{comment}` matches any text, `{ext}` matches
/// one of the extensions and optional groups match anything. Every other
/// placeholder must match its fill value exactly.
#[derive(Clone, Debug)]
pub struct WorkfileQuery {
    workdir: PathBuf,
    template: String,
    fill_data: Map<String, Value>,
    extensions: Vec<String>,
    case_insensitive: bool,
}

impl WorkfileQuery {
    pub fn new(workdir: impl Into<PathBuf>, template: impl Into<String>) -> Self {
        Self {
            workdir: workdir.into(),
            template: template.into(),
            fill_data: Map::new(),
            extensions: Vec::new(),
            case_insensitive: cfg!(windows) || cfg!(target_os = "macos"),
        }
    }

    pub fn with_fill_data(mut self, fill_data: Map<String, Value>) -> Self {
        self.fill_data = fill_data;
        self
    }

    pub fn with_data(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fill_data.insert(key.to_string(), value.into());
        self
    }

    /// Accepted extensions, with or without the leading dot.
    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.extensions = extensions
            .into_iter()
            .map(|ext| {
                let ext = ext.as_ref();
                if ext.starts_with('.') {
                    ext.to_string()
                } else {
                    format!(".{ext}")
                }
            })
            .collect();
        self
    }

    /// Match file names ignoring case. Defaults to on for Windows and macOS.
    pub fn with_case_insensitive(mut self, case_insensitive: bool) -> Self {
        self.case_insensitive = case_insensitive;
        self
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    fn pattern(&self, template: &Template) -> PathResult<String> {
        let ext_group = format!(
            "(?:{})",
            self.extensions
                .iter()
                .map(|ext| regex::escape(ext))
                .collect::<Vec<_>>()
                .join("|")
        );

        let segments = template.segments();
        let mut pattern = String::from("^");
        let mut has_version = false;
        for (idx, segment) in segments.iter().enumerate() {
            match segment {
                Segment::Literal(text) => {
                    // The dot in `.{ext}` is part of the extension alternation.
                    let before_ext = matches!(
                        segments.get(idx + 1),
                        Some(Segment::Field(field)) if field.key() == "ext"
                    );
                    let text = if before_ext {
                        text.strip_suffix('.').unwrap_or(text)
                    } else {
                        text
                    };
                    pattern.push_str(&regex::escape(text));
                }
                Segment::Field(field) => match field.key() {
                    "ext" => pattern.push_str(&ext_group),
                    "version" if has_version => pattern.push_str("[0-9]+"),
                    "version" => {
                        pattern.push_str("([0-9]+)");
                        has_version = true;
                    }
                    "comment" => pattern.push_str(".+?"),
                    _ => pattern.push_str(&regex::escape(&field.render(&self.fill_data)?)),
                },
                Segment::Optional(_) => pattern.push_str(".*?"),
            }
        }
        pattern.push('$');

        if !has_version {
            return Err(PathError::NoVersionPlaceholder(self.template.clone()));
        }
        Ok(pattern)
    }

    fn has_extension(&self, file_name: &str) -> bool {
        let Some(ext) = Path::new(file_name).extension().and_then(|e| e.to_str()) else {
            return false;
        };
        self.extensions.iter().any(|candidate| {
            let candidate = &candidate[1..];
            if self.case_insensitive {
                candidate.eq_ignore_ascii_case(ext)
            } else {
                candidate == ext
            }
        })
    }

    /// File name and version of the highest-versioned match. Ties on the
    /// version go to the most recently modified file.
    ///
    /// A missing work directory yields `None`.
    pub fn last_with_version(&self) -> PathResult<Option<(String, u64)>> {
        if self.extensions.is_empty() {
            return Err(PathError::NoExtensions);
        }
        let template = Template::parse(&self.template)?;
        let pattern = self.pattern(&template)?;
        if !self.workdir.is_dir() {
            debug!(workdir = %self.workdir.display(), "work directory does not exist");
            return Ok(None);
        }
        let regex = RegexBuilder::new(&pattern)
            .case_insensitive(self.case_insensitive)
            .build()?;

        let mut best: Option<(u64, SystemTime, String)> = None;
        for entry in WalkDir::new(&self.workdir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = entry.map_err(|err| {
                PathError::Io(
                    err.into_io_error()
                        .unwrap_or_else(|| std::io::Error::other("directory walk failed")),
                )
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str() else {
                continue;
            };
            if !self.has_extension(name) {
                continue;
            }
            let Some(version) = regex
                .captures(name)
                .and_then(|caps| caps.get(1))
                .and_then(|m| m.as_str().parse::<u64>().ok())
            else {
                continue;
            };
            let modified = entry
                .metadata()
                .ok()
                .and_then(|meta| meta.modified().ok())
                .unwrap_or(SystemTime::UNIX_EPOCH);

            let better = match &best {
                None => true,
                Some((best_version, best_modified, _)) => {
                    version > *best_version || (version == *best_version && modified > *best_modified)
                }
            };
            if better {
                best = Some((version, modified, name.to_string()));
            }
        }

        Ok(best.map(|(version, _, name)| (name, version)))
    }

    /// The latest workfile name, or the name version 1 would get.
    ///
    /// The synthesized name drops `{comment}`, fills an empty `{ext}` with
    /// the first extension and pads an unformatted `{version}` to three
    /// digits.
    pub fn last(&self) -> PathResult<String> {
        if let Some((name, _)) = self.last_with_version()? {
            return Ok(name);
        }
        let mut data = self.fill_data.clone();
        data.insert("version".into(), Value::from(1));
        data.remove("comment");
        let has_ext = data
            .get("ext")
            .and_then(Value::as_str)
            .is_some_and(|ext| !ext.is_empty());
        if !has_ext {
            let first = self.extensions.first().ok_or(PathError::NoExtensions)?;
            data.insert("ext".into(), Value::from(first.trim_start_matches('.')));
        }
        let template = Template::parse(&self.template)?.with_default_spec("version", "03")?;
        Ok(template.format(&data)?)
    }

    /// Like [`last`](Self::last), joined onto the work directory.
    pub fn last_full_path(&self) -> PathResult<PathBuf> {
        Ok(normalize_path(&self.workdir.join(self.last()?)))
    }
}

fn query(
    workdir: &Path,
    file_template: &str,
    fill_data: &Map<String, Value>,
    extensions: &[&str],
) -> WorkfileQuery {
    WorkfileQuery::new(workdir, file_template)
        .with_fill_data(fill_data.clone())
        .with_extensions(extensions)
}

/// Latest workfile name and version in `workdir`, `(None, None)` when
/// nothing matches.
pub fn last_workfile_with_version(
    workdir: &Path,
    file_template: &str,
    fill_data: &Map<String, Value>,
    extensions: &[&str],
) -> PathResult<(Option<String>, Option<u64>)> {
    Ok(match query(workdir, file_template, fill_data, extensions).last_with_version()? {
        Some((name, version)) => (Some(name), Some(version)),
        None => (None, None),
    })
}

/// Latest workfile name in `workdir`, synthesizing version 1 when nothing
/// matches. With `full_path` the name is joined onto `workdir`.
pub fn last_workfile(
    workdir: &Path,
    file_template: &str,
    fill_data: &Map<String, Value>,
    extensions: &[&str],
    full_path: bool,
) -> PathResult<String> {
    let query = query(workdir, file_template, fill_data, extensions);
    if full_path {
        Ok(query.last_full_path()?.to_string_lossy().into_owned())
    } else {
        query.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TemplateError;
    use serde_json::json;
    use std::fs;

    const TEMPLATE: &str = "{asset}_{task}_v{version}.{ext}";

    fn fill() -> Map<String, Value> {
        match json!({"asset": "bruce", "task": "anim"}) {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    fn touch(dir: &Path, name: &str) {
        fs::write(dir.join(name), b"").unwrap();
    }

    #[test]
    fn literal_extension_in_template() {
        let template = "{asset}_{task}_v{version}.ma";
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            last_workfile(dir.path(), template, &fill(), &[".ma"], false).unwrap(),
            "bruce_anim_v001.ma"
        );

        touch(dir.path(), "bruce_anim_v001.ma");
        touch(dir.path(), "bruce_anim_v003.ma");
        touch(dir.path(), "bruce_anim_v002.mb");
        let (name, version) = last_workfile_with_version(dir.path(), template, &fill(), &[".ma"]).unwrap();
        assert_eq!(name.as_deref(), Some("bruce_anim_v003.ma"));
        assert_eq!(version, Some(3));
    }

    #[test]
    fn picks_highest_version() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "bruce_anim_v001.ma");
        touch(dir.path(), "bruce_anim_v003.ma");
        touch(dir.path(), "bruce_anim_v002.ma");

        let (name, version) =
            last_workfile_with_version(dir.path(), TEMPLATE, &fill(), &[".ma"]).unwrap();
        assert_eq!(name.as_deref(), Some("bruce_anim_v003.ma"));
        assert_eq!(version, Some(3));
    }

    #[test]
    fn ignores_other_assets_tasks_and_extensions() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "bruce_anim_v001.ma");
        touch(dir.path(), "bruce_layout_v009.ma");
        touch(dir.path(), "hulk_anim_v008.ma");
        touch(dir.path(), "bruce_anim_v007.mb");
        touch(dir.path(), "bruce_anim_v006.ma.bak");

        let (name, version) =
            last_workfile_with_version(dir.path(), TEMPLATE, &fill(), &["ma"]).unwrap();
        assert_eq!(name.as_deref(), Some("bruce_anim_v001.ma"));
        assert_eq!(version, Some(1));
    }

    #[test]
    fn multiple_extensions_and_comments() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "bruce_anim_v002_blocking.mb");
        touch(dir.path(), "bruce_anim_v004.ma");

        let template = "{asset}_{task}_v{version:0>3}<_{comment}>.{ext}";
        let (name, version) =
            last_workfile_with_version(dir.path(), template, &fill(), &[".ma", ".mb"]).unwrap();
        assert_eq!(name.as_deref(), Some("bruce_anim_v004.ma"));
        assert_eq!(version, Some(4));
    }

    #[test]
    fn empty_or_missing_workdir() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            last_workfile_with_version(dir.path(), TEMPLATE, &fill(), &[".ma"]).unwrap(),
            (None, None)
        );
        let missing = dir.path().join("nope");
        assert_eq!(
            last_workfile_with_version(&missing, TEMPLATE, &fill(), &[".ma"]).unwrap(),
            (None, None)
        );
    }

    #[test]
    fn synthesizes_first_version() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            last_workfile(dir.path(), TEMPLATE, &fill(), &[".ma"], false).unwrap(),
            "bruce_anim_v001.ma"
        );
        let full = last_workfile(dir.path(), TEMPLATE, &fill(), &[".ma"], true).unwrap();
        assert_eq!(PathBuf::from(full), dir.path().join("bruce_anim_v001.ma"));
    }

    #[test]
    fn synthesized_name_drops_comment_and_keeps_explicit_padding() {
        let dir = tempfile::tempdir().unwrap();
        let mut data = fill();
        data.insert("comment".into(), json!("wip"));
        let template = "{asset}_v{version:0>4}<_{comment}>.{ext}";
        assert_eq!(
            last_workfile(dir.path(), template, &data, &["mb", "ma"], false).unwrap(),
            "bruce_v0001.mb"
        );
    }

    #[test]
    fn existing_file_is_returned_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "bruce_anim_v012.ma");
        assert_eq!(
            last_workfile(dir.path(), TEMPLATE, &fill(), &[".ma"], false).unwrap(),
            "bruce_anim_v012.ma"
        );
    }

    #[test]
    fn case_sensitivity_is_configurable() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "BRUCE_anim_v005.MA");
        let base = WorkfileQuery::new(dir.path(), TEMPLATE)
            .with_fill_data(fill())
            .with_extensions([".ma"]);

        let strict = base.clone().with_case_insensitive(false);
        assert_eq!(strict.last_with_version().unwrap(), None);

        let loose = base.with_case_insensitive(true);
        assert_eq!(
            loose.last_with_version().unwrap(),
            Some(("BRUCE_anim_v005.MA".to_string(), 5))
        );
    }

    #[test]
    fn template_without_version_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = last_workfile_with_version(dir.path(), "{asset}.{ext}", &fill(), &[".ma"]).unwrap_err();
        assert!(matches!(err, PathError::NoVersionPlaceholder(_)));
    }

    #[test]
    fn missing_fill_data_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = last_workfile_with_version(dir.path(), "{shot}_v{version}.{ext}", &fill(), &[".ma"])
            .unwrap_err();
        assert!(matches!(err, PathError::Template(TemplateError::MissingKey(_))));
    }

    #[test]
    fn literal_regex_characters_are_escaped() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "bruce+anim_v002.ma");
        touch(dir.path(), "bruceeanim_v009.ma");
        let (name, _) =
            last_workfile_with_version(dir.path(), "{asset}+{task}_v{version}.{ext}", &fill(), &[".ma"])
                .unwrap();
        assert_eq!(name.as_deref(), Some("bruce+anim_v002.ma"));
    }
}
