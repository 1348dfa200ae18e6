use std::sync::Arc;

use anyhow::Context as _;
use atrium_paths::WorkfileQuery;
use atrium_session::{keys, Environment, ProcessEnvironment, Session};
use atrium_store::DatabaseConnection;
use atrium_types::Document;
use colored::Colorize;
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let format = cli.format;
    match cli.command {
        Command::Session(args) => cmd_session(args, format),
        Command::Projects(_) => cmd_projects(format),
        Command::Locate(args) => cmd_locate(args, format),
        Command::Workfile(args) => cmd_workfile(args, format),
    }
}

fn print_json(value: &Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn environment_session(include_context: bool) -> Session {
    Session::from_environment(&ProcessEnvironment, true, include_context)
}

fn connect() -> anyhow::Result<DatabaseConnection> {
    let session = environment_session(true);
    let dbcon = DatabaseConnection::new(session.into_shared())
        .with_environment(Arc::new(ProcessEnvironment) as Arc<dyn Environment>);
    dbcon.install(false).context("could not connect to the project database")?;
    Ok(dbcon)
}

fn cmd_session(args: SessionArgs, format: OutputFormat) -> anyhow::Result<()> {
    let session = environment_session(!args.global_only);
    if format == OutputFormat::Json {
        return print_json(&Value::Object(session.to_json()));
    }
    for (key, value) in session.iter() {
        if value.is_empty() {
            println!("{} {}", format!("{key}:").bold(), "(not set)".dimmed());
        } else {
            println!("{} {}", format!("{key}:").bold(), value);
        }
    }
    let missing = session.missing(&[keys::PROJECT, keys::ASSET]);
    if !missing.is_empty() {
        println!("\n{} missing {}", "!".yellow().bold(), missing.join(", ").yellow());
    }
    Ok(())
}

fn cmd_projects(format: OutputFormat) -> anyhow::Result<()> {
    let dbcon = connect()?;
    let projects = dbcon.projects()?.collect::<Result<Vec<_>, _>>()?;
    dbcon.uninstall();

    if format == OutputFormat::Json {
        let docs: Vec<Value> = projects.into_iter().map(Document::into_value).collect();
        return print_json(&Value::Array(docs));
    }
    if projects.is_empty() {
        println!("No projects.");
        return Ok(());
    }
    for project in &projects {
        let name = project.name().unwrap_or("<unnamed>");
        let code = project
            .data_field("code")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let id = project.id().map(|id| id.to_hex()).unwrap_or_default();
        println!("{}  {}  {}", name.green().bold(), code.cyan(), id.dimmed());
    }
    Ok(())
}

/// A `locate` component: integers stay numbers so versions match, and the
/// version slot accepts `latest`.
pub(crate) fn parse_component(index: usize, raw: &str) -> Value {
    let is_version = atrium_store::LOCATE_LEVELS.get(index) == Some(&"version");
    if is_version && raw.eq_ignore_ascii_case("latest") {
        return Value::Null;
    }
    match raw.parse::<i64>() {
        Ok(number) if is_version => Value::from(number),
        _ => Value::from(raw),
    }
}

fn cmd_locate(args: LocateArgs, format: OutputFormat) -> anyhow::Result<()> {
    let path: Vec<Value> = args
        .components
        .iter()
        .enumerate()
        .map(|(index, raw)| parse_component(index, raw))
        .collect();
    debug!(path = ?path, "locating");

    let dbcon = connect()?;
    let found = dbcon.locate(&path)?;
    dbcon.uninstall();

    match (found, format) {
        (Some(id), OutputFormat::Json) => print_json(&json!({ "id": id.to_hex() })),
        (None, OutputFormat::Json) => print_json(&json!({ "id": null })),
        (Some(id), OutputFormat::Text) => {
            println!("{}", id.to_hex().yellow());
            Ok(())
        }
        (None, OutputFormat::Text) => {
            anyhow::bail!("nothing found at {}", args.components.join("/"))
        }
    }
}

/// Turn `key=value` pairs into template data. Values that parse as JSON
/// keep their type; `a.b=c` nests.
pub(crate) fn parse_data(pairs: &[String]) -> anyhow::Result<Map<String, Value>> {
    let mut data = Map::new();
    for pair in pairs {
        let (key, raw) = pair
            .split_once('=')
            .with_context(|| format!("expected key=value, got '{pair}'"))?;
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::from(raw));

        let mut parts: Vec<&str> = key.split('.').collect();
        let last = parts.pop().filter(|k| !k.is_empty()).with_context(|| format!("empty key in '{pair}'"))?;
        let mut target = &mut data;
        for part in parts {
            let entry = target
                .entry(part.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            target = entry
                .as_object_mut()
                .with_context(|| format!("'{part}' is already set to a non-object value"))?;
        }
        target.insert(last.to_string(), value);
    }
    Ok(data)
}

fn cmd_workfile(args: WorkfileArgs, format: OutputFormat) -> anyhow::Result<()> {
    let data = parse_data(&args.data)?;
    let query = WorkfileQuery::new(&args.workdir, &args.template)
        .with_fill_data(data)
        .with_extensions(&args.extensions);

    let latest = query.last_with_version()?;
    let file = if args.full_path {
        query.last_full_path()?.to_string_lossy().into_owned()
    } else {
        query.last()?
    };

    match format {
        OutputFormat::Json => print_json(&json!({
            "file": file,
            "version": latest.as_ref().map(|(_, version)| *version),
            "exists": latest.is_some(),
        })),
        OutputFormat::Text => {
            match latest {
                Some((_, version)) => println!("{}  {}", file.green().bold(), format!("v{version:03}").yellow()),
                None => println!("{}  {}", file.bold(), "(new)".dimmed()),
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_components_become_numbers() {
        assert_eq!(parse_component(0, "hulk"), json!("hulk"));
        assert_eq!(parse_component(2, "007"), json!("007"));
        assert_eq!(parse_component(3, "3"), json!(3));
        assert_eq!(parse_component(3, "latest"), Value::Null);
        assert_eq!(parse_component(3, "-1"), json!(-1));
    }

    #[test]
    fn data_pairs_nest_and_keep_types() {
        let data = parse_data(&[
            "asset=bruce".to_string(),
            "project.name=hulk".to_string(),
            "project.code=hlk".to_string(),
            "version=4".to_string(),
        ])
        .unwrap();

        assert_eq!(
            Value::Object(data),
            json!({"asset": "bruce", "project": {"name": "hulk", "code": "hlk"}, "version": 4})
        );
    }

    #[test]
    fn malformed_data_pairs_fail() {
        assert!(parse_data(&["asset".to_string()]).is_err());
        assert!(parse_data(&["asset=bruce".to_string(), "asset.name=x".to_string()]).is_err());
        assert!(parse_data(&["project.=x".to_string()]).is_err());
    }

    #[test]
    fn workfile_reports_latest_version() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bruce_anim_v002.ma"), b"").unwrap();
        let args = WorkfileArgs {
            workdir: dir.path().to_string_lossy().into_owned(),
            template: "{asset}_{task}_v{version:0>3}.{ext}".into(),
            extensions: vec![".ma".into()],
            data: vec!["asset=bruce".into(), "task=anim".into()],
            full_path: false,
        };
        cmd_workfile(args, OutputFormat::Json).unwrap();
    }
}
