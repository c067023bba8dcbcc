//! Configuration loading and merging.
//!
//! TOML is the preferred format; parsed values are normalized into
//! `serde_json::Value` so merging, includes, schema validation and the
//! `dumpjson` command all operate on a single value model. A legacy JSON
//! file is still accepted for migration.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::paths;

/// Merge `src` into `dst`.
///
/// Tables merge recursively. With `replace` false (include accumulation)
/// arrays concatenate; with `replace` true (root reload merge) the later
/// value wins outright for non-table entries.
pub fn merge(dst: &mut Value, src: Value, replace: bool) {
    match (dst, src) {
        (Value::Object(dst_map), Value::Object(src_map)) => {
            for (key, src_value) in src_map {
                match dst_map.get_mut(&key) {
                    Some(dst_value) => merge(dst_value, src_value, replace),
                    None => {
                        dst_map.insert(key, src_value);
                    }
                }
            }
        }
        (Value::Array(dst_arr), Value::Array(src_arr)) if !replace => {
            dst_arr.extend(src_arr);
        }
        (dst_slot, src_value) => {
            *dst_slot = src_value;
        }
    }
}

/// Load the configuration, resolving includes.
///
/// `path` may name a file or a directory; `None` falls back to the
/// canonical and legacy locations.
///
/// # Errors
///
/// `ConfigNotFound` when no file exists, `ConfigParse` on malformed
/// TOML/JSON, `ConfigInvalid` when the root is not a table.
pub fn load_config(path: Option<&Path>) -> Result<Value> {
    let mut visited = HashSet::new();
    let config = match path {
        Some(explicit) => load_source(explicit, &mut visited)?,
        None => {
            let target = default_config_path()?;
            load_source(&target, &mut visited)?
        }
    };

    if !config.is_object() {
        return Err(Error::ConfigInvalid(
            "top level of the configuration must be a table".into(),
        ));
    }
    Ok(config)
}

fn default_config_path() -> Result<PathBuf> {
    let canonical = paths::config_file();
    let legacy = paths::legacy_config_file();
    let old_json = paths::old_json_config_file();

    for candidate in [&canonical, &legacy] {
        if let Some(p) = candidate {
            if p.exists() {
                if candidate == &legacy {
                    warn!(
                        "Using legacy config location {}; consider moving it to {}",
                        p.display(),
                        canonical.as_deref().map_or_else(
                            || "the pypr config dir".to_string(),
                            |c| c.display().to_string()
                        )
                    );
                }
                return Ok(p.clone());
            }
        }
    }

    if let Some(p) = old_json {
        if p.exists() {
            warn!("Consider changing your configuration to TOML format.");
            return Ok(p);
        }
    }

    Err(Error::ConfigNotFound(
        canonical.unwrap_or_else(|| PathBuf::from("config.toml")),
    ))
}

/// Load one file or directory, then fold its `pyprland.include` entries into
/// the result. A visited set guards against include cycles.
fn load_source(target: &Path, visited: &mut HashSet<PathBuf>) -> Result<Value> {
    let canonical = target.canonicalize().unwrap_or_else(|_| target.to_path_buf());
    if !visited.insert(canonical) {
        warn!("Skipping {} - already included", target.display());
        return Ok(Value::Object(serde_json::Map::new()));
    }

    let mut config = if target.is_dir() {
        load_directory(target, visited)?
    } else {
        load_file(target)?
    };

    let includes: Vec<String> = config
        .get("pyprland")
        .and_then(|p| p.get("include"))
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    for include in includes {
        let path = paths::expand_user_path(&include);
        if !path.exists() {
            warn!("Included config {} does not exist", path.display());
            continue;
        }
        let extra = load_source(&path, visited)?;
        merge(&mut config, extra, false);
    }

    Ok(config)
}

fn load_directory(dir: &Path, visited: &mut HashSet<PathBuf>) -> Result<Value> {
    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(std::result::Result::ok)
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "toml"))
        .collect();
    entries.sort();

    let mut config = Value::Object(serde_json::Map::new());
    for entry in entries {
        let loaded = load_source(&entry, visited)?;
        merge(&mut config, loaded, false);
    }
    Ok(config)
}

fn load_file(path: &Path) -> Result<Value> {
    if !path.exists() {
        return Err(Error::ConfigNotFound(path.to_path_buf()));
    }
    info!("Loading {}", path.display());
    let content = std::fs::read_to_string(path)?;

    if path.extension().is_some_and(|ext| ext == "json") {
        return serde_json::from_str(&content).map_err(|e| Error::ConfigParse {
            path: path.to_path_buf(),
            message: e.to_string(),
        });
    }

    let parsed: toml::Value = toml::from_str(&content).map_err(|e| Error::ConfigParse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    serde_json::to_value(parsed).map_err(|e| Error::ConfigParse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_merge_tables_recursively() {
        let mut dst = json!({"a": {"x": 1}, "keep": true});
        merge(&mut dst, json!({"a": {"y": 2}}), false);
        assert_eq!(dst, json!({"a": {"x": 1, "y": 2}, "keep": true}));
    }

    #[test]
    fn test_merge_arrays_concatenate() {
        let mut dst = json!({"plugins": ["a"]});
        merge(&mut dst, json!({"plugins": ["b"]}), false);
        assert_eq!(dst, json!({"plugins": ["a", "b"]}));
    }

    #[test]
    fn test_merge_replace_mode_overwrites_arrays() {
        let mut dst = json!({"plugins": ["a", "stale"]});
        merge(&mut dst, json!({"plugins": ["b"]}), true);
        assert_eq!(dst, json!({"plugins": ["b"]}));
    }

    #[test]
    fn test_merge_scalars_replaced() {
        let mut dst = json!({"factor": 2.0});
        merge(&mut dst, json!({"factor": 3.5}), false);
        assert_eq!(dst, json!({"factor": 3.5}));
    }

    #[test]
    fn test_load_single_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "config.toml",
            "[pyprland]\nplugins = [\"magnify\"]\n\n[magnify]\nfactor = 2.5\n",
        );

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config["pyprland"]["plugins"], json!(["magnify"]));
        assert_eq!(config["magnify"]["factor"], json!(2.5));
    }

    #[test]
    fn test_load_directory_merges_sorted() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "10-base.toml", "[pyprland]\nplugins = [\"magnify\"]\n");
        write_file(dir.path(), "20-extra.toml", "[pyprland]\nplugins = [\"monitors\"]\n");
        write_file(dir.path(), "README.md", "not a config");

        let config = load_config(Some(dir.path())).unwrap();
        assert_eq!(config["pyprland"]["plugins"], json!(["magnify", "monitors"]));
    }

    #[test]
    fn test_includes_are_merged() {
        let dir = tempfile::tempdir().unwrap();
        let included = write_file(dir.path(), "scratch.toml", "[scratchpads.term]\ncommand = \"kitty\"\n");
        let main = write_file(
            dir.path(),
            "config.toml",
            &format!(
                "[pyprland]\nplugins = [\"scratchpads\"]\ninclude = [\"{}\"]\n",
                included.display()
            ),
        );

        let config = load_config(Some(&main)).unwrap();
        assert_eq!(config["scratchpads"]["term"]["command"], json!("kitty"));
    }

    #[test]
    fn test_include_cycle_does_not_loop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("loop.toml");
        write_file(
            dir.path(),
            "loop.toml",
            &format!("[pyprland]\nplugins = []\ninclude = [\"{}\"]\n", path.display()),
        );

        let config = load_config(Some(&path)).unwrap();
        assert!(config["pyprland"]["plugins"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_missing_file_is_config_not_found() {
        let err = load_config(Some(Path::new("/nonexistent/pypr.toml"))).unwrap_err();
        assert!(matches!(err, Error::ConfigNotFound(_)));
    }

    #[test]
    fn test_bad_toml_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "bad.toml", "[pyprland\nplugins=");
        let err = load_config(Some(&path)).unwrap_err();
        assert!(matches!(err, Error::ConfigParse { .. }));
    }

    #[test]
    fn test_legacy_json_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "pyprland.json",
            r#"{"pyprland": {"plugins": ["magnify"]}}"#,
        );
        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config["pyprland"]["plugins"], json!(["magnify"]));
    }
}
