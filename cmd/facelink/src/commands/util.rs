//! Utility functions for CLI commands.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context as _;
use facelink_faceid::{Config, Engine, UserId};
use facelink_facestore::RedbStore;
use tracing::debug;

use crate::Cli;

/// Loads a YAML or JSON file, picking the format by extension.
pub fn load_request<T: serde::de::DeserializeOwned>(path: &str) -> anyhow::Result<T> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("failed to read {path}"))?;
    let ext = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("yaml");

    let result = match ext.to_lowercase().as_str() {
        "json" => serde_json::from_str(&content)?,
        _ => serde_yaml::from_str(&content)?,
    };

    Ok(result)
}

/// Loads the engine config, or defaults when none is given.
pub fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    match cli.config.as_deref() {
        Some(path) => load_request(path).with_context(|| format!("invalid config {path}")),
        None => Ok(Config::default()),
    }
}

/// Opens the database and builds an engine over it.
pub fn open_engine(cli: &Cli) -> anyhow::Result<Engine> {
    let cfg = load_config(cli)?;
    let store = RedbStore::open(&cli.db).with_context(|| format!("failed to open {}", cli.db))?;
    debug!(db = %cli.db, dim = cfg.dim, "engine ready");
    Ok(Engine::new(cfg, Arc::new(store))?)
}

pub fn user(cli: &Cli) -> UserId {
    UserId::new(cli.user.clone())
}

/// Requires input file to be provided.
pub fn require_input_file(cli: &Cli) -> anyhow::Result<&str> {
    cli.input
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("input file is required, use -f flag"))
}

/// Outputs result as JSON or YAML.
pub fn output_result<T: serde::Serialize>(
    result: &T,
    output_path: Option<&str>,
    as_json: bool,
) -> anyhow::Result<()> {
    let output = if as_json {
        serde_json::to_string_pretty(result)?
    } else {
        serde_yaml::to_string(result)?
    };

    match output_path {
        Some(path) => std::fs::write(path, output)?,
        None => print!("{}", output),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use facelink_faceid::{FaceInput, Source};

    #[test]
    fn loads_faces_from_yaml_and_json() {
        let dir = tempfile::tempdir().unwrap();

        let yaml = dir.path().join("faces.yaml");
        std::fs::write(
            &yaml,
            "- vector: [1.0, 0.0]\n  image_ref: a.jpg\n- vector: [0.0, 1.0]\n  image_ref: b.jpg\n  source: gdrive\n",
        )
        .unwrap();
        let faces: Vec<FaceInput> = load_request(yaml.to_str().unwrap()).unwrap();
        assert_eq!(faces.len(), 2);
        assert_eq!(faces[1].source, Source::GDrive);

        let json = dir.path().join("faces.json");
        std::fs::write(&json, r#"[{"vector": [0.5], "image_ref": "c.jpg"}]"#).unwrap();
        let faces: Vec<FaceInput> = load_request(json.to_str().unwrap()).unwrap();
        assert_eq!(faces[0].source, Source::Local);
    }

    #[test]
    fn partial_config_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "dim: 512\nmatch_threshold: 0.5\n").unwrap();
        let cfg: Config = load_request(path.to_str().unwrap()).unwrap();
        assert_eq!(cfg.dim, 512);
        assert_eq!(cfg.match_threshold, 0.5);
        assert_eq!(cfg.duplicate_threshold, Config::default().duplicate_threshold);
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(load_request::<Config>("/nonexistent/facelink.yaml").is_err());
    }
}
