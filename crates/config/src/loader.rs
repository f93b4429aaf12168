use std::path::{Path, PathBuf};

use {
    secrecy::Secret,
    tracing::{debug, info, warn},
};

use crate::{env_subst::substitute_env, schema::RoundtableConfig};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "roundtable.toml",
    "roundtable.yaml",
    "roundtable.yml",
    "roundtable.json",
];

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> anyhow::Result<RoundtableConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./roundtable.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/roundtable/roundtable.{toml,yaml,yml,json}` (user-global)
///
/// Returns `RoundtableConfig::default()` if no file is found or the file
/// fails to parse.
pub fn discover_and_load() -> RoundtableConfig {
    let mut dirs = vec![PathBuf::from(".")];
    dirs.extend(config_dir());

    let Some(path) = find_config_file(&dirs) else {
        debug!("no config file found, using defaults");
        return RoundtableConfig::default();
    };

    debug!(path = %path.display(), "loading config");
    match load_config(&path) {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            RoundtableConfig::default()
        },
    }
}

/// Returns the user-global config directory, `~/.config/roundtable/`.
pub fn config_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.home_dir().join(".config").join("roundtable"))
}

/// First existing config file across `dirs`, in order.
pub fn find_config_file(dirs: &[PathBuf]) -> Option<PathBuf> {
    dirs.iter()
        .flat_map(|dir| CONFIG_FILENAMES.iter().map(move |name| dir.join(name)))
        .find(|p| p.exists())
}

/// Apply the deployment environment variables on top of a loaded config.
///
/// | variable | field |
/// |---|---|
/// | `SIGNALING_URL` | `authority.url` |
/// | `ORCHESTRATOR_URL` | `authority.public_url` |
/// | `ORCHESTRATOR_TOPIC` | `conversation.topic` |
/// | `AGENT_REGISTRATION_SECRET` | `authority.registration_secret` |
pub fn apply_env_overrides(config: &mut RoundtableConfig) {
    apply_overrides(config, |name| std::env::var(name).ok())
}

fn apply_overrides(config: &mut RoundtableConfig, lookup: impl Fn(&str) -> Option<String>) {
    let get = |name: &str| lookup(name).filter(|v| !v.is_empty());

    if let Some(url) = get("SIGNALING_URL") {
        info!(url = %url, "authority url overridden from environment");
        config.authority.url = url;
    }
    if let Some(url) = get("ORCHESTRATOR_URL") {
        config.authority.public_url = url;
    }
    if let Some(topic) = get("ORCHESTRATOR_TOPIC") {
        config.conversation.topic = topic;
    }
    if let Some(secret) = get("AGENT_REGISTRATION_SECRET") {
        config.authority.registration_secret = Some(Secret::new(secret));
    }
}

fn parse_config(raw: &str, path: &Path) -> anyhow::Result<RoundtableConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => anyhow::bail!("unsupported config format: .{ext}"),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, secrecy::ExposeSecret};

    #[test]
    fn loads_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("roundtable.toml");
        std::fs::write(&path, "[server]\nport = 9000\n").unwrap();

        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.server.port, 9000);
    }

    #[test]
    fn loads_yaml_and_json() {
        let dir = tempfile::tempdir().unwrap();
        let yaml = dir.path().join("roundtable.yaml");
        std::fs::write(&yaml, "conversation:\n  max_turns: 6\n").unwrap();
        assert_eq!(load_config(&yaml).unwrap().conversation.max_turns, 6);

        let json = dir.path().join("roundtable.json");
        std::fs::write(&json, r#"{"conversation":{"topic":"Space"}}"#).unwrap();
        assert_eq!(load_config(&json).unwrap().conversation.topic, "Space");
    }

    #[test]
    fn rejects_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("roundtable.ini");
        std::fs::write(&path, "port=1").unwrap();
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_config(&dir.path().join("absent.toml")).is_err());
    }

    #[test]
    fn find_config_file_prefers_earlier_dirs() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        std::fs::write(second.path().join("roundtable.toml"), "").unwrap();
        let dirs = vec![first.path().to_path_buf(), second.path().to_path_buf()];
        assert_eq!(
            find_config_file(&dirs),
            Some(second.path().join("roundtable.toml"))
        );

        std::fs::write(first.path().join("roundtable.json"), "{}").unwrap();
        assert_eq!(
            find_config_file(&dirs),
            Some(first.path().join("roundtable.json"))
        );
    }

    #[test]
    fn env_overrides_apply() {
        let mut cfg = RoundtableConfig::default();
        apply_overrides(&mut cfg, |name| match name {
            "SIGNALING_URL" => Some("http://auth.test".into()),
            "ORCHESTRATOR_TOPIC" => Some("Oceans".into()),
            "AGENT_REGISTRATION_SECRET" => Some("s3cret".into()),
            "ORCHESTRATOR_URL" => Some(String::new()),
            _ => None,
        });
        assert_eq!(cfg.authority.url, "http://auth.test");
        assert_eq!(cfg.conversation.topic, "Oceans");
        assert_eq!(cfg.authority.public_url, "ws://orchestrator:8765/agent");
        assert_eq!(
            cfg.authority
                .registration_secret
                .as_ref()
                .map(|s| s.expose_secret().as_str()),
            Some("s3cret")
        );
    }
}
