use std::path::PathBuf;

pub const WORKSPACE_VAR: &str = "MINIESCOLA_WORKSPACE";
pub const LOG_VAR: &str = "MINIESCOLA_LOG";
const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Workspace opened at startup, before any `workspace.select`.
    pub workspace: Option<PathBuf>,
    /// `tracing` filter directive, e.g. `info` or `miniescolad=debug`.
    pub log_filter: String,
}

impl Config {
    /// Reads the process environment, after loading a `.env` file if one is
    /// present in the working directory.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Self {
            workspace: non_empty(WORKSPACE_VAR).map(PathBuf::from),
            log_filter: non_empty(LOG_VAR).unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|k| vars.get(k).cloned())
    }

    #[test]
    fn defaults_without_env() {
        let cfg = config_from(&[]);
        assert_eq!(cfg.workspace, None);
        assert_eq!(cfg.log_filter, "info");
    }

    #[test]
    fn reads_workspace_and_filter() {
        let cfg = config_from(&[(WORKSPACE_VAR, "/tmp/escola"), (LOG_VAR, "debug")]);
        assert_eq!(cfg.workspace, Some(PathBuf::from("/tmp/escola")));
        assert_eq!(cfg.log_filter, "debug");
    }

    #[test]
    fn blank_values_fall_back() {
        let cfg = config_from(&[(WORKSPACE_VAR, "  "), (LOG_VAR, "")]);
        assert_eq!(cfg.workspace, None);
        assert_eq!(cfg.log_filter, "info");
    }
}
