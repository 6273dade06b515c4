use std::env;
use std::path::PathBuf;

/// Config holds the file locations of one run
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Topology document (YAML)
    pub topology: PathBuf,
    /// Inventory file, YAML (`.yml`/`.yaml`) or INI
    pub inventory: PathBuf,
    /// Directory holding one JSON file per allocation pool
    pub state_dir: PathBuf,
}

impl Config {
    /// Load configuration from environment variables with defaults
    pub fn load() -> Self {
        Self {
            topology: get_env("VXFABRIC_TOPOLOGY", "master.yml").into(),
            inventory: get_env("VXFABRIC_INVENTORY", "devices").into(),
            state_dir: get_env("VXFABRIC_STATE_DIR", ".vxfabric").into(),
        }
    }

    /// Replace the values given on the command line
    pub fn with_overrides(
        mut self,
        topology: Option<PathBuf>,
        inventory: Option<PathBuf>,
        state_dir: Option<PathBuf>,
    ) -> Self {
        if let Some(path) = topology {
            self.topology = path;
        }
        if let Some(path) = inventory {
            self.inventory = path;
        }
        if let Some(path) = state_dir {
            self.state_dir = path;
        }
        self
    }
}

fn get_env(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_get_env_default() {
        assert_eq!(get_env("VXFABRIC_TEST_SURELY_UNSET", "fallback"), "fallback");
    }

    #[test]
    fn test_overrides() {
        let base = Config {
            topology: "master.yml".into(),
            inventory: "devices".into(),
            state_dir: ".vxfabric".into(),
        };
        let cfg = base.clone().with_overrides(Some("lab.yml".into()), None, Some("/tmp/state".into()));
        assert_eq!(cfg.topology, PathBuf::from("lab.yml"));
        assert_eq!(cfg.inventory, base.inventory);
        assert_eq!(cfg.state_dir, PathBuf::from("/tmp/state"));
    }
}
