use std::path::{Path, PathBuf};

pub const LOCAL_CONFIG: &str = "fleetwatch.yaml";

/// Where the config file lives, or `None` to run on built-in defaults.
///
/// Priority:
/// 1. `--config` flag / `FLEETWATCH_CONFIG` env var (passed in as `explicit`)
/// 2. `./fleetwatch.yaml`
/// 3. `$HOME/.config/fleetwatch/config.yaml`
pub fn resolve_config(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(p) = explicit {
        return Some(p.to_path_buf());
    }
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    first_existing(&cwd, home::home_dir().as_deref())
}

/// The path `config init` writes to when no `--config` is given.
pub fn default_target(explicit: Option<&Path>) -> PathBuf {
    explicit
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(LOCAL_CONFIG))
}

fn first_existing(cwd: &Path, home: Option<&Path>) -> Option<PathBuf> {
    let local = cwd.join(LOCAL_CONFIG);
    if local.is_file() {
        return Some(local);
    }
    let user = home?.join(".config/fleetwatch/config.yaml");
    user.is_file().then_some(user)
}
