//! Socket and configuration path resolution.

use std::path::PathBuf;

use directories::BaseDirs;

/// Hyprland per-instance IPC directory, if an instance signature is set.
///
/// Recent Hyprland versions keep sockets under `$XDG_RUNTIME_DIR/hypr/<sig>`,
/// older ones under `/tmp/hypr/<sig>`.
#[must_use]
pub fn hyprland_ipc_dir() -> Option<PathBuf> {
    let sig = std::env::var("HYPRLAND_INSTANCE_SIGNATURE").ok()?;
    if let Ok(runtime) = std::env::var("XDG_RUNTIME_DIR") {
        let dir = PathBuf::from(runtime).join("hypr").join(&sig);
        if dir.exists() {
            return Some(dir);
        }
    }
    Some(PathBuf::from("/tmp/hypr").join(sig))
}

/// Directory holding the control socket.
#[must_use]
pub fn ipc_folder() -> PathBuf {
    if let Some(dir) = hyprland_ipc_dir() {
        return dir;
    }
    std::env::var("XDG_RUNTIME_DIR").map_or_else(|_| std::env::temp_dir(), PathBuf::from)
}

/// Path of the daemon control socket.
#[must_use]
pub fn control_socket_path() -> PathBuf {
    ipc_folder().join(".pyprland.sock")
}

/// Canonical configuration file location.
#[must_use]
pub fn config_file() -> Option<PathBuf> {
    Some(config_home()?.join("pypr").join("config.toml"))
}

/// Legacy TOML location, kept for existing setups.
#[must_use]
pub fn legacy_config_file() -> Option<PathBuf> {
    Some(config_home()?.join("hypr").join("pyprland.toml"))
}

/// Very old JSON location, accepted for migration only.
#[must_use]
pub fn old_json_config_file() -> Option<PathBuf> {
    Some(config_home()?.join("hypr").join("pyprland.json"))
}

fn config_home() -> Option<PathBuf> {
    // BaseDirs honors XDG_CONFIG_HOME with a ~/.config fallback.
    BaseDirs::new().map(|dirs| dirs.config_dir().to_path_buf())
}

/// Expand a leading `~` and `$VAR` references in a user-provided path.
#[must_use]
pub fn expand_user_path(path: &str) -> PathBuf {
    let mut expanded = String::with_capacity(path.len());
    let mut chars = path.chars().peekable();

    if path.starts_with('~') {
        if let Some(dirs) = BaseDirs::new() {
            expanded.push_str(&dirs.home_dir().to_string_lossy());
            chars.next();
        }
    }

    while let Some(c) = chars.next() {
        if c == '$' {
            let mut var = String::new();
            while let Some(&next) = chars.peek() {
                if next.is_alphanumeric() || next == '_' {
                    var.push(next);
                    chars.next();
                } else {
                    break;
                }
            }
            match std::env::var(&var) {
                Ok(value) => expanded.push_str(&value),
                Err(_) => {
                    expanded.push('$');
                    expanded.push_str(&var);
                }
            }
        } else {
            expanded.push(c);
        }
    }

    PathBuf::from(expanded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_socket_filename() {
        assert_eq!(
            control_socket_path().file_name().unwrap(),
            ".pyprland.sock"
        );
    }

    #[test]
    fn test_expand_user_path_plain() {
        assert_eq!(expand_user_path("/etc/pypr.toml"), PathBuf::from("/etc/pypr.toml"));
    }

    #[test]
    fn test_expand_user_path_env_var() {
        // SAFETY: test-local env mutation, no concurrent readers of this var.
        unsafe { std::env::set_var("PYPR_TEST_DIR", "/srv/conf") };
        assert_eq!(
            expand_user_path("$PYPR_TEST_DIR/config.toml"),
            PathBuf::from("/srv/conf/config.toml")
        );
    }

    #[test]
    fn test_expand_user_path_unknown_var_kept() {
        assert_eq!(
            expand_user_path("$PYPR_DOES_NOT_EXIST/x"),
            PathBuf::from("$PYPR_DOES_NOT_EXIST/x")
        );
    }
}
