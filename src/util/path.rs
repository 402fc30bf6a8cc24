//! Path helpers

/// Expand `~`, `$VAR` and `${VAR}`; the input is returned unchanged when a variable is unset.
pub fn expand_env_vars(path: &str) -> String {
    shellexpand::full(path)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| path.to_string())
}
