//! Interpreter options from the environment
//!
//! `SABLE_MAX_DEPTH` overrides the call depth limit. Logging verbosity is
//! controlled separately through `RUST_LOG`.

use anyhow::{bail, Context, Result};
use sable_core::InterpreterOptions;

pub const MAX_DEPTH_VAR: &str = "SABLE_MAX_DEPTH";

/// Build options from an optional `SABLE_MAX_DEPTH` value
pub fn options_from(max_depth: Option<&str>, echo_prints: bool) -> Result<InterpreterOptions> {
    let mut options = InterpreterOptions {
        echo_prints,
        ..InterpreterOptions::default()
    };

    if let Some(raw) = max_depth {
        let depth: usize = raw
            .trim()
            .parse()
            .with_context(|| format!("{} must be a positive integer, got {:?}", MAX_DEPTH_VAR, raw))?;
        if depth == 0 {
            bail!("{} must be at least 1", MAX_DEPTH_VAR);
        }
        options.max_depth = depth;
    }

    Ok(options)
}

/// Read options from the process environment
pub fn from_env(echo_prints: bool) -> Result<InterpreterOptions> {
    let raw = std::env::var(MAX_DEPTH_VAR).ok();
    options_from(raw.as_deref(), echo_prints)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_override() {
        let options = options_from(None, true).unwrap();
        assert_eq!(options.max_depth, InterpreterOptions::default().max_depth);
        assert!(options.echo_prints);
    }

    #[test]
    fn test_depth_override() {
        let options = options_from(Some(" 64 "), false).unwrap();
        assert_eq!(options.max_depth, 64);
        assert!(!options.echo_prints);
    }

    #[test]
    fn test_invalid_depth_rejected() {
        let err = options_from(Some("deep"), false).unwrap_err();
        assert!(err.to_string().contains(MAX_DEPTH_VAR));
        assert!(options_from(Some("0"), false).is_err());
        assert!(options_from(Some("-3"), false).is_err());
    }
}
