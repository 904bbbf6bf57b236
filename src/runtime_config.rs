//! Environment-based runtime tuning.
//!
//! ## `GANTRY_STACK_SIZE`
//!
//! Stack size in bytes for the per-request pipeline coroutines, accepted in
//! decimal (`65536`) or hex (`0x10000`). Default: 64 KiB. Total memory for
//! in-flight requests is roughly `stack_size × concurrent pipelines`, so
//! tune it down for many small handlers or up for deep call chains.

use std::env;

const DEFAULT_STACK_SIZE: usize = 0x10000;

/// Runtime configuration loaded once at server start.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeConfig {
    /// Stack size for pipeline coroutines in bytes.
    pub stack_size: usize,
}

impl RuntimeConfig {
    /// Load configuration from the environment.
    ///
    /// Even sizes are bumped to the next odd value: the coroutine runtime
    /// only tracks actual stack usage for odd-sized stacks.
    pub fn from_env() -> Self {
        let raw = env::var("GANTRY_STACK_SIZE")
            .ok()
            .and_then(|val| parse_size(&val))
            .unwrap_or(DEFAULT_STACK_SIZE);

        let stack_size = if raw % 2 == 0 { raw + 1 } else { raw };

        RuntimeConfig { stack_size }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            stack_size: DEFAULT_STACK_SIZE + 1,
        }
    }
}

fn parse_size(val: &str) -> Option<usize> {
    if let Some(hex) = val.strip_prefix("0x") {
        usize::from_str_radix(hex, 16).ok()
    } else {
        val.parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_decimal_and_hex() {
        assert_eq!(parse_size("65536"), Some(65536));
        assert_eq!(parse_size("0x8000"), Some(0x8000));
        assert_eq!(parse_size("bogus"), None);
    }

    #[test]
    fn default_stack_is_odd() {
        assert_eq!(RuntimeConfig::default().stack_size % 2, 1);
    }
}
