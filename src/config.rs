//! Configuration for the xref resolver and object index.
//!
//! Replaces environment-lookup-at-construction with a plain value accepted
//! by `DocumentIndex::open` (see `Config::from_env` for the one place an
//! environment variable is actually read, kept out of the hot parsing path).

/// Default backward scan window (bytes before EOF) for locating `startxref`.
pub const DEFAULT_EOF_LOOKUP_RANGE: usize = 2048;

/// Resolver configuration.
#[derive(Debug, Clone, Copy)]
pub struct Config {
    /// How many bytes before EOF to scan for `startxref`.
    pub eof_lookup_range: usize,

    /// Maximum number of bytes `BruteForceIndexer` will scan looking for
    /// `N G obj` / `trailer` / `xref` markers (0 = scan the whole file).
    pub max_brute_force_bytes: usize,

    /// Maximum number of sections to follow along a `/Prev` chain before
    /// treating it as a loop, even if no offset literally repeats.
    pub max_prev_chain_len: usize,

    /// Maximum number of objects accepted from a single object stream's
    /// `/N` entry (decompression-bomb-style guard on the pairs header).
    pub max_object_stream_objects: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            eof_lookup_range: DEFAULT_EOF_LOOKUP_RANGE,
            max_brute_force_bytes: 0,
            max_prev_chain_len: 1_000,
            max_object_stream_objects: 1_000_000,
        }
    }
}

impl Config {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a configuration from the `EOF_LOOKUP_RANGE` environment
    /// variable, falling back to defaults (with a warning) for anything
    /// else or a malformed value.
    ///
    /// This is the only place in the crate that touches the environment;
    /// `DocumentIndex::open` itself always takes a `Config` by value.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        match std::env::var("EOF_LOOKUP_RANGE") {
            Ok(raw) => match raw.parse::<usize>() {
                Ok(n) if n > 0 => config.eof_lookup_range = n,
                Ok(_) => {
                    log::warn!(
                        "EOF_LOOKUP_RANGE must be positive, got 0; keeping default {}",
                        config.eof_lookup_range
                    );
                },
                Err(_) => {
                    log::warn!(
                        "EOF_LOOKUP_RANGE='{}' is not a valid integer; keeping default {}",
                        raw,
                        config.eof_lookup_range
                    );
                },
            },
            Err(std::env::VarError::NotPresent) => {},
            Err(std::env::VarError::NotUnicode(_)) => {
                log::warn!("EOF_LOOKUP_RANGE is not valid unicode; keeping default");
            },
        }

        config
    }

    /// Set the EOF lookup range (builder style).
    pub fn with_eof_lookup_range(mut self, range: usize) -> Self {
        self.eof_lookup_range = range;
        self
    }

    /// Set the brute-force scan cap (builder style).
    pub fn with_max_brute_force_bytes(mut self, max: usize) -> Self {
        self.max_brute_force_bytes = max;
        self
    }

    /// Set the `/Prev` chain length cap (builder style).
    pub fn with_max_prev_chain_len(mut self, max: usize) -> Self {
        self.max_prev_chain_len = max;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.eof_lookup_range, DEFAULT_EOF_LOOKUP_RANGE);
        assert_eq!(config.max_brute_force_bytes, 0);
    }

    #[test]
    fn test_builder_methods() {
        let config = Config::new().with_eof_lookup_range(4096).with_max_prev_chain_len(10);
        assert_eq!(config.eof_lookup_range, 4096);
        assert_eq!(config.max_prev_chain_len, 10);
    }

    #[test]
    fn test_from_env_default_when_unset() {
        std::env::remove_var("EOF_LOOKUP_RANGE");
        let config = Config::from_env();
        assert_eq!(config.eof_lookup_range, DEFAULT_EOF_LOOKUP_RANGE);
    }

    #[test]
    fn test_from_env_malformed_keeps_default() {
        std::env::set_var("EOF_LOOKUP_RANGE", "not-a-number");
        let config = Config::from_env();
        assert_eq!(config.eof_lookup_range, DEFAULT_EOF_LOOKUP_RANGE);
        std::env::remove_var("EOF_LOOKUP_RANGE");
    }

    #[test]
    fn test_from_env_valid_value() {
        std::env::set_var("EOF_LOOKUP_RANGE", "8192");
        let config = Config::from_env();
        assert_eq!(config.eof_lookup_range, 8192);
        std::env::remove_var("EOF_LOOKUP_RANGE");
    }
}
