// ABOUTME: Immutable server configuration shared by the listener and every connection task
// ABOUTME: Constructed once at startup from CLI flags; never mutated afterwards

use std::path::{Path, PathBuf};

/// The server's configuration record.
///
/// Built once in `main` and handed to the listener as a `&'static Config` (or
/// an `Arc<Config>`); no part of the protocol engine or handler reaches for
/// process-wide mutable state.
#[derive(Debug, Clone)]
pub struct Config {
    /// UDP port the listener binds to.
    pub listen_port: u16,

    /// Root directory file operations are confined to. Always canonicalized
    /// so path-confinement checks compare against a stable absolute path.
    pub root_directory: PathBuf,

    /// Whether verbose (debug-level) logging is enabled.
    pub verbose: bool,
}

impl Config {
    /// Default listen port used when `-p` is not given.
    pub const DEFAULT_PORT: u16 = 8080;

    /// Build a config, canonicalizing `root_directory`.
    ///
    /// Fails if the directory does not exist or cannot be resolved.
    pub fn new(listen_port: u16, root_directory: &Path, verbose: bool) -> std::io::Result<Self> {
        let root_directory = root_directory.canonicalize()?;
        Ok(Config {
            listen_port,
            root_directory,
            verbose,
        })
    }
}
