//! Server configuration.

use crate::error::{ImageForgeError, Result};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Default listen address.
pub const DEFAULT_ADDR: &str = "127.0.0.1:3000";

/// Default request body limit (25 MiB): the selection budget plus multipart overhead.
pub const DEFAULT_BODY_LIMIT: usize = 25 * 1024 * 1024;

/// Settings for the upload server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address to listen on.
    pub addr: SocketAddr,
    /// Largest accepted request body in bytes.
    pub body_limit: usize,
    /// Directory with the page's static assets, served at `/`.
    pub static_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: DEFAULT_ADDR.parse().unwrap_or_else(|_| SocketAddr::from(([127, 0, 0, 1], 3000))),
            body_limit: DEFAULT_BODY_LIMIT,
            static_dir: None,
        }
    }
}

impl ServerConfig {
    /// Reads `IMAGEFORGE_ADDR`, `IMAGEFORGE_BODY_LIMIT` and
    /// `IMAGEFORGE_STATIC_DIR`, falling back to defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(addr) = get("IMAGEFORGE_ADDR") {
            config.addr = addr
                .trim()
                .parse()
                .map_err(|e| ImageForgeError::InvalidRequest(format!("IMAGEFORGE_ADDR: {e}")))?;
        }
        if let Some(limit) = get("IMAGEFORGE_BODY_LIMIT") {
            config.body_limit = limit
                .trim()
                .parse()
                .map_err(|e| ImageForgeError::InvalidRequest(format!("IMAGEFORGE_BODY_LIMIT: {e}")))?;
        }
        if let Some(dir) = get("IMAGEFORGE_STATIC_DIR") {
            config.static_dir = Some(PathBuf::from(dir));
        }
        Ok(config)
    }

    /// Sets the listen address.
    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    /// Sets the request body limit.
    pub fn with_body_limit(mut self, limit: usize) -> Self {
        self.body_limit = limit;
        self
    }

    /// Sets the static asset directory.
    pub fn with_static_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.static_dir = Some(dir.into());
        self
    }
}
