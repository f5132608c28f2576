use std::fmt::{self, Write};
use std::sync::Arc;

use sha2::{Digest, Sha256};

use crate::transport::Method;

/// Stable identity for one logical API request.
///
/// Reads are keyed by `(path, params)` with the params sorted before
/// serialization, so parameter order never produces distinct keys. Writes are
/// keyed by `(method, path, body)`, which makes rapid double-submits of the
/// same mutation collapse into one request without ever colliding with a read
/// for the same path.
#[derive(Debug, Clone, Eq)]
pub struct CacheKey {
    metadata: Arc<str>,
    hash: [u8; 32],
}

impl PartialEq for CacheKey {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
    }
}

impl std::hash::Hash for CacheKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.hash.hash(state);
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.hash[..8] {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

impl CacheKey {
    /// Creates the key for a read of `path` with the given query parameters.
    pub fn for_read(path: &str, params: &[(&str, &str)]) -> Self {
        let mut builder = CacheKeyBuilder::new(Method::Get, path);
        let mut params = params.to_vec();
        params.sort_unstable();
        for (name, value) in params {
            builder.write_param(name, value);
        }
        builder.build()
    }

    /// Creates the key for a mutation of `path` with an optional JSON body.
    ///
    /// `serde_json` serializes object keys in sorted order, so structurally
    /// equal bodies always hash identically.
    pub fn for_write(method: Method, path: &str, body: Option<&serde_json::Value>) -> Self {
        let mut builder = CacheKeyBuilder::new(method, path);
        if let Some(body) = body {
            builder.write_body(body);
        }
        builder.build()
    }

    /// Returns the human-readable metadata this key was hashed from.
    pub fn metadata(&self) -> &str {
        &self.metadata
    }
}

/// Accumulates the stable, human-readable input that a [`CacheKey`] is
/// hashed from. Useful to keep around for debugging cache behavior.
struct CacheKeyBuilder {
    metadata: String,
}

impl CacheKeyBuilder {
    fn new(method: Method, path: &str) -> Self {
        let metadata = format!("method: {method}\npath: {path}\n");
        Self { metadata }
    }

    fn write_param(&mut self, name: &str, value: &str) {
        writeln!(self.metadata, "param: {name}={value}").unwrap();
    }

    fn write_body(&mut self, body: &serde_json::Value) {
        writeln!(self.metadata, "body: {body}").unwrap();
    }

    fn build(self) -> CacheKey {
        let hash = Sha256::digest(&self.metadata);
        let hash = <[u8; 32]>::try_from(hash.as_slice()).expect("sha256 outputs 32 bytes");

        CacheKey {
            metadata: self.metadata.into(),
            hash,
        }
    }
}
