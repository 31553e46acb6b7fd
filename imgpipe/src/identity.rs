//! Request identity and cache key derivation.
//!
//! Every request carries a [`RequestAttrs`] built from the resource locator
//! and the [`TransformOptions`] that shape the decoded output. The derived
//! [`CacheKey`] is what the memory cache and the edit locks are keyed by, so
//! two requests for the same locator with different transforms never share a
//! decoded resource.
//!
//! ```text
//! https://img.example/a.png                       -> https://img.example/a.png
//! https://img.example/a.png + resize(200x100)     -> https://img.example/a.png_Resize(200x100)
//! https://img.example/a.png + resize + lowQuality -> https://img.example/a.png_Resize(200x100)_LowQuality
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Stable cache key for a decoded resource.
///
/// Cheap to clone; the underlying string is shared.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(Arc<str>);

impl CacheKey {
    /// Derives a key from a locator and the transforms applied to it.
    pub fn derive(uri: &str, transform: &TransformOptions) -> Self {
        let mut key = String::with_capacity(uri.len() + 32);
        key.push_str(uri);
        transform.append_key_suffix(&mut key);
        Self(Arc::from(key))
    }

    /// Returns the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the key is empty (the locator was empty).
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CacheKey {
    fn from(value: &str) -> Self {
        Self(Arc::from(value))
    }
}

/// Target size for a decoded image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Resize {
    pub width: u32,
    pub height: u32,
}

impl Resize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl std::str::FromStr for Resize {
    type Err = String;

    /// Parses `WIDTHxHEIGHT`, e.g. `200x100`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s
            .trim()
            .split_once(['x', 'X'])
            .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{}'", s))?;
        let width: u32 = w
            .trim()
            .parse()
            .map_err(|_| format!("invalid width '{}'", w))?;
        let height: u32 = h
            .trim()
            .parse()
            .map_err(|_| format!("invalid height '{}'", h))?;
        if width == 0 || height == 0 {
            return Err("resize dimensions must be non-zero".to_string());
        }
        Ok(Self { width, height })
    }
}

/// Transforms applied at decode time. Each one contributes to the cache key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct TransformOptions {
    /// Downscale the decoded image to fit within this size.
    pub resize: Option<Resize>,
    /// Prefer a cheaper resampling filter.
    pub low_quality: bool,
}

impl TransformOptions {
    pub fn with_resize(mut self, resize: Resize) -> Self {
        self.resize = Some(resize);
        self
    }

    pub fn with_low_quality(mut self, low_quality: bool) -> Self {
        self.low_quality = low_quality;
        self
    }

    fn append_key_suffix(&self, key: &mut String) {
        if let Some(resize) = self.resize {
            key.push_str(&format!("_Resize({}x{})", resize.width, resize.height));
        }
        if self.low_quality {
            key.push_str("_LowQuality");
        }
    }
}

/// Where a locator points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UriKind {
    /// Anything the downloader resolves, typically `http://` or `https://`.
    Network,
    /// `file://` or an absolute path, read directly.
    LocalFile(PathBuf),
    /// Empty or blank.
    Invalid,
}

impl UriKind {
    pub fn classify(uri: &str) -> Self {
        let uri = uri.trim();
        if uri.is_empty() {
            return Self::Invalid;
        }
        if let Some(path) = uri.strip_prefix("file://") {
            return Self::LocalFile(PathBuf::from(path));
        }
        if Path::new(uri).is_absolute() {
            return Self::LocalFile(PathBuf::from(uri));
        }
        Self::Network
    }
}

/// Immutable identity of a request.
#[derive(Debug, Clone)]
pub struct RequestAttrs {
    uri: String,
    key: CacheKey,
    name: String,
}

impl RequestAttrs {
    /// Builds attributes for `uri`, deriving the cache key from `transform`.
    ///
    /// The human-readable name defaults to the derived key.
    pub fn new(uri: impl Into<String>, transform: &TransformOptions) -> Self {
        let uri = uri.into();
        let key = CacheKey::derive(&uri, transform);
        let name = key.to_string();
        Self { uri, key, name }
    }

    /// Overrides the human-readable name used in logs.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Memory cache and edit lock key.
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// Disk cache key. Disk entries hold untransformed bytes, so they are
    /// keyed by the locator alone.
    pub fn disk_cache_key(&self) -> &str {
        &self.uri
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn uri_kind(&self) -> UriKind {
        UriKind::classify(&self.uri)
    }
}
