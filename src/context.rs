//! The host-pipeline side of an extraction.
//!
//! `LoaderContext` is everything the extractor consumes from the pipeline:
//! the resource being transformed, its options, dependency registration and
//! the asynchronous module-loading facility. `FsLoaderContext` is the
//! filesystem-backed implementation used by the CLI; real pipelines provide
//! their own.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::cell::{Cell, RefCell};
use std::path::{Path, PathBuf};

/// Options recognized by the extractor.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExtractOptions {
    /// Overrides the pipeline-wide public path for this unit.
    pub public_path: Option<String>,
}

#[async_trait(?Send)]
pub trait LoaderContext {
    /// Hints that the result may be cached while declared dependencies are
    /// unchanged. A no-op for hosts without a cache.
    fn cacheable(&self);

    /// Filesystem path of the unit being transformed. Used for diagnostics
    /// and for resolving requires relative to the unit.
    fn resource_path(&self) -> &Path;

    fn options(&self) -> &ExtractOptions;

    /// Pipeline-wide public path, used when the option is absent.
    fn default_public_path(&self) -> &str {
        ""
    }

    /// Registers an extra file for the host's watch/cache invalidation.
    fn add_dependency(&self, path: &Path);

    /// Loads the generated source of `request`. Implementations must also
    /// register `request` as a dependency of the current unit.
    async fn load_module(&self, request: &str) -> Result<String>;
}

/// Filesystem-backed context: module requests are read straight from disk,
/// relative to the resource's directory. Leading loader prefixes
/// (`style-loader!./a.css`) and `?query` suffixes are dropped before
/// resolving, so requests written for a richer pipeline still load.
pub struct FsLoaderContext {
    resource_path: PathBuf,
    options: ExtractOptions,
    default_public_path: String,
    dependencies: RefCell<Vec<PathBuf>>,
    cacheable: Cell<bool>,
}

impl FsLoaderContext {
    pub fn new(resource_path: impl Into<PathBuf>, options: ExtractOptions) -> Self {
        Self {
            resource_path: resource_path.into(),
            options,
            default_public_path: String::new(),
            dependencies: RefCell::new(Vec::new()),
            cacheable: Cell::new(false),
        }
    }

    /// Sets the pipeline-wide public path used when the option is absent.
    pub fn with_default_public_path(mut self, public_path: impl Into<String>) -> Self {
        self.default_public_path = public_path.into();
        self
    }

    /// Files registered as dependencies so far, in registration order.
    pub fn dependencies(&self) -> Vec<PathBuf> {
        self.dependencies.borrow().clone()
    }

    pub fn is_cacheable(&self) -> bool {
        self.cacheable.get()
    }

    fn resolve_request(&self, request: &str) -> PathBuf {
        // "style-loader!./a.css?inline" -> "./a.css"
        let bare = request.rsplit('!').next().unwrap_or(request);
        let bare = bare.split('?').next().unwrap_or(bare);
        self.resource_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(bare)
    }
}

#[async_trait(?Send)]
impl LoaderContext for FsLoaderContext {
    fn cacheable(&self) {
        self.cacheable.set(true);
    }

    fn resource_path(&self) -> &Path {
        &self.resource_path
    }

    fn options(&self) -> &ExtractOptions {
        &self.options
    }

    fn default_public_path(&self) -> &str {
        &self.default_public_path
    }

    fn add_dependency(&self, path: &Path) {
        self.dependencies.borrow_mut().push(path.to_path_buf());
    }

    async fn load_module(&self, request: &str) -> Result<String> {
        let path = self.resolve_request(request);
        let source = tokio::fs::read_to_string(&path).await.map_err(|e| {
            anyhow!(
                "failed to read module '{}' (resolved to '{}'): {}",
                request,
                path.display(),
                e
            )
        })?;
        self.dependencies.borrow_mut().push(path);
        Ok(source)
    }
}
