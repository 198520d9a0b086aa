//! The plugin capability interface and the hook chain that invokes it.
//!
//! A [`Plugin`] overrides any of two hooks, both of which default to doing
//! nothing:
//!
//! * [`Plugin::after_render`] runs once per rendered document. The chain is a
//!   left fold: each plugin receives the HTML produced by the previous one.
//! * [`Plugin::build_finished`] runs once per build, after every page is
//!   written and the cache is flushed, with read access to the build state
//!   through a [`BuildContext`].
//!
//! Every hook call is isolated: an error or a panic is logged with the
//! plugin's name and the hook's name, and the chain carries on. For
//! `after_render` the next plugin then sees the HTML as it was before the
//! failing plugin.
//!
//! Plugins are discovered from manifest files (`*.yml`) in the plugins
//! directory. Each manifest names one built-in plugin and its options:
//!
//! ```yaml
//! plugin: feed
//! options:
//!   path: atom.xml
//! ```

use std::fs;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::build::BuildContext;
use crate::plugins;
use crate::render::{panic_message, RenderedDocument};

pub const AFTER_RENDER: &str = "after_render";
pub const BUILD_FINISHED: &str = "build_finished";

/// An extension invoked at fixed points of the build. A plugin lives for one
/// [`crate::build::Site`] and may accumulate state between hook calls.
pub trait Plugin {
    /// The identity used in logs.
    fn name(&self) -> &str;

    /// Transforms the HTML of a freshly rendered document.
    fn after_render(&mut self, _document: &RenderedDocument, html: &str) -> Result<String> {
        Ok(html.to_owned())
    }

    /// Emits derived artifacts once all output is written.
    fn build_finished(&mut self, _context: &BuildContext<'_>) -> Result<()> {
        Ok(())
    }
}

/// Plugins in registration order.
#[derive(Default)]
pub struct PluginChain {
    plugins: Vec<Box<dyn Plugin>>,
}

impl PluginChain {
    pub fn new() -> PluginChain {
        PluginChain::default()
    }

    /// Appends `plugin` to the chain.
    pub fn register(&mut self, plugin: Box<dyn Plugin>) {
        debug!(plugin = plugin.name(), "registered plugin");
        self.plugins.push(plugin);
    }

    /// Builder-style [`PluginChain::register`].
    pub fn with(mut self, plugin: impl Plugin + 'static) -> PluginChain {
        self.register(Box::new(plugin));
        self
    }

    /// Loads every manifest in `directory` in file name order. A manifest
    /// that can't be read or names an unknown plugin is logged and skipped.
    /// A missing directory yields an empty chain.
    pub fn discover(directory: &Path) -> PluginChain {
        let mut chain = PluginChain::new();
        let entries = match fs::read_dir(directory) {
            Ok(entries) => entries,
            Err(err) => {
                debug!(path = %directory.display(), error = %err, "no plugins directory");
                return chain;
            }
        };

        let mut manifests: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.is_file()
                    && path
                        .extension()
                        .map_or(false, |ext| ext == "yml" || ext == "yaml")
            })
            .collect();
        manifests.sort();

        for path in manifests {
            match load_manifest(&path) {
                Ok(plugin) => {
                    info!(plugin = plugin.name(), path = %path.display(), "loaded plugin");
                    chain.register(plugin);
                }
                Err(err) => error!(path = %path.display(), error = %err, "failed to load plugin"),
            }
        }
        chain
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// The plugin names in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.plugins.iter().map(|p| p.name()).collect()
    }

    /// Folds `html` through every plugin's `after_render`.
    pub fn after_render(&mut self, document: &RenderedDocument, html: String) -> String {
        let mut html = html;
        for plugin in self.plugins.iter_mut() {
            let result = panic::catch_unwind(AssertUnwindSafe(|| plugin.after_render(document, &html)));
            match flatten(result) {
                Ok(transformed) => html = transformed,
                Err(err) => error!(
                    plugin = plugin.name(),
                    hook = AFTER_RENDER,
                    path = %document.source.display(),
                    error = %err,
                    "plugin hook failed"
                ),
            }
        }
        html
    }

    /// Runs every plugin's `build_finished`. Returns the number of plugins
    /// that failed.
    pub fn build_finished(&mut self, context: &BuildContext<'_>) -> usize {
        let mut failures = 0;
        for plugin in self.plugins.iter_mut() {
            let result = panic::catch_unwind(AssertUnwindSafe(|| plugin.build_finished(context)));
            if let Err(err) = flatten(result) {
                failures += 1;
                error!(
                    plugin = plugin.name(),
                    hook = BUILD_FINISHED,
                    error = %err,
                    "plugin hook failed"
                );
            }
        }
        failures
    }
}

fn flatten<T>(result: std::thread::Result<Result<T>>) -> Result<T> {
    match result {
        Ok(result) => result,
        Err(payload) => Err(Error::Panicked(panic_message(payload.as_ref()))),
    }
}

/// A plugin manifest file.
#[derive(Deserialize)]
struct Manifest {
    /// The built-in plugin's name.
    plugin: String,

    #[serde(default)]
    options: serde_yaml::Value,
}

fn load_manifest(path: &Path) -> std::result::Result<Box<dyn Plugin>, LoadError> {
    let contents = fs::read_to_string(path)?;
    let manifest: Manifest = serde_yaml::from_str(&contents)?;
    plugins::builtin(&manifest.plugin, manifest.options)
}

/// The result of a plugin hook.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents a failed plugin hook.
#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Template(#[from] crate::template::Error),

    #[error(transparent)]
    Write(#[from] crate::write::Error),

    #[error("{0}")]
    Message(String),

    #[error("panicked: {0}")]
    Panicked(String),
}

/// Represents a failure to load a plugin manifest.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("reading manifest: {0}")]
    Io(#[from] io::Error),

    #[error("parsing manifest: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("unknown plugin `{0}`")]
    Unknown(String),
}
