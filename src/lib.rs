//! The library code for the `blazemark` static site generator. A build
//! ([`crate::build::Site::build`]) runs in distinct phases:
//!
//! 1. Discovering markdown sources and filtering out the ones whose content
//!    hasn't changed since the last build ([`crate::cache`])
//! 2. Rendering the changed documents in parallel on a bounded worker pool
//!    ([`crate::render`])
//! 3. Folding each rendered page through the plugins' `after_render` hooks and
//!    writing it to disk ([`crate::plugin`], [`crate::write`])
//! 4. Aggregating every published document, rendered or unchanged, into the
//!    home index and the tag and category pages ([`crate::taxonomy`])
//! 5. Persisting the cache and letting plugins emit derived artifacts such as
//!    feeds and sitemaps ([`crate::plugins`])
//!
//! The second phase is the only concurrent one. Workers share nothing with
//! the orchestrator but the source path they were handed; everything after
//! the fan-in happens on the orchestrating thread.

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]

pub mod build;
pub mod cache;
pub mod config;
pub mod document;
pub mod init;
pub mod markdown;
pub mod plugin;
pub mod plugins;
pub mod render;
pub mod taxonomy;
pub mod template;
pub mod write;
