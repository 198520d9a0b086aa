//! Exports [`Site`], the build orchestrator. [`Site::build`] stitches the
//! phases of an incremental build together:
//!
//! 1. discover documents and consult the [`Cache`] to find what changed;
//! 2. render the changed documents on a [`RenderPool`];
//! 3. fold each result through the plugins' `after_render` hooks, write it,
//!    and record it in the cache;
//! 4. aggregate every published document into a [`Taxonomy`] and write the
//!    home index, tag pages, and category pages;
//! 5. flush the cache, then run the plugins' `build_finished` hooks.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::cache::{Cache, CacheError};
use crate::config::{Config, SiteMetadata};
use crate::document::{Document, DocumentKind, PublishedDocument};
use crate::plugin::PluginChain;
use crate::render::{RenderPool, RenderTask};
use crate::taxonomy::Taxonomy;
use crate::template::{self, Theme};
use crate::write::{self, Writer};

const MARKDOWN_EXTENSION: &str = "md";

/// Flags for one build.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BuildOptions {
    /// Re-render every document regardless of the cache. Also includes
    /// drafts.
    pub force: bool,

    /// Render and publish drafts.
    pub include_drafts: bool,
}

impl BuildOptions {
    pub fn drafts_included(&self) -> bool {
        self.force || self.include_drafts
    }
}

/// What a build did.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BuildReport {
    /// Documents found in the content tree.
    pub discovered: usize,

    /// Sources handed to a render worker, in discovery order.
    pub rendered: Vec<PathBuf>,

    /// Sources skipped because the cache said they were unchanged.
    pub unchanged: Vec<PathBuf>,

    /// Sources whose render failed; they were left out of this build.
    pub failed: Vec<PathBuf>,

    /// Drafts left out of this build.
    pub drafts: usize,

    /// Stale output pages removed (drafts, deleted sources, moved slugs).
    pub removed: usize,

    /// Documents with an output page after this build.
    pub published: usize,

    /// Plugins whose `build_finished` hook failed.
    pub plugin_failures: usize,

    pub elapsed: Duration,
}

/// Read access to a finished build, handed to `build_finished` hooks.
pub struct BuildContext<'a> {
    config: &'a Config,
    theme: &'a Theme,
    taxonomy: &'a Taxonomy,
}

impl<'a> BuildContext<'a> {
    pub fn new(config: &'a Config, theme: &'a Theme, taxonomy: &'a Taxonomy) -> Self {
        BuildContext {
            config,
            theme,
            taxonomy,
        }
    }

    pub fn config(&self) -> &'a Config {
        self.config
    }

    pub fn site(&self) -> &'a SiteMetadata {
        &self.config.site
    }

    pub fn theme(&self) -> &'a Theme {
        self.theme
    }

    pub fn taxonomy(&self) -> &'a Taxonomy {
        self.taxonomy
    }

    /// Every published document, newest first.
    pub fn documents(&self) -> &'a [PublishedDocument] {
        self.taxonomy.documents()
    }

    pub fn output_directory(&self) -> &'a Path {
        &self.config.output_directory
    }

    /// Writes an artifact to `relative_path` under the output directory.
    pub fn write_artifact(
        &self,
        relative_path: impl AsRef<Path>,
        contents: &str,
    ) -> write::Result<PathBuf> {
        let path = self.config.output_directory.join(relative_path);
        write::write_file(&path, contents)?;
        Ok(path)
    }
}

/// The build orchestrator. Owns the configuration, the change-detection
/// cache, and the plugins for as many builds as it is asked to run.
pub struct Site {
    config: Config,
    cache: Cache,
    plugins: PluginChain,
    taxonomy: Taxonomy,
}

impl Site {
    /// Loads the cache and discovers plugins from the configured directory.
    pub fn new(config: Config) -> Site {
        let plugins = PluginChain::discover(&config.plugins_directory);
        Site::with_plugins(config, plugins)
    }

    /// Like [`Site::new`] but with an explicit plugin chain.
    pub fn with_plugins(config: Config, plugins: PluginChain) -> Site {
        Site {
            cache: Cache::load(&config.cache_file),
            config,
            plugins,
            taxonomy: Taxonomy::default(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    /// The taxonomy of the most recent build.
    pub fn taxonomy(&self) -> &Taxonomy {
        &self.taxonomy
    }

    /// The documents published by the most recent build, newest first.
    pub fn documents(&self) -> &[PublishedDocument] {
        self.taxonomy.documents()
    }

    /// Deletes the output tree and the cache file, and empties the cache.
    pub fn clean(&mut self) -> Result<()> {
        write::rmdir(&self.config.output_directory)?;
        match fs::remove_file(&self.config.cache_file) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => {
                return Err(Error::Io {
                    path: self.config.cache_file.clone(),
                    err,
                })
            }
        }
        self.cache = Cache::empty(&self.config.cache_file);
        info!(output = %self.config.output_directory.display(), "cleaned output and cache");
        Ok(())
    }

    /// Runs one incremental build.
    pub fn build(&mut self, options: BuildOptions) -> Result<BuildReport> {
        let start = Instant::now();
        let mut report = BuildReport::default();
        let include_drafts = options.drafts_included();

        let theme = Theme::load(&self.config.theme_directory)?;
        fs::create_dir_all(&self.config.output_directory).map_err(|err| Error::Io {
            path: self.config.output_directory.clone(),
            err,
        })?;
        let writer = Writer {
            output_directory: &self.config.output_directory,
            theme: &theme,
            site: &self.config.site,
        };

        // Discover, then decide what to render.
        let sources = discover(&self.config)?;
        report.discovered = sources.len();
        info!(
            content = %self.config.content_directory.display(),
            documents = sources.len(),
            "starting build"
        );

        // Outputs whose document went away. They're removed once the fan-in
        // is done and only if no live document wrote to the same path.
        let mut stale_outputs = prune_deleted(&mut self.cache, &sources);

        let mut order: HashMap<PathBuf, usize> = HashMap::new();
        let mut raw_texts: HashMap<PathBuf, String> = HashMap::new();
        let mut tasks = Vec::new();
        let mut published: Vec<(usize, PublishedDocument)> = Vec::new();
        for (i, (source, kind)) in sources.iter().enumerate() {
            order.insert(source.clone(), i);
            let raw = match fs::read_to_string(source) {
                Ok(raw) => raw,
                Err(err) => {
                    error!(path = %source.display(), error = %err, "failed to read document");
                    report.failed.push(source.clone());
                    continue;
                }
            };
            let doc = Document::parse(source, *kind, &raw);
            if doc.is_draft() && !include_drafts {
                report.drafts += 1;
                if let Some(stale) = self.cache.forget(source) {
                    stale_outputs.push(stale.output);
                }
                debug!(path = %source.display(), "skipping draft");
                continue;
            }
            if self.cache.needs_render(source, &raw, options.force) {
                tasks.push(RenderTask {
                    source: source.clone(),
                    kind: *kind,
                });
                raw_texts.insert(source.clone(), raw);
            } else {
                report.unchanged.push(source.clone());
                published.push((i, doc.publish()));
            }
        }

        // Render in parallel; `dispatch` returns only once every task is done.
        let pool = RenderPool::new(
            RenderPool::worker_count(self.config.workers, tasks.len()),
            &self.config.theme_directory,
            &self.config.site,
        );
        report.rendered = tasks.iter().map(|t| t.source.clone()).collect();
        let mut outcomes = pool.dispatch(tasks);
        outcomes.sort_by_key(|o| order.get(&o.task.source).copied().unwrap_or(usize::MAX));

        // Fan in: plugins, output, cache.
        let mut slugs: HashMap<String, PathBuf> = HashMap::new();
        for outcome in outcomes {
            let rendered = match outcome.result {
                Ok(rendered) => rendered,
                Err(err) => {
                    error!(path = %outcome.task.source.display(), error = %err, "failed to render document");
                    report.failed.push(outcome.task.source);
                    continue;
                }
            };
            if rendered.is_draft() && !include_drafts {
                // The source turned into a draft between discovery and render.
                report.drafts += 1;
                if let Some(stale) = self.cache.forget(&rendered.source) {
                    stale_outputs.push(stale.output);
                }
                continue;
            }

            let html = self.plugins.after_render(&rendered, rendered.html.clone());
            if let Some(previous) = slugs.insert(rendered.slug.clone(), rendered.source.clone()) {
                warn!(
                    slug = %rendered.slug,
                    first = %previous.display(),
                    second = %rendered.source.display(),
                    "two documents share a slug; the latter wins"
                );
            }
            let output = match writer.write_document(&rendered.slug, &html) {
                Ok(output) => output,
                Err(write::Error::UnsafeName(slug)) => {
                    error!(path = %rendered.source.display(), slug = %slug, "slug is not a valid directory name");
                    report.failed.push(rendered.source);
                    continue;
                }
                Err(err) => return Err(err.into()),
            };
            let moved = self
                .cache
                .get(&rendered.source)
                .map(|previous| previous.output.clone())
                .filter(|previous| *previous != output);
            if let Some(previous) = moved {
                debug!(path = %rendered.source.display(), previous = %previous.display(), "slug changed");
                stale_outputs.push(previous);
            }
            if let Some(raw) = raw_texts.get(&rendered.source) {
                self.cache.record_success(&rendered.source, raw, &output);
            }
            debug!(path = %rendered.source.display(), output = %output.display(), "wrote document");

            let i = order.get(&rendered.source).copied().unwrap_or(usize::MAX);
            published.push((
                i,
                PublishedDocument::new(rendered.source, rendered.kind, rendered.meta),
            ));
        }

        // The cache now records exactly the outputs of live documents.
        for stale in stale_outputs {
            if self.cache.owns_output(&stale) {
                debug!(output = %stale.display(), "stale output was reclaimed by another document");
                continue;
            }
            writer.remove_output(&stale)?;
            report.removed += 1;
        }

        // Aggregate over everything published, fresh or unchanged.
        published.sort_by_key(|(i, _)| *i);
        let taxonomy = Taxonomy::collect(published.into_iter().map(|(_, doc)| doc).collect());
        report.published = taxonomy.len();

        let assets = writer.copy_static()?;
        writer.write_index(&taxonomy)?;
        let tag_pages = writer.write_tag_pages(&taxonomy)?;
        let category_pages = writer.write_category_pages(&taxonomy)?;
        debug!(assets, tag_pages, category_pages, "wrote index pages");

        self.cache.flush()?;

        let context = BuildContext {
            config: &self.config,
            theme: &theme,
            taxonomy: &taxonomy,
        };
        report.plugin_failures = self.plugins.build_finished(&context);
        self.taxonomy = taxonomy;

        report.elapsed = start.elapsed();
        info!(
            rendered = report.rendered.len(),
            unchanged = report.unchanged.len(),
            failed = report.failed.len(),
            drafts = report.drafts,
            published = report.published,
            elapsed_ms = report.elapsed.as_millis() as u64,
            output = %self.config.output_directory.display(),
            "build complete"
        );
        Ok(report)
    }
}

/// Forgets cache entries whose source no longer exists and returns their
/// output pages.
fn prune_deleted(cache: &mut Cache, sources: &[(PathBuf, DocumentKind)]) -> Vec<PathBuf> {
    let deleted: Vec<PathBuf> = cache
        .sources()
        .filter(|cached| !sources.iter().any(|(source, _)| source.as_path() == *cached))
        .map(Path::to_owned)
        .collect();
    let mut outputs = Vec::with_capacity(deleted.len());
    for source in &deleted {
        if let Some(entry) = cache.forget(source) {
            debug!(path = %source.display(), "source deleted");
            outputs.push(entry.output);
        }
    }
    outputs
}

/// Finds `*.md` documents at the top of the content directory (posts) and in
/// its `pages` subdirectory (pages), sorted by path.
pub fn discover(config: &Config) -> Result<Vec<(PathBuf, DocumentKind)>> {
    let mut sources = markdown_files(&config.content_directory, DocumentKind::Post)?;
    sources.extend(markdown_files(&config.pages_directory(), DocumentKind::Page)?);
    sources.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(sources)
}

fn markdown_files(dir: &Path, kind: DocumentKind) -> Result<Vec<(PathBuf, DocumentKind)>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => {
            return Err(Error::Io {
                path: dir.to_owned(),
                err,
            })
        }
    };
    let mut files = Vec::new();
    for entry in entries {
        let path = entry
            .map_err(|err| Error::Io {
                path: dir.to_owned(),
                err,
            })?
            .path();
        if path.is_file() && path.extension().map_or(false, |ext| ext == MARKDOWN_EXTENSION) {
            files.push((path, kind));
        }
    }
    Ok(files)
}

/// The result of a build.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for building a site. Only failures that leave the output
/// tree unusable end up here; per-document and per-plugin failures are logged
/// and absorbed.
#[derive(Debug, Error)]
pub enum Error {
    /// Returned when the theme can't be loaded.
    #[error("loading theme: {0}")]
    Theme(#[from] template::Error),

    /// Returned for errors writing pages to the output tree.
    #[error(transparent)]
    Write(#[from] write::Error),

    /// Returned when the cache can't be persisted.
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// Returned for other I/O problems, such as an unreadable content
    /// directory.
    #[error("`{}`: {err}", .path.display())]
    Io { path: PathBuf, err: io::Error },
}
