//! The render worker and the bounded pool that runs it.
//!
//! [`render_document`] is a pure function of a source path, a theme, and the
//! site metadata. Workers never share parsed state with the orchestrator: each
//! one re-reads and re-parses its source. [`RenderPool::dispatch`] fans a list
//! of [`RenderTask`]s out over scoped threads fed from a channel and returns
//! once every task has produced a [`RenderOutcome`].

use std::any::Any;
use std::borrow::Cow;
use std::fs;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::thread;

use chrono::NaiveDateTime;
use crossbeam_channel::unbounded;
use gtmpl::Value;
use regex::Regex;
use thiserror::Error;
use tracing::{debug, trace};

use crate::config::SiteMetadata;
use crate::document::{Document, DocumentKind, Metadata, RAW_BODY_KEY};
use crate::markdown;
use crate::template::{self, metadata_to_value, object, Theme};

/// The name of the template used for document pages.
pub const POST_TEMPLATE: &str = "post";

/// A document queued for rendering.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderTask {
    pub source: PathBuf,
    pub kind: DocumentKind,
}

/// The result of rendering one document.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderedDocument {
    pub source: PathBuf,
    pub kind: DocumentKind,
    pub slug: String,
    pub title: String,
    pub date: Option<NaiveDateTime>,

    /// The full page produced by the post template.
    pub html: String,

    /// The front matter plus the raw body under [`RAW_BODY_KEY`].
    pub meta: Metadata,

    /// Site-relative URL, `/{slug}/index.html`.
    pub url: String,
}

impl RenderedDocument {
    /// The raw markdown body.
    pub fn raw_body(&self) -> &str {
        self.meta
            .get(RAW_BODY_KEY)
            .and_then(serde_yaml::Value::as_str)
            .unwrap_or_default()
    }

    pub fn is_draft(&self) -> bool {
        crate::document::is_draft(&self.meta)
    }
}

/// Renders one document from disk.
pub fn render_document(
    task: &RenderTask,
    theme: &Theme,
    site: &SiteMetadata,
) -> Result<RenderedDocument, RenderError> {
    let text = fs::read_to_string(&task.source).map_err(RenderError::Read)?;
    let mut doc = Document::parse(&task.source, task.kind, &text);

    let content = fold_code_languages(&markdown::to_html(&doc.body)).into_owned();
    let page = metadata_to_value(&doc.meta);
    let data = object(vec![
        (
            "post",
            object(vec![
                ("title", Value::String(doc.title.clone())),
                ("content", Value::String(content)),
                ("meta", page.clone()),
                ("slug", Value::String(doc.slug.clone())),
                ("url", Value::String(doc.url())),
                (
                    "date",
                    Value::String(
                        doc.meta
                            .get("date")
                            .and_then(crate::document::scalar_string)
                            .unwrap_or_default(),
                    ),
                ),
            ]),
        ),
        ("site", Value::from(site)),
        ("page", page),
    ]);
    doc.html = Some(theme.render(POST_TEMPLATE, data)?);

    let url = doc.url();
    let mut meta = doc.meta;
    meta.insert(
        RAW_BODY_KEY.to_owned(),
        serde_yaml::Value::String(doc.body),
    );
    Ok(RenderedDocument {
        source: doc.source,
        kind: doc.kind,
        slug: doc.slug,
        title: doc.title,
        date: doc.date,
        html: doc.html.unwrap_or_default(),
        meta,
        url,
    })
}

/// Folds the language of GitHub-style code blocks into a class attribute
/// for syntax highlighters: `<pre lang="rust"><code>` becomes
/// `<pre><code class="language-rust">`.
pub fn fold_code_languages(html: &str) -> Cow<'_, str> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(r#"<pre lang="([a-zA-Z0-9_+-]+)"><code>"#).expect("valid code block pattern")
        })
        .replace_all(html, r#"<pre><code class="language-$1">"#)
}

/// The outcome of one dispatched [`RenderTask`].
#[derive(Debug)]
pub struct RenderOutcome {
    pub task: RenderTask,
    pub result: Result<RenderedDocument, RenderError>,
}

/// A bounded pool of render workers.
pub struct RenderPool<'a> {
    workers: usize,
    theme_directory: &'a Path,
    site: &'a SiteMetadata,
}

impl<'a> RenderPool<'a> {
    pub fn new(workers: usize, theme_directory: &'a Path, site: &'a SiteMetadata) -> Self {
        RenderPool {
            workers: workers.max(1),
            theme_directory,
            site,
        }
    }

    /// Sizes a pool: the requested count (or one worker per CPU), never more
    /// than the number of documents and never less than one.
    pub fn worker_count(requested: Option<usize>, documents: usize) -> usize {
        requested
            .unwrap_or_else(num_cpus::get)
            .min(documents)
            .max(1)
    }

    /// Renders every task and returns the outcomes in completion order. Does
    /// not return until all tasks have finished.
    pub fn dispatch(&self, tasks: Vec<RenderTask>) -> Vec<RenderOutcome> {
        if tasks.is_empty() {
            return Vec::new();
        }
        let workers = self.workers.min(tasks.len());
        let (task_tx, task_rx) = unbounded::<RenderTask>();
        let (outcome_tx, outcome_rx) = unbounded::<RenderOutcome>();
        let total = tasks.len();
        for task in tasks {
            // Can't fail: `task_rx` is alive until the end of this function.
            let _ = task_tx.send(task);
        }
        drop(task_tx);

        debug!(workers, tasks = total, "dispatching render tasks");
        thread::scope(|scope| {
            for worker in 0..workers {
                let task_rx = task_rx.clone();
                let outcome_tx = outcome_tx.clone();
                scope.spawn(move || {
                    // Each worker loads its own theme; templates aren't
                    // shared between threads.
                    let theme = Theme::load(self.theme_directory).map_err(|e| e.to_string());
                    for task in task_rx {
                        trace!(worker, path = %task.source.display(), "rendering");
                        let result = match &theme {
                            Ok(theme) => isolated(&task, theme, self.site),
                            Err(err) => Err(RenderError::Theme(err.clone())),
                        };
                        if outcome_tx.send(RenderOutcome { task, result }).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(outcome_tx);
            outcome_rx.iter().collect()
        })
    }
}

/// Runs [`render_document`] so that a panic only fails this one document.
fn isolated(
    task: &RenderTask,
    theme: &Theme,
    site: &SiteMetadata,
) -> Result<RenderedDocument, RenderError> {
    match panic::catch_unwind(AssertUnwindSafe(|| render_document(task, theme, site))) {
        Ok(result) => result,
        Err(payload) => Err(RenderError::Panicked(panic_message(payload.as_ref()))),
    }
}

/// Extracts the message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        String::from("unknown panic")
    }
}

/// Represents a failure to render a single document.
#[derive(Debug, Error)]
pub enum RenderError {
    /// Returned when the source file can't be read.
    #[error("reading source: {0}")]
    Read(#[source] io::Error),

    /// Returned when the theme couldn't be loaded by the worker.
    #[error("loading theme: {0}")]
    Theme(String),

    /// Returned when the post template fails.
    #[error(transparent)]
    Template(#[from] template::Error),

    /// Returned when conversion or templating panicked.
    #[error("render panicked: {0}")]
    Panicked(String),
}
