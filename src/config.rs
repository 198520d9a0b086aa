//! The immutable build configuration. A [`Config`] is loaded once from a
//! project root and threaded through every component that needs paths or
//! site metadata.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{Datelike, Local};
use serde::Deserialize;
use tracing::{debug, warn};

pub const CONFIG_FILE: &str = "config.yml";
pub const CACHE_FILE: &str = ".blazemark_cache.json";
pub const DEFAULT_THEME: &str = "default";

/// The subdirectory of the content root reserved for non-chronological pages.
pub const PAGES_DIRECTORY: &str = "pages";

/// The shape of `config.yml`. Every key is optional.
#[derive(Deserialize, Default)]
#[serde(default)]
struct Project {
    title: Option<String>,
    subtitle: String,
    description: String,
    author: String,
    url: String,
    language: Option<String>,
    theme: Option<String>,
    workers: Option<usize>,
}

/// Site-wide metadata made available to every template. Built once per
/// configuration load and never mutated during a build.
#[derive(Clone, Debug, PartialEq)]
pub struct SiteMetadata {
    pub title: String,
    pub subtitle: String,
    pub description: String,
    pub author: String,

    /// The canonical base URL, e.g. `https://example.org`.
    pub url: String,
    pub language: String,

    /// The current year, for copyright footers.
    pub year: i32,
}

impl Default for SiteMetadata {
    fn default() -> Self {
        SiteMetadata {
            title: String::from("Blazemark Blog"),
            subtitle: String::new(),
            description: String::new(),
            author: String::new(),
            url: String::new(),
            language: String::from("en"),
            year: Local::now().year(),
        }
    }
}

/// Paths and settings for one project.
#[derive(Clone, Debug)]
pub struct Config {
    pub root_directory: PathBuf,

    /// Holds posts at the top level and pages under [`PAGES_DIRECTORY`].
    pub content_directory: PathBuf,

    /// The selected theme's directory, `{root}/themes/{theme}`.
    pub theme_directory: PathBuf,

    /// Holds plugin manifests.
    pub plugins_directory: PathBuf,

    pub output_directory: PathBuf,
    pub cache_file: PathBuf,

    /// The render worker count. `None` means one per CPU.
    pub workers: Option<usize>,

    pub site: SiteMetadata,
}

impl Config {
    /// The conventional layout under `root` with default site metadata.
    pub fn new(root: &Path) -> Config {
        Config {
            root_directory: root.to_owned(),
            content_directory: root.join("content"),
            theme_directory: root.join("themes").join(DEFAULT_THEME),
            plugins_directory: root.join("plugins"),
            output_directory: root.join("public"),
            cache_file: root.join(CACHE_FILE),
            workers: None,
            site: SiteMetadata::default(),
        }
    }

    /// Loads `{root}/config.yml` on top of [`Config::new`]. A missing file
    /// means defaults; a malformed one is logged and also means defaults.
    pub fn load(root: &Path) -> Result<Config> {
        let path = root.join(CONFIG_FILE);
        let mut config = Config::new(root);
        if !path.exists() {
            debug!(path = %path.display(), "no configuration file; using defaults");
            return Ok(config);
        }

        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Reading configuration file `{}`", path.display()))?;
        let project: Project = match serde_yaml::from_str::<Option<Project>>(&contents) {
            Ok(project) => project.unwrap_or_default(),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "malformed configuration; using defaults");
                return Ok(config);
            }
        };

        let defaults = SiteMetadata::default();
        config.site = SiteMetadata {
            title: project.title.unwrap_or(defaults.title),
            subtitle: project.subtitle,
            description: project.description,
            author: project.author,
            url: project.url,
            language: project.language.unwrap_or(defaults.language),
            year: defaults.year,
        };
        if let Some(theme) = project.theme {
            config.theme_directory = root.join("themes").join(theme);
        }
        config.workers = project.workers.filter(|&n| n > 0);
        Ok(config)
    }

    /// The reserved subdirectory holding pages.
    pub fn pages_directory(&self) -> PathBuf {
        self.content_directory.join(PAGES_DIRECTORY)
    }
}
