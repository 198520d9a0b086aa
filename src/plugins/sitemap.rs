//! Writes `sitemap.xml` for search engines.

use std::fmt::Write as _;

use chrono::NaiveDateTime;
use serde::Deserialize;
use tracing::{debug, info};

use crate::build::BuildContext;
use crate::document::is_path_segment;
use crate::plugin::{Plugin, Result};
use crate::plugins::{absolute_url, base_url};
use crate::write::{CATEGORY_DIRECTORY, INDEX_FILE, TAG_DIRECTORY};

pub const NAME: &str = "sitemap";

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct Options {
    /// Output path relative to the output directory.
    pub path: String,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            path: String::from("sitemap.xml"),
        }
    }
}

pub struct Sitemap {
    options: Options,
}

impl Sitemap {
    pub fn new(options: Options) -> Sitemap {
        Sitemap { options }
    }
}

impl Plugin for Sitemap {
    fn name(&self) -> &str {
        NAME
    }

    fn build_finished(&mut self, context: &BuildContext<'_>) -> Result<()> {
        let entries = entries(context);
        let xml = to_xml(&entries);
        let path = context.write_artifact(&self.options.path, &xml)?;
        info!(path = %path.display(), urls = entries.len(), "wrote sitemap");
        Ok(())
    }
}

/// How often a page is expected to change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChangeFreq {
    Daily,
    Weekly,
    Monthly,
}

impl ChangeFreq {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
        }
    }
}

#[derive(Debug, Clone)]
struct SitemapUrl {
    loc: String,
    lastmod: Option<NaiveDateTime>,
    changefreq: ChangeFreq,
    priority: f32,
}

/// The home page, every document, then every tag and category page.
fn entries(context: &BuildContext<'_>) -> Vec<SitemapUrl> {
    let base = base_url(context.site());
    let taxonomy = context.taxonomy();
    let documents = context.documents();
    let mut urls = Vec::with_capacity(documents.len() + 1);

    urls.push(SitemapUrl {
        loc: absolute_url(&base, "/"),
        lastmod: documents.iter().filter_map(|doc| doc.date).max(),
        changefreq: ChangeFreq::Daily,
        priority: 1.0,
    });
    for doc in documents {
        urls.push(SitemapUrl {
            loc: absolute_url(&base, &doc.url),
            lastmod: doc.date,
            changefreq: ChangeFreq::Monthly,
            priority: 0.8,
        });
    }
    for (directory, names) in [
        (TAG_DIRECTORY, taxonomy.tag_names()),
        (CATEGORY_DIRECTORY, taxonomy.category_names()),
    ] {
        for name in names.into_iter().filter(|name| is_path_segment(name)) {
            urls.push(SitemapUrl {
                loc: absolute_url(&base, &format!("/{}/{}/{}", directory, name, INDEX_FILE)),
                lastmod: None,
                changefreq: ChangeFreq::Weekly,
                priority: 0.5,
            });
        }
    }
    debug!(urls = urls.len(), "collected sitemap urls");
    urls
}

fn to_xml(urls: &[SitemapUrl]) -> String {
    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    xml.push_str("<urlset xmlns=\"http://www.sitemaps.org/schemas/sitemap/0.9\">\n");
    for url in urls {
        xml.push_str("  <url>\n");
        // Writing to a `String` can't fail.
        let _ = writeln!(xml, "    <loc>{}</loc>", escape_xml(&url.loc));
        if let Some(lastmod) = url.lastmod {
            let _ = writeln!(xml, "    <lastmod>{}</lastmod>", lastmod.format("%Y-%m-%d"));
        }
        let _ = writeln!(xml, "    <changefreq>{}</changefreq>", url.changefreq.as_str());
        let _ = writeln!(xml, "    <priority>{:.1}</priority>", url.priority);
        xml.push_str("  </url>\n");
    }
    xml.push_str("</urlset>\n");
    xml
}

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
