//! Support for creating an Atom feed from the published documents.

use atom_syndication::{
    CategoryBuilder, Entry, EntryBuilder, FeedBuilder, LinkBuilder, Person, PersonBuilder, Text,
};
use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;
use tracing::info;
use url::Url;

use crate::build::BuildContext;
use crate::document::PublishedDocument;
use crate::plugin::{Error, Plugin, Result};
use crate::plugins::{absolute_url, base_url};

pub const NAME: &str = "feed";

/// The number of characters of the raw body used as an entry summary when
/// the document has no `description`.
const SUMMARY_LENGTH: usize = 200;

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct Options {
    /// Output path relative to the output directory. Defaults to `atom.xml`.
    pub path: Option<String>,

    /// The feed title. Defaults to the site title.
    pub title: Option<String>,

    /// The feed author. Defaults to the site author.
    pub author: Option<String>,
}

/// Writes an Atom feed with one entry per published document, newest first.
pub struct Feed {
    options: Options,
}

impl Feed {
    pub fn new(options: Options) -> Feed {
        Feed { options }
    }
}

impl Plugin for Feed {
    fn name(&self) -> &str {
        NAME
    }

    fn build_finished(&mut self, context: &BuildContext<'_>) -> Result<()> {
        let xml = feed_xml(&self.options, context)?;
        let path = context.write_artifact(self.options.path.as_deref().unwrap_or("atom.xml"), &xml)?;
        info!(path = %path.display(), entries = context.documents().len(), "wrote feed");
        Ok(())
    }
}

fn feed_xml(options: &Options, context: &BuildContext<'_>) -> Result<String> {
    let site = context.site();
    let base = base_url(site);
    let home = absolute_url(&base, "/");
    let author = options.author.clone().unwrap_or_else(|| site.author.clone());
    let documents = context.documents();

    // The newest document date keeps the feed identical across builds of the
    // same content.
    let updated = documents
        .iter()
        .filter_map(|doc| doc.date)
        .max()
        .map(utc)
        .unwrap_or_else(epoch);

    let feed = FeedBuilder::default()
        .title(options.title.clone().unwrap_or_else(|| site.title.clone()))
        .id(home.clone())
        .updated(updated)
        .authors(people(&author))
        .links(vec![LinkBuilder::default()
            .href(home)
            .rel("alternate")
            .build()])
        .entries(
            documents
                .iter()
                .map(|doc| entry(doc, &base, &author))
                .collect::<Vec<Entry>>(),
        )
        .build();

    let bytes = feed
        .write_to(Vec::new())
        .map_err(|err| Error::Message(format!("writing atom feed: {}", err)))?;
    String::from_utf8(bytes).map_err(|err| Error::Message(format!("writing atom feed: {}", err)))
}

fn entry(doc: &PublishedDocument, base: &Url, author: &str) -> Entry {
    let url = absolute_url(base, &doc.url);
    let date = doc.date.map(utc).unwrap_or_else(epoch);
    let categories = doc
        .tags
        .iter()
        .chain(doc.categories.iter())
        .map(|term| CategoryBuilder::default().term(term.clone()).build())
        .collect::<Vec<_>>();

    EntryBuilder::default()
        .id(url.clone())
        .title(doc.title.clone())
        .updated(date)
        .published(doc.date.map(utc))
        .authors(people(author))
        .links(vec![LinkBuilder::default()
            .href(url)
            .rel("alternate")
            .build()])
        .categories(categories)
        .summary(Some(Text::from(summary(doc))))
        .build()
}

/// The document's `description`, or the start of its raw body.
fn summary(doc: &PublishedDocument) -> String {
    doc.meta
        .get("description")
        .and_then(crate::document::scalar_string)
        .unwrap_or_else(|| doc.raw_body().chars().take(SUMMARY_LENGTH).collect())
}

fn people(author: &str) -> Vec<Person> {
    if author.is_empty() {
        return Vec::new();
    }
    vec![PersonBuilder::default().name(author.to_owned()).build()]
}

/// Document dates carry no zone; they're taken to be UTC.
fn utc(date: NaiveDateTime) -> DateTime<FixedOffset> {
    Utc.from_utc_datetime(&date).into()
}

fn epoch() -> DateTime<FixedOffset> {
    DateTime::<Utc>::from(std::time::UNIX_EPOCH).into()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::Config;
    use crate::document::{parse_front_matter, DocumentKind};
    use crate::taxonomy::Taxonomy;
    use crate::template::Theme;
    use std::fs;
    use std::path::PathBuf;

    fn doc(name: &str, text: &str) -> PublishedDocument {
        let (mut meta, body) = parse_front_matter(text);
        meta.insert(
            crate::document::RAW_BODY_KEY.to_owned(),
            serde_yaml::Value::String(body),
        );
        PublishedDocument::new(
            PathBuf::from(format!("content/{}.md", name)),
            DocumentKind::Post,
            meta,
        )
    }

    #[test]
    fn test_feed() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("theme/templates")).unwrap();
        let theme = Theme::load(&dir.path().join("theme")).unwrap();
        let mut config = Config::new(dir.path());
        config.site.url = String::from("https://example.org");
        config.site.author = String::from("Ann");
        let taxonomy = Taxonomy::collect(vec![
            doc("old", "---\ntitle: Old\ndate: 2024-01-01\ntags: [rust]\n---\nFirst words"),
            doc(
                "new",
                "---\ntitle: New\ndate: 2024-06-01\ncategory: notes\ndescription: Fresh\n---\nbody",
            ),
        ]);
        let context = BuildContext::new(&config, &theme, &taxonomy);

        Feed::new(Options::default()).build_finished(&context).unwrap();
        let xml = fs::read_to_string(config.output_directory.join("atom.xml")).unwrap();

        let feed: atom_syndication::Feed = xml.parse().unwrap();
        assert_eq!("Blazemark Blog", feed.title().value);
        assert_eq!("2024-06-01T00:00:00+00:00", feed.updated().to_rfc3339());
        let ids: Vec<_> = feed.entries().iter().map(|e| e.id()).collect();
        assert_eq!(
            vec![
                "https://example.org/new/index.html",
                "https://example.org/old/index.html"
            ],
            ids
        );
        let new = &feed.entries()[0];
        assert_eq!("Fresh", new.summary().unwrap().value);
        assert_eq!("notes", new.categories()[0].term());
        assert_eq!("Ann", new.authors()[0].name());
        let old = &feed.entries()[1];
        assert_eq!("First words", old.summary().unwrap().value);
        assert_eq!("rust", old.categories()[0].term());
    }

    #[test]
    fn test_feed_path_option() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("theme/templates")).unwrap();
        let theme = Theme::load(&dir.path().join("theme")).unwrap();
        let config = Config::new(dir.path());
        let taxonomy = Taxonomy::default();
        let context = BuildContext::new(&config, &theme, &taxonomy);

        Feed::new(Options {
            path: Some(String::from("feed.xml")),
            ..Options::default()
        })
        .build_finished(&context)
        .unwrap();
        assert!(config.output_directory.join("feed.xml").is_file());
    }
}
