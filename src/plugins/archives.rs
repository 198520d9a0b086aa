//! Renders an archive page grouping every published document by year and
//! month.

use std::collections::BTreeMap;

use chrono::Datelike;
use gtmpl::Value;
use serde::Deserialize;
use tracing::info;

use crate::build::BuildContext;
use crate::document::PublishedDocument;
use crate::plugin::{Plugin, Result};
use crate::template::{self, documents_to_value, object};

pub const NAME: &str = "archives";

/// The theme template used when present.
pub const TEMPLATE: &str = "archives";

/// Used when the theme has no `archives` template.
const FALLBACK_TEMPLATE: &str = r#"<h1>{{.page.title}}</h1>
{{range .archives}}<h2>{{.year}}</h2>
{{range .months}}<details>
<summary>{{.year}}-{{.month}}</summary>
<ul>
{{range .posts}}<li><a href="{{.url}}">{{.title}}</a> - {{.date}}</li>
{{end}}</ul>
</details>
{{end}}{{end}}"#;

/// Undated documents are filed under this year.
const UNDATED_YEAR: i32 = 1970;

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct Options {
    /// Output path relative to the output directory.
    pub path: String,

    /// The page title.
    pub title: String,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            path: String::from("archives/index.html"),
            title: String::from("Archives"),
        }
    }
}

pub struct Archives {
    options: Options,
}

impl Archives {
    pub fn new(options: Options) -> Archives {
        Archives { options }
    }
}

impl Plugin for Archives {
    fn name(&self) -> &str {
        NAME
    }

    fn build_finished(&mut self, context: &BuildContext<'_>) -> Result<()> {
        let data = object(vec![
            ("archives", archives_to_value(&group(context.documents()))),
            ("site", Value::from(context.site())),
            (
                "page",
                object(vec![("title", Value::String(self.options.title.clone()))]),
            ),
        ]);
        let theme = context.theme();
        let html = if theme.has_template(TEMPLATE) {
            theme.render(TEMPLATE, data)?
        } else {
            template::render_str(NAME, FALLBACK_TEMPLATE, data)?
        };
        let path = context.write_artifact(&self.options.path, &html)?;
        info!(path = %path.display(), "wrote archives");
        Ok(())
    }
}

/// Year to month (1-12) to documents, each month keeping the home order.
type Grouped<'a> = BTreeMap<i32, BTreeMap<u32, Vec<&'a PublishedDocument>>>;

fn group(documents: &[PublishedDocument]) -> Grouped<'_> {
    let mut grouped: Grouped<'_> = BTreeMap::new();
    for doc in documents {
        let (year, month) = doc
            .date
            .map(|date| (date.year(), date.month()))
            .unwrap_or((UNDATED_YEAR, 1));
        grouped
            .entry(year)
            .or_default()
            .entry(month)
            .or_default()
            .push(doc);
    }
    grouped
}

/// Newest year first, and newest month first within each year.
fn archives_to_value(grouped: &Grouped<'_>) -> Value {
    Value::Array(
        grouped
            .iter()
            .rev()
            .map(|(year, months)| {
                object(vec![
                    ("year", Value::String(year.to_string())),
                    (
                        "months",
                        Value::Array(
                            months
                                .iter()
                                .rev()
                                .map(|(month, docs)| {
                                    object(vec![
                                        ("year", Value::String(year.to_string())),
                                        ("month", Value::String(format!("{:02}", month))),
                                        ("posts", documents_to_value(docs.iter().copied())),
                                    ])
                                })
                                .collect(),
                        ),
                    ),
                ])
            })
            .collect(),
    )
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::Config;
    use crate::document::{parse_front_matter, DocumentKind};
    use crate::taxonomy::Taxonomy;
    use crate::template::Theme;
    use std::fs;
    use std::path::{Path, PathBuf};

    fn doc(name: &str, front_matter: &str) -> PublishedDocument {
        let (meta, _) = parse_front_matter(&format!("---\n{}\n---\n", front_matter));
        PublishedDocument::new(
            PathBuf::from(format!("content/{}.md", name)),
            DocumentKind::Post,
            meta,
        )
    }

    fn theme(root: &Path, archives: Option<&str>) -> Theme {
        let templates = root.join("theme/templates");
        fs::create_dir_all(&templates).unwrap();
        if let Some(source) = archives {
            fs::write(templates.join("archives.html"), source).unwrap();
        }
        Theme::load(&root.join("theme")).unwrap()
    }

    fn taxonomy() -> Taxonomy {
        Taxonomy::collect(vec![
            doc("a", "title: A\ndate: 2023-11-02"),
            doc("b", "title: B\ndate: 2024-01-05"),
            doc("c", "title: C\ndate: 2024-01-20"),
            doc("d", "title: D\ndate: 2024-03-01"),
            doc("e", "title: E"),
        ])
    }

    #[test]
    fn test_group() {
        let taxonomy = taxonomy();
        let grouped = group(taxonomy.documents());
        assert_eq!(vec![1970, 2023, 2024], grouped.keys().copied().collect::<Vec<_>>());
        let january: Vec<_> = grouped[&2024][&1].iter().map(|d| d.slug.as_str()).collect();
        assert_eq!(vec!["c", "b"], january);
    }

    #[test]
    fn test_theme_template() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::new(dir.path());
        let theme = theme(
            dir.path(),
            Some("{{range .archives}}{{.year}}:{{range .months}}{{.month}}({{range .posts}}{{.title}}{{end}}){{end}};{{end}}"),
        );
        let taxonomy = taxonomy();
        let context = BuildContext::new(&config, &theme, &taxonomy);

        Archives::new(Options::default()).build_finished(&context).unwrap();
        assert_eq!(
            "2024:03(D)01(CB);2023:11(A);1970:01(E);",
            fs::read_to_string(config.output_directory.join("archives/index.html")).unwrap()
        );
    }

    #[test]
    fn test_fallback_template() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::new(dir.path());
        let theme = theme(dir.path(), None);
        let taxonomy = taxonomy();
        let context = BuildContext::new(&config, &theme, &taxonomy);

        Archives::new(Options {
            path: String::from("archive.html"),
            ..Options::default()
        })
        .build_finished(&context)
        .unwrap();
        let html = fs::read_to_string(config.output_directory.join("archive.html")).unwrap();
        assert!(html.starts_with("<h1>Archives</h1>"), "{}", html);
        assert!(html.contains(r#"<a href="/d/index.html">D</a> - 2024-03-01"#), "{}", html);
        assert!(html.contains("<summary>2024-03</summary>"), "{}", html);
    }
}
