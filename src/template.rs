//! Themes and templating. A theme is a directory holding named templates
//! under `templates/` (`post.html`, `index.html`, `tags.html`,
//! `category.html` and optionally `archives.html`) and static assets under
//! `static/`. Templates use [`gtmpl`]'s Go template syntax; data flows into
//! them as [`Value`]s, see the `From` conversions below.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use gtmpl::{Context, Template, Value};
use thiserror::Error;

use crate::config::SiteMetadata;
use crate::document::{Metadata, PublishedDocument};

/// The template file extension.
const TEMPLATE_EXTENSION: &str = "html";

/// A loaded theme.
pub struct Theme {
    directory: PathBuf,
    templates: HashMap<String, Template>,
}

impl Theme {
    /// Loads and parses every template in `{directory}/templates`. Templates
    /// are named after their file stem.
    pub fn load(directory: &Path) -> Result<Theme> {
        let templates_directory = directory.join("templates");
        let entries = fs::read_dir(&templates_directory).map_err(|err| Error::Io {
            path: templates_directory.clone(),
            err,
        })?;

        let mut templates = HashMap::new();
        for entry in entries {
            let path = entry
                .map_err(|err| Error::Io {
                    path: templates_directory.clone(),
                    err,
                })?
                .path();
            if path.extension().map_or(true, |ext| ext != TEMPLATE_EXTENSION) {
                continue;
            }
            let name = match path.file_stem() {
                Some(stem) => stem.to_string_lossy().into_owned(),
                None => continue,
            };
            let contents = fs::read_to_string(&path).map_err(|err| Error::Io {
                path: path.clone(),
                err,
            })?;
            let mut template = Template::default();
            template
                .parse(contents)
                .map_err(|err| Error::Parse { name: name.clone(), err })?;
            templates.insert(name, template);
        }

        Ok(Theme {
            directory: directory.to_owned(),
            templates,
        })
    }

    /// The directory whose contents are copied verbatim into the output tree.
    pub fn static_directory(&self) -> PathBuf {
        self.directory.join("static")
    }

    pub fn has_template(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }

    /// Renders the template called `name` with `data` as the dot value.
    pub fn render(&self, name: &str, data: Value) -> Result<String> {
        let template = self
            .templates
            .get(name)
            .ok_or_else(|| Error::Missing(name.to_owned()))?;
        render_template(template, name, data)
    }
}

/// Parses `source` and renders it in one step. Used for fallback templates
/// which don't live in a theme.
pub fn render_str(name: &str, source: &str, data: Value) -> Result<String> {
    let mut template = Template::default();
    template.parse(source).map_err(|err| Error::Parse {
        name: name.to_owned(),
        err,
    })?;
    render_template(&template, name, data)
}

fn render_template(template: &Template, name: &str, data: Value) -> Result<String> {
    let context = Context::from(data).map_err(|err| Error::Execute {
        name: name.to_owned(),
        err,
    })?;
    template.render(&context).map_err(|err| Error::Execute {
        name: name.to_owned(),
        err,
    })
}

/// Builds a [`Value::Object`] from key/value pairs.
pub fn object<I, K>(pairs: I) -> Value
where
    I: IntoIterator<Item = (K, Value)>,
    K: Into<String>,
{
    Value::Object(pairs.into_iter().map(|(k, v)| (k.into(), v)).collect())
}

/// Converts a YAML value from the front matter into a template value.
pub fn yaml_to_value(value: &serde_yaml::Value) -> Value {
    use serde_yaml::Value as Yaml;
    match value {
        Yaml::Null => Value::Nil,
        Yaml::Bool(b) => Value::Bool(*b),
        Yaml::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::from(i)
            } else if let Some(u) = n.as_u64() {
                Value::from(u)
            } else {
                Value::from(n.as_f64().unwrap_or_default())
            }
        }
        Yaml::String(s) => Value::String(s.clone()),
        Yaml::Sequence(items) => Value::Array(items.iter().map(yaml_to_value).collect()),
        Yaml::Mapping(mapping) => Value::Object(
            mapping
                .iter()
                .filter_map(|(k, v)| {
                    crate::document::scalar_string(k).map(|k| (k, yaml_to_value(v)))
                })
                .collect(),
        ),
    }
}

/// Converts front matter into a template value.
pub fn metadata_to_value(meta: &Metadata) -> Value {
    Value::Object(
        meta.iter()
            .map(|(k, v)| (k.clone(), yaml_to_value(v)))
            .collect(),
    )
}

/// Converts a list of names into a template value.
pub fn strings_to_value<S: AsRef<str>>(items: &[S]) -> Value {
    Value::Array(
        items
            .iter()
            .map(|s| Value::String(s.as_ref().to_owned()))
            .collect(),
    )
}

impl From<&SiteMetadata> for Value {
    /// Converts [`SiteMetadata`] into the `site` value every template sees.
    fn from(site: &SiteMetadata) -> Value {
        object(vec![
            ("title", Value::String(site.title.clone())),
            ("subtitle", Value::String(site.subtitle.clone())),
            ("description", Value::String(site.description.clone())),
            ("author", Value::String(site.author.clone())),
            ("url", Value::String(site.url.clone())),
            ("language", Value::String(site.language.clone())),
            ("year", Value::from(i64::from(site.year))),
        ])
    }
}

impl From<&PublishedDocument> for Value {
    /// Converts a [`PublishedDocument`] into the listing entry used by index,
    /// tag, category and archive pages.
    fn from(doc: &PublishedDocument) -> Value {
        object(vec![
            ("title", Value::String(doc.title.clone())),
            ("slug", Value::String(doc.slug.clone())),
            ("url", Value::String(doc.url.clone())),
            ("date", Value::String(doc.date_text())),
            ("kind", Value::String(doc.kind.as_str().to_owned())),
            ("tags", strings_to_value(&doc.tags)),
            ("categories", strings_to_value(&doc.categories)),
            ("meta", metadata_to_value(&doc.meta)),
        ])
    }
}

/// Converts a list of documents into a template value.
pub fn documents_to_value<'a>(docs: impl IntoIterator<Item = &'a PublishedDocument>) -> Value {
    Value::Array(docs.into_iter().map(Value::from).collect())
}

/// The result of a fallible theme operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents an error loading or rendering templates.
#[derive(Debug, Error)]
pub enum Error {
    /// Returned when a theme file or directory can't be read.
    #[error("reading theme file `{}`: {err}", .path.display())]
    Io { path: PathBuf, err: io::Error },

    /// Returned when a template fails to parse.
    #[error("parsing template `{name}`: {err}")]
    Parse { name: String, err: String },

    /// Returned when a template fails to execute.
    #[error("executing template `{name}`: {err}")]
    Execute { name: String, err: String },

    /// Returned when the theme has no template by the requested name.
    #[error("theme has no `{0}` template")]
    Missing(String),
}

#[cfg(test)]
mod test {
    use super::*;

    fn theme_with(templates: &[(&str, &str)]) -> (tempfile::TempDir, Theme) {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("templates")).unwrap();
        for (name, source) in templates {
            fs::write(dir.path().join("templates").join(format!("{}.html", name)), source)
                .unwrap();
        }
        let theme = Theme::load(dir.path()).unwrap();
        (dir, theme)
    }

    #[test]
    fn test_render() {
        let (_dir, theme) = theme_with(&[("post", "<h1>{{.title}}</h1>")]);
        assert!(theme.has_template("post"));
        let html = theme
            .render("post", object(vec![("title", Value::String("Hi".to_owned()))]))
            .unwrap();
        assert_eq!("<h1>Hi</h1>", html);
    }

    #[test]
    fn test_render_missing_template() {
        let (_dir, theme) = theme_with(&[("post", "x")]);
        match theme.render("index", Value::Nil) {
            Err(Error::Missing(name)) => assert_eq!("index", name),
            other => panic!("wanted Missing, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_yaml_to_value() {
        let yaml: serde_yaml::Value = serde_yaml::from_str("{a: 1, b: [x, y], c: true}").unwrap();
        let html = render_str(
            "t",
            "{{.a}}{{range .b}}-{{.}}{{end}}{{if .c}}!{{end}}",
            yaml_to_value(&yaml),
        )
        .unwrap();
        assert_eq!("1-x-y!", html);
    }
}
