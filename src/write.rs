//! The output writer. Materializes rendered documents and the cross-document
//! pages (home index, tag and category pages) into the output tree, and
//! copies the theme's static assets. Every I/O failure here is fatal to the
//! build, since later phases depend on the output tree.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use gtmpl::Value;
use thiserror::Error;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::SiteMetadata;
use crate::document::is_path_segment;
use crate::taxonomy::Taxonomy;
use crate::template::{self, documents_to_value, object, strings_to_value, Theme};

/// The file name every page directory holds.
pub const INDEX_FILE: &str = "index.html";

pub const TAG_DIRECTORY: &str = "tag";
pub const CATEGORY_DIRECTORY: &str = "category";

/// Writes pages into `output_directory`.
pub struct Writer<'a> {
    /// The root of the output tree.
    pub output_directory: &'a Path,

    /// The theme providing the `index`, `tags`, and `category` templates.
    pub theme: &'a Theme,

    /// Passed to every template as `site`.
    pub site: &'a SiteMetadata,
}

impl Writer<'_> {
    /// The output path for the document with `slug`.
    pub fn document_path(&self, slug: &str) -> PathBuf {
        self.output_directory.join(slug).join(INDEX_FILE)
    }

    /// Writes a rendered document to `/{slug}/index.html` and returns the
    /// path written. A slug that isn't a single path segment is refused.
    pub fn write_document(&self, slug: &str, html: &str) -> Result<PathBuf> {
        if !is_path_segment(slug) {
            return Err(Error::UnsafeName(slug.to_owned()));
        }
        let path = self.document_path(slug);
        write_file(&path, html)?;
        Ok(path)
    }

    /// Removes a previously written document page, then its directory if
    /// that left it empty. A page that's already gone is not an error.
    pub fn remove_output(&self, path: &Path) -> Result<()> {
        match fs::remove_file(path) {
            Ok(()) => debug!(path = %path.display(), "removed stale output"),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => {
                return Err(Error::Io {
                    path: path.to_owned(),
                    err,
                })
            }
        }
        if let Some(dir) = path.parent() {
            if dir != self.output_directory {
                // Fails harmlessly when the directory holds other files.
                let _ = fs::remove_dir(dir);
            }
        }
        Ok(())
    }

    /// Writes the home index (`/index.html`).
    pub fn write_index(&self, taxonomy: &Taxonomy) -> Result<()> {
        let html = self.theme.render(
            "index",
            object(vec![
                ("posts", documents_to_value(taxonomy.documents())),
                ("site", Value::from(self.site)),
                (
                    "page",
                    object(vec![
                        ("title", Value::String(self.site.title.clone())),
                        ("banner", Value::Nil),
                    ]),
                ),
                ("all_tags", strings_to_value(&page_names(taxonomy.tag_names()))),
                (
                    "all_categories",
                    strings_to_value(&page_names(taxonomy.category_names())),
                ),
            ]),
        )?;
        write_file(&self.output_directory.join(INDEX_FILE), &html)
    }

    /// Writes `/tag/{name}/index.html` for every tag plus the `/tag/index.html`
    /// listing all tags. The `/tag` tree is rebuilt from scratch, so tags no
    /// published document declares anymore lose their page.
    pub fn write_tag_pages(&self, taxonomy: &Taxonomy) -> Result<usize> {
        rmdir(&self.output_directory.join(TAG_DIRECTORY))?;
        let tag_names = page_names(taxonomy.tag_names());
        for tag in &tag_names {
            let html = self.theme.render(
                "tags",
                object(vec![
                    ("tag", Value::String((*tag).to_owned())),
                    ("posts", documents_to_value(taxonomy.tagged(tag))),
                    ("site", Value::from(self.site)),
                    ("page", page_title(format!("Tag: {}", tag))),
                    ("all_tags", Value::Array(Vec::new())),
                ]),
            )?;
            write_file(
                &self.output_directory.join(TAG_DIRECTORY).join(tag).join(INDEX_FILE),
                &html,
            )?;
        }

        let html = self.theme.render(
            "tags",
            object(vec![
                ("tag", Value::Nil),
                ("posts", Value::Array(Vec::new())),
                ("site", Value::from(self.site)),
                ("page", page_title(String::from("All tags"))),
                ("all_tags", strings_to_value(&tag_names)),
            ]),
        )?;
        write_file(
            &self.output_directory.join(TAG_DIRECTORY).join(INDEX_FILE),
            &html,
        )?;
        Ok(tag_names.len() + 1)
    }

    /// Writes `/category/{name}/index.html` for every category plus the
    /// `/category/index.html` listing all categories. Like the tag pages, the
    /// `/category` tree is rebuilt from scratch.
    pub fn write_category_pages(&self, taxonomy: &Taxonomy) -> Result<usize> {
        rmdir(&self.output_directory.join(CATEGORY_DIRECTORY))?;
        let category_names = page_names(taxonomy.category_names());
        for category in &category_names {
            let html = self.theme.render(
                "category",
                object(vec![
                    ("category", Value::String((*category).to_owned())),
                    ("posts", documents_to_value(taxonomy.categorized(category))),
                    ("site", Value::from(self.site)),
                    ("page", page_title(format!("Category: {}", category))),
                    ("all_categories", Value::Array(Vec::new())),
                ]),
            )?;
            write_file(
                &self
                    .output_directory
                    .join(CATEGORY_DIRECTORY)
                    .join(category)
                    .join(INDEX_FILE),
                &html,
            )?;
        }

        let html = self.theme.render(
            "category",
            object(vec![
                ("category", Value::Nil),
                ("posts", Value::Array(Vec::new())),
                ("site", Value::from(self.site)),
                ("page", page_title(String::from("All categories"))),
                ("all_categories", strings_to_value(&category_names)),
            ]),
        )?;
        write_file(
            &self.output_directory.join(CATEGORY_DIRECTORY).join(INDEX_FILE),
            &html,
        )?;
        Ok(category_names.len() + 1)
    }

    /// Copies the theme's static directory to `/static`, if it exists.
    pub fn copy_static(&self) -> Result<usize> {
        let src = self.theme.static_directory();
        if !src.is_dir() {
            return Ok(0);
        }
        copy_dir(&src, &self.output_directory.join("static"))
    }
}

/// Drops taxonomy names that can't be a directory name.
fn page_names(names: Vec<&str>) -> Vec<&str> {
    names
        .into_iter()
        .filter(|name| {
            let safe = is_path_segment(name);
            if !safe {
                warn!(name = %name, "taxonomy name is not a single path segment; no page written");
            }
            safe
        })
        .collect()
}

fn page_title(title: String) -> Value {
    object(vec![("title", Value::String(title))])
}

/// Writes `contents` to `path`, creating parent directories as needed.
pub fn write_file(path: &Path, contents: &str) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).map_err(|err| Error::Io {
            path: dir.to_owned(),
            err,
        })?;
    }
    fs::write(path, contents).map_err(|err| Error::Io {
        path: path.to_owned(),
        err,
    })
}

/// Recursively copies `src` into `dst`, returning the number of files copied.
fn copy_dir(src: &Path, dst: &Path) -> Result<usize> {
    let mut copied = 0;
    for entry in WalkDir::new(src).sort_by_file_name() {
        let entry = entry?;
        // `strip_prefix` can't fail: every entry is under `src`.
        let relative = entry.path().strip_prefix(src).unwrap_or(entry.path());
        let target = dst.join(relative);
        let io_err = |err| Error::Io {
            path: target.clone(),
            err,
        };
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).map_err(io_err)?;
        } else {
            fs::copy(entry.path(), &target).map_err(io_err)?;
            copied += 1;
        }
    }
    Ok(copied)
}

/// Removes a directory tree, treating a missing directory as success.
pub fn rmdir(dir: &Path) -> Result<()> {
    match fs::remove_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(Error::Io {
            path: dir.to_owned(),
            err,
        }),
    }
}

/// The result of a fallible page-writing operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents an error in a page-writing operation.
#[derive(Debug, Error)]
pub enum Error {
    /// An error during templating.
    #[error(transparent)]
    Template(#[from] template::Error),

    /// An error writing the output files.
    #[error("writing `{}`: {err}", .path.display())]
    Io { path: PathBuf, err: io::Error },

    /// A slug that would place a page outside its own directory.
    #[error("`{0}` is not a single path segment")]
    UnsafeName(String),

    /// An error walking the static directory.
    #[error("walking static directory: {0}")]
    WalkDir(#[from] walkdir::Error),
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::document::{parse_front_matter, DocumentKind, PublishedDocument};

    fn theme(dir: &Path) -> Theme {
        let templates = dir.join("theme/templates");
        fs::create_dir_all(&templates).unwrap();
        fs::create_dir_all(dir.join("theme/static/css")).unwrap();
        fs::write(dir.join("theme/static/css/site.css"), "body {}").unwrap();
        fs::write(
            templates.join("index.html"),
            "{{range .posts}}[{{.title}}]{{end}}",
        )
        .unwrap();
        fs::write(
            templates.join("tags.html"),
            "{{if .tag}}{{.tag}}:{{range .posts}}[{{.title}}]{{end}}{{else}}{{range .all_tags}}<{{.}}>{{end}}{{end}}",
        )
        .unwrap();
        fs::write(
            templates.join("category.html"),
            "{{if .category}}{{.category}}:{{range .posts}}[{{.title}}]{{end}}{{else}}{{range .all_categories}}<{{.}}>{{end}}{{end}}",
        )
        .unwrap();
        Theme::load(&dir.join("theme")).unwrap()
    }

    fn doc(name: &str, front_matter: &str) -> PublishedDocument {
        let (meta, _) = parse_front_matter(&format!("---\n{}\n---\n", front_matter));
        PublishedDocument::new(
            PathBuf::from(format!("content/{}.md", name)),
            DocumentKind::Post,
            meta,
        )
    }

    #[test]
    fn test_write_pages() {
        let dir = tempfile::tempdir().unwrap();
        let theme = theme(dir.path());
        let out = dir.path().join("public");
        let site = SiteMetadata::default();
        let writer = Writer {
            output_directory: &out,
            theme: &theme,
            site: &site,
        };
        let taxonomy = Taxonomy::collect(vec![
            doc("a", "title: A\ndate: 2024-01-01\ntags: [x]\ncategory: c"),
            doc("b", "title: B\ndate: 2024-02-01\ntags: [x, y]"),
        ]);

        writer.write_index(&taxonomy).unwrap();
        assert_eq!("[B][A]", fs::read_to_string(out.join("index.html")).unwrap());

        assert_eq!(3, writer.write_tag_pages(&taxonomy).unwrap());
        assert_eq!("x:[B][A]", fs::read_to_string(out.join("tag/x/index.html")).unwrap());
        assert_eq!("y:[B]", fs::read_to_string(out.join("tag/y/index.html")).unwrap());
        assert_eq!("<x><y>", fs::read_to_string(out.join("tag/index.html")).unwrap());

        assert_eq!(2, writer.write_category_pages(&taxonomy).unwrap());
        assert_eq!("c:[A]", fs::read_to_string(out.join("category/c/index.html")).unwrap());
        assert_eq!("<c>", fs::read_to_string(out.join("category/index.html")).unwrap());

        assert_eq!(1, writer.copy_static().unwrap());
        assert!(out.join("static/css/site.css").is_file());
    }

    #[test]
    fn test_taxonomy_pages_are_rebuilt() {
        let dir = tempfile::tempdir().unwrap();
        let theme = theme(dir.path());
        let out = dir.path().join("public");
        let site = SiteMetadata::default();
        let writer = Writer {
            output_directory: &out,
            theme: &theme,
            site: &site,
        };

        let before = Taxonomy::collect(vec![doc("a", "title: A\ntags: [old]\ncategory: gone")]);
        writer.write_tag_pages(&before).unwrap();
        writer.write_category_pages(&before).unwrap();
        assert!(out.join("tag/old/index.html").is_file());

        let after = Taxonomy::collect(vec![doc("a", "title: A\ntags: [new]")]);
        writer.write_tag_pages(&after).unwrap();
        writer.write_category_pages(&after).unwrap();
        assert!(!out.join("tag/old").exists());
        assert!(!out.join("category/gone").exists());
        assert_eq!("new:[A]", fs::read_to_string(out.join("tag/new/index.html")).unwrap());
        assert_eq!("", fs::read_to_string(out.join("category/index.html")).unwrap());
    }

    #[test]
    fn test_unsafe_names_stay_inside_output() {
        let dir = tempfile::tempdir().unwrap();
        let theme = theme(dir.path());
        let out = dir.path().join("public");
        let site = SiteMetadata::default();
        let writer = Writer {
            output_directory: &out,
            theme: &theme,
            site: &site,
        };

        match writer.write_document("../escape", "x") {
            Err(Error::UnsafeName(name)) => assert_eq!("../escape", name),
            other => panic!("wanted UnsafeName, got {:?}", other),
        }
        assert!(!dir.path().join("escape").exists());

        let taxonomy = Taxonomy::collect(vec![doc("a", "title: A\ntags: ['../up', ok]\ncategory: /abs")]);
        assert_eq!(2, writer.write_tag_pages(&taxonomy).unwrap());
        assert_eq!(1, writer.write_category_pages(&taxonomy).unwrap());
        assert!(!dir.path().join("up").exists());
        assert_eq!("<ok>", fs::read_to_string(out.join("tag/index.html")).unwrap());
    }

    #[test]
    fn test_write_and_remove_document() {
        let dir = tempfile::tempdir().unwrap();
        let theme = theme(dir.path());
        let out = dir.path().join("public");
        let site = SiteMetadata::default();
        let writer = Writer {
            output_directory: &out,
            theme: &theme,
            site: &site,
        };

        let path = writer.write_document("hello", "<p>hi</p>").unwrap();
        assert_eq!(out.join("hello/index.html"), path);
        assert_eq!("<p>hi</p>", fs::read_to_string(&path).unwrap());

        writer.remove_output(&path).unwrap();
        assert!(!path.exists());
        assert!(!out.join("hello").exists());
        writer.remove_output(&path).unwrap();
    }
}
