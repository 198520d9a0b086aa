//! Scaffolds a new project: a configuration file, a sample post, a minimal
//! default theme and the built-in plugin manifests. Existing files are never
//! overwritten, so running it on a populated project only fills the gaps.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::config::{Config, CONFIG_FILE};

const CONFIG: &str = "title: Blazemark Blog
description: ''
author: ''
url: http://example.com
language: en
theme: default
";

const HELLO_WORLD: &str = "---
title: Hello World
date: 2025-10-03
tags: [blazemark]
category: general
---
# Welcome to Blazemark

This is your first post!
";

const POST_TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="{{.site.language}}">
<head>
<meta charset="utf-8">
<title>{{.post.title}} | {{.site.title}}</title>
<link rel="stylesheet" href="/static/style.css">
</head>
<body>
<article>
<h1>{{.post.title}}</h1>
<time>{{.post.date}}</time>
{{.post.content}}
</article>
<footer>&copy; {{.site.year}} {{.site.title}}</footer>
</body>
</html>
"#;

const INDEX_TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="{{.site.language}}">
<head>
<meta charset="utf-8">
<title>{{.site.title}}</title>
<link rel="stylesheet" href="/static/style.css">
</head>
<body>
<h1>{{.site.title}}</h1>
<ul>
{{range .posts}}<li><a href="{{.url}}">{{.title}}</a> <time>{{.date}}</time></li>
{{end}}</ul>
<nav>{{range .all_tags}}<a href="/tag/{{.}}/index.html">{{.}}</a> {{end}}</nav>
</body>
</html>
"#;

const TAGS_TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="{{.site.language}}">
<head><meta charset="utf-8"><title>{{.page.title}} | {{.site.title}}</title></head>
<body>
<h1>{{.page.title}}</h1>
<ul>
{{if .tag}}{{range .posts}}<li><a href="{{.url}}">{{.title}}</a></li>
{{end}}{{else}}{{range .all_tags}}<li><a href="/tag/{{.}}/index.html">{{.}}</a></li>
{{end}}{{end}}</ul>
</body>
</html>
"#;

const CATEGORY_TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="{{.site.language}}">
<head><meta charset="utf-8"><title>{{.page.title}} | {{.site.title}}</title></head>
<body>
<h1>{{.page.title}}</h1>
<ul>
{{if .category}}{{range .posts}}<li><a href="{{.url}}">{{.title}}</a></li>
{{end}}{{else}}{{range .all_categories}}<li><a href="/category/{{.}}/index.html">{{.}}</a></li>
{{end}}{{end}}</ul>
</body>
</html>
"#;

const STYLESHEET: &str = "body { max-width: 40rem; margin: 0 auto; font-family: sans-serif; }\n";

const PLUGINS: [(&str, &str); 4] = [
    ("10-wordcount.yml", "plugin: wordcount\n"),
    ("20-archives.yml", "plugin: archives\n"),
    ("30-feed.yml", "plugin: feed\noptions:\n  path: atom.xml\n"),
    ("40-sitemap.yml", "plugin: sitemap\n"),
];

/// Creates the project skeleton under `root` and returns the files it
/// created.
pub fn init(root: &Path) -> Result<Vec<PathBuf>> {
    let config = Config::new(root);
    let templates = config.theme_directory.join("templates");
    let mut files = vec![
        (root.join(CONFIG_FILE), CONFIG),
        (config.content_directory.join("hello-world.md"), HELLO_WORLD),
        (templates.join("post.html"), POST_TEMPLATE),
        (templates.join("index.html"), INDEX_TEMPLATE),
        (templates.join("tags.html"), TAGS_TEMPLATE),
        (templates.join("category.html"), CATEGORY_TEMPLATE),
        (config.theme_directory.join("static/style.css"), STYLESHEET),
    ];
    for (name, contents) in PLUGINS {
        files.push((config.plugins_directory.join(name), contents));
    }

    fs::create_dir_all(config.pages_directory()).with_context(|| {
        format!("Creating directory `{}`", config.pages_directory().display())
    })?;

    let mut created = Vec::new();
    for (path, contents) in files {
        if path.exists() {
            debug!(path = %path.display(), "exists; leaving it alone");
            continue;
        }
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Creating directory `{}`", dir.display()))?;
        }
        fs::write(&path, contents).with_context(|| format!("Writing `{}`", path.display()))?;
        info!(path = %path.display(), "created");
        created.push(path);
    }
    Ok(created)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_init() {
        let dir = tempfile::tempdir().unwrap();
        let created = init(dir.path()).unwrap();
        assert_eq!(11, created.len());
        assert!(dir.path().join("content/pages").is_dir());
        assert!(dir.path().join("themes/default/templates/post.html").is_file());

        fs::write(dir.path().join(CONFIG_FILE), "title: Mine\n").unwrap();
        assert!(init(dir.path()).unwrap().is_empty());
        assert_eq!(
            "title: Mine\n",
            fs::read_to_string(dir.path().join(CONFIG_FILE)).unwrap()
        );
    }

    #[test]
    fn test_init_builds() {
        let dir = tempfile::tempdir().unwrap();
        init(dir.path()).unwrap();
        let config = Config::load(dir.path()).unwrap();
        let mut site = crate::build::Site::new(config);
        let report = site.build(Default::default()).unwrap();
        assert_eq!(1, report.rendered.len());
        assert!(report.failed.is_empty());
        assert_eq!(0, report.plugin_failures);

        let out = dir.path().join("public");
        let post = fs::read_to_string(out.join("hello-world/index.html")).unwrap();
        assert!(post.contains("<h1>Welcome to Blazemark</h1>"), "{}", post);
        assert!(post.contains("<p><em>Word count: 8</em></p></article>"), "{}", post);
        for artifact in &[
            "index.html",
            "tag/blazemark/index.html",
            "category/general/index.html",
            "archives/index.html",
            "atom.xml",
            "sitemap.xml",
            "static/style.css",
        ] {
            assert!(out.join(artifact).is_file(), "missing {}", artifact);
        }
    }
}
