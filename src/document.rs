//! Defines the [`Document`] and [`PublishedDocument`] types and the front
//! matter parsing that turns raw source text into metadata plus body. See
//! [`parse_front_matter`] for the exact splitting rules.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_yaml::Value;
use tracing::warn;

/// Metadata parsed from a document's front matter.
pub type Metadata = BTreeMap<String, Value>;

/// The fence which opens and closes a front matter block.
pub const FENCE: &str = "---";

/// The metadata key under which the raw (unconverted) body is stored once a
/// document has been rendered.
pub const RAW_BODY_KEY: &str = "content_raw";

/// Where a document lives in the content tree. Top-level files are posts;
/// files in the `pages` subdirectory are pages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DocumentKind {
    Post,
    Page,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Post => "post",
            DocumentKind::Page => "page",
        }
    }
}

/// A source document for the duration of one build. Identity is the source
/// path.
#[derive(Clone, Debug, PartialEq)]
pub struct Document {
    /// The path of the source file. Stable across builds, so it keys the
    /// change-detection cache.
    pub source: PathBuf,

    pub kind: DocumentKind,

    /// The URL-safe identifier used to form the output path.
    pub slug: String,

    pub title: String,

    /// The declared publish date, if any could be parsed.
    pub date: Option<NaiveDateTime>,

    pub meta: Metadata,

    /// The body text with the front matter removed.
    pub body: String,

    /// The rendered HTML. `None` until the document has been rendered.
    pub html: Option<String>,
}

impl Document {
    /// Parses a [`Document`] from its source path and raw text. Never fails:
    /// malformed front matter degrades to empty metadata.
    pub fn parse(source: &Path, kind: DocumentKind, text: &str) -> Document {
        let (meta, body) = parse_front_matter_at(text, Some(source));
        let slug = resolve_slug(&meta, source);
        let title = resolve_title(&meta, &slug);
        Document {
            source: source.to_owned(),
            kind,
            date: document_date(&meta),
            slug,
            title,
            meta,
            body,
            html: None,
        }
    }

    pub fn is_draft(&self) -> bool {
        is_draft(&self.meta)
    }

    /// The site-relative URL of the document's output page.
    pub fn url(&self) -> String {
        document_url(&self.slug)
    }

    /// Converts the document into the record the taxonomy and plugins work
    /// with. The raw body is folded into the metadata under
    /// [`RAW_BODY_KEY`].
    pub fn publish(self) -> PublishedDocument {
        let mut meta = self.meta;
        meta.insert(RAW_BODY_KEY.to_owned(), Value::String(self.body));
        PublishedDocument::new(self.source, self.kind, meta)
    }
}

/// A document which has an output page in this build, either because it was
/// just rendered or because it was unchanged since the previous build.
#[derive(Clone, Debug, PartialEq)]
pub struct PublishedDocument {
    pub source: PathBuf,
    pub kind: DocumentKind,
    pub slug: String,
    pub title: String,
    pub date: Option<NaiveDateTime>,

    /// The front matter with the raw body under [`RAW_BODY_KEY`].
    pub meta: Metadata,

    /// Site-relative URL, always `/{slug}/index.html`.
    pub url: String,

    /// Normalized `tags`, in declaration order without duplicates.
    pub tags: Vec<String>,

    /// Normalized `category`, in declaration order without duplicates.
    pub categories: Vec<String>,
}

impl PublishedDocument {
    /// Builds the record from normalized metadata. Slug, title, date and the
    /// taxonomy fields are all derived from `meta`.
    pub fn new(source: PathBuf, kind: DocumentKind, meta: Metadata) -> PublishedDocument {
        let slug = resolve_slug(&meta, &source);
        PublishedDocument {
            title: resolve_title(&meta, &slug),
            date: document_date(&meta),
            url: document_url(&slug),
            tags: string_list(meta.get("tags")),
            categories: string_list(meta.get("category")),
            source,
            kind,
            slug,
            meta,
        }
    }

    /// The raw markdown body, if it was recorded.
    pub fn raw_body(&self) -> &str {
        self.meta
            .get(RAW_BODY_KEY)
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    /// The declared date exactly as written in the front matter, or the empty
    /// string.
    pub fn date_text(&self) -> String {
        self.meta
            .get("date")
            .or_else(|| self.meta.get("published"))
            .and_then(scalar_string)
            .unwrap_or_default()
    }
}

/// Splits `text` into metadata and body.
///
/// If `text` begins with [`FENCE`], it is split into three segments on the
/// first two occurrences of the fence. The middle segment is parsed as a YAML
/// mapping and the remainder, with leading blank lines stripped, becomes the
/// body. When the text doesn't begin with the fence, the closing fence is
/// missing, or the YAML doesn't parse into a mapping, the metadata is empty
/// and the body is `text` unchanged.
pub fn parse_front_matter(text: &str) -> (Metadata, String) {
    parse_front_matter_at(text, None)
}

fn parse_front_matter_at(text: &str, source: Option<&Path>) -> (Metadata, String) {
    let unchanged = || (Metadata::new(), text.to_owned());
    if !text.starts_with(FENCE) {
        return unchanged();
    }
    let rest = &text[FENCE.len()..];
    let (yaml, body) = match rest.find(FENCE) {
        Some(offset) => (&rest[..offset], &rest[offset + FENCE.len()..]),
        None => return unchanged(),
    };
    let body = body.trim_start_matches(|c| c == '\n' || c == '\r').to_owned();

    if yaml.trim().is_empty() {
        return (Metadata::new(), body);
    }
    match serde_yaml::from_str::<Value>(yaml) {
        Ok(Value::Mapping(mapping)) => {
            let meta = mapping
                .into_iter()
                .filter_map(|(k, v)| scalar_string(&k).map(|k| (k, v)))
                .collect();
            (meta, body)
        }
        Ok(Value::Null) => (Metadata::new(), body),
        Ok(_) => {
            warn!(
                path = %source.unwrap_or_else(|| Path::new("<input>")).display(),
                "front matter is not a mapping; ignoring it"
            );
            unchanged()
        }
        Err(err) => {
            warn!(
                path = %source.unwrap_or_else(|| Path::new("<input>")).display(),
                error = %err,
                "malformed front matter; ignoring it"
            );
            unchanged()
        }
    }
}

/// An explicit `slug` that is a single path segment wins; otherwise the file
/// name without its extension.
pub fn resolve_slug(meta: &Metadata, source: &Path) -> String {
    match meta.get("slug").and_then(scalar_string) {
        Some(slug) if is_path_segment(&slug) => slug,
        Some(slug) => {
            warn!(path = %source.display(), slug = %slug, "slug is not a single path segment; ignoring it");
            file_stem(source)
        }
        None => file_stem(source),
    }
}

fn file_stem(source: &Path) -> String {
    source
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// True when `name` can be joined onto a directory without leaving it: one
/// normal component, no separators, not `.` or `..`.
pub fn is_path_segment(name: &str) -> bool {
    if name.contains(|c: char| c == '/' || c == '\\') {
        return false;
    }
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

/// An explicit, non-empty `title` wins; otherwise the slug.
pub fn resolve_title(meta: &Metadata, slug: &str) -> String {
    match meta.get("title").and_then(scalar_string) {
        Some(title) if !title.is_empty() => title,
        _ => slug.to_owned(),
    }
}

pub fn is_draft(meta: &Metadata) -> bool {
    match meta.get("draft") {
        Some(Value::Bool(draft)) => *draft,
        Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
        _ => false,
    }
}

pub fn document_url(slug: &str) -> String {
    format!("/{}/index.html", slug)
}

/// The document's date, read from `date` and falling back to `published`.
pub fn document_date(meta: &Metadata) -> Option<NaiveDateTime> {
    meta.get("date")
        .or_else(|| meta.get("published"))
        .and_then(parse_date)
}

/// Parses a front matter date. Accepts RFC 3339 timestamps, `YYYY-MM-DD
/// HH:MM:SS`, `YYYY-MM-DDTHH:MM:SS`, and bare `YYYY-MM-DD` dates (midnight).
pub fn parse_date(value: &Value) -> Option<NaiveDateTime> {
    let text = scalar_string(value)?;
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.naive_utc());
    }
    for format in &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Normalizes a `tags` or `category` field: a scalar becomes a one-element
/// list and a sequence keeps its scalar items. Duplicates are dropped.
pub fn string_list(value: Option<&Value>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut push = |s: String| {
        if !s.is_empty() && !out.contains(&s) {
            out.push(s);
        }
    };
    match value {
        Some(Value::Sequence(items)) => {
            for item in items {
                if let Some(s) = scalar_string(item) {
                    push(s);
                }
            }
        }
        Some(v) => {
            if let Some(s) = scalar_string(v) {
                push(s);
            }
        }
        None => {}
    }
    out
}

/// Renders a YAML scalar as a string. Sequences, mappings and null yield
/// `None`.
pub fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_front_matter() {
        let (meta, body) =
            parse_front_matter("---\ntitle: Hello\ntags: [a, b]\n---\n\n\n# Body\n");
        assert_eq!(Some("Hello"), meta.get("title").and_then(Value::as_str));
        assert_eq!(vec!["a", "b"], string_list(meta.get("tags")));
        assert_eq!("# Body\n", body);
    }

    #[test]
    fn test_parse_front_matter_no_fence() {
        let text = "# Just a body\n---\nnot: yaml\n---\n";
        let (meta, body) = parse_front_matter(text);
        assert!(meta.is_empty());
        assert_eq!(text, body);
    }

    #[test]
    fn test_parse_front_matter_missing_end_fence() {
        let text = "---\ntitle: Hello\n";
        let (meta, body) = parse_front_matter(text);
        assert!(meta.is_empty());
        assert_eq!(text, body);
    }

    #[test]
    fn test_parse_front_matter_malformed_yaml() {
        let text = "---\ntitle: [unclosed\n---\nbody\n";
        let (meta, body) = parse_front_matter(text);
        assert!(meta.is_empty());
        assert_eq!(text, body);
    }

    #[test]
    fn test_parse_front_matter_empty_block() {
        let (meta, body) = parse_front_matter("---\n---\nbody");
        assert!(meta.is_empty());
        assert_eq!("body", body);
    }

    #[test]
    fn test_slug_and_title_resolution() {
        let doc = Document::parse(
            Path::new("content/hello-world.md"),
            DocumentKind::Post,
            "---\ndate: 2024-01-01\n---\nhi",
        );
        assert_eq!("hello-world", doc.slug);
        assert_eq!("hello-world", doc.title);
        assert_eq!("/hello-world/index.html", doc.url());

        let doc = Document::parse(
            Path::new("content/hello-world.md"),
            DocumentKind::Post,
            "---\nslug: greeting\ntitle: Hi there\n---\nhi",
        );
        assert_eq!("greeting", doc.slug);
        assert_eq!("Hi there", doc.title);
    }

    #[test]
    fn test_unsafe_slug_falls_back_to_file_stem() {
        for slug in &["../escape", "/tmp/x", "a/b", "..", ""] {
            let doc = Document::parse(
                Path::new("content/post.md"),
                DocumentKind::Post,
                &format!("---\nslug: '{}'\n---\nhi", slug),
            );
            assert_eq!("post", doc.slug, "slug {:?}", slug);
        }
    }

    #[test]
    fn test_is_path_segment() {
        assert!(is_path_segment("rust"));
        assert!(is_path_segment("c++"));
        assert!(!is_path_segment(""));
        assert!(!is_path_segment("."));
        assert!(!is_path_segment(".."));
        assert!(!is_path_segment("/tmp/x"));
        assert!(!is_path_segment("../x"));
        assert!(!is_path_segment("a\\b"));
    }

    #[test]
    fn test_string_list() {
        let scalar = Value::String("rust".to_owned());
        assert_eq!(vec!["rust"], string_list(Some(&scalar)));

        let seq: Value = serde_yaml::from_str("[rust, 2024, rust]").unwrap();
        assert_eq!(vec!["rust", "2024"], string_list(Some(&seq)));

        assert!(string_list(None).is_empty());
    }

    #[test]
    fn test_parse_date() {
        let date = |s: &str| parse_date(&Value::String(s.to_owned()));
        assert_eq!(
            NaiveDate::from_ymd_opt(2024, 6, 1).and_then(|d| d.and_hms_opt(0, 0, 0)),
            date("2024-06-01")
        );
        assert_eq!(
            NaiveDate::from_ymd_opt(2024, 6, 1).and_then(|d| d.and_hms_opt(12, 30, 0)),
            date("2024-06-01 12:30:00")
        );
        assert!(date("2024-06-01T12:30:00+00:00").is_some());
        assert_eq!(None, date("last tuesday"));
    }

    #[test]
    fn test_draft_flag() {
        let (meta, _) = parse_front_matter("---\ndraft: true\n---\n");
        assert!(is_draft(&meta));
        let (meta, _) = parse_front_matter("---\ndraft: false\n---\n");
        assert!(!is_draft(&meta));
        assert!(!is_draft(&Metadata::new()));
    }
}
