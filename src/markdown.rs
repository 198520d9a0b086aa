//! Markdown to HTML conversion. The build treats this as an opaque pure
//! function; fenced code blocks come out GitHub-style as
//! `<pre lang="..."><code>`, which [`crate::render::fold_code_languages`]
//! later folds into a class attribute.

use pulldown_cmark::{html, CodeBlockKind, CowStr, Event, Options, Parser, Tag};

/// Converts `markdown` to HTML.
pub fn to_html(markdown: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_FOOTNOTES);
    options.insert(Options::ENABLE_SMART_PUNCTUATION);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_TASKLISTS);

    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, Parser::new_ext(markdown, options).map(convert));
    out
}

fn convert(ev: Event) -> Event {
    match ev {
        // Tag fenced code blocks with their language the way GFM renderers
        // do. The info string may carry extra words (`rust,ignore`), only the
        // first one names the language.
        Event::Start(Tag::CodeBlock(CodeBlockKind::Fenced(info))) => {
            let lang: String = info
                .split(|c: char| c == ',' || c.is_whitespace())
                .next()
                .unwrap_or_default()
                .chars()
                .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_' || *c == '+')
                .collect();
            if lang.is_empty() {
                Event::Html(CowStr::Borrowed("<pre><code>"))
            } else {
                Event::Html(CowStr::Boxed(
                    format!(r#"<pre lang="{}"><code>"#, lang).into_boxed_str(),
                ))
            }
        }
        _ => ev,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_paragraph() {
        assert_eq!("<p>Hello <em>world</em></p>\n", to_html("Hello *world*"));
    }

    #[test]
    fn test_fenced_code_block_language() {
        let html = to_html("```rust\nfn main() {}\n```\n");
        assert!(html.contains(r#"<pre lang="rust"><code>fn main() {}"#), "{}", html);
        assert!(html.contains("</code></pre>"), "{}", html);
    }

    #[test]
    fn test_fenced_code_block_escapes() {
        let html = to_html("```\n<b>\n```\n");
        assert!(html.contains("<pre><code>&lt;b&gt;"), "{}", html);
    }
}
