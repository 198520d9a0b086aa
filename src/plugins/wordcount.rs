//! Appends a word count to every rendered document.

use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;

use crate::plugin::{Plugin, Result};
use crate::render::RenderedDocument;

pub const NAME: &str = "wordcount";

/// The element the footer is inserted before.
const ARTICLE_END: &str = "</article>";

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct Options {
    /// Precedes the number in the footer.
    pub label: String,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            label: String::from("Word count"),
        }
    }
}

/// Counts the words of the raw markdown body and inserts
/// `<p><em>{label}: N</em></p>` before each `</article>`. Pages without an
/// `<article>` element pass through unchanged.
pub struct WordCount {
    options: Options,
}

impl WordCount {
    pub fn new(options: Options) -> WordCount {
        WordCount { options }
    }
}

impl Plugin for WordCount {
    fn name(&self) -> &str {
        NAME
    }

    fn after_render(&mut self, document: &RenderedDocument, html: &str) -> Result<String> {
        if !html.contains(ARTICLE_END) {
            return Ok(html.to_owned());
        }
        let footer = format!(
            "<p><em>{}: {}</em></p>{}",
            self.options.label,
            count_words(document.raw_body()),
            ARTICLE_END
        );
        Ok(html.replace(ARTICLE_END, &footer))
    }
}

/// Counts CJK ideographs individually plus runs of ASCII letters and digits.
pub fn count_words(text: &str) -> usize {
    static IDEOGRAPH: OnceLock<Regex> = OnceLock::new();
    static WORD: OnceLock<Regex> = OnceLock::new();
    let ideographs = IDEOGRAPH
        .get_or_init(|| Regex::new(r"[\x{4e00}-\x{9fff}]").expect("valid ideograph pattern"))
        .find_iter(text)
        .count();
    let words = WORD
        .get_or_init(|| Regex::new(r"\b[a-zA-Z0-9]+\b").expect("valid word pattern"))
        .find_iter(text)
        .count();
    ideographs + words
}
