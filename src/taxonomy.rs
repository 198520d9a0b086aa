//! Aggregates published documents into the date-ordered home listing and the
//! tag and category indices. The taxonomy is recomputed from scratch every
//! build, since its correctness depends on documents untouched by that build.

use std::collections::BTreeMap;

use crate::document::PublishedDocument;

/// The cross-document view of one build.
#[derive(Debug, Default)]
pub struct Taxonomy {
    /// Newest first. Missing dates sort as the oldest; ties keep discovery
    /// order.
    documents: Vec<PublishedDocument>,

    /// Tag name to indices into `documents`.
    tags: BTreeMap<String, Vec<usize>>,

    /// Category name to indices into `documents`.
    categories: BTreeMap<String, Vec<usize>>,
}

impl Taxonomy {
    /// Indexes `documents`, which must be in discovery order.
    pub fn collect(mut documents: Vec<PublishedDocument>) -> Taxonomy {
        // `sort_by` is stable, so equal dates keep discovery order. `None`
        // orders before any date, i.e. it's the oldest.
        documents.sort_by(|a, b| b.date.cmp(&a.date));

        let mut tags: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        let mut categories: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (i, doc) in documents.iter().enumerate() {
            for tag in &doc.tags {
                tags.entry(tag.clone()).or_default().push(i);
            }
            for category in &doc.categories {
                categories.entry(category.clone()).or_default().push(i);
            }
        }

        Taxonomy {
            documents,
            tags,
            categories,
        }
    }

    /// Every published document in home-index order.
    pub fn documents(&self) -> &[PublishedDocument] {
        &self.documents
    }

    /// Distinct tag names, sorted.
    pub fn tag_names(&self) -> Vec<&str> {
        self.tags.keys().map(String::as_str).collect()
    }

    /// Distinct category names, sorted.
    pub fn category_names(&self) -> Vec<&str> {
        self.categories.keys().map(String::as_str).collect()
    }

    /// The documents declaring `tag`, in home-index order.
    pub fn tagged(&self, tag: &str) -> Vec<&PublishedDocument> {
        self.members(self.tags.get(tag))
    }

    /// The documents declaring `category`, in home-index order.
    pub fn categorized(&self, category: &str) -> Vec<&PublishedDocument> {
        self.members(self.categories.get(category))
    }

    fn members(&self, indices: Option<&Vec<usize>>) -> Vec<&PublishedDocument> {
        indices
            .map(|indices| indices.iter().map(|&i| &self.documents[i]).collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::document::{parse_front_matter, DocumentKind};
    use std::path::PathBuf;

    fn doc(name: &str, front_matter: &str) -> PublishedDocument {
        let (meta, _) = parse_front_matter(&format!("---\n{}\n---\n", front_matter));
        PublishedDocument::new(
            PathBuf::from(format!("content/{}.md", name)),
            DocumentKind::Post,
            meta,
        )
    }

    fn slugs(docs: &[&PublishedDocument]) -> Vec<String> {
        docs.iter().map(|d| d.slug.clone()).collect()
    }

    #[test]
    fn test_date_order() {
        let taxonomy = Taxonomy::collect(vec![
            doc("a", "date: 2024-01-01"),
            doc("b", "title: undated"),
            doc("c", "date: 2024-06-01"),
            doc("d", "date: 2024-01-01"),
        ]);
        let order: Vec<_> = taxonomy.documents().iter().map(|d| d.slug.as_str()).collect();
        assert_eq!(vec!["c", "a", "d", "b"], order);
    }

    #[test]
    fn test_tags_and_categories() {
        let taxonomy = Taxonomy::collect(vec![
            doc("a", "date: 2024-01-01\ntags: [rust, web]\ncategory: code"),
            doc("b", "date: 2024-02-01\ntags: rust"),
            doc("c", "date: 2024-03-01\ncategory: [life, code]"),
        ]);
        assert_eq!(vec!["rust", "web"], taxonomy.tag_names());
        assert_eq!(vec!["code", "life"], taxonomy.category_names());
        assert_eq!(vec!["b", "a"], slugs(&taxonomy.tagged("rust")));
        assert_eq!(vec!["a"], slugs(&taxonomy.tagged("web")));
        assert_eq!(vec!["c", "a"], slugs(&taxonomy.categorized("code")));
        assert!(taxonomy.tagged("missing").is_empty());
    }
}
