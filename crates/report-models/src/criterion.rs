use serde::{Deserialize, Serialize};

/// What a request is searching the inbox for: either the portal's opaque
/// submission identifier or the free-text title the submitter entered.
///
/// The two kinds drive different row-matching and file-matching strategies,
/// so the distinction is kept all the way through a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum SearchCriterion {
    Id(String),
    Title(String),
}

impl SearchCriterion {
    pub fn id(value: impl Into<String>) -> Self {
        SearchCriterion::Id(value.into())
    }

    pub fn title(value: impl Into<String>) -> Self {
        SearchCriterion::Title(value.into())
    }

    pub fn value(&self) -> &str {
        match self {
            SearchCriterion::Id(v) => v,
            SearchCriterion::Title(v) => v,
        }
    }

    pub fn is_id(&self) -> bool {
        matches!(self, SearchCriterion::Id(_))
    }

    /// Short human label for log lines and messages, e.g. `id "2696113910"`.
    pub fn label(&self) -> String {
        match self {
            SearchCriterion::Id(v) => format!("id \"{}\"", v),
            SearchCriterion::Title(v) => format!("title \"{}\"", v),
        }
    }

    /// Filesystem-safe slug used in canonical artifact names: lowercase,
    /// alphanumeric runs joined by single underscores, truncated to keep
    /// paths reasonable.
    pub fn slug(&self) -> String {
        let mut slug = String::new();
        let mut last_was_sep = true;
        for c in self.value().chars() {
            if c.is_alphanumeric() {
                slug.extend(c.to_lowercase());
                last_was_sep = false;
            } else if !last_was_sep {
                slug.push('_');
                last_was_sep = true;
            }
        }
        while slug.ends_with('_') {
            slug.pop();
        }
        if slug.is_empty() {
            slug.push_str("report");
        }
        slug.truncate(64);
        slug
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_and_kind() {
        let id = SearchCriterion::id("2696113910");
        assert!(id.is_id());
        assert_eq!(id.value(), "2696113910");

        let title = SearchCriterion::title("My Essay");
        assert!(!title.is_id());
        assert_eq!(title.value(), "My Essay");
    }

    #[test]
    fn test_slug_normalizes_punctuation() {
        let c = SearchCriterion::title("My Essay.docx");
        assert_eq!(c.slug(), "my_essay_docx");
    }

    #[test]
    fn test_slug_collapses_runs_and_trims() {
        let c = SearchCriterion::title("  A --- messy!!  title  ");
        assert_eq!(c.slug(), "a_messy_title");
    }

    #[test]
    fn test_slug_never_empty() {
        let c = SearchCriterion::title("???");
        assert_eq!(c.slug(), "report");
    }

    #[test]
    fn test_serde_tagged_shape() {
        let c = SearchCriterion::id("123");
        let json = serde_json::to_string(&c).unwrap();
        assert_eq!(json, r#"{"kind":"id","value":"123"}"#);

        let back: SearchCriterion = serde_json::from_str(&json).unwrap();
        assert_eq!(back, c);
    }
}
