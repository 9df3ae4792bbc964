//! Text changesets and tracked-change rendering.
//!
//! A [`Changeset`] is the word-level difference between a block's "before"
//! and "after" text. Rendering it with a [`MarkupStyle`] yields the reviewable
//! form: unchanged words as-is, removed words wrapped in delete markers, added
//! words wrapped in insert markers.

use similar::{ChangeTag, TextDiff};

use crate::config::MarkupStyle;

/// Kind of a changeset span.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpanTag {
    Equal,
    Insert,
    Delete,
}

/// A run of text sharing one tag.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChangeSpan {
    pub tag: SpanTag,
    pub text: String,
}

/// Ordered spans describing how one text became another.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Changeset {
    spans: Vec<ChangeSpan>,
}

impl Changeset {
    /// Word-level diff from `before` to `after`.
    pub fn between(before: &str, after: &str) -> Self {
        let diff = TextDiff::from_words(before, after);
        let mut changeset = Self::default();
        for change in diff.iter_all_changes() {
            let tag = match change.tag() {
                ChangeTag::Equal => SpanTag::Equal,
                ChangeTag::Insert => SpanTag::Insert,
                ChangeTag::Delete => SpanTag::Delete,
            };
            changeset.push(tag, change.value());
        }
        changeset
    }

    /// Everything in `text` removed.
    pub fn deletion(text: &str) -> Self {
        let mut changeset = Self::default();
        changeset.push(SpanTag::Delete, text);
        changeset
    }

    /// Everything in `text` added.
    pub fn insertion(text: &str) -> Self {
        let mut changeset = Self::default();
        changeset.push(SpanTag::Insert, text);
        changeset
    }

    /// Append text, coalescing with the previous span when the tag matches.
    fn push(&mut self, tag: SpanTag, text: &str) {
        if text.is_empty() {
            return;
        }
        match self.spans.last_mut() {
            Some(last) if last.tag == tag => last.text.push_str(text),
            _ => self.spans.push(ChangeSpan {
                tag,
                text: text.to_string(),
            }),
        }
    }

    pub fn spans(&self) -> &[ChangeSpan] {
        &self.spans
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    /// Whether any span is an insertion or deletion.
    pub fn has_changes(&self) -> bool {
        self.spans.iter().any(|s| s.tag != SpanTag::Equal)
    }

    /// Reconstruct the original text.
    pub fn before_text(&self) -> String {
        self.collect(SpanTag::Insert)
    }

    /// Reconstruct the resulting text.
    pub fn after_text(&self) -> String {
        self.collect(SpanTag::Delete)
    }

    fn collect(&self, skip: SpanTag) -> String {
        self.spans
            .iter()
            .filter(|s| s.tag != skip)
            .map(|s| s.text.as_str())
            .collect()
    }

    /// Render with tracked-change markers.
    pub fn render(&self, style: &MarkupStyle) -> String {
        let mut out = String::new();
        for span in &self.spans {
            match span.tag {
                SpanTag::Equal => out.push_str(&span.text),
                SpanTag::Insert => {
                    out.push_str(&style.insert_open);
                    out.push_str(&span.text);
                    out.push_str(&style.insert_close);
                }
                SpanTag::Delete => {
                    out.push_str(&style.delete_open);
                    out.push_str(&span.text);
                    out.push_str(&style.delete_close);
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_text_has_no_changes() {
        let cs = Changeset::between("same words here", "same words here");
        assert!(!cs.has_changes());
        assert_eq!(cs.spans().len(), 1);
    }

    #[test]
    fn test_word_replacement() {
        let cs = Changeset::between("the quick fox", "the slow fox");
        assert!(cs.has_changes());
        assert_eq!(cs.before_text(), "the quick fox");
        assert_eq!(cs.after_text(), "the slow fox");
        assert_eq!(
            cs.render(&MarkupStyle::default()),
            "the <del>quick</del><ins>slow</ins> fox"
        );
    }

    #[test]
    fn test_deletion_and_insertion_helpers() {
        let style = MarkupStyle::default();
        assert_eq!(Changeset::deletion("gone").render(&style), "<del>gone</del>");
        assert_eq!(Changeset::insertion("new").render(&style), "<ins>new</ins>");
        assert!(Changeset::deletion("").is_empty());
    }

    #[test]
    fn test_custom_markers() {
        let style = MarkupStyle {
            insert_open: "{+".into(),
            insert_close: "+}".into(),
            delete_open: "[-".into(),
            delete_close: "-]".into(),
        };
        let cs = Changeset::between("a b", "a c");
        assert_eq!(cs.render(&style), "a [-b-]{+c+}");
    }
}
