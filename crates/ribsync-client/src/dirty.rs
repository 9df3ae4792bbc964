//! Dirty region accumulator.

use std::ops::Range;

/// Union of the character spans touched during a round.
///
/// Tracks the minimum start and maximum end offset of every span passed to
/// [`extend`](Self::extend), so the UI can re-render one contiguous range.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DirtyRegion {
    range: Option<Range<usize>>,
}

impl DirtyRegion {
    pub fn new() -> Self {
        Self::default()
    }

    /// Widen the region to cover `span`. `None` spans are ignored.
    pub fn extend(&mut self, span: Option<Range<usize>>) {
        let Some(span) = span else { return };
        self.range = Some(match self.range.take() {
            Some(r) => r.start.min(span.start)..r.end.max(span.end),
            None => span,
        });
    }

    pub fn range(&self) -> Option<Range<usize>> {
        self.range.clone()
    }

    pub fn is_empty(&self) -> bool {
        self.range.is_none()
    }

    /// Return the accumulated region and reset.
    pub fn take(&mut self) -> Option<Range<usize>> {
        self.range.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extend_unions_spans() {
        let mut dirty = DirtyRegion::new();
        assert!(dirty.is_empty());
        dirty.extend(Some(10..15));
        dirty.extend(None);
        dirty.extend(Some(3..6));
        dirty.extend(Some(12..20));
        assert_eq!(dirty.range(), Some(3..20));
        assert_eq!(dirty.take(), Some(3..20));
        assert!(dirty.is_empty());
    }
}
