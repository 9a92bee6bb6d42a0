use std::fmt;

use serde::{Deserialize, Serialize};

/// One-based index of a result page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct PageIndex(u32);

impl PageIndex {
    pub const FIRST: PageIndex = PageIndex(1);

    /// Returns `None` for zero; pages are numbered from 1.
    pub const fn new(value: u32) -> Option<Self> {
        if value == 0 {
            None
        } else {
            Some(Self(value))
        }
    }

    pub const fn get(self) -> u32 {
        self.0
    }

    /// Every page from `start` through `end`, both inclusive.
    pub fn range_inclusive(start: PageIndex, end: PageIndex) -> impl Iterator<Item = PageIndex> {
        (start.0..=end.0).map(PageIndex)
    }
}

impl TryFrom<u32> for PageIndex {
    type Error = String;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        PageIndex::new(value).ok_or_else(|| "page index must be at least 1".to_string())
    }
}

impl From<PageIndex> for u32 {
    fn from(page: PageIndex) -> Self {
        page.0
    }
}

impl fmt::Display for PageIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_is_not_a_page() {
        assert_eq!(PageIndex::new(0), None);
        assert_eq!(PageIndex::new(1), Some(PageIndex::FIRST));
    }

    #[test]
    fn range_is_inclusive_and_ascending() {
        let pages: Vec<u32> =
            PageIndex::range_inclusive(PageIndex::FIRST, PageIndex::new(3).unwrap())
                .map(PageIndex::get)
                .collect();
        assert_eq!(pages, vec![1, 2, 3]);
    }
}
