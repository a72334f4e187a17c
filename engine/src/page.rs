// Copyright (c) 2020 White Leaf
//
// This software is released under the MIT License.
// https://opensource.org/licenses/MIT

/// One page of an ordered result set, pages are numbered from 1
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub per_page: usize,
    pub total: usize,
}

impl<T> Page<T> {
    /// Cut the requested page out of an already ordered list. Page 0, a page
    /// size of 0 or a page past the end yield an empty page.
    pub fn slice(all: Vec<T>, page: usize, per_page: usize) -> Self {
        let total = all.len();
        let items = match page.checked_sub(1) {
            Some(index) if per_page > 0 => {
                let start = index.saturating_mul(per_page);
                all.into_iter().skip(start).take(per_page).collect()
            }
            _ => Vec::new(),
        };

        Self {
            items,
            page,
            per_page,
            total,
        }
    }

    /// Page built by a store that already applied offset and limit
    pub fn from_parts(items: Vec<T>, page: usize, per_page: usize, total: usize) -> Self {
        Self {
            items,
            page,
            per_page,
            total,
        }
    }

    pub fn pages(&self) -> usize {
        if self.per_page == 0 {
            0
        } else {
            (self.total + self.per_page - 1) / self.per_page
        }
    }

    pub fn has_next(&self) -> bool {
        self.page < self.pages()
    }

    pub fn has_prev(&self) -> bool {
        self.page > 1 && self.page <= self.pages() + 1
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            page: self.page,
            per_page: self.per_page,
            total: self.total,
        }
    }
}

/// Offset of a 1-based page, `None` when the page can't hold anything
pub(crate) fn offset(page: usize, per_page: usize) -> Option<usize> {
    if per_page == 0 {
        return None;
    }

    page.checked_sub(1).map(|index| index.saturating_mul(per_page))
}
