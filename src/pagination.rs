//! Pagination over the preview rows. Everything is derived from
//! `(total, page_index, page_size)` on demand, nothing is cached.

use std::fmt;

pub const PAGE_SIZE_CHOICES: [usize; 4] = [10, 25, 50, 100];
pub const DEFAULT_PAGE_SIZE: usize = 25;

/// `max(1, ceil(total / max(page_size, 1)))`
pub fn page_count(total: usize, page_size: usize) -> usize {
    let size = page_size.max(1);
    total.div_ceil(size).max(1)
}

pub fn effective_page_index(page_index: usize, total: usize, page_size: usize) -> usize {
    page_index.min(page_count(total, page_size) - 1)
}

pub fn visible_slice<T>(rows: &[T], page_index: usize, page_size: usize) -> &[T] {
    let size = page_size.max(1);
    let page = effective_page_index(page_index, rows.len(), size);
    let start = (page * size).min(rows.len());
    let end = (start + size).min(rows.len());
    &rows[start..end]
}

/// 1-based "showing a–b of n" bounds for the current page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRange {
    pub start: usize,
    pub end: usize,
    pub total: usize,
}

impl fmt::Display for PageRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.total == 0 {
            write!(f, "0 of 0")
        } else {
            write!(f, "{}–{} of {}", self.start, self.end, self.total)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageState {
    page_index: usize,
    page_size: usize,
}

impl Default for PageState {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE)
    }
}

impl PageState {
    pub fn new(page_size: usize) -> Self {
        Self { page_index: 0, page_size: page_size.max(1) }
    }

    /// Requested page, possibly past the end; see [`PageState::effective_index`].
    pub fn page_index(&self) -> usize {
        self.page_index
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn page_count(&self, total: usize) -> usize {
        page_count(total, self.page_size)
    }

    pub fn effective_index(&self, total: usize) -> usize {
        effective_page_index(self.page_index, total, self.page_size)
    }

    pub fn visible<'a, T>(&self, rows: &'a [T]) -> &'a [T] {
        visible_slice(rows, self.page_index, self.page_size)
    }

    pub fn go_to(&mut self, page_index: usize) {
        self.page_index = page_index;
    }

    pub fn reset(&mut self) {
        self.page_index = 0;
    }

    /// Steps back from the clamped page so a stale index can't strand the user.
    pub fn prev_page(&mut self, total: usize) {
        self.page_index = self.effective_index(total).saturating_sub(1);
    }

    pub fn next_page(&mut self, total: usize) {
        let last = self.page_count(total) - 1;
        self.page_index = (self.effective_index(total) + 1).min(last);
    }

    pub fn has_prev(&self, total: usize) -> bool {
        self.effective_index(total) > 0
    }

    pub fn has_next(&self, total: usize) -> bool {
        total > 0 && self.effective_index(total) + 1 < self.page_count(total)
    }

    /// Always lands on page one.
    pub fn set_page_size(&mut self, page_size: usize) {
        self.page_size = page_size.max(1);
        self.page_index = 0;
    }

    /// Next entry of [`PAGE_SIZE_CHOICES`], wrapping around.
    pub fn cycle_page_size(&mut self) -> usize {
        let next = PAGE_SIZE_CHOICES
            .iter()
            .copied()
            .find(|&s| s > self.page_size)
            .unwrap_or(PAGE_SIZE_CHOICES[0]);
        self.set_page_size(next);
        next
    }

    pub fn range(&self, total: usize) -> PageRange {
        if total == 0 {
            return PageRange { start: 0, end: 0, total: 0 };
        }
        let start = self.effective_index(total) * self.page_size;
        PageRange {
            start: start + 1,
            end: (start + self.page_size).min(total),
            total,
        }
    }
}
