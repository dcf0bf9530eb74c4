//! Client-side table state: filter, stable sort, and paging over an
//! already-fetched collection, plus the compact page-link strip.

use std::cmp::Ordering;
use tracing::warn;

/// A record the list view can display. `cell` returns the string form of a
/// column, or `None` for a null or unknown column.
pub trait TableRecord: Clone {
    fn cell(&self, column: &str) -> Option<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageSize {
    Rows(usize),
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    fn flipped(self) -> Self {
        match self {
            SortDirection::Asc => SortDirection::Desc,
            SortDirection::Desc => SortDirection::Asc,
        }
    }
}

/// Which collection page counts are derived from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PageCountBasis {
    /// The full fetched collection, ignoring the filter.
    #[default]
    Source,
    Filtered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageLink {
    Page(usize),
    Ellipsis,
}

#[derive(Debug, Clone)]
pub struct ListViewConfig {
    filter_columns: Vec<String>,
    sort_columns: Vec<String>,
    page_size: PageSize,
    window: usize,
    basis: PageCountBasis,
}

impl ListViewConfig {
    pub fn new<F, S>(filter_columns: F, sort_columns: S) -> Self
    where
        F: IntoIterator,
        F::Item: Into<String>,
        S: IntoIterator,
        S::Item: Into<String>,
    {
        Self {
            filter_columns: filter_columns.into_iter().map(Into::into).collect(),
            sort_columns: sort_columns.into_iter().map(Into::into).collect(),
            page_size: PageSize::Rows(10),
            window: 5,
            basis: PageCountBasis::default(),
        }
    }

    pub fn page_size(mut self, page_size: PageSize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Number of consecutive page links shown around the current page.
    pub fn window(mut self, window: usize) -> Self {
        self.window = window.max(1);
        self
    }

    pub fn page_count_basis(mut self, basis: PageCountBasis) -> Self {
        self.basis = basis;
        self
    }
}

pub struct ListView<T: TableRecord> {
    config: ListViewConfig,
    source: Vec<T>,
    filter_text: String,
    sort: Option<(String, SortDirection)>,
    page_size: PageSize,
    page: usize,
    matched: usize,
    visible: Vec<T>,
}

impl<T: TableRecord> ListView<T> {
    pub fn new(config: ListViewConfig) -> Self {
        let page_size = normalize_page_size(config.page_size);
        let mut view = Self {
            config,
            source: Vec::new(),
            filter_text: String::new(),
            sort: None,
            page_size,
            page: 1,
            matched: 0,
            visible: Vec::new(),
        };
        view.recompute();
        view
    }

    /// Replaces the collection with a fresh fetch. The view keeps its own copy.
    pub fn replace_source(&mut self, records: &[T]) {
        self.source = records.to_vec();
        self.recompute();
    }

    /// Applies a fetch outcome; on failure the last good collection stays.
    pub fn refresh<E: std::fmt::Display>(&mut self, fetched: Result<Vec<T>, E>) -> Result<(), E> {
        match fetched {
            Ok(records) => {
                self.source = records;
                self.recompute();
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, kept = self.source.len(), "refresh failed; keeping previous rows");
                Err(err)
            }
        }
    }

    pub fn set_filter_text(&mut self, text: &str) {
        self.filter_text = text.trim().to_lowercase();
        self.page = 1;
        self.recompute();
    }

    /// Columns outside the sort allow-list are ignored.
    pub fn set_sort(&mut self, column: &str) {
        if !self.config.sort_columns.iter().any(|allowed| allowed == column) {
            warn!(column, "column is not sortable");
            return;
        }
        self.sort = match self.sort.take() {
            Some((current, direction)) if current == column => Some((current, direction.flipped())),
            _ => Some((column.to_string(), SortDirection::Asc)),
        };
        self.page = 1;
        self.recompute();
    }

    pub fn set_page(&mut self, page: usize) {
        self.page = page;
        self.recompute();
    }

    pub fn set_page_size(&mut self, page_size: PageSize) {
        self.page_size = normalize_page_size(page_size);
        self.page = 1;
        self.recompute();
    }

    /// Page links navigate; the ellipsis does nothing.
    pub fn click(&mut self, link: PageLink) {
        if let PageLink::Page(page) = link {
            self.set_page(page);
        }
    }

    pub fn visible(&self) -> &[T] {
        &self.visible
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn page_size(&self) -> PageSize {
        self.page_size
    }

    pub fn filter_text(&self) -> &str {
        &self.filter_text
    }

    pub fn sort(&self) -> Option<(&str, SortDirection)> {
        self.sort
            .as_ref()
            .map(|(column, direction)| (column.as_str(), *direction))
    }

    /// Rows passing the current filter.
    pub fn matched(&self) -> usize {
        self.matched
    }

    pub fn total_pages(&self) -> usize {
        let PageSize::Rows(size) = self.page_size else {
            return 1;
        };
        let count = match self.config.basis {
            PageCountBasis::Source => self.source.len(),
            PageCountBasis::Filtered => self.matched,
        };
        count.div_ceil(size).max(1)
    }

    /// Page links: every page when they fit in the window, otherwise a
    /// window around the current page with the first and last page pinned
    /// and an ellipsis over each gap.
    pub fn pages(&self) -> Vec<PageLink> {
        if self.page_size == PageSize::All {
            return vec![PageLink::Page(1)];
        }

        let total = self.total_pages();
        let window = self.config.window;
        if total <= window {
            return (1..=total).map(PageLink::Page).collect();
        }

        let half = window / 2;
        let mut start = self.page.saturating_sub(half).max(1);
        let mut end = (self.page + half).min(total);
        if start == 1 && end < window {
            end = window;
        } else if end == total && start > total - window + 1 {
            start = total - window + 1;
        }

        let mut links = Vec::with_capacity(window + 4);
        if start > 1 {
            links.push(PageLink::Page(1));
            if start > 2 {
                links.push(PageLink::Ellipsis);
            }
        }
        links.extend((start..=end).map(PageLink::Page));
        if end < total {
            if end < total - 1 {
                links.push(PageLink::Ellipsis);
            }
            links.push(PageLink::Page(total));
        }
        links
    }

    fn recompute(&mut self) {
        let mut rows: Vec<T> = if self.filter_text.is_empty() {
            self.source.clone()
        } else {
            self.source
                .iter()
                .filter(|record| self.matches(record))
                .cloned()
                .collect()
        };
        self.matched = rows.len();

        if let Some((column, direction)) = &self.sort {
            rows.sort_by(|a, b| {
                let ordering = compare_cells(a.cell(column), b.cell(column));
                match direction {
                    SortDirection::Asc => ordering,
                    SortDirection::Desc => ordering.reverse(),
                }
            });
        }

        self.page = self.page.clamp(1, self.total_pages());
        self.visible = match self.page_size {
            PageSize::All => rows,
            PageSize::Rows(size) => rows
                .into_iter()
                .skip((self.page - 1) * size)
                .take(size)
                .collect(),
        };
    }

    fn matches(&self, record: &T) -> bool {
        self.config.filter_columns.iter().any(|column| {
            record
                .cell(column)
                .is_some_and(|value| value.to_lowercase().contains(&self.filter_text))
        })
    }
}

fn normalize_page_size(page_size: PageSize) -> PageSize {
    match page_size {
        PageSize::Rows(0) => PageSize::Rows(1),
        other => other,
    }
}

/// Nulls order after every value; descending reverses the whole ordering,
/// which puts them first.
fn compare_cells(a: Option<String>, b: Option<String>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => a.cmp(&b),
    }
}
