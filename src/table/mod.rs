/*
 * In-memory opportunity table: stable sorting, clamped pagination and aggregates
 */

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use crate::analytics::{OpportunityFilter, OpportunityStats};
use crate::models::{ArbitrageOpportunity, ArbviewError, Result};

pub const DEFAULT_PAGE_SIZE: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    Timestamp,
    GrossProfit,
    NetProfit,
}

impl SortField {
    /// Value the backend expects in `sort_by`.
    #[must_use]
    pub fn as_query(self) -> &'static str {
        match self {
            SortField::Timestamp => "timestamp",
            SortField::GrossProfit => "gross_profit",
            SortField::NetProfit => "net_profit",
        }
    }

    fn compare(self, a: &ArbitrageOpportunity, b: &ArbitrageOpportunity) -> Ordering {
        match self {
            SortField::Timestamp => a.timestamp.cmp(&b.timestamp),
            SortField::GrossProfit => a.gross_profit.total_cmp(&b.gross_profit),
            SortField::NetProfit => a.net_profit.total_cmp(&b.net_profit),
        }
    }
}

impl fmt::Display for SortField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_query())
    }
}

impl std::str::FromStr for SortField {
    type Err = ArbviewError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "timestamp" | "time" => Ok(SortField::Timestamp),
            "gross_profit" | "grossprofit" | "gross" => Ok(SortField::GrossProfit),
            "net_profit" | "netprofit" | "net" => Ok(SortField::NetProfit),
            _ => Err(ArbviewError::ConfigError(format!("Unknown sort field: {s}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    #[must_use]
    pub fn flipped(self) -> Self {
        match self {
            SortOrder::Asc => SortOrder::Desc,
            SortOrder::Desc => SortOrder::Asc,
        }
    }

    #[must_use]
    pub fn as_query(self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

impl std::str::FromStr for SortOrder {
    type Err = ArbviewError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "asc" | "ascending" => Ok(SortOrder::Asc),
            "desc" | "descending" => Ok(SortOrder::Desc),
            _ => Err(ArbviewError::ConfigError(format!("Unknown sort order: {s}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: SortField,
    pub order: SortOrder,
}

impl Default for SortSpec {
    fn default() -> Self {
        Self {
            field: SortField::NetProfit,
            order: SortOrder::Desc,
        }
    }
}

impl SortSpec {
    #[must_use]
    pub fn new(field: SortField, order: SortOrder) -> Self {
        Self { field, order }
    }

    /// Header click: repeat flips the order, a new field starts descending.
    pub fn toggle(&mut self, field: SortField) {
        if self.field == field {
            self.order = self.order.flipped();
        } else {
            self.field = field;
            self.order = SortOrder::Desc;
        }
    }
}

/// Stably sorted copy of `items`. Equal keys keep their input order in both directions.
#[must_use]
pub fn sort_opportunities(items: &[ArbitrageOpportunity], spec: SortSpec) -> Vec<ArbitrageOpportunity> {
    let mut sorted = items.to_vec();
    sorted.sort_by(|a, b| match spec.order {
        SortOrder::Asc => spec.field.compare(a, b),
        SortOrder::Desc => spec.field.compare(b, a),
    });
    sorted
}

#[must_use]
pub fn page_count(total: usize, page_size: usize) -> usize {
    total.div_ceil(page_size.max(1))
}

/// Clamps a 1-based page number into `[1, max(page_count, 1)]`.
#[must_use]
pub fn clamp_page(page: usize, page_count: usize) -> usize {
    page.clamp(1, page_count.max(1))
}

#[derive(Debug, Clone, PartialEq)]
pub struct Page<'a> {
    pub rows: &'a [ArbitrageOpportunity],
    pub number: usize,
    pub page_count: usize,
    pub page_size: usize,
    pub total: usize,
}

impl Page<'_> {
    #[must_use]
    pub fn has_next(&self) -> bool {
        self.number < self.page_count
    }

    #[must_use]
    pub fn has_prev(&self) -> bool {
        self.number > 1
    }

    /// 1-based index range shown in "Showing x to y of z".
    #[must_use]
    pub fn bounds(&self) -> (usize, usize) {
        if self.rows.is_empty() {
            return (0, 0);
        }
        let start = (self.number - 1) * self.page_size + 1;
        (start, start + self.rows.len() - 1)
    }
}

#[derive(Debug, Clone)]
pub struct OpportunityTable {
    source: Vec<ArbitrageOpportunity>,
    view: Vec<ArbitrageOpportunity>,
    filter: OpportunityFilter,
    sort: SortSpec,
    page_size: usize,
    current_page: usize,
}

impl OpportunityTable {
    #[must_use]
    pub fn new(items: Vec<ArbitrageOpportunity>, page_size: usize) -> Self {
        let mut table = Self {
            source: items,
            view: Vec::new(),
            filter: OpportunityFilter::default(),
            sort: SortSpec::default(),
            page_size: page_size.max(1),
            current_page: 1,
        };
        table.rebuild();
        table
    }

    #[must_use]
    pub fn with_sort(mut self, sort: SortSpec) -> Self {
        self.sort = sort;
        self.rebuild();
        self
    }

    #[must_use]
    pub fn with_filter(mut self, filter: OpportunityFilter) -> Self {
        self.filter = filter;
        self.rebuild();
        self
    }

    fn rebuild(&mut self) {
        let filtered: Vec<ArbitrageOpportunity> = self
            .source
            .iter()
            .filter(|opp| self.filter.matches(opp))
            .cloned()
            .collect();
        self.view = sort_opportunities(&filtered, self.sort);
        self.current_page = clamp_page(self.current_page, self.page_count());
    }

    pub fn toggle_sort(&mut self, field: SortField) {
        self.sort.toggle(field);
        self.rebuild();
    }

    pub fn set_sort(&mut self, sort: SortSpec) {
        self.sort = sort;
        self.rebuild();
    }

    pub fn set_filter(&mut self, filter: OpportunityFilter) {
        self.filter = filter;
        self.rebuild();
    }

    #[must_use]
    pub fn sort(&self) -> SortSpec {
        self.sort
    }

    #[must_use]
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.view.len()
    }

    #[must_use]
    pub fn page_count(&self) -> usize {
        page_count(self.view.len(), self.page_size)
    }

    #[must_use]
    pub fn current_page(&self) -> usize {
        self.current_page
    }

    /// Filtered and sorted rows across all pages.
    #[must_use]
    pub fn rows(&self) -> &[ArbitrageOpportunity] {
        &self.view
    }

    /// Moves to `page`, clamped, and returns the page actually selected.
    pub fn go_to(&mut self, page: usize) -> usize {
        self.current_page = clamp_page(page, self.page_count());
        self.current_page
    }

    pub fn next_page(&mut self) -> usize {
        self.go_to(self.current_page + 1)
    }

    pub fn prev_page(&mut self) -> usize {
        self.go_to(self.current_page.saturating_sub(1))
    }

    #[must_use]
    pub fn page(&self) -> Page<'_> {
        self.page_at(self.current_page)
    }

    /// Slice for `page` (clamped) without moving the cursor.
    #[must_use]
    pub fn page_at(&self, page: usize) -> Page<'_> {
        let page_count = self.page_count();
        let number = clamp_page(page, page_count);
        let start = ((number - 1) * self.page_size).min(self.view.len());
        let end = (start + self.page_size).min(self.view.len());

        Page {
            rows: &self.view[start..end],
            number,
            page_count,
            page_size: self.page_size,
            total: self.view.len(),
        }
    }

    /// Aggregates over every filtered row, independent of the current page.
    #[must_use]
    pub fn stats(&self) -> OpportunityStats {
        OpportunityStats::compute(&self.view)
    }
}
