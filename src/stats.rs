//! The report model: library statistics collected for a single run.

use std::cmp::Ordering;

use log::warn;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::error::ReportError;

/// Maximum number of rows kept for the ranked collections.
pub const TOP_N: usize = 10;

/// Number of calendar months in the loan time series, the current one included.
pub const MONTH_WINDOW: usize = 12;

/// Loans started in one calendar month (`YYYY-MM`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MonthlyLoans {
    pub month: String,
    pub count: u64,
}

/// Number of catalogued books in one category.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CategoryCount {
    pub category: String,
    pub count: u64,
}

/// A book together with the number of times it was borrowed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BorrowedBook {
    pub title: String,
    pub author: String,
    pub borrow_count: u64,
}

/// Aggregates exactly as the database returns them.
///
/// Counts are signed and sums nullable because that is what MySQL yields for
/// `COUNT(*)` and `SUM(..)` over an empty table.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawAggregates {
    pub total_books: i64,
    pub total_copies: Option<Decimal>,
    pub available_copies: Option<Decimal>,
    pub total_users: i64,
    pub total_loans: i64,
    pub active_loans: i64,
    pub returned_loans: i64,
    pub overdue_loans: i64,
    pub total_fines: Option<Decimal>,
    pub active_holds: i64,
    pub loans_by_month: Vec<(String, i64)>,
    pub books_by_category: Vec<(String, i64)>,
    pub most_borrowed: Vec<(Option<String>, Option<String>, i64)>,
}

/// Immutable snapshot of the library statistics rendered into a report.
#[derive(Clone, Debug, PartialEq)]
pub struct ReportStatistics {
    total_books: u64,
    total_copies: u64,
    available_copies: u64,
    total_users: u64,
    total_loans: u64,
    active_loans: u64,
    returned_loans: u64,
    overdue_loans: u64,
    active_holds: u64,
    total_fines: Decimal,
    loans_by_month: Vec<MonthlyLoans>,
    books_by_category: Vec<CategoryCount>,
    most_borrowed: Vec<BorrowedBook>,
}

impl ReportStatistics {
    /// Creates a builder with every count at zero and empty collections.
    pub fn builder() -> StatisticsBuilder {
        StatisticsBuilder::default()
    }

    /// Validates raw query results and converts them into the report model.
    ///
    /// NULL sums become zero. Negative or fractional counts and malformed
    /// month labels are rejected as shape errors.
    pub fn from_raw(raw: RawAggregates) -> Result<Self, ReportError> {
        let mut builder = Self::builder()
            .total_books(count("total_books", raw.total_books)?)
            .total_copies(sum_count("total_copies", raw.total_copies)?)
            .available_copies(sum_count("available_copies", raw.available_copies)?)
            .total_users(count("total_users", raw.total_users)?)
            .total_loans(count("total_loans", raw.total_loans)?)
            .active_loans(count("active_loans", raw.active_loans)?)
            .returned_loans(count("returned_loans", raw.returned_loans)?)
            .overdue_loans(count("overdue_loans", raw.overdue_loans)?)
            .active_holds(count("active_holds", raw.active_holds)?)
            .total_fines(raw.total_fines.unwrap_or(Decimal::ZERO));

        for (month, loans) in raw.loans_by_month {
            builder = builder.month(month, count("loans_by_month", loans)?);
        }
        for (category, books) in raw.books_by_category {
            builder = builder.category(category, count("books_by_category", books)?);
        }
        for (title, author, borrows) in raw.most_borrowed {
            builder = builder.borrowed_book(
                title.unwrap_or_default(),
                author.unwrap_or_default(),
                count("most_borrowed", borrows)?,
            );
        }

        builder.build()
    }

    pub fn total_books(&self) -> u64 {
        self.total_books
    }

    pub fn total_copies(&self) -> u64 {
        self.total_copies
    }

    pub fn available_copies(&self) -> u64 {
        self.available_copies
    }

    pub fn total_users(&self) -> u64 {
        self.total_users
    }

    pub fn total_loans(&self) -> u64 {
        self.total_loans
    }

    pub fn active_loans(&self) -> u64 {
        self.active_loans
    }

    pub fn returned_loans(&self) -> u64 {
        self.returned_loans
    }

    pub fn overdue_loans(&self) -> u64 {
        self.overdue_loans
    }

    /// Holds that are still pending or waiting for pickup.
    pub fn active_holds(&self) -> u64 {
        self.active_holds
    }

    /// Sum of all pending fines.
    pub fn total_fines(&self) -> Decimal {
        self.total_fines
    }

    /// Monthly loan counts in chronological order.
    pub fn loans_by_month(&self) -> &[MonthlyLoans] {
        &self.loans_by_month
    }

    /// Largest categories first, at most [`TOP_N`] entries.
    pub fn books_by_category(&self) -> &[CategoryCount] {
        &self.books_by_category
    }

    /// Most borrowed books first, at most [`TOP_N`] entries.
    pub fn most_borrowed(&self) -> &[BorrowedBook] {
        &self.most_borrowed
    }
}

fn count(query: &'static str, value: i64) -> Result<u64, ReportError> {
    u64::try_from(value)
        .map_err(|_| ReportError::shape(query, format!("negative count {value}")))
}

fn sum_count(query: &'static str, value: Option<Decimal>) -> Result<u64, ReportError> {
    let Some(value) = value else {
        return Ok(0);
    };
    if !value.fract().is_zero() {
        return Err(ReportError::shape(query, format!("fractional count {value}")));
    }
    value
        .to_u64()
        .ok_or_else(|| ReportError::shape(query, format!("count {value} out of range")))
}

fn is_month_label(label: &str) -> bool {
    let bytes = label.as_bytes();
    bytes.len() == 7
        && bytes[4] == b'-'
        && bytes[..4].iter().all(u8::is_ascii_digit)
        && bytes[5..].iter().all(u8::is_ascii_digit)
        && label[5..]
            .parse::<u8>()
            .map_or(false, |month| (1..=12).contains(&month))
}

fn by_count_then_label(a_count: u64, a_label: &str, b_count: u64, b_label: &str) -> Ordering {
    b_count.cmp(&a_count).then_with(|| a_label.cmp(b_label))
}

/// Builder for [`ReportStatistics`].
///
/// [`StatisticsBuilder::build`] sorts and caps the collections, so every
/// constructed value satisfies the ordering rules regardless of input order.
#[derive(Clone, Debug, Default)]
pub struct StatisticsBuilder {
    total_books: u64,
    total_copies: u64,
    available_copies: u64,
    total_users: u64,
    total_loans: u64,
    active_loans: u64,
    returned_loans: u64,
    overdue_loans: u64,
    active_holds: u64,
    total_fines: Decimal,
    loans_by_month: Vec<MonthlyLoans>,
    books_by_category: Vec<CategoryCount>,
    most_borrowed: Vec<BorrowedBook>,
}

impl StatisticsBuilder {
    pub fn total_books(mut self, value: u64) -> Self {
        self.total_books = value;
        self
    }

    pub fn total_copies(mut self, value: u64) -> Self {
        self.total_copies = value;
        self
    }

    pub fn available_copies(mut self, value: u64) -> Self {
        self.available_copies = value;
        self
    }

    pub fn total_users(mut self, value: u64) -> Self {
        self.total_users = value;
        self
    }

    pub fn total_loans(mut self, value: u64) -> Self {
        self.total_loans = value;
        self
    }

    pub fn active_loans(mut self, value: u64) -> Self {
        self.active_loans = value;
        self
    }

    pub fn returned_loans(mut self, value: u64) -> Self {
        self.returned_loans = value;
        self
    }

    pub fn overdue_loans(mut self, value: u64) -> Self {
        self.overdue_loans = value;
        self
    }

    pub fn active_holds(mut self, value: u64) -> Self {
        self.active_holds = value;
        self
    }

    pub fn total_fines(mut self, value: Decimal) -> Self {
        self.total_fines = value;
        self
    }

    /// Adds the loan count of one `YYYY-MM` month.
    pub fn month(mut self, month: impl Into<String>, count: u64) -> Self {
        self.loans_by_month.push(MonthlyLoans {
            month: month.into(),
            count,
        });
        self
    }

    pub fn category(mut self, category: impl Into<String>, count: u64) -> Self {
        self.books_by_category.push(CategoryCount {
            category: category.into(),
            count,
        });
        self
    }

    pub fn borrowed_book(
        mut self,
        title: impl Into<String>,
        author: impl Into<String>,
        borrow_count: u64,
    ) -> Self {
        self.most_borrowed.push(BorrowedBook {
            title: title.into(),
            author: author.into(),
            borrow_count,
        });
        self
    }

    /// Validates the collected values and produces the immutable statistics.
    pub fn build(mut self) -> Result<ReportStatistics, ReportError> {
        if self.total_fines.is_sign_negative() && !self.total_fines.is_zero() {
            return Err(ReportError::shape(
                "total_fines",
                format!("negative fine total {}", self.total_fines),
            ));
        }

        if let Some(bad) = self
            .loans_by_month
            .iter()
            .find(|entry| !is_month_label(&entry.month))
        {
            return Err(ReportError::shape(
                "loans_by_month",
                format!("malformed month label {:?}", bad.month),
            ));
        }
        self.loans_by_month.sort_by(|a, b| a.month.cmp(&b.month));
        self.loans_by_month.dedup_by(|later, earlier| {
            if later.month == earlier.month {
                earlier.count += later.count;
                true
            } else {
                false
            }
        });
        if self.loans_by_month.len() > MONTH_WINDOW {
            let excess = self.loans_by_month.len() - MONTH_WINDOW;
            let dropped: Vec<_> = self.loans_by_month.drain(..excess).collect();
            warn!(
                "Dropping {} month(s) outside the {}-month window: {:?}",
                dropped.len(),
                MONTH_WINDOW,
                dropped
            );
        }

        self.books_by_category
            .sort_by(|a, b| by_count_then_label(a.count, &a.category, b.count, &b.category));
        self.books_by_category.truncate(TOP_N);

        self.most_borrowed.sort_by(|a, b| {
            by_count_then_label(a.borrow_count, &a.title, b.borrow_count, &b.title)
        });
        self.most_borrowed.truncate(TOP_N);

        Ok(ReportStatistics {
            total_books: self.total_books,
            total_copies: self.total_copies,
            available_copies: self.available_copies,
            total_users: self.total_users,
            total_loans: self.total_loans,
            active_loans: self.active_loans,
            returned_loans: self.returned_loans,
            overdue_loans: self.overdue_loans,
            active_holds: self.active_holds,
            total_fines: self.total_fines,
            loans_by_month: self.loans_by_month,
            books_by_category: self.books_by_category,
            most_borrowed: self.most_borrowed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_database_yields_zeroes() {
        let stats = ReportStatistics::from_raw(RawAggregates::default()).expect("valid stats");

        assert_eq!(stats.total_books(), 0);
        assert_eq!(stats.total_copies(), 0);
        assert_eq!(stats.available_copies(), 0);
        assert_eq!(stats.total_loans(), 0);
        assert_eq!(stats.overdue_loans(), 0);
        assert_eq!(stats.total_fines(), Decimal::ZERO);
        assert_eq!(format!("{:.2}", stats.total_fines()), "0.00");
        assert!(stats.loans_by_month().is_empty());
        assert!(stats.books_by_category().is_empty());
        assert!(stats.most_borrowed().is_empty());
    }

    #[test]
    fn sums_are_converted_to_counts() {
        let raw = RawAggregates {
            total_copies: Some(Decimal::new(250, 0)),
            available_copies: Some(Decimal::new(180, 0)),
            total_fines: Some(Decimal::new(3750, 2)),
            ..RawAggregates::default()
        };
        let stats = ReportStatistics::from_raw(raw).expect("valid stats");

        assert_eq!(stats.total_copies(), 250);
        assert_eq!(stats.available_copies(), 180);
        assert_eq!(stats.total_fines(), Decimal::new(3750, 2));
    }

    #[test]
    fn negative_count_is_a_shape_error() {
        let raw = RawAggregates {
            active_loans: -1,
            ..RawAggregates::default()
        };
        let err = ReportStatistics::from_raw(raw).unwrap_err();
        assert_eq!(err.kind(), "query_shape");
        assert!(err.to_string().contains("active_loans"));
    }

    #[test]
    fn fractional_copy_sum_is_a_shape_error() {
        let raw = RawAggregates {
            total_copies: Some(Decimal::new(15, 1)),
            ..RawAggregates::default()
        };
        assert_eq!(
            ReportStatistics::from_raw(raw).unwrap_err().kind(),
            "query_shape"
        );
    }

    #[test]
    fn malformed_month_is_rejected() {
        let err = ReportStatistics::builder()
            .month("2024/05", 3)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("malformed month"));
    }

    #[test]
    fn negative_fines_are_rejected() {
        let err = ReportStatistics::builder()
            .total_fines(Decimal::new(-100, 2))
            .build()
            .unwrap_err();
        assert_eq!(err.kind(), "query_shape");
    }

    #[test]
    fn months_are_sorted_chronologically() {
        let stats = ReportStatistics::builder()
            .month("2024-03", 4)
            .month("2023-11", 2)
            .month("2024-01", 7)
            .build()
            .expect("valid stats");

        let months: Vec<_> = stats
            .loans_by_month()
            .iter()
            .map(|entry| entry.month.as_str())
            .collect();
        assert_eq!(months, ["2023-11", "2024-01", "2024-03"]);
    }

    #[test]
    fn full_month_window_is_kept() {
        let months: Vec<(String, i64)> = (0..MONTH_WINDOW)
            .map(|offset| {
                let index = 10 + offset;
                let label = format!("{}-{:02}", 2025 + index / 12, index % 12 + 1);
                (label, offset as i64 + 1)
            })
            .collect();
        let raw = RawAggregates {
            loans_by_month: months,
            ..RawAggregates::default()
        };

        let stats = ReportStatistics::from_raw(raw).expect("valid stats");
        let series = stats.loans_by_month();

        assert_eq!(series.len(), MONTH_WINDOW);
        assert_eq!(series[0].month, "2025-11");
        assert_eq!(series[MONTH_WINDOW - 1].month, "2026-10");
    }

    #[test]
    fn months_beyond_the_window_drop_the_oldest() {
        let mut builder = ReportStatistics::builder().month("2025-10", 99);
        for month in 1..=12 {
            builder = builder.month(format!("2026-{month:02}"), 1);
        }
        let stats = builder.build().expect("valid stats");

        assert_eq!(stats.loans_by_month().len(), MONTH_WINDOW);
        assert_eq!(stats.loans_by_month()[0].month, "2026-01");
    }

    #[test]
    fn categories_are_capped_and_sorted_descending() {
        let mut builder = ReportStatistics::builder();
        for index in 0..15u64 {
            builder = builder.category(format!("Category {index:02}"), index % 7);
        }
        let stats = builder.build().expect("valid stats");
        let categories = stats.books_by_category();

        assert_eq!(categories.len(), TOP_N);
        assert!(categories
            .windows(2)
            .all(|pair| pair[0].count >= pair[1].count));
    }

    #[test]
    fn category_ties_break_deterministically() {
        let build = |order: &[&str]| {
            let mut builder = ReportStatistics::builder();
            for name in order {
                builder = builder.category(*name, 5);
            }
            builder.build().expect("valid stats")
        };

        let first = build(&["Poetry", "History", "Science"]);
        let second = build(&["Science", "Poetry", "History"]);
        assert_eq!(first.books_by_category(), second.books_by_category());
        assert_eq!(first.books_by_category()[0].category, "History");
    }

    #[test]
    fn most_borrowed_keeps_top_ten() {
        let mut raw = RawAggregates::default();
        for index in 0..12i64 {
            raw.most_borrowed.push((
                Some(format!("Title {index}")),
                None,
                index,
            ));
        }
        let stats = ReportStatistics::from_raw(raw).expect("valid stats");

        assert_eq!(stats.most_borrowed().len(), TOP_N);
        assert_eq!(stats.most_borrowed()[0].borrow_count, 11);
        assert_eq!(stats.most_borrowed()[0].author, "");
    }
}
