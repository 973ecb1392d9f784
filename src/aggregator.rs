//! Read-only statistics queries against the library database.

use log::debug;
use rust_decimal::Decimal;
use sqlx::mysql::MySqlConnection;
use sqlx::{Connection, Executor};

use crate::error::ReportError;
use crate::stats::{RawAggregates, ReportStatistics};

const TOTAL_BOOKS: &str = "SELECT COUNT(*) FROM books";
const TOTAL_COPIES: &str = "SELECT SUM(total_copies) FROM books";
const AVAILABLE_COPIES: &str = "SELECT SUM(available_copies) FROM books";
const TOTAL_USERS: &str = "SELECT COUNT(*) FROM users WHERE role = 'user'";
const TOTAL_LOANS: &str = "SELECT COUNT(*) FROM loans";
const ACTIVE_LOANS: &str = "SELECT COUNT(*) FROM loans WHERE status = 'active'";
const RETURNED_LOANS: &str = "SELECT COUNT(*) FROM loans WHERE status = 'returned'";
const OVERDUE_LOANS: &str =
    "SELECT COUNT(*) FROM loans WHERE status = 'active' AND due_date < CURDATE()";
const PENDING_FINES: &str = "SELECT SUM(amount) FROM fines WHERE status = 'pending'";
const ACTIVE_HOLDS: &str =
    "SELECT COUNT(*) FROM holds WHERE status IN ('pending', 'available')";

/// Loans grouped per month, from the first day of the month eleven months
/// back through today: the current month plus the eleven before it.
const LOANS_BY_MONTH: &str = "\
    SELECT CAST(DATE_FORMAT(loan_date, '%Y-%m') AS CHAR) AS month, COUNT(*) AS count \
    FROM loans \
    WHERE loan_date >= DATE_FORMAT(DATE_SUB(CURDATE(), INTERVAL 11 MONTH), '%Y-%m-01') \
    GROUP BY month \
    ORDER BY month";

const BOOKS_BY_CATEGORY: &str = "\
    SELECT category, COUNT(*) AS count \
    FROM books \
    WHERE category IS NOT NULL \
    GROUP BY category \
    ORDER BY count DESC, category ASC \
    LIMIT 10";

const MOST_BORROWED: &str = "\
    SELECT b.title, b.author, COUNT(l.id) AS borrow_count \
    FROM books b \
    LEFT JOIN loans l ON b.id = l.book_id \
    GROUP BY b.id, b.title, b.author \
    ORDER BY borrow_count DESC, b.title ASC, b.id ASC \
    LIMIT 10";

/// Runs the fixed statistics queries on one connection.
///
/// All queries execute inside a single read-only `REPEATABLE READ`
/// transaction, so on InnoDB the report reflects one consistent snapshot.
pub struct StatisticsAggregator<'c> {
    connection: &'c mut MySqlConnection,
}

impl<'c> StatisticsAggregator<'c> {
    pub fn new(connection: &'c mut MySqlConnection) -> Self {
        Self { connection }
    }

    /// Collects every aggregate and converts them into [`ReportStatistics`].
    pub async fn collect(self) -> Result<ReportStatistics, ReportError> {
        self.connection
            .execute("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .await
            .map_err(|source| ReportError::Query {
                query: "snapshot",
                source,
            })?;
        let mut tx = self
            .connection
            .begin()
            .await
            .map_err(|source| ReportError::Query {
                query: "snapshot",
                source,
            })?;

        let raw = RawAggregates {
            total_books: scalar_count(&mut tx, "total_books", TOTAL_BOOKS).await?,
            total_copies: scalar_sum(&mut tx, "total_copies", TOTAL_COPIES).await?,
            available_copies: scalar_sum(&mut tx, "available_copies", AVAILABLE_COPIES).await?,
            total_users: scalar_count(&mut tx, "total_users", TOTAL_USERS).await?,
            total_loans: scalar_count(&mut tx, "total_loans", TOTAL_LOANS).await?,
            active_loans: scalar_count(&mut tx, "active_loans", ACTIVE_LOANS).await?,
            returned_loans: scalar_count(&mut tx, "returned_loans", RETURNED_LOANS).await?,
            overdue_loans: scalar_count(&mut tx, "overdue_loans", OVERDUE_LOANS).await?,
            total_fines: scalar_sum(&mut tx, "total_fines", PENDING_FINES).await?,
            active_holds: scalar_count(&mut tx, "active_holds", ACTIVE_HOLDS).await?,
            loans_by_month: sqlx::query_as::<_, (String, i64)>(LOANS_BY_MONTH)
                .fetch_all(&mut *tx)
                .await
                .map_err(|err| ReportError::from_query("loans_by_month", err))?,
            books_by_category: sqlx::query_as::<_, (String, i64)>(BOOKS_BY_CATEGORY)
                .fetch_all(&mut *tx)
                .await
                .map_err(|err| ReportError::from_query("books_by_category", err))?,
            most_borrowed: sqlx::query_as::<_, (Option<String>, Option<String>, i64)>(
                MOST_BORROWED,
            )
            .fetch_all(&mut *tx)
            .await
            .map_err(|err| ReportError::from_query("most_borrowed", err))?,
        };

        tx.commit().await.map_err(|source| ReportError::Query {
            query: "snapshot",
            source,
        })?;

        debug!(
            "Fetched {} monthly, {} category and {} most-borrowed rows",
            raw.loans_by_month.len(),
            raw.books_by_category.len(),
            raw.most_borrowed.len()
        );

        ReportStatistics::from_raw(raw)
    }
}

async fn scalar_count(
    connection: &mut MySqlConnection,
    name: &'static str,
    sql: &'static str,
) -> Result<i64, ReportError> {
    let value = sqlx::query_scalar::<_, i64>(sql)
        .fetch_one(&mut *connection)
        .await
        .map_err(|err| ReportError::from_query(name, err))?;
    debug!("{name} = {value}");
    Ok(value)
}

async fn scalar_sum(
    connection: &mut MySqlConnection,
    name: &'static str,
    sql: &'static str,
) -> Result<Option<Decimal>, ReportError> {
    let value = sqlx::query_scalar::<_, Option<Decimal>>(sql)
        .fetch_one(&mut *connection)
        .await
        .map_err(|err| ReportError::from_query(name, err))?;
    debug!("{name} = {value:?}");
    Ok(value)
}
