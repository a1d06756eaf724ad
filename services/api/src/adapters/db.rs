//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, the concrete implementation of
//! the `LibraryStore`, `NotificationSink` and `ActivityLog` ports from the
//! `core` crate. It handles all interactions with the SQLite database using
//! `sqlx`.
//!
//! Every state-changing ledger operation opens its own transaction and issues
//! a write as its first statement, so SQLite takes the write lock up front and
//! concurrent callers queue behind it instead of racing on stale reads.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use library_core::domain::{
    ActivityEntry, ActivityEvent, Book, BookAvailability, BookDraft, BookId, Fine, FineDetails,
    FineFilter, FineId, FineStatus, FineSummary, IssueReceipt, Loan, LoanDetails, LoanFilter,
    LoanId, LoanState, LoanStatusFilter, LoanSummary, Member, MemberDraft, MemberId,
    MemberSummary, Notification, NotificationId, PaymentOutcome, Reservation, ReservationDetails,
    ReservationId, ReserveOutcome, ReturnOutcome, Role,
};
use library_core::policy;
use library_core::ports::{ActivityLog, LibraryStore, NotificationSink, PortError, PortResult};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool};

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the store ports.
#[derive(Clone)]
pub struct DbAdapter {
    pool: SqlitePool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

//=========================================================================================
// Error Mapping
//=========================================================================================

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

/// SQLite reports a foreign key blocked by a `RESTRICT` action as
/// `SQLITE_CONSTRAINT_TRIGGER` (1811) rather than `SQLITE_CONSTRAINT_FOREIGNKEY`.
fn is_foreign_key_failure(db_err: &dyn sqlx::error::DatabaseError) -> bool {
    db_err.is_foreign_key_violation()
        || db_err.code().as_deref() == Some("1811")
        || db_err.message().contains("FOREIGN KEY constraint failed")
}

/// Maps constraint violations onto the business error taxonomy; anything
/// else is a store fault.
fn constraint_error(e: sqlx::Error, what: &str) -> PortError {
    if let sqlx::Error::Database(db_err) = &e {
        if is_foreign_key_failure(db_err.as_ref()) {
            return PortError::Conflict(format!("{} is still referenced by other records", what));
        }
        if db_err.is_unique_violation() {
            return PortError::Conflict(format!("{} already exists", what));
        }
        if db_err.is_check_violation() {
            return PortError::Validation(format!("{} failed a validity check", what));
        }
    }
    unexpected(e)
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

const BOOK_SELECT: &str = "SELECT b.book_id, b.title, b.author_name, b.category, b.publisher, \
     b.year, b.edition, b.total_stock, \
     (SELECT COUNT(*) FROM issued_books ib \
      WHERE ib.book_id = b.book_id AND ib.return_date IS NULL) AS active_loans \
     FROM book_db b";

#[derive(FromRow)]
struct BookRecord {
    book_id: i64,
    title: String,
    author_name: String,
    category: String,
    publisher: String,
    year: i32,
    edition: String,
    total_stock: i64,
    active_loans: i64,
}
impl BookRecord {
    fn to_domain(self) -> BookAvailability {
        BookAvailability {
            available_copies: policy::available_copies(self.total_stock, self.active_loans),
            active_loans: self.active_loans,
            book: Book {
                id: self.book_id,
                title: self.title,
                author: self.author_name,
                category: self.category,
                publisher: self.publisher,
                year: self.year,
                edition: self.edition,
                total_stock: self.total_stock,
            },
        }
    }
}

const MEMBER_SELECT: &str =
    "SELECT member_id, first_name, last_name, address, mob_no, email_id, role FROM member_db";

#[derive(FromRow)]
struct MemberRecord {
    member_id: i64,
    first_name: String,
    last_name: String,
    address: String,
    mob_no: String,
    email_id: String,
    role: String,
}
impl MemberRecord {
    fn to_domain(self) -> PortResult<Member> {
        let role = self.role.parse::<Role>().map_err(PortError::Unexpected)?;
        Ok(Member {
            id: self.member_id,
            first_name: self.first_name,
            last_name: self.last_name,
            address: self.address,
            mob_no: self.mob_no,
            email: self.email_id,
            role,
        })
    }
}

#[derive(FromRow)]
struct ReservationRecord {
    reservation_id: i64,
    member_id: i64,
    book_id: i64,
    reserved_date: DateTime<Utc>,
}
impl ReservationRecord {
    fn to_domain(self) -> Reservation {
        Reservation {
            id: self.reservation_id,
            member_id: self.member_id,
            book_id: self.book_id,
            reserved_at: self.reserved_date,
        }
    }
}

const RESERVATION_DETAILS_SELECT: &str = "SELECT r.reservation_id, r.member_id, r.book_id, \
     r.reserved_date, b.title, b.author_name, m.first_name || ' ' || m.last_name AS member_name \
     FROM reservations r \
     JOIN book_db b ON r.book_id = b.book_id \
     JOIN member_db m ON r.member_id = m.member_id \
     WHERE r.status = 'active'";

#[derive(FromRow)]
struct ReservationDetailsRecord {
    reservation_id: i64,
    member_id: i64,
    book_id: i64,
    reserved_date: DateTime<Utc>,
    title: String,
    author_name: String,
    member_name: String,
}
impl ReservationDetailsRecord {
    fn to_domain(self) -> ReservationDetails {
        ReservationDetails {
            reservation: Reservation {
                id: self.reservation_id,
                member_id: self.member_id,
                book_id: self.book_id,
                reserved_at: self.reserved_date,
            },
            book_title: self.title,
            book_author: self.author_name,
            member_name: self.member_name,
        }
    }
}

#[derive(FromRow)]
struct LoanRecord {
    issue_id: i64,
    member_id: i64,
    book_id: i64,
    issue_date: NaiveDate,
    due_date: NaiveDate,
    return_date: Option<NaiveDate>,
}
impl LoanRecord {
    fn to_domain(self) -> Loan {
        Loan {
            id: self.issue_id,
            member_id: self.member_id,
            book_id: self.book_id,
            issue_date: self.issue_date,
            due_date: self.due_date,
            state: LoanState::from_return_date(self.return_date),
        }
    }
}

const LOAN_DETAILS_SELECT: &str = "SELECT ib.issue_id, ib.member_id, ib.book_id, ib.issue_date, \
     ib.due_date, ib.return_date, b.title, m.first_name || ' ' || m.last_name AS member_name, \
     f.fine_id, f.fine_amount, f.days_late, f.status AS fine_status, f.fine_date, f.payment_date \
     FROM issued_books ib \
     JOIN book_db b ON ib.book_id = b.book_id \
     JOIN member_db m ON ib.member_id = m.member_id \
     LEFT JOIN fines f ON ib.issue_id = f.issue_id \
     WHERE 1=1";

#[derive(FromRow)]
struct LoanDetailsRecord {
    issue_id: i64,
    member_id: i64,
    book_id: i64,
    issue_date: NaiveDate,
    due_date: NaiveDate,
    return_date: Option<NaiveDate>,
    title: String,
    member_name: String,
    fine_id: Option<i64>,
    fine_amount: Option<i64>,
    days_late: Option<i64>,
    fine_status: Option<String>,
    fine_date: Option<NaiveDate>,
    payment_date: Option<NaiveDate>,
}
impl LoanDetailsRecord {
    fn to_domain(self, today: NaiveDate) -> PortResult<LoanDetails> {
        // Active loans are measured against today, returned ones against
        // the day they came back.
        let days_overdue = policy::days_late(self.due_date, self.return_date.unwrap_or(today));

        let fine = match (
            self.fine_id,
            self.fine_amount,
            self.days_late,
            self.fine_status,
            self.fine_date,
        ) {
            (Some(id), Some(amount), Some(days_late), Some(status), Some(fine_date)) => {
                Some(Fine {
                    id,
                    loan_id: self.issue_id,
                    amount,
                    days_late,
                    status: status.parse::<FineStatus>().map_err(PortError::Unexpected)?,
                    fine_date,
                    payment_date: self.payment_date,
                })
            }
            _ => None,
        };

        Ok(LoanDetails {
            loan: Loan {
                id: self.issue_id,
                member_id: self.member_id,
                book_id: self.book_id,
                issue_date: self.issue_date,
                due_date: self.due_date,
                state: LoanState::from_return_date(self.return_date),
            },
            book_title: self.title,
            member_name: self.member_name,
            days_overdue,
            fine,
        })
    }
}

/// Narrows a details query (member joined as `m`) to names containing `term`.
fn push_member_name(query: &mut QueryBuilder<'_, Sqlite>, term: Option<&str>) {
    let Some(term) = term.map(str::trim).filter(|t| !t.is_empty()) else {
        return;
    };
    query
        .push(" AND (m.first_name || ' ' || m.last_name) LIKE ")
        .push_bind(format!("%{}%", term));
}

const FINE_DETAILS_SELECT: &str = "SELECT f.fine_id, f.issue_id, f.fine_amount, f.days_late, \
     f.status, f.fine_date, f.payment_date, ib.book_id, ib.member_id, \
     m.first_name || ' ' || m.last_name AS member_name, b.title \
     FROM fines f \
     JOIN issued_books ib ON f.issue_id = ib.issue_id \
     JOIN member_db m ON ib.member_id = m.member_id \
     JOIN book_db b ON ib.book_id = b.book_id \
     WHERE 1=1";

#[derive(FromRow)]
struct FineDetailsRecord {
    fine_id: i64,
    issue_id: i64,
    fine_amount: i64,
    days_late: i64,
    status: String,
    fine_date: NaiveDate,
    payment_date: Option<NaiveDate>,
    book_id: i64,
    member_id: i64,
    member_name: String,
    title: String,
}
impl FineDetailsRecord {
    fn to_domain(self) -> PortResult<FineDetails> {
        Ok(FineDetails {
            fine: Fine {
                id: self.fine_id,
                loan_id: self.issue_id,
                amount: self.fine_amount,
                days_late: self.days_late,
                status: self.status.parse::<FineStatus>().map_err(PortError::Unexpected)?,
                fine_date: self.fine_date,
                payment_date: self.payment_date,
            },
            book_id: self.book_id,
            member_id: self.member_id,
            member_name: self.member_name,
            book_title: self.title,
        })
    }
}

#[derive(FromRow)]
struct NotificationRecord {
    id: i64,
    user_id: i64,
    message: String,
    created_at: DateTime<Utc>,
    is_read: bool,
}
impl NotificationRecord {
    fn to_domain(self) -> Notification {
        Notification {
            id: self.id,
            member_id: self.user_id,
            message: self.message,
            created_at: self.created_at,
            is_read: self.is_read,
        }
    }
}

#[derive(FromRow)]
struct ActivityRecord {
    id: i64,
    user_id: i64,
    action: String,
    book_id: i64,
    occurred_at: DateTime<Utc>,
    title: Option<String>,
}
impl ActivityRecord {
    fn to_domain(self) -> PortResult<ActivityEntry> {
        Ok(ActivityEntry {
            id: self.id,
            event: ActivityEvent {
                kind: self.action.parse().map_err(PortError::Unexpected)?,
                book_id: self.book_id,
                member_id: self.user_id,
                occurred_at: self.occurred_at,
            },
            book_title: self.title,
        })
    }
}

#[derive(FromRow)]
struct MemberSummaryRecord {
    total_loans: i64,
    active_loans: i64,
    overdue_loans: i64,
    pending_fines_amount: i64,
}

#[derive(FromRow)]
struct LoanSummaryRecord {
    total: i64,
    active: i64,
    returned: i64,
    overdue: i64,
}

#[derive(FromRow)]
struct FineSummaryRecord {
    total: i64,
    pending: i64,
    paid: i64,
    pending_amount: i64,
}

//=========================================================================================
// `LibraryStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl LibraryStore for DbAdapter {
    async fn create_book(&self, draft: &BookDraft) -> PortResult<Book> {
        let result = sqlx::query(
            "INSERT INTO book_db \
             (title, author_name, category, publisher, year, edition, total_stock) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&draft.title)
        .bind(&draft.author)
        .bind(&draft.category)
        .bind(&draft.publisher)
        .bind(draft.year)
        .bind(&draft.edition)
        .bind(draft.total_stock)
        .execute(&self.pool)
        .await
        .map_err(|e| constraint_error(e, "Book"))?;

        Ok(self.get_book(result.last_insert_rowid()).await?.book)
    }

    async fn update_book(&self, book_id: BookId, draft: &BookDraft) -> PortResult<Book> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;

        // The stock may never drop below the copies currently out on loan.
        let result = sqlx::query(
            "UPDATE book_db SET title = ?, author_name = ?, category = ?, publisher = ?, \
             year = ?, edition = ?, total_stock = ? \
             WHERE book_id = ? AND ? >= (SELECT COUNT(*) FROM issued_books \
                 WHERE book_id = ? AND return_date IS NULL)",
        )
        .bind(&draft.title)
        .bind(&draft.author)
        .bind(&draft.category)
        .bind(&draft.publisher)
        .bind(draft.year)
        .bind(&draft.edition)
        .bind(draft.total_stock)
        .bind(book_id)
        .bind(draft.total_stock)
        .bind(book_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| constraint_error(e, "Book"))?;

        let record =
            sqlx::query_as::<_, BookRecord>(&format!("{} WHERE b.book_id = ?", BOOK_SELECT))
                .bind(book_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(unexpected)?
                .ok_or_else(|| PortError::NotFound(format!("Book {} not found", book_id)))?;

        if result.rows_affected() == 0 {
            return Err(PortError::Conflict(format!(
                "Cannot set stock of '{}' to {}: {} copies are on loan",
                record.title, draft.total_stock, record.active_loans
            )));
        }

        tx.commit().await.map_err(unexpected)?;
        Ok(record.to_domain().book)
    }

    async fn delete_book(&self, book_id: BookId) -> PortResult<()> {
        let result = sqlx::query("DELETE FROM book_db WHERE book_id = ?")
            .bind(book_id)
            .execute(&self.pool)
            .await
            .map_err(|e| constraint_error(e, &format!("Book {}", book_id)))?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Book {} not found", book_id)));
        }
        Ok(())
    }

    async fn get_book(&self, book_id: BookId) -> PortResult<BookAvailability> {
        let record =
            sqlx::query_as::<_, BookRecord>(&format!("{} WHERE b.book_id = ?", BOOK_SELECT))
                .bind(book_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(unexpected)?
                .ok_or_else(|| PortError::NotFound(format!("Book {} not found", book_id)))?;
        Ok(record.to_domain())
    }

    async fn list_books(&self, search: Option<&str>) -> PortResult<Vec<BookAvailability>> {
        let mut query = QueryBuilder::<Sqlite>::new(BOOK_SELECT);
        if let Some(term) = search.map(str::trim).filter(|t| !t.is_empty()) {
            let pattern = format!("%{}%", term);
            query
                .push(" WHERE b.title LIKE ")
                .push_bind(pattern.clone())
                .push(" OR b.author_name LIKE ")
                .push_bind(pattern.clone())
                .push(" OR b.category LIKE ")
                .push_bind(pattern);
        }
        query.push(" ORDER BY b.title ASC");

        let records = query
            .build_query_as::<BookRecord>()
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn create_member(
        &self,
        draft: &MemberDraft,
        credential_hash: &str,
    ) -> PortResult<Member> {
        let result = sqlx::query(
            "INSERT INTO member_db \
             (first_name, last_name, address, mob_no, email_id, password, role) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&draft.first_name)
        .bind(&draft.last_name)
        .bind(&draft.address)
        .bind(&draft.mob_no)
        .bind(&draft.email)
        .bind(credential_hash)
        .bind(draft.role.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| constraint_error(e, "A member with this mobile number"))?;

        self.get_member(result.last_insert_rowid()).await
    }

    async fn get_member(&self, member_id: MemberId) -> PortResult<Member> {
        sqlx::query_as::<_, MemberRecord>(&format!("{} WHERE member_id = ?", MEMBER_SELECT))
            .bind(member_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(unexpected)?
            .ok_or_else(|| PortError::NotFound(format!("Member {} not found", member_id)))?
            .to_domain()
    }

    async fn list_members(&self) -> PortResult<Vec<Member>> {
        let records = sqlx::query_as::<_, MemberRecord>(&format!(
            "{} ORDER BY last_name ASC, first_name ASC",
            MEMBER_SELECT
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        records.into_iter().map(|r| r.to_domain()).collect()
    }

    async fn update_member(&self, member_id: MemberId, draft: &MemberDraft) -> PortResult<Member> {
        let result = sqlx::query(
            "UPDATE member_db SET first_name = ?, last_name = ?, address = ?, mob_no = ?, \
             email_id = ?, role = ? WHERE member_id = ?",
        )
        .bind(&draft.first_name)
        .bind(&draft.last_name)
        .bind(&draft.address)
        .bind(&draft.mob_no)
        .bind(&draft.email)
        .bind(draft.role.as_str())
        .bind(member_id)
        .execute(&self.pool)
        .await
        .map_err(|e| constraint_error(e, "A member with this mobile number"))?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Member {} not found", member_id)));
        }
        self.get_member(member_id).await
    }

    async fn delete_member(&self, member_id: MemberId) -> PortResult<()> {
        let result = sqlx::query("DELETE FROM member_db WHERE member_id = ?")
            .bind(member_id)
            .execute(&self.pool)
            .await
            .map_err(|e| constraint_error(e, &format!("Member {}", member_id)))?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Member {} not found", member_id)));
        }
        Ok(())
    }

    async fn list_admin_ids(&self) -> PortResult<Vec<MemberId>> {
        sqlx::query_scalar::<_, i64>("SELECT member_id FROM member_db WHERE role = 'admin'")
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)
    }

    async fn member_summary(
        &self,
        member_id: MemberId,
        today: NaiveDate,
    ) -> PortResult<MemberSummary> {
        let record = sqlx::query_as::<_, MemberSummaryRecord>(
            "SELECT \
             (SELECT COUNT(*) FROM issued_books WHERE member_id = ?) AS total_loans, \
             (SELECT COUNT(*) FROM issued_books WHERE member_id = ? \
                 AND return_date IS NULL) AS active_loans, \
             (SELECT COUNT(*) FROM issued_books WHERE member_id = ? AND return_date IS NULL \
                 AND due_date < ?) AS overdue_loans, \
             (SELECT COALESCE(SUM(f.fine_amount), 0) FROM fines f \
                 JOIN issued_books ib ON f.issue_id = ib.issue_id \
                 WHERE ib.member_id = ? AND f.status = 'Pending') AS pending_fines_amount",
        )
        .bind(member_id)
        .bind(member_id)
        .bind(member_id)
        .bind(today)
        .bind(member_id)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(MemberSummary {
            total_loans: record.total_loans,
            active_loans: record.active_loans,
            overdue_loans: record.overdue_loans,
            pending_fines_amount: record.pending_fines_amount,
        })
    }

    async fn create_reservation(
        &self,
        member_id: MemberId,
        book_id: BookId,
    ) -> PortResult<ReserveOutcome> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;

        // The partial unique index turns a duplicate into a silent no-op.
        let result = sqlx::query(
            "INSERT OR IGNORE INTO reservations (member_id, book_id, status, reserved_date) \
             VALUES (?, ?, 'active', ?)",
        )
        .bind(member_id)
        .bind(book_id)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(db_err) = &e {
                if is_foreign_key_failure(db_err.as_ref()) {
                    return PortError::NotFound(format!(
                        "Member {} or book {} not found",
                        member_id, book_id
                    ));
                }
            }
            unexpected(e)
        })?;

        let record = sqlx::query_as::<_, ReservationRecord>(
            "SELECT reservation_id, member_id, book_id, reserved_date FROM reservations \
             WHERE member_id = ? AND book_id = ? AND status = 'active'",
        )
        .bind(member_id)
        .bind(book_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(unexpected)?;

        tx.commit().await.map_err(unexpected)?;

        if result.rows_affected() == 1 {
            Ok(ReserveOutcome::Created(record.to_domain()))
        } else {
            Ok(ReserveOutcome::AlreadyActive(record.to_domain()))
        }
    }

    async fn get_reservation(&self, reservation_id: ReservationId) -> PortResult<Reservation> {
        let record = sqlx::query_as::<_, ReservationRecord>(
            "SELECT reservation_id, member_id, book_id, reserved_date FROM reservations \
             WHERE reservation_id = ? AND status = 'active'",
        )
        .bind(reservation_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?
        .ok_or_else(|| {
            PortError::NotFound(format!("Reservation {} not found", reservation_id))
        })?;
        Ok(record.to_domain())
    }

    async fn delete_reservation(&self, reservation_id: ReservationId) -> PortResult<()> {
        let result = sqlx::query("DELETE FROM reservations WHERE reservation_id = ?")
            .bind(reservation_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!(
                "Reservation {} not found",
                reservation_id
            )));
        }
        Ok(())
    }

    async fn list_reservations_for_member(
        &self,
        member_id: MemberId,
    ) -> PortResult<Vec<ReservationDetails>> {
        let records = sqlx::query_as::<_, ReservationDetailsRecord>(&format!(
            "{} AND r.member_id = ? ORDER BY r.reserved_date DESC, r.reservation_id DESC",
            RESERVATION_DETAILS_SELECT
        ))
        .bind(member_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn list_reservations_for_book(
        &self,
        book_id: BookId,
    ) -> PortResult<Vec<ReservationDetails>> {
        let records = sqlx::query_as::<_, ReservationDetailsRecord>(&format!(
            "{} AND r.book_id = ? ORDER BY r.reserved_date ASC, r.reservation_id ASC",
            RESERVATION_DETAILS_SELECT
        ))
        .bind(book_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn list_active_reservations(&self) -> PortResult<Vec<ReservationDetails>> {
        let records = sqlx::query_as::<_, ReservationDetailsRecord>(&format!(
            "{} ORDER BY r.reserved_date ASC, r.reservation_id ASC",
            RESERVATION_DETAILS_SELECT
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn count_active_reservations(&self) -> PortResult<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM reservations WHERE status = 'active'")
            .fetch_one(&self.pool)
            .await
            .map_err(unexpected)
    }

    async fn issue_loan(
        &self,
        member_id: MemberId,
        book_id: BookId,
        today: NaiveDate,
        require_reservation: bool,
    ) -> PortResult<IssueReceipt> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;

        // Issuing consumes any pending request for the same pair. Being a
        // write, this also takes the database write lock for the rest of the
        // transaction.
        let fulfilled = sqlx::query(
            "DELETE FROM reservations WHERE member_id = ? AND book_id = ? AND status = 'active'",
        )
        .bind(member_id)
        .bind(book_id)
        .execute(&mut *tx)
        .await
        .map_err(unexpected)?
        .rows_affected()
            > 0;

        if require_reservation && !fulfilled {
            return Err(PortError::NotFound(format!(
                "No active reservation of book {} by member {}",
                book_id, member_id
            )));
        }

        let member_exists =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM member_db WHERE member_id = ?")
                .bind(member_id)
                .fetch_one(&mut *tx)
                .await
                .map_err(unexpected)?;
        if member_exists == 0 {
            return Err(PortError::NotFound(format!("Member {} not found", member_id)));
        }

        let title = sqlx::query_scalar::<_, String>("SELECT title FROM book_db WHERE book_id = ?")
            .bind(book_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(unexpected)?
            .ok_or_else(|| PortError::NotFound(format!("Book {} not found", book_id)))?;

        // The availability check and the insert are one statement, so the
        // check can never go stale before the row lands.
        let due_date = policy::due_date_for(today);
        let inserted = sqlx::query(
            "INSERT INTO issued_books (member_id, book_id, issue_date, due_date, return_date) \
             SELECT ?, ?, ?, ?, NULL \
             WHERE (SELECT COUNT(*) FROM issued_books WHERE book_id = ? AND return_date IS NULL) \
                 < (SELECT total_stock FROM book_db WHERE book_id = ?)",
        )
        .bind(member_id)
        .bind(book_id)
        .bind(today)
        .bind(due_date)
        .bind(book_id)
        .bind(book_id)
        .execute(&mut *tx)
        .await
        .map_err(unexpected)?;

        if inserted.rows_affected() == 0 {
            return Err(PortError::Conflict(format!(
                "No stock available for '{}'",
                title
            )));
        }

        let loan = sqlx::query_as::<_, LoanRecord>(
            "SELECT issue_id, member_id, book_id, issue_date, due_date, return_date \
             FROM issued_books WHERE issue_id = ?",
        )
        .bind(inserted.last_insert_rowid())
        .fetch_one(&mut *tx)
        .await
        .map_err(unexpected)?;

        tx.commit().await.map_err(unexpected)?;

        Ok(IssueReceipt {
            loan: loan.to_domain(),
            book_title: title,
            fulfilled_reservation: fulfilled,
        })
    }

    async fn return_loan(&self, loan_id: LoanId, today: NaiveDate) -> PortResult<ReturnOutcome> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;

        // Only an active loan can be closed; a second return matches nothing.
        let closed = sqlx::query(
            "UPDATE issued_books SET return_date = ? WHERE issue_id = ? AND return_date IS NULL",
        )
        .bind(today)
        .bind(loan_id)
        .execute(&mut *tx)
        .await
        .map_err(unexpected)?
        .rows_affected()
            == 1;

        let loan = sqlx::query_as::<_, LoanRecord>(
            "SELECT issue_id, member_id, book_id, issue_date, due_date, return_date \
             FROM issued_books WHERE issue_id = ?",
        )
        .bind(loan_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(unexpected)?
        .ok_or_else(|| PortError::NotFound(format!("Loan {} not found", loan_id)))?
        .to_domain();

        if !closed {
            return Ok(ReturnOutcome::AlreadyReturned(loan));
        }

        let fine = match policy::assess(loan.due_date, today) {
            Some(assessment) => {
                let result = sqlx::query(
                    "INSERT INTO fines (issue_id, fine_amount, days_late, status, fine_date) \
                     VALUES (?, ?, ?, 'Pending', ?)",
                )
                .bind(loan_id)
                .bind(assessment.amount)
                .bind(assessment.days_late)
                .bind(today)
                .execute(&mut *tx)
                .await
                .map_err(|e| constraint_error(e, &format!("A fine for loan {}", loan_id)))?;

                Some(Fine {
                    id: result.last_insert_rowid(),
                    loan_id,
                    amount: assessment.amount,
                    days_late: assessment.days_late,
                    status: FineStatus::Pending,
                    fine_date: today,
                    payment_date: None,
                })
            }
            None => None,
        };

        let (book_title, member_name) = sqlx::query_as::<_, (String, String)>(
            "SELECT b.title, m.first_name || ' ' || m.last_name \
             FROM book_db b, member_db m WHERE b.book_id = ? AND m.member_id = ?",
        )
        .bind(loan.book_id)
        .bind(loan.member_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(unexpected)?;

        tx.commit().await.map_err(unexpected)?;

        Ok(ReturnOutcome::Returned {
            loan,
            fine,
            book_title,
            member_name,
        })
    }

    async fn get_loan(&self, loan_id: LoanId, today: NaiveDate) -> PortResult<LoanDetails> {
        sqlx::query_as::<_, LoanDetailsRecord>(&format!(
            "{} AND ib.issue_id = ?",
            LOAN_DETAILS_SELECT
        ))
        .bind(loan_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?
        .ok_or_else(|| PortError::NotFound(format!("Loan {} not found", loan_id)))?
        .to_domain(today)
    }

    async fn list_loans(
        &self,
        filter: &LoanFilter,
        today: NaiveDate,
    ) -> PortResult<Vec<LoanDetails>> {
        let mut query = QueryBuilder::<Sqlite>::new(LOAN_DETAILS_SELECT);
        match filter.status {
            Some(LoanStatusFilter::Active) => {
                query.push(" AND ib.return_date IS NULL");
            }
            Some(LoanStatusFilter::Returned) => {
                query.push(" AND ib.return_date IS NOT NULL");
            }
            Some(LoanStatusFilter::Overdue) => {
                query
                    .push(" AND ib.return_date IS NULL AND ib.due_date < ")
                    .push_bind(today);
            }
            None => {}
        }
        if let Some(member_id) = filter.member_id {
            query.push(" AND ib.member_id = ").push_bind(member_id);
        }
        if let Some(from) = filter.issued_from {
            query.push(" AND ib.issue_date >= ").push_bind(from);
        }
        if let Some(to) = filter.issued_to {
            query.push(" AND ib.issue_date <= ").push_bind(to);
        }
        push_member_name(&mut query, filter.member_name.as_deref());
        query.push(" ORDER BY ib.issue_date DESC, ib.issue_id DESC");

        let records = query
            .build_query_as::<LoanDetailsRecord>()
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?;
        records.into_iter().map(|r| r.to_domain(today)).collect()
    }

    async fn loan_summary(&self, today: NaiveDate) -> PortResult<LoanSummary> {
        let record = sqlx::query_as::<_, LoanSummaryRecord>(
            "SELECT COUNT(*) AS total, \
             COALESCE(SUM(CASE WHEN return_date IS NULL THEN 1 ELSE 0 END), 0) AS active, \
             COALESCE(SUM(CASE WHEN return_date IS NOT NULL THEN 1 ELSE 0 END), 0) AS returned, \
             COALESCE(SUM(CASE WHEN return_date IS NULL AND due_date < ? THEN 1 ELSE 0 END), 0) \
                 AS overdue \
             FROM issued_books",
        )
        .bind(today)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(LoanSummary {
            total: record.total,
            active: record.active,
            returned: record.returned,
            overdue: record.overdue,
        })
    }

    async fn delete_loan(&self, loan_id: LoanId) -> PortResult<()> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;

        sqlx::query("DELETE FROM fines WHERE issue_id = ?")
            .bind(loan_id)
            .execute(&mut *tx)
            .await
            .map_err(unexpected)?;

        let result = sqlx::query("DELETE FROM issued_books WHERE issue_id = ?")
            .bind(loan_id)
            .execute(&mut *tx)
            .await
            .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Loan {} not found", loan_id)));
        }

        tx.commit().await.map_err(unexpected)?;
        Ok(())
    }

    async fn pay_fine(&self, fine_id: FineId, today: NaiveDate) -> PortResult<PaymentOutcome> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;

        let settled = sqlx::query(
            "UPDATE fines SET status = 'Paid', payment_date = ? \
             WHERE fine_id = ? AND status = 'Pending'",
        )
        .bind(today)
        .bind(fine_id)
        .execute(&mut *tx)
        .await
        .map_err(unexpected)?
        .rows_affected()
            == 1;

        let details = sqlx::query_as::<_, FineDetailsRecord>(&format!(
            "{} AND f.fine_id = ?",
            FINE_DETAILS_SELECT
        ))
        .bind(fine_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(unexpected)?
        .ok_or_else(|| PortError::NotFound(format!("Fine {} not found", fine_id)))?
        .to_domain()?;

        tx.commit().await.map_err(unexpected)?;

        if settled {
            Ok(PaymentOutcome::Paid(details))
        } else {
            Ok(PaymentOutcome::AlreadyPaid(details))
        }
    }

    async fn get_fine(&self, fine_id: FineId) -> PortResult<FineDetails> {
        sqlx::query_as::<_, FineDetailsRecord>(&format!(
            "{} AND f.fine_id = ?",
            FINE_DETAILS_SELECT
        ))
        .bind(fine_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?
        .ok_or_else(|| PortError::NotFound(format!("Fine {} not found", fine_id)))?
        .to_domain()
    }

    async fn list_fines(&self, filter: &FineFilter) -> PortResult<Vec<FineDetails>> {
        let mut query = QueryBuilder::<Sqlite>::new(FINE_DETAILS_SELECT);
        if let Some(status) = filter.status {
            query.push(" AND f.status = ").push_bind(status.as_str());
        }
        if let Some(member_id) = filter.member_id {
            query.push(" AND ib.member_id = ").push_bind(member_id);
        }
        push_member_name(&mut query, filter.member_name.as_deref());
        query.push(" ORDER BY f.fine_date DESC, f.fine_id DESC");

        let records = query
            .build_query_as::<FineDetailsRecord>()
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?;
        records.into_iter().map(|r| r.to_domain()).collect()
    }

    async fn fine_summary(&self) -> PortResult<FineSummary> {
        let record = sqlx::query_as::<_, FineSummaryRecord>(
            "SELECT COUNT(*) AS total, \
             COALESCE(SUM(CASE WHEN status = 'Pending' THEN 1 ELSE 0 END), 0) AS pending, \
             COALESCE(SUM(CASE WHEN status = 'Paid' THEN 1 ELSE 0 END), 0) AS paid, \
             COALESCE(SUM(CASE WHEN status = 'Pending' THEN fine_amount ELSE 0 END), 0) \
                 AS pending_amount \
             FROM fines",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(FineSummary {
            total: record.total,
            pending: record.pending,
            paid: record.paid,
            pending_amount: record.pending_amount,
        })
    }

    async fn delete_fine(&self, fine_id: FineId) -> PortResult<()> {
        let result = sqlx::query("DELETE FROM fines WHERE fine_id = ?")
            .bind(fine_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Fine {} not found", fine_id)));
        }
        Ok(())
    }
}

//=========================================================================================
// `NotificationSink` Trait Implementation
//=========================================================================================

#[async_trait]
impl NotificationSink for DbAdapter {
    async fn notify(&self, member_id: MemberId, message: &str) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO notifications (user_id, message, created_at, is_read) VALUES (?, ?, ?, 0)",
        )
        .bind(member_id)
        .bind(message)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| constraint_error(e, "Notification"))?;
        Ok(())
    }

    async fn list_recent(&self, member_id: MemberId, limit: i64) -> PortResult<Vec<Notification>> {
        let records = sqlx::query_as::<_, NotificationRecord>(
            "SELECT id, user_id, message, created_at, is_read FROM notifications \
             WHERE user_id = ? ORDER BY created_at DESC, id DESC LIMIT ?",
        )
        .bind(member_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn unread_count(&self, member_id: MemberId) -> PortResult<i64> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM notifications WHERE user_id = ? AND is_read = 0",
        )
        .bind(member_id)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)
    }

    async fn mark_read(
        &self,
        member_id: MemberId,
        notification_id: NotificationId,
    ) -> PortResult<()> {
        let result =
            sqlx::query("UPDATE notifications SET is_read = 1 WHERE id = ? AND user_id = ?")
                .bind(notification_id)
                .bind(member_id)
                .execute(&self.pool)
                .await
                .map_err(unexpected)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!(
                "Notification {} not found",
                notification_id
            )));
        }
        Ok(())
    }

    async fn mark_all_read(&self, member_id: MemberId) -> PortResult<u64> {
        let result =
            sqlx::query("UPDATE notifications SET is_read = 1 WHERE user_id = ? AND is_read = 0")
                .bind(member_id)
                .execute(&self.pool)
                .await
                .map_err(unexpected)?;
        Ok(result.rows_affected())
    }
}

//=========================================================================================
// `ActivityLog` Trait Implementation
//=========================================================================================

#[async_trait]
impl ActivityLog for DbAdapter {
    async fn record(&self, event: &ActivityEvent) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO user_activity (user_id, action, book_id, occurred_at) VALUES (?, ?, ?, ?)",
        )
        .bind(event.member_id)
        .bind(event.kind.as_str())
        .bind(event.book_id)
        .bind(event.occurred_at)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }

    async fn recent_activity(&self, limit: i64) -> PortResult<Vec<ActivityEntry>> {
        let records = sqlx::query_as::<_, ActivityRecord>(
            "SELECT a.id, a.user_id, a.action, a.book_id, a.occurred_at, b.title \
             FROM user_activity a LEFT JOIN book_db b ON a.book_id = b.book_id \
             ORDER BY a.id DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        records.into_iter().map(|r| r.to_domain()).collect()
    }
}
