//! crates/library_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the library's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of the concrete store behind it.

use async_trait::async_trait;
use chrono::NaiveDate;
use crate::domain::{
    ActivityEntry, ActivityEvent, Book, BookAvailability, BookDraft, BookId, FineDetails,
    FineFilter, FineId, FineSummary, IssueReceipt, LoanDetails, LoanFilter, LoanId, LoanSummary,
    Member, MemberDraft, MemberId, MemberSummary, Notification, NotificationId, PaymentOutcome,
    Reservation, ReservationDetails, ReservationId, ReserveOutcome, ReturnOutcome,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// Business-rule failures are ordinary variants here; only `Unexpected`
/// signals a fault in the underlying store.
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Invalid request: {0}")]
    Validation(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// The relational store behind the catalog, membership and the three ledgers.
///
/// Every method that changes more than one row runs as a single transaction
/// in the implementation; callers never see partial state.
#[async_trait]
pub trait LibraryStore: Send + Sync {
    // --- Catalog ---
    async fn create_book(&self, draft: &BookDraft) -> PortResult<Book>;

    /// Fails with `Conflict` if the new stock is below the active loan count.
    async fn update_book(&self, book_id: BookId, draft: &BookDraft) -> PortResult<Book>;

    /// Fails with `Conflict` while any loan or reservation references the book.
    async fn delete_book(&self, book_id: BookId) -> PortResult<()>;

    async fn get_book(&self, book_id: BookId) -> PortResult<BookAvailability>;

    async fn list_books(&self, search: Option<&str>) -> PortResult<Vec<BookAvailability>>;

    // --- Membership ---
    async fn create_member(
        &self,
        draft: &MemberDraft,
        credential_hash: &str,
    ) -> PortResult<Member>;

    async fn get_member(&self, member_id: MemberId) -> PortResult<Member>;

    async fn list_members(&self) -> PortResult<Vec<Member>>;

    async fn update_member(&self, member_id: MemberId, draft: &MemberDraft) -> PortResult<Member>;

    async fn delete_member(&self, member_id: MemberId) -> PortResult<()>;

    async fn list_admin_ids(&self) -> PortResult<Vec<MemberId>>;

    async fn member_summary(
        &self,
        member_id: MemberId,
        today: NaiveDate,
    ) -> PortResult<MemberSummary>;

    // --- Reservation Ledger ---
    /// Records an active reservation unless one already exists for the pair.
    async fn create_reservation(
        &self,
        member_id: MemberId,
        book_id: BookId,
    ) -> PortResult<ReserveOutcome>;

    async fn get_reservation(&self, reservation_id: ReservationId) -> PortResult<Reservation>;

    async fn delete_reservation(&self, reservation_id: ReservationId) -> PortResult<()>;

    async fn list_reservations_for_member(
        &self,
        member_id: MemberId,
    ) -> PortResult<Vec<ReservationDetails>>;

    async fn list_reservations_for_book(
        &self,
        book_id: BookId,
    ) -> PortResult<Vec<ReservationDetails>>;

    async fn list_active_reservations(&self) -> PortResult<Vec<ReservationDetails>>;

    async fn count_active_reservations(&self) -> PortResult<i64>;

    // --- Loan Ledger ---
    /// Issues a copy atomically: the stock check, the loan insert and the
    /// reservation cleanup commit together or not at all.
    ///
    /// With `require_reservation` set, the member must hold an active
    /// reservation for the book, otherwise `NotFound` is returned.
    async fn issue_loan(
        &self,
        member_id: MemberId,
        book_id: BookId,
        today: NaiveDate,
        require_reservation: bool,
    ) -> PortResult<IssueReceipt>;

    /// Closes an active loan and records its fine, if any, in one transaction.
    async fn return_loan(&self, loan_id: LoanId, today: NaiveDate) -> PortResult<ReturnOutcome>;

    async fn get_loan(&self, loan_id: LoanId, today: NaiveDate) -> PortResult<LoanDetails>;

    async fn list_loans(
        &self,
        filter: &LoanFilter,
        today: NaiveDate,
    ) -> PortResult<Vec<LoanDetails>>;

    async fn loan_summary(&self, today: NaiveDate) -> PortResult<LoanSummary>;

    /// Deletes the loan's fine (if any) and then the loan.
    async fn delete_loan(&self, loan_id: LoanId) -> PortResult<()>;

    // --- Fine Engine ---
    async fn pay_fine(&self, fine_id: FineId, today: NaiveDate) -> PortResult<PaymentOutcome>;

    async fn get_fine(&self, fine_id: FineId) -> PortResult<FineDetails>;

    async fn list_fines(&self, filter: &FineFilter) -> PortResult<Vec<FineDetails>>;

    async fn fine_summary(&self) -> PortResult<FineSummary>;

    async fn delete_fine(&self, fine_id: FineId) -> PortResult<()>;
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Appends an unread notification for a member.
    async fn notify(&self, member_id: MemberId, message: &str) -> PortResult<()>;

    async fn list_recent(&self, member_id: MemberId, limit: i64) -> PortResult<Vec<Notification>>;

    async fn unread_count(&self, member_id: MemberId) -> PortResult<i64>;

    /// Marks one of the member's own notifications as read.
    async fn mark_read(
        &self,
        member_id: MemberId,
        notification_id: NotificationId,
    ) -> PortResult<()>;

    async fn mark_all_read(&self, member_id: MemberId) -> PortResult<u64>;
}

#[async_trait]
pub trait ActivityLog: Send + Sync {
    async fn record(&self, event: &ActivityEvent) -> PortResult<()>;

    async fn recent_activity(&self, limit: i64) -> PortResult<Vec<ActivityEntry>>;
}
