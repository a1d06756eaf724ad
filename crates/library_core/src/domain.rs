//! crates/library_core/src/domain.rs
//!
//! Defines the pure, core data structures for the library.
//! These structs are independent of any database or serialization format.

use chrono::{DateTime, NaiveDate, Utc};
use std::fmt;
use std::str::FromStr;

pub type BookId = i64;
pub type MemberId = i64;
pub type ReservationId = i64;
pub type LoanId = i64;
pub type FineId = i64;
pub type NotificationId = i64;

//=========================================================================================
// Catalog
//=========================================================================================

/// A title held by the library, with the number of physical copies owned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Book {
    pub id: BookId,
    pub title: String,
    pub author: String,
    pub category: String,
    pub publisher: String,
    pub year: i32,
    pub edition: String,
    pub total_stock: i64,
}

/// The editable fields of a book, used for both creation and updates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookDraft {
    pub title: String,
    pub author: String,
    pub category: String,
    pub publisher: String,
    pub year: i32,
    pub edition: String,
    pub total_stock: i64,
}

/// A book together with how many of its copies are on the shelf right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookAvailability {
    pub book: Book,
    pub active_loans: i64,
    pub available_copies: i64,
}

//=========================================================================================
// Membership
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Admin,
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "user" => Ok(Role::User),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// Represents a member - used throughout app
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub id: MemberId,
    pub first_name: String,
    pub last_name: String,
    pub address: String,
    pub mob_no: String,
    pub email: String,
    pub role: Role,
}

impl Member {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// The profile fields of a member. The credential hash is handled separately
/// and never leaves the store once written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberDraft {
    pub first_name: String,
    pub last_name: String,
    pub address: String,
    pub mob_no: String,
    pub email: String,
    pub role: Role,
}

/// Per-member figures shown on the member dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemberSummary {
    pub total_loans: i64,
    pub active_loans: i64,
    pub overdue_loans: i64,
    pub pending_fines_amount: i64,
}

//=========================================================================================
// Reservation Ledger
//=========================================================================================

/// A member's standing request to be issued a book.
///
/// Only active reservations are ever stored; fulfilling or cancelling one
/// deletes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    pub id: ReservationId,
    pub member_id: MemberId,
    pub book_id: BookId,
    pub reserved_at: DateTime<Utc>,
}

/// An active reservation joined with the names needed to display it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationDetails {
    pub reservation: Reservation,
    pub book_title: String,
    pub book_author: String,
    pub member_name: String,
}

/// Result of asking the ledger to record a reservation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReserveOutcome {
    Created(Reservation),
    /// The member already had an active reservation for this book.
    AlreadyActive(Reservation),
}

impl ReserveOutcome {
    pub fn reservation(&self) -> &Reservation {
        match self {
            ReserveOutcome::Created(r) | ReserveOutcome::AlreadyActive(r) => r,
        }
    }
}

//=========================================================================================
// Loan Ledger
//=========================================================================================

/// Where a loan sits in its lifecycle. `Returned` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoanState {
    Active,
    Returned { on: NaiveDate },
}

impl LoanState {
    pub fn from_return_date(return_date: Option<NaiveDate>) -> Self {
        match return_date {
            Some(on) => LoanState::Returned { on },
            None => LoanState::Active,
        }
    }

    pub fn return_date(&self) -> Option<NaiveDate> {
        match self {
            LoanState::Active => None,
            LoanState::Returned { on } => Some(*on),
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, LoanState::Active)
    }
}

/// A single issue of a book to a member. History is append-only: issuing
/// the same book again creates a new loan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Loan {
    pub id: LoanId,
    pub member_id: MemberId,
    pub book_id: BookId,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub state: LoanState,
}

/// A loan joined with display names and its fine, if one was assessed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoanDetails {
    pub loan: Loan,
    pub book_title: String,
    pub member_name: String,
    pub days_overdue: i64,
    pub fine: Option<Fine>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoanStatusFilter {
    Active,
    Returned,
    /// Active and past its due date as of the reference day.
    Overdue,
}

impl FromStr for LoanStatusFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" | "pending" => Ok(LoanStatusFilter::Active),
            "returned" => Ok(LoanStatusFilter::Returned),
            "overdue" => Ok(LoanStatusFilter::Overdue),
            other => Err(format!("unknown loan status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoanFilter {
    pub status: Option<LoanStatusFilter>,
    pub member_id: Option<MemberId>,
    pub issued_from: Option<NaiveDate>,
    pub issued_to: Option<NaiveDate>,
    /// Case-insensitive substring of the member's full name.
    pub member_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoanSummary {
    pub total: i64,
    pub active: i64,
    pub returned: i64,
    pub overdue: i64,
}

/// What the store hands back after a successful issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueReceipt {
    pub loan: Loan,
    pub book_title: String,
    /// Whether an active reservation for the same pair was consumed.
    pub fulfilled_reservation: bool,
}

/// Result of processing a return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReturnOutcome {
    Returned {
        loan: Loan,
        fine: Option<Fine>,
        book_title: String,
        member_name: String,
    },
    /// The loan had been returned before; nothing was changed.
    AlreadyReturned(Loan),
}

impl ReturnOutcome {
    pub fn loan(&self) -> &Loan {
        match self {
            ReturnOutcome::Returned { loan, .. } | ReturnOutcome::AlreadyReturned(loan) => loan,
        }
    }
}

//=========================================================================================
// Fine Engine
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FineStatus {
    Pending,
    Paid,
}

impl FineStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FineStatus::Pending => "Pending",
            FineStatus::Paid => "Paid",
        }
    }
}

impl FromStr for FineStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" | "pending" => Ok(FineStatus::Pending),
            "Paid" | "paid" => Ok(FineStatus::Paid),
            other => Err(format!("unknown fine status '{}'", other)),
        }
    }
}

/// A penalty for returning a loan late. Exactly one per late loan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fine {
    pub id: FineId,
    pub loan_id: LoanId,
    pub amount: i64,
    pub days_late: i64,
    pub status: FineStatus,
    pub fine_date: NaiveDate,
    pub payment_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FineDetails {
    pub fine: Fine,
    pub book_id: BookId,
    pub member_id: MemberId,
    pub member_name: String,
    pub book_title: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FineFilter {
    pub status: Option<FineStatus>,
    pub member_id: Option<MemberId>,
    pub member_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FineSummary {
    pub total: i64,
    pub pending: i64,
    pub paid: i64,
    pub pending_amount: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentOutcome {
    Paid(FineDetails),
    /// The fine was settled earlier; its dates are left untouched.
    AlreadyPaid(FineDetails),
}

impl PaymentOutcome {
    pub fn details(&self) -> &FineDetails {
        match self {
            PaymentOutcome::Paid(d) | PaymentOutcome::AlreadyPaid(d) => d,
        }
    }
}

//=========================================================================================
// Notifications and Activity
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub id: NotificationId,
    pub member_id: MemberId,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub is_read: bool,
}

/// The kinds of member activity the circulation desk records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActivityKind {
    ReserveBook,
    CancelReservation,
    IssueBook,
    ReturnBook,
    PayFine,
}

impl ActivityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityKind::ReserveBook => "reserve_book",
            ActivityKind::CancelReservation => "cancel_reservation",
            ActivityKind::IssueBook => "issue_book",
            ActivityKind::ReturnBook => "return_book",
            ActivityKind::PayFine => "pay_fine",
        }
    }
}

impl FromStr for ActivityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reserve_book" => Ok(ActivityKind::ReserveBook),
            "cancel_reservation" => Ok(ActivityKind::CancelReservation),
            "issue_book" => Ok(ActivityKind::IssueBook),
            "return_book" => Ok(ActivityKind::ReturnBook),
            "pay_fine" => Ok(ActivityKind::PayFine),
            other => Err(format!("unknown activity kind '{}'", other)),
        }
    }
}

/// A structured activity-log entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityEvent {
    pub kind: ActivityKind,
    pub book_id: BookId,
    pub member_id: MemberId,
    pub occurred_at: DateTime<Utc>,
}

/// A logged event as read back for the admin activity feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityEntry {
    pub id: i64,
    pub event: ActivityEvent,
    /// `None` once the book has been removed from the catalog.
    pub book_title: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loan_state_follows_return_date() {
        let on = NaiveDate::from_ymd_opt(2024, 1, 6).unwrap();
        assert_eq!(LoanState::from_return_date(None), LoanState::Active);
        assert_eq!(
            LoanState::from_return_date(Some(on)),
            LoanState::Returned { on }
        );
        assert_eq!(LoanState::Returned { on }.return_date(), Some(on));
        assert!(LoanState::Active.is_active());
    }

    #[test]
    fn stored_labels_parse_back() {
        for role in [Role::Admin, Role::User] {
            assert_eq!(role.as_str().parse::<Role>(), Ok(role));
        }
        for status in [FineStatus::Pending, FineStatus::Paid] {
            assert_eq!(status.as_str().parse::<FineStatus>(), Ok(status));
        }
        assert_eq!(
            "return_book".parse::<ActivityKind>(),
            Ok(ActivityKind::ReturnBook)
        );
        assert!("librarian".parse::<Role>().is_err());
    }

    #[test]
    fn pending_is_accepted_as_active_loan_filter() {
        assert_eq!(
            "pending".parse::<LoanStatusFilter>(),
            Ok(LoanStatusFilter::Active)
        );
        assert!("lost".parse::<LoanStatusFilter>().is_err());
    }
}
