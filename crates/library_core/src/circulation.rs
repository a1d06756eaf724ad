//! crates/library_core/src/circulation.rs
//!
//! The circulation desk: drives books through the reservation and loan
//! ledgers and fans out the notifications and activity entries each
//! transition produces.
//!
//! Correctness lives in the store's transactions. Notifications and the
//! activity log are written after the transaction commits; a failure there is
//! logged and never undoes or fails the transition that caused it.

use crate::domain::{
    ActivityEvent, ActivityKind, BookId, FineId, IssueReceipt, LoanId, Member, MemberId,
    PaymentOutcome, ReservationId, ReserveOutcome, ReturnOutcome,
};
use crate::ports::{ActivityLog, LibraryStore, NotificationSink, PortError, PortResult};
use chrono::{NaiveDate, Utc};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Clone)]
pub struct Circulation {
    store: Arc<dyn LibraryStore>,
    notifications: Arc<dyn NotificationSink>,
    activity: Arc<dyn ActivityLog>,
}

impl Circulation {
    pub fn new(
        store: Arc<dyn LibraryStore>,
        notifications: Arc<dyn NotificationSink>,
        activity: Arc<dyn ActivityLog>,
    ) -> Self {
        Self {
            store,
            notifications,
            activity,
        }
    }

    //=====================================================================================
    // Reservation Ledger
    //=====================================================================================

    /// Records `member`'s interest in a book.
    ///
    /// Reserving a book the member already has an active reservation for is a
    /// no-op that hands back the existing reservation.
    pub async fn reserve(&self, member: &Member, book_id: BookId) -> PortResult<ReserveOutcome> {
        require_id("book_id", book_id)?;
        let book = self.store.get_book(book_id).await?.book;

        let outcome = self.store.create_reservation(member.id, book_id).await?;
        if let ReserveOutcome::Created(reservation) = &outcome {
            info!(
                reservation_id = reservation.id,
                member_id = member.id,
                book_id,
                "Reservation created"
            );
            self.notify_admins(&format!(
                "New reservation request for '{}' by {}",
                book.title,
                member.full_name()
            ))
            .await;
            self.notify(member.id, &format!("You have reserved '{}'.", book.title))
                .await;
        }
        self.log(ActivityKind::ReserveBook, book_id, member.id).await;

        Ok(outcome)
    }

    /// Cancels a reservation. Members may only cancel their own; admins may
    /// cancel any.
    pub async fn cancel_reservation(
        &self,
        actor: &Member,
        reservation_id: ReservationId,
    ) -> PortResult<()> {
        require_id("reservation_id", reservation_id)?;
        let reservation = self.store.get_reservation(reservation_id).await?;
        if reservation.member_id != actor.id && !actor.is_admin() {
            return Err(PortError::Forbidden(format!(
                "Reservation {} belongs to another member",
                reservation_id
            )));
        }

        self.store.delete_reservation(reservation_id).await?;
        info!(reservation_id, member_id = reservation.member_id, "Reservation cancelled");
        self.log(
            ActivityKind::CancelReservation,
            reservation.book_id,
            reservation.member_id,
        )
        .await;
        Ok(())
    }

    //=====================================================================================
    // Loan Ledger
    //=====================================================================================

    /// Issues a copy of a book to a member, due back after the loan period.
    ///
    /// With `from_reservation` set, the member's active reservation for the
    /// book is required and consumed by the same transaction.
    pub async fn issue(
        &self,
        member_id: MemberId,
        book_id: BookId,
        today: NaiveDate,
        from_reservation: bool,
    ) -> PortResult<IssueReceipt> {
        require_id("member_id", member_id)?;
        require_id("book_id", book_id)?;

        let receipt = self
            .store
            .issue_loan(member_id, book_id, today, from_reservation)
            .await?;
        info!(
            loan_id = receipt.loan.id,
            member_id,
            book_id,
            due_date = %receipt.loan.due_date,
            fulfilled_reservation = receipt.fulfilled_reservation,
            "Book issued"
        );

        self.notify(
            member_id,
            &format!(
                "'{}' has been issued to you. Due back on {}.",
                receipt.book_title, receipt.loan.due_date
            ),
        )
        .await;
        self.log(ActivityKind::IssueBook, book_id, member_id).await;

        Ok(receipt)
    }

    /// Processes the return of a loan, assessing a fine if it is late.
    ///
    /// A loan that is already returned is reported as such and nothing else
    /// happens: no second fine, no notifications.
    pub async fn process_return(
        &self,
        loan_id: LoanId,
        today: NaiveDate,
    ) -> PortResult<ReturnOutcome> {
        require_id("loan_id", loan_id)?;

        let outcome = self.store.return_loan(loan_id, today).await?;
        match &outcome {
            ReturnOutcome::Returned {
                loan,
                fine,
                book_title,
                member_name,
            } => {
                info!(
                    loan_id,
                    fine = fine.as_ref().map(|f| f.amount).unwrap_or(0),
                    "Loan returned"
                );
                self.notify_admins(&format!(
                    "Book '{}' returned by {}",
                    book_title, member_name
                ))
                .await;
                self.notify(loan.member_id, &format!("You have returned '{}'.", book_title))
                    .await;
                self.log(ActivityKind::ReturnBook, loan.book_id, loan.member_id)
                    .await;
            }
            ReturnOutcome::AlreadyReturned(_) => {
                info!(loan_id, "Loan was already returned; nothing to do");
            }
        }

        Ok(outcome)
    }

    /// Administrative cleanup: removes a loan and its fine.
    pub async fn delete_loan(&self, loan_id: LoanId) -> PortResult<()> {
        require_id("loan_id", loan_id)?;
        self.store.delete_loan(loan_id).await?;
        warn!(loan_id, "Loan deleted by administrator");
        Ok(())
    }

    //=====================================================================================
    // Fine Engine
    //=====================================================================================

    /// Settles a pending fine. Paying a settled fine again changes nothing.
    pub async fn pay_fine(&self, fine_id: FineId, today: NaiveDate) -> PortResult<PaymentOutcome> {
        require_id("fine_id", fine_id)?;

        let outcome = self.store.pay_fine(fine_id, today).await?;
        match &outcome {
            PaymentOutcome::Paid(details) => {
                info!(fine_id, amount = details.fine.amount, "Fine paid");
                self.notify_admins(&format!(
                    "Fine paid for '{}' by member ID {}",
                    details.book_title, details.member_id
                ))
                .await;
                self.notify(
                    details.member_id,
                    &format!("Your fine for '{}' has been paid.", details.book_title),
                )
                .await;
                self.log(ActivityKind::PayFine, details.book_id, details.member_id)
                    .await;
            }
            PaymentOutcome::AlreadyPaid(_) => {
                info!(fine_id, "Fine was already paid; nothing to do");
            }
        }

        Ok(outcome)
    }

    pub async fn delete_fine(&self, fine_id: FineId) -> PortResult<()> {
        require_id("fine_id", fine_id)?;
        self.store.delete_fine(fine_id).await?;
        warn!(fine_id, "Fine deleted by administrator");
        Ok(())
    }

    //=====================================================================================
    // Side effects
    //=====================================================================================

    async fn notify(&self, member_id: MemberId, message: &str) {
        if let Err(e) = self.notifications.notify(member_id, message).await {
            warn!(member_id, "Failed to record notification: {:?}", e);
        }
    }

    async fn notify_admins(&self, message: &str) {
        let admins = match self.store.list_admin_ids().await {
            Ok(admins) => admins,
            Err(e) => {
                warn!("Failed to look up admins for notification: {:?}", e);
                return;
            }
        };
        for admin_id in admins {
            self.notify(admin_id, message).await;
        }
    }

    async fn log(&self, kind: ActivityKind, book_id: BookId, member_id: MemberId) {
        let event = ActivityEvent {
            kind,
            book_id,
            member_id,
            occurred_at: Utc::now(),
        };
        if let Err(e) = self.activity.record(&event).await {
            warn!(kind = kind.as_str(), "Failed to record activity: {:?}", e);
        }
    }
}

/// Rejects identifiers that can never name a stored row.
fn require_id(name: &str, id: i64) -> PortResult<()> {
    if id <= 0 {
        return Err(PortError::Validation(format!(
            "{} must be a positive integer, got {}",
            name, id
        )));
    }
    Ok(())
}
