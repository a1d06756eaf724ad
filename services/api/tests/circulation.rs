//! Ledger behaviour against a real SQLite database: stock accounting, fines,
//! idempotent transitions and the side effects each one leaves behind.

mod common;

use common::{add_book, add_member, circulation, day, file_db, test_db};
use library_core::domain::{
    FineFilter, FineStatus, LoanFilter, LoanStatusFilter, PaymentOutcome, ReserveOutcome,
    ReturnOutcome, Role,
};
use library_core::ports::{ActivityLog, LibraryStore, NotificationSink, PortError};

#[tokio::test]
async fn issuing_consumes_stock_and_returning_restores_it() {
    let db = test_db().await;
    let desk = circulation(&db);
    let member = add_member(&db, "Ada", "555-0001", Role::User).await;
    let book = add_book(&db, "Dune", 2).await;

    let receipt = desk
        .issue(member.id, book.id, day(2024, 1, 1), false)
        .await
        .expect("issue succeeds");
    assert_eq!(receipt.loan.due_date, day(2024, 1, 15));
    assert_eq!(receipt.book_title, "Dune");

    let availability = db.get_book(book.id).await.unwrap();
    assert_eq!(availability.active_loans, 1);
    assert_eq!(availability.available_copies, 1);

    desk.process_return(receipt.loan.id, day(2024, 1, 10))
        .await
        .expect("return succeeds");
    let availability = db.get_book(book.id).await.unwrap();
    assert_eq!(availability.active_loans, 0);
    assert_eq!(availability.available_copies, 2);
}

#[tokio::test]
async fn issuing_without_stock_conflicts_and_writes_nothing() {
    let db = test_db().await;
    let desk = circulation(&db);
    let member = add_member(&db, "Ada", "555-0001", Role::User).await;
    let book = add_book(&db, "Out of Print", 0).await;

    let err = desk
        .issue(member.id, book.id, day(2024, 1, 1), false)
        .await
        .unwrap_err();
    assert!(matches!(err, PortError::Conflict(msg) if msg.contains("Out of Print")));

    let loans = db
        .list_loans(&LoanFilter::default(), day(2024, 1, 1))
        .await
        .unwrap();
    assert!(loans.is_empty());
}

#[tokio::test]
async fn issuing_to_unknown_member_or_book_is_not_found() {
    let db = test_db().await;
    let desk = circulation(&db);
    let member = add_member(&db, "Ada", "555-0001", Role::User).await;
    let book = add_book(&db, "Dune", 1).await;

    let err = desk.issue(999, book.id, day(2024, 1, 1), false).await.unwrap_err();
    assert!(matches!(err, PortError::NotFound(_)));
    let err = desk.issue(member.id, 999, day(2024, 1, 1), false).await.unwrap_err();
    assert!(matches!(err, PortError::NotFound(_)));
    let err = desk.issue(0, book.id, day(2024, 1, 1), false).await.unwrap_err();
    assert!(matches!(err, PortError::Validation(_)));
}

#[tokio::test]
async fn late_return_assesses_a_single_pending_fine() {
    let db = test_db().await;
    let desk = circulation(&db);
    let member = add_member(&db, "Ada", "555-0001", Role::User).await;
    let book = add_book(&db, "Dune", 1).await;

    // Issued 2023-12-18, so due 2024-01-01; returned five days late.
    let receipt = desk
        .issue(member.id, book.id, day(2023, 12, 18), false)
        .await
        .unwrap();
    assert_eq!(receipt.loan.due_date, day(2024, 1, 1));

    let outcome = desk
        .process_return(receipt.loan.id, day(2024, 1, 6))
        .await
        .unwrap();
    let fine = match outcome {
        ReturnOutcome::Returned { fine: Some(fine), .. } => fine,
        other => panic!("expected a fined return, got {:?}", other),
    };
    assert_eq!(fine.days_late, 5);
    assert_eq!(fine.amount, 25);
    assert_eq!(fine.status, FineStatus::Pending);
    assert_eq!(fine.fine_date, day(2024, 1, 6));

    // A second return is reported, not repeated.
    let again = desk
        .process_return(receipt.loan.id, day(2024, 1, 9))
        .await
        .unwrap();
    match again {
        ReturnOutcome::AlreadyReturned(loan) => {
            assert_eq!(loan.state.return_date(), Some(day(2024, 1, 6)));
        }
        other => panic!("expected AlreadyReturned, got {:?}", other),
    }

    let fines = db.list_fines(&FineFilter::default()).await.unwrap();
    assert_eq!(fines.len(), 1);
    assert_eq!(fines[0].fine.amount, 25);

    // Name search is a case-insensitive substring match.
    let by_name = |term: &str| FineFilter {
        member_name: Some(term.to_string()),
        ..FineFilter::default()
    };
    assert_eq!(db.list_fines(&by_name("ada t")).await.unwrap().len(), 1);
    assert!(db.list_fines(&by_name("Grace")).await.unwrap().is_empty());
}

#[tokio::test]
async fn on_time_return_has_no_fine() {
    let db = test_db().await;
    let desk = circulation(&db);
    let member = add_member(&db, "Ada", "555-0001", Role::User).await;
    let book = add_book(&db, "Dune", 1).await;

    let receipt = desk
        .issue(member.id, book.id, day(2024, 1, 1), false)
        .await
        .unwrap();
    let outcome = desk
        .process_return(receipt.loan.id, day(2024, 1, 15))
        .await
        .unwrap();
    assert!(matches!(outcome, ReturnOutcome::Returned { fine: None, .. }));
    assert!(db.list_fines(&FineFilter::default()).await.unwrap().is_empty());
}

#[tokio::test]
async fn paying_a_fine_is_idempotent() {
    let db = test_db().await;
    let desk = circulation(&db);
    let member = add_member(&db, "Ada", "555-0001", Role::User).await;
    let book = add_book(&db, "Dune", 1).await;

    let receipt = desk
        .issue(member.id, book.id, day(2023, 12, 18), false)
        .await
        .unwrap();
    desk.process_return(receipt.loan.id, day(2024, 1, 3))
        .await
        .unwrap();
    let fine_id = db.list_fines(&FineFilter::default()).await.unwrap()[0].fine.id;

    let first = desk.pay_fine(fine_id, day(2024, 1, 4)).await.unwrap();
    assert!(matches!(first, PaymentOutcome::Paid(_)));
    assert_eq!(first.details().fine.payment_date, Some(day(2024, 1, 4)));

    let second = desk.pay_fine(fine_id, day(2024, 2, 1)).await.unwrap();
    assert!(matches!(second, PaymentOutcome::AlreadyPaid(_)));
    assert_eq!(second.details().fine.status, FineStatus::Paid);
    assert_eq!(second.details().fine.payment_date, Some(day(2024, 1, 4)));

    let summary = db.fine_summary().await.unwrap();
    assert_eq!(summary.paid, 1);
    assert_eq!(summary.pending, 0);
    assert_eq!(summary.pending_amount, 0);

    let err = desk.pay_fine(fine_id + 100, day(2024, 2, 1)).await.unwrap_err();
    assert!(matches!(err, PortError::NotFound(_)));
}

#[tokio::test]
async fn reserving_twice_keeps_one_reservation() {
    let db = test_db().await;
    let desk = circulation(&db);
    let member = add_member(&db, "Ada", "555-0001", Role::User).await;
    let book = add_book(&db, "Dune", 1).await;

    let first = desk.reserve(&member, book.id).await.unwrap();
    let second = desk.reserve(&member, book.id).await.unwrap();
    assert!(matches!(first, ReserveOutcome::Created(_)));
    assert!(matches!(second, ReserveOutcome::AlreadyActive(_)));
    assert_eq!(first.reservation().id, second.reservation().id);
    assert_eq!(db.count_active_reservations().await.unwrap(), 1);

    let err = desk.reserve(&member, 999).await.unwrap_err();
    assert!(matches!(err, PortError::NotFound(_)));
}

#[tokio::test]
async fn issuing_from_a_reservation_consumes_it() {
    let db = test_db().await;
    let desk = circulation(&db);
    let member = add_member(&db, "Ada", "555-0001", Role::User).await;
    let book = add_book(&db, "Dune", 1).await;

    let err = desk
        .issue(member.id, book.id, day(2024, 1, 1), true)
        .await
        .unwrap_err();
    assert!(matches!(err, PortError::NotFound(_)));

    desk.reserve(&member, book.id).await.unwrap();
    let receipt = desk
        .issue(member.id, book.id, day(2024, 1, 1), true)
        .await
        .unwrap();
    assert!(receipt.fulfilled_reservation);
    assert_eq!(db.count_active_reservations().await.unwrap(), 0);
}

#[tokio::test]
async fn failed_issue_keeps_the_reservation() {
    let db = test_db().await;
    let desk = circulation(&db);
    let holder = add_member(&db, "Ada", "555-0001", Role::User).await;
    let waiting = add_member(&db, "Grace", "555-0002", Role::User).await;
    let book = add_book(&db, "Dune", 1).await;

    desk.issue(holder.id, book.id, day(2024, 1, 1), false)
        .await
        .unwrap();
    desk.reserve(&waiting, book.id).await.unwrap();

    let err = desk
        .issue(waiting.id, book.id, day(2024, 1, 2), true)
        .await
        .unwrap_err();
    assert!(matches!(err, PortError::Conflict(_)));
    assert_eq!(db.count_active_reservations().await.unwrap(), 1);
}

#[tokio::test]
async fn racing_for_the_last_copy_admits_one_borrower() {
    let db = test_db().await;
    let desk = circulation(&db);
    let mut borrowers = Vec::new();
    for (name, mob_no) in [("Ada", "555-0001"), ("Grace", "555-0002"), ("Edsger", "555-0003")] {
        borrowers.push(add_member(&db, name, mob_no, Role::User).await);
    }
    let book = add_book(&db, "Dune", 1).await;

    let results = futures::future::join_all(
        borrowers
            .iter()
            .map(|m| desk.issue(m.id, book.id, day(2024, 1, 1), false)),
    )
    .await;
    let issued = results.iter().filter(|r| r.is_ok()).count();
    let conflicts = results
        .iter()
        .filter(|r| matches!(r, Err(PortError::Conflict(_))))
        .count();
    assert_eq!(issued, 1);
    assert_eq!(conflicts, 2);

    let availability = db.get_book(book.id).await.unwrap();
    assert_eq!(availability.active_loans, 1);
    assert_eq!(availability.available_copies, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_connections_cannot_overissue_the_last_copy() {
    const BORROWERS: usize = 12;

    let dir = tempfile::tempdir().expect("temp dir");
    let db = file_db(&dir, 8).await;
    let desk = circulation(&db);
    let mut member_ids = Vec::with_capacity(BORROWERS);
    for i in 0..BORROWERS {
        let name = format!("Borrower{}", i);
        let member = add_member(&db, &name, &format!("555-1{:03}", i), Role::User).await;
        member_ids.push(member.id);
    }
    let book_id = add_book(&db, "Dune", 1).await.id;

    let handles: Vec<_> = member_ids
        .into_iter()
        .map(|member_id| {
            let desk = desk.clone();
            tokio::spawn(async move {
                desk.issue(member_id, book_id, day(2024, 1, 1), false)
                    .await
            })
        })
        .collect();

    let mut issued = 0;
    let mut conflicts = 0;
    for handle in handles {
        match handle.await.expect("task completes") {
            Ok(_) => issued += 1,
            Err(PortError::Conflict(_)) => conflicts += 1,
            Err(other) => panic!("unexpected issue failure: {:?}", other),
        }
    }
    assert_eq!(issued, 1);
    assert_eq!(conflicts, BORROWERS - 1);

    let availability = db.get_book(book_id).await.unwrap();
    assert_eq!(availability.active_loans, 1);
    assert_eq!(availability.available_copies, 0);
}

#[tokio::test]
async fn stock_cannot_drop_below_active_loans() {
    let db = test_db().await;
    let desk = circulation(&db);
    let member = add_member(&db, "Ada", "555-0001", Role::User).await;
    let book = add_book(&db, "Dune", 2).await;
    desk.issue(member.id, book.id, day(2024, 1, 1), false)
        .await
        .unwrap();
    desk.issue(member.id, book.id, day(2024, 1, 1), false)
        .await
        .unwrap();

    let mut draft = library_core::domain::BookDraft {
        title: book.title.clone(),
        author: book.author.clone(),
        category: book.category.clone(),
        publisher: book.publisher.clone(),
        year: book.year,
        edition: book.edition.clone(),
        total_stock: 1,
    };
    let err = db.update_book(book.id, &draft).await.unwrap_err();
    assert!(matches!(err, PortError::Conflict(_)));

    draft.total_stock = 3;
    let updated = db.update_book(book.id, &draft).await.unwrap();
    assert_eq!(updated.total_stock, 3);
    assert_eq!(db.get_book(book.id).await.unwrap().available_copies, 1);
}

#[tokio::test]
async fn referenced_books_and_members_cannot_be_deleted() {
    let db = test_db().await;
    let desk = circulation(&db);
    let member = add_member(&db, "Ada", "555-0001", Role::User).await;
    let book = add_book(&db, "Dune", 1).await;
    let spare = add_book(&db, "Unread", 1).await;
    desk.issue(member.id, book.id, day(2024, 1, 1), false)
        .await
        .unwrap();

    assert!(matches!(
        db.delete_book(book.id).await,
        Err(PortError::Conflict(_))
    ));
    assert!(matches!(
        db.delete_member(member.id).await,
        Err(PortError::Conflict(_))
    ));
    db.delete_book(spare.id).await.expect("unreferenced book deletes");
    assert!(matches!(
        db.get_book(spare.id).await,
        Err(PortError::NotFound(_))
    ));
}

#[tokio::test]
async fn reservations_and_notifications_also_block_deletes() {
    let db = test_db().await;
    let desk = circulation(&db);
    let reader = add_member(&db, "Ada", "555-0001", Role::User).await;
    let notified = add_member(&db, "Grace", "555-0002", Role::User).await;
    let reserved = add_book(&db, "Dune", 1).await;

    desk.reserve(&reader, reserved.id).await.unwrap();
    db.notify(notified.id, "Welcome to the library.").await.unwrap();

    let err = db.delete_book(reserved.id).await.unwrap_err();
    assert!(matches!(err, PortError::Conflict(msg) if msg.contains("still referenced")));
    assert!(matches!(
        db.delete_member(reader.id).await,
        Err(PortError::Conflict(_))
    ));
    assert!(matches!(
        db.delete_member(notified.id).await,
        Err(PortError::Conflict(_))
    ));
}

#[tokio::test]
async fn deleting_a_loan_removes_its_fine() {
    let db = test_db().await;
    let desk = circulation(&db);
    let member = add_member(&db, "Ada", "555-0001", Role::User).await;
    let book = add_book(&db, "Dune", 1).await;

    let receipt = desk
        .issue(member.id, book.id, day(2023, 12, 18), false)
        .await
        .unwrap();
    desk.process_return(receipt.loan.id, day(2024, 1, 2))
        .await
        .unwrap();
    assert_eq!(db.fine_summary().await.unwrap().total, 1);

    desk.delete_loan(receipt.loan.id).await.unwrap();
    assert_eq!(db.fine_summary().await.unwrap().total, 0);
    assert!(matches!(
        db.get_loan(receipt.loan.id, day(2024, 1, 2)).await,
        Err(PortError::NotFound(_))
    ));
    assert!(matches!(
        desk.delete_loan(receipt.loan.id).await,
        Err(PortError::NotFound(_))
    ));
}

#[tokio::test]
async fn loan_filters_and_summary_track_overdue_loans() {
    let db = test_db().await;
    let desk = circulation(&db);
    let ada = add_member(&db, "Ada", "555-0001", Role::User).await;
    let grace = add_member(&db, "Grace", "555-0002", Role::User).await;
    let book = add_book(&db, "Dune", 3).await;

    let old = desk
        .issue(ada.id, book.id, day(2024, 1, 1), false)
        .await
        .unwrap();
    desk.issue(grace.id, book.id, day(2024, 1, 20), false)
        .await
        .unwrap();
    let returned = desk
        .issue(grace.id, book.id, day(2024, 1, 2), false)
        .await
        .unwrap();
    desk.process_return(returned.loan.id, day(2024, 1, 5))
        .await
        .unwrap();

    let today = day(2024, 1, 25);
    let overdue = db
        .list_loans(
            &LoanFilter {
                status: Some(LoanStatusFilter::Overdue),
                ..LoanFilter::default()
            },
            today,
        )
        .await
        .unwrap();
    assert_eq!(overdue.len(), 1);
    assert_eq!(overdue[0].loan.id, old.loan.id);
    assert_eq!(overdue[0].days_overdue, 10);

    let graces = db
        .list_loans(
            &LoanFilter {
                member_id: Some(grace.id),
                ..LoanFilter::default()
            },
            today,
        )
        .await
        .unwrap();
    assert_eq!(graces.len(), 2);

    let by_name = db
        .list_loans(
            &LoanFilter {
                member_name: Some("race test".to_string()),
                ..LoanFilter::default()
            },
            today,
        )
        .await
        .unwrap();
    assert_eq!(by_name.len(), 2);
    assert!(by_name.iter().all(|d| d.member_name == "Grace Tester"));

    let summary = db.loan_summary(today).await.unwrap();
    assert_eq!(summary.total, 3);
    assert_eq!(summary.active, 2);
    assert_eq!(summary.returned, 1);
    assert_eq!(summary.overdue, 1);

    let dashboard = db.member_summary(ada.id, today).await.unwrap();
    assert_eq!(dashboard.active_loans, 1);
    assert_eq!(dashboard.overdue_loans, 1);
}

#[tokio::test]
async fn transitions_notify_members_and_admins() {
    let db = test_db().await;
    let desk = circulation(&db);
    let admin = add_member(&db, "Root", "555-0000", Role::Admin).await;
    let member = add_member(&db, "Ada", "555-0001", Role::User).await;
    let book = add_book(&db, "Dune", 1).await;

    desk.reserve(&member, book.id).await.unwrap();
    // Re-reserving sends nothing new.
    desk.reserve(&member, book.id).await.unwrap();
    let receipt = desk
        .issue(member.id, book.id, day(2023, 12, 18), true)
        .await
        .unwrap();
    desk.process_return(receipt.loan.id, day(2024, 1, 6))
        .await
        .unwrap();
    let fine_id = db.list_fines(&FineFilter::default()).await.unwrap()[0].fine.id;
    desk.pay_fine(fine_id, day(2024, 1, 7)).await.unwrap();

    // Reserve, issue, return and payment.
    assert_eq!(db.unread_count(member.id).await.unwrap(), 4);
    // Reserve request, return and payment.
    assert_eq!(db.unread_count(admin.id).await.unwrap(), 3);

    let inbox = db.list_recent(member.id, 20).await.unwrap();
    assert!(inbox
        .iter()
        .any(|n| n.message == "You have reserved 'Dune'."));
    assert!(inbox
        .iter()
        .any(|n| n.message == "'Dune' has been issued to you. Due back on 2024-01-01."));
    let admin_inbox = db.list_recent(admin.id, 20).await.unwrap();
    assert!(admin_inbox
        .iter()
        .any(|n| n.message == "Book 'Dune' returned by Ada Tester"));
    assert!(admin_inbox
        .iter()
        .any(|n| n.message == format!("Fine paid for 'Dune' by member ID {}", member.id)));

    let first = &inbox[0];
    db.mark_read(member.id, first.id).await.unwrap();
    assert_eq!(db.unread_count(member.id).await.unwrap(), 3);
    assert!(matches!(
        db.mark_read(admin.id, first.id).await,
        Err(PortError::NotFound(_))
    ));
    assert_eq!(db.mark_all_read(member.id).await.unwrap(), 3);
    assert_eq!(db.unread_count(member.id).await.unwrap(), 0);

    let activity = db.recent_activity(50).await.unwrap();
    let kinds: Vec<&str> = activity.iter().map(|e| e.event.kind.as_str()).collect();
    assert_eq!(
        kinds,
        vec!["pay_fine", "return_book", "issue_book", "reserve_book", "reserve_book"]
    );
    assert_eq!(activity[0].book_title.as_deref(), Some("Dune"));
}

#[tokio::test]
async fn members_cancel_only_their_own_reservations() {
    let db = test_db().await;
    let desk = circulation(&db);
    let admin = add_member(&db, "Root", "555-0000", Role::Admin).await;
    let ada = add_member(&db, "Ada", "555-0001", Role::User).await;
    let grace = add_member(&db, "Grace", "555-0002", Role::User).await;
    let book = add_book(&db, "Dune", 1).await;

    let ada_res = desk.reserve(&ada, book.id).await.unwrap().reservation().id;
    let grace_res = desk.reserve(&grace, book.id).await.unwrap().reservation().id;

    let err = desk.cancel_reservation(&grace, ada_res).await.unwrap_err();
    assert!(matches!(err, PortError::Forbidden(_)));

    desk.cancel_reservation(&grace, grace_res).await.unwrap();
    desk.cancel_reservation(&admin, ada_res).await.unwrap();
    assert_eq!(db.count_active_reservations().await.unwrap(), 0);

    let err = desk.cancel_reservation(&ada, ada_res).await.unwrap_err();
    assert!(matches!(err, PortError::NotFound(_)));
}

#[tokio::test]
async fn duplicate_mobile_numbers_are_rejected() {
    let db = test_db().await;
    add_member(&db, "Ada", "555-0001", Role::User).await;

    let draft = library_core::domain::MemberDraft {
        first_name: "Imposter".to_string(),
        last_name: "Tester".to_string(),
        address: String::new(),
        mob_no: "555-0001".to_string(),
        email: "imposter@example.com".to_string(),
        role: Role::User,
    };
    let err = db.create_member(&draft, "hash").await.unwrap_err();
    assert!(matches!(err, PortError::Conflict(_)));
}
