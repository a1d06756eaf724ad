pub mod circulation;
pub mod domain;
pub mod policy;
pub mod ports;

pub use circulation::Circulation;
pub use domain::{
    ActivityEntry, ActivityEvent, ActivityKind, Book, BookAvailability, BookDraft, Fine,
    FineDetails, FineStatus, IssueReceipt, Loan, LoanDetails, LoanState, Member, MemberDraft,
    Notification, PaymentOutcome, Reservation, ReserveOutcome, ReturnOutcome, Role,
};
pub use ports::{ActivityLog, LibraryStore, NotificationSink, PortError, PortResult};
