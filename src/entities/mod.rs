//! Persistent ledger entities.

pub mod cashout_request;
pub mod fundraiser;
pub mod payout;
pub mod transaction;
pub mod volunteer_signup;
pub mod webhook_event;

pub use cashout_request::Entity as CashoutRequest;
pub use fundraiser::{Entity as Fundraiser, FundraiserKind};
pub use payout::{Entity as Payout, PayoutMethod, PayoutStatus};
pub use transaction::{
    Entity as Transaction, Processor, SettlementStatus, SubjectKind, TransactionStatus,
};
pub use volunteer_signup::Entity as VolunteerSignup;
pub use webhook_event::Entity as WebhookEvent;
