pub mod api;
pub mod bus;
pub mod clock;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod lifecycle;
pub mod liquidation;
pub mod ltv;
pub mod pricing;
pub mod venue;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use db::{init_db, KeyedLocks, Repository};
pub use domain::{
    BorrowerId, Decimal, Loan, LoanEvent, LoanId, LoanStatus, PriceTick, RequestId, TimeMs, Venue,
};
pub use error::AppError;
