//! Domain types for the Beskar loan liquidation service.
//!
//! This module provides:
//! - Lossless numeric handling via the Decimal wrapper
//! - Domain primitives: TimeMs, LoanId, BorrowerId, RequestId, Venue
//! - The Loan entity with its forward-only status machine
//! - Lifecycle events with deterministic event ids
//! - Price ticks and their tier ladders

pub mod decimal;
pub mod event;
pub mod loan;
pub mod price;
pub mod primitives;

pub use decimal::Decimal;
pub use event::LoanEvent;
pub use loan::{Loan, LoanStatus};
pub use price::{PriceTick, TierQuote, TIERS};
pub use primitives::{BorrowerId, IdParseError, LoanId, RequestId, TimeMs, Venue, MAX_ID_LEN};
