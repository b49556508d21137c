//! Redemption ledger - serialized, notification-gated writes over a storage seam.
//!
//! ## Example
//!
//! ```ignore
//! use offer_ledger::{InMemoryStorage, InvoiceRef, OfferContext, Operation, RedemptionLedger};
//!
//! let ledger = RedemptionLedger::new(InMemoryStorage::new());
//! ledger.bus().after(Operation::Create, |completed| {
//!     println!("redeemed {}", completed.records()[0].offer_code());
//!     Ok(())
//! });
//!
//! let offer = OfferContext::new("SAVE10", provider_key, settings_key);
//! let record = ledger.create(&offer, InvoiceRef::for_customer(invoice_key, customer_key))?;
//! assert!(!record.was_cancelled());
//! ```

mod ledger;

pub use ledger::RedemptionLedger;
