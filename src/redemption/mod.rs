//! Redemption model - the "offer redeemed" fact and the filters used to find it.

mod query;
mod record;

pub use query::RedemptionQuery;
pub use record::{InvoiceRef, OfferContext, RedemptionRecord};
