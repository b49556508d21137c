use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The offer half of a redemption: which offer was applied and who provides it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferContext {
    pub offer_code: String,
    pub offer_provider_key: Uuid,
    pub offer_settings_key: Uuid,
}

impl OfferContext {
    pub fn new(
        offer_code: impl Into<String>,
        offer_provider_key: Uuid,
        offer_settings_key: Uuid,
    ) -> Self {
        OfferContext {
            offer_code: offer_code.into(),
            offer_provider_key,
            offer_settings_key,
        }
    }
}

/// The invoice an offer was applied to, and the customer it is attributed to.
///
/// Anonymous checkouts carry no customer key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceRef {
    pub key: Uuid,
    pub customer_key: Option<Uuid>,
}

impl InvoiceRef {
    pub fn anonymous(key: Uuid) -> Self {
        InvoiceRef {
            key,
            customer_key: None,
        }
    }

    pub fn for_customer(key: Uuid, customer_key: Uuid) -> Self {
        InvoiceRef {
            key,
            customer_key: Some(customer_key),
        }
    }
}

impl From<Uuid> for InvoiceRef {
    fn from(key: Uuid) -> Self {
        InvoiceRef::anonymous(key)
    }
}

/// An "offer redeemed" fact.
///
/// Identity and foreign keys are fixed at construction; only the extended
/// data and the update date change across saves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedemptionRecord {
    key: Uuid,
    offer_code: String,
    offer_provider_key: Uuid,
    invoice_key: Uuid,
    offer_settings_key: Uuid,
    customer_key: Option<Uuid>,
    create_date: DateTime<Utc>,
    update_date: DateTime<Utc>,
    #[serde(default)]
    extended_data: BTreeMap<String, String>,
    #[serde(skip)]
    was_cancelled: bool,
}

impl RedemptionRecord {
    /// Build a not-yet-persisted record with a fresh key.
    pub fn new(offer: &OfferContext, invoice: InvoiceRef) -> Self {
        let now = Utc::now();
        RedemptionRecord {
            key: Uuid::new_v4(),
            offer_code: offer.offer_code.clone(),
            offer_provider_key: offer.offer_provider_key,
            invoice_key: invoice.key,
            offer_settings_key: offer.offer_settings_key,
            customer_key: invoice.customer_key,
            create_date: now,
            update_date: now,
            extended_data: BTreeMap::new(),
            was_cancelled: false,
        }
    }

    pub fn key(&self) -> Uuid {
        self.key
    }

    pub fn offer_code(&self) -> &str {
        &self.offer_code
    }

    pub fn offer_provider_key(&self) -> Uuid {
        self.offer_provider_key
    }

    pub fn invoice_key(&self) -> Uuid {
        self.invoice_key
    }

    pub fn offer_settings_key(&self) -> Uuid {
        self.offer_settings_key
    }

    pub fn customer_key(&self) -> Option<Uuid> {
        self.customer_key
    }

    pub fn create_date(&self) -> DateTime<Utc> {
        self.create_date
    }

    pub fn update_date(&self) -> DateTime<Utc> {
        self.update_date
    }

    pub fn extended_data(&self) -> &BTreeMap<String, String> {
        &self.extended_data
    }

    pub fn set_extended(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.extended_data.insert(name.into(), value.into());
    }

    pub fn remove_extended(&mut self, name: &str) -> Option<String> {
        self.extended_data.remove(name)
    }

    /// True when the last write operation on this record was vetoed by a
    /// subscriber and did not take effect.
    pub fn was_cancelled(&self) -> bool {
        self.was_cancelled
    }

    pub(crate) fn set_cancelled(&mut self, cancelled: bool) {
        self.was_cancelled = cancelled;
    }

    pub(crate) fn touch(&mut self) {
        self.update_date = Utc::now();
    }
}
