use uuid::Uuid;

use super::RedemptionRecord;

/// Conjunctive filter over the foreign keys of a redemption.
///
/// Unset fields match everything. Storage implementations backed by a real
/// database translate the set fields into a `WHERE` clause; the in-memory
/// store calls [`RedemptionQuery::matches`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RedemptionQuery {
    pub invoice_key: Option<Uuid>,
    pub customer_key: Option<Uuid>,
    pub offer_settings_key: Option<Uuid>,
    pub offer_provider_key: Option<Uuid>,
}

impl RedemptionQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn invoice(mut self, key: Uuid) -> Self {
        self.invoice_key = Some(key);
        self
    }

    pub fn customer(mut self, key: Uuid) -> Self {
        self.customer_key = Some(key);
        self
    }

    pub fn offer_settings(mut self, key: Uuid) -> Self {
        self.offer_settings_key = Some(key);
        self
    }

    pub fn offer_provider(mut self, key: Uuid) -> Self {
        self.offer_provider_key = Some(key);
        self
    }

    pub fn matches(&self, record: &RedemptionRecord) -> bool {
        self.invoice_key.map_or(true, |k| record.invoice_key() == k)
            && self
                .customer_key
                .map_or(true, |k| record.customer_key() == Some(k))
            && self
                .offer_settings_key
                .map_or(true, |k| record.offer_settings_key() == k)
            && self
                .offer_provider_key
                .map_or(true, |k| record.offer_provider_key() == k)
    }
}
