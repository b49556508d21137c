use serde::Deserialize;

/// How a batch save/delete treats a cancel request on its pre-commit event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchVeto {
    /// The batch notification is informational; cancel requests are ignored.
    #[default]
    Ignore,
    /// A cancel request marks every record cancelled and skips the write.
    Honor,
}

/// Ledger-wide settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Whether the plain (non-`_with`) ledger methods raise notifications.
    pub raise_events: bool,
    pub batch_veto: BatchVeto,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        LedgerConfig {
            raise_events: true,
            batch_veto: BatchVeto::Ignore,
        }
    }
}

impl LedgerConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub(crate) fn write_opts(&self) -> WriteOpts {
        WriteOpts {
            raise_events: self.raise_events,
        }
    }
}

/// Options for a single write operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOpts {
    /// Raise the pre- and post-commit notifications.
    pub raise_events: bool,
}

impl Default for WriteOpts {
    fn default() -> Self {
        Self { raise_events: true }
    }
}

impl WriteOpts {
    /// Create options that skip notifications.
    pub fn silent() -> Self {
        Self {
            raise_events: false,
        }
    }
}
