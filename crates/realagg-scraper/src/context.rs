//! Shared state handed to every adapter run.

use std::sync::Arc;

use realagg_core::{ListingRecord, Settings, SourceTuning};
use realagg_db::{ListingGateway, SaveOutcome};

use crate::client::FetchClient;

/// Everything an adapter needs: the shared fetch client, the listing
/// gateway, and the settings document for per-source tuning. Cheap to
/// clone; adapters receive it by reference and spawn no global state.
#[derive(Clone)]
pub struct ScrapeContext {
    pub client: FetchClient,
    pub gateway: ListingGateway,
    pub settings: Arc<Settings>,
}

impl ScrapeContext {
    #[must_use]
    pub fn new(client: FetchClient, gateway: ListingGateway, settings: Arc<Settings>) -> Self {
        Self {
            client,
            gateway,
            settings,
        }
    }

    /// Per-source tuning, falling back to defaults for a missing stanza.
    #[must_use]
    pub fn tuning(&self, source_key: &str) -> SourceTuning {
        self.settings.tuning_for(source_key)
    }

    /// Push one record through the gateway and classify the outcome.
    /// Store errors never bubble out of an item loop.
    pub async fn save_record(&self, record: ListingRecord) -> ItemOutcome {
        let source = record.source_code;
        let external_id = record.external_id.clone();
        let url = record.url.clone();

        match self.gateway.save(record).await {
            Ok(SaveOutcome::Saved { is_new: true, .. }) => ItemOutcome::SavedNew,
            Ok(SaveOutcome::Saved { is_new: false, .. }) => ItemOutcome::SavedUpdated,
            Ok(SaveOutcome::Skipped { reason }) => {
                tracing::debug!(source, external_id, reason, "listing skipped");
                ItemOutcome::Skipped
            }
            Err(e) => {
                tracing::error!(source, external_id, url, error = %e, "failed to save listing");
                ItemOutcome::Failed
            }
        }
    }
}

/// Polite inter-request pause used inside per-item loops: 300 ms plus up to
/// 700 ms of jitter, landing in the 0.3–1.0 s band the portals tolerate.
pub async fn pause_between_requests() {
    use rand::Rng;
    let jitter: u64 = rand::rng().random_range(0..700);
    tokio::time::sleep(std::time::Duration::from_millis(300 + jitter)).await;
}

/// What happened to a single candidate item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    SavedNew,
    SavedUpdated,
    Skipped,
    Failed,
}

/// Aggregated counts for one adapter run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub found: u64,
    pub saved_new: u64,
    pub saved_updated: u64,
    pub skipped: u64,
    pub failed: u64,
}

impl RunSummary {
    #[must_use]
    pub fn saved(&self) -> u64 {
        self.saved_new + self.saved_updated
    }

    pub fn absorb(&mut self, outcome: ItemOutcome) {
        match outcome {
            ItemOutcome::SavedNew => self.saved_new += 1,
            ItemOutcome::SavedUpdated => self.saved_updated += 1,
            ItemOutcome::Skipped => self.skipped += 1,
            ItemOutcome::Failed => self.failed += 1,
        }
    }

    pub fn merge(&mut self, other: RunSummary) {
        self.found += other.found;
        self.saved_new += other.saved_new;
        self.saved_updated += other.saved_updated;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }
}
