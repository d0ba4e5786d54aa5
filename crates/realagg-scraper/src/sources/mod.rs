//! The portal adapters.
//!
//! Every adapter implements the same contract: given the shared context and
//! the rescan mode, discover listing URLs (bounded by a per-mode page cap),
//! fetch details, normalize into [`realagg_core::ListingRecord`], and push
//! each record through the gateway. Per-item failures are logged and
//! counted; only adapter-level fatals (unreachable host, broken discovery)
//! surface as errors, and the runner isolates those per source.

mod century21;
mod delux;
mod hvreality;
mod idnes;
mod lexamo;
mod mmreality;
mod nemovitosti_znojmo;
mod premia;
mod prodejmeto;
mod reas;
mod remax;
mod sreality;
mod znojmoreality;

use crate::context::{RunSummary, ScrapeContext};
use crate::error::ScrapeError;

/// Tagged variant per portal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Source {
    Sreality,
    Reas,
    Idnes,
    Century21,
    Remax,
    Mmr,
    Prodejmeto,
    Znojmoreality,
    NemovitostiZnojmo,
    Premia,
    Hvreality,
    Delux,
    Lexamo,
}

impl Source {
    pub const ALL: [Source; 13] = [
        Source::Sreality,
        Source::Reas,
        Source::Idnes,
        Source::Century21,
        Source::Remax,
        Source::Mmr,
        Source::Prodejmeto,
        Source::Znojmoreality,
        Source::NemovitostiZnojmo,
        Source::Premia,
        Source::Hvreality,
        Source::Delux,
        Source::Lexamo,
    ];

    /// The catalog code this adapter writes under.
    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            Source::Sreality => "SREALITY",
            Source::Reas => "REAS",
            Source::Idnes => "IDNES",
            Source::Century21 => "CENTURY21",
            Source::Remax => "REMAX",
            Source::Mmr => "MMR",
            Source::Prodejmeto => "PRODEJMETO",
            Source::Znojmoreality => "ZNOJMOREALITY",
            Source::NemovitostiZnojmo => "NEMZNOJMO",
            Source::Premia => "PREMIAREALITY",
            Source::Hvreality => "HVREALITY",
            Source::Delux => "DELUXREALITY",
            Source::Lexamo => "LEXAMO",
        }
    }

    /// Key of this adapter's stanza in the settings document.
    #[must_use]
    pub fn settings_key(self) -> &'static str {
        match self {
            Source::Sreality => "sreality",
            Source::Reas => "reas",
            Source::Idnes => "idnes",
            Source::Century21 => "century21",
            Source::Remax => "remax",
            Source::Mmr => "mmreality",
            Source::Prodejmeto => "prodejmeto",
            Source::Znojmoreality => "znojmoreality",
            Source::NemovitostiZnojmo => "nemovitostiznojmo",
            Source::Premia => "premiareality",
            Source::Hvreality => "hvreality",
            Source::Delux => "deluxreality",
            Source::Lexamo => "lexamo",
        }
    }

    /// Resolve a catalog code back to its adapter.
    #[must_use]
    pub fn from_code(code: &str) -> Option<Self> {
        Source::ALL.into_iter().find(|s| s.code() == code)
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Run one adapter to completion and log its summary line.
///
/// # Errors
///
/// Returns [`ScrapeError`] only for adapter-level fatals; per-item errors
/// are absorbed into the summary.
pub async fn run_source(
    ctx: &ScrapeContext,
    source: Source,
    full_rescan: bool,
) -> Result<RunSummary, ScrapeError> {
    tracing::info!(source = %source, full_rescan, "adapter starting");

    // A code with no catalog row is a configuration error for the whole
    // adapter, not a per-record one.
    ctx.gateway.ensure_source(source.code()).await?;

    let summary = match source {
        Source::Sreality => sreality::run(ctx, full_rescan).await?,
        Source::Reas => reas::run(ctx, full_rescan).await?,
        Source::Idnes => idnes::run(ctx, full_rescan).await?,
        Source::Century21 => century21::run(ctx, full_rescan).await?,
        Source::Remax => remax::run(ctx, full_rescan).await?,
        Source::Mmr => mmreality::run(ctx, full_rescan).await?,
        Source::Prodejmeto => prodejmeto::run(ctx, full_rescan).await?,
        Source::Znojmoreality => znojmoreality::run(ctx, full_rescan).await?,
        Source::NemovitostiZnojmo => nemovitosti_znojmo::run(ctx, full_rescan).await?,
        Source::Premia => premia::run(ctx, full_rescan).await?,
        Source::Hvreality => hvreality::run(ctx, full_rescan).await?,
        Source::Delux => delux::run(ctx, full_rescan).await?,
        Source::Lexamo => lexamo::run(ctx, full_rescan).await?,
    };

    tracing::info!(
        source = %source,
        found = summary.found,
        saved = summary.saved(),
        new = summary.saved_new,
        updated = summary.saved_updated,
        skipped = summary.skipped,
        failed = summary.failed,
        "adapter finished"
    );

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip() {
        for source in Source::ALL {
            assert_eq!(Source::from_code(source.code()), Some(source));
        }
    }

    #[test]
    fn unknown_code_is_none() {
        assert_eq!(Source::from_code("BEZREALITKY"), None);
        assert_eq!(Source::from_code(""), None);
    }

    #[test]
    fn all_covers_thirteen_portals() {
        assert_eq!(Source::ALL.len(), 13);
        let codes: std::collections::HashSet<_> =
            Source::ALL.iter().map(|s| s.code()).collect();
        assert_eq!(codes.len(), 13, "codes must be unique");
    }
}
