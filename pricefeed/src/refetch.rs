//! Background revalidation of tracked pairs.
//!
//! Sources with `refetch: true` get their cached entries refreshed shortly
//! before expiry so hot pairs never surface a miss. The lead time is
//! `min(ttl / 4, 2 s)`, minus a little jitter so same-TTL pairs spread
//! out. One shared ticker drives every source; a missed deadline simply
//! coalesces into the next tick, and the single-flight layer absorbs
//! overlapping refreshes.

use std::time::Duration;

use rand::Rng;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::orchestrator::QuoteOrchestrator;

const TICK: Duration = Duration::from_millis(500);
const MAX_LEAD: Duration = Duration::from_secs(2);
const JITTER_PERCENT: u64 = 10;

fn jittered_lead(ttl: Duration) -> Duration {
    let lead = (ttl / 4).min(MAX_LEAD);
    let lead_ms = u64::try_from(lead.as_millis()).unwrap_or(u64::MAX);
    let jitter_range = (lead_ms * JITTER_PERCENT / 100).max(1);
    let jitter = rand::rng().random_range(0..jitter_range);
    Duration::from_millis(lead_ms.saturating_sub(jitter))
}

/// Spawn the refetch ticker. Stops when `stop` flips to `true`.
pub fn spawn(orchestrator: QuoteOrchestrator, mut stop: watch::Receiver<bool>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let refetch_sources: Vec<_> = orchestrator
            .configs()
            .iter()
            .filter(|(_, cfg)| cfg.enabled && cfg.refetch)
            .map(|(source, cfg)| (*source, cfg.ttl()))
            .collect();
        if refetch_sources.is_empty() {
            return;
        }

        let mut ticker = tokio::time::interval(TICK);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = stop.changed() => {
                    if *stop.borrow() {
                        return;
                    }
                }
                _ = ticker.tick() => {}
            }

            for (source, ttl) in &refetch_sources {
                let lead = jittered_lead(*ttl);
                for pair in orchestrator.registry().pairs_for(*source) {
                    let due = match orchestrator.cache().time_to_expiry(*source, &pair) {
                        Some(left) => left <= lead,
                        // Expired or never fetched: revalidate now.
                        None => true,
                    };
                    if !due {
                        continue;
                    }
                    let orchestrator = orchestrator.clone();
                    let source = *source;
                    tokio::spawn(async move {
                        if let Err(err) = orchestrator.refresh(source, &pair).await {
                            debug!(
                                target = "pricefeed::refetch",
                                %source,
                                %pair,
                                %err,
                                "background refresh failed"
                            );
                        }
                    });
                }
            }
        }
    })
}
