//! Candidate arbitration: at most one card per symbol per tick.

use propcast_core::ProposalCard;
use std::cmp::Ordering;
use tracing::info;

/// Arbitration configuration.
#[derive(Debug, Clone)]
pub struct ArbitratorConfig {
    /// Minimum interval between two dispatches for the same symbol.
    pub dedupe_window_seconds: u64,
    /// Entry distance under which same-side cards are considered similar.
    pub entry_similar_pct: f64,
    /// Stop distance under which same-side cards are considered similar.
    pub stop_similar_pct: f64,
}

/// Collapses a tick's candidates to a single winner.
pub struct Arbitrator {
    config: ArbitratorConfig,
}

impl Arbitrator {
    pub fn new(config: ArbitratorConfig) -> Self {
        Self { config }
    }

    /// Pick the winning card, or `None`.
    ///
    /// `last_dispatch_ms` is the symbol's most recent dispatch time; a
    /// dispatch inside the dedupe window suppresses every candidate.
    pub fn choose_best(
        &self,
        mut cards: Vec<ProposalCard>,
        last_dispatch_ms: Option<i64>,
        now_ms: i64,
    ) -> Option<ProposalCard> {
        if cards.is_empty() {
            return None;
        }
        let symbol = cards[0].symbol.clone();

        if let Some(last_ms) = last_dispatch_ms {
            let window_ms = (self.config.dedupe_window_seconds as i64) * 1000;
            if now_ms - last_ms <= window_ms {
                info!(symbol, reason = "dedupe_window", "arbitration dropped all candidates");
                return None;
            }
        }

        cards.sort_by(rank);

        // Similarity collapse: walk in rank order, keep a card only if no
        // better kept card on the same side sits at a similar entry and stop.
        let mut kept: Vec<ProposalCard> = Vec::with_capacity(cards.len());
        for card in cards {
            let duplicate = kept.iter().find(|existing| {
                existing.side == card.side
                    && relative_distance(existing.entry, card.entry) <= self.config.entry_similar_pct
                    && relative_distance(existing.stop, card.stop) <= self.config.stop_similar_pct
            });
            match duplicate {
                Some(winner) => {
                    info!(
                        symbol,
                        dropped = %card.strategy,
                        kept = %winner.strategy,
                        reason = "similar_entry_and_stop",
                        "arbitration collapsed candidate"
                    );
                }
                None => kept.push(card),
            }
        }

        let winner = kept.into_iter().next()?;
        info!(
            symbol,
            strategy = %winner.strategy,
            side = %winner.side,
            priority = winner.priority,
            confidence = winner.confidence,
            "arbitration winner"
        );
        Some(winner)
    }
}

/// Deterministic ranking: higher priority, then higher confidence, then
/// shorter TTL, then lexicographically smaller strategy name.
fn rank(a: &ProposalCard, b: &ProposalCard) -> Ordering {
    b.priority
        .cmp(&a.priority)
        .then(
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(Ordering::Equal),
        )
        .then(a.ttl_minutes.cmp(&b.ttl_minutes))
        .then(a.strategy.cmp(&b.strategy))
}

fn relative_distance(reference: f64, value: f64) -> f64 {
    (reference - value).abs() / reference.abs().max(1e-9)
}
