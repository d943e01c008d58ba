//! Target selection for changed documents.
//!
//! The router holds the run-scoped rotation counter for the round-robin
//! strategy. The counter advances only when a changed document is actually
//! routed, so unchanged documents never skew the distribution.

use kbsync_shared::{KnowledgeBaseTarget, RoutingStrategy};

/// Chooses destination targets for one run.
#[derive(Debug)]
pub struct Router {
    strategy: RoutingStrategy,
    rotation: usize,
}

impl Router {
    pub fn new(strategy: RoutingStrategy) -> Self {
        Self {
            strategy,
            rotation: 0,
        }
    }

    /// Indices of the targets a changed document goes to, advancing the
    /// rotation for round-robin. Empty when no target is available.
    pub fn select(&mut self, targets: &[KnowledgeBaseTarget]) -> Vec<usize> {
        let chosen = self.peek(targets);
        if self.strategy == RoutingStrategy::RoundRobin && !chosen.is_empty() {
            self.rotation += 1;
        }
        chosen
    }

    /// The targets `select` would choose right now, without advancing the
    /// rotation. Used to attribute skipped documents.
    pub fn peek(&self, targets: &[KnowledgeBaseTarget]) -> Vec<usize> {
        let available: Vec<usize> = targets
            .iter()
            .enumerate()
            .filter(|(_, t)| t.available)
            .map(|(i, _)| i)
            .collect();

        if available.is_empty() {
            return Vec::new();
        }

        match self.strategy {
            RoutingStrategy::Primary => vec![available[0]],
            RoutingStrategy::All => available,
            RoutingStrategy::RoundRobin => vec![available[self.rotation % available.len()]],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use kbsync_shared::ProcessingConfig;

    fn processing() -> ProcessingConfig {
        ProcessingConfig {
            segmentation_mode: "automatic".into(),
            indexing_mode: "high_quality".into(),
            retrieval_mode: "semantic_search".into(),
        }
    }

    fn targets(n: usize) -> Vec<KnowledgeBaseTarget> {
        (0..n)
            .map(|i| KnowledgeBaseTarget::available(format!("kb-{i}"), processing()))
            .collect()
    }

    #[test]
    fn primary_picks_first_available() {
        let mut router = Router::new(RoutingStrategy::Primary);
        let mut ts = targets(3);
        assert_eq!(router.select(&ts), vec![0]);

        ts[0].mark_unavailable("HTTP 403");
        assert_eq!(router.select(&ts), vec![1]);
    }

    #[test]
    fn all_picks_every_available() {
        let mut router = Router::new(RoutingStrategy::All);
        let mut ts = targets(3);
        assert_eq!(router.select(&ts), vec![0, 1, 2]);

        ts[1].mark_unavailable("HTTP 404");
        assert_eq!(router.select(&ts), vec![0, 2]);
    }

    #[test]
    fn round_robin_rotates_per_selection() {
        let mut router = Router::new(RoutingStrategy::RoundRobin);
        let ts = targets(2);

        let picks: Vec<usize> = (0..4).map(|_| router.select(&ts)[0]).collect();
        assert_eq!(picks, vec![0, 1, 0, 1]);
    }

    #[test]
    fn round_robin_skips_unavailable() {
        let mut router = Router::new(RoutingStrategy::RoundRobin);
        let mut ts = targets(3);
        ts[1].mark_unavailable("HTTP 403");

        let picks: Vec<usize> = (0..4).map(|_| router.select(&ts)[0]).collect();
        assert_eq!(picks, vec![0, 2, 0, 2]);
    }

    #[test]
    fn peek_does_not_advance_rotation() {
        let mut router = Router::new(RoutingStrategy::RoundRobin);
        let ts = targets(2);

        assert_eq!(router.peek(&ts), vec![0]);
        assert_eq!(router.peek(&ts), vec![0]);
        assert_eq!(router.select(&ts), vec![0]);
        assert_eq!(router.peek(&ts), vec![1]);
    }

    #[test]
    fn no_available_targets_yields_empty() {
        let mut router = Router::new(RoutingStrategy::All);
        let mut ts = targets(2);
        ts[0].mark_unavailable("x");
        ts[1].mark_unavailable("y");

        assert!(router.select(&ts).is_empty());
        assert!(router.peek(&ts).is_empty());
    }
}
