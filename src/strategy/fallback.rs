//! Fallback chain construction
//!
//! A chain is built once, from a primary strategy and an ordered ladder of
//! progressively simpler candidates. Each link owns the next one, so the
//! result is a finite list that cannot loop back on itself.

use std::collections::HashSet;

use crate::strategy::templates::GENERIC_RETRY;
use crate::types::RecoveryStrategy;

/// Attach a fallback chain of at most `max_depth` links to `primary`.
///
/// Candidates whose id already appears in the chain are skipped, and the
/// chain ends at the generic retry since nothing is simpler than it.
/// Any chain already on `primary` is replaced.
pub fn build_chain(
    primary: RecoveryStrategy,
    ladder: &[RecoveryStrategy],
    max_depth: usize,
) -> RecoveryStrategy {
    let mut used: HashSet<String> = HashSet::new();
    used.insert(primary.id.clone());

    let mut links: Vec<RecoveryStrategy> = Vec::new();
    if primary.id != GENERIC_RETRY {
        for candidate in ladder {
            if links.len() >= max_depth {
                break;
            }
            if !used.insert(candidate.id.clone()) {
                continue;
            }
            links.push(candidate.detached());
            if candidate.id == GENERIC_RETRY {
                break;
            }
        }
    }

    let mut tail: Option<Box<RecoveryStrategy>> = None;
    for mut link in links.into_iter().rev() {
        link.fallback_strategy = tail;
        tail = Some(Box::new(link));
    }

    RecoveryStrategy {
        fallback_strategy: tail,
        ..primary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::templates::{self, fallback_ladder, REFRESH_AND_RETRY, WAIT_AND_RETRY};
    use crate::types::ErrorType;
    use quickcheck_macros::quickcheck;

    #[test]
    fn test_chain_skips_primary_and_ends_at_generic() {
        let chain = build_chain(
            templates::wait_and_retry(),
            &fallback_ladder(ErrorType::ElementNotFound),
            3,
        );
        assert_eq!(
            chain.chain_ids(),
            vec![WAIT_AND_RETRY, REFRESH_AND_RETRY, GENERIC_RETRY]
        );
        assert!(chain.chain_is_acyclic());
    }

    #[test]
    fn test_generic_retry_gets_no_fallback() {
        let chain = build_chain(
            templates::generic_retry(),
            &fallback_ladder(ErrorType::Unknown),
            3,
        );
        assert_eq!(chain.fallback_depth(), 0);
    }

    #[test]
    fn test_depth_is_bounded() {
        let ladder = vec![
            templates::refresh_and_retry(),
            templates::network_optimization(),
            templates::navigate_back_and_retry(),
            templates::backoff_and_retry(),
            templates::generic_retry(),
        ];
        let chain = build_chain(templates::alternative_selector(), &ladder, 2);
        assert_eq!(chain.fallback_depth(), 2);
    }

    #[test]
    fn test_existing_chain_is_replaced() {
        let mut primary = templates::scroll_and_search();
        primary.fallback_strategy = Some(Box::new(templates::scroll_and_search()));
        let chain = build_chain(primary, &[templates::generic_retry()], 3);
        assert_eq!(chain.chain_ids(), vec!["scroll_and_search", GENERIC_RETRY]);
    }

    #[quickcheck]
    fn prop_chain_bounded_and_acyclic(picks: Vec<u8>, primary_pick: u8) -> bool {
        let pool = [
            templates::wait_and_retry(),
            templates::alternative_selector(),
            templates::refresh_and_retry(),
            templates::network_optimization(),
            templates::backoff_and_retry(),
            templates::generic_retry(),
        ];
        let ladder: Vec<RecoveryStrategy> = picks
            .iter()
            .map(|p| pool[*p as usize % pool.len()].clone())
            .collect();
        let primary = pool[primary_pick as usize % pool.len()].clone();

        let chain = build_chain(primary, &ladder, 3);
        chain.fallback_depth() <= 3 && chain.chain_is_acyclic()
    }
}
