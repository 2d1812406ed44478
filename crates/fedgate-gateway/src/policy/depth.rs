//! Depth check: rejects operations nested deeper than the configured limit.

use crate::pipeline::AdmissionContext;
use crate::snapshot::Snapshots;

use super::decision::{CheckKind, DenyReason, Finding, Measurement};
use super::AdmissionCheck;

/// Rejects operations nested deeper than `max_depth` (top-level fields are depth 1).
#[derive(Debug, Clone)]
pub struct DepthLimiter {
    max_depth: u32,
}

impl DepthLimiter {
    pub fn new(max_depth: u32) -> Self {
        Self { max_depth }
    }

    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }
}

impl AdmissionCheck for DepthLimiter {
    fn kind(&self) -> CheckKind {
        CheckKind::Depth
    }

    fn evaluate(&self, ctx: &AdmissionContext, _snapshots: &Snapshots) -> Finding {
        // walk() keeps its own stack, so adversarial nesting cannot overflow ours
        let depth = ctx.tree.max_depth();
        let m = Measurement::Depth {
            depth,
            max_depth: self.max_depth,
        };

        if depth > self.max_depth {
            return Finding::deny(
                CheckKind::Depth,
                DenyReason::DepthExceeded,
                m,
                format!(
                    "query depth of {depth} exceeds maximum allowed depth of {}",
                    self.max_depth
                ),
            );
        }
        Finding::pass(
            CheckKind::Depth,
            m,
            format!("query depth {depth} within maximum {}", self.max_depth),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::test_support::{chain_context, snapshots};
    use proptest::prelude::*;

    #[test]
    fn eleven_levels_exceed_ten() {
        let f = DepthLimiter::new(10).evaluate(&chain_context(11), &snapshots());
        assert_eq!(f.denied, Some(DenyReason::DepthExceeded));
        assert_eq!(f.measurement, Measurement::Depth { depth: 11, max_depth: 10 });
        assert!(f.detail.contains("11") && f.detail.contains("10"));
    }

    #[test]
    fn equal_to_limit_passes() {
        let f = DepthLimiter::new(10).evaluate(&chain_context(10), &snapshots());
        assert!(!f.is_denied());
    }

    proptest! {
        #[test]
        fn denies_iff_deeper_than_max(d in 1u32..32, m in 1u32..32) {
            let f = DepthLimiter::new(m).evaluate(&chain_context(d), &snapshots());
            prop_assert_eq!(f.is_denied(), d > m);
        }
    }
}
