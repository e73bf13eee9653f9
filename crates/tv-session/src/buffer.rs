//! Bandwidth-tiered buffer sizing policy.
//!
//! Maps the engine's throughput estimate to buffer durations and decides
//! when a target change is large enough to justify rebuilding the engine.

use tv_bridge_types::BufferTarget;

const DEFAULT_TARGET_BUFFER_MS: u64 = 12_000;
const MEDIUM_TARGET_BUFFER_MS: u64 = 16_000;
const HIGH_TARGET_BUFFER_MS: u64 = 20_000;
const MAX_TARGET_BUFFER_MS: u64 = 20_000;
const MIN_BUFFER_CLAMP_MS: u64 = 7_500;

/// Target changes at or below this magnitude never trigger a rebuild.
const REBUILD_HYSTERESIS_MS: u64 = 2_000;

/// Select buffer durations for a bandwidth estimate in bits per second.
///
/// Total over all inputs; an estimate of 0 (unknown) maps to the default
/// tier. The target is capped at a provider-independent ceiling.
pub(crate) fn select_target(estimated_bitrate_bps: u64) -> BufferTarget {
    let target_buffer_ms = if estimated_bitrate_bps == 0 {
        DEFAULT_TARGET_BUFFER_MS
    } else if estimated_bitrate_bps >= 12_000_000 {
        MAX_TARGET_BUFFER_MS
    } else if estimated_bitrate_bps >= 6_000_000 {
        HIGH_TARGET_BUFFER_MS
    } else if estimated_bitrate_bps >= 3_000_000 {
        MEDIUM_TARGET_BUFFER_MS
    } else {
        DEFAULT_TARGET_BUFFER_MS
    };
    BufferTarget {
        min_buffer_ms: (target_buffer_ms / 2).min(MIN_BUFFER_CLAMP_MS),
        target_buffer_ms,
    }
}

/// `true` when the desired target differs from the configured one by more
/// than the hysteresis threshold. Necessary and sufficient for a rebuild.
pub(crate) fn needs_rebuild(current: BufferTarget, desired: BufferTarget) -> bool {
    current.target_buffer_ms.abs_diff(desired.target_buffer_ms) > REBUILD_HYSTERESIS_MS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_estimate_maps_to_default() {
        assert_eq!(select_target(0).target_buffer_ms, DEFAULT_TARGET_BUFFER_MS);
    }

    #[test]
    fn tier_boundaries() {
        assert_eq!(select_target(2_999_999).target_buffer_ms, 12_000);
        assert_eq!(select_target(3_000_000).target_buffer_ms, 16_000);
        assert_eq!(select_target(6_000_000).target_buffer_ms, 20_000);
        assert_eq!(select_target(12_000_000).target_buffer_ms, 20_000);
        assert_eq!(select_target(u64::MAX).target_buffer_ms, 20_000);
    }

    #[test]
    fn min_is_at_most_half_of_target() {
        let samples = [
            0,
            1,
            1_000_000,
            2_999_999,
            3_000_000,
            5_999_999,
            6_000_000,
            11_999_999,
            12_000_000,
            u64::MAX,
        ];
        for bps in samples {
            let t = select_target(bps);
            assert!(
                t.min_buffer_ms <= t.target_buffer_ms / 2,
                "min {} vs target {} at {} bps",
                t.min_buffer_ms,
                t.target_buffer_ms,
                bps
            );
            assert!(t.min_buffer_ms <= MIN_BUFFER_CLAMP_MS);
        }
    }

    #[test]
    fn target_is_monotone_in_bitrate() {
        let mut last = 0;
        for bps in (0..20_000_000).step_by(500_000) {
            let t = select_target(bps).target_buffer_ms;
            assert!(t >= last, "target dropped at {bps} bps");
            last = t;
        }
    }

    #[test]
    fn rebuild_requires_more_than_threshold() {
        let base = BufferTarget {
            min_buffer_ms: 6_000,
            target_buffer_ms: 12_000,
        };
        let close = BufferTarget {
            min_buffer_ms: 7_000,
            target_buffer_ms: 14_000,
        };
        let far = BufferTarget {
            min_buffer_ms: 7_000,
            target_buffer_ms: 14_001,
        };
        assert!(!needs_rebuild(base, close));
        assert!(needs_rebuild(base, far));
        assert!(needs_rebuild(far, base));
        assert!(!needs_rebuild(base, base));
    }

    #[test]
    fn oscillating_samples_within_a_tier_never_rebuild() {
        let mut current = select_target(7_000_000);
        let mut rebuilds = 0;
        for bps in [13_000_000, 7_000_000, 13_000_000, 7_000_000] {
            let desired = select_target(bps);
            if needs_rebuild(current, desired) {
                rebuilds += 1;
                current = desired;
            }
        }
        assert_eq!(rebuilds, 0);
    }

    #[test]
    fn oscillating_samples_across_tiers_rebuild_each_flip() {
        let mut current = select_target(2_000_000);
        let mut rebuilds = 0;
        for bps in [4_000_000, 2_000_000, 4_000_000] {
            let desired = select_target(bps);
            if needs_rebuild(current, desired) {
                rebuilds += 1;
                current = desired;
            }
        }
        assert_eq!(rebuilds, 3);
    }
}
