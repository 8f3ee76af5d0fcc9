//! Delta extraction against the last announced path state.
//!
//! The differ does not compare against the previous tick directly: it
//! compares against the state the downstream has been told about, and every
//! emitted record is folded back into that state. Sub-threshold delay drift
//! therefore accumulates until it crosses the threshold once.

use crate::paths::PathAttrs;

/// Delay comparison runs through the signed 32-bit domain so that stale
/// sentinel values register as changes.
pub fn delay_delta_exceeds(old_us: u32, new_us: u32, threshold_us: u32) -> bool {
    let delta = (new_us as i32 as i64) - (old_us as i32 as i64);
    delta.abs() > threshold_us as i64
}

fn pair_changed(old: &PathAttrs, new: &PathAttrs, threshold_us: u32) -> bool {
    old.active != new.active
        || old.bandwidth_kbits != new.bandwidth_kbits
        || old.next_hop != new.next_hop
        || delay_delta_exceeds(old.delay_us, new.delay_us, threshold_us)
}

/// The per-pair state as last announced, in the same packed-triangle layout
/// as the solver output.
pub struct AnnouncedPaths {
    node_count: usize,
    paths: Vec<PathAttrs>,
}

impl AnnouncedPaths {
    pub fn new(node_count: usize) -> Self {
        Self {
            node_count,
            paths: vec![PathAttrs::BLOCKED; crate::paths::pair_count(node_count)],
        }
    }

    pub fn paths(&self) -> &[PathAttrs] {
        &self.paths
    }

    /// Visit every pair whose solved attributes differ from the announced
    /// ones, folding the new attributes back in. Pairs arrive in canonical
    /// `(i, j)` order with `i < j`.
    pub fn fold_changes(
        &mut self,
        solved: &[PathAttrs],
        threshold_us: u32,
        mut visit: impl FnMut(usize, usize, &PathAttrs),
    ) {
        debug_assert_eq!(solved.len(), self.paths.len());

        let mut idx = 0;
        for i in 0..self.node_count {
            for j in (i + 1)..self.node_count {
                let new = &solved[idx];
                if pair_changed(&self.paths[idx], new, threshold_us) {
                    self.paths[idx] = *new;
                    visit(i, j, new);
                }
                idx += 1;
            }
        }
    }
}
