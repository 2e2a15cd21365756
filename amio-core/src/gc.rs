//! Periodic mark-and-sweep over every clip (and playspec) reachable from any interface.
//!
//! Grounded on `original_source/amio/gc.c`. Runs on the control thread only, after each
//! `PLAYSPEC_APPLIED` notification (per §4.8): prepare clears every clip's
//! `referenced_by_realtime` vector, mark walks each interface's control-side shadow of its
//! current and pending playspec (never the realtime-owned ids themselves - the whole point of
//! the shadow is that control can read it without touching realtime state), and sweep
//! destroys anything left unreferenced.

use crate::clip::{ClipStore, MAX_INTERFACES};
use crate::ids::InterfaceId;
use crate::interface::ControlShadow;
use crate::playspec::PlayspecStore;

/// Runs one full GC pass. `shadows` is every interface's current control-side shadow, keyed
/// by its id; the key is reduced mod [`MAX_INTERFACES`] to index into a clip's
/// `referenced_by_realtime` array, mirroring the original's fixed-size interface table.
pub fn run<'a>(
    clips: &mut ClipStore,
    playspecs: &mut PlayspecStore,
    shadows: impl IntoIterator<Item = (InterfaceId, &'a ControlShadow)>,
) {
    // 1. Prepare.
    clips.for_each_mut(|_, clip| clip.referenced_by_realtime = [false; MAX_INTERFACES]);

    // 2. Mark.
    for (interface_id, shadow) in shadows {
        let key = (interface_id.0 as usize) % MAX_INTERFACES;
        for playspec_id in [shadow.current_playspec, shadow.pending_playspec].into_iter().flatten() {
            let Some(playspec) = playspecs.get(playspec_id) else {
                continue;
            };
            for entry in &playspec.entries {
                if let Some(clip) = clips.get_mut(entry.clip_id) {
                    clip.referenced_by_realtime[key] = true;
                }
            }
        }
    }

    // 3. Sweep.
    clips.retain(|clip| clip.is_referenced());
    playspecs.sweep_unreferenced();
}
