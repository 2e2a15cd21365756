//! Realtime-safe looping audio playback/capture engine core.
//!
//! Bridges a non-realtime control thread (authoring an immutable [`playspec::Playspec`]) and
//! a realtime audio callback thread (driven by [`interface::Interface::process_realtime`])
//! over lock-free SPSC queues (`ring`). See `DESIGN.md` at the workspace root for the
//! grounding ledger mapping each module back to `original_source/amio` and to the teacher
//! crate this was built from.

pub mod clip;
pub mod driver;
pub mod error;
pub mod gc;
pub mod ids;
pub mod interface;
pub mod message;
pub mod mixer;
pub mod playspec;
pub mod pool;
pub mod ring;

use clip::ClipStore;
use driver::Driver;
use ids::{InterfaceId, PlayspecId};
use interface::Interface;
use playspec::{Playspec, PlayspecStore};
use pool::Pool;
use static_assertions::const_assert;

pub const INPUT_CLIP_LENGTH: usize = message::INPUT_CLIP_LENGTH;
pub const THREAD_QUEUE_SIZE: usize = 2048;
pub const LOG_QUEUE_SIZE: usize = 65536;
pub const INPUT_CLIP_QUEUE_SIZE: usize = 2048;
pub const MAX_AUDIO_CLIPS: usize = 1024;
pub const MAX_INTERFACES: usize = clip::MAX_INTERFACES;

const_assert!(THREAD_QUEUE_SIZE.is_power_of_two());
const_assert!(LOG_QUEUE_SIZE.is_power_of_two());
const_assert!(INPUT_CLIP_QUEUE_SIZE.is_power_of_two());
const_assert!(MAX_AUDIO_CLIPS.is_power_of_two());
const_assert!(MAX_INTERFACES.is_power_of_two());

/// Owns every process-wide pool: clips, playspecs and interfaces. Replaces the original's
/// file-scope static pools (`interface.c`, `audio_clip.c`, `playspec.c`) with a single
/// struct an embedder constructs once and holds behind its own singleton (`amio-ffi` uses
/// `once_cell::sync::OnceCell`).
///
/// The playspec authoring cursor (§4.4's "only one build in progress") is *not* duplicated
/// here - it already lives as a process-wide singleton inside [`playspec`], since
/// `PlayspecBuilder` is private to that module and the single-cursor invariant is best
/// enforced where it's defined.
pub struct Engine<D: Driver> {
    pub clips: ClipStore,
    pub playspecs: PlayspecStore,
    interfaces: Pool<Interface<D>>,
}

impl<D: Driver> Engine<D> {
    pub fn new() -> Self {
        Self {
            clips: ClipStore::new(MAX_AUDIO_CLIPS),
            playspecs: PlayspecStore::new(MAX_AUDIO_CLIPS),
            interfaces: Pool::new(MAX_INTERFACES),
        }
    }

    /// Creates a new interface around `driver`, synthesizing its initial empty playspec.
    pub fn create_interface(&mut self, driver: D) -> Option<InterfaceId> {
        let empty_id = self.playspecs.insert(Playspec::empty(PlayspecId(0)))?;
        let raw_id = self.interfaces.put(Interface::new(
            InterfaceId(0),
            driver,
            empty_id,
            THREAD_QUEUE_SIZE,
            LOG_QUEUE_SIZE,
            INPUT_CLIP_QUEUE_SIZE,
        ))?;
        let id = InterfaceId(raw_id);
        // The interface was constructed with a placeholder id before its real one was known;
        // give it the real one now, same trick `PlayspecStore::insert` uses.
        self.interfaces.find_mut(raw_id).unwrap().id = id;
        Some(id)
    }

    pub fn interface(&self, id: InterfaceId) -> Option<&Interface<D>> {
        self.interfaces.find(id.0)
    }

    pub fn interface_mut(&mut self, id: InterfaceId) -> Option<&mut Interface<D>> {
        self.interfaces.find_mut(id.0)
    }

    pub fn close_interface(&mut self, id: InterfaceId) {
        self.interfaces.remove(id.0);
    }

    /// Runs one realtime callback for `id`. `None` if `id` is unknown.
    pub fn process_realtime(
        &mut self,
        id: InterfaceId,
        nframes: i64,
        port_l: &mut [f32],
        port_r: &mut [f32],
    ) -> Option<i64> {
        let iface = self.interfaces.find_mut(id.0)?;
        Some(iface.process_realtime(nframes, port_l, port_r, &self.clips, &self.playspecs))
    }

    /// Drains one interface's control queue and, if a playspec was applied, runs a GC pass
    /// across every interface - matching §4.8's "GC runs after `PLAYSPEC_APPLIED`".
    pub fn process_control_queue(&mut self, id: InterfaceId) -> interface::DrainOutcome {
        let Some(iface) = self.interfaces.find_mut(id.0) else {
            return interface::DrainOutcome::Idle;
        };
        let outcome = iface.process_control_queue();
        if outcome == interface::DrainOutcome::PlayspecApplied {
            self.run_gc();
        }
        outcome
    }

    fn run_gc(&mut self) {
        let mut shadows = Vec::new();
        self.interfaces.for_each(|id, iface| shadows.push((InterfaceId(id), *iface.shadow())));
        gc::run(&mut self.clips, &mut self.playspecs, shadows.iter().map(|(id, s)| (*id, s)));
    }
}

impl<D: Driver> Default for Engine<D> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use driver::RecordingDriver;

    #[test]
    fn create_and_close_interface_roundtrip() {
        // Given
        let mut engine: Engine<RecordingDriver> = Engine::new();
        // When
        let id = engine.create_interface(RecordingDriver::default()).unwrap();
        // Then
        assert!(engine.interface(id).is_some());
        engine.close_interface(id);
        assert!(engine.interface(id).is_none());
    }

    #[test]
    fn process_realtime_is_a_noop_for_unknown_interface() {
        // Given
        let mut engine: Engine<RecordingDriver> = Engine::new();
        let mut l = [0.0f32; 4];
        let mut r = [0.0f32; 4];
        // When / Then
        assert_eq!(engine.process_realtime(InterfaceId(999), 4, &mut l, &mut r), None);
    }
}
