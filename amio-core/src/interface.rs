//! Per-audio-client engine core: owns the message plane, the realtime-visible playspec
//! pointers and the driver handle, and drives the swap protocol.
//!
//! Grounded on `original_source/amio/interface.c`, specifically
//! `process_input_with_buffers`/the mixing loop (realtime side) and
//! `iface_process_messages_on_python_queue`/`iface_set_playspec` (control side). The realtime
//! side here never holds a [`crate::playspec::Playspec`] by value, only its
//! [`PlayspecId`] - resolved each callback through a [`PlayspecStore`] - so a swap never drops
//! (and so never frees) anything on the realtime thread; see the struct doc on
//! [`crate::playspec::Playspec::referenced_by_realtime`].

use crate::clip::ClipStore;
use crate::driver::Driver;
use crate::ids::{InterfaceId, PlayspecId};
use crate::message::{self, ControlTask, InputChunk, MessagePlane, RealtimeTask};
use crate::mixer;
use crate::playspec::PlayspecStore;
use tracing::debug;

/// Control-side mirror of what the realtime side currently (or will soon) point at. Updated
/// only by control-originated transitions and by draining `PlayspecApplied`, per §4.8 - never
/// read by the realtime thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct ControlShadow {
    pub current_playspec: Option<PlayspecId>,
    pub pending_playspec: Option<PlayspecId>,
    pub last_reported_frame_rate: u32,
    pub last_reported_position: i64,
    pub last_reported_transport_rolling: bool,
}

/// Result of draining the realtime->control queue, mirroring
/// `iface_process_messages_on_python_queue`'s `0 = nothing, 1 = playspec applied` contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    Idle,
    PlayspecApplied,
}

pub struct Interface<D: Driver> {
    pub id: InterfaceId,
    messages: MessagePlane,
    driver: D,

    // Realtime-owned.
    current_playspec_id: PlayspecId,
    pending_playspec_id: Option<PlayspecId>,
    frame_in_playspec: i64,
    is_transport_rolling: bool,

    // Control-owned.
    shadow: ControlShadow,
}

impl<D: Driver> Interface<D> {
    pub fn new(
        id: InterfaceId,
        driver: D,
        empty_playspec_id: PlayspecId,
        thread_queue_size: usize,
        log_queue_size: usize,
        input_chunk_queue_size: usize,
    ) -> Self {
        let mut messages = MessagePlane::new(thread_queue_size, log_queue_size, input_chunk_queue_size);
        messages
            .realtime_to_control_tx
            .try_push(RealtimeTask::ReportFrameRate(driver.sample_rate()));
        Self {
            id,
            messages,
            driver,
            current_playspec_id: empty_playspec_id,
            pending_playspec_id: None,
            frame_in_playspec: 0,
            is_transport_rolling: false,
            shadow: ControlShadow {
                current_playspec: Some(empty_playspec_id),
                ..ControlShadow::default()
            },
        }
    }

    pub fn shadow(&self) -> &ControlShadow {
        &self.shadow
    }

    pub fn messages_mut(&mut self) -> &mut MessagePlane {
        &mut self.messages
    }

    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    // ---- Control-thread API ----

    /// Consumes the playspec currently under construction, handing it to the realtime thread
    /// for swap-in. Fails (returns `false`) without mutating any state if a swap is already
    /// pending, matching `set_playspec`'s "-1 without mutating state" contract.
    pub fn set_playspec(&mut self, id: PlayspecId) -> bool {
        if self.shadow.pending_playspec.is_some() {
            return false;
        }
        if !self.messages.control_to_realtime_tx.try_push(ControlTask::SetPlayspec(id)) {
            return false;
        }
        self.shadow.pending_playspec = Some(id);
        true
    }

    pub fn set_position(&mut self, frame: i64) -> bool {
        self.messages.control_to_realtime_tx.try_push(ControlTask::SetPosition(frame))
    }

    pub fn set_transport_rolling(&mut self, rolling: bool) -> bool {
        self.messages
            .control_to_realtime_tx
            .try_push(ControlTask::SetTransportRolling(rolling))
    }

    /// Drains every pending realtime->control task, updating the control shadow. Returns
    /// [`DrainOutcome::PlayspecApplied`] if at least one `PlayspecApplied` was seen, which
    /// tells the caller (`crate::gc`) it's time to run a GC pass.
    pub fn process_control_queue(&mut self) -> DrainOutcome {
        let mut outcome = DrainOutcome::Idle;
        while let Some(task) = self.messages.realtime_to_control_rx.try_pop() {
            match task {
                RealtimeTask::PlayspecApplied(new_id) => {
                    self.shadow.current_playspec = Some(new_id);
                    self.shadow.pending_playspec = None;
                    outcome = DrainOutcome::PlayspecApplied;
                }
                RealtimeTask::DestroyAudioClip(_) => {
                    // Legacy direct-free path; the GC (`crate::gc`) owns destruction now.
                }
                RealtimeTask::ReportFrameRate(rate) => self.shadow.last_reported_frame_rate = rate,
                RealtimeTask::ReportPosition(pos) => self.shadow.last_reported_position = pos,
                RealtimeTask::ReportTransportRolling(rolling) => {
                    self.shadow.last_reported_transport_rolling = rolling
                }
            }
        }
        outcome
    }

    // ---- Realtime-thread API ----

    /// Runs one realtime callback of `nframes` samples, per §4.7. `port_l`/`port_r` must each
    /// be exactly `nframes` long. Returns the new `frame_in_playspec`.
    pub fn process_realtime(
        &mut self,
        nframes: i64,
        port_l: &mut [f32],
        port_r: &mut [f32],
        clips: &ClipStore,
        playspecs: &PlayspecStore,
    ) -> i64 {
        debug_assert_eq!(port_l.len() as i64, nframes);
        debug_assert_eq!(port_r.len() as i64, nframes);

        // 1. Report state.
        self.messages
            .realtime_to_control_tx
            .try_push(RealtimeTask::ReportPosition(self.frame_in_playspec));
        self.messages
            .realtime_to_control_tx
            .try_push(RealtimeTask::ReportTransportRolling(self.is_transport_rolling));

        // 2. Clear output ports.
        mixer::clear_ports(port_l, port_r);

        if !self.is_transport_rolling {
            // 3. Not rolling: attempt a swap (taking effect immediately, with no frames
            // mixed), drain one control task, leave position untouched otherwise. If the
            // callback woke up already past the pending swap's `insert_at` (e.g. the host
            // jumped the paused position forward), resume the new playspec that far in too,
            // same as the rolling loop's "woke up already past it" branch (5b).
            let mut start_from_offset = 0;
            if let Some(pending_id) = self.pending_playspec_id {
                if let Some(pending) = playspecs.get(pending_id) {
                    if self.frame_in_playspec > pending.insert_at {
                        start_from_offset = self.frame_in_playspec - pending.insert_at;
                    }
                }
            }
            self.try_swap_if_due(playspecs, start_from_offset);
            self.drain_one_control_task();
            return self.frame_in_playspec;
        }

        // 4. Rolling: mix in fragments bounded by the next pending swap.
        let mut frames_copied: i64 = 0;
        while frames_copied < nframes {
            let mut frames_to_copy = nframes - frames_copied;
            let mut start_from_offset = 0i64;

            if let Some(pending_id) = self.pending_playspec_id {
                if let Some(pending) = playspecs.get(pending_id) {
                    let ahead_by = pending.insert_at - self.frame_in_playspec;
                    if ahead_by < frames_to_copy {
                        frames_to_copy = ahead_by;
                    }
                    if ahead_by < 0 {
                        frames_to_copy = 0;
                        start_from_offset = -ahead_by;
                    }
                }
            }

            if frames_to_copy > 0 {
                if let Some(current) = playspecs.get(self.current_playspec_id) {
                    let start = frames_copied as usize;
                    let end = (frames_copied + frames_to_copy) as usize;
                    mixer::mix(
                        current,
                        clips,
                        &mut port_l[start..end],
                        &mut port_r[start..end],
                        self.frame_in_playspec,
                        frames_to_copy,
                    );
                }
            }

            frames_copied += frames_to_copy;
            self.frame_in_playspec += frames_to_copy;

            if !self.try_swap_if_due(playspecs, start_from_offset) && frames_to_copy == 0 {
                // Pending swap isn't due yet but we made no progress this iteration - avoid
                // spinning forever on a queue entry that will never satisfy `ahead_by`.
                break;
            }
        }

        // 5. Clamp.
        mixer::clamp_ports(port_l, port_r);

        // 6. Drain at most one control task.
        self.drain_one_control_task();

        // 7.
        self.frame_in_playspec
    }

    /// Chunks `nframes` of interleaved-stereo input into `INPUT_CLIP_LENGTH/2`-frame
    /// [`InputChunk`]s and pushes each onto `input_chunk_tx`, per `process_input_with_buffers`.
    /// `in_l`/`in_r` must each be `nframes` long. A chunk that would overrun the input is
    /// zero-padded rather than reading past the buffer end (the original's own loop only
    /// behaves safely when `nframes` is a multiple of `INPUT_CLIP_LENGTH/2`, which every real
    /// JACK buffer size is in practice).
    pub fn process_input(&mut self, in_l: &[f32], in_r: &[f32]) {
        debug_assert_eq!(in_l.len(), in_r.len());
        let nframes = in_l.len();
        let frames_per_chunk = message::INPUT_CLIP_LENGTH / 2;
        let mut buffer_i = 0;
        while buffer_i < nframes {
            let mut chunk = InputChunk {
                playspec_id: self.current_playspec_id,
                starting_frame: self.frame_in_playspec + buffer_i as i64,
                was_transport_rolling: self.is_transport_rolling,
                ..InputChunk::default()
            };
            let n = frames_per_chunk.min(nframes - buffer_i);
            for clip_i in 0..n {
                chunk.samples[2 * clip_i] = in_l[buffer_i + clip_i];
                chunk.samples[2 * clip_i + 1] = in_r[buffer_i + clip_i];
            }
            self.messages.input_chunk_tx.try_push(chunk);
            buffer_i += frames_per_chunk;
        }
    }

    /// Applies the pending swap if one exists and its `insert_at` has been reached. Returns
    /// whether a swap happened.
    fn try_swap_if_due(&mut self, playspecs: &PlayspecStore, start_from_offset: i64) -> bool {
        let Some(pending_id) = self.pending_playspec_id else {
            return false;
        };
        let Some(pending) = playspecs.get(pending_id) else {
            // Unknown id: drop the dangling pending pointer rather than spin on it forever.
            self.pending_playspec_id = None;
            return false;
        };
        if self.frame_in_playspec < pending.insert_at {
            return false;
        }

        // Open question preserved from the original: a same-id pending swap is a defensive
        // no-op, intent unclear.
        if pending_id == self.current_playspec_id {
            self.pending_playspec_id = None;
            return false;
        }

        if let Some(old) = playspecs.get(self.current_playspec_id) {
            old.set_referenced_by_realtime(false);
        }
        pending.set_referenced_by_realtime(true);
        self.current_playspec_id = pending_id;
        self.pending_playspec_id = None;
        self.frame_in_playspec = pending.start_from + start_from_offset;
        self.messages
            .realtime_to_control_tx
            .try_push(RealtimeTask::PlayspecApplied(pending_id));
        true
    }

    fn drain_one_control_task(&mut self) {
        let Some(task) = self.messages.control_to_realtime_rx.try_pop() else {
            return;
        };
        match task {
            ControlTask::SetPlayspec(id) => {
                self.pending_playspec_id = Some(id);
            }
            ControlTask::SetPosition(frame) => {
                self.frame_in_playspec = frame;
                self.driver.set_position(frame);
            }
            ControlTask::SetTransportRolling(rolling) => {
                self.is_transport_rolling = rolling;
                self.driver.set_is_transport_rolling(rolling);
            }
            ControlTask::UnrefAudioClip(id) => {
                // Clip unref is synchronous on the control thread (`ClipStore::
                // unref_from_control`); this variant exists for envelope parity with the
                // original's generic task dispatch but the realtime side has nothing to do.
                debug!(clip_id = id.as_i32(), "unref task drained, no realtime action needed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clip::ClipStore;
    use crate::driver::RecordingDriver;
    use crate::playspec::{Playspec, PlayspecEntry};

    fn fresh_store() -> (ClipStore, PlayspecStore) {
        (ClipStore::new(8), PlayspecStore::new(8))
    }

    fn make_interface(playspecs: &mut PlayspecStore) -> Interface<RecordingDriver> {
        let empty_id = playspecs.insert(Playspec::empty(PlayspecId(0))).unwrap();
        Interface::new(InterfaceId(1), RecordingDriver::default(), empty_id, 16, 64, 16)
    }

    /// S4 - swap at insert_at.
    #[test]
    fn s4_swap_at_insert_at() {
        // Given
        let (clips, mut playspecs) = fresh_store();
        let mut iface = make_interface(&mut playspecs);
        iface.is_transport_rolling = true;
        let mut b = Playspec::empty(PlayspecId(0));
        b.insert_at = 10;
        b.start_from = 100;
        let b_id = playspecs.insert(b).unwrap();
        iface.pending_playspec_id = Some(b_id);

        // When: drive 4 callbacks of 8 frames each.
        let mut last_frame = 0;
        for _ in 0..4 {
            let mut l = [0.0f32; 8];
            let mut r = [0.0f32; 8];
            last_frame = iface.process_realtime(8, &mut l, &mut r, &clips, &playspecs);
        }

        // Then: the swap fires during the callback covering frame 10 (callback 2, frames
        // [8,16)). At that point frame_in_playspec has already advanced to 10 (2 frames
        // consumed from [8,10)), so it becomes start_from(100) + 0 = 100, then the same
        // callback mixes its remaining 6 frames (-> 106), then two more full callbacks of 8
        // each (-> 114 -> 122).
        assert_eq!(iface.current_playspec_id, b_id);
        assert_eq!(last_frame, 122);
    }

    /// S5 - late swap.
    #[test]
    fn s5_late_swap() {
        // Given
        let (clips, mut playspecs) = fresh_store();
        let mut iface = make_interface(&mut playspecs);
        iface.is_transport_rolling = true;
        iface.frame_in_playspec = 15;
        let mut b = Playspec::empty(PlayspecId(0));
        b.insert_at = 10;
        b.start_from = 100;
        let b_id = playspecs.insert(b).unwrap();
        iface.pending_playspec_id = Some(b_id);

        // When
        let mut l = [0.0f32; 8];
        let mut r = [0.0f32; 8];
        let new_frame = iface.process_realtime(8, &mut l, &mut r, &clips, &playspecs);

        // Then: immediate swap, start_from_offset = 5, new frame = 105, plus whatever this
        // callback went on to mix from the new current (8 frames, since the swap used up 0
        // frames from the old playspec this callback).
        assert_eq!(iface.current_playspec_id, b_id);
        assert_eq!(new_frame, 105 + 8);
    }

    /// Property 5: after `set_playspec` and enough callbacks to pass `insert_at`, the current
    /// playspec id reflects the swap.
    #[test]
    fn property5_current_playspec_reflects_applied_swap() {
        // Given
        let (clips, mut playspecs) = fresh_store();
        let mut iface = make_interface(&mut playspecs);
        iface.is_transport_rolling = true;
        let mut entries = Vec::new();
        entries.push(PlayspecEntry::default());
        let mut p = Playspec::empty(PlayspecId(0));
        p.entries = entries;
        p.insert_at = 4;
        p.start_from = 0;
        let p_id = playspecs.insert(p).unwrap();

        // When
        assert!(iface.set_playspec(p_id));
        for _ in 0..8 {
            let mut l = [0.0f32; 4];
            let mut r = [0.0f32; 4];
            iface.process_realtime(4, &mut l, &mut r, &clips, &playspecs);
            iface.process_control_queue();
        }

        // Then
        assert_eq!(iface.current_playspec_id, p_id);
        assert_eq!(iface.shadow().current_playspec, Some(p_id));
    }

    #[test]
    fn set_playspec_refuses_second_swap_while_one_pending() {
        // Given
        let (_clips, mut playspecs) = fresh_store();
        let mut iface = make_interface(&mut playspecs);
        let a_id = playspecs.insert(Playspec::empty(PlayspecId(0))).unwrap();
        let b_id = playspecs.insert(Playspec::empty(PlayspecId(0))).unwrap();
        // When
        assert!(iface.set_playspec(a_id));
        // Then
        assert!(!iface.set_playspec(b_id));
    }

    #[test]
    fn not_rolling_leaves_position_unchanged() {
        // Given
        let (clips, mut playspecs) = fresh_store();
        let mut iface = make_interface(&mut playspecs);
        iface.frame_in_playspec = 42;
        iface.is_transport_rolling = false;
        // When
        let mut l = [0.0f32; 8];
        let mut r = [0.0f32; 8];
        let frame = iface.process_realtime(8, &mut l, &mut r, &clips, &playspecs);
        // Then
        assert_eq!(frame, 42);
        assert!(l.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn control_task_updates_position_and_transport_and_calls_driver() {
        // Given
        let (clips, mut playspecs) = fresh_store();
        let mut iface = make_interface(&mut playspecs);
        assert!(iface.set_position(99));
        assert!(iface.set_transport_rolling(true));
        // When: two callbacks, each drains at most one control task.
        let mut l = [0.0f32; 4];
        let mut r = [0.0f32; 4];
        iface.process_realtime(4, &mut l, &mut r, &clips, &playspecs);
        iface.process_realtime(4, &mut l, &mut r, &clips, &playspecs);
        // Then
        assert_eq!(iface.frame_in_playspec, 99);
        assert!(iface.is_transport_rolling);
    }

    #[test]
    fn new_interface_reports_driver_sample_rate() {
        // Given / When
        let mut playspecs = PlayspecStore::new(8);
        let empty_id = playspecs.insert(Playspec::empty(PlayspecId(0))).unwrap();
        let mut iface = Interface::new(
            InterfaceId(1),
            RecordingDriver { sample_rate: 48_000, ..RecordingDriver::default() },
            empty_id,
            16,
            64,
            16,
        );
        // Then
        assert_eq!(
            iface.messages.realtime_to_control_rx.try_pop().unwrap(),
            RealtimeTask::ReportFrameRate(48_000)
        );
        // Draining the control queue should reflect it in the shadow too.
        iface.process_control_queue();
        assert_eq!(iface.shadow().last_reported_frame_rate, 48_000);
    }

    #[test]
    fn not_rolling_swap_past_insert_at_resumes_with_offset() {
        // Given: paused, position already ahead of the pending swap's insert_at.
        let (clips, mut playspecs) = fresh_store();
        let mut iface = make_interface(&mut playspecs);
        iface.is_transport_rolling = false;
        iface.frame_in_playspec = 15;
        let mut b = Playspec::empty(PlayspecId(0));
        b.insert_at = 10;
        b.start_from = 100;
        let b_id = playspecs.insert(b).unwrap();
        iface.pending_playspec_id = Some(b_id);

        // When
        let mut l = [0.0f32; 8];
        let mut r = [0.0f32; 8];
        let frame = iface.process_realtime(8, &mut l, &mut r, &clips, &playspecs);

        // Then: resumes at start_from(100) + (15 - 10) = 105, unchanged since paused (no
        // frames are mixed while not rolling).
        assert_eq!(iface.current_playspec_id, b_id);
        assert_eq!(frame, 105);
    }

    #[test]
    fn process_input_chunks_samples_into_the_input_queue() {
        // Given: INPUT_CLIP_LENGTH/2 == 64 frames per chunk; feed exactly one chunk's worth.
        let (_clips, mut playspecs) = fresh_store();
        let mut iface = make_interface(&mut playspecs);
        iface.current_playspec_id = playspecs.insert(Playspec::empty(PlayspecId(0))).unwrap();
        iface.frame_in_playspec = 1000;
        iface.is_transport_rolling = true;
        let frames_per_chunk = message::INPUT_CLIP_LENGTH / 2;
        let in_l: Vec<f32> = (0..frames_per_chunk).map(|i| i as f32).collect();
        let in_r: Vec<f32> = (0..frames_per_chunk).map(|i| -(i as f32)).collect();

        // When
        iface.process_input(&in_l, &in_r);

        // Then
        let chunk = iface.messages.input_chunk_rx.try_pop().unwrap();
        assert_eq!(chunk.starting_frame, 1000);
        assert_eq!(chunk.playspec_id, iface.current_playspec_id);
        assert!(chunk.was_transport_rolling);
        assert_eq!(chunk.samples[0], 0.0);
        assert_eq!(chunk.samples[1], 0.0);
        assert_eq!(chunk.samples[2], 1.0);
        assert_eq!(chunk.samples[3], -1.0);
        assert!(iface.messages.input_chunk_rx.try_pop().is_none());
    }
}
