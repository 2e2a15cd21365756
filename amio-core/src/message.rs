//! The cross-thread message plane: typed task envelopes plus the log and input-chunk rings.
//!
//! Grounded on `original_source/amio/communication.c`/`.h`. The original multiplexes every
//! task kind through a single `{type, arg}` tagged-function-pointer envelope
//! (`struct Message` / `struct Task`). The Design Notes in spec.md §9 explicitly call a
//! tagged-variant rendering "friendlier to a strongly-typed target language" and equivalent
//! in semantics, so each direction gets its own `Copy` enum here - the same shape the teacher
//! crate uses for its own command/event channels (`ColumnCommand`/`ColumnEvent` in
//! `rt/column.rs`), just carried over our own SPSC [`Ring`] instead of `crossbeam-channel`,
//! since this boundary must stay realtime-safe in both directions.

use crate::ids::{ClipId, PlayspecId};
use crate::ring::{ring, RingConsumer, RingProducer};

/// Control thread -> realtime thread.
#[derive(Clone, Copy, Debug)]
pub enum ControlTask {
    SetPlayspec(PlayspecId),
    SetPosition(i64),
    SetTransportRolling(bool),
    UnrefAudioClip(ClipId),
}

/// Realtime thread -> control thread.
#[derive(Clone, Copy, Debug)]
pub enum RealtimeTask {
    PlayspecApplied(PlayspecId),
    /// Legacy direct-free path. The preferred design lets the control-side GC (`crate::gc`)
    /// handle clip destruction instead; this variant exists so a binding that wants the old
    /// eager-free behavior still has somewhere to route it, but `Interface` never posts it.
    DestroyAudioClip(ClipId),
    ReportFrameRate(u32),
    ReportPosition(i64),
    ReportTransportRolling(bool),
}

/// One capture record: 64 interleaved-stereo frames (128 `f32` samples).
pub const INPUT_CLIP_LENGTH: usize = 128;

#[derive(Clone, Copy, Debug)]
pub struct InputChunk {
    pub playspec_id: PlayspecId,
    pub starting_frame: i64,
    pub was_transport_rolling: bool,
    pub samples: [f32; INPUT_CLIP_LENGTH],
}

impl Default for InputChunk {
    fn default() -> Self {
        Self {
            playspec_id: PlayspecId(0),
            starting_frame: 0,
            was_transport_rolling: false,
            samples: [0.0; INPUT_CLIP_LENGTH],
        }
    }
}

/// The four rings an [`crate::interface::Interface`] owns, preallocated at construction.
pub struct MessagePlane {
    pub control_to_realtime_tx: RingProducer<ControlTask>,
    pub control_to_realtime_rx: RingConsumer<ControlTask>,
    pub realtime_to_control_tx: RingProducer<RealtimeTask>,
    pub realtime_to_control_rx: RingConsumer<RealtimeTask>,
    pub log_tx: RingProducer<u8>,
    pub log_rx: RingConsumer<u8>,
    pub input_chunk_tx: RingProducer<InputChunk>,
    pub input_chunk_rx: RingConsumer<InputChunk>,
}

impl MessagePlane {
    pub fn new(
        thread_queue_size: usize,
        log_queue_size: usize,
        input_chunk_queue_size: usize,
    ) -> Self {
        let (control_to_realtime_tx, control_to_realtime_rx) = ring(thread_queue_size);
        let (realtime_to_control_tx, realtime_to_control_rx) = ring(thread_queue_size);
        let (log_tx, log_rx) = ring(log_queue_size);
        let (input_chunk_tx, input_chunk_rx) = ring(input_chunk_queue_size);
        Self {
            control_to_realtime_tx,
            control_to_realtime_rx,
            realtime_to_control_tx,
            realtime_to_control_rx,
            log_tx,
            log_rx,
            input_chunk_tx,
            input_chunk_rx,
        }
    }
}

/// Appends `text` to the log ring. Best-effort: truncated silently if the ring doesn't have
/// room for all of it, matching `write_log`'s "overflow is dropped" contract.
pub fn write_log(tx: &mut RingProducer<u8>, text: &str) {
    tx.write(text.as_bytes());
}

/// Drains up to `out.len() - 1` bytes into `out` and NUL-terminates, matching
/// `io_get_logs`. Returns the number of bytes written before the NUL.
pub fn read_logs(rx: &mut RingConsumer<u8>, out: &mut [u8]) -> usize {
    if out.is_empty() {
        return 0;
    }
    let to_read = out.len() - 1;
    let mut buf = vec![0u8; to_read];
    let n = rx.read(&mut buf);
    out[..n].copy_from_slice(&buf[..n]);
    out[n] = 0;
    n
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_round_trip_nul_terminates() {
        // Given
        let (mut tx, mut rx) = ring::<u8>(64);
        write_log(&mut tx, "hello\n");
        // When
        let mut out = [0xffu8; 16];
        let n = read_logs(&mut rx, &mut out);
        // Then
        assert_eq!(n, 6);
        assert_eq!(&out[..6], b"hello\n");
        assert_eq!(out[6], 0);
    }

    #[test]
    fn log_overflow_is_silently_dropped() {
        // Given
        let (mut tx, mut rx) = ring::<u8>(4);
        // When
        write_log(&mut tx, "toolong");
        // Then
        let mut out = [0u8; 8];
        let n = read_logs(&mut rx, &mut out);
        assert_eq!(n, 4);
    }

    #[test]
    fn input_chunk_queue_is_fifo() {
        // Given
        let (mut tx, mut rx) = ring::<InputChunk>(4);
        let mut a = InputChunk::default();
        a.starting_frame = 1;
        let mut b = InputChunk::default();
        b.starting_frame = 2;
        // When
        assert!(tx.try_push(a));
        assert!(tx.try_push(b));
        // Then
        assert_eq!(rx.try_pop().unwrap().starting_frame, 1);
        assert_eq!(rx.try_pop().unwrap().starting_frame, 2);
        assert!(rx.try_pop().is_none());
    }
}
