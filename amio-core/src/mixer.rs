//! Pure rendering of a playspec fragment into a stereo output window.
//!
//! Grounded on `original_source/amio/mixer.c` (per-sample accumulation and clamping) and the
//! mixing loop in `interface.c` (`mix_playspec_entry_into_jack_ports_at`,
//! `mix_playspec_into_jack_ports`) for the clamping-in-playspec-coordinates math and the
//! periodic-entry unrolling direction. This module has no notion of threads, queues or ids
//! beyond [`ClipId`] resolution - it is the realtime thread's only caller, but it is a pure
//! function over slices and is exercised directly in tests.

use crate::clip::ClipStore;
use crate::ids::ClipId;
use crate::playspec::{Playspec, PlayspecEntry};

/// The 16-bit PCM -> float normalization factor; applied here, never by the entry itself.
const SAMPLE_SCALE: f32 = 1.0 / 32768.0;

/// Zeroes `port_l`/`port_r`. Callers run this once for the whole `nframes` block before any
/// `mix` calls, matching `clear_jack_port`.
pub fn clear_ports(port_l: &mut [f32], port_r: &mut [f32]) {
    port_l.fill(0.0);
    port_r.fill(0.0);
}

/// Saturates every sample to `[-1.0, 1.0]`, matching `clamp_jack_port`.
pub fn clamp_ports(port_l: &mut [f32], port_r: &mut [f32]) {
    for s in port_l.iter_mut() {
        *s = s.clamp(-1.0, 1.0);
    }
    for s in port_r.iter_mut() {
        *s = s.clamp(-1.0, 1.0);
    }
}

/// Renders every entry of `playspec` that overlaps
/// `[frame_in_playspec, frame_in_playspec + frames_to_copy)` into `port_l`/`port_r`
/// (each exactly `frames_to_copy` samples long), accumulating rather than overwriting.
///
/// Pure and linear before clamping: mixing the concatenation of two playspecs' entries
/// equals mixing each separately and summing (property 3 in spec.md §8).
pub fn mix(
    playspec: &Playspec,
    clips: &ClipStore,
    port_l: &mut [f32],
    port_r: &mut [f32],
    frame_in_playspec: i64,
    frames_to_copy: i64,
) {
    debug_assert_eq!(port_l.len() as i64, frames_to_copy);
    debug_assert_eq!(port_r.len() as i64, frames_to_copy);
    if frames_to_copy == 0 {
        return;
    }
    for entry in &playspec.entries {
        if entry.repeat_interval == 0 {
            mix_entry_at(
                entry,
                clips,
                port_l,
                port_r,
                entry.play_at_frame,
                frame_in_playspec,
                frames_to_copy,
            );
        } else {
            mix_periodic_entry(entry, clips, port_l, port_r, frame_in_playspec, frames_to_copy);
        }
    }
}

/// Iterates backwards from the latest repetition that could overlap the window, emitting
/// each one via the one-shot path, stopping once a repetition ends before the window starts.
/// Equivalent to mixing the union of one-shot entries at `play_at + k * repeat_interval` for
/// every integer `k` whose clip fragment overlaps the window (property 4).
fn mix_periodic_entry(
    entry: &PlayspecEntry,
    clips: &ClipStore,
    port_l: &mut [f32],
    port_r: &mut [f32],
    frame_in_playspec: i64,
    frames_to_copy: i64,
) {
    let interval = entry.repeat_interval as i64;
    let normalized_play_at = entry.play_at_frame - (entry.play_at_frame / interval) * interval;
    let clip_length = entry.clip_frame_b as i64 - entry.clip_frame_a as i64;
    let end_frame = frame_in_playspec + frames_to_copy;
    let mut a_in_playspec = (end_frame / interval) * interval + normalized_play_at;
    while a_in_playspec + clip_length >= frame_in_playspec {
        mix_entry_at(
            entry,
            clips,
            port_l,
            port_r,
            a_in_playspec,
            frame_in_playspec,
            frames_to_copy,
        );
        a_in_playspec -= interval;
    }
}

/// Mixes one instance of `entry`'s clip fragment, placed so it begins at `a_in_playspec`,
/// clamped against both the clip's own bounds and the output window.
fn mix_entry_at(
    entry: &PlayspecEntry,
    clips: &ClipStore,
    port_l: &mut [f32],
    port_r: &mut [f32],
    a_in_playspec: i64,
    frame_in_playspec: i64,
    frames_to_copy: i64,
) {
    let Some(clip) = clips.get(entry.clip_id) else {
        return;
    };
    let mut a_in_clip = entry.clip_frame_a as i64;
    let mut b_in_clip = entry.clip_frame_b as i64;
    let mut a_in_playspec = a_in_playspec;
    let mut b_in_playspec = a_in_playspec + (b_in_clip - a_in_clip);

    let window_end = frame_in_playspec + frames_to_copy;

    // Clamp against the output window.
    if a_in_playspec < frame_in_playspec {
        let delta = frame_in_playspec - a_in_playspec;
        a_in_playspec += delta;
        a_in_clip += delta;
    }
    if b_in_playspec > window_end {
        let delta = b_in_playspec - window_end;
        b_in_playspec -= delta;
        b_in_clip -= delta;
    }
    // Clamp against the clip's own bounds.
    if b_in_clip > clip.length_frames as i64 {
        let delta = b_in_clip - clip.length_frames as i64;
        b_in_clip -= delta;
        b_in_playspec -= delta;
    }

    if a_in_playspec >= b_in_playspec || a_in_playspec >= window_end {
        return;
    }

    let offset = (a_in_playspec - frame_in_playspec) as usize;
    let count = (b_in_playspec - a_in_playspec) as usize;
    let gain_l = entry.gain_l * SAMPLE_SCALE;
    let gain_r = entry.gain_r * SAMPLE_SCALE;
    accumulate(
        clip.channels,
        &clip.samples,
        a_in_clip as usize,
        count,
        &mut port_l[offset..offset + count],
        &mut port_r[offset..offset + count],
        gain_l,
        gain_r,
    );
}

#[allow(clippy::too_many_arguments)]
fn accumulate(
    channels: u8,
    samples: &[i16],
    clip_start_frame: usize,
    frame_count: usize,
    port_l: &mut [f32],
    port_r: &mut [f32],
    gain_l: f32,
    gain_r: f32,
) {
    match channels {
        1 => {
            for i in 0..frame_count {
                let s = samples[clip_start_frame + i] as f32;
                port_l[i] += s * gain_l;
                port_r[i] += s * gain_r;
            }
        }
        _ => {
            for i in 0..frame_count {
                let base = (clip_start_frame + i) * channels as usize;
                port_l[i] += samples[base] as f32 * gain_l;
                port_r[i] += samples[base + 1] as f32 * gain_r;
            }
        }
    }
}

/// Convenience for tests and the interface layer: publishes a clip directly into a fresh
/// [`ClipStore`] and returns its id, bypassing the byte-decoding path in
/// [`ClipStore::create`].
#[cfg(test)]
pub(crate) fn test_clip_store_with(samples: &[i16], channels: u8) -> (ClipStore, ClipId) {
    let mut store = ClipStore::new(4);
    let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
    let id = store.create(&bytes, channels, 44100).unwrap();
    (store, id)
}
