//! Decoded PCM clip storage and per-clip reference tracking.
//!
//! Grounded on `original_source/amio/audio_clip.c`/`.h`. A clip is created on the control
//! thread with `referenced_by_control = true`; its samples may be read by the realtime
//! thread only while at least one entry of `referenced_by_realtime` is set for it. Actual
//! destruction is the clip GC's job (`crate::gc`), never this module's.

use crate::ids::ClipId;
use crate::pool::Pool;
use derivative::Derivative;

/// Number of interfaces whose realtime threads may independently hold a reference to a
/// clip. Mirrors `MAX_INTERFACES` in `amio-ffi`'s binding surface.
pub const MAX_INTERFACES: usize = 32;

#[derive(Derivative)]
#[derivative(Debug)]
pub struct AudioClip {
    pub length_frames: u32,
    pub channels: u8,
    pub framerate: u32,
    #[derivative(Debug = "ignore")]
    pub samples: Vec<i16>,
    pub referenced_by_control: bool,
    pub referenced_by_realtime: [bool; MAX_INTERFACES],
}

impl AudioClip {
    fn new(samples: Vec<i16>, channels: u8, framerate: u32) -> Self {
        let length_frames = samples.len() as u32 / channels as u32;
        Self {
            length_frames,
            channels,
            framerate,
            samples,
            referenced_by_control: true,
            referenced_by_realtime: [false; MAX_INTERFACES],
        }
    }

    pub fn is_referenced(&self) -> bool {
        self.referenced_by_control || self.referenced_by_realtime.iter().any(|&r| r)
    }
}

/// Owns every decoded clip for the process. Backed by a [`Pool`] with capacity
/// `MAX_AUDIO_CLIPS`.
#[derive(Debug)]
pub struct ClipStore {
    pool: Pool<AudioClip>,
}

impl ClipStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            pool: Pool::new(capacity),
        }
    }

    /// Copies `bytes` (interleaved little-endian i16 PCM) into an owned buffer and publishes
    /// the clip with `referenced_by_control = true`. Returns `None` if the store is
    /// saturated, or if `bytes` is not a whole number of `channels`-wide i16 frames.
    pub fn create(&mut self, bytes: &[u8], channels: u8, framerate: u32) -> Option<ClipId> {
        if channels == 0 || bytes.len() % (2 * channels as usize) != 0 {
            return None;
        }
        let samples: Vec<i16> = bytes
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect();
        let clip = AudioClip::new(samples, channels, framerate);
        self.pool.put(clip).map(ClipId)
    }

    pub fn get(&self, id: ClipId) -> Option<&AudioClip> {
        self.pool.find(id.0)
    }

    pub fn get_mut(&mut self, id: ClipId) -> Option<&mut AudioClip> {
        self.pool.find_mut(id.0)
    }

    /// Marks the clip as no longer referenced by the control thread. Does not free its
    /// buffer - that happens only through the GC (`crate::gc`). A no-op if `id` is unknown.
    pub fn unref_from_control(&mut self, id: ClipId) {
        if let Some(clip) = self.pool.find_mut(id.0) {
            clip.referenced_by_control = false;
        }
    }

    pub fn for_each(&self, cb: impl FnMut(u32, &AudioClip)) {
        self.pool.for_each(cb);
    }

    pub fn for_each_mut(&mut self, cb: impl FnMut(u32, &mut AudioClip)) {
        self.pool.for_each_mut(cb);
    }

    /// Destroys every clip for which `should_destroy` returns `true`. Used by the GC's sweep
    /// phase.
    pub fn retain(&mut self, mut should_keep: impl FnMut(&AudioClip) -> bool) {
        let to_remove: Vec<u32> = {
            let mut ids = Vec::new();
            self.pool.for_each(|id, clip| {
                if !should_keep(clip) {
                    ids.push(id);
                }
            });
            ids
        };
        for id in to_remove {
            self.pool.remove(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pcm(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    #[test]
    fn create_copies_and_decodes_pcm() {
        // Given
        let mut store = ClipStore::new(4);
        let bytes = pcm(&[1000, 2000, 3000, 4000]);
        // When
        let id = store.create(&bytes, 1, 44100).unwrap();
        // Then
        let clip = store.get(id).unwrap();
        assert_eq!(clip.samples, vec![1000, 2000, 3000, 4000]);
        assert_eq!(clip.length_frames, 4);
        assert!(clip.referenced_by_control);
        assert!(clip.referenced_by_realtime.iter().all(|&r| !r));
    }

    #[test]
    fn unref_clears_control_flag_only() {
        // Given
        let mut store = ClipStore::new(4);
        let id = store.create(&pcm(&[1, 2]), 1, 44100).unwrap();
        // When
        store.unref_from_control(id);
        // Then
        let clip = store.get(id).unwrap();
        assert!(!clip.referenced_by_control);
    }
}
