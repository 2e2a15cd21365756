//! Immutable-once-published playback programs.
//!
//! Grounded on `original_source/amio/playspec.c`/`.h`. Authoring happens on the control
//! thread through a small builder protocol (`begin` / `set_entry` / `publish`); only one
//! build may be in progress per process at a time, enforced by a global cursor, exactly as
//! in the original (`playspec_being_built`).

use crate::ids::{ClipId, PlayspecId};
use crate::pool::Pool;
use once_cell::sync::Lazy;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlayspecEntry {
    pub clip_id: ClipId,
    pub clip_frame_a: u32,
    pub clip_frame_b: u32,
    pub play_at_frame: i64,
    /// `0` means one-shot; otherwise the entry repeats every `repeat_interval` frames.
    pub repeat_interval: u32,
    pub gain_l: f32,
    pub gain_r: f32,
}

impl Default for PlayspecEntry {
    fn default() -> Self {
        Self {
            clip_id: ClipId(0),
            clip_frame_a: 0,
            clip_frame_b: 0,
            play_at_frame: 0,
            repeat_interval: 0,
            gain_l: 1.0,
            gain_r: 1.0,
        }
    }
}

#[derive(Debug)]
pub struct Playspec {
    pub id: PlayspecId,
    pub entries: Vec<PlayspecEntry>,
    /// Frame position in the *previous* playspec's timeline at which to swap this one in.
    pub insert_at: i64,
    /// Frame position in *this* playspec's timeline at which playback resumes after swap.
    pub start_from: i64,
    /// Set while some interface's realtime side still points at this playspec (as its
    /// current or pending one). The realtime thread is the only writer (it clears this the
    /// instant a swap evicts the playspec, per §4.7e); the GC (`crate::gc`) is the only
    /// reader, deciding whether to drop it from the [`PlayspecStore`]. An `AtomicBool`
    /// rather than a plain `bool` because those two accesses cross the thread boundary with
    /// no other synchronization - the realtime thread must never block on a lock to flip it.
    pub referenced_by_realtime: AtomicBool,
}

impl Playspec {
    /// The empty playspec synthesized at interface creation, so the realtime thread always
    /// has a non-null current playspec.
    pub fn empty(id: PlayspecId) -> Self {
        Self {
            id,
            entries: Vec::new(),
            insert_at: 0,
            start_from: 0,
            referenced_by_realtime: AtomicBool::new(true),
        }
    }

    pub fn is_referenced_by_realtime(&self) -> bool {
        self.referenced_by_realtime.load(Ordering::Acquire)
    }

    pub fn set_referenced_by_realtime(&self, value: bool) {
        self.referenced_by_realtime.store(value, Ordering::Release);
    }
}

/// Owns every published playspec for the process, keyed by [`PlayspecId`]. The realtime
/// thread never holds a `Playspec` by value - only its id - so dropping an evicted one (and
/// its entries `Vec`) always happens here, on the control thread, never inside the callback.
#[derive(Debug)]
pub struct PlayspecStore {
    pool: Pool<Playspec>,
}

impl PlayspecStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            pool: Pool::new(capacity),
        }
    }

    /// Inserts `playspec` (fresh from [`publish`] or [`Playspec::empty`]) and returns its
    /// assigned id. `None` if the store is saturated.
    pub fn insert(&mut self, playspec: Playspec) -> Option<PlayspecId> {
        playspec.set_referenced_by_realtime(true);
        let raw_id = self.pool.put(playspec)?;
        let id = PlayspecId(raw_id);
        self.pool.find_mut(raw_id).unwrap().id = id;
        Some(id)
    }

    pub fn get(&self, id: PlayspecId) -> Option<&Playspec> {
        self.pool.find(id.0)
    }

    pub fn get_mut(&mut self, id: PlayspecId) -> Option<&mut Playspec> {
        self.pool.find_mut(id.0)
    }

    pub fn mark_not_referenced_by_realtime(&self, id: PlayspecId) {
        if let Some(p) = self.pool.find(id.0) {
            p.set_referenced_by_realtime(false);
        }
    }

    /// Destroys every playspec no interface's realtime side still points at. Called by the
    /// clip GC right after it sweeps clips, since a playspec's entries are what the clip GC's
    /// mark phase walks.
    pub fn sweep_unreferenced(&mut self) {
        let dead: Vec<u32> = {
            let mut ids = Vec::new();
            self.pool.for_each(|id, p| {
                if !p.is_referenced_by_realtime() {
                    ids.push(id);
                }
            });
            ids
        };
        for id in dead {
            self.pool.remove(id);
        }
    }
}

struct PlayspecBuilder {
    insert_at: i64,
    start_from: i64,
    entries: Vec<PlayspecEntry>,
}

static BUILDER_CURSOR: Lazy<Mutex<Option<PlayspecBuilder>>> = Lazy::new(|| Mutex::new(None));

/// Starts building a new playspec of `size` entries. Fails (returns `false`) if another
/// build is already in progress, mirroring `begin_defining_playspec`.
pub fn begin(size: usize, insert_at: i64, start_from: i64) -> bool {
    let mut cursor = BUILDER_CURSOR.lock().unwrap();
    if cursor.is_some() {
        return false;
    }
    *cursor = Some(PlayspecBuilder {
        insert_at,
        start_from,
        entries: vec![PlayspecEntry::default(); size],
    });
    true
}

/// Fills entry `n` of the playspec under construction. A no-op (matching the original's
/// silent bounds check) if `n` is out of range or no build is in progress.
#[allow(clippy::too_many_arguments)]
pub fn set_entry(
    n: usize,
    clip_id: ClipId,
    clip_frame_a: u32,
    clip_frame_b: u32,
    play_at_frame: i64,
    repeat_interval: u32,
    gain_l: f32,
    gain_r: f32,
) {
    let mut cursor = BUILDER_CURSOR.lock().unwrap();
    if let Some(builder) = cursor.as_mut() {
        if let Some(entry) = builder.entries.get_mut(n) {
            *entry = PlayspecEntry {
                clip_id,
                clip_frame_a,
                clip_frame_b,
                play_at_frame,
                repeat_interval,
                gain_l,
                gain_r,
            };
        }
    }
}

/// Finishes the current build, inserting it into `store` under a freshly assigned id. The
/// build cursor is cleared so a new one may begin. Returns `None` if no build was in
/// progress, or if `store` is saturated (in which case the build is lost, matching the
/// original's "publish fails, caller retries" contract).
pub fn publish(store: &mut PlayspecStore) -> Option<PlayspecId> {
    let mut cursor = BUILDER_CURSOR.lock().unwrap();
    let builder = cursor.take()?;
    let playspec = Playspec {
        // overwritten by `PlayspecStore::insert` once the real id is known
        id: PlayspecId(0),
        entries: builder.entries,
        insert_at: builder.insert_at,
        start_from: builder.start_from,
        referenced_by_realtime: AtomicBool::new(false),
    };
    drop(cursor);
    store.insert(playspec)
}

/// Discards an in-progress build without publishing it. Used when a caller abandons a build
/// (e.g. the host errors out between `begin` and `publish`).
pub fn abandon() {
    let mut cursor = BUILDER_CURSOR.lock().unwrap();
    *cursor = None;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test_helper::serial;

    mod serial_test_helper {
        use std::sync::Mutex;
        static LOCK: Mutex<()> = Mutex::new(());

        /// The playspec builder cursor is a process-wide global, so tests that touch it
        /// must not run concurrently with each other.
        pub fn serial() -> std::sync::MutexGuard<'static, ()> {
            LOCK.lock().unwrap_or_else(|e| e.into_inner())
        }
    }

    #[test]
    fn build_then_publish() {
        let _guard = serial();
        abandon();
        // Given
        let mut store = PlayspecStore::new(4);
        assert!(begin(2, 10, 100));
        // When
        set_entry(0, ClipId(1), 0, 4, 0, 0, 1.0, 1.0);
        set_entry(1, ClipId(2), 0, 2, 5, 4, 0.5, 0.5);
        let id = publish(&mut store).unwrap();
        // Then
        let playspec = store.get(id).unwrap();
        assert_eq!(playspec.id, id);
        assert_eq!(playspec.insert_at, 10);
        assert_eq!(playspec.start_from, 100);
        assert_eq!(playspec.entries[0].clip_id, ClipId(1));
        assert_eq!(playspec.entries[1].repeat_interval, 4);
        assert!(playspec.is_referenced_by_realtime());
    }

    #[test]
    fn second_begin_fails_while_build_in_progress() {
        let _guard = serial();
        abandon();
        // Given
        assert!(begin(1, 0, 0));
        // When / Then
        assert!(!begin(1, 0, 0));
        abandon();
    }

    #[test]
    fn set_entry_out_of_range_is_a_no_op() {
        let _guard = serial();
        abandon();
        // Given
        let mut store = PlayspecStore::new(4);
        assert!(begin(1, 0, 0));
        // When
        set_entry(5, ClipId(1), 0, 1, 0, 0, 1.0, 1.0);
        let id = publish(&mut store).unwrap();
        // Then
        let playspec = store.get(id).unwrap();
        assert_eq!(playspec.entries.len(), 1);
        assert_eq!(playspec.entries[0], PlayspecEntry::default());
    }

    #[test]
    fn sweep_removes_only_unreferenced_playspecs() {
        let _guard = serial();
        abandon();
        // Given
        let mut store = PlayspecStore::new(4);
        assert!(begin(0, 0, 0));
        let live = publish(&mut store).unwrap();
        assert!(begin(0, 0, 0));
        let dead = publish(&mut store).unwrap();
        store.mark_not_referenced_by_realtime(dead);
        // When
        store.sweep_unreferenced();
        // Then
        assert!(store.get(live).is_some());
        assert!(store.get(dead).is_none());
    }
}
