// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! A two-bucket concurrent free-queue used to park idle pooled clients.
//!
//! `enqueue` always appends into the *selected* bucket. `reselect` flips
//! which bucket is selected, which freezes the old one as a batch an idle
//! reaper can drain (`clear_old`) without racing freshly-returned items.
//! `try_dequeue` is biased towards the frozen (non-selected) bucket first,
//! so a connection that's about to be reaped gets reused instead.

use std::sync::atomic::{AtomicI8, AtomicUsize, Ordering};

use crossbeam::queue::SegQueue;

pub struct FreeQueue<T> {
    buckets: [SegQueue<T>; 2],
    sizes: [AtomicUsize; 2],
    selected: AtomicI8,
}

impl<T> Default for FreeQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> FreeQueue<T> {
    pub fn new() -> Self {
        Self {
            buckets: [SegQueue::new(), SegQueue::new()],
            sizes: [AtomicUsize::new(0), AtomicUsize::new(0)],
            selected: AtomicI8::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.sizes[0].load(Ordering::Relaxed) + self.sizes[1].load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn selected_index(&self) -> usize {
        (self.selected.load(Ordering::Acquire) & 1) as usize
    }

    /// Flips which bucket new items land in; the previously-selected bucket
    /// becomes the "old" one future `try_dequeue`/`clear_old` calls drain
    /// first.
    pub fn reselect(&self) {
        self.selected.fetch_xor(1, Ordering::AcqRel);
    }

    pub fn enqueue(&self, item: T) -> usize {
        let index = self.selected_index();
        self.buckets[index].push(item);
        self.sizes[index].fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn try_dequeue(&self) -> Option<T> {
        let index = self.selected_index();
        let old = index ^ 1;
        if self.sizes[old].load(Ordering::Acquire) > 0 {
            if let Some(item) = self.buckets[old].pop() {
                self.sizes[old].fetch_sub(1, Ordering::AcqRel);
                return Some(item);
            }
        }
        if let Some(item) = self.buckets[index].pop() {
            self.sizes[index].fetch_sub(1, Ordering::AcqRel);
            return Some(item);
        }
        None
    }

    /// Drains up to `max_clear_cnt` items out of the frozen (non-selected)
    /// bucket, dropping them. Returns the number removed.
    pub fn clear_old(&self, max_clear_cnt: usize) -> usize {
        let old = self.selected_index() ^ 1;
        let mut removed = 0;
        while removed < max_clear_cnt {
            if self.buckets[old].pop().is_some() {
                self.sizes[old].fetch_sub(1, Ordering::AcqRel);
                removed += 1;
            } else {
                break;
            }
        }
        removed
    }
}
