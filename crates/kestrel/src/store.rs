//! The per-landmark state owned by the tracker.
//!
//! Each landmark is a single record rather than a bundle of parallel vectors; compacting the set
//! therefore cannot leave one attribute sequence out of step with the others. Identifiers are
//! minted from a monotonically increasing counter that is never rewound, so an id stays unique
//! for the lifetime of the process even across restarts.

use kestrel_utils::iter::zip_exact;
use nalgebra::Point2;

/// A persistently identified 2D feature.
#[derive(Debug, Clone)]
pub(crate) struct Landmark {
    pub id: u64,

    /// Pixel position in the most recently processed frame.
    pub px: Point2<f32>,

    /// Pixel position in the frame before that. Equal to `px` for newborn landmarks.
    pub prev_px: Point2<f32>,

    /// Position on the normalized image plane (`z = 1`), from the current frame.
    pub ray: Point2<f64>,

    /// Number of consecutive frames this landmark has been observed in.
    pub age: u32,
}

#[derive(Debug, Default)]
pub(crate) struct LandmarkStore {
    landmarks: Vec<Landmark>,
    next_id: u64,
}

impl LandmarkStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.landmarks.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.landmarks.is_empty()
    }

    #[inline]
    pub fn landmarks(&self) -> &[Landmark] {
        &self.landmarks
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Landmark> {
        self.landmarks.iter_mut()
    }

    /// Births a new landmark at `px` with a fresh id and age 1.
    pub fn append(&mut self, px: Point2<f32>) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.landmarks.push(Landmark {
            id,
            px,
            prev_px: px,
            ray: Point2::origin(),
            age: 1,
        });
        id
    }

    /// Stable compaction: keeps exactly the landmarks whose `keep` entry is `true`.
    ///
    /// # Panics
    ///
    /// Panics if `keep` is not parallel to the store.
    pub fn retain_mask(&mut self, keep: &[bool]) {
        let mut keep_iter = zip_exact(0..self.landmarks.len(), keep);
        self.landmarks.retain(|_| *keep_iter.next().unwrap().1);
    }

    /// Increments the age of every landmark currently in the store.
    pub fn ages_increment(&mut self) {
        for lm in &mut self.landmarks {
            lm.age += 1;
        }
    }

    /// Replaces the landmark sequence, e.g. after a reordering pass.
    pub fn take_landmarks(&mut self) -> Vec<Landmark> {
        std::mem::take(&mut self.landmarks)
    }

    /// Counterpart to [`LandmarkStore::take_landmarks`].
    pub fn set_landmarks(&mut self, landmarks: Vec<Landmark>) {
        self.landmarks = landmarks;
    }

    /// Forgets all landmarks. The id counter is deliberately left untouched.
    pub fn clear(&mut self) {
        self.landmarks.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_monotonic_and_never_reused() {
        let mut store = LandmarkStore::new();
        let a = store.append(Point2::new(1.0, 1.0));
        let b = store.append(Point2::new(2.0, 2.0));
        assert!(b > a);

        store.retain_mask(&[false, false]);
        assert!(store.is_empty());

        let c = store.append(Point2::new(3.0, 3.0));
        assert!(c > b);

        store.clear();
        let d = store.append(Point2::new(4.0, 4.0));
        assert!(d > c);
    }

    #[test]
    fn retain_is_stable() {
        let mut store = LandmarkStore::new();
        for i in 0..5 {
            store.append(Point2::new(i as f32, 0.0));
        }
        store.retain_mask(&[true, false, true, false, true]);
        let ids: Vec<u64> = store.landmarks().iter().map(|lm| lm.id).collect();
        assert_eq!(ids, [0, 2, 4]);
    }

    #[test]
    #[should_panic]
    fn retain_rejects_mismatched_mask() {
        let mut store = LandmarkStore::new();
        store.append(Point2::new(0.0, 0.0));
        store.retain_mask(&[true, true]);
    }

    #[test]
    fn newborns_start_at_age_one() {
        let mut store = LandmarkStore::new();
        store.append(Point2::new(0.0, 0.0));
        assert_eq!(store.landmarks()[0].age, 1);
        store.ages_increment();
        assert_eq!(store.landmarks()[0].age, 2);
    }
}
