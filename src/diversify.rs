//! Per-user, per-day selection from a ranked pick pool.
//!
//! The same `(user_id, date)` pair always draws the same subset from the same pool, so
//! two users looking at the same slate see different but reproducible picks.

use std::cmp::Ordering;
use std::fmt::Display;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use sha2::{Digest, Sha256};

use crate::market::Pick;

/// A generator seeded from the exact string `"{user_id}:{date}"`.
pub fn seeded_rng(user_id: impl Display, date: &str) -> StdRng {
    let seed_text = format!("{user_id}:{date}");
    let digest = Sha256::digest(seed_text.as_bytes());
    let mut seed = [0u8; 32];
    seed.copy_from_slice(&digest);
    StdRng::from_seed(seed)
}

pub fn diversify(pool: &[Pick], user_id: impl Display, date: &str, n: usize) -> Vec<Pick> {
    if pool.len() < 2 {
        return pool.to_vec();
    }
    let mut rng = seeded_rng(user_id, date);
    diversify_with(pool, &mut rng, n)
}

/// Fisher-Yates over the whole pool, keep the first `n`, then re-rank by probability.
pub fn diversify_with<R: Rng + ?Sized>(pool: &[Pick], rng: &mut R, n: usize) -> Vec<Pick> {
    if pool.len() <= n {
        let mut out = pool.to_vec();
        sort_by_probability(&mut out);
        return out;
    }

    let mut shuffled = pool.to_vec();
    shuffled.shuffle(rng);
    shuffled.truncate(n);
    sort_by_probability(&mut shuffled);
    shuffled
}

pub(crate) fn sort_by_probability(picks: &mut [Pick]) {
    picks.sort_by(|a, b| {
        b.probability()
            .partial_cmp(&a.probability())
            .unwrap_or(Ordering::Equal)
    });
}
