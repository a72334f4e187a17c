// Copyright (c) 2020 White Leaf
//
// This software is released under the MIT License.
// https://opensource.org/licenses/MIT

use crate::Engine;
use anyhow::Error;
use controller::{Controller, ErrorKind, MovieId};

/// Mean of the ratings rounded half-up to two decimals, `0.0` when empty.
///
/// Rounding happens on the exact rational mean in integer arithmetic, so
/// `[4, 5]` is `4.5`, `[3, 4, 4]` is `3.67` and a mean of exactly `4.125`
/// becomes `4.13` regardless of how the quotient would look as a float.
pub fn rounded_mean(ratings: &[i16]) -> f64 {
    if ratings.is_empty() {
        return 0.0;
    }

    let n = ratings.len() as i64;
    let sum: i64 = ratings.iter().map(|&r| i64::from(r)).sum();
    let cents = (200 * sum + n).div_euclid(2 * n);

    cents as f64 / 100.0
}

impl<'a, C: Controller + ?Sized> Engine<'a, C> {
    /// Recompute and persist the average rating of a movie.
    ///
    /// Fails with `InvalidState` if the movie doesn't exist. Ratings are read
    /// and the average written as one controller step, a failing write leaves
    /// the previous average in place.
    pub fn recompute(&self, movie_id: MovieId) -> Result<f64, Error> {
        let change = self
            .controller
            .refresh_avg_rating(movie_id, &rounded_mean)?;

        if (change.previous - change.current).abs() > f64::EPSILON {
            log::debug!(
                "movie({}) avg_rating {:.2} -> {:.2} over {} reviews",
                movie_id,
                change.previous,
                change.current,
                change.reviews
            );
        }

        Ok(change.current)
    }

    /// Like `recompute`, but a movie that no longer exists is not an error
    pub fn recompute_if_exists(&self, movie_id: MovieId) -> Result<Option<f64>, Error> {
        match self.recompute(movie_id) {
            Ok(avg) => Ok(Some(avg)),
            Err(e) if ErrorKind::is_not_found(&e) => {
                log::debug!("Skipping recompute of missing movie({})", movie_id);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}
