// Copyright (c) 2020 White Leaf
//
// This software is released under the MIT License.
// https://opensource.org/licenses/MIT

use crate::Engine;
use anyhow::Error;
use chrono::{NaiveDateTime, Utc};
use controller::{Controller, LazyMovieChunks};
use std::fmt::{self, Display};

/// Tally of a maintenance sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Items looked at
    pub processed: usize,
    /// Items whose stored state changed
    pub updated: usize,
    /// Items left untouched because of an error
    pub failed: usize,
}

impl Display for SweepReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} processed, {} updated, {} failed",
            self.processed, self.updated, self.failed
        )
    }
}

impl<'a, C: Controller + ?Sized> Engine<'a, C> {
    /// Recompute the average of every movie, walking the catalog by chunks.
    ///
    /// A movie that fails is logged and counted, the sweep carries on with
    /// the next one. Failing to load a chunk ends the sweep with an error.
    pub fn recompute_all(&self, chunk_size: usize) -> Result<SweepReport, Error> {
        let mut report = SweepReport::default();

        for chunk in LazyMovieChunks::new(self.controller, chunk_size.max(1)) {
            for movie in chunk? {
                report.processed += 1;
                match self.recompute(movie.movie_id) {
                    Ok(avg) if (avg - movie.avg_rating).abs() > f64::EPSILON => report.updated += 1,
                    Ok(_) => {}
                    Err(e) => {
                        report.failed += 1;
                        log::error!("Couldn't recompute movie({}): {}", movie.movie_id, e);
                    }
                }
            }
        }

        log::info!("Rating sweep finished: {}", report);
        Ok(report)
    }

    pub fn cleanup_expired_tokens(&self) -> Result<SweepReport, Error> {
        self.cleanup_expired_tokens_at(Utc::now().naive_utc())
    }

    /// Clear every token older than the validity window. Users are handled
    /// one at a time so a failing update doesn't stop the others.
    pub fn cleanup_expired_tokens_at(&self, now: NaiveDateTime) -> Result<SweepReport, Error> {
        let cutoff = now - self.settings.token_validity;
        let users = self.controller.users_with_tokens_before(cutoff)?;
        let mut report = SweepReport::default();

        for user in users {
            report.processed += 1;
            match self.clear_token(&user) {
                Ok(_) => report.updated += 1,
                Err(e) => {
                    report.failed += 1;
                    log::error!("Couldn't clear token of user({}): {}", user.user_id, e);
                }
            }
        }

        if report.processed > 0 {
            log::info!("Token cleanup finished: {}", report);
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{movie, rate_many, store, user};
    use assert_approx_eq::*;
    use chrono::Duration;
    use controller::{Token, TokenKind, UserChanges};

    #[test]
    fn sweep_fixes_stale_averages() -> Result<(), Error> {
        let controller = store();
        let engine = Engine::with_controller(&controller);

        let mut movies = Vec::new();
        for n in 0..7 {
            let m = movie(&controller, &format!("Movie {}", n), None)?;
            rate_many(&controller, &m, &[5, 4, 5])?;
            movies.push(m);
        }
        // One movie already holds the right value
        engine.recompute(movies[0].movie_id)?;

        let report = engine.recompute_all(3)?;
        assert_eq!(
            report,
            SweepReport {
                processed: 7,
                updated: 6,
                failed: 0
            }
        );

        for m in &movies {
            assert_approx_eq!(controller.movie(m.movie_id)?.avg_rating, 4.67);
        }

        // Nothing left to do
        assert_eq!(engine.recompute_all(3)?.updated, 0);

        Ok(())
    }

    #[test]
    fn one_bad_movie_does_not_stop_the_sweep() -> Result<(), Error> {
        let controller = store();
        let engine = Engine::with_controller(&controller);
        let a = movie(&controller, "A", None)?;
        let b = movie(&controller, "B", None)?;
        let c = movie(&controller, "C", None)?;
        for m in &[&a, &b, &c] {
            rate_many(&controller, m, &[2, 3])?;
        }
        controller.break_movie(b.movie_id);

        let report = engine.recompute_all(2)?;
        assert_eq!(report.processed, 3);
        assert_eq!(report.failed, 1);
        assert_eq!(report.updated, 2);

        assert_approx_eq!(controller.movie(a.movie_id)?.avg_rating, 2.5);
        assert_eq!(controller.movie(b.movie_id)?.avg_rating, 0.0);
        assert_approx_eq!(controller.movie(c.movie_id)?.avg_rating, 2.5);

        Ok(())
    }

    #[test]
    fn empty_catalog_sweep() -> Result<(), Error> {
        let controller = store();
        let engine = Engine::with_controller(&controller);

        assert_eq!(engine.recompute_all(0)?, SweepReport::default());
        Ok(())
    }

    #[test]
    fn only_expired_tokens_are_cleared() -> Result<(), Error> {
        let controller = store();
        let engine = Engine::with_controller(&controller);
        let now = Utc::now().naive_utc();

        let stale = user(&controller, "stale")?;
        let fresh = user(&controller, "fresh")?;
        let none = user(&controller, "none")?;

        for (u, age) in &[(&stale, 31), (&fresh, 5)] {
            controller.update_user(
                u.user_id,
                &UserChanges {
                    token: Some(Some(Token {
                        kind: TokenKind::Reset,
                        value: format!("token-of-{}", u.display_name),
                        issued_at: now - Duration::minutes(*age),
                    })),
                    ..Default::default()
                },
            )?;
        }

        let report = engine.cleanup_expired_tokens_at(now)?;
        assert_eq!(report.processed, 1);
        assert_eq!(report.updated, 1);

        assert_eq!(controller.user(stale.user_id)?.token, None);
        assert!(controller.user(fresh.user_id)?.token.is_some());
        assert_eq!(controller.user(none.user_id)?.token, None);

        Ok(())
    }

    #[test]
    fn failed_cleanup_is_counted() -> Result<(), Error> {
        let controller = store();
        let engine = Engine::with_controller(&controller);
        let (_, token) = engine.register("alice@example.com", "long enough", "Alice")?;

        controller.fail_writes(true);
        let report = engine.cleanup_expired_tokens_at(token.issued_at + Duration::hours(1))?;

        assert_eq!(report.failed, 1);
        assert_eq!(report.updated, 0);

        Ok(())
    }
}
