// Copyright (c) 2020 White Leaf
//
// This software is released under the MIT License.
// https://opensource.org/licenses/MIT

use crate::registry::validate_review;
use crate::Engine;
use anyhow::Error;
use controller::{
    Controller, Counts, ErrorKind, Movie, MovieChanges, MovieId, MovieStats, NewMovie, Requester,
    Review, ReviewId, User, UserChanges, UserId,
};

pub const MAX_TITLE_LENGTH: usize = 255;
pub const MAX_OVERVIEW_LENGTH: usize = 1000;
pub const RELEASE_YEARS: (i32, i32) = (1900, 2030);
pub const RUNTIMES: (i32, i32) = (1, 600);

const DASHBOARD_LIST_SIZE: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct Dashboard {
    pub counts: Counts,
    pub latest_reviews: Vec<Review>,
    pub popular: Vec<MovieStats>,
}

fn require_admin(requester: &Requester, action: &str) -> Result<(), ErrorKind> {
    if requester.is_admin() {
        Ok(())
    } else {
        log::warn!("user({}) is not allowed to {}", requester.user_id, action);
        Err(ErrorKind::PermissionDenied(format!(
            "{} requires an administrator",
            action
        )))
    }
}

fn check_range(name: &str, value: Option<i32>, (min, max): (i32, i32)) -> Result<(), ErrorKind> {
    match value {
        Some(v) if v < min || v > max => Err(ErrorKind::Validation(format!(
            "{} must be between {} and {}, got {}",
            name, min, max, v
        ))),
        _ => Ok(()),
    }
}

fn check_length(name: &str, value: Option<&str>, max: usize) -> Result<(), ErrorKind> {
    match value.map(|v| v.chars().count()) {
        Some(length) if length > max => Err(ErrorKind::Validation(format!(
            "{} is {} characters long, the limit is {}",
            name, length, max
        ))),
        _ => Ok(()),
    }
}

fn check_title(title: &str) -> Result<(), ErrorKind> {
    if title.trim().is_empty() {
        return Err(ErrorKind::Validation("title is required".into()));
    }

    check_length("title", Some(title), MAX_TITLE_LENGTH)
}

pub fn validate_movie(movie: &NewMovie) -> Result<(), ErrorKind> {
    check_title(&movie.title)?;
    check_range("release year", movie.release_year, RELEASE_YEARS)?;
    check_range("runtime", movie.runtime, RUNTIMES)?;
    check_length("overview", movie.overview.as_deref(), MAX_OVERVIEW_LENGTH)
}

pub fn validate_movie_changes(changes: &MovieChanges) -> Result<(), ErrorKind> {
    if let Some(title) = &changes.title {
        check_title(title)?;
    }

    check_range("release year", changes.release_year.flatten(), RELEASE_YEARS)?;
    check_range("runtime", changes.runtime.flatten(), RUNTIMES)?;
    check_length(
        "overview",
        changes.overview.as_ref().and_then(|o| o.as_deref()),
        MAX_OVERVIEW_LENGTH,
    )
}

impl<'a, C: Controller + ?Sized> Engine<'a, C> {
    /// Overwrite the rating and comment of any review, then recompute its movie
    pub fn admin_update_review(
        &self,
        requester: Requester,
        review_id: ReviewId,
        rating: i32,
        comment_text: Option<&str>,
    ) -> Result<Review, Error> {
        require_admin(&requester, "update reviews")?;
        let (rating, comment_text) =
            validate_review(rating, comment_text, self.settings.max_comment_length)?;

        let review = self
            .controller
            .update_review(review_id, rating, comment_text.as_deref())?;
        log::info!(
            "admin({}) updated review({}) of movie({})",
            requester.user_id,
            review_id,
            review.movie_id
        );

        self.recompute(review.movie_id)?;
        Ok(review)
    }

    pub fn admin_delete_review(&self, requester: Requester, review_id: ReviewId) -> Result<(), Error> {
        require_admin(&requester, "delete reviews")?;
        let review = self.controller.review(review_id)?;
        self.remove_review(&review)
    }

    /// Add a movie to the catalog, its average starts at zero
    pub fn admin_add_movie(&self, requester: Requester, movie: &NewMovie) -> Result<Movie, Error> {
        require_admin(&requester, "add movies")?;
        validate_movie(movie)?;

        let movie = self.controller.insert_movie(movie)?;
        log::info!("movie({}) {:?} added", movie.movie_id, movie.title);
        Ok(movie)
    }

    pub fn admin_update_movie(
        &self,
        requester: Requester,
        movie_id: MovieId,
        changes: &MovieChanges,
    ) -> Result<Movie, Error> {
        require_admin(&requester, "update movies")?;
        validate_movie_changes(changes)?;

        self.controller.update_movie(movie_id, changes)
    }

    /// Remove a movie along with all of its reviews
    pub fn admin_delete_movie(&self, requester: Requester, movie_id: MovieId) -> Result<Movie, Error> {
        require_admin(&requester, "delete movies")?;

        let movie = self.controller.delete_movie(movie_id)?;
        log::info!("movie({}) {:?} deleted", movie.movie_id, movie.title);
        Ok(movie)
    }

    /// Change the profile flags of a user. Passwords and tokens only move
    /// through the account flows and are ignored here.
    pub fn admin_update_user(
        &self,
        requester: Requester,
        user_id: UserId,
        changes: &UserChanges,
    ) -> Result<User, Error> {
        require_admin(&requester, "update users")?;

        self.controller.update_user(
            user_id,
            &UserChanges {
                password_hash: None,
                token: None,
                ..changes.clone()
            },
        )
    }

    /// Remove a user with their reviews and recompute every movie they had
    /// reviewed. Returns the recomputed movies.
    pub fn admin_delete_user(
        &self,
        requester: Requester,
        user_id: UserId,
    ) -> Result<Vec<MovieId>, Error> {
        require_admin(&requester, "delete users")?;
        if requester.user_id == user_id {
            return Err(ErrorKind::Validation("administrators can't delete themselves".into()).into());
        }

        let touched = self.controller.delete_user(user_id)?;
        log::info!(
            "user({}) deleted, recomputing {} movies",
            user_id,
            touched.len()
        );

        // The reviews are gone already, every movie must be recomputed
        let mut first_error = None;
        for movie_id in &touched {
            if let Err(e) = self.recompute_if_exists(*movie_id) {
                log::error!("Couldn't recompute movie({}): {}", movie_id, e);
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(touched),
        }
    }

    pub fn dashboard(&self, requester: Requester) -> Result<Dashboard, Error> {
        require_admin(&requester, "view the dashboard")?;

        Ok(Dashboard {
            counts: self.controller.counts()?,
            latest_reviews: self.controller.latest_reviews(DASHBOARD_LIST_SIZE)?,
            popular: self.top_by_review_count(DASHBOARD_LIST_SIZE)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{movie, rate, store, user};
    use assert_approx_eq::*;

    fn is_denied(err: &Error) -> bool {
        matches!(ErrorKind::of(err), Some(ErrorKind::PermissionDenied(_)))
    }

    fn is_invalid(err: &Error) -> bool {
        matches!(ErrorKind::of(err), Some(ErrorKind::Validation(_)))
    }

    #[test]
    fn members_are_turned_away() -> Result<(), Error> {
        let controller = store();
        let engine = Engine::with_controller(&controller);
        let alice = user(&controller, "alice")?;
        let x = movie(&controller, "X", None)?;
        let member = Requester::from(&alice);

        assert!(is_denied(&engine.admin_delete_movie(member, x.movie_id).unwrap_err()));
        assert!(is_denied(&engine.admin_delete_user(member, alice.user_id).unwrap_err()));
        assert!(is_denied(&engine.dashboard(member).unwrap_err()));
        assert!(is_denied(
            &engine
                .admin_add_movie(member, &NewMovie::default())
                .unwrap_err()
        ));

        assert_eq!(controller.counts()?.movies, 1);
        Ok(())
    }

    #[test]
    fn admin_review_changes_recompute() -> Result<(), Error> {
        let controller = store();
        let engine = Engine::with_controller(&controller);
        let admin = Requester::admin(999);
        let alice = user(&controller, "alice")?;
        let bob = user(&controller, "bob")?;
        let x = movie(&controller, "X", None)?;

        let review = engine.upsert_review(alice.user_id, x.movie_id, 1, Some("spam spam"))?;
        engine.upsert_review(bob.user_id, x.movie_id, 4, None)?;
        assert_approx_eq!(controller.movie(x.movie_id)?.avg_rating, 2.5);

        let updated = engine.admin_update_review(admin, review.review_id, 2, None)?;
        assert_eq!(updated.comment_text, None);
        assert_approx_eq!(controller.movie(x.movie_id)?.avg_rating, 3.0);

        assert!(is_invalid(
            &engine
                .admin_update_review(admin, review.review_id, 0, None)
                .unwrap_err()
        ));

        engine.admin_delete_review(admin, review.review_id)?;
        assert_approx_eq!(controller.movie(x.movie_id)?.avg_rating, 4.0);

        Ok(())
    }

    #[test]
    fn movie_fields_are_validated() {
        let valid = NewMovie {
            title: "Stalker".into(),
            release_year: Some(1979),
            runtime: Some(162),
            ..Default::default()
        };
        assert!(validate_movie(&valid).is_ok());

        let cases = vec![
            NewMovie {
                title: "  ".into(),
                ..valid.clone()
            },
            NewMovie {
                title: "t".repeat(256),
                ..valid.clone()
            },
            NewMovie {
                release_year: Some(1899),
                ..valid.clone()
            },
            NewMovie {
                runtime: Some(601),
                ..valid.clone()
            },
            NewMovie {
                overview: Some("o".repeat(1001)),
                ..valid.clone()
            },
        ];

        for movie in cases {
            assert!(matches!(validate_movie(&movie), Err(ErrorKind::Validation(_))));
        }

        let changes = MovieChanges {
            release_year: Some(Some(2031)),
            ..Default::default()
        };
        assert!(validate_movie_changes(&changes).is_err());

        let clear = MovieChanges {
            release_year: Some(None),
            ..Default::default()
        };
        assert!(validate_movie_changes(&clear).is_ok());
    }

    #[test]
    fn deleting_a_movie_drops_its_reviews() -> Result<(), Error> {
        let controller = store();
        let engine = Engine::with_controller(&controller);
        let alice = user(&controller, "alice")?;
        let x = movie(&controller, "X", None)?;
        rate(&controller, &alice, &x, 3)?;

        engine.admin_delete_movie(Requester::admin(999), x.movie_id)?;

        assert_eq!(controller.counts()?.reviews, 0);
        assert!(ErrorKind::is_not_found(
            &controller.movie(x.movie_id).unwrap_err()
        ));

        Ok(())
    }

    #[test]
    fn deleting_a_user_recomputes_their_movies() -> Result<(), Error> {
        let controller = store();
        let engine = Engine::with_controller(&controller);
        let alice = user(&controller, "alice")?;
        let bob = user(&controller, "bob")?;
        let x = movie(&controller, "X", None)?;
        let y = movie(&controller, "Y", None)?;

        engine.upsert_review(alice.user_id, x.movie_id, 1, None)?;
        engine.upsert_review(alice.user_id, y.movie_id, 1, None)?;
        engine.upsert_review(bob.user_id, x.movie_id, 5, None)?;

        let touched = engine.admin_delete_user(Requester::admin(999), alice.user_id)?;

        assert_eq!(touched, vec![x.movie_id, y.movie_id]);
        assert_approx_eq!(controller.movie(x.movie_id)?.avg_rating, 5.0);
        assert_eq!(controller.movie(y.movie_id)?.avg_rating, 0.0);

        Ok(())
    }

    #[test]
    fn failed_recompute_does_not_skip_other_movies() -> Result<(), Error> {
        let controller = store();
        let engine = Engine::with_controller(&controller);
        let alice = user(&controller, "alice")?;
        let bob = user(&controller, "bob")?;
        let x = movie(&controller, "X", None)?;
        let y = movie(&controller, "Y", None)?;

        engine.upsert_review(alice.user_id, x.movie_id, 1, None)?;
        engine.upsert_review(alice.user_id, y.movie_id, 1, None)?;
        engine.upsert_review(bob.user_id, y.movie_id, 5, None)?;
        controller.break_movie(x.movie_id);

        let err = engine
            .admin_delete_user(Requester::admin(999), alice.user_id)
            .unwrap_err();
        assert!(matches!(ErrorKind::of(&err), Some(ErrorKind::Storage(_))));

        assert!(ErrorKind::is_not_found(&controller.user(alice.user_id).unwrap_err()));
        assert_eq!(controller.movie_ratings(y.movie_id)?, vec![5]);
        assert_approx_eq!(controller.movie(y.movie_id)?.avg_rating, 5.0);

        Ok(())
    }

    #[test]
    fn admins_cannot_delete_themselves() -> Result<(), Error> {
        let controller = store();
        let engine = Engine::with_controller(&controller);
        let root = user(&controller, "root")?;

        let err = engine
            .admin_delete_user(Requester::admin(root.user_id), root.user_id)
            .unwrap_err();
        assert!(is_invalid(&err));
        assert_eq!(controller.counts()?.users, 1);

        Ok(())
    }

    #[test]
    fn user_updates_leave_credentials_alone() -> Result<(), Error> {
        let controller = store();
        let engine = Engine::with_controller(&controller);
        let alice = user(&controller, "alice")?;

        let updated = engine.admin_update_user(
            Requester::admin(999),
            alice.user_id,
            &UserChanges {
                is_active: Some(false),
                password_hash: Some("overwritten".into()),
                ..Default::default()
            },
        )?;

        assert!(!updated.is_active);
        assert_eq!(updated.password_hash, alice.password_hash);

        Ok(())
    }

    #[test]
    fn dashboard_counts_everything() -> Result<(), Error> {
        let controller = store();
        let engine = Engine::with_controller(&controller);
        let alice = user(&controller, "alice")?;
        let x = movie(&controller, "X", None)?;
        movie(&controller, "Y", None)?;
        engine.upsert_review(alice.user_id, x.movie_id, 4, Some("fine"))?;

        let dashboard = engine.dashboard(Requester::admin(999))?;
        assert_eq!(
            dashboard.counts,
            Counts {
                users: 1,
                movies: 2,
                reviews: 1
            }
        );
        assert_eq!(dashboard.latest_reviews.len(), 1);
        assert_eq!(dashboard.popular.len(), 1);

        Ok(())
    }
}
