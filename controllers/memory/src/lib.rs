// Copyright (c) 2020 White Leaf
//
// This software is released under the MIT License.
// https://opensource.org/licenses/MIT

use anyhow::Error;
use chrono::{Duration, NaiveDateTime, Utc};
use controller::{
    Controller, Counts, ErrorKind, Movie, MovieChanges, MovieFilter, MovieId, MovieStats,
    NewMovie, NewUser, RatingChange, Review, ReviewDraft, ReviewId, SearchBy, User, UserChanges,
    UserId,
};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Default)]
struct State {
    movies: BTreeMap<MovieId, Movie>,
    reviews: BTreeMap<ReviewId, Review>,
    users: BTreeMap<UserId, User>,

    next_movie_id: MovieId,
    next_review_id: ReviewId,
    next_user_id: UserId,
    last_tick: Option<NaiveDateTime>,
}

impl State {
    // Strictly increasing timestamps keep insertion order observable
    fn tick(&mut self) -> NaiveDateTime {
        let now = Utc::now().naive_utc();
        let now = match self.last_tick {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };

        self.last_tick = Some(now);
        now
    }

    fn newest_first<'a>(reviews: impl Iterator<Item = &'a Review>) -> Vec<Review> {
        let mut reviews: Vec<_> = reviews.cloned().collect();
        reviews.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then(b.review_id.cmp(&a.review_id))
        });
        reviews
    }
}

fn contains_ci(haystack: Option<&str>, needle: &str) -> bool {
    haystack
        .map(|h| h.to_lowercase().contains(needle))
        .unwrap_or(false)
}

/// Process local store, every write happens under a single lock
#[derive(Debug, Default)]
pub struct MemoryController {
    state: RwLock<State>,
    fail_writes: AtomicBool,
    broken_movies: RwLock<HashSet<MovieId>>,
}

impl MemoryController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following write fail with a storage error
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make rating updates of a single movie fail with a storage error
    pub fn break_movie(&self, id: MovieId) {
        self.broken_movies.write().insert(id);
    }

    fn check_writable(&self) -> Result<(), Error> {
        if self.fail_writes.load(Ordering::SeqCst) {
            Err(ErrorKind::Storage("store is read only".into()).into())
        } else {
            Ok(())
        }
    }
}

impl Controller for MemoryController {
    fn movie(&self, id: MovieId) -> Result<Movie, Error> {
        self.state
            .read()
            .movies
            .get(&id)
            .cloned()
            .ok_or_else(|| ErrorKind::not_found("movie", id).into())
    }

    fn movies_by(&self, by: &SearchBy) -> Result<Vec<Movie>, Error> {
        let state = self.state.read();
        let movies: Vec<_> = match by {
            SearchBy::Id(id) => state.movies.get(id).cloned().into_iter().collect(),
            SearchBy::Title(title) => state
                .movies
                .values()
                .filter(|m| &m.title == title)
                .cloned()
                .collect(),
            SearchBy::TmdbId(id) => state
                .movies
                .values()
                .filter(|m| m.tmdb_id == Some(*id))
                .cloned()
                .collect(),
        };

        if movies.is_empty() {
            Err(ErrorKind::not_found("movie", by).into())
        } else {
            Ok(movies)
        }
    }

    fn movies_offset_limit(&self, offset: usize, limit: usize) -> Result<Vec<Movie>, Error> {
        Ok(self
            .state
            .read()
            .movies
            .values()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    fn movie_stats(&self, filter: &MovieFilter) -> Result<Vec<MovieStats>, Error> {
        let state = self.state.read();

        let mut counts: HashMap<MovieId, usize> = HashMap::new();
        for review in state.reviews.values() {
            *counts.entry(review.movie_id).or_insert(0) += 1;
        }

        Ok(state
            .movies
            .values()
            .filter(|m| filter.matches(m))
            .map(|m| MovieStats {
                movie: m.clone(),
                review_count: counts.get(&m.movie_id).copied().unwrap_or(0),
            })
            .collect())
    }

    fn search_movies(&self, text: &str, limit: usize) -> Result<Vec<Movie>, Error> {
        let needle = text.to_lowercase();
        let mut found: Vec<Movie> = self
            .state
            .read()
            .movies
            .values()
            .filter(|m| {
                contains_ci(Some(m.title.as_str()), &needle)
                    || contains_ci(m.overview.as_deref(), &needle)
                    || contains_ci(m.tagline.as_deref(), &needle)
            })
            .cloned()
            .collect();

        found.sort_by(|a, b| {
            b.avg_rating
                .partial_cmp(&a.avg_rating)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.movie_id.cmp(&b.movie_id))
        });
        found.truncate(limit);
        Ok(found)
    }

    fn release_years(&self) -> Result<Vec<i32>, Error> {
        let years: BTreeSet<i32> = self
            .state
            .read()
            .movies
            .values()
            .filter_map(|m| m.release_year)
            .collect();

        Ok(years.into_iter().rev().collect())
    }

    fn insert_movie(&self, movie: &NewMovie) -> Result<Movie, Error> {
        self.check_writable()?;
        let mut state = self.state.write();

        if let Some(tmdb_id) = movie.tmdb_id {
            if state.movies.values().any(|m| m.tmdb_id == Some(tmdb_id)) {
                let what = format!("movie with tmdb_id({})", tmdb_id);
                return Err(ErrorKind::AlreadyExists(what).into());
            }
        }

        state.next_movie_id += 1;
        let created_at = state.tick();
        let movie = Movie {
            movie_id: state.next_movie_id,
            title: movie.title.clone(),
            release_year: movie.release_year,
            avg_rating: 0.0,
            poster_url: movie.poster_url.clone(),
            genres: movie.genres.clone(),
            runtime: movie.runtime,
            tagline: movie.tagline.clone(),
            overview: movie.overview.clone(),
            vote_average: movie.vote_average,
            tmdb_id: movie.tmdb_id,
            created_at,
        };

        state.movies.insert(movie.movie_id, movie.clone());
        Ok(movie)
    }

    fn update_movie(&self, id: MovieId, changes: &MovieChanges) -> Result<Movie, Error> {
        self.check_writable()?;
        let mut state = self.state.write();
        let movie = state
            .movies
            .get_mut(&id)
            .ok_or_else(|| ErrorKind::not_found("movie", id))?;

        if let Some(title) = &changes.title {
            movie.title = title.clone();
        }
        if let Some(release_year) = changes.release_year {
            movie.release_year = release_year;
        }
        if let Some(poster_url) = &changes.poster_url {
            movie.poster_url = poster_url.clone();
        }
        if let Some(genres) = &changes.genres {
            movie.genres = genres.clone();
        }
        if let Some(runtime) = changes.runtime {
            movie.runtime = runtime;
        }
        if let Some(tagline) = &changes.tagline {
            movie.tagline = tagline.clone();
        }
        if let Some(overview) = &changes.overview {
            movie.overview = overview.clone();
        }
        if let Some(vote_average) = changes.vote_average {
            movie.vote_average = vote_average;
        }

        Ok(movie.clone())
    }

    fn delete_movie(&self, id: MovieId) -> Result<Movie, Error> {
        self.check_writable()?;
        let mut state = self.state.write();
        let movie = state
            .movies
            .remove(&id)
            .ok_or_else(|| ErrorKind::not_found("movie", id))?;

        state.reviews.retain(|_, r| r.movie_id != id);
        Ok(movie)
    }

    fn refresh_avg_rating(
        &self,
        id: MovieId,
        average: &dyn Fn(&[i16]) -> f64,
    ) -> Result<RatingChange, Error> {
        self.check_writable()?;
        if self.broken_movies.read().contains(&id) {
            return Err(ErrorKind::Storage(format!("movie({}) is unwritable", id)).into());
        }

        let mut state = self.state.write();
        let ratings: Vec<i16> = state
            .reviews
            .values()
            .filter(|r| r.movie_id == id)
            .map(|r| r.rating)
            .collect();

        let movie = state
            .movies
            .get_mut(&id)
            .ok_or_else(|| ErrorKind::not_found("movie", id))?;

        let current = average(&ratings);
        let previous = std::mem::replace(&mut movie.avg_rating, current);

        Ok(RatingChange {
            previous,
            current,
            reviews: ratings.len(),
        })
    }

    fn review(&self, id: ReviewId) -> Result<Review, Error> {
        self.state
            .read()
            .reviews
            .get(&id)
            .cloned()
            .ok_or_else(|| ErrorKind::not_found("review", id).into())
    }

    fn review_for(&self, user_id: UserId, movie_id: MovieId) -> Result<Option<Review>, Error> {
        Ok(self
            .state
            .read()
            .reviews
            .values()
            .find(|r| r.user_id == user_id && r.movie_id == movie_id)
            .cloned())
    }

    fn movie_ratings(&self, movie_id: MovieId) -> Result<Vec<i16>, Error> {
        Ok(self
            .state
            .read()
            .reviews
            .values()
            .filter(|r| r.movie_id == movie_id)
            .map(|r| r.rating)
            .collect())
    }

    fn user_ratings(&self, user_id: UserId) -> Result<Vec<i16>, Error> {
        Ok(self
            .state
            .read()
            .reviews
            .values()
            .filter(|r| r.user_id == user_id)
            .map(|r| r.rating)
            .collect())
    }

    fn movie_reviews(
        &self,
        movie_id: MovieId,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Review>, Error> {
        let state = self.state.read();
        let reviews = State::newest_first(state.reviews.values().filter(|r| r.movie_id == movie_id));
        Ok(reviews.into_iter().skip(offset).take(limit).collect())
    }

    fn user_reviews(
        &self,
        user_id: UserId,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Review>, Error> {
        let state = self.state.read();
        let reviews = State::newest_first(state.reviews.values().filter(|r| r.user_id == user_id));
        Ok(reviews.into_iter().skip(offset).take(limit).collect())
    }

    fn latest_reviews(&self, limit: usize) -> Result<Vec<Review>, Error> {
        let state = self.state.read();
        let mut reviews = State::newest_first(state.reviews.values());
        reviews.truncate(limit);
        Ok(reviews)
    }

    fn search_reviews(&self, text: &str, limit: usize) -> Result<Vec<Review>, Error> {
        let needle = text.to_lowercase();
        let state = self.state.read();
        let mut reviews = State::newest_first(
            state
                .reviews
                .values()
                .filter(|r| contains_ci(r.comment_text.as_deref(), &needle)),
        );
        reviews.truncate(limit);
        Ok(reviews)
    }

    fn upsert_review(&self, draft: &ReviewDraft) -> Result<Review, Error> {
        self.check_writable()?;
        let mut state = self.state.write();

        if !state.users.contains_key(&draft.user_id) {
            return Err(ErrorKind::not_found("user", draft.user_id).into());
        }
        if !state.movies.contains_key(&draft.movie_id) {
            return Err(ErrorKind::not_found("movie", draft.movie_id).into());
        }

        let now = state.tick();
        let existing = state
            .reviews
            .values_mut()
            .find(|r| r.user_id == draft.user_id && r.movie_id == draft.movie_id);

        if let Some(review) = existing {
            review.rating = draft.rating;
            review.comment_text = draft.comment_text.clone();
            review.updated_at = now;
            return Ok(review.clone());
        }

        state.next_review_id += 1;
        let review = Review {
            review_id: state.next_review_id,
            user_id: draft.user_id,
            movie_id: draft.movie_id,
            rating: draft.rating,
            comment_text: draft.comment_text.clone(),
            created_at: now,
            updated_at: now,
        };

        state.reviews.insert(review.review_id, review.clone());
        Ok(review)
    }

    fn update_review(
        &self,
        id: ReviewId,
        rating: i16,
        comment_text: Option<&str>,
    ) -> Result<Review, Error> {
        self.check_writable()?;
        let mut state = self.state.write();
        let now = state.tick();
        let review = state
            .reviews
            .get_mut(&id)
            .ok_or_else(|| ErrorKind::not_found("review", id))?;

        review.rating = rating;
        review.comment_text = comment_text.map(str::to_owned);
        review.updated_at = now;
        Ok(review.clone())
    }

    fn delete_review(&self, id: ReviewId) -> Result<Review, Error> {
        self.check_writable()?;
        self.state
            .write()
            .reviews
            .remove(&id)
            .ok_or_else(|| ErrorKind::not_found("review", id).into())
    }

    fn user(&self, id: UserId) -> Result<User, Error> {
        self.state
            .read()
            .users
            .get(&id)
            .cloned()
            .ok_or_else(|| ErrorKind::not_found("user", id).into())
    }

    fn user_by_email(&self, email: &str) -> Result<Option<User>, Error> {
        Ok(self
            .state
            .read()
            .users
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    fn user_by_token(&self, value: &str) -> Result<Option<User>, Error> {
        Ok(self
            .state
            .read()
            .users
            .values()
            .find(|u| u.token.as_ref().map(|t| t.value == value).unwrap_or(false))
            .cloned())
    }

    fn search_users(&self, text: &str, limit: usize) -> Result<Vec<User>, Error> {
        let needle = text.to_lowercase();
        Ok(self
            .state
            .read()
            .users
            .values()
            .filter(|u| u.email_confirmed && contains_ci(Some(u.display_name.as_str()), &needle))
            .take(limit)
            .cloned()
            .collect())
    }

    fn users_with_tokens_before(&self, cutoff: NaiveDateTime) -> Result<Vec<User>, Error> {
        Ok(self
            .state
            .read()
            .users
            .values()
            .filter(|u| u.token.as_ref().map(|t| t.issued_at < cutoff).unwrap_or(false))
            .cloned()
            .collect())
    }

    fn insert_user(&self, user: &NewUser) -> Result<User, Error> {
        self.check_writable()?;
        let mut state = self.state.write();

        if state.users.values().any(|u| u.email == user.email) {
            return Err(ErrorKind::AlreadyExists(format!("user with email {}", user.email)).into());
        }

        state.next_user_id += 1;
        let created_at = state.tick();
        let user = User {
            user_id: state.next_user_id,
            email: user.email.clone(),
            password_hash: user.password_hash.clone(),
            display_name: user.display_name.clone(),
            created_at,
            is_active: true,
            email_confirmed: false,
            role: user.role,
            token: user.token.clone(),
        };

        state.users.insert(user.user_id, user.clone());
        Ok(user)
    }

    fn update_user(&self, id: UserId, changes: &UserChanges) -> Result<User, Error> {
        self.check_writable()?;
        let mut state = self.state.write();
        let user = state
            .users
            .get_mut(&id)
            .ok_or_else(|| ErrorKind::not_found("user", id))?;

        if let Some(display_name) = &changes.display_name {
            user.display_name = display_name.clone();
        }
        if let Some(password_hash) = &changes.password_hash {
            user.password_hash = password_hash.clone();
        }
        if let Some(confirmed) = changes.email_confirmed {
            user.email_confirmed = confirmed;
        }
        if let Some(active) = changes.is_active {
            user.is_active = active;
        }
        if let Some(role) = changes.role {
            user.role = role;
        }
        if let Some(token) = &changes.token {
            user.token = token.clone();
        }

        Ok(user.clone())
    }

    fn delete_user(&self, id: UserId) -> Result<Vec<MovieId>, Error> {
        self.check_writable()?;
        let mut state = self.state.write();
        state
            .users
            .remove(&id)
            .ok_or_else(|| ErrorKind::not_found("user", id))?;

        let touched: BTreeSet<MovieId> = state
            .reviews
            .values()
            .filter(|r| r.user_id == id)
            .map(|r| r.movie_id)
            .collect();

        state.reviews.retain(|_, r| r.user_id != id);
        log::debug!("Removed user({}) and reviews on {} movies", id, touched.len());

        Ok(touched.into_iter().collect())
    }

    fn counts(&self) -> Result<Counts, Error> {
        let state = self.state.read();
        Ok(Counts {
            users: state.users.len(),
            movies: state.movies.len(),
            reviews: state.reviews.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use controller::Role;

    fn seeded() -> Result<(MemoryController, User, Movie), Error> {
        let controller = MemoryController::new();
        let user = controller.insert_user(&NewUser {
            email: "chris@example.com".into(),
            password_hash: "hash".into(),
            display_name: "Chris".into(),
            role: Role::Member,
            token: None,
        })?;
        let movie = controller.insert_movie(&NewMovie {
            title: "Alien".into(),
            release_year: Some(1979),
            ..Default::default()
        })?;

        Ok((controller, user, movie))
    }

    fn draft(user: &User, movie: &Movie, rating: i16) -> ReviewDraft {
        ReviewDraft {
            user_id: user.user_id,
            movie_id: movie.movie_id,
            rating,
            comment_text: None,
        }
    }

    #[test]
    fn upsert_keeps_one_review_per_pair() -> Result<(), Error> {
        let (controller, user, movie) = seeded()?;

        let first = controller.upsert_review(&draft(&user, &movie, 3))?;
        let second = controller.upsert_review(&draft(&user, &movie, 5))?;

        assert_eq!(first.review_id, second.review_id);
        assert_eq!(second.rating, 5);
        assert_eq!(second.created_at, first.created_at);
        assert!(second.updated_at > first.updated_at);
        assert_eq!(controller.movie_ratings(movie.movie_id)?, vec![5]);

        Ok(())
    }

    #[test]
    fn upsert_requires_both_parents() -> Result<(), Error> {
        let (controller, user, movie) = seeded()?;
        let mut orphan = draft(&user, &movie, 4);
        orphan.movie_id = 99;

        let err = controller.upsert_review(&orphan).unwrap_err();
        assert!(ErrorKind::is_not_found(&err));

        Ok(())
    }

    #[test]
    fn duplicate_email_is_rejected() -> Result<(), Error> {
        let (controller, user, _) = seeded()?;
        let err = controller
            .insert_user(&NewUser {
                email: user.email.clone(),
                password_hash: "other".into(),
                display_name: "Other".into(),
                role: Role::Member,
                token: None,
            })
            .unwrap_err();

        assert!(matches!(ErrorKind::of(&err), Some(ErrorKind::AlreadyExists(_))));

        Ok(())
    }

    #[test]
    fn deleting_a_movie_cascades_to_reviews() -> Result<(), Error> {
        let (controller, user, movie) = seeded()?;
        controller.upsert_review(&draft(&user, &movie, 4))?;

        controller.delete_movie(movie.movie_id)?;
        assert_eq!(controller.counts()?.reviews, 0);

        Ok(())
    }

    #[test]
    fn deleting_a_user_reports_touched_movies() -> Result<(), Error> {
        let (controller, user, movie) = seeded()?;
        controller.upsert_review(&draft(&user, &movie, 4))?;

        let touched = controller.delete_user(user.user_id)?;
        assert_eq!(touched, vec![movie.movie_id]);
        assert_eq!(controller.counts()?.reviews, 0);

        Ok(())
    }

    #[test]
    fn refresh_reads_the_current_ratings() -> Result<(), Error> {
        let (controller, user, movie) = seeded()?;
        controller.upsert_review(&draft(&user, &movie, 4))?;

        let count = |ratings: &[i16]| ratings.len() as f64;
        let change = controller.refresh_avg_rating(movie.movie_id, &count)?;

        assert_eq!(change.previous, 0.0);
        assert_eq!(change.current, 1.0);
        assert_eq!(change.reviews, 1);
        assert_eq!(controller.movie(movie.movie_id)?.avg_rating, 1.0);

        let err = controller.refresh_avg_rating(-1, &count).unwrap_err();
        assert!(ErrorKind::is_not_found(&err));

        Ok(())
    }

    #[test]
    fn failing_writes_surface_as_storage_errors() -> Result<(), Error> {
        let (controller, _, movie) = seeded()?;
        controller.fail_writes(true);

        let err = controller
            .refresh_avg_rating(movie.movie_id, &|_: &[i16]| 4.0)
            .unwrap_err();
        assert!(matches!(ErrorKind::of(&err), Some(ErrorKind::Storage(_))));

        Ok(())
    }

    #[test]
    fn chunks_walk_the_whole_catalog() -> Result<(), Error> {
        let controller = MemoryController::new();
        for n in 0..5 {
            controller.insert_movie(&NewMovie {
                title: format!("Movie {}", n),
                ..Default::default()
            })?;
        }

        let sizes: Vec<usize> = controller
            .movies_by_chunks(2)
            .map(|chunk| chunk.map(|movies| movies.len()))
            .collect::<Result<_, _>>()?;

        assert_eq!(sizes, vec![2, 2, 1]);

        Ok(())
    }
}
