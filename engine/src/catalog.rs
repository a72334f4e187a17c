// Copyright (c) 2020 White Leaf
//
// This software is released under the MIT License.
// https://opensource.org/licenses/MIT

use crate::aggregate::rounded_mean;
use crate::page::offset;
use crate::{Engine, Page};
use anyhow::Error;
use controller::{Controller, ErrorKind, Movie, MovieId, Review, User, UserId};
use std::collections::BTreeMap;

pub const MAX_QUERY_LENGTH: usize = 100;
pub const SEARCH_MOVIES_LIMIT: usize = 20;
pub const SEARCH_USERS_LIMIT: usize = 10;
pub const SEARCH_REVIEWS_LIMIT: usize = 15;

#[derive(Debug, Clone, PartialEq)]
pub struct RatingSummary {
    pub movie: Movie,
    pub review_count: usize,
    /// Every star value from 1 to 5 is present
    pub distribution: BTreeMap<i16, usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UserProfile {
    pub user: User,
    pub reviews: Page<Review>,
    pub mean_rating: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchResults {
    pub movies: Vec<Movie>,
    pub users: Vec<User>,
    pub reviews: Vec<Review>,
}

impl SearchResults {
    pub fn is_empty(&self) -> bool {
        self.movies.is_empty() && self.users.is_empty() && self.reviews.is_empty()
    }
}

pub fn distribution(ratings: &[i16]) -> BTreeMap<i16, usize> {
    let mut distribution: BTreeMap<i16, usize> = (1..=5).map(|star| (star, 0)).collect();
    for rating in ratings {
        *distribution.entry(*rating).or_insert(0) += 1;
    }

    distribution
}

impl<'a, C: Controller + ?Sized> Engine<'a, C> {
    pub fn movie_rating_summary(&self, movie_id: MovieId) -> Result<RatingSummary, Error> {
        let movie = self.controller.movie(movie_id)?;
        let ratings = self.controller.movie_ratings(movie_id)?;

        Ok(RatingSummary {
            movie,
            review_count: ratings.len(),
            distribution: distribution(&ratings),
        })
    }

    /// Reviews of a movie, newest first
    pub fn movie_reviews(&self, movie_id: MovieId, page: usize) -> Result<Page<Review>, Error> {
        self.controller.movie(movie_id)?;
        let per_page = self.settings.reviews_per_page;
        let total = self.controller.movie_ratings(movie_id)?.len();

        let items = match offset(page, per_page) {
            Some(offset) => self.controller.movie_reviews(movie_id, offset, per_page)?,
            None => Vec::new(),
        };

        Ok(Page::from_parts(items, page, per_page, total))
    }

    pub fn user_profile(&self, user_id: UserId, page: usize) -> Result<UserProfile, Error> {
        let user = self.controller.user(user_id)?;
        let ratings = self.controller.user_ratings(user_id)?;
        let per_page = self.settings.reviews_per_page;

        let items = match offset(page, per_page) {
            Some(offset) => self.controller.user_reviews(user_id, offset, per_page)?,
            None => Vec::new(),
        };

        Ok(UserProfile {
            user,
            reviews: Page::from_parts(items, page, per_page, ratings.len()),
            mean_rating: rounded_mean(&ratings),
        })
    }

    pub fn latest_reviews(&self, limit: usize) -> Result<Vec<Review>, Error> {
        self.controller.latest_reviews(limit)
    }

    /// Site wide search over movies, confirmed users and review comments.
    /// A blank query finds nothing.
    pub fn search(&self, text: &str) -> Result<SearchResults, Error> {
        let text = text.trim();
        if text.chars().count() > MAX_QUERY_LENGTH {
            return Err(ErrorKind::Validation(format!(
                "search text can't be longer than {} characters",
                MAX_QUERY_LENGTH
            ))
            .into());
        }

        if text.is_empty() {
            return Ok(SearchResults::default());
        }

        let results = SearchResults {
            movies: self.controller.search_movies(text, SEARCH_MOVIES_LIMIT)?,
            users: self.controller.search_users(text, SEARCH_USERS_LIMIT)?,
            reviews: self.controller.search_reviews(text, SEARCH_REVIEWS_LIMIT)?,
        };

        log::debug!(
            "search {:?} found {} movies, {} users, {} reviews",
            text,
            results.movies.len(),
            results.users.len(),
            results.reviews.len()
        );

        Ok(results)
    }

    pub fn release_years(&self) -> Result<Vec<i32>, Error> {
        self.controller.release_years()
    }
}
