// Copyright (c) 2020 White Leaf
//
// This software is released under the MIT License.
// https://opensource.org/licenses/MIT

pub mod entity;
pub mod error;
pub mod lazy;
pub mod models;
pub mod searchby;
pub mod values;

use anyhow::Error;
use chrono::NaiveDateTime;

pub use entity::{Entity, ToTable};
pub use error::ErrorKind;
pub use lazy::LazyMovieChunks;
pub use models::{
    Counts, Movie, MovieChanges, MovieFilter, MovieId, MovieStats, NewMovie, NewUser,
    RatingChange, Requester, Review, ReviewDraft, ReviewId, Role, Token, TokenKind, User,
    UserChanges, UserId,
};
pub use searchby::SearchBy;
pub use values::{Field, Type, Value};

pub type Result<T> = std::result::Result<T, Error>;

/// Persistence seam of the application.
///
/// Lookups by id fail with `ErrorKind::InvalidState` when the row doesn't exist,
/// storage failures surface as `ErrorKind::Storage`. Implementations must
/// enforce uniqueness of `(user_id, movie_id)` for reviews and of `email` for
/// users at the storage level.
pub trait Controller {
    /// Get a single movie
    fn movie(&self, id: MovieId) -> Result<Movie>;

    /// Get movies that matched the search criteria
    fn movies_by(&self, by: &SearchBy) -> Result<Vec<Movie>>;

    /// Get a chunk of movies ordered by id
    fn movies_offset_limit(&self, offset: usize, limit: usize) -> Result<Vec<Movie>>;

    /// Build an iterator that returns all movies by chunks
    fn movies_by_chunks(&self, chunk_size: usize) -> LazyMovieChunks<Self>
    where
        Self: Sized,
    {
        LazyMovieChunks::new(self, chunk_size)
    }

    /// Every movie passing the filter along with its review count, movies
    /// without reviews are included with a count of zero
    fn movie_stats(&self, filter: &MovieFilter) -> Result<Vec<MovieStats>>;

    /// Movies whose title, overview or tagline contain the text (case insensitive),
    /// best rated first
    fn search_movies(&self, text: &str, limit: usize) -> Result<Vec<Movie>>;

    /// Distinct release years, newest first
    fn release_years(&self) -> Result<Vec<i32>>;

    fn insert_movie(&self, movie: &NewMovie) -> Result<Movie>;

    fn update_movie(&self, id: MovieId, changes: &MovieChanges) -> Result<Movie>;

    /// Remove a movie and, by cascade, all of its reviews
    fn delete_movie(&self, id: MovieId) -> Result<Movie>;

    /// Read the movie's current ratings, apply `average` and store the result.
    /// Reading and writing happen as one step, concurrent refreshes of the
    /// same movie never persist an average of stale ratings.
    fn refresh_avg_rating(
        &self,
        id: MovieId,
        average: &dyn Fn(&[i16]) -> f64,
    ) -> Result<RatingChange>;

    fn review(&self, id: ReviewId) -> Result<Review>;

    /// The review a user wrote for a movie, if any
    fn review_for(&self, user_id: UserId, movie_id: MovieId) -> Result<Option<Review>>;

    /// Ratings of every review currently attached to the movie
    fn movie_ratings(&self, movie_id: MovieId) -> Result<Vec<i16>>;

    /// Ratings of every review written by the user
    fn user_ratings(&self, user_id: UserId) -> Result<Vec<i16>>;

    /// Reviews of a movie, newest first
    fn movie_reviews(&self, movie_id: MovieId, offset: usize, limit: usize) -> Result<Vec<Review>>;

    /// Reviews written by a user, newest first
    fn user_reviews(&self, user_id: UserId, offset: usize, limit: usize) -> Result<Vec<Review>>;

    /// Newest reviews across the whole site
    fn latest_reviews(&self, limit: usize) -> Result<Vec<Review>>;

    /// Reviews whose comment contains the text (case insensitive), newest first
    fn search_reviews(&self, text: &str, limit: usize) -> Result<Vec<Review>>;

    /// Create the review for `(user_id, movie_id)` or update the existing one in
    /// place, atomically. Racing calls for the same pair end up as one row.
    fn upsert_review(&self, draft: &ReviewDraft) -> Result<Review>;

    /// Overwrite rating and comment of an existing review
    fn update_review(
        &self,
        id: ReviewId,
        rating: i16,
        comment_text: Option<&str>,
    ) -> Result<Review>;

    /// Remove a review, returning the removed row
    fn delete_review(&self, id: ReviewId) -> Result<Review>;

    fn user(&self, id: UserId) -> Result<User>;

    fn user_by_email(&self, email: &str) -> Result<Option<User>>;

    fn user_by_token(&self, value: &str) -> Result<Option<User>>;

    /// Confirmed users whose display name contains the text (case insensitive)
    fn search_users(&self, text: &str, limit: usize) -> Result<Vec<User>>;

    /// Users holding a token issued strictly before `cutoff`
    fn users_with_tokens_before(&self, cutoff: NaiveDateTime) -> Result<Vec<User>>;

    /// Fails with `ErrorKind::AlreadyExists` when the email is taken
    fn insert_user(&self, user: &NewUser) -> Result<User>;

    fn update_user(&self, id: UserId, changes: &UserChanges) -> Result<User>;

    /// Remove a user and their reviews, returning the movies those reviews belonged to
    fn delete_user(&self, id: UserId) -> Result<Vec<MovieId>>;

    fn counts(&self) -> Result<Counts>;
}
