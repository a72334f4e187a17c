// Copyright (c) 2020 White Leaf
//
// This software is released under the MIT License.
// https://opensource.org/licenses/MIT

use crate::Engine;
use anyhow::Error;
use controller::{Controller, ErrorKind, MovieId, Requester, Review, ReviewDraft, ReviewId, UserId};

pub const MIN_RATING: i32 = 1;
pub const MAX_RATING: i32 = 5;

/// Check a rating and a comment, returning the values to store. The comment
/// is trimmed and a blank comment is stored as absent.
pub fn validate_review(
    rating: i32,
    comment_text: Option<&str>,
    max_comment_length: usize,
) -> Result<(i16, Option<String>), ErrorKind> {
    if rating < MIN_RATING || rating > MAX_RATING {
        return Err(ErrorKind::Validation(format!(
            "rating must be between {} and {}, got {}",
            MIN_RATING, MAX_RATING, rating
        )));
    }

    let comment_text = comment_text.map(str::trim).filter(|c| !c.is_empty());
    if let Some(comment) = comment_text {
        let length = comment.chars().count();
        if length > max_comment_length {
            return Err(ErrorKind::Validation(format!(
                "comment is {} characters long, the limit is {}",
                length, max_comment_length
            )));
        }
    }

    Ok((rating as i16, comment_text.map(str::to_owned)))
}

impl<'a, C: Controller + ?Sized> Engine<'a, C> {
    /// Create the user's review of a movie, or update it in place when one
    /// already exists, then recompute the movie's average.
    pub fn upsert_review(
        &self,
        user_id: UserId,
        movie_id: MovieId,
        rating: i32,
        comment_text: Option<&str>,
    ) -> Result<Review, Error> {
        let (rating, comment_text) =
            validate_review(rating, comment_text, self.settings.max_comment_length)?;

        let review = self.controller.upsert_review(&ReviewDraft {
            user_id,
            movie_id,
            rating,
            comment_text,
        })?;

        log::info!(
            "user({}) rated movie({}) with {} stars",
            user_id,
            movie_id,
            review.rating
        );

        self.recompute(movie_id)?;
        Ok(review)
    }

    /// Delete a review on behalf of its author. Administrators may delete
    /// any review, everyone else gets `PermissionDenied` for reviews they
    /// don't own.
    pub fn delete_review(&self, review_id: ReviewId, requester: Requester) -> Result<(), Error> {
        let review = self.controller.review(review_id)?;

        if !requester.owns(&review) && !requester.is_admin() {
            log::warn!(
                "user({}) tried to delete review({}) owned by user({})",
                requester.user_id,
                review_id,
                review.user_id
            );

            return Err(ErrorKind::PermissionDenied(format!(
                "review({}) belongs to another user",
                review_id
            ))
            .into());
        }

        self.remove_review(&review)
    }

    /// Shared tail of every delete path, the movie is always recomputed
    pub(crate) fn remove_review(&self, review: &Review) -> Result<(), Error> {
        self.controller.delete_review(review.review_id)?;
        log::info!(
            "review({}) of movie({}) deleted",
            review.review_id,
            review.movie_id
        );

        self.recompute_if_exists(review.movie_id)?;
        Ok(())
    }
}
