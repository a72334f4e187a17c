// Copyright (c) 2020 White Leaf
//
// This software is released under the MIT License.
// https://opensource.org/licenses/MIT

use crate::schema::reviews;
use chrono::NaiveDateTime;
use controller::Review;

#[derive(Debug, Clone, Identifiable, Queryable, QueryableByName)]
#[primary_key(review_id)]
#[table_name = "reviews"]
pub struct ReviewRow {
    pub review_id: i32,
    pub user_id: i32,
    pub movie_id: i32,
    pub rating: i16,
    pub comment_text: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl From<ReviewRow> for Review {
    fn from(row: ReviewRow) -> Self {
        Review {
            review_id: row.review_id,
            user_id: row.user_id,
            movie_id: row.movie_id,
            rating: row.rating,
            comment_text: row.comment_text,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Clone, Insertable)]
#[table_name = "reviews"]
pub struct NewReviewRow<'a> {
    pub user_id: i32,
    pub movie_id: i32,
    pub rating: i16,
    pub comment_text: Option<&'a str>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}
