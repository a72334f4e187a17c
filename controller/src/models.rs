// Copyright (c) 2020 White Leaf
//
// This software is released under the MIT License.
// https://opensource.org/licenses/MIT

use crate::error::ErrorKind;
use chrono::{Duration, NaiveDateTime};
use std::fmt::{self, Display};
use std::str::FromStr;

pub type MovieId = i32;
pub type UserId = i32;
pub type ReviewId = i32;

#[derive(Debug, Clone, PartialEq)]
pub struct Movie {
    pub movie_id: MovieId,
    pub title: String,
    pub release_year: Option<i32>,
    /// Only ever written by the rating aggregator
    pub avg_rating: f64,
    pub poster_url: Option<String>,
    pub genres: Vec<String>,
    pub runtime: Option<i32>,
    pub tagline: Option<String>,
    pub overview: Option<String>,
    pub vote_average: Option<f64>,
    pub tmdb_id: Option<i32>,
    pub created_at: NaiveDateTime,
}

impl Movie {
    pub fn has_poster(&self) -> bool {
        self.poster_url
            .as_deref()
            .map(|url| !url.is_empty())
            .unwrap_or(false)
    }

    pub fn has_genre(&self, genre: &str) -> bool {
        self.genres.iter().any(|g| g == genre)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewMovie {
    pub title: String,
    pub release_year: Option<i32>,
    pub poster_url: Option<String>,
    pub genres: Vec<String>,
    pub runtime: Option<i32>,
    pub tagline: Option<String>,
    pub overview: Option<String>,
    pub vote_average: Option<f64>,
    pub tmdb_id: Option<i32>,
}

/// Editable movie attributes, `avg_rating` is deliberately absent
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MovieChanges {
    pub title: Option<String>,
    pub release_year: Option<Option<i32>>,
    pub poster_url: Option<Option<String>>,
    pub genres: Option<Vec<String>>,
    pub runtime: Option<Option<i32>>,
    pub tagline: Option<Option<String>>,
    pub overview: Option<Option<String>>,
    pub vote_average: Option<Option<f64>>,
}

/// A movie together with the number of reviews currently attached to it
#[derive(Debug, Clone, PartialEq)]
pub struct MovieStats {
    pub movie: Movie,
    pub review_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MovieFilter {
    pub genre: Option<String>,
    pub year: Option<i32>,
    pub min_rating: Option<f64>,
}

impl MovieFilter {
    pub fn matches(&self, movie: &Movie) -> bool {
        if let Some(genre) = &self.genre {
            if !movie.has_genre(genre) {
                return false;
            }
        }

        if let Some(year) = self.year {
            if movie.release_year != Some(year) {
                return false;
            }
        }

        match self.min_rating {
            Some(min) => movie.avg_rating >= min,
            None => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Review {
    pub review_id: ReviewId,
    pub user_id: UserId,
    pub movie_id: MovieId,
    pub rating: i16,
    pub comment_text: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Already validated input for the storage level upsert
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewDraft {
    pub user_id: UserId,
    pub movie_id: MovieId,
    pub rating: i16,
    pub comment_text: Option<String>,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Role {
    Member,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Member => "member",
            Role::Admin => "admin",
        }
    }
}

impl FromStr for Role {
    type Err = ErrorKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "member" => Ok(Role::Member),
            "admin" => Ok(Role::Admin),
            other => Err(ErrorKind::ValueConvert(format!("unknown role {}", other))),
        }
    }
}

impl Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who is asking for a mutation, passed explicitly into every guarded operation
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Requester {
    pub user_id: UserId,
    pub role: Role,
}

impl Requester {
    pub fn member(user_id: UserId) -> Self {
        Self {
            user_id,
            role: Role::Member,
        }
    }

    pub fn admin(user_id: UserId) -> Self {
        Self {
            user_id,
            role: Role::Admin,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn owns(&self, review: &Review) -> bool {
        self.user_id == review.user_id
    }
}

impl From<&User> for Requester {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.user_id,
            role: user.role,
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum TokenKind {
    Confirmation,
    Reset,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Confirmation => "confirmation",
            TokenKind::Reset => "reset",
        }
    }
}

impl FromStr for TokenKind {
    type Err = ErrorKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "confirmation" => Ok(TokenKind::Confirmation),
            "reset" => Ok(TokenKind::Reset),
            other => Err(ErrorKind::ValueConvert(format!("unknown token kind {}", other))),
        }
    }
}

/// Single use token, a user holds at most one at a time
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub value: String,
    pub issued_at: NaiveDateTime,
}

impl Token {
    pub fn is_expired(&self, now: NaiveDateTime, validity: Duration) -> bool {
        self.issued_at + validity < now
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub user_id: UserId,
    pub email: String,
    pub password_hash: String,
    pub display_name: String,
    pub created_at: NaiveDateTime,
    pub is_active: bool,
    pub email_confirmed: bool,
    pub role: Role,
    pub token: Option<Token>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub display_name: String,
    pub role: Role,
    pub token: Option<Token>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserChanges {
    pub display_name: Option<String>,
    pub password_hash: Option<String>,
    pub email_confirmed: Option<bool>,
    pub is_active: Option<bool>,
    pub role: Option<Role>,
    pub token: Option<Option<Token>>,
}

/// Outcome of refreshing a movie's stored average
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct RatingChange {
    pub previous: f64,
    pub current: f64,
    pub reviews: usize,
}

#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct Counts {
    pub users: usize,
    pub movies: usize,
    pub reviews: usize,
}
