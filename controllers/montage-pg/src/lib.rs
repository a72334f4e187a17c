// Copyright (c) 2020 White Leaf
//
// This software is released under the MIT License.
// https://opensource.org/licenses/MIT

#[macro_use]
extern crate diesel;
#[macro_use]
extern crate diesel_migrations;

pub mod models;
pub mod schema;

use crate::models::movies::{MovieChangeset, MovieRow, NewMovieRow};
use crate::models::reviews::{NewReviewRow, ReviewRow};
use crate::models::users::{NewUserRow, UserChangeset, UserRow};
use crate::schema::{movies, reviews, users};
use anyhow::Error;
use chrono::{NaiveDateTime, Utc};
use config::Config;
use controller::{
    Controller, Counts, ErrorKind, Movie, MovieChanges, MovieFilter, MovieId, MovieStats,
    NewMovie, NewUser, RatingChange, Review, ReviewDraft, ReviewId, SearchBy, User, UserChanges,
    UserId,
};
use diesel::pg::upsert::on_constraint;
use diesel::pg::PgConnection;
use diesel::result::{DatabaseErrorKind, Error as DieselError, QueryResult};
use diesel::sql_types::{BigInt, Text};
use diesel::{delete, insert_into, prelude::*, sql_query, update};
use std::collections::HashMap;
use std::convert::TryFrom;

embed_migrations!();

pub const REVIEW_UNIQUE_CONSTRAINT: &str = "unique_user_movie_review";

pub fn establish_connection(url: &str) -> Result<PgConnection, Error> {
    PgConnection::establish(url)
        .map_err(|e| ErrorKind::Storage(format!("couldn't connect to database: {}", e)).into())
}

fn classify(err: DieselError) -> Error {
    match &err {
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
            ErrorKind::AlreadyExists(info.message().to_string()).into()
        }
        _ => ErrorKind::Storage(err.to_string()).into(),
    }
}

trait StorageResult<T> {
    fn storage(self) -> Result<T, Error>;
}

impl<T> StorageResult<T> for QueryResult<T> {
    fn storage(self) -> Result<T, Error> {
        self.map_err(classify)
    }
}

/// Pattern matching `text` anywhere, with LIKE wildcards escaped
fn like_pattern(text: &str) -> String {
    let escaped = text
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");

    format!("%{}%", escaped)
}

fn users_from_rows(rows: Vec<UserRow>) -> Result<Vec<User>, Error> {
    rows.into_iter()
        .map(|row| User::try_from(row).map_err(Error::from))
        .collect()
}

pub struct PgController {
    pg_conn: PgConnection,
}

impl PgController {
    pub fn new() -> Result<Self, Error> {
        Self::with_url("postgres://postgres:@localhost/montage")
    }

    pub fn with_url(url: &str) -> Result<Self, Error> {
        let pg_conn = establish_connection(url)?;
        Ok(Self { pg_conn })
    }

    pub fn from_config(config: &Config) -> Result<Self, Error> {
        Self::with_url(&config.database.url)
    }

    /// Bring the schema up to date, safe to call on every start
    pub fn run_migrations(&self) -> Result<(), Error> {
        embedded_migrations::run(&self.pg_conn)
            .map_err(|e| ErrorKind::Storage(format!("migrations failed: {}", e)))?;

        log::info!("Database schema is up to date");
        Ok(())
    }

    pub fn connection(&self) -> &PgConnection {
        &self.pg_conn
    }

    fn movies_filtered(&self, filter: &MovieFilter) -> QueryResult<Vec<MovieRow>> {
        let mut query = movies::table.into_boxed();

        if let Some(genre) = &filter.genre {
            query = query.filter(movies::genres.contains(vec![genre.clone()]));
        }
        if let Some(year) = filter.year {
            query = query.filter(movies::release_year.eq(year));
        }
        if let Some(min_rating) = filter.min_rating {
            query = query.filter(movies::avg_rating.ge(min_rating));
        }

        query.order(movies::movie_id).load::<MovieRow>(&self.pg_conn)
    }

    fn review_counts(&self) -> QueryResult<HashMap<MovieId, usize>> {
        let counts = reviews::table
            .group_by(reviews::movie_id)
            .select((reviews::movie_id, diesel::dsl::sql::<BigInt>("COUNT(review_id)")))
            .load::<(i32, i64)>(&self.pg_conn)?;

        Ok(counts
            .into_iter()
            .map(|(movie_id, n)| (movie_id, n as usize))
            .collect())
    }
}

impl Controller for PgController {
    fn movie(&self, id: MovieId) -> Result<Movie, Error> {
        movies::table
            .find(id)
            .first::<MovieRow>(&self.pg_conn)
            .optional()
            .storage()?
            .map(Movie::from)
            .ok_or_else(|| ErrorKind::not_found("movie", id).into())
    }

    fn movies_by(&self, by: &SearchBy) -> Result<Vec<Movie>, Error> {
        let rows = match by {
            SearchBy::Id(id) => movies::table
                .filter(movies::movie_id.eq(id))
                .load::<MovieRow>(&self.pg_conn),
            SearchBy::Title(title) => movies::table
                .filter(movies::title.eq(title))
                .order(movies::movie_id)
                .load::<MovieRow>(&self.pg_conn),
            SearchBy::TmdbId(id) => movies::table
                .filter(movies::tmdb_id.eq(id))
                .load::<MovieRow>(&self.pg_conn),
        }
        .storage()?;

        if rows.is_empty() {
            Err(ErrorKind::not_found("movie", by).into())
        } else {
            Ok(rows.into_iter().map(Movie::from).collect())
        }
    }

    fn movies_offset_limit(&self, offset: usize, limit: usize) -> Result<Vec<Movie>, Error> {
        let rows = movies::table
            .order(movies::movie_id)
            .offset(offset as i64)
            .limit(limit as i64)
            .load::<MovieRow>(&self.pg_conn)
            .storage()?;

        Ok(rows.into_iter().map(Movie::from).collect())
    }

    fn movie_stats(&self, filter: &MovieFilter) -> Result<Vec<MovieStats>, Error> {
        let (rows, counts) = self
            .pg_conn
            .transaction::<_, DieselError, _>(|| {
                Ok((self.movies_filtered(filter)?, self.review_counts()?))
            })
            .storage()?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let review_count = counts.get(&row.movie_id).copied().unwrap_or(0);
                MovieStats {
                    movie: row.into(),
                    review_count,
                }
            })
            .collect())
    }

    fn search_movies(&self, text: &str, limit: usize) -> Result<Vec<Movie>, Error> {
        let rows = sql_query(
            "SELECT * FROM movies \
             WHERE title ILIKE $1 OR overview ILIKE $1 OR tagline ILIKE $1 \
             ORDER BY avg_rating DESC, movie_id \
             LIMIT $2",
        )
        .bind::<Text, _>(like_pattern(text))
        .bind::<BigInt, _>(limit as i64)
        .load::<MovieRow>(&self.pg_conn)
        .storage()?;

        Ok(rows.into_iter().map(Movie::from).collect())
    }

    fn release_years(&self) -> Result<Vec<i32>, Error> {
        let years = movies::table
            .select(movies::release_year)
            .filter(movies::release_year.is_not_null())
            .distinct()
            .order(movies::release_year.desc())
            .load::<Option<i32>>(&self.pg_conn)
            .storage()?;

        Ok(years.into_iter().flatten().collect())
    }

    fn insert_movie(&self, movie: &NewMovie) -> Result<Movie, Error> {
        let row = insert_into(movies::table)
            .values(&NewMovieRow::from(movie))
            .get_result::<MovieRow>(&self.pg_conn)
            .storage()?;

        Ok(row.into())
    }

    fn update_movie(&self, id: MovieId, changes: &MovieChanges) -> Result<Movie, Error> {
        // Diesel refuses an empty SET clause
        if *changes == MovieChanges::default() {
            return self.movie(id);
        }

        update(movies::table.find(id))
            .set(&MovieChangeset::from(changes))
            .get_result::<MovieRow>(&self.pg_conn)
            .optional()
            .storage()?
            .map(Movie::from)
            .ok_or_else(|| ErrorKind::not_found("movie", id).into())
    }

    fn delete_movie(&self, id: MovieId) -> Result<Movie, Error> {
        delete(movies::table.find(id))
            .get_result::<MovieRow>(&self.pg_conn)
            .optional()
            .storage()?
            .map(Movie::from)
            .ok_or_else(|| ErrorKind::not_found("movie", id).into())
    }

    fn refresh_avg_rating(
        &self,
        id: MovieId,
        average: &dyn Fn(&[i16]) -> f64,
    ) -> Result<RatingChange, Error> {
        // The row lock serializes refreshes of one movie, each sees the
        // ratings committed before it
        self.pg_conn.transaction::<_, Error, _>(|| {
            let previous = movies::table
                .find(id)
                .select(movies::avg_rating)
                .for_update()
                .first::<f64>(&self.pg_conn)
                .optional()
                .storage()?
                .ok_or_else(|| ErrorKind::not_found("movie", id))?;

            let ratings = self.movie_ratings(id)?;
            let current = average(&ratings);

            update(movies::table.find(id))
                .set(movies::avg_rating.eq(current))
                .execute(&self.pg_conn)
                .storage()?;

            Ok(RatingChange {
                previous,
                current,
                reviews: ratings.len(),
            })
        })
    }

    fn review(&self, id: ReviewId) -> Result<Review, Error> {
        reviews::table
            .find(id)
            .first::<ReviewRow>(&self.pg_conn)
            .optional()
            .storage()?
            .map(Review::from)
            .ok_or_else(|| ErrorKind::not_found("review", id).into())
    }

    fn review_for(&self, user_id: UserId, movie_id: MovieId) -> Result<Option<Review>, Error> {
        let row = reviews::table
            .filter(reviews::user_id.eq(user_id))
            .filter(reviews::movie_id.eq(movie_id))
            .first::<ReviewRow>(&self.pg_conn)
            .optional()
            .storage()?;

        Ok(row.map(Review::from))
    }

    fn movie_ratings(&self, movie_id: MovieId) -> Result<Vec<i16>, Error> {
        reviews::table
            .select(reviews::rating)
            .filter(reviews::movie_id.eq(movie_id))
            .load::<i16>(&self.pg_conn)
            .storage()
    }

    fn user_ratings(&self, user_id: UserId) -> Result<Vec<i16>, Error> {
        reviews::table
            .select(reviews::rating)
            .filter(reviews::user_id.eq(user_id))
            .load::<i16>(&self.pg_conn)
            .storage()
    }

    fn movie_reviews(
        &self,
        movie_id: MovieId,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Review>, Error> {
        let rows = reviews::table
            .filter(reviews::movie_id.eq(movie_id))
            .order((reviews::created_at.desc(), reviews::review_id.desc()))
            .offset(offset as i64)
            .limit(limit as i64)
            .load::<ReviewRow>(&self.pg_conn)
            .storage()?;

        Ok(rows.into_iter().map(Review::from).collect())
    }

    fn user_reviews(
        &self,
        user_id: UserId,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Review>, Error> {
        let rows = reviews::table
            .filter(reviews::user_id.eq(user_id))
            .order((reviews::created_at.desc(), reviews::review_id.desc()))
            .offset(offset as i64)
            .limit(limit as i64)
            .load::<ReviewRow>(&self.pg_conn)
            .storage()?;

        Ok(rows.into_iter().map(Review::from).collect())
    }

    fn latest_reviews(&self, limit: usize) -> Result<Vec<Review>, Error> {
        let rows = reviews::table
            .order((reviews::created_at.desc(), reviews::review_id.desc()))
            .limit(limit as i64)
            .load::<ReviewRow>(&self.pg_conn)
            .storage()?;

        Ok(rows.into_iter().map(Review::from).collect())
    }

    fn search_reviews(&self, text: &str, limit: usize) -> Result<Vec<Review>, Error> {
        let rows = sql_query(
            "SELECT * FROM reviews \
             WHERE comment_text ILIKE $1 \
             ORDER BY created_at DESC, review_id DESC \
             LIMIT $2",
        )
        .bind::<Text, _>(like_pattern(text))
        .bind::<BigInt, _>(limit as i64)
        .load::<ReviewRow>(&self.pg_conn)
        .storage()?;

        Ok(rows.into_iter().map(Review::from).collect())
    }

    fn upsert_review(&self, draft: &ReviewDraft) -> Result<Review, Error> {
        let now = Utc::now().naive_utc();
        let row = NewReviewRow {
            user_id: draft.user_id,
            movie_id: draft.movie_id,
            rating: draft.rating,
            comment_text: draft.comment_text.as_deref(),
            created_at: now,
            updated_at: now,
        };

        let result = insert_into(reviews::table)
            .values(&row)
            .on_conflict(on_constraint(REVIEW_UNIQUE_CONSTRAINT))
            .do_update()
            .set((
                reviews::rating.eq(draft.rating),
                reviews::comment_text.eq(draft.comment_text.as_deref()),
                reviews::updated_at.eq(now),
            ))
            .get_result::<ReviewRow>(&self.pg_conn);

        match result {
            Ok(row) => Ok(row.into()),
            Err(DieselError::DatabaseError(DatabaseErrorKind::ForeignKeyViolation, info)) => {
                let missing_movie = info
                    .constraint_name()
                    .map(|name| name.contains("movie"))
                    .unwrap_or(false);

                if missing_movie {
                    Err(ErrorKind::not_found("movie", draft.movie_id).into())
                } else {
                    Err(ErrorKind::not_found("user", draft.user_id).into())
                }
            }
            Err(e) => Err(classify(e)),
        }
    }

    fn update_review(
        &self,
        id: ReviewId,
        rating: i16,
        comment_text: Option<&str>,
    ) -> Result<Review, Error> {
        update(reviews::table.find(id))
            .set((
                reviews::rating.eq(rating),
                reviews::comment_text.eq(comment_text),
                reviews::updated_at.eq(Utc::now().naive_utc()),
            ))
            .get_result::<ReviewRow>(&self.pg_conn)
            .optional()
            .storage()?
            .map(Review::from)
            .ok_or_else(|| ErrorKind::not_found("review", id).into())
    }

    fn delete_review(&self, id: ReviewId) -> Result<Review, Error> {
        delete(reviews::table.find(id))
            .get_result::<ReviewRow>(&self.pg_conn)
            .optional()
            .storage()?
            .map(Review::from)
            .ok_or_else(|| ErrorKind::not_found("review", id).into())
    }

    fn user(&self, id: UserId) -> Result<User, Error> {
        let row = users::table
            .find(id)
            .first::<UserRow>(&self.pg_conn)
            .optional()
            .storage()?
            .ok_or_else(|| ErrorKind::not_found("user", id))?;

        Ok(User::try_from(row)?)
    }

    fn user_by_email(&self, email: &str) -> Result<Option<User>, Error> {
        let row = users::table
            .filter(users::email.eq(email))
            .first::<UserRow>(&self.pg_conn)
            .optional()
            .storage()?;

        Ok(row.map(User::try_from).transpose()?)
    }

    fn user_by_token(&self, value: &str) -> Result<Option<User>, Error> {
        let row = users::table
            .filter(users::token_value.eq(value))
            .first::<UserRow>(&self.pg_conn)
            .optional()
            .storage()?;

        Ok(row.map(User::try_from).transpose()?)
    }

    fn search_users(&self, text: &str, limit: usize) -> Result<Vec<User>, Error> {
        let rows = sql_query(
            "SELECT * FROM users \
             WHERE email_confirmed AND display_name ILIKE $1 \
             ORDER BY user_id \
             LIMIT $2",
        )
        .bind::<Text, _>(like_pattern(text))
        .bind::<BigInt, _>(limit as i64)
        .load::<UserRow>(&self.pg_conn)
        .storage()?;

        users_from_rows(rows)
    }

    fn users_with_tokens_before(&self, cutoff: NaiveDateTime) -> Result<Vec<User>, Error> {
        let rows = users::table
            .filter(users::token_issued_at.lt(cutoff))
            .order(users::user_id)
            .load::<UserRow>(&self.pg_conn)
            .storage()?;

        users_from_rows(rows)
    }

    fn insert_user(&self, user: &NewUser) -> Result<User, Error> {
        let row = insert_into(users::table)
            .values(&NewUserRow::from(user))
            .get_result::<UserRow>(&self.pg_conn)
            .storage()?;

        Ok(User::try_from(row)?)
    }

    fn update_user(&self, id: UserId, changes: &UserChanges) -> Result<User, Error> {
        if *changes == UserChanges::default() {
            return self.user(id);
        }

        let row = update(users::table.find(id))
            .set(&UserChangeset::from(changes))
            .get_result::<UserRow>(&self.pg_conn)
            .optional()
            .storage()?
            .ok_or_else(|| ErrorKind::not_found("user", id))?;

        Ok(User::try_from(row)?)
    }

    fn delete_user(&self, id: UserId) -> Result<Vec<MovieId>, Error> {
        self.pg_conn
            .transaction::<_, Error, _>(|| {
                let touched = reviews::table
                    .select(reviews::movie_id)
                    .filter(reviews::user_id.eq(id))
                    .distinct()
                    .order(reviews::movie_id)
                    .load::<i32>(&self.pg_conn)
                    .storage()?;

                let deleted = delete(users::table.find(id))
                    .execute(&self.pg_conn)
                    .storage()?;

                if deleted == 0 {
                    return Err(ErrorKind::not_found("user", id).into());
                }

                log::debug!("Removed user({}) and reviews on {} movies", id, touched.len());
                Ok(touched)
            })
    }

    fn counts(&self) -> Result<Counts, Error> {
        let users = users::table.count().get_result::<i64>(&self.pg_conn).storage()?;
        let movies = movies::table.count().get_result::<i64>(&self.pg_conn).storage()?;
        let reviews = reviews::table.count().get_result::<i64>(&self.pg_conn).storage()?;

        Ok(Counts {
            users: users as usize,
            movies: movies as usize,
            reviews: reviews as usize,
        })
    }
}
