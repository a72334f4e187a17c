// Copyright (c) 2020 White Leaf
//
// This software is released under the MIT License.
// https://opensource.org/licenses/MIT

use crate::schema::movies;
use chrono::NaiveDateTime;
use controller::{Movie, MovieChanges, NewMovie};

// To query data from the database
#[derive(Debug, Clone, Identifiable, Queryable, QueryableByName)]
#[primary_key(movie_id)]
#[table_name = "movies"]
pub struct MovieRow {
    pub movie_id: i32,
    pub title: String,
    pub release_year: Option<i32>,
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

impl From<MovieRow> for Movie {
    fn from(row: MovieRow) -> Self {
        Movie {
            movie_id: row.movie_id,
            title: row.title,
            release_year: row.release_year,
            avg_rating: row.avg_rating,
            poster_url: row.poster_url,
            genres: row.genres,
            runtime: row.runtime,
            tagline: row.tagline,
            overview: row.overview,
            vote_average: row.vote_average,
            tmdb_id: row.tmdb_id,
            created_at: row.created_at,
        }
    }
}

// To insert a new movie into the database, avg_rating starts at its default
#[derive(Debug, Clone, Insertable)]
#[table_name = "movies"]
pub struct NewMovieRow<'a> {
    pub title: &'a str,
    pub release_year: Option<i32>,
    pub poster_url: Option<&'a str>,
    pub genres: Vec<String>,
    pub runtime: Option<i32>,
    pub tagline: Option<&'a str>,
    pub overview: Option<&'a str>,
    pub vote_average: Option<f64>,
    pub tmdb_id: Option<i32>,
}

impl<'a> From<&'a NewMovie> for NewMovieRow<'a> {
    fn from(movie: &'a NewMovie) -> Self {
        NewMovieRow {
            title: &movie.title,
            release_year: movie.release_year,
            poster_url: movie.poster_url.as_deref(),
            genres: movie.genres.clone(),
            runtime: movie.runtime,
            tagline: movie.tagline.as_deref(),
            overview: movie.overview.as_deref(),
            vote_average: movie.vote_average,
            tmdb_id: movie.tmdb_id,
        }
    }
}

#[derive(Debug, Clone, AsChangeset)]
#[table_name = "movies"]
pub struct MovieChangeset {
    pub title: Option<String>,
    pub release_year: Option<Option<i32>>,
    pub poster_url: Option<Option<String>>,
    pub genres: Option<Vec<String>>,
    pub runtime: Option<Option<i32>>,
    pub tagline: Option<Option<String>>,
    pub overview: Option<Option<String>>,
    pub vote_average: Option<Option<f64>>,
}

impl From<&MovieChanges> for MovieChangeset {
    fn from(changes: &MovieChanges) -> Self {
        MovieChangeset {
            title: changes.title.clone(),
            release_year: changes.release_year,
            poster_url: changes.poster_url.clone(),
            genres: changes.genres.clone(),
            runtime: changes.runtime,
            tagline: changes.tagline.clone(),
            overview: changes.overview.clone(),
            vote_average: changes.vote_average,
        }
    }
}
