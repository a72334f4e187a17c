// Copyright (c) 2020 White Leaf
//
// This software is released under the MIT License.
// https://opensource.org/licenses/MIT

use crate::models::{Movie, MovieStats, Review, User};
use common_macros::hash_map;
use prettytable::{cell, format::consts::FORMAT_NO_LINESEP, row, table, Table};
use std::collections::BTreeMap;
use std::collections::HashMap;

pub trait Entity {
    type Id;

    fn get_id(&self) -> Self::Id;
    fn get_data(&self) -> HashMap<String, String> {
        Default::default()
    }
}

pub trait ToTable {
    fn to_table(&self) -> Table;
}

fn opt<T: ToString>(value: &Option<T>) -> String {
    value
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_else(|| "-".into())
}

impl Entity for Movie {
    type Id = i32;

    fn get_id(&self) -> Self::Id {
        self.movie_id
    }

    fn get_data(&self) -> HashMap<String, String> {
        hash_map! {
            "title".into() => self.title.clone(),
            "release_year".into() => opt(&self.release_year),
            "avg_rating".into() => format!("{:.2}", self.avg_rating),
            "vote_average".into() => opt(&self.vote_average),
            "genres".into() => self.genres.join(", "),
            "poster_url".into() => opt(&self.poster_url),
            "tmdb_id".into() => opt(&self.tmdb_id),
        }
    }
}

impl Entity for Review {
    type Id = i32;

    fn get_id(&self) -> Self::Id {
        self.review_id
    }

    fn get_data(&self) -> HashMap<String, String> {
        hash_map! {
            "user_id".into() => self.user_id.to_string(),
            "movie_id".into() => self.movie_id.to_string(),
            "rating".into() => self.rating.to_string(),
            "comment".into() => opt(&self.comment_text),
            "updated_at".into() => self.updated_at.to_string(),
        }
    }
}

impl Entity for User {
    type Id = i32;

    fn get_id(&self) -> Self::Id {
        self.user_id
    }

    fn get_data(&self) -> HashMap<String, String> {
        hash_map! {
            "email".into() => self.email.clone(),
            "display_name".into() => self.display_name.clone(),
            "email_confirmed".into() => self.email_confirmed.to_string(),
            "role".into() => self.role.to_string(),
        }
    }
}

impl<I: ToString, E: Entity<Id = I>> ToTable for E {
    fn to_table(&self) -> Table {
        let mut table = table![["id", self.get_id()]];

        // Sorted so the same entity always prints the same way
        let data: BTreeMap<_, _> = self.get_data().into_iter().collect();
        for (key, val) in data {
            table.add_row(row![key, val]);
        }

        table.set_format(*FORMAT_NO_LINESEP);
        table
    }
}

impl ToTable for [MovieStats] {
    fn to_table(&self) -> Table {
        let mut table = table![["#", "id", "title", "year", "avg", "reviews"]];

        for (pos, stats) in self.iter().enumerate() {
            let movie = &stats.movie;
            table.add_row(row![
                pos + 1,
                movie.movie_id,
                movie.title,
                opt(&movie.release_year),
                format!("{:.2}", movie.avg_rating),
                stats.review_count
            ]);
        }

        table.set_format(*FORMAT_NO_LINESEP);
        table
    }
}

impl<K, V, B> ToTable for HashMap<K, V, B>
where
    K: ToString,
    V: ToString,
{
    fn to_table(&self) -> Table {
        let mut table = Table::new();

        for (key, val) in self {
            table.add_row(row![key, val]);
        }

        table.set_format(*FORMAT_NO_LINESEP);
        table
    }
}
