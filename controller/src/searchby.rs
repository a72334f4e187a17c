// Copyright (c) 2020 White Leaf
//
// This software is released under the MIT License.
// https://opensource.org/licenses/MIT

use std::fmt::{self, Display};

/// Ways to look a movie up in the catalog
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum SearchBy {
    Id(i32),
    Title(String),
    TmdbId(i32),
}

impl SearchBy {
    pub fn id(id: i32) -> Self {
        Self::Id(id)
    }

    pub fn title(title: &str) -> Self {
        Self::Title(title.into())
    }

    pub fn tmdb_id(id: i32) -> Self {
        Self::TmdbId(id)
    }
}

impl Display for SearchBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchBy::Id(id) => write!(f, "id({})", id),
            SearchBy::Title(title) => write!(f, "title({})", title),
            SearchBy::TmdbId(id) => write!(f, "tmdb_id({})", id),
        }
    }
}
