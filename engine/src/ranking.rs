// Copyright (c) 2020 White Leaf
//
// This software is released under the MIT License.
// https://opensource.org/licenses/MIT

use crate::{Engine, Page};
use anyhow::Error;
use controller::{Controller, MovieFilter, MovieStats};
use std::cmp::Ordering;
use std::fmt::{self, Display};

/// Reviews a movie needs before it may show up in the hero carousel
pub const HERO_MIN_REVIEWS: usize = 3;

/// Ordering of the catalog browse view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortMode {
    Popular,
    Rating,
    Recent,
    Title,
}

impl Default for SortMode {
    fn default() -> Self {
        SortMode::Popular
    }
}

impl SortMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortMode::Popular => "popular",
            SortMode::Rating => "rating",
            SortMode::Recent => "recent",
            SortMode::Title => "title",
        }
    }

    /// Unknown modes fall back to `Popular`, like an unknown query parameter
    pub fn parse(mode: &str) -> Self {
        match mode.trim().to_lowercase().as_str() {
            "rating" => SortMode::Rating,
            "recent" => SortMode::Recent,
            "title" => SortMode::Title,
            _ => SortMode::Popular,
        }
    }

    pub fn comparator(&self) -> fn(&MovieStats, &MovieStats) -> Ordering {
        match self {
            SortMode::Popular => by_popularity,
            SortMode::Rating => by_rating_score,
            SortMode::Recent => by_release,
            SortMode::Title => by_title,
        }
    }
}

impl Display for SortMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BrowseQuery {
    pub sort: SortMode,
    pub filter: MovieFilter,
    /// 1-based
    pub page: usize,
    pub per_page: usize,
}

impl BrowseQuery {
    pub fn new(sort: SortMode, page: usize, per_page: usize) -> Self {
        Self {
            sort,
            filter: MovieFilter::default(),
            page,
            per_page,
        }
    }

    pub fn with_filter(mut self, filter: MovieFilter) -> Self {
        self.filter = filter;
        self
    }
}

fn desc<T: PartialOrd>(a: T, b: T) -> Ordering {
    b.partial_cmp(&a).unwrap_or(Ordering::Equal)
}

/// Descending, absent values last
fn desc_opt<T: PartialOrd>(a: Option<T>, b: Option<T>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => desc(a, b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn by_id(a: &MovieStats, b: &MovieStats) -> Ordering {
    a.movie.movie_id.cmp(&b.movie.movie_id)
}

/// The own average, or the external rating while the movie has no reviews
pub fn rating_score(stats: &MovieStats) -> Option<f64> {
    if stats.movie.avg_rating != 0.0 {
        Some(stats.movie.avg_rating)
    } else {
        stats.movie.vote_average
    }
}

/// review count, release year, creation
pub fn by_review_count(a: &MovieStats, b: &MovieStats) -> Ordering {
    desc(a.review_count, b.review_count)
        .then_with(|| desc_opt(a.movie.release_year, b.movie.release_year))
        .then_with(|| desc(a.movie.created_at, b.movie.created_at))
        .then_with(|| by_id(a, b))
}

/// average, review count, release year
pub fn by_avg_rating(a: &MovieStats, b: &MovieStats) -> Ordering {
    desc(a.movie.avg_rating, b.movie.avg_rating)
        .then_with(|| desc(a.review_count, b.review_count))
        .then_with(|| desc_opt(a.movie.release_year, b.movie.release_year))
        .then_with(|| by_id(a, b))
}

/// release year, creation
pub fn by_release(a: &MovieStats, b: &MovieStats) -> Ordering {
    desc_opt(a.movie.release_year, b.movie.release_year)
        .then_with(|| desc(a.movie.created_at, b.movie.created_at))
        .then_with(|| by_id(a, b))
}

/// review count, average, release year
pub fn by_hero(a: &MovieStats, b: &MovieStats) -> Ordering {
    desc(a.review_count, b.review_count)
        .then_with(|| desc(a.movie.avg_rating, b.movie.avg_rating))
        .then_with(|| desc_opt(a.movie.release_year, b.movie.release_year))
        .then_with(|| by_id(a, b))
}

/// review count, external rating, release year, creation
pub fn by_popularity(a: &MovieStats, b: &MovieStats) -> Ordering {
    desc(a.review_count, b.review_count)
        .then_with(|| desc_opt(a.movie.vote_average, b.movie.vote_average))
        .then_with(|| desc_opt(a.movie.release_year, b.movie.release_year))
        .then_with(|| desc(a.movie.created_at, b.movie.created_at))
        .then_with(|| by_id(a, b))
}

/// rating score, review count, release year
pub fn by_rating_score(a: &MovieStats, b: &MovieStats) -> Ordering {
    desc_opt(rating_score(a), rating_score(b))
        .then_with(|| desc(a.review_count, b.review_count))
        .then_with(|| desc_opt(a.movie.release_year, b.movie.release_year))
        .then_with(|| by_id(a, b))
}

pub fn by_title(a: &MovieStats, b: &MovieStats) -> Ordering {
    a.movie
        .title
        .cmp(&b.movie.title)
        .then_with(|| by_id(a, b))
}

/// Keep the rows passing `keep`, sort them and cut the list at `limit`
pub fn rank<K, O>(stats: Vec<MovieStats>, keep: K, order: O, limit: usize) -> Vec<MovieStats>
where
    K: Fn(&MovieStats) -> bool,
    O: Fn(&MovieStats, &MovieStats) -> Ordering,
{
    let mut ranked: Vec<MovieStats> = stats.into_iter().filter(|s| keep(s)).collect();
    ranked.sort_by(|a, b| order(a, b));
    ranked.truncate(limit);
    ranked
}

impl<'a, C: Controller + ?Sized> Engine<'a, C> {
    fn all_stats(&self) -> Result<Vec<MovieStats>, Error> {
        self.controller.movie_stats(&MovieFilter::default())
    }

    /// Most reviewed movies. Movies nobody reviewed are left out.
    pub fn top_by_review_count(&self, limit: usize) -> Result<Vec<MovieStats>, Error> {
        Ok(rank(
            self.all_stats()?,
            |s| s.review_count > 0,
            by_review_count,
            limit,
        ))
    }

    /// Best rated movies among those with at least `min_reviews` reviews
    /// (and never fewer than one).
    pub fn top_by_rating(
        &self,
        limit: usize,
        min_reviews: usize,
    ) -> Result<Vec<MovieStats>, Error> {
        let min_reviews = min_reviews.max(1);

        Ok(rank(
            self.all_stats()?,
            |s| s.review_count >= min_reviews,
            by_avg_rating,
            limit,
        ))
    }

    /// Newest releases, movies without a release year are left out
    pub fn recent(&self, limit: usize) -> Result<Vec<MovieStats>, Error> {
        Ok(rank(
            self.all_stats()?,
            |s| s.movie.release_year.is_some(),
            by_release,
            limit,
        ))
    }

    pub fn hero_carousel(&self, limit: usize) -> Result<Vec<MovieStats>, Error> {
        Ok(rank(
            self.all_stats()?,
            |s| s.movie.has_poster() && s.review_count >= HERO_MIN_REVIEWS,
            by_hero,
            limit,
        ))
    }

    /// Catalog listing, filtered, ordered by the chosen mode and paginated
    pub fn browse(&self, query: &BrowseQuery) -> Result<Page<MovieStats>, Error> {
        let mut stats = self.controller.movie_stats(&query.filter)?;
        stats.sort_by(query.sort.comparator());

        log::debug!(
            "browse sort={} page={} matched {} movies",
            query.sort,
            query.page,
            stats.len()
        );

        Ok(Page::slice(stats, query.page, query.per_page))
    }
}
