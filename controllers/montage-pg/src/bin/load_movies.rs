// Copyright (c) 2020 White Leaf
//
// This software is released under the MIT License.
// https://opensource.org/licenses/MIT

//! Imports a catalog export with the columns
//! `title,release_year,genres,runtime,vote_average,tmdb_id,poster_url,tagline,overview`,
//! where `genres` is a `|` separated list. Movies already present by `tmdb_id`
//! are skipped.

use anyhow::Error;
use config::Config;
use controller::{Controller, ErrorKind, NewMovie, SearchBy};
use engine::admin::validate_movie;
use indicatif::ProgressIterator;
use montage_pg::PgController;
use std::env;
use std::str::FromStr;

fn optional<T: FromStr>(field: &str) -> Result<Option<T>, Error>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let field = field.trim();
    if field.is_empty() || field == "\\N" {
        Ok(None)
    } else {
        Ok(Some(field.parse()?))
    }
}

fn text(field: &str) -> Option<String> {
    let field = field.trim();
    if field.is_empty() {
        None
    } else {
        Some(field.to_owned())
    }
}

fn parse_record(record: &csv::StringRecord) -> Result<NewMovie, Error> {
    let field = |n: usize| record.get(n).unwrap_or("");

    Ok(NewMovie {
        title: field(0).trim().to_owned(),
        release_year: optional(field(1))?,
        genres: field(2)
            .split('|')
            .map(str::trim)
            .filter(|g| !g.is_empty())
            .map(str::to_owned)
            .collect(),
        runtime: optional(field(3))?,
        vote_average: optional(field(4))?,
        tmdb_id: optional(field(5))?,
        poster_url: text(field(6)),
        tagline: text(field(7)),
        overview: text(field(8)),
    })
}

fn already_loaded(controller: &PgController, movie: &NewMovie) -> Result<bool, Error> {
    let tmdb_id = match movie.tmdb_id {
        Some(id) => id,
        None => return Ok(false),
    };

    match controller.movies_by(&SearchBy::tmdb_id(tmdb_id)) {
        Ok(_) => Ok(true),
        Err(e) if ErrorKind::is_not_found(&e) => Ok(false),
        Err(e) => Err(e),
    }
}

fn main() -> Result<(), Error> {
    let path = env::args()
        .nth(1)
        .unwrap_or_else(|| "data/movies.csv".to_owned());

    let config = Config::load_or_default(config::DEFAULT_CONFIG_PATH)?;
    let controller = PgController::from_config(&config)?;
    controller.run_migrations()?;

    let mut csv = csv::ReaderBuilder::new()
        .has_headers(true)
        .delimiter(b',')
        .from_path(&path)?;

    println!("Collecting records from {}...", path);
    let records: Vec<_> = csv.records().collect();

    let (mut inserted, mut skipped, mut invalid) = (0, 0, 0);
    for record in records.iter().progress() {
        let movie = match record.as_ref().map_err(|e| Error::msg(e.to_string())).and_then(parse_record) {
            Ok(movie) => movie,
            Err(_) => {
                invalid += 1;
                continue;
            }
        };

        if validate_movie(&movie).is_err() {
            invalid += 1;
            continue;
        }

        if already_loaded(&controller, &movie)? {
            skipped += 1;
            continue;
        }

        controller.insert_movie(&movie)?;
        inserted += 1;
    }

    println!(
        "{} movies inserted, {} already present, {} invalid rows",
        inserted, skipped, invalid
    );

    Ok(())
}
