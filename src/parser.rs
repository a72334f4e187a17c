// Copyright (c) 2020 White Leaf
//
// This software is released under the MIT License.
// https://opensource.org/licenses/MIT

mod basics;

use basics::{parse_count, parse_decimal, parse_id, parse_ident, parse_separator, parse_string};
use controller::{MovieFilter, MovieId, ReviewId, SearchBy, UserId};
use engine::SortMode;
use nom::branch::alt;
use nom::bytes::complete::tag;
use nom::character::complete::char;
use nom::combinator::{map, opt};
use nom::multi::fold_many0;
use nom::sequence::{delimited, preceded, tuple};
use nom::IResult;

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Popular(usize),
    TopRated(usize, Option<usize>),
    Recent(usize),
    Hero(usize),
    Browse(SortMode, usize, MovieFilter),
    Movie(SearchBy),
    Reviews(MovieId, usize),
    Profile(UserId, usize),
    Latest(usize),
    Search(String),
    Review {
        user_id: UserId,
        movie_id: MovieId,
        rating: i32,
        comment: Option<String>,
    },
    /// Delete a review acting as the given user, as the operator otherwise
    Unreview(ReviewId, Option<UserId>),
    Register {
        email: String,
        password: String,
        display_name: String,
    },
    Confirm(String),
    AddMovie,
    DeleteMovie(MovieId),
    Recompute(MovieId),
    Sweep,
    Cleanup,
    Dashboard,
}

#[derive(Debug, Clone, PartialEq)]
enum FilterArg {
    Genre(String),
    Year(i32),
    MinRating(f64),
}

impl FilterArg {
    fn apply(mut filter: MovieFilter, arg: FilterArg) -> MovieFilter {
        match arg {
            FilterArg::Genre(genre) => filter.genre = Some(genre),
            FilterArg::Year(year) => filter.year = Some(year),
            FilterArg::MinRating(min) => filter.min_rating = Some(min),
        }

        filter
    }
}

fn call<'a, O, F>(inner: F) -> impl Fn(&'a str) -> IResult<&'a str, O>
where
    F: Fn(&'a str) -> IResult<&'a str, O>,
{
    delimited(char('('), inner, char(')'))
}

fn next<'a, O, F>(inner: F) -> impl Fn(&'a str) -> IResult<&'a str, O>
where
    F: Fn(&'a str) -> IResult<&'a str, O>,
{
    preceded(parse_separator, inner)
}

fn parse_search_by(input: &str) -> IResult<&str, SearchBy> {
    alt((
        map(preceded(tag("id"), call(parse_id)), SearchBy::id),
        map(preceded(tag("tmdb"), call(parse_id)), SearchBy::tmdb_id),
        map(preceded(tag("title"), call(parse_string)), SearchBy::title),
    ))(input)
}

fn parse_filter(input: &str) -> IResult<&str, FilterArg> {
    alt((
        map(preceded(tag("genre"), call(parse_ident)), |genre: &str| {
            FilterArg::Genre(genre.to_lowercase())
        }),
        map(preceded(tag("year"), call(parse_id)), FilterArg::Year),
        map(preceded(tag("min"), call(parse_decimal)), FilterArg::MinRating),
    ))(input)
}

fn parse_page(input: &str) -> IResult<&str, (i32, usize)> {
    map(
        call(tuple((parse_id, opt(next(parse_count))))),
        |(id, page): (i32, Option<usize>)| (id, page.unwrap_or(1)),
    )(input)
}

/// Statements without arguments accept an optional `()`
fn bare<'a>(statement: Statement) -> impl Fn(&'a str) -> IResult<&'a str, Statement> {
    map(opt(tag("()")), move |_: Option<&str>| statement.clone())
}

fn parse_statement(input: &str) -> IResult<&str, Statement> {
    let (input, name) = parse_ident(input)?;

    match name {
        "popular" => map(call(parse_count), Statement::Popular)(input),

        "top" => map(
            call(tuple((parse_count, opt(next(parse_count))))),
            |(limit, min): (usize, Option<usize>)| Statement::TopRated(limit, min),
        )(input),

        "recent" => map(call(parse_count), Statement::Recent)(input),

        "hero" => map(call(parse_count), Statement::Hero)(input),

        "latest" => map(call(parse_count), Statement::Latest)(input),

        "browse" => map(
            call(tuple((
                parse_ident,
                next(parse_count),
                fold_many0(next(parse_filter), MovieFilter::default(), FilterArg::apply),
            ))),
            |(mode, page, filter): (&str, usize, MovieFilter)| {
                Statement::Browse(SortMode::parse(mode), page, filter)
            },
        )(input),

        "movie" => map(call(parse_search_by), Statement::Movie)(input),

        "reviews" => map(parse_page, |(id, page)| Statement::Reviews(id, page))(input),

        "profile" => map(parse_page, |(id, page)| Statement::Profile(id, page))(input),

        "search" => map(call(parse_string), |text: &str| Statement::Search(text.into()))(input),

        "review" => map(
            call(tuple((
                parse_id,
                next(parse_id),
                next(parse_id),
                opt(next(parse_string)),
            ))),
            |(user_id, movie_id, rating, comment): (i32, i32, i32, Option<&str>)| {
                Statement::Review {
                    user_id,
                    movie_id,
                    rating,
                    comment: comment.map(Into::into),
                }
            },
        )(input),

        "unreview" => map(
            call(tuple((parse_id, opt(next(parse_id))))),
            |(review_id, user_id): (i32, Option<i32>)| Statement::Unreview(review_id, user_id),
        )(input),

        "register" => map(
            call(tuple((parse_string, next(parse_string), next(parse_string)))),
            |(email, password, display_name): (&str, &str, &str)| Statement::Register {
                email: email.into(),
                password: password.into(),
                display_name: display_name.into(),
            },
        )(input),

        "confirm" => map(call(parse_string), |token: &str| Statement::Confirm(token.into()))(input),

        "add_movie" => bare(Statement::AddMovie)(input),

        "delete_movie" => map(call(parse_id), Statement::DeleteMovie)(input),

        "recompute" => map(call(parse_id), Statement::Recompute)(input),

        "sweep" => bare(Statement::Sweep)(input),

        "cleanup" => bare(Statement::Cleanup)(input),

        "dashboard" => bare(Statement::Dashboard)(input),

        _ => Err(nom::Err::Error((input, nom::error::ErrorKind::Tag))),
    }
}

pub fn parse_line(input: &str) -> Option<Statement> {
    let input = input.trim();
    let (rest, statement) = parse_statement(input).ok()?;

    if rest.is_empty() {
        Some(statement)
    } else {
        None
    }
}
