// Copyright (c) 2020 White Leaf
//
// This software is released under the MIT License.
// https://opensource.org/licenses/MIT

use crate::error::ErrorKind;
use crate::models::NewMovie;
use std::collections::HashMap;
use std::fmt::{self, Display};
use std::str::FromStr;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Type {
    Text,
    Int,
    Double,
    /// Comma separated list of tags
    Tags,
}

impl Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Type::Text => "text",
            Type::Int => "integer",
            Type::Double => "decimal",
            Type::Tags => "comma separated",
        };

        f.write_str(name)
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Field<'a> {
    Required(&'a str, Type),
    Optional(&'a str, Type),
}

impl<'a> Field<'a> {
    pub fn is_optional(&self) -> bool {
        matches!(self, Field::Optional(..))
    }

    pub fn into_tuple(self) -> (&'a str, Type) {
        match self {
            Field::Required(name, ty) | Field::Optional(name, ty) => (name, ty),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Text(String),
    Int(i32),
    Double(f64),
    Tags(Vec<String>),
}

impl Value {
    pub fn from_str(value: &str, tp: Type) -> Result<Self, ErrorKind> {
        let value = match tp {
            Type::Text => Self::Text(value.trim().to_owned()),

            Type::Int => {
                let value: i32 = value
                    .trim()
                    .parse()
                    .map_err(|e: <i32 as FromStr>::Err| ErrorKind::ValueConvert(e.to_string()))?;
                Self::Int(value)
            }

            Type::Double => {
                let value: f64 = value
                    .trim()
                    .parse()
                    .map_err(|e: <f64 as FromStr>::Err| ErrorKind::ValueConvert(e.to_string()))?;
                Self::Double(value)
            }

            Type::Tags => Self::Tags(
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|tag| !tag.is_empty())
                    .map(str::to_lowercase)
                    .collect(),
            ),
        };

        Ok(value)
    }

    pub fn as_text(&self) -> Result<&str, ErrorKind> {
        match self {
            Self::Text(s) => Ok(s),
            _ => Err(ErrorKind::CastingValue("text")),
        }
    }

    pub fn as_i32(&self) -> Result<i32, ErrorKind> {
        match self {
            Self::Int(v) => Ok(*v),
            _ => Err(ErrorKind::CastingValue("i32")),
        }
    }

    pub fn as_f64(&self) -> Result<f64, ErrorKind> {
        match self {
            Self::Double(v) => Ok(*v),
            Self::Int(v) => Ok(f64::from(*v)),
            _ => Err(ErrorKind::CastingValue("f64")),
        }
    }

    pub fn as_tags(&self) -> Result<&[String], ErrorKind> {
        match self {
            Self::Tags(tags) => Ok(tags),
            _ => Err(ErrorKind::CastingValue("tags")),
        }
    }
}

/// Fields an operator fills in to add a movie by hand
pub fn fields_for_movies() -> Vec<Field<'static>> {
    vec![
        Field::Required("title", Type::Text),
        Field::Optional("release_year", Type::Int),
        Field::Optional("genres", Type::Tags),
        Field::Optional("poster_url", Type::Text),
        Field::Optional("runtime", Type::Int),
        Field::Optional("tagline", Type::Text),
        Field::Optional("overview", Type::Text),
        Field::Optional("vote_average", Type::Double),
        Field::Optional("tmdb_id", Type::Int),
    ]
}

impl NewMovie {
    pub fn from_prototype(proto: &HashMap<&str, Value>) -> Result<Self, ErrorKind> {
        fn text(proto: &HashMap<&str, Value>, key: &str) -> Result<Option<String>, ErrorKind> {
            proto
                .get(key)
                .map(|v| v.as_text().map(str::to_owned))
                .transpose()
                .map(|v| v.filter(|s| !s.is_empty()))
        }

        fn int(proto: &HashMap<&str, Value>, key: &str) -> Result<Option<i32>, ErrorKind> {
            proto.get(key).map(Value::as_i32).transpose()
        }

        let title = text(proto, "title")?
            .ok_or_else(|| ErrorKind::Validation("title is required".into()))?;

        let genres = match proto.get("genres") {
            Some(value) => value.as_tags()?.to_vec(),
            None => Vec::new(),
        };

        Ok(NewMovie {
            title,
            release_year: int(proto, "release_year")?,
            poster_url: text(proto, "poster_url")?,
            genres,
            runtime: int(proto, "runtime")?,
            tagline: text(proto, "tagline")?,
            overview: text(proto, "overview")?,
            vote_average: proto.get("vote_average").map(Value::as_f64).transpose()?,
            tmdb_id: int(proto, "tmdb_id")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Error;
    use assert_approx_eq::*;

    #[test]
    fn casting_text() -> Result<(), Error> {
        let value = Value::from_str("  Alien ", Type::Text)?;
        assert_eq!(value.as_text()?, "Alien");

        Ok(())
    }

    #[test]
    fn casting_numbers() -> Result<(), Error> {
        let value = Value::from_str("1979", Type::Int)?;
        assert_eq!(value.as_i32()?, 1979);

        let value = Value::from_str("7.9", Type::Double)?;
        assert_approx_eq!(value.as_f64()?, 7.9);

        assert!(Value::from_str("nineteen", Type::Int).is_err());

        Ok(())
    }

    #[test]
    fn casting_tags() -> Result<(), Error> {
        let value = Value::from_str("Horror, sci-fi,, ", Type::Tags)?;
        assert_eq!(value.as_tags()?, &["horror".to_string(), "sci-fi".to_string()]);

        Ok(())
    }

    #[test]
    fn movie_from_prototype() -> Result<(), Error> {
        let mut proto = HashMap::new();
        proto.insert("title", Value::Text("Alien".into()));
        proto.insert("release_year", Value::Int(1979));
        proto.insert("genres", Value::from_str("horror,sci-fi", Type::Tags)?);
        proto.insert("vote_average", Value::Int(8));

        let movie = NewMovie::from_prototype(&proto)?;
        assert_eq!(movie.title, "Alien");
        assert_eq!(movie.release_year, Some(1979));
        assert_eq!(movie.genres.len(), 2);
        assert_eq!(movie.vote_average, Some(8.0));
        assert_eq!(movie.poster_url, None);

        Ok(())
    }

    #[test]
    fn prototype_without_title_is_rejected() {
        let proto = HashMap::new();
        assert!(matches!(
            NewMovie::from_prototype(&proto),
            Err(ErrorKind::Validation(_))
        ));
    }
}
