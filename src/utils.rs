// Copyright (c) 2020 White Leaf
//
// This software is released under the MIT License.
// https://opensource.org/licenses/MIT

use anyhow::Error;
use controller::{values::fields_for_movies, Field, NewMovie, Value};
use rustyline::Editor;
use std::collections::HashMap;

macro_rules! field {
    ($ed:ident, $name:expr, $opt:expr, $ty:expr) => {{
        use rustyline::error::ReadlineError;

        let kind = if $opt { "optional" } else { "required" };
        let msg = format!("{}{} ({}, {}): ", $crate::PROMPT, $name, kind, $ty);

        match $ed.readline(&msg) {
            Ok(line) => Ok(Some(line)),

            // CTRL-D
            Err(ReadlineError::Eof) => Ok(None),

            Err(e) => Err(e),
        }
    }};
}

/// Ask for every field in turn, returns `None` if the operator cancels with
/// CTRL-C.
pub(crate) fn read_prototype<'a>(
    rl: &mut Editor<()>,
    fields: Vec<Field<'a>>,
) -> Result<Option<HashMap<&'a str, Value>>, Error> {
    use rustyline::error::ReadlineError;

    println!("Press CTRL-D to leave a field empty, CTRL-C to cancel");
    let mut prototype = HashMap::new();

    for field in fields {
        let is_optional = field.is_optional();
        let (name, ty) = field.into_tuple();

        loop {
            let input: Option<String> = match field!(rl, name, is_optional, ty) {
                Ok(input) => input,
                Err(ReadlineError::Interrupted) => return Ok(None),
                Err(e) => return Err(e.into()),
            };

            match input {
                Some(input) if input.trim().is_empty() && is_optional => break,

                Some(input) => match Value::from_str(&input, ty) {
                    Ok(value) => {
                        prototype.insert(name, value);
                        break;
                    }

                    Err(e) => log::error!("Invalid value for '{}': {}", name, e),
                },

                None if is_optional => break,

                None => log::error!("Field '{}' is required, cannot be empty!", name),
            }
        }
    }

    Ok(Some(prototype))
}

pub(crate) fn read_new_movie(rl: &mut Editor<()>) -> Result<Option<NewMovie>, Error> {
    match read_prototype(rl, fields_for_movies())? {
        Some(prototype) => Ok(Some(NewMovie::from_prototype(&prototype)?)),
        None => Ok(None),
    }
}
