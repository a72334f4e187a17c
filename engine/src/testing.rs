// Copyright (c) 2020 White Leaf
//
// This software is released under the MIT License.
// https://opensource.org/licenses/MIT

use anyhow::Error;
use controller::{Controller, Movie, NewMovie, NewUser, ReviewDraft, Role, User, UserChanges};
use memory::MemoryController;

pub(crate) fn store() -> MemoryController {
    MemoryController::new()
}

pub(crate) fn user(controller: &MemoryController, name: &str) -> Result<User, Error> {
    let user = controller.insert_user(&NewUser {
        email: format!("{}@example.com", name.to_lowercase()),
        password_hash: "not-a-real-hash".into(),
        display_name: name.into(),
        role: Role::Member,
        token: None,
    })?;

    controller.update_user(
        user.user_id,
        &UserChanges {
            email_confirmed: Some(true),
            ..Default::default()
        },
    )
}

pub(crate) fn movie(
    controller: &MemoryController,
    title: &str,
    release_year: Option<i32>,
) -> Result<Movie, Error> {
    controller.insert_movie(&NewMovie {
        title: title.into(),
        release_year,
        ..Default::default()
    })
}

/// Store a review straight through the controller, bypassing the registry
pub(crate) fn rate(
    controller: &MemoryController,
    user: &User,
    movie: &Movie,
    rating: i16,
) -> Result<(), Error> {
    controller.upsert_review(&ReviewDraft {
        user_id: user.user_id,
        movie_id: movie.movie_id,
        rating,
        comment_text: None,
    })?;

    Ok(())
}

/// One review per rating, each from a fresh user
pub(crate) fn rate_many(
    controller: &MemoryController,
    movie: &Movie,
    ratings: &[i16],
) -> Result<(), Error> {
    for rating in ratings {
        let n = controller.counts()?.users;
        let reviewer = user(controller, &format!("reviewer{}", n))?;
        rate(controller, &reviewer, movie, *rating)?;
    }

    Ok(())
}
