// Copyright (c) 2020 White Leaf
//
// This software is released under the MIT License.
// https://opensource.org/licenses/MIT

use crate::models::Movie;
use crate::Controller;

/// Walks the whole catalog in `movie_id` order, one chunk per step
pub struct LazyMovieChunks<'a, C: ?Sized> {
    pub(crate) curr_offset: usize,
    pub(crate) chunk_size: usize,
    pub(crate) controller: &'a C,
}

impl<'a, C: Controller + ?Sized> LazyMovieChunks<'a, C> {
    pub fn new(controller: &'a C, chunk_size: usize) -> Self {
        Self {
            curr_offset: 0,
            chunk_size,
            controller,
        }
    }
}

impl<'a, C> Iterator for LazyMovieChunks<'a, C>
where
    C: Controller + ?Sized,
{
    type Item = anyhow::Result<Vec<Movie>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.chunk_size == 0 {
            return None;
        }

        let movies = self
            .controller
            .movies_offset_limit(self.curr_offset, self.chunk_size);

        self.curr_offset += self.chunk_size;
        match movies {
            Ok(movies) if movies.is_empty() => None,
            other => Some(other),
        }
    }

    fn nth(&mut self, n: usize) -> Option<Self::Item> {
        self.curr_offset = n * self.chunk_size;
        self.next()
    }
}
