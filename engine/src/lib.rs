// Copyright (c) 2020 White Leaf
//
// This software is released under the MIT License.
// https://opensource.org/licenses/MIT

pub mod accounts;
pub mod admin;
pub mod aggregate;
pub mod catalog;
pub mod maintenance;
pub mod page;
pub mod ranking;
pub mod registry;

#[cfg(test)]
pub(crate) mod testing;

use chrono::Duration;
use config::Config;
use controller::Controller;

pub use aggregate::rounded_mean;
pub use maintenance::SweepReport;
pub use page::Page;
pub use ranking::{BrowseQuery, SortMode};

/// Limits the engine enforces, taken from the application configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub max_comment_length: usize,
    pub min_password_length: usize,
    pub token_validity: Duration,
    pub movies_per_page: usize,
    pub reviews_per_page: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for Settings {
    fn from(config: &Config) -> Self {
        Self {
            max_comment_length: config.reviews.max_comment_length,
            min_password_length: config.accounts.min_password_length,
            token_validity: Duration::minutes(config.accounts.token_expiry_minutes),
            movies_per_page: config.catalog.movies_per_page,
            reviews_per_page: config.catalog.reviews_per_page,
        }
    }
}

/// Entry point to the business rules, every operation reads fresh data
/// through the controller, nothing is cached between calls.
pub struct Engine<'a, C: Controller + ?Sized> {
    controller: &'a C,
    settings: Settings,
}

impl<'a, C: Controller + ?Sized> Engine<'a, C> {
    pub fn with_controller(controller: &'a C) -> Self {
        Self {
            controller,
            settings: Settings::default(),
        }
    }

    pub fn with_config(controller: &'a C, config: &Config) -> Self {
        Self {
            controller,
            settings: Settings::from(config),
        }
    }

    pub fn controller(&self) -> &'a C {
        self.controller
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }
}
