/*
    spotfm-rs | Rust CLI tool to mirror a Spotify library and find duplicate tracks.
    Copyright (C) 2025  Israel Alberto Roldan Vega

    This program is free software: you can redistribute it and/or modify
    it under the terms of the GNU Affero General Public License as published
    by the Free Software Foundation, either version 3 of the License, or
    (at your option) any later version.

    This program is distributed in the hope that it will be useful,
    but WITHOUT ANY WARRANTY; without even the implied warranty of
    MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
    GNU Affero General Public License for more details.

    You should have received a copy of the GNU Affero General Public License
    along with this program.  If not, see <https://www.gnu.org/licenses/>.
*/

pub mod auth;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod db;
pub mod dupes;
pub mod lastfm;
pub mod library;
pub mod models;
pub mod report;
pub mod similarity;
pub mod utils;
pub mod workflows;

#[cfg(test)]
pub(crate) mod testing;

// Re-export key items for convenience
pub use auth::get_spotify_client;
pub use cache::ObjectCache;
pub use catalog::{CatalogApi, SpotifyCatalog};
pub use config::{Config, Paths};
pub use db::Database;
pub use library::{FetchOptions, Library};
