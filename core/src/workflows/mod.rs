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

//! Jobs built on top of the library mirror and the database.

mod count;
mod discover;
mod ingest;
mod relink;
mod search;

pub use count::count_tracks;
pub use discover::discover_from_playlists;
pub use ingest::add_tracks_from_file;
pub use relink::find_relinked_tracks;
pub use search::find_tracks_by_criteria;

use crate::catalog::CatalogError;
use crate::db::DbError;
use crate::library::LibraryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error(transparent)]
    Library(#[from] LibraryError),
    #[error("Database error: {0}")]
    Db(#[from] DbError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error("Failed to read track ids: {0}")]
    Io(#[from] std::io::Error),
}
