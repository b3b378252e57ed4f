//! HTTP transport for the image-browsing listing cache
//!
//! [`BrowsingClient`] talks to the host application's `/image-browsing/*`
//! routes and implements [`image_browsing_cache::Transport`], so it can be
//! handed straight to a [`Navigator`](image_browsing_cache::Navigator).
//!
//! # Routes
//!
//! - `GET /image-browsing/<path>` - folder listing, conditional via `If-None-Match`
//! - `POST /image-browsing/batch` - several listings at once
//! - `POST /image-browsing/<path>` - multipart create (folder or file upload)
//! - `PUT /image-browsing/<path>` - rename
//! - `DELETE /image-browsing/delete` - delete entries
//! - `POST /image-browsing/move` - move entries

mod client;
mod error;

pub use client::BrowsingClient;
pub use error::{ClientError, Result};
