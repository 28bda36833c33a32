//! Request extractors: API-key identity, validated JSON bodies, paging.

pub mod auth;
pub mod json;
pub mod query;
