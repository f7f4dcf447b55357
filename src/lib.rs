//! Keyword News - a keyword news archiver
//!
//! This crate collects articles matching a list of keywords from search
//! feeds, deduplicates them into a flat JSON store and renders the store
//! as a static site with an index page and one page per keyword.

pub mod collector;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod item;
pub mod site;
pub mod sources;
pub mod store;
