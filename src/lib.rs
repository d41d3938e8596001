//! Weekly Discord flyer bot: scrapes store flyer pages on a schedule and
//! posts the images into per-store threads, one thread per store per ISO
//! week.

pub mod commands;
pub mod config;
pub mod discord;
pub mod images;
pub mod messages;
pub mod poster;
pub mod schedule;
pub mod scrape;
