pub mod geo;
pub mod params;
pub mod catalog;
pub mod station;
pub mod scoring;
pub mod physics;
pub mod cache;
pub mod session;
pub mod render;
pub mod scene;
pub mod mapsync;
pub mod config;
pub mod ui;

#[cfg(test)]
mod tests;
