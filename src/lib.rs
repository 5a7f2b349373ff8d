pub mod cache;
pub mod config;
pub mod error;
pub mod gazetteer;
pub mod geometry;
pub mod georeferencer;
pub mod hierarchy;
pub mod pipes;
pub mod record;
pub mod server;
pub mod text;
pub mod uncertainty;

#[cfg(test)]
pub mod testing;
