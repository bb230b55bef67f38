pub mod client;
pub mod models;
pub mod normalize;

pub use client::{CatalogClient, CatalogErr};
