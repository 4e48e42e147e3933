//! Cadastral parcel report renderer backed by an external geospatial tool.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;
pub mod util;
