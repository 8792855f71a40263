pub mod activity;
pub mod cadence;
pub mod models;
pub mod settings;
