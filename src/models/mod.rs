pub mod contact;
pub mod pairs;
pub mod stats_models;
