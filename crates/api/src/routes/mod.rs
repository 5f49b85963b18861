pub mod auth;
pub mod deals;
pub mod health;
pub mod investments;
pub mod stats;
pub mod users;
