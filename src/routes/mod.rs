pub mod activities;
pub mod dashboard;
pub mod donations;
pub mod geocode;
pub mod rewards;
