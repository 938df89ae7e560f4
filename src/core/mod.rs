pub mod consumption;
pub mod end_use;
pub mod house;
pub mod patterns;
pub mod presence;
pub mod probability;
pub mod scheduler;
pub mod units;
pub mod user;
pub mod wastewater;
