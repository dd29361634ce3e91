pub mod answer;
pub mod entitlement;
pub mod subscription;
pub mod usage;
pub mod user;
