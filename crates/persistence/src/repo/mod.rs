pub mod chunks;
pub mod documents;
pub mod memories;
pub mod sessions;
pub mod turns;
pub mod users;
