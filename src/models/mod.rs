pub mod analytics;
pub mod item;
pub mod row;
pub mod session;
pub mod view;
