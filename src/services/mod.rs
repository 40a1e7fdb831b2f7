pub mod analytics_service;
pub mod listing_service;
pub mod mapper;
pub mod mutation_service;
pub mod transfer_service;
