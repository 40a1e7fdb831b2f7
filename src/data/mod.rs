pub mod gateway;
pub mod local;
pub mod migrations;
pub mod repository;
pub mod rest;
