pub mod handler;
pub mod pages;
