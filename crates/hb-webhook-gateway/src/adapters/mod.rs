//! Adapters for the Webhook Gateway.
//!
//! Local implementations of the outbound ports.

pub mod recipe_book;

pub use recipe_book::InMemoryRecipeBook;
