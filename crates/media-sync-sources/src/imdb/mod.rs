pub mod client;
pub mod page;
pub mod parser;

pub use client::{ImdbCookies, ImdbSource};
