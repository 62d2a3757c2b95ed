pub mod client;
pub mod codec;
pub mod events;

pub use client::QueryClient;
