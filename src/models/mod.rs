mod client;
mod phone;

pub use client::{Client, ClientChanges, ClientFilter, ClientPhone, NewClient};
pub use phone::Phone;
