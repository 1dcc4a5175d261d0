pub mod client;
pub mod codec;
pub mod commands;
pub mod connection;
pub mod error;
pub mod frame;
mod pipeline;
pub mod reply;
pub mod request;

pub use client::{Client, PubSubMessage};
pub use commands::{Order, SortOptions};
pub use error::{Error, Result};
pub use frame::Frame;
pub use reply::{FromReply, Outcome};
pub use request::{Arg, Request, ToArgs};
