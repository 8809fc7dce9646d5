mod client;
mod poll;
mod team;

pub use client::{Client, ClientView, Token};
pub use poll::{Poll, Question, Response};
pub use team::{Member, Team};
