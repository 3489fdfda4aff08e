#![cfg_attr(doc, doc = include_str!("../README.md"))]

pub mod error;
pub mod session;

pub use session::{Client, Config, ConnectionState, SessionHandle, connect};

use crate::error::Error;

pub type Result<T> = std::result::Result<T, Error>;
