//! Typed ARM request and response bodies.

pub mod flexible;
pub mod single;
