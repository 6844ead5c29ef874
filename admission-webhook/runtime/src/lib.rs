#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub use admission_webhook_core as core;

mod admission;
mod args;
pub mod codec;
mod server;

pub use self::{
    admission::Admission,
    args::Args,
    server::{Server, ServerParams, TlsLoadError},
};
