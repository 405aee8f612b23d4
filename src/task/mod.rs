#![forbid(unsafe_code)]

pub mod model;
pub mod service;
pub mod storage;
pub mod store;
