pub mod channels;
pub mod classify;
pub mod config;
pub mod delivery;
pub mod domain;
pub mod ingest;
pub mod pipeline;
pub mod report;
pub mod scoring;
pub mod storage;
pub mod time;
