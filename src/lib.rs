// src/lib.rs

//! jobcrawl: concurrent job-posting crawler
//!
//! Fetchers registered in a [`fetcher::FetcherRegistry`] are run by the
//! [`pipeline::Orchestrator`] on a bounded worker pool, drawing egress
//! identities from a [`proxy::ProxyPool`]. Their results are merged and
//! deduplicated by [`pipeline::aggregate`] and served through
//! [`api::SearchService`].

pub mod api;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod models;
pub mod pipeline;
pub mod proxy;
pub mod services;
pub mod utils;
