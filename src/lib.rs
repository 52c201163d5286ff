//! Kovert: a CS2 skins catalog service.
//!
//! The core of the crate is an in-process catalog cache with TTL expiry and
//! single-flight refresh ([`cache::CatalogCache`]), fronted by a small HTTP
//! surface that exposes the catalog and a cache-control endpoint. Snapshot
//! writes fan out to cached page responses through [`cache::CacheRevalidator`].

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
