//! Domain types for the skins catalog.

pub mod catalog;
