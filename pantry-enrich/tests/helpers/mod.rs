//! Shared test helpers for pantry-enrich integration tests

#![allow(dead_code)]

pub mod db_utils;

pub use db_utils::*;
