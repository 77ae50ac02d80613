// Copyright (c) 2025 - Cowboy AI, Inc.
//! Property-Based Tests Module
//!
//! This module contains property-based tests using proptest to verify
//! fundamental properties of the resource fold, the meta engine and tokens.

mod event_application;
mod meta_engine;
