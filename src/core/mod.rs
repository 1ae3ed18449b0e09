//! Core application modules
//!
//! This module contains configuration, constants, logging, the provider
//! abstraction and the provider implementations.

pub mod config;
pub mod constants;
pub mod logging;
pub mod provider;
pub mod provider_manager;
pub mod providers;
