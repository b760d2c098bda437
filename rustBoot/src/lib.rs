#![cfg_attr(not(any(test, feature = "test-util")), no_std)]
#![allow(non_snake_case)]

//! A portable secure dual-slot image-swap bootloader core.
//!
//! This crate implements the fault-tolerant swap/decrypt engine and the
//! on-flash metadata protocol that drives it: a TLV signed-image format, a
//! resumable sector-swap state machine, an append-only command log for
//! crash safety, and the boot-time image selection/CRC gate. Flash device
//! drivers, the reset/vector-table handoff and the signing toolchain are
//! supplied by the platform through the traits in [`flash`].

pub mod boot;
pub mod config;
pub mod crypto;
pub mod error;
pub mod flash;
pub mod image;
pub mod journal;
pub mod swap;
pub mod tlv;

#[cfg(any(test, feature = "test-util"))]
pub mod ramflash;

pub use error::{BootError, Result};
