//! # Constants and type definitions for binsynth
//!
//! This module centralizes the **physical constants**, **conversion factors**, and **common type
//! definitions** used throughout the crate.
//!
//! ## Overview
//!
//! - Solar units and velocity conversions (solRad/d ↔ km/s)
//! - Unit-tagged scalar aliases (`Day`, `SolRad`, `Meter`, ...)
//! - Labels of the virtual mesh datasets synthesized by the planner
//!
//! Quantities cross the crate boundary as plain `f64` tagged by these aliases; no generic
//! unit-conversion layer is involved.

// -------------------------------------------------------------------------------------------------
// Physical constants and unit conversions
// -------------------------------------------------------------------------------------------------

/// Number of seconds in a Julian day
pub const SECONDS_PER_DAY: f64 = 86_400.0;

/// Nominal solar radius in kilometers (IAU 2015 B3)
pub const SOLRAD_KM: f64 = 695_700.0;

/// solRad/d → km/s
pub const SOLRAD_PER_DAY_TO_KM_PER_S: f64 = SOLRAD_KM / SECONDS_PER_DAY;

// -------------------------------------------------------------------------------------------------
// Type aliases
// -------------------------------------------------------------------------------------------------

/// Time in days (BJD-like, no time scale attached)
pub type Day = f64;
/// Distance in nominal solar radii
pub type SolRad = f64;
/// Velocity in solar radii per day
pub type SolRadPerDay = f64;
/// Velocity in kilometers per second
pub type KmPerSec = f64;
/// Distance in meters
pub type Meter = f64;
/// Angle in radians
pub type Radian = f64;

// -------------------------------------------------------------------------------------------------
// Virtual datasets
// -------------------------------------------------------------------------------------------------

/// Dataset label of the reference-epoch (periastron) mesh snapshot.
pub const PROTOMESH: &str = "protomesh";

/// Dataset label of the per-time mesh snapshots produced alongside mesh-requiring observables.
pub const PBMESH: &str = "pbmesh";

/// Placeholder dataset label that the description layer may expose; never planned.
pub const DEFAULT_DATASET: &str = "_default";
