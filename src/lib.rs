//! `formkit` defines the calling contract between numerical descriptions of
//! finite elements and an external assembly driver.
//!
//! The contract consists of five component families: [`element::FiniteElement`]
//! (basis functions on a reference cell), [`dofmap::Dofmap`] (local-to-global
//! degree-of-freedom numbering), [`mapping::CoordinateMapping`] (the geometric
//! transform between reference and physical cells), the integral traits in
//! [`integral`] (per-entity local tensor contributions) and [`form::Form`]
//! (the registry that aggregates everything and dispatches integrals by
//! subdomain id). [`registry`] adds flat factory tables so a driver can
//! discover generated artifacts by name without compile-time coupling.
//!
//! A reference driver in [`assembly`] walks a [`mesh::Mesh`] and exercises the
//! full contract, scattering local tensors into global structures from
//! `nalgebra`/`nalgebra-sparse`. It is a consumer of the contract, not part of
//! it: any driver honoring the same call protocol may replace it.
//!
//! All contract operations are synchronous pure computations over
//! caller-owned buffers. Instances are immutable after construction and may
//! be shared read-only across threads; factory methods return independently
//! owned `Box`ed instances, so the ownership graph is always a tree.

use nalgebra::RealField;
use num::FromPrimitive;

pub mod assembly;
pub mod cell;
pub mod dofmap;
pub mod element;
pub mod error;
pub mod form;
pub mod integral;
pub mod mapping;
pub mod mesh;
pub mod registry;

pub extern crate nalgebra;
pub extern crate nalgebra_sparse;

/// The scalar types supported by the contract.
///
/// Used as a trait alias for the bounds frequently needed by generic
/// `formkit` routines.
pub trait Real: RealField + FromPrimitive + Copy + Send + Sync {}

impl<T> Real for T where T: RealField + FromPrimitive + Copy + Send + Sync {}

/// Major version of the contract implemented by this crate.
pub const VERSION_MAJOR: u32 = 0;
/// Minor version of the contract implemented by this crate.
pub const VERSION_MINOR: u32 = 1;
/// Maintenance version of the contract implemented by this crate.
pub const VERSION_MAINTENANCE: u32 = 0;
/// Whether this is a release version. Unreleased versions carry a `.dev0`
/// suffix in [`version`].
pub const VERSION_RELEASE: bool = false;

/// The dotted version string, the sole machine-readable compatibility marker
/// exposed to consumers of generated artifacts.
pub fn version() -> String {
    if VERSION_RELEASE {
        format!("{VERSION_MAJOR}.{VERSION_MINOR}.{VERSION_MAINTENANCE}")
    } else {
        format!("{VERSION_MAJOR}.{VERSION_MINOR}.{VERSION_MAINTENANCE}.dev0")
    }
}

#[cfg(test)]
mod tests {
    #[test]
    fn version_string_has_dev_suffix_for_unreleased() {
        let version = super::version();
        if super::VERSION_RELEASE {
            assert!(!version.ends_with(".dev0"));
        } else {
            assert!(version.ends_with(".dev0"));
        }
        assert!(version.starts_with(&format!(
            "{}.{}.{}",
            super::VERSION_MAJOR,
            super::VERSION_MINOR,
            super::VERSION_MAINTENANCE
        )));
    }
}
