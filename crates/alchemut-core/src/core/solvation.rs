//! Solvent-box construction.
//!
//! The [`Solvator`] trait is the seam to an external solvation engine. The in-crate
//! [`LatticeSolvator`] fills a periodic cell around the solute with rigid three-site
//! waters placed on a cubic lattice, then swaps waters for monovalent ions to
//! neutralize the solute and reach the requested ionic strength.

use crate::core::models::Coordinates;
use crate::core::models::atom::Element;
use crate::core::models::chain::ChainType;
use crate::core::models::system::{MolecularTopology, TopologyError};
use crate::core::models::topology::BondOrder;
use kiddo::{KdTree, SquaredEuclidean};
use nalgebra::{Matrix3, Point3, Vector3};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, info};

/// Molarity of pure water, used to convert ionic strength into an ion-pair count.
const WATER_MOLARITY: f64 = 55.4;
/// Lattice spacing reproducing liquid water density (~33.4 molecules/nm³).
const LATTICE_SPACING: f64 = 0.3104;
/// Minimum oxygen-to-solute distance of a kept water.
const SOLUTE_CLEARANCE: f64 = 0.23;

pub const WATER_RESIDUE_NAME: &str = "HOH";
pub const CATION_NAME: &str = "NA";
pub const ANION_NAME: &str = "CL";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoxShape {
    Cube,
    Octahedron,
    Dodecahedron,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown box shape: '{0}' (expected cube, octahedron or dodecahedron)")]
pub struct ParseBoxShapeError(pub String);

impl FromStr for BoxShape {
    type Err = ParseBoxShapeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cube" | "cubic" => Ok(Self::Cube),
            "octahedron" | "truncated-octahedron" | "truncated_octahedron" => Ok(Self::Octahedron),
            "dodecahedron" | "rhombic-dodecahedron" | "rhombic_dodecahedron" => Ok(Self::Dodecahedron),
            other => Err(ParseBoxShapeError(other.to_string())),
        }
    }
}

impl fmt::Display for BoxShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Cube => "cube",
            Self::Octahedron => "octahedron",
            Self::Dodecahedron => "dodecahedron",
        };
        f.write_str(name)
    }
}

impl BoxShape {
    /// Oldest engine release able to build this shape.
    pub fn minimum_engine_version(&self) -> EngineVersion {
        match self {
            Self::Cube | Self::Octahedron => EngineVersion::new(7, 0),
            Self::Dodecahedron => EngineVersion::new(7, 7),
        }
    }

    /// Reduced periodic box vectors for a cell whose image distance is `d`.
    pub fn box_vectors(&self, d: f64) -> [Vector3<f64>; 3] {
        match self {
            Self::Cube => [
                Vector3::new(d, 0.0, 0.0),
                Vector3::new(0.0, d, 0.0),
                Vector3::new(0.0, 0.0, d),
            ],
            Self::Octahedron => [
                Vector3::new(d, 0.0, 0.0),
                Vector3::new(d / 3.0, 2.0 * 2f64.sqrt() * d / 3.0, 0.0),
                Vector3::new(-d / 3.0, 2f64.sqrt() * d / 3.0, 6f64.sqrt() * d / 3.0),
            ],
            Self::Dodecahedron => [
                Vector3::new(d, 0.0, 0.0),
                Vector3::new(0.0, d, 0.0),
                Vector3::new(d / 2.0, d / 2.0, 2f64.sqrt() * d / 2.0),
            ],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EngineVersion {
    pub major: u32,
    pub minor: u32,
}

impl EngineVersion {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Invalid engine version: '{0}' (expected MAJOR.MINOR)")]
pub struct ParseEngineVersionError(pub String);

impl FromStr for EngineVersion {
    type Err = ParseEngineVersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseEngineVersionError(s.to_string());
        let mut parts = s.trim().split('.');
        let major = parts.next().and_then(|p| p.parse().ok()).ok_or_else(err)?;
        let minor = match parts.next() {
            Some(p) => p.parse().map_err(|_| err())?,
            None => 0,
        };
        Ok(Self { major, minor })
    }
}

impl fmt::Display for EngineVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WaterModel {
    Tip3p,
    Spce,
    Tip3pFb,
    Opc3,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown water model: '{0}' (expected tip3p, spce, tip3pfb or opc3)")]
pub struct ParseWaterModelError(pub String);

impl FromStr for WaterModel {
    type Err = ParseWaterModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tip3p" => Ok(Self::Tip3p),
            "spce" => Ok(Self::Spce),
            "tip3pfb" => Ok(Self::Tip3pFb),
            "opc3" => Ok(Self::Opc3),
            other => Err(ParseWaterModelError(other.to_string())),
        }
    }
}

impl fmt::Display for WaterModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Tip3p => "tip3p",
            Self::Spce => "spce",
            Self::Tip3pFb => "tip3pfb",
            Self::Opc3 => "opc3",
        };
        f.write_str(name)
    }
}

impl WaterModel {
    /// O-H bond length (nm) and H-O-H angle (radians) of the rigid model.
    pub fn geometry(&self) -> (f64, f64) {
        match self {
            Self::Tip3p => (0.09572, 104.52f64.to_radians()),
            Self::Spce => (0.1, 109.47f64.to_radians()),
            Self::Tip3pFb => (0.101181, 108.14844252f64.to_radians()),
            Self::Opc3 => (0.09789, 109.47f64.to_radians()),
        }
    }
}

/// Parameters of a solvation request.
#[derive(Debug, Clone, PartialEq)]
pub struct SolvationRequest {
    pub water_model: WaterModel,
    /// Minimum solute-to-boundary distance, in nm.
    pub padding: f64,
    pub box_shape: BoxShape,
    /// Ionic strength of added salt, in mol/L.
    pub ionic_strength: f64,
    /// Net integer charge of the solute, neutralized with counter-ions.
    pub solute_charge: i32,
}

#[derive(Debug, Error, PartialEq)]
pub enum SolvationError {
    #[error("Box shape {shape} requires engine version {required}, but {available} is available")]
    UnsupportedShape {
        shape: BoxShape,
        required: EngineVersion,
        available: EngineVersion,
    },
    #[error("Cannot solvate an empty solute")]
    EmptySolute,
    #[error("Padding must be positive, got {0}")]
    InvalidPadding(f64),
    #[error("Not enough waters ({waters}) to place {ions} ions")]
    TooFewWaters { waters: usize, ions: usize },
    #[error("Topology error: {0}")]
    Topology(#[from] TopologyError),
}

/// Builds a solvent box around a solute.
pub trait Solvator {
    fn engine_version(&self) -> EngineVersion;

    fn supports(&self, shape: BoxShape) -> bool {
        self.engine_version() >= shape.minimum_engine_version()
    }

    /// Fails with [`SolvationError::UnsupportedShape`] if the shape is not available.
    fn check_shape(&self, shape: BoxShape) -> Result<(), SolvationError> {
        if self.supports(shape) {
            Ok(())
        } else {
            Err(SolvationError::UnsupportedShape {
                shape,
                required: shape.minimum_engine_version(),
                available: self.engine_version(),
            })
        }
    }

    /// Returns the solvated topology (solute first) and its coordinates.
    fn solvate(
        &self,
        topology: &MolecularTopology,
        positions: &[Point3<f64>],
        request: &SolvationRequest,
    ) -> Result<(MolecularTopology, Coordinates), SolvationError>;
}

#[derive(Debug, Clone, Copy)]
pub struct LatticeSolvator {
    version: EngineVersion,
}

impl Default for LatticeSolvator {
    fn default() -> Self {
        Self::new(EngineVersion::new(8, 1))
    }
}

impl LatticeSolvator {
    pub fn new(version: EngineVersion) -> Self {
        Self { version }
    }

    fn lattice_waters(
        solute: &[Point3<f64>],
        center: &Point3<f64>,
        cell: &Matrix3<f64>,
    ) -> Vec<Point3<f64>> {
        let Some(inverse) = cell.try_inverse() else {
            return Vec::new();
        };
        let tree: KdTree<f64, 3> = (&solute.iter().map(|p| [p.x, p.y, p.z]).collect::<Vec<_>>()).into();
        let reach = cell.column_iter().map(|v| v.norm()).sum::<f64>() / 2.0;
        let steps = (reach / LATTICE_SPACING).ceil() as i64;
        let clearance_sq = SOLUTE_CLEARANCE * SOLUTE_CLEARANCE;

        let mut sites = Vec::new();
        for i in -steps..=steps {
            for j in -steps..=steps {
                for k in -steps..=steps {
                    let offset = Vector3::new(i as f64, j as f64, k as f64) * LATTICE_SPACING;
                    let fractional = inverse * offset;
                    if fractional.iter().any(|f| !(-0.5..0.5).contains(f)) {
                        continue;
                    }
                    let site = center + offset;
                    let nearest = tree.nearest_one::<SquaredEuclidean>(&[site.x, site.y, site.z]);
                    if nearest.distance >= clearance_sq {
                        sites.push(site);
                    }
                }
            }
        }
        sites
    }

    fn water_atoms(oxygen: &Point3<f64>, model: WaterModel) -> [Point3<f64>; 3] {
        let (length, angle) = model.geometry();
        let half = angle / 2.0;
        let h1 = oxygen + Vector3::new(length * half.sin(), length * half.cos(), 0.0);
        let h2 = oxygen + Vector3::new(-length * half.sin(), length * half.cos(), 0.0);
        [*oxygen, h1, h2]
    }
}

impl Solvator for LatticeSolvator {
    fn engine_version(&self) -> EngineVersion {
        self.version
    }

    fn solvate(
        &self,
        topology: &MolecularTopology,
        positions: &[Point3<f64>],
        request: &SolvationRequest,
    ) -> Result<(MolecularTopology, Coordinates), SolvationError> {
        self.check_shape(request.box_shape)?;
        if positions.is_empty() {
            return Err(SolvationError::EmptySolute);
        }
        if request.padding <= 0.0 {
            return Err(SolvationError::InvalidPadding(request.padding));
        }

        let (lo, hi) = positions.iter().fold(
            (Vector3::repeat(f64::MAX), Vector3::repeat(f64::MIN)),
            |(lo, hi), p| (lo.inf(&p.coords), hi.sup(&p.coords)),
        );
        let center = Point3::from((lo + hi) / 2.0);
        let extent = (hi - lo).max();
        let image_distance = extent + 2.0 * request.padding;
        let vectors = request.box_shape.box_vectors(image_distance);
        let cell = Matrix3::from_columns(&vectors);

        let mut sites = Self::lattice_waters(positions, &center, &cell);

        let neutralizing = request.solute_charge.unsigned_abs() as usize;
        let pairs = (request.ionic_strength * sites.len() as f64 / WATER_MOLARITY + 0.5).floor() as usize;
        let (mut cations, mut anions) = (pairs, pairs);
        if request.solute_charge < 0 {
            cations += neutralizing;
        } else {
            anions += neutralizing;
        }
        let ions = cations + anions;
        if ions > sites.len() {
            return Err(SolvationError::TooFewWaters {
                waters: sites.len(),
                ions,
            });
        }

        // Ions take the sites farthest from the solute centre.
        sites.sort_by(|a, b| {
            let da = (a - center).norm_squared();
            let db = (b - center).norm_squared();
            db.partial_cmp(&da).unwrap_or(Ordering::Equal)
        });
        let ion_sites: Vec<Point3<f64>> = sites.drain(..ions).collect();

        let mut solvent = MolecularTopology::new();
        let mut solvent_positions = Vec::with_capacity(sites.len() * 3 + ions);
        let mut serial = 1usize;
        if ions > 0 {
            let chain = solvent.add_chain("I", ChainType::Ion);
            for (n, site) in ion_sites.iter().enumerate() {
                let (name, element) = if n < cations {
                    (CATION_NAME, Element::Na)
                } else {
                    (ANION_NAME, Element::Cl)
                };
                let residue = solvent.add_residue(chain, &serial.to_string(), name)?;
                solvent.add_atom(residue, name, element)?;
                solvent_positions.push(*site);
                serial += 1;
            }
        }
        let chain = solvent.add_chain("W", ChainType::Water);
        for site in &sites {
            let residue = solvent.add_residue(chain, &serial.to_string(), WATER_RESIDUE_NAME)?;
            let o = solvent.add_atom(residue, "O", Element::O)?;
            let h1 = solvent.add_atom(residue, "H1", Element::H)?;
            let h2 = solvent.add_atom(residue, "H2", Element::H)?;
            solvent.add_bond(o, h1, BondOrder::Single)?;
            solvent.add_bond(o, h2, BondOrder::Single)?;
            solvent_positions.extend(Self::water_atoms(site, request.water_model));
            serial += 1;
        }

        let mut solvated = topology.clone();
        let mut solvated_positions = positions.to_vec();
        let index_map = solvated.append(&solvent)?;
        let mut appended = vec![Point3::origin(); index_map.len()];
        for (old, new) in index_map.iter().enumerate() {
            appended[new - topology.atom_count()] = solvent_positions[old];
        }
        solvated_positions.extend(appended);
        solvated.set_box_vectors(Some(vectors));

        debug!(
            image_distance,
            shape = %request.box_shape,
            "Built periodic cell."
        );
        info!(
            waters = sites.len(),
            cations,
            anions,
            model = %request.water_model,
            "Solvated system."
        );
        Ok((solvated, solvated_positions))
    }
}
