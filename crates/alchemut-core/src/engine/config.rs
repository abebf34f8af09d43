use crate::core::solvation::{BoxShape, WaterModel};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),
    #[error("Exactly one residue can be mutated per run, but {0} were requested")]
    MultipleMutations(usize),
    #[error("Chain '{0}' not found in the structure")]
    ChainNotFound(String),
    #[error("Residue {residue} not found in chain '{chain}'")]
    ResidueNotFound { chain: String, residue: String },
    #[error("No template is available for residue name '{0}'")]
    UnknownResidueName(String),
    #[error("Side-chain map refers to atom '{atom}', which residue {residue} does not have")]
    UnknownSidechainAtom { residue: String, atom: String },
    #[error("'already_solvated' and 'vacuum' cannot both be set")]
    ConflictingSolvation,
    #[error("Invalid value for '{parameter}': {reason}")]
    InvalidValue {
        parameter: &'static str,
        reason: String,
    },
}

fn require_positive(parameter: &'static str, value: f64) -> Result<(), ConfigError> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::InvalidValue {
            parameter,
            reason: format!("must be a positive number, got {value}"),
        })
    }
}

fn require_non_negative(parameter: &'static str, value: f64) -> Result<(), ConfigError> {
    if value >= 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::InvalidValue {
            parameter,
            reason: format!("must be zero or positive, got {value}"),
        })
    }
}

/// The residue to mutate and the residue it becomes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct MutationSite {
    pub chain_id: String,
    pub residue_id: String,
    pub target: String,
}

impl MutationSite {
    pub fn new(chain_id: &str, residue_id: &str, target: &str) -> Self {
        Self {
            chain_id: chain_id.to_string(),
            residue_id: residue_id.to_string(),
            target: target.to_ascii_uppercase(),
        }
    }
}

/// How atoms of the mutated residue are matched between the two endpoints.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MappingOptions {
    /// Non-standard name to give the old residue before parametrization (e.g. `HID`).
    pub old_residue: Option<String>,
    /// Extra side-chain correspondences, old atom name to new atom name.
    pub extra_sidechain_map: BTreeMap<String, String>,
    /// Treat the beta carbons as unique instead of mapping them.
    pub demap_cb: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SolvationMode {
    /// The input already contains solvent; use it as is.
    AlreadySolvated,
    /// No solvent and no counter-ion conversion.
    Vacuum,
    /// Build a water box around the input.
    Solvate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SolvationConfig {
    pub mode: SolvationMode,
    pub water_model: WaterModel,
    /// Ionic strength in mol/L.
    pub ionic_strength: f64,
    /// Solute-to-boundary padding in nm.
    pub padding: f64,
    pub box_shape: BoxShape,
}

impl Default for SolvationConfig {
    fn default() -> Self {
        Self {
            mode: SolvationMode::Solvate,
            water_model: WaterModel::Tip3p,
            ionic_strength: 0.15,
            padding: 0.9,
            box_shape: BoxShape::Cube,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ForcefieldConfig {
    pub files: Vec<PathBuf>,
    pub small_molecule_forcefield: Option<String>,
}

/// Discretization and sampling of the internal-coordinate proposal.
#[derive(Debug, Clone, PartialEq)]
pub struct GeometryConfig {
    pub bond_divisions: usize,
    pub angle_divisions: usize,
    pub torsion_divisions: usize,
    /// Force constant (kJ/mol) of the planarity bias applied to ring torsions.
    pub ring_bias_force_constant: f64,
    pub seed: Option<u64>,
}

impl Default for GeometryConfig {
    fn default() -> Self {
        Self {
            bond_divisions: 100,
            angle_divisions: 180,
            torsion_divisions: 360,
            ring_bias_force_constant: 50.0,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChargeChangeConfig {
    /// Convert waters into counter-ions when the mutation changes the net charge.
    pub transform_waters: bool,
    /// Maximum water-oxygen distance (nm) from the mutated residue.
    pub search_radius: f64,
}

impl Default for ChargeChangeConfig {
    fn default() -> Self {
        Self {
            transform_waters: true,
            search_radius: 0.8,
        }
    }
}

/// Floors applied to particles with a zero Lennard-Jones radius or well depth.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NakedChargeFloors {
    pub sigma: f64,
    pub epsilon: f64,
    /// Radius given to hydroxyl-like hydrogens carrying `sigma = 1` and `epsilon = 0`.
    pub hydroxyl_sigma: f64,
}

impl Default for NakedChargeFloors {
    fn default() -> Self {
        Self {
            sigma: 0.06,
            epsilon: 1e-4,
            hydroxyl_sigma: 0.1,
        }
    }
}

/// Interpolation and softening settings shared by every hybrid variant.
///
/// These values are copied verbatim into each built hybrid system.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HybridSettings {
    pub bond_softening_constant: f64,
    pub angle_softening_constant: f64,
    pub softcore_lj_alpha: f64,
    pub softcore_electrostatics_alpha: f64,
    pub softcore_sigma_q: f64,
    pub use_dispersion_correction: bool,
    pub interpolate_old_and_new_14s: bool,
    pub flatten_torsions: bool,
    pub flatten_exceptions: bool,
    /// Radius (nm) of the REST region around the mutated residue.
    pub rest_radius: Option<f64>,
    /// Maximum lifting distance (nm) of the REST-capable variant.
    pub w_lifting: f64,
}

impl Default for HybridSettings {
    fn default() -> Self {
        Self {
            bond_softening_constant: 1.0,
            angle_softening_constant: 1.0,
            softcore_lj_alpha: 0.85,
            softcore_electrostatics_alpha: 0.3,
            softcore_sigma_q: 1.0,
            use_dispersion_correction: false,
            interpolate_old_and_new_14s: false,
            flatten_torsions: false,
            flatten_exceptions: false,
            rest_radius: Some(0.3),
            w_lifting: 0.3,
        }
    }
}

impl HybridSettings {
    pub const FALLBACK_REST_RADIUS: f64 = 0.2;

    /// Exceptions involving unique atoms are interpolated instead of kept on.
    pub fn exceptions_flattened(&self) -> bool {
        self.flatten_exceptions || self.interpolate_old_and_new_14s
    }

    pub fn effective_rest_radius(&self) -> f64 {
        self.rest_radius.unwrap_or(Self::FALLBACK_REST_RADIUS)
    }
}

/// Which hybrid variants to build for every phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VariantSelection {
    pub plain: bool,
    pub repartitioned: bool,
    pub rest_capable: bool,
}

impl Default for VariantSelection {
    fn default() -> Self {
        Self {
            plain: true,
            repartitioned: false,
            rest_capable: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidationConfig {
    pub enabled: bool,
    /// Maximum absolute reduced-potential discrepancy at an endstate.
    pub threshold: f64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: 1e-2,
        }
    }
}

/// Complete, validated configuration of one mutation run.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationConfig {
    pub site: MutationSite,
    pub mapping: MappingOptions,
    pub solvation: SolvationConfig,
    pub forcefield: ForcefieldConfig,
    pub geometry: GeometryConfig,
    pub charge_change: ChargeChangeConfig,
    pub naked_charge: NakedChargeFloors,
    pub hybrid: HybridSettings,
    pub variants: VariantSelection,
    pub validation: ValidationConfig,
    /// Temperature (K) defining reduced potentials.
    pub temperature: f64,
}

#[derive(Default)]
pub struct MutationConfigBuilder {
    sites: Vec<MutationSite>,
    mapping: MappingOptions,
    solvation: SolvationConfig,
    already_solvated: bool,
    vacuum: bool,
    forcefield_files: Vec<PathBuf>,
    small_molecule_forcefield: Option<String>,
    geometry: GeometryConfig,
    charge_change: ChargeChangeConfig,
    naked_charge: NakedChargeFloors,
    hybrid: HybridSettings,
    variants: VariantSelection,
    validation: ValidationConfig,
    temperature: Option<f64>,
}

impl MutationConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a mutation. Building fails unless exactly one is added.
    pub fn mutation(mut self, site: MutationSite) -> Self {
        self.sites.push(site);
        self
    }
    pub fn old_residue(mut self, name: Option<String>) -> Self {
        self.mapping.old_residue = name.map(|n| n.to_ascii_uppercase());
        self
    }
    pub fn extra_sidechain_map(mut self, map: BTreeMap<String, String>) -> Self {
        self.mapping.extra_sidechain_map = map;
        self
    }
    pub fn demap_cb(mut self, demap: bool) -> Self {
        self.mapping.demap_cb = demap;
        self
    }
    pub fn already_solvated(mut self, flag: bool) -> Self {
        self.already_solvated = flag;
        self
    }
    pub fn vacuum(mut self, flag: bool) -> Self {
        self.vacuum = flag;
        self
    }
    pub fn water_model(mut self, model: WaterModel) -> Self {
        self.solvation.water_model = model;
        self
    }
    pub fn ionic_strength(mut self, molar: f64) -> Self {
        self.solvation.ionic_strength = molar;
        self
    }
    pub fn padding(mut self, nm: f64) -> Self {
        self.solvation.padding = nm;
        self
    }
    pub fn box_shape(mut self, shape: BoxShape) -> Self {
        self.solvation.box_shape = shape;
        self
    }
    pub fn forcefield_files(mut self, files: Vec<PathBuf>) -> Self {
        self.forcefield_files = files;
        self
    }
    pub fn small_molecule_forcefield(mut self, identifier: Option<String>) -> Self {
        self.small_molecule_forcefield = identifier;
        self
    }
    pub fn geometry(mut self, geometry: GeometryConfig) -> Self {
        self.geometry = geometry;
        self
    }
    pub fn charge_change(mut self, config: ChargeChangeConfig) -> Self {
        self.charge_change = config;
        self
    }
    pub fn naked_charge(mut self, floors: NakedChargeFloors) -> Self {
        self.naked_charge = floors;
        self
    }
    pub fn hybrid(mut self, settings: HybridSettings) -> Self {
        self.hybrid = settings;
        self
    }
    pub fn variants(mut self, variants: VariantSelection) -> Self {
        self.variants = variants;
        self
    }
    pub fn validation(mut self, validation: ValidationConfig) -> Self {
        self.validation = validation;
        self
    }
    pub fn temperature(mut self, kelvin: f64) -> Self {
        self.temperature = Some(kelvin);
        self
    }

    pub fn build(self) -> Result<MutationConfig, ConfigError> {
        let site = match self.sites.len() {
            0 => return Err(ConfigError::MissingParameter("mutation")),
            1 => self.sites.into_iter().next().ok_or(ConfigError::MissingParameter("mutation"))?,
            n => return Err(ConfigError::MultipleMutations(n)),
        };
        if self.forcefield_files.is_empty() {
            return Err(ConfigError::MissingParameter("forcefield_files"));
        }

        let mode = match (self.already_solvated, self.vacuum) {
            (true, true) => return Err(ConfigError::ConflictingSolvation),
            (true, false) => SolvationMode::AlreadySolvated,
            (false, true) => SolvationMode::Vacuum,
            (false, false) => SolvationMode::Solvate,
        };
        let solvation = SolvationConfig { mode, ..self.solvation };
        if mode == SolvationMode::Solvate {
            require_positive("padding", solvation.padding)?;
            require_non_negative("ionic_strength", solvation.ionic_strength)?;
        }

        for (parameter, value) in [
            ("bond_divisions", self.geometry.bond_divisions),
            ("angle_divisions", self.geometry.angle_divisions),
            ("torsion_divisions", self.geometry.torsion_divisions),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    parameter,
                    reason: "must be at least 1".to_string(),
                });
            }
        }
        require_non_negative("ring_bias_force_constant", self.geometry.ring_bias_force_constant)?;
        require_positive("search_radius", self.charge_change.search_radius)?;
        require_positive("naked_charge.sigma", self.naked_charge.sigma)?;
        require_positive("naked_charge.epsilon", self.naked_charge.epsilon)?;
        require_positive("naked_charge.hydroxyl_sigma", self.naked_charge.hydroxyl_sigma)?;
        require_non_negative("bond_softening_constant", self.hybrid.bond_softening_constant)?;
        require_non_negative("angle_softening_constant", self.hybrid.angle_softening_constant)?;
        require_non_negative("softcore_lj_alpha", self.hybrid.softcore_lj_alpha)?;
        require_non_negative(
            "softcore_electrostatics_alpha",
            self.hybrid.softcore_electrostatics_alpha,
        )?;
        require_non_negative("softcore_sigma_q", self.hybrid.softcore_sigma_q)?;
        require_positive("w_lifting", self.hybrid.w_lifting)?;
        if let Some(radius) = self.hybrid.rest_radius {
            require_non_negative("rest_radius", radius)?;
        }
        require_positive("validation.threshold", self.validation.threshold)?;
        let temperature = self.temperature.unwrap_or(300.0);
        require_positive("temperature", temperature)?;

        Ok(MutationConfig {
            site,
            mapping: self.mapping,
            solvation,
            forcefield: ForcefieldConfig {
                files: self.forcefield_files,
                small_molecule_forcefield: self.small_molecule_forcefield,
            },
            geometry: self.geometry,
            charge_change: self.charge_change,
            naked_charge: self.naked_charge,
            hybrid: self.hybrid,
            variants: self.variants,
            validation: self.validation,
            temperature,
        })
    }
}
