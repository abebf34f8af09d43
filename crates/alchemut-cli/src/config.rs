use crate::cli::MutateArgs;
use crate::error::{CliError, Result};
use alchemut::core::forcefield::params::resolve_forcefield_paths;
use alchemut::core::solvation::{BoxShape, EngineVersion, WaterModel};
use alchemut::engine::config as core_config;
use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

/// Identifiers and versions may be written as bare numbers, either in the file
/// or through `-S`, which parses `7` and `7.5` as TOML numbers.
///
/// A float keeps only its shortest form, so `7.10` must be quoted.
fn text_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Option<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Token {
        Text(String),
        Integer(i64),
        Float(f64),
    }
    Ok(Option::<Token>::deserialize(deserializer)?.map(|token| match token {
        Token::Text(text) => text,
        Token::Integer(number) => number.to_string(),
        Token::Float(number) => number.to_string(),
    }))
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct PartialMutationConfig {
    #[serde(default, deserialize_with = "text_or_number")]
    chain_id: Option<String>,
    #[serde(default, deserialize_with = "text_or_number")]
    residue_id: Option<String>,
    target: Option<String>,
    old_residue: Option<String>,
    extra_sidechain_map: Option<BTreeMap<String, String>>,
    demap_cb: Option<bool>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct PartialSolvationConfig {
    already_solvated: Option<bool>,
    vacuum: Option<bool>,
    water_model: Option<String>,
    ionic_strength: Option<f64>,
    padding: Option<f64>,
    box_shape: Option<String>,
    #[serde(default, deserialize_with = "text_or_number")]
    engine_version: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct PartialForcefieldConfig {
    files: Option<Vec<PathBuf>>,
    small_molecule_forcefield: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct PartialGeometryConfig {
    bond_divisions: Option<usize>,
    angle_divisions: Option<usize>,
    torsion_divisions: Option<usize>,
    ring_bias_force_constant: Option<f64>,
    seed: Option<u64>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct PartialChargeChangeConfig {
    transform_waters_into_ions_for_charge_changes: Option<bool>,
    search_radius: Option<f64>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct PartialNakedChargeConfig {
    sigma: Option<f64>,
    epsilon: Option<f64>,
    hydroxyl_sigma: Option<f64>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct PartialHybridConfig {
    bond_softening_constant: Option<f64>,
    angle_softening_constant: Option<f64>,
    softcore_lj_alpha: Option<f64>,
    softcore_electrostatics_alpha: Option<f64>,
    softcore_sigma_q: Option<f64>,
    use_dispersion_correction: Option<bool>,
    interpolate_old_and_new_14s: Option<bool>,
    flatten_torsions: Option<bool>,
    flatten_exceptions: Option<bool>,
    rest_radius: Option<f64>,
    w_lifting: Option<f64>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct PartialVariantConfig {
    plain: Option<bool>,
    repartitioned: Option<bool>,
    rest_capable: Option<bool>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct PartialValidationConfig {
    enabled: Option<bool>,
    threshold: Option<f64>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct PartialRunConfig {
    mutation: Option<PartialMutationConfig>,
    solvation: Option<PartialSolvationConfig>,
    forcefield: Option<PartialForcefieldConfig>,
    geometry: Option<PartialGeometryConfig>,
    charge_change: Option<PartialChargeChangeConfig>,
    naked_charge: Option<PartialNakedChargeConfig>,
    hybrid: Option<PartialHybridConfig>,
    variants: Option<PartialVariantConfig>,
    validation: Option<PartialValidationConfig>,
    temperature: Option<f64>,
}

/// Final settings of a `mutate` run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub mutation: core_config::MutationConfig,
    /// Version reported by the solvation engine, gating the available box shapes.
    pub engine_version: Option<EngineVersion>,
}

fn parse_named<T: FromStr>(key: &str, value: Option<String>) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    value
        .map(|v| {
            v.parse::<T>()
                .map_err(|e| CliError::Config(format!("Invalid value for '{}': {}", key, e)))
        })
        .transpose()
}

/// Parses the right-hand side of `-S KEY=VALUE` as a TOML value, falling back to a bare string.
fn parse_set_value(raw: &str) -> toml::Value {
    toml::from_str::<toml::Table>(&format!("value = {raw}"))
        .ok()
        .and_then(|mut table| table.remove("value"))
        .unwrap_or_else(|| toml::Value::String(raw.to_string()))
}

fn read_table(path: &Path) -> Result<toml::Table> {
    debug!("Loading configuration from file: {:?}", path);
    let content = std::fs::read_to_string(path)?;
    toml::from_str(&content).map_err(|e| CliError::FileParsing {
        path: path.to_path_buf(),
        source: e.into(),
    })
}

/// Writes `-S KEY=VALUE` pairs into a raw configuration table, creating sections as needed.
fn apply_set_values(table: &mut toml::Table, set_values: &[String]) -> Result<()> {
    for kv_pair in set_values {
        let Some((key, raw)) = kv_pair.split_once('=') else {
            return Err(CliError::Config(format!(
                "Invalid --set format: '{}'. Expected KEY=VALUE.",
                kv_pair
            )));
        };
        let mut path: Vec<&str> = key.trim().split('.').collect();
        let Some(leaf) = path.pop().filter(|leaf| !leaf.is_empty()) else {
            return Err(CliError::Config(format!("Invalid --set key: '{}'", key)));
        };
        let mut cursor = &mut *table;
        for segment in path {
            let entry = cursor
                .entry(segment.to_string())
                .or_insert(toml::Value::Table(toml::Table::new()));
            cursor = entry.as_table_mut().ok_or_else(|| {
                CliError::Config(format!("'{}' in --set key '{}' is not a section", segment, key))
            })?;
        }
        cursor.insert(leaf.to_string(), parse_set_value(raw.trim()));
    }
    Ok(())
}

impl PartialRunConfig {
    /// Parses a configuration file; relative force-field paths are resolved against its directory.
    pub fn from_file(path: &Path) -> Result<Self> {
        let table = read_table(path)?;
        Self::from_table(table, Some(path), false)
    }

    /// Loads the file given on the command line (or starts empty) and applies `-S` overrides.
    pub fn load(args: &MutateArgs) -> Result<Self> {
        let mut table = match &args.config {
            Some(path) => read_table(path)?,
            None => toml::Table::new(),
        };
        apply_set_values(&mut table, &args.set_values)?;
        Self::from_table(table, args.config.as_deref(), !args.set_values.is_empty())
    }

    fn from_table(table: toml::Table, origin: Option<&Path>, overridden: bool) -> Result<Self> {
        let mut config: Self = toml::Value::Table(table).try_into().map_err(|e: toml::de::Error| {
            match origin.filter(|_| !overridden) {
                Some(path) => CliError::FileParsing {
                    path: path.to_path_buf(),
                    source: e.into(),
                },
                None => CliError::Config(format!("Invalid configuration: {}", e)),
            }
        })?;
        if let Some(forcefield) = config.forcefield.as_mut() {
            if let (Some(files), Some(base)) = (forcefield.files.as_ref(), origin.and_then(Path::parent)) {
                forcefield.files = Some(resolve_forcefield_paths(base, files));
            }
        }
        Ok(config)
    }

    /// Applies command-line arguments over the file values and builds the run configuration.
    pub fn merge_with_cli(self, args: &MutateArgs) -> Result<RunConfig> {
        let mut partial = self;

        let mutation = partial.mutation.take().unwrap_or_default();
        let solvation = partial.solvation.take().unwrap_or_default();
        let forcefield = partial.forcefield.take().unwrap_or_default();
        let geometry = partial.geometry.take().unwrap_or_default();
        let charge_change = partial.charge_change.take().unwrap_or_default();
        let naked_charge = partial.naked_charge.take().unwrap_or_default();
        let hybrid = partial.hybrid.take().unwrap_or_default();
        let variants = partial.variants.take().unwrap_or_default();
        let validation = partial.validation.take().unwrap_or_default();

        let require = |cli: &Option<String>, file: Option<String>, key: &str| -> Result<String> {
            cli.clone().or(file).ok_or_else(|| {
                CliError::Config(format!(
                    "A value for '{}' is required either in the config file or via CLI argument.",
                    key
                ))
            })
        };
        let chain_id = require(&args.chain, mutation.chain_id, "mutation.chain-id")?;
        let residue_id = require(&args.residue, mutation.residue_id, "mutation.residue-id")?;
        let target = require(&args.target, mutation.target, "mutation.target")?;

        let forcefield_files = if args.forcefield_files.is_empty() {
            forcefield.files.unwrap_or_default()
        } else {
            args.forcefield_files.clone()
        };

        let defaults = core_config::SolvationConfig::default();
        let water_model: WaterModel =
            parse_named("solvation.water-model", solvation.water_model)?.unwrap_or(defaults.water_model);
        let box_shape: BoxShape = parse_named("solvation.box-shape", args.box_shape.clone().or(solvation.box_shape))?
            .unwrap_or(defaults.box_shape);
        let engine_version = parse_named("solvation.engine-version", solvation.engine_version)?;

        let geometry_defaults = core_config::GeometryConfig::default();
        let geometry = core_config::GeometryConfig {
            bond_divisions: geometry.bond_divisions.unwrap_or(geometry_defaults.bond_divisions),
            angle_divisions: geometry.angle_divisions.unwrap_or(geometry_defaults.angle_divisions),
            torsion_divisions: geometry.torsion_divisions.unwrap_or(geometry_defaults.torsion_divisions),
            ring_bias_force_constant: geometry
                .ring_bias_force_constant
                .unwrap_or(geometry_defaults.ring_bias_force_constant),
            seed: args.seed.or(geometry.seed),
        };

        let charge_defaults = core_config::ChargeChangeConfig::default();
        let charge_change = core_config::ChargeChangeConfig {
            transform_waters: charge_change
                .transform_waters_into_ions_for_charge_changes
                .unwrap_or(charge_defaults.transform_waters),
            search_radius: charge_change.search_radius.unwrap_or(charge_defaults.search_radius),
        };

        let floor_defaults = core_config::NakedChargeFloors::default();
        let naked_charge = core_config::NakedChargeFloors {
            sigma: naked_charge.sigma.unwrap_or(floor_defaults.sigma),
            epsilon: naked_charge.epsilon.unwrap_or(floor_defaults.epsilon),
            hydroxyl_sigma: naked_charge.hydroxyl_sigma.unwrap_or(floor_defaults.hydroxyl_sigma),
        };

        let hybrid_defaults = core_config::HybridSettings::default();
        let hybrid = core_config::HybridSettings {
            bond_softening_constant: hybrid
                .bond_softening_constant
                .unwrap_or(hybrid_defaults.bond_softening_constant),
            angle_softening_constant: hybrid
                .angle_softening_constant
                .unwrap_or(hybrid_defaults.angle_softening_constant),
            softcore_lj_alpha: hybrid.softcore_lj_alpha.unwrap_or(hybrid_defaults.softcore_lj_alpha),
            softcore_electrostatics_alpha: hybrid
                .softcore_electrostatics_alpha
                .unwrap_or(hybrid_defaults.softcore_electrostatics_alpha),
            softcore_sigma_q: hybrid.softcore_sigma_q.unwrap_or(hybrid_defaults.softcore_sigma_q),
            use_dispersion_correction: hybrid
                .use_dispersion_correction
                .unwrap_or(hybrid_defaults.use_dispersion_correction),
            interpolate_old_and_new_14s: hybrid
                .interpolate_old_and_new_14s
                .unwrap_or(hybrid_defaults.interpolate_old_and_new_14s),
            flatten_torsions: hybrid.flatten_torsions.unwrap_or(hybrid_defaults.flatten_torsions),
            flatten_exceptions: hybrid.flatten_exceptions.unwrap_or(hybrid_defaults.flatten_exceptions),
            rest_radius: hybrid.rest_radius.or(hybrid_defaults.rest_radius),
            w_lifting: hybrid.w_lifting.unwrap_or(hybrid_defaults.w_lifting),
        };

        let variant_defaults = core_config::VariantSelection::default();
        let variants = core_config::VariantSelection {
            plain: variants.plain.unwrap_or(variant_defaults.plain),
            repartitioned: variants.repartitioned.unwrap_or(variant_defaults.repartitioned),
            rest_capable: variants.rest_capable.unwrap_or(variant_defaults.rest_capable),
        };

        let validation_defaults = core_config::ValidationConfig::default();
        let validation = core_config::ValidationConfig {
            enabled: !args.no_validation && validation.enabled.unwrap_or(validation_defaults.enabled),
            threshold: validation.threshold.unwrap_or(validation_defaults.threshold),
        };

        let mut builder = core_config::MutationConfigBuilder::new()
            .mutation(core_config::MutationSite::new(&chain_id, &residue_id, &target))
            .old_residue(args.old_residue.clone().or(mutation.old_residue))
            .extra_sidechain_map(mutation.extra_sidechain_map.unwrap_or_default())
            .demap_cb(mutation.demap_cb.unwrap_or(false))
            .already_solvated(solvation.already_solvated.unwrap_or(false))
            .vacuum(solvation.vacuum.unwrap_or(false))
            .water_model(water_model)
            .ionic_strength(solvation.ionic_strength.unwrap_or(defaults.ionic_strength))
            .padding(solvation.padding.unwrap_or(defaults.padding))
            .box_shape(box_shape)
            .forcefield_files(forcefield_files)
            .small_molecule_forcefield(forcefield.small_molecule_forcefield)
            .geometry(geometry)
            .charge_change(charge_change)
            .naked_charge(naked_charge)
            .hybrid(hybrid)
            .variants(variants)
            .validation(validation);
        if let Some(temperature) = partial.temperature {
            builder = builder.temperature(temperature);
        }

        let mutation = builder.build().map_err(|e| CliError::Config(e.to_string()))?;
        Ok(RunConfig {
            mutation,
            engine_version,
        })
    }
}
