use super::traits::MolecularFile;
use super::{ANGSTROM_TO_NM, IoError, StructureFormat};
use crate::core::models::Coordinates;
use crate::core::models::atom::Element;
use crate::core::models::builder::MolecularTopologyBuilder;
use crate::core::models::chain::ChainType;
use crate::core::models::system::MolecularTopology;
use crate::core::models::topology::BondOrder;
use nalgebra::Point3;
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Residue name given to small molecules read from SDF when none is requested.
pub const DEFAULT_LIGAND_RESIDUE_NAME: &str = "MOL";
/// Chain identifier given to small molecules read from SDF.
pub const LIGAND_CHAIN_ID: &str = "L";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SdfMetadata {
    pub title: String,
    pub entry_index: usize,
    pub properties: BTreeMap<String, String>,
}

pub struct SdfFile;

impl MolecularFile for SdfFile {
    type Metadata = SdfMetadata;
    type Error = IoError;

    fn read_from(
        reader: &mut impl BufRead,
    ) -> Result<(MolecularTopology, Coordinates, Self::Metadata), Self::Error> {
        Self::read_entry(reader, 0, DEFAULT_LIGAND_RESIDUE_NAME)
    }
}

impl SdfFile {
    /// Reads one entry of a multi-entry SDF stream.
    ///
    /// Atoms are named by element and per-element ordinal (`C1`, `C2`, `O1`, ...), which
    /// is how small-molecule templates refer to them.
    pub fn read_entry(
        reader: &mut impl BufRead,
        entry_index: usize,
        residue_name: &str,
    ) -> Result<(MolecularTopology, Coordinates, SdfMetadata), IoError> {
        let mut entries_seen = 0usize;
        let mut block: Vec<(usize, String)> = Vec::new();
        for (i, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim() == "$$$$" {
                if entries_seen == entry_index {
                    return parse_block(&block, entry_index, residue_name);
                }
                entries_seen += 1;
                block.clear();
                continue;
            }
            block.push((i + 1, line));
        }
        // A final entry without a terminating `$$$$` still counts.
        if block.iter().any(|(_, l)| !l.trim().is_empty()) {
            if entries_seen == entry_index {
                return parse_block(&block, entry_index, residue_name);
            }
            entries_seen += 1;
        }
        Err(IoError::EntryOutOfRange {
            index: entry_index,
            available: entries_seen,
        })
    }

    pub fn read_entry_from_path(
        path: &Path,
        entry_index: usize,
        residue_name: &str,
    ) -> Result<(MolecularTopology, Coordinates, SdfMetadata), IoError> {
        let mut reader = BufReader::new(File::open(path)?);
        Self::read_entry(&mut reader, entry_index, residue_name)
    }
}

fn parse_block(
    lines: &[(usize, String)],
    entry_index: usize,
    residue_name: &str,
) -> Result<(MolecularTopology, Coordinates, SdfMetadata), IoError> {
    let first_line = lines.first().map_or(1, |(ln, _)| *ln);
    if lines.len() < 4 {
        return Err(IoError::parse(
            StructureFormat::Sdf,
            first_line,
            "SDF block must contain at least a header and counts line",
        ));
    }
    let (counts_line_no, counts_line) = (&lines[3].0, &lines[3].1);
    if counts_line.contains("V3000") {
        return Err(IoError::parse(StructureFormat::Sdf, *counts_line_no, "V3000 is not supported"));
    }
    let count = |range: std::ops::Range<usize>, what: &str| -> Result<usize, IoError> {
        counts_line
            .get(range)
            .unwrap_or("")
            .trim()
            .parse()
            .map_err(|_| IoError::parse(StructureFormat::Sdf, *counts_line_no, format!("invalid {what} count")))
    };
    let atom_count = count(0..3, "atom")?;
    let bond_count = count(3..6, "bond")?;
    let atom_start = 4;
    let bond_start = atom_start + atom_count;
    if lines.len() < bond_start + bond_count {
        return Err(IoError::parse(
            StructureFormat::Sdf,
            lines.last().map_or(*counts_line_no, |(ln, _)| *ln),
            "SDF block ended before atoms/bonds were fully specified",
        ));
    }

    let mut builder = MolecularTopologyBuilder::new();
    builder.start_chain(LIGAND_CHAIN_ID, ChainType::Ligand);
    builder.start_residue("1", residue_name)?;

    let mut ordinals: HashMap<Element, usize> = HashMap::new();
    for (serial, (ln, raw)) in lines[atom_start..bond_start].iter().enumerate() {
        let padded = format!("{raw:<40}");
        let coordinate = |range: std::ops::Range<usize>, axis: &str| -> Result<f64, IoError> {
            padded[range].trim().parse().map_err(|_| {
                IoError::parse(StructureFormat::Sdf, *ln, format!("invalid {axis} coordinate in atom line"))
            })
        };
        let position = Point3::new(coordinate(0..10, "x")?, coordinate(10..20, "y")?, coordinate(20..30, "z")?)
            * ANGSTROM_TO_NM;
        let symbol = padded[31..34].trim();
        let element: Element = symbol.parse().map_err(|_| {
            IoError::parse(StructureFormat::Sdf, *ln, format!("unknown element symbol '{symbol}'"))
        })?;
        let ordinal = ordinals.entry(element).or_insert(0);
        *ordinal += 1;
        let name = format!("{}{}", element.to_string().to_ascii_uppercase(), ordinal);
        builder.add_atom(serial + 1, &name, element, position)?;
    }

    for (ln, raw) in &lines[bond_start..bond_start + bond_count] {
        let field = |range: std::ops::Range<usize>| raw.get(range).unwrap_or("").trim();
        let parse_index = |value: &str| -> Result<usize, IoError> {
            value
                .parse::<usize>()
                .ok()
                .filter(|i| (1..=atom_count).contains(i))
                .ok_or_else(|| IoError::parse(StructureFormat::Sdf, *ln, format!("invalid atom index '{value}'")))
        };
        let a1 = parse_index(field(0..3))?;
        let a2 = parse_index(field(3..6))?;
        let order = field(6..9).parse().unwrap_or(BondOrder::Single);
        builder.add_bond_by_serial(a1, a2, order);
    }

    let mut metadata = SdfMetadata {
        title: lines[0].1.trim().to_string(),
        entry_index,
        properties: BTreeMap::new(),
    };
    let mut current_key: Option<String> = None;
    for (_, raw) in &lines[bond_start + bond_count..] {
        if let Some(rest) = raw.trim_start().strip_prefix('>') {
            current_key = rest
                .split('<')
                .nth(1)
                .and_then(|s| s.split('>').next())
                .map(str::to_string);
        } else if raw.trim().is_empty() {
            current_key = None;
        } else if let Some(key) = &current_key {
            let entry = metadata.properties.entry(key.clone()).or_default();
            if !entry.is_empty() {
                entry.push('\n');
            }
            entry.push_str(raw.trim());
        }
    }

    let (topology, positions) = builder.build()?;
    Ok((topology, positions, metadata))
}
