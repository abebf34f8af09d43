use super::traits::MolecularFile;
use super::{ANGSTROM_TO_NM, IoError, StructureFormat, chain_type_for_residue};
use crate::core::models::Coordinates;
use crate::core::models::atom::Element;
use crate::core::models::builder::MolecularTopologyBuilder;
use crate::core::models::chain::ChainType;
use crate::core::models::system::MolecularTopology;
use crate::core::models::topology::BondOrder;
use nalgebra::{Point3, Vector3};
use std::io::{BufRead, Write};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PdbMetadata {
    pub header_lines: Vec<String>,
}

fn slice_and_trim(line: &str, start: usize, end: usize) -> &str {
    line.get(start..end.min(line.len())).unwrap_or("").trim()
}

fn parse_float(line: &str, start: usize, end: usize, line_num: usize, field: &str) -> Result<f64, IoError> {
    let value = slice_and_trim(line, start, end);
    value.parse().map_err(|_| {
        IoError::parse(
            StructureFormat::Pdb,
            line_num,
            format!("invalid {field} in columns {}-{} (value: '{value}')", start + 1, end),
        )
    })
}

/// Converts unit-cell lengths (nm) and angles (degrees) into triclinic box vectors.
pub(crate) fn box_vectors_from_cell(lengths: [f64; 3], angles_deg: [f64; 3]) -> [Vector3<f64>; 3] {
    let [a, b, c] = lengths;
    let [alpha, beta, gamma] = angles_deg.map(f64::to_radians);
    let bx = b * gamma.cos();
    let by = b * gamma.sin();
    let cx = c * beta.cos();
    let cy = c * (alpha.cos() - beta.cos() * gamma.cos()) / gamma.sin();
    let cz = (c * c - cx * cx - cy * cy).max(0.0).sqrt();
    let clean = |v: f64| if v.abs() < 1e-12 { 0.0 } else { v };
    [
        Vector3::new(a, 0.0, 0.0),
        Vector3::new(clean(bx), clean(by), 0.0),
        Vector3::new(clean(cx), clean(cy), clean(cz)),
    ]
}

pub struct PdbFile;

impl MolecularFile for PdbFile {
    type Metadata = PdbMetadata;
    type Error = IoError;

    fn read_from(
        reader: &mut impl BufRead,
    ) -> Result<(MolecularTopology, Coordinates, Self::Metadata), Self::Error> {
        let mut builder = MolecularTopologyBuilder::new();
        let mut metadata = PdbMetadata::default();

        for (line_num, line_res) in reader.lines().enumerate() {
            let line = line_res?;
            let line_num = line_num + 1;
            let record_type = slice_and_trim(&line, 0, 6);

            match record_type {
                "ATOM" | "HETATM" => {
                    if line.len() < 54 {
                        return Err(IoError::parse(
                            StructureFormat::Pdb,
                            line_num,
                            "ATOM/HETATM record is shorter than 54 columns",
                        ));
                    }
                    let alt_loc = slice_and_trim(&line, 16, 17);
                    if !alt_loc.is_empty() && alt_loc != "A" {
                        continue;
                    }
                    let serial_str = slice_and_trim(&line, 6, 11);
                    let serial: usize = serial_str.parse().map_err(|_| {
                        IoError::parse(
                            StructureFormat::Pdb,
                            line_num,
                            format!("invalid atom serial '{serial_str}'"),
                        )
                    })?;
                    let name = slice_and_trim(&line, 12, 16);
                    if name.is_empty() {
                        return Err(IoError::parse(StructureFormat::Pdb, line_num, "atom name is empty"));
                    }
                    let res_name = slice_and_trim(&line, 17, 21);
                    let chain_id = match slice_and_trim(&line, 21, 22) {
                        "" => "A",
                        id => id,
                    };
                    let res_seq = slice_and_trim(&line, 22, 26);
                    let insertion = slice_and_trim(&line, 26, 27);
                    let residue_number = format!("{res_seq}{insertion}");

                    let x = parse_float(&line, 30, 38, line_num, "x coordinate")?;
                    let y = parse_float(&line, 38, 46, line_num, "y coordinate")?;
                    let z = parse_float(&line, 46, 54, line_num, "z coordinate")?;
                    let element = match slice_and_trim(&line, 76, 78) {
                        "" => Element::guess_from_atom_name(name),
                        symbol => symbol.parse().unwrap_or_else(|_| Element::guess_from_atom_name(name)),
                    };

                    builder.start_chain(chain_id, chain_type_for_residue(res_name));
                    builder.start_residue(&residue_number, res_name)?;
                    builder.add_atom(
                        serial,
                        name,
                        element,
                        Point3::new(x, y, z) * ANGSTROM_TO_NM,
                    )?;
                }
                "CONECT" => {
                    let serials: Vec<usize> = [(6, 11), (11, 16), (16, 21), (21, 26), (26, 31)]
                        .iter()
                        .map(|&(start, end)| slice_and_trim(&line, start, end))
                        .filter(|field| !field.is_empty())
                        .map(|field| {
                            field.parse().map_err(|_| {
                                IoError::parse(
                                    StructureFormat::Pdb,
                                    line_num,
                                    format!("invalid CONECT serial '{field}'"),
                                )
                            })
                        })
                        .collect::<Result<_, _>>()?;
                    if let Some((first, partners)) = serials.split_first() {
                        for partner in partners {
                            builder.add_bond_by_serial(*first, *partner, BondOrder::Single);
                        }
                    }
                }
                "CRYST1" => {
                    let lengths = [
                        parse_float(&line, 6, 15, line_num, "cell length a")?,
                        parse_float(&line, 15, 24, line_num, "cell length b")?,
                        parse_float(&line, 24, 33, line_num, "cell length c")?,
                    ];
                    let angles = [
                        parse_float(&line, 33, 40, line_num, "cell angle alpha")?,
                        parse_float(&line, 40, 47, line_num, "cell angle beta")?,
                        parse_float(&line, 47, 54, line_num, "cell angle gamma")?,
                    ];
                    builder.box_vectors(box_vectors_from_cell(
                        lengths.map(|l| l * ANGSTROM_TO_NM),
                        angles,
                    ));
                }
                "ENDMDL" | "END" => break,
                "HEADER" | "TITLE" | "REMARK" | "COMPND" => {
                    metadata.header_lines.push(line.clone());
                }
                _ => {}
            }
        }

        let (topology, positions) = builder.build()?;
        Ok((topology, positions, metadata))
    }
}

impl PdbFile {
    /// Writes a topology and its coordinates as PDB records.
    ///
    /// Coordinates are converted back to Ångström. Serial numbers wrap at 100000 as
    /// the fixed-column format requires; CONECT records are written for atoms outside
    /// protein chains.
    pub fn write_to(
        topology: &MolecularTopology,
        positions: &[Point3<f64>],
        writer: &mut impl Write,
    ) -> Result<(), IoError> {
        if positions.len() != topology.atom_count() {
            return Err(IoError::parse(
                StructureFormat::Pdb,
                0,
                format!(
                    "{} positions given for {} atoms",
                    positions.len(),
                    topology.atom_count()
                ),
            ));
        }
        if let Some(vectors) = topology.box_vectors() {
            let lengths = vectors.map(|v| v.norm() / ANGSTROM_TO_NM);
            let angle = |u: &Vector3<f64>, v: &Vector3<f64>| u.angle(v).to_degrees();
            writeln!(
                writer,
                "CRYST1{:9.3}{:9.3}{:9.3}{:7.2}{:7.2}{:7.2} P 1           1",
                lengths[0],
                lengths[1],
                lengths[2],
                angle(&vectors[1], &vectors[2]),
                angle(&vectors[0], &vectors[2]),
                angle(&vectors[0], &vectors[1]),
            )?;
        }

        let mut serials = vec![0usize; topology.atom_count()];
        let mut serial = 0usize;
        for (_, chain) in topology.chains_iter() {
            let record = if chain.chain_type == ChainType::Protein {
                "ATOM  "
            } else {
                "HETATM"
            };
            let chain_label = chain.id.chars().next().unwrap_or('A');
            for residue_id in chain.residues() {
                let Some(residue) = topology.residue(*residue_id) else {
                    continue;
                };
                let (res_seq, insertion) = split_residue_number(&residue.number);
                for index in residue.atoms() {
                    serial += 1;
                    serials[*index] = serial;
                    let atom = &topology.atoms()[*index];
                    let name = if atom.name.len() < 4 {
                        format!(" {:<3}", atom.name)
                    } else {
                        atom.name.clone()
                    };
                    let p = positions[*index] / ANGSTROM_TO_NM;
                    writeln!(
                        writer,
                        "{record}{:>5} {:<4} {:>3} {}{:>4}{}   {:8.3}{:8.3}{:8.3}{:6.2}{:6.2}          {:>2}",
                        serial % 100_000,
                        name,
                        residue.name,
                        chain_label,
                        res_seq,
                        insertion,
                        p.x,
                        p.y,
                        p.z,
                        1.0,
                        0.0,
                        atom.element.to_string().to_ascii_uppercase(),
                    )?;
                }
            }
            writeln!(writer, "TER")?;
        }

        for bond in topology.bonds() {
            let hetero = [bond.atom1, bond.atom2].iter().any(|index| {
                topology
                    .residue_of(*index)
                    .and_then(|residue| topology.chain(residue.chain_id))
                    .is_some_and(|chain| chain.chain_type != ChainType::Protein)
            });
            if hetero {
                writeln!(
                    writer,
                    "CONECT{:>5}{:>5}",
                    serials[bond.atom1] % 100_000,
                    serials[bond.atom2] % 100_000
                )?;
            }
        }
        writeln!(writer, "END")?;
        Ok(())
    }
}

fn split_residue_number(number: &str) -> (&str, &str) {
    match number.char_indices().last() {
        Some((pos, c)) if c.is_ascii_alphabetic() => (&number[..pos], &number[pos..]),
        _ => (number, " "),
    }
}
