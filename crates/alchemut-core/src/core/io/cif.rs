use super::pdb::box_vectors_from_cell;
use super::traits::MolecularFile;
use super::{ANGSTROM_TO_NM, IoError, StructureFormat, chain_type_for_residue};
use crate::core::models::Coordinates;
use crate::core::models::atom::Element;
use crate::core::models::builder::MolecularTopologyBuilder;
use crate::core::models::system::MolecularTopology;
use nalgebra::Point3;
use std::collections::HashMap;
use std::io::BufRead;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CifMetadata {
    pub data_block: String,
    pub entry_id: Option<String>,
}

/// Splits a CIF data line into tokens, honouring single and double quotes.
fn tokenize(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut chars = line.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        if c == '#' {
            break;
        }
        if c == '\'' || c == '"' {
            chars.next();
            let mut token = String::new();
            while let Some(next) = chars.next() {
                if next == c && chars.peek().is_none_or(|after| after.is_whitespace()) {
                    break;
                }
                token.push(next);
            }
            tokens.push(token);
        } else {
            let mut token = String::new();
            while let Some(&next) = chars.peek() {
                if next.is_whitespace() {
                    break;
                }
                token.push(next);
                chars.next();
            }
            tokens.push(token);
        }
    }
    tokens
}

fn is_null(value: &str) -> bool {
    value == "?" || value == "."
}

struct AtomSiteColumns {
    index: HashMap<String, usize>,
}

impl AtomSiteColumns {
    fn get<'a>(&self, row: &'a [String], names: &[&str]) -> Option<&'a str> {
        names
            .iter()
            .filter_map(|name| self.index.get(*name))
            .map(|i| row[*i].as_str())
            .find(|value| !is_null(value))
    }
}

pub struct CifFile;

impl MolecularFile for CifFile {
    type Metadata = CifMetadata;
    type Error = IoError;

    fn read_from(
        reader: &mut impl BufRead,
    ) -> Result<(MolecularTopology, Coordinates, Self::Metadata), Self::Error> {
        let mut builder = MolecularTopologyBuilder::new();
        let mut metadata = CifMetadata::default();
        let mut cell: HashMap<&'static str, f64> = HashMap::new();

        let mut in_loop_header = false;
        let mut columns: Vec<String> = Vec::new();
        let mut atom_site: Option<AtomSiteColumns> = None;
        let mut pending: Vec<String> = Vec::new();
        let mut in_text_field = false;
        let mut first_model: Option<String> = None;

        for (line_num, line_res) in reader.lines().enumerate() {
            let line = line_res?;
            let line_num = line_num + 1;

            if line.starts_with(';') {
                in_text_field = !in_text_field;
                continue;
            }
            if in_text_field {
                continue;
            }
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            if let Some(name) = trimmed.strip_prefix("data_") {
                metadata.data_block = name.to_string();
                continue;
            }
            if trimmed == "loop_" {
                in_loop_header = true;
                columns.clear();
                atom_site = None;
                pending.clear();
                continue;
            }
            if trimmed.starts_with('_') {
                if in_loop_header {
                    columns.push(trimmed.split_whitespace().next().unwrap_or("").to_string());
                    continue;
                }
                atom_site = None;
                let tokens = tokenize(trimmed);
                if let [key, value, ..] = tokens.as_slice() {
                    let parsed = value.parse::<f64>().ok();
                    match (key.as_str(), parsed) {
                        ("_entry.id", _) => metadata.entry_id = Some(value.clone()),
                        ("_cell.length_a", Some(v)) => {
                            cell.insert("a", v);
                        }
                        ("_cell.length_b", Some(v)) => {
                            cell.insert("b", v);
                        }
                        ("_cell.length_c", Some(v)) => {
                            cell.insert("c", v);
                        }
                        ("_cell.angle_alpha", Some(v)) => {
                            cell.insert("alpha", v);
                        }
                        ("_cell.angle_beta", Some(v)) => {
                            cell.insert("beta", v);
                        }
                        ("_cell.angle_gamma", Some(v)) => {
                            cell.insert("gamma", v);
                        }
                        _ => {}
                    }
                }
                continue;
            }

            if in_loop_header {
                in_loop_header = false;
                if columns.iter().any(|c| c.starts_with("_atom_site.")) {
                    let index = columns
                        .iter()
                        .enumerate()
                        .map(|(i, c)| (c.trim_start_matches("_atom_site.").to_string(), i))
                        .collect();
                    atom_site = Some(AtomSiteColumns { index });
                }
            }

            let Some(site) = atom_site.as_ref() else {
                continue;
            };
            pending.extend(tokenize(trimmed));
            if pending.len() < columns.len() {
                continue;
            }
            let row: Vec<String> = pending.drain(..).collect();
            if row.len() > columns.len() {
                return Err(IoError::parse(
                    StructureFormat::Cif,
                    line_num,
                    format!("atom_site row has {} values for {} columns", row.len(), columns.len()),
                ));
            }

            if let Some(model) = site.get(&row, &["pdbx_PDB_model_num"]) {
                match &first_model {
                    None => first_model = Some(model.to_string()),
                    Some(first) if first != model => continue,
                    _ => {}
                }
            }
            if let Some(alt) = site.get(&row, &["label_alt_id"]) {
                if alt != "A" {
                    continue;
                }
            }

            let missing = |field: &str| {
                IoError::parse(StructureFormat::Cif, line_num, format!("atom_site row lacks {field}"))
            };
            let serial: usize = site
                .get(&row, &["id"])
                .ok_or_else(|| missing("id"))?
                .parse()
                .map_err(|_| IoError::parse(StructureFormat::Cif, line_num, "atom id is not an integer"))?;
            let name = site
                .get(&row, &["auth_atom_id", "label_atom_id"])
                .ok_or_else(|| missing("atom name"))?;
            let res_name = site
                .get(&row, &["auth_comp_id", "label_comp_id"])
                .ok_or_else(|| missing("residue name"))?;
            let chain_id = site
                .get(&row, &["auth_asym_id", "label_asym_id"])
                .ok_or_else(|| missing("chain id"))?;
            let res_seq = site
                .get(&row, &["auth_seq_id", "label_seq_id"])
                .unwrap_or("1");
            let insertion = site.get(&row, &["pdbx_PDB_ins_code"]).unwrap_or("");
            let coordinate = |field: &str| -> Result<f64, IoError> {
                site.get(&row, &[field])
                    .ok_or_else(|| missing(field))?
                    .parse()
                    .map_err(|_| IoError::parse(StructureFormat::Cif, line_num, format!("invalid {field}")))
            };
            let position = Point3::new(
                coordinate("Cartn_x")?,
                coordinate("Cartn_y")?,
                coordinate("Cartn_z")?,
            ) * ANGSTROM_TO_NM;
            let element = site
                .get(&row, &["type_symbol"])
                .and_then(|symbol| symbol.parse().ok())
                .unwrap_or_else(|| Element::guess_from_atom_name(name));

            builder.start_chain(chain_id, chain_type_for_residue(res_name));
            builder.start_residue(&format!("{res_seq}{insertion}"), res_name)?;
            builder.add_atom(serial, name, element, position)?;
        }

        if let (Some(a), Some(b), Some(c)) = (cell.get("a"), cell.get("b"), cell.get("c")) {
            let angle = |key| cell.get(key).copied().unwrap_or(90.0);
            builder.box_vectors(box_vectors_from_cell(
                [*a, *b, *c].map(|l| l * ANGSTROM_TO_NM),
                [angle("alpha"), angle("beta"), angle("gamma")],
            ));
        }

        let (topology, positions) = builder.build()?;
        Ok((topology, positions, metadata))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const SMALL_CIF: &str = "\
data_TEST
_entry.id TEST
_cell.length_a 40.0
_cell.length_b 40.0
_cell.length_c 40.0
#
loop_
_atom_site.group_PDB
_atom_site.id
_atom_site.type_symbol
_atom_site.label_atom_id
_atom_site.label_alt_id
_atom_site.label_comp_id
_atom_site.label_asym_id
_atom_site.label_seq_id
_atom_site.pdbx_PDB_ins_code
_atom_site.Cartn_x
_atom_site.Cartn_y
_atom_site.Cartn_z
_atom_site.auth_seq_id
_atom_site.auth_asym_id
_atom_site.pdbx_PDB_model_num
ATOM 1 N N . ALA A 1 ? -0.677 -1.230 -0.491 10 A 1
ATOM 2 C CA . ALA A 1 ? -0.001 0.064 -0.491 10 A 1
ATOM 3 C C . ALA A 1 ? 1.499 -0.110 -0.491 10 A 1
ATOM 4 O O . ALA A 1 ? 2.0 0.9 -0.5 10 A 1
HETATM 5 O O . HOH B . ? 5.0 5.0 5.0 201 B 1
ATOM 6 N N . ALA A 1 ? 9.0 9.0 9.0 10 A 2
#
";

    #[test]
    fn reads_atom_site_loop_preferring_author_numbering() {
        let (topology, positions, metadata) = CifFile::read_from(&mut Cursor::new(SMALL_CIF)).unwrap();
        assert_eq!(metadata.data_block, "TEST");
        assert_eq!(metadata.entry_id.as_deref(), Some("TEST"));
        assert_eq!(topology.atom_count(), 5, "second model must be ignored");
        assert_eq!(positions.len(), 5);

        let chain = topology.find_chain("A").unwrap();
        let residue = topology.find_residue(chain, "10").unwrap();
        assert_eq!(topology.residue(residue).unwrap().atoms().len(), 4);
        assert!(topology.is_water_atom(4));
    }

    #[test]
    fn cell_becomes_box_vectors_in_nanometres() {
        let (topology, _, _) = CifFile::read_from(&mut Cursor::new(SMALL_CIF)).unwrap();
        let vectors = topology.box_vectors().unwrap();
        assert!((vectors[2].z - 4.0).abs() < 1e-9);
    }

    #[test]
    fn tokenizer_honours_quotes() {
        assert_eq!(tokenize("ATOM 1 \"O5'\" 'a b' x"), vec!["ATOM", "1", "O5'", "a b", "x"]);
    }

    #[test]
    fn malformed_coordinate_is_reported_with_line() {
        let content = "\
data_BAD
loop_
_atom_site.id
_atom_site.label_atom_id
_atom_site.label_comp_id
_atom_site.label_asym_id
_atom_site.Cartn_x
_atom_site.Cartn_y
_atom_site.Cartn_z
1 N ALA A abc 0.0 0.0
";
        let err = CifFile::read_from(&mut Cursor::new(content)).unwrap_err();
        assert!(matches!(err, IoError::Parse { line: 10, .. }));
    }
}
