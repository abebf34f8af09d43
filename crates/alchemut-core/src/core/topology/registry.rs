use crate::core::models::atom::Element;
use serde::Deserialize;
use std::collections::HashMap;

/// One atom of a residue template: its name, force-field type and partial charge.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct TemplateAtom {
    pub name: String,
    #[serde(rename = "type")]
    pub atom_type: String,
    pub charge: f64,
    #[serde(default)]
    pub element: Option<String>,
}

impl TemplateAtom {
    /// The element declared on the template atom, or the one implied by its name.
    pub fn element(&self) -> Element {
        self.element
            .as_deref()
            .and_then(|symbol| symbol.parse().ok())
            .unwrap_or_else(|| Element::guess_from_atom_name(&self.name))
    }
}

/// Chemical template of a residue (or small molecule) as described in a force-field file.
///
/// `external_bonds` lists the atoms that link to the neighbouring residues of the
/// same chain, in chain direction: the first entry bonds to the previous residue
/// and the last entry to the next one.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ResidueTemplate {
    pub atoms: Vec<TemplateAtom>,
    #[serde(default)]
    pub bonds: Vec<[String; 2]>,
    #[serde(default)]
    pub external_bonds: Vec<String>,
}

impl ResidueTemplate {
    pub fn atom(&self, name: &str) -> Option<&TemplateAtom> {
        self.atoms.iter().find(|atom| atom.name == name)
    }

    pub fn has_atom(&self, name: &str) -> bool {
        self.atom(name).is_some()
    }

    pub fn atom_names(&self) -> impl Iterator<Item = &str> {
        self.atoms.iter().map(|atom| atom.name.as_str())
    }

    /// Sum of the template's partial charges.
    pub fn net_charge(&self) -> f64 {
        self.atoms.iter().map(|atom| atom.charge).sum()
    }

    /// Atom bonding to the previous residue of the chain, if any.
    pub fn head_atom(&self) -> Option<&str> {
        self.external_bonds.first().map(String::as_str)
    }

    /// Atom bonding to the next residue of the chain, if any.
    pub fn tail_atom(&self) -> Option<&str> {
        self.external_bonds.last().map(String::as_str)
    }
}

/// Residue templates keyed by residue name.
#[derive(Debug, Clone, Default)]
pub struct TemplateRegistry {
    templates: HashMap<String, ResidueTemplate>,
}

impl TemplateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, residue_name: &str) -> Option<&ResidueTemplate> {
        self.templates.get(residue_name)
    }

    /// Inserts a template, replacing any earlier template of the same name.
    pub fn insert(&mut self, residue_name: &str, template: ResidueTemplate) {
        self.templates.insert(residue_name.to_string(), template);
    }

    pub fn extend(&mut self, templates: HashMap<String, ResidueTemplate>) {
        self.templates.extend(templates);
    }

    pub fn contains(&self, residue_name: &str) -> bool {
        self.templates.contains_key(residue_name)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SERINE: &str = r#"
        atoms = [
            { name = "N", type = "N", charge = -0.4157 },
            { name = "CA", type = "CT", charge = -0.0249 },
            { name = "OG", type = "OH", charge = -0.6546 },
            { name = "HG", type = "HO", charge = 0.4275, element = "H" },
        ]
        bonds = [["N", "CA"], ["CA", "OG"], ["OG", "HG"]]
        external_bonds = ["N", "C"]
    "#;

    fn serine() -> ResidueTemplate {
        toml::from_str(SERINE).unwrap()
    }

    #[test]
    fn template_parses_atoms_bonds_and_links() {
        let template = serine();
        assert_eq!(template.atoms.len(), 4);
        assert_eq!(template.bonds[1], ["CA".to_string(), "OG".to_string()]);
        assert_eq!(template.head_atom(), Some("N"));
        assert_eq!(template.tail_atom(), Some("C"));
    }

    #[test]
    fn atom_lookup_and_net_charge() {
        let template = serine();
        assert!(template.has_atom("OG"));
        assert!(!template.has_atom("CB"));
        assert_eq!(template.atom("HG").unwrap().atom_type, "HO");
        assert!((template.net_charge() - (-0.6677)).abs() < 1e-9);
    }

    #[test]
    fn element_prefers_declared_symbol_over_name() {
        let template = serine();
        assert_eq!(template.atom("HG").unwrap().element(), Element::H);
        assert_eq!(template.atom("OG").unwrap().element(), Element::O);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let result: Result<ResidueTemplate, _> =
            toml::from_str("atoms = []\nanchor_atoms = [\"N\"]");
        assert!(result.is_err());
    }

    #[test]
    fn registry_insert_replaces_existing_template() {
        let mut registry = TemplateRegistry::new();
        registry.insert("SER", serine());
        let mut replacement = serine();
        replacement.atoms.pop();
        registry.insert("SER", replacement);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("SER").unwrap().atoms.len(), 3);
        assert!(registry.get("ALA").is_none());
    }
}
