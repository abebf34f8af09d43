//! Shared fixtures: a small Amber-like force field and a capped alanine peptide.

use crate::core::forcefield::parameterization::TemplateSystemGenerator;
use crate::core::forcefield::params::Forcefield;
use crate::core::models::Coordinates;
use crate::core::models::atom::Element;
use crate::core::models::chain::ChainType;
use crate::core::models::system::MolecularTopology;
use nalgebra::{Point3, Vector3};
use std::path::Path;

pub const FIXTURE_FORCEFIELD: &str = r#"
[nonbonded]
coulomb14_scale = 0.8333333333
lj14_scale = 0.5

[atom_types]
N = { sigma = 0.325, epsilon = 0.71128 }
H = { sigma = 0.106908, epsilon = 0.0656888 }
CT = { sigma = 0.339967, epsilon = 0.4577296 }
H1 = { sigma = 0.247135, epsilon = 0.0656888 }
HC = { sigma = 0.264953, epsilon = 0.0656888 }
C = { sigma = 0.339967, epsilon = 0.359824 }
O = { sigma = 0.295992, epsilon = 0.87864 }
OH = { sigma = 0.306647, epsilon = 0.880314 }
HO = { sigma = 0.0, epsilon = 0.0 }
O2 = { sigma = 0.295992, epsilon = 0.87864 }
CA = { sigma = 0.339967, epsilon = 0.359824 }
HA = { sigma = 0.259964, epsilon = 0.06276 }
N3 = { sigma = 0.325, epsilon = 0.71128 }
HP = { sigma = 0.195998, epsilon = 0.0656888 }
OW = { sigma = 0.315061, epsilon = 0.636386 }
HW = { sigma = 0.0, epsilon = 0.0 }
"Na+" = { sigma = 0.2439281, epsilon = 0.36585 }
"Cl-" = { sigma = 0.4477657, epsilon = 0.14891 }

[residues.ACE]
atoms = [
    { name = "HH31", type = "HC", charge = 0.1123 },
    { name = "CH3", type = "CT", charge = -0.3662 },
    { name = "HH32", type = "HC", charge = 0.1123 },
    { name = "HH33", type = "HC", charge = 0.1123 },
    { name = "C", type = "C", charge = 0.5972 },
    { name = "O", type = "O", charge = -0.5679 },
]
bonds = [["HH31", "CH3"], ["CH3", "HH32"], ["CH3", "HH33"], ["CH3", "C"], ["C", "O"]]
external_bonds = ["C"]

[residues.ALA]
atoms = [
    { name = "N", type = "N", charge = -0.4157 },
    { name = "H", type = "H", charge = 0.2719 },
    { name = "CA", type = "CT", charge = 0.0337 },
    { name = "HA", type = "H1", charge = 0.0823 },
    { name = "CB", type = "CT", charge = -0.1825 },
    { name = "HB1", type = "HC", charge = 0.0603 },
    { name = "HB2", type = "HC", charge = 0.0603 },
    { name = "HB3", type = "HC", charge = 0.0603 },
    { name = "C", type = "C", charge = 0.5973 },
    { name = "O", type = "O", charge = -0.5679 },
]
bonds = [["N", "H"], ["N", "CA"], ["CA", "HA"], ["CA", "CB"], ["CB", "HB1"], ["CB", "HB2"], ["CB", "HB3"], ["CA", "C"], ["C", "O"]]
external_bonds = ["N", "C"]

[residues.SER]
atoms = [
    { name = "N", type = "N", charge = -0.4157 },
    { name = "H", type = "H", charge = 0.2719 },
    { name = "CA", type = "CT", charge = -0.0249 },
    { name = "HA", type = "H1", charge = 0.0843 },
    { name = "CB", type = "CT", charge = 0.2117 },
    { name = "HB2", type = "H1", charge = 0.0352 },
    { name = "HB3", type = "H1", charge = 0.0352 },
    { name = "OG", type = "OH", charge = -0.6546 },
    { name = "HG", type = "HO", charge = 0.4275 },
    { name = "C", type = "C", charge = 0.5973 },
    { name = "O", type = "O", charge = -0.5679 },
]
bonds = [["N", "H"], ["N", "CA"], ["CA", "HA"], ["CA", "CB"], ["CB", "HB2"], ["CB", "HB3"], ["CB", "OG"], ["OG", "HG"], ["CA", "C"], ["C", "O"]]
external_bonds = ["N", "C"]

[residues.ASP]
atoms = [
    { name = "N", type = "N", charge = -0.5163 },
    { name = "H", type = "H", charge = 0.2936 },
    { name = "CA", type = "CT", charge = 0.0381 },
    { name = "HA", type = "H1", charge = 0.0880 },
    { name = "CB", type = "CT", charge = -0.0303 },
    { name = "HB2", type = "HC", charge = -0.0122 },
    { name = "HB3", type = "HC", charge = -0.0122 },
    { name = "CG", type = "C", charge = 0.7994 },
    { name = "OD1", type = "O2", charge = -0.8014 },
    { name = "OD2", type = "O2", charge = -0.8014 },
    { name = "C", type = "C", charge = 0.5366 },
    { name = "O", type = "O", charge = -0.5819 },
]
bonds = [["N", "H"], ["N", "CA"], ["CA", "HA"], ["CA", "CB"], ["CB", "HB2"], ["CB", "HB3"], ["CB", "CG"], ["CG", "OD1"], ["CG", "OD2"], ["CA", "C"], ["C", "O"]]
external_bonds = ["N", "C"]

[residues.PHE]
atoms = [
    { name = "N", type = "N", charge = -0.4157 },
    { name = "H", type = "H", charge = 0.2719 },
    { name = "CA", type = "CT", charge = -0.0024 },
    { name = "HA", type = "H1", charge = 0.0978 },
    { name = "CB", type = "CT", charge = -0.0343 },
    { name = "HB2", type = "HC", charge = 0.0295 },
    { name = "HB3", type = "HC", charge = 0.0295 },
    { name = "CG", type = "CA", charge = 0.0118 },
    { name = "CD1", type = "CA", charge = -0.1256 },
    { name = "HD1", type = "HA", charge = 0.1330 },
    { name = "CE1", type = "CA", charge = -0.1704 },
    { name = "HE1", type = "HA", charge = 0.1430 },
    { name = "CZ", type = "CA", charge = -0.1072 },
    { name = "HZ", type = "HA", charge = 0.1297 },
    { name = "CE2", type = "CA", charge = -0.1704 },
    { name = "HE2", type = "HA", charge = 0.1430 },
    { name = "CD2", type = "CA", charge = -0.1256 },
    { name = "HD2", type = "HA", charge = 0.1330 },
    { name = "C", type = "C", charge = 0.5973 },
    { name = "O", type = "O", charge = -0.5679 },
]
bonds = [
    ["N", "H"], ["N", "CA"], ["CA", "HA"], ["CA", "CB"], ["CB", "HB2"], ["CB", "HB3"], ["CB", "CG"],
    ["CG", "CD1"], ["CD1", "HD1"], ["CD1", "CE1"], ["CE1", "HE1"], ["CE1", "CZ"], ["CZ", "HZ"],
    ["CZ", "CE2"], ["CE2", "HE2"], ["CE2", "CD2"], ["CD2", "HD2"], ["CD2", "CG"], ["CA", "C"], ["C", "O"],
]
external_bonds = ["N", "C"]

[residues.LYS]
atoms = [
    { name = "N", type = "N", charge = -0.3479 },
    { name = "H", type = "H", charge = 0.2747 },
    { name = "CA", type = "CT", charge = -0.2400 },
    { name = "HA", type = "H1", charge = 0.1426 },
    { name = "CB", type = "CT", charge = -0.0094 },
    { name = "HB2", type = "HC", charge = 0.0362 },
    { name = "HB3", type = "HC", charge = 0.0362 },
    { name = "CG", type = "CT", charge = 0.0187 },
    { name = "HG2", type = "HC", charge = 0.0103 },
    { name = "HG3", type = "HC", charge = 0.0103 },
    { name = "CD", type = "CT", charge = -0.0479 },
    { name = "HD2", type = "HC", charge = 0.0621 },
    { name = "HD3", type = "HC", charge = 0.0621 },
    { name = "CE", type = "CT", charge = -0.0143 },
    { name = "HE2", type = "HP", charge = 0.1135 },
    { name = "HE3", type = "HP", charge = 0.1135 },
    { name = "NZ", type = "N3", charge = -0.3854 },
    { name = "HZ1", type = "H", charge = 0.3400 },
    { name = "HZ2", type = "H", charge = 0.3400 },
    { name = "HZ3", type = "H", charge = 0.3400 },
    { name = "C", type = "C", charge = 0.7341 },
    { name = "O", type = "O", charge = -0.5894 },
]
bonds = [
    ["N", "H"], ["N", "CA"], ["CA", "HA"], ["CA", "CB"], ["CB", "HB2"], ["CB", "HB3"], ["CB", "CG"],
    ["CG", "HG2"], ["CG", "HG3"], ["CG", "CD"], ["CD", "HD2"], ["CD", "HD3"], ["CD", "CE"],
    ["CE", "HE2"], ["CE", "HE3"], ["CE", "NZ"], ["NZ", "HZ1"], ["NZ", "HZ2"], ["NZ", "HZ3"],
    ["CA", "C"], ["C", "O"],
]
external_bonds = ["N", "C"]

[residues.NME]
atoms = [
    { name = "N", type = "N", charge = -0.4157 },
    { name = "H", type = "H", charge = 0.2719 },
    { name = "CH3", type = "CT", charge = -0.149 },
    { name = "HH31", type = "H1", charge = 0.0976 },
    { name = "HH32", type = "H1", charge = 0.0976 },
    { name = "HH33", type = "H1", charge = 0.0976 },
]
bonds = [["N", "H"], ["N", "CH3"], ["CH3", "HH31"], ["CH3", "HH32"], ["CH3", "HH33"]]
external_bonds = ["N"]

[residues.HOH]
atoms = [
    { name = "O", type = "OW", charge = -0.834 },
    { name = "H1", type = "HW", charge = 0.417 },
    { name = "H2", type = "HW", charge = 0.417 },
]
bonds = [["O", "H1"], ["O", "H2"]]

[residues.NA]
atoms = [{ name = "NA", type = "Na+", charge = 1.0, element = "Na" }]

[residues.CL]
atoms = [{ name = "CL", type = "Cl-", charge = -1.0, element = "Cl" }]

[[bonds]]
types = ["CT", "HC"]
length = 0.109
k = 284512.0

[[bonds]]
types = ["CT", "H1"]
length = 0.109
k = 284512.0

[[bonds]]
types = ["CT", "CT"]
length = 0.1526
k = 259408.0

[[bonds]]
types = ["CT", "N"]
length = 0.1449
k = 282001.6

[[bonds]]
types = ["C", "N"]
length = 0.1335
k = 410032.0

[[bonds]]
types = ["N", "H"]
length = 0.101
k = 363171.2

[[bonds]]
types = ["C", "CT"]
length = 0.1522
k = 265265.6

[[bonds]]
types = ["C", "O"]
length = 0.1229
k = 476976.0

[[bonds]]
types = ["CT", "OH"]
length = 0.141
k = 267776.0

[[bonds]]
types = ["OH", "HO"]
length = 0.096
k = 462750.4

[[bonds]]
types = ["C", "O2"]
length = 0.125
k = 548940.8

[[bonds]]
types = ["OW", "HW"]
length = 0.09572
k = 462750.4

[[bonds]]
types = ["CT", "CA"]
length = 0.151
k = 265265.6

[[bonds]]
types = ["CA", "CA"]
length = 0.14
k = 392459.2

[[bonds]]
types = ["CA", "HA"]
length = 0.108
k = 307105.6

[[bonds]]
types = ["CT", "HP"]
length = 0.109
k = 284512.0

[[bonds]]
types = ["CT", "N3"]
length = 0.1471
k = 307105.6

[[bonds]]
types = ["N3", "H"]
length = 0.101
k = 363171.2

[[angles]]
types = ["HC", "CT", "HC"]
angle = 1.8814649
k = 292.88

[[angles]]
types = ["H1", "CT", "H1"]
angle = 1.8814649
k = 292.88

[[angles]]
types = ["HC", "CT", "CT"]
angle = 1.9111355
k = 418.4

[[angles]]
types = ["HC", "CT", "C"]
angle = 1.9111355
k = 418.4

[[angles]]
types = ["H1", "CT", "N"]
angle = 1.9111355
k = 418.4

[[angles]]
types = ["H1", "CT", "C"]
angle = 1.9111355
k = 418.4

[[angles]]
types = ["H1", "CT", "CT"]
angle = 1.9111355
k = 418.4

[[angles]]
types = ["H1", "CT", "OH"]
angle = 1.9111355
k = 418.4

[[angles]]
types = ["CT", "CT", "N"]
angle = 1.9146261
k = 669.44

[[angles]]
types = ["CT", "CT", "C"]
angle = 1.9390607
k = 527.184

[[angles]]
types = ["N", "CT", "C"]
angle = 1.9216075
k = 527.184

[[angles]]
types = ["CT", "C", "O"]
angle = 2.1013764
k = 669.44

[[angles]]
types = ["CT", "C", "N"]
angle = 2.0350539
k = 585.76

[[angles]]
types = ["O", "C", "N"]
angle = 2.1450096
k = 669.44

[[angles]]
types = ["C", "N", "H"]
angle = 2.0943951
k = 418.4

[[angles]]
types = ["C", "N", "CT"]
angle = 2.1275564
k = 418.4

[[angles]]
types = ["H", "N", "CT"]
angle = 2.0594885
k = 418.4

[[angles]]
types = ["CT", "CT", "OH"]
angle = 1.9111355
k = 418.4

[[angles]]
types = ["CT", "OH", "HO"]
angle = 1.8500490
k = 460.24

[[angles]]
types = ["CT", "C", "O2"]
angle = 2.0420352
k = 585.76

[[angles]]
types = ["O2", "C", "O2"]
angle = 2.2863813
k = 669.44

[[angles]]
types = ["HW", "OW", "HW"]
angle = 1.8242181
k = 836.8

[[angles]]
types = ["CT", "CT", "CA"]
angle = 1.9896753
k = 527.184

[[angles]]
types = ["HC", "CT", "CA"]
angle = 1.9111355
k = 418.4

[[angles]]
types = ["CT", "CA", "CA"]
angle = 2.0943951
k = 585.76

[[angles]]
types = ["CA", "CA", "CA"]
angle = 2.0943951
k = 527.184

[[angles]]
types = ["CA", "CA", "HA"]
angle = 2.0943951
k = 418.4

[[angles]]
types = ["CT", "CT", "CT"]
angle = 1.9111355
k = 334.72

[[angles]]
types = ["CT", "CT", "N3"]
angle = 1.9390607
k = 669.44

[[angles]]
types = ["HP", "CT", "CT"]
angle = 1.9111355
k = 418.4

[[angles]]
types = ["HP", "CT", "HP"]
angle = 1.8814649
k = 292.88

[[angles]]
types = ["HP", "CT", "N3"]
angle = 1.9111355
k = 418.4

[[angles]]
types = ["CT", "N3", "H"]
angle = 1.9111355
k = 418.4

[[angles]]
types = ["H", "N3", "H"]
angle = 1.9111355
k = 292.88

[[torsions]]
types = ["X", "CT", "CT", "X"]
terms = [{ periodicity = 3, phase = 0.0, k = 0.65084 }]

[[torsions]]
types = ["X", "C", "N", "X"]
terms = [{ periodicity = 2, phase = 3.14159265, k = 10.46 }]

[[torsions]]
types = ["X", "CT", "N", "X"]
terms = [{ periodicity = 2, phase = 0.0, k = 0.4184 }]

[[torsions]]
types = ["X", "C", "CT", "X"]
terms = [{ periodicity = 2, phase = 0.0, k = 0.3347 }]

[[torsions]]
types = ["X", "CT", "OH", "X"]
terms = [{ periodicity = 3, phase = 0.0, k = 0.6974 }]

[[torsions]]
types = ["X", "CA", "CA", "X"]
terms = [{ periodicity = 2, phase = 3.14159265, k = 15.167 }]

[[torsions]]
types = ["X", "CT", "N3", "X"]
terms = [{ periodicity = 3, phase = 0.0, k = 0.6508 }]

[[torsions]]
types = ["HC", "CT", "CT", "HC"]
terms = [{ periodicity = 3, phase = 0.0, k = 0.6276 }]
"#;

pub fn fixture_forcefield() -> Forcefield {
    let mut forcefield = Forcefield::default();
    forcefield
        .merge_str(FIXTURE_FORCEFIELD, Path::new("fixture.toml"))
        .unwrap();
    forcefield
}

pub fn fixture_generator() -> TemplateSystemGenerator {
    TemplateSystemGenerator::new(fixture_forcefield(), None).unwrap()
}

/// Atom names and positions (nm) of ACE-ALA-NME in residues 1, 2 and 3.
const PEPTIDE: [(&str, &str, [f64; 3]); 22] = [
    ("ACE", "HH31", [-0.0364, -0.0514, 0.0890]),
    ("ACE", "CH3", [0.0000, 0.0000, 0.0000]),
    ("ACE", "HH32", [-0.0364, 0.1027, 0.0000]),
    ("ACE", "HH33", [-0.0364, -0.0514, -0.0890]),
    ("ACE", "C", [0.1522, 0.0000, 0.0000]),
    ("ACE", "O", [0.2144, 0.1060, 0.0000]),
    ("ALA", "N", [0.2120, -0.1194, 0.0000]),
    ("ALA", "H", [0.1561, -0.2035, 0.0000]),
    ("ALA", "CA", [0.3563, -0.1328, 0.0000]),
    ("ALA", "HA", [0.3833, -0.2349, 0.0266]),
    ("ALA", "CB", [0.4188, -0.0371, 0.1011]),
    ("ALA", "HB1", [0.3812, -0.0598, 0.2008]),
    ("ALA", "HB2", [0.5272, -0.0485, 0.0997]),
    ("ALA", "HB3", [0.3928, 0.0655, 0.0750]),
    ("ALA", "C", [0.4118, -0.1008, -0.1381]),
    ("ALA", "O", [0.3485, -0.1309, -0.2390]),
    ("NME", "N", [0.5303, -0.0395, -0.1421]),
    ("NME", "H", [0.5781, -0.0169, -0.0560]),
    ("NME", "CH3", [0.5937, -0.0037, -0.2674]),
    ("NME", "HH31", [0.5292, 0.0645, -0.3227]),
    ("NME", "HH32", [0.6891, 0.0451, -0.2472]),
    ("NME", "HH33", [0.6108, -0.0936, -0.3265]),
];

/// Oxygen positions (nm) of the fixture waters, nearest to the alanine side chain first.
pub const WATER_OXYGENS: [[f64; 3]; 3] = [[0.60, 0.00, 0.40], [-0.20, 0.30, 0.30], [1.40, 1.20, 1.00]];

/// Capped alanine in chain `A` without bonds; templates supply connectivity.
pub fn alanine_dipeptide() -> (MolecularTopology, Coordinates) {
    let mut topology = MolecularTopology::new();
    let mut positions = Vec::new();
    let chain = topology.add_chain("A", ChainType::Protein);
    for (number, name) in [("1", "ACE"), ("2", "ALA"), ("3", "NME")] {
        let residue = topology.add_residue(chain, number, name).unwrap();
        for (_, atom, xyz) in PEPTIDE.iter().filter(|(res, _, _)| *res == name) {
            topology
                .add_atom(residue, atom, Element::guess_from_atom_name(atom))
                .unwrap();
            positions.push(Point3::from(*xyz));
        }
    }
    (topology, positions)
}

/// The capped alanine followed by the first `count` fixture waters in chain `W`.
pub fn alanine_dipeptide_in_water(count: usize) -> (MolecularTopology, Coordinates) {
    let (mut topology, mut positions) = alanine_dipeptide();
    let chain = topology.add_chain("W", ChainType::Water);
    let theta = 104.52f64.to_radians();
    for (i, oxygen) in WATER_OXYGENS.iter().take(count).enumerate() {
        let residue = topology.add_residue(chain, &(i + 1).to_string(), "HOH").unwrap();
        let o = Point3::from(*oxygen);
        let h1 = o + Vector3::new(0.09572, 0.0, 0.0);
        let h2 = o + Vector3::new(0.09572 * theta.cos(), 0.09572 * theta.sin(), 0.0);
        for (name, element, position) in [("O", Element::O, o), ("H1", Element::H, h1), ("H2", Element::H, h2)] {
            topology.add_atom(residue, name, element).unwrap();
            positions.push(position);
        }
    }
    (topology, positions)
}
