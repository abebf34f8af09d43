use nalgebra::{Point3, Vector3};

pub fn distance(a: &Point3<f64>, b: &Point3<f64>) -> f64 {
    (a - b).norm()
}

/// Angle `a-b-c` at vertex `b`, in radians within `[0, π]`.
pub fn angle(a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>) -> f64 {
    let ba = a - b;
    let bc = c - b;
    let cos = ba.dot(&bc) / (ba.norm() * bc.norm());
    cos.clamp(-1.0, 1.0).acos()
}

/// Dihedral `a-b-c-d`, in radians within `(-π, π]`.
pub fn dihedral(a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>, d: &Point3<f64>) -> f64 {
    let b1 = b - a;
    let b2 = c - b;
    let b3 = d - c;
    let n1 = b1.cross(&b2);
    let n2 = b2.cross(&b3);
    let y = b2.norm() * b1.dot(&n2);
    let x = n1.dot(&n2);
    y.atan2(x)
}

/// Places an atom from internal coordinates (natural extension reference frame).
///
/// The new atom `x` satisfies `|x - bond| = r`, `angle(angle_atom, bond, x) = theta`
/// and `dihedral(torsion_atom, angle_atom, bond, x) = phi`. Returns `None` when the
/// three reference atoms are collinear.
pub fn place_from_internal(
    bond: &Point3<f64>,
    angle_atom: &Point3<f64>,
    torsion_atom: &Point3<f64>,
    r: f64,
    theta: f64,
    phi: f64,
) -> Option<Point3<f64>> {
    let bc = (bond - angle_atom).try_normalize(1e-12)?;
    let n = (angle_atom - torsion_atom).cross(&bc).try_normalize(1e-12)?;
    let m = n.cross(&bc);
    let local = Vector3::new(
        -r * theta.cos(),
        r * theta.sin() * phi.cos(),
        r * theta.sin() * phi.sin(),
    );
    Some(bond + bc * local.x + m * local.y + n * local.z)
}

pub fn centroid<'a>(points: impl IntoIterator<Item = &'a Point3<f64>>) -> Option<Point3<f64>> {
    let mut sum = Vector3::zeros();
    let mut count = 0usize;
    for point in points {
        sum += point.coords;
        count += 1;
    }
    (count > 0).then(|| Point3::from(sum / count as f64))
}
