/// Coulomb prefactor in kJ·nm/(mol·e²).
pub const COULOMB_CONSTANT: f64 = 138.935456;
/// Molar Boltzmann constant in kJ/(mol·K).
pub const BOLTZMANN_KJ_PER_MOL_K: f64 = 0.008_314_462_618;

/// Inverse thermal energy `1 / (k_B T)` in mol/kJ.
#[inline]
pub fn thermodynamic_beta(temperature: f64) -> f64 {
    1.0 / (BOLTZMANN_KJ_PER_MOL_K * temperature)
}

#[inline]
pub fn combine_sigma(sigma1: f64, sigma2: f64) -> f64 {
    0.5 * (sigma1 + sigma2)
}

#[inline]
pub fn combine_epsilon(epsilon1: f64, epsilon2: f64) -> f64 {
    (epsilon1 * epsilon2).sqrt()
}

#[inline]
pub fn lennard_jones(dist: f64, sigma: f64, epsilon: f64) -> f64 {
    if epsilon == 0.0 {
        return 0.0;
    }
    if dist < 1e-6 {
        return 1e10;
    }
    let sr6 = (sigma / dist).powi(6);
    4.0 * epsilon * (sr6 * sr6 - sr6)
}

#[inline]
pub fn coulomb(dist: f64, charge_product: f64) -> f64 {
    if charge_product == 0.0 {
        return 0.0;
    }
    if dist < 1e-6 {
        return charge_product.signum() * 1e10;
    }
    COULOMB_CONSTANT * charge_product / dist
}

/// Softcore Lennard-Jones with `r_eff⁶ = r⁶ + α σ⁶ λ_soft`.
#[inline]
pub fn softcore_lennard_jones(dist: f64, sigma: f64, epsilon: f64, alpha: f64, lambda_soft: f64) -> f64 {
    if epsilon == 0.0 {
        return 0.0;
    }
    let r6_eff = dist.powi(6) + alpha * sigma.powi(6) * lambda_soft;
    if r6_eff < 1e-36 {
        return 1e10;
    }
    let sr6 = sigma.powi(6) / r6_eff;
    4.0 * epsilon * (sr6 * sr6 - sr6)
}

/// Softcore Coulomb with `r_eff = sqrt(r² + α σ_Q² λ_soft)`.
#[inline]
pub fn softcore_coulomb(dist: f64, charge_product: f64, alpha: f64, sigma_q: f64, lambda_soft: f64) -> f64 {
    if charge_product == 0.0 {
        return 0.0;
    }
    let r_eff = (dist * dist + alpha * sigma_q * sigma_q * lambda_soft).sqrt();
    coulomb(r_eff, charge_product)
}

#[inline]
pub fn harmonic(value: f64, equilibrium: f64, k: f64) -> f64 {
    let delta = value - equilibrium;
    0.5 * k * delta * delta
}

#[inline]
pub fn periodic_torsion(phi: f64, periodicity: u32, phase: f64, k: f64) -> f64 {
    k * (1.0 + (periodicity as f64 * phi - phase).cos())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn approx_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn lennard_jones_is_zero_at_sigma_and_minimal_at_r_min() {
        assert!(approx_eq(lennard_jones(0.3, 0.3, 0.5), 0.0));
        let r_min = 2f64.powf(1.0 / 6.0) * 0.3;
        assert!(approx_eq(lennard_jones(r_min, 0.3, 0.5), -0.5));
    }

    #[test]
    fn lennard_jones_without_well_depth_vanishes_even_at_contact() {
        assert_eq!(lennard_jones(0.0, 0.3, 0.0), 0.0);
    }

    #[test]
    fn coulomb_uses_nanometre_prefactor() {
        assert!(approx_eq(coulomb(1.0, 1.0), COULOMB_CONSTANT));
        assert!(coulomb(0.5, -1.0) < 0.0);
        assert_eq!(coulomb(0.0, 0.0), 0.0);
    }

    #[test]
    fn softcore_reduces_to_plain_form_without_softening() {
        assert!(approx_eq(
            softcore_lennard_jones(0.4, 0.3, 0.5, 0.85, 0.0),
            lennard_jones(0.4, 0.3, 0.5)
        ));
        assert!(approx_eq(
            softcore_coulomb(0.4, 0.2, 0.3, 1.0, 0.0),
            coulomb(0.4, 0.2)
        ));
    }

    #[test]
    fn softcore_is_finite_at_overlap() {
        let lj = softcore_lennard_jones(0.0, 0.3, 0.5, 0.85, 1.0);
        let elec = softcore_coulomb(0.0, 0.2, 0.3, 1.0, 1.0);
        assert!(lj.is_finite() && lj < 1e3);
        assert!(elec.is_finite() && elec < 1e3);
    }

    #[test]
    fn harmonic_and_torsion_forms() {
        assert!(approx_eq(harmonic(0.12, 0.1, 1000.0), 0.2));
        assert!(approx_eq(periodic_torsion(0.0, 3, 0.0, 1.5), 3.0));
        assert!(approx_eq(periodic_torsion(PI / 3.0, 3, 0.0, 1.5), 0.0));
    }

    #[test]
    fn combining_rules_are_lorentz_berthelot() {
        assert!(approx_eq(combine_sigma(0.2, 0.4), 0.3));
        assert!(approx_eq(combine_epsilon(0.25, 1.0), 0.5));
    }

    #[test]
    fn beta_at_room_temperature() {
        assert!((thermodynamic_beta(300.0) - 0.40090).abs() < 1e-4);
    }
}
