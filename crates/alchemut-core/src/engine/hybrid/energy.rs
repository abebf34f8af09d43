use super::{AlchemicalState, HybridError, HybridSystem, HybridVariant, ParticlePair, Scope};
use crate::core::forcefield::potentials;
use crate::core::forcefield::system::{NonbondedException, NonbondedParticle, ordered_pair};
use crate::core::forcefield::term::EnergyBreakdown;
use crate::core::utils::geometry::{angle, dihedral, distance};
use crate::engine::transformation::AtomClass;
use nalgebra::Point3;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Pair parameters `(charge product, sigma, epsilon)`.
type PairParameters = (f64, f64, f64);

fn lerp(a: f64, b: f64, lambda: f64) -> f64 {
    (1.0 - lambda) * a + lambda * b
}

fn combined(a: &NonbondedParticle, b: &NonbondedParticle) -> PairParameters {
    (
        a.charge * b.charge,
        potentials::combine_sigma(a.sigma, b.sigma),
        potentials::combine_epsilon(a.epsilon, b.epsilon),
    )
}

fn plain_pair(r: f64, (qq, sigma, epsilon): PairParameters) -> f64 {
    potentials::lennard_jones(r, sigma, epsilon) + potentials::coulomb(r, qq)
}

fn exception_parameters(exception: &NonbondedException) -> PairParameters {
    (exception.charge_product, exception.sigma, exception.epsilon)
}

impl HybridSystem {
    fn check_state(&self, state: AlchemicalState) -> Result<f64, HybridError> {
        if !(0.0..=1.0).contains(&state.lambda) {
            return Err(HybridError::InvalidLambda(state.lambda));
        }
        if !(state.rest_scale > 0.0 && state.rest_scale.is_finite()) {
            return Err(HybridError::InvalidRestScale(state.rest_scale));
        }
        match self.variant {
            HybridVariant::Plain if state.rest_scale != 1.0 => Err(HybridError::RestScalingUnsupported {
                variant: self.variant.name(),
                scale: state.rest_scale,
            }),
            HybridVariant::Repartitioned { endstate } if state.lambda != endstate.lambda() => {
                Err(HybridError::LambdaPinned {
                    endstate,
                    lambda: state.lambda,
                })
            }
            _ => Ok(state.lambda),
        }
    }

    /// Multiplier of a term under REST: `s` inside the region, `sqrt(s)` across its border.
    fn rest_factor(&self, atoms: &[usize], scale: f64) -> f64 {
        let inside = atoms.iter().filter(|&&i| self.atoms[i].rest).count();
        if inside == 0 || scale == 1.0 {
            1.0
        } else if inside == atoms.len() {
            scale
        } else {
            scale.sqrt()
        }
    }

    /// Fourth-dimension coordinate of an atom in the lifting scheme.
    fn lifting(&self, index: usize, lambda: f64) -> f64 {
        let HybridVariant::RestCapable { max_lifting } = self.variant else {
            return 0.0;
        };
        match self.atoms[index].class {
            AtomClass::UniqueOld => max_lifting * lambda,
            AtomClass::UniqueNew => max_lifting * (1.0 - lambda),
            AtomClass::Core | AtomClass::Environment => 0.0,
        }
    }

    fn unique_pair(
        &self,
        i: usize,
        j: usize,
        r: f64,
        lambda: f64,
        exception: Option<&NonbondedException>,
        old_side: bool,
    ) -> f64 {
        // Weight of this endpoint and the softcore lambda that vanishes with it.
        let (weight, lambda_soft) = if old_side {
            (1.0 - lambda, lambda)
        } else {
            (lambda, 1.0 - lambda)
        };
        if let Some(exception) = exception {
            if exception.is_exclusion() {
                return 0.0;
            }
            let factor = if self.settings.exceptions_flattened() { weight } else { 1.0 };
            return factor * plain_pair(r, exception_parameters(exception));
        }
        if weight == 0.0 {
            return 0.0;
        }
        let parameters = |pair: &ParticlePair| if old_side { pair.old } else { pair.new };
        let (Some(a), Some(b)) = (parameters(&self.particles[i]), parameters(&self.particles[j])) else {
            return 0.0;
        };
        let (qq, sigma, epsilon) = combined(&a, &b);
        match self.variant {
            HybridVariant::RestCapable { .. } => {
                let dw = self.lifting(i, lambda) - self.lifting(j, lambda);
                let r_eff = (r * r + dw * dw).sqrt();
                weight * plain_pair(r_eff, (qq, sigma, epsilon))
            }
            _ => {
                let s = &self.settings;
                weight
                    * (potentials::softcore_lennard_jones(r, sigma, epsilon, s.softcore_lj_alpha, lambda_soft)
                        + potentials::softcore_coulomb(
                            r,
                            qq,
                            s.softcore_electrostatics_alpha,
                            s.softcore_sigma_q,
                            lambda_soft,
                        ))
            }
        }
    }

    fn mapped_pair(&self, i: usize, j: usize, r: f64, lambda: f64) -> f64 {
        let key = (i, j);
        let old_exception = self.old_exceptions.get(&key);
        let new_exception = self.new_exceptions.get(&key);
        let (pi, pj) = (&self.particles[i], &self.particles[j]);
        let (Some(oi), Some(oj), Some(ni), Some(nj)) = (pi.old, pj.old, pi.new, pj.new) else {
            return 0.0;
        };

        if old_exception.is_none() && new_exception.is_none() {
            let mix = |a: NonbondedParticle, b: NonbondedParticle| {
                NonbondedParticle::new(
                    lerp(a.charge, b.charge, lambda),
                    lerp(a.sigma, b.sigma, lambda),
                    lerp(a.epsilon, b.epsilon, lambda),
                )
            };
            return plain_pair(r, combined(&mix(oi, ni), &mix(oj, nj)));
        }

        let old = old_exception.map_or_else(|| combined(&oi, &oj), exception_parameters);
        let new = new_exception.map_or_else(|| combined(&ni, &nj), exception_parameters);
        plain_pair(
            r,
            (
                lerp(old.0, new.0, lambda),
                lerp(old.1, new.1, lambda),
                lerp(old.2, new.2, lambda),
            ),
        )
    }

    fn pair_energy(&self, i: usize, j: usize, r: f64, lambda: f64) -> f64 {
        let classes = (self.atoms[i].class, self.atoms[j].class);
        let involves = |class: AtomClass| classes.0 == class || classes.1 == class;
        let key = ordered_pair(i, j);
        match (involves(AtomClass::UniqueOld), involves(AtomClass::UniqueNew)) {
            (true, true) => 0.0,
            (true, false) => self.unique_pair(i, j, r, lambda, self.old_exceptions.get(&key), true),
            (false, true) => self.unique_pair(i, j, r, lambda, self.new_exceptions.get(&key), false),
            (false, false) => self.mapped_pair(i, j, r, lambda),
        }
    }

    fn nonbonded_energy(&self, positions: &[Point3<f64>], lambda: f64, rest_scale: f64) -> f64 {
        let n = self.atoms.len();
        let row_energy = |i: usize| -> f64 {
            let mut energy = 0.0;
            for j in (i + 1)..n {
                let r = distance(&positions[i], &positions[j]);
                let pair = self.pair_energy(i, j, r, lambda);
                if pair != 0.0 {
                    energy += self.rest_factor(&[i, j], rest_scale) * pair;
                }
            }
            energy
        };

        #[cfg(not(feature = "parallel"))]
        let iterator = 0..n;

        #[cfg(feature = "parallel")]
        let iterator = (0..n).into_par_iter();

        iterator.map(row_energy).sum()
    }

    /// Weight of a bond or angle that exists in one endpoint only.
    fn one_sided_weight(&self, scope: Scope, present_in_old: bool, lambda: f64, softening: f64) -> f64 {
        match (scope, present_in_old) {
            (Scope::UniqueOld, _) => (1.0 - lambda) + lambda * softening,
            (Scope::UniqueNew, _) => lambda + (1.0 - lambda) * softening,
            (Scope::Mapped, true) => 1.0 - lambda,
            (Scope::Mapped, false) => lambda,
        }
    }

    fn harmonic_energy<const N: usize>(
        &self,
        terms: &[super::HybridValenceTerm<N>],
        lambda: f64,
        softening: f64,
        measure: impl Fn(&[usize; N]) -> f64,
    ) -> f64 {
        terms
            .iter()
            .map(|term| {
                let value = measure(&term.atoms);
                match (term.old, term.new) {
                    (Some((x0, k0)), Some((x1, k1))) => {
                        potentials::harmonic(value, lerp(x0, x1, lambda), lerp(k0, k1, lambda))
                    }
                    (Some((x0, k0)), None) => {
                        self.one_sided_weight(term.scope, true, lambda, softening) * potentials::harmonic(value, x0, k0)
                    }
                    (None, Some((x1, k1))) => {
                        self.one_sided_weight(term.scope, false, lambda, softening)
                            * potentials::harmonic(value, x1, k1)
                    }
                    (None, None) => 0.0,
                }
            })
            .sum()
    }

    fn torsion_energy(&self, positions: &[Point3<f64>], lambda: f64, rest_scale: f64) -> f64 {
        let flatten = self.settings.flatten_torsions;
        self.torsions
            .iter()
            .map(|term| {
                let weight = match (term.scope, term.from_old) {
                    (Scope::Mapped, true) => 1.0 - lambda,
                    (Scope::Mapped, false) => lambda,
                    (Scope::UniqueOld, _) if flatten => 1.0 - lambda,
                    (Scope::UniqueNew, _) if flatten => lambda,
                    _ => 1.0,
                };
                if weight == 0.0 {
                    return 0.0;
                }
                let [i, j, k, l] = term.atoms;
                let phi = dihedral(&positions[i], &positions[j], &positions[k], &positions[l]);
                weight
                    * self.rest_factor(&term.atoms, rest_scale)
                    * potentials::periodic_torsion(phi, term.periodicity, term.phase, term.k)
            })
            .sum()
    }

    /// Potential energy of the hybrid system at its own coordinates.
    pub fn energy(&self, state: AlchemicalState) -> Result<EnergyBreakdown, HybridError> {
        self.energy_at(&self.positions, state)
    }

    /// Potential energy at the given hybrid coordinates.
    ///
    /// # Errors
    ///
    /// Fails for a `lambda` outside `[0, 1]`, a non-positive REST scale, REST
    /// scaling on the plain variant, or any `lambda` other than the pinned
    /// endstate on a repartitioned system.
    pub fn energy_at(
        &self,
        positions: &[Point3<f64>],
        state: AlchemicalState,
    ) -> Result<EnergyBreakdown, HybridError> {
        if positions.len() != self.atoms.len() {
            return Err(HybridError::PositionCountMismatch {
                side: "hybrid",
                expected: self.atoms.len(),
                found: positions.len(),
            });
        }
        let lambda = self.check_state(state)?;
        let bond = self.harmonic_energy(&self.bonds, lambda, self.settings.bond_softening_constant, |&[i, j]| {
            distance(&positions[i], &positions[j])
        });
        let angle_energy = self.harmonic_energy(
            &self.angles,
            lambda,
            self.settings.angle_softening_constant,
            |&[i, j, k]| angle(&positions[i], &positions[j], &positions[k]),
        );
        let energy = EnergyBreakdown::new(
            bond,
            angle_energy,
            self.torsion_energy(positions, lambda, state.rest_scale),
            self.nonbonded_energy(positions, lambda, state.rest_scale),
        );
        for (term, value) in [
            ("bond", energy.bond),
            ("angle", energy.angle),
            ("torsion", energy.torsion),
            ("nonbonded", energy.nonbonded),
        ] {
            if !value.is_finite() {
                return Err(HybridError::NonFinite { term });
            }
        }
        Ok(energy)
    }

    /// Reduced potential `β·U` at the system's own coordinates.
    pub fn reduced_potential(&self, state: AlchemicalState, beta: f64) -> Result<f64, HybridError> {
        Ok(self.energy(state)?.reduced(beta))
    }
}
