//! # MiMC Hash over BN254
//!
//! The settlement circuit needs a hash that is cheap in R1CS. BLAKE3 (used
//! everywhere else) would cost tens of thousands of constraints per call;
//! MiMC with the `x⁵` S-box costs three.
//!
//! ```text
//! E_k(x)   = r_n ∘ … ∘ r_1 (x) + k,   r_i(x) = (x + k + c_i)⁵
//! H(a, b)  = E_a(b) + a + b            (Miyaguchi–Preneel)
//! ```
//!
//! `x⁵` is a permutation of BN254's scalar field because
//! `gcd(5, r - 1) = 1`. Round constants are derived from BLAKE3 under
//! [`DOMAIN_MIMC_CONSTANTS`], so there is nothing to trust.
//!
//! [`MimcParams::hash2`] and [`MimcParams::hash2_var`] must agree on every
//! input; the circuit tests check this on random values.

use ark_bn254::Fr;
use ark_ff::Field;
use ark_r1cs_std::fields::{fp::FpVar, FieldVar};
use ark_relations::r1cs::SynthesisError;

use crate::config::{DOMAIN_MIMC_CONSTANTS, MIMC_ROUNDS};
use crate::crypto::hash::{bytes_to_field, domain_separated_hash};

/// Round constants for one MiMC instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MimcParams {
    constants: Vec<Fr>,
}

impl Default for MimcParams {
    fn default() -> Self {
        Self::new(MIMC_ROUNDS)
    }
}

impl MimcParams {
    pub fn new(rounds: usize) -> Self {
        let constants = (0..rounds as u64)
            .map(|i| bytes_to_field(&domain_separated_hash(DOMAIN_MIMC_CONSTANTS, &i.to_le_bytes())))
            .collect();
        Self { constants }
    }

    pub fn rounds(&self) -> usize {
        self.constants.len()
    }

    /// Keyed permutation `E_key(x)`.
    pub fn encrypt(&self, key: Fr, x: Fr) -> Fr {
        let mut state = x;
        for c in &self.constants {
            let t = state + key + c;
            let t2 = t.square();
            state = t2.square() * t;
        }
        state + key
    }

    /// Two-to-one compression.
    pub fn hash2(&self, a: Fr, b: Fr) -> Fr {
        self.encrypt(a, b) + a + b
    }

    /// In-circuit `E_key(x)`. Three constraints per round.
    pub fn encrypt_var(
        &self,
        key: &FpVar<Fr>,
        x: &FpVar<Fr>,
    ) -> Result<FpVar<Fr>, SynthesisError> {
        let mut state = x.clone();
        for c in &self.constants {
            let t = &state + key + *c;
            let t4 = t.square()?.square()?;
            state = t4 * &t;
        }
        Ok(state + key)
    }

    /// In-circuit [`hash2`](Self::hash2).
    pub fn hash2_var(
        &self,
        a: &FpVar<Fr>,
        b: &FpVar<Fr>,
    ) -> Result<FpVar<Fr>, SynthesisError> {
        Ok(self.encrypt_var(a, b)? + a + b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ark_ff::UniformRand;
    use ark_r1cs_std::{alloc::AllocVar, R1CSVar};
    use ark_relations::r1cs::ConstraintSystem;
    use ark_std::rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn constants_are_deterministic() {
        assert_eq!(MimcParams::default(), MimcParams::default());
        assert_eq!(MimcParams::default().rounds(), MIMC_ROUNDS);
    }

    #[test]
    fn hash_is_order_sensitive() {
        let mimc = MimcParams::default();
        let a = Fr::from(1u64);
        let b = Fr::from(2u64);
        assert_ne!(mimc.hash2(a, b), mimc.hash2(b, a));
        assert_eq!(mimc.hash2(a, b), mimc.hash2(a, b));
    }

    #[test]
    fn gadget_matches_native() {
        let mimc = MimcParams::default();
        let mut rng = StdRng::seed_from_u64(42);

        for _ in 0..4 {
            let a = Fr::rand(&mut rng);
            let b = Fr::rand(&mut rng);

            let cs = ConstraintSystem::<Fr>::new_ref();
            let a_var = FpVar::new_witness(cs.clone(), || Ok(a)).unwrap();
            let b_var = FpVar::new_witness(cs.clone(), || Ok(b)).unwrap();
            let out = mimc.hash2_var(&a_var, &b_var).unwrap();

            assert_eq!(out.value().unwrap(), mimc.hash2(a, b));
            assert!(cs.is_satisfied().unwrap());
        }
    }

    #[test]
    fn gadget_cost_is_three_constraints_per_round() {
        let mimc = MimcParams::new(8);
        let cs = ConstraintSystem::<Fr>::new_ref();
        let a = FpVar::new_witness(cs.clone(), || Ok(Fr::from(3u64))).unwrap();
        let b = FpVar::new_witness(cs.clone(), || Ok(Fr::from(4u64))).unwrap();
        mimc.hash2_var(&a, &b).unwrap();
        assert_eq!(cs.num_constraints(), 3 * 8);
    }
}
