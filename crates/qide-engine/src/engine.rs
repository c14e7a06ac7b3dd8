//! Sparse amplitude engine.

use std::collections::BTreeMap;
use std::f64::consts::PI;
use std::ops::Range;

use num_complex::Complex64;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, trace};

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::matrix::Unitary2x2;

/// Largest register width for which [`QuantumEngine::vector`] builds a dense vector.
pub const MAX_DENSE_WIDTH: usize = 30;

/// Phase angle `2π / 2^distance` applied by the controlled phase-shift family.
pub fn phase_shift_angle(distance: u32) -> f64 {
    2.0 * PI / 2.0_f64.powi(i32::try_from(distance).unwrap_or(i32::MAX))
}

/// The amplitude state of the root register.
///
/// Amplitudes are kept in a sparse map from basis index to complex
/// coefficient; entries whose magnitude drops below `epsilon` are removed.
/// Operations address qubits by root-register offset. Registers are laid
/// out in declaration order, and the most recently declared register
/// occupies the least significant bits of the basis index, so that adding a
/// register of width `w` maps every existing key `k` to `k·2^w + k2`.
pub struct QuantumEngine {
    config: EngineConfig,
    amplitudes: FxHashMap<u64, Complex64>,
    /// Register widths in declaration order.
    layout: Vec<usize>,
    /// Basis-index bit for each root offset.
    bits: Vec<u32>,
    rng: StdRng,
}

impl QuantumEngine {
    /// Create an empty engine with default settings.
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    /// Create an empty engine.
    pub fn with_config(config: EngineConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            config,
            amplitudes: FxHashMap::default(),
            layout: vec![],
            bits: vec![],
            rng,
        }
    }

    /// Get the engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Width of the root register.
    pub fn num_qubits(&self) -> usize {
        self.bits.len()
    }

    /// Number of stored (non-negligible) amplitudes.
    pub fn num_amplitudes(&self) -> usize {
        self.amplitudes.len()
    }

    /// Register widths in declaration order.
    pub fn layout(&self) -> &[usize] {
        &self.layout
    }

    /// Drop every register and amplitude. The sampling RNG is kept.
    pub fn reset(&mut self) {
        debug!("Resetting engine ({} qubits)", self.num_qubits());
        self.amplitudes.clear();
        self.layout.clear();
        self.bits.clear();
    }

    // =========================================================================
    // Register construction
    // =========================================================================

    /// Append a register prepared in the basis state `value`.
    ///
    /// Returns the root offsets the register occupies.
    pub fn new_register_from_value(
        &mut self,
        value: u64,
        width: usize,
    ) -> EngineResult<Range<usize>> {
        self.new_register([(value, Complex64::new(1.0, 0.0))], width)
    }

    /// Append a register with the given amplitude distribution.
    ///
    /// The new distribution is tensored onto the existing state. Keys must
    /// fit in `width` bits and the distribution must be normalized.
    pub fn new_register(
        &mut self,
        amplitudes: impl IntoIterator<Item = (u64, Complex64)>,
        width: usize,
    ) -> EngineResult<Range<usize>> {
        let total = self.num_qubits();
        if width == 0 {
            return Err(EngineError::InvalidWidth {
                width,
                reason: "register must hold at least one qubit".into(),
            });
        }
        if total + width > self.config.max_qubits {
            return Err(EngineError::InvalidWidth {
                width,
                reason: format!(
                    "root register would exceed {} qubits",
                    self.config.max_qubits
                ),
            });
        }

        let limit = 1u64 << width;
        let mut incoming: FxHashMap<u64, Complex64> = FxHashMap::default();
        for (index, amp) in amplitudes {
            if index >= limit {
                return Err(EngineError::IndexOutOfRange { index, width });
            }
            *incoming.entry(index).or_default() += amp;
        }
        let norm_sqr: f64 = incoming.values().map(Complex64::norm_sqr).sum();
        if (norm_sqr - 1.0).abs() > self.config.epsilon {
            return Err(EngineError::NotNormalized { norm_sqr });
        }
        let eps = self.config.epsilon;
        incoming.retain(|_, amp| amp.norm() >= eps);

        if self.layout.is_empty() {
            self.amplitudes = incoming;
        } else {
            let mut product =
                FxHashMap::with_capacity_and_hasher(self.amplitudes.len() * incoming.len(), Default::default());
            for (&key, &amp) in &self.amplitudes {
                for (&key2, &amp2) in &incoming {
                    let value = amp * amp2;
                    if value.norm() >= eps {
                        product.insert((key << width) | key2, value);
                    }
                }
            }
            self.amplitudes = product;
        }

        self.layout.push(width);
        self.rebuild_bit_map();
        debug!(
            "Declared {}-qubit register at root offset {}; {} amplitudes stored",
            width,
            total,
            self.amplitudes.len()
        );
        Ok(total..total + width)
    }

    fn rebuild_bit_map(&mut self) {
        let total: usize = self.layout.iter().sum();
        self.bits.clear();
        let mut start = 0;
        for &width in &self.layout {
            for i in 0..width {
                self.bits.push((total - (start + width) + i) as u32);
            }
            start += width;
        }
    }

    // =========================================================================
    // Gate application
    // =========================================================================

    /// Apply a 2x2 unitary to `target`, gated on every qubit in `controls`.
    ///
    /// Each pair of basis indices that differ only in the target bit is
    /// processed once. Entries whose control bits are not all set are left
    /// untouched.
    pub fn apply_unitary(
        &mut self,
        target: usize,
        controls: &[usize],
        matrix: &Unitary2x2,
    ) -> EngineResult<()> {
        let (target_mask, control_mask) = self.operand_masks(target, controls, "apply_unitary")?;
        if !matrix.is_unitary(self.config.epsilon) {
            return Err(EngineError::NonUnitary {
                epsilon: self.config.epsilon,
            });
        }
        trace!(qubit = target, ?controls, "apply_unitary");

        let canonical: FxHashSet<u64> = self
            .amplitudes
            .keys()
            .filter(|&&key| key & control_mask == control_mask)
            .map(|&key| key & !target_mask)
            .collect();

        for key0 in canonical {
            let key1 = key0 | target_mask;
            let a0 = self.amplitude(key0);
            let a1 = self.amplitude(key1);
            let (b0, b1) = matrix.apply(a0, a1);
            self.store(key0, b0);
            self.store(key1, b1);
        }
        Ok(())
    }

    /// Flip `target` wherever every control bit is set (X, CNot, Toffoli).
    pub fn apply_controlled_not(&mut self, target: usize, controls: &[usize]) -> EngineResult<()> {
        let (target_mask, control_mask) =
            self.operand_masks(target, controls, "apply_controlled_not")?;
        trace!(qubit = target, ?controls, "apply_controlled_not");

        self.amplitudes = self
            .amplitudes
            .drain()
            .map(|(key, amp)| {
                if key & control_mask == control_mask {
                    (key ^ target_mask, amp)
                } else {
                    (key, amp)
                }
            })
            .collect();
        Ok(())
    }

    /// Multiply by `e^{iθ}` wherever `target` and every control are set.
    pub fn apply_phase(&mut self, target: usize, controls: &[usize], angle: f64) -> EngineResult<()> {
        let (target_mask, control_mask) = self.operand_masks(target, controls, "apply_phase")?;
        trace!(qubit = target, ?controls, angle, "apply_phase");

        let mask = target_mask | control_mask;
        let phase = Complex64::from_polar(1.0, angle);
        for (key, amp) in &mut self.amplitudes {
            if key & mask == mask {
                *amp *= phase;
            }
        }
        Ok(())
    }

    // =========================================================================
    // Measurement
    // =========================================================================

    /// Measure a single qubit, collapsing the state.
    pub fn measure_qubit(&mut self, offset: usize) -> EngineResult<bool> {
        Ok(self.measure(offset..offset + 1)? == 1)
    }

    /// Jointly measure the qubits in `range`, collapsing the state.
    ///
    /// Returns the observed value, with bit `i` taken from root offset
    /// `range.start + i`.
    pub fn measure(&mut self, range: Range<usize>) -> EngineResult<u64> {
        let distribution = self.probabilities(range.clone())?;
        let total: f64 = distribution.values().sum();
        let r: f64 = self.rng.r#gen::<f64>() * total;

        let mut cumulative = 0.0;
        let mut outcome = None;
        for (&value, &p) in &distribution {
            cumulative += p;
            if r < cumulative {
                outcome = Some((value, p));
                break;
            }
        }
        let (value, p) = match outcome.or_else(|| distribution.iter().next_back().map(|(&v, &p)| (v, p))) {
            Some(found) => found,
            None => return Err(EngineError::EmptyState),
        };

        let scale = 1.0 / p.sqrt();
        let bits: Vec<u32> = self.bits[range].to_vec();
        self.amplitudes
            .retain(|&key, _| extract_value(key, &bits) == value);
        for amp in self.amplitudes.values_mut() {
            *amp *= scale;
        }
        debug!("Measured {} qubit(s): outcome {} (p = {:.6})", bits.len(), value, p);
        Ok(value)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Amplitude of one basis index of the root register.
    pub fn amplitude(&self, key: u64) -> Complex64 {
        self.amplitudes.get(&key).copied().unwrap_or_default()
    }

    /// Sorted copy of every stored amplitude.
    pub fn snapshot(&self) -> Vec<(u64, Complex64)> {
        let mut entries: Vec<_> = self.amplitudes.iter().map(|(&k, &a)| (k, a)).collect();
        entries.sort_unstable_by_key(|(k, _)| *k);
        entries
    }

    /// `Σ|amplitude|²` over the whole state.
    pub fn norm_sqr(&self) -> f64 {
        self.amplitudes.values().map(Complex64::norm_sqr).sum()
    }

    /// Whether the state is normalized within `epsilon`.
    pub fn is_normalized(&self) -> bool {
        (self.norm_sqr() - 1.0).abs() < self.config.epsilon
    }

    /// Probability that the qubit at `offset` reads 1.
    pub fn probability_of_one(&self, offset: usize) -> EngineResult<f64> {
        let mask = 1u64 << self.bit(offset, "probability_of_one")?;
        Ok(self
            .amplitudes
            .iter()
            .filter(|&(&key, _)| key & mask != 0)
            .map(|(_, amp)| amp.norm_sqr())
            .sum())
    }

    /// Outcome probabilities of `range`, marginalized over every other qubit.
    pub fn probabilities(&self, range: Range<usize>) -> EngineResult<BTreeMap<u64, f64>> {
        let bits = self.range_bits(range, "probabilities")?;
        let mut distribution = BTreeMap::new();
        for (&key, amp) in &self.amplitudes {
            *distribution.entry(extract_value(key, &bits)).or_insert(0.0) += amp.norm_sqr();
        }
        Ok(distribution)
    }

    /// Amplitudes of `range` when it factors out of the global state.
    ///
    /// Returns `None` when the qubits are entangled with the rest of the
    /// system. The global phase is chosen so that the rest of the system's
    /// dominant component has a real positive coefficient.
    pub fn amplitudes(&self, range: Range<usize>) -> EngineResult<Option<BTreeMap<u64, Complex64>>> {
        let bits = self.range_bits(range, "amplitudes")?;
        let register_mask = bits.iter().fold(0u64, |mask, &b| mask | (1u64 << b));
        let eps = self.config.epsilon;

        let mut groups: BTreeMap<u64, BTreeMap<u64, Complex64>> = BTreeMap::new();
        for (&key, &amp) in &self.amplitudes {
            groups
                .entry(key & !register_mask)
                .or_default()
                .insert(extract_value(key, &bits), amp);
        }

        let group_norm = |group: &BTreeMap<u64, Complex64>| -> f64 {
            group.values().map(Complex64::norm_sqr).sum()
        };
        let Some(reference) = groups
            .values()
            .max_by(|a, b| group_norm(a).total_cmp(&group_norm(b)))
        else {
            return Ok(Some(BTreeMap::new()));
        };
        let scale = group_norm(reference).sqrt();
        let factor: BTreeMap<u64, Complex64> = reference
            .iter()
            .map(|(&value, &amp)| (value, amp / scale))
            .collect();

        for group in groups.values() {
            let coefficient: Complex64 = factor
                .iter()
                .map(|(value, f)| f.conj() * group.get(value).copied().unwrap_or_default())
                .sum();
            let matches_factor = factor.iter().all(|(value, f)| {
                let actual = group.get(value).copied().unwrap_or_default();
                (actual - f * coefficient).norm() < eps
            });
            let no_stray = group.keys().all(|value| factor.contains_key(value));
            if !matches_factor || !no_stray {
                return Ok(None);
            }
        }
        Ok(Some(factor))
    }

    /// Dense amplitude vector of `range`, or `None` when entangled.
    pub fn vector(&self, range: Range<usize>) -> EngineResult<Option<Vec<Complex64>>> {
        let width = range.len();
        if width > MAX_DENSE_WIDTH {
            return Err(EngineError::InvalidWidth {
                width,
                reason: format!("dense vectors are limited to {MAX_DENSE_WIDTH} qubits"),
            });
        }
        Ok(self.amplitudes(range)?.map(|factor| {
            let mut dense = vec![Complex64::default(); 1usize << width];
            for (value, amp) in factor {
                dense[value as usize] = amp;
            }
            dense
        }))
    }

    /// The value of `range` when it is in a definite basis state.
    pub fn value(&self, range: Range<usize>) -> EngineResult<Option<u64>> {
        let eps = self.config.epsilon;
        Ok(self
            .probabilities(range)?
            .into_iter()
            .find(|&(_, p)| p > 1.0 - eps)
            .map(|(value, _)| value))
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn bit(&self, offset: usize, operation: &'static str) -> EngineResult<u32> {
        self.bits
            .get(offset)
            .copied()
            .ok_or(EngineError::OffsetOutOfRange {
                offset,
                width: self.num_qubits(),
                operation,
            })
    }

    fn range_bits(&self, range: Range<usize>, operation: &'static str) -> EngineResult<Vec<u32>> {
        if self.bits.is_empty() {
            return Err(EngineError::EmptyState);
        }
        if range.is_empty() {
            return Err(EngineError::InvalidWidth {
                width: 0,
                reason: format!("{operation} needs at least one qubit"),
            });
        }
        range.map(|offset| self.bit(offset, operation)).collect()
    }

    fn operand_masks(
        &self,
        target: usize,
        controls: &[usize],
        operation: &'static str,
    ) -> EngineResult<(u64, u64)> {
        let target_mask = 1u64 << self.bit(target, operation)?;
        let mut control_mask = 0u64;
        for &control in controls {
            let mask = 1u64 << self.bit(control, operation)?;
            if mask == target_mask || control_mask & mask != 0 {
                return Err(EngineError::DuplicateQubit {
                    offset: control,
                    operation,
                });
            }
            control_mask |= mask;
        }
        Ok((target_mask, control_mask))
    }

    fn store(&mut self, key: u64, amp: Complex64) {
        if amp.norm() < self.config.epsilon {
            self.amplitudes.remove(&key);
        } else {
            self.amplitudes.insert(key, amp);
        }
    }
}

impl Default for QuantumEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Gather the bits at `bits` into a value whose bit `i` is `key`'s bit `bits[i]`.
fn extract_value(key: u64, bits: &[u32]) -> u64 {
    bits.iter()
        .enumerate()
        .fold(0u64, |value, (i, &bit)| value | (((key >> bit) & 1) << i))
}
