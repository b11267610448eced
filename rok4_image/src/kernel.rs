//! Resampling kernels used by [`crate::reprojected::ReprojectedImage`].
//! Weights are precomputed for 1024 fractional offsets per axis so the
//! convolution loop only ever indexes a table.

pub const WEIGHT_TABLE_ENTRIES: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kernel {
	Nearest,
	Linear,
	Cubic,
	Lanczos2,
	Lanczos3,
	Lanczos4,
}

impl Kernel {
	#[must_use]
	pub fn half_width(self) -> f64 {
		match self {
			Kernel::Nearest => 0.5,
			Kernel::Linear => 1.0,
			Kernel::Cubic | Kernel::Lanczos2 => 2.0,
			Kernel::Lanczos3 => 3.0,
			Kernel::Lanczos4 => 4.0,
		}
	}

	fn weight(self, x: f64) -> f64 {
		match self {
			Kernel::Nearest => {
				if x.abs() <= 0.5 {
					1.0
				} else {
					0.0
				}
			}
			Kernel::Linear => (1.0 - x.abs()).max(0.0),
			Kernel::Cubic => cubic_convolution(x, -0.5),
			Kernel::Lanczos2 => lanczos(x, 2.0),
			Kernel::Lanczos3 => lanczos(x, 3.0),
			Kernel::Lanczos4 => lanczos(x, 4.0),
		}
	}
}

fn cubic_convolution(x: f64, a: f64) -> f64 {
	let x = x.abs();
	if x <= 1.0 {
		(a + 2.0) * x.powi(3) - (a + 3.0) * x.powi(2) + 1.0
	} else if x < 2.0 {
		a * x.powi(3) - 5.0 * a * x.powi(2) + 8.0 * a * x - 4.0 * a
	} else {
		0.0
	}
}

fn sinc(x: f64) -> f64 {
	if x.abs() < 1e-12 {
		1.0
	} else {
		(std::f64::consts::PI * x).sin() / (std::f64::consts::PI * x)
	}
}

fn lanczos(x: f64, a: f64) -> f64 {
	if x.abs() < a { sinc(x) * sinc(x / a) } else { 0.0 }
}

/// Precomputed per-pixel weights for one axis at a given effective scale
/// (`ratio = target_resolution / source_resolution`, ≥ 1 when reducing).
/// Entry `frac` (0..1024, representing a fractional pixel position 0..1)
/// holds `support` weights starting at source offset `xmin[frac]`.
pub struct WeightTable {
	pub support: usize,
	/// Starting offset (relative to `floor(coord)`, negative or zero) for
	/// each of the 1024 fractional positions.
	pub xmin: Vec<i32>,
	/// `support` weights per fractional position, row-major by `frac`.
	pub weights: Vec<f64>,
}

impl WeightTable {
	#[must_use]
	pub fn new(kernel: Kernel, ratio: f64) -> Self {
		let scale = ratio.max(1.0);
		let half = kernel.half_width() * scale;
		let support = (half.ceil() as usize) * 2 + 1;

		let mut xmin = Vec::with_capacity(WEIGHT_TABLE_ENTRIES);
		let mut weights = Vec::with_capacity(WEIGHT_TABLE_ENTRIES * support);

		for i in 0..WEIGHT_TABLE_ENTRIES {
			let frac = i as f64 / WEIGHT_TABLE_ENTRIES as f64;
			let start = -((support / 2) as i32);
			xmin.push(start);
			let mut row = Vec::with_capacity(support);
			let mut sum = 0.0;
			for j in 0..support {
				let sample_offset = f64::from(start + j as i32) - frac;
				let w = kernel.weight(sample_offset / scale);
				row.push(w);
				sum += w;
			}
			if sum.abs() > 1e-12 {
				for w in &mut row {
					*w /= sum;
				}
			}
			weights.extend(row);
		}

		WeightTable { support, xmin, weights }
	}

	#[must_use]
	pub fn weights_for_frac(&self, frac_1024: usize) -> &[f64] {
		let frac = frac_1024.min(WEIGHT_TABLE_ENTRIES - 1);
		&self.weights[frac * self.support..(frac + 1) * self.support]
	}

	#[must_use]
	pub fn start_for_frac(&self, frac_1024: usize) -> i32 {
		self.xmin[frac_1024.min(WEIGHT_TABLE_ENTRIES - 1)]
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use approx::assert_abs_diff_eq;

	#[test]
	fn nearest_weight_is_a_single_tap() {
		let table = WeightTable::new(Kernel::Nearest, 1.0);
		let w = table.weights_for_frac(0);
		assert_abs_diff_eq!(w.iter().sum::<f64>(), 1.0, epsilon = 1e-9);
	}

	#[test]
	fn every_fractional_position_sums_to_one() {
		for kernel in [Kernel::Linear, Kernel::Cubic, Kernel::Lanczos2, Kernel::Lanczos3, Kernel::Lanczos4] {
			let table = WeightTable::new(kernel, 1.0);
			for frac in [0, 128, 512, 900] {
				let sum: f64 = table.weights_for_frac(frac).iter().sum();
				assert_abs_diff_eq!(sum, 1.0, epsilon = 1e-6);
			}
		}
	}

	#[test]
	fn magnifying_ratio_does_not_shrink_support_below_minifying() {
		let narrow = WeightTable::new(Kernel::Lanczos3, 1.0);
		let wide = WeightTable::new(Kernel::Lanczos3, 3.0);
		assert!(wide.support >= narrow.support);
	}
}
