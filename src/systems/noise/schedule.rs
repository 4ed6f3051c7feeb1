// weight falloff per octave
const PERSISTENCE: f32 = 0.5;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Octave {
    pub cell_count: usize,
    pub weight: f32,
}

/// Octave plan for a fractal field.
///
/// Weights are normalized over the full schedule so they sum to one before any
/// octave is skipped. Octaves finer than the target resolution are dropped by
/// [`CellSchedule::active`] without renormalizing the rest.
#[derive(Clone, Debug, PartialEq)]
pub struct CellSchedule {
    octaves: Vec<Octave>,
}

impl CellSchedule {
    pub fn new(base_cell_count: usize, octaves: usize, lacunarity: f32) -> Self {
        let weights: Vec<f32> = (0..octaves).map(|i| PERSISTENCE.powi(i as i32)).collect();
        let norm = 1.0 / weights.iter().sum::<f32>().max(f32::EPSILON);

        let octaves = weights
            .iter()
            .enumerate()
            .map(|(i, weight)| Octave {
                cell_count: ((base_cell_count as f32 * lacunarity.powi(i as i32)).round() as usize)
                    .max(1),
                weight: weight * norm,
            })
            .collect();

        Self { octaves }
    }

    pub fn octaves(&self) -> &[Octave] {
        &self.octaves
    }

    pub fn total_weight(&self) -> f32 {
        self.octaves.iter().map(|octave| octave.weight).sum()
    }

    /// Octaves that fit at `resolution`, i.e. at least one texel per cell.
    pub fn active(&self, resolution: usize) -> impl Iterator<Item = &Octave> + '_ {
        self.octaves
            .iter()
            .filter(move |octave| octave.cell_count <= resolution)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weights_halve_and_sum_to_one() {
        let schedule = CellSchedule::new(2, 4, 2.0);
        let weights: Vec<f32> = schedule.octaves().iter().map(|o| o.weight).collect();

        let expected = [8.0 / 15.0, 4.0 / 15.0, 2.0 / 15.0, 1.0 / 15.0];
        for (weight, expected) in weights.iter().zip(expected) {
            assert!((weight - expected).abs() < 1e-6);
        }
        assert!((weights[0] - 0.533).abs() < 1e-3);
        assert!((weights[3] - 0.067).abs() < 1e-3);
        assert!((schedule.total_weight() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cell_counts_follow_lacunarity() {
        let schedule = CellSchedule::new(2, 4, 2.0);
        let cells: Vec<usize> = schedule.octaves().iter().map(|o| o.cell_count).collect();

        assert_eq!(cells, vec![2, 4, 8, 16]);
    }

    #[test]
    fn octaves_finer_than_resolution_are_skipped() {
        let schedule = CellSchedule::new(2, 4, 2.0);

        assert_eq!(schedule.active(64).count(), 4);

        let active: Vec<usize> = schedule.active(8).map(|o| o.cell_count).collect();
        assert_eq!(active, vec![2, 4, 8]);

        // the surviving weights are left as they were
        let weight: f32 = schedule.active(8).map(|o| o.weight).sum();
        assert!((weight - 14.0 / 15.0).abs() < 1e-6);
    }

    #[test]
    fn degenerate_cell_counts_clamp_to_one() {
        let schedule = CellSchedule::new(1, 3, 0.25);

        assert!(schedule.octaves().iter().all(|o| o.cell_count == 1));
    }
}
