//! Steady-state operation mixes in the style of YCSB.

use guacamole::{FromGuacamole, Guacamole};

use super::OperationKind;

/////////////////////////////////////////////// Pick ///////////////////////////////////////////////

/// How a mix entry chooses the record it touches.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Pick {
    /// A new record past every existing one.
    Next,
    /// A Zipf-skewed choice among the preloaded records.
    Skewed,
    /// A Zipf-skewed offset back from the newest record.
    Latest,
}

//////////////////////////////////////////////// Mix ///////////////////////////////////////////////

/// Weighted choice between operation kinds.
#[derive(Clone, Debug, PartialEq)]
pub struct Mix {
    entries: Vec<(f64, OperationKind, Pick)>,
}

impl Mix {
    /// Build a mix from (weight, kind, pick) triples.  Weights need not sum to one.
    pub fn new(weights: &[(f64, OperationKind, Pick)]) -> Self {
        let total: f64 = weights.iter().map(|(w, _, _)| *w).sum();
        let mut acc = 0.0;
        let mut entries = Vec::with_capacity(weights.len());
        for (weight, kind, pick) in weights.iter() {
            acc += weight / total;
            entries.push((acc, *kind, *pick));
        }
        Self { entries }
    }

    pub fn choose(&self, guac: &mut Guacamole) -> (OperationKind, Pick) {
        let weight = f64::from_guacamole(&mut (), guac);
        for (thresh, kind, pick) in self.entries.iter() {
            if weight < *thresh {
                return (*kind, *pick);
            }
        }
        // Rounding can leave the last threshold a hair under one.
        let (_, kind, pick) = self.entries[self.entries.len() - 1];
        (kind, pick)
    }

    pub fn writes(&self) -> bool {
        self.entries
            .iter()
            .any(|(_, kind, _)| kind.is_write())
    }

    pub fn scans(&self) -> bool {
        self.entries
            .iter()
            .any(|(_, kind, _)| *kind == OperationKind::Scan)
    }
}

/////////////////////////////////////////////// Zipf ///////////////////////////////////////////////

/// Zipf-distributed ranks in `1..=n`, following Gray et al., "Quickly Generating Billion-Record
/// Synthetic Databases".
#[derive(Clone, Debug)]
pub struct Zipf {
    n: u64,
    theta: f64,
    alpha: f64,
    zetan: f64,
    eta: f64,
}

impl Zipf {
    pub fn new(n: u64, theta: f64) -> Self {
        let n = n.max(1);
        let zetan = zeta(n, theta);
        let alpha = 1.0 / (1.0 - theta);
        let eta = if n > 2 {
            let zeta2 = zeta(2, theta);
            (1.0 - (2.0 / n as f64).powf(1.0 - theta)) / (1.0 - zeta2 / zetan)
        } else {
            0.0
        };
        Self {
            n,
            theta,
            alpha,
            zetan,
            eta,
        }
    }

    pub fn next(&self, guac: &mut Guacamole) -> u64 {
        let u = f64::from_guacamole(&mut (), guac);
        let uz = u * self.zetan;
        if self.n == 1 || uz < 1.0 {
            return 1;
        }
        if self.n == 2 || uz < 1.0 + 0.5f64.powf(self.theta) {
            return 2;
        }
        let rank = 1 + (self.n as f64 * (self.eta * u - self.eta + 1.0).powf(self.alpha)) as u64;
        rank.min(self.n)
    }
}

fn zeta(n: u64, theta: f64) -> f64 {
    (1..=n).map(|i| 1.0 / (i as f64).powf(theta)).sum()
}

/////////////////////////////////////////////// tests //////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mix_thresholds() {
        let mix = Mix::new(&[
            (1.0, OperationKind::Update, Pick::Skewed),
            (3.0, OperationKind::Fetch, Pick::Skewed),
        ]);
        assert_eq!(2, mix.entries.len());
        assert!((mix.entries[0].0 - 0.25).abs() < 1e-9);
        assert!((mix.entries[1].0 - 1.0).abs() < 1e-9);
        assert!(mix.writes());
        assert!(!mix.scans());
    }

    #[test]
    fn mix_respects_weights() {
        let mix = Mix::new(&[
            (0.05, OperationKind::Update, Pick::Skewed),
            (0.95, OperationKind::Fetch, Pick::Skewed),
        ]);
        let mut guac = Guacamole::new(0);
        let updates = (0..10_000)
            .filter(|_| mix.choose(&mut guac).0 == OperationKind::Update)
            .count();
        assert!(updates > 300 && updates < 700, "updates={}", updates);
    }

    #[test]
    fn zipf_stays_in_range() {
        for n in [1u64, 2, 3, 10, 1000] {
            let zipf = Zipf::new(n, 0.99);
            let mut guac = Guacamole::new(n);
            for _ in 0..10_000 {
                let x = zipf.next(&mut guac);
                assert!(x >= 1 && x <= n, "n={} x={}", n, x);
            }
        }
    }

    #[test]
    fn zipf_is_skewed() {
        let zipf = Zipf::new(1000, 0.99);
        let mut guac = Guacamole::new(0);
        let mut hist = vec![0u64; 1001];
        for _ in 0..100_000 {
            hist[zipf.next(&mut guac) as usize] += 1;
        }
        assert!(hist[1] > hist[2]);
        assert!(hist[2] > hist[10]);
        assert!(hist[1] > 10 * hist[500].max(1));
    }

    #[test]
    fn zipf_is_deterministic() {
        let zipf = Zipf::new(100, 0.5);
        let mut lhs = Guacamole::new(99);
        let mut rhs = Guacamole::new(99);
        for _ in 0..1000 {
            assert_eq!(zipf.next(&mut lhs), zipf.next(&mut rhs));
        }
    }
}
