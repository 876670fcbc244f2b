use crate::domain::errors::ConfigError;

const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// One strategy-exposed parameter and the discrete grid of values a
/// search may assign to it.
#[derive(Debug, Clone, PartialEq)]
pub struct Hyperparameter {
    pub name: String,
    pub options: Vec<f64>,
}

impl Hyperparameter {
    pub fn new(name: impl Into<String>, options: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            options,
        }
    }

    pub fn cardinality(&self) -> usize {
        self.options.len()
    }
}

/// The full set of hyperparameters a strategy exposes for optimization.
#[derive(Debug, Clone, Default)]
pub struct HyperparameterSpace {
    params: Vec<Hyperparameter>,
}

impl HyperparameterSpace {
    pub fn new(params: Vec<Hyperparameter>) -> Result<Self, ConfigError> {
        if params.iter().any(|p| p.options.is_empty()) {
            return Err(ConfigError::InvalidHyperparameters {
                reason: "every hyperparameter needs at least one option".into(),
            });
        }
        if params.iter().any(|p| p.cardinality() > ALPHABET.len()) {
            return Err(ConfigError::InvalidHyperparameters {
                reason: format!(
                    "a hyperparameter grid cannot exceed {} options",
                    ALPHABET.len()
                ),
            });
        }
        Ok(Self { params })
    }

    pub fn params(&self) -> &[Hyperparameter] {
        &self.params
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Total number of distinct DNA strings this space can produce.
    pub fn size(&self) -> usize {
        self.params.iter().map(Hyperparameter::cardinality).product()
    }

    /// Resolves a DNA string into the named values a strategy reads.
    pub fn decode(&self, dna: &Dna) -> Result<Vec<(String, f64)>, ConfigError> {
        if dna.genes.len() != self.params.len() {
            return Err(ConfigError::InvalidHyperparameters {
                reason: format!(
                    "dna has {} genes but space defines {}",
                    dna.genes.len(),
                    self.params.len()
                ),
            });
        }
        self.params
            .iter()
            .zip(dna.genes.iter())
            .map(|(param, &index)| {
                param
                    .options
                    .get(index)
                    .copied()
                    .map(|v| (param.name.clone(), v))
                    .ok_or_else(|| ConfigError::InvalidHyperparameters {
                        reason: format!(
                            "gene index {} out of range for '{}'",
                            index, param.name
                        ),
                    })
            })
            .collect()
    }

    /// Every DNA string in the space, in lexicographic (odometer) order.
    pub fn all_dna(&self) -> Vec<Dna> {
        if self.params.is_empty() {
            return vec![];
        }
        let mut combos = vec![vec![]];
        for param in &self.params {
            let mut next = Vec::with_capacity(combos.len() * param.cardinality());
            for combo in &combos {
                for index in 0..param.cardinality() {
                    let mut extended = combo.clone();
                    extended.push(index);
                    next.push(extended);
                }
            }
            combos = next;
        }
        combos.into_iter().map(Dna::from_genes).collect()
    }
}

/// A candidate point in a hyperparameter grid, represented as one gene
/// (an index into that hyperparameter's options) per position. Encodes
/// to and decodes from a fixed-width string so candidates can be logged,
/// deduplicated, and persisted to CSV compactly.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Dna {
    genes: Vec<usize>,
}

impl Dna {
    pub fn from_genes(genes: Vec<usize>) -> Self {
        Self { genes }
    }

    pub fn genes(&self) -> &[usize] {
        &self.genes
    }

    pub fn encode(&self) -> String {
        self.genes
            .iter()
            .map(|&g| ALPHABET[g % ALPHABET.len()] as char)
            .collect()
    }

    pub fn decode_string(s: &str) -> Result<Self, ConfigError> {
        let genes: Option<Vec<usize>> = s
            .chars()
            .map(|c| ALPHABET.iter().position(|&b| b as char == c))
            .collect();
        genes
            .map(Dna::from_genes)
            .ok_or_else(|| ConfigError::InvalidHyperparameters {
                reason: format!("'{}' contains a character outside the DNA alphabet", s),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_space() -> HyperparameterSpace {
        HyperparameterSpace::new(vec![
            Hyperparameter::new("fast_sma", vec![10.0, 20.0, 30.0]),
            Hyperparameter::new("slow_sma", vec![50.0, 100.0]),
        ])
        .unwrap()
    }

    #[test]
    fn encode_decode_round_trips() {
        let dna = Dna::from_genes(vec![2, 1]);
        let encoded = dna.encode();
        let decoded = Dna::decode_string(&encoded).unwrap();
        assert_eq!(dna, decoded);
    }

    #[test]
    fn decode_rejects_out_of_alphabet_characters() {
        assert!(Dna::decode_string("!!").is_err());
    }

    #[test]
    fn space_decodes_dna_into_named_values() {
        let space = sample_space();
        let dna = Dna::from_genes(vec![1, 0]);
        let values = space.decode(&dna).unwrap();
        assert_eq!(values, vec![("fast_sma".to_string(), 20.0), ("slow_sma".to_string(), 50.0)]);
    }

    #[test]
    fn space_size_is_the_product_of_cardinalities() {
        assert_eq!(sample_space().size(), 6);
    }

    #[test]
    fn all_dna_enumerates_every_combination_exactly_once() {
        let space = sample_space();
        let all = space.all_dna();
        assert_eq!(all.len(), space.size());
        let unique: std::collections::HashSet<_> = all.iter().map(Dna::encode).collect();
        assert_eq!(unique.len(), all.len());
    }

    #[test]
    fn rejects_empty_hyperparameter_options() {
        let result = HyperparameterSpace::new(vec![Hyperparameter::new("x", vec![])]);
        assert!(result.is_err());
    }
}
