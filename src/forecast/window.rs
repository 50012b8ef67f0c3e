//! Sliding windows over a scaled series

use crate::error::CoreError;

/// Supervised pairs built from a series.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WindowedPairs {
    /// One window of `window_size` consecutive values per pair
    pub inputs: Vec<Vec<f64>>,
    /// The value immediately following each window
    pub targets: Vec<f64>,
}

impl WindowedPairs {
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Split chronologically at `index`: `[..index]` and `[index..]`.
    pub fn split_at(&self, index: usize) -> (WindowedPairs, WindowedPairs) {
        let index = index.min(self.len());
        (
            WindowedPairs {
                inputs: self.inputs[..index].to_vec(),
                targets: self.targets[..index].to_vec(),
            },
            WindowedPairs {
                inputs: self.inputs[index..].to_vec(),
                targets: self.targets[index..].to_vec(),
            },
        )
    }
}

/// Build `len(data) - window_size` (window, next value) pairs.
pub fn create_sequences(data: &[f64], window_size: usize) -> Result<WindowedPairs, CoreError> {
    if window_size == 0 {
        return Err(CoreError::invalid_parameter("window_size", "must be at least 1"));
    }
    if data.len() <= window_size {
        return Err(CoreError::InsufficientData {
            required: window_size + 1,
            actual: data.len(),
        });
    }

    let (inputs, targets) = data
        .windows(window_size + 1)
        .map(|w| (w[..window_size].to_vec(), w[window_size]))
        .unzip();

    Ok(WindowedPairs { inputs, targets })
}

/// Index separating the training segment from the validation segment.
///
/// At least one pair always goes to training; the validation segment may
/// be empty for very short series.
pub fn chronological_split_index(n_pairs: usize, validation_split: f64) -> usize {
    let split = ((1.0 - validation_split) * n_pairs as f64) as usize;
    split.clamp(1.min(n_pairs), n_pairs)
}

/// The window that seeds a forecast.
///
/// Takes the last `window_size` values; a shorter series is left-padded by
/// repeating its earliest value.
pub fn seed_window(scaled: &[f64], window_size: usize) -> Result<Vec<f64>, CoreError> {
    let Some(&first) = scaled.first() else {
        return Err(CoreError::InsufficientData {
            required: 1,
            actual: 0,
        });
    };

    if scaled.len() >= window_size {
        return Ok(scaled[scaled.len() - window_size..].to_vec());
    }

    let mut window = vec![first; window_size - scaled.len()];
    window.extend_from_slice(scaled);
    Ok(window)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_sequences_pairs() {
        let data = [1.0, 2.0, 3.0, 4.0, 5.0];
        let pairs = create_sequences(&data, 3).unwrap();

        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs.inputs[0], vec![1.0, 2.0, 3.0]);
        assert_eq!(pairs.targets[0], 4.0);
        assert_eq!(pairs.inputs[1], vec![2.0, 3.0, 4.0]);
        assert_eq!(pairs.targets[1], 5.0);
    }

    #[test]
    fn test_create_sequences_needs_window_plus_one() {
        let result = create_sequences(&[1.0, 2.0, 3.0], 3);
        assert!(matches!(
            result,
            Err(CoreError::InsufficientData { required: 4, actual: 3 })
        ));
        assert_eq!(create_sequences(&[1.0, 2.0, 3.0, 4.0], 3).unwrap().len(), 1);
    }

    #[test]
    fn test_zero_window_rejected() {
        assert!(matches!(
            create_sequences(&[1.0, 2.0], 0),
            Err(CoreError::InvalidParameter { name: "window_size", .. })
        ));
    }

    #[test]
    fn test_split_is_chronological() {
        let data: Vec<f64> = (0..23).map(|i| i as f64).collect();
        let pairs = create_sequences(&data, 3).unwrap();
        assert_eq!(pairs.len(), 20);

        let idx = chronological_split_index(pairs.len(), 0.15);
        assert_eq!(idx, 17);

        let (train, val) = pairs.split_at(idx);
        assert_eq!(train.len(), 17);
        assert_eq!(val.len(), 3);
        // Every validation target comes after every training target
        let last_train = train.targets.last().unwrap();
        assert!(val.targets.iter().all(|t| t > last_train));
    }

    #[test]
    fn test_split_keeps_one_training_pair() {
        assert_eq!(chronological_split_index(1, 0.15), 1);
        assert_eq!(chronological_split_index(2, 0.9), 1);
        assert_eq!(chronological_split_index(0, 0.15), 0);
    }

    #[test]
    fn test_seed_window_takes_tail() {
        let window = seed_window(&[0.1, 0.2, 0.3, 0.4], 2).unwrap();
        assert_eq!(window, vec![0.3, 0.4]);
    }

    #[test]
    fn test_seed_window_pads_with_earliest_value() {
        let window = seed_window(&[0.5, 0.6], 5).unwrap();
        assert_eq!(window, vec![0.5, 0.5, 0.5, 0.5, 0.6]);
    }

    #[test]
    fn test_seed_window_empty_series() {
        assert!(matches!(
            seed_window(&[], 3),
            Err(CoreError::InsufficientData { .. })
        ));
    }
}
