use super::error::ConfigError;
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

const NUMBER_OF_PREFERRED_NEIGHBORS: &str = "NumberOfPreferredNeighbors";
const UNCHOKING_INTERVAL: &str = "UnchokingInterval";
const OPTIMISTIC_UNCHOKING_INTERVAL: &str = "OptimisticUnchokingInterval";
const FILE_NAME: &str = "FileName";
const FILE_SIZE: &str = "FileSize";
const PIECE_SIZE: &str = "PieceSize";

/// Settings shared by every peer, read from `Common.cfg`.
///
/// ```text
/// NumberOfPreferredNeighbors 2
/// UnchokingInterval 5
/// OptimisticUnchokingInterval 15
/// FileName TheFile.dat
/// FileSize 10000232
/// PieceSize 32768
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommonConfig {
    pub preferred_neighbors: usize,
    pub unchoking_interval: Duration,
    pub optimistic_unchoking_interval: Duration,
    pub file_name: String,
    pub file_size: u64,
    pub piece_size: u64,
}

impl CommonConfig {
    pub fn piece_count(&self) -> usize {
        self.file_size.div_ceil(self.piece_size) as usize
    }
}

impl FromStr for CommonConfig {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut values: HashMap<&str, &str> = HashMap::new();
        for line in s.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut parts = line.split_whitespace();
            if let (Some(key), Some(value), None) = (parts.next(), parts.next(), parts.next()) {
                values.insert(key, value);
            }
        }

        let config = Self {
            preferred_neighbors: parse(&values, NUMBER_OF_PREFERRED_NEIGHBORS)?,
            unchoking_interval: seconds(&values, UNCHOKING_INTERVAL)?,
            optimistic_unchoking_interval: seconds(&values, OPTIMISTIC_UNCHOKING_INTERVAL)?,
            file_name: required(&values, FILE_NAME)?.to_string(),
            file_size: positive(&values, FILE_SIZE)?,
            piece_size: positive(&values, PIECE_SIZE)?,
        };

        Ok(config)
    }
}

fn required<'a>(values: &HashMap<&str, &'a str>, key: &'static str) -> Result<&'a str, ConfigError> {
    values.get(key).copied().ok_or(ConfigError::MissingKey(key))
}

fn parse<T: FromStr>(values: &HashMap<&str, &str>, key: &'static str) -> Result<T, ConfigError> {
    let raw = required(values, key)?;
    raw.parse().map_err(|_| ConfigError::InvalidValue {
        key,
        value: raw.to_string(),
    })
}

fn positive(values: &HashMap<&str, &str>, key: &'static str) -> Result<u64, ConfigError> {
    match parse::<u64>(values, key)? {
        0 => Err(ConfigError::InvalidValue {
            key,
            value: "0".into(),
        }),
        n => Ok(n),
    }
}

fn seconds(values: &HashMap<&str, &str>, key: &'static str) -> Result<Duration, ConfigError> {
    positive(values, key).map(Duration::from_secs)
}
