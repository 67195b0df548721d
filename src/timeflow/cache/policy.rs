use std::str::FromStr;

use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplacementPolicy {
    #[default]
    Lru,
    Fifo,
    Random,
}

impl FromStr for ReplacementPolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "lru" => Ok(Self::Lru),
            "fifo" => Ok(Self::Fifo),
            "random" => Ok(Self::Random),
            _ => Err(format!(
                "unsupported replacement policy '{}', expected one of: lru, fifo, random",
                value
            )),
        }
    }
}

pub(crate) fn is_pow2(value: u64) -> bool {
    value != 0 && value & (value - 1) == 0
}

pub(crate) fn log2(value: u64) -> u32 {
    debug_assert!(is_pow2(value));
    value.trailing_zeros()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_names_parse_case_insensitively() {
        assert_eq!(Ok(ReplacementPolicy::Lru), "LRU".parse());
        assert_eq!(Ok(ReplacementPolicy::Fifo), "fifo".parse());
        assert_eq!(Ok(ReplacementPolicy::Random), "Random".parse());
        assert!("plru".parse::<ReplacementPolicy>().is_err());
    }

    #[test]
    fn pow2_helpers() {
        assert!(is_pow2(1));
        assert!(is_pow2(64));
        assert!(!is_pow2(0));
        assert!(!is_pow2(72));
        assert_eq!(6, log2(64));
    }
}
