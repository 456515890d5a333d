//! Algorithm and coin metadata
//!
//! The pool protocol names algorithms by string id (`rx/0`, `cn/r`, ...).
//! Jobs that omit an explicit `algo` field are resolved through the coin
//! configured for the pool and the major version byte of the work blob.

use crate::{Error, Result};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Algorithm family, used for family-specific job requirements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlgorithmFamily {
    RandomX,
    CryptoNight,
    CryptoNightLite,
    CryptoNightHeavy,
    CryptoNightPico,
    Argon2,
    KawPow,
    GhostRider,
}

impl AlgorithmFamily {
    /// Whether jobs of this family must carry a seed hash
    pub fn requires_seed_hash(&self) -> bool {
        matches!(self, AlgorithmFamily::RandomX)
    }
}

/// Known proof-of-work algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Algorithm {
    Rx0,
    RxWow,
    RxArq,
    RxKeva,
    RxSfx,
    RxGraft,
    Cn0,
    Cn1,
    Cn2,
    CnR,
    CnHalf,
    CnRwz,
    CnZls,
    CnDouble,
    CnCcx,
    CnLite1,
    CnHeavy0,
    CnHeavyTube,
    CnHeavyXhv,
    CnPico,
    CnPicoTlo,
    Argon2Chukwa,
    Argon2ChukwaV2,
    Argon2Ninja,
    KawPow,
    GhostRider,
}

const ALGORITHMS: &[(Algorithm, &str, AlgorithmFamily)] = &[
    (Algorithm::Rx0, "rx/0", AlgorithmFamily::RandomX),
    (Algorithm::RxWow, "rx/wow", AlgorithmFamily::RandomX),
    (Algorithm::RxArq, "rx/arq", AlgorithmFamily::RandomX),
    (Algorithm::RxKeva, "rx/keva", AlgorithmFamily::RandomX),
    (Algorithm::RxSfx, "rx/sfx", AlgorithmFamily::RandomX),
    (Algorithm::RxGraft, "rx/graft", AlgorithmFamily::RandomX),
    (Algorithm::Cn0, "cn/0", AlgorithmFamily::CryptoNight),
    (Algorithm::Cn1, "cn/1", AlgorithmFamily::CryptoNight),
    (Algorithm::Cn2, "cn/2", AlgorithmFamily::CryptoNight),
    (Algorithm::CnR, "cn/r", AlgorithmFamily::CryptoNight),
    (Algorithm::CnHalf, "cn/half", AlgorithmFamily::CryptoNight),
    (Algorithm::CnRwz, "cn/rwz", AlgorithmFamily::CryptoNight),
    (Algorithm::CnZls, "cn/zls", AlgorithmFamily::CryptoNight),
    (Algorithm::CnDouble, "cn/double", AlgorithmFamily::CryptoNight),
    (Algorithm::CnCcx, "cn/ccx", AlgorithmFamily::CryptoNight),
    (Algorithm::CnLite1, "cn-lite/1", AlgorithmFamily::CryptoNightLite),
    (Algorithm::CnHeavy0, "cn-heavy/0", AlgorithmFamily::CryptoNightHeavy),
    (Algorithm::CnHeavyTube, "cn-heavy/tube", AlgorithmFamily::CryptoNightHeavy),
    (Algorithm::CnHeavyXhv, "cn-heavy/xhv", AlgorithmFamily::CryptoNightHeavy),
    (Algorithm::CnPico, "cn-pico", AlgorithmFamily::CryptoNightPico),
    (Algorithm::CnPicoTlo, "cn-pico/tlo", AlgorithmFamily::CryptoNightPico),
    (Algorithm::Argon2Chukwa, "argon2/chukwa", AlgorithmFamily::Argon2),
    (Algorithm::Argon2ChukwaV2, "argon2/chukwav2", AlgorithmFamily::Argon2),
    (Algorithm::Argon2Ninja, "argon2/ninja", AlgorithmFamily::Argon2),
    (Algorithm::KawPow, "kawpow", AlgorithmFamily::KawPow),
    (Algorithm::GhostRider, "ghostrider", AlgorithmFamily::GhostRider),
];

static ALIASES: Lazy<HashMap<&'static str, Algorithm>> = Lazy::new(|| {
    let mut map: HashMap<&'static str, Algorithm> =
        ALGORITHMS.iter().map(|(algo, name, _)| (*name, *algo)).collect();

    map.extend([
        ("randomx", Algorithm::Rx0),
        ("rx", Algorithm::Rx0),
        ("rx/monero", Algorithm::Rx0),
        ("randomwow", Algorithm::RxWow),
        ("randomarq", Algorithm::RxArq),
        ("randomkeva", Algorithm::RxKeva),
        ("randomsfx", Algorithm::RxSfx),
        ("cryptonight", Algorithm::Cn0),
        ("cn", Algorithm::Cn0),
        ("cryptonight/0", Algorithm::Cn0),
        ("cryptonight/1", Algorithm::Cn1),
        ("cryptonight/2", Algorithm::Cn2),
        ("cryptonight/r", Algorithm::CnR),
        ("cryptonight/half", Algorithm::CnHalf),
        ("cryptonight-lite/1", Algorithm::CnLite1),
        ("cryptonight-heavy", Algorithm::CnHeavy0),
        ("cryptonight-pico", Algorithm::CnPico),
        ("cn-pico/trtl", Algorithm::CnPico),
        ("chukwa", Algorithm::Argon2Chukwa),
        ("chukwav2", Algorithm::Argon2ChukwaV2),
        ("gr", Algorithm::GhostRider),
    ]);

    map
});

impl Algorithm {
    /// Canonical protocol name
    pub fn name(&self) -> &'static str {
        self.entry().1
    }

    /// Algorithm family
    pub fn family(&self) -> AlgorithmFamily {
        self.entry().2
    }

    /// Look up an algorithm by name or alias, case-insensitively
    pub fn parse(name: &str) -> Option<Self> {
        ALIASES.get(name.to_ascii_lowercase().as_str()).copied()
    }

    /// All known algorithms
    pub fn all() -> impl Iterator<Item = Algorithm> {
        ALGORITHMS.iter().map(|(algo, _, _)| *algo)
    }

    fn entry(&self) -> &'static (Algorithm, &'static str, AlgorithmFamily) {
        ALGORITHMS
            .iter()
            .find(|(algo, _, _)| algo == self)
            .unwrap_or(&ALGORITHMS[0])
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Algorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s).ok_or_else(|| Error::config(format!("Unknown algorithm: {}", s)))
    }
}

impl Serialize for Algorithm {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for Algorithm {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Algorithm::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// Coins whose algorithm can be derived from the blob version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Coin {
    Monero,
    Wownero,
    Arqma,
    Keva,
    Ravencoin,
    Zephyr,
    Townforge,
}

impl Coin {
    /// Algorithm for a blob with the given major version byte
    pub fn algorithm(&self, blob_version: u8) -> Algorithm {
        match self {
            Coin::Monero => {
                if blob_version >= 12 {
                    Algorithm::Rx0
                } else {
                    Algorithm::CnR
                }
            }
            Coin::Wownero => Algorithm::RxWow,
            Coin::Arqma => Algorithm::RxArq,
            Coin::Keva => Algorithm::RxKeva,
            Coin::Ravencoin => Algorithm::KawPow,
            Coin::Zephyr | Coin::Townforge => Algorithm::Rx0,
        }
    }

    /// Lowercase coin name
    pub fn name(&self) -> &'static str {
        match self {
            Coin::Monero => "monero",
            Coin::Wownero => "wownero",
            Coin::Arqma => "arqma",
            Coin::Keva => "keva",
            Coin::Ravencoin => "ravencoin",
            Coin::Zephyr => "zephyr",
            Coin::Townforge => "townforge",
        }
    }
}

impl fmt::Display for Coin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Coin {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "monero" | "xmr" => Ok(Coin::Monero),
            "wownero" | "wow" => Ok(Coin::Wownero),
            "arqma" | "arq" => Ok(Coin::Arqma),
            "keva" => Ok(Coin::Keva),
            "ravencoin" | "rvn" => Ok(Coin::Ravencoin),
            "zephyr" | "zeph" => Ok(Coin::Zephyr),
            "townforge" => Ok(Coin::Townforge),
            _ => Err(Error::config(format!("Unknown coin: {}", s))),
        }
    }
}
