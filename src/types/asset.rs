use strum_macros::{Display, EnumString};

/// Broad classification of an asset, used by external collaborators
/// (currency/exchange lookups) and by the resampler to decide which
/// assets are eligible for a given continuation/contract operation.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum AssetClass {
    Spot,
    Future,
    FutureContinuation,
}

/// An opaque, hashable, totally-ordered asset identifier (§3). Ordering and
/// hashing are by `id` alone; `class` is metadata carried alongside.
#[derive(Clone, Debug)]
pub struct Asset {
    id: String,
    class: AssetClass,
}

impl Asset {
    pub fn new(id: impl Into<String>, class: AssetClass) -> Self {
        Self {
            id: id.into(),
            class,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn class(&self) -> AssetClass {
        self.class
    }

    pub fn is_continuation(&self) -> bool {
        self.class == AssetClass::FutureContinuation
    }

    pub fn is_outright_future(&self) -> bool {
        self.class == AssetClass::Future
    }
}

impl PartialEq for Asset {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Asset {}

impl PartialOrd for Asset {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Asset {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.id.cmp(&other.id)
    }
}

impl std::hash::Hash for Asset {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl std::fmt::Display for Asset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_and_ordering_are_by_id() {
        let a = Asset::new("btcusdt", AssetClass::Spot);
        let b = Asset::new("btcusdt", AssetClass::FutureContinuation);
        assert_eq!(a, b);

        let c = Asset::new("ethusdt", AssetClass::Spot);
        assert!(a < c);
    }

    #[test]
    fn continuation_flag_follows_class() {
        let cont = Asset::new("6e-continuation", AssetClass::FutureContinuation);
        assert!(cont.is_continuation());
        assert!(!cont.is_outright_future());
    }
}
