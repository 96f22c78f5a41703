use {
    serde::{Deserialize, Serialize},
    serde_json::{Map, Value},
};

/// Key under which the trusted signals data version is exposed to the bidding
/// script.
pub const DATA_VERSION_KEY: &str = "dataVersion";

/// An opaque JSON object exchanged between auction participants.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Signals(Map<String, Value>);

impl Signals {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parses a JSON object. Any other JSON value is rejected.
    pub fn parse(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json).map(Self)
    }

    /// Contextual signals carrying only the data version of the trusted
    /// signals used for bidding.
    pub fn with_data_version(version: DataVersion) -> Self {
        let mut map = Map::new();
        map.insert(DATA_VERSION_KEY.to_owned(), Value::from(version.0));
        Self(map)
    }

    /// Keeps only the entries whose key is listed.
    pub fn subset<'a>(&self, keys: impl IntoIterator<Item = &'a str>) -> Self {
        Self(
            keys.into_iter()
                .filter_map(|key| Some((key.to_owned(), self.0.get(key)?.clone())))
                .collect(),
        )
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Map<String, Value>> for Signals {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl std::fmt::Display for Signals {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", Value::Object(self.0.clone()))
    }
}

/// Version tag of a trusted signals response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub struct DataVersion(pub u32);
