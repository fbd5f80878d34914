//! Value codec.

use serde::Serialize;
use serde::de::DeserializeOwned;

use super::CacheResult;

pub fn encode<T: Serialize>(value: &T) -> CacheResult<Vec<u8>> {
    Ok(bincode::serialize(value)?)
}

pub fn decode<T: DeserializeOwned>(raw: &[u8]) -> CacheResult<T> {
    Ok(bincode::deserialize(raw)?)
}
