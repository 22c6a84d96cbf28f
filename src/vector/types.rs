//! Collection and point types

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use uuid::Uuid;

/// Similarity metric of a collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
pub enum Distance {
    Cosine,
    Dot,
    Euclid,
}

/// Vector parameters of a collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorParams {
    pub size: u64,
    pub distance: Distance,
}

impl VectorParams {
    pub fn new(size: u64, distance: Distance) -> Self {
        Self { size, distance }
    }
}

/// A vector with its payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorPoint {
    pub id: Uuid,
    pub vector: Vec<f32>,
    pub payload: serde_json::Map<String, serde_json::Value>,
}

/// Result of an ensure-collection call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum CollectionStatus {
    Created,
    AlreadyExists,
}
