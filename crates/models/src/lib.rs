//! # Models Crate
//!
//! The two recommendation model families and the artifact that bundles a
//! trained model with the data snapshot it was fitted on.
//!
//! ## Main Components
//!
//! - **traits**: `ModelFamily`, the interface both families implement
//! - **als**: Latent-factor model fitted by alternating least squares
//! - **hybrid**: Factorization model with item genre features (WARP loss)
//! - **features**: One-hot genre encoding aligned to the item mapping
//! - **artifact**: `ModelArtifact`, the unit persisted per family
//! - **family**: `Family` names and blob keys

pub mod als;
pub mod artifact;
pub mod error;
pub mod family;
pub mod features;
pub mod hybrid;
pub mod linalg;
pub mod traits;

pub use als::{AlsConfig, AlsModel};
pub use artifact::{ModelArtifact, ModelConfig, TrainedModel};
pub use error::{ModelError, Result};
pub use family::Family;
pub use features::ItemFeatureMatrix;
pub use hybrid::{HybridConfig, HybridModel};
pub use traits::{ModelFamily, top_n};
