//! Type definitions for the cross-sell scoring service

pub mod customer;
pub mod event;
pub mod features;
pub mod score;

pub use customer::{
    Categorical, Gender, LabeledRecord, RawCustomerRecord, VehicleAge, VehicleDamage,
};
pub use event::{PredictionEvent, PredictionSource};
pub use features::FeatureVector;
pub use score::{Attribution, BatchScore, RowErrorKind, RowOutcome, ScoreResult};
