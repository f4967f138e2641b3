// Domain layer - Probe results, failure taxonomy and classification rules

pub mod errors;
pub mod model;
pub mod rules;
