pub mod city;
pub mod job;

pub use job::{JobRecord, PublishedArtifact, ResultSet};
