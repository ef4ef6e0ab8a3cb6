pub mod export;
pub mod pipelines;
pub mod sheet;
